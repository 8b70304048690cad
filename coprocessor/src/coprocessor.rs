use crate::board::{Board, Resources};
use crate::calibration::{CalibrationAccumulator, CalibrationSet};
use crate::config::CoprocessorConfig;
use crate::downsample::{Downsampler, FirFilter, InertialSample};
use crate::error::{config_error, CalibrationError, CoprocessorResult};
use crate::fusion::{
    apply_correction, select_branch, simple_attitude, Algorithm, AlgorithmCell, CorrectionBranch,
    FusionStats, PosVelNoise,
};
use crate::link::{self, DispatchContext, LinkRequest, LinkTransport};
use crate::load::{LoadMonitor, LoadReport};
use crate::sensors::SensorState;
use ahrs::{AhrsError, InsEstimator};
use hal::{Magnetometer, SampleSource, TickCounter};
use log::{debug, info, trace, warn};

/// What one estimation cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Block counter of the consumed raw block
    pub sequence: u32,
    pub algorithm: Algorithm,
    /// Correction applied, `None` in simple mode
    pub branch: Option<CorrectionBranch>,
    /// Blocks were skipped since the previous cycle
    pub falling_behind: bool,
}

/// The attitude coprocessor: owns the board resources, the estimator and all
/// sensor state, and runs the fixed-rate estimation loop.
pub struct Coprocessor<B: Board, E: InsEstimator> {
    name: String,
    config: CoprocessorConfig,
    resources: Resources<B>,
    estimator: E,
    sensors: SensorState,
    downsampler: Downsampler,
    algorithm: AlgorithmCell,
    calibration_pending: bool,
    load: LoadMonitor,
    stats: FusionStats,
}

impl<B: Board, E: InsEstimator> Coprocessor<B, E> {
    pub fn new(board: B, estimator: E, config: CoprocessorConfig) -> CoprocessorResult<Self> {
        config.validate()?;
        let filter = FirFilter::boxcar(config.adc_oversampling)?;
        let name = board.name().to_string();
        let resources = board.split_resources();

        Ok(Coprocessor {
            name,
            sensors: SensorState::new(
                config.accel_calibration,
                config.gyro_calibration,
                config.mag_calibration,
            ),
            downsampler: Downsampler::new(filter),
            algorithm: AlgorithmCell::new(config.initial_algorithm),
            calibration_pending: false,
            load: LoadMonitor::new(config.timer_rate),
            stats: FusionStats::default(),
            config,
            resources,
            estimator,
        })
    }

    /// Install default calibration and, in full mode, initialise the
    /// estimator from one block of data
    pub fn start(&mut self) {
        info!(
            "Starting coprocessor on {}: {} Hz ADC, {}x oversampling, {} Hz estimation",
            self.name,
            self.config.adc_sample_rate,
            self.config.adc_oversampling,
            self.config.ekf_rate()
        );

        self.sensors = SensorState::new(
            self.config.accel_calibration,
            self.config.gyro_calibration,
            self.config.mag_calibration,
        );
        self.algorithm = AlgorithmCell::new(self.config.initial_algorithm);
        self.calibration_pending = false;

        if self.algorithm.active() == Algorithm::Full {
            let block = self.resources.adc.wait_block();
            self.downsampler.downsample(&block, &mut self.sensors);
            self.converge();
        }

        self.load.start(self.resources.clock.ticks());
    }

    /// Reset the estimator and hand it the current sensor variances
    fn converge(&mut self) {
        self.estimator.init();
        self.estimator
            .set_accel_variance(&self.sensors.accel.calibration.variance);
        self.estimator
            .set_gyro_variance(&self.sensors.gyro.calibration.variance);
        self.estimator
            .set_mag_variance(&link::mag_variance_body(&self.sensors.mag.calibration.variance));
    }

    /// Run the loop forever
    pub fn run(&mut self) -> ! {
        loop {
            self.run_cycle();
        }
    }

    /// One estimation cycle: pending calibration, magnetometer poll, wait
    /// for data, downsample, fusion and link service
    pub fn run_cycle(&mut self) -> CycleReport {
        if let Some(algorithm) = self.algorithm.commit() {
            info!("Switched to {:?} algorithm", algorithm);
        }

        if self.calibration_pending {
            self.calibration_pending = false;
            if let Err(e) = self.calibrate(self.config.calibration_samples) {
                warn!("Calibration incomplete: {}", e);
            }
        }

        if self.resources.mag.new_data_available() {
            let raw = self.resources.mag.read_mag();
            self.sensors.update_mag(raw);
        }

        self.load.begin_idle(self.resources.clock.ticks());
        let block = self.resources.adc.wait_block();
        self.load.end_idle(self.resources.clock.ticks());

        let sequence = block.sequence();
        let falling_behind = self.load.observe_sequence(sequence);
        if falling_behind {
            warn!(
                "Not keeping up at block {}, {} cycles dropped",
                sequence,
                self.load.dropped_cycles()
            );
        }
        if sequence % 100 == 0 {
            debug!("Alive at block {}", sequence);
        }

        let sample = self.downsampler.downsample(&block, &mut self.sensors);

        let algorithm = self.algorithm.active();
        let branch = match algorithm {
            Algorithm::Full => Some(self.full_step(&sample)),
            Algorithm::Simple => {
                self.simple_step();
                None
            }
        };

        CycleReport {
            sequence,
            algorithm,
            branch,
            falling_behind,
        }
    }

    fn full_step(&mut self, sample: &InertialSample) -> CorrectionBranch {
        let dt = self.config.dt();

        if let Err(e) = self.estimator.predict_state(&sample.gyro, &sample.accel, dt) {
            self.estimator_fault("state prediction", e);
        }
        // Answer the peer before the expensive covariance step
        self.service_link();
        if let Err(e) = self.estimator.predict_covariance(dt) {
            self.estimator_fault("covariance prediction", e);
        }

        let branch = select_branch(&self.sensors.gps, self.sensors.mag_updated);
        let noise = PosVelNoise {
            tight: self.config.tight_pos_vel_variance,
            loose: self.config.loose_pos_vel_variance,
        };
        if let Err(e) = apply_correction(&mut self.estimator, branch, &mut self.sensors, noise) {
            self.estimator_fault("correction", e);
        }
        self.stats.record(branch);
        trace!("Applied {:?} correction", branch);

        self.sensors.attitude.quaternion = self.estimator.quaternion();
        branch
    }

    fn simple_step(&mut self) {
        self.sensors.attitude.quaternion =
            simple_attitude(&self.sensors.accel.filtered, &self.sensors.mag.raw);
        self.service_link();
    }

    fn estimator_fault(&mut self, step: &str, error: AhrsError) {
        self.stats.estimator_faults = self.stats.estimator_faults.wrapping_add(1);
        warn!("Estimator {} failed: {}", step, error);
    }

    /// Service the link once. Returns the request that was dispatched, if
    /// any.
    pub fn service_link(&mut self) -> Option<LinkRequest> {
        let Resources {
            link: transport,
            irq,
            system,
            ..
        } = &mut self.resources;

        let request = link::poll_link(transport, irq)?;
        trace!("Dispatching {:?}", request);

        let mut ctx = DispatchContext {
            sensors: &mut self.sensors,
            estimator: &mut self.estimator,
            algorithm: &mut self.algorithm,
            calibration_pending: &mut self.calibration_pending,
            load: self.load.report(),
            system,
        };
        if let Some(response) = link::dispatch(&request, &mut ctx) {
            transport.set_response(response);
        }

        link::rearm_link(transport, irq);
        Some(request)
    }

    /// Stationary calibration over `sample_count` cycles.
    ///
    /// Blocks the estimation loop but services the link every cycle. On
    /// success the accel, gyro and mag bias and variance are replaced. If the
    /// magnetometer never reports, accel and gyro are still replaced and the
    /// previous mag calibration is kept.
    pub fn calibrate(&mut self, sample_count: u32) -> CoprocessorResult<CalibrationSet> {
        if sample_count == 0 {
            return Err(CalibrationError::NoSamples.into());
        }
        info!("Calibrating over {} cycles, keep the vehicle still", sample_count);

        let previous_mag = self.sensors.mag.calibration;
        self.sensors.accel.calibration.clear_offsets();
        self.sensors.gyro.calibration.clear_offsets();
        self.sensors.mag.calibration.clear_offsets();

        let mut accumulator = CalibrationAccumulator::new();
        for _ in 0..sample_count {
            let block = self.resources.adc.wait_block();
            let sample = self.downsampler.downsample(&block, &mut self.sensors);
            accumulator.add_inertial(&sample.accel, &sample.gyro);

            if self.resources.mag.new_data_available() {
                let raw = self.resources.mag.read_mag();
                self.sensors.update_mag(raw);
                accumulator.add_magnetometer(&self.sensors.mag.filtered);
            }

            self.service_link();
        }
        // Readings taken with cleared offsets are not fused
        self.sensors.mag_updated = false;
        // Blocks consumed here are not dropped cycles
        self.load.resync();

        let set = accumulator.finish()?;
        self.sensors.accel.calibration.bias = set.accel.bias;
        self.sensors.accel.calibration.variance = set.accel.variance;
        self.sensors.gyro.calibration.bias = set.gyro.bias;
        self.sensors.gyro.calibration.variance = set.gyro.variance;

        match set.mag {
            Some(mag) => {
                self.sensors.mag.calibration.bias = mag.bias;
                self.sensors.mag.calibration.variance = mag.variance;
                info!(
                    "Calibration done: accel var {:?}, gyro var {:?}, mag var {:?}",
                    set.accel.variance, set.gyro.variance, mag.variance
                );
                Ok(set)
            }
            None => {
                self.sensors.mag.calibration = previous_mag;
                Err(CalibrationError::NoMagnetometerSamples {
                    cycles: sample_count,
                }
                .into())
            }
        }
    }

    /// Replace the decimation filter. The filter may not be longer than the
    /// oversampling window, taps past the last frame would never be weighted.
    pub fn set_fir_filter(&mut self, filter: FirFilter) -> CoprocessorResult<()> {
        if filter.taps() > self.config.adc_oversampling {
            return Err(config_error(
                format!(
                    "{} taps exceed the {} frame oversampling window",
                    filter.taps(),
                    self.config.adc_oversampling
                ),
                "fir_coefficients",
            ));
        }
        self.downsampler.set_filter(filter);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CoprocessorConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorState {
        &self.sensors
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm.active()
    }

    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    pub fn load_report(&self) -> LoadReport {
        self.load.report()
    }

    pub fn calibration_pending(&self) -> bool {
        self.calibration_pending
    }

    pub fn resources(&self) -> &Resources<B> {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources<B> {
        &mut self.resources
    }
}
