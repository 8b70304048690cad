use std::{
    sync::mpsc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use coprocessor::{CalibrationParams, HandoffReader, RawBlockHandoff};
use hal::{AdcFrame, MagCounts, Magnetometer, RawSensorBlock, SampleSource, Vector3d, ADC_CHANNELS};
use log::{debug, info};

/// Written by the acquisition worker, drained by the estimation loop
pub static HANDOFF: RawBlockHandoff = RawBlockHandoff::new();

const ZERO_TICKS: f32 = 2048.0;
const ACCEL_TICKS_PER_MS2: f32 = 100.0;
const GYRO_TICKS_PER_RADS: f32 = 1000.0;
const TEMPERATURE_TICKS: u16 = 1500;
const GRAVITY: f32 = 9.81;

/// Calibration matching the simulated accelerometer
pub fn accel_calibration() -> CalibrationParams {
    let scale = 1.0 / ACCEL_TICKS_PER_MS2;
    CalibrationParams::new([scale; 3], [-ZERO_TICKS * scale; 3], [1e-3; 3])
}

/// Calibration matching the simulated gyroscope
pub fn gyro_calibration() -> CalibrationParams {
    let scale = 1.0 / GYRO_TICKS_PER_RADS;
    CalibrationParams::new([scale; 3], [-ZERO_TICKS * scale; 3], [1e-4; 3])
}

/// A level vehicle at rest, pointing at `heading`
#[derive(Debug, Clone)]
pub struct SensorModel {
    heading: f32,
    /// Earth field in NED, magnetometer counts
    north: Vector3d,
    noise: u16,
    seed: u32,
}

impl SensorModel {
    pub fn new(heading_deg: f32, north: Vector3d, noise: u16) -> Self {
        Self {
            heading: heading_deg.to_radians(),
            north,
            noise,
            seed: 0x2545_f491,
        }
    }

    pub fn north(&self) -> Vector3d {
        self.north
    }

    // xorshift32
    fn jitter(&mut self) -> f32 {
        if self.noise == 0 {
            return 0.0;
        }
        self.seed ^= self.seed << 13;
        self.seed ^= self.seed >> 17;
        self.seed ^= self.seed << 5;
        let span = 2 * u32::from(self.noise) + 1;
        (self.seed % span) as f32 - f32::from(self.noise)
    }

    fn ticks(&mut self, value: f32, ticks_per_unit: f32) -> u16 {
        let ticks = ZERO_TICKS + value * ticks_per_unit + self.jitter();
        ticks.round().clamp(0.0, f32::from(u16::MAX)) as u16
    }

    /// One multiplexed ADC frame in wiring order
    pub fn adc_frame(&mut self) -> AdcFrame {
        let accel = Vector3d::new(0.0, 0.0, -GRAVITY);
        let mut frame = [0u16; ADC_CHANNELS];
        frame[0] = self.ticks(accel.y, ACCEL_TICKS_PER_MS2);
        frame[1] = self.ticks(0.0, GYRO_TICKS_PER_RADS);
        frame[2] = self.ticks(accel.x, ACCEL_TICKS_PER_MS2);
        frame[3] = self.ticks(0.0, GYRO_TICKS_PER_RADS);
        frame[4] = self.ticks(accel.z, ACCEL_TICKS_PER_MS2);
        frame[5] = self.ticks(0.0, GYRO_TICKS_PER_RADS);
        frame[6] = TEMPERATURE_TICKS;
        frame[7] = TEMPERATURE_TICKS;
        frame
    }

    /// Field in chip axes. The chip is mounted with X/Y swapped and all
    /// axes inverted relative to the body.
    pub fn mag_counts(&self) -> MagCounts {
        let (sin, cos) = self.heading.sin_cos();
        let body = Vector3d::new(
            self.north.x * cos + self.north.y * sin,
            -self.north.x * sin + self.north.y * cos,
            self.north.z,
        );
        [
            (-body.y).round() as i16,
            (-body.x).round() as i16,
            (-body.z).round() as i16,
        ]
    }
}

pub enum AcquisitionCommand {
    Stop,
}

/// Plays the ADC interrupt: fills a block at the cycle rate and publishes it
pub struct AcquisitionWorker {
    model: SensorModel,
    frames_per_block: usize,
    sequence: u32,
}

impl AcquisitionWorker {
    pub fn run(
        model: SensorModel,
        frames_per_block: usize,
        period: Duration,
        handoff: &'static RawBlockHandoff,
        to_worker_rx: mpsc::Receiver<AcquisitionCommand>,
    ) -> JoinHandle<()> {
        let mut worker = Self {
            model,
            frames_per_block,
            sequence: 0,
        };
        std::thread::spawn(move || {
            let mut last_block_time = Instant::now();
            loop {
                match to_worker_rx.try_recv() {
                    Ok(AcquisitionCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => {
                        debug!("Acquisition stopped after {} blocks", worker.sequence);
                        return;
                    }
                    Err(mpsc::TryRecvError::Empty) => {}
                }
                let elapsed = last_block_time.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                    continue;
                }
                last_block_time += period;

                handoff.publish(&worker.next_block());
            }
        })
    }

    fn next_block(&mut self) -> RawSensorBlock {
        self.sequence = self.sequence.wrapping_add(1);
        let mut block = RawSensorBlock::new(self.sequence);
        for _ in 0..self.frames_per_block {
            if !block.push(self.model.adc_frame()) {
                break;
            }
        }
        block
    }
}

/// ADC seen by the coprocessor, backed by the acquisition worker
pub struct SimAdc {
    reader: HandoffReader<'static>,
    to_worker_tx: mpsc::Sender<AcquisitionCommand>,
    worker: Option<JoinHandle<()>>,
}

impl SimAdc {
    pub fn start(model: SensorModel, frames_per_block: usize, period: Duration) -> Self {
        let (to_worker_tx, to_worker_rx) = mpsc::channel();
        let worker = AcquisitionWorker::run(model, frames_per_block, period, &HANDOFF, to_worker_rx);
        info!(
            "Acquisition running: {} frames per block every {:?}",
            frames_per_block, period
        );
        Self {
            reader: HANDOFF.reader(),
            to_worker_tx,
            worker: Some(worker),
        }
    }
}

impl SampleSource for SimAdc {
    fn wait_block(&mut self) -> RawSensorBlock {
        self.reader.wait_block()
    }
}

impl Drop for SimAdc {
    fn drop(&mut self) {
        let _ = self.to_worker_tx.send(AcquisitionCommand::Stop);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Magnetometer reporting a fixed field at its own output rate
pub struct SimMag {
    counts: MagCounts,
    period: Duration,
    last_read: Instant,
}

impl SimMag {
    pub fn new(counts: MagCounts, rate_hz: u32) -> Self {
        Self {
            counts,
            period: Duration::from_millis(1000 / u64::from(rate_hz.max(1))),
            last_read: Instant::now(),
        }
    }
}

impl Magnetometer for SimMag {
    fn new_data_available(&mut self) -> bool {
        self.last_read.elapsed() >= self.period
    }

    fn read_mag(&mut self) -> MagCounts {
        self.last_read = Instant::now();
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_frame_reads_gravity() {
        let mut model = SensorModel::new(0.0, Vector3d::new(200.0, 0.0, 400.0), 0);
        let frame = model.adc_frame();
        let accel = accel_calibration();
        let z = accel.apply(&Vector3d::new(0.0, 0.0, f32::from(frame[4])));
        assert!((z.z + GRAVITY).abs() < 0.01, "Z should read -g, got {}", z.z);
        assert_eq!(frame[1], 2048, "Gyro should sit at zero rate");
    }

    #[test]
    fn test_noise_is_bounded() {
        let mut model = SensorModel::new(0.0, Vector3d::new(200.0, 0.0, 400.0), 3);
        for _ in 0..1000 {
            let frame = model.adc_frame();
            assert!((2045..=2051).contains(&frame[1]), "Noise out of range: {}", frame[1]);
        }
    }

    #[test]
    fn test_mag_counts_follow_mounting() {
        let model = SensorModel::new(0.0, Vector3d::new(200.0, 0.0, 400.0), 0);
        assert_eq!(model.mag_counts(), [0, -200, -400]);

        let east = SensorModel::new(90.0, Vector3d::new(200.0, 0.0, 400.0), 0);
        assert_eq!(east.mag_counts(), [200, 0, -400], "Facing east the field is on the left");
    }
}
