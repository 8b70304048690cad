use crate::error::{config_error, CoprocessorResult};
use crate::sensors::SensorState;
use hal::{RawSensorBlock, Vector3d, MAX_OVERSAMPLING};
use heapless::Vec;

/// ADC channels of the accelerometer X, Y and Z axes
pub const ACCEL_CHANNELS: [usize; 3] = [2, 0, 4];

/// ADC channels of the gyroscope X, Y and Z axes
pub const GYRO_CHANNELS: [usize; 3] = [1, 3, 5];

/// ADC channels of the gyro XY and Z temperature sensors
pub const TEMPERATURE_CHANNELS: [usize; 2] = [6, 7];

/// Integer FIR decimator. The output is the weighted tap sum divided by the
/// coefficient sum.
#[derive(Debug, Clone, PartialEq)]
pub struct FirFilter {
    coefficients: Vec<i16, MAX_OVERSAMPLING>,
    divisor: i64,
}

impl FirFilter {
    /// Equal-weight moving average over `taps` frames
    pub fn boxcar(taps: usize) -> CoprocessorResult<Self> {
        if taps == 0 || taps > MAX_OVERSAMPLING {
            return Err(config_error(
                format!("boxcar length must be within 1..={}, got {}", MAX_OVERSAMPLING, taps),
                "fir_coefficients",
            ));
        }
        let mut coefficients = Vec::new();
        coefficients.resize(taps, 1).map_err(|_| {
            config_error("boxcar length exceeds tap storage", "fir_coefficients")
        })?;
        Ok(FirFilter {
            coefficients,
            divisor: taps as i64,
        })
    }

    pub fn new(coefficients: &[i16]) -> CoprocessorResult<Self> {
        let coefficients: Vec<i16, MAX_OVERSAMPLING> = Vec::from_slice(coefficients)
            .map_err(|_| {
                config_error(
                    format!("at most {} FIR taps are supported", MAX_OVERSAMPLING),
                    "fir_coefficients",
                )
            })?;
        let divisor: i64 = coefficients.iter().map(|c| *c as i64).sum();
        if divisor == 0 {
            return Err(config_error("FIR coefficients must not sum to zero", "fir_coefficients"));
        }
        Ok(FirFilter {
            coefficients,
            divisor,
        })
    }

    pub fn taps(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[i16] {
        &self.coefficients
    }

    /// Filter one channel of the block, in ADC ticks
    pub fn apply(&self, block: &RawSensorBlock, channel: usize) -> f32 {
        let sum: i64 = block
            .frames()
            .iter()
            .zip(self.coefficients.iter())
            .map(|(frame, coeff)| frame[channel] as i64 * *coeff as i64)
            .sum();
        sum as f32 / self.divisor as f32
    }
}

/// One filtered, calibrated inertial sample
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InertialSample {
    pub accel: Vector3d,
    pub gyro: Vector3d,
}

/// Turns each raw block into one calibrated accel/gyro sample
#[derive(Debug, Clone)]
pub struct Downsampler {
    filter: FirFilter,
}

impl Downsampler {
    pub fn new(filter: FirFilter) -> Self {
        Downsampler { filter }
    }

    pub fn filter(&self) -> &FirFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FirFilter) {
        self.filter = filter;
    }

    /// Filter every axis, apply the live calibration and store the result in
    /// `sensors`. The first frame of the block is kept as the raw snapshot.
    pub fn downsample(&self, block: &RawSensorBlock, sensors: &mut SensorState) -> InertialSample {
        if let Some(first) = block.frames().first() {
            sensors.accel.raw = ACCEL_CHANNELS.map(|ch| first[ch]);
            sensors.gyro.raw = GYRO_CHANNELS.map(|ch| first[ch]);
            sensors.gyro_temperature = TEMPERATURE_CHANNELS.map(|ch| first[ch]);
        }

        let accel = Vector3d::from(ACCEL_CHANNELS.map(|ch| self.filter.apply(block, ch)));
        let gyro = Vector3d::from(GYRO_CHANNELS.map(|ch| self.filter.apply(block, ch)));

        sensors.accel.filtered = sensors.accel.calibration.apply(&accel);
        sensors.gyro.filtered = sensors.gyro.calibration.apply(&gyro);

        InertialSample {
            accel: sensors.accel.filtered,
            gyro: sensors.gyro.filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::CalibrationParams;
    use approx::assert_relative_eq;
    use hal::AdcFrame;

    fn identity_state() -> SensorState {
        SensorState::new(
            CalibrationParams::default(),
            CalibrationParams::default(),
            CalibrationParams::default(),
        )
    }

    #[test]
    fn test_boxcar_is_arithmetic_mean() {
        let frames: [AdcFrame; 4] = [
            [10, 100, 1000, 0, 7, 0, 0, 0],
            [20, 200, 2000, 0, 7, 0, 0, 0],
            [30, 300, 3000, 0, 7, 0, 0, 0],
            [40, 400, 4000, 0, 7, 0, 0, 0],
        ];
        let block = RawSensorBlock::from_frames(1, &frames);
        let filter = FirFilter::boxcar(4).expect("valid length");
        assert_relative_eq!(filter.apply(&block, 0), 25.0);
        assert_relative_eq!(filter.apply(&block, 1), 250.0);
        assert_relative_eq!(filter.apply(&block, 2), 2500.0);
        assert_relative_eq!(filter.apply(&block, 4), 7.0);
    }

    #[test]
    fn test_constant_block_is_scaled_and_biased() {
        let frame: AdcFrame = [500, 600, 400, 700, 300, 800, 11, 12];
        let block = RawSensorBlock::filled(3, frame, 25);
        let downsampler = Downsampler::new(FirFilter::boxcar(25).expect("valid length"));

        let mut state = identity_state();
        state.accel.calibration = CalibrationParams::new([0.5; 3], [1.0, 2.0, 3.0], [0.0; 3]);
        state.gyro.calibration = CalibrationParams::new([2.0; 3], [-1.0; 3], [0.0; 3]);

        let sample = downsampler.downsample(&block, &mut state);
        // accel x/y/z are channels 2/0/4
        assert_relative_eq!(sample.accel, Vector3d::new(201.0, 252.0, 153.0), epsilon = 1e-3);
        // gyro x/y/z are channels 1/3/5
        assert_relative_eq!(sample.gyro, Vector3d::new(1199.0, 1399.0, 1599.0), epsilon = 1e-3);
        assert_eq!(state.accel.filtered, sample.accel);
        assert_eq!(state.accel.raw, [400, 500, 300]);
        assert_eq!(state.gyro.raw, [600, 700, 800]);
        assert_eq!(state.gyro_temperature, [11, 12]);
    }

    #[test]
    fn test_general_fir_divides_by_coefficient_sum() {
        let frames: [AdcFrame; 3] = [[10; 8], [20; 8], [40; 8]];
        let block = RawSensorBlock::from_frames(0, &frames);
        let filter = FirFilter::new(&[1, 2, 1]).expect("valid taps");
        assert_eq!(filter.taps(), 3);
        // (10 + 40 + 40) / 4
        assert_relative_eq!(filter.apply(&block, 5), 22.5);
    }

    #[test]
    fn test_full_scale_ticks_do_not_overflow() {
        let block = RawSensorBlock::filled(0, [u16::MAX; 8], MAX_OVERSAMPLING);
        let filter = FirFilter::new(&[i16::MAX; MAX_OVERSAMPLING]).expect("valid taps");
        assert_relative_eq!(filter.apply(&block, 0), u16::MAX as f32, max_relative = 1e-6);
    }

    #[test]
    fn test_rejects_invalid_filters() {
        assert!(FirFilter::boxcar(0).is_err(), "empty boxcar must be rejected");
        assert!(FirFilter::boxcar(MAX_OVERSAMPLING + 1).is_err());
        assert!(FirFilter::new(&[1; MAX_OVERSAMPLING + 1]).is_err());
        assert!(FirFilter::new(&[1, -1]).is_err(), "zero divisor must be rejected");
    }
}
