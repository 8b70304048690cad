use hal::{MagCounts, Vector3d};

/// Per-axis linear calibration, `value = raw * scale + bias`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParams {
    pub bias: Vector3d,
    pub scale: Vector3d,
    /// Measurement noise handed to the estimator
    pub variance: Vector3d,
}

impl CalibrationParams {
    pub fn new(scale: [f32; 3], bias: [f32; 3], variance: [f32; 3]) -> Self {
        CalibrationParams {
            bias: Vector3d::from(bias),
            scale: Vector3d::from(scale),
            variance: Vector3d::from(variance),
        }
    }

    pub fn apply(&self, raw: &Vector3d) -> Vector3d {
        raw.component_mul(&self.scale) + self.bias
    }

    /// Zero bias and variance, keep the scale
    pub fn clear_offsets(&mut self) {
        self.bias = Vector3d::zeros();
        self.variance = Vector3d::zeros();
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        CalibrationParams::new([1.0; 3], [0.0; 3], [1.0; 3])
    }
}

/// A sensor with its last raw reading, calibrated value and calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedSensor<R> {
    pub raw: R,
    /// Filtered (accel, gyro) or scaled (mag) value
    pub filtered: Vector3d,
    pub calibration: CalibrationParams,
}

impl<R: Default> CalibratedSensor<R> {
    pub fn new(calibration: CalibrationParams) -> Self {
        CalibratedSensor {
            raw: R::default(),
            filtered: Vector3d::zeros(),
            calibration,
        }
    }
}

/// Accelerometer or gyroscope, raw values are ADC ticks in body axis order
pub type InertialSensor = CalibratedSensor<[u16; 3]>;

/// Magnetometer, raw values are chip counts in chip axis order
pub type MagSensor = CalibratedSensor<MagCounts>;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AltitudeSample {
    /// Meters, positive up
    pub altitude: f32,
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsSample {
    /// Position in NED frame in meters
    pub ned: Vector3d,
    /// Degrees from north
    pub heading: f32,
    /// Meters per second
    pub groundspeed: f32,
    /// -1 until the first fix, otherwise 0..1
    pub quality: f32,
    pub updated: bool,
}

impl GpsSample {
    pub const NEVER_SEEN: f32 = -1.0;
}

impl Default for GpsSample {
    fn default() -> Self {
        GpsSample {
            ned: Vector3d::zeros(),
            heading: 0.0,
            groundspeed: 0.0,
            quality: GpsSample::NEVER_SEEN,
            updated: false,
        }
    }
}

/// Externally visible attitude, scalar-first quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeEstimate {
    pub quaternion: [f32; 4],
}

impl Default for AttitudeEstimate {
    fn default() -> Self {
        AttitudeEstimate {
            quaternion: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// All sensor and estimate state owned by the estimation loop
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub accel: InertialSensor,
    pub gyro: InertialSensor,
    /// Gyro XY and Z temperature ticks
    pub gyro_temperature: [u16; 2],
    pub mag: MagSensor,
    pub mag_updated: bool,
    pub altitude: AltitudeSample,
    pub gps: GpsSample,
    pub attitude: AttitudeEstimate,
}

impl SensorState {
    pub fn new(accel: CalibrationParams, gyro: CalibrationParams, mag: CalibrationParams) -> Self {
        SensorState {
            accel: InertialSensor::new(accel),
            gyro: InertialSensor::new(gyro),
            gyro_temperature: [0; 2],
            mag: MagSensor::new(mag),
            mag_updated: false,
            altitude: AltitudeSample::default(),
            gps: GpsSample::default(),
            attitude: AttitudeEstimate::default(),
        }
    }

    /// Store a fresh magnetometer reading and mark it pending
    pub fn update_mag(&mut self, raw: MagCounts) {
        self.mag.raw = raw;
        let counts = Vector3d::new(raw[0] as f32, raw[1] as f32, raw[2] as f32);
        self.mag.filtered = self.mag.calibration.apply(&counts);
        self.mag_updated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_scale_then_bias() {
        let params = CalibrationParams::new([2.0, -1.0, 0.5], [1.0, 1.0, -1.0], [0.0; 3]);
        let value = params.apply(&Vector3d::new(10.0, 10.0, 10.0));
        assert_eq!(value, Vector3d::new(21.0, -9.0, 4.0));
    }

    #[test]
    fn test_clear_offsets_keeps_scale() {
        let mut params = CalibrationParams::new([0.012, 0.012, -0.012], [24.0; 3], [1e-4; 3]);
        params.clear_offsets();
        assert_eq!(params.scale, Vector3d::new(0.012, 0.012, -0.012));
        assert_eq!(params.bias, Vector3d::zeros());
        assert_eq!(params.variance, Vector3d::zeros());
    }

    #[test]
    fn test_update_mag_marks_pending() {
        let mut state = SensorState::new(
            CalibrationParams::default(),
            CalibrationParams::default(),
            CalibrationParams::new([1.0; 3], [5.0, 0.0, 0.0], [1.0; 3]),
        );
        assert!(!state.mag_updated);
        state.update_mag([100, -20, 3]);
        assert!(state.mag_updated, "fresh mag data should be pending");
        assert_eq!(state.mag.raw, [100, -20, 3]);
        assert_eq!(state.mag.filtered, Vector3d::new(105.0, -20.0, 3.0));
    }

    #[test]
    fn test_gps_starts_never_seen() {
        let gps = GpsSample::default();
        assert_eq!(gps.quality, GpsSample::NEVER_SEEN);
        assert!(!gps.updated);
    }
}
