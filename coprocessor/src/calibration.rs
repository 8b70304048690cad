use crate::error::CalibrationError;
use hal::Vector3d;
use nalgebra::Vector3;

/// Mean and variance of one sensor over a calibration run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStatistics {
    pub bias: Vector3d,
    pub variance: Vector3d,
}

/// Result of a calibration run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSet {
    pub accel: AxisStatistics,
    pub gyro: AxisStatistics,
    /// `None` when the magnetometer never reported during the run
    pub mag: Option<AxisStatistics>,
    /// Cycles averaged for accel and gyro
    pub samples: u32,
    /// Magnetometer readings averaged
    pub mag_samples: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunningMoments {
    count: u32,
    sum: Vector3<f64>,
    sum_sq: Vector3<f64>,
}

impl RunningMoments {
    fn add(&mut self, value: &Vector3d) {
        let value = value.cast::<f64>();
        self.count += 1;
        self.sum += value;
        self.sum_sq += value.component_mul(&value);
    }

    fn statistics(&self) -> Option<AxisStatistics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        // Population variance. Only the f64 rounding residue of a constant
        // signal can go below zero, that is clamped
        let variance = (self.sum_sq / n - mean.component_mul(&mean)).map(|v| v.max(0.0));
        Some(AxisStatistics {
            bias: mean.cast::<f32>(),
            variance: variance.cast::<f32>(),
        })
    }
}

/// Per-axis sum and sum of squares for a stationary calibration
#[derive(Debug, Default, Clone)]
pub struct CalibrationAccumulator {
    accel: RunningMoments,
    gyro: RunningMoments,
    mag: RunningMoments,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_inertial(&mut self, accel: &Vector3d, gyro: &Vector3d) {
        self.accel.add(accel);
        self.gyro.add(gyro);
    }

    pub fn add_magnetometer(&mut self, mag: &Vector3d) {
        self.mag.add(mag);
    }

    pub fn samples(&self) -> u32 {
        self.accel.count
    }

    pub fn mag_samples(&self) -> u32 {
        self.mag.count
    }

    /// `bias = sum / n`, `variance = sum_sq / n - bias^2`
    pub fn finish(&self) -> Result<CalibrationSet, CalibrationError> {
        let (Some(accel), Some(gyro)) = (self.accel.statistics(), self.gyro.statistics()) else {
            return Err(CalibrationError::NoSamples);
        };
        Ok(CalibrationSet {
            accel,
            gyro,
            mag: self.mag.statistics(),
            samples: self.accel.count,
            mag_samples: self.mag.count,
        })
    }
}
