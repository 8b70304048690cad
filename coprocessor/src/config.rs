use crate::error::{config_error, CoprocessorResult};
use crate::fusion::Algorithm;
use crate::sensors::CalibrationParams;
use hal::MAX_OVERSAMPLING;

/// Static configuration of the coprocessor
#[derive(Debug, Clone)]
pub struct CoprocessorConfig {
    /// ADC frame rate in Hz
    pub adc_sample_rate: u32,

    /// Frames averaged into one estimation cycle
    pub adc_oversampling: usize,

    /// Cycles averaged by a measured calibration
    pub calibration_samples: u32,

    /// Hardware tick counter frequency in Hz
    pub timer_rate: u32,

    /// Calibration installed at start-up
    pub accel_calibration: CalibrationParams,
    pub gyro_calibration: CalibrationParams,
    pub mag_calibration: CalibrationParams,

    /// Position/velocity noise when a perfect GPS fix is fused
    pub tight_pos_vel_variance: f32,

    /// Position/velocity noise for the zero-velocity fallback
    pub loose_pos_vel_variance: f32,

    pub initial_algorithm: Algorithm,
}

impl Default for CoprocessorConfig {
    fn default() -> Self {
        CoprocessorConfig {
            adc_sample_rate: 2000,
            adc_oversampling: 25,
            calibration_samples: 250,
            timer_rate: 1_000_000,
            accel_calibration: CalibrationParams::new(
                [0.012, 0.012, -0.012],
                [24.0, 24.0, -24.0],
                [1e-4; 3],
            ),
            gyro_calibration: CalibrationParams::new([-0.014, 0.014, -0.014], [-24.0; 3], [1.0; 3]),
            mag_calibration: CalibrationParams::new([1.0; 3], [0.0; 3], [1.0; 3]),
            tight_pos_vel_variance: 0.004,
            loose_pos_vel_variance: 0.1,
            initial_algorithm: Algorithm::Full,
        }
    }
}

impl CoprocessorConfig {
    /// Estimation cycles per second
    pub fn ekf_rate(&self) -> u32 {
        self.adc_sample_rate / self.adc_oversampling.max(1) as u32
    }

    /// Fixed prediction step in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.ekf_rate().max(1) as f32
    }

    pub fn validate(&self) -> CoprocessorResult<()> {
        if self.adc_oversampling == 0 || self.adc_oversampling > MAX_OVERSAMPLING {
            return Err(config_error(
                format!(
                    "oversampling must be within 1..={}, got {}",
                    MAX_OVERSAMPLING, self.adc_oversampling
                ),
                "adc_oversampling",
            ));
        }
        if self.ekf_rate() == 0 {
            return Err(config_error(
                format!(
                    "sample rate {} Hz is below one cycle per second",
                    self.adc_sample_rate
                ),
                "adc_sample_rate",
            ));
        }
        if self.calibration_samples == 0 {
            return Err(config_error("calibration needs at least one sample", "calibration_samples"));
        }
        // Load times are reported in 100 us units
        if self.timer_rate < 10_000 {
            return Err(config_error(
                format!("timer rate must be at least 10 kHz, got {}", self.timer_rate),
                "timer_rate",
            ));
        }

        let variances = [
            ("tight_pos_vel_variance", self.tight_pos_vel_variance),
            ("loose_pos_vel_variance", self.loose_pos_vel_variance),
        ];
        for (name, value) in variances {
            if !value.is_finite() || value <= 0.0 {
                return Err(config_error(
                    format!("{} must be finite and positive, got {}", name, value),
                    name,
                ));
            }
        }

        let calibrations = [
            ("accel_calibration", &self.accel_calibration),
            ("gyro_calibration", &self.gyro_calibration),
            ("mag_calibration", &self.mag_calibration),
        ];
        for (name, params) in calibrations {
            let finite = params.scale.iter().all(|v| v.is_finite())
                && params.bias.iter().all(|v| v.is_finite())
                && params.variance.iter().all(|v| v.is_finite() && *v >= 0.0);
            if !finite {
                return Err(config_error(
                    "calibration values must be finite with non-negative variance",
                    name,
                ));
            }
        }
        Ok(())
    }
}
