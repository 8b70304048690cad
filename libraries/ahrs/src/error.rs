use std::fmt;
use thiserror::Error;

/// Why an estimator call was refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AhrsError {
    /// A measurement could not be fused and was dropped
    #[error("{sensor} measurement rejected: {reason}")]
    RejectedMeasurement {
        sensor: SensorType,
        reason: String,
    },

    /// The integration step is zero, negative or not a number
    #[error("Invalid time step {dt}")]
    InvalidTimeStep { dt: f32 },

    /// A sequential update met a non-positive innovation variance
    #[error("Ill-conditioned update: {message} ({detail})")]
    IllConditioned { message: String, detail: String },

    /// The filter state left the finite range, the step was not applied
    #[error("Estimate diverged in {step}")]
    Diverged { step: &'static str },

    #[error("Configuration error in {parameter}: {message}")]
    Configuration {
        message: String,
        parameter: &'static str,
    },
}

/// Source of a rejected measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    /// Accelerometer and gyroscope
    Inertial,
    Gps,
    Barometer,
    Magnetometer,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorType::Inertial => "Inertial",
            SensorType::Gps => "GPS",
            SensorType::Barometer => "Barometer",
            SensorType::Magnetometer => "Magnetometer",
        };
        f.write_str(name)
    }
}

pub mod helpers {
    use super::*;

    pub fn rejected(sensor: SensorType, reason: impl Into<String>) -> AhrsError {
        AhrsError::RejectedMeasurement {
            sensor,
            reason: reason.into(),
        }
    }

    pub fn ill_conditioned(message: impl Into<String>, detail: impl fmt::Display) -> AhrsError {
        AhrsError::IllConditioned {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    pub fn config_error(message: impl Into<String>, parameter: &'static str) -> AhrsError {
        AhrsError::Configuration {
            message: message.into(),
            parameter,
        }
    }

    /// Reject measurements containing NaN or infinite components
    pub fn check_finite(
        vec: &nalgebra::Vector3<f32>,
        name: &str,
        sensor: SensorType,
    ) -> Result<(), AhrsError> {
        if vec.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(rejected(sensor, format!("{} is not finite", name)))
        }
    }

    pub fn check_time_step(dt: f32) -> Result<(), AhrsError> {
        if dt.is_finite() && dt > 0.0 {
            Ok(())
        } else {
            Err(AhrsError::InvalidTimeStep { dt })
        }
    }
}

pub type AhrsResult<T> = Result<T, AhrsError>;
