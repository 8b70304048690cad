use thiserror::Error;

/// Failures of the stationary calibration run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration was asked to average over zero cycles
    #[error("calibration requested with zero samples")]
    NoSamples,

    /// The magnetometer never reported new data during the run.
    ///
    /// Accelerometer and gyroscope results are still committed.
    #[error("no magnetometer samples during {cycles} calibration cycles")]
    NoMagnetometerSamples {
        /// Number of cycles the run lasted
        cycles: u32,
    },
}

/// Primary error type for the coprocessor crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoprocessorError {
    /// Invalid configuration value
    #[error("Configuration error in {parameter}: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
        /// Configuration parameter that caused the error
        parameter: &'static str,
    },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

pub(crate) fn config_error(message: impl Into<String>, parameter: &'static str) -> CoprocessorError {
    CoprocessorError::Configuration {
        message: message.into(),
        parameter,
    }
}

/// Type alias for Result with CoprocessorError
pub type CoprocessorResult<T> = Result<T, CoprocessorError>;
