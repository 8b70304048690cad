mod acquisition;
mod board;
mod calibration;
mod config;
mod coprocessor;
mod downsample;
mod error;
mod fusion;
pub mod link;
mod load;
#[cfg(test)]
mod mock;
mod sensors;

pub use acquisition::{HandoffReader, RawBlockHandoff};
pub use board::{Board, Resources};
pub use calibration::{AxisStatistics, CalibrationAccumulator, CalibrationSet};
pub use config::CoprocessorConfig;
pub use coprocessor::{Coprocessor, CycleReport};
pub use downsample::{Downsampler, FirFilter, InertialSample};
pub use error::{CalibrationError, CoprocessorError, CoprocessorResult};
pub use fusion::{Algorithm, AlgorithmCell, CorrectionBranch, FusionStats};
pub use load::{LoadMonitor, LoadReport};
pub use sensors::{
    AltitudeSample, AttitudeEstimate, CalibratedSensor, CalibrationParams, GpsSample, SensorState,
};
