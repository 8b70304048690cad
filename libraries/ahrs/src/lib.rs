//! # AHRS - Attitude and Heading Reference System
//!
//! Estimator engine used by the attitude coprocessor.
//!
//! The coprocessor never touches filter internals. It drives the estimator
//! through the [`InsEstimator`] call contract: a state prediction from the
//! latest gyro/accel sample, a covariance prediction, and exactly one of three
//! correction steps per cycle. [`ekf::Ekf`] is the reference implementation.
//!
//! ## Platform Support
//!
//! - **desktop**: For desktop applications and SITL (Software In The Loop) simulation

use nalgebra as na;

pub mod ekf;
pub mod error;
pub mod utils;

pub use ekf::Ekf;
pub use error::{AhrsError, AhrsResult, SensorType};

/// Call contract of the inertial navigation estimator.
///
/// Vectors are in the body frame (forward, right, down) for sensor inputs and
/// in the NED frame for position and velocity.
pub trait InsEstimator {
    /// Reset state and covariance to their initial values
    fn init(&mut self);

    /// Propagate the nominal state with one gyro/accel sample
    fn predict_state(
        &mut self,
        gyro: &na::Vector3<f32>,
        accel: &na::Vector3<f32>,
        dt: f32,
    ) -> AhrsResult<()>;

    /// Propagate the state covariance
    fn predict_covariance(&mut self, dt: f32) -> AhrsResult<()>;

    /// Correct with magnetometer, GPS position, GPS velocity and altitude
    fn correct_full(
        &mut self,
        mag: &na::Vector3<f32>,
        ned: &na::Vector3<f32>,
        vel: &na::Vector3<f32>,
        altitude: f32,
    ) -> AhrsResult<()>;

    /// Correct heading with the magnetometer only
    fn correct_mag_only(&mut self, mag: &na::Vector3<f32>) -> AhrsResult<()>;

    /// Correct with an assumed velocity and the barometric altitude
    fn correct_vel_baro(&mut self, vel: &na::Vector3<f32>, altitude: f32) -> AhrsResult<()>;

    fn set_mag_variance(&mut self, variance: &na::Vector3<f32>);

    fn set_accel_variance(&mut self, variance: &na::Vector3<f32>);

    fn set_gyro_variance(&mut self, variance: &na::Vector3<f32>);

    fn set_gyro_bias(&mut self, bias: &na::Vector3<f32>);

    /// Measurement noise used for both GPS position and velocity
    fn set_position_velocity_variance(&mut self, variance: f32);

    /// Earth magnetic field vector in the NED frame
    fn set_magnetic_north(&mut self, field: &na::Vector3<f32>);

    /// Attitude quaternion, scalar first
    fn quaternion(&self) -> [f32; 4];

    /// Position in NED frame in meters
    fn position(&self) -> na::Vector3<f32>;

    /// Velocity in NED frame in meters per second
    fn velocity(&self) -> na::Vector3<f32>;
}

/// Configuration for the reference EKF
#[derive(Debug, Clone)]
pub struct EkfConfig {
    /// Gravitational acceleration in m/s^2, pointing down in NED
    pub gravity: f32,

    /// Process noise parameters
    pub process_noise: ProcessNoise,

    /// Variance of the barometric altitude measurement in m^2
    pub baro_variance: f32,

    /// Position/velocity measurement variance before any is set explicitly
    pub default_pos_vel_variance: f32,

    /// Initial diagonal of the error-state covariance
    pub initial_covariance: InitialCovariance,
}

/// Process noise configuration
#[derive(Debug, Clone)]
pub struct ProcessNoise {
    pub position_noise: f32,
    pub accel_noise: f32,
    pub gyro_noise: f32,
    pub gyro_bias_noise: f32,
}

/// Initial uncertainty of each error-state block
#[derive(Debug, Clone)]
pub struct InitialCovariance {
    pub position: f32,
    pub velocity: f32,
    pub attitude: f32,
    pub gyro_bias: f32,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            process_noise: ProcessNoise {
                position_noise: 1e-4,
                accel_noise: 1e-4,
                gyro_noise: 1e-5,
                gyro_bias_noise: 1e-7,
            },
            baro_variance: 1.0,
            default_pos_vel_variance: 0.1,
            initial_covariance: InitialCovariance {
                position: 100.0,
                velocity: 1.0,
                attitude: 0.1,
                gyro_bias: 1e-4,
            },
        }
    }
}

impl EkfConfig {
    /// Check that every noise and covariance term is finite and positive
    pub fn validate(&self) -> AhrsResult<()> {
        let terms = [
            ("gravity", self.gravity),
            ("process_noise.position_noise", self.process_noise.position_noise),
            ("process_noise.accel_noise", self.process_noise.accel_noise),
            ("process_noise.gyro_noise", self.process_noise.gyro_noise),
            ("process_noise.gyro_bias_noise", self.process_noise.gyro_bias_noise),
            ("baro_variance", self.baro_variance),
            ("default_pos_vel_variance", self.default_pos_vel_variance),
            ("initial_covariance.position", self.initial_covariance.position),
            ("initial_covariance.velocity", self.initial_covariance.velocity),
            ("initial_covariance.attitude", self.initial_covariance.attitude),
            ("initial_covariance.gyro_bias", self.initial_covariance.gyro_bias),
        ];

        for (name, value) in terms {
            if !value.is_finite() || value <= 0.0 {
                return Err(error::helpers::config_error(
                    format!("{} must be finite and positive, got {}", name, value),
                    name,
                ));
            }
        }
        Ok(())
    }
}
