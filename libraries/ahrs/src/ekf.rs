use crate::error::{helpers, AhrsError, AhrsResult, SensorType};
use crate::utils;
use crate::{EkfConfig, InsEstimator};
use nalgebra as na;

// Error state: position (3), velocity (3), attitude error (3), gyro bias (3)
const STATE_DIM: usize = 12;

type StateMatrix = na::SMatrix<f32, STATE_DIM, STATE_DIM>;
type StateVector = na::SVector<f32, STATE_DIM>;

/// One scalar row of a measurement update
#[derive(Debug, Clone, Copy)]
struct Measurement {
    /// Row of the measurement Jacobian
    h: StateVector,
    /// Measured minus predicted value
    residual: f32,
    /// Measurement noise variance
    noise: f32,
}

impl Measurement {
    fn selecting(index: usize, sign: f32, residual: f32, noise: f32) -> Self {
        let mut h = StateVector::zeros();
        h[index] = sign;
        Self { h, residual, noise }
    }
}

/// Error-state Extended Kalman Filter (EKF) implementation
pub struct Ekf {
    /// Configuration
    config: EkfConfig,

    /// Body to NED rotation
    attitude: na::UnitQuaternion<f32>,

    /// Position in NED frame (m)
    position: na::Vector3<f32>,

    /// Velocity in NED frame (m/s)
    velocity: na::Vector3<f32>,

    /// Gyroscope bias in body frame
    gyro_bias: na::Vector3<f32>,

    /// Error-state covariance matrix
    covariance: StateMatrix,

    accel_variance: na::Vector3<f32>,
    gyro_variance: na::Vector3<f32>,
    mag_variance: na::Vector3<f32>,
    pos_vel_variance: f32,

    /// Earth's magnetic field in NED frame (normalized)
    mag_north: na::Vector3<f32>,

    /// Bias-corrected angular rate of the last prediction
    last_gyro: na::Vector3<f32>,

    /// Specific force of the last prediction
    last_accel: na::Vector3<f32>,
}

impl Ekf {
    /// Create a new EKF instance
    pub fn new(config: EkfConfig) -> AhrsResult<Self> {
        config.validate()?;

        let mut ekf = Self {
            config,
            attitude: na::UnitQuaternion::identity(),
            position: na::Vector3::zeros(),
            velocity: na::Vector3::zeros(),
            gyro_bias: na::Vector3::zeros(),
            covariance: StateMatrix::identity(),
            accel_variance: na::Vector3::zeros(),
            gyro_variance: na::Vector3::zeros(),
            mag_variance: na::Vector3::zeros(),
            pos_vel_variance: 0.0,
            mag_north: na::Vector3::x(),
            last_gyro: na::Vector3::zeros(),
            last_accel: na::Vector3::zeros(),
        };
        ekf.init();
        Ok(ekf)
    }

    /// Current gyro bias estimate
    pub fn gyro_bias(&self) -> na::Vector3<f32> {
        self.gyro_bias
    }

    /// Attitude uncertainty in radians
    pub fn attitude_uncertainty(&self) -> f32 {
        self.covariance.fixed_view::<3, 3>(6, 6).trace().sqrt()
    }

    /// Check if the state contains only finite values
    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.gyro_bias.iter().all(|v| v.is_finite())
            && self.attitude.coords.iter().all(|v| v.is_finite())
    }

    fn mag_rows(&self, mag: &na::Vector3<f32>) -> AhrsResult<[Measurement; 3]> {
        helpers::check_finite(mag, "mag", SensorType::Magnetometer)?;
        let magnitude = mag.norm();
        if magnitude <= f32::EPSILON {
            return Err(helpers::rejected(
                SensorType::Magnetometer,
                "field vector has zero length",
            ));
        }

        let measured = mag / magnitude;
        let predicted = self.attitude.inverse() * self.mag_north;
        let jacobian = utils::skew_symmetric(&predicted);

        let row = |axis: usize| {
            let mut h = StateVector::zeros();
            for col in 0..3 {
                h[6 + col] = jacobian[(axis, col)];
            }
            Measurement {
                h,
                residual: measured[axis] - predicted[axis],
                // Variance is given in sensor units, the residual is normalized
                noise: (self.mag_variance[axis] / (magnitude * magnitude)).max(1e-6),
            }
        };

        Ok([row(0), row(1), row(2)])
    }

    fn position_rows(&self, ned: &na::Vector3<f32>) -> AhrsResult<[Measurement; 3]> {
        helpers::check_finite(ned, "NED", SensorType::Gps)?;
        let row = |axis: usize| {
            Measurement::selecting(
                axis,
                1.0,
                ned[axis] - self.position[axis],
                self.pos_vel_variance,
            )
        };
        Ok([row(0), row(1), row(2)])
    }

    fn velocity_rows(&self, vel: &na::Vector3<f32>) -> AhrsResult<[Measurement; 3]> {
        helpers::check_finite(vel, "velocity", SensorType::Gps)?;
        let row = |axis: usize| {
            Measurement::selecting(
                3 + axis,
                1.0,
                vel[axis] - self.velocity[axis],
                self.pos_vel_variance,
            )
        };
        Ok([row(0), row(1), row(2)])
    }

    fn altitude_row(&self, altitude: f32) -> AhrsResult<Measurement> {
        if !altitude.is_finite() {
            return Err(helpers::rejected(SensorType::Barometer, "altitude is not finite"));
        }
        // Altitude is positive up, NED down is positive down
        Ok(Measurement::selecting(
            2,
            -1.0,
            altitude + self.position.z,
            self.config.baro_variance,
        ))
    }

    /// Sequential scalar update.
    ///
    /// All residuals are taken about the prior state; the accumulated error
    /// state is injected once at the end.
    fn correct(&mut self, rows: impl IntoIterator<Item = Measurement>) -> AhrsResult<()> {
        let mut covariance = self.covariance;
        let mut dx = StateVector::zeros();

        for row in rows {
            let ph = covariance * row.h;
            let s = row.h.dot(&ph) + row.noise;
            if !s.is_finite() || s <= 0.0 {
                return Err(helpers::ill_conditioned(
                    "innovation variance is not positive",
                    format_args!("s = {}", s),
                ));
            }
            let gain = ph / s;
            let innovation = row.residual - row.h.dot(&dx);
            dx += gain * innovation;
            covariance -= gain * ph.transpose();
        }

        if dx.iter().any(|v| !v.is_finite()) {
            return Err(AhrsError::Diverged { step: "correction" });
        }

        self.position += dx.fixed_rows::<3>(0);
        self.velocity += dx.fixed_rows::<3>(3);
        let delta_angle: na::Vector3<f32> = dx.fixed_rows::<3>(6).into_owned();
        self.attitude *= na::UnitQuaternion::from_scaled_axis(delta_angle);
        self.gyro_bias += dx.fixed_rows::<3>(9);

        self.covariance = (covariance + covariance.transpose()) * 0.5;
        Ok(())
    }
}

impl InsEstimator for Ekf {
    fn init(&mut self) {
        let initial = &self.config.initial_covariance;
        let process = &self.config.process_noise;

        self.attitude = na::UnitQuaternion::identity();
        self.position = na::Vector3::zeros();
        self.velocity = na::Vector3::zeros();
        self.gyro_bias = na::Vector3::zeros();

        self.covariance = StateMatrix::zeros();
        for i in 0..3 {
            self.covariance[(i, i)] = initial.position;
            self.covariance[(i + 3, i + 3)] = initial.velocity;
            self.covariance[(i + 6, i + 6)] = initial.attitude;
            self.covariance[(i + 9, i + 9)] = initial.gyro_bias;
        }

        self.accel_variance = na::Vector3::repeat(process.accel_noise);
        self.gyro_variance = na::Vector3::repeat(process.gyro_noise);
        self.mag_variance = na::Vector3::repeat(1.0);
        self.pos_vel_variance = self.config.default_pos_vel_variance;
        self.last_gyro = na::Vector3::zeros();
        self.last_accel = na::Vector3::zeros();
    }

    fn predict_state(
        &mut self,
        gyro: &na::Vector3<f32>,
        accel: &na::Vector3<f32>,
        dt: f32,
    ) -> AhrsResult<()> {
        helpers::check_time_step(dt)?;
        helpers::check_finite(gyro, "gyro", SensorType::Inertial)?;
        helpers::check_finite(accel, "accel", SensorType::Inertial)?;

        let gyro_corrected = gyro - self.gyro_bias;

        // Accelerometer measures specific force, add gravity back in NED
        let accel_ned = self.attitude * accel + na::Vector3::new(0.0, 0.0, self.config.gravity);

        self.position += self.velocity * dt + accel_ned * (0.5 * dt * dt);
        self.velocity += accel_ned * dt;
        self.attitude *= na::UnitQuaternion::from_scaled_axis(gyro_corrected * dt);

        self.last_gyro = gyro_corrected;
        self.last_accel = *accel;
        Ok(())
    }

    fn predict_covariance(&mut self, dt: f32) -> AhrsResult<()> {
        helpers::check_time_step(dt)?;

        let rotation = self.attitude.to_rotation_matrix().into_inner();
        let identity = na::Matrix3::<f32>::identity();

        // State transition matrix (F)
        let mut f = StateMatrix::identity();
        f.fixed_view_mut::<3, 3>(0, 3).copy_from(&(identity * dt));
        f.fixed_view_mut::<3, 3>(3, 6)
            .copy_from(&(-rotation * utils::skew_symmetric(&self.last_accel) * dt));
        f.fixed_view_mut::<3, 3>(6, 6)
            .copy_from(&(identity - utils::skew_symmetric(&self.last_gyro) * dt));
        f.fixed_view_mut::<3, 3>(6, 9).copy_from(&(-identity * dt));

        let mut q = StateMatrix::zeros();
        for i in 0..3 {
            q[(i, i)] = self.config.process_noise.position_noise * dt;
            q[(i + 3, i + 3)] = self.accel_variance[i] * dt;
            q[(i + 6, i + 6)] = self.gyro_variance[i] * dt;
            q[(i + 9, i + 9)] = self.config.process_noise.gyro_bias_noise * dt;
        }

        // P = F*P*F' + Q
        self.covariance = f * self.covariance * f.transpose() + q;
        Ok(())
    }

    fn correct_full(
        &mut self,
        mag: &na::Vector3<f32>,
        ned: &na::Vector3<f32>,
        vel: &na::Vector3<f32>,
        altitude: f32,
    ) -> AhrsResult<()> {
        let mag_rows = self.mag_rows(mag)?;
        let position_rows = self.position_rows(ned)?;
        let velocity_rows = self.velocity_rows(vel)?;
        let altitude_row = self.altitude_row(altitude)?;

        self.correct(
            mag_rows
                .into_iter()
                .chain(position_rows)
                .chain(velocity_rows)
                .chain(core::iter::once(altitude_row)),
        )
    }

    fn correct_mag_only(&mut self, mag: &na::Vector3<f32>) -> AhrsResult<()> {
        let rows = self.mag_rows(mag)?;
        self.correct(rows)
    }

    fn correct_vel_baro(&mut self, vel: &na::Vector3<f32>, altitude: f32) -> AhrsResult<()> {
        let velocity_rows = self.velocity_rows(vel)?;
        let altitude_row = self.altitude_row(altitude)?;
        self.correct(velocity_rows.into_iter().chain(core::iter::once(altitude_row)))
    }

    fn set_mag_variance(&mut self, variance: &na::Vector3<f32>) {
        self.mag_variance = *variance;
    }

    fn set_accel_variance(&mut self, variance: &na::Vector3<f32>) {
        self.accel_variance = *variance;
    }

    fn set_gyro_variance(&mut self, variance: &na::Vector3<f32>) {
        self.gyro_variance = *variance;
    }

    fn set_gyro_bias(&mut self, bias: &na::Vector3<f32>) {
        self.gyro_bias = *bias;
    }

    fn set_position_velocity_variance(&mut self, variance: f32) {
        self.pos_vel_variance = variance;
    }

    fn set_magnetic_north(&mut self, field: &na::Vector3<f32>) {
        let magnitude = field.norm();
        if magnitude > f32::EPSILON && magnitude.is_finite() {
            self.mag_north = field / magnitude;
        }
    }

    fn quaternion(&self) -> [f32; 4] {
        utils::quaternion_components(&self.attitude)
    }

    fn position(&self) -> na::Vector3<f32> {
        self.position
    }

    fn velocity(&self) -> na::Vector3<f32> {
        self.velocity
    }
}
