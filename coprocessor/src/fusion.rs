use crate::sensors::{GpsSample, SensorState};
use ahrs::utils::{deg_to_rad, rad_to_deg, rpy_to_quaternion};
use ahrs::{AhrsResult, InsEstimator};
use hal::{MagCounts, Vector3d};

/// Attitude estimation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// Inertial + GPS + magnetometer + baro estimator
    Full = 0,
    /// Trigonometric attitude from accel and mag
    Simple = 1,
}

impl Algorithm {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Algorithm::Full),
            1 => Some(Algorithm::Simple),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Algorithm selection, written by the dispatcher and applied only at the
/// start of a cycle
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmCell {
    active: Algorithm,
    requested: Option<Algorithm>,
}

impl AlgorithmCell {
    pub fn new(algorithm: Algorithm) -> Self {
        AlgorithmCell {
            active: algorithm,
            requested: None,
        }
    }

    pub fn active(&self) -> Algorithm {
        self.active
    }

    pub fn request(&mut self, algorithm: Algorithm) {
        self.requested = Some(algorithm);
    }

    /// Apply a pending request. Returns the new algorithm if it changed.
    pub fn commit(&mut self) -> Option<Algorithm> {
        let requested = self.requested.take()?;
        if requested == self.active {
            return None;
        }
        self.active = requested;
        Some(requested)
    }
}

/// Correction applied by the full estimator in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionBranch {
    /// Magnetometer, GPS position/velocity and altitude
    Full,
    MagOnly,
    /// Zero velocity and altitude, the indoor fallback
    VelocityBaro,
}

/// Pick the correction for this cycle.
///
/// Only a fresh fix of quality exactly 1 enables the full correction. Any
/// GPS quality other than "never seen" counts as outdoors for the
/// magnetometer.
#[allow(clippy::float_cmp)]
pub fn select_branch(gps: &GpsSample, mag_updated: bool) -> CorrectionBranch {
    if gps.updated && gps.quality == 1.0 {
        CorrectionBranch::Full
    } else if gps.quality != GpsSample::NEVER_SEEN && mag_updated {
        CorrectionBranch::MagOnly
    } else {
        CorrectionBranch::VelocityBaro
    }
}

/// Chip axes (left, backward, up) to body axes (forward, right, down)
pub fn mag_to_body(scaled: &Vector3d) -> Vector3d {
    Vector3d::new(-scaled.y, -scaled.x, -scaled.z)
}

/// NED velocity from groundspeed and heading in degrees
pub fn gps_velocity(gps: &GpsSample) -> Vector3d {
    let heading = deg_to_rad(gps.heading);
    Vector3d::new(
        gps.groundspeed * heading.cos(),
        gps.groundspeed * heading.sin(),
        0.0,
    )
}

/// Attitude from the accelerometer and raw magnetometer counts
pub fn simple_attitude(accel: &Vector3d, mag_raw: &MagCounts) -> [f32; 4] {
    let yaw = rad_to_deg((mag_raw[0] as f32).atan2(-(mag_raw[1] as f32)));
    let pitch = rad_to_deg(accel.x.atan2(accel.z));
    let roll = rad_to_deg(accel.y.atan2(accel.z));
    rpy_to_quaternion([roll, pitch, yaw])
}

/// Noise bounds for the GPS-driven corrections
#[derive(Debug, Clone, Copy)]
pub struct PosVelNoise {
    pub tight: f32,
    pub loose: f32,
}

/// Run `branch` on the estimator and consume the sensor flags it uses.
///
/// Flags are cleared even if the estimator rejects the data.
pub fn apply_correction<E: InsEstimator>(
    estimator: &mut E,
    branch: CorrectionBranch,
    sensors: &mut SensorState,
    noise: PosVelNoise,
) -> AhrsResult<()> {
    let mag = mag_to_body(&sensors.mag.filtered);
    match branch {
        CorrectionBranch::Full => {
            let vel = gps_velocity(&sensors.gps);
            estimator.set_position_velocity_variance(noise.tight);
            let result =
                estimator.correct_full(&mag, &sensors.gps.ned, &vel, sensors.altitude.altitude);
            sensors.gps.updated = false;
            sensors.mag_updated = false;
            result
        }
        CorrectionBranch::MagOnly => {
            let result = estimator.correct_mag_only(&mag);
            sensors.mag_updated = false;
            result
        }
        CorrectionBranch::VelocityBaro => {
            estimator.set_position_velocity_variance(noise.loose);
            estimator.correct_vel_baro(&Vector3d::zeros(), sensors.altitude.altitude)
        }
    }
}

/// Counters of the fusion policy
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FusionStats {
    pub full_corrections: u32,
    pub mag_corrections: u32,
    pub velocity_baro_corrections: u32,
    /// Estimator calls that returned an error
    pub estimator_faults: u32,
}

impl FusionStats {
    pub fn record(&mut self, branch: CorrectionBranch) {
        let counter = match branch {
            CorrectionBranch::Full => &mut self.full_corrections,
            CorrectionBranch::MagOnly => &mut self.mag_corrections,
            CorrectionBranch::VelocityBaro => &mut self.velocity_baro_corrections,
        };
        *counter = counter.wrapping_add(1);
    }
}
