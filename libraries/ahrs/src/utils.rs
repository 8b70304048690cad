use nalgebra as na;
use core::f32::consts::PI;

/// Convert degrees to radians
pub fn deg_to_rad(deg: f32) -> f32 {
    deg * PI / 180.0
}

/// Convert radians to degrees
pub fn rad_to_deg(rad: f32) -> f32 {
    rad * 180.0 / PI
}

/// Convert roll, pitch, yaw in degrees to a quaternion `[q1, q2, q3, q4]`
/// with the scalar part first.
///
/// Rotation order is yaw, then pitch, then roll. The result always has a
/// non-negative scalar part.
pub fn rpy_to_quaternion(rpy_deg: [f32; 3]) -> [f32; 4] {
    let half_roll = deg_to_rad(rpy_deg[0]) / 2.0;
    let half_pitch = deg_to_rad(rpy_deg[1]) / 2.0;
    let half_yaw = deg_to_rad(rpy_deg[2]) / 2.0;

    let (sr, cr) = half_roll.sin_cos();
    let (sp, cp) = half_pitch.sin_cos();
    let (sy, cy) = half_yaw.sin_cos();

    let q = [
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    ];

    if q[0] < 0.0 {
        [-q[0], -q[1], -q[2], -q[3]]
    } else {
        q
    }
}

/// Scalar-first components of a unit quaternion
pub fn quaternion_components(q: &na::UnitQuaternion<f32>) -> [f32; 4] {
    [q.w, q.i, q.j, q.k]
}

/// Roll, pitch, yaw in radians of a scalar-first quaternion
pub fn quaternion_to_euler(q: [f32; 4]) -> (f32, f32, f32) {
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(q[0], q[1], q[2], q[3]))
        .euler_angles()
}

/// Create a skew-symmetric matrix from a 3D vector
pub fn skew_symmetric(v: &na::Vector3<f32>) -> na::Matrix3<f32> {
    na::Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}
