use crate::load::LoadReport;
use crate::sensors::CalibrationParams;
use hal::{MagCounts, SerialNumber, Vector3d};

/// Calibration request mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationMode {
    /// Run a stationary calibration before the next cycle
    Measure,
    /// Install the given calibration immediately
    Set(CalibrationPayload),
}

/// Full calibration of the three sensors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPayload {
    pub accel: CalibrationParams,
    pub gyro: CalibrationParams,
    pub mag: CalibrationParams,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaroUpdate {
    pub altitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsUpdate {
    pub ned: Vector3d,
    pub heading: f32,
    pub groundspeed: f32,
    pub quality: f32,
}

/// Request received from the peer board
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkRequest {
    Reset { delay_ms: u32 },
    SerialQuery,
    AlgorithmSelect { id: u8 },
    /// Earth magnetic field in NED
    NorthSet { field: Vector3d },
    Calibration { mode: CalibrationMode },
    RawAttitudeQuery,
    /// New baro/GPS data, present only when updated on the peer
    PeriodicUpdate {
        baro: Option<BaroUpdate>,
        gps: Option<GpsUpdate>,
    },
    /// A message kind this firmware does not know
    Unknown(u8),
}

/// Variances in effect after a calibration request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationVariances {
    pub accel: Vector3d,
    pub gyro: Vector3d,
    pub mag: Vector3d,
}

/// Diagnostic snapshot of one raw frame and the filtered values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawAttitude {
    /// Accel X, Y, Z ticks from channels 2, 0, 4, the same map the
    /// downsampler uses. Older firmware sent channels 0, 2, 4 here.
    pub accel_raw: [u16; 3],
    pub accel_filtered: Vector3d,
    pub gyro_raw: [u16; 3],
    pub gyro_filtered: Vector3d,
    /// Gyro XY and Z temperature ticks
    pub gyro_temperature: [u16; 2],
    pub mag_raw: MagCounts,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicReport {
    pub quaternion: [f32; 4],
    pub ned: Vector3d,
    pub velocity: Vector3d,
    pub load: LoadReport,
}

/// Response sent back to the peer board
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkResponse {
    Serial { serial: SerialNumber },
    AlgorithmAck { id: u8 },
    NorthAck { field: Vector3d },
    CalibrationResult { variances: CalibrationVariances },
    RawAttitudeDump(RawAttitude),
    PeriodicResult(PeriodicReport),
}
