use super::message::{
    CalibrationMode, CalibrationVariances, LinkRequest, LinkResponse, PeriodicReport, RawAttitude,
};
use crate::fusion::{Algorithm, AlgorithmCell};
use crate::load::LoadReport;
use crate::sensors::{AltitudeSample, GpsSample, SensorState};
use ahrs::InsEstimator;
use hal::{SystemControl, Vector3d};
use log::{debug, info, warn};

/// State the dispatcher may read and write while handling one request
pub struct DispatchContext<'a, E, S> {
    pub sensors: &'a mut SensorState,
    pub estimator: &'a mut E,
    pub algorithm: &'a mut AlgorithmCell,
    pub calibration_pending: &'a mut bool,
    pub load: LoadReport,
    pub system: &'a mut S,
}

/// Magnetometer variance reordered from chip to body axes
pub(crate) fn mag_variance_body(variance: &Vector3d) -> Vector3d {
    Vector3d::new(variance.y, variance.x, variance.z)
}

fn variances(sensors: &SensorState) -> CalibrationVariances {
    CalibrationVariances {
        accel: sensors.accel.calibration.variance,
        gyro: sensors.gyro.calibration.variance,
        mag: sensors.mag.calibration.variance,
    }
}

/// Handle one request. Returns the response to queue, if any.
pub fn dispatch<E: InsEstimator, S: SystemControl>(
    request: &LinkRequest,
    ctx: &mut DispatchContext<'_, E, S>,
) -> Option<LinkResponse> {
    match *request {
        LinkRequest::Reset { delay_ms } => {
            warn!("Reset requested by peer in {} ms", delay_ms);
            ctx.system.delay_ms(delay_ms);
            ctx.system.reset();
            None
        }
        LinkRequest::SerialQuery => Some(LinkResponse::Serial {
            serial: ctx.system.serial_number(),
        }),
        LinkRequest::AlgorithmSelect { id } => {
            match Algorithm::from_id(id) {
                Some(algorithm) => ctx.algorithm.request(algorithm),
                None => warn!("Ignoring unknown algorithm id {}", id),
            }
            Some(LinkResponse::AlgorithmAck { id })
        }
        LinkRequest::NorthSet { field } => {
            ctx.estimator.set_magnetic_north(&field);
            Some(LinkResponse::NorthAck { field })
        }
        LinkRequest::Calibration { mode } => {
            match mode {
                CalibrationMode::Measure => {
                    info!("Calibration scheduled");
                    *ctx.calibration_pending = true;
                }
                CalibrationMode::Set(payload) => {
                    ctx.sensors.accel.calibration = payload.accel;
                    ctx.sensors.gyro.calibration = payload.gyro;
                    ctx.sensors.mag.calibration = payload.mag;

                    // Gyro bias is already removed by the downsampler
                    ctx.estimator.set_gyro_bias(&Vector3d::zeros());
                    ctx.estimator.set_accel_variance(&payload.accel.variance);
                    ctx.estimator.set_gyro_variance(&payload.gyro.variance);
                    // Body order, as on start-up. The old firmware handed
                    // the chip-order variance over here.
                    ctx.estimator
                        .set_mag_variance(&mag_variance_body(&payload.mag.variance));
                }
            }
            Some(LinkResponse::CalibrationResult {
                variances: variances(ctx.sensors),
            })
        }
        LinkRequest::RawAttitudeQuery => {
            let sensors = &*ctx.sensors;
            Some(LinkResponse::RawAttitudeDump(RawAttitude {
                accel_raw: sensors.accel.raw,
                accel_filtered: sensors.accel.filtered,
                gyro_raw: sensors.gyro.raw,
                gyro_filtered: sensors.gyro.filtered,
                gyro_temperature: sensors.gyro_temperature,
                mag_raw: sensors.mag.raw,
            }))
        }
        LinkRequest::PeriodicUpdate { baro, gps } => {
            if let Some(baro) = baro {
                ctx.sensors.altitude = AltitudeSample {
                    altitude: baro.altitude,
                    updated: true,
                };
            }
            if let Some(gps) = gps {
                ctx.sensors.gps = GpsSample {
                    ned: gps.ned,
                    heading: gps.heading,
                    groundspeed: gps.groundspeed,
                    quality: gps.quality,
                    updated: true,
                };
            }

            let (ned, velocity) = match ctx.algorithm.active() {
                Algorithm::Full => (ctx.estimator.position(), ctx.estimator.velocity()),
                Algorithm::Simple => (Vector3d::zeros(), Vector3d::zeros()),
            };
            Some(LinkResponse::PeriodicResult(PeriodicReport {
                quaternion: ctx.sensors.attitude.quaternion,
                ned,
                velocity,
                load: ctx.load,
            }))
        }
        LinkRequest::Unknown(kind) => {
            debug!("Ignoring unknown message kind {:#04x}", kind);
            None
        }
    }
}
