//! Request/response protocol with the flight-control board

mod dispatch;
mod message;
mod service;

pub use dispatch::{dispatch, DispatchContext};
pub(crate) use dispatch::mag_variance_body;
pub use message::{
    BaroUpdate, CalibrationMode, CalibrationPayload, CalibrationVariances, GpsUpdate,
    LinkRequest, LinkResponse, PeriodicReport, RawAttitude,
};
pub use service::{poll_link, rearm_link, IrqGuard, LinkState, LinkTransport};
