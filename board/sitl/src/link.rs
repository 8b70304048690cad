use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use coprocessor::link::{
    BaroUpdate, CalibrationMode, GpsUpdate, LinkRequest, LinkResponse, LinkState, LinkTransport,
};
use coprocessor::Algorithm;
use hal::{InterruptControl, Vector3d};
use log::{debug, info};

/// Transfer state shared by the firmware side and the peer
#[derive(Debug)]
struct Wire {
    state: LinkState,
    armed: bool,
    request: LinkRequest,
    response: Option<LinkResponse>,
}

impl Wire {
    fn new() -> Self {
        Self {
            state: LinkState::Stopped,
            armed: false,
            request: LinkRequest::Unknown(0xff),
            response: None,
        }
    }
}

fn lock(wire: &Mutex<Wire>) -> MutexGuard<'_, Wire> {
    wire.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the simulated flight board asks for
#[derive(Debug, Clone)]
pub struct PeerScript {
    setup: VecDeque<LinkRequest>,
    transfers: u32,
    altitude: f32,
    gps: bool,
}

impl PeerScript {
    pub fn new(north: Vector3d, algorithm: Algorithm, calibrate: bool, gps: bool) -> Self {
        let mut setup = VecDeque::from([
            LinkRequest::SerialQuery,
            LinkRequest::NorthSet { field: north },
            LinkRequest::AlgorithmSelect {
                id: algorithm.id(),
            },
        ]);
        if calibrate {
            setup.push_back(LinkRequest::Calibration {
                mode: CalibrationMode::Measure,
            });
        }
        Self {
            setup,
            transfers: 0,
            altitude: 0.0,
            gps,
        }
    }

    pub fn next_request(&mut self) -> LinkRequest {
        if let Some(request) = self.setup.pop_front() {
            return request;
        }
        self.transfers = self.transfers.wrapping_add(1);
        if self.transfers % 50 == 0 {
            return LinkRequest::RawAttitudeQuery;
        }

        let baro = (self.transfers % 2 == 0).then_some(BaroUpdate {
            altitude: self.altitude,
        });
        let gps = (self.gps && self.transfers % 5 == 0).then_some(GpsUpdate {
            ned: Vector3d::zeros(),
            heading: 0.0,
            groundspeed: 0.0,
            quality: 1.0,
        });
        LinkRequest::PeriodicUpdate { baro, gps }
    }
}

enum PeerCommand {
    Stop,
}

/// Plays the flight board and the link completion interrupt.
///
/// Each tick it finishes negotiation, or, when the firmware has a receive
/// buffer armed, collects the last response and clocks in the next request.
/// Nothing happens while the firmware masks the interrupt.
struct PeerWorker {
    script: PeerScript,
    exchanged: u32,
}

impl PeerWorker {
    fn run(
        script: PeerScript,
        period: Duration,
        wire: Arc<Mutex<Wire>>,
        masked: Arc<AtomicBool>,
        to_worker_rx: mpsc::Receiver<PeerCommand>,
    ) -> JoinHandle<()> {
        let mut worker = Self {
            script,
            exchanged: 0,
        };
        std::thread::spawn(move || {
            let mut last_transfer_time = Instant::now();
            loop {
                match to_worker_rx.try_recv() {
                    Ok(PeerCommand::Stop) | Err(mpsc::TryRecvError::Disconnected) => {
                        debug!("Peer stopped after {} transfers", worker.exchanged);
                        return;
                    }
                    Err(mpsc::TryRecvError::Empty) => {}
                }
                let elapsed = last_transfer_time.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                    continue;
                }
                if masked.load(Ordering::Acquire) {
                    std::thread::yield_now();
                    continue;
                }
                last_transfer_time = Instant::now();

                worker.interrupt(&mut lock(&wire));
            }
        })
    }

    fn interrupt(&mut self, wire: &mut Wire) {
        match wire.state {
            LinkState::LinkNegotiated => {
                info!("Link negotiated");
                wire.state = LinkState::Idle;
            }
            LinkState::Transient if wire.armed => {
                if let Some(response) = wire.response.take() {
                    report(&response);
                }
                wire.request = self.script.next_request();
                wire.armed = false;
                wire.state = LinkState::Busy;
                self.exchanged = self.exchanged.wrapping_add(1);
            }
            _ => {}
        }
    }
}

fn report(response: &LinkResponse) {
    match response {
        LinkResponse::Serial { serial } => {
            info!("Coprocessor serial {}", String::from_utf8_lossy(serial));
        }
        LinkResponse::AlgorithmAck { id } => info!("Algorithm {} acknowledged", id),
        LinkResponse::NorthAck { field } => info!("North set to {:?}", field.as_slice()),
        LinkResponse::CalibrationResult { variances } => info!(
            "Calibration variances: accel {:?}, gyro {:?}, mag {:?}",
            variances.accel.as_slice(),
            variances.gyro.as_slice(),
            variances.mag.as_slice()
        ),
        LinkResponse::RawAttitudeDump(raw) => debug!(
            "Raw accel {:?} gyro {:?} mag {:?}",
            raw.accel_raw, raw.gyro_raw, raw.mag_raw
        ),
        LinkResponse::PeriodicResult(periodic) => debug!(
            "Attitude {:?}, load {:.1}%",
            periodic.quaternion, periodic.load.load_percent
        ),
    }
}

/// Firmware end of the link
pub struct SimLink {
    wire: Arc<Mutex<Wire>>,
    to_worker_tx: mpsc::Sender<PeerCommand>,
    worker: Option<JoinHandle<()>>,
}

/// Masks the peer's completion interrupt
pub struct SimIrq {
    masked: Arc<AtomicBool>,
}

impl InterruptControl for SimIrq {
    fn disable(&mut self) {
        self.masked.store(true, Ordering::Release);
    }

    fn enable(&mut self) {
        self.masked.store(false, Ordering::Release);
    }
}

/// Connect a peer running `script` every `period`
pub fn connect(script: PeerScript, period: Duration) -> (SimLink, SimIrq) {
    let wire = Arc::new(Mutex::new(Wire::new()));
    let masked = Arc::new(AtomicBool::new(false));
    let (to_worker_tx, to_worker_rx) = mpsc::channel();
    let worker = PeerWorker::run(script, period, wire.clone(), masked.clone(), to_worker_rx);
    (
        SimLink {
            wire,
            to_worker_tx,
            worker: Some(worker),
        },
        SimIrq { masked },
    )
}

impl LinkTransport for SimLink {
    fn state(&self) -> LinkState {
        lock(&self.wire).state
    }

    fn bind_buffers(&mut self) {
        lock(&self.wire).state = LinkState::LinkNegotiated;
    }

    fn arm_receive(&mut self) {
        lock(&self.wire).armed = true;
    }

    fn request(&self) -> LinkRequest {
        lock(&self.wire).request
    }

    fn set_response(&mut self, response: LinkResponse) {
        lock(&self.wire).response = Some(response);
    }

    fn done(&mut self) {
        let mut wire = lock(&self.wire);
        if wire.armed && matches!(wire.state, LinkState::Idle | LinkState::Busy) {
            wire.state = LinkState::Transient;
        }
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        let _ = self.to_worker_tx.send(PeerCommand::Stop);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_setup_then_periodic() {
        let mut script = PeerScript::new(Vector3d::x(), Algorithm::Simple, true, false);
        assert_eq!(script.next_request(), LinkRequest::SerialQuery);
        assert!(matches!(script.next_request(), LinkRequest::NorthSet { .. }));
        assert_eq!(script.next_request(), LinkRequest::AlgorithmSelect { id: 1 });
        assert_eq!(
            script.next_request(),
            LinkRequest::Calibration {
                mode: CalibrationMode::Measure
            }
        );
        assert!(
            matches!(script.next_request(), LinkRequest::PeriodicUpdate { gps: None, .. }),
            "Setup is followed by periodic updates"
        );
    }

    #[test]
    fn test_script_sends_gps_when_enabled() {
        let mut script = PeerScript::new(Vector3d::x(), Algorithm::Full, false, true);
        let with_gps = (0..20)
            .map(|_| script.next_request())
            .filter(|r| matches!(r, LinkRequest::PeriodicUpdate { gps: Some(_), .. }))
            .count();
        assert_eq!(with_gps, 3, "A fix every fifth periodic transfer");
    }

    #[test]
    fn test_interrupt_delivers_request_when_armed() {
        let mut worker = PeerWorker {
            script: PeerScript::new(Vector3d::x(), Algorithm::Full, false, false),
            exchanged: 0,
        };
        let mut wire = Wire::new();
        wire.state = LinkState::LinkNegotiated;
        worker.interrupt(&mut wire);
        assert_eq!(wire.state, LinkState::Idle);

        worker.interrupt(&mut wire);
        assert_eq!(wire.state, LinkState::Idle, "Idle without a transfer stays idle");

        wire.state = LinkState::Transient;
        wire.armed = true;
        worker.interrupt(&mut wire);
        assert_eq!(wire.state, LinkState::Busy);
        assert_eq!(wire.request, LinkRequest::SerialQuery);
        assert!(!wire.armed, "The buffer is consumed by the transfer");
    }
}
