//! Scriptable board parts and a recording estimator for tests

use crate::board::{Board, Resources};
use crate::link::{LinkRequest, LinkResponse, LinkState, LinkTransport};
use ahrs::{AhrsError, AhrsResult, InsEstimator};
use core::cell::Cell;
use hal::{
    AdcFrame, InterruptControl, MagCounts, Magnetometer, RawSensorBlock, SampleSource,
    SerialNumber, SystemControl, TickCounter, Vector3d, SERIAL_NUMBER_LEN,
};
use std::collections::VecDeque;

/// Produces identical blocks with an incrementing block counter
#[derive(Debug, Clone)]
pub struct MockAdc {
    pub frame: AdcFrame,
    pub len: usize,
    pub next_sequence: u32,
    /// Counter increment per block, above 1 simulates skipped blocks
    pub stride: u32,
    pub blocks_served: u32,
}

impl MockAdc {
    pub fn constant(frame: AdcFrame, len: usize) -> Self {
        MockAdc {
            frame,
            len,
            next_sequence: 1,
            stride: 1,
            blocks_served: 0,
        }
    }
}

impl SampleSource for MockAdc {
    fn wait_block(&mut self) -> RawSensorBlock {
        let block = RawSensorBlock::filled(self.next_sequence, self.frame, self.len);
        self.next_sequence = self.next_sequence.wrapping_add(self.stride);
        self.blocks_served += 1;
        block
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockMag {
    queue: VecDeque<MagCounts>,
    repeat: Option<MagCounts>,
    pub reads: u32,
}

impl MockMag {
    /// New data on every poll
    pub fn always(counts: MagCounts) -> Self {
        MockMag {
            repeat: Some(counts),
            ..Default::default()
        }
    }

    /// Never any data
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn push(&mut self, counts: MagCounts) {
        self.queue.push_back(counts);
    }
}

impl Magnetometer for MockMag {
    fn new_data_available(&mut self) -> bool {
        !self.queue.is_empty() || self.repeat.is_some()
    }

    fn read_mag(&mut self) -> MagCounts {
        self.reads += 1;
        self.queue
            .pop_front()
            .or(self.repeat)
            .unwrap_or_default()
    }
}

/// Link layer model.
///
/// `done` with an armed receive buffer starts a transfer (`Transient`).
/// `interrupt` plays the completion interrupt: it finishes negotiation and
/// delivers queued requests into the armed buffer.
#[derive(Debug, Clone)]
pub struct MockLink {
    state: LinkState,
    inbox: VecDeque<LinkRequest>,
    current: LinkRequest,
    armed: bool,
    done_count: u32,
    responses: Vec<LinkResponse>,
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            state: LinkState::Stopped,
            inbox: VecDeque::new(),
            current: LinkRequest::Unknown(0xff),
            armed: false,
            done_count: 0,
            responses: Vec::new(),
        }
    }

    /// Negotiated, with a receive buffer already armed
    pub fn connected() -> Self {
        MockLink {
            state: LinkState::Transient,
            armed: true,
            ..Self::new()
        }
    }

    pub fn push_request(&mut self, request: LinkRequest) {
        self.inbox.push_back(request);
    }

    pub fn interrupt(&mut self) {
        match self.state {
            LinkState::LinkNegotiated => self.state = LinkState::Idle,
            LinkState::Transient if self.armed => {
                if let Some(request) = self.inbox.pop_front() {
                    self.current = request;
                    self.armed = false;
                    self.state = LinkState::Busy;
                }
            }
            _ => {}
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn done_count(&self) -> u32 {
        self.done_count
    }

    pub fn responses(&self) -> &[LinkResponse] {
        &self.responses
    }

    pub fn last_response(&self) -> Option<&LinkResponse> {
        self.responses.last()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkTransport for MockLink {
    fn state(&self) -> LinkState {
        self.state
    }

    fn bind_buffers(&mut self) {
        self.state = LinkState::LinkNegotiated;
    }

    fn arm_receive(&mut self) {
        self.armed = true;
    }

    fn request(&self) -> LinkRequest {
        self.current
    }

    fn set_response(&mut self, response: LinkResponse) {
        self.responses.push(response);
    }

    fn done(&mut self) {
        self.done_count += 1;
        if self.armed && matches!(self.state, LinkState::Idle | LinkState::Busy) {
            self.state = LinkState::Transient;
        }
    }
}

/// Counts interrupt masking nesting
#[derive(Debug, Default, Clone)]
pub struct MockIrq {
    depth: i32,
    max_depth: i32,
    disable_count: u32,
}

impl MockIrq {
    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn max_depth(&self) -> i32 {
        self.max_depth
    }

    pub fn disable_count(&self) -> u32 {
        self.disable_count
    }
}

impl InterruptControl for MockIrq {
    fn disable(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        self.disable_count += 1;
    }

    fn enable(&mut self) {
        self.depth -= 1;
    }
}

/// Advances by `step` ticks on every read
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Cell<u32>,
    step: u32,
}

impl MockClock {
    pub fn new(start: u32, step: u32) -> Self {
        MockClock {
            now: Cell::new(start),
            step,
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

impl TickCounter for MockClock {
    fn ticks(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

#[derive(Debug, Clone)]
pub struct MockSystem {
    serial: SerialNumber,
    pub delays: Vec<u32>,
    pub resets: u32,
}

impl MockSystem {
    pub fn new(serial: SerialNumber) -> Self {
        MockSystem {
            serial,
            delays: Vec::new(),
            resets: 0,
        }
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new([b'0'; SERIAL_NUMBER_LEN])
    }
}

impl SystemControl for MockSystem {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn serial_number(&self) -> SerialNumber {
        self.serial
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBoard {
    pub adc: MockAdc,
    pub mag: MockMag,
    pub link: MockLink,
    pub irq: MockIrq,
    pub clock: MockClock,
    pub system: MockSystem,
}

impl Default for MockAdc {
    fn default() -> Self {
        Self::constant([0; hal::ADC_CHANNELS], 25)
    }
}

impl Board for MockBoard {
    type Adc = MockAdc;
    type Mag = MockMag;
    type Link = MockLink;
    type Irq = MockIrq;
    type Clock = MockClock;
    type System = MockSystem;

    fn name(&self) -> &str {
        "mock"
    }

    fn split_resources(self) -> Resources<Self> {
        Resources {
            adc: self.adc,
            mag: self.mag,
            link: self.link,
            irq: self.irq,
            clock: self.clock,
            system: self.system,
        }
    }
}

/// One call made on a [`RecordingEstimator`]
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorCall {
    Init,
    PredictState {
        gyro: Vector3d,
        accel: Vector3d,
        dt: f32,
    },
    PredictCovariance {
        dt: f32,
    },
    CorrectFull {
        mag: Vector3d,
        ned: Vector3d,
        vel: Vector3d,
        altitude: f32,
    },
    CorrectMagOnly {
        mag: Vector3d,
    },
    CorrectVelBaro {
        vel: Vector3d,
        altitude: f32,
    },
    SetMagVariance(Vector3d),
    SetAccelVariance(Vector3d),
    SetGyroVariance(Vector3d),
    SetGyroBias(Vector3d),
    SetPosVelVariance(f32),
    SetMagneticNorth(Vector3d),
}

impl EstimatorCall {
    pub fn is_correction(&self) -> bool {
        matches!(
            self,
            EstimatorCall::CorrectFull { .. }
                | EstimatorCall::CorrectMagOnly { .. }
                | EstimatorCall::CorrectVelBaro { .. }
        )
    }
}

/// Estimator stub that records every call and reports fixed outputs
#[derive(Debug, Clone)]
pub struct RecordingEstimator {
    pub calls: Vec<EstimatorCall>,
    pub quaternion: [f32; 4],
    pub position: Vector3d,
    pub velocity: Vector3d,
    /// Make `predict_state` fail
    pub fail_prediction: bool,
}

impl Default for RecordingEstimator {
    fn default() -> Self {
        RecordingEstimator {
            calls: Vec::new(),
            quaternion: [0.5; 4],
            position: Vector3d::zeros(),
            velocity: Vector3d::zeros(),
            fail_prediction: false,
        }
    }
}

impl RecordingEstimator {
    pub fn corrections(&self) -> Vec<&EstimatorCall> {
        self.calls.iter().filter(|c| c.is_correction()).collect()
    }
}

impl InsEstimator for RecordingEstimator {
    fn init(&mut self) {
        self.calls.push(EstimatorCall::Init);
    }

    fn predict_state(&mut self, gyro: &Vector3d, accel: &Vector3d, dt: f32) -> AhrsResult<()> {
        self.calls.push(EstimatorCall::PredictState {
            gyro: *gyro,
            accel: *accel,
            dt,
        });
        if self.fail_prediction {
            return Err(AhrsError::Diverged {
                step: "state prediction",
            });
        }
        Ok(())
    }

    fn predict_covariance(&mut self, dt: f32) -> AhrsResult<()> {
        self.calls.push(EstimatorCall::PredictCovariance { dt });
        Ok(())
    }

    fn correct_full(
        &mut self,
        mag: &Vector3d,
        ned: &Vector3d,
        vel: &Vector3d,
        altitude: f32,
    ) -> AhrsResult<()> {
        self.calls.push(EstimatorCall::CorrectFull {
            mag: *mag,
            ned: *ned,
            vel: *vel,
            altitude,
        });
        Ok(())
    }

    fn correct_mag_only(&mut self, mag: &Vector3d) -> AhrsResult<()> {
        self.calls.push(EstimatorCall::CorrectMagOnly { mag: *mag });
        Ok(())
    }

    fn correct_vel_baro(&mut self, vel: &Vector3d, altitude: f32) -> AhrsResult<()> {
        self.calls.push(EstimatorCall::CorrectVelBaro {
            vel: *vel,
            altitude,
        });
        Ok(())
    }

    fn set_mag_variance(&mut self, variance: &Vector3d) {
        self.calls.push(EstimatorCall::SetMagVariance(*variance));
    }

    fn set_accel_variance(&mut self, variance: &Vector3d) {
        self.calls.push(EstimatorCall::SetAccelVariance(*variance));
    }

    fn set_gyro_variance(&mut self, variance: &Vector3d) {
        self.calls.push(EstimatorCall::SetGyroVariance(*variance));
    }

    fn set_gyro_bias(&mut self, bias: &Vector3d) {
        self.calls.push(EstimatorCall::SetGyroBias(*bias));
    }

    fn set_position_velocity_variance(&mut self, variance: f32) {
        self.calls.push(EstimatorCall::SetPosVelVariance(variance));
    }

    fn set_magnetic_north(&mut self, field: &Vector3d) {
        self.calls.push(EstimatorCall::SetMagneticNorth(*field));
    }

    fn quaternion(&self) -> [f32; 4] {
        self.quaternion
    }

    fn position(&self) -> Vector3d {
        self.position
    }

    fn velocity(&self) -> Vector3d {
        self.velocity
    }
}
