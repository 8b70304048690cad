//! Oversampled ADC acquisition interface

/// Number of ADC channels converted per sample frame.
///
/// Channel wiring on the sensor board:
/// 0 accel Y, 1 gyro X, 2 accel X, 3 gyro Y, 4 accel Z, 5 gyro Z,
/// 6 gyro XY temperature, 7 gyro Z temperature.
pub const ADC_CHANNELS: usize = 8;

/// Upper bound on the oversampling window, also the FIR tap limit.
pub const MAX_OVERSAMPLING: usize = 50;

/// One frame of conversions, one tick per channel
pub type AdcFrame = [u16; ADC_CHANNELS];

/// One oversampling window of raw ADC ticks.
///
/// Written by the acquisition interrupt, read once per estimation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSensorBlock {
    frames: [AdcFrame; MAX_OVERSAMPLING],
    len: usize,
    sequence: u32,
}

impl RawSensorBlock {
    /// An empty block, usable in `static` initialisers
    pub const EMPTY: Self = Self {
        frames: [[0; ADC_CHANNELS]; MAX_OVERSAMPLING],
        len: 0,
        sequence: 0,
    };

    /// Create an empty block tagged with the conversion block counter
    pub const fn new(sequence: u32) -> Self {
        Self {
            frames: [[0; ADC_CHANNELS]; MAX_OVERSAMPLING],
            len: 0,
            sequence,
        }
    }

    /// Build a block from a slice of frames, truncated to `MAX_OVERSAMPLING`
    pub fn from_frames(sequence: u32, frames: &[AdcFrame]) -> Self {
        let mut block = Self::new(sequence);
        for frame in frames.iter().take(MAX_OVERSAMPLING) {
            block.push(*frame);
        }
        block
    }

    /// Build a block where every frame is identical
    pub fn filled(sequence: u32, frame: AdcFrame, len: usize) -> Self {
        let len = len.min(MAX_OVERSAMPLING);
        let mut block = Self::new(sequence);
        block.frames[..len].fill(frame);
        block.len = len;
        block
    }

    /// Append a frame. Returns false when the block is already full.
    pub fn push(&mut self, frame: AdcFrame) -> bool {
        if self.len == MAX_OVERSAMPLING {
            return false;
        }
        self.frames[self.len] = frame;
        self.len += 1;
        true
    }

    /// Valid frames in acquisition order
    pub fn frames(&self) -> &[AdcFrame] {
        &self.frames[..self.len]
    }

    /// Number of valid frames
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of the monotonically increasing conversion block counter
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl Default for RawSensorBlock {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Source of complete oversampling windows
pub trait SampleSource {
    /// Block until the acquisition layer signals "data ready", then return
    /// the freshly completed block. Each block is returned at most once.
    fn wait_block(&mut self) -> RawSensorBlock;
}
