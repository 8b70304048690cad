use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use critical_section::Mutex;
use hal::{RawSensorBlock, SampleSource};

/// Double-buffered handoff of raw blocks from the acquisition interrupt to
/// the estimation loop.
///
/// The producer always writes the back slot and then flips `front`. The
/// consumer copies the front slot. `ready` is the "data ready" level and is
/// cleared by the consumer, so every block is observed at most once.
pub struct RawBlockHandoff {
    slots: Mutex<RefCell<[RawSensorBlock; 2]>>,
    front: AtomicUsize,
    ready: AtomicBool,
    published: AtomicU32,
}

impl RawBlockHandoff {
    pub const fn new() -> Self {
        RawBlockHandoff {
            slots: Mutex::new(RefCell::new([RawSensorBlock::EMPTY; 2])),
            front: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            published: AtomicU32::new(0),
        }
    }

    /// Producer side. An unconsumed block is overwritten.
    pub fn publish(&self, block: &RawSensorBlock) {
        critical_section::with(|cs| {
            let back = 1 - self.front.load(Ordering::Relaxed);
            self.slots.borrow_ref_mut(cs)[back] = *block;
            self.front.store(back, Ordering::Release);
            self.ready.store(true, Ordering::Release);
        });
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Consumer side. Returns the newest block if it was not taken yet.
    pub fn take(&self) -> Option<RawSensorBlock> {
        critical_section::with(|cs| {
            if !self.ready.swap(false, Ordering::Acquire) {
                return None;
            }
            let front = self.front.load(Ordering::Acquire);
            Some(self.slots.borrow_ref(cs)[front])
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Blocks published since start-up
    pub fn published(&self) -> u32 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn reader(&self) -> HandoffReader<'_> {
        HandoffReader { handoff: self }
    }
}

impl Default for RawBlockHandoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Spin-waiting consumer of a [`RawBlockHandoff`]
pub struct HandoffReader<'a> {
    handoff: &'a RawBlockHandoff,
}

impl SampleSource for HandoffReader<'_> {
    fn wait_block(&mut self) -> RawSensorBlock {
        loop {
            if self.handoff.is_ready() {
                if let Some(block) = self.handoff.take() {
                    return block;
                }
            }
            core::hint::spin_loop();
        }
    }
}
