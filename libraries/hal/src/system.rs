//! System services provided by the board support layer

/// Length of the device serial number as reported over the link
pub const SERIAL_NUMBER_LEN: usize = 25;

/// Device serial number in BCD/ASCII form, NUL padded
pub type SerialNumber = [u8; SERIAL_NUMBER_LEN];

/// Free-running hardware tick counter.
///
/// The counter wraps; callers measure intervals with `wrapping_sub`.
pub trait TickCounter {
    /// Current counter value
    fn ticks(&self) -> u32;
}

/// Masking of the link completion interrupt
pub trait InterruptControl {
    /// Mask the interrupt
    fn disable(&mut self);

    /// Unmask the interrupt
    fn enable(&mut self);
}

/// Whole-system control
pub trait SystemControl {
    /// Busy-wait for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Hard reset of the processor.
    ///
    /// On hardware this does not return.
    fn reset(&mut self);

    /// Unique device serial number
    fn serial_number(&self) -> SerialNumber;
}
