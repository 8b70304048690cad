//! Magnetometer chip interface

/// Raw magnetometer counts in the chip's native axes (left, backward, up)
pub type MagCounts = [i16; 3];

/// Magnetometer sensor interface
pub trait Magnetometer {
    /// Whether the chip has a conversion that has not been read yet
    fn new_data_available(&mut self) -> bool;

    /// Read the latest conversion and clear the data-ready condition
    fn read_mag(&mut self) -> MagCounts;
}
