#![no_std]
extern crate nalgebra;

mod adc;
mod mag;
mod system;
mod types;

pub use adc::*;
pub use mag::*;
pub use system::*;
pub use types::*;
