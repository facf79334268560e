//! Peripheral building blocks.
//!
//! Components advanced once per core tick, in this order:
//!
//! - [`Synchronizer`] + [`SpiDecoder`]: bus frame assembly and validation
//! - [`RegisterFile`]: configuration storage, written only by decoder commits
//! - [`PwmGenerator`] + [`drive`]: carrier counter and output pin multiplexer

mod spi;
mod regs;
mod pwm;

pub use spi::{DecodeEvent, DecoderState, Discard, Frame, Pins, SpiDecoder, Synchronizer};
pub use regs::{
    Register, RegisterFile, ADDR_DIRECT_OUTPUT, ADDR_OUTPUT_ENABLE, ADDR_PWM_DUTY, ADDR_PWM_MODE,
};
pub use pwm::{drive, Outputs, PwmGenerator};
