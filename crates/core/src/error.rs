//! Error type shared by the configuration, bench, scenario and save-state
//! layers.
//!
//! The peripheral itself never fails: a malformed bus transaction is
//! discarded silently, exactly like the hardware. Everything in here belongs
//! to the tooling around the model.

use thiserror::Error;

use crate::probe::Edge;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bus addresses are 7 bits wide.
    #[error("address 0x{0:02X} does not fit in 7 bits")]
    AddressOutOfRange(u8),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("save state: {0}")]
    State(#[from] StateError),

    #[error("timed out after {ticks} ticks waiting for {edge} edge on uo_out[{bit}]")]
    EdgeTimeout { bit: u8, edge: Edge, ticks: u64 },

    /// A scenario step did not observe what it expected.
    #[error("step {step}: {message}")]
    Expectation { step: usize, message: String },
}

/// Failures while encoding or decoding a save-state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("file too small ({0} bytes)")]
    TooSmall(usize),

    #[error("bad magic, not a save state")]
    BadMagic,

    #[error("unsupported version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("serialization failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("decompression failed: {0}")]
    Decompress(String),
}
