//! Save state for the peripheral model.
//!
//! Captures register file, PWM counter and decoder statistics using bincode
//! serialization with deflate compression, so a long simulation can be
//! paused and resumed (or a known configuration restored) from a file.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "SPWM"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```
//!
//! Bus framing in progress is not captured: a restored decoder starts in
//! `Idle` with the bus released.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StateError};

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"SPWM";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

// ─── Per-component state structs ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmState {
    pub counter: u32,
    pub duty: u8,
    pub level: bool,
    pub cycles: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    pub commits: u64,
    pub discards: u64,
}

// ─── Top-level save state ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub tick: u64,
    /// Register values in `Register::ALL` order
    pub registers: [u8; 4],
    pub pwm: PwmState,
    pub decoder: DecoderStats,
    pub uo_out: u8,
    pub uio_out: u8,
    pub uio_oe: u8,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Encode a state with header and deflate compression.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>> {
    let payload = bincode::serialize(state).map_err(StateError::from)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a state, verifying magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState> {
    if data.len() < HEADER_LEN {
        return Err(StateError::TooSmall(data.len()).into());
    }
    if &data[0..4] != MAGIC {
        return Err(StateError::BadMagic.into());
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(StateError::UnsupportedVersion { found: version, expected: FORMAT_VERSION }.into());
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| StateError::Decompress(format!("{:?}", e)))?;

    Ok(bincode::deserialize(&decompressed).map_err(StateError::from)?)
}

// ─── File I/O ───────────────────────────────────────────────────────────────

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<()> {
    let bytes = to_bytes(state)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState> {
    let data = std::fs::read(path)?;
    from_bytes(&data)
}

/// Derive a save state path from a scenario path.
/// `pwm.json` → `pwm.state`
pub fn state_path(scenario_path: &Path) -> PathBuf {
    scenario_path.with_extension("state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> SaveState {
        SaveState {
            tick: 123_456,
            registers: [0x01, 0xCC, 0x01, 0x80],
            pwm: PwmState { counter: 1700, duty: 0x80, level: false, cycles: 37 },
            decoder: DecoderStats { commits: 4, discards: 2 },
            uo_out: 0,
            uio_out: 0xCC,
            uio_oe: 0xFF,
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = to_bytes(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"SPWM");
        assert_eq!(from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(matches!(from_bytes(b"SPW"), Err(Error::State(StateError::TooSmall(3)))));

        let mut bytes = to_bytes(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(Error::State(StateError::BadMagic))));

        let mut bytes = to_bytes(&sample()).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            from_bytes(&bytes),
            Err(Error::State(StateError::UnsupportedVersion { found: 9, expected: 1 }))
        ));
    }

    #[test]
    fn test_rejects_corrupt_payload() {
        let mut bytes = to_bytes(&sample()).unwrap();
        bytes.truncate(HEADER_LEN + 2);
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_state_path() {
        assert_eq!(state_path(Path::new("dir/pwm.json")), PathBuf::from("dir/pwm.state"));
    }
}
