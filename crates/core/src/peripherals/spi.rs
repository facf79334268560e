//! SPI peripheral-side frame decoder.
//!
//! Samples nCS / SCLK / COPI once per core tick and assembles 16-bit frames
//! `[R/W][A6..A0][D7..D0]`, MSB first, on SCLK rising edges while nCS is low.
//! A frame is closed by the nCS rising edge; the tick after that the decoder
//! validates it and hands the register file either a commit or a discard.
//!
//! Nothing is ever reported back to the bus master. Reads, unknown addresses
//! and truncated frames are dropped and only show up in the debug counters
//! and `tracing` output.

use std::collections::VecDeque;
use tracing::{debug, trace};

use super::regs::Register;

/// Bus input levels for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pins {
    /// Chip select, active low
    pub ncs: bool,
    pub sclk: bool,
    /// Controller-out / peripheral-in data
    pub copi: bool,
}

impl Pins {
    /// Bus released: nCS high, SCLK and COPI low.
    pub const IDLE: Pins = Pins { ncs: true, sclk: false, copi: false };

    /// Decode the `ui_in` byte (bit 0 = SCLK, bit 1 = COPI, bit 2 = nCS).
    pub fn from_ui_in(value: u8) -> Self {
        Pins {
            sclk: value & 0x01 != 0,
            copi: value & 0x02 != 0,
            ncs: value & 0x04 != 0,
        }
    }

    pub fn to_ui_in(self) -> u8 {
        (self.sclk as u8) | ((self.copi as u8) << 1) | ((self.ncs as u8) << 2)
    }
}

impl Default for Pins {
    fn default() -> Self {
        Pins::IDLE
    }
}

/// Flip-flop chain between the asynchronous pins and the decoder.
///
/// Depth 0 passes samples straight through.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    depth: usize,
    stages: VecDeque<Pins>,
}

impl Synchronizer {
    pub fn new(depth: usize) -> Self {
        let mut sync = Synchronizer { depth, stages: VecDeque::with_capacity(depth + 1) };
        sync.reset();
        sync
    }

    pub fn reset(&mut self) {
        self.stages.clear();
        self.stages.extend(std::iter::repeat(Pins::IDLE).take(self.depth));
    }

    /// Clock in this tick's pin levels; returns the levels `depth` ticks old.
    pub fn sample(&mut self, pins: Pins) -> Pins {
        if self.depth == 0 {
            return pins;
        }
        self.stages.push_back(pins);
        self.stages.pop_front().unwrap_or(pins)
    }
}

/// One complete 16-bit bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub write: bool,
    pub addr: u8,
    pub data: u8,
}

impl Frame {
    pub fn from_word(word: u16) -> Self {
        Frame::from_bytes((word >> 8) as u8, word as u8)
    }

    /// First byte carries R/W in bit 7 and the address below it.
    pub fn from_bytes(header: u8, data: u8) -> Self {
        Frame { write: header & 0x80 != 0, addr: header & 0x7F, data }
    }

    pub fn word(self) -> u16 {
        ((self.write as u16) << 15) | (((self.addr & 0x7F) as u16) << 8) | self.data as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    ShiftingAddress { bits: u8, shift: u8 },
    /// `bits == 8` means the frame is full; further SCLK edges are ignored.
    ShiftingData { header: u8, bits: u8, shift: u8 },
    Committing { frame: Frame },
}

/// Why a frame produced no register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// R/W bit clear. Reads have no defined response.
    Read { addr: u8 },
    UnknownAddress { addr: u8, data: u8 },
    /// nCS rose before all 16 bits were clocked in.
    Truncated { bits: u8 },
}

/// Outcome of a finished frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    Commit { register: Register, value: u8 },
    Discard(Discard),
}

pub struct SpiDecoder {
    pub state: DecoderState,
    prev: Pins,
    // Debug counters
    pub dbg_commits: u64,
    pub dbg_discards: u64,
}

impl SpiDecoder {
    pub fn new() -> Self {
        SpiDecoder {
            state: DecoderState::Idle,
            prev: Pins::IDLE,
            dbg_commits: 0,
            dbg_discards: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = SpiDecoder::new();
    }

    /// True while a frame is being shifted in or awaiting commit.
    pub fn busy(&self) -> bool {
        self.state != DecoderState::Idle
    }

    /// Advance one core tick with the (synchronized) pin levels.
    pub fn step(&mut self, pins: Pins) -> Option<DecodeEvent> {
        let mut event = None;

        // A frame closed on the previous tick lands now.
        if let DecoderState::Committing { frame } = self.state {
            self.state = DecoderState::Idle;
            event = Some(self.resolve(frame));
        }

        let ncs_fell = self.prev.ncs && !pins.ncs;
        let ncs_rose = !self.prev.ncs && pins.ncs;
        let sclk_rose = !self.prev.sclk && pins.sclk;
        self.prev = pins;

        if ncs_fell {
            trace!("nCS fell, frame start");
            self.state = DecoderState::ShiftingAddress { bits: 0, shift: 0 };
        } else if ncs_rose {
            match self.state {
                DecoderState::ShiftingData { header, bits: 8, shift } => {
                    self.state = DecoderState::Committing { frame: Frame::from_bytes(header, shift) };
                }
                DecoderState::ShiftingAddress { bits, .. } => {
                    self.state = DecoderState::Idle;
                    event = Some(self.discard(Discard::Truncated { bits }));
                }
                DecoderState::ShiftingData { bits, .. } => {
                    self.state = DecoderState::Idle;
                    event = Some(self.discard(Discard::Truncated { bits: 8 + bits }));
                }
                DecoderState::Idle | DecoderState::Committing { .. } => {}
            }
        }

        // An SCLK edge on the nCS falling tick is the frame's first bit.
        if !pins.ncs && sclk_rose {
            let bit = pins.copi as u8;
            self.state = match self.state {
                DecoderState::ShiftingAddress { bits, shift } => {
                    let shift = (shift << 1) | bit;
                    trace!(bit, index = bits, "address byte");
                    if bits + 1 == 8 {
                        DecoderState::ShiftingData { header: shift, bits: 0, shift: 0 }
                    } else {
                        DecoderState::ShiftingAddress { bits: bits + 1, shift }
                    }
                }
                DecoderState::ShiftingData { header, bits, shift } if bits < 8 => {
                    trace!(bit, index = bits + 8, "data byte");
                    DecoderState::ShiftingData { header, bits: bits + 1, shift: (shift << 1) | bit }
                }
                other => other,
            };
        }

        event
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::DecoderStats {
        crate::savestate::DecoderStats { commits: self.dbg_commits, discards: self.dbg_discards }
    }

    /// Restore state from save state. Framing restarts from `Idle`.
    pub fn load_state(&mut self, s: &crate::savestate::DecoderStats) {
        self.reset();
        self.dbg_commits = s.commits;
        self.dbg_discards = s.discards;
    }

    fn resolve(&mut self, frame: Frame) -> DecodeEvent {
        if !frame.write {
            return self.discard(Discard::Read { addr: frame.addr });
        }
        match Register::from_addr(frame.addr) {
            Some(register) => {
                self.dbg_commits += 1;
                debug!(addr = frame.addr, value = frame.data, "commit {}", register.name());
                DecodeEvent::Commit { register, value: frame.data }
            }
            None => self.discard(Discard::UnknownAddress { addr: frame.addr, data: frame.data }),
        }
    }

    fn discard(&mut self, reason: Discard) -> DecodeEvent {
        self.dbg_discards += 1;
        debug!(?reason, "frame discarded");
        DecodeEvent::Discard(reason)
    }
}

impl Default for SpiDecoder {
    fn default() -> Self { Self::new() }
}
