//! SPI bus master stimulus.
//!
//! Generates the per-tick pin levels of one bit-banged transaction:
//!
//! ```text
//! nCS  ‾‾\_______________________ ... ____________/‾‾‾‾‾‾‾‾‾‾
//! SCLK ____.____/‾‾‾‾‾\____/‾‾‾‾‾ ... ____/‾‾‾‾‾\____________
//! COPI ____.< R/W     >< A6     > ... < D0      >____________
//!          1 tick  half   half                   settle ticks
//! ```
//!
//! COPI changes while SCLK is low and is sampled by the peripheral on the
//! rising edge, MSB first.

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::peripherals::{Frame, Pins};

/// One bus transaction as issued by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub write: bool,
    pub addr: u8,
    pub data: u8,
}

impl Transaction {
    pub fn new(write: bool, addr: u8, data: u8) -> Result<Self> {
        if addr > crate::MAX_ADDR {
            return Err(Error::AddressOutOfRange(addr));
        }
        Ok(Transaction { write, addr, data })
    }

    pub fn write(addr: u8, data: u8) -> Result<Self> {
        Self::new(true, addr, data)
    }

    /// Reads still clock a data byte out; the peripheral ignores it.
    pub fn read(addr: u8, data: u8) -> Result<Self> {
        Self::new(false, addr, data)
    }

    pub fn frame(&self) -> Frame {
        Frame { write: self.write, addr: self.addr, data: self.data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiMaster {
    /// Ticks per SCLK phase
    pub half_sclk_ticks: u32,
    /// Idle ticks after nCS returns high (at least one)
    pub settle_ticks: u32,
}

impl SpiMaster {
    pub fn new(half_sclk_ticks: u32, settle_ticks: u32) -> Self {
        SpiMaster { half_sclk_ticks: half_sclk_ticks.max(1), settle_ticks: settle_ticks.max(1) }
    }

    pub fn from_config(bus: &BusConfig) -> Self {
        Self::new(bus.half_sclk_ticks, bus.settle_ticks)
    }

    /// Ticks spent with nCS low.
    pub fn select_ticks(&self) -> u64 {
        1 + 2 * crate::FRAME_BITS as u64 * self.half_sclk_ticks as u64
    }

    /// Total ticks for one transaction, settle time included.
    pub fn transaction_ticks(&self) -> u64 {
        self.select_ticks() + self.settle_ticks as u64
    }

    pub fn waveform(&self, t: &Transaction) -> Waveform {
        Waveform {
            word: t.frame().word(),
            half: self.half_sclk_ticks as u64,
            pos: 0,
            len: self.transaction_ticks(),
        }
    }
}

/// Pin levels for one transaction, one item per tick.
#[derive(Debug, Clone)]
pub struct Waveform {
    word: u16,
    half: u64,
    pos: u64,
    len: u64,
}

impl Waveform {
    fn pins_at(&self, pos: u64) -> Pins {
        let bit_ticks = 2 * self.half;
        if pos == 0 {
            return Pins { ncs: false, sclk: false, copi: false };
        }
        let k = pos - 1;
        if k >= crate::FRAME_BITS as u64 * bit_ticks {
            return Pins::IDLE;
        }
        let index = k / bit_ticks;
        Pins {
            ncs: false,
            sclk: k % bit_ticks >= self.half,
            copi: (self.word >> (15 - index)) & 1 != 0,
        }
    }
}

impl Iterator for Waveform {
    type Item = Pins;

    fn next(&mut self) -> Option<Pins> {
        if self.pos >= self.len {
            return None;
        }
        let pins = self.pins_at(self.pos);
        self.pos += 1;
        Some(pins)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.len - self.pos) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Waveform {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::{DecodeEvent, Register, SpiDecoder};

    #[test]
    fn test_address_validation() {
        assert!(Transaction::write(0x7F, 0).is_ok());
        assert!(matches!(Transaction::write(0x80, 0), Err(Error::AddressOutOfRange(0x80))));
        assert!(matches!(Transaction::read(0xFF, 0), Err(Error::AddressOutOfRange(0xFF))));
    }

    #[test]
    fn test_waveform_shape() {
        let m = SpiMaster::new(2, 3);
        let t = Transaction::write(0x00, 0xF0).unwrap();
        let w: Vec<Pins> = m.waveform(&t).collect();
        assert_eq!(w.len() as u64, m.transaction_ticks());
        assert_eq!(w.len(), 1 + 64 + 3);
        assert!(!w[0].ncs && !w[0].sclk);
        // First bit is R/W = 1: SCLK low for 2 ticks then high for 2.
        assert_eq!(&w[1..5], &[
            Pins { ncs: false, sclk: false, copi: true },
            Pins { ncs: false, sclk: false, copi: true },
            Pins { ncs: false, sclk: true, copi: true },
            Pins { ncs: false, sclk: true, copi: true },
        ]);
        assert!(w[65..].iter().all(|p| *p == Pins::IDLE));
    }

    #[test]
    fn test_default_timing() {
        let m = SpiMaster::from_config(&BusConfig::default());
        assert_eq!(m.select_ticks(), 1601);
        assert_eq!(m.transaction_ticks(), 2201);
    }

    #[test]
    fn test_decoder_accepts_waveform() {
        let m = SpiMaster::new(3, 2);
        let mut dec = SpiDecoder::new();
        let t = Transaction::write(0x04, 0xCF).unwrap();
        let events: Vec<DecodeEvent> = m.waveform(&t).filter_map(|p| dec.step(p)).collect();
        assert_eq!(events, vec![DecodeEvent::Commit { register: Register::PwmDuty, value: 0xCF }]);
    }
}
