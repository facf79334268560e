//! # spipwm-core
//!
//! Tick-accurate model of a small SPI-controlled output peripheral with a
//! PWM carrier, plus the bench tooling used to drive and check it.
//!
//! The peripheral listens on a write-only SPI-style bus (nCS, SCLK, COPI,
//! mode 0, MSB first). Each 16-bit frame `[R/W][A6..A0][D7..D0]` may update
//! one of four registers, which in turn drive two 8-bit output buses: `uo_out`
//! (static level or a ~3 kHz PWM carrier per pin) and `uio_out` (raw value).
//!
//! ## Architecture
//!
//! - [`Peripheral`]: Top-level model wiring synchronizer, decoder, register
//!   file, PWM generator and output mux; advanced one core tick at a time
//! - [`peripherals`]: SPI decoder, register file, PWM generator, output mux
//! - [`config`]: Clock, carrier and bench timing parameters (JSON)
//! - [`master`]: SPI bus master waveform generator
//! - [`bench`]: Test bench: reset, transactions, edge waits, PWM measurement
//! - [`scenario`]: JSON-described stimulus/check sequences and the built-in
//!   regression scenarios
//! - [`probe`]: Edge detection and carrier timing measurement
//! - [`vcd`]: Waveform dump writer
//! - [`debugger`]: Register viewer and bus watchpoints
//! - [`savestate`]: Compressed save states
//!
//! ## Tick order
//!
//! Within one [`Peripheral::tick`]: reset check → synchronizer → decoder →
//! register commit → PWM counter → output mux. A frame closed by nCS rising
//! on tick *n* is committed on tick *n + 1*, and its effect on `uo_out` is
//! visible in that same tick's outputs.

pub mod config;
pub mod error;
pub mod peripherals;
pub mod probe;
pub mod master;
pub mod vcd;
pub mod bench;
pub mod scenario;
pub mod debugger;
pub mod savestate;

use tracing::{debug, info};

pub use bench::Bench;
pub use config::{Config, DutyUpdate};
pub use error::{Error, Result};
pub use master::{SpiMaster, Transaction};
pub use peripherals::{Outputs, Pins, Register, RegisterFile};
pub use probe::{Edge, Measurement};
pub use scenario::{Report, Scenario, Step};

/// Number of bits in a bus frame.
pub const FRAME_BITS: u32 = 16;
/// Largest bus address.
pub const MAX_ADDR: u8 = 0x7F;

/// The peripheral: everything behind the pins.
pub struct Peripheral {
    config: Config,
    pub sync: peripherals::Synchronizer,
    pub decoder: peripherals::SpiDecoder,
    pub regs: RegisterFile,
    pub pwm: peripherals::PwmGenerator,
    /// Watchpoints on bus writes
    pub debugger: debugger::Debugger,
    outputs: Outputs,
    /// Core ticks since construction or the last state load
    tick: u64,
    in_reset: bool,
}

impl Peripheral {
    /// Create a peripheral with the default 10 MHz / 3 kHz configuration.
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    /// Create a peripheral after checking `config` with [`Config::validate`].
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        Peripheral {
            sync: peripherals::Synchronizer::new(config.bus.sync_stages),
            decoder: peripherals::SpiDecoder::new(),
            regs: RegisterFile::new(),
            pwm: peripherals::PwmGenerator::new(config.pwm_period_ticks(), config.pwm.duty_update),
            debugger: debugger::Debugger::new(),
            outputs: Outputs::default(),
            tick: 0,
            in_reset: false,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return registers, decoder and PWM counter to power-on state.
    ///
    /// Watchpoints and the tick counter are kept.
    pub fn reset(&mut self) {
        self.sync.reset();
        self.decoder.reset();
        self.regs.reset();
        self.pwm.reset();
        self.outputs = Outputs::default();
    }

    /// Levels driven during the last tick.
    pub fn outputs(&self) -> Outputs {
        self.outputs
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Advance one core clock tick.
    ///
    /// `rst_n` low holds everything in reset with all outputs low.
    pub fn tick(&mut self, pins: Pins, rst_n: bool) -> Outputs {
        let now = self.tick;
        self.tick += 1;

        if !rst_n {
            if !self.in_reset {
                info!(tick = now, "reset asserted");
                self.in_reset = true;
            }
            self.reset();
            return self.outputs;
        }
        if self.in_reset {
            info!(tick = now, "reset released");
            self.in_reset = false;
        }

        let synced = self.sync.sample(pins);
        if let Some(event) = self.decoder.step(synced) {
            self.apply(event, now);
        }

        let carrier = self.pwm.tick(self.regs.pwm_duty());
        self.outputs = peripherals::drive(&self.regs, carrier);
        self.outputs
    }

    /// [`tick`](Self::tick) with the bus inputs packed as the `ui_in` byte
    /// (bit 0 = SCLK, bit 1 = COPI, bit 2 = nCS; other bits unused).
    pub fn tick_ui_in(&mut self, ui_in: u8, rst_n: bool) -> Outputs {
        self.tick(Pins::from_ui_in(ui_in), rst_n)
    }

    /// Run `n` ticks with fixed pin levels and reset deasserted.
    pub fn run(&mut self, pins: Pins, n: u64) -> Outputs {
        for _ in 0..n {
            self.tick(pins, true);
        }
        self.outputs
    }

    fn apply(&mut self, event: peripherals::DecodeEvent, now: u64) {
        match event {
            peripherals::DecodeEvent::Commit { register, value } => {
                let old = self.regs.set(register, value);
                if old != value {
                    debug!(tick = now, "{} 0x{:02X} -> 0x{:02X}", register.name(), old, value);
                }
                if self.debugger.active() {
                    self.debugger.check_commit(register.addr(), old, value, now);
                }
            }
            peripherals::DecodeEvent::Discard(reason) => {
                if self.debugger.active() {
                    self.debugger.check_discard(&reason, now);
                }
            }
        }
    }

    /// Capture the current state.
    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            tick: self.tick,
            registers: self.regs.values(),
            pwm: self.pwm.save_state(),
            decoder: self.decoder.save_state(),
            uo_out: self.outputs.uo_out,
            uio_out: self.outputs.uio_out,
            uio_oe: self.outputs.uio_oe,
        }
    }

    /// Restore a captured state. The bus restarts idle.
    pub fn load_state(&mut self, s: &savestate::SaveState) {
        self.tick = s.tick;
        self.in_reset = false;
        self.sync.reset();
        self.regs.load_values(s.registers);
        self.pwm.load_state(&s.pwm);
        self.decoder.load_state(&s.decoder);
        self.outputs = Outputs { uo_out: s.uo_out, uio_out: s.uio_out, uio_oe: s.uio_oe };
    }
}

impl Default for Peripheral {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::WatchKind;

    fn fast_config() -> Config {
        let mut c = Config::default();
        c.bus.half_sclk_ticks = 2;
        c.bus.settle_ticks = 4;
        c
    }

    fn send(p: &mut Peripheral, t: Transaction) -> Outputs {
        let m = SpiMaster::from_config(&p.config().bus);
        let mut out = p.outputs();
        for pins in m.waveform(&t) {
            out = p.tick(pins, true);
        }
        out
    }

    fn write(p: &mut Peripheral, addr: u8, data: u8) -> Outputs {
        send(p, Transaction::write(addr, data).unwrap())
    }

    #[test]
    fn test_power_on_state() {
        let p = Peripheral::new();
        assert_eq!(p.outputs(), Outputs::default());
        assert_eq!(p.regs.values(), [0; 4]);
        assert_eq!(p.pwm.period(), 3333);
    }

    #[test]
    fn test_with_config_rejects_zero_carrier() {
        let mut c = Config::default();
        c.pwm.target_hz = 0;
        assert!(matches!(Peripheral::with_config(c.clone()), Err(Error::Config(_))));
        assert!(matches!(Bench::new(c), Err(Error::Config(_))));
    }

    #[test]
    fn test_enable_and_direct_output() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        let out = write(&mut p, 0x00, 0xF0);
        assert_eq!(out.uo_out, 0xF0);
        let out = write(&mut p, 0x01, 0xCC);
        assert_eq!(out.uio_out, 0xCC);
        assert_eq!(out.uio_oe, 0xFF);
        assert_eq!(out.uo_out, 0xF0);
    }

    #[test]
    fn test_commit_visible_tick_after_cs_rise() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        let m = SpiMaster::from_config(&p.config().bus);
        let t = Transaction::write(0x00, 0x01).unwrap();
        let pins: Vec<Pins> = m.waveform(&t).collect();
        let cs_rise = m.select_ticks() as usize;
        for (i, pin) in pins.iter().enumerate() {
            let out = p.tick(*pin, true);
            if i <= cs_rise {
                assert_eq!(out.uo_out, 0, "tick {}", i);
            } else {
                assert_eq!(out.uo_out, 0x01, "tick {}", i);
            }
        }
    }

    #[test]
    fn test_invalid_frames_leave_registers() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        write(&mut p, 0x00, 0xF0);
        write(&mut p, 0x01, 0xCC);
        let before = p.regs.clone();
        write(&mut p, 0x30, 0xAA);
        send(&mut p, Transaction::read(0x30, 0xBE).unwrap());
        send(&mut p, Transaction::read(0x00, 0xEF).unwrap());
        write(&mut p, 0x03, 0x55);
        assert_eq!(p.regs, before);
        assert_eq!(p.decoder.dbg_discards, 4);
        assert_eq!(p.outputs().uo_out, 0xF0);
    }

    #[test]
    fn test_ui_in_drives_bus() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        let m = SpiMaster::from_config(&p.config().bus);
        let mut out = p.outputs();
        for pins in m.waveform(&Transaction::write(0x01, 0xA5).unwrap()) {
            // Unused upper bits must not disturb decoding.
            out = p.tick_ui_in(0xF8 | pins.to_ui_in(), true);
        }
        assert_eq!(out.uio_out, 0xA5);
        assert_eq!(p.decoder.dbg_commits, 1);
    }

    #[test]
    fn test_pwm_on_pin0() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        write(&mut p, 0x00, 0x01);
        write(&mut p, 0x02, 0x01);
        write(&mut p, 0x04, 0xFF);
        p.run(Pins::IDLE, 3333);
        let highs = (0..3333).filter(|_| p.tick(Pins::IDLE, true).pin0()).count();
        assert_eq!(highs, 3333);

        write(&mut p, 0x04, 0x00);
        p.run(Pins::IDLE, 3333);
        let highs = (0..3333).filter(|_| p.tick(Pins::IDLE, true).pin0()).count();
        assert_eq!(highs, 0);

        write(&mut p, 0x04, 0x80);
        p.run(Pins::IDLE, 3333);
        let highs = (0..3333).filter(|_| p.tick(Pins::IDLE, true).pin0()).count();
        assert_eq!(highs, 1674);
    }

    #[test]
    fn test_reset_forces_defaults() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        write(&mut p, 0x00, 0xFF);
        write(&mut p, 0x01, 0x5A);
        let out = p.tick(Pins::IDLE, false);
        assert_eq!(out, Outputs::default());
        assert_eq!(p.regs.values(), [0; 4]);
        // Frames clocked during reset are ignored.
        let m = SpiMaster::from_config(&p.config().bus);
        for pins in m.waveform(&Transaction::write(0x00, 0xFF).unwrap()) {
            assert_eq!(p.tick(pins, false), Outputs::default());
        }
        p.tick(Pins::IDLE, true);
        assert_eq!(p.regs.values(), [0; 4]);
    }

    #[test]
    fn test_sync_stages_delay_commit() {
        let mut c = fast_config();
        c.bus.sync_stages = 2;
        let mut p = Peripheral::with_config(c).unwrap();
        let m = SpiMaster::from_config(&p.config().bus);
        let pins: Vec<Pins> = m.waveform(&Transaction::write(0x00, 0x01).unwrap()).collect();
        let cs_rise = m.select_ticks() as usize;
        let first_high = pins
            .iter()
            .position(|pin| p.tick(*pin, true).uo_out == 0x01)
            .unwrap();
        assert_eq!(first_high, cs_rise + 1 + 2);
    }

    #[test]
    fn test_watchpoint_reports_commit() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        p.debugger.add_watchpoint(0x04, WatchKind::Commit);
        write(&mut p, 0x00, 0x01);
        assert!(p.debugger.take_hit().is_none());
        write(&mut p, 0x04, 0x80);
        let hit = p.debugger.take_hit().unwrap();
        assert_eq!((hit.addr, hit.old_val, hit.new_val), (0x04, 0x00, 0x80));
    }

    #[test]
    fn test_save_and_load_state() {
        let mut p = Peripheral::with_config(fast_config()).unwrap();
        write(&mut p, 0x00, 0x01);
        write(&mut p, 0x02, 0x01);
        write(&mut p, 0x04, 0x80);
        p.run(Pins::IDLE, 1234);
        let state = p.save_state();
        let bytes = savestate::to_bytes(&state).unwrap();

        let mut q = Peripheral::with_config(fast_config()).unwrap();
        q.load_state(&savestate::from_bytes(&bytes).unwrap());
        assert_eq!(q.ticks(), p.ticks());
        assert_eq!(q.regs, p.regs);
        for _ in 0..5000 {
            assert_eq!(q.tick(Pins::IDLE, true), p.tick(Pins::IDLE, true));
        }
    }
}
