//! PWM carrier generator and output pin multiplexer.
//!
//! A free-running counter steps once per core tick over `period` ticks
//! (3333 at 10 MHz for a 3 kHz carrier). The carrier is high while
//! `counter < threshold`, with `threshold = ceil(duty * period / 255)`, so
//! duty 0 never rises and duty 255 never falls.
//!
//! With [`DutyUpdate::CycleBoundary`] the duty register is sampled only when
//! the counter is at 0, so a write in the middle of a carrier cycle cannot
//! produce a runt or doubled pulse.

use tracing::debug;

use super::regs::RegisterFile;
use crate::config::DutyUpdate;

pub struct PwmGenerator {
    period: u32,
    policy: DutyUpdate,
    counter: u32,
    /// Duty value in effect for the current carrier cycle
    duty: u8,
    threshold: u32,
    level: bool,
    // Debug counters
    pub dbg_cycles: u64,
}

impl PwmGenerator {
    pub fn new(period: u32, policy: DutyUpdate) -> Self {
        PwmGenerator {
            period: period.max(1),
            policy,
            counter: 0,
            duty: 0,
            threshold: 0,
            level: false,
            dbg_cycles: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = PwmGenerator::new(self.period, self.policy);
    }

    /// Comparator threshold in ticks for a duty value.
    pub fn threshold_for(duty: u8, period: u32) -> u32 {
        ((duty as u64 * period as u64 + 254) / 255) as u32
    }

    /// Advance one tick against the current duty register value.
    /// Returns the carrier level for this tick.
    pub fn tick(&mut self, duty_reg: u8) -> bool {
        let latch = match self.policy {
            DutyUpdate::CycleBoundary => self.counter == 0,
            DutyUpdate::Immediate => true,
        };
        if latch && duty_reg != self.duty {
            debug!(old = self.duty, new = duty_reg, counter = self.counter, "duty latched");
            self.duty = duty_reg;
            self.threshold = Self::threshold_for(duty_reg, self.period);
        }

        self.level = self.counter < self.threshold;

        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            self.dbg_cycles += 1;
        }
        self.level
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Duty value currently driving the comparator.
    pub fn active_duty(&self) -> u8 {
        self.duty
    }

    pub fn level(&self) -> bool {
        self.level
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::PwmState {
        crate::savestate::PwmState {
            counter: self.counter,
            duty: self.duty,
            level: self.level,
            cycles: self.dbg_cycles,
        }
    }

    /// Restore state from save state. The counter is folded into the
    /// current period in case the configuration changed.
    pub fn load_state(&mut self, s: &crate::savestate::PwmState) {
        self.counter = s.counter % self.period;
        self.duty = s.duty;
        self.threshold = Self::threshold_for(s.duty, self.period);
        self.level = s.level;
        self.dbg_cycles = s.cycles;
    }
}

/// Levels on the two output buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outputs {
    pub uo_out: u8,
    pub uio_out: u8,
    /// Output enables for `uio_out`
    pub uio_oe: u8,
}

impl Outputs {
    /// The direct/PWM multiplexed pin (`uo_out[0]`).
    pub fn pin0(&self) -> bool {
        self.uo_out & 1 != 0
    }

    pub fn bit(&self, bit: u8) -> bool {
        (self.uo_out >> (bit & 7)) & 1 != 0
    }
}

/// Combine register state and the carrier into pin levels.
///
/// Per `uo_out` bit: disabled → low, enabled and PWM-selected → carrier,
/// enabled otherwise → high. `uio_out` mirrors the direct output register.
pub fn drive(regs: &RegisterFile, carrier: bool) -> Outputs {
    let carrier_mask = if carrier { 0xFF } else { 0x00 };
    Outputs {
        uo_out: regs.output_enable() & (!regs.pwm_mode() | carrier_mask),
        uio_out: regs.direct_output(),
        uio_oe: 0xFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::regs::Register;

    const PERIOD: u32 = 3333;

    fn high_ticks(g: &mut PwmGenerator, duty: u8, ticks: u32) -> u32 {
        (0..ticks).filter(|_| g.tick(duty)).count() as u32
    }

    #[test]
    fn test_threshold() {
        assert_eq!(PwmGenerator::threshold_for(0, PERIOD), 0);
        assert_eq!(PwmGenerator::threshold_for(255, PERIOD), PERIOD);
        assert_eq!(PwmGenerator::threshold_for(128, PERIOD), 1674);
        assert_eq!(PwmGenerator::threshold_for(1, PERIOD), 14);
    }

    #[test]
    fn test_zero_duty_never_high() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::CycleBoundary);
        assert_eq!(high_ticks(&mut g, 0, PERIOD * 3), 0);
    }

    #[test]
    fn test_full_duty_never_low() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::CycleBoundary);
        assert_eq!(high_ticks(&mut g, 255, PERIOD * 3), PERIOD * 3);
    }

    #[test]
    fn test_half_duty_per_cycle() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::CycleBoundary);
        assert_eq!(high_ticks(&mut g, 0x80, PERIOD), 1674);
        assert_eq!(high_ticks(&mut g, 0x80, PERIOD), 1674);
        assert_eq!(g.dbg_cycles, 2);
    }

    #[test]
    fn test_counter_wraps() {
        let mut g = PwmGenerator::new(4, DutyUpdate::CycleBoundary);
        let seen: Vec<u32> = (0..6).map(|_| { let c = g.counter(); g.tick(0); c }).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_boundary_latch_defers_mid_cycle_write() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::CycleBoundary);
        // Run past the falling edge of a 50 % cycle.
        for _ in 0..2000 { g.tick(0x80); }
        assert!(!g.level());
        // Raising duty mid-cycle must not re-raise the output in this cycle.
        for _ in 2000..PERIOD {
            assert!(!g.tick(0xFF));
        }
        assert_eq!(g.counter(), 0);
        assert!(g.tick(0xFF));
        assert_eq!(g.active_duty(), 0xFF);
    }

    #[test]
    fn test_immediate_policy() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::Immediate);
        for _ in 0..2000 { g.tick(0x80); }
        assert!(g.tick(0xFF));
    }

    #[test]
    fn test_reset_restarts_cycle() {
        let mut g = PwmGenerator::new(PERIOD, DutyUpdate::CycleBoundary);
        for _ in 0..100 { g.tick(0x40); }
        g.reset();
        assert_eq!(g.counter(), 0);
        assert_eq!(g.active_duty(), 0);
        assert_eq!(g.period(), PERIOD);
    }

    #[test]
    fn test_drive_static_and_enable() {
        let mut regs = RegisterFile::new();
        assert_eq!(drive(&regs, true), Outputs { uo_out: 0, uio_out: 0, uio_oe: 0xFF });

        regs.set(Register::OutputEnable, 0xF0);
        assert_eq!(drive(&regs, false).uo_out, 0xF0);
        assert_eq!(drive(&regs, true).uo_out, 0xF0);

        regs.set(Register::DirectOutput, 0xCC);
        assert_eq!(drive(&regs, false).uio_out, 0xCC);
    }

    #[test]
    fn test_drive_pwm_select() {
        let mut regs = RegisterFile::new();
        regs.set(Register::PwmMode, 0x01);
        // Selected but not enabled: held low.
        assert!(!drive(&regs, true).pin0());

        regs.set(Register::OutputEnable, 0x01);
        assert!(drive(&regs, true).pin0());
        assert!(!drive(&regs, false).pin0());

        // Other enabled bits stay static high.
        regs.set(Register::OutputEnable, 0x03);
        assert_eq!(drive(&regs, false).uo_out, 0x02);
        assert!(drive(&regs, false).bit(1));
    }
}
