//! Scripted stimulus and checks.
//!
//! A scenario is a named list of steps, loadable from JSON:
//!
//! ```json
//! {
//!   "name": "half duty",
//!   "steps": [
//!     { "op": "reset" },
//!     { "op": "write", "addr": 0, "data": 1 },
//!     { "op": "write", "addr": 2, "data": 1 },
//!     { "op": "write", "addr": 4, "data": 128 },
//!     { "op": "measure_pwm", "min_duty": 49.5, "max_duty": 50.5 }
//!   ]
//! }
//! ```
//!
//! [`run`] executes the steps on a [`Bench`] and stops at the first failed
//! expectation. [`builtin`] holds the regression scenarios for the register
//! interface and the PWM carrier.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::bench::{Bench, DEFAULT_EDGE_TIMEOUT_TICKS, DEFAULT_RESET_TICKS};
use crate::debugger::WatchHit;
use crate::error::{Error, Result};
use crate::probe::Measurement;

/// Which output bus an expectation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bus {
    UoOut,
    UioOut,
}

fn default_reset_ticks() -> u32 {
    DEFAULT_RESET_TICKS
}

fn default_timeout() -> u64 {
    DEFAULT_EDGE_TIMEOUT_TICKS
}

fn full_mask() -> u8 {
    0xFF
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Reset {
        #[serde(default = "default_reset_ticks")]
        ticks: u32,
    },
    Write { addr: u8, data: u8 },
    Read {
        addr: u8,
        #[serde(default)]
        data: u8,
    },
    Wait { ticks: u64 },
    /// Compare `(bus & mask)` against `value & mask`.
    ExpectOutput {
        bus: Bus,
        value: u8,
        #[serde(default = "full_mask")]
        mask: u8,
    },
    ExpectRegister { addr: u8, value: u8 },
    MeasurePwm {
        #[serde(default)]
        bit: u8,
        #[serde(default = "default_timeout")]
        timeout_ticks: u64,
        #[serde(default)]
        min_hz: Option<f64>,
        #[serde(default)]
        max_hz: Option<f64>,
        #[serde(default)]
        min_duty: Option<f64>,
        #[serde(default)]
        max_duty: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What a completed run observed.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub name: String,
    pub steps: usize,
    /// Bench ticks spent in this run
    pub ticks: u64,
    pub measurements: Vec<Measurement>,
    pub watch_hits: Vec<WatchHit>,
}

/// Execute `scenario` on `bench`. Errors carry the 1-based step number.
pub fn run(bench: &mut Bench, scenario: &Scenario) -> Result<Report> {
    info!(name = %scenario.name, steps = scenario.steps.len(), "scenario start");
    let start = bench.dut.ticks();
    let mut report = Report { name: scenario.name.clone(), ..Report::default() };

    for (i, step) in scenario.steps.iter().enumerate() {
        let n = i + 1;
        run_step(bench, step, n, &mut report)?;
        if let Some(hit) = bench.dut.debugger.take_hit() {
            info!(step = n, addr = hit.addr, old = hit.old_val, new = hit.new_val, "watchpoint");
            report.watch_hits.push(hit);
        }
        report.steps = n;
    }

    report.ticks = bench.dut.ticks() - start;
    info!(name = %scenario.name, ticks = report.ticks, "scenario passed");
    Ok(report)
}

fn fail(step: usize, message: String) -> Error {
    warn!(step, "{}", message);
    Error::Expectation { step, message }
}

fn check_range(step: usize, what: &str, v: f64, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let Some(lo) = min {
        if v < lo {
            return Err(fail(step, format!("{} {:.3} below {:.3}", what, v, lo)));
        }
    }
    if let Some(hi) = max {
        if v > hi {
            return Err(fail(step, format!("{} {:.3} above {:.3}", what, v, hi)));
        }
    }
    Ok(())
}

fn run_step(bench: &mut Bench, step: &Step, n: usize, report: &mut Report) -> Result<()> {
    match *step {
        Step::Reset { ticks } => bench.reset(ticks),
        Step::Write { addr, data } => bench.write(addr, data),
        Step::Read { addr, data } => bench.read(addr, data),
        Step::Wait { ticks } => bench.idle(ticks),
        Step::ExpectOutput { bus, value, mask } => {
            let out = bench.outputs();
            let seen = match bus {
                Bus::UoOut => out.uo_out,
                Bus::UioOut => out.uio_out,
            };
            if seen & mask != value & mask {
                return Err(fail(n, format!(
                    "{:?} = 0x{:02X}, expected 0x{:02X} (mask 0x{:02X})",
                    bus, seen, value, mask
                )));
            }
            Ok(())
        }
        Step::ExpectRegister { addr, value } => {
            let seen = bench.dut.regs.get(addr);
            if seen != value {
                return Err(fail(n, format!(
                    "register 0x{:02X} = 0x{:02X}, expected 0x{:02X}", addr, seen, value
                )));
            }
            Ok(())
        }
        Step::MeasurePwm { bit, timeout_ticks, min_hz, max_hz, min_duty, max_duty } => {
            let m = bench.measure_pwm(bit, timeout_ticks)?;
            check_range(n, "frequency Hz", m.frequency_hz, min_hz, max_hz)?;
            check_range(n, "duty %", m.duty_percent, min_duty, max_duty)?;
            report.measurements.push(m);
            Ok(())
        }
    }
}

/// Regression scenarios for the default 10 MHz / 3 kHz configuration.
pub mod builtin {
    use super::*;

    fn write(addr: u8, data: u8) -> Step {
        Step::Write { addr, data }
    }

    fn wait(ticks: u64) -> Step {
        Step::Wait { ticks }
    }

    fn expect(bus: Bus, value: u8) -> Step {
        Step::ExpectOutput { bus, value, mask: 0xFF }
    }

    fn expect_pin0(high: bool) -> Step {
        Step::ExpectOutput { bus: Bus::UoOut, value: high as u8, mask: 0x01 }
    }

    fn reset() -> Step {
        Step::Reset { ticks: DEFAULT_RESET_TICKS }
    }

    /// Register writes land, everything else on the bus is ignored.
    pub fn spi_register_access() -> Scenario {
        Scenario {
            name: "spi_register_access".into(),
            steps: vec![
                reset(),
                write(0x00, 0xF0),
                expect(Bus::UoOut, 0xF0),
                wait(1000),
                write(0x01, 0xCC),
                expect(Bus::UioOut, 0xCC),
                wait(100),
                // Unbacked address
                write(0x30, 0xAA),
                wait(100),
                expect(Bus::UoOut, 0xF0),
                expect(Bus::UioOut, 0xCC),
                // Reads
                Step::Read { addr: 0x30, data: 0xBE },
                wait(100),
                Step::Read { addr: 0x41, data: 0xEF },
                wait(100),
                expect(Bus::UoOut, 0xF0),
                expect(Bus::UioOut, 0xCC),
                Step::ExpectRegister { addr: 0x00, value: 0xF0 },
                Step::ExpectRegister { addr: 0x01, value: 0xCC },
                // PWM on the upper nibble
                write(0x02, 0xFF),
                wait(100),
                write(0x04, 0xCF),
                wait(30000),
                write(0x04, 0xFF),
                wait(30000),
                expect(Bus::UoOut, 0xF0),
                write(0x04, 0x00),
                wait(30000),
                expect(Bus::UoOut, 0x00),
                write(0x04, 0x01),
                wait(30000),
                Step::ExpectRegister { addr: 0x04, value: 0x01 },
            ],
        }
    }

    /// Carrier frequency within ±1 % of 3 kHz.
    pub fn pwm_frequency() -> Scenario {
        Scenario {
            name: "pwm_frequency".into(),
            steps: vec![
                reset(),
                write(0x00, 0x01),
                write(0x02, 0x01),
                write(0x04, 0x80),
                Step::MeasurePwm {
                    bit: 0,
                    timeout_ticks: DEFAULT_EDGE_TIMEOUT_TICKS,
                    min_hz: Some(2970.0),
                    max_hz: Some(3030.0),
                    min_duty: None,
                    max_duty: None,
                },
            ],
        }
    }

    /// 0 %, 50 % and 100 % duty on pin 0.
    pub fn pwm_duty() -> Scenario {
        Scenario {
            name: "pwm_duty".into(),
            steps: vec![
                reset(),
                write(0x00, 0x01),
                write(0x02, 0x01),
                write(0x04, 0x00),
                wait(1000),
                expect_pin0(false),
                write(0x04, 0x80),
                wait(1000),
                Step::MeasurePwm {
                    bit: 0,
                    timeout_ticks: DEFAULT_EDGE_TIMEOUT_TICKS,
                    min_hz: None,
                    max_hz: None,
                    min_duty: Some(49.5),
                    max_duty: Some(50.5),
                },
                write(0x04, 0xFF),
                // New duty reaches the pin at the next carrier cycle.
                wait(4000),
                expect_pin0(true),
            ],
        }
    }

    pub fn all() -> Vec<Scenario> {
        vec![spi_register_access(), pwm_frequency(), pwm_duty()]
    }

    pub fn by_name(name: &str) -> Option<Scenario> {
        all().into_iter().find(|s| s.name == name)
    }
}
