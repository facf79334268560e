//! Test bench around a [`Peripheral`].
//!
//! Plays the part of the external controller: drives reset and the bus pins,
//! issues transactions through an [`SpiMaster`], waits for output edges and
//! measures the PWM carrier the same way a logic-analyzer style check would
//! (one rising-to-rising period, then one rising-to-falling high time).

use std::io::Write;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::master::{SpiMaster, Transaction};
use crate::peripherals::{Outputs, Pins};
use crate::probe::{Edge, EdgeDetector, Measurement};
use crate::vcd::{Sample, VcdWriter};
use crate::Peripheral;

/// Ticks `reset` holds `rst_n` low, then waits after release.
pub const DEFAULT_RESET_TICKS: u32 = 5;
/// Edge wait limit: 10 ms of simulated time at 10 MHz.
pub const DEFAULT_EDGE_TIMEOUT_TICKS: u64 = 100_000;

pub struct Bench {
    pub dut: Peripheral,
    master: SpiMaster,
    /// Bus inputs as the packed `ui_in` byte
    ui_in: u8,
    rst_n: bool,
    vcd: Option<VcdWriter<Box<dyn Write>>>,
}

impl Bench {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Bench {
            master: SpiMaster::from_config(&config.bus),
            dut: Peripheral::with_config(config)?,
            ui_in: Pins::IDLE.to_ui_in(),
            rst_n: true,
            vcd: None,
        })
    }

    /// Dump every tick from now on as VCD into `out`.
    pub fn with_vcd(mut self, out: Box<dyn Write>) -> Result<Self> {
        self.vcd = Some(VcdWriter::new(out, self.dut.config().tick_ns())?);
        Ok(self)
    }

    pub fn outputs(&self) -> Outputs {
        self.dut.outputs()
    }

    /// Advance one tick with the current pin and reset levels.
    pub fn step(&mut self) -> Result<Outputs> {
        let now = self.dut.ticks();
        let outputs = self.dut.tick_ui_in(self.ui_in, self.rst_n);
        if let Some(vcd) = self.vcd.as_mut() {
            let pins = Pins::from_ui_in(self.ui_in);
            vcd.record(now, Sample { rst_n: self.rst_n, pins, outputs })?;
        }
        Ok(outputs)
    }

    pub fn idle(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Hold `rst_n` low for `ticks`, release it and wait `ticks` more.
    pub fn reset(&mut self, ticks: u32) -> Result<()> {
        info!(ticks, "bench reset");
        self.ui_in = Pins::IDLE.to_ui_in();
        self.rst_n = false;
        self.idle(ticks as u64)?;
        self.rst_n = true;
        self.idle(ticks as u64)
    }

    /// Clock one transaction onto the bus, settle time included.
    pub fn send(&mut self, t: &Transaction) -> Result<()> {
        debug!(write = t.write, addr = t.addr, data = t.data, "transaction");
        for pins in self.master.waveform(t) {
            self.ui_in = pins.to_ui_in();
            self.step()?;
        }
        self.ui_in = Pins::IDLE.to_ui_in();
        Ok(())
    }

    pub fn write(&mut self, addr: u8, data: u8) -> Result<()> {
        self.send(&Transaction::write(addr, data)?)
    }

    pub fn read(&mut self, addr: u8, data: u8) -> Result<()> {
        self.send(&Transaction::read(addr, data)?)
    }

    /// Run until `uo_out[bit]` shows `edge`; returns the tick it was seen on.
    pub fn wait_edge(&mut self, bit: u8, edge: Edge, timeout_ticks: u64) -> Result<u64> {
        let mut detector = EdgeDetector::with_level(self.dut.outputs().bit(bit));
        for _ in 0..timeout_ticks {
            let now = self.dut.ticks();
            let level = self.step()?.bit(bit);
            if detector.update(level) == Some(edge) {
                return Ok(now);
            }
        }
        Err(Error::EdgeTimeout { bit, edge, ticks: timeout_ticks })
    }

    /// Measure the carrier on `uo_out[bit]`: period from two consecutive
    /// rising edges, then high time from the next rising to falling edge.
    pub fn measure_pwm(&mut self, bit: u8, timeout_ticks: u64) -> Result<Measurement> {
        let r1 = self.wait_edge(bit, Edge::Rising, timeout_ticks)?;
        let r2 = self.wait_edge(bit, Edge::Rising, timeout_ticks)?;
        let r3 = self.wait_edge(bit, Edge::Rising, timeout_ticks)?;
        let f = self.wait_edge(bit, Edge::Falling, timeout_ticks)?;
        let m = Measurement::from_ticks(r2 - r1, f - r3, self.dut.config().tick_ns())
            .ok_or_else(|| Error::EdgeTimeout { bit, edge: Edge::Rising, ticks: timeout_ticks })?;
        info!(bit, "{}", m);
        Ok(m)
    }

    /// Close the waveform dump (if any) and hand back the peripheral.
    pub fn finish(self) -> Result<Peripheral> {
        if let Some(vcd) = self.vcd {
            vcd.finish(self.dut.ticks())?;
        }
        Ok(self.dut)
    }
}
