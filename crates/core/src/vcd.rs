//! Value Change Dump (IEEE 1364 VCD) waveform writer.
//!
//! Records the bus inputs (as single wires and as the packed `ui_in` byte),
//! reset and both output buses once per tick, but only
//! emits the signals that changed. Output opens in any VCD viewer
//! (GTKWave, Surfer).

use std::io::Write;

use crate::error::Result;
use crate::peripherals::{Outputs, Pins};

/// One tick's worth of observable signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub rst_n: bool,
    pub pins: Pins,
    pub outputs: Outputs,
}

// Short identifier codes, one per signal.
const ID_RST_N: char = '!';
const ID_NCS: char = '"';
const ID_SCLK: char = '#';
const ID_COPI: char = '$';
const ID_UO_OUT: char = '%';
const ID_UIO_OUT: char = '&';
const ID_UI_IN: char = '\'';

pub struct VcdWriter<W: Write> {
    out: W,
    tick_ns: f64,
    last: Option<Sample>,
    last_time: u64,
}

impl<W: Write> VcdWriter<W> {
    /// Write the header and return a writer ready for samples.
    pub fn new(mut out: W, tick_ns: f64) -> Result<Self> {
        writeln!(out, "$version spipwm-core {} $end", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "$timescale 1ns $end")?;
        writeln!(out, "$scope module spipwm $end")?;
        writeln!(out, "$var wire 1 {} rst_n $end", ID_RST_N)?;
        writeln!(out, "$var wire 1 {} ncs $end", ID_NCS)?;
        writeln!(out, "$var wire 1 {} sclk $end", ID_SCLK)?;
        writeln!(out, "$var wire 1 {} copi $end", ID_COPI)?;
        writeln!(out, "$var wire 8 {} uo_out [7:0] $end", ID_UO_OUT)?;
        writeln!(out, "$var wire 8 {} uio_out [7:0] $end", ID_UIO_OUT)?;
        writeln!(out, "$var wire 8 {} ui_in [7:0] $end", ID_UI_IN)?;
        writeln!(out, "$upscope $end")?;
        writeln!(out, "$enddefinitions $end")?;
        Ok(VcdWriter { out, tick_ns, last: None, last_time: 0 })
    }

    fn time_of(&self, tick: u64) -> u64 {
        (tick as f64 * self.tick_ns).round() as u64
    }

    /// Record the signals seen at `tick`. Unchanged samples write nothing.
    pub fn record(&mut self, tick: u64, sample: Sample) -> Result<()> {
        let time = self.time_of(tick);
        match self.last {
            None => {
                writeln!(self.out, "#{}", time)?;
                writeln!(self.out, "$dumpvars")?;
                self.write_scalar(ID_RST_N, sample.rst_n)?;
                self.write_scalar(ID_NCS, sample.pins.ncs)?;
                self.write_scalar(ID_SCLK, sample.pins.sclk)?;
                self.write_scalar(ID_COPI, sample.pins.copi)?;
                self.write_vector(ID_UO_OUT, sample.outputs.uo_out)?;
                self.write_vector(ID_UIO_OUT, sample.outputs.uio_out)?;
                self.write_vector(ID_UI_IN, sample.pins.to_ui_in())?;
                writeln!(self.out, "$end")?;
            }
            Some(prev) if prev == sample => return Ok(()),
            Some(prev) => {
                writeln!(self.out, "#{}", time)?;
                if prev.rst_n != sample.rst_n { self.write_scalar(ID_RST_N, sample.rst_n)?; }
                if prev.pins.ncs != sample.pins.ncs { self.write_scalar(ID_NCS, sample.pins.ncs)?; }
                if prev.pins.sclk != sample.pins.sclk { self.write_scalar(ID_SCLK, sample.pins.sclk)?; }
                if prev.pins.copi != sample.pins.copi { self.write_scalar(ID_COPI, sample.pins.copi)?; }
                if prev.outputs.uo_out != sample.outputs.uo_out {
                    self.write_vector(ID_UO_OUT, sample.outputs.uo_out)?;
                }
                if prev.outputs.uio_out != sample.outputs.uio_out {
                    self.write_vector(ID_UIO_OUT, sample.outputs.uio_out)?;
                }
                if prev.pins != sample.pins {
                    self.write_vector(ID_UI_IN, sample.pins.to_ui_in())?;
                }
            }
        }
        self.last = Some(sample);
        self.last_time = time;
        Ok(())
    }

    /// Write a closing timestamp at `tick`, flush, and hand back the sink.
    pub fn finish(mut self, tick: u64) -> Result<W> {
        let time = self.time_of(tick);
        if time > self.last_time {
            writeln!(self.out, "#{}", time)?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_scalar(&mut self, id: char, v: bool) -> Result<()> {
        writeln!(self.out, "{}{}", v as u8, id)?;
        Ok(())
    }

    fn write_vector(&mut self, id: char, v: u8) -> Result<()> {
        writeln!(self.out, "b{:08b} {}", v, id)?;
        Ok(())
    }
}
