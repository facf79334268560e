//! Output waveform measurement.
//!
//! [`EdgeDetector`] turns a per-tick level into rising/falling events;
//! [`PwmProbe`] records them passively and reports the timing of the last
//! complete carrier cycle as a [`Measurement`].

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => write!(f, "rising"),
            Edge::Falling => write!(f, "falling"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    prev: Option<bool>,
}

impl EdgeDetector {
    pub fn new() -> Self {
        EdgeDetector { prev: None }
    }

    /// Start from a known level so the first sample can already be an edge.
    pub fn with_level(level: bool) -> Self {
        EdgeDetector { prev: Some(level) }
    }

    pub fn update(&mut self, level: bool) -> Option<Edge> {
        let edge = match (self.prev, level) {
            (Some(false), true) => Some(Edge::Rising),
            (Some(true), false) => Some(Edge::Falling),
            _ => None,
        };
        self.prev = Some(level);
        edge
    }
}

/// Timing of one carrier cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub period_ticks: u64,
    pub high_ticks: u64,
    pub frequency_hz: f64,
    pub duty_percent: f64,
}

impl Measurement {
    /// `None` for a zero period.
    pub fn from_ticks(period_ticks: u64, high_ticks: u64, tick_ns: f64) -> Option<Self> {
        if period_ticks == 0 {
            return None;
        }
        let period_ns = period_ticks as f64 * tick_ns;
        Some(Measurement {
            period_ticks,
            high_ticks,
            frequency_hz: 1e9 / period_ns,
            duty_percent: high_ticks as f64 / period_ticks as f64 * 100.0,
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period {} ticks ({:.2} Hz), high {} ticks ({:.3} %)",
            self.period_ticks, self.frequency_hz, self.high_ticks, self.duty_percent)
    }
}

/// Passive recorder for one `uo_out` bit.
#[derive(Debug, Clone)]
pub struct PwmProbe {
    pub bit: u8,
    detector: EdgeDetector,
    last_rise: Option<u64>,
    last_fall: Option<u64>,
    /// (period, high) of the last complete cycle
    last_cycle: Option<(u64, u64)>,
    pub rising_edges: u64,
    pub falling_edges: u64,
}

impl PwmProbe {
    pub fn new(bit: u8) -> Self {
        PwmProbe {
            bit: bit & 7,
            detector: EdgeDetector::new(),
            last_rise: None,
            last_fall: None,
            last_cycle: None,
            rising_edges: 0,
            falling_edges: 0,
        }
    }

    /// Feed the `uo_out` value observed at `tick`.
    ///
    /// A tick earlier than the last recorded edge (a restored state) drops
    /// the partial cycle; the last complete measurement is kept.
    pub fn record(&mut self, tick: u64, uo_out: u8) {
        if self.last_rise.max(self.last_fall).is_some_and(|t| tick < t) {
            self.last_rise = None;
            self.last_fall = None;
        }
        let level = (uo_out >> self.bit) & 1 != 0;
        match self.detector.update(level) {
            Some(Edge::Rising) => {
                self.rising_edges += 1;
                if let (Some(r), Some(f)) = (self.last_rise, self.last_fall) {
                    if f > r {
                        self.last_cycle = Some((tick - r, f - r));
                    }
                }
                self.last_rise = Some(tick);
            }
            Some(Edge::Falling) => {
                self.falling_edges += 1;
                self.last_fall = Some(tick);
            }
            None => {}
        }
    }

    /// Timing of the last rise → fall → rise sequence seen.
    pub fn measurement(&self, tick_ns: f64) -> Option<Measurement> {
        self.last_cycle.and_then(|(period, high)| Measurement::from_ticks(period, high, tick_ns))
    }
}
