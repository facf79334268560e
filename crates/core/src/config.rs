//! Peripheral and bench configuration.
//!
//! Every field has a default matching the regression bench (10 MHz core
//! clock, 3 kHz PWM carrier, 5 µs SCLK half period), so an empty JSON object
//! is a valid configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

mod defaults {
    /// Core clock: 10 MHz, one tick every 100 ns.
    pub const CORE_HZ: u32 = 10_000_000;
    /// PWM carrier target frequency.
    pub const PWM_TARGET_HZ: u32 = 3_000;
    /// Synchronizer depth between the pins and the decoder.
    pub const SYNC_STAGES: usize = 0;
    /// Bench SCLK half period in core ticks (5 µs at 10 MHz).
    pub const HALF_SCLK_TICKS: u32 = 50;
    /// Idle ticks the bench inserts after raising nCS.
    pub const SETTLE_TICKS: u32 = 600;
    /// Deepest synchronizer accepted by `Config::validate`.
    pub const MAX_SYNC_STAGES: usize = 8;
}

/// When a new duty value reaches the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DutyUpdate {
    /// Latch the duty register when the counter wraps, so a carrier cycle is
    /// never cut short or doubled.
    #[default]
    CycleBoundary,
    /// Compare against the live register value every tick.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub core_hz: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig { core_hz: defaults::CORE_HZ }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub target_hz: u32,
    pub duty_update: DutyUpdate,
}

impl Default for PwmConfig {
    fn default() -> Self {
        PwmConfig { target_hz: defaults::PWM_TARGET_HZ, duty_update: DutyUpdate::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub sync_stages: usize,
    pub half_sclk_ticks: u32,
    pub settle_ticks: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            sync_stages: defaults::SYNC_STAGES,
            half_sclk_ticks: defaults::HALF_SCLK_TICKS,
            settle_ticks: defaults::SETTLE_TICKS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub clock: ClockConfig,
    pub pwm: PwmConfig,
    pub bus: BusConfig,
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clock.core_hz == 0 {
            return Err(Error::Config("clock.core_hz must be non-zero".into()));
        }
        if self.pwm.target_hz == 0 {
            return Err(Error::Config("pwm.target_hz must be non-zero".into()));
        }
        if self.pwm_period_ticks() < 2 {
            return Err(Error::Config(format!(
                "pwm.target_hz {} is too close to clock.core_hz {}",
                self.pwm.target_hz, self.clock.core_hz
            )));
        }
        if self.bus.half_sclk_ticks == 0 {
            return Err(Error::Config("bus.half_sclk_ticks must be non-zero".into()));
        }
        if self.bus.sync_stages > defaults::MAX_SYNC_STAGES {
            return Err(Error::Config(format!(
                "bus.sync_stages {} exceeds {}",
                self.bus.sync_stages,
                defaults::MAX_SYNC_STAGES
            )));
        }
        Ok(())
    }

    /// Carrier period in core ticks (3333 with the defaults, 0 when
    /// `target_hz` is 0).
    pub fn pwm_period_ticks(&self) -> u32 {
        self.clock.core_hz.checked_div(self.pwm.target_hz).unwrap_or(0)
    }

    /// Actual carrier frequency after integer division of the core clock.
    pub fn pwm_frequency_hz(&self) -> f64 {
        self.clock.core_hz as f64 / self.pwm_period_ticks() as f64
    }

    /// Length of one core tick in nanoseconds.
    pub fn tick_ns(&self) -> f64 {
        1e9 / self.clock.core_hz as f64
    }
}
