//! Engine configuration.
//!
//! Loaded from TOML at startup and immutable afterwards. Numeric tunables
//! have const `MIN`/`MAX` bounds checked by [`EngineConfig::validate`];
//! every tunable has a `#[serde(default)]` so a minimal file is valid.
//!
//! ```toml
//! tick_period_us = 166
//! num_machines = 2
//!
//! [rig]
//! rig_name = "box-03"
//!
//! [[machines]]
//! index = 0
//! matrix = "matrices/training.toml"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RigIdentity};
use crate::consts::{
    AO_SAMPLE_RATE_HZ_DEFAULT, DAQ_QUEUE_CAPACITY_DEFAULT, LOG_CAPACITY_DEFAULT, LOG_CAPACITY_MAX,
    MAX_DATA_DEFAULT, MAX_MACHINES, NRT_QUEUE_CAPACITY_DEFAULT, NUM_MACHINES_DEFAULT,
    OVERRUN_REPORT_INTERVAL_DEFAULT, QUEUE_CAPACITY_MAX, TICK_PERIOD_US_DEFAULT,
    TICK_PERIOD_US_MAX, TICK_PERIOD_US_MIN, TRANSITION_QUEUE_CAPACITY_DEFAULT,
};

/// Matrix file to load into a machine at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    /// Machine index, `0..num_machines`.
    pub index: usize,
    /// Matrix blob file (`.toml` or `.json`).
    pub matrix: PathBuf,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rig: RigIdentity,

    /// Tick period [µs] (default: 166 ≈ 6 kHz).
    #[serde(default = "default_tick_period_us")]
    pub tick_period_us: u32,

    /// Number of machine instances (default: 6).
    #[serde(default = "default_num_machines")]
    pub num_machines: usize,

    /// Transition records retained per machine.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Deferred network output queue capacity per machine.
    #[serde(default = "default_nrt_queue_capacity")]
    pub nrt_queue_capacity: usize,

    /// DAQ scan queue capacity per machine.
    #[serde(default = "default_daq_queue_capacity")]
    pub daq_queue_capacity: usize,

    /// Transition notification queue capacity per machine.
    #[serde(default = "default_transition_queue_capacity")]
    pub transition_queue_capacity: usize,

    /// AO sample clock [Hz].
    #[serde(default = "default_ao_sample_rate_hz")]
    pub ao_sample_rate_hz: u32,

    /// Largest AO output code.
    #[serde(default = "default_max_data")]
    pub ao_max_data: u16,

    /// Largest DAQ input code.
    #[serde(default = "default_max_data")]
    pub daq_max_data: u16,

    /// Ticks between overrun summaries.
    #[serde(default = "default_overrun_report_interval")]
    pub overrun_report_interval: u64,

    #[serde(default)]
    pub machines: Vec<MachineEntry>,
}

fn default_tick_period_us() -> u32 {
    TICK_PERIOD_US_DEFAULT
}
fn default_num_machines() -> usize {
    NUM_MACHINES_DEFAULT
}
fn default_log_capacity() -> usize {
    LOG_CAPACITY_DEFAULT
}
fn default_nrt_queue_capacity() -> usize {
    NRT_QUEUE_CAPACITY_DEFAULT
}
fn default_daq_queue_capacity() -> usize {
    DAQ_QUEUE_CAPACITY_DEFAULT
}
fn default_transition_queue_capacity() -> usize {
    TRANSITION_QUEUE_CAPACITY_DEFAULT
}
fn default_ao_sample_rate_hz() -> u32 {
    AO_SAMPLE_RATE_HZ_DEFAULT
}
fn default_max_data() -> u16 {
    MAX_DATA_DEFAULT
}
fn default_overrun_report_interval() -> u64 {
    OVERRUN_REPORT_INTERVAL_DEFAULT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rig: RigIdentity::default(),
            tick_period_us: TICK_PERIOD_US_DEFAULT,
            num_machines: NUM_MACHINES_DEFAULT,
            log_capacity: LOG_CAPACITY_DEFAULT,
            nrt_queue_capacity: NRT_QUEUE_CAPACITY_DEFAULT,
            daq_queue_capacity: DAQ_QUEUE_CAPACITY_DEFAULT,
            transition_queue_capacity: TRANSITION_QUEUE_CAPACITY_DEFAULT,
            ao_sample_rate_hz: AO_SAMPLE_RATE_HZ_DEFAULT,
            ao_max_data: MAX_DATA_DEFAULT,
            daq_max_data: MAX_DATA_DEFAULT,
            overrun_report_interval: OVERRUN_REPORT_INTERVAL_DEFAULT,
            machines: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub const AO_SAMPLE_RATE_HZ_MIN: u32 = 1;
    pub const AO_SAMPLE_RATE_HZ_MAX: u32 = 1_000_000;

    /// Tick period in nanoseconds.
    #[inline]
    pub fn tick_period_ns(&self) -> u64 {
        u64::from(self.tick_period_us) * 1_000
    }

    /// Validate parameter bounds and machine entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rig.validate()?;
        check_range(
            "tick_period_us",
            self.tick_period_us as u64,
            TICK_PERIOD_US_MIN as u64,
            TICK_PERIOD_US_MAX as u64,
        )?;
        check_range("num_machines", self.num_machines as u64, 1, MAX_MACHINES as u64)?;
        check_range("log_capacity", self.log_capacity as u64, 1, LOG_CAPACITY_MAX as u64)?;
        for (name, cap) in [
            ("nrt_queue_capacity", self.nrt_queue_capacity),
            ("daq_queue_capacity", self.daq_queue_capacity),
            ("transition_queue_capacity", self.transition_queue_capacity),
        ] {
            check_range(name, cap as u64, 1, QUEUE_CAPACITY_MAX as u64)?;
        }
        check_range(
            "ao_sample_rate_hz",
            self.ao_sample_rate_hz as u64,
            Self::AO_SAMPLE_RATE_HZ_MIN as u64,
            Self::AO_SAMPLE_RATE_HZ_MAX as u64,
        )?;
        if self.overrun_report_interval == 0 {
            return Err(ConfigError::ValidationError(
                "overrun_report_interval must be positive".to_string(),
            ));
        }

        let mut seen = 0u32;
        for entry in &self.machines {
            if entry.index >= self.num_machines {
                return Err(ConfigError::ValidationError(format!(
                    "machine index {} out of range [0, {})",
                    entry.index, self.num_machines
                )));
            }
            let bit = 1u32 << entry.index;
            if seen & bit != 0 {
                return Err(ConfigError::ValidationError(format!(
                    "machine index {} listed twice",
                    entry.index
                )));
            }
            seen |= bit;
        }
        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{name} {value} out of range [{min}, {max}]"
        )));
    }
    Ok(())
}
