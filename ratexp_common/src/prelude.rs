//! Prelude module for common re-exports.
//!
//! `use ratexp_common::prelude::*;` brings in the types most engine and
//! client code needs without listing individual paths.

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, RigIdentity};
pub use crate::fsm::config::{EngineConfig, MachineEntry};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    MAX_EVT_COLS, MAX_MACHINES, MAX_OUT_CHANS, MAX_SCHED_WAVES, MSG_MAX_TRANSITIONS,
    TICK_PERIOD_US_DEFAULT,
};

// ─── Matrix ─────────────────────────────────────────────────────────
pub use crate::fsm::matrix::{
    Edge, InputKind, MatrixBlob, MatrixBuilder, MatrixError, NetTarget, OutputSpec,
    SchedWaveSpec, StateMatrix, StateRow, Transport,
};

// ─── Records & Protocol ─────────────────────────────────────────────
pub use crate::fsm::ao::{AoWave, AoWaveError};
pub use crate::fsm::daq::{DaqScan, DaqSpec};
pub use crate::fsm::msg::{DecodeError, MsgId, Request, Response, WirePayload};
pub use crate::fsm::nrt::{NrtOutput, expand_template};
pub use crate::fsm::status::{MachineFlags, MachineStatus};
pub use crate::fsm::transition::{EventId, StateTransition, TransitionBatch};

/// Default tick period as Duration.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_micros(TICK_PERIOD_US_DEFAULT as u64);
