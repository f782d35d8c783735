//! Transition records.

use serde::{Deserialize, Serialize};

use crate::consts::MSG_MAX_TRANSITIONS;

/// What caused a transition.
///
/// On the wire a column is its index, a timeout is the event-column count
/// and a forced jump is `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventId {
    /// Event column that fired.
    Column(u8),
    /// State timer expired (or time's-up was forced).
    Timeout,
    /// State was set directly, bypassing the matrix.
    Forced,
}

impl EventId {
    /// Wire encoding for a matrix with `evt_cols` event columns.
    #[inline]
    pub const fn to_wire(self, evt_cols: usize) -> i16 {
        match self {
            Self::Column(c) => c as i16,
            Self::Timeout => evt_cols as i16,
            Self::Forced => -1,
        }
    }

    /// Decode a wire value. Returns `None` for values past the timeout sentinel.
    #[inline]
    pub const fn from_wire(raw: i16, evt_cols: usize) -> Option<Self> {
        if raw == -1 {
            Some(Self::Forced)
        } else if raw >= 0 && (raw as usize) < evt_cols {
            Some(Self::Column(raw as u8))
        } else if raw >= 0 && raw as usize == evt_cols {
            Some(Self::Timeout)
        } else {
            None
        }
    }
}

/// One historical state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Entry time in ns since the last reset.
    pub internal_ts_ns: u64,
    /// Entry time in ns on the external reference clock.
    pub external_ts_ns: u64,
    pub previous_state: u16,
    /// State entered by this transition.
    pub state: u16,
    /// Event that led into `state`.
    pub event_id: EventId,
}

impl Default for StateTransition {
    fn default() -> Self {
        Self {
            internal_ts_ns: 0,
            external_ts_ns: 0,
            previous_state: 0,
            state: 0,
            event_id: EventId::Forced,
        }
    }
}

/// Reply to a get-transitions request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionBatch {
    /// Cumulative index of `transitions[0]`.
    pub from: u64,
    pub transitions: heapless::Vec<StateTransition, MSG_MAX_TRANSITIONS>,
}

impl TransitionBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
