//! Transition rule.
//!
//! Given the current row, the fired event set and the time spent in the
//! state, decide where the machine goes this tick:
//!
//! 1. the lowest-indexed fired column wins;
//! 2. otherwise the state timer (`timeout_us != 0 && elapsed >= timeout_us`)
//!    or a forced time's-up jumps to `timeout_state`;
//! 3. otherwise the machine stays put.

use ratexp_common::bits::lowest_column;
use ratexp_common::fsm::matrix::StateRow;
use ratexp_common::fsm::transition::EventId;

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Stay,
    Jump { next: u16, event: EventId },
}

/// Mask of the first `evt_cols` event columns.
#[inline]
pub fn event_mask(evt_cols: usize) -> u64 {
    if evt_cols >= 64 {
        u64::MAX
    } else {
        (1u64 << evt_cols) - 1
    }
}

/// Apply the transition rule.
pub fn evaluate(
    row: &StateRow<'_>,
    evt_cols: usize,
    fired: u64,
    elapsed_us: u64,
    force_timeout: bool,
) -> Decision {
    if let Some(column) = lowest_column(fired & event_mask(evt_cols)) {
        if let Some(next) = row.destination(column) {
            return Decision::Jump {
                next,
                event: EventId::Column(column as u8),
            };
        }
    }
    let timeout_us = u64::from(row.timeout_us());
    if force_timeout || (timeout_us != 0 && elapsed_us >= timeout_us) {
        return Decision::Jump {
            next: row.timeout_state(),
            event: EventId::Timeout,
        };
    }
    Decision::Stay
}
