//! Per-machine request slot.
//!
//! Lifecycle: `Idle → Posted → Serviced → Idle`. The client posts and
//! collects; the real-time side services at most one request per tick and
//! never blocks (`try_lock`). A serviced or abandoned response may be
//! overwritten by a new post.

use parking_lot::Mutex;
use ratexp_common::fsm::msg::{Request, Response};
use thiserror::Error;

/// Reasons a post is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostError {
    #[error("a request is already waiting to be serviced")]
    Busy,
    #[error("no machine with index {0}")]
    NoSuchMachine(usize),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Idle,
    Posted(Request),
    Serviced(Response),
}

/// One request/response unit.
#[derive(Debug, Default)]
pub struct RequestSlot {
    state: Mutex<SlotState>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Client Side ────────────────────────────────────────────────

    /// Post a request. Fails only while an earlier request is unserviced.
    pub fn post(&self, request: Request) -> Result<(), PostError> {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Posted(_)) {
            return Err(PostError::Busy);
        }
        *state = SlotState::Posted(request);
        Ok(())
    }

    /// Collect the response, returning the slot to Idle.
    pub fn take_response(&self) -> Option<Response> {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            SlotState::Serviced(response) => Some(response),
            other => {
                *state = other;
                None
            }
        }
    }

    /// `true` while a request waits for the real-time side.
    pub fn is_posted(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Posted(_))
    }

    // ─── Real-Time Side ─────────────────────────────────────────────

    /// Service a posted request with `handler`. Returns `false` when there
    /// is nothing to do or the client holds the lock.
    pub fn service(&self, handler: impl FnOnce(Request) -> Response) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        if !matches!(*state, SlotState::Posted(_)) {
            return false;
        }
        let SlotState::Posted(request) = std::mem::take(&mut *state) else {
            return false;
        };
        *state = SlotState::Serviced(handler(request));
        true
    }
}
