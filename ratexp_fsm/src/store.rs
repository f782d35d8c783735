//! Matrix store and reconfiguration.
//!
//! Holds the active matrix and at most one pending matrix per machine.
//! A matrix is validated in full before it can become pending; a rejected
//! upload leaves the active matrix and its validity untouched.
//!
//! ## Swap Rules
//!
//! The pending matrix replaces the active one when
//! - no valid matrix is active, or
//! - the pending matrix does not ask for swap-on-entry, or
//! - the running machine enters the pending matrix's entry state.
//!
//! A second upload before the swap overwrites the pending matrix.
//!
//! ## Staging From Another Thread
//!
//! [`ReconfigHandle`] validates on the caller's thread and drops the result
//! into a mailbox. The real-time side adopts it with a non-blocking
//! `try_lock` at the start of a tick; if the lock is contended the matrix
//! simply waits one more tick.
//!
//! ## Retirement
//!
//! A matrix displaced by a swap, an overwrite or an invalidate is pushed
//! onto the retirement queue so the last reference is released by the
//! non-real-time reader. Only a full queue drops one in place.

use std::sync::Arc;

use parking_lot::Mutex;
use ratexp_common::fsm::matrix::{MatrixBlob, MatrixError, StateMatrix};

use crate::queue::QueueProducer;

type Mailbox = Arc<Mutex<Option<Arc<StateMatrix>>>>;

/// Retirement queue capacity per machine.
pub const RETIRED_QUEUE_CAPACITY: usize = 8;

/// Active/pending matrix pair of one machine.
#[derive(Debug)]
pub struct MatrixStore {
    active: Option<Arc<StateMatrix>>,
    pending: Option<Arc<StateMatrix>>,
    mailbox: Mailbox,
    retired: QueueProducer<Arc<StateMatrix>>,
}

impl MatrixStore {
    pub fn new(retired: QueueProducer<Arc<StateMatrix>>) -> Self {
        Self {
            active: None,
            pending: None,
            mailbox: Arc::new(Mutex::new(None)),
            retired,
        }
    }

    /// Handle for staging matrices from a non-real-time thread.
    pub fn handle(&self) -> ReconfigHandle {
        ReconfigHandle {
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    #[inline]
    pub fn active(&self) -> Option<&Arc<StateMatrix>> {
        self.active.as_ref()
    }

    #[inline]
    pub fn pending(&self) -> Option<&Arc<StateMatrix>> {
        self.pending.as_ref()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.active.is_some()
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Validate an upload and make it pending.
    pub fn load(&mut self, blob: MatrixBlob) -> Result<(), MatrixError> {
        let matrix = StateMatrix::from_blob(blob)?;
        self.stage(Arc::new(matrix));
        Ok(())
    }

    /// Make an already validated matrix pending.
    pub fn stage(&mut self, matrix: Arc<StateMatrix>) {
        let displaced = self.pending.replace(matrix);
        self.retire(displaced);
    }

    /// Move a matrix staged through a [`ReconfigHandle`] into the pending
    /// slot. Never blocks.
    pub fn adopt_staged(&mut self) -> bool {
        let staged = self.mailbox.try_lock().and_then(|mut mailbox| mailbox.take());
        match staged {
            Some(matrix) => {
                self.stage(matrix);
                true
            }
            None => false,
        }
    }

    /// Swap in the pending matrix if it may be activated without waiting
    /// for an entry. Returns `true` on swap.
    pub fn activate_immediate(&mut self) -> bool {
        match &self.pending {
            Some(p) if self.active.is_none() || !p.swap_on_entry() => self.swap(),
            _ => false,
        }
    }

    /// Swap in the pending matrix if the machine is about to enter
    /// `next_state` and the swap rules allow it. Returns `true` on swap.
    pub fn activate_if_ready(&mut self, next_state: u16) -> bool {
        match &self.pending {
            Some(p)
                if self.active.is_none()
                    || !p.swap_on_entry()
                    || next_state == p.entry_state() =>
            {
                self.swap()
            }
            _ => false,
        }
    }

    /// Clear the active matrix. A pending matrix stays pending.
    pub fn invalidate(&mut self) {
        let displaced = self.active.take();
        self.retire(displaced);
    }

    fn swap(&mut self) -> bool {
        match self.pending.take() {
            Some(next) => {
                let displaced = self.active.replace(next);
                self.retire(displaced);
                true
            }
            None => false,
        }
    }

    fn retire(&mut self, matrix: Option<Arc<StateMatrix>>) {
        if let Some(matrix) = matrix {
            self.retired.push(matrix);
        }
    }
}

/// Stages validated matrices for a machine from another thread.
#[derive(Debug, Clone)]
pub struct ReconfigHandle {
    mailbox: Mailbox,
}

impl ReconfigHandle {
    /// Validate `blob` and stage it. A matrix staged earlier but not yet
    /// adopted is replaced.
    pub fn stage(&self, blob: MatrixBlob) -> Result<(), MatrixError> {
        let matrix = Arc::new(StateMatrix::from_blob(blob)?);
        *self.mailbox.lock() = Some(matrix);
        Ok(())
    }

    /// `true` while a staged matrix waits for adoption.
    pub fn is_staged(&self) -> bool {
        self.mailbox.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueConsumer, bounded};
    use ratexp_common::fsm::matrix::MatrixBuilder;

    fn store() -> (MatrixStore, QueueConsumer<Arc<StateMatrix>>) {
        let (tx, rx) = bounded(RETIRED_QUEUE_CAPACITY);
        (MatrixStore::new(tx), rx)
    }

    fn blob(rows: u16, swap_on_entry: bool) -> MatrixBlob {
        MatrixBuilder::new(rows, 2)
            .swap_on_entry(swap_on_entry)
            .into_blob()
            .unwrap()
    }

    #[test]
    fn rejection_leaves_store_untouched() {
        let (mut store, _retired) = store();
        store.load(blob(3, false)).unwrap();
        assert!(store.activate_immediate());

        let mut bad = blob(3, false);
        bad.cells.pop();
        assert!(store.load(bad).is_err());
        assert!(store.is_valid());
        assert!(!store.has_pending());
        assert_eq!(store.active().unwrap().rows(), 3);
    }

    #[test]
    fn first_load_activates_immediately_even_with_swap_on_entry() {
        let (mut store, _retired) = store();
        store.load(blob(2, true)).unwrap();
        assert!(store.activate_immediate());
        assert!(store.is_valid());
    }

    #[test]
    fn swap_on_entry_waits_for_entry_state() {
        let (mut store, _retired) = store();
        store.load(blob(2, false)).unwrap();
        store.activate_immediate();

        store.load(blob(5, true)).unwrap();
        assert!(!store.activate_immediate());
        assert!(!store.activate_if_ready(1));
        assert_eq!(store.active().unwrap().rows(), 2);
        assert!(store.activate_if_ready(0));
        assert_eq!(store.active().unwrap().rows(), 5);
        assert!(!store.has_pending());
    }

    #[test]
    fn second_upload_overwrites_pending() {
        let (mut store, _retired) = store();
        store.load(blob(2, false)).unwrap();
        store.activate_immediate();
        store.load(blob(4, true)).unwrap();
        store.load(blob(6, true)).unwrap();
        assert!(store.activate_if_ready(0));
        assert_eq!(store.active().unwrap().rows(), 6);
    }

    #[test]
    fn invalidate_keeps_pending() {
        let (mut store, _retired) = store();
        store.load(blob(2, false)).unwrap();
        store.activate_immediate();
        store.load(blob(3, true)).unwrap();
        store.invalidate();
        assert!(!store.is_valid());
        assert!(store.activate_immediate());
        assert_eq!(store.active().unwrap().rows(), 3);
    }

    #[test]
    fn displaced_matrices_are_retired() {
        let (mut store, mut retired) = store();
        store.load(blob(2, false)).unwrap();
        store.activate_immediate();
        assert!(retired.is_empty());

        store.load(blob(3, true)).unwrap();
        store.load(blob(4, true)).unwrap();
        assert_eq!(retired.pop().map(|m| m.rows()), Some(3));

        assert!(store.activate_if_ready(0));
        assert_eq!(retired.pop().map(|m| m.rows()), Some(2));

        store.invalidate();
        let last = retired.pop().unwrap();
        assert_eq!(last.rows(), 4);
        assert_eq!(Arc::strong_count(&last), 1);
    }

    #[test]
    fn staged_matrix_is_adopted() {
        let (mut store, _retired) = store();
        let handle = store.handle();
        assert!(!store.adopt_staged());

        handle.stage(blob(4, false)).unwrap();
        assert!(handle.is_staged());
        assert!(store.adopt_staged());
        assert!(!handle.is_staged());
        assert!(store.activate_immediate());
        assert_eq!(store.active().unwrap().rows(), 4);

        let mut bad = blob(2, false);
        bad.rows = 0;
        assert!(handle.stage(bad).is_err());
        assert!(!handle.is_staged());
    }

    #[test]
    fn contended_mailbox_is_skipped() {
        let (mut store, _retired) = store();
        let handle = store.handle();
        handle.stage(blob(2, false)).unwrap();
        let guard = handle.mailbox.lock();
        assert!(!store.adopt_staged());
        drop(guard);
        assert!(store.adopt_staged());
    }
}
