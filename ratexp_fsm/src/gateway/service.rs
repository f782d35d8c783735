//! Client side of the request/response channel.
//!
//! The [`Gateway`] owns one [`RequestSlot`] per machine. Raw wire requests
//! are decoded here, before they reach a slot: unknown operations,
//! malformed payloads and out-of-range machine indices are answered with
//! [`Response::Ignored`] without disturbing the real-time side. Matrix
//! uploads are validated here too; an invalid one is answered
//! [`Response::Rejected`] and never posted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ratexp_common::fsm::matrix::MatrixBlob;
use ratexp_common::fsm::msg::{DecodeError, Request, Response, WirePayload};
use tracing::debug;

use super::slot::{PostError, RequestSlot};

/// Poll interval while waiting for a response.
const POLL_INTERVAL: Duration = Duration::from_micros(50);

/// Request/response endpoint for every machine.
#[derive(Debug, Clone)]
pub struct Gateway {
    slots: Vec<Arc<RequestSlot>>,
}

impl Gateway {
    pub fn new(slots: Vec<Arc<RequestSlot>>) -> Self {
        Self { slots }
    }

    #[inline]
    pub fn num_machines(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, machine: usize) -> Result<&RequestSlot, PostError> {
        self.slots
            .get(machine)
            .map(Arc::as_ref)
            .ok_or(PostError::NoSuchMachine(machine))
    }

    /// Post without waiting.
    pub fn post(&self, machine: usize, request: Request) -> Result<(), PostError> {
        self.slot(machine)?.post(request)
    }

    /// Collect a response without waiting.
    pub fn poll(&self, machine: usize) -> Result<Option<Response>, PostError> {
        Ok(self.slot(machine)?.take_response())
    }

    /// Post and wait up to `timeout` for the response.
    pub fn call(
        &self,
        machine: usize,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, PostError> {
        let slot = self.slot(machine)?;
        slot.post(request)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(response) = slot.take_response() {
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(PostError::Timeout(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Validate `blob` on this thread and upload it to `machine`.
    pub fn load_matrix(
        &self,
        machine: usize,
        blob: MatrixBlob,
        timeout: Duration,
    ) -> Result<Response, PostError> {
        match Request::load_matrix(blob) {
            Ok(request) => self.call(machine, request, timeout),
            Err(e) => {
                debug!(machine, error = %e, "matrix upload rejected before posting");
                Ok(Response::Rejected(e))
            }
        }
    }

    /// Wire entry point: decode `(id, payload)` and call `machine`.
    ///
    /// Undecodable requests and unknown machines are answered `Ignored`.
    pub fn call_raw(
        &self,
        machine: usize,
        id: u8,
        payload: WirePayload,
        timeout: Duration,
    ) -> Result<Response, PostError> {
        if machine >= self.slots.len() {
            debug!(machine, id, "request for unknown machine ignored");
            return Ok(Response::Ignored);
        }
        match Request::decode(id, payload) {
            Ok(request) => self.call(machine, request, timeout),
            Err(DecodeError::InvalidMatrix(e)) => {
                debug!(machine, error = %e, "matrix upload rejected before posting");
                Ok(Response::Rejected(e))
            }
            Err(e) => {
                debug!(machine, id, error = %e, "undecodable request ignored");
                Ok(Response::Ignored)
            }
        }
    }

    /// Wire entry point without waiting. Returns `Some(Ignored)` when the
    /// request never reaches a slot.
    pub fn post_raw(
        &self,
        machine: usize,
        id: u8,
        payload: WirePayload,
    ) -> Result<Option<Response>, PostError> {
        if machine >= self.slots.len() {
            return Ok(Some(Response::Ignored));
        }
        match Request::decode(id, payload) {
            Ok(request) => self.post(machine, request).map(|()| None),
            Err(DecodeError::InvalidMatrix(e)) => Ok(Some(Response::Rejected(e))),
            Err(_) => Ok(Some(Response::Ignored)),
        }
    }
}
