//! State-matrix FSM types shared between the engine and its clients.
//!
//! Organized by concern: matrix and routing, transition records, AO waves,
//! DAQ records, deferred network outputs, the request/response protocol,
//! engine configuration and status.

pub mod ao;
pub mod config;
pub mod daq;
pub mod matrix;
pub mod msg;
pub mod nrt;
pub mod status;
pub mod transition;
