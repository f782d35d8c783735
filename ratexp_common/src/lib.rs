//! RatExp Common Library
//!
//! Shared types for the RatExp state-matrix FSM workspace: the validated
//! state matrix and its routing tables, transition records, the
//! request/response protocol, deferred output and DAQ records, engine
//! configuration and system constants.
//!
//! # Module Structure
//!
//! - [`consts`] - Capacity ceilings, wire magic numbers, default tunables
//! - [`bits`] - Channel and event-set bitmask helpers
//! - [`config`] - Configuration loading traits and types
//! - [`fsm`] - Matrix, protocol and record types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ratexp_common::prelude::*;
//!
//! let matrix = MatrixBuilder::new(2, 2)
//!     .on(0, 0, 1)
//!     .timeout(1, 0, 500_000)
//!     .build()
//!     .unwrap();
//! assert_eq!(matrix.rows(), 2);
//! ```

pub mod bits;
pub mod config;
pub mod consts;
pub mod fsm;
pub mod prelude;
