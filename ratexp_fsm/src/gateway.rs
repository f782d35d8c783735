//! Request/response gateway.
//!
//! - [`slot`] - Per-machine request slot (real-time side never blocks)
//! - [`service`] - Client endpoint: wire decoding, posting, waiting

pub mod service;
pub mod slot;

pub use service::Gateway;
pub use slot::{PostError, RequestSlot};
