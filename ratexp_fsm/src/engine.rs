//! State-matrix engine.
//!
//! - [`machine`] - One machine: tick pipeline and request handling
//! - [`transition`] - Transition rule (lowest column, then timer)
//! - [`input`] - Input edge detection
//! - [`sched_wave`] - Scheduled-wave timers
//! - [`ao`] - Analog-output wave playback
//! - [`output`] - Output column routing (lines, triggers, sound, network)
//! - [`log`] - Bounded transition history

pub mod ao;
pub mod input;
pub mod log;
pub mod machine;
pub mod output;
pub mod sched_wave;
pub mod transition;

pub use machine::{FsmMachine, MachineOutputs, MachineParams};
pub use sched_wave::WavePhase;
pub use transition::Decision;
