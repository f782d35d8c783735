//! # RatExp State-Matrix Engine
//!
//! Hard real-time interpreter for behavioural-experiment state matrices.
//! Each machine evaluates its matrix once per tick: input edges, scheduled
//! waves and AO playback fire event columns, the lowest fired column (or the
//! state timer) picks the next state, and the new state's output columns
//! drive digital lines, sound, wave triggers and deferred network messages.
//!
//! ## Threads
//!
//! 1. **RT cycle** ([`cycle::CycleRunner`]) - ticks every machine.
//! 2. **Clients** ([`gateway::Gateway`]) - one request per machine per tick.
//! 3. **Readers** ([`engine::MachineOutputs`]) - drain the SPSC output queues.
//!
//! ## Zero-Allocation Tick
//!
//! Logs and queues are sized at construction; the tick never allocates.
//! Matrices are validated and boxed on the sender's thread, whether they
//! arrive as a [`Request::LoadMatrix`](ratexp_common::fsm::msg::Request)
//! or through a [`store::ReconfigHandle`]. Displaced matrices are handed
//! back to the reader for release.

#![deny(clippy::disallowed_types)]

pub mod backend;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod gateway;
pub mod queue;
pub mod store;

use backend::IoBackend;
use config::LoadedConfig;
use engine::{FsmMachine, MachineParams};
use ratexp_common::fsm::matrix::MatrixError;
use tracing::info;

/// Build `engine.num_machines` machines and load the configured matrices.
///
/// `backend` is called once per machine index.
pub fn build_machines<B: IoBackend>(
    loaded: LoadedConfig,
    mut backend: impl FnMut(usize) -> B,
) -> Result<Vec<FsmMachine<B>>, MatrixError> {
    let params = MachineParams::from_config(&loaded.engine);
    let mut machines: Vec<_> = (0..loaded.engine.num_machines)
        .map(|i| FsmMachine::new(i, backend(i), params))
        .collect();
    for (index, blob) in loaded.matrices {
        if let Some(machine) = machines.get_mut(index) {
            machine.load_matrix(blob)?;
            info!(machine = index, "startup matrix loaded");
        }
    }
    Ok(machines)
}
