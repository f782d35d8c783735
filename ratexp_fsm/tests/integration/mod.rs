//! Scenario tests, one file per area.

pub mod ao_daq;
pub mod gateway;
pub mod outputs;
pub mod reconfig;
pub mod sched_waves;
pub mod startup;
pub mod transitions;

use ratexp_common::fsm::msg::{Request, Response};
use ratexp_fsm::backend::SimBackend;
use ratexp_fsm::engine::{FsmMachine, MachineParams};

/// 100 µs tick.
pub const TICK: u64 = 100_000;

pub fn machine() -> FsmMachine<SimBackend> {
    machine_with(MachineParams::default())
}

pub fn machine_with(params: MachineParams) -> FsmMachine<SimBackend> {
    FsmMachine::new(0, SimBackend::new(), params)
}

/// Post `request` through the machine's slot, tick once at `now_ns` and
/// collect the response.
pub fn request(m: &mut FsmMachine<SimBackend>, now_ns: u64, request: Request) -> Response {
    let slot = m.slot();
    slot.post(request).unwrap();
    m.tick(now_ns);
    slot.take_response().unwrap()
}
