//! Wire requests through the gateway while the cycle runs on its own
//! thread.

use std::time::Duration;

use ratexp_common::fsm::matrix::MatrixBuilder;
use ratexp_common::fsm::msg::{Response, WirePayload};
use ratexp_fsm::backend::SimBackend;
use ratexp_fsm::cycle::CycleRunner;
use ratexp_fsm::engine::{FsmMachine, MachineParams};
use ratexp_fsm::gateway::Gateway;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn wire_session_against_running_machines() {
    let machines: Vec<_> = (0..2)
        .map(|i| FsmMachine::new(i, SimBackend::new(), MachineParams::default()))
        .collect();
    let gateway = Gateway::new(machines.iter().map(|m| m.slot()).collect());
    let mut runner = CycleRunner::new(machines, 100_000, 1_000).unwrap();
    let running = runner.running_flag();
    let cycle = std::thread::spawn(move || {
        runner.run(None).unwrap();
        runner
    });

    let call = |machine: usize, id: u8, payload: WirePayload| {
        gateway.call_raw(machine, id, payload, TIMEOUT).unwrap()
    };

    let blob = MatrixBuilder::new(4, 2)
        .stay()
        .on(1, 0, 3)
        .into_blob()
        .unwrap();
    let mut bad = blob.clone();
    bad.cells.truncate(3);
    assert!(matches!(
        call(0, 6, WirePayload::Matrix(Box::new(bad))),
        Response::Rejected(_)
    ));
    assert_eq!(call(0, 4, WirePayload::None), Response::Valid(false));
    assert_eq!(call(0, 6, WirePayload::Matrix(Box::new(blob))), Response::Ok);
    assert_eq!(call(0, 4, WirePayload::None), Response::Valid(true));
    assert_eq!(call(1, 4, WirePayload::None), Response::Valid(false));
    assert_eq!(
        call(0, 8, WirePayload::None),
        Response::MatrixSize { rows: 4, cols: 4 }
    );

    assert_eq!(call(0, 18, WirePayload::Scalars([1, 0, 0])), Response::Ok);
    assert_eq!(call(0, 17, WirePayload::None), Response::CurrentState(1));
    assert_eq!(call(0, 9, WirePayload::Scalars([0, 0, 0])), Response::Ok);
    assert_eq!(call(0, 17, WirePayload::None), Response::CurrentState(3));
    assert_eq!(call(0, 14, WirePayload::None), Response::TransitionCount(2));

    let Response::Transitions(batch) = call(0, 13, WirePayload::Scalars([0, 500, 0])) else {
        panic!("expected a transition batch");
    };
    assert_eq!(batch.from, 0);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.transitions[1].state, 3);

    // Reserved, unknown and misaddressed requests never reach a machine.
    assert_eq!(call(0, 16, WirePayload::None), Response::Ignored);
    assert_eq!(call(0, 99, WirePayload::None), Response::Ignored);
    assert_eq!(call(7, 1, WirePayload::None), Response::Ignored);
    assert_eq!(call(0, 6, WirePayload::None), Response::Ignored);
    assert_eq!(call(0, 17, WirePayload::None), Response::CurrentState(3));

    assert_eq!(call(0, 3, WirePayload::None), Response::Ok);
    assert_eq!(call(0, 14, WirePayload::None), Response::TransitionCount(0));
    assert_eq!(call(0, 2, WirePayload::None), Response::Paused(true));
    assert_eq!(call(0, 1, WirePayload::None), Response::Paused(true));

    running.store(false, std::sync::atomic::Ordering::SeqCst);
    let runner = cycle.join().unwrap();
    assert!(runner.stats().cycle_count > 0);
    assert_eq!(runner.machines()[0].current_state(), 0);
}
