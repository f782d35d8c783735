//! Transition rule, forced jumps, pause and the transition log.

use ratexp_common::fsm::matrix::{Edge, InputKind, MatrixBuilder};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_common::fsm::transition::EventId;
use ratexp_fsm::engine::MachineParams;

use super::{TICK, machine, machine_with, request};

#[test]
fn force_state_then_column_fires_from_forced_state() {
    let mut m = machine();
    let blob = MatrixBuilder::new(40, 4)
        .stay()
        .on(35, 2, 7)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    assert_eq!(request(&mut m, 0, Request::Reset), Response::Ok);
    assert_eq!(request(&mut m, TICK, Request::ForceState(35)), Response::Ok);
    assert_eq!(m.current_state(), 35);
    assert_eq!(m.log().count(), 1);
    assert_eq!(m.log().latest().unwrap().event_id, EventId::Forced);

    assert_eq!(request(&mut m, 2 * TICK, Request::ForceEvent(2)), Response::Ok);
    assert_eq!(m.log().count(), 2);
    let record = *m.log().latest().unwrap();
    assert_eq!(record.previous_state, 35);
    assert_eq!(record.state, 7);
    assert_eq!(record.event_id, EventId::Column(2));
    assert_eq!(record.event_id.to_wire(4), 2);
    assert_eq!(record.internal_ts_ns, 2 * TICK);
    assert_eq!(m.current_state(), 7);
}

#[test]
fn zero_timeout_never_fires() {
    let mut m = machine();
    let blob = MatrixBuilder::new(2, 1)
        .stay()
        .timeout(0, 1, 0)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    for i in 0..10_000 {
        m.tick(i * TICK);
    }
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.log().count(), 0);

    assert_eq!(
        request(&mut m, 10_000 * TICK, Request::ForceTimesUp),
        Response::Ok
    );
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.log().latest().unwrap().event_id, EventId::Timeout);
}

#[test]
fn lowest_fired_column_wins() {
    let mut m = machine();
    let blob = MatrixBuilder::new(3, 4)
        .stay()
        .input_channels(InputKind::Dio, 0, 2)
        .input(0, Edge::Up, 3)
        .input(1, Edge::Up, 1)
        .on(0, 1, 1)
        .on(0, 3, 2)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();
    m.tick(0);

    m.backend_mut().set_input(InputKind::Dio, 0, true);
    m.backend_mut().set_input(InputKind::Dio, 1, true);
    m.tick(TICK);
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.log().latest().unwrap().event_id, EventId::Column(1));
}

#[test]
fn self_transition_restarts_state_timer() {
    let mut m = machine();
    let blob = MatrixBuilder::new(2, 1)
        .input_channels(InputKind::Dio, 0, 1)
        .input(0, Edge::Up, 0)
        .on(0, 0, 0)
        .timeout(0, 1, 1_000)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();
    m.tick(0);

    m.backend_mut().set_input(InputKind::Dio, 0, true);
    m.tick(8 * TICK);
    let record = *m.log().latest().unwrap();
    assert_eq!((record.previous_state, record.state), (0, 0));

    m.tick(10 * TICK);
    assert_eq!(m.current_state(), 0, "timer restarted at 800 µs");
    m.tick(17 * TICK);
    assert_eq!(m.current_state(), 0);
    m.tick(18 * TICK);
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.log().latest().unwrap().event_id, EventId::Timeout);
}

#[test]
fn log_keeps_latest_records_and_cumulative_count() {
    let params = MachineParams {
        log_capacity: 8,
        ..MachineParams::default()
    };
    let mut m = machine_with(params);
    let blob = MatrixBuilder::new(2, 1)
        .on(0, 0, 1)
        .on(1, 0, 0)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    for i in 0..20 {
        assert_eq!(request(&mut m, i * TICK, Request::ForceEvent(0)), Response::Ok);
    }
    assert_eq!(
        request(&mut m, 20 * TICK, Request::GetTransitionCount),
        Response::TransitionCount(20)
    );

    let Response::Transitions(batch) = request(
        &mut m,
        21 * TICK,
        Request::GetTransitions { from: 0, count: 64 },
    ) else {
        panic!("expected a transition batch");
    };
    assert_eq!(batch.from, 12);
    assert_eq!(batch.len(), 8);
    for (k, t) in batch.transitions.iter().enumerate() {
        let i = 12 + k as u64;
        assert_eq!(t.internal_ts_ns, i * TICK);
        assert_eq!(t.state, if i % 2 == 0 { 1 } else { 0 });
    }

    let Response::Transitions(tail) = request(
        &mut m,
        22 * TICK,
        Request::GetTransitions { from: 18, count: 64 },
    ) else {
        panic!("expected a transition batch");
    };
    assert_eq!(tail.from, 18);
    assert_eq!(tail.len(), 2);
}

#[test]
fn pause_defers_forced_events() {
    let mut m = machine();
    let blob = MatrixBuilder::new(2, 1).on(0, 0, 1).into_blob().unwrap();
    m.load_matrix(blob).unwrap();

    assert_eq!(request(&mut m, 0, Request::TogglePause), Response::Paused(true));
    assert_eq!(request(&mut m, TICK, Request::ForceEvent(0)), Response::Ok);
    for i in 2..10 {
        m.tick(i * TICK);
    }
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.log().count(), 0);

    assert_eq!(
        request(&mut m, 10 * TICK, Request::TogglePause),
        Response::Paused(false)
    );
    assert_eq!(m.current_state(), 1);
}

#[test]
fn transitions_are_published_to_observers() {
    let mut m = machine();
    let mut out = m.take_outputs().unwrap();
    assert!(m.take_outputs().is_none());
    let blob = MatrixBuilder::new(3, 1)
        .on(0, 0, 1)
        .on(1, 0, 2)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    request(&mut m, 0, Request::ForceEvent(0));
    request(&mut m, TICK, Request::ForceEvent(0));

    let mut seen = Vec::new();
    out.transitions.drain(|t| seen.push((t.previous_state, t.state)));
    assert_eq!(seen, vec![(0, 1), (1, 2)]);
}

#[test]
fn out_of_range_requests_are_ignored() {
    let mut m = machine();
    let blob = MatrixBuilder::new(3, 2).into_blob().unwrap();
    m.load_matrix(blob).unwrap();

    assert_eq!(request(&mut m, 0, Request::ForceState(3)), Response::Ignored);
    assert_eq!(request(&mut m, TICK, Request::ForceEvent(2)), Response::Ignored);
    assert_eq!(m.log().count(), 0);
    assert_eq!(
        request(&mut m, 2 * TICK, Request::GetNumInputEvents),
        Response::NumInputEvents(2)
    );
}
