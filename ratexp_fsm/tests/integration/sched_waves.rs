//! Scheduled-wave timing as seen through a running machine.

use ratexp_common::fsm::matrix::{Edge, MatrixBuilder, OutputSpec, SchedWaveSpec};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_fsm::backend::SimBackend;
use ratexp_fsm::engine::{FsmMachine, WavePhase};

use super::{TICK, machine, request};

const LINE: u32 = 1 << 5;

/// State 0 triggers wave 0 (200/300/500 µs). Edge-up fires column 0
/// (0 → 1), edge-down column 1 (1 → 2). The wave drives line 5.
fn wave_machine() -> FsmMachine<SimBackend> {
    let mut m = machine();
    let blob = MatrixBuilder::new(3, 2)
        .wave(SchedWaveSpec {
            id: 0,
            enabled: true,
            preamble_us: 200,
            sustain_us: 300,
            refraction_us: 500,
        })
        .wave_input(0, Edge::Up, 0)
        .wave_input(0, Edge::Down, 1)
        .wave_output(0, 5)
        .on(0, 0, 1)
        .on(0, 1, 0)
        .on(1, 1, 2)
        .on(1, 0, 1)
        .on(2, 0, 2)
        .on(2, 1, 2)
        .trigger_waves(0, 1)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();
    m.tick(0);
    m
}

#[test]
fn edges_fire_at_scheduled_instants() {
    let mut m = wave_machine();
    assert_eq!(request(&mut m, TICK, Request::ForceState(0)), Response::Ok);
    assert_eq!(m.waves().phase(0), WavePhase::Preamble);
    assert_eq!(m.waves().last_trigger_ns(0), Some(TICK));

    m.tick(2 * TICK);
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.backend().lines() & LINE, 0);

    m.tick(3 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Sustain);
    assert_eq!(m.current_state(), 1);
    assert_ne!(m.backend().lines() & LINE, 0);

    m.tick(5 * TICK);
    assert_eq!(m.current_state(), 1);
    m.tick(6 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Refractory);
    assert_eq!(m.current_state(), 2);
    assert_eq!(m.backend().lines() & LINE, 0);
}

#[test]
fn trigger_during_refractory_is_dropped() {
    let mut m = wave_machine();
    request(&mut m, TICK, Request::ForceState(0));
    for i in 2..=6 {
        m.tick(i * TICK);
    }
    assert_eq!(m.waves().phase(0), WavePhase::Refractory);

    // Re-entering state 0 asks for the wave again: dropped.
    request(&mut m, 7 * TICK, Request::ForceState(0));
    assert_eq!(m.waves().phase(0), WavePhase::Refractory);
    assert_eq!(m.waves().last_trigger_ns(0), Some(TICK));
    for i in 8..=10 {
        m.tick(i * TICK);
    }
    assert_eq!(m.current_state(), 0, "no edges from a dropped trigger");

    m.tick(11 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Idle);
    request(&mut m, 12 * TICK, Request::ForceState(0));
    assert_eq!(m.waves().phase(0), WavePhase::Preamble);
    assert_eq!(m.waves().last_trigger_ns(0), Some(12 * TICK));
}

#[test]
fn late_ticks_do_not_shift_later_edges() {
    let mut m = wave_machine();
    request(&mut m, TICK, Request::ForceState(0));

    m.tick(250_000);
    assert_eq!(m.waves().phase(0), WavePhase::Preamble);
    // Edge-up was due at 300 µs, observed at 420 µs.
    m.tick(420_000);
    assert_eq!(m.waves().phase(0), WavePhase::Sustain);
    // Edge-down is due at 600 µs, not 720 µs.
    m.tick(590_000);
    assert_eq!(m.waves().phase(0), WavePhase::Sustain);
    m.tick(610_000);
    assert_eq!(m.waves().phase(0), WavePhase::Refractory);
    assert_eq!(m.current_state(), 2);
}

#[test]
fn long_gap_runs_whole_wave_in_one_tick() {
    let mut m = wave_machine();
    request(&mut m, TICK, Request::ForceState(0));
    m.tick(20 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Idle);
    assert_eq!(m.waves().busy(), 0);
    // Both edges fired together: the lower column decides.
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.backend().lines() & LINE, 0);
}

#[test]
fn reset_returns_waves_to_idle() {
    let mut m = wave_machine();
    request(&mut m, TICK, Request::ForceState(0));
    m.tick(3 * TICK);
    assert_ne!(m.backend().lines() & LINE, 0);

    assert_eq!(request(&mut m, 4 * TICK, Request::Reset), Response::Ok);
    assert_eq!(m.waves().phase(0), WavePhase::Idle);
    assert_eq!(m.backend().lines() & LINE, 0);
    assert_eq!(m.current_state(), 0);
}

#[test]
fn waves_keep_running_while_paused() {
    let mut m = wave_machine();
    request(&mut m, TICK, Request::ForceState(0));
    assert_eq!(m.log().count(), 1);
    assert_eq!(request(&mut m, 2 * TICK, Request::TogglePause), Response::Paused(true));

    m.tick(3 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Sustain);
    assert_ne!(m.backend().lines() & LINE, 0, "line rises while paused");

    m.tick(6 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Refractory);
    assert_eq!(m.backend().lines() & LINE, 0, "line falls while paused");

    m.tick(11 * TICK);
    assert_eq!(m.waves().phase(0), WavePhase::Idle);
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.log().count(), 1, "wave edges made no transition");

    // Edges seen while paused are not replayed on unpause.
    assert_eq!(request(&mut m, 12 * TICK, Request::TogglePause), Response::Paused(false));
    m.tick(13 * TICK);
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.log().count(), 1);
}

#[test]
fn oversized_preamble_holds_the_wave() {
    let mut m = machine();
    let blob = MatrixBuilder::new(2, 1)
        .output(OutputSpec::SchedWave)
        .wave(SchedWaveSpec {
            id: 0,
            enabled: true,
            preamble_us: u64::MAX / 2,
            sustain_us: u64::MAX,
            refraction_us: u64::MAX,
        })
        .wave_input(0, Edge::Up, 0)
        .wave_output(0, 5)
        .on(0, 0, 1)
        .set_output(1, 0, 1)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    assert_eq!(request(&mut m, TICK, Request::ForceEvent(0)), Response::Ok);
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.waves().phase(0), WavePhase::Preamble);
    for i in 2..100 {
        m.tick(i * 1_000_000_000);
    }
    assert_eq!(m.waves().phase(0), WavePhase::Preamble);
    assert_eq!(m.backend().lines() & LINE, 0);
    assert_eq!(m.current_state(), 1);
}
