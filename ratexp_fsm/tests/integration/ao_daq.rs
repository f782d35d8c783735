//! AO wave playback events and DAQ acquisition.

use ratexp_common::fsm::ao::{AoWave, AoWaveError};
use ratexp_common::fsm::daq::DaqSpec;
use ratexp_common::fsm::matrix::{MatrixBuilder, OutputSpec};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_common::fsm::status::MachineFlags;
use ratexp_common::fsm::transition::EventId;
use ratexp_fsm::backend::{AoAction, SimBackend};
use ratexp_fsm::engine::{FsmMachine, MachineParams};

use super::{TICK, machine, machine_with, request};

/// State 1 triggers wave id 0 through a SchedWave output column.
/// Column 2 moves 1 → 2, column 3 moves 2 → 3.
fn ao_machine(params: MachineParams) -> FsmMachine<SimBackend> {
    let mut m = machine_with(params);
    let blob = MatrixBuilder::new(4, 4)
        .stay()
        .output(OutputSpec::SchedWave)
        .set_output(1, 0, 1)
        .on(1, 2, 2)
        .on(2, 3, 3)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();
    m
}

fn four_samples(looped: bool) -> AoWave {
    AoWave::new(
        0,
        1,
        looped,
        vec![100, 200, 300, 400],
        vec![Some(2), None, None, Some(3)],
    )
    .unwrap()
}

#[test]
fn ao_samples_fire_their_event_columns() {
    // Default AO clock is 10 kHz: one sample per 100 µs tick.
    let mut m = ao_machine(MachineParams::default());
    assert_eq!(
        request(&mut m, 0, Request::LoadAoWave(four_samples(false))),
        Response::Ok
    );
    assert!(m.ao().is_loaded(0));

    request(&mut m, TICK, Request::ForceState(1));
    assert_eq!(m.current_state(), 2, "sample 0 plays on the trigger tick");
    assert!(m.ao().is_playing(0));

    m.tick(2 * TICK);
    m.tick(3 * TICK);
    assert_eq!(m.current_state(), 2);
    m.tick(4 * TICK);
    assert_eq!(m.current_state(), 3);
    assert!(!m.ao().is_playing(0));

    let events: Vec<_> = (0..m.log().count())
        .filter_map(|i| m.log().get(i))
        .map(|t| (t.event_id, t.internal_ts_ns))
        .collect();
    assert_eq!(
        events,
        vec![
            (EventId::Forced, TICK),
            (EventId::Column(2), TICK),
            (EventId::Column(3), 4 * TICK),
        ]
    );
    assert_eq!(
        m.backend().ao_actions(),
        &[
            AoAction::Start {
                wave_id: 0,
                samples: 4
            },
            AoAction::Stop { wave_id: 0 },
        ]
    );
}

#[test]
fn looping_wave_plays_until_reset() {
    let mut m = ao_machine(MachineParams::default());
    request(&mut m, 0, Request::LoadAoWave(four_samples(true)));
    request(&mut m, TICK, Request::ForceState(1));
    for i in 2..40 {
        m.tick(i * TICK);
    }
    assert!(m.ao().is_playing(0));

    assert_eq!(request(&mut m, 40 * TICK, Request::Reset), Response::Ok);
    assert!(!m.ao().is_playing(0));
    assert_eq!(
        m.backend().ao_actions().last(),
        Some(&AoAction::Stop { wave_id: 0 })
    );
}

#[test]
fn clearing_a_wave_stops_it() {
    let mut m = ao_machine(MachineParams::default());
    request(&mut m, 0, Request::LoadAoWave(four_samples(true)));
    request(&mut m, TICK, Request::ForceState(1));
    assert!(m.ao().is_playing(0));

    let cleared = AoWave::cleared(0).unwrap();
    assert_eq!(request(&mut m, 2 * TICK, Request::LoadAoWave(cleared)), Response::Ok);
    assert!(!m.ao().is_loaded(0));
    assert!(!m.ao().is_playing(0));
}

#[test]
fn ao_uploads_are_checked_against_the_machine() {
    let params = MachineParams {
        ao_max_data: 1_000,
        ..MachineParams::default()
    };
    let mut m = ao_machine(params);
    assert_eq!(
        request(&mut m, 0, Request::GetAoMaxData),
        Response::AoMaxData(1_000)
    );

    let loud = AoWave::new(1, 0, false, vec![2_000], vec![None]).unwrap();
    assert!(matches!(
        request(&mut m, TICK, Request::LoadAoWave(loud)),
        Response::RejectedAoWave(AoWaveError::SampleOutOfRange { .. })
    ));

    let wide = AoWave::new(1, 0, false, vec![10], vec![Some(5)]).unwrap();
    assert!(matches!(
        request(&mut m, 2 * TICK, Request::LoadAoWave(wide)),
        Response::RejectedAoWave(AoWaveError::EventColumnOutOfRange { .. })
    ));
    assert!(!m.ao().is_loaded(1));
}

#[test]
fn daq_scans_follow_the_channel_mask() {
    let params = MachineParams {
        daq_queue_capacity: 2,
        daq_max_data: 4_095,
        ..MachineParams::default()
    };
    let mut m = machine_with(params);
    let mut out = m.take_outputs().unwrap();
    m.backend_mut().set_daq_value(1, 7);
    m.backend_mut().set_daq_value(4, 9);

    let spec = DaqSpec {
        channel_mask: (1 << 1) | (1 << 4),
        range_min_fixed1e6: -10_000_000,
        range_max_fixed1e6: 10_000_000,
    };
    assert_eq!(
        request(&mut m, 0, Request::StartDaq(spec)),
        Response::DaqStarted {
            accepted: true,
            max_data: 4_095
        }
    );
    assert!(m.status().flags.contains(MachineFlags::DAQ_RUNNING));

    let scan = out.daq.pop().unwrap();
    assert_eq!(scan.samples.as_slice(), &[7, 9]);
    assert_eq!(scan.ts_nanos, 0);

    for i in 1..=4 {
        m.tick(i * TICK);
    }
    assert_eq!(out.daq.len(), 2);
    assert_eq!(m.status().daq_dropped, 2);
    assert_eq!(out.daq.pop().map(|s| s.ts_nanos), Some(TICK));

    assert_eq!(request(&mut m, 5 * TICK, Request::Reset), Response::Ok);
    assert!(!m.status().flags.contains(MachineFlags::DAQ_RUNNING));
}
