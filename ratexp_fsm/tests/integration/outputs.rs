//! Output columns: held lines, pulses, sound, forced mask and deferred
//! network records.

use ratexp_common::fsm::matrix::{MatrixBuilder, NetTarget, OutputSpec, Transport};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_fsm::backend::SoundAction;

use super::{TICK, machine, request};

#[test]
fn held_lines_pulses_and_sound() {
    let mut m = machine();
    let blob = MatrixBuilder::new(3, 1)
        .output(OutputSpec::DigitalOut { from: 0, to: 3 })
        .output(OutputSpec::Trigger { from: 4, to: 7 })
        .output(OutputSpec::Sound { card: 2 })
        .set_output(1, 0, 0b0101)
        .set_output(1, 1, 0b0011)
        .set_output(1, 2, 7)
        .set_output(2, 0, 0b1000)
        .set_output(2, 2, (-7i32) as u32)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    request(&mut m, TICK, Request::ForceState(1));
    assert_eq!(m.backend().lines(), 0b0011_0101);
    m.tick(2 * TICK);
    assert_eq!(m.backend().lines(), 0b0101, "pulses last one tick");

    assert_eq!(request(&mut m, 3 * TICK, Request::ForceOutput(1 << 31)), Response::Ok);
    assert_eq!(m.backend().lines(), 0b0101 | (1 << 31));

    request(&mut m, 4 * TICK, Request::ForceState(2));
    assert_eq!(m.backend().lines(), 0b1000 | (1 << 31));

    assert_eq!(request(&mut m, 5 * TICK, Request::ForceSound(3)), Response::Ok);
    assert_eq!(
        m.backend().sounds(),
        &[
            SoundAction::Play {
                card: 2,
                sound_id: 7
            },
            SoundAction::Stop {
                card: 2,
                sound_id: 7
            },
            SoundAction::Play {
                card: 2,
                sound_id: 3
            },
        ]
    );
}

#[test]
fn network_record_expands_template() {
    let mut m = machine();
    let mut out = m.take_outputs().unwrap();
    m.backend_mut().set_external_offset(1_000);
    let target = NetTarget::new("10.0.0.7", 5_000, "X=%v t=%t T=%T s=%s c=%c %% done%").unwrap();
    let mut builder = MatrixBuilder::new(48, 1);
    for _ in 0..11 {
        builder = builder.output(OutputSpec::Noop);
    }
    let blob = builder
        .output(OutputSpec::Tcp(target))
        .set_output(47, 11, 13)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    request(&mut m, 2_560_000_000, Request::ForceState(47));
    let record = out.nrt.pop().unwrap();
    assert!(record.is_valid());
    assert_eq!(record.transport, Transport::Tcp);
    assert_eq!(record.host.as_str(), "10.0.0.7");
    assert_eq!(record.port, 5_000);
    assert_eq!(record.external_ts_ns, 2_560_001_000);
    assert_eq!(record.render(), "X=13 t=2.560000 T=2560000000 s=47 c=11 % done");
}

#[test]
fn full_network_queue_drops_and_counts() {
    let mut m = machine();
    let mut out = m.take_outputs().unwrap();
    let target = NetTarget::new("localhost", 9, "%v").unwrap();
    let blob = MatrixBuilder::new(2, 1)
        .output(OutputSpec::Udp(target))
        .set_output(1, 0, 1)
        .into_blob()
        .unwrap();
    m.load_matrix(blob).unwrap();

    // State 0 carries value 0: no record.
    request(&mut m, 0, Request::ForceState(0));
    assert!(out.nrt.is_empty());

    for i in 1..=12 {
        request(&mut m, i * TICK, Request::ForceState(1));
    }
    assert_eq!(out.nrt.len(), out.nrt.capacity());
    assert_eq!(m.status().nrt_dropped, 12 - out.nrt.capacity() as u64);

    let mut rendered = Vec::new();
    out.nrt.drain(|r| rendered.push(r.render()));
    assert!(rendered.iter().all(|s| s == "1"));
}
