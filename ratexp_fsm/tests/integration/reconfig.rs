//! Matrix upload, swap-on-entry and staging from another thread.

use std::sync::Arc;

use ratexp_common::fsm::matrix::{MatrixBlob, MatrixBuilder, MatrixError, OutputSpec};
use ratexp_common::fsm::msg::{Request, Response};
use ratexp_common::fsm::status::MachineFlags;

use super::{TICK, machine, request};

/// Ring `0 → 1 → 2 → 0` on column 0; each state drives line `state`.
fn ring(swap_on_entry: bool, line_offset: u32) -> MatrixBlob {
    MatrixBuilder::new(3, 1)
        .output(OutputSpec::DigitalOut { from: 0, to: 7 })
        .on(0, 0, 1)
        .on(1, 0, 2)
        .on(2, 0, 0)
        .set_output(0, 0, 1 << line_offset)
        .set_output(1, 0, 1 << (line_offset + 1))
        .set_output(2, 0, 1 << (line_offset + 2))
        .entry_state(0)
        .swap_on_entry(swap_on_entry)
        .into_blob()
        .unwrap()
}

#[test]
fn swap_on_entry_waits_for_entry_state() {
    let mut m = machine();
    let a = ring(false, 0);
    assert_eq!(
        request(&mut m, 0, Request::load_matrix(a.clone()).unwrap()),
        Response::Ok
    );
    request(&mut m, TICK, Request::ForceEvent(0));
    assert_eq!(m.current_state(), 1);
    assert_eq!(m.backend().lines(), 0b10);

    let b = ring(true, 4);
    assert_eq!(
        request(&mut m, 2 * TICK, Request::load_matrix(b.clone()).unwrap()),
        Response::Ok
    );
    assert!(m.status().flags.contains(MachineFlags::PENDING_MATRIX));
    let Response::Matrix(Some(active)) = request(&mut m, 3 * TICK, Request::GetMatrix) else {
        panic!("expected the active matrix");
    };
    assert_eq!(active.to_blob(), a);

    // 1 → 2 still runs on the old matrix.
    request(&mut m, 4 * TICK, Request::ForceEvent(0));
    assert_eq!(m.current_state(), 2);
    assert_eq!(m.backend().lines(), 0b100);
    assert!(m.status().flags.contains(MachineFlags::PENDING_MATRIX));

    // 2 → 0 enters the entry state: swap, then state 0's outputs from B.
    request(&mut m, 5 * TICK, Request::ForceEvent(0));
    assert_eq!(m.current_state(), 0);
    assert!(!m.status().flags.contains(MachineFlags::PENDING_MATRIX));
    assert_eq!(m.backend().lines(), 1 << 4);
    assert_eq!(m.matrix().unwrap().to_blob(), b);
}

#[test]
fn rejected_upload_leaves_active_matrix() {
    let mut m = machine();
    let a = ring(false, 0);
    m.load_matrix(a.clone()).unwrap();
    request(&mut m, 0, Request::ForceEvent(0));

    let mut bad = ring(false, 0);
    bad.cells.pop();
    assert!(matches!(
        Request::load_matrix(bad.clone()),
        Err(MatrixError::CellCountMismatch { .. })
    ));
    assert!(matches!(
        m.load_matrix(bad),
        Err(MatrixError::CellCountMismatch { .. })
    ));
    assert_eq!(request(&mut m, 2 * TICK, Request::GetValid), Response::Valid(true));
    assert_eq!(m.matrix().unwrap().to_blob(), a);
    assert_eq!(m.current_state(), 1);
    assert!(!m.status().flags.contains(MachineFlags::PENDING_MATRIX));
}

#[test]
fn second_upload_overwrites_pending() {
    let mut m = machine();
    m.load_matrix(ring(false, 0)).unwrap();
    request(&mut m, 0, Request::ForceEvent(0));

    m.load_matrix(ring(true, 2)).unwrap();
    let latest = ring(true, 4);
    m.load_matrix(latest.clone()).unwrap();

    request(&mut m, TICK, Request::ForceEvent(0));
    request(&mut m, 2 * TICK, Request::ForceEvent(0));
    assert_eq!(m.current_state(), 0);
    assert_eq!(m.matrix().unwrap().to_blob(), latest);
}

#[test]
fn staged_matrix_is_adopted_at_tick_start() {
    let mut m = machine();
    m.tick(0);
    let handle = m.reconfig_handle();
    let blob = ring(false, 0);
    let stager = std::thread::spawn(move || {
        handle.stage(blob).unwrap();
        handle
    });
    let handle = stager.join().unwrap();
    assert!(handle.is_staged());
    assert!(!m.is_valid());

    m.tick(TICK);
    assert!(!handle.is_staged());
    assert!(m.is_valid());
    assert_eq!(m.matrix().map(|a| a.rows()), Some(3));

    let mut bad = ring(false, 0);
    bad.cells[0] = 9;
    assert!(matches!(
        handle.stage(bad),
        Err(MatrixError::DestinationOutOfRange { .. })
    ));
    assert!(!handle.is_staged());
}

#[test]
fn invalidate_stops_evaluation_until_reload() {
    let mut m = machine();
    let blob = ring(false, 0);
    m.load_matrix(blob.clone()).unwrap();
    request(&mut m, 0, Request::ForceEvent(0));
    assert_eq!(m.backend().lines(), 0b10);

    // Only validity goes; held lines and the current state stay.
    assert_eq!(request(&mut m, TICK, Request::Invalidate), Response::Ok);
    assert_eq!(m.backend().lines(), 0b10);
    assert_eq!(m.current_state(), 1);
    assert_eq!(request(&mut m, 2 * TICK, Request::GetValid), Response::Valid(false));
    assert_eq!(request(&mut m, 3 * TICK, Request::ForceEvent(0)), Response::Ignored);
    assert_eq!(request(&mut m, 4 * TICK, Request::GetMatrix), Response::Matrix(None));

    assert_eq!(
        request(&mut m, 5 * TICK, Request::load_matrix(blob).unwrap()),
        Response::Ok
    );
    assert_eq!(request(&mut m, 6 * TICK, Request::ForceEvent(0)), Response::Ok);
    assert_eq!(m.current_state(), 2);
}

#[test]
fn matrix_readback_shares_the_active_matrix() {
    let mut m = machine();
    m.load_matrix(ring(false, 0)).unwrap();
    let Response::Matrix(Some(first)) = request(&mut m, 0, Request::GetMatrix) else {
        panic!("expected the active matrix");
    };
    assert!(Arc::ptr_eq(&first, m.matrix().unwrap()));
    assert_eq!(
        request(&mut m, TICK, Request::GetMatrixSize),
        Response::MatrixSize { rows: 3, cols: 4 }
    );
}
