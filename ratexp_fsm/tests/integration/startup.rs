//! Startup from configuration files to a ticking runner.

use std::path::Path;

use ratexp_common::fsm::matrix::MatrixBuilder;
use ratexp_fsm::backend::SimBackend;
use ratexp_fsm::config::load_config;
use ratexp_fsm::cycle::CycleRunner;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn configured_matrices_run_from_first_tick() {
    let dir = tempfile::tempdir().unwrap();
    let blob = MatrixBuilder::new(3, 1)
        .timeout(0, 1, 500)
        .timeout(1, 2, 500)
        .timeout(2, 2, 0)
        .into_blob()
        .unwrap();
    write(dir.path(), "trial.json", &serde_json::to_string(&blob).unwrap());
    write(
        dir.path(),
        "engine.toml",
        r#"
tick_period_us = 100
num_machines = 3
log_capacity = 16

[rig]
rig_name = "bench-rig"

[[machines]]
index = 2
matrix = "trial.json"
"#,
    );

    let loaded = load_config(&dir.path().join("engine.toml")).unwrap();
    let period = loaded.engine.tick_period_ns();
    let machines = ratexp_fsm::build_machines(loaded, |_| SimBackend::new()).unwrap();
    assert_eq!(machines.len(), 3);
    assert!(!machines[0].is_valid());
    assert!(machines[2].is_valid());
    assert_eq!(machines[2].log().capacity(), 16);

    let mut runner = CycleRunner::new(machines, period, 1_000).unwrap();
    runner.step_virtual(6);
    assert_eq!(runner.machines()[2].current_state(), 1);
    runner.step_virtual(5);
    assert_eq!(runner.machines()[2].current_state(), 2);
    assert_eq!(runner.machines()[2].log().count(), 2);
    assert_eq!(runner.machines()[2].status().runtime_us, 1_000);
}
