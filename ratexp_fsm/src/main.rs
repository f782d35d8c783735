//! # RatExp State-Matrix Engine
//!
//! Loads the engine configuration and startup matrices, performs RT setup
//! and ticks every machine until Ctrl-C (or `--ticks` ticks).
//!
//! Machines run on the simulated backend. A reader thread drains each
//! machine's output queues: deferred network records are expanded and
//! logged, DAQ scans and transitions are counted.

use clap::Parser;
use ratexp_common::config::LogLevel;
use ratexp_common::fsm::config::EngineConfig;
use ratexp_fsm::backend::SimBackend;
use ratexp_fsm::config::{LoadError, LoadedConfig, load_config};
use ratexp_fsm::cycle::{CycleRunner, rt_setup};
use ratexp_fsm::engine::MachineOutputs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Reader poll period.
const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

/// RatExp state-matrix engine
#[derive(Parser, Debug)]
#[command(name = "ratexp_fsm")]
#[command(version)]
#[command(about = "Hard real-time state-matrix engine for behavioural rigs")]
struct Args {
    /// Engine configuration TOML. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// CPU core to pin the RT thread to.
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority.
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Stop after this many ticks.
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,
}

fn main() {
    let args = Args::parse();
    // Loaded before tracing so the rig's log level can seed the filter.
    let loaded = load(&args);
    let log_level = loaded
        .as_ref()
        .map_or(LogLevel::default(), |l| l.engine.rig.log_level);
    setup_tracing(&args, log_level);

    info!("RatExp FSM v{} starting", env!("CARGO_PKG_VERSION"));
    if args.config.is_none() {
        info!("no --config given, using defaults");
    }

    let result = match loaded {
        Ok(loaded) => run(&args, loaded),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("RatExp FSM shutdown complete");
}

fn load(args: &Args) -> Result<LoadedConfig, LoadError> {
    match &args.config {
        Some(path) => load_config(path),
        None => Ok(LoadedConfig {
            engine: EngineConfig::default(),
            matrices: Vec::new(),
        }),
    }
}

fn run(args: &Args, loaded: LoadedConfig) -> Result<(), Box<dyn std::error::Error>> {
    let tick_period_ns = loaded.engine.tick_period_ns();
    let overrun_interval = loaded.engine.overrun_report_interval;
    info!(
        rig = %loaded.engine.rig.rig_name,
        tick_period_us = loaded.engine.tick_period_us,
        machines = loaded.engine.num_machines,
        "config OK"
    );

    let mut machines = ratexp_fsm::build_machines(loaded, |_| SimBackend::new())?;
    let outputs: Vec<_> = machines
        .iter_mut()
        .filter_map(|m| m.take_outputs().map(|o| (m.index(), o)))
        .collect();

    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        cpu_core = args.cpu_core,
        priority = args.rt_priority,
        "RT setup complete"
    );

    let mut runner = CycleRunner::new(machines, tick_period_ns, overrun_interval)?;
    let running = runner.running_flag();
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let reader = spawn_reader(outputs, Arc::clone(&running));
    let result = runner.run(args.ticks);
    running.store(false, Ordering::SeqCst);
    if reader.join().is_err() {
        error!("output reader panicked");
    }
    result?;
    Ok(())
}

/// Drain every machine's output queues until `running` clears.
fn spawn_reader(
    mut outputs: Vec<(usize, MachineOutputs)>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut scans = vec![0u64; outputs.len()];
        let mut transitions = vec![0u64; outputs.len()];
        loop {
            let stop = !running.load(Ordering::Relaxed);
            for (slot, (machine, out)) in outputs.iter_mut().enumerate() {
                let machine = *machine;
                out.nrt.drain(|record| {
                    info!(
                        machine,
                        transport = ?record.transport,
                        host = %record.host,
                        port = record.port,
                        payload = %record.render(),
                        "deferred output"
                    );
                });
                scans[slot] += out.daq.drain(|_| {}) as u64;
                transitions[slot] += out.transitions.drain(|t| {
                    debug!(
                        machine,
                        from = t.previous_state,
                        to = t.state,
                        event = ?t.event_id,
                        "transition"
                    );
                }) as u64;
                out.retired.drain(drop);
            }
            if stop {
                break;
            }
            std::thread::sleep(DRAIN_INTERVAL);
        }
        for (slot, (machine, _)) in outputs.iter().enumerate() {
            info!(
                machine = *machine,
                daq_scans = scans[slot],
                transitions = transitions[slot],
                "reader summary"
            );
        }
    })
}

/// `--verbose` forces DEBUG, otherwise the rig's configured level.
fn effective_level(args: &Args, log_level: LogLevel) -> LogLevel {
    if args.verbose {
        LogLevel::Debug
    } else {
        log_level
    }
}

/// `RUST_LOG` wins over [`effective_level`].
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = effective_level(args, log_level);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
