//! Periodic tick loop.
//!
//! Drives every machine once per tick period with absolute-time pacing on
//! `CLOCK_MONOTONIC` (`rt` feature) or `std::thread::sleep` (simulation).
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! ## Overruns
//! A tick that runs past its period is counted and reported (rate-limited),
//! never fatal: the machines keep running on the next tick boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::IoBackend;
use crate::engine::FsmMachine;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub cycle_count: u64,
    /// Last tick duration [ns].
    pub last_cycle_ns: i64,
    pub min_cycle_ns: i64,
    pub max_cycle_ns: i64,
    pub sum_cycle_ns: i64,
    /// Ticks that ran past the period.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average tick time [ns] (0 before the first tick).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("RT setup error: {0}")]
    RtSetup(String),
    #[error("clock error: {0}")]
    Clock(String),
    #[error("tick period must be non-zero")]
    ZeroPeriod,
}

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup. All calls are no-ops without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the machines and paces their ticks.
pub struct CycleRunner<B: IoBackend> {
    machines: Vec<FsmMachine<B>>,
    stats: CycleStats,
    tick_period_ns: u64,
    /// Engine time of the next virtual tick [ns].
    virtual_now_ns: u64,
    overrun_report_interval: u64,
    running: Arc<AtomicBool>,
}

impl<B: IoBackend> CycleRunner<B> {
    pub fn new(
        machines: Vec<FsmMachine<B>>,
        tick_period_ns: u64,
        overrun_report_interval: u64,
    ) -> Result<Self, CycleError> {
        if tick_period_ns == 0 {
            return Err(CycleError::ZeroPeriod);
        }
        Ok(Self {
            machines,
            stats: CycleStats::new(),
            tick_period_ns,
            virtual_now_ns: 0,
            overrun_report_interval: overrun_report_interval.max(1),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Flag that stops [`CycleRunner::run`] when cleared.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    #[inline]
    pub fn tick_period_ns(&self) -> u64 {
        self.tick_period_ns
    }

    pub fn machines(&self) -> &[FsmMachine<B>] {
        &self.machines
    }

    pub fn machines_mut(&mut self) -> &mut [FsmMachine<B>] {
        &mut self.machines
    }

    /// Tick every machine at engine time `now_ns`.
    #[inline]
    pub fn tick_all(&mut self, now_ns: u64) {
        for machine in &mut self.machines {
            machine.tick(now_ns);
        }
    }

    /// Run `ticks` ticks on a virtual clock, back to back.
    ///
    /// Engine time advances by exactly one period per tick, so a run is
    /// reproducible regardless of host load.
    pub fn step_virtual(&mut self, ticks: u64) {
        for _ in 0..ticks {
            let now = self.virtual_now_ns;
            self.tick_all(now);
            self.stats.record(0, 0);
            self.virtual_now_ns += self.tick_period_ns;
        }
    }

    /// Run wall-clock paced ticks until the running flag clears or
    /// `max_ticks` have run.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<(), CycleError> {
        info!(
            machines = self.machines.len(),
            period_ns = self.tick_period_ns,
            "cycle started"
        );

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop(max_ticks);

        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop(max_ticks);

        info!(
            ticks = self.stats.cycle_count,
            overruns = self.stats.overruns,
            avg_ns = self.stats.avg_cycle_ns(),
            max_ns = self.stats.max_cycle_ns,
            "cycle stopped"
        );
        result
    }

    fn should_continue(&self, max_ticks: Option<u64>) -> bool {
        self.running.load(Ordering::Relaxed)
            && max_ticks.is_none_or(|max| self.stats.cycle_count < max)
    }

    fn note_duration(&mut self, duration_ns: i64, latency_ns: i64) {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > self.tick_period_ns as i64 {
            self.stats.overruns += 1;
            if (self.stats.overruns - 1) % self.overrun_report_interval == 0 {
                warn!(
                    duration_ns,
                    period_ns = self.tick_period_ns,
                    overruns = self.stats.overruns,
                    "tick overrun"
                );
            }
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, max_ticks: Option<u64>) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let start =
            clock_gettime(clock).map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
        let mut next_wake = start;

        while self.should_continue(max_ticks) {
            let tick_start = clock_gettime(clock)
                .map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
            let latency_ns = timespec_diff_ns(&tick_start, &next_wake).abs();
            let now_ns = timespec_diff_ns(&tick_start, &start).max(0) as u64;

            self.tick_all(now_ns);

            let tick_end = clock_gettime(clock)
                .map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
            self.note_duration(timespec_diff_ns(&tick_end, &tick_start), latency_ns);

            next_wake = timespec_add_ns(next_wake, self.tick_period_ns as i64);
            // Skip boundaries already in the past after an overrun.
            while timespec_diff_ns(&next_wake, &tick_end) < 0 {
                next_wake = timespec_add_ns(next_wake, self.tick_period_ns as i64);
            }
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, max_ticks: Option<u64>) -> Result<(), CycleError> {
        use std::time::{Duration, Instant};

        let start = Instant::now();
        let period = Duration::from_nanos(self.tick_period_ns);

        while self.should_continue(max_ticks) {
            let tick_start = Instant::now();
            let now_ns = tick_start.duration_since(start).as_nanos() as u64;

            self.tick_all(now_ns);

            let elapsed = tick_start.elapsed();
            self.note_duration(elapsed.as_nanos() as i64, 0);

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// `a - b` in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
