//! The tick scheduler — the loop that drives every live updatable.
//!
//! OUTER ITERATION (fixed order):
//!   1. Record the iteration start time.
//!   2. Request a render. Never waits for the consumer.
//!   3. Run simulation steps: flush the registry, update every live
//!      updatable. Keep stepping while behind schedule, at most
//!      `max_skipped_steps` times.
//!   4. Sleep until the next step is due, if it is in the future.
//!
//! RULES:
//!   - Stopping is cooperative: `running` is checked before each outer
//!     iteration, never in the middle of one.
//!   - The end-of-iteration sleep is the only suspension point. Waking
//!     early is harmless.
//!   - Registry mutations made during a step become visible at the next
//!     flush, never mid-step.

use crate::{
    clock::Clock,
    config::{FaultPolicy, SchedulerConfig},
    error::{CoreError, CoreResult},
    render::RenderTrigger,
    updatable::UpdatableRegistry,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, Thread};
use std::time::Duration;

/// Result of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    /// Simulation steps performed, in `1..=max_skipped_steps`.
    pub steps:     u32,
    /// Time slept after the steps, if the next step was still in the future.
    pub slept:     Option<Duration>,
    /// True when catch-up hit `max_skipped_steps` while still behind.
    pub saturated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub iterations:           u64,
    pub steps:                u64,
    pub last_iteration_steps: u32,
    pub saturated_iterations: u64,
}

#[derive(Default)]
struct Counters {
    iterations:           AtomicU64,
    steps:                AtomicU64,
    last_iteration_steps: AtomicU32,
    saturated_iterations: AtomicU64,
}

struct SchedulerCore {
    config:   SchedulerConfig,
    registry: Arc<UpdatableRegistry>,
    render:   Arc<dyn RenderTrigger>,
    clock:    Arc<dyn Clock>,
    running:  Arc<AtomicBool>,
    /// Worker thread to unpark on stop. Filled in by the worker itself.
    worker:   Arc<Mutex<Option<Thread>>>,
    counters: Counters,
}

impl SchedulerCore {
    fn run_iteration(&self) -> CoreResult<IterationReport> {
        let start = self.clock.now();
        self.render.request_render();

        let period = self.config.tick_period();
        let max_steps = self.config.max_skipped_steps;
        let mut steps: u32 = 0;

        let (remaining, saturated) = loop {
            self.registry.flush();
            steps += 1;
            self.counters.steps.fetch_add(1, Ordering::Relaxed);
            self.step()?;

            let deadline = start + period * steps;
            let now = self.clock.now();
            if now <= deadline {
                break (deadline - now, false);
            }
            if steps >= max_steps {
                break (Duration::ZERO, true);
            }
        };

        self.counters.iterations.fetch_add(1, Ordering::Relaxed);
        self.counters.last_iteration_steps.store(steps, Ordering::Relaxed);
        if saturated {
            self.counters.saturated_iterations.fetch_add(1, Ordering::Relaxed);
            log::warn!("catch-up saturated at {steps} steps; dropping frames");
        }

        let slept = if remaining > Duration::ZERO {
            self.clock.sleep(remaining);
            Some(remaining)
        } else {
            None
        };

        log::trace!("iteration: steps={steps} slept={slept:?}");
        Ok(IterationReport { steps, slept, saturated })
    }

    /// One simulation step over the current live set.
    fn step(&self) -> CoreResult<()> {
        let tps = self.config.ticks_per_second;
        for handle in self.registry.live() {
            let updatable = handle.get();
            if let Err(source) = updatable.update_state(tps) {
                match self.config.fault_policy {
                    FaultPolicy::Abort => {
                        return Err(CoreError::UpdateFault {
                            updatable: updatable.name().to_string(),
                            source,
                        });
                    }
                    FaultPolicy::Isolate => {
                        log::warn!(
                            "updatable '{}' failed and was removed: {source:#}",
                            updatable.name()
                        );
                        self.registry.remove(handle.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn run_loop(&self) -> CoreResult<()> {
        let _guard = RunningGuard(&*self.running);
        // Published before the first `running` check, so a stop racing
        // with startup either sees this thread or is seen by the loop.
        *lock_slot(&self.worker) = Some(std::thread::current());
        log::info!(
            "scheduler started: {} ticks/s, max {} catch-up steps",
            self.config.ticks_per_second,
            self.config.max_skipped_steps
        );
        while self.running.load(Ordering::Acquire) {
            if let Err(e) = self.run_iteration() {
                log::error!("scheduler stopped by fault: {e}");
                return Err(e);
            }
        }
        log::info!("scheduler stopped");
        Ok(())
    }
}

/// Clears `running` when the worker exits, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock_slot(slot: &Mutex<Option<Thread>>) -> std::sync::MutexGuard<'_, Option<Thread>> {
    slot.lock().unwrap_or_else(|p| p.into_inner())
}

/// Cloneable handle that asks the scheduler to stop from any thread.
///
/// A handle may be taken before `start()`; it reaches whichever worker is
/// current when `request_stop` is called. A stop requested while no worker
/// is alive is discarded: `start()` always re-arms the loop.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    worker:  Arc<Mutex<Option<Thread>>>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = lock_slot(&self.worker).as_ref() {
            thread.unpark();
        }
    }
}

pub struct TickScheduler {
    core:   Arc<SchedulerCore>,
    worker: Option<JoinHandle<CoreResult<()>>>,
}

impl TickScheduler {
    pub fn new(
        config:   SchedulerConfig,
        registry: Arc<UpdatableRegistry>,
        render:   Arc<dyn RenderTrigger>,
        clock:    Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(SchedulerCore {
                config,
                registry,
                render,
                clock,
                running: Arc::new(AtomicBool::new(false)),
                worker: Arc::new(Mutex::new(None)),
                counters: Counters::default(),
            }),
            worker: None,
        })
    }

    /// Spawn the scheduler thread.
    pub fn start(&mut self) -> CoreResult<()> {
        if self.worker.is_some() {
            return Err(CoreError::SchedulerAlreadyRunning);
        }
        self.core.running.store(true, Ordering::Release);
        let core = Arc::clone(&self.core);
        let worker = std::thread::Builder::new()
            .name("tick-scheduler".into())
            .spawn(move || core.run_loop())
            .map_err(|e| {
                self.core.running.store(false, Ordering::Release);
                CoreError::Other(anyhow::anyhow!("cannot spawn scheduler thread: {e}"))
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the scheduler thread and wait for it. Returns the fault that
    /// ended the thread, if any. Calling it on a stopped scheduler is a no-op.
    pub fn stop(&mut self) -> CoreResult<()> {
        self.stop_handle().request_stop();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| CoreError::SchedulerPanicked)?,
            None => Ok(()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.core.running),
            worker:  Arc::clone(&self.core.worker),
        }
    }

    /// True while the scheduler thread is alive. Stays true after a stop
    /// request until the current iteration, sleep included, has ended.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Drive one outer iteration on the calling thread.
    /// Not allowed while the scheduler thread is alive.
    pub fn run_iteration(&self) -> CoreResult<IterationReport> {
        if self.worker.is_some() {
            return Err(CoreError::invalid_state(
                "run_iteration called while the scheduler thread is running",
            ));
        }
        self.core.run_iteration()
    }

    pub fn registry(&self) -> &Arc<UpdatableRegistry> {
        &self.core.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.core.counters;
        SchedulerStats {
            iterations:           c.iterations.load(Ordering::Relaxed),
            steps:                c.steps.load(Ordering::Relaxed),
            last_iteration_steps: c.last_iteration_steps.load(Ordering::Relaxed),
            saturated_iterations: c.saturated_iterations.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                log::error!("scheduler ended with error on drop: {e}");
            }
        }
    }
}
