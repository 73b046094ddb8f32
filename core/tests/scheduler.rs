//! Tick scheduler tests.
//!
//! Most tests drive single iterations on a virtual clock so timing is exact.
//! The threaded tests use the system clock and only assert on coarse facts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tactics_core::{
    clock::{ManualClock, SystemClock},
    config::{FaultPolicy, SchedulerConfig},
    error::CoreError,
    render::RenderSignal,
    scheduler::TickScheduler,
    updatable::{Updatable, UpdatableRegistry},
};

const PERIOD: Duration = Duration::from_millis(20); // 50 ticks/s

/// Counts its calls and optionally burns virtual time on each one.
struct Probe {
    name:      String,
    calls:     AtomicU32,
    cost:      Duration,
    cost_once: bool,
    clock:     Option<Arc<ManualClock>>,
    last_tps:  AtomicU32,
}

impl Probe {
    fn idle(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name:      name.to_string(),
            calls:     AtomicU32::new(0),
            cost:      Duration::ZERO,
            cost_once: false,
            clock:     None,
            last_tps:  AtomicU32::new(0),
        })
    }

    fn slow(name: &str, clock: &Arc<ManualClock>, cost: Duration, cost_once: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            cost,
            cost_once,
            clock: Some(Arc::clone(clock)),
            last_tps: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Updatable for Probe {
    fn name(&self) -> &str { &self.name }

    fn update_state(&self, ticks_per_second: u32) -> anyhow::Result<()> {
        let previous = self.calls.fetch_add(1, Ordering::Relaxed);
        self.last_tps.store(ticks_per_second, Ordering::Relaxed);
        if let Some(clock) = &self.clock {
            if !self.cost_once || previous == 0 {
                clock.advance(self.cost);
            }
        }
        Ok(())
    }
}

struct Failing;

impl Updatable for Failing {
    fn name(&self) -> &str { "failing" }

    fn update_state(&self, _ticks_per_second: u32) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
}

fn build(config: SchedulerConfig, clock: Arc<ManualClock>) -> (TickScheduler, RenderSignal) {
    let registry = Arc::new(UpdatableRegistry::new());
    let (signal, _requests) = RenderSignal::new();
    let scheduler = TickScheduler::new(config, registry, Arc::new(signal.clone()), clock)
        .expect("valid scheduler config");
    (scheduler, signal)
}

#[test]
fn on_time_iteration_runs_one_step_and_sleeps_the_rest() {
    let clock = Arc::new(ManualClock::new());
    let (scheduler, signal) = build(SchedulerConfig::default(), Arc::clone(&clock));
    let probe = Probe::idle("idle");
    scheduler.registry().add(Arc::clone(&probe));

    let report = scheduler.run_iteration().unwrap();

    assert_eq!(report.steps, 1);
    assert_eq!(report.slept, Some(PERIOD));
    assert!(!report.saturated);
    assert_eq!(probe.calls(), 1);
    assert_eq!(probe.last_tps.load(Ordering::Relaxed), 50);
    assert_eq!(clock.elapsed(), PERIOD, "sleep must end exactly at the next deadline");
    assert_eq!(signal.requested(), 1, "one render request per iteration");
}

/// A step that overruns its slot triggers exactly as much catch-up as needed.
#[test]
fn late_step_is_caught_up() {
    let clock = Arc::new(ManualClock::new());
    let (scheduler, _signal) = build(SchedulerConfig::default(), Arc::clone(&clock));
    let probe = Probe::slow("hiccup", &clock, Duration::from_millis(25), true);
    scheduler.registry().add(Arc::clone(&probe));

    let report = scheduler.run_iteration().unwrap();

    // Step 1 ends at 25ms (deadline 20ms): behind, step again.
    // Step 2 ends at 25ms (deadline 40ms): 15ms left to sleep.
    assert_eq!(report.steps, 2);
    assert_eq!(report.slept, Some(Duration::from_millis(15)));
    assert_eq!(probe.calls(), 2);
}

/// A simulation that can never catch up is capped at max_skipped_steps and
/// the loop still moves on instead of hanging.
#[test]
fn catch_up_is_bounded_by_max_skipped_steps() {
    let clock = Arc::new(ManualClock::new());
    let config = SchedulerConfig { ticks_per_second: 50, max_skipped_steps: 20, ..Default::default() };
    let (scheduler, signal) = build(config, Arc::clone(&clock));
    let probe = Probe::slow("overloaded", &clock, Duration::from_millis(30), false);
    scheduler.registry().add(Arc::clone(&probe));

    let first = scheduler.run_iteration().unwrap();
    assert_eq!(first.steps, 20, "catch-up must stop at max_skipped_steps");
    assert!(first.saturated);
    assert_eq!(first.slept, None, "a saturated iteration has nothing left to sleep");

    let second = scheduler.run_iteration().unwrap();
    assert_eq!(second.steps, 20);
    assert_eq!(signal.requested(), 2, "each iteration still requests a render");

    let stats = scheduler.stats();
    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.steps, 40);
    assert_eq!(stats.last_iteration_steps, 20);
    assert_eq!(stats.saturated_iterations, 2);
}

#[test]
fn steps_per_iteration_stay_within_bounds() {
    for cost_ms in [0u64, 5, 19, 20, 21, 39, 41, 100, 1000] {
        let clock = Arc::new(ManualClock::new());
        let config = SchedulerConfig { max_skipped_steps: 7, ..Default::default() };
        let (scheduler, _signal) = build(config, Arc::clone(&clock));
        scheduler
            .registry()
            .add(Probe::slow("p", &clock, Duration::from_millis(cost_ms), false));

        let report = scheduler.run_iteration().unwrap();
        assert!(
            (1..=7).contains(&report.steps),
            "cost {cost_ms}ms gave {} steps",
            report.steps
        );
        if let Some(slept) = report.slept {
            assert!(slept > Duration::ZERO, "never sleep a zero or negative duration");
        }
    }
}

/// Registering an updatable from inside another's update takes effect at
/// the next flush, never mid-step.
#[test]
fn registration_during_update_waits_for_next_flush() {
    struct Spawner {
        registry: Arc<UpdatableRegistry>,
        child:    Arc<Probe>,
        spawned:  Mutex<bool>,
    }

    impl Updatable for Spawner {
        fn name(&self) -> &str { "spawner" }

        fn update_state(&self, _tps: u32) -> anyhow::Result<()> {
            let mut spawned = self.spawned.lock().unwrap();
            if !*spawned {
                self.registry.add(Arc::clone(&self.child));
                *spawned = true;
            }
            Ok(())
        }
    }

    let clock = Arc::new(ManualClock::new());
    let (scheduler, _signal) = build(SchedulerConfig::default(), clock);
    let child = Probe::idle("child");
    scheduler.registry().add(Arc::new(Spawner {
        registry: Arc::clone(scheduler.registry()),
        child:    Arc::clone(&child),
        spawned:  Mutex::new(false),
    }));

    scheduler.run_iteration().unwrap();
    assert_eq!(child.calls(), 0, "child must not run in the step that registered it");
    assert!(!scheduler.registry().is_live(Arc::clone(&child)));

    scheduler.run_iteration().unwrap();
    assert_eq!(child.calls(), 1);
}

#[test]
fn removed_updatable_is_not_invoked_after_next_flush() {
    let clock = Arc::new(ManualClock::new());
    let (scheduler, _signal) = build(SchedulerConfig::default(), clock);
    let probe = Probe::idle("doomed");
    scheduler.registry().add(Arc::clone(&probe));

    scheduler.run_iteration().unwrap();
    assert_eq!(probe.calls(), 1);

    scheduler.registry().remove(Arc::clone(&probe));
    scheduler.run_iteration().unwrap();
    scheduler.run_iteration().unwrap();
    assert_eq!(probe.calls(), 1);
}

#[test]
fn abort_policy_surfaces_update_fault() {
    let clock = Arc::new(ManualClock::new());
    let (scheduler, _signal) = build(SchedulerConfig::default(), clock);
    let probe = Probe::idle("bystander");
    scheduler.registry().add(Arc::new(Failing));
    scheduler.registry().add(Arc::clone(&probe));

    let err = scheduler.run_iteration().unwrap_err();
    match err {
        CoreError::UpdateFault { updatable, .. } => assert_eq!(updatable, "failing"),
        other => panic!("expected UpdateFault, got {other:?}"),
    }
    assert_eq!(probe.calls(), 0, "a fault truncates the rest of the step");
}

#[test]
fn isolate_policy_drops_faulty_updatable_and_continues() {
    let clock = Arc::new(ManualClock::new());
    let config = SchedulerConfig { fault_policy: FaultPolicy::Isolate, ..Default::default() };
    let (scheduler, _signal) = build(config, clock);
    let failing = Arc::new(Failing);
    let probe = Probe::idle("survivor");
    scheduler.registry().add(Arc::clone(&failing));
    scheduler.registry().add(Arc::clone(&probe));

    scheduler.run_iteration().expect("isolated faults are not errors");
    scheduler.run_iteration().unwrap();

    assert_eq!(probe.calls(), 2);
    assert!(!scheduler.registry().is_live(failing));
}

#[test]
fn invalid_config_is_rejected() {
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(UpdatableRegistry::new());
    let (signal, _requests) = RenderSignal::new();
    let config = SchedulerConfig { ticks_per_second: 0, ..Default::default() };

    let result = TickScheduler::new(config, registry, Arc::new(signal), clock);
    assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
}

// ── Threaded ───────────────────────────────────────────────────────

fn threaded(config: SchedulerConfig) -> TickScheduler {
    let registry = Arc::new(UpdatableRegistry::new());
    let (signal, _requests) = RenderSignal::new();
    TickScheduler::new(config, registry, Arc::new(signal), Arc::new(SystemClock)).unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn start_and_stop_on_a_worker_thread() {
    let mut scheduler = threaded(SchedulerConfig::default());
    let probe = Probe::idle("ticker");
    scheduler.registry().add(Arc::clone(&probe));

    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert!(matches!(scheduler.start(), Err(CoreError::SchedulerAlreadyRunning)));
    assert!(matches!(scheduler.run_iteration(), Err(CoreError::InvalidState { .. })));

    assert!(wait_until(Duration::from_secs(2), || probe.calls() >= 3));

    scheduler.stop().expect("clean shutdown");
    assert!(!scheduler.is_running());
    let calls_at_stop = probe.calls();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(probe.calls(), calls_at_stop, "no updates after stop returns");

    scheduler.stop().expect("stopping twice is a no-op");
}

/// Stop from another thread wakes the scheduler out of its sleep.
#[test]
fn stop_handle_interrupts_sleep() {
    let config = SchedulerConfig { ticks_per_second: 1, ..Default::default() };
    let mut scheduler = threaded(config);
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || scheduler.stats().iterations >= 1));

    // The worker is now parked in a ~1s sleep.
    let handle = scheduler.stop_handle();
    let started = Instant::now();
    thread::spawn(move || handle.request_stop()).join().unwrap();
    scheduler.stop().unwrap();

    let joined_after = started.elapsed();
    assert!(
        joined_after < Duration::from_millis(500),
        "worker must be woken, not wait out its sleep (joined after {joined_after:?})"
    );
    assert_eq!(scheduler.stats().iterations, 1);
}

#[test]
fn is_running_stays_true_until_the_worker_exits() {
    struct Slow(AtomicU32);

    impl Updatable for Slow {
        fn name(&self) -> &str { "slow" }

        fn update_state(&self, _tps: u32) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    let config = SchedulerConfig { ticks_per_second: 1, ..Default::default() };
    let mut scheduler = threaded(config);
    let slow = Arc::new(Slow(AtomicU32::new(0)));
    scheduler.registry().add(Arc::clone(&slow));
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || slow.0.load(Ordering::SeqCst) >= 1));

    // Mid-update: the stop request is pending but the worker is alive.
    scheduler.stop_handle().request_stop();
    assert!(scheduler.is_running());

    assert!(wait_until(Duration::from_secs(2), || !scheduler.is_running()));
    scheduler.stop().unwrap();
    assert!(!scheduler.is_running());
}

#[test]
fn stop_handle_taken_before_start_reaches_the_worker() {
    let config = SchedulerConfig { ticks_per_second: 1, ..Default::default() };
    let mut scheduler = threaded(config);
    let handle = scheduler.stop_handle();

    // Discarded: there is no worker yet, and start re-arms the loop.
    handle.request_stop();
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || scheduler.stats().iterations >= 1));
    assert!(scheduler.is_running());

    let started = Instant::now();
    handle.request_stop();
    assert!(
        wait_until(Duration::from_millis(500), || !scheduler.is_running()),
        "an early handle must still unpark the sleeping worker"
    );
    assert!(started.elapsed() < Duration::from_millis(500));
    scheduler.stop().unwrap();
}

#[test]
fn fault_on_worker_thread_is_returned_from_stop() {
    let mut scheduler = threaded(SchedulerConfig::default());
    scheduler.registry().add(Arc::new(Failing));
    scheduler.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || !scheduler.is_running()));
    let err = scheduler.stop().unwrap_err();
    assert!(matches!(err, CoreError::UpdateFault { .. }), "got {err:?}");
}

/// End-to-end: T=50, K=20, each update takes longer than a tick. The
/// iteration caps at 20 steps and the loop keeps going.
#[test]
fn overloaded_scheduler_caps_catch_up_on_real_time() {
    struct Sluggish(AtomicU32);

    impl Updatable for Sluggish {
        fn name(&self) -> &str { "sluggish" }

        fn update_state(&self, _tps: u32) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            thread::sleep(Duration::from_millis(25));
            Ok(())
        }
    }

    let mut scheduler = threaded(SchedulerConfig::default());
    scheduler.registry().add(Arc::new(Sluggish(AtomicU32::new(0))));
    scheduler.start().unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || scheduler.stats().iterations >= 2),
        "scheduler must keep iterating under overload"
    );
    scheduler.stop().unwrap();

    let stats = scheduler.stats();
    assert_eq!(stats.last_iteration_steps, 20);
    assert!(stats.saturated_iterations >= 2);
}
