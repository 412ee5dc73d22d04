//! Real-time waking for live-mode waits.
//!
//! Adapted from a scaled virtual-time Embassy driver that mapped host time to
//! a UI-adjustable virtual speed. There is no speed slider here — live mode
//! always runs at 1:1 wall-clock speed — so the Q32.32 scaling math is gone
//! and the origin mapping collapses to a plain elapsed-time conversion. What
//! survives unchanged is the condvar-driven background thread: `embassy_time`
//! needs *something* to call `Waker::wake` when a registered deadline passes,
//! and a dedicated scheduler thread waiting on a deadline-ordered map is that
//! something.
//!
//! ## Lock ordering
//!
//! There is only one lock (`SCHED`) now that the scaled-clock mutex is gone,
//! so the lock-inversion hazard the original two-mutex design guarded against
//! no longer applies.

use core::task::Waker;
use embassy_time_driver::{time_driver_impl, Driver, TICK_HZ};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant as StdInstant};

#[derive(Default)]
struct SchedulerState {
    queue: BTreeMap<u64, Vec<Waker>>,
}

static ORIGIN: OnceLock<StdInstant> = OnceLock::new();
static SCHED: OnceLock<Mutex<SchedulerState>> = OnceLock::new();
static CV: OnceLock<Condvar> = OnceLock::new();
static SCHEDULER_STARTED: OnceLock<()> = OnceLock::new();

fn origin() -> StdInstant {
    *ORIGIN.get_or_init(StdInstant::now)
}

fn sched() -> &'static Mutex<SchedulerState> {
    SCHED.get_or_init(|| Mutex::new(SchedulerState::default()))
}

fn cv() -> &'static Condvar {
    CV.get_or_init(Condvar::new)
}

fn tick_hz() -> u64 {
    TICK_HZ
}

fn real_now() -> StdInstant {
    StdInstant::now()
}

/// Real elapsed time since process start, expressed in Embassy ticks.
fn real_to_ticks(r: StdInstant) -> u64 {
    let dt = r.saturating_duration_since(origin());
    (dt.as_nanos() as u128 * tick_hz() as u128 / 1_000_000_000u128) as u64
}

/// Inverse of [`real_to_ticks`].
fn ticks_to_real(ticks: u64) -> StdInstant {
    let ns = (ticks as u128) * 1_000_000_000u128 / (tick_hz() as u128);
    origin() + Duration::from_nanos(ns.min(u64::MAX as u128) as u64)
}

fn ensure_scheduler_thread() {
    SCHEDULER_STARTED.get_or_init(|| {
        std::thread::Builder::new()
            .name("vsp-time-scheduler".into())
            .spawn(scheduler_thread)
            .expect("failed to start vsp time scheduler thread");
    });
}

/// Waits for the next due deadline and wakes registered wakers. Waits are
/// sliced to 25ms so a missed notify never stalls a wakeup for long.
fn scheduler_thread() {
    const MAX_WAIT_SLICE: Duration = Duration::from_millis(25);
    loop {
        let next_at = loop {
            let guard = sched().lock().unwrap();
            if guard.queue.is_empty() {
                let guard = cv().wait(guard).unwrap();
                drop(guard);
                continue;
            }
            let (&next_at, _) = guard.queue.iter().next().unwrap();
            drop(guard);
            break next_at;
        };

        let real_target = ticks_to_real(next_at);
        let now_r = real_now();

        if real_target > now_r {
            let mut wait_dur = real_target - now_r;
            if wait_dur > MAX_WAIT_SLICE {
                wait_dur = MAX_WAIT_SLICE;
            }
            let guard = sched().lock().unwrap();
            let _ = cv().wait_timeout(guard, wait_dur).unwrap();
            continue;
        }

        let now_ticks = real_to_ticks(real_now());
        let mut ready: Vec<Waker> = Vec::new();
        {
            let mut guard = sched().lock().unwrap();
            let mut to_remove = Vec::new();
            for (&ts, ws) in guard.queue.iter() {
                if ts <= now_ticks {
                    ready.extend(ws.iter().cloned());
                    to_remove.push(ts);
                } else {
                    break;
                }
            }
            for ts in to_remove {
                guard.queue.remove(&ts);
            }
        }

        for w in ready {
            w.wake();
        }
    }
}

struct PassthroughDriver;

impl Driver for PassthroughDriver {
    fn now(&self) -> u64 {
        real_to_ticks(real_now())
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        ensure_scheduler_thread();
        let mut guard = sched().lock().unwrap();
        guard.queue.entry(at).or_default().push(waker.clone());
        drop(guard);
        cv().notify_all();
    }
}

time_driver_impl!(static DRIVER: PassthroughDriver = PassthroughDriver);
