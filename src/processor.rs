//! The scheduler loop (§4.4) and the ambient processor context.
//!
//! Grounded on `simulation/network_task.rs`'s central `select`-driven
//! coordinating loop for the overall shape ("wait for one of several
//! concurrent conditions, then dispatch"), and on `asp/processor.py`'s
//! `Processor.run` for the actual scheduling rules.
//!
//! Ambient context is a thread-local stack rather than a single global
//! singleton, directly addressing the source design's own caveat about
//! module-level globals aliasing across nested or sequential runs (see
//! SPEC_FULL.md Design Notes): every [`crate::run`] call pushes a fresh
//! handle and pops it on return, so nested/sequential runs never see each
//! other's state.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::Waker;

use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration as EDuration, Timer};
use futures::future::{poll_immediate, LocalBoxFuture};
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::clock::VirtualClock;
use crate::error::{Error, Result};
use crate::heap::DeadlineHeap;
use crate::timestamp::{now_wall, Delay, Timestamp};

pub(crate) type DeferredThunk = Box<dyn FnOnce(Timestamp) -> LocalBoxFuture<'static, Result<()>>>;

struct Inner {
    clock: VirtualClock,
    wake_registry: DeadlineHeap<Waker>,
    deferred: DeadlineHeap<DeferredThunk>,
    pending_streams: Vec<LocalBoxFuture<'static, Result<()>>>,
    next_label: usize,
}

/// A cheaply-cloned handle to the currently-running processor. Never `Send`
/// (it closes over `Rc`), which is why the scheduler this crate builds is
/// single-threaded (§5) rather than work-stealing.
#[derive(Clone)]
pub(crate) struct ProcessorHandle {
    inner: Rc<RefCell<Inner>>,
    signal: Rc<Signal<NoopRawMutex, ()>>,
}

impl ProcessorHandle {
    fn new(start: Timestamp) -> Self {
        ProcessorHandle {
            inner: Rc::new(RefCell::new(Inner {
                clock: VirtualClock::new(start),
                wake_registry: DeadlineHeap::new(),
                deferred: DeadlineHeap::new(),
                pending_streams: Vec::new(),
                next_label: 0,
            })),
            signal: Rc::new(Signal::new()),
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.inner.borrow().clock.now()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.inner.borrow().clock.is_live()
    }

    pub(crate) fn register_wake(&self, due: Timestamp, waker: Waker) {
        self.inner.borrow_mut().wake_registry.push(due, waker);
        // A freshly-registered deadline may be sooner than whatever wait the
        // main loop already committed to (its `Timer::after` was sized from
        // the *previous* `t_next`); wake it so it recomputes one.
        self.signal.signal(());
    }

    fn next_label(&self, prefix: &str) -> String {
        let mut inner = self.inner.borrow_mut();
        let label = format!("{prefix}#{}", inner.next_label);
        inner.next_label += 1;
        label
    }

    /// Adopt a stream future dynamically (the Rust equivalent of
    /// `call_later(None, new_driver)`). Safe to call from inside a running
    /// callback: the future is queued and picked up by the main loop on its
    /// next iteration rather than pushed directly, since the main loop may
    /// currently hold the only `FuturesUnordered` that can hold it.
    pub(crate) fn spawn_stream(&self, driver: LocalBoxFuture<'static, Result<()>>) {
        let label = self.next_label("stream");
        let labeled = label_future(driver, label);
        self.inner.borrow_mut().pending_streams.push(labeled);
        self.signal.signal(());
    }

    pub(crate) fn call_later(&self, delay: impl Into<Delay>, thunk: DeferredThunk) {
        let due = delay.into().resolve(self.now());
        self.inner.borrow_mut().deferred.push(due, thunk);
        self.signal.signal(());
    }

    async fn wait_signal(&self) {
        self.signal.wait().await;
    }
}

fn label_future(fut: LocalBoxFuture<'static, Result<()>>, label: String) -> LocalBoxFuture<'static, Result<()>> {
    Box::pin(async move { fut.await.map_err(|e| e.labeled(label)) })
}

fn chrono_to_embassy(d: std::time::Duration) -> EDuration {
    EDuration::from_micros(d.as_micros().min(u64::MAX as u128) as u64)
}

fn min_opt(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

thread_local! {
    static STACK: RefCell<Vec<ProcessorHandle>> = RefCell::new(Vec::new());
}

pub(crate) fn current_processor() -> Option<ProcessorHandle> {
    STACK.with(|s| s.borrow().last().cloned())
}

struct AmbientGuard;

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

fn push_ambient(handle: ProcessorHandle) -> AmbientGuard {
    STACK.with(|s| s.borrow_mut().push(handle));
    AmbientGuard
}

/// Drive `streams` plus whatever history/live events and deferred calls are
/// registered against `handle` to completion, following the three virtual
/// clock rules of §4.1 and the dispatch order of §4.4.
async fn drive(handle: ProcessorHandle, initial: Vec<LocalBoxFuture<'static, Result<()>>>) -> Result<()> {
    let mut streams: FuturesUnordered<LocalBoxFuture<'static, Result<()>>> = FuturesUnordered::new();
    for fut in initial {
        let label = handle.next_label("stream");
        streams.push(label_future(fut, label));
    }

    loop {
        // Give every stream that's currently ready a chance to run before
        // looking at the deadline heaps: a stream that hasn't been polled
        // yet (including, on the very first iteration, every stream that
        // was just pushed above) hasn't registered its first `sleep_until`
        // deadline, so deciding "nothing due → go live" from the heaps
        // alone would fire before any history has actually been replayed.
        // Mirrors `asp/processor.py`'s `Processor.run`, which primes every
        // stream's past-event buffer before consulting `fast_forwarding()`.
        drain_ready(&mut streams).await?;
        drain_pending(&handle, &mut streams);

        let t_next = {
            let inner = handle.inner.borrow();
            min_opt(inner.wake_registry.peek_due(), inner.deferred.peek_due())
        };

        let due_now = match t_next {
            Some(t) => !handle.is_live() || t <= now_wall(),
            None => false,
        };

        if due_now {
            let t = t_next.expect("due_now implies t_next is Some");
            let start = handle.inner.borrow().clock.begin_measure();
            log::trace!("dispatching due batch at {t}");

            {
                let mut inner = handle.inner.borrow_mut();
                inner.clock.jump_to(t);
                while let Some(waker) = inner.wake_registry.pop_if_due(t) {
                    waker.wake();
                }
            }

            loop {
                let thunk = handle.inner.borrow_mut().deferred.pop_if_due(t);
                match thunk {
                    Some(thunk) => {
                        let fut = thunk(t);
                        let label = handle.next_label("deferred");
                        streams.push(label_future(fut, label));
                    }
                    None => break,
                }
            }

            handle.inner.borrow_mut().clock.end_measure(start);
            continue;
        }

        let nothing_left = streams.is_empty() && handle.inner.borrow().deferred.is_empty();
        if nothing_left {
            break;
        }

        if !handle.is_live() {
            handle.inner.borrow_mut().clock.go_live();
            log::debug!("processor caught up with wall-clock; switching to live mode");
        }

        let wait_duration = match t_next {
            Some(t) => (t - now_wall()).to_std().unwrap_or(std::time::Duration::ZERO),
            None => std::time::Duration::from_secs(3600),
        };

        let start = handle.inner.borrow().clock.begin_measure();
        let outcome = select3(Timer::after(chrono_to_embassy(wait_duration)), handle.wait_signal(), streams.next()).await;
        handle.inner.borrow_mut().clock.end_measure(start);

        if let Either3::Third(Some(Err(e))) = outcome {
            log::warn!("stream terminated with an error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

/// Poll every currently-ready stream once each, looping until the ready
/// queue is exhausted without anything completing (`None`) or there are no
/// streams left at all (`Some(None)`). Uses the real executor-supplied
/// waker via [`poll_immediate`] rather than a throwaway one, so any stream
/// that suspends on a fresh `sleep` during this pass registers a waker that
/// will actually be woken later.
async fn drain_ready(streams: &mut FuturesUnordered<LocalBoxFuture<'static, Result<()>>>) -> Result<()> {
    loop {
        match poll_immediate(streams.next()).await {
            Some(Some(Ok(()))) => continue,
            Some(Some(Err(e))) => return Err(e),
            Some(None) | None => return Ok(()),
        }
    }
}

fn drain_pending(handle: &ProcessorHandle, streams: &mut FuturesUnordered<LocalBoxFuture<'static, Result<()>>>) {
    let pending = std::mem::take(&mut handle.inner.borrow_mut().pending_streams);
    for fut in pending {
        streams.push(fut);
    }
}

/// Run the scheduler to completion over `streams`, starting virtual history
/// at `start` (§4.4). Returns once every stream has exhausted both its past
/// and live portions and no deferred call remains pending.
pub async fn run(start: Timestamp, streams: Vec<LocalBoxFuture<'static, Result<()>>>) -> Result<()> {
    let handle = ProcessorHandle::new(start);
    let _guard = push_ambient(handle.clone());
    drive(handle, streams).await
}

/// The current point on the merged past/live timeline (§4.1).
///
/// # Errors
/// Returns [`Error::ContractViolation`] if called outside [`crate::run`].
pub fn now() -> Result<Timestamp> {
    current_processor().map(|p| p.now()).ok_or_else(|| Error::contract("now() called outside of run()"))
}

/// Schedule `callback` to run once virtual time reaches `delay` from now.
///
/// `callback` receives the due time and must return a future; wrap a plain
/// synchronous body in `async move { ... }` (or use [`crate::sleep`] inside
/// it to suspend further). This is the Rust shape of the source API's
/// `call_later(delay, callable, *args)`: variadic positional arguments
/// become whatever the closure captures.
///
/// # Errors
/// Returns [`Error::ContractViolation`] if called outside [`crate::run`].
pub fn call_later<F, Fut>(delay: impl Into<Delay>, callback: F) -> Result<()>
where
    F: FnOnce(Timestamp) -> Fut + 'static,
    Fut: std::future::Future<Output = ()> + 'static,
{
    let processor = current_processor().ok_or_else(|| Error::contract("call_later() called outside of run()"))?;
    let thunk: DeferredThunk = Box::new(move |due| Box::pin(async move { Ok(callback(due).await) }));
    processor.call_later(delay, thunk);
    Ok(())
}

/// Adopt an already-constructed stream driver (e.g. the future returned by
/// [`crate::process_stream`]) while the processor is already running. The
/// Rust equivalent of the source API's `call_later(None, new_driver)`
/// dynamic-stream pattern (SPEC_FULL.md Design Notes).
///
/// # Errors
/// Returns [`Error::ContractViolation`] if called outside [`crate::run`].
pub fn spawn_stream(driver: LocalBoxFuture<'static, Result<()>>) -> Result<()> {
    let processor = current_processor().ok_or_else(|| Error::contract("spawn_stream() called outside of run()"))?;
    processor.spawn_stream(driver);
    Ok(())
}
