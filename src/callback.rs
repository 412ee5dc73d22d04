//! The callback shape accepted by [`crate::process_stream`] (§4.3 data
//! model: "Callback").
//!
//! A callback can be synchronous (runs to completion before the next event
//! is considered) or asynchronous (itself suspends, e.g. to await an
//! external resource). Both shapes are normalized to the same
//! `Fn(Timestamp, P) -> LocalBoxFuture<'static, ()>` call convention before
//! the stream driver ever touches them, mirroring the source API's
//! `call_method` wrapper that always produces a coroutine regardless of
//! whether the underlying function was `async def`.
//!
//! The three unpacking modes of §4.3 (default / `unpack_args` /
//! `unpack_kwargs`) are resolved at construction time rather than at
//! dispatch time: the source API picks the mode dynamically and splats
//! accordingly, but a Rust closure's signature is fixed once written, so
//! each mode gets its own constructor ([`Callback::sync_unpack_args`],
//! [`Callback::sync_unpack_kwargs`]) instead of a runtime flag threaded
//! through [`crate::process_stream`].

use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::Error;
use crate::timestamp::Timestamp;
use crate::unpack::{FromKwargs, UnpackArgs};

type SyncFn<P> = Box<dyn Fn(Timestamp, P)>;
type AsyncFn<P> = Box<dyn Fn(Timestamp, P) -> LocalBoxFuture<'static, ()>>;
type SyncResultFn<P> = Box<dyn Fn(Timestamp, P) -> Result<(), Error>>;
type AsyncResultFn<P> = Box<dyn Fn(Timestamp, P) -> LocalBoxFuture<'static, Result<(), Error>>>;

/// A normalized stream callback. Build one with [`Callback::sync`] or
/// [`Callback::asynchronous`].
///
/// Neither variant requires `Send`: the scheduler this crate builds is
/// explicitly single-threaded (§5), so callbacks are free to close over
/// `Rc`/`RefCell` state the way the ambient processor handle itself does.
pub enum Callback<P> {
    Sync(SyncFn<P>),
    Async(AsyncFn<P>),
    /// Like `Sync`, but `f` may itself report an `Error` (used by
    /// `unpack_kwargs` mode, §7 point 1, to surface a shape mismatch as a
    /// [`Error::ContractViolation`] rather than a panic).
    SyncResult(SyncResultFn<P>),
    /// Async counterpart of `SyncResult`.
    AsyncResult(AsyncResultFn<P>),
}

impl<P> Callback<P> {
    /// Wrap a plain synchronous callback. Panics inside `f` are caught and
    /// surfaced as [`Error::CallbackFailure`] rather than unwinding through
    /// the scheduler.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Timestamp, P) + 'static,
    {
        Callback::Sync(Box::new(f))
    }

    /// Wrap a callback that itself returns a future (an `async fn`-shaped
    /// callback, or one that explicitly suspends via [`crate::sleep`] or an
    /// arbitrary external future).
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Timestamp, P) -> Fut + 'static,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        Callback::Async(Box::new(move |t, p| Box::pin(f(t, p))))
    }

    /// Invoke the callback, normalizing both shapes to a future and catching
    /// panics out of the synchronous path.
    pub(crate) fn invoke(&self, event_time: Timestamp, payload: P, site: &str) -> LocalBoxFuture<'static, Result<(), Error>>
    where
        P: 'static,
    {
        match self {
            Callback::Sync(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(event_time, payload)));
                let site = site.to_string();
                Box::pin(async move { result.map_err(|payload| Error::callback_panic(site, payload)) })
            }
            Callback::Async(f) => {
                let fut = f(event_time, payload);
                Box::pin(async move { Ok(fut.await) })
            }
            Callback::SyncResult(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(event_time, payload)));
                let site = site.to_string();
                Box::pin(async move {
                    match result {
                        Ok(inner) => inner,
                        Err(payload) => Err(Error::callback_panic(site, payload)),
                    }
                })
            }
            Callback::AsyncResult(f) => {
                let fut = f(event_time, payload);
                Box::pin(async move { fut.await })
            }
        }
    }
}

impl<P: UnpackArgs + 'static> Callback<P> {
    /// `unpack_args` mode (§4.3): `P` is a tuple-shaped payload, splatted
    /// positionally into `f` instead of handed over as one value.
    pub fn sync_unpack_args<F>(f: F) -> Self
    where
        F: Fn(Timestamp, P::Args) + 'static,
    {
        Callback::Sync(Box::new(move |t, p| f(t, p.unpack_args())))
    }

    /// Async counterpart of [`Callback::sync_unpack_args`].
    pub fn async_unpack_args<F, Fut>(f: F) -> Self
    where
        F: Fn(Timestamp, P::Args) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        Callback::Async(Box::new(move |t, p| Box::pin(f(t, p.unpack_args()))))
    }
}

impl<V: 'static> Callback<HashMap<String, V>> {
    /// `unpack_kwargs` mode (§4.3): the payload is a keyword map, and `T`
    /// builds itself from it via [`FromKwargs`]. A map missing a key `T`
    /// requires is a callback/payload shape mismatch, not a runtime failure
    /// in the callback body — §7 point 1 classifies that as
    /// [`Error::ContractViolation`], so it's reported directly rather than
    /// by panicking into `catch_unwind`.
    pub fn sync_unpack_kwargs<F, T>(f: F) -> Self
    where
        T: FromKwargs<V>,
        F: Fn(Timestamp, T) + 'static,
    {
        Callback::SyncResult(Box::new(move |t, map| match T::from_kwargs(&map) {
            Some(args) => {
                f(t, args);
                Ok(())
            }
            None => Err(Error::contract("kwargs payload missing a key required by the callback")),
        }))
    }

    /// Async counterpart of [`Callback::sync_unpack_kwargs`].
    pub fn async_unpack_kwargs<F, T, Fut>(f: F) -> Self
    where
        T: FromKwargs<V>,
        F: Fn(Timestamp, T) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        Callback::AsyncResult(Box::new(move |t, map| match T::from_kwargs(&map) {
            Some(args) => {
                let fut = f(t, args);
                Box::pin(async move {
                    fut.await;
                    Ok(())
                })
            }
            None => Box::pin(async { Err(Error::contract("kwargs payload missing a key required by the callback")) }),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn sync_callback_runs_and_reports_ok() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let cb = Callback::sync(move |_t, n: u32| {
            calls2.fetch_add(n, Ordering::SeqCst);
        });
        let result = futures::executor::block_on(cb.invoke(Utc::now(), 5, "stream#0"));
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn sync_callback_panic_becomes_callback_failure() {
        let cb: Callback<u32> = Callback::sync(|_t, _n| panic!("boom"));
        let result = futures::executor::block_on(cb.invoke(Utc::now(), 1, "stream#3"));
        match result {
            Err(Error::CallbackFailure { site, message }) => {
                assert_eq!(site, "stream#3");
                assert_eq!(message, "boom");
            }
            other => panic!("expected CallbackFailure, got {other:?}"),
        }
    }

    #[test]
    fn async_callback_runs_to_completion() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let cb = Callback::asynchronous(move |_t, n: u32| {
            let calls3 = calls2.clone();
            async move {
                calls3.fetch_add(n, Ordering::SeqCst);
            }
        });
        let result = futures::executor::block_on(cb.invoke(Utc::now(), 7, "stream#1"));
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn unpack_args_splats_a_tuple_positionally() {
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let cb: Callback<(u32, String)> = Callback::sync_unpack_args(move |_t, (n, name)| {
            *seen2.borrow_mut() = Some((n, name));
        });
        let result = futures::executor::block_on(cb.invoke(Utc::now(), (3, "ada".to_string()), "stream#0"));
        assert!(result.is_ok());
        assert_eq!(*seen.borrow(), Some((3, "ada".to_string())));
    }

    #[derive(Debug, PartialEq, Clone)]
    struct Name(String);

    impl crate::unpack::FromKwargs<String> for Name {
        fn from_kwargs(map: &HashMap<String, String>) -> Option<Self> {
            Some(Name(map.get("name")?.clone()))
        }
    }

    #[test]
    fn unpack_kwargs_builds_the_callback_argument_from_a_map() {
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let cb: Callback<HashMap<String, String>> = Callback::sync_unpack_kwargs(move |_t, name: Name| {
            *seen2.borrow_mut() = Some(name);
        });
        let mut map = HashMap::new();
        map.insert("name".to_string(), "grace".to_string());
        let result = futures::executor::block_on(cb.invoke(Utc::now(), map, "stream#0"));
        assert!(result.is_ok());
        assert_eq!(*seen.borrow(), Some(Name("grace".to_string())));
    }

    #[test]
    fn unpack_kwargs_missing_key_is_a_contract_violation_not_a_panic() {
        let cb: Callback<HashMap<String, String>> = Callback::sync_unpack_kwargs(|_t, _name: Name| {});
        let result = futures::executor::block_on(cb.invoke(Utc::now(), HashMap::new(), "stream#0"));
        assert!(matches!(result, Err(Error::ContractViolation(_))), "expected ContractViolation, got {result:?}");
    }

    use std::cell::RefCell;
    use std::rc::Rc;
}
