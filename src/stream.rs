//! `process_stream` (§4.3): the per-stream state machine.
//!
//! Grounded on `asp/processor.py`'s `EventStream` for the past → live
//! sequencing, but expressed as a plain Rust `async fn` body instead of a
//! manually-driven coroutine: replaying `past` is just a `for` loop over
//! `sleep_until` + callback invocation, and draining `future` is just a
//! `while let Some(...) = stream.next().await` loop. Suspensions in either
//! phase are ordinary `.await` points handled by whatever executor is
//! driving the processor (§4.4), not a custom protocol.

use futures::future::LocalBoxFuture;
use futures::stream::{LocalBoxStream, StreamExt};

use crate::callback::Callback;
use crate::error::{Error, Result};
use crate::processor::current_processor;
use crate::sleep::sleep_until;
use crate::timestamp::Timestamp;

/// A live item, or a source-level failure (§7: `SourceFailure`). Use `Ok`
/// for ordinary items; the source only needs `Err` for the rare case where
/// the underlying live feed itself breaks (e.g. a dropped connection),
/// distinct from simply running dry (which a `Stream` signals by ending).
pub type SourceItem<P> = std::result::Result<(Timestamp, P), Box<dyn std::error::Error>>;

/// Everything [`process_stream`] needs to drive one event stream (§4.3 data
/// model: "StreamSource").
pub struct StreamConfig<P> {
    callback: Callback<P>,
    past: Box<dyn Iterator<Item = (Timestamp, P)>>,
    future: Option<LocalBoxStream<'static, SourceItem<P>>>,
    on_start: Option<Box<dyn FnOnce()>>,
    on_live_start: Option<Box<dyn FnOnce()>>,
}

impl<P: 'static> StreamConfig<P> {
    pub fn new(callback: Callback<P>) -> Self {
        StreamConfig { callback, past: Box::new(std::iter::empty()), future: None, on_start: None, on_live_start: None }
    }

    /// Recorded events to replay at their original offsets before the live
    /// portion (if any) takes over. Must be ordered by event time; this is
    /// an invariant the caller is responsible for (§4.3 invariants).
    pub fn with_past(mut self, past: impl IntoIterator<Item = (Timestamp, P)> + 'static) -> Self {
        self.past = Box::new(past.into_iter());
        self
    }

    /// The live tail of the stream, consumed after `past` is exhausted.
    pub fn with_future(mut self, future: impl futures::Stream<Item = SourceItem<P>> + 'static) -> Self {
        self.future = Some(Box::pin(future));
        self
    }

    /// Invoked once, before the first past event (or immediately if `past`
    /// is empty).
    pub fn on_start(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Invoked once `past` is exhausted, before the live portion begins
    /// (§4.3 step 3).
    pub fn on_live_start(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_live_start = Some(Box::new(f));
        self
    }
}

/// Build the driver future for one stream. The returned future is meant to
/// be handed to [`crate::run`] (as a top-level stream) or
/// [`crate::spawn_stream`] (to adopt it dynamically while already running).
pub fn process_stream<P>(config: StreamConfig<P>) -> LocalBoxFuture<'static, Result<()>>
where
    P: 'static,
{
    Box::pin(async move {
        let processor = current_processor().ok_or_else(|| Error::contract("process_stream() driven outside of run()"))?;
        let StreamConfig { callback, past, future, on_start, on_live_start } = config;

        if let Some(on_start) = on_start {
            on_start();
        }

        for (event_time, payload) in past {
            sleep_until(event_time, processor.clone()).await;
            callback.invoke(event_time, payload, "stream").await?;
        }

        if let Some(on_live_start) = on_live_start {
            on_live_start();
        }

        if let Some(mut future) = future {
            while let Some(item) = future.next().await {
                match item {
                    Ok((event_time, payload)) => {
                        callback.invoke(event_time, payload, "stream").await?;
                    }
                    Err(e) => {
                        return Err(Error::SourceFailure { site: "stream".to_string(), message: e.to_string() });
                    }
                }
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callback;
    use crate::processor::run;
    use chrono::{Duration, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn replays_past_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let start = Utc::now() - Duration::days(1);
        let past = vec![(start, 1u32), (start + Duration::seconds(1), 2u32), (start + Duration::seconds(2), 3u32)];

        let config = StreamConfig::new(Callback::sync(move |_t, n| seen2.borrow_mut().push(n))).with_past(past);

        futures::executor::block_on(async {
            run(start, vec![process_stream(config)]).await.unwrap();
        });

        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn on_start_and_on_live_start_both_fire_once() {
        let started = Rc::new(RefCell::new(false));
        let started2 = started.clone();
        let went_live = Rc::new(RefCell::new(false));
        let went_live2 = went_live.clone();
        let start = Utc::now() - Duration::hours(1);

        let config = StreamConfig::new(Callback::sync(|_t, _n: u32| {}))
            .with_past(vec![(start, 1u32)])
            .on_start(move || *started2.borrow_mut() = true)
            .on_live_start(move || *went_live2.borrow_mut() = true);

        futures::executor::block_on(async {
            run(start, vec![process_stream(config)]).await.unwrap();
        });

        assert!(*started.borrow());
        assert!(*went_live.borrow());
    }

    #[test]
    fn source_failure_is_surfaced_as_an_error() {
        let start = Utc::now() - Duration::hours(1);
        let failing = futures::stream::once(async { Err::<(Timestamp, u32), _>("disconnected".into()) });
        let config = StreamConfig::new(Callback::sync(|_t, _n: u32| {})).with_future(failing);

        let result = futures::executor::block_on(run(start, vec![process_stream(config)]));
        assert!(matches!(result, Err(Error::SourceFailure { .. })));
    }
}
