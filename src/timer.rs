//! `timer` (§4.5): a periodic callback on the virtual clock.
//!
//! Grounded directly on the newest source implementation's `timer`
//! coroutine: sleep until `start`, then repeatedly sleep for `step` and
//! dispatch `callback` via [`crate::call_later`], stopping once `end` is
//! reached (if given).

use std::future::Future;

use crate::call_later;
use crate::error::Result;
use crate::sleep::sleep;
use crate::timestamp::{Delay, Timestamp};

/// Run `callback` once every `step`, starting at `start` and (optionally)
/// stopping once virtual time reaches `end`.
///
/// # Errors
/// Returns [`crate::Error::ContractViolation`] if called outside
/// [`crate::run`].
pub async fn timer<F, Fut>(step: chrono::Duration, mut callback: F, start: impl Into<Delay>, end: Option<impl Into<Delay>>) -> Result<()>
where
    F: FnMut(Timestamp) -> Fut + Clone + 'static,
    Fut: Future<Output = ()> + 'static,
{
    sleep(start)?.await;
    let end = match end {
        Some(e) => Some(e.into().resolve(crate::now()?)),
        None => None,
    };

    loop {
        sleep(step)?.await;
        let cb = callback.clone();
        call_later(Delay::now(), move |due| cb_call(cb, due))?;
        if let Some(end) = end {
            if crate::now()? >= end {
                break;
            }
        }
    }
    Ok(())
}

async fn cb_call<F, Fut>(mut callback: F, due: Timestamp)
where
    F: FnMut(Timestamp) -> Fut,
    Fut: Future<Output = ()>,
{
    callback(due).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::run;
    use chrono::{Duration, Utc};
    use futures::future::LocalBoxFuture;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn timer_fires_until_end_then_stops() {
        let ticks = Rc::new(RefCell::new(0u32));
        let ticks2 = ticks.clone();
        let start = Utc::now() - Duration::seconds(10);

        futures::executor::block_on(async {
            let driver: LocalBoxFuture<'static, Result<()>> = Box::pin(async move {
                timer(
                    Duration::seconds(1),
                    move |_t| {
                        *ticks2.borrow_mut() += 1;
                        async {}
                    },
                    Delay::from(0.0),
                    Some(Delay::from(chrono::Duration::seconds(3))),
                )
                .await
            });
            run(start, vec![driver]).await.unwrap();
        });

        assert!(*ticks.borrow() >= 3);
    }
}
