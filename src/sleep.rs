//! `sleep`: the one true suspension point (§4.1, §4.2, Design Notes).
//!
//! Everything else in this crate that "waits" — replaying past events at
//! their recorded offsets, `timer`'s periodic ticks, `call_later`'s delay —
//! bottoms out in this future. An `AwaitExternal`-style suspension (awaiting
//! some arbitrary external resource) needs no special type at all: it's just
//! an ordinary `.await` on whatever future the external resource already
//! provides, which is the whole point of building this on native `Future`
//! rather than a hand-rolled coroutine protocol (SPEC_FULL.md Design Notes).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Error;
use crate::processor::{current_processor, ProcessorHandle};
use crate::timestamp::Timestamp;

/// The future returned by [`crate::sleep`].
pub struct Sleep {
    due: Timestamp,
    processor: ProcessorHandle,
}

/// Suspend the calling stream/callback until virtual time reaches `delay`
/// from now.
///
/// # Errors
/// Returns [`Error::ContractViolation`] if called outside [`crate::run`].
pub fn sleep(delay: impl Into<crate::timestamp::Delay>) -> Result<Sleep, Error> {
    let processor = current_processor().ok_or_else(|| Error::contract("sleep() called outside of run()"))?;
    let due = delay.into().resolve(processor.now());
    Ok(Sleep { due, processor })
}

pub(crate) fn sleep_until(due: Timestamp, processor: ProcessorHandle) -> Sleep {
    Sleep { due, processor }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.processor.now() >= this.due {
            return Poll::Ready(());
        }
        this.processor.register_wake(this.due, cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_outside_run_is_a_contract_violation() {
        assert!(matches!(sleep(1.0), Err(Error::ContractViolation(_))));
    }
}
