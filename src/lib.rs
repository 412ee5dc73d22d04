//! A single-threaded, cooperative scheduler that drives callbacks over a
//! merged past/live event timeline on a virtual clock.
//!
//! The model: register one or more event streams (each a mix of recorded
//! `past` events and an optional live `future` feed), then call [`run`].
//! While any stream still has unconsumed past events, the virtual clock
//! fast-forwards through them with no real waiting; once every stream has
//! caught up, the clock tracks wall-clock time directly and dispatch
//! happens in real time. [`call_later`] and [`timer`] schedule additional
//! work on the same clock, and [`sleep`] is how a callback itself suspends.
//!
//! All of this is ambient: `now`/`sleep`/`call_later`/`spawn_stream` read an
//! implicit "currently running processor" rather than taking a handle
//! argument, matching the module-level function API of the implementation
//! this crate is a port of. That ambient state is a thread-local stack
//! pushed by [`run`] for the duration of the call, so nested or sequential
//! `run` calls never see each other's state.

mod callback;
mod clock;
mod error;
mod heap;
mod processor;
mod sleep;
mod stream;
mod timer;
mod timestamp;
mod unpack;

pub use callback::Callback;
pub use error::{Error, Result};
pub use processor::{call_later, now, run, spawn_stream};
pub use sleep::sleep;
pub use stream::{process_stream, SourceItem, StreamConfig};
pub use timer::timer;
pub use timestamp::{Delay, Timestamp};
pub use unpack::{FromKwargs, UnpackArgs};

pub use futures::future::LocalBoxFuture;
