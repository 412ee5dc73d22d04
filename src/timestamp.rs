//! Timestamp and delay types shared by the whole crate.
//!
//! A `Timestamp` is a `chrono::DateTime<Utc>` rather than a bespoke newtype:
//! event streams carry real calendar dates (sometimes years in the past), so
//! a monotonic-only clock type (`std::time::Instant`) won't do, and chrono is
//! already part of the dependency stack this crate is grounded on.

use chrono::{DateTime, Utc};
use std::time::Duration as StdDuration;

/// A point on the merged past/live timeline. See module docs.
pub type Timestamp = DateTime<Utc>;

/// The current wall-clock instant, as a `Timestamp`.
pub(crate) fn now_wall() -> Timestamp {
    Utc::now()
}

/// The argument accepted by [`crate::sleep`] and [`crate::call_later`]: either
/// a relative delay (seconds or a duration) or an absolute instant.
///
/// This is the Rust stand-in for the source API's `Union[float, timedelta,
/// datetime, None]` delay parameter: Rust has no single type that is
/// simultaneously "a float", "a duration" and "a point in time", so the
/// `From` impls below let callers write `1.0`, `Duration::from_secs(1)`, or a
/// `Timestamp` directly and have it resolve to the right `Delay` variant.
#[derive(Debug, Clone, Copy)]
pub enum Delay {
    /// Offset from `now()`, in seconds.
    Seconds(f64),
    /// Offset from `now()`.
    Duration(chrono::Duration),
    /// An absolute instant, honored verbatim (not an offset).
    At(Timestamp),
    /// No delay: resolves to `now()`. The Rust equivalent of passing `None`.
    Now,
}

impl Delay {
    /// The Rust equivalent of passing `None` for `delay`.
    pub fn now() -> Self {
        Delay::Now
    }

    pub(crate) fn resolve(self, now: Timestamp) -> Timestamp {
        match self {
            Delay::Seconds(secs) => now + chrono::Duration::milliseconds((secs * 1000.0).round() as i64),
            Delay::Duration(d) => now + d,
            Delay::At(t) => t,
            Delay::Now => now,
        }
    }
}

impl From<f64> for Delay {
    fn from(secs: f64) -> Self {
        Delay::Seconds(secs)
    }
}

impl From<i32> for Delay {
    fn from(secs: i32) -> Self {
        Delay::Seconds(secs as f64)
    }
}

impl From<StdDuration> for Delay {
    fn from(d: StdDuration) -> Self {
        Delay::Duration(chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()))
    }
}

impl From<chrono::Duration> for Delay {
    fn from(d: chrono::Duration) -> Self {
        Delay::Duration(d)
    }
}

impl From<Timestamp> for Delay {
    fn from(t: Timestamp) -> Self {
        Delay::At(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_delay_resolves_as_offset() {
        let now = Utc::now();
        let due = Delay::from(2.5).resolve(now);
        assert_eq!(due, now + chrono::Duration::milliseconds(2500));
    }

    #[test]
    fn absolute_delay_ignores_now() {
        let now = Utc::now();
        let target = now + chrono::Duration::days(365);
        let due = Delay::from(target).resolve(now);
        assert_eq!(due, target);
    }

    #[test]
    fn now_delay_resolves_to_now() {
        let now = Utc::now();
        assert_eq!(Delay::now().resolve(now), now);
    }
}
