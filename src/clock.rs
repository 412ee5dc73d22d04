//! The virtual clock (§4.1): the three rules that advance virtual time.

pub(crate) mod driver;

use crate::timestamp::{now_wall, Timestamp};

/// Owns the single authoritative "current time" for one [`crate::run`]
/// invocation. Not `Clone`/`Copy`: there is exactly one per processor.
pub(crate) struct VirtualClock {
    virtual_time: Timestamp,
    actual_time: Timestamp,
    live: bool,
}

impl VirtualClock {
    pub(crate) fn new(start: Timestamp) -> Self {
        Self { virtual_time: start, actual_time: now_wall(), live: false }
    }

    /// Rule-aware "now": wall-clock once live, otherwise the virtual time as
    /// last advanced plus whatever wall-clock has elapsed since (rule 1,
    /// applied continuously rather than only at scope boundaries).
    pub(crate) fn now(&self) -> Timestamp {
        if self.live {
            now_wall()
        } else {
            self.virtual_time + (now_wall() - self.actual_time)
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live
    }

    /// Rule 2: jump straight to a scheduled due-time. A no-op once live (live
    /// mode never jumps, it only ever tracks wall-clock) and a no-op if
    /// `due` is already behind the current virtual time.
    pub(crate) fn jump_to(&mut self, due: Timestamp) {
        if !self.live && due > self.virtual_time {
            self.virtual_time = due;
            self.actual_time = now_wall();
        }
    }

    /// The history → live handover: snap virtual time to wall-clock exactly
    /// once, then track wall-clock directly from here on (rule 3).
    pub(crate) fn go_live(&mut self) {
        let wc = now_wall();
        self.virtual_time = wc;
        self.actual_time = wc;
        self.live = true;
    }

    /// Returns the wall-clock instant at the start of a measured scope (rule
    /// 1). Pair with [`Self::end_measure`] to fold the wall-clock cost of
    /// whatever ran in between back into virtual time.
    pub(crate) fn begin_measure(&self) -> Timestamp {
        now_wall()
    }

    pub(crate) fn end_measure(&mut self, start: Timestamp) {
        if !self.live {
            let end = now_wall();
            self.virtual_time = self.virtual_time + (end - start);
            self.actual_time = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn jump_to_advances_virtual_time_while_in_history_mode() {
        let start = now_wall() - Duration::days(1);
        let mut clock = VirtualClock::new(start);
        let due = start + Duration::hours(1);
        clock.jump_to(due);
        assert_eq!(clock.now(), due);
    }

    #[test]
    fn jump_to_never_goes_backwards() {
        let start = now_wall() - Duration::days(1);
        let mut clock = VirtualClock::new(start);
        clock.jump_to(start + Duration::hours(2));
        clock.jump_to(start + Duration::hours(1));
        assert_eq!(clock.now(), start + Duration::hours(2));
    }

    #[test]
    fn go_live_snaps_to_wall_clock_and_stays_there() {
        let start = now_wall() - Duration::days(30);
        let mut clock = VirtualClock::new(start);
        clock.go_live();
        assert!(clock.is_live());
        let wc = now_wall();
        assert!((clock.now() - wc).num_milliseconds().abs() < 50);
    }

    #[test]
    fn jump_to_is_a_no_op_once_live() {
        let start = now_wall() - Duration::days(1);
        let mut clock = VirtualClock::new(start);
        clock.go_live();
        let before = clock.now();
        clock.jump_to(start + Duration::days(400));
        assert!((clock.now() - before).num_seconds().abs() < 1);
    }
}
