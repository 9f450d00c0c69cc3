use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::DEFAULT_WINDOW_MICROS;

/// Wall clock time in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(since_epoch.as_micros() as u64)
    }

    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Microseconds elapsed since `earlier`, zero if the clock went backwards.
    pub fn micros_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Open,
    Locked,
}

impl LockStatus {
    /// Value published under `lock`.
    pub fn report_value(&self) -> &'static str {
        match self {
            LockStatus::Open => "0",
            LockStatus::Locked => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: LockStatus,
}

/// Derives the lock status from how long ago a beacon was last seen.
///
/// The status is `Open` while the last beacon sighting is at most `window`
/// microseconds old and `Locked` afterwards. It has to be fed on every
/// record, not only on beacon sightings, for the `Locked` edge to be noticed.
#[derive(Debug)]
pub struct PresenceTracker {
    window_micros: u64,
    status: LockStatus,
    last_open_at: Timestamp,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        PresenceTracker::new(DEFAULT_WINDOW_MICROS)
    }
}

impl PresenceTracker {
    pub fn new(window_micros: u64) -> Self {
        PresenceTracker {
            window_micros,
            status: LockStatus::Locked,
            last_open_at: Timestamp::default(),
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> LockStatus {
        self.status
    }

    #[cfg(test)]
    pub fn last_open_at(&self) -> Timestamp {
        self.last_open_at
    }

    /// Re-evaluates the status at `now`, returning a transition when it flips.
    pub fn observe(&mut self, beacon_sighted: bool, now: Timestamp) -> Option<Transition> {
        if beacon_sighted {
            self.last_open_at = now;
        }

        let elapsed = now.micros_since(self.last_open_at);
        let new_status = if elapsed > self.window_micros {
            LockStatus::Locked
        } else {
            LockStatus::Open
        };

        let transition = if new_status != self.status {
            if new_status == LockStatus::Open {
                // window restarts at the flip, whatever record caused it
                self.last_open_at = now;
            }
            Some(Transition { to: new_status })
        } else {
            None
        };

        self.status = new_status;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000_000;

    fn at(offset_micros: u64) -> Timestamp {
        Timestamp::from_micros(T0 + offset_micros)
    }

    #[test]
    fn test_starts_locked() {
        let mut tracker = PresenceTracker::default();
        assert_eq!(tracker.status(), LockStatus::Locked);
        assert_eq!(tracker.observe(false, at(0)), None);
        assert_eq!(tracker.status(), LockStatus::Locked);
    }

    #[test]
    fn test_open_then_lock_after_window() {
        let mut tracker = PresenceTracker::default();

        assert_eq!(
            tracker.observe(true, at(0)),
            Some(Transition { to: LockStatus::Open })
        );
        assert_eq!(tracker.observe(false, at(4_000_000)), None);
        assert_eq!(tracker.status(), LockStatus::Open);

        assert_eq!(
            tracker.observe(false, at(6_000_000)),
            Some(Transition { to: LockStatus::Locked })
        );
        assert_eq!(tracker.status(), LockStatus::Locked);
        assert_eq!(tracker.observe(false, at(7_000_000)), None);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(true, at(0));
        assert_eq!(tracker.observe(false, at(5_000_000)), None);
        assert_eq!(
            tracker.observe(false, at(5_000_001)),
            Some(Transition { to: LockStatus::Locked })
        );
    }

    #[test]
    fn test_repeated_sightings_emit_once() {
        let mut tracker = PresenceTracker::default();
        let transitions: Vec<_> = (0..20u64)
            .filter_map(|i| tracker.observe(i % 3 == 0, at(i * 500_000)))
            .collect();
        assert_eq!(transitions, vec![Transition { to: LockStatus::Open }]);
    }

    #[test]
    fn test_beacon_reopens() {
        let mut tracker = PresenceTracker::new(1_000_000);
        tracker.observe(true, at(0));
        tracker.observe(false, at(2_000_000));
        assert_eq!(tracker.status(), LockStatus::Locked);
        assert_eq!(
            tracker.observe(true, at(3_000_000)),
            Some(Transition { to: LockStatus::Open })
        );
        assert_eq!(tracker.last_open_at(), at(3_000_000));
    }

    #[test]
    fn test_flip_to_open_restarts_window() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(true, at(0));
        tracker.observe(false, at(6_000_000));
        assert_eq!(tracker.status(), LockStatus::Locked);
        assert_eq!(tracker.last_open_at(), at(0));

        // a non-beacon record flips back to open when the clock steps back
        assert_eq!(
            tracker.observe(false, at(1_000_000)),
            Some(Transition { to: LockStatus::Open })
        );
        assert_eq!(tracker.last_open_at(), at(1_000_000));
        assert_eq!(tracker.observe(false, at(6_000_000)), None);
        assert_eq!(
            tracker.observe(false, at(6_000_001)),
            Some(Transition { to: LockStatus::Locked })
        );
    }

    #[test]
    fn test_clock_going_backwards_counts_as_recent() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(true, at(10_000_000));
        assert_eq!(tracker.observe(false, at(9_000_000)), None);
        assert_eq!(tracker.status(), LockStatus::Open);
    }

    #[test]
    fn test_report_values() {
        assert_eq!(LockStatus::Open.report_value(), "0");
        assert_eq!(LockStatus::Locked.report_value(), "1");
    }
}
