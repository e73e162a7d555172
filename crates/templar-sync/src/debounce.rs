//! Suppression of duplicate change events.

use std::time::{Duration, SystemTime};

/// Events whose modification time is within this window of the last
/// accepted one are duplicates.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Accepts a change event only if its file modification time is more than
/// the window after the last accepted event's.
///
/// Watchers often report one save as several events; they all carry the
/// same (or nearly the same) mtime.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<SystemTime>,
}

impl Debouncer {
    /// Debouncer with a custom window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Whether an event with modification time `mtime` should be handled.
    /// Only accepted events move the reference point.
    pub fn accept(&mut self, mtime: SystemTime) -> bool {
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => mtime
                .duration_since(last)
                .map(|elapsed| elapsed > self.window)
                .unwrap_or(false),
        };
        if accepted {
            self.last_accepted = Some(mtime);
        }
        accepted
    }

    /// Modification time of the last accepted event.
    pub fn last_accepted(&self) -> Option<SystemTime> {
        self.last_accepted
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn at(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000) + Duration::from_millis(millis)
    }

    #[test]
    fn test_first_event_is_accepted() {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.last_accepted().is_none());
        assert!(debouncer.accept(at(0)));
        assert_eq!(debouncer.last_accepted(), Some(at(0)));
    }

    #[test_case(0, false ; "same mtime")]
    #[test_case(200, false ; "inside window")]
    #[test_case(500, false ; "window is exclusive")]
    #[test_case(501, true ; "just outside")]
    #[test_case(1500, true ; "well outside")]
    fn test_second_event(offset: u64, expected: bool) {
        let mut debouncer = Debouncer::default();
        debouncer.accept(at(1000));
        assert_eq!(debouncer.accept(at(1000 + offset)), expected);
    }

    #[test]
    fn test_older_mtime_is_rejected() {
        let mut debouncer = Debouncer::default();
        debouncer.accept(at(5000));
        assert!(!debouncer.accept(at(1000)));
    }

    #[test]
    fn test_rejected_events_do_not_move_reference() {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.accept(at(0)));
        assert!(!debouncer.accept(at(400)));
        // 800ms after the accepted event, though only 400ms after the rejected one.
        assert!(debouncer.accept(at(800)));
    }
}
