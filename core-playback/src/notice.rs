//! Debounce for the "playing from the network" notice.

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Lets a notice through at most once per cooldown window.
pub struct RemoteNotice {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    last_shown: Mutex<Option<DateTime<Utc>>>,
}

impl RemoteNotice {
    pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            clock,
            cooldown,
            last_shown: Mutex::new(None),
        }
    }

    /// Returns true and starts a new window if the previous one has elapsed.
    pub fn should_notify(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_shown.lock();

        let due = match *last {
            Some(previous) => self.clock.elapsed_since(previous) >= self.cooldown,
            None => true,
        };

        if due {
            *last = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, secs: i64) {
            let mut now = self.0.lock();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    #[test]
    fn test_notice_is_debounced() {
        let clock = Arc::new(ManualClock(Mutex::new(Utc::now())));
        let notice = RemoteNotice::new(clock.clone(), Duration::from_secs(6));

        assert!(notice.should_notify());
        assert!(!notice.should_notify());

        clock.advance(5);
        assert!(!notice.should_notify());

        clock.advance(1);
        assert!(notice.should_notify());
        assert!(!notice.should_notify());
    }
}
