use std::time::Duration;

use tokio::time::Instant;

/// Enforces a minimum interval between attempts of one kind of command.
#[derive(Debug, Clone)]
pub struct CommandThrottle {
    last_attempt: Option<Instant>,
    min_interval: Duration,
}

impl CommandThrottle {
    /// A fresh throttle lets the first attempt through immediately.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_attempt: None,
            min_interval,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    /// Records an attempt at `now` and returns true if one is allowed.
    /// `last_attempt` never moves backwards.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.ready(now) {
            return false;
        }

        self.last_attempt = Some(match self.last_attempt {
            Some(last) if last > now => last,
            _ => now,
        });

        true
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_SECONDS: Duration = Duration::from_secs(5);

    #[test]
    fn first_attempt_is_allowed() {
        let mut throttle = CommandThrottle::new(FIVE_SECONDS);
        let now = Instant::now();

        assert!(throttle.ready(now));
        assert!(throttle.try_acquire(now));
        assert_eq!(throttle.last_attempt(), Some(now));
    }

    #[test]
    fn second_attempt_within_interval_is_a_noop() {
        let mut throttle = CommandThrottle::new(FIVE_SECONDS);
        let t0 = Instant::now();

        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(4999)));
        assert_eq!(throttle.last_attempt(), Some(t0));

        assert!(throttle.try_acquire(t0 + FIVE_SECONDS));
        assert_eq!(throttle.last_attempt(), Some(t0 + FIVE_SECONDS));
    }

    #[test]
    fn earlier_timestamps_never_rewind() {
        let mut throttle = CommandThrottle::new(FIVE_SECONDS);
        let t0 = Instant::now() + Duration::from_secs(60);

        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 - Duration::from_secs(30)));
        assert_eq!(throttle.last_attempt(), Some(t0));

        let mut unthrottled = CommandThrottle::new(Duration::ZERO);
        assert!(unthrottled.try_acquire(t0));
        assert!(unthrottled.try_acquire(t0 - Duration::from_secs(1)));
        assert_eq!(unthrottled.last_attempt(), Some(t0));
    }
}
