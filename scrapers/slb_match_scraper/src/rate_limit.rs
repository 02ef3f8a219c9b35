use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::time::Duration;
use tracing::debug;

use crate::error::{MatchError, Result};

/// One call per `interval` for each key.
pub struct CommandThrottle<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl CommandThrottle {
    pub fn new(interval: Duration) -> Result<Self> {
        Self::with_clock(interval, DefaultClock::default())
    }
}

impl<C: Clock> CommandThrottle<C> {
    pub fn with_clock(interval: Duration, clock: C) -> Result<Self> {
        let quota = Quota::with_period(interval)
            .ok_or_else(|| MatchError::format("Throttle interval must be positive"))?;
        Ok(Self {
            limiter: RateLimiter::dashmap_with_clock(quota, &clock),
            clock,
        })
    }

    /// Takes the slot for `key`, or returns how long until it frees up.
    pub fn check(&self, key: &str) -> std::result::Result<(), Duration> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let remaining = not_until.wait_time_from(self.clock.now());
                debug!("Rate limit hit for {}, {:?} left", key, remaining);
                Err(remaining)
            }
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.check(key).is_ok()
    }
}

/// `command`, then the guild and the user when the limit is scoped to them.
pub fn rate_limit_key(command: &str, guild_id: Option<u64>, user_id: Option<u64>) -> String {
    let mut key = command.to_string();
    for id in [guild_id, user_id].into_iter().flatten() {
        key.push(':');
        key.push_str(&id.to_string());
    }
    key
}

/// Largest whole unit only: `"2h"`, `"45m"`, `"30s"`.
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    if seconds >= 3_600 {
        format!("{}h", seconds / 3_600)
    } else if seconds >= 60 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    const DAY: Duration = Duration::from_secs(24 * 3_600);

    fn throttle() -> (CommandThrottle<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        (CommandThrottle::with_clock(DAY, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_first_call_allowed_then_blocked() {
        let (throttle, clock) = throttle();
        assert!(throttle.is_allowed("actualizar_data:42"));
        clock.advance(Duration::from_secs(60));
        assert!(!throttle.is_allowed("actualizar_data:42"));
        assert!(throttle.is_allowed("actualizar_data:7"));
        clock.advance(DAY);
        assert!(throttle.is_allowed("actualizar_data:42"));
    }

    #[test]
    fn test_refusal_reports_time_left() {
        let (throttle, clock) = throttle();
        assert_eq!(throttle.check("cmd"), Ok(()));
        clock.advance(Duration::from_secs(3_600));
        assert_eq!(throttle.check("cmd"), Err(DAY - Duration::from_secs(3_600)));
        // A refused call does not push the window back.
        assert_eq!(throttle.check("cmd"), Err(DAY - Duration::from_secs(3_600)));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(matches!(
            CommandThrottle::new(Duration::ZERO),
            Err(MatchError::Format(_))
        ));
    }

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("actualizar_data", None, None), "actualizar_data");
        assert_eq!(rate_limit_key("actualizar_data", Some(10), Some(42)), "actualizar_data:10:42");
        assert_eq!(rate_limit_key("calendario", None, Some(42)), "calendario:42");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_secs(7_300)), "2h");
        assert_eq!(format_remaining(Duration::from_secs(2_700)), "45m");
        assert_eq!(format_remaining(Duration::from_secs(30)), "30s");
        assert_eq!(format_remaining(Duration::ZERO), "0s");
    }
}
