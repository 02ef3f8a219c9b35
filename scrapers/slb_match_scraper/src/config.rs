use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::retry::RetryPolicy;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Lisbon;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClubConfig {
    pub name: String,
    pub timezone: Tz,
}

impl Default for ClubConfig {
    fn default() -> Self {
        Self {
            name: "Benfica".to_string(),
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub calendar_page_url: String,
    pub calendar_events_url: String,
    pub fallback_url: String,
    /// Covers the anti-bot challenge on both the handshake GET and the events POST.
    pub calendar_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            calendar_page_url: "https://www.slbenfica.pt/pt-pt/futebol/calendario".to_string(),
            calendar_events_url: "https://www.slbenfica.pt/api/sitecore/Calendar/CalendarEvents"
                .to_string(),
            fallback_url: "https://www.espn.com/soccer/team/fixtures/_/id/1929".to_string(),
            calendar_timeout_secs: 30,
            fallback_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn calendar_timeout(&self) -> Duration {
        Duration::from_secs(self.calendar_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub match_data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            match_data_file: PathBuf::from("match_data.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Hour of day, in the club timezone, of the daily refresh.
    pub hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { hour: 8 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub club: ClubConfig,
    pub sources: SourceConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
}

impl FeedConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = env::var("CLUB_NAME") {
            config.club.name = name;
        }
        if let Some(tz) = parsed_var::<Tz>("CLUB_TIMEZONE") {
            config.club.timezone = tz;
        }
        if let Ok(url) = env::var("CALENDAR_URL") {
            config.sources.calendar_page_url = url;
        }
        if let Ok(url) = env::var("CALENDAR_API_URL") {
            config.sources.calendar_events_url = url;
        }
        if let Ok(url) = env::var("ESPN_FIXTURES_URL") {
            config.sources.fallback_url = url;
        }
        if let Some(timeout) = parsed_var::<u64>("CALENDAR_TIMEOUT_SECS") {
            config.sources.calendar_timeout_secs = timeout;
        }
        if let Some(timeout) = parsed_var::<u64>("ESPN_TIMEOUT_SECS") {
            config.sources.fallback_timeout_secs = timeout;
        }
        if let Some(attempts) = parsed_var::<u32>("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay) = parsed_var::<u64>("RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = delay;
        }
        if let Ok(path) = env::var("MATCH_DATA_FILE") {
            config.storage.match_data_file = PathBuf::from(path);
        }
        if let Some(hour) = parsed_var::<u32>("SCHEDULE_HOUR") {
            config.schedule.hour = hour;
        }

        config
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.club.name.trim().is_empty() {
            errors.push("CLUB_NAME must not be empty".to_string());
        }
        for (var, url) in [
            ("CALENDAR_URL", &self.sources.calendar_page_url),
            ("CALENDAR_API_URL", &self.sources.calendar_events_url),
            ("ESPN_FIXTURES_URL", &self.sources.fallback_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                errors.push(format!("{} is not a valid URL: {}", var, url));
            }
        }
        if self.sources.calendar_timeout_secs == 0 || self.sources.fallback_timeout_secs == 0 {
            errors.push("Request timeouts must be at least one second".to_string());
        }
        if self.retry.max_attempts == 0 {
            errors.push("RETRY_MAX_ATTEMPTS must be a positive integer".to_string());
        }
        if self.schedule.hour > 23 {
            errors.push("SCHEDULE_HOUR must be a number between 0 and 23".to_string());
        }

        errors
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "CLUB_NAME",
        "CLUB_TIMEZONE",
        "CALENDAR_URL",
        "RETRY_MAX_ATTEMPTS",
        "RETRY_BASE_DELAY_MS",
        "MATCH_DATA_FILE",
        "SCHEDULE_HOUR",
    ];

    fn clear_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_vars();
        let config = FeedConfig::from_env();
        assert_eq!(config, FeedConfig::default());
        assert_eq!(config.club.timezone, chrono_tz::Europe::Lisbon);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_vars();
        env::set_var("CLUB_NAME", "Sporting");
        env::set_var("CLUB_TIMEZONE", "Atlantic/Azores");
        env::set_var("RETRY_BASE_DELAY_MS", "250");
        env::set_var("MATCH_DATA_FILE", "/tmp/next_match.json");
        env::set_var("SCHEDULE_HOUR", "not-a-number");

        let config = FeedConfig::from_env();
        clear_vars();

        assert_eq!(config.club.name, "Sporting");
        assert_eq!(config.club.timezone, chrono_tz::Atlantic::Azores);
        assert_eq!(config.retry.policy().base_delay, Duration::from_millis(250));
        assert_eq!(config.storage.match_data_file, PathBuf::from("/tmp/next_match.json"));
        // Unparseable values keep the default.
        assert_eq!(config.schedule.hour, 8);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = FeedConfig::default();
        config.club.name = "  ".to_string();
        config.sources.fallback_url = "not a url".to_string();
        config.retry.max_attempts = 0;
        config.schedule.hour = 24;

        let errors = config.validate();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("ESPN_FIXTURES_URL")));
        assert!(errors.iter().any(|e| e.contains("SCHEDULE_HOUR")));
    }
}
