use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::types::{CalendarEvent, MatchRecord, SourceRecord, UpcomingFixture};

pub const DEFAULT_UPCOMING_LIMIT: usize = 5;
pub const MAX_UPCOMING_LIMIT: usize = 10;

pub trait CalendarSource {
    fn fetch_events(&self) -> Result<Vec<CalendarEvent>>;
}

pub trait FixtureSource {
    fn fetch_next_fixture(&self) -> Result<Option<MatchRecord>>;
}

/// Strictly-future events as fixtures, upstream order kept.
pub fn future_fixtures(events: &[CalendarEvent], now: &DateTime<Tz>, limit: usize) -> Vec<UpcomingFixture> {
    events
        .iter()
        .filter(|event| event.kickoff > *now)
        .take(limit)
        .map(CalendarEvent::to_fixture)
        .collect()
}

pub fn clamp_upcoming_limit(requested: usize) -> usize {
    requested.clamp(1, MAX_UPCOMING_LIMIT)
}

/// Asks the calendar first and the fallback only when the calendar has
/// nothing usable.
pub struct Reconciler<C, F> {
    primary: C,
    fallback: F,
    timezone: Tz,
}

impl<C: CalendarSource, F: FixtureSource> Reconciler<C, F> {
    pub fn new(primary: C, fallback: F, timezone: Tz) -> Self {
        Self {
            primary,
            fallback,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn fetch_next_match(&self) -> Option<MatchRecord> {
        self.fetch_next_match_at(&Utc::now().with_timezone(&self.timezone))
    }

    pub fn fetch_next_match_at(&self, now: &DateTime<Tz>) -> Option<MatchRecord> {
        info!("Attempting to fetch match data from the official calendar");
        match self.primary.fetch_events() {
            Ok(events) => match future_fixtures(&events, now, 1).into_iter().next() {
                Some(fixture) => match SourceRecord::Primary(fixture).normalize(self.timezone) {
                    Ok(record) => {
                        info!(
                            "Calendar returned next match: {} at {}",
                            record.adversary, record.kickoff
                        );
                        return Some(record);
                    }
                    Err(e) => error!("Calendar fixture could not be normalised: {}", e),
                },
                None => warn!(
                    "Calendar returned {} events but none after {}",
                    events.len(),
                    now
                ),
            },
            Err(e) => error!("Calendar fetch failed: {}", e),
        }

        warn!("Falling back to ESPN fixtures");
        match self.fallback.fetch_next_fixture() {
            Ok(Some(record)) => match SourceRecord::Fallback(record).normalize(self.timezone) {
                Ok(record) => {
                    info!(
                        "Fallback returned next match: {} at {}",
                        record.adversary, record.kickoff
                    );
                    Some(record)
                }
                Err(e) => {
                    error!("Fallback fixture could not be normalised: {}", e);
                    None
                }
            },
            Ok(None) => {
                warn!("Fallback returned no fixtures");
                None
            }
            Err(e) => {
                error!("Fallback fetch failed: {}", e);
                None
            }
        }
    }

    pub fn get_upcoming_matches(&self, limit: usize) -> Vec<UpcomingFixture> {
        self.get_upcoming_matches_at(limit, &Utc::now().with_timezone(&self.timezone))
    }

    /// Calendar only; failures and empty calendars both give an empty list.
    pub fn get_upcoming_matches_at(&self, limit: usize, now: &DateTime<Tz>) -> Vec<UpcomingFixture> {
        match self.primary.fetch_events() {
            Ok(events) => {
                let fixtures = future_fixtures(&events, now, limit);
                info!("Found {} upcoming matches (limit {})", fixtures.len(), limit);
                fixtures
            }
            Err(e) => {
                error!("Calendar fetch for upcoming matches failed: {}", e);
                Vec::new()
            }
        }
    }
}
