use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::calendar_scraper::OfficialCalendar;
use crate::config::FeedConfig;
use crate::error::{MatchError, Result};
use crate::espn_scraper::EspnFixtures;
use crate::formatter::{format_countdown, format_schedule, format_upcoming};
use crate::repository::MatchRepository;
use crate::sources::{clamp_upcoming_limit, CalendarSource, FixtureSource, Reconciler};
use crate::types::{MatchRecord, UpcomingFixture};

pub type LiveMatchService = MatchService<OfficialCalendar, EspnFixtures>;

pub struct MatchService<C, F> {
    repository: MatchRepository,
    reconciler: Reconciler<C, F>,
}

impl LiveMatchService {
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let reconciler = Reconciler::new(
            OfficialCalendar::new(config),
            EspnFixtures::new(config)?,
            config.club.timezone,
        );
        let repository = MatchRepository::new(&config.storage.match_data_file, config.club.timezone);
        Ok(Self::new(repository, reconciler))
    }
}

impl<C: CalendarSource, F: FixtureSource> MatchService<C, F> {
    pub fn new(repository: MatchRepository, reconciler: Reconciler<C, F>) -> Self {
        Self {
            repository,
            reconciler,
        }
    }

    pub fn repository(&self) -> &MatchRepository {
        &self.repository
    }

    pub fn reconciler(&self) -> &Reconciler<C, F> {
        &self.reconciler
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.reconciler.timezone())
    }

    pub fn update_match_data(&self) -> Result<MatchRecord> {
        self.update_match_data_at(&self.now())
    }

    /// Fetches the next match regardless of what is stored and saves it.
    pub fn update_match_data_at(&self, now: &DateTime<Tz>) -> Result<MatchRecord> {
        let record = self
            .reconciler
            .fetch_next_match_at(now)
            .ok_or(MatchError::Unavailable)?;
        self.repository.save(&record)?;
        Ok(record)
    }

    pub fn match_with_refresh(&self) -> Result<(Option<MatchRecord>, bool)> {
        self.match_with_refresh_at(&self.now())
    }

    /// The stored match, refreshed first when its kickoff has passed. The
    /// flag tells whether a refresh happened. A refreshed match that is
    /// still not in the future is withheld.
    pub fn match_with_refresh_at(&self, now: &DateTime<Tz>) -> Result<(Option<MatchRecord>, bool)> {
        let stored = match self.repository.load() {
            Ok(record) => record,
            Err(MatchError::NotFound) => {
                warn!("No match data stored at {}", self.repository.path().display());
                return Ok((None, false));
            }
            Err(e) => return Err(e),
        };

        if !stored.is_stale_at(now) {
            return Ok((Some(stored), false));
        }

        info!(
            "Stored match against {} at {} has passed, refreshing",
            stored.adversary, stored.kickoff
        );
        let Some(fresh) = self.reconciler.fetch_next_match_at(now) else {
            warn!("No upcoming matches found");
            return Ok((None, false));
        };
        self.repository.save(&fresh)?;

        let reloaded = self.repository.load()?;
        if reloaded.is_stale_at(now) {
            warn!(
                "Refreshed match against {} at {} is still in the past",
                reloaded.adversary, reloaded.kickoff
            );
            return Ok((None, false));
        }
        Ok((Some(reloaded), true))
    }

    pub fn countdown_message(&self) -> Result<String> {
        self.countdown_message_at(&self.now())
    }

    pub fn countdown_message_at(&self, now: &DateTime<Tz>) -> Result<String> {
        let (record, _) = self.match_with_refresh_at(now)?;
        Ok(format_countdown(record.as_ref(), now))
    }

    pub fn schedule_message(&self) -> Result<String> {
        self.schedule_message_at(&self.now())
    }

    pub fn schedule_message_at(&self, now: &DateTime<Tz>) -> Result<String> {
        let (record, _) = self.match_with_refresh_at(now)?;
        Ok(format_schedule(record.as_ref()))
    }

    pub fn upcoming_matches(&self, limit: usize) -> Vec<UpcomingFixture> {
        self.reconciler.get_upcoming_matches(clamp_upcoming_limit(limit))
    }

    pub fn upcoming_message(&self, limit: usize) -> String {
        self.upcoming_message_at(limit, &self.now())
    }

    pub fn upcoming_message_at(&self, limit: usize, now: &DateTime<Tz>) -> String {
        let fixtures = self
            .reconciler
            .get_upcoming_matches_at(clamp_upcoming_limit(limit), now);
        format_upcoming(&fixtures, self.reconciler.timezone())
    }
}
