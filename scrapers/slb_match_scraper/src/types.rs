use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::datetime::{format_dd_mm_yyyy, format_hh_mm, parse_dd_mm_yyyy_time};
use crate::error::Result;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub kickoff: DateTime<Tz>,
    pub adversary: String,
    pub location: String,
    pub competition: String,
    pub is_home: bool,
    pub tv_channel: Option<String>,
}

impl MatchRecord {
    /// A match kicking off exactly now is already stale.
    pub fn is_stale_at(&self, now: &DateTime<Tz>) -> bool {
        self.kickoff <= *now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HomeAway {
    Casa,
    Fora,
}

impl HomeAway {
    pub fn from_is_home(is_home: bool) -> Self {
        if is_home {
            HomeAway::Casa
        } else {
            HomeAway::Fora
        }
    }

    pub fn is_home(self) -> bool {
        self == HomeAway::Casa
    }

    pub fn label(self) -> &'static str {
        match self {
            HomeAway::Casa => "Casa",
            HomeAway::Fora => "Fora",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub kickoff: DateTime<Tz>,
    pub adversary: String,
    pub location: String,
    pub competition: String,
    pub is_home: bool,
    pub tv_channel: Option<String>,
}

impl CalendarEvent {
    pub fn to_fixture(&self) -> UpcomingFixture {
        UpcomingFixture {
            date: format_dd_mm_yyyy(&self.kickoff),
            time: format_hh_mm(&self.kickoff),
            adversary: self.adversary.clone(),
            location: self.location.clone(),
            competition: self.competition.clone(),
            home: HomeAway::from_is_home(self.is_home),
            tv_channel: self.tv_channel.clone(),
        }
    }
}

/// A future fixture in the official calendar's shape: split date and time
/// strings and a Casa/Fora marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpcomingFixture {
    pub date: String,
    pub time: String,
    pub adversary: String,
    pub location: String,
    pub competition: String,
    pub home: HomeAway,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_channel: Option<String>,
}

impl UpcomingFixture {
    pub fn kickoff(&self, tz: Tz) -> Result<DateTime<Tz>> {
        parse_dd_mm_yyyy_time(&self.date, &self.time, tz)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRecord {
    Primary(UpcomingFixture),
    Fallback(MatchRecord),
}

impl SourceRecord {
    pub fn normalize(self, tz: Tz) -> Result<MatchRecord> {
        match self {
            SourceRecord::Primary(fixture) => Ok(MatchRecord {
                kickoff: fixture.kickoff(tz)?,
                is_home: fixture.home.is_home(),
                tv_channel: fixture.tv_channel.filter(|c| !c.trim().is_empty()),
                adversary: fixture.adversary,
                location: fixture.location,
                competition: fixture.competition,
            }),
            SourceRecord::Fallback(record) => Ok(record),
        }
    }
}
