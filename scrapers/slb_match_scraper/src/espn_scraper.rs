//! Fallback source: the ESPN team fixtures page, which ships its data as a
//! JSON blob assigned to `window['__espnfitt__']`.

use chrono_tz::Tz;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::datetime::parse_iso_datetime;
use crate::error::{MatchError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sources::FixtureSource;
use crate::types::{MatchRecord, UNKNOWN};
use crate::utils::{browser_user_agent, non_empty};

const BLOB_PATTERN: &str = r"(?s)window\['__espnfitt__'\]\s*=\s*(\{.*?\});";

#[derive(Debug, Default, Deserialize)]
struct EspnBlob {
    #[serde(default, deserialize_with = "null_as_default")]
    page: EspnPage,
}

#[derive(Debug, Default, Deserialize)]
struct EspnPage {
    #[serde(default, deserialize_with = "null_as_default")]
    content: EspnContent,
}

#[derive(Debug, Default, Deserialize)]
struct EspnContent {
    #[serde(default, deserialize_with = "null_as_default")]
    fixtures: EspnFixtureList,
}

// Events stay untyped; only the first one is decoded.
#[derive(Debug, Default, Deserialize)]
struct EspnFixtureList {
    #[serde(default, deserialize_with = "null_as_default")]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    date: Option<String>,
    #[serde(default)]
    league: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    competitors: Vec<EspnCompetitor>,
    venue: Option<EspnVenue>,
    #[serde(default)]
    broadcasts: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnCompetitor {
    display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    is_home: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnVenue {
    full_name: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct EspnFixtures {
    client: Client,
    url: String,
    retry: RetryPolicy,
    club: String,
    timezone: Tz,
}

impl EspnFixtures {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.sources.fallback_timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.sources.fallback_url.clone(),
            retry: config.retry.policy(),
            club: config.club.name.clone(),
            timezone: config.club.timezone,
        })
    }

    fn fetch_page(&self) -> Result<String> {
        info!("Fetching ESPN fixtures from {}", self.url);
        retry_with_backoff(&self.retry, "ESPN fixtures", MatchError::is_transient, || -> Result<String> {
            let body = self
                .client
                .get(&self.url)
                .header(reqwest::header::USER_AGENT, browser_user_agent())
                .send()?
                .error_for_status()?
                .text()?;
            info!("ESPN page fetched successfully ({} bytes)", body.len());
            Ok(body)
        })
    }
}

impl FixtureSource for EspnFixtures {
    fn fetch_next_fixture(&self) -> Result<Option<MatchRecord>> {
        let html = self.fetch_page()?;
        parse_espn_fixtures(&html, &self.club, self.timezone)
    }
}

/// The JSON text assigned to `window['__espnfitt__']`.
pub fn extract_espn_blob(html: &str) -> Result<&str> {
    let pattern = Regex::new(BLOB_PATTERN)
        .map_err(|e| MatchError::format(format!("Invalid ESPN blob pattern: {}", e)))?;
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            error!("Could not find __espnfitt__ data in page");
            MatchError::format("__espnfitt__ data not found in ESPN page")
        })
}

/// First listed fixture, which ESPN sorts chronologically. `Ok(None)` when
/// the page lists no events.
pub fn parse_espn_fixtures(html: &str, club: &str, tz: Tz) -> Result<Option<MatchRecord>> {
    let blob: EspnBlob = serde_json::from_str(extract_espn_blob(html)?)?;
    let events = blob.page.content.fixtures.events;
    let count = events.len();
    let Some(first) = events.into_iter().next() else {
        warn!("No events found in ESPN fixtures data");
        return Ok(None);
    };
    info!("Found {} upcoming matches on ESPN", count);
    let event: EspnEvent = serde_json::from_value(first)?;

    let date = event
        .date
        .as_deref()
        .ok_or_else(|| MatchError::format("first ESPN event has no date"))?;
    let kickoff = parse_iso_datetime(date, tz)?;

    let home_team = event
        .competitors
        .iter()
        .find(|team| team.is_home)
        .and_then(|team| team.display_name.clone());
    let away_team = event
        .competitors
        .iter()
        .find(|team| !team.is_home)
        .and_then(|team| team.display_name.clone());

    let is_home = home_team.as_deref().is_some_and(|name| name.contains(club));
    let adversary = (if is_home { away_team } else { home_team }).unwrap_or_else(|| UNKNOWN.to_string());

    let record = MatchRecord {
        kickoff,
        adversary,
        is_home,
        location: event
            .venue
            .and_then(|venue| venue.full_name)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        competition: event
            .league
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        tv_channel: non_empty(
            event
                .broadcasts
                .as_array()
                .and_then(|broadcasts| broadcasts.first())
                .and_then(|broadcast| broadcast.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
    };
    debug!("ESPN fixture parsed: {:?}", record);
    info!(
        "Match data scraped: {} on {} at {}",
        record.adversary, record.kickoff, record.location
    );
    Ok(Some(record))
}
