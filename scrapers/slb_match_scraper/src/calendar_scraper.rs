//! Client for the club's official calendar.
//!
//! The events endpoint only answers requests that carry the cookies and the
//! anti-forgery token handed out by the calendar page, so every fetch is a
//! two-step exchange: [`CalendarSession::open`] performs the handshake and
//! [`CalendarSession::fetch_events`] posts the filter payload.

use chrono_tz::Tz;
use reqwest::{
    blocking::Client,
    cookie::{CookieStore, Jar},
    header::{
        HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, ORIGIN, PRAGMA, REFERER,
        UPGRADE_INSECURE_REQUESTS,
    },
    Url,
};
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::datetime::parse_us_datetime_12h;
use crate::error::{MatchError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sources::CalendarSource;
use crate::types::{CalendarEvent, UNKNOWN};
use crate::utils::{element_text, non_empty, selector, split_title, CHROME_USER_AGENT};

pub const DEFAULT_MODALITY: &str = "futebol";
pub const DEFAULT_RANK_ID: &str = "16094ecf-9e78-4e3e-bcdf-28e4f765de9f";
pub const DEFAULT_SEASON: &str = "2025/26";
pub const DEFAULT_TOURNAMENT_IDS: &[&str] = &[
    "dp:tournament:50d243c9-fee7-4b34-bdcc-22bf446935eb",
    "sr:tournament:7",
    "sr:tournament:238",
    "sr:tournament:357",
    "sr:tournament:345",
    "sr:tournament:327",
    "sr:tournament:336",
];

const TOKEN_FIELD: &str = "__RequestVerificationToken";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CalendarFilters {
    pub menu: String,
    pub modality: String,
    pub is_male_team: bool,
    pub rank: String,
    pub tournaments: Vec<String>,
    pub seasons: Vec<String>,
    pub page_number: u32,
}

impl CalendarFilters {
    /// Reads the pre-selected filters from the calendar page. Each field that
    /// cannot be found falls back to its constant on its own.
    pub fn from_page(document: &Html) -> Self {
        Self {
            menu: "next".to_string(),
            modality: extracted_or_default("modality", extract_modality(document), || {
                DEFAULT_MODALITY.to_string()
            }),
            is_male_team: true,
            rank: extracted_or_default("rank", extract_rank_id(document), || {
                DEFAULT_RANK_ID.to_string()
            }),
            tournaments: extracted_or_default(
                "tournaments",
                extract_tournament_ids(document),
                || DEFAULT_TOURNAMENT_IDS.iter().map(|id| id.to_string()).collect(),
            ),
            seasons: vec![extracted_or_default("season", extract_season(document), || {
                DEFAULT_SEASON.to_string()
            })],
            page_number: 0,
        }
    }
}

#[derive(Serialize)]
struct CalendarQuery<'a> {
    filters: &'a CalendarFilters,
}

/// A handshaken session against the calendar. Short-lived: one per fetch.
pub struct CalendarSession {
    client: Client,
    cookies: Arc<Jar>,
    token: String,
    filters: CalendarFilters,
    page_url: String,
    events_url: String,
    origin: String,
    retry: RetryPolicy,
    club: String,
    timezone: Tz,
}

impl CalendarSession {
    pub fn open(config: &FeedConfig) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .user_agent(CHROME_USER_AGENT)
            .default_headers(browser_headers())
            .timeout(config.sources.calendar_timeout())
            .build()?;

        let page_url = config.sources.calendar_page_url.clone();
        let origin = Url::parse(&page_url)
            .map(|url| url.origin().ascii_serialization())
            .map_err(|e| MatchError::Initialization(format!("invalid calendar URL: {}", e)))?;
        let retry = config.retry.policy();

        info!("Opening calendar session at {}", page_url);
        let html = retry_with_backoff(&retry, "calendar page", MatchError::is_transient, || -> Result<String> {
            Ok(client.get(&page_url).send()?.error_for_status()?.text()?)
        })?;
        debug!("Calendar page fetched: {} bytes", html.len());

        let document = Html::parse_document(&html);
        let token = extract_verification_token(&document).ok_or_else(|| {
            MatchError::Initialization(format!("{} not found on calendar page", TOKEN_FIELD))
        })?;
        let filters = CalendarFilters::from_page(&document);

        let session = Self {
            client,
            cookies,
            token,
            filters,
            page_url,
            events_url: config.sources.calendar_events_url.clone(),
            origin,
            retry,
            club: config.club.name.clone(),
            timezone: config.club.timezone,
        };
        debug!(
            "Calendar session ready, cookies captured: {}",
            session.cookie_header().is_some()
        );
        Ok(session)
    }

    pub fn filters(&self) -> &CalendarFilters {
        &self.filters
    }

    /// The `Cookie` header the session would send to the events endpoint.
    pub fn cookie_header(&self) -> Option<String> {
        let url = Url::parse(&self.events_url).ok()?;
        self.cookies
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Raw HTML fragment returned by the events endpoint.
    pub fn fetch_fragment(&self) -> Result<String> {
        let query = CalendarQuery {
            filters: &self.filters,
        };
        debug!("Posting calendar filters: {:?}", self.filters);

        retry_with_backoff(&self.retry, "calendar events", MatchError::is_transient, || -> Result<String> {
            let response = self
                .client
                .post(&self.events_url)
                .header(REFERER, &self.page_url)
                .header(ORIGIN, &self.origin)
                .header("x-requested-with", "XMLHttpRequest")
                .header(TOKEN_FIELD, &self.token)
                .json(&query)
                .send()?
                .error_for_status()?;
            let status = response.status();
            let body = response.text()?;
            info!(
                "Calendar events fetched. Status: {}, Content-Length: {} bytes",
                status,
                body.len()
            );
            Ok(body)
        })
    }

    pub fn fetch_events(&self) -> Result<Vec<CalendarEvent>> {
        let fragment = self.fetch_fragment()?;
        Ok(parse_calendar_fragment(&fragment, &self.club, self.timezone))
    }
}

pub struct OfficialCalendar {
    config: FeedConfig,
}

impl OfficialCalendar {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl CalendarSource for OfficialCalendar {
    fn fetch_events(&self) -> Result<Vec<CalendarEvent>> {
        CalendarSession::open(&self.config)?.fetch_events()
    }
}

/// Parses the events fragment, keeping upstream order. Items without a title
/// or a readable start date are skipped.
pub fn parse_calendar_fragment(html: &str, club: &str, tz: Tz) -> Vec<CalendarEvent> {
    let fragment = Html::parse_fragment(html);
    let item_selector = match selector("div.calendar-item") {
        Ok(s) => s,
        Err(e) => {
            warn!("{}", e);
            return Vec::new();
        }
    };

    let items: Vec<ElementRef> = fragment.select(&item_selector).collect();
    info!("Found {} calendar items in response", items.len());

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_calendar_item(item, club, tz) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping calendar item {}: {}", index, e);
                None
            }
        })
        .collect()
}

fn parse_calendar_item(item: &ElementRef, club: &str, tz: Tz) -> Result<CalendarEvent> {
    let title = child_text(item, "div.titleForCalendar")?
        .ok_or_else(|| MatchError::format("calendar item has no title"))?;
    let start = child_text(item, "div.startDateForCalendar")?
        .ok_or_else(|| MatchError::format("calendar item has no start date"))?;
    let kickoff = parse_us_datetime_12h(&start, tz)?;
    let (adversary, is_home) = split_title(&title, club);

    Ok(CalendarEvent {
        kickoff,
        adversary,
        is_home,
        location: child_text(item, "div.locationForCalendar")?
            .unwrap_or_else(|| UNKNOWN.to_string()),
        competition: child_text(item, "div.calendar-competition")?
            .unwrap_or_else(|| UNKNOWN.to_string()),
        tv_channel: non_empty(child_text(item, "div.calendar-live-channels p[hidden]")?),
    })
}

fn child_text(item: &ElementRef, css: &str) -> Result<Option<String>> {
    let child_selector = selector(css)?;
    Ok(item
        .select(&child_selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty()))
}

fn extracted_or_default<T: Debug>(field: &str, extracted: Option<T>, default: impl FnOnce() -> T) -> T {
    match extracted {
        Some(value) => {
            debug!("Extracted {} from calendar page: {:?}", field, value);
            value
        }
        None => {
            let value = default();
            warn!("Could not extract {} from calendar page, using {:?}", field, value);
            value
        }
    }
}

fn extract_verification_token(document: &Html) -> Option<String> {
    let token_selector = selector(r#"input[name="__RequestVerificationToken"][type="hidden"]"#).ok()?;
    document
        .select(&token_selector)
        .find_map(|el| el.value().attr("value"))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_modality(document: &Html) -> Option<String> {
    let modality_selector = selector("div.modality").ok()?;
    document
        .select(&modality_selector)
        .find_map(|el| el.value().id())
        .map(str::to_string)
}

/// The gender toggle is the radio group named `radio`; the first other
/// checked radio is the squad.
fn extract_rank_id(document: &Html) -> Option<String> {
    let radio_selector = selector(r#"input[type="radio"][checked]"#).ok()?;
    document
        .select(&radio_selector)
        .filter(|el| matches!(el.value().attr("name"), Some(name) if name != "radio"))
        .find_map(|el| el.value().id())
        .map(str::to_string)
}

fn extract_tournament_ids(document: &Html) -> Option<Vec<String>> {
    let tournament_selector = selector(r#"input[name="tournament"][type="checkbox"][checked]"#).ok()?;
    let ids: Vec<String> = document
        .select(&tournament_selector)
        .filter_map(|el| el.value().id())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn extract_season(document: &Html) -> Option<String> {
    let season_selector = selector(r#"input[name="season"][type="checkbox"][checked]"#).ok()?;
    document
        .select(&season_selector)
        .find_map(|el| el.value().id())
        .map(str::to_string)
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-PT,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use chrono_tz::Europe::Lisbon;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PAGE: &str = include_str!("../tests/fixtures/calendar_page.html");
    const EVENTS: &str = include_str!("../tests/fixtures/calendar_events.html");
    const PAGE_PATH: &str = "/pt-pt/futebol/calendario";
    const EVENTS_PATH: &str = "/api/sitecore/Calendar/CalendarEvents";

    fn config_for(server: &Server) -> FeedConfig {
        let mut config = FeedConfig::default();
        config.sources.calendar_page_url = format!("{}{}", server.url(), PAGE_PATH);
        config.sources.calendar_events_url = format!("{}{}", server.url(), EVENTS_PATH);
        config.retry.base_delay_ms = 0;
        config
    }

    #[test]
    fn test_parse_calendar_fragment() {
        let events = parse_calendar_fragment(EVENTS, "Benfica", Lisbon);
        // Two of the five items lack a usable start date.
        assert_eq!(events.len(), 3);

        assert_eq!(
            events[0],
            CalendarEvent {
                kickoff: Lisbon.with_ymd_and_hms(2025, 11, 29, 18, 0, 0).unwrap(),
                adversary: "FC Porto".to_string(),
                location: "Estádio da Luz".to_string(),
                competition: "Liga Portugal".to_string(),
                is_home: true,
                tv_channel: None,
            }
        );

        assert_eq!(events[1].adversary, "Real Madrid");
        assert!(!events[1].is_home);
        assert_eq!(events[1].tv_channel.as_deref(), Some("Sport TV1"));

        assert_eq!(events[2].adversary, "SC Braga");
        assert_eq!(events[2].location, "Unknown");
        assert_eq!(events[2].kickoff.hour(), 0);
        assert_eq!(events[2].tv_channel, None);
    }

    #[test]
    fn test_parse_calendar_fragment_without_items() {
        assert!(parse_calendar_fragment("<div class=\"calendar-list\"></div>", "Benfica", Lisbon).is_empty());
        assert!(parse_calendar_fragment("", "Benfica", Lisbon).is_empty());
    }

    #[test]
    fn test_filters_extracted_from_page() {
        let document = Html::parse_document(PAGE);
        let filters = CalendarFilters::from_page(&document);
        assert_eq!(
            filters,
            CalendarFilters {
                menu: "next".to_string(),
                modality: "9f1c2d3e-futebol-modality".to_string(),
                is_male_team: true,
                rank: "16094ecf-9e78-4e3e-bcdf-28e4f765de9f".to_string(),
                tournaments: vec![
                    "sr:tournament:238".to_string(),
                    "sr:tournament:7".to_string(),
                    "sr:tournament:327".to_string(),
                ],
                seasons: vec!["2025/26".to_string()],
                page_number: 0,
            }
        );
        assert_eq!(
            extract_verification_token(&document).as_deref(),
            Some("CfDJ8Kx1-token-abc123")
        );
    }

    #[test]
    fn test_filters_fall_back_per_field() {
        let document = Html::parse_document(
            r#"<html><body>
                <input type="checkbox" name="season" id="2026/27" checked />
                <input type="radio" name="radio" id="masculino" checked />
            </body></html>"#,
        );
        let filters = CalendarFilters::from_page(&document);
        assert_eq!(filters.seasons, vec!["2026/27".to_string()]);
        assert_eq!(filters.modality, DEFAULT_MODALITY);
        assert_eq!(filters.rank, DEFAULT_RANK_ID);
        assert_eq!(filters.tournaments.len(), DEFAULT_TOURNAMENT_IDS.len());
        assert_eq!(extract_verification_token(&document), None);
    }

    #[test]
    fn test_filters_serialise_pascal_case() {
        let document = Html::parse_document("<html></html>");
        let filters = CalendarFilters::from_page(&document);
        let body = serde_json::to_value(CalendarQuery { filters: &filters }).unwrap();
        assert_eq!(body["filters"]["Menu"], "next");
        assert_eq!(body["filters"]["IsMaleTeam"], true);
        assert_eq!(body["filters"]["Seasons"], json!(["2025/26"]));
        assert_eq!(body["filters"]["PageNumber"], 0);
    }

    #[test]
    fn test_session_handshake_and_events() {
        let mut server = Server::new();
        let page = server
            .mock("GET", PAGE_PATH)
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_header("set-cookie", "ASP.NET_SessionId=abc123; Path=/; HttpOnly")
            .with_body(PAGE)
            .create();
        let events = server
            .mock("POST", EVENTS_PATH)
            .match_header("__RequestVerificationToken", "CfDJ8Kx1-token-abc123")
            .match_header("x-requested-with", "XMLHttpRequest")
            .match_header("cookie", Matcher::Regex("ASP.NET_SessionId=abc123".to_string()))
            .match_body(Matcher::PartialJson(json!({
                "filters": {
                    "Menu": "next",
                    "Rank": "16094ecf-9e78-4e3e-bcdf-28e4f765de9f",
                    "Seasons": ["2025/26"]
                }
            })))
            .with_status(200)
            .with_body(EVENTS)
            .create();

        let session = CalendarSession::open(&config_for(&server)).unwrap();
        assert!(session
            .cookie_header()
            .is_some_and(|c| c.contains("ASP.NET_SessionId=abc123")));
        let parsed = session.fetch_events().unwrap();

        page.assert();
        events.assert();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].adversary, "FC Porto");
    }

    #[test]
    fn test_missing_token_fails_initialisation() {
        let mut server = Server::new();
        let page = server
            .mock("GET", PAGE_PATH)
            .with_status(200)
            .with_body("<html><body><p>Access denied</p></body></html>")
            .expect(1)
            .create();
        let events = server.mock("POST", EVENTS_PATH).expect(0).create();

        let result = CalendarSession::open(&config_for(&server));
        assert!(matches!(result, Err(MatchError::Initialization(_))));
        page.assert();
        events.assert();
    }

    #[test]
    fn test_events_server_error_is_retried() {
        let mut server = Server::new();
        let _page = server
            .mock("GET", PAGE_PATH)
            .with_status(200)
            .with_body(PAGE)
            .create();
        let events = server
            .mock("POST", EVENTS_PATH)
            .with_status(503)
            .expect(3)
            .create();

        let session = CalendarSession::open(&config_for(&server)).unwrap();
        let err = session.fetch_events().unwrap_err();
        assert!(err.is_transient());
        events.assert();
    }

    #[test]
    fn test_events_client_error_is_not_retried() {
        let mut server = Server::new();
        let _page = server
            .mock("GET", PAGE_PATH)
            .with_status(200)
            .with_body(PAGE)
            .create();
        let events = server
            .mock("POST", EVENTS_PATH)
            .with_status(403)
            .expect(1)
            .create();

        let session = CalendarSession::open(&config_for(&server)).unwrap();
        assert!(matches!(session.fetch_events(), Err(MatchError::Http(_))));
        events.assert();
    }
}
