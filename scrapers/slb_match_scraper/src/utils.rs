use rand::seq::SliceRandom;
use scraper::{ElementRef, Selector};

use crate::error::{MatchError, Result};

/// User-Agent the calendar handshake presents; the session keeps it fixed.
pub const CHROME_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const USER_AGENTS: &[&str] = &[
    CHROME_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub fn browser_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(CHROME_USER_AGENT)
}

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| MatchError::format(format!("Invalid selector '{}': {}", css, e)))
}

pub fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a `"Team A vs Team B"` title into the adversary and whether the club
/// is the home side. Titles without `" vs "` are taken whole as the adversary
/// of a home match.
pub fn split_title(title: &str, club: &str) -> (String, bool) {
    match title.split_once(" vs ") {
        Some((home, away)) => {
            let is_home = home.contains(club);
            let adversary = if is_home { away } else { home };
            (adversary.trim().to_string(), is_home)
        }
        None => (title.trim().to_string(), true),
    }
}

pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
