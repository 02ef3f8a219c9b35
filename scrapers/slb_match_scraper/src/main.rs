use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slb_match_scraper::{
    calendar_scraper::{parse_calendar_fragment, CalendarSession},
    config::FeedConfig,
    formatter::{format_countdown, format_schedule},
    service::LiveMatchService,
    sources::{future_fixtures, DEFAULT_UPCOMING_LIMIT},
    types::{MatchRecord, SourceRecord},
};

const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch the next match now and store it
    Refresh,
    /// Print the stored match as JSON, refreshing it first if it has passed
    Next,
    /// Print the countdown message
    Countdown,
    /// Print the schedule message
    Schedule,
    /// Print the upcoming matches from the official calendar
    Upcoming {
        /// Number of matches to list (1-10)
        #[arg(short, long, default_value_t = DEFAULT_UPCOMING_LIMIT)]
        limit: usize,
    },
    /// Walk through the calendar handshake and parsing without saving anything
    DryRun,
}

fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = FeedConfig::from_env();
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Configuration error: {}", problem);
        }
        bail!("Invalid configuration ({} problems)", problems.len());
    }

    let service = || LiveMatchService::from_config(&config);
    match cli.command {
        Commands::Refresh => {
            let record = service()?.update_match_data().context("Refresh failed")?;
            info!("Stored next match: {} at {}", record.adversary, record.kickoff);
            println!("{}", serde_json::to_string_pretty(&record_json(&record, true))?);
        }
        Commands::Next => match service()?.match_with_refresh()? {
            (Some(record), refreshed) => {
                println!("{}", serde_json::to_string_pretty(&record_json(&record, refreshed))?)
            }
            (None, _) => println!("null"),
        },
        Commands::Countdown => println!("{}", service()?.countdown_message()?),
        Commands::Schedule => println!("{}", service()?.schedule_message()?),
        Commands::Upcoming { limit } => println!("{}", service()?.upcoming_message(limit)),
        Commands::DryRun => dry_run(&config)?,
    }

    Ok(())
}

fn record_json(record: &MatchRecord, refreshed: bool) -> serde_json::Value {
    json!({
        "kickoff": record.kickoff.to_rfc3339(),
        "adversary": record.adversary,
        "location": record.location,
        "competition": record.competition,
        "is_home": record.is_home,
        "tv_channel": record.tv_channel,
        "refreshed": refreshed,
    })
}

fn dry_run(config: &FeedConfig) -> Result<()> {
    let timezone = config.club.timezone;

    println!("== Calendar handshake: {}", config.sources.calendar_page_url);
    let session = CalendarSession::open(config).context("Calendar handshake failed")?;
    println!(
        "Cookies: {}",
        session.cookie_header().unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "Filters payload:\n{}",
        serde_json::to_string_pretty(&json!({ "filters": session.filters() }))?
    );

    println!("\n== Events request: {}", config.sources.calendar_events_url);
    let fragment = session.fetch_fragment().context("Events request failed")?;
    let preview: String = fragment.chars().take(PREVIEW_CHARS).collect();
    println!("Response ({} bytes), first {} chars:\n{}", fragment.len(), PREVIEW_CHARS, preview);

    let events = parse_calendar_fragment(&fragment, &config.club.name, timezone);
    println!("\n== Parsed {} events", events.len());
    for (index, event) in events.iter().enumerate() {
        println!(
            "{:>2}. {} | {} | {} | {} | {}{}",
            index + 1,
            event.kickoff.format("%d-%m-%Y %H:%M"),
            event.adversary,
            if event.is_home { "Casa" } else { "Fora" },
            event.location,
            event.competition,
            event
                .tv_channel
                .as_deref()
                .map(|c| format!(" | {}", c))
                .unwrap_or_default()
        );
    }

    let now = Utc::now().with_timezone(&timezone);
    match future_fixtures(&events, &now, 1).into_iter().next() {
        Some(fixture) => {
            println!("\n== Next match fixture\n{}", serde_json::to_string_pretty(&fixture)?);
            let record = SourceRecord::Primary(fixture).normalize(timezone)?;
            println!("\n== Countdown preview\n{}", format_countdown(Some(&record), &now));
            println!("\n== Schedule preview\n{}", format_schedule(Some(&record)));
        }
        None => println!("\nNo future events in the calendar response"),
    }

    Ok(())
}
