use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use dotenv::dotenv;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slb_match_scraper::{
    config::FeedConfig,
    rate_limit::{format_remaining, CommandThrottle},
    service::LiveMatchService,
};

const REFRESH_KEY: &str = "scheduled_refresh";
// Keeps a clock jump or a DST change from triggering two runs in one day.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 3_600);

/// First `hour:00` in `now`'s timezone strictly after `now`. Days where that
/// hour does not exist (DST gap) are skipped.
fn next_run_after(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    (0..=2).find_map(|offset| {
        let date = now.date_naive() + ChronoDuration::days(offset);
        let candidate = tz.from_local_datetime(&date.and_hms_opt(hour, 0, 0)?).earliest()?;
        (candidate > *now).then_some(candidate)
    })
}

async fn run_refresh(config: FeedConfig) {
    let outcome = tokio::task::spawn_blocking(move || {
        LiveMatchService::from_config(&config).and_then(|service| service.update_match_data())
    })
    .await;

    match outcome {
        Ok(Ok(record)) => info!(
            "Scheduled refresh stored next match: {} at {}",
            record.adversary, record.kickoff
        ),
        Ok(Err(e)) => error!("Scheduled refresh failed: {}", e),
        Err(e) => error!("Scheduled refresh task did not complete: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FeedConfig::from_env();
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Configuration error: {}", problem);
        }
        bail!("Invalid configuration ({} problems)", problems.len());
    }

    let timezone = config.club.timezone;
    let hour = config.schedule.hour;
    let throttle = CommandThrottle::new(MIN_REFRESH_INTERVAL)?;
    info!("Daily match refresh scheduled at {:02}:00 {}", hour, timezone.name());

    loop {
        let now = Utc::now().with_timezone(&timezone);
        let next = next_run_after(&now, hour)
            .ok_or_else(|| anyhow!("No valid {:02}:00 in {} for the next days", hour, timezone.name()))?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next refresh at {}", next);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match throttle.check(REFRESH_KEY) {
                    Ok(()) => run_refresh(config.clone()).await,
                    Err(remaining) => warn!(
                        "Skipping refresh, last run was too recent ({} left)",
                        format_remaining(remaining)
                    ),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, stopping scheduled refresh");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Lisbon;

    #[test]
    fn test_next_run_later_today() {
        let now = Lisbon.with_ymd_and_hms(2025, 11, 20, 6, 30, 0).unwrap();
        assert_eq!(
            next_run_after(&now, 8),
            Some(Lisbon.with_ymd_and_hms(2025, 11, 20, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_tomorrow_when_hour_passed() {
        let now = Lisbon.with_ymd_and_hms(2025, 11, 20, 8, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&now, 8),
            Some(Lisbon.with_ymd_and_hms(2025, 11, 21, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_skips_dst_gap() {
        // 01:00 does not exist in Lisbon on 30 March 2025.
        let now = Lisbon.with_ymd_and_hms(2025, 3, 29, 23, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&now, 1),
            Some(Lisbon.with_ymd_and_hms(2025, 3, 31, 1, 0, 0).unwrap())
        );
    }
}
