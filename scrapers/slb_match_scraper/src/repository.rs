use chrono::{DateTime, Datelike, LocalResult, Offset, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::datetime::parse_stored_fields;
use crate::error::{MatchError, Result};
use crate::types::MatchRecord;

/// On-disk shape of the match file. The kickoff is stored decomposed, in
/// the club's wall-clock time, at minute precision.
#[derive(Debug, Serialize)]
struct StoredMatch<'a> {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    adversary: &'a str,
    location: &'a str,
    competition: &'a str,
    is_home: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tv_channel: Option<&'a str>,
    // Only written when the wall-clock time occurs twice (DST fold).
    #[serde(skip_serializing_if = "Option::is_none")]
    utc_offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct StoredDetails {
    adversary: String,
    location: String,
    competition: String,
    // Files written before home/away was tracked only held home matches.
    #[serde(default = "home_by_default")]
    is_home: bool,
    #[serde(default)]
    tv_channel: Option<String>,
    #[serde(default)]
    utc_offset: Option<i32>,
}

fn home_by_default() -> bool {
    true
}

pub struct MatchRepository {
    path: PathBuf,
    timezone: Tz,
}

impl MatchRepository {
    pub fn new(path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            path: path.into(),
            timezone,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replaces the file with `record`. Seconds are dropped; a kickoff in a DST
    /// fold also keeps its UTC offset so the right occurrence loads back.
    pub fn save(&self, record: &MatchRecord) -> Result<()> {
        let kickoff = record.kickoff.with_timezone(&self.timezone);
        let stored = StoredMatch {
            year: kickoff.year(),
            month: kickoff.month(),
            day: kickoff.day(),
            hour: kickoff.hour(),
            minute: kickoff.minute(),
            adversary: &record.adversary,
            location: &record.location,
            competition: &record.competition,
            is_home: record.is_home,
            tv_channel: record.tv_channel.as_deref().filter(|c| !c.trim().is_empty()),
            utc_offset: match self.timezone.from_local_datetime(&kickoff.naive_local()) {
                LocalResult::Ambiguous(..) => Some(kickoff.offset().fix().local_minus_utc()),
                _ => None,
            },
        };
        let json = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;

        info!(
            "Match data saved to {}: {} on {}",
            self.path.display(),
            record.adversary,
            kickoff.format("%d-%m-%Y %H:%M")
        );
        Ok(())
    }

    pub fn load(&self) -> Result<MatchRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(MatchError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_str(&raw)?;
        let earliest = parse_stored_fields(&value, self.timezone)?;
        let details: StoredDetails = serde_json::from_value(value)?;
        let kickoff = match details.utc_offset {
            Some(offset) => resolve_fold(earliest, offset),
            None => earliest,
        };
        debug!("Loaded match data from {}", self.path.display());

        Ok(MatchRecord {
            kickoff,
            adversary: details.adversary,
            location: details.location,
            competition: details.competition,
            is_home: details.is_home,
            tv_channel: details.tv_channel.filter(|c| !c.trim().is_empty()),
        })
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "match_data.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

/// Picks the occurrence of an ambiguous wall-clock time that has `offset`.
/// Without a match the earliest one is kept.
fn resolve_fold(earliest: DateTime<Tz>, offset: i32) -> DateTime<Tz> {
    match earliest.timezone().from_local_datetime(&earliest.naive_local()) {
        LocalResult::Ambiguous(first, second) => [first, second]
            .into_iter()
            .find(|candidate| candidate.offset().fix().local_minus_utc() == offset)
            .unwrap_or(earliest),
        _ => earliest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Lisbon;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record() -> MatchRecord {
        MatchRecord {
            kickoff: Lisbon.with_ymd_and_hms(2025, 11, 29, 18, 0, 45).unwrap(),
            adversary: "FC Porto".to_string(),
            location: "Estádio da Luz".to_string(),
            competition: "Liga Portugal".to_string(),
            is_home: true,
            tv_channel: Some("Sport TV1".to_string()),
        }
    }

    #[test]
    fn test_round_trip_at_minute_precision() {
        let dir = TempDir::new().unwrap();
        let repo = MatchRepository::new(dir.path().join("match_data.json"), Lisbon);
        repo.save(&record()).unwrap();

        let loaded = repo.load().unwrap();
        let expected = MatchRecord {
            kickoff: Lisbon.with_ymd_and_hms(2025, 11, 29, 18, 0, 0).unwrap(),
            ..record()
        };
        assert_eq!(loaded, expected);
        assert!(!dir.path().join(".match_data.json.tmp").exists());
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let repo = MatchRepository::new(dir.path().join("match_data.json"), Lisbon);
        repo.save(&MatchRecord {
            tv_channel: None,
            is_home: false,
            ..record()
        })
        .unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(repo.path()).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "year": 2025, "month": 11, "day": 29, "hour": 18, "minute": 0,
                "adversary": "FC Porto",
                "location": "Estádio da Luz",
                "competition": "Liga Portugal",
                "is_home": false
            })
        );
    }

    #[test]
    fn test_both_occurrences_of_a_fold_time_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = MatchRepository::new(dir.path().join("match_data.json"), Lisbon);
        // 01:30 happens twice in Lisbon on 26 October 2025.
        let (summer, winter) = match Lisbon.with_ymd_and_hms(2025, 10, 26, 1, 30, 0) {
            LocalResult::Ambiguous(summer, winter) => (summer, winter),
            other => panic!("expected an ambiguous time, got {:?}", other),
        };

        for (kickoff, offset) in [(winter, 0), (summer, 3_600)] {
            repo.save(&MatchRecord { kickoff, ..record() }).unwrap();
            let value: Value = serde_json::from_str(&fs::read_to_string(repo.path()).unwrap()).unwrap();
            assert_eq!(value["hour"], 1);
            assert_eq!(value["utc_offset"], offset);
            assert_eq!(repo.load().unwrap().kickoff, kickoff);
        }
    }

    #[test]
    fn test_fold_time_without_offset_loads_earliest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match_data.json");
        fs::write(
            &path,
            r#"{"year": 2025, "month": 10, "day": 26, "hour": 1, "minute": 30,
                "adversary": "FC Porto", "location": "Estádio da Luz",
                "competition": "Liga Portugal"}"#,
        )
        .unwrap();
        let loaded = MatchRepository::new(&path, Lisbon).load().unwrap();
        assert_eq!(loaded.kickoff.offset().fix().local_minus_utc(), 3_600);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let repo = MatchRepository::new(dir.path().join("absent.json"), Lisbon);
        assert!(!repo.exists());
        assert!(matches!(repo.load(), Err(MatchError::NotFound)));
    }

    #[test]
    fn test_legacy_file_without_is_home() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match_data.json");
        fs::write(
            &path,
            r#"{"year": 2025, "month": 12, "day": 7, "hour": 20, "minute": 30,
                "adversary": "Sporting CP", "location": "Estádio José Alvalade",
                "competition": "Liga Portugal", "tv_channel": ""}"#,
        )
        .unwrap();

        let loaded = MatchRepository::new(&path, Lisbon).load().unwrap();
        assert!(loaded.is_home);
        assert_eq!(loaded.tv_channel, None);
        assert_eq!(loaded.kickoff, Lisbon.with_ymd_and_hms(2025, 12, 7, 20, 30, 0).unwrap());
    }

    #[test]
    fn test_corrupt_file_is_distinct_from_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match_data.json");
        let repo = MatchRepository::new(&path, Lisbon);

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(repo.load(), Err(MatchError::Json(_))));

        fs::write(&path, r#"{"year": 2025, "adversary": "FC Porto"}"#).unwrap();
        assert!(matches!(repo.load(), Err(MatchError::Format(_))));
    }

    #[test]
    fn test_save_overwrites_and_creates_parent() {
        let dir = TempDir::new().unwrap();
        let repo = MatchRepository::new(dir.path().join("data").join("match_data.json"), Lisbon);
        repo.save(&record()).unwrap();
        repo.save(&MatchRecord {
            adversary: "SC Braga".to_string(),
            ..record()
        })
        .unwrap();
        assert_eq!(repo.load().unwrap().adversary, "SC Braga");
    }
}
