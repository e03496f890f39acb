use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::metadata::TrackMetadata;

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;
pub const DEFAULT_PLAYED_ENOUGH_SECONDS: i64 = 240;
pub const MIN_TRACK_SECONDS: i64 = 30;

/// When a finished song counts as a scrobble.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrobblePolicy {
    /// Percentage of the song that must have been played.
    pub threshold_percent: f64,
    /// Or this many seconds, whatever the percentage.
    pub played_enough_secs: i64,
    /// Shorter songs are never scrobbled.
    pub min_duration_secs: i64,
}

impl Default for ScrobblePolicy {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            played_enough_secs: DEFAULT_PLAYED_ENOUGH_SECONDS,
            min_duration_secs: MIN_TRACK_SECONDS,
        }
    }
}

impl ScrobblePolicy {
    pub fn is_eligible(&self, duration_ms: i64, played_ms: i64) -> bool {
        // Must run before the percentage, it also rules out zero durations.
        if duration_ms <= 0 || duration_ms < self.min_duration_secs.saturating_mul(1000) {
            return false;
        }
        let played_percent = 100.0 * played_ms as f64 / duration_ms as f64;
        played_percent > self.threshold_percent
            || played_ms > self.played_enough_secs.saturating_mul(1000)
    }
}

/// Unix time the song started, estimated from how long it has played.
pub fn start_timestamp(now: DateTime<Utc>, played_ms: i64) -> i64 {
    (now.timestamp_millis() - played_ms).div_euclid(1000)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleTrack {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub timestamp: i64,
    pub duration: i64,
}

impl ScrobbleTrack {
    pub fn from_metadata(track: &TrackMetadata, now: DateTime<Utc>) -> Self {
        Self {
            artist: track.artist.clone(),
            title: track.title.clone(),
            album: track.album.clone(),
            timestamp: start_timestamp(now, track.played_ms),
            duration: track.duration_ms / 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn more_than_half_played_qualifies() {
        let policy = ScrobblePolicy::default();
        assert!(policy.is_eligible(300_000, 200_000));
        assert!(!policy.is_eligible(300_000, 150_000));
        assert!(!policy.is_eligible(300_000, 100_000));
    }

    #[test]
    fn short_tracks_never_qualify() {
        let policy = ScrobblePolicy::default();
        assert!(!policy.is_eligible(29_999, 29_999));
        assert!(!policy.is_eligible(10_000, 500_000));
        assert!(!policy.is_eligible(0, 1_000));
        assert!(!policy.is_eligible(-5, 1_000));
        assert!(policy.is_eligible(30_000, 20_000));
    }

    #[test]
    fn long_listen_qualifies_regardless_of_percentage() {
        let policy = ScrobblePolicy::default();
        assert!(policy.is_eligible(3_600_000, 240_001));
        assert!(!policy.is_eligible(3_600_000, 240_000));
    }

    #[test]
    fn thresholds_come_from_policy() {
        let policy = ScrobblePolicy {
            threshold_percent: 90.0,
            played_enough_secs: 60,
            min_duration_secs: 120,
        };
        assert!(!policy.is_eligible(100_000, 99_000));
        assert!(policy.is_eligible(600_000, 61_000));
        assert!(policy.is_eligible(200_000, 190_000));
        assert!(!policy.is_eligible(200_000, 59_000));
    }

    #[test]
    fn start_is_floored_to_whole_seconds() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        assert_eq!(start_timestamp(now, 200_000), 1_699_999_800);
        assert_eq!(start_timestamp(now, 200_500), 1_699_999_799);
        assert_eq!(start_timestamp(now, 0), 1_700_000_000);
    }

    #[test]
    fn policy_fields_default_individually() {
        let policy: ScrobblePolicy = serde_json::from_str(r#"{"threshold_percent": 75}"#).unwrap();
        assert_eq!(policy.threshold_percent, 75.0);
        assert_eq!(policy.played_enough_secs, DEFAULT_PLAYED_ENOUGH_SECONDS);
        assert_eq!(policy.min_duration_secs, MIN_TRACK_SECONDS);
    }
}
