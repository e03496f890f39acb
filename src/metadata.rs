use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lifecycle point the player invoked the hook for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SongStart,
    SongFinish,
    Other(String),
}

impl FromStr for Event {
    type Err = Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "songstart" => Event::SongStart,
            "songfinish" => Event::SongFinish,
            other => Event::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SongStart => f.write_str("songstart"),
            Event::SongFinish => f.write_str("songfinish"),
            Event::Other(value) => f.write_str(value),
        }
    }
}

/// How to treat stdin lines that are not `key=value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Strict,
    Lenient,
}

/// Raw `key=value` fields as handed over by the player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    fields: HashMap<String, String>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        let raw = self.require(key)?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidFieldFormat {
                field: key.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn parse_metadata(input: &str, mode: ParseMode) -> Result<Metadata> {
    let mut fields = HashMap::new();
    for (index, line) in input.lines().enumerate() {
        let cleaned = line.trim();
        if cleaned.is_empty() && mode == ParseMode::Lenient {
            continue;
        }
        let Some((key, value)) = cleaned.split_once('=') else {
            if mode == ParseMode::Lenient {
                log::warn!("Skipping malformed metadata line {}: {cleaned:?}", index + 1);
                continue;
            }
            return Err(Error::MalformedLine {
                line_number: index + 1,
                line: cleaned.to_string(),
            });
        };
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(Metadata { fields })
}

/// Parses stdin and pulls out the fields the hook needs.
pub fn read_track(input: &str, mode: ParseMode) -> Result<TrackMetadata> {
    let metadata = parse_metadata(input, mode)?;
    if metadata.is_empty() {
        log::warn!("No metadata received on stdin");
    } else {
        log::debug!("Read {} metadata fields", metadata.len());
    }
    TrackMetadata::from_metadata(&metadata)
}

/// Love/ban state the player reports for the current song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    None,
    Love,
    Ban,
    Other(i64),
}

impl From<i64> for Rating {
    fn from(value: i64) -> Self {
        match value {
            0 => Rating::None,
            1 => Rating::Love,
            2 => Rating::Ban,
            other => Rating::Other(other),
        }
    }
}

impl Rating {
    pub fn is_rated(self) -> bool {
        match self {
            Rating::None => false,
            Rating::Love | Rating::Ban => true,
            Rating::Other(value) => value > 0,
        }
    }
}

/// Identity of a track on the tracking service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub artist: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub station: Option<String>,
    pub duration_ms: i64,
    pub played_ms: i64,
    pub rating: Rating,
}

impl TrackMetadata {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        Ok(Self {
            artist: metadata.require("artist")?.to_string(),
            title: metadata.require("title")?.to_string(),
            album: non_empty(metadata.get("album")),
            station: non_empty(metadata.get("stationName")),
            duration_ms: metadata.require_int("songDuration")?,
            played_ms: metadata.require_int("songPlayed")?,
            rating: Rating::from(metadata.require_int("rating")?),
        })
    }

    pub fn track_ref(&self) -> TrackRef {
        TrackRef {
            artist: self.artist.clone(),
            title: self.title.clone(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|value| !value.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "artist=Foo\ntitle=Bar\nalbum=Baz\nsongDuration=300000\nsongPlayed=200000\nrating=1\nstationName=QuickMix\npRet=1\npRetStr=Everything is fine :)\nwRet=1\nwRetStr=Everything's fine :)\n";

    #[test]
    fn parses_sample_block() {
        let metadata = parse_metadata(SAMPLE, ParseMode::Strict).unwrap();
        assert_eq!(metadata.len(), 11);
        assert_eq!(metadata.get("artist"), Some("Foo"));
        assert_eq!(metadata.get("wRetStr"), Some("Everything's fine :)"));

        let track = TrackMetadata::from_metadata(&metadata).unwrap();
        assert_eq!(
            track,
            TrackMetadata {
                artist: "Foo".to_string(),
                title: "Bar".to_string(),
                album: Some("Baz".to_string()),
                station: Some("QuickMix".to_string()),
                duration_ms: 300_000,
                played_ms: 200_000,
                rating: Rating::Love,
            }
        );
    }

    #[test]
    fn splits_on_first_equals_only() {
        let metadata = parse_metadata("title=a=b=c\n", ParseMode::Strict).unwrap();
        assert_eq!(metadata.get("title"), Some("a=b=c"));
    }

    #[test]
    fn last_duplicate_wins() {
        let metadata = parse_metadata("artist=First\nartist=Second\n", ParseMode::Strict).unwrap();
        assert_eq!(metadata.get("artist"), Some("Second"));
    }

    #[test]
    fn strips_carriage_returns_and_final_newline() {
        let metadata = parse_metadata("artist=Foo\r\ntitle=Bar  \n", ParseMode::Strict).unwrap();
        assert_eq!(metadata.get("artist"), Some("Foo"));
        assert_eq!(metadata.get("title"), Some("Bar"));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn strict_mode_rejects_blank_lines() {
        for input in ["artist=Foo\n\ntitle=Bar\n", "artist=Foo\n   \ntitle=Bar\n"] {
            let err = parse_metadata(input, ParseMode::Strict).unwrap_err();
            assert!(
                matches!(err, Error::MalformedLine { line_number: 2, ref line } if line.is_empty()),
                "accepted blank line in {input:?}"
            );
        }
    }

    #[test]
    fn lenient_mode_skips_blank_lines() {
        let metadata = parse_metadata("artist=Foo\n\n  \ntitle=Bar\n\n", ParseMode::Lenient).unwrap();
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn strict_mode_rejects_line_without_equals() {
        let err = parse_metadata("artist=Foo\ngarbage\n", ParseMode::Strict).unwrap_err();
        match err {
            Error::MalformedLine { line_number, line } => {
                assert_eq!(line_number, 2);
                assert_eq!(line, "garbage");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lenient_mode_skips_line_without_equals() {
        let metadata = parse_metadata("artist=Foo\ngarbage\ntitle=Bar\n", ParseMode::Lenient).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("title"), Some("Bar"));
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let metadata = parse_metadata("artist=Foo\ntitle=Bar\nsongDuration=1\nrating=0\n", ParseMode::Strict).unwrap();
        let err = TrackMetadata::from_metadata(&metadata).unwrap_err();
        assert!(matches!(err, Error::MissingField(ref field) if field == "songPlayed"));
    }

    #[test]
    fn non_numeric_duration_is_invalid() {
        let input = "artist=Foo\ntitle=Bar\nsongDuration=long\nsongPlayed=1\nrating=0\n";
        let metadata = parse_metadata(input, ParseMode::Strict).unwrap();
        let err = TrackMetadata::from_metadata(&metadata).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFieldFormat { ref field, ref value } if field == "songDuration" && value == "long"
        ));
    }

    #[test]
    fn empty_album_is_dropped() {
        let input = "artist=Foo\ntitle=Bar\nalbum=\nsongDuration=1\nsongPlayed=1\nrating=0\n";
        let metadata = parse_metadata(input, ParseMode::Strict).unwrap();
        let track = TrackMetadata::from_metadata(&metadata).unwrap();
        assert_eq!(track.album, None);
        assert_eq!(track.station, None);
    }

    #[test]
    fn empty_input_is_missing_artist() {
        let err = read_track("", ParseMode::Strict).unwrap_err();
        assert!(matches!(err, Error::MissingField(ref field) if field == "artist"));
    }

    #[test]
    fn malformed_line_fails_before_field_lookup() {
        let err = read_track("oops
", ParseMode::Strict).unwrap_err();
        assert!(matches!(err, Error::MalformedLine { line_number: 1, .. }));
    }

    #[test]
    fn events_and_ratings_map_from_raw_values() {
        assert_eq!("songstart".parse::<Event>().unwrap(), Event::SongStart);
        assert_eq!("songfinish".parse::<Event>().unwrap(), Event::SongFinish);
        assert_eq!(
            "songlove".parse::<Event>().unwrap(),
            Event::Other("songlove".to_string())
        );
        assert_eq!(Rating::from(2), Rating::Ban);
        assert!(Rating::from(3).is_rated());
        assert!(!Rating::from(-1).is_rated());
        assert!(!Rating::None.is_rated());
    }
}
