use anyhow::Result as AnyResult;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::metadata::{Event, Rating, TrackMetadata, TrackRef};
use crate::scrobble::{ScrobblePolicy, ScrobbleTrack};

/// Opens an authenticated session with the tracking service.
pub trait Connector {
    type Session: TrackingSession;

    fn connect(&self) -> Result<Self::Session>;
}

/// Calls available on an authenticated session.
pub trait TrackingSession {
    fn scrobble(&self, track: &ScrobbleTrack) -> AnyResult<()>;
    fn love(&self, track: &TrackRef) -> AnyResult<()>;
    fn ban(&self, track: &TrackRef) -> AnyResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingAction {
    Love,
    Ban,
}

/// What a hook invocation sent to the service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub scrobbled: Option<ScrobbleTrack>,
    pub rated: Option<RatingAction>,
}

impl Outcome {
    pub fn is_noop(&self) -> bool {
        self.scrobbled.is_none() && self.rated.is_none()
    }
}

/// Decides what a finished song deserves without talking to the service.
pub fn plan(
    event: &Event,
    track: &TrackMetadata,
    policy: &ScrobblePolicy,
    now: DateTime<Utc>,
) -> Outcome {
    if *event != Event::SongFinish {
        return Outcome::default();
    }
    let scrobbled = policy
        .is_eligible(track.duration_ms, track.played_ms)
        .then(|| ScrobbleTrack::from_metadata(track, now));
    let rated = match track.rating {
        Rating::Love => Some(RatingAction::Love),
        Rating::Ban => Some(RatingAction::Ban),
        other => {
            if other.is_rated() {
                log::debug!("No action for {other:?} on {} - {}", track.artist, track.title);
            }
            None
        }
    };
    Outcome { scrobbled, rated }
}

/// Runs one invocation against the service. The session is opened at most
/// once and only when something needs to be sent.
pub fn handle<C: Connector>(
    event: &Event,
    track: &TrackMetadata,
    policy: &ScrobblePolicy,
    connector: &C,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    log::debug!(
        "Handling {event} for {} - {} from station {}",
        track.artist,
        track.title,
        track.station.as_deref().unwrap_or("unknown")
    );
    let outcome = plan(event, track, policy, now);
    if outcome.is_noop() {
        log::debug!("Nothing to submit for {event} of {} - {}", track.artist, track.title);
        return Ok(outcome);
    }

    let session = connector.connect()?;
    if let Some(scrobble) = &outcome.scrobbled {
        session.scrobble(scrobble).map_err(Error::RemoteService)?;
        log::info!(
            "Scrobbled {} - {} started at {}",
            scrobble.artist,
            scrobble.title,
            scrobble.timestamp
        );
    }
    if let Some(action) = outcome.rated {
        let track_ref = track.track_ref();
        match action {
            RatingAction::Love => session.love(&track_ref),
            RatingAction::Ban => session.ban(&track_ref),
        }
        .map_err(Error::RemoteService)?;
        log::info!("Sent {action:?} for {} - {}", track_ref.artist, track_ref.title);
    }
    Ok(outcome)
}
