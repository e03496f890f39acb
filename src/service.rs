use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{Config, Credentials};
use crate::error::Error;
use crate::handler::{Connector, TrackingSession};
use crate::metadata::TrackRef;
use crate::scrobble::ScrobbleTrack;

/// Code the service uses for a scrobble it already has.
const IGNORED_ALREADY_SCROBBLED: &str = "91";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    LastFm,
    LibreFm,
}

impl Service {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "lastfm" => Ok(Service::LastFm),
            "librefm" => Ok(Service::LibreFm),
            _ => bail!("Unsupported service: {value}"),
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Service::LastFm => "https://ws.audioscrobbler.com/2.0/",
            Service::LibreFm => "https://libre.fm/2.0/",
        }
    }
}

/// Resolves the service and credentials only when asked to connect.
pub struct ServiceConnector<'a> {
    config: &'a Config,
    debug_response: bool,
}

impl<'a> ServiceConnector<'a> {
    pub fn new(config: &'a Config, debug_response: bool) -> Self {
        Self {
            config,
            debug_response,
        }
    }
}

impl Connector for ServiceConnector<'_> {
    type Session = ScrobbleClient;

    fn connect(&self) -> crate::error::Result<ScrobbleClient> {
        let service = self.config.service()?;
        let credentials = self.config.credentials()?;
        ScrobbleClient::new(service, &credentials, self.debug_response)
            .map_err(Error::RemoteService)
    }
}

pub struct ScrobbleClient {
    service: Service,
    api_key: String,
    api_secret: String,
    session_key: String,
    http: Client,
    debug_response: bool,
}

impl ScrobbleClient {
    pub fn new(service: Service, credentials: &Credentials, debug_response: bool) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed building HTTP client")?;
        let session_key = fetch_mobile_session(&http, service, credentials)?;
        log::debug!(
            "Opened {service:?} session for {}",
            credentials.username
        );
        Ok(Self {
            service,
            api_key: credentials.api_key.clone(),
            api_secret: credentials.api_secret.clone(),
            session_key,
            http,
            debug_response,
        })
    }

    /// Sends a signed write call and returns the raw JSON body.
    fn call(&self, method: &str, mut params: Vec<(String, String)>) -> Result<String> {
        params.push(("method".to_string(), method.to_string()));
        params.push(("api_key".to_string(), self.api_key.clone()));
        params.push(("sk".to_string(), self.session_key.clone()));
        let api_sig = sign_params(&params, &self.api_secret);
        params.push(("api_sig".to_string(), api_sig));
        params.push(("format".to_string(), "json".to_string()));
        let response = self
            .http
            .post(self.service.base_url())
            .form(&params)
            .send()
            .with_context(|| format!("Failed sending {method} request"))?;
        let text = response
            .text()
            .with_context(|| format!("Failed reading {method} response"))?;
        if self.debug_response {
            log::debug!("{method} response from {}: {text}", self.service.base_url());
        }
        check_api_error(&text)?;
        Ok(text)
    }

    fn rate(&self, method: &str, track: &TrackRef) -> Result<()> {
        self.call(method, track_params(track))?;
        Ok(())
    }
}

impl TrackingSession for ScrobbleClient {
    fn scrobble(&self, track: &ScrobbleTrack) -> Result<()> {
        let text = self.call("track.scrobble", scrobble_params(track))?;
        check_scrobble_result(&text)
    }

    fn love(&self, track: &TrackRef) -> Result<()> {
        self.rate("track.love", track)
    }

    fn ban(&self, track: &TrackRef) -> Result<()> {
        self.rate("track.ban", track)
    }
}

fn track_params(track: &TrackRef) -> Vec<(String, String)> {
    vec![
        ("artist".to_string(), track.artist.clone()),
        ("track".to_string(), track.title.clone()),
    ]
}

fn scrobble_params(track: &ScrobbleTrack) -> Vec<(String, String)> {
    let mut params = vec![
        ("artist".to_string(), track.artist.clone()),
        ("track".to_string(), track.title.clone()),
        ("timestamp".to_string(), track.timestamp.to_string()),
    ];
    if let Some(album) = &track.album {
        params.push(("album".to_string(), album.clone()));
    }
    if track.duration > 0 {
        params.push(("duration".to_string(), track.duration.to_string()));
    }
    params
}

fn fetch_mobile_session(http: &Client, service: Service, credentials: &Credentials) -> Result<String> {
    let auth_token = format!(
        "{:x}",
        md5::compute(format!("{}{}", credentials.username, credentials.password_md5))
    );
    let mut params = vec![
        ("method".to_string(), "auth.getMobileSession".to_string()),
        ("username".to_string(), credentials.username.clone()),
        ("authToken".to_string(), auth_token),
        ("api_key".to_string(), credentials.api_key.clone()),
    ];
    let api_sig = sign_params(&params, &credentials.api_secret);
    params.push(("api_sig".to_string(), api_sig));
    params.push(("format".to_string(), "json".to_string()));
    let response = http
        .post(service.base_url())
        .form(&params)
        .send()
        .context("Failed requesting mobile session")?;
    let text = response.text().context("Failed reading session response")?;
    session_key_from_response(&text)
}

fn session_key_from_response(payload: &str) -> Result<String> {
    check_api_error(payload)?;
    let json: Value = serde_json::from_str(payload).context("Failed parsing session response")?;
    json.get("session")
        .and_then(|session| session.get("key"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing session key in response"))
}

fn sign_params(params: &[(String, String)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut signature = String::new();
    for (key, value) in sorted {
        signature.push_str(&key);
        signature.push_str(&value);
    }
    signature.push_str(secret);
    format!("{:x}", md5::compute(signature))
}

fn check_api_error(payload: &str) -> Result<()> {
    let json: Value = serde_json::from_str(payload).context("Failed parsing API response")?;
    if let Some(error) = json.get("error") {
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("API error");
        bail!("API error {error}: {message}");
    }
    Ok(())
}

fn check_scrobble_result(payload: &str) -> Result<()> {
    let parsed: ScrobbleResponse =
        serde_json::from_str(payload).context("Failed parsing scrobble response")?;
    let Some(scrobbles) = parsed.scrobbles else {
        return Ok(());
    };
    let (accepted, ignored) = scrobbles
        .attr
        .as_ref()
        .map_or((0, 0), |attr| (attr.accepted, attr.ignored));
    if accepted > 0 && ignored == 0 {
        return Ok(());
    }
    let (code, message) = scrobbles
        .scrobble
        .as_ref()
        .and_then(|entry| entry.ignored_message.as_ref())
        .map_or_else(
            || ("unknown".to_string(), "Scrobble rejected".to_string()),
            IgnoredMessageField::code_and_text,
        );
    if code == IGNORED_ALREADY_SCROBBLED {
        log::warn!("Scrobble already recorded by the service: {message}");
        return Ok(());
    }
    bail!("Scrobble rejected (code {code}): {message}");
}

#[derive(Debug, Deserialize)]
struct ScrobbleResponse {
    #[serde(default)]
    scrobbles: Option<Scrobbles>,
}

#[derive(Debug, Deserialize)]
struct Scrobbles {
    #[serde(rename = "@attr", default)]
    attr: Option<ScrobbleAttr>,
    #[serde(default)]
    scrobble: Option<ScrobbleEntry>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleAttr {
    #[serde(deserialize_with = "deserialize_u32_string_or_number")]
    accepted: u32,
    #[serde(deserialize_with = "deserialize_u32_string_or_number")]
    ignored: u32,
}

// A single submission always comes back as one object, never an array.
#[derive(Debug, Deserialize)]
struct ScrobbleEntry {
    #[serde(rename = "ignoredMessage", default)]
    ignored_message: Option<IgnoredMessageField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IgnoredMessageField {
    Object {
        #[serde(rename = "#text", default)]
        text: Option<String>,
        #[serde(default)]
        code: Option<Value>,
    },
    Text(String),
    Number(u32),
}

impl IgnoredMessageField {
    fn code_and_text(&self) -> (String, String) {
        match self {
            IgnoredMessageField::Object { text, code } => (
                code.as_ref().map_or_else(
                    || "unknown".to_string(),
                    |code| code.as_str().map_or_else(|| code.to_string(), str::to_string),
                ),
                text.clone()
                    .unwrap_or_else(|| "Scrobble rejected".to_string()),
            ),
            IgnoredMessageField::Text(text) => ("unknown".to_string(), text.clone()),
            IgnoredMessageField::Number(code) => (code.to_string(), "Scrobble rejected".to_string()),
        }
    }
}

fn deserialize_u32_string_or_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU32 {
        String(String),
        Number(u32),
    }
    match StringOrU32::deserialize(deserializer)? {
        StringOrU32::String(value) => value.parse::<u32>().map_err(serde::de::Error::custom),
        StringOrU32::Number(value) => Ok(value),
    }
}
