use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::Error;
use crate::metadata::ParseMode;
use crate::scrobble::ScrobblePolicy;
use crate::service::Service;

pub const ENV_PREFIX: &str = "PIANOBAR_SCROBBLE_";

// Libre.fm accepts any key pair.
const LIBREFM_PLACEHOLDER_KEY: &str = "pianobar-scrobble";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub username: Option<String>,
    /// Plain password, hashed before use. `password_md5` wins when both are set.
    pub password: Option<String>,
    pub password_md5: Option<String>,
    pub policy: ScrobblePolicy,
    pub skip_malformed_lines: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: "lastfm".to_string(),
            api_key: None,
            api_secret: None,
            username: None,
            password: None,
            password_md5: None,
            policy: ScrobblePolicy::default(),
            skip_malformed_lines: false,
        }
    }
}

/// Everything `auth.getMobileSession` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
    pub password_md5: String,
}

pub fn default_config_path() -> PathBuf {
    let fallback = PathBuf::from(".config/pianobar/scrobble.json");
    dirs::home_dir().map_or(fallback, |home| home.join(".config/pianobar/scrobble.json"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed reading config at {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed parsing config at {}", path.display()))?;
    Ok(config)
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", md5::compute(password))
}

impl Config {
    /// Overlays `PIANOBAR_SCROBBLE_*` values from `lookup` onto the file config.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());
        if let Some(service) = var("SERVICE") {
            self.service = service;
        }
        for (name, slot) in [
            ("API_KEY", &mut self.api_key),
            ("API_SECRET", &mut self.api_secret),
            ("USERNAME", &mut self.username),
            ("PASSWORD", &mut self.password),
            ("PASSWORD_MD5", &mut self.password_md5),
        ] {
            if let Some(value) = var(name) {
                *slot = Some(value);
            }
        }
    }

    pub fn parse_mode(&self) -> ParseMode {
        if self.skip_malformed_lines {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        }
    }

    pub fn service(&self) -> crate::error::Result<Service> {
        Service::parse(&self.service).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn credentials(&self) -> crate::error::Result<Credentials> {
        let missing = |name: &str| Error::Config(format!("{name} is not configured"));
        let (api_key, api_secret) = match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => (key.clone(), secret.clone()),
            (None, None) if self.service == "librefm" => (
                LIBREFM_PLACEHOLDER_KEY.to_string(),
                LIBREFM_PLACEHOLDER_KEY.to_string(),
            ),
            (None, _) => return Err(missing("api_key")),
            (_, None) => return Err(missing("api_secret")),
        };
        let username = self.username.clone().ok_or_else(|| missing("username"))?;
        let password_md5 = match (&self.password_md5, &self.password) {
            (Some(hash), _) => hash.to_lowercase(),
            (None, Some(password)) => hash_password(password),
            (None, None) => return Err(missing("password")),
        };
        Ok(Credentials {
            api_key,
            api_secret,
            username,
            password_md5,
        })
    }
}
