use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::freshness::Watermark;
use crate::query::{Query, QuerySet, Radius};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const NOT_ALLOWED_ERROR: &str = "APINotAllowedError";

/// Knobs of the polling engine itself.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub polling_interval: Duration,
    /// Cap the pages one sweep may fetch.
    pub safe_mode: bool,
    /// Explicit cap; otherwise one page per second of `polling_interval`.
    pub page_cap: Option<u32>,
    /// How far back timestamp queries look on start.
    pub lookback: Duration,
    /// `meta.error_type` values on a 400 that mean "skip this query".
    pub skip_error_types: Vec<String>,
    pub page_size: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            api_base: instagram_client::DEFAULT_API_BASE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            polling_interval: DEFAULT_POLL_INTERVAL,
            safe_mode: true,
            page_cap: None,
            lookback: Duration::ZERO,
            skip_error_types: vec![NOT_ALLOWED_ERROR.to_string()],
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PollerConfig {
    /// Page budget of one sweep, or `None` when safe mode is off.
    pub fn effective_page_cap(&self) -> Option<u32> {
        if !self.safe_mode {
            return None;
        }
        let derived = u32::try_from(self.polling_interval.as_secs()).unwrap_or(u32::MAX);
        Some(self.page_cap.unwrap_or(derived).max(1))
    }

    /// Starting watermark for timestamp queries.
    pub fn timestamp_seed(&self, now: DateTime<Utc>) -> Watermark {
        let lookback = i64::try_from(self.lookback.as_secs()).unwrap_or(i64::MAX);
        let seed = now.timestamp().saturating_sub(lookback).max(0);
        Watermark::new(seed as u64)
    }
}

/// Which endpoint family the process watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Tag,
    User,
    Location,
    Radius,
    RealTime,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tag" | "tags" => Ok(Mode::Tag),
            "user" | "users" => Ok(Mode::User),
            "location" | "locations" => Ok(Mode::Location),
            "radius" => Ok(Mode::Radius),
            "realtime" | "real-time" => Ok(Mode::RealTime),
            other => bail!("unknown mode {other:?}"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tag => write!(f, "tag"),
            Mode::User => write!(f, "user"),
            Mode::Location => write!(f, "location"),
            Mode::Radius => write!(f, "radius"),
            Mode::RealTime => write!(f, "realtime"),
        }
    }
}

/// Where the subscription callback listener binds and what URL the API is told.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub external_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8182,
            endpoint: String::new(),
            external_url: None,
        }
    }
}

impl WebhookConfig {
    pub fn callback_url(&self) -> String {
        match &self.external_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}/{}", self.host, self.port, self.endpoint),
        }
    }

    pub fn route(&self) -> String {
        format!("/{}", self.endpoint.trim_matches('/'))
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Raw query strings; interpreted according to `mode`.
    pub queries: Vec<String>,
    pub poller: PollerConfig,
    pub webhook: WebhookConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode: Mode = get("INSTAWATCH_MODE")
            .unwrap_or_else(|| "tag".to_string())
            .parse()?;

        let queries: Vec<String> = required(&get, "INSTAWATCH_QUERIES")?
            .split(',')
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            bail!("INSTAWATCH_QUERIES must name at least one query");
        }

        let defaults = PollerConfig::default();
        let client_secret = get("INSTAGRAM_CLIENT_SECRET").unwrap_or_default();
        if mode == Mode::RealTime && client_secret.is_empty() {
            bail!("INSTAGRAM_CLIENT_SECRET is required in realtime mode");
        }

        let poller = PollerConfig {
            api_base: get("INSTAGRAM_API_BASE").unwrap_or(defaults.api_base),
            client_id: required(&get, "INSTAGRAM_CLIENT_ID")?,
            client_secret,
            polling_interval: parse_opt::<u64>(&get, "POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.polling_interval),
            safe_mode: parse_opt(&get, "SAFE_MODE")?.unwrap_or(defaults.safe_mode),
            page_cap: parse_opt(&get, "PAGE_CAP")?,
            lookback: parse_opt::<u64>(&get, "LOOKBACK_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.lookback),
            skip_error_types: get("SKIP_ERROR_TYPES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.skip_error_types),
            page_size: parse_opt(&get, "PAGE_SIZE")?.unwrap_or(defaults.page_size),
        };

        let webhook_defaults = WebhookConfig::default();
        let webhook = WebhookConfig {
            host: get("WEBHOOK_HOST").unwrap_or(webhook_defaults.host),
            port: parse_opt(&get, "WEBHOOK_PORT")?.unwrap_or(webhook_defaults.port),
            endpoint: get("WEBHOOK_ENDPOINT").unwrap_or(webhook_defaults.endpoint),
            external_url: get("EXTERNAL_CALLBACK_URL").filter(|u| !u.is_empty()),
        };

        Ok(Self {
            mode,
            queries,
            poller,
            webhook,
        })
    }

    /// Queries that need no lookup: tags, and `lat:lng:meters` radius points.
    pub fn direct_queries(&self) -> Result<QuerySet> {
        match self.mode {
            Mode::Tag | Mode::RealTime => Ok(QuerySet::tags(self.queries.iter().cloned())),
            Mode::Radius => self
                .queries
                .iter()
                .map(|q| parse_radius(q).map(Query::Radius))
                .collect::<Result<Vec<_>>>()
                .map(QuerySet::new),
            Mode::User | Mode::Location => {
                bail!("{} queries must be resolved to ids first", self.mode)
            }
        }
    }

    pub fn log_redacted(&self) {
        info!(
            mode = %self.mode,
            queries = ?self.queries,
            api_base = %self.poller.api_base,
            client_id = %redact(&self.poller.client_id),
            client_secret = %redact(&self.poller.client_secret),
            polling_interval_secs = self.poller.polling_interval.as_secs(),
            safe_mode = self.poller.safe_mode,
            page_cap = ?self.poller.effective_page_cap(),
            lookback_secs = self.poller.lookback.as_secs(),
            skip_error_types = ?self.poller.skip_error_types,
            callback_url = %self.webhook.callback_url(),
            "Loaded configuration"
        );
    }
}

/// Parse `lat:lng:meters` (meters defaults to 1000 when omitted).
pub fn parse_radius(raw: &str) -> Result<Radius> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    let (lat, lng, distance) = match parts.as_slice() {
        [lat, lng] => (*lat, *lng, "1000"),
        [lat, lng, distance] => (*lat, *lng, *distance),
        _ => bail!("radius query {raw:?} must look like lat:lng[:meters]"),
    };
    Ok(Radius {
        latitude: lat.parse().with_context(|| format!("latitude in {raw:?}"))?,
        longitude: lng.parse().with_context(|| format!("longitude in {raw:?}"))?,
        distance_m: distance.parse().with_context(|| format!("distance in {raw:?}"))?,
    })
}

fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{key} environment variable is required"))
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key}={raw:?} is not valid")),
        _ => Ok(None),
    }
}

fn redact(secret: &str) -> String {
    match secret.chars().count() {
        0 => "<unset>".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => format!("{}****", secret.chars().take(4).collect::<String>()),
    }
}
