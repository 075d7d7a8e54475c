use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use instagram_client::{id_to_string, Envelope, LocationSummary, UserSummary};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::endpoint::{Endpoints, LocationLookup};
use crate::error::{PollError, Result};
use crate::query::{Query, QuerySet};
use crate::traits::Transport;

static LAT_LNG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?[0-9.]+)\s*,\s*(-?[0-9.]+)\s*$").unwrap());

/// Storage for name → id lookups, keyed by the lowercased query.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn save(&self, key: &str, id: &str) -> anyhow::Result<()>;
}

/// Process-lifetime cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, id: &str) -> Self {
        self.entries
            .get_mut()
            .insert(key.to_lowercase(), id.to_string());
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ResolutionCache for MemoryCache {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, id: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), id.to_string());
        Ok(())
    }
}

/// Turns usernames and places into the ids the media endpoints take.
pub struct Resolver<'a> {
    transport: &'a dyn Transport,
    endpoints: &'a Endpoints,
    cache: &'a dyn ResolutionCache,
}

impl<'a> Resolver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        endpoints: &'a Endpoints,
        cache: &'a dyn ResolutionCache,
    ) -> Self {
        Self {
            transport,
            endpoints,
            cache,
        }
    }

    /// Exact username match, ignoring case.
    pub async fn resolve_user(&self, username: &str) -> Result<String> {
        let username = username.trim();
        let url = self.endpoints.user_search(username);
        self.read_through(username, &url, |body| {
            let found: Envelope<Vec<UserSummary>> = serde_json::from_str(body).ok()?;
            found
                .data
                .into_iter()
                .find(|u| {
                    u.username
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(username))
                })
                .and_then(|u| u.id.as_ref().and_then(id_to_string))
        })
        .await
    }

    /// `lat,lng` looks up by coordinates; anything else is a Facebook places id.
    /// The first result wins.
    pub async fn resolve_location(&self, place: &str) -> Result<String> {
        let place = place.trim();
        let lookup = match LAT_LNG.captures(place) {
            Some(caps) => LocationLookup::Coordinates {
                lat: caps.get(1).map_or("", |m| m.as_str()),
                lng: caps.get(2).map_or("", |m| m.as_str()),
            },
            None => LocationLookup::FacebookPlace(place),
        };
        let url = self.endpoints.location_search(lookup);
        self.read_through(place, &url, |body| {
            let found: Envelope<Vec<LocationSummary>> = serde_json::from_str(body).ok()?;
            found
                .data
                .into_iter()
                .find_map(|l| l.id.as_ref().and_then(id_to_string))
        })
        .await
    }

    /// Resolve every username, dropping the ones that fail.
    pub async fn resolve_users(&self, usernames: &[String]) -> QuerySet {
        let mut queries = Vec::with_capacity(usernames.len());
        for name in usernames {
            match self.resolve_user(name).await {
                Ok(id) => {
                    info!(username = %name, id = %id, "Resolved user");
                    queries.push(Query::User(id));
                }
                Err(e) => warn!(username = %name, error = %e, "Dropping unresolved user"),
            }
        }
        QuerySet::new(queries)
    }

    /// Resolve every place, dropping the ones that fail.
    pub async fn resolve_locations(&self, places: &[String]) -> QuerySet {
        let mut queries = Vec::with_capacity(places.len());
        for place in places {
            match self.resolve_location(place).await {
                Ok(id) => {
                    info!(place = %place, id = %id, "Resolved location");
                    queries.push(Query::Location(id));
                }
                Err(e) => warn!(place = %place, error = %e, "Dropping unresolved location"),
            }
        }
        QuerySet::new(queries)
    }

    async fn read_through<F>(&self, query: &str, url: &str, pick: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String> + Send,
    {
        let key = query.to_lowercase();
        match self.cache.load(&key).await {
            Ok(Some(id)) => {
                debug!(query, id = %id, "Resolved from cache");
                return Ok(id);
            }
            Ok(None) => {}
            Err(e) => warn!(query, error = %e, "Resolution cache read failed"),
        }

        let body = match self.fetch(url).await {
            Ok(body) => body,
            Err(first) => {
                debug!(query, error = %first, "Lookup failed, retrying once");
                self.fetch(url)
                    .await
                    .map_err(|e| PollError::Resolution(format!("{query}: {e}")))?
            }
        };
        let id = pick(&body)
            .ok_or_else(|| PollError::Resolution(format!("{query}: no matching result")))?;

        if let Err(e) = self.cache.save(&key, &id).await {
            warn!(query, error = %e, "Resolution cache write failed");
        }
        Ok(id)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .transport
            .get(url, &[])
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;
        if !resp.is_ok() {
            let meta = resp.meta().unwrap_or_default();
            return Err(PollError::HttpStatus {
                status: resp.status,
                error_type: meta.error_type,
                message: meta.error_message,
            });
        }
        Ok(resp.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_recognised() {
        let caps = LAT_LNG.captures("44.95, -93.09").unwrap();
        assert_eq!(&caps[1], "44.95");
        assert_eq!(&caps[2], "-93.09");
        assert!(LAT_LNG.captures("1234567890").is_none());
        assert!(LAT_LNG.captures("Mall of America").is_none());
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryCache::new().with_entry("Alice", "1");
        assert_eq!(cache.load("alice").await.unwrap().as_deref(), Some("1"));
        cache.save("bob", "2").await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert!(cache.load("carol").await.unwrap().is_none());
    }
}
