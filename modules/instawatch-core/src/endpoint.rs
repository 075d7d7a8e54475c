use url::Url;

use crate::error::{PollError, Result};
use crate::freshness::Watermark;
use crate::query::{Flavor, Query};

/// Builds every upstream URL the poller requests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    client_id: String,
    client_secret: String,
    page_size: u32,
}

impl Endpoints {
    pub fn new(api_base: &str, client_id: &str, client_secret: &str, page_size: u32) -> Result<Self> {
        let base = Url::parse(api_base)
            .map_err(|e| PollError::Config(format!("api base {api_base:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(PollError::Config(format!(
                "api base {api_base:?} cannot carry a path"
            )));
        }
        Ok(Self {
            base,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            page_size,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// First-page URL of a sweep. A tag query without a watermark asks for everything.
    pub fn recent_media(&self, query: &Query, watermark: Option<Watermark>) -> String {
        let count = self.page_size.to_string();
        let mut url = match query {
            Query::Tag(tag) => self.with_path(&["tags", tag, "media", "recent"]),
            Query::User(id) => self.with_path(&["users", id, "media", "recent"]),
            Query::Location(id) => self.with_path(&["locations", id, "media", "recent"]),
            Query::Radius(_) => self.with_path(&["media", "search"]),
        };
        {
            let mut pairs = url.query_pairs_mut();
            if let Query::Radius(r) = query {
                pairs
                    .append_pair("lat", &r.latitude.to_string())
                    .append_pair("lng", &r.longitude.to_string())
                    .append_pair("distance", &r.distance_m.to_string());
            }
            pairs
                .append_pair("count", &count)
                .append_pair("client_id", &self.client_id);
            match (query.flavor(), watermark) {
                (Flavor::TagCursor, Some(wm)) => {
                    pairs.append_pair("min_tag_id", &wm.to_string());
                }
                (Flavor::TagCursor, None) => {}
                (Flavor::Timestamp, wm) => {
                    let ts = wm.map(|w| w.value()).unwrap_or(0);
                    pairs.append_pair("min_timestamp", &ts.to_string());
                }
            }
        }
        url.into()
    }

    /// Follow-up URL while paging. The API-provided link is kept as is; tag
    /// queries re-attach the watermark frozen at the start of the sweep.
    pub fn next_page(
        &self,
        next_url: &str,
        query: &Query,
        pending: Option<Watermark>,
    ) -> Result<String> {
        if query.flavor() == Flavor::Timestamp {
            return Ok(next_url.to_string());
        }
        let Some(pending) = pending else {
            return Ok(next_url.to_string());
        };
        Url::parse(next_url)
            .map_err(|e| PollError::MalformedResponse(format!("next_url {next_url:?}: {e}")))?;
        Ok(with_cursor(next_url, pending))
    }

    pub fn user_search(&self, username: &str) -> String {
        let mut url = self.with_path(&["users", "search"]);
        url.query_pairs_mut()
            .append_pair("q", username)
            .append_pair("client_id", &self.client_id);
        url.into()
    }

    /// Place lookup by `lat,lng` coordinates or by Facebook places id.
    pub fn location_search(&self, place: LocationLookup<'_>) -> String {
        let mut url = self.with_path(&["locations", "search"]);
        {
            let mut pairs = url.query_pairs_mut();
            match place {
                LocationLookup::Coordinates { lat, lng } => {
                    pairs.append_pair("lat", lat).append_pair("lng", lng);
                }
                LocationLookup::FacebookPlace(id) => {
                    pairs.append_pair("facebook_places_id", id);
                }
            }
            pairs.append_pair("client_id", &self.client_id);
        }
        url.into()
    }

    pub fn subscriptions(&self) -> String {
        self.with_path(&["subscriptions", ""]).into()
    }

    pub fn delete_subscription(&self, subscription_id: u64) -> String {
        let mut url = self.with_path(&["subscriptions"]);
        url.query_pairs_mut()
            .append_pair("client_secret", &self.client_secret)
            .append_pair("client_id", &self.client_id)
            .append_pair("id", &subscription_id.to_string());
        url.into()
    }

    fn with_path(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Replace any `min_tag_id` pair of `link` with `cursor`. Every other byte of
/// the link is kept, so pairs are never decoded or re-encoded.
fn with_cursor(link: &str, cursor: Watermark) -> String {
    let (head, fragment) = match link.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (link, None),
    };
    let (path, query) = head.split_once('?').unwrap_or((head, ""));

    let mut out = String::with_capacity(link.len() + 24);
    out.push_str(path);
    out.push('?');
    for pair in query.split('&') {
        let key = pair.split_once('=').map_or(pair, |(k, _)| k);
        if pair.is_empty() || key == "min_tag_id" {
            continue;
        }
        out.push_str(pair);
        out.push('&');
    }
    out.push_str("min_tag_id=");
    out.push_str(&cursor.to_string());
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub enum LocationLookup<'a> {
    Coordinates { lat: &'a str, lng: &'a str },
    FacebookPlace(&'a str),
}
