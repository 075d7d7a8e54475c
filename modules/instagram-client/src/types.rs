use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An HTTP response as the transport saw it. Status handling is left to the caller.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The `meta` block of an error body, if the body carries one.
    pub fn meta(&self) -> Option<Meta> {
        self.json::<ErrorEnvelope>().ok().map(|e| e.meta)
    }
}

/// Wrapper for `{"data": ...}` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Error metadata attached to non-200 responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    pub code: Option<u16>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub meta: Meta,
}

/// Form body for `POST /subscriptions/`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    pub client_id: String,
    pub client_secret: String,
    pub object: String,
    pub aspect: String,
    pub object_id: String,
    pub callback_url: String,
}

impl SubscriptionRequest {
    /// A tag/media subscription, the only kind the real-time API offers for tags.
    pub fn tag_media(
        client_id: &str,
        client_secret: &str,
        tag: &str,
        callback_url: &str,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            object: "tag".to_string(),
            aspect: "media".to_string(),
            object_id: tag.to_string(),
            callback_url: callback_url.to_string(),
        }
    }

    pub fn as_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
            ("object", self.object.clone()),
            ("aspect", self.aspect.clone()),
            ("object_id", self.object_id.clone()),
            ("callback_url", self.callback_url.clone()),
        ]
    }
}

/// `data` of a successful subscription creation. The id arrives as a string or a number.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionCreated {
    pub id: Option<serde_json::Value>,
}

impl SubscriptionCreated {
    pub fn subscription_id(&self) -> Option<u64> {
        match self.id.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// An entry of `GET /users/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSummary {
    pub id: Option<serde_json::Value>,
    pub username: Option<String>,
}

/// An entry of `GET /locations/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationSummary {
    pub id: Option<serde_json::Value>,
}

/// Render a string-or-number id as a string.
pub fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = RawResponse::new(200, "{}").with_header("ETag", "\"abc\"");
        assert_eq!(resp.header("etag"), Some("\"abc\""));
        assert_eq!(resp.header("ETAG"), Some("\"abc\""));
    }

    #[test]
    fn meta_is_read_from_error_body() {
        let resp = RawResponse::new(
            400,
            r#"{"meta":{"error_type":"APINotAllowedError","code":400,"error_message":"nope"}}"#,
        );
        let meta = resp.meta().unwrap();
        assert_eq!(meta.error_type.as_deref(), Some("APINotAllowedError"));
        assert_eq!(meta.code, Some(400));
    }

    #[test]
    fn meta_absent_on_unrelated_body() {
        let resp = RawResponse::new(500, "<html>oops</html>");
        assert!(resp.meta().is_none());
    }

    #[test]
    fn subscription_id_accepts_string_and_number() {
        let a: SubscriptionCreated = serde_json::from_str(r#"{"id":"42"}"#).unwrap();
        let b: SubscriptionCreated = serde_json::from_str(r#"{"id":42}"#).unwrap();
        let c: SubscriptionCreated = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(a.subscription_id(), Some(42));
        assert_eq!(b.subscription_id(), Some(42));
        assert_eq!(c.subscription_id(), None);
    }

    #[test]
    fn subscription_form_has_fixed_shape() {
        let req = SubscriptionRequest::tag_media("cid", "secret", "sunset", "http://cb/hook");
        let form = req.as_form();
        let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["client_id", "client_secret", "object", "aspect", "object_id", "callback_url"]
        );
        assert_eq!(form[2].1, "tag");
        assert_eq!(form[3].1, "media");
    }
}
