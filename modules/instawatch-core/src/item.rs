use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One emitted media item.
///
/// The upstream item schema is not fixed, so the fields are carried as an
/// ordered string-keyed map and copied through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedItem {
    fields: Map<String, Value>,
}

impl NormalizedItem {
    /// Non-object items are kept under a single `value` key.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                Self { fields }
            }
        }
    }

    /// Stable identifier, if the item has a non-empty string or numeric `id`.
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `created_time` in unix seconds. The API sends it as a numeric string.
    pub fn created_time(&self) -> Option<u64> {
        match self.fields.get("created_time")? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_from_string_or_number() {
        assert_eq!(NormalizedItem::from_value(json!({"id": "abc_1"})).id().as_deref(), Some("abc_1"));
        assert_eq!(NormalizedItem::from_value(json!({"id": 7})).id().as_deref(), Some("7"));
    }

    #[test]
    fn missing_or_empty_id_is_none() {
        assert!(NormalizedItem::from_value(json!({"caption": "hi"})).id().is_none());
        assert!(NormalizedItem::from_value(json!({"id": ""})).id().is_none());
        assert!(NormalizedItem::from_value(json!({"id": null})).id().is_none());
    }

    #[test]
    fn field_order_is_preserved() {
        let item = NormalizedItem::from_value(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<&str> = item.fields().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn scalar_item_is_wrapped() {
        let item = NormalizedItem::from_value(json!(5));
        assert_eq!(item.get("value"), Some(&json!(5)));
        assert!(item.id().is_none());
    }

    #[test]
    fn created_time_parses_numeric_string() {
        let item = NormalizedItem::from_value(json!({"created_time": "1400000000"}));
        assert_eq!(item.created_time(), Some(1_400_000_000));
        let bad = NormalizedItem::from_value(json!({"created_time": "yesterday"}));
        assert!(bad.created_time().is_none());
    }

    #[test]
    fn serializes_as_plain_object() {
        let item = NormalizedItem::from_value(json!({"id": "1", "link": "x"}));
        assert_eq!(serde_json::to_value(&item).unwrap(), json!({"id": "1", "link": "x"}));
    }
}
