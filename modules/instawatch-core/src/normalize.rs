use serde_json::{Map, Value};

use crate::error::{PollError, Result};
use crate::freshness::{newest_created, Watermark};
use crate::item::NormalizedItem;
use crate::query::Flavor;

/// One page of a response, reduced to what the pager needs.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Every item of the page, in page order.
    pub items: Vec<NormalizedItem>,
    /// Link to the next page, if the API offered one.
    pub next_url: Option<String>,
    /// Largest freshness value this page reports.
    pub watermark: Option<Watermark>,
}

/// Parse a response body into a [`Page`].
///
/// Tag responses must carry both `data` and `pagination`; their watermark is
/// `pagination.min_tag_id`. Timestamp responses tolerate either being absent
/// and take their watermark from the newest item `created_time`.
pub fn normalize(body: &str, flavor: Flavor) -> Result<Page> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| PollError::MalformedResponse(e.to_string()))?;
    let Value::Object(mut root) = root else {
        return Err(PollError::MalformedResponse(
            "response body is not an object".to_string(),
        ));
    };

    let (data, pagination) = match flavor {
        Flavor::TagCursor => (
            take_required(&mut root, "data")?,
            take_required(&mut root, "pagination")?,
        ),
        Flavor::Timestamp => (
            root.remove("data").unwrap_or(Value::Array(Vec::new())),
            root.remove("pagination").unwrap_or(Value::Object(Map::new())),
        ),
    };

    let Value::Array(raw_items) = data else {
        return Err(PollError::MalformedResponse("data is not a list".to_string()));
    };
    // Timestamp endpoints have been seen returning `"pagination": []`.
    let pagination = match pagination {
        Value::Object(map) => map,
        Value::Array(list) if list.is_empty() && flavor == Flavor::Timestamp => Map::new(),
        _ => {
            return Err(PollError::MalformedResponse(
                "pagination is not an object".to_string(),
            ))
        }
    };

    let items: Vec<NormalizedItem> = raw_items.into_iter().map(NormalizedItem::from_value).collect();
    let next_url = pagination
        .get("next_url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(String::from);
    let watermark = match flavor {
        Flavor::TagCursor => pagination.get("min_tag_id").and_then(Watermark::from_json),
        Flavor::Timestamp => newest_created(&items),
    };

    Ok(Page {
        items,
        next_url,
        watermark,
    })
}

fn take_required(root: &mut Map<String, Value>, field: &str) -> Result<Value> {
    root.remove(field)
        .ok_or_else(|| PollError::MalformedResponse(format!("missing top-level field `{field}`")))
}
