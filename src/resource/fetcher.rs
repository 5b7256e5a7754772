//! Resource Fetcher
//!
//! Drains paged list responses. Zonal and regional lists return
//! `{ <items_key>: [...], nextPageToken }`; Compute aggregated lists return
//! `{ items: { "zones/x": { <items_key>: [...] } }, nextPageToken }`.

use crate::error::Result;
use crate::gcp::client::{add_query_params, GcpClient};
use serde_json::Value;
use std::collections::BTreeMap;

/// Page size for aggregated queries
pub const AGGREGATED_PAGE_SIZE: usize = 25;

/// Result of paginated fetch
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Fetch all items of a list endpoint (auto-paginate)
pub async fn fetch_all(client: &GcpClient, url: &str, items_key: &str) -> Result<Vec<Value>> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page_url = add_query_params(url, &[("pageToken", page_token.as_deref().unwrap_or(""))]);
        let response = client.get(&page_url).await?;
        let result = extract_page(&response, items_key);
        all_items.extend(result.items);

        match result.next_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(all_items)
}

/// Fetch every page of an aggregated list, grouped by scope (`zones/us-central1-a`)
pub async fn fetch_aggregated(
    client: &GcpClient,
    url: &str,
    items_key: &str,
) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut scopes: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut page_token: Option<String> = None;
    let page_size = AGGREGATED_PAGE_SIZE.to_string();

    loop {
        let page_url = add_query_params(
            url,
            &[
                ("maxResults", page_size.as_str()),
                ("pageToken", page_token.as_deref().unwrap_or("")),
            ],
        );
        let response = client.get(&page_url).await?;

        if let Some(items) = response.get("items").and_then(|v| v.as_object()) {
            for (scope, scope_data) in items {
                let found = scope_data
                    .get(items_key)
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                if !found.is_empty() {
                    scopes.entry(scope.clone()).or_default().extend(found);
                }
            }
        }

        match next_token(&response) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(scopes)
}

/// Extract items and continuation token from one list response
fn extract_page(response: &Value, items_key: &str) -> PaginatedResult {
    PaginatedResult {
        items: response
            .get(items_key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        next_token: next_token(response),
    }
}

fn next_token(response: &Value) -> Option<String> {
    response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Deserialize list items, failing the listing on the first bad record
pub fn decode_items<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>> {
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| {
                crate::error::Error::provider(format!("unexpected resource payload: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_page() {
        let response = json!({
            "items": [{"name": "a"}, {"name": "b"}],
            "nextPageToken": "next"
        });
        let page = extract_page(&response, "items");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_token.as_deref(), Some("next"));

        let last = extract_page(&json!({"nextPageToken": ""}), "items");
        assert!(last.items.is_empty());
        assert!(last.next_token.is_none());
    }
}
