//! Paged collection fetching, dictionary lookups and the fixed-delay retry loop.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::contract::SourceClient;
use crate::error::SyncError;

/// Rows requested per page.
pub const PAGE_SIZE: u32 = 100;

/// Bounded retry with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests.
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or the retries are used up.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    return Err(SyncError::RetriesExhausted {
                        url: url.to_string(),
                        attempts,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Transient failure, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Id -> display name, for authors, categories and tags.
pub type Dictionary = HashMap<u64, String>;

/// The three lookups every endpoint run needs, fetched once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionaries {
    pub categories: Dictionary,
    pub tags: Dictionary,
    pub users: Dictionary,
}

impl Dictionaries {
    pub async fn fetch<S>(source: &S, api_url: &str, retry: &RetryPolicy) -> Result<Self, SyncError>
    where
        S: SourceClient + ?Sized,
    {
        Ok(Self {
            categories: fetch_dictionary(source, api_url, "categories", retry).await?,
            tags: fetch_dictionary(source, api_url, "tags", retry).await?,
            users: fetch_dictionary(source, api_url, "users", retry).await?,
        })
    }
}

/// Fetch every row of `collection`, ordered by slug, with rendered wrappers flattened.
///
/// The first response's total-pages header bounds the remaining requests.
pub async fn fetch_paged<S>(
    source: &S,
    api_url: &str,
    collection: &str,
    retry: &RetryPolicy,
) -> Result<Vec<Value>, SyncError>
where
    S: SourceClient + ?Sized,
{
    let query = format!("{api_url}{collection}?per_page={PAGE_SIZE}&orderby=slug&order=asc");
    info!(query = %query, "Querying content API");

    let mut rows = Vec::new();
    let mut total_pages = 1;
    let mut page = 1;
    while page <= total_pages {
        let url = format!("{query}&page={page}");
        let response = retry.run(&url, || source.get_page(&url)).await?;
        if page == 1 {
            total_pages = response.total_pages.unwrap_or(1);
        }
        debug!(url = %url, rows = response.rows.len(), total_pages, "Fetched page");
        rows.extend(response.rows);
        page += 1;
    }

    for row in &mut rows {
        flatten_rendered(row);
    }
    info!(collection, rows = rows.len(), "Fetched collection");
    Ok(rows)
}

/// Replace every top-level `{"rendered": x, ...}` field with `x`.
pub fn flatten_rendered(row: &mut Value) {
    let Some(fields) = row.as_object_mut() else {
        return;
    };
    for value in fields.values_mut() {
        let rendered = match value.get("rendered") {
            Some(Value::Null) | None => continue,
            Some(rendered) => rendered.clone(),
        };
        *value = rendered;
    }
}

/// Fetch `{id, name}` rows into a dictionary.
pub async fn fetch_dictionary<S>(
    source: &S,
    api_url: &str,
    list: &str,
    retry: &RetryPolicy,
) -> Result<Dictionary, SyncError>
where
    S: SourceClient + ?Sized,
{
    let url = format!("{api_url}{list}?context=embed&hide_empty=true&per_page={PAGE_SIZE}");
    let body = retry.run(&url, || source.get_json(&url)).await?;
    let rows = body.as_array().ok_or_else(|| SyncError::Decode {
        url: url.clone(),
        message: "expected a JSON array".into(),
    })?;

    let mut dictionary = Dictionary::new();
    for row in rows {
        match (row.get("id").and_then(Value::as_u64), row.get("name").and_then(Value::as_str)) {
            (Some(id), Some(name)) => {
                dictionary.insert(id, name.to_string());
            }
            _ => warn!(list, ?row, "Skipping dictionary row without id/name"),
        }
    }
    debug!(list, entries = dictionary.len(), "Fetched dictionary");
    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockSourceClient;
    use serde_json::json;

    #[test]
    fn flattens_every_rendered_wrapper() {
        let mut row = json!({
            "id": 7,
            "title": {"rendered": "Hello"},
            "content": {"rendered": "<p>x</p>", "protected": false},
            "excerpt": {"rendered": ""},
            "guid": {"raw": "kept"},
            "meta": [],
        });
        flatten_rendered(&mut row);
        assert_eq!(row["title"], json!("Hello"));
        assert_eq!(row["content"], json!("<p>x</p>"));
        assert_eq!(row["excerpt"], json!(""), "empty rendered value is still unwrapped");
        assert_eq!(row["guid"], json!({"raw": "kept"}));
        assert_eq!(row["meta"], json!([]));
    }

    #[tokio::test]
    async fn retry_gives_up_after_bound() {
        let mut source = MockSourceClient::new();
        source.expect_get_json().times(3).returning(|url| {
            Err(SyncError::Status {
                url: url.to_string(),
                status: 503,
                body: String::new(),
            })
        });
        let err = fetch_dictionary(&source, "https://x/wp-json/wp/v2/", "tags", &RetryPolicy::immediate(2))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let mut source = MockSourceClient::new();
        source.expect_get_json().times(1).returning(|url| {
            Err(SyncError::Status {
                url: url.to_string(),
                status: 401,
                body: "nope".into(),
            })
        });
        let err = fetch_dictionary(&source, "https://x/wp-json/wp/v2/", "users", &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn dictionary_maps_ids_to_names() {
        let mut source = MockSourceClient::new();
        source
            .expect_get_json()
            .withf(|url| url == "https://x/wp-json/wp/v2/categories?context=embed&hide_empty=true&per_page=100")
            .returning(|_| Ok(json!([{"id": 1, "name": "News"}, {"id": 5, "name": "Events"}, {"bogus": true}])));
        let dictionary = fetch_dictionary(&source, "https://x/wp-json/wp/v2/", "categories", &RetryPolicy::immediate(0))
            .await
            .unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary[&5], "Events");
    }
}
