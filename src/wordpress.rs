//! Content API client backed by `reqwest`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use wp_mirror_core::contract::{SourceClient, SourcePage};
use wp_mirror_core::error::SyncError;

use crate::http::{check, decode_json, transport, USER_AGENT};

/// Response header holding the number of pages of a collection.
pub const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

pub struct WordpressClient {
    http: Client,
}

impl WordpressClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SyncError> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await.map_err(|e| transport(url, e))?;
        check(url, response).await
    }
}

/// `None` when the header is missing or not a number.
pub fn total_pages(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(TOTAL_PAGES_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl SourceClient for WordpressClient {
    async fn get_page(&self, url: &str) -> Result<SourcePage, SyncError> {
        let response = self.get(url).await?;
        let total_pages = total_pages(response.headers());
        let rows: Vec<Value> = decode_json(url, response).await?;
        Ok(SourcePage { rows, total_pages })
    }

    async fn get_json(&self, url: &str) -> Result<Value, SyncError> {
        let response = self.get(url).await?;
        decode_json(url, response).await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| transport(url, e))?;
        Ok(bytes.to_vec())
    }
}
