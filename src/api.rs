use std::future::Future;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::warn;

const API_URL: &str = "https://openapi.naver.com/v1/search/blog.json";

/// Provider caps: items per page, and the highest addressable 1-based
/// start offset. Both are hard limits on Naver's side.
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_START_OFFSET: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct BlogItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub bloggername: String,
    #[serde(default)]
    pub postdate: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<BlogItem>,
}

/// Credential pair for the search API. There are no embedded defaults:
/// missing credentials abort before any work starts.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Resolve from CLI flags first, then the environment.
    pub fn resolve(client_id: Option<String>, client_secret: Option<String>) -> Result<Self> {
        let client_id = client_id
            .or_else(|| std::env::var("NAVER_CLIENT_ID").ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("Naver client id must be set (--client-id or NAVER_CLIENT_ID)"))?;
        let client_secret = client_secret
            .or_else(|| std::env::var("NAVER_CLIENT_SECRET").ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                anyhow!("Naver client secret must be set (--client-secret or NAVER_CLIENT_SECRET)")
            })?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// One blog-search request per call, no state between calls. Implemented
/// by the live client and by scripted providers in tests.
pub trait BlogSearch {
    fn search(
        &self,
        query: &str,
        display: usize,
        start: usize,
        sort: &str,
    ) -> impl Future<Output = Option<SearchResponse>> + Send;
}

/// Live client for the Naver blog-search endpoint.
pub struct NaverClient {
    http: reqwest::Client,
    credentials: Credentials,
}

impl NaverClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
        }
    }
}

impl BlogSearch for NaverClient {
    /// Transport errors and non-2xx statuses are logged and mapped to
    /// `None`; callers treat that as "no more data".
    async fn search(
        &self,
        query: &str,
        display: usize,
        start: usize,
        sort: &str,
    ) -> Option<SearchResponse> {
        let response = self
            .http
            .get(API_URL)
            .header("X-Naver-Client-Id", &self.credentials.client_id)
            .header("X-Naver-Client-Secret", &self.credentials.client_secret)
            .query(&[
                ("query", query),
                ("display", &display.to_string()),
                ("start", &start.to_string()),
                ("sort", sort),
            ])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<SearchResponse>().await {
                Ok(body) => Some(body),
                Err(e) => {
                    warn!("failed to decode search response for '{}': {}", query, e);
                    None
                }
            },
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("search request for '{}' failed: {} {}", query, status, body);
                None
            }
            Err(e) => {
                warn!("search request for '{}' errored: {}", query, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_decodes_provider_payload() {
        let json = r#"{
            "lastBuildDate": "Mon, 03 Jan 2024 10:00:00 +0900",
            "total": 1234,
            "start": 1,
            "display": 2,
            "items": [
                {
                    "title": "<b>중앙도서관</b> 방문기",
                    "description": "조용했다 &amp; 좋았다",
                    "link": "https://blog.example/1",
                    "bloggername": "책벌레",
                    "postdate": "20240103"
                },
                {
                    "title": "주말 나들이",
                    "link": "https://blog.example/2"
                }
            ]
        }"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.items[0].postdate, "20240103");
        // missing fields default to empty, not an error
        assert_eq!(resp.items[1].bloggername, "");
    }

    #[test]
    fn missing_items_field_defaults_to_empty() {
        let resp: SearchResponse = serde_json::from_str(r#"{"total": 0}"#).unwrap();
        assert!(resp.items.is_empty());
    }

    #[test]
    fn flags_take_precedence_over_environment() {
        let creds = Credentials::resolve(Some("id".into()), Some("secret".into())).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret, "secret");
    }
}
