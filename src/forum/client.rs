use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::Instrument;
use url::Url;

use crate::config::{BackoffConfig, ForumConfig};
use crate::error::{AppError, FetchError, Result};
use crate::models::{ListingPage, TopicDetail};

use super::pacer::Pacer;
use super::transport::{ReqwestTransport, Transport};

const MAX_ERROR_BODY_CHARS: usize = 200;
const TOO_MANY_REQUESTS: u16 = 429;

/// Client for the forum's JSON API: category listing pages and topic details.
pub struct ForumClient {
    transport: Arc<dyn Transport>,
    pacer: Arc<Pacer>,
    backoff: BackoffConfig,
    base_url: Url,
    category_slug: String,
    category_id: u32,
    page_size: usize,
}

impl ForumClient {
    pub fn new(config: &ForumConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &ForumConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("forum base_url {:?}: {e}", config.base_url)))?;

        Ok(Self {
            transport,
            pacer: Arc::new(Pacer::new(config.min_request_interval())),
            backoff: config.backoff,
            base_url,
            category_slug: config.category_slug.clone(),
            category_id: config.category_id,
            page_size: config.page_size,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Human-facing URL of a topic, with the slug when one is known.
    pub fn topic_url(&self, id: i64, slug: &str) -> String {
        let slug = slug.trim();
        if slug.is_empty() {
            format!("{}/t/{}", self.base_url(), id)
        } else {
            format!("{}/t/{}/{}", self.base_url(), urlencoding::encode(slug), id)
        }
    }

    fn listing_url(&self, page: u32) -> String {
        format!(
            "{}/c/{}/{}.json?page={}",
            self.base_url(),
            self.category_slug,
            self.category_id,
            page
        )
    }

    fn detail_url(&self, id: i64) -> String {
        format!("{}/t/{}.json", self.base_url(), id)
    }

    /// Fetches one 0-indexed page of the category listing.
    pub async fn fetch_listing_page(&self, page: u32) -> std::result::Result<ListingPage, FetchError> {
        let url = self.listing_url(page);
        let body = self.get_with_backoff(&url).await?;
        ListingPage::from_json(&body, self.page_size).map_err(|source| FetchError::Parse { url, source })
    }

    pub async fn fetch_topic_detail(&self, id: i64) -> std::result::Result<TopicDetail, FetchError> {
        let url = self.detail_url(id);
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, FetchError> {
        let body = self.get_with_backoff(url).await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })
    }

    /// GETs `url`, retrying only on 429 with exponential backoff. Every attempt
    /// passes through the pacer first.
    async fn get_with_backoff(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let span = tracing::debug_span!("forum_get", url);
        self.attempt_until_done(url).instrument(span).await
    }

    async fn attempt_until_done(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            self.pacer.wait().await;

            let response = self.transport.get(url).await.map_err(|e| FetchError::Transient {
                url: url.to_string(),
                attempts: attempt + 1,
                reason: e.to_string(),
            })?;

            if (200..300).contains(&response.status) {
                return Ok(response.body);
            }

            if response.status == TOO_MANY_REQUESTS {
                if attempt < self.backoff.max_retries {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Rate limited by forum (attempt {}), retrying in {:?}",
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    reason: "HTTP 429 Too Many Requests".to_string(),
                });
            }

            let body = String::from_utf8_lossy(&response.body);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::{RawResponse, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    type Scripted = std::result::Result<RawResponse, TransportError>;

    /// Replays canned responses in order and records requested URLs.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Scripted {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(RawResponse {
                status: 500,
                body: b"script exhausted".to_vec(),
            }))
        }
    }

    fn ok(body: &str) -> Scripted {
        Ok(RawResponse { status: 200, body: body.as_bytes().to_vec() })
    }

    fn status(code: u16) -> Scripted {
        Ok(RawResponse { status: code, body: b"slow down".to_vec() })
    }

    fn fast_config() -> ForumConfig {
        ForumConfig {
            min_request_interval_ms: 0,
            backoff: BackoffConfig {
                base_delay_ms: 1,
                multiplier: 2.0,
                max_delay_ms: 5,
                max_retries: 4,
            },
            ..ForumConfig::default()
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> ForumClient {
        ForumClient::with_transport(&fast_config(), transport).expect("client")
    }

    const DETAIL: &str = r#"{"id": 5, "title": "T", "post_stream": {"posts": [{"cooked": "<p>x</p>"}]}}"#;

    #[tokio::test]
    async fn recovers_after_three_rate_limits() {
        let transport = ScriptedTransport::new(vec![status(429), status(429), status(429), ok(DETAIL)]);
        let detail = assert_ok!(client(transport.clone()).fetch_topic_detail(5).await);
        assert_eq!(detail.id, 5);
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test]
    async fn exhausting_retries_is_transient() {
        let transport = ScriptedTransport::new(vec![status(429); 5]);
        let err = assert_err!(client(transport.clone()).fetch_topic_detail(5).await);
        assert!(err.is_transient(), "{err}");
        assert!(matches!(err, FetchError::Transient { attempts: 5, .. }));
        assert_eq!(transport.calls().len(), 5);
    }

    #[tokio::test]
    async fn other_statuses_fail_without_retry() {
        let transport = ScriptedTransport::new(vec![status(404), ok(DETAIL)]);
        let err = assert_err!(client(transport.clone()).fetch_topic_detail(5).await);
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let transport = ScriptedTransport::new(vec![ok("<html>maintenance</html>")]);
        let err = assert_err!(client(transport).fetch_topic_detail(5).await);
        assert!(matches!(err, FetchError::Parse { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn network_failure_is_transient() {
        let transport = ScriptedTransport::new(vec![Err(TransportError {
            message: "connection reset".into(),
            timed_out: false,
        })]);
        let err = assert_err!(client(transport).fetch_listing_page(0).await);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn listing_uses_category_url_and_page_param() {
        let transport = ScriptedTransport::new(vec![ok(r#"{"topic_list": {"topics": [{"id": 1}]}}"#)]);
        let page = assert_ok!(client(transport.clone()).fetch_listing_page(2).await);
        assert_eq!(page.topics.len(), 1);
        assert!(!page.more);
        assert_eq!(
            transport.calls(),
            vec!["https://community.home-assistant.io/c/blueprints-exchange/53.json?page=2"]
        );
    }

    #[test]
    fn topic_urls_include_slug_when_known() {
        let c = client(ScriptedTransport::new(Vec::new()));
        assert_eq!(c.topic_url(9, "motion-lights"), "https://community.home-assistant.io/t/motion-lights/9");
        assert_eq!(c.topic_url(9, ""), "https://community.home-assistant.io/t/9");
    }
}
