use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;

use crate::config::ForumConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// A request that never produced a status line (timeout, DNS, TLS, reset).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out {
            write!(f, "timed out: {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// The single outbound GET the forum client needs. Kept as a trait so the
/// retry and pacing logic can be driven by scripted responses in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ForumConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| AppError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, TransportError> {
        let to_err = |e: reqwest::Error| TransportError {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(to_err)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(to_err)?.to_vec();
        Ok(RawResponse { status, body })
    }
}
