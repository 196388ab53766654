//! Shared fakes for unit tests: a URL-routed transport and a fully wired
//! ingestion context over a temporary database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::classify::{Classifier, Taxonomy};
use crate::config::{BackoffConfig, ForumConfig};
use crate::db::Repository;
use crate::extract::{ExtractRules, Extractor};
use crate::forum::{ForumClient, RawResponse, Transport, TransportError};
use crate::ingest::IngestContext;
use crate::models::NewTopic;

pub const BASE: &str = "https://community.home-assistant.io";
pub const IMPORT: &str =
    "https://my.home-assistant.io/redirect/blueprint_import/?blueprint_url=https%3A%2F%2Fgist.github.com%2Fx";

/// Answers each URL with a fixed response; unknown URLs get a 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, RawResponse>>,
    failing: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl RoutedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.routes.lock().unwrap().insert(
            url.into(),
            RawResponse {
                status,
                body: body.into().into_bytes(),
            },
        );
    }

    /// Makes `url` fail at the network level.
    pub fn fail(&self, url: impl Into<String>) {
        self.failing.lock().unwrap().push(url.into());
    }

    pub fn listing(&self, page: u32, body: impl Into<String>) {
        self.route(
            format!("{BASE}/c/blueprints-exchange/53.json?page={page}"),
            200,
            body,
        );
    }

    pub fn detail(&self, id: i64, body: impl Into<String>) {
        self.route(format!("{BASE}/t/{id}.json"), 200, body);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(fragment)).count()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(TransportError {
                message: "connection reset".into(),
                timed_out: false,
            });
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(RawResponse {
                status: 404,
                body: b"not found".to_vec(),
            }))
    }
}

pub fn fast_forum_config() -> ForumConfig {
    ForumConfig {
        min_request_interval_ms: 0,
        page_size: 3,
        backoff: BackoffConfig {
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 5,
            max_retries: 2,
        },
        ..ForumConfig::default()
    }
}

pub async fn context(transport: Arc<RoutedTransport>) -> (TempDir, Arc<IngestContext>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blueprints.db");
    let repository = Repository::new(path.to_str().expect("utf8 path"))
        .await
        .expect("repository");
    let forum = ForumClient::with_transport(&fast_forum_config(), transport).expect("forum client");
    let extractor = Extractor::new(ExtractRules::default()).expect("extractor");
    let classifier = Classifier::new(&Taxonomy::default()).expect("classifier");

    let ctx = IngestContext::new(repository, forum, extractor, classifier);
    (dir, Arc::new(ctx))
}

pub fn listing_json(topics: &[(i64, &str)]) -> String {
    let topics: Vec<_> = topics
        .iter()
        .map(|(id, title)| {
            serde_json::json!({
                "id": id,
                "slug": format!("topic-{id}"),
                "title": title,
                "tags": ["automation"],
                "like_count": id * 2,
                "views": id * 10,
                "posts_count": 3,
                "created_at": "2024-05-01T10:00:00.000Z",
                "last_posted_at": "2024-05-02T10:00:00.000Z",
            })
        })
        .collect();
    serde_json::json!({"topic_list": {"topics": topics}}).to_string()
}

pub fn detail_json(id: i64, cooked: &str) -> String {
    serde_json::json!({
        "id": id,
        "slug": format!("topic-{id}"),
        "title": format!("Topic {id}"),
        "details": {"created_by": {"username": "alice"}},
        "post_stream": {"posts": [{"username": "alice", "cooked": cooked}]}
    })
    .to_string()
}

pub fn blueprint_post(text: &str) -> String {
    format!(r#"<p>{text}</p><p><a href="{IMPORT}">Import</a></p>"#)
}

pub fn new_topic(id: i64, title: &str) -> NewTopic {
    NewTopic {
        id,
        slug: format!("topic-{id}"),
        title: title.to_string(),
        author: "alice".to_string(),
        likes: 0,
        views: 0,
        replies: 0,
        import_url: Some(IMPORT.to_string()),
        import_count: 1,
        uses: None,
        tags: Vec::new(),
        bucket: "Other".to_string(),
        excerpt: String::new(),
        cooked_html: None,
        permalink: format!("{BASE}/t/topic-{id}/{id}"),
        created_at: None,
        updated_at: None,
    }
}
