use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::ingest::IngestContext;
use crate::models::{
    ApiError, CachedDetail, Filters, ListParams, ListResponse, SortMode, Spotlight, StoreStatus,
    TopicDetailResponse, TopicQuery,
};

/// Largest page number accepted; anything above reads as an empty page anyway.
const MAX_PAGE: i64 = u32::MAX as i64;

/// Validates inbound requests and answers them from the store. Every method
/// returns a well-formed envelope; failures land in its `error` field.
pub struct QueryService {
    ctx: Arc<IngestContext>,
    settings: QueryConfig,
}

impl QueryService {
    pub fn new(ctx: Arc<IngestContext>, settings: QueryConfig) -> Self {
        Self { ctx, settings }
    }

    pub async fn list(&self, params: ListParams) -> ListResponse {
        let query = self.topic_query(&params);
        match self.ctx.repository.query_topics(query).await {
            Ok(page) => ListResponse {
                items: page.items,
                has_more: page.has_more,
                error: None,
            },
            Err(e) => {
                tracing::warn!("List query failed: {}", e);
                ListResponse::failed(&e)
            }
        }
    }

    /// Curated bucket names, `Other` last.
    pub fn filters(&self) -> Filters {
        Filters {
            tags: self.ctx.classifier.bucket_names().to_vec(),
            error: None,
        }
    }

    /// Raw source tags present on listed topics.
    pub async fn tags(&self) -> Filters {
        match self.ctx.repository.distinct_tags().await {
            Ok(tags) => Filters { tags, error: None },
            Err(e) => {
                tracing::warn!("Tag query failed: {}", e);
                Filters {
                    tags: Vec::new(),
                    error: Some(ApiError::from(&e)),
                }
            }
        }
    }

    pub async fn topic_detail(&self, id: i64) -> TopicDetailResponse {
        match self.load_detail(id).await {
            Ok(detail) => TopicDetailResponse {
                cooked: detail.cooked,
                import_url: detail.import_url,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Detail for topic {} unavailable: {}", id, e);
                TopicDetailResponse {
                    error: Some(ApiError::from(&e)),
                    ..TopicDetailResponse::default()
                }
            }
        }
    }

    /// Absolute forum URL for a topic. A missing slug is looked up in the store.
    pub async fn redirect_target(&self, id: i64, slug: &str) -> String {
        let forum = &self.ctx.forum;
        if !slug.trim().is_empty() {
            return forum.topic_url(id, slug);
        }
        match self.ctx.repository.get_topic(id).await {
            Ok(Some(topic)) => forum.topic_url(id, &topic.slug),
            Ok(None) => forum.topic_url(id, ""),
            Err(e) => {
                tracing::warn!("Slug lookup for topic {} failed: {}", id, e);
                forum.topic_url(id, "")
            }
        }
    }

    pub async fn spotlight(&self) -> Spotlight {
        if !self.settings.enable_spotlight {
            return Spotlight::default();
        }
        match self.ctx.repository.spotlight().await {
            Ok(spotlight) => spotlight,
            Err(e) => {
                tracing::warn!("Spotlight query failed: {}", e);
                Spotlight {
                    error: Some(ApiError::from(&e)),
                    ..Spotlight::default()
                }
            }
        }
    }

    pub async fn status(&self) -> StoreStatus {
        let repository = &self.ctx.repository;
        let counted = match repository.count_topics().await {
            Ok(topics) => repository.last_refresh().await.map(|last| (topics, last)),
            Err(e) => Err(e),
        };
        match counted {
            Ok((topics, last_refresh)) => StoreStatus {
                topics,
                last_refresh,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Status query failed: {}", e);
                StoreStatus {
                    error: Some(ApiError::from(&e)),
                    ..StoreStatus::default()
                }
            }
        }
    }

    fn topic_query(&self, params: &ListParams) -> TopicQuery {
        let page = params.page.clamp(0, MAX_PAGE) as usize;
        let limit = self.settings.page_size.max(1);

        let bucket = self
            .ctx
            .classifier
            .canonical_bucket(&params.bucket)
            .map(str::to_string);
        if bucket.is_none() && !params.bucket.trim().is_empty() {
            tracing::debug!("Ignoring unknown bucket {:?}", params.bucket);
        }

        let tag = Some(params.tag.trim().to_lowercase()).filter(|t| !t.is_empty());

        TopicQuery {
            text: params.q.trim().to_string(),
            tag,
            bucket,
            sort: SortMode::parse(&params.sort).unwrap_or(SortMode::New),
            limit,
            offset: page.saturating_mul(limit),
        }
    }

    /// Cached body when present, otherwise one live fetch per topic at a time.
    async fn load_detail(&self, id: i64) -> Result<CachedDetail> {
        let repository = &self.ctx.repository;
        if let Some(cached) = repository.get_cached_detail(id).await? {
            return Ok(cached);
        }

        let _guard = self.ctx.topic_locks.lock(id).await;
        // Whoever held the lock before us may have filled the cache.
        if let Some(cached) = repository.get_cached_detail(id).await? {
            return Ok(cached);
        }

        let detail = self.ctx.forum.fetch_topic_detail(id).await?;
        let cooked = detail.cooked().to_string();
        let (import_url, excerpt) = match self.ctx.extractor.extract(&detail) {
            Some(extracted) => (Some(extracted.import_url), extracted.excerpt),
            None => (None, self.ctx.extractor.excerpt(&cooked)),
        };

        if !repository.set_cached_detail(id, cooked.clone(), excerpt).await? {
            tracing::debug!("Topic {} is not stored, serving detail uncached", id);
        }
        Ok(CachedDetail { cooked, import_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        blueprint_post, context, detail_json, new_topic, RoutedTransport, BASE, IMPORT,
    };
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn service(transport: Arc<RoutedTransport>, settings: QueryConfig) -> (TempDir, QueryService) {
        let (dir, ctx) = context(transport).await;
        (dir, QueryService::new(ctx, settings))
    }

    fn params() -> ListParams {
        ListParams::default()
    }

    #[tokio::test]
    async fn list_clamps_page_and_defaults_unknown_sort_to_new() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        let mut old = new_topic(1, "Zeta");
        old.likes = 100;
        old.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut recent = new_topic(2, "Alpha");
        recent.updated_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        svc.ctx.repository.upsert_topics(vec![old, recent]).await.expect("upsert");

        let response = svc
            .list(ListParams {
                page: -4,
                sort: "sideways".into(),
                ..params()
            })
            .await;

        assert!(response.error.is_none());
        assert!(!response.has_more);
        assert_eq!(response.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);

        let by_likes = svc.list(ListParams { sort: "likes".into(), ..params() }).await;
        assert_eq!(by_likes.items[0].id, 1);
    }

    #[tokio::test]
    async fn list_pages_with_configured_size() {
        let settings = QueryConfig {
            page_size: 10,
            ..QueryConfig::default()
        };
        let (_dir, svc) = service(RoutedTransport::new(), settings).await;
        let topics = (1..=25).map(|i| new_topic(i, &format!("Blueprint {i}"))).collect();
        svc.ctx.repository.upsert_topics(topics).await.expect("upsert");

        let first = svc.list(params()).await;
        assert_eq!(first.items.len(), 10);
        assert!(first.has_more);

        let third = svc.list(ListParams { page: 2, ..params() }).await;
        assert_eq!(third.items.len(), 5);
        assert!(!third.has_more);
    }

    #[tokio::test]
    async fn bucket_filter_is_canonicalised_or_ignored() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        let mut lamp = new_topic(1, "Lamp");
        lamp.bucket = "Lighting".into();
        let mut heat = new_topic(2, "Heat");
        heat.bucket = "Climate".into();
        heat.tags = vec!["Thermostat".into()];
        svc.ctx.repository.upsert_topics(vec![lamp, heat]).await.expect("upsert");

        let lighting = svc.list(ListParams { bucket: "lighting".into(), ..params() }).await;
        assert_eq!(lighting.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);

        let unknown = svc.list(ListParams { bucket: "Spaceships".into(), ..params() }).await;
        assert_eq!(unknown.items.len(), 2);

        let tagged = svc.list(ListParams { tag: "THERMOSTAT".into(), ..params() }).await;
        assert_eq!(tagged.items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

        assert_eq!(svc.tags().await.tags, vec!["thermostat"]);
    }

    #[tokio::test]
    async fn filters_list_curated_buckets() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        let filters = svc.filters();
        assert_eq!(filters.tags.first().map(String::as_str), Some("Safety"));
        assert_eq!(filters.tags.last().map(String::as_str), Some("Other"));
    }

    #[tokio::test]
    async fn detail_is_fetched_once_then_served_from_cache() {
        let transport = RoutedTransport::new();
        transport.detail(5, detail_json(5, &blueprint_post("Fresh body")));
        let (_dir, svc) = service(transport.clone(), QueryConfig::default()).await;
        svc.ctx.repository.upsert_topics(vec![new_topic(5, "T")]).await.expect("upsert");

        let (a, b) = tokio::join!(svc.topic_detail(5), svc.topic_detail(5));
        assert!(a.error.is_none() && b.error.is_none());
        assert_eq!(a.cooked, b.cooked);
        assert!(a.cooked.contains("Fresh body"));
        assert_eq!(a.import_url.as_deref(), Some(IMPORT));

        let again = svc.topic_detail(5).await;
        assert_eq!(again.cooked, a.cooked);
        assert_eq!(transport.calls_to("/t/5.json"), 1);

        let stored = svc.ctx.repository.get_topic(5).await.expect("get").expect("topic");
        assert_eq!(stored.excerpt, "Fresh body Import");
    }

    #[tokio::test]
    async fn detail_failure_returns_error_envelope() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        let response = svc.topic_detail(404).await;
        assert!(response.cooked.is_empty());
        assert_eq!(response.import_url, None);
        assert_eq!(response.error.map(|e| e.kind), Some("fetch".to_string()));
    }

    #[tokio::test]
    async fn redirect_uses_given_or_stored_slug() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        svc.ctx.repository.upsert_topics(vec![new_topic(9, "T")]).await.expect("upsert");

        assert_eq!(svc.redirect_target(9, "custom").await, format!("{BASE}/t/custom/9"));
        assert_eq!(svc.redirect_target(9, "").await, format!("{BASE}/t/topic-9/9"));
        assert_eq!(svc.redirect_target(77, "").await, format!("{BASE}/t/77"));
    }

    #[tokio::test]
    async fn status_reports_size_and_last_refresh() {
        let (_dir, svc) = service(RoutedTransport::new(), QueryConfig::default()).await;
        let empty = svc.status().await;
        assert_eq!(empty.topics, 0);
        assert!(empty.last_refresh.is_none());

        svc.ctx.repository.upsert_topics(vec![new_topic(1, "A")]).await.expect("upsert");
        svc.ctx.repository.mark_refreshed().await.expect("stamp");

        let status = svc.status().await;
        assert_eq!(status.topics, 1);
        assert!(status.last_refresh.is_some());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn spotlight_can_be_disabled() {
        let settings = QueryConfig {
            enable_spotlight: false,
            ..QueryConfig::default()
        };
        let (_dir, svc) = service(RoutedTransport::new(), settings).await;
        let mut popular = new_topic(1, "Popular");
        popular.likes = 50;
        svc.ctx.repository.upsert_topics(vec![popular]).await.expect("upsert");

        assert_eq!(svc.spotlight().await, Spotlight::default());
    }
}
