use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::RefreshConfig;
use crate::error::Result;
use crate::models::{Extracted, NewTopic, TopicDetail, TopicSummary};

use super::context::IngestContext;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub pages: u32,
    pub discovered: usize,
    pub upserted: usize,
    pub not_blueprints: usize,
    pub failed: usize,
    pub pruned: usize,
    /// A listing page failed, so the walk stopped before its bound.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep holds the coordinator; this request was folded into it.
    AlreadyRunning,
    NotDue,
    Completed(SweepReport),
}

enum TopicOutcome {
    Ingested(Box<NewTopic>),
    NotBlueprint,
    Failed,
}

/// Runs sweeps: listing walk, bounded detail fan-out, one batch upsert.
pub struct RefreshCoordinator {
    ctx: Arc<IngestContext>,
    settings: RefreshConfig,
    running: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(ctx: Arc<IngestContext>, settings: RefreshConfig) -> Self {
        Self {
            ctx,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Runs one sweep if the refresh gate allows it. Only store failures are
    /// returned as errors; page and topic failures shrink the report instead.
    pub async fn sweep(&self, force: bool) -> Result<SweepOutcome> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::debug!("Sweep already in progress, coalescing request");
            return Ok(SweepOutcome::AlreadyRunning);
        };

        let span = tracing::info_span!("sweep", forced = force);
        self.run_sweep(force).instrument(span).await
    }

    async fn run_sweep(&self, force: bool) -> Result<SweepOutcome> {
        let repository = &self.ctx.repository;
        if !repository.refresh_due(self.settings.min_interval(), force).await? {
            tracing::debug!("Refresh not due yet");
            return Ok(SweepOutcome::NotDue);
        }

        let mut report = SweepReport::default();
        let summaries = self.walk_listing(&mut report).await;
        report.discovered = summaries.len();

        let outcomes: Vec<TopicOutcome> = stream::iter(summaries)
            .map(|summary| self.ingest_topic(summary))
            .buffer_unordered(self.settings.detail_concurrency.max(1))
            .collect()
            .await;

        let mut topics = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                TopicOutcome::Ingested(topic) => topics.push(*topic),
                TopicOutcome::NotBlueprint => report.not_blueprints += 1,
                TopicOutcome::Failed => report.failed += 1,
            }
        }

        report.upserted = repository.upsert_topics(topics).await?;

        if self.settings.prune_days > 0 {
            match repository.prune_older_than(self.settings.prune_days).await {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => tracing::warn!("Failed to prune old topics: {}", e),
            }
        }
        repository.mark_refreshed().await?;

        tracing::info!(
            "Sweep finished: {} page(s), {} discovered, {} upserted, {} without import link, {} failed, {} pruned",
            report.pages,
            report.discovered,
            report.upserted,
            report.not_blueprints,
            report.failed,
            report.pruned
        );
        Ok(SweepOutcome::Completed(report))
    }

    /// Walks listing pages in order until the page or topic bound, a short
    /// page, or the first failing page.
    async fn walk_listing(&self, report: &mut SweepReport) -> Vec<TopicSummary> {
        let forum = &self.ctx.forum;
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();

        for page in 0..self.settings.max_pages {
            let listing = match forum.fetch_listing_page(page).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!("Stopping listing walk at page {}: {}", page, e);
                    report.partial = true;
                    break;
                }
            };
            report.pages += 1;

            let short = listing.topics.len() < forum.page_size();
            for summary in listing.topics {
                if summaries.len() >= self.settings.max_topics {
                    break;
                }
                if seen.insert(summary.id) {
                    summaries.push(summary);
                }
            }

            if short || !listing.more || summaries.len() >= self.settings.max_topics {
                break;
            }
        }

        summaries
    }

    async fn ingest_topic(&self, summary: TopicSummary) -> TopicOutcome {
        let id = summary.id;
        let _guard = self.ctx.topic_locks.lock(id).await;

        let detail = match self.ctx.forum.fetch_topic_detail(id).await {
            Ok(detail) => detail,
            Err(e) if e.is_transient() => {
                tracing::warn!("Skipping topic {}: {}", id, e);
                return TopicOutcome::Failed;
            }
            Err(e) => {
                tracing::debug!("Skipping topic {}: {}", id, e);
                return TopicOutcome::Failed;
            }
        };

        let Some(extracted) = self.ctx.extractor.extract(&detail) else {
            tracing::debug!("Topic {} has no import link", id);
            return TopicOutcome::NotBlueprint;
        };

        TopicOutcome::Ingested(Box::new(self.assemble(summary, detail, extracted)))
    }

    /// Merges listing counters with the detail payload. Listing values win
    /// where both exist, since they are what the forum shows in its index.
    fn assemble(&self, summary: TopicSummary, detail: TopicDetail, extracted: Extracted) -> NewTopic {
        let slug = non_empty(summary.slug(), detail.slug.as_deref());
        let title = non_empty(summary.title(), detail.title.as_deref());
        let tags = if summary.tags.is_empty() {
            detail.tags.clone()
        } else {
            summary.tags.clone()
        };

        let bucket = self.ctx.classifier.classify(&title, &tags).to_string();
        let permalink = self.ctx.forum.topic_url(summary.id, &slug);

        NewTopic {
            id: summary.id,
            likes: summary.like_count.or(detail.like_count).unwrap_or(0),
            views: summary.views.or(detail.views).unwrap_or(0),
            replies: detail.replies().unwrap_or_else(|| summary.replies()),
            import_url: Some(extracted.import_url),
            import_count: extracted.import_count,
            uses: extracted.uses,
            author: extracted.author,
            excerpt: extracted.excerpt,
            cooked_html: Some(detail.cooked().to_string()),
            created_at: summary.created_at.or(detail.created_at),
            updated_at: summary.updated_at().or_else(|| detail.updated_at()),
            slug,
            title,
            tags,
            bucket,
            permalink,
        }
    }
}

fn non_empty(primary: &str, fallback: Option<&str>) -> String {
    if primary.trim().is_empty() {
        fallback.unwrap_or_default().to_string()
    } else {
        primary.to_string()
    }
}
