use std::path::Path;
use std::sync::Arc;

use crate::classify::{Classifier, Taxonomy};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::extract::{ExtractRules, Extractor};
use crate::forum::ForumClient;

use super::locks::TopicLocks;

/// Everything the ingestion and query paths share. Built once at startup and
/// handed to each component; there is no global state behind it.
pub struct IngestContext {
    pub repository: Arc<Repository>,
    pub forum: Arc<ForumClient>,
    pub extractor: Arc<Extractor>,
    pub classifier: Arc<Classifier>,
    pub topic_locks: TopicLocks,
}

impl IngestContext {
    pub fn new(
        repository: Repository,
        forum: ForumClient,
        extractor: Extractor,
        classifier: Classifier,
    ) -> Self {
        Self {
            repository: Arc::new(repository),
            forum: Arc::new(forum),
            extractor: Arc::new(extractor),
            classifier: Arc::new(classifier),
            topic_locks: TopicLocks::default(),
        }
    }

    /// Opens the store and wires the live forum client. Stored buckets are
    /// brought in line with the active taxonomy before anything reads them.
    pub async fn open(config: &Config) -> Result<Arc<Self>> {
        let taxonomy = Taxonomy::load_or_default(config.taxonomy_path.as_deref().map(Path::new))?;
        let classifier = Classifier::new(&taxonomy)?;
        let extractor = Extractor::new(ExtractRules::from_config(&config.extract))?;
        let forum = ForumClient::new(&config.forum)?;
        let repository = Repository::new(&config.db_path).await?;

        let ctx = Self::new(repository, forum, extractor, classifier);
        if let Some(moved) = ctx.repository.sync_taxonomy(Arc::clone(&ctx.classifier)).await? {
            tracing::info!(
                "Taxonomy {} activated, reclassified {} topic(s)",
                ctx.classifier.version(),
                moved
            );
        }
        Ok(Arc::new(ctx))
    }
}
