use regex::Regex;

use crate::error::{AppError, Result};

use super::taxonomy::{Taxonomy, OTHER_BUCKET};

struct CompiledBucket {
    name: String,
    keywords: Vec<String>,
}

struct CompiledFallback {
    bucket: String,
    pattern: Regex,
}

/// Maps a topic's title and tags onto one bucket of the taxonomy.
pub struct Classifier {
    version: String,
    names: Vec<String>,
    buckets: Vec<CompiledBucket>,
    fallbacks: Vec<CompiledFallback>,
}

impl Classifier {
    pub fn new(taxonomy: &Taxonomy) -> Result<Self> {
        taxonomy.validate()?;

        let names: Vec<String> = taxonomy
            .bucket_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let buckets = taxonomy
            .buckets
            .iter()
            .map(|b| CompiledBucket {
                name: b.name.clone(),
                keywords: b
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();

        let mut fallbacks = Vec::with_capacity(taxonomy.fallbacks.len());
        for fb in &taxonomy.fallbacks {
            let words: Vec<String> = fb
                .words
                .iter()
                .map(|w| w.trim())
                .filter(|w| !w.is_empty())
                .map(regex::escape)
                .collect();
            if words.is_empty() {
                continue;
            }
            let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|")))
                .map_err(|e| AppError::Config(format!("fallback for {:?}: {e}", fb.bucket)))?;
            let bucket = names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(&fb.bucket))
                .cloned()
                .unwrap_or_else(|| OTHER_BUCKET.to_string());
            fallbacks.push(CompiledFallback { bucket, pattern });
        }

        Ok(Self {
            version: taxonomy.version.clone(),
            names,
            buckets,
            fallbacks,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bucket names in declaration order, `Other` last.
    pub fn bucket_names(&self) -> &[String] {
        &self.names
    }

    /// Case-insensitive lookup returning the canonical bucket spelling.
    pub fn canonical_bucket(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Always returns a member of [`Self::bucket_names`].
    pub fn classify(&self, title: &str, tags: &[String]) -> &str {
        let tag_set: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        let mut text = title.to_lowercase();
        for tag in &tag_set {
            text.push(' ');
            text.push_str(tag);
        }

        for bucket in &self.buckets {
            let hit = bucket
                .keywords
                .iter()
                .any(|k| text.contains(k.as_str()) || tag_set.contains(k));
            if hit {
                return &bucket.name;
            }
        }

        self.fallbacks
            .iter()
            .find(|fb| fb.pattern.is_match(&text))
            .map(|fb| fb.bucket.as_str())
            .unwrap_or(OTHER_BUCKET)
    }
}
