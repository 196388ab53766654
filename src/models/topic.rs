use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blueprint as served to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub excerpt: String,
    pub import_url: Option<String>,
    pub tags: Vec<String>,
    pub bucket: String,
    pub likes: i64,
    pub views: i64,
    pub replies: i64,
    pub uses: Option<i64>,
    pub has_multi_import: bool,
    pub permalink: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// What the extractor pulls out of a topic's opening post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub import_url: String,
    pub import_count: usize,
    pub excerpt: String,
    pub author: String,
    pub uses: Option<i64>,
}

/// A fully ingested topic ready to be upserted.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub likes: i64,
    pub views: i64,
    pub replies: i64,
    pub import_url: Option<String>,
    pub import_count: usize,
    pub uses: Option<i64>,
    pub tags: Vec<String>,
    pub bucket: String,
    pub excerpt: String,
    pub cooked_html: Option<String>,
    pub permalink: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewTopic {
    /// Lowercased, trimmed, de-duplicated tags in first-seen order.
    pub fn normalized_tags(&self) -> Vec<String> {
        normalize_tags(&self.tags)
    }
}

pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Cached first-post body for the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDetail {
    pub cooked: String,
    pub import_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_dedupe_case_insensitively() {
        let tags = vec![
            "Lights".to_string(),
            " lights ".to_string(),
            "ZHA".to_string(),
            "".to_string(),
            "zha".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["lights", "zha"]);
    }
}
