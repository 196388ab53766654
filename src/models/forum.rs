//! Shapes of the Discourse JSON endpoints the crawler reads.
//!
//! Discourse is loose about nulls and has changed the tag representation over
//! time (plain strings vs `{ "name": .. }` objects), so every field is optional
//! and normalised through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TagRef {
    Name(String),
    Object { name: String },
}

fn de_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags: Option<Vec<TagRef>> = Option::deserialize(deserializer)?;
    Ok(tags
        .unwrap_or_default()
        .into_iter()
        .map(|tag| match tag {
            TagRef::Name(name) | TagRef::Object { name } => name,
        })
        .collect())
}

/// One row of a category listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicSummary {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub posts_count: Option<i64>,
    #[serde(default)]
    pub reply_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bumped_at: Option<DateTime<Utc>>,
}

impl TopicSummary {
    pub fn slug(&self) -> &str {
        self.slug.as_deref().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn likes(&self) -> i64 {
        self.like_count.unwrap_or(0).max(0)
    }

    pub fn views(&self) -> i64 {
        self.views.unwrap_or(0).max(0)
    }

    /// Replies exclude the opening post.
    pub fn replies(&self) -> i64 {
        replies_from(self.posts_count, self.reply_count)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_posted_at.or(self.bumped_at).or(self.created_at)
    }
}

fn replies_from(posts_count: Option<i64>, reply_count: Option<i64>) -> i64 {
    match posts_count {
        Some(posts) if posts > 0 => posts - 1,
        _ => reply_count.unwrap_or(0).max(0),
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    topic_list: Option<TopicList>,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<TopicSummary>,
    #[serde(default)]
    more_topics_url: Option<String>,
}

/// A decoded listing page plus the "more pages exist" signal.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub topics: Vec<TopicSummary>,
    pub more: bool,
}

impl ListingPage {
    /// `more` is true when the forum advertises a next page, or when the page came
    /// back full-sized and the forum omitted the link.
    pub fn from_json(body: &[u8], full_page_size: usize) -> serde_json::Result<Self> {
        let response: ListingResponse = serde_json::from_slice(body)?;
        let list = response.topic_list.unwrap_or(TopicList {
            topics: Vec::new(),
            more_topics_url: None,
        });
        let more = list.more_topics_url.is_some() || list.topics.len() >= full_page_size;
        Ok(Self {
            topics: list.topics,
            more,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirstPost {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub cooked: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PostStream {
    #[serde(default)]
    posts: Vec<FirstPost>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UserRef {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TopicDetails {
    #[serde(default)]
    created_by: Option<UserRef>,
}

/// Payload of `/t/<id>.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicDetail {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub posts_count: Option<i64>,
    #[serde(default)]
    pub reply_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bumped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    details: Option<TopicDetails>,
    #[serde(default)]
    post_stream: Option<PostStream>,
}

impl TopicDetail {
    pub fn first_post(&self) -> Option<&FirstPost> {
        self.post_stream.as_ref().and_then(|s| s.posts.first())
    }

    /// Rendered HTML of the opening post, empty when absent.
    pub fn cooked(&self) -> &str {
        self.first_post()
            .and_then(|p| p.cooked.as_deref())
            .unwrap_or_default()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.created_by.as_ref())
            .and_then(|u| u.username.as_deref())
            .filter(|name| !name.is_empty())
    }

    pub fn replies(&self) -> Option<i64> {
        if self.posts_count.is_none() && self.reply_count.is_none() {
            return None;
        }
        Some(replies_from(self.posts_count, self.reply_count))
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_posted_at.or(self.bumped_at).or(self.created_at)
    }
}
