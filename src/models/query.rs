use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    New,
    #[default]
    Likes,
    Title,
}

impl SortMode {
    /// Recognises the public sort names plus the legacy aliases older panels sent.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "newest" => Some(Self::New),
            "likes" | "popular" => Some(Self::Likes),
            "title" | "a_z" | "az" => Some(Self::Title),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Likes => "likes",
            Self::Title => "title",
        }
    }

    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            Self::New => "t.updated_at DESC, t.id DESC",
            Self::Title => "t.title COLLATE NOCASE ASC, t.id ASC",
            Self::Likes => "t.likes DESC, t.views DESC, t.uses DESC NULLS LAST, t.id DESC",
        }
    }
}

/// Parameters for a store-level query. Filters are already validated.
#[derive(Debug, Clone, Default)]
pub struct TopicQuery {
    pub text: String,
    pub tag: Option<String>,
    pub bucket: Option<String>,
    pub sort: SortMode,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicPage {
    pub items: Vec<Topic>,
    pub has_more: bool,
}

/// Inbound list request, as received from the HTTP layer or the CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: i64,
    pub q: String,
    pub bucket: String,
    pub tag: String,
    pub sort: String,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 0,
            q: String::new(),
            bucket: String::new(),
            tag: String::new(),
            sort: SortMode::New.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListResponse {
    pub items: Vec<Topic>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ListResponse {
    pub fn failed(err: &AppError) -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            error: Some(ApiError::from(err)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filters {
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicDetailResponse {
    pub cooked: String,
    pub import_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Size and freshness of the local catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatus {
    pub topics: i64,
    pub last_refresh: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpotlightTopic {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub likes: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpotlightAuthor {
    pub author: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Spotlight {
    pub most_popular: Option<SpotlightTopic>,
    pub most_uploaded: Option<SpotlightAuthor>,
    pub most_recent: Option<SpotlightTopic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}
