mod forum;
mod query;
mod topic;

pub use forum::{FirstPost, ListingPage, TopicDetail, TopicSummary};
pub use query::{
    ApiError, Filters, ListParams, ListResponse, SortMode, Spotlight, SpotlightAuthor,
    SpotlightTopic, StoreStatus, TopicDetailResponse, TopicPage, TopicQuery,
};
pub use topic::{CachedDetail, Extracted, NewTopic, Topic};
