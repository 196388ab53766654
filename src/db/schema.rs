pub const SCHEMA: &str = r#"
-- topics table: one row per forum topic that carried an import link
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL,
    title_norm TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    likes INTEGER NOT NULL DEFAULT 0,
    views INTEGER NOT NULL DEFAULT 0,
    replies INTEGER NOT NULL DEFAULT 0,
    import_url TEXT,
    uses INTEGER,
    has_multi_import INTEGER NOT NULL DEFAULT 0,
    bucket TEXT NOT NULL DEFAULT 'Other',
    excerpt TEXT NOT NULL DEFAULT '',
    excerpt_norm TEXT NOT NULL DEFAULT '',
    cooked_html TEXT,
    permalink TEXT NOT NULL DEFAULT '',
    created_at TEXT,
    updated_at TEXT,
    ingested_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_topics_updated_at ON topics(updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_topics_likes ON topics(likes DESC, views DESC);
CREATE INDEX IF NOT EXISTS idx_topics_title ON topics(title COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_topics_bucket ON topics(bucket);
CREATE INDEX IF NOT EXISTS idx_topics_ingested_at ON topics(ingested_at);

-- topic_tags table: lowercased source tags, replaced wholesale on every upsert
CREATE TABLE IF NOT EXISTS topic_tags (
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (topic_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_topic_tags_tag ON topic_tags(tag);

-- meta table: last_refresh_ts, taxonomy_version
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const META_LAST_REFRESH: &str = "last_refresh_ts";
pub const META_TAXONOMY_VERSION: &str = "taxonomy_version";
