use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::classify::Classifier;
use crate::error::Result;
use crate::models::{
    CachedDetail, NewTopic, Spotlight, SpotlightAuthor, SpotlightTopic, Topic, TopicPage,
    TopicQuery,
};

use super::schema::{META_LAST_REFRESH, META_TAXONOMY_VERSION, SCHEMA};

const TAG_SEPARATOR: char = '\u{1f}';

/// Rows without an import link are never part of the public listing.
const LISTED: &str = "t.import_url IS NOT NULL AND t.import_url <> ''";

const TAGS_SUBQUERY: &str = "(SELECT group_concat(tag, char(31)) FROM (SELECT tag FROM topic_tags WHERE topic_id = t.id ORDER BY tag))";

const UPSERT_TOPIC: &str = r#"INSERT INTO topics (id, slug, title, author, likes, views, replies, import_url, uses,
                                has_multi_import, bucket, excerpt, cooked_html, permalink, created_at, updated_at,
                                title_norm, excerpt_norm)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
       ON CONFLICT(id) DO UPDATE SET
           slug = excluded.slug,
           title = excluded.title,
           author = excluded.author,
           likes = excluded.likes,
           views = excluded.views,
           replies = excluded.replies,
           import_url = excluded.import_url,
           uses = excluded.uses,
           has_multi_import = excluded.has_multi_import,
           bucket = excluded.bucket,
           excerpt = excluded.excerpt,
           cooked_html = COALESCE(excluded.cooked_html, topics.cooked_html),
           permalink = excluded.permalink,
           created_at = excluded.created_at,
           updated_at = excluded.updated_at,
           title_norm = excluded.title_norm,
           excerpt_norm = excluded.excerpt_norm,
           ingested_at = datetime('now')"#;

const UPSERT_META: &str =
    "INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// SQLite-backed topic store. Writes go through one connection and reads through
/// another, so WAL lets listings proceed while a sweep commits.
pub struct Repository {
    writer: Connection,
    reader: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(db_path).await?;
        writer
            .call(|conn| {
                configure(conn)?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        let reader = Connection::open(db_path).await?;
        reader
            .call(|conn| {
                configure(conn)?;
                conn.pragma_update(None, "query_only", true)?;
                Ok(())
            })
            .await?;

        Ok(Self { writer, reader })
    }

    // Topic writes

    /// Inserts or overwrites each topic by id in one transaction. Tag sets are
    /// replaced, never merged.
    pub async fn upsert_topics(&self, topics: Vec<NewTopic>) -> Result<usize> {
        if topics.is_empty() {
            return Ok(0);
        }

        let count = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut upsert = tx.prepare(UPSERT_TOPIC)?;
                    let mut clear_tags = tx.prepare("DELETE FROM topic_tags WHERE topic_id = ?1")?;
                    let mut insert_tag =
                        tx.prepare("INSERT OR IGNORE INTO topic_tags (topic_id, tag) VALUES (?1, ?2)")?;

                    for topic in &topics {
                        upsert.execute(params![
                            topic.id,
                            topic.slug,
                            topic.title,
                            topic.author,
                            topic.likes.max(0),
                            topic.views.max(0),
                            topic.replies.max(0),
                            topic.import_url,
                            topic.uses,
                            topic.import_count > 1,
                            topic.bucket,
                            topic.excerpt,
                            topic.cooked_html,
                            topic.permalink,
                            format_datetime(topic.created_at),
                            format_datetime(topic.updated_at),
                            fold_case(&topic.title),
                            fold_case(&topic.excerpt),
                        ])?;
                        clear_tags.execute(params![topic.id])?;
                        for tag in topic.normalized_tags() {
                            insert_tag.execute(params![topic.id, tag])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(topics.len())
            })
            .await?;
        Ok(count)
    }

    /// Replaces the cached first-post body. Returns false when the topic is unknown.
    pub async fn set_cached_detail(&self, id: i64, html: String, excerpt: String) -> Result<bool> {
        let updated = self
            .writer
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE topics SET cooked_html = ?2, excerpt = ?3, excerpt_norm = ?4 WHERE id = ?1",
                    params![id, html, excerpt, fold_case(&excerpt)],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(updated)
    }

    /// Deletes topics no sweep has seen for `days`. Forum activity does not
    /// matter: a quiet blueprint stays as long as the listing still carries it.
    /// Tags cascade.
    pub async fn prune_older_than(&self, days: u32) -> Result<usize> {
        let offset = format!("-{days} days");
        let removed = self
            .writer
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM topics WHERE ingested_at < datetime('now', ?1)",
                    params![offset],
                )?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    /// Recomputes every stored bucket when the taxonomy version changed since the
    /// last run. Returns the number of rows whose bucket moved, or `None` when
    /// the stored version already matches.
    pub async fn sync_taxonomy(&self, classifier: Arc<Classifier>) -> Result<Option<usize>> {
        let changed = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction()?;
                let stored = meta_get(&tx, META_TAXONOMY_VERSION)?;
                if stored.as_deref() == Some(classifier.version()) {
                    return Ok(None);
                }

                let rows: Vec<(i64, String, Option<String>)> = {
                    let mut stmt =
                        tx.prepare(&format!("SELECT t.id, t.title, {TAGS_SUBQUERY} FROM topics t"))?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                };

                let mut changed = 0;
                {
                    let mut update =
                        tx.prepare("UPDATE topics SET bucket = ?2 WHERE id = ?1 AND bucket <> ?2")?;
                    for (id, title, tags) in rows {
                        let tags = split_tags(tags);
                        changed += update.execute(params![id, classifier.classify(&title, &tags)])?;
                    }
                }
                tx.execute(UPSERT_META, params![META_TAXONOMY_VERSION, classifier.version()])?;
                tx.commit()?;
                Ok(Some(changed))
            })
            .await?;
        Ok(changed)
    }

    // Refresh gate

    /// Atomically checks and stamps the refresh gate. True when `force` is set or
    /// at least `min_interval` has passed since the last stamp; the stamp is
    /// moved to now only in that case.
    pub async fn refresh_due(&self, min_interval: Duration, force: bool) -> Result<bool> {
        let now = Utc::now().timestamp();
        let min_secs = i64::try_from(min_interval.as_secs()).unwrap_or(i64::MAX);

        let due = self
            .writer
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let last: Option<i64> =
                    meta_get(&tx, META_LAST_REFRESH)?.and_then(|v| v.parse().ok());
                let due = force || last.map_or(true, |last| now.saturating_sub(last) >= min_secs);
                if due {
                    tx.execute(UPSERT_META, params![META_LAST_REFRESH, now.to_string()])?;
                }
                tx.commit()?;
                Ok(due)
            })
            .await?;
        Ok(due)
    }

    /// Moves the refresh stamp to now, e.g. once a sweep has finished.
    pub async fn mark_refreshed(&self) -> Result<()> {
        let now = Utc::now().timestamp().to_string();
        self.writer
            .call(move |conn| {
                conn.execute(UPSERT_META, params![META_LAST_REFRESH, now])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        let last = self
            .reader
            .call(|conn| Ok(meta_get(conn, META_LAST_REFRESH)?))
            .await?;
        Ok(last
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    // Reads

    pub async fn query_topics(&self, query: TopicQuery) -> Result<TopicPage> {
        let page = self
            .reader
            .call(move |conn| {
                let limit = query.limit.max(1);
                let (where_sql, mut values) = where_clause(&query);
                let sql = format!(
                    "SELECT {TOPIC_COLUMNS}, {TAGS_SUBQUERY} FROM topics t WHERE {where_sql} ORDER BY {} LIMIT ? OFFSET ?",
                    query.sort.order_by()
                );
                values.push(Value::Integer(limit as i64 + 1));
                values.push(Value::Integer(query.offset as i64));

                let mut stmt = conn.prepare(&sql)?;
                let mut items = stmt
                    .query_map(params_from_iter(values.iter()), topic_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                // One extra row was requested purely to detect a following page.
                let has_more = items.len() > limit;
                items.truncate(limit);
                Ok(TopicPage { items, has_more })
            })
            .await?;
        Ok(page)
    }

    pub async fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
        let topic = self
            .reader
            .call(move |conn| {
                let topic = conn
                    .query_row(
                        &format!("SELECT {TOPIC_COLUMNS}, {TAGS_SUBQUERY} FROM topics t WHERE t.id = ?1"),
                        params![id],
                        topic_from_row,
                    )
                    .optional()?;
                Ok(topic)
            })
            .await?;
        Ok(topic)
    }

    /// Sorted tags used by at least one listed topic.
    pub async fn distinct_tags(&self) -> Result<Vec<String>> {
        let tags = self
            .reader
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT DISTINCT tt.tag FROM topic_tags tt JOIN topics t ON t.id = tt.topic_id WHERE {LISTED} ORDER BY tt.tag"
                ))?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    pub async fn get_cached_detail(&self, id: i64) -> Result<Option<CachedDetail>> {
        let detail = self
            .reader
            .call(move |conn| {
                let row: Option<(Option<String>, Option<String>)> = conn
                    .query_row(
                        "SELECT cooked_html, import_url FROM topics WHERE id = ?1",
                        params![id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                Ok(row.and_then(|(cooked, import_url)| {
                    cooked.map(|cooked| CachedDetail { cooked, import_url })
                }))
            })
            .await?;
        Ok(detail)
    }

    pub async fn count_topics(&self) -> Result<i64> {
        let count = self
            .reader
            .call(|conn| {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM topics t WHERE {LISTED}"),
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn spotlight(&self) -> Result<Spotlight> {
        let spotlight = self
            .reader
            .call(|conn| {
                let headline = |order: &str| {
                    conn.query_row(
                        &format!(
                            "SELECT t.id, t.title, t.author, t.likes, t.updated_at FROM topics t WHERE {LISTED} ORDER BY {order} LIMIT 1"
                        ),
                        [],
                        |row| {
                            Ok(SpotlightTopic {
                                id: row.get(0)?,
                                title: row.get(1)?,
                                author: row.get(2)?,
                                likes: row.get(3)?,
                                updated_at: row
                                    .get::<_, Option<String>>(4)?
                                    .and_then(|s| parse_datetime(&s)),
                            })
                        },
                    )
                    .optional()
                };

                let most_popular = headline("t.likes DESC, t.views DESC, t.id DESC")?;
                let most_recent = headline("t.updated_at DESC, t.id DESC")?;
                let most_uploaded = conn
                    .query_row(
                        &format!(
                            "SELECT t.author, COUNT(*) AS n FROM topics t WHERE {LISTED} AND t.author <> '' GROUP BY t.author ORDER BY n DESC, t.author ASC LIMIT 1"
                        ),
                        [],
                        |row| {
                            Ok(SpotlightAuthor {
                                author: row.get(0)?,
                                count: row.get(1)?,
                            })
                        },
                    )
                    .optional()?;

                Ok(Spotlight {
                    most_popular,
                    most_uploaded,
                    most_recent,
                    error: None,
                })
            })
            .await?;
        Ok(spotlight)
    }
}

const TOPIC_COLUMNS: &str = "t.id, t.slug, t.title, t.author, t.excerpt, t.import_url, t.bucket, t.likes, t.views, t.replies, t.uses, t.has_multi_import, t.permalink, t.created_at, t.updated_at";

fn configure(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(30))?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

fn meta_get(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
}

fn where_clause(query: &TopicQuery) -> (String, Vec<Value>) {
    let mut clauses = vec![LISTED.to_string()];
    let mut values = Vec::new();

    for term in query.text.split_whitespace() {
        let pattern = format!("%{}%", escape_like(&fold_case(term)));
        clauses.push(
            r"(t.title_norm LIKE ? ESCAPE '\' OR t.excerpt_norm LIKE ? ESCAPE '\')".to_string(),
        );
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    if let Some(tag) = query
        .tag
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
    {
        clauses.push(
            "EXISTS (SELECT 1 FROM topic_tags tt WHERE tt.topic_id = t.id AND tt.tag = ?)".to_string(),
        );
        values.push(Value::Text(tag));
    }

    if let Some(bucket) = query.bucket.as_deref().filter(|b| !b.is_empty()) {
        clauses.push("t.bucket = ?".to_string());
        values.push(Value::Text(bucket.to_string()));
    }

    (clauses.join(" AND "), values)
}

/// SQLite's `lower()` only folds ASCII, so searchable text is folded here and
/// stored next to the original.
fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn split_tags(joined: Option<String>) -> Vec<String> {
    joined
        .map(|s| {
            s.split(TAG_SEPARATOR)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn format_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn topic_from_row(row: &Row) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        excerpt: row.get(4)?,
        import_url: row.get(5)?,
        bucket: row.get(6)?,
        likes: row.get(7)?,
        views: row.get(8)?,
        replies: row.get(9)?,
        uses: row.get(10)?,
        has_multi_import: row.get(11)?,
        permalink: row.get(12)?,
        created_at: row
            .get::<_, Option<String>>(13)?
            .and_then(|s| parse_datetime(&s)),
        updated_at: row
            .get::<_, Option<String>>(14)?
            .and_then(|s| parse_datetime(&s)),
        tags: split_tags(row.get(15)?),
    })
}
