use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::{Connection, params};

/// Rows older than this are pruned on open; stories expire after 24 hours,
/// so anything beyond two days can never resurface in a feed.
const VIEW_LOG_RETENTION_DAYS: i64 = 2;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS story_views (
                item_id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                viewed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_story_views_author ON story_views(author_id);
            "#,
        )?;
        Ok(())
    }

    pub fn mark_viewed(&self, item_id: &str, author_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO story_views (item_id, author_id, viewed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(item_id) DO UPDATE SET
                author_id = excluded.author_id,
                viewed_at = excluded.viewed_at
            "#,
            params![item_id, author_id, now],
        )?;
        Ok(())
    }

    pub fn viewed_item_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT item_id FROM story_views")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    pub fn prune_stale_views(&self) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(VIEW_LOG_RETENTION_DAYS)).to_rfc3339();
        let deleted = self
            .conn
            .execute("DELETE FROM story_views WHERE viewed_at < ?1", params![cutoff])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> Database {
        let db = Database::open_in_memory().expect("in-memory database should open");
        db.migrate().expect("migration should succeed");
        db
    }

    #[test]
    fn mark_viewed_is_idempotent_per_item() {
        let db = open_test_db();
        db.mark_viewed("item-1", "author-1").expect("first mark");
        db.mark_viewed("item-1", "author-1").expect("second mark");
        db.mark_viewed("item-2", "author-1").expect("other item");

        let viewed = db.viewed_item_ids().expect("viewed set should load");
        assert_eq!(viewed.len(), 2);
        assert!(viewed.contains("item-1"));
        assert!(viewed.contains("item-2"));
    }

    #[test]
    fn prune_removes_only_stale_rows() {
        let db = open_test_db();
        db.mark_viewed("fresh", "author-1").expect("mark fresh");
        let stale_ts = (Utc::now() - Duration::days(5)).to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO story_views (item_id, author_id, viewed_at) VALUES (?1, ?2, ?3)",
                params!["stale", "author-2", stale_ts],
            )
            .expect("insert stale row");

        let deleted = db.prune_stale_views().expect("prune should succeed");
        assert_eq!(deleted, 1);

        let viewed = db.viewed_item_ids().expect("viewed set should load");
        assert!(viewed.contains("fresh"));
        assert!(!viewed.contains("stale"));
    }
}
