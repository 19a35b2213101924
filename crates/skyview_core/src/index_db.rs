/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use skyview_protocol::RecordUri;

/// Handle to the index database. Cheap to clone; every logical operation
/// opens its own connection (WAL keeps readers and the writer out of each
/// other's way) and multi-table operations run inside one transaction.
#[derive(Clone)]
pub struct IndexDb {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DuplicateRow {
    pub uri: String,
    pub cid: String,
    pub duplicate_of: String,
    pub indexed_at: String,
}

impl IndexDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .with_context(|| format!("open index db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            -- Generic uri -> body map. Gate lookups and duplicate promotion
            -- re-read record bodies from here.
            CREATE TABLE IF NOT EXISTS record (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              did TEXT NOT NULL,
              collection TEXT NOT NULL,
              rkey TEXT NOT NULL,
              json TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_record_did ON record(did);

            -- First-writer-wins suppression: later records for an already
            -- indexed semantic subject park here until the canonical row is
            -- deleted and one of them is promoted.
            CREATE TABLE IF NOT EXISTS duplicate_record (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              duplicate_of TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_duplicate_of ON duplicate_record(duplicate_of);

            CREATE TABLE IF NOT EXISTS post (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              text TEXT NOT NULL,
              reply_root TEXT NULL,
              reply_root_cid TEXT NULL,
              reply_parent TEXT NULL,
              reply_parent_cid TEXT NULL,
              langs TEXT NULL,
              tags TEXT NULL,
              invalid_reply_root INTEGER NULL,
              violates_thread_gate INTEGER NULL,
              violates_embedding_rules INTEGER NULL,
              has_thread_gate INTEGER NOT NULL DEFAULT 0,
              has_post_gate INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_post_creator ON post(creator);
            CREATE INDEX IF NOT EXISTS idx_post_reply_parent ON post(reply_parent);

            -- Chronological feed surface: one row per post plus one per
            -- repost, ordered by sort_at.
            CREATE TABLE IF NOT EXISTS feed_item (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              type TEXT NOT NULL,
              post_uri TEXT NOT NULL,
              originator_did TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feed_item_originator ON feed_item(originator_did, sort_at DESC);
            CREATE INDEX IF NOT EXISTS idx_feed_item_post ON feed_item(post_uri);

            CREATE TABLE IF NOT EXISTS post_embed_image (
              post_uri TEXT NOT NULL,
              position INTEGER NOT NULL,
              image_cid TEXT NOT NULL,
              alt TEXT NOT NULL,
              PRIMARY KEY(post_uri, position)
            );

            CREATE TABLE IF NOT EXISTS post_embed_external (
              post_uri TEXT PRIMARY KEY,
              uri TEXT NOT NULL,
              title TEXT NOT NULL,
              description TEXT NOT NULL,
              thumb_cid TEXT NULL
            );

            CREATE TABLE IF NOT EXISTS post_embed_record (
              post_uri TEXT PRIMARY KEY,
              embed_uri TEXT NOT NULL,
              embed_cid TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_embed_record_subject ON post_embed_record(embed_uri);

            CREATE TABLE IF NOT EXISTS post_embed_video (
              post_uri TEXT PRIMARY KEY,
              video_cid TEXT NOT NULL,
              alt TEXT NULL
            );

            CREATE TABLE IF NOT EXISTS quote (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              subject TEXT NOT NULL,
              subject_cid TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_quote_subject ON quote(subject);
            CREATE INDEX IF NOT EXISTS idx_quote_subject_cid ON quote(subject_cid);

            CREATE TABLE IF NOT EXISTS "like" (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject TEXT NOT NULL,
              subject_cid TEXT NOT NULL,
              via TEXT NULL,
              via_cid TEXT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_like_subject ON "like"(subject);
            CREATE INDEX IF NOT EXISTS idx_like_creator_subject ON "like"(creator, subject);

            CREATE TABLE IF NOT EXISTS repost (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject TEXT NOT NULL,
              subject_cid TEXT NOT NULL,
              via TEXT NULL,
              via_cid TEXT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_repost_subject ON repost(subject);
            CREATE INDEX IF NOT EXISTS idx_repost_creator_subject ON repost(creator, subject);

            CREATE TABLE IF NOT EXISTS follow (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject_did TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_follow_subject ON follow(subject_did);
            CREATE INDEX IF NOT EXISTS idx_follow_creator_subject ON follow(creator, subject_did);

            CREATE TABLE IF NOT EXISTS list (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              name TEXT NOT NULL,
              purpose TEXT NOT NULL,
              description TEXT NULL,
              description_facets TEXT NULL,
              avatar_cid TEXT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS list_item (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject_did TEXT NOT NULL,
              list_uri TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_list_item_list_subject ON list_item(list_uri, subject_did);

            CREATE TABLE IF NOT EXISTS list_block (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject_uri TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_list_block_creator_subject ON list_block(creator, subject_uri);

            CREATE TABLE IF NOT EXISTS profile (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              display_name TEXT NULL,
              description TEXT NULL,
              avatar_cid TEXT NULL,
              banner_cid TEXT NULL,
              joined_via_starter_pack_uri TEXT NULL,
              pinned_post TEXT NULL,
              pinned_post_cid TEXT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feed_generator (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              feed_did TEXT NOT NULL,
              display_name TEXT NOT NULL,
              description TEXT NULL,
              description_facets TEXT NULL,
              avatar_cid TEXT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS labeler (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS starter_pack (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              name TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS thread_gate (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              post_uri TEXT NOT NULL UNIQUE,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_gate (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              creator TEXT NOT NULL,
              post_uri TEXT NOT NULL UNIQUE,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification (
              uri TEXT PRIMARY KEY,
              cid TEXT NOT NULL,
              rkey TEXT NOT NULL,
              creator TEXT NOT NULL,
              subject TEXT NOT NULL,
              handle TEXT NOT NULL,
              display_name TEXT NOT NULL,
              created_at TEXT NOT NULL,
              indexed_at TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_verification_creator_subject ON verification(creator, subject);

            -- Denormalized counters, always re-derivable from the child
            -- tables above.
            CREATE TABLE IF NOT EXISTS post_agg (
              uri TEXT PRIMARY KEY,
              like_count INTEGER NOT NULL DEFAULT 0,
              repost_count INTEGER NOT NULL DEFAULT 0,
              reply_count INTEGER NOT NULL DEFAULT 0,
              quote_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS profile_agg (
              did TEXT PRIMARY KEY,
              followers_count INTEGER NOT NULL DEFAULT 0,
              follows_count INTEGER NOT NULL DEFAULT 0,
              posts_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("open index db: {}", self.path.display()))
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

pub fn put_record(
    conn: &Connection,
    uri: &RecordUri,
    cid: &str,
    json: &str,
    indexed_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO record(uri, cid, did, collection, rkey, json, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(uri) DO UPDATE SET
           cid=excluded.cid,
           json=excluded.json,
           indexed_at=excluded.indexed_at",
        params![
            uri.to_string(),
            cid,
            uri.did(),
            uri.collection(),
            uri.rkey(),
            json,
            indexed_at
        ],
    )?;
    Ok(())
}

pub fn get_record_json(conn: &Connection, uri: &str) -> Result<Option<String>> {
    let json = conn
        .query_row("SELECT json FROM record WHERE uri=?1", params![uri], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(json)
}

pub fn delete_record_row(conn: &Connection, uri: &str) -> Result<()> {
    conn.execute("DELETE FROM record WHERE uri=?1", params![uri])?;
    Ok(())
}

pub fn put_duplicate_record(
    conn: &Connection,
    uri: &str,
    cid: &str,
    duplicate_of: &str,
    indexed_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO duplicate_record(uri, cid, duplicate_of, indexed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![uri, cid, duplicate_of, indexed_at],
    )?;
    Ok(())
}

pub fn remove_duplicate_record(conn: &Connection, uri: &str) -> Result<()> {
    conn.execute("DELETE FROM duplicate_record WHERE uri=?1", params![uri])?;
    Ok(())
}

/// Removes and returns the most recently indexed duplicate parked behind the
/// given canonical uri, if any. Used to promote a replacement when the
/// canonical row is deleted.
pub fn pop_latest_duplicate(conn: &Connection, duplicate_of: &str) -> Result<Option<DuplicateRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, duplicate_of, indexed_at FROM duplicate_record
             WHERE duplicate_of=?1
             ORDER BY indexed_at DESC, uri DESC
             LIMIT 1",
            params![duplicate_of],
            |r| {
                Ok(DuplicateRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    duplicate_of: r.get(2)?,
                    indexed_at: r.get(3)?,
                })
            },
        )
        .optional()?;
    if let Some(ref dup) = row {
        conn.execute("DELETE FROM duplicate_record WHERE uri=?1", params![dup.uri])?;
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (IndexDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = IndexDb::open(tmp.path().join("index.db")).unwrap();
        (db, tmp)
    }

    #[test]
    fn record_roundtrip_and_upsert() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        let uri = RecordUri::new("did:plc:a", "net.skyview.feed.post", "1");
        put_record(&conn, &uri, "c1", r#"{"text":"a"}"#, "2026-01-01T00:00:00Z").unwrap();
        put_record(&conn, &uri, "c2", r#"{"text":"b"}"#, "2026-01-02T00:00:00Z").unwrap();
        let json = get_record_json(&conn, &uri.to_string()).unwrap().unwrap();
        assert_eq!(json, r#"{"text":"b"}"#);
        delete_record_row(&conn, &uri.to_string()).unwrap();
        assert!(get_record_json(&conn, &uri.to_string()).unwrap().is_none());
    }

    #[test]
    fn duplicate_pop_returns_latest_and_removes() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        put_duplicate_record(&conn, "sv://d/c/2", "c2", "sv://d/c/1", "2026-01-02T00:00:00Z")
            .unwrap();
        put_duplicate_record(&conn, "sv://d/c/3", "c3", "sv://d/c/1", "2026-01-03T00:00:00Z")
            .unwrap();
        let dup = pop_latest_duplicate(&conn, "sv://d/c/1").unwrap().unwrap();
        assert_eq!(dup.uri, "sv://d/c/3");
        let dup = pop_latest_duplicate(&conn, "sv://d/c/1").unwrap().unwrap();
        assert_eq!(dup.uri, "sv://d/c/2");
        assert!(pop_latest_duplicate(&conn, "sv://d/c/1").unwrap().is_none());
    }
}
