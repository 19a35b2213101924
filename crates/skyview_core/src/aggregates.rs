/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Denormalized counter maintenance. Counts are always re-derived from the
//! child table and upserted, never incremented, so concurrent writers and
//! retries converge on the exact count. Failures are classed distinctly so
//! operators can re-run recomputation without re-ingesting records.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::processor::IndexError;

#[derive(Debug, Clone, Copy)]
pub enum PostCount {
    Like,
    Repost,
    Reply,
}

impl PostCount {
    fn column(&self) -> &'static str {
        match self {
            Self::Like => "like_count",
            Self::Repost => "repost_count",
            Self::Reply => "reply_count",
        }
    }

    /// Count of live child rows for one subject uri. Replies that violate
    /// the thread gate stay out of the reply count.
    fn child_count_sql(&self) -> &'static str {
        match self {
            Self::Like => r#"SELECT COUNT(*) FROM "like" WHERE subject = ?1"#,
            Self::Repost => "SELECT COUNT(*) FROM repost WHERE subject = ?1",
            Self::Reply => {
                "SELECT COUNT(*) FROM post WHERE reply_parent = ?1
                 AND (violates_thread_gate IS NULL OR violates_thread_gate = 0)"
            }
        }
    }

    fn grouped_count_sql(&self) -> &'static str {
        match self {
            Self::Like => r#"SELECT COUNT(*) FROM "like" WHERE subject = v.uri"#,
            Self::Repost => "SELECT COUNT(*) FROM repost WHERE subject = v.uri",
            Self::Reply => {
                "SELECT COUNT(*) FROM post WHERE reply_parent = v.uri
                 AND (violates_thread_gate IS NULL OR violates_thread_gate = 0)"
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ProfileCount {
    Followers,
    Follows,
    Posts,
}

impl ProfileCount {
    fn column(&self) -> &'static str {
        match self {
            Self::Followers => "followers_count",
            Self::Follows => "follows_count",
            Self::Posts => "posts_count",
        }
    }

    fn child_count_sql(&self) -> &'static str {
        match self {
            Self::Followers => "SELECT COUNT(*) FROM follow WHERE subject_did = ?1",
            Self::Follows => "SELECT COUNT(*) FROM follow WHERE creator = ?1",
            Self::Posts => "SELECT COUNT(*) FROM post WHERE creator = ?1",
        }
    }

    fn grouped_count_sql(&self) -> &'static str {
        match self {
            Self::Followers => "SELECT COUNT(*) FROM follow WHERE subject_did = v.did",
            Self::Follows => "SELECT COUNT(*) FROM follow WHERE creator = v.did",
            Self::Posts => "SELECT COUNT(*) FROM post WHERE creator = v.did",
        }
    }
}

fn agg_err(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
    IndexError::AggregateMaintenance(format!("{context}: {err}")).into()
}

pub fn recompute_post_count(conn: &Connection, subject_uri: &str, count: PostCount) -> Result<()> {
    let sql = format!(
        "INSERT INTO post_agg (uri, {col}) VALUES (?1, ({child}))
         ON CONFLICT(uri) DO UPDATE SET {col} = excluded.{col}",
        col = count.column(),
        child = count.child_count_sql(),
    );
    conn.execute(&sql, params![subject_uri])
        .map_err(|e| agg_err(count.column(), e))?;
    Ok(())
}

/// Quote counts pair the aggregate key (subject uri) with child rows matched
/// by subject cid, so quotes of a superseded revision fall out of the count.
pub fn recompute_quote_count(conn: &Connection, subject_uri: &str, subject_cid: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO post_agg (uri, quote_count)
         VALUES (?1, (SELECT COUNT(*) FROM quote WHERE subject_cid = ?2))
         ON CONFLICT(uri) DO UPDATE SET quote_count = excluded.quote_count",
        params![subject_uri, subject_cid],
    )
    .map_err(|e| agg_err("quote_count", e))?;
    Ok(())
}

pub fn recompute_profile_count(conn: &Connection, did: &str, count: ProfileCount) -> Result<()> {
    let sql = format!(
        "INSERT INTO profile_agg (did, {col}) VALUES (?1, ({child}))
         ON CONFLICT(did) DO UPDATE SET {col} = excluded.{col}",
        col = count.column(),
        child = count.child_count_sql(),
    );
    conn.execute(&sql, params![did])
        .map_err(|e| agg_err(count.column(), e))?;
    Ok(())
}

fn distinct(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = values.into_iter().collect();
    out.sort();
    out.dedup();
    out
}

/// Bulk form: one statement recomputing the counter for every distinct
/// subject uri in the batch, via json_each over the subject set.
pub fn recompute_post_counts(
    conn: &Connection,
    subject_uris: impl IntoIterator<Item = String>,
    count: PostCount,
) -> Result<()> {
    let subjects = distinct(subject_uris);
    if subjects.is_empty() {
        return Ok(());
    }
    let subjects_json =
        serde_json::to_string(&subjects).map_err(|e| agg_err(count.column(), e))?;
    let sql = format!(
        "INSERT INTO post_agg (uri, {col})
         SELECT v.uri, ({child})
         FROM (SELECT value AS uri FROM json_each(?1)) AS v
         WHERE true
         ON CONFLICT(uri) DO UPDATE SET {col} = excluded.{col}",
        col = count.column(),
        child = count.grouped_count_sql(),
    );
    conn.execute(&sql, params![subjects_json])
        .map_err(|e| agg_err(count.column(), e))?;
    Ok(())
}

pub fn recompute_profile_counts(
    conn: &Connection,
    dids: impl IntoIterator<Item = String>,
    count: ProfileCount,
) -> Result<()> {
    let dids = distinct(dids);
    if dids.is_empty() {
        return Ok(());
    }
    let dids_json = serde_json::to_string(&dids).map_err(|e| agg_err(count.column(), e))?;
    let sql = format!(
        "INSERT INTO profile_agg (did, {col})
         SELECT v.did, ({child})
         FROM (SELECT value AS did FROM json_each(?1)) AS v
         WHERE true
         ON CONFLICT(did) DO UPDATE SET {col} = excluded.{col}",
        col = count.column(),
        child = count.grouped_count_sql(),
    );
    conn.execute(&sql, params![dids_json])
        .map_err(|e| agg_err(count.column(), e))?;
    Ok(())
}

pub fn post_agg(conn: &Connection, uri: &str) -> Result<(i64, i64, i64, i64)> {
    use rusqlite::OptionalExtension;
    let row = conn
        .query_row(
            "SELECT like_count, repost_count, reply_count, quote_count FROM post_agg WHERE uri=?1",
            params![uri],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    Ok(row.unwrap_or((0, 0, 0, 0)))
}

pub fn profile_agg(conn: &Connection, did: &str) -> Result<(i64, i64, i64)> {
    use rusqlite::OptionalExtension;
    let row = conn
        .query_row(
            "SELECT followers_count, follows_count, posts_count FROM profile_agg WHERE did=?1",
            params![did],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    Ok(row.unwrap_or((0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_db::IndexDb;
    use tempfile::TempDir;

    fn setup() -> (IndexDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = IndexDb::open(tmp.path().join("index.db")).unwrap();
        (db, tmp)
    }

    fn insert_like(conn: &Connection, rkey: &str, subject: &str) {
        conn.execute(
            r#"INSERT INTO "like"(uri, cid, creator, subject, subject_cid, created_at, indexed_at, sort_at)
               VALUES (?1, 'c', 'did:plc:liker', ?2, 'sc', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')"#,
            params![format!("sv://did:plc:liker/net.skyview.feed.like/{rkey}"), subject],
        )
        .unwrap();
    }

    #[test]
    fn single_recompute_matches_child_table() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        let subject = "sv://did:plc:a/net.skyview.feed.post/1";
        insert_like(&conn, "1", subject);
        insert_like(&conn, "2", subject);
        recompute_post_count(&conn, subject, PostCount::Like).unwrap();
        assert_eq!(post_agg(&conn, subject).unwrap().0, 2);

        conn.execute(r#"DELETE FROM "like" WHERE uri LIKE '%/1'"#, [])
            .unwrap();
        recompute_post_count(&conn, subject, PostCount::Like).unwrap();
        assert_eq!(post_agg(&conn, subject).unwrap().0, 1);
    }

    #[test]
    fn bulk_recompute_covers_distinct_subjects_once() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        let s1 = "sv://did:plc:a/net.skyview.feed.post/1";
        let s2 = "sv://did:plc:a/net.skyview.feed.post/2";
        insert_like(&conn, "1", s1);
        insert_like(&conn, "2", s1);
        insert_like(&conn, "3", s2);
        let touched = vec![s1.to_string(), s1.to_string(), s2.to_string()];
        recompute_post_counts(&conn, touched, PostCount::Like).unwrap();
        assert_eq!(post_agg(&conn, s1).unwrap().0, 2);
        assert_eq!(post_agg(&conn, s2).unwrap().0, 1);
    }

    #[test]
    fn missing_aggregate_rows_read_as_zero() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        assert_eq!(post_agg(&conn, "sv://d/c/none").unwrap(), (0, 0, 0, 0));
        assert_eq!(profile_agg(&conn, "did:plc:none").unwrap(), (0, 0, 0));
    }
}
