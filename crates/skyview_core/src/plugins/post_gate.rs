/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::PostGateRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::normalize_datetime;
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{IndexError, RecordEvent, RecordPlugin};

/// Quote-embed policy record; evaluated by the post plugin when a quote of
/// the gated post is indexed.
pub struct PostGatePlugin;

#[derive(Debug, Clone)]
pub struct PostGateRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub post_uri: String,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 6] = ["uri", "cid", "creator", "post_uri", "created_at", "indexed_at"];

fn check_target(uri: &RecordUri, record: &PostGateRecord) -> Result<()> {
    let post = RecordUri::parse(&record.post).map_err(|e| {
        IndexError::Validation(format!("post gate {uri} has unparsable post uri: {e}"))
    })?;
    if post.did() != uri.did() || post.rkey() != uri.rkey() {
        return Err(IndexError::Validation(format!(
            "creator and rkey of post gate {uri} do not match its post {}",
            record.post
        ))
        .into());
    }
    Ok(())
}

fn build_row(uri: &RecordUri, cid: &str, record: &PostGateRecord, timestamp: &str) -> PostGateRow {
    PostGateRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        post_uri: record.post.clone(),
        created_at: normalize_datetime(&record.created_at),
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &PostGateRow) -> Result<bool> {
    let values: [&dyn ToSql; 6] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.post_uri,
        &row.created_at,
        &row.indexed_at,
    ];
    writer.write(&values)
}

fn set_post_flag(conn: &Connection, post_uri: &str, has_gate: bool) -> Result<()> {
    conn.execute(
        "UPDATE post SET has_post_gate=?1 WHERE uri=?2",
        params![has_gate, post_uri],
    )?;
    Ok(())
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<PostGateRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, post_uri, created_at, indexed_at
             FROM post_gate WHERE uri=?1",
            params![uri],
            |r| {
                Ok(PostGateRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    post_uri: r.get(3)?,
                    created_at: r.get(4)?,
                    indexed_at: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for PostGatePlugin {
    type Record = PostGateRecord;
    type Row = PostGateRow;

    fn collection(&self) -> &'static str {
        collections::POST_GATE
    }

    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>> {
        check_target(uri, record)?;
        let row = build_row(uri, cid, record, timestamp);
        let mut writer = BulkWriter::prepare(conn, "post_gate", &COLUMNS)?;
        let inserted = write_row(&mut writer, &row)?;
        set_post_flag(conn, &row.post_uri, true)?;
        Ok(inserted.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        for ev in records {
            check_target(&ev.uri, &ev.record)?;
        }
        let mut writer = BulkWriter::prepare(conn, "post_gate", &COLUMNS)?;
        let mut inserted = Vec::new();
        for ev in records {
            let row = build_row(&ev.uri, &ev.cid, &ev.record, &ev.timestamp);
            if write_row(&mut writer, &row)? {
                inserted.push(row);
            }
        }
        for row in &inserted {
            set_post_flag(conn, &row.post_uri, true)?;
        }
        Ok(inserted)
    }

    fn find_duplicate(
        &self,
        conn: &Connection,
        _uri: &RecordUri,
        record: &Self::Record,
    ) -> Result<Option<String>> {
        let found = conn
            .query_row(
                "SELECT uri FROM post_gate WHERE post_uri=?1 LIMIT 1",
                params![record.post],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found)
    }

    fn delete(&self, conn: &Connection, uri: &RecordUri) -> Result<Option<Self::Row>> {
        let uri = uri.to_string();
        let Some(row) = select_row(conn, &uri)? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM post_gate WHERE uri=?1", params![uri])?;
        set_post_flag(conn, &row.post_uri, false)?;
        Ok(Some(row))
    }

    fn notifs_for_insert(&self, _row: &Self::Row) -> Vec<Notification> {
        vec![]
    }

    fn notifs_for_delete(
        &self,
        _deleted: &Self::Row,
        _replaced_by: Option<&Self::Row>,
    ) -> DeleteNotifs {
        DeleteNotifs::default()
    }
}
