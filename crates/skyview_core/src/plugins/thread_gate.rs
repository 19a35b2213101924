/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::ThreadGateRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::normalize_datetime;
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{IndexError, RecordEvent, RecordPlugin};

pub struct ThreadGatePlugin;

#[derive(Debug, Clone)]
pub struct ThreadGateRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub post_uri: String,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 6] = ["uri", "cid", "creator", "post_uri", "created_at", "indexed_at"];

/// A gate is only meaningful at the derived location: same creator and
/// record key as the post it governs.
fn check_target(uri: &RecordUri, record: &ThreadGateRecord) -> Result<()> {
    let post = RecordUri::parse(&record.post).map_err(|e| {
        IndexError::Validation(format!("thread gate {uri} has unparsable post uri: {e}"))
    })?;
    if post.did() != uri.did() || post.rkey() != uri.rkey() {
        return Err(IndexError::Validation(format!(
            "creator and rkey of thread gate {uri} do not match its post {}",
            record.post
        ))
        .into());
    }
    Ok(())
}

fn build_row(uri: &RecordUri, cid: &str, record: &ThreadGateRecord, timestamp: &str) -> ThreadGateRow {
    ThreadGateRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        post_uri: record.post.clone(),
        created_at: normalize_datetime(&record.created_at),
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &ThreadGateRow) -> Result<bool> {
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
        "UPDATE post SET has_thread_gate=?1 WHERE uri=?2",
        params![has_gate, post_uri],
    )?;
    Ok(())
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<ThreadGateRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, post_uri, created_at, indexed_at
             FROM thread_gate WHERE uri=?1",
            params![uri],
            |r| {
                Ok(ThreadGateRow {
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

impl RecordPlugin for ThreadGatePlugin {
    type Record = ThreadGateRecord;
    type Row = ThreadGateRow;

    fn collection(&self) -> &'static str {
        collections::THREAD_GATE
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
        let mut writer = BulkWriter::prepare(conn, "thread_gate", &COLUMNS)?;
        let inserted = write_row(&mut writer, &row)?;
        // The post may have been indexed before its gate; flag it either way.
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
        let mut writer = BulkWriter::prepare(conn, "thread_gate", &COLUMNS)?;
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
                "SELECT uri FROM thread_gate WHERE post_uri=?1 LIMIT 1",
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
        conn.execute("DELETE FROM thread_gate WHERE uri=?1", params![uri])?;
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
