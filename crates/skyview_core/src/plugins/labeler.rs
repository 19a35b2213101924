/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::LabelerRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::normalize_datetime;
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{RecordEvent, RecordPlugin};

/// Singleton-per-actor like profile: only the `self` record key indexes.
pub struct LabelerPlugin;

const SELF_RKEY: &str = "self";

#[derive(Debug, Clone)]
pub struct LabelerRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 5] = ["uri", "cid", "creator", "created_at", "indexed_at"];

fn build_row(uri: &RecordUri, cid: &str, record: &LabelerRecord, timestamp: &str) -> LabelerRow {
    LabelerRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        created_at: normalize_datetime(&record.created_at),
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &LabelerRow) -> Result<bool> {
    let values: [&dyn ToSql; 5] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.created_at,
        &row.indexed_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<LabelerRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, created_at, indexed_at FROM labeler WHERE uri=?1",
            params![uri],
            |r| {
                Ok(LabelerRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    created_at: r.get(3)?,
                    indexed_at: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for LabelerPlugin {
    type Record = LabelerRecord;
    type Row = LabelerRow;

    fn collection(&self) -> &'static str {
        collections::LABELER
    }

    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>> {
        if uri.rkey() != SELF_RKEY {
            return Ok(None);
        }
        let row = build_row(uri, cid, record, timestamp);
        let mut writer = BulkWriter::prepare(conn, "labeler", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "labeler", &COLUMNS)?;
        let mut inserted = Vec::new();
        for ev in records {
            if ev.uri.rkey() != SELF_RKEY {
                continue;
            }
            let row = build_row(&ev.uri, &ev.cid, &ev.record, &ev.timestamp);
            if write_row(&mut writer, &row)? {
                inserted.push(row);
            }
        }
        Ok(inserted)
    }

    fn delete(&self, conn: &Connection, uri: &RecordUri) -> Result<Option<Self::Row>> {
        let uri = uri.to_string();
        let Some(row) = select_row(conn, &uri)? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM labeler WHERE uri=?1", params![uri])?;
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
