/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::ListBlockRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct ListBlockPlugin;

#[derive(Debug, Clone)]
pub struct ListBlockRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub subject_uri: String,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 7] = [
    "uri",
    "cid",
    "creator",
    "subject_uri",
    "created_at",
    "indexed_at",
    "sort_at",
];

fn build_row(uri: &RecordUri, cid: &str, record: &ListBlockRecord, timestamp: &str) -> ListBlockRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    ListBlockRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        subject_uri: record.subject.clone(),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &ListBlockRow) -> Result<bool> {
    let values: [&dyn ToSql; 7] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.subject_uri,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<ListBlockRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, subject_uri, created_at, indexed_at, sort_at
             FROM list_block WHERE uri=?1",
            params![uri],
            |r| {
                Ok(ListBlockRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    subject_uri: r.get(3)?,
                    created_at: r.get(4)?,
                    indexed_at: r.get(5)?,
                    sort_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for ListBlockPlugin {
    type Record = ListBlockRecord;
    type Row = ListBlockRow;

    fn collection(&self) -> &'static str {
        collections::LIST_BLOCK
    }

    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>> {
        let row = build_row(uri, cid, record, timestamp);
        let mut writer = BulkWriter::prepare(conn, "list_block", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "list_block", &COLUMNS)?;
        let mut inserted = Vec::new();
        for ev in records {
            let row = build_row(&ev.uri, &ev.cid, &ev.record, &ev.timestamp);
            if write_row(&mut writer, &row)? {
                inserted.push(row);
            }
        }
        Ok(inserted)
    }

    fn find_duplicate(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        record: &Self::Record,
    ) -> Result<Option<String>> {
        let found = conn
            .query_row(
                "SELECT uri FROM list_block WHERE creator=?1 AND subject_uri=?2 LIMIT 1",
                params![uri.did(), record.subject],
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
        conn.execute("DELETE FROM list_block WHERE uri=?1", params![uri])?;
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
