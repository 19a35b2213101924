/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::ListItemRecord;
use skyview_protocol::uri::uri_to_did;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{IndexError, RecordEvent, RecordPlugin};

pub struct ListItemPlugin;

#[derive(Debug, Clone)]
pub struct ListItemRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub subject_did: String,
    pub list_uri: String,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 8] = [
    "uri",
    "cid",
    "creator",
    "subject_did",
    "list_uri",
    "created_at",
    "indexed_at",
    "sort_at",
];

/// Items may only reference lists owned by their own creator.
fn check_ownership(uri: &RecordUri, record: &ListItemRecord) -> Result<()> {
    if uri_to_did(&record.list) != uri.did() {
        return Err(IndexError::Validation(format!(
            "creator of list item {uri} does not match creator of list {}",
            record.list
        ))
        .into());
    }
    Ok(())
}

fn build_row(uri: &RecordUri, cid: &str, record: &ListItemRecord, timestamp: &str) -> ListItemRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    ListItemRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        subject_did: record.subject.clone(),
        list_uri: record.list.clone(),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &ListItemRow) -> Result<bool> {
    let values: [&dyn ToSql; 8] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.subject_did,
        &row.list_uri,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<ListItemRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, subject_did, list_uri, created_at, indexed_at, sort_at
             FROM list_item WHERE uri=?1",
            params![uri],
            |r| {
                Ok(ListItemRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    subject_did: r.get(3)?,
                    list_uri: r.get(4)?,
                    created_at: r.get(5)?,
                    indexed_at: r.get(6)?,
                    sort_at: r.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for ListItemPlugin {
    type Record = ListItemRecord;
    type Row = ListItemRow;

    fn collection(&self) -> &'static str {
        collections::LIST_ITEM
    }

    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>> {
        check_ownership(uri, record)?;
        let row = build_row(uri, cid, record, timestamp);
        let mut writer = BulkWriter::prepare(conn, "list_item", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        for ev in records {
            check_ownership(&ev.uri, &ev.record)?;
        }
        let mut writer = BulkWriter::prepare(conn, "list_item", &COLUMNS)?;
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
        _uri: &RecordUri,
        record: &Self::Record,
    ) -> Result<Option<String>> {
        let found = conn
            .query_row(
                "SELECT uri FROM list_item WHERE list_uri=?1 AND subject_did=?2 LIMIT 1",
                params![record.list, record.subject],
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
        conn.execute("DELETE FROM list_item WHERE uri=?1", params![uri])?;
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
