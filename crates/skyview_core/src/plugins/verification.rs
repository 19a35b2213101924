/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::VerificationRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, now_rfc3339, sort_at};
use crate::notifications::{DeleteNotifs, Notification, NotificationReason};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct VerificationPlugin;

#[derive(Debug, Clone)]
pub struct VerificationRow {
    pub uri: String,
    pub cid: String,
    pub rkey: String,
    pub creator: String,
    pub subject: String,
    pub handle: String,
    pub display_name: String,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 10] = [
    "uri",
    "cid",
    "rkey",
    "creator",
    "subject",
    "handle",
    "display_name",
    "created_at",
    "indexed_at",
    "sort_at",
];

fn build_row(
    uri: &RecordUri,
    cid: &str,
    record: &VerificationRecord,
    timestamp: &str,
) -> VerificationRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    VerificationRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        rkey: uri.rkey().to_string(),
        creator: uri.did().to_string(),
        subject: record.subject.clone(),
        handle: record.handle.clone(),
        display_name: record.display_name.clone(),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &VerificationRow) -> Result<bool> {
    let values: [&dyn ToSql; 10] = [
        &row.uri,
        &row.cid,
        &row.rkey,
        &row.creator,
        &row.subject,
        &row.handle,
        &row.display_name,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<VerificationRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, rkey, creator, subject, handle, display_name,
                    created_at, indexed_at, sort_at
             FROM verification WHERE uri=?1",
            params![uri],
            |r| {
                Ok(VerificationRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    rkey: r.get(2)?,
                    creator: r.get(3)?,
                    subject: r.get(4)?,
                    handle: r.get(5)?,
                    display_name: r.get(6)?,
                    created_at: r.get(7)?,
                    indexed_at: r.get(8)?,
                    sort_at: r.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for VerificationPlugin {
    type Record = VerificationRecord;
    type Row = VerificationRow;

    fn collection(&self) -> &'static str {
        collections::VERIFICATION
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
        let mut writer = BulkWriter::prepare(conn, "verification", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "verification", &COLUMNS)?;
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
                "SELECT uri FROM verification WHERE creator=?1 AND subject=?2 LIMIT 1",
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
        conn.execute("DELETE FROM verification WHERE uri=?1", params![uri])?;
        Ok(Some(row))
    }

    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification> {
        vec![Notification {
            did: row.subject.clone(),
            author: row.creator.clone(),
            reason: NotificationReason::Verified,
            reason_subject: None,
            record_uri: row.uri.clone(),
            record_cid: row.cid.clone(),
            sort_at: row.sort_at.clone(),
        }]
    }

    /// The one plugin where deletion is itself notification-worthy: revoking
    /// a verification tells the subject, stamped with revocation time.
    fn notifs_for_delete(
        &self,
        deleted: &Self::Row,
        _replaced_by: Option<&Self::Row>,
    ) -> DeleteNotifs {
        DeleteNotifs {
            notifs: vec![Notification {
                did: deleted.subject.clone(),
                author: deleted.creator.clone(),
                reason: NotificationReason::Unverified,
                reason_subject: None,
                record_uri: deleted.uri.clone(),
                record_cid: deleted.cid.clone(),
                sort_at: now_rfc3339(),
            }],
            to_delete: vec![],
        }
    }
}
