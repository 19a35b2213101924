/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::LikeRecord;
use skyview_protocol::uri::uri_to_did;
use skyview_protocol::{collections, RecordUri};

use crate::aggregates::{recompute_post_count, recompute_post_counts, PostCount};
use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification, NotificationReason};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct LikePlugin;

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub subject: String,
    pub subject_cid: String,
    pub via: Option<String>,
    pub via_cid: Option<String>,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 10] = [
    "uri",
    "cid",
    "creator",
    "subject",
    "subject_cid",
    "via",
    "via_cid",
    "created_at",
    "indexed_at",
    "sort_at",
];

fn build_row(uri: &RecordUri, cid: &str, record: &LikeRecord, timestamp: &str) -> LikeRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    LikeRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        subject: record.subject.uri.clone(),
        subject_cid: record.subject.cid.clone(),
        via: record.via.as_ref().map(|v| v.uri.clone()),
        via_cid: record.via.as_ref().map(|v| v.cid.clone()),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &LikeRow) -> Result<bool> {
    let values: [&dyn ToSql; 10] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.subject,
        &row.subject_cid,
        &row.via,
        &row.via_cid,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<LikeRow>> {
    let row = conn
        .query_row(
            r#"SELECT uri, cid, creator, subject, subject_cid, via, via_cid,
                      created_at, indexed_at, sort_at
               FROM "like" WHERE uri=?1"#,
            params![uri],
            |r| {
                Ok(LikeRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    subject: r.get(3)?,
                    subject_cid: r.get(4)?,
                    via: r.get(5)?,
                    via_cid: r.get(6)?,
                    created_at: r.get(7)?,
                    indexed_at: r.get(8)?,
                    sort_at: r.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for LikePlugin {
    type Record = LikeRecord;
    type Row = LikeRow;

    fn collection(&self) -> &'static str {
        collections::LIKE
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
        let mut writer = BulkWriter::prepare(conn, r#""like""#, &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, r#""like""#, &COLUMNS)?;
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
                r#"SELECT uri FROM "like" WHERE creator=?1 AND subject=?2 LIMIT 1"#,
                params![uri.did(), record.subject.uri],
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
        conn.execute(r#"DELETE FROM "like" WHERE uri=?1"#, params![uri])?;
        Ok(Some(row))
    }

    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification> {
        let subject_did = uri_to_did(&row.subject);
        // A like on your own post notifies nobody.
        if subject_did == row.creator {
            return vec![];
        }
        let mut notifs = vec![Notification {
            did: subject_did.to_string(),
            author: row.creator.clone(),
            reason: NotificationReason::Like,
            reason_subject: Some(row.subject.clone()),
            record_uri: row.uri.clone(),
            record_cid: row.cid.clone(),
            sort_at: row.sort_at.clone(),
        }];
        if let Some(via) = &row.via {
            let via_did = uri_to_did(via);
            // Self-suppression applies independently to the via leg.
            if via_did != row.creator {
                notifs.push(Notification {
                    did: via_did.to_string(),
                    author: row.creator.clone(),
                    reason: NotificationReason::LikeViaRepost,
                    reason_subject: Some(via.clone()),
                    record_uri: row.uri.clone(),
                    record_cid: row.cid.clone(),
                    sort_at: row.sort_at.clone(),
                });
            }
        }
        notifs
    }

    fn notifs_for_delete(
        &self,
        deleted: &Self::Row,
        replaced_by: Option<&Self::Row>,
    ) -> DeleteNotifs {
        let to_delete = if replaced_by.is_some() {
            vec![]
        } else {
            vec![deleted.uri.clone()]
        };
        DeleteNotifs {
            notifs: vec![],
            to_delete,
        }
    }

    fn update_aggregates(&self, conn: &Connection, row: &Self::Row) -> Result<()> {
        recompute_post_count(conn, &row.subject, PostCount::Like)
    }

    fn update_aggregates_bulk(&self, conn: &Connection, rows: &[Self::Row]) -> Result<()> {
        recompute_post_counts(conn, rows.iter().map(|r| r.subject.clone()), PostCount::Like)
    }
}
