/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::FollowRecord;
use skyview_protocol::{collections, RecordUri};

use crate::aggregates::{recompute_profile_count, recompute_profile_counts, ProfileCount};
use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification, NotificationReason};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct FollowPlugin;

#[derive(Debug, Clone)]
pub struct FollowRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub subject_did: String,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 7] = [
    "uri",
    "cid",
    "creator",
    "subject_did",
    "created_at",
    "indexed_at",
    "sort_at",
];

fn build_row(uri: &RecordUri, cid: &str, record: &FollowRecord, timestamp: &str) -> FollowRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    FollowRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        subject_did: record.subject.clone(),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &FollowRow) -> Result<bool> {
    let values: [&dyn ToSql; 7] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.subject_did,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<FollowRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, subject_did, created_at, indexed_at, sort_at
             FROM follow WHERE uri=?1",
            params![uri],
            |r| {
                Ok(FollowRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    subject_did: r.get(3)?,
                    created_at: r.get(4)?,
                    indexed_at: r.get(5)?,
                    sort_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for FollowPlugin {
    type Record = FollowRecord;
    type Row = FollowRow;

    fn collection(&self) -> &'static str {
        collections::FOLLOW
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
        let mut writer = BulkWriter::prepare(conn, "follow", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "follow", &COLUMNS)?;
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
                "SELECT uri FROM follow WHERE creator=?1 AND subject_did=?2 LIMIT 1",
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
        conn.execute("DELETE FROM follow WHERE uri=?1", params![uri])?;
        Ok(Some(row))
    }

    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification> {
        // The followed party is never the follow's creator, so a follow
        // always notifies.
        vec![Notification {
            did: row.subject_did.clone(),
            author: row.creator.clone(),
            reason: NotificationReason::Follow,
            reason_subject: None,
            record_uri: row.uri.clone(),
            record_cid: row.cid.clone(),
            sort_at: row.sort_at.clone(),
        }]
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
        recompute_profile_count(conn, &row.subject_did, ProfileCount::Followers)?;
        recompute_profile_count(conn, &row.creator, ProfileCount::Follows)
    }

    fn update_aggregates_bulk(&self, conn: &Connection, rows: &[Self::Row]) -> Result<()> {
        recompute_profile_counts(
            conn,
            rows.iter().map(|r| r.subject_did.clone()),
            ProfileCount::Followers,
        )?;
        recompute_profile_counts(
            conn,
            rows.iter().map(|r| r.creator.clone()),
            ProfileCount::Follows,
        )
    }
}
