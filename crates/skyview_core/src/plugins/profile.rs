/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::ProfileRecord;
use skyview_protocol::uri::uri_to_did;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, now_rfc3339};
use crate::notifications::{DeleteNotifs, Notification, NotificationReason};
use crate::processor::{RecordEvent, RecordPlugin};

/// Singleton-per-actor: only the well-known `self` record key is indexed;
/// anything else is silently ignored.
pub struct ProfilePlugin;

const SELF_RKEY: &str = "self";

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_cid: Option<String>,
    pub banner_cid: Option<String>,
    pub joined_via_starter_pack_uri: Option<String>,
    pub pinned_post: Option<String>,
    pub pinned_post_cid: Option<String>,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 12] = [
    "uri",
    "cid",
    "creator",
    "display_name",
    "description",
    "avatar_cid",
    "banner_cid",
    "joined_via_starter_pack_uri",
    "pinned_post",
    "pinned_post_cid",
    "created_at",
    "indexed_at",
];

fn build_row(uri: &RecordUri, cid: &str, record: &ProfileRecord, timestamp: &str) -> ProfileRow {
    // Profiles predate createdAt; fall back to ingestion time.
    let created_at = record
        .created_at
        .as_deref()
        .map(normalize_datetime)
        .unwrap_or_else(now_rfc3339);
    ProfileRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        display_name: record.display_name.clone(),
        description: record.description.clone(),
        avatar_cid: record.avatar.as_ref().map(|a| a.cid.clone()),
        banner_cid: record.banner.as_ref().map(|b| b.cid.clone()),
        joined_via_starter_pack_uri: record.joined_via_starter_pack.as_ref().map(|s| s.uri.clone()),
        pinned_post: record.pinned_post.as_ref().map(|p| p.uri.clone()),
        pinned_post_cid: record.pinned_post.as_ref().map(|p| p.cid.clone()),
        created_at,
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &ProfileRow) -> Result<bool> {
    let values: [&dyn ToSql; 12] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.display_name,
        &row.description,
        &row.avatar_cid,
        &row.banner_cid,
        &row.joined_via_starter_pack_uri,
        &row.pinned_post,
        &row.pinned_post_cid,
        &row.created_at,
        &row.indexed_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<ProfileRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, display_name, description, avatar_cid, banner_cid,
                    joined_via_starter_pack_uri, pinned_post, pinned_post_cid, created_at, indexed_at
             FROM profile WHERE uri=?1",
            params![uri],
            |r| {
                Ok(ProfileRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    display_name: r.get(3)?,
                    description: r.get(4)?,
                    avatar_cid: r.get(5)?,
                    banner_cid: r.get(6)?,
                    joined_via_starter_pack_uri: r.get(7)?,
                    pinned_post: r.get(8)?,
                    pinned_post_cid: r.get(9)?,
                    created_at: r.get(10)?,
                    indexed_at: r.get(11)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for ProfilePlugin {
    type Record = ProfileRecord;
    type Row = ProfileRow;

    fn collection(&self) -> &'static str {
        collections::PROFILE
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
        let mut writer = BulkWriter::prepare(conn, "profile", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "profile", &COLUMNS)?;
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
        conn.execute("DELETE FROM profile WHERE uri=?1", params![uri])?;
        Ok(Some(row))
    }

    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification> {
        let Some(starter_pack) = &row.joined_via_starter_pack_uri else {
            return vec![];
        };
        vec![Notification {
            did: uri_to_did(starter_pack).to_string(),
            author: row.creator.clone(),
            reason: NotificationReason::StarterPackJoined,
            reason_subject: Some(starter_pack.clone()),
            record_uri: row.uri.clone(),
            record_cid: row.cid.clone(),
            sort_at: row.indexed_at.clone(),
        }]
    }

    fn notifs_for_delete(
        &self,
        _deleted: &Self::Row,
        _replaced_by: Option<&Self::Row>,
    ) -> DeleteNotifs {
        DeleteNotifs::default()
    }
}
