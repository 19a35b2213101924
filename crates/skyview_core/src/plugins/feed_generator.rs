/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::FeedGeneratorRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::normalize_datetime;
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct FeedGeneratorPlugin;

#[derive(Debug, Clone)]
pub struct FeedGeneratorRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub feed_did: String,
    pub display_name: String,
    pub description: Option<String>,
    pub description_facets: Option<String>,
    pub avatar_cid: Option<String>,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 10] = [
    "uri",
    "cid",
    "creator",
    "feed_did",
    "display_name",
    "description",
    "description_facets",
    "avatar_cid",
    "created_at",
    "indexed_at",
];

fn build_row(
    uri: &RecordUri,
    cid: &str,
    record: &FeedGeneratorRecord,
    timestamp: &str,
) -> FeedGeneratorRow {
    FeedGeneratorRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        feed_did: record.did.clone(),
        display_name: record.display_name.clone(),
        description: record.description.clone(),
        description_facets: (!record.description_facets.is_empty())
            .then(|| serde_json::to_string(&record.description_facets).unwrap_or_default()),
        avatar_cid: record.avatar.as_ref().map(|a| a.cid.clone()),
        created_at: normalize_datetime(&record.created_at),
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &FeedGeneratorRow) -> Result<bool> {
    let values: [&dyn ToSql; 10] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.feed_did,
        &row.display_name,
        &row.description,
        &row.description_facets,
        &row.avatar_cid,
        &row.created_at,
        &row.indexed_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<FeedGeneratorRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, feed_did, display_name, description,
                    description_facets, avatar_cid, created_at, indexed_at
             FROM feed_generator WHERE uri=?1",
            params![uri],
            |r| {
                Ok(FeedGeneratorRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    feed_did: r.get(3)?,
                    display_name: r.get(4)?,
                    description: r.get(5)?,
                    description_facets: r.get(6)?,
                    avatar_cid: r.get(7)?,
                    created_at: r.get(8)?,
                    indexed_at: r.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for FeedGeneratorPlugin {
    type Record = FeedGeneratorRecord;
    type Row = FeedGeneratorRow;

    fn collection(&self) -> &'static str {
        collections::FEED_GENERATOR
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
        let mut writer = BulkWriter::prepare(conn, "feed_generator", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "feed_generator", &COLUMNS)?;
        let mut inserted = Vec::new();
        for ev in records {
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
        conn.execute("DELETE FROM feed_generator WHERE uri=?1", params![uri])?;
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
