/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::ListRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct ListPlugin;

#[derive(Debug, Clone)]
pub struct ListRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub name: String,
    pub purpose: String,
    pub description: Option<String>,
    pub description_facets: Option<String>,
    pub avatar_cid: Option<String>,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

const COLUMNS: [&str; 11] = [
    "uri",
    "cid",
    "creator",
    "name",
    "purpose",
    "description",
    "description_facets",
    "avatar_cid",
    "created_at",
    "indexed_at",
    "sort_at",
];

fn build_row(uri: &RecordUri, cid: &str, record: &ListRecord, timestamp: &str) -> ListRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    ListRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        name: record.name.clone(),
        purpose: record.purpose.clone(),
        description: record.description.clone(),
        description_facets: (!record.description_facets.is_empty())
            .then(|| serde_json::to_string(&record.description_facets).unwrap_or_default()),
        avatar_cid: record.avatar.as_ref().map(|a| a.cid.clone()),
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &ListRow) -> Result<bool> {
    let values: [&dyn ToSql; 11] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.name,
        &row.purpose,
        &row.description,
        &row.description_facets,
        &row.avatar_cid,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<ListRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, name, purpose, description, description_facets,
                    avatar_cid, created_at, indexed_at, sort_at
             FROM list WHERE uri=?1",
            params![uri],
            |r| {
                Ok(ListRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    name: r.get(3)?,
                    purpose: r.get(4)?,
                    description: r.get(5)?,
                    description_facets: r.get(6)?,
                    avatar_cid: r.get(7)?,
                    created_at: r.get(8)?,
                    indexed_at: r.get(9)?,
                    sort_at: r.get(10)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for ListPlugin {
    type Record = ListRecord;
    type Row = ListRow;

    fn collection(&self) -> &'static str {
        collections::LIST
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
        let mut writer = BulkWriter::prepare(conn, "list", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "list", &COLUMNS)?;
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
        conn.execute("DELETE FROM list WHERE uri=?1", params![uri])?;
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
