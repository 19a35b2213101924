/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::StarterPackRecord;
use skyview_protocol::{collections, RecordUri};

use crate::bulk::BulkWriter;
use crate::datetime::normalize_datetime;
use crate::notifications::{DeleteNotifs, Notification};
use crate::processor::{RecordEvent, RecordPlugin};

pub struct StarterPackPlugin;

#[derive(Debug, Clone)]
pub struct StarterPackRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub name: String,
    pub created_at: String,
    pub indexed_at: String,
}

const COLUMNS: [&str; 6] = ["uri", "cid", "creator", "name", "created_at", "indexed_at"];

fn build_row(
    uri: &RecordUri,
    cid: &str,
    record: &StarterPackRecord,
    timestamp: &str,
) -> StarterPackRow {
    StarterPackRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        name: record.name.clone(),
        created_at: normalize_datetime(&record.created_at),
        indexed_at: timestamp.to_string(),
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &StarterPackRow) -> Result<bool> {
    let values: [&dyn ToSql; 6] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.name,
        &row.created_at,
        &row.indexed_at,
    ];
    writer.write(&values)
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<StarterPackRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, name, created_at, indexed_at FROM starter_pack WHERE uri=?1",
            params![uri],
            |r| {
                Ok(StarterPackRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    name: r.get(3)?,
                    created_at: r.get(4)?,
                    indexed_at: r.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

impl RecordPlugin for StarterPackPlugin {
    type Record = StarterPackRecord;
    type Row = StarterPackRow;

    fn collection(&self) -> &'static str {
        collections::STARTER_PACK
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
        let mut writer = BulkWriter::prepare(conn, "starter_pack", &COLUMNS)?;
        Ok(write_row(&mut writer, &row)?.then_some(row))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut writer = BulkWriter::prepare(conn, "starter_pack", &COLUMNS)?;
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
        conn.execute("DELETE FROM starter_pack WHERE uri=?1", params![uri])?;
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
