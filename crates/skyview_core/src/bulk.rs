/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Columnar batch inserts: a fixed column schema, one prepared
//! `INSERT OR IGNORE` statement reused for every row tuple inside the
//! caller's transaction. Conflicting rows report as ignored so bulk callers
//! can derive side effects from the newly inserted subset only.

use anyhow::Result;
use rusqlite::{Connection, Statement, ToSql};

pub struct BulkWriter<'conn> {
    stmt: Statement<'conn>,
}

impl<'conn> BulkWriter<'conn> {
    pub fn prepare(conn: &'conn Connection, table: &str, columns: &[&str]) -> Result<Self> {
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        Ok(Self {
            stmt: conn.prepare(&sql)?,
        })
    }

    /// Writes one row tuple; returns true when the row was newly inserted
    /// rather than absorbed by a conflict.
    pub fn write(&mut self, row: &[&dyn ToSql]) -> Result<bool> {
        Ok(self.stmt.execute(row)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_db::IndexDb;
    use tempfile::TempDir;

    #[test]
    fn write_reports_inserted_vs_ignored() {
        let tmp = TempDir::new().unwrap();
        let db = IndexDb::open(tmp.path().join("index.db")).unwrap();
        let conn = db.connect().unwrap();
        let mut writer = BulkWriter::prepare(
            &conn,
            "follow",
            &[
                "uri",
                "cid",
                "creator",
                "subject_did",
                "created_at",
                "indexed_at",
                "sort_at",
            ],
        )
        .unwrap();
        let ts = "2026-01-01T00:00:00Z";
        let row: [&dyn ToSql; 7] = [
            &"sv://did:plc:a/net.skyview.graph.follow/1",
            &"c1",
            &"did:plc:a",
            &"did:plc:b",
            &ts,
            &ts,
            &ts,
        ];
        assert!(writer.write(&row).unwrap());
        // Same uri again: conflict-ignored.
        assert!(!writer.write(&row).unwrap());
    }
}
