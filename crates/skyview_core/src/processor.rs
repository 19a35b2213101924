/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Generic per-record-type orchestration: duplicate suppression, insert and
//! delete lifecycles, notification derivation and aggregate maintenance.
//! Each operation runs inside one transaction on the caller's connection,
//! so a plugin failure never leaves a row without its side effects.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use skyview_protocol::RecordUri;

use crate::index_db;
use crate::notifications::{DeleteNotifs, IndexEffects, Notification};

#[derive(Debug, Error)]
pub enum IndexError {
    /// Permanent: the record contradicts an ownership/shape invariant and
    /// must not be indexed. Not retryable unless upstream data changes.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Counter recomputation failed after rows were written. Retryable by
    /// re-running recomputation for the affected subjects without
    /// re-ingesting records.
    #[error("aggregate maintenance failed: {0}")]
    AggregateMaintenance(String),
    /// The record body did not deserialize as its collection's shape.
    #[error("malformed record body for {collection}: {message}")]
    MalformedRecord {
        collection: String,
        message: String,
    },
}

/// One inbound create event, typed to a plugin's record shape.
#[derive(Debug, Clone)]
pub struct RecordEvent<R> {
    pub uri: RecordUri,
    pub cid: String,
    pub record: R,
    pub timestamp: String,
}

/// Capability interface implemented once per record type. Each plugin owns
/// exactly one primary table (the post plugin also owns its embed tables)
/// and is only ever invoked through [`RecordProcessor`].
pub trait RecordPlugin {
    type Record: DeserializeOwned + Serialize + Clone;
    type Row: Clone;

    fn collection(&self) -> &'static str;

    /// Conflict-safe insert. Returns None when the uri was already indexed
    /// (or the record is intentionally ignored, e.g. a non-self profile);
    /// all side-effect derivation is skipped in that case.
    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>>;

    /// Vectorized insert with the same validation; tolerates pre-existing
    /// rows and returns only the rows actually inserted.
    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>>;

    /// For relational types: the canonical uri of an existing row for the
    /// same semantic subject, if any. Content types return None.
    fn find_duplicate(
        &self,
        _conn: &Connection,
        _uri: &RecordUri,
        _record: &Self::Record,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    /// Removes the row plus any secondary rows keyed by it, returning what
    /// was removed for notification/aggregate derivation.
    fn delete(&self, conn: &Connection, uri: &RecordUri) -> Result<Option<Self::Row>>;

    /// Pure derivation from an inserted row. Implementations must suppress
    /// notifications to the acting creator.
    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification>;

    /// When a promoted duplicate exists the deleted record's notifications
    /// stay valid under the replacement and nothing is retracted.
    fn notifs_for_delete(&self, deleted: &Self::Row, replaced_by: Option<&Self::Row>)
        -> DeleteNotifs;

    /// Recomputes counters affected by the row. Default: the type has no
    /// denormalized counters.
    fn update_aggregates(&self, _conn: &Connection, _row: &Self::Row) -> Result<()> {
        Ok(())
    }

    /// Batched recomputation: one pass over the distinct subjects touched
    /// by the batch, never one query per row.
    fn update_aggregates_bulk(&self, _conn: &Connection, _rows: &[Self::Row]) -> Result<()> {
        Ok(())
    }
}

pub struct RecordProcessor<P> {
    plugin: P,
}

impl<P: RecordPlugin> RecordProcessor<P> {
    pub fn new(plugin: P) -> Self {
        Self { plugin }
    }

    pub fn collection(&self) -> &'static str {
        self.plugin.collection()
    }

    fn decode(&self, body: &serde_json::Value) -> Result<P::Record> {
        serde_json::from_value(body.clone()).map_err(|e| {
            IndexError::MalformedRecord {
                collection: self.plugin.collection().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Indexes one record. Re-ingesting an already indexed uri is a no-op;
    /// a record whose semantic subject is already held by a different uri
    /// is parked as a suppressed duplicate (first writer wins).
    pub fn index(
        &self,
        conn: &mut Connection,
        uri: &RecordUri,
        cid: &str,
        body: &serde_json::Value,
        timestamp: &str,
    ) -> Result<IndexEffects> {
        let record = self.decode(body)?;
        let uri_str = uri.to_string();
        let tx = conn.transaction()?;
        index_db::put_record(&tx, uri, cid, &body.to_string(), timestamp)?;

        if let Some(canonical) = self.plugin.find_duplicate(&tx, uri, &record)? {
            if canonical != uri_str {
                debug!(uri = %uri_str, %canonical, "suppressing duplicate record");
                index_db::put_duplicate_record(&tx, &uri_str, cid, &canonical, timestamp)?;
                tx.commit()?;
                return Ok(IndexEffects::default());
            }
        }

        let mut effects = IndexEffects::default();
        if let Some(row) = self.plugin.insert(&tx, uri, cid, &record, timestamp)? {
            effects.notifications = self.plugin.notifs_for_insert(&row);
            self.plugin.update_aggregates(&tx, &row)?;
        } else {
            debug!(uri = %uri_str, "record already indexed or ignored");
        }
        tx.commit()?;
        Ok(effects)
    }

    /// Batched indexing: conflict-ignore row inserts first, then one
    /// aggregate recomputation pass over the distinct subjects the batch
    /// touched. Side effects are derived only from rows actually inserted.
    pub fn index_bulk(
        &self,
        conn: &mut Connection,
        events: &[(RecordUri, String, serde_json::Value, String)],
    ) -> Result<IndexEffects> {
        let mut typed = Vec::with_capacity(events.len());
        for (uri, cid, body, timestamp) in events {
            typed.push(RecordEvent {
                uri: uri.clone(),
                cid: cid.clone(),
                record: self.decode(body)?,
                timestamp: timestamp.clone(),
            });
        }
        let tx = conn.transaction()?;
        for (uri, cid, body, timestamp) in events {
            index_db::put_record(&tx, uri, cid, &body.to_string(), timestamp)?;
        }
        let inserted = self.plugin.insert_bulk(&tx, &typed)?;
        let mut effects = IndexEffects::default();
        for row in &inserted {
            effects.notifications.extend(self.plugin.notifs_for_insert(row));
        }
        if !inserted.is_empty() {
            self.plugin.update_aggregates_bulk(&tx, &inserted)?;
        }
        tx.commit()?;
        debug!(
            collection = self.plugin.collection(),
            batch = events.len(),
            inserted = inserted.len(),
            "bulk indexed"
        );
        Ok(effects)
    }

    /// Deletes one record. If a suppressed duplicate exists it is promoted
    /// to canonical in the same transaction, and notification retraction is
    /// skipped since the promoted record keeps the subject notified.
    pub fn delete(&self, conn: &mut Connection, uri: &RecordUri) -> Result<IndexEffects> {
        let uri_str = uri.to_string();
        let tx = conn.transaction()?;
        index_db::delete_record_row(&tx, &uri_str)?;
        index_db::remove_duplicate_record(&tx, &uri_str)?;

        let Some(deleted) = self.plugin.delete(&tx, uri)? else {
            tx.commit()?;
            debug!(uri = %uri_str, "delete for unindexed record; no-op");
            return Ok(IndexEffects::default());
        };

        let replaced_by = self.promote_duplicate(&tx, &uri_str)?;
        let DeleteNotifs { notifs, to_delete } = self
            .plugin
            .notifs_for_delete(&deleted, replaced_by.as_ref());
        let effects = IndexEffects {
            notifications: notifs,
            retract_uris: to_delete,
        };
        let agg_row = replaced_by.as_ref().unwrap_or(&deleted);
        self.plugin.update_aggregates(&tx, agg_row)?;
        tx.commit()?;
        Ok(effects)
    }

    /// Re-indexes the most recent suppressed duplicate of a just-deleted
    /// canonical record, re-reading its body from the record table.
    fn promote_duplicate(&self, tx: &Connection, deleted_uri: &str) -> Result<Option<P::Row>> {
        let Some(dup) = index_db::pop_latest_duplicate(tx, deleted_uri)? else {
            return Ok(None);
        };
        let Some(json) = index_db::get_record_json(tx, &dup.uri)? else {
            warn!(uri = %dup.uri, "suppressed duplicate has no stored record body; skipping promotion");
            return Ok(None);
        };
        let dup_uri = match RecordUri::parse(&dup.uri) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(uri = %dup.uri, error = %err, "unparsable duplicate uri; skipping promotion");
                return Ok(None);
            }
        };
        let body: serde_json::Value =
            serde_json::from_str(&json).context("stored duplicate record body is not JSON")?;
        let record = self.decode(&body)?;
        let promoted = self
            .plugin
            .insert(tx, &dup_uri, &dup.cid, &record, &dup.indexed_at)?;
        if promoted.is_some() {
            debug!(uri = %dup.uri, replaced = %deleted_uri, "promoted suppressed duplicate");
        }
        Ok(promoted)
    }
}
