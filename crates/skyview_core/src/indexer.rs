/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Tagged-variant registry over every record processor. Inbound events
//! dispatch on the uri's collection NSID; unknown collections are skipped
//! with a warning rather than failing the stream.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use skyview_protocol::RecordUri;

use crate::config::IndexerConfig;
use crate::index_db::{self, IndexDb};
use crate::notifications::IndexEffects;
use crate::plugins::{
    feed_generator::FeedGeneratorPlugin, follow::FollowPlugin, labeler::LabelerPlugin,
    like::LikePlugin, list::ListPlugin, list_block::ListBlockPlugin, list_item::ListItemPlugin,
    post::PostPlugin, post_gate::PostGatePlugin, profile::ProfilePlugin, repost::RepostPlugin,
    starter_pack::StarterPackPlugin, thread_gate::ThreadGatePlugin,
    verification::VerificationPlugin,
};
use crate::processor::RecordProcessor;

/// One inbound create event before collection dispatch.
#[derive(Debug, Clone)]
pub struct RawRecordEvent {
    pub uri: RecordUri,
    pub cid: String,
    pub record: serde_json::Value,
    pub timestamp: String,
}

enum Processor {
    Post(RecordProcessor<PostPlugin>),
    Like(RecordProcessor<LikePlugin>),
    Repost(RecordProcessor<RepostPlugin>),
    Follow(RecordProcessor<FollowPlugin>),
    List(RecordProcessor<ListPlugin>),
    ListItem(RecordProcessor<ListItemPlugin>),
    ListBlock(RecordProcessor<ListBlockPlugin>),
    Profile(RecordProcessor<ProfilePlugin>),
    FeedGenerator(RecordProcessor<FeedGeneratorPlugin>),
    Labeler(RecordProcessor<LabelerPlugin>),
    StarterPack(RecordProcessor<StarterPackPlugin>),
    ThreadGate(RecordProcessor<ThreadGatePlugin>),
    PostGate(RecordProcessor<PostGatePlugin>),
    Verification(RecordProcessor<VerificationPlugin>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Processor::Post($p) => $body,
            Processor::Like($p) => $body,
            Processor::Repost($p) => $body,
            Processor::Follow($p) => $body,
            Processor::List($p) => $body,
            Processor::ListItem($p) => $body,
            Processor::ListBlock($p) => $body,
            Processor::Profile($p) => $body,
            Processor::FeedGenerator($p) => $body,
            Processor::Labeler($p) => $body,
            Processor::StarterPack($p) => $body,
            Processor::ThreadGate($p) => $body,
            Processor::PostGate($p) => $body,
            Processor::Verification($p) => $body,
        }
    };
}

impl Processor {
    fn collection(&self) -> &'static str {
        dispatch!(self, p => p.collection())
    }

    fn index(
        &self,
        conn: &mut Connection,
        uri: &RecordUri,
        cid: &str,
        body: &serde_json::Value,
        timestamp: &str,
    ) -> Result<IndexEffects> {
        dispatch!(self, p => p.index(conn, uri, cid, body, timestamp))
    }

    fn index_bulk(
        &self,
        conn: &mut Connection,
        events: &[(RecordUri, String, serde_json::Value, String)],
    ) -> Result<IndexEffects> {
        dispatch!(self, p => p.index_bulk(conn, events))
    }

    fn delete(&self, conn: &mut Connection, uri: &RecordUri) -> Result<IndexEffects> {
        dispatch!(self, p => p.delete(conn, uri))
    }
}

pub struct Indexer {
    db: IndexDb,
    processors: Vec<Processor>,
}

impl Indexer {
    pub fn new(db: IndexDb, config: &IndexerConfig) -> Self {
        let processors = vec![
            Processor::Post(RecordProcessor::new(PostPlugin::new(
                config.reply_notif_depth(),
            ))),
            Processor::Like(RecordProcessor::new(LikePlugin)),
            Processor::Repost(RecordProcessor::new(RepostPlugin)),
            Processor::Follow(RecordProcessor::new(FollowPlugin)),
            Processor::List(RecordProcessor::new(ListPlugin)),
            Processor::ListItem(RecordProcessor::new(ListItemPlugin)),
            Processor::ListBlock(RecordProcessor::new(ListBlockPlugin)),
            Processor::Profile(RecordProcessor::new(ProfilePlugin)),
            Processor::FeedGenerator(RecordProcessor::new(FeedGeneratorPlugin)),
            Processor::Labeler(RecordProcessor::new(LabelerPlugin)),
            Processor::StarterPack(RecordProcessor::new(StarterPackPlugin)),
            Processor::ThreadGate(RecordProcessor::new(ThreadGatePlugin)),
            Processor::PostGate(RecordProcessor::new(PostGatePlugin)),
            Processor::Verification(RecordProcessor::new(VerificationPlugin)),
        ];
        Self { db, processors }
    }

    pub fn db(&self) -> &IndexDb {
        &self.db
    }

    fn processor_for(&self, collection: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.collection() == collection)
    }

    /// Indexes one record event. Returns the derived notification effects;
    /// handing them to the queue is the caller's concern.
    pub fn index_record(
        &self,
        uri: &RecordUri,
        cid: &str,
        body: &serde_json::Value,
        timestamp: &str,
    ) -> Result<IndexEffects> {
        let Some(processor) = self.processor_for(uri.collection()) else {
            warn!(collection = uri.collection(), %uri, "skipping record for unknown collection");
            return Ok(IndexEffects::default());
        };
        let mut conn = self.db.connect()?;
        processor.index(&mut conn, uri, cid, body, timestamp)
    }

    /// Batched ingestion: events are partitioned by collection and each
    /// partition takes its plugin's bulk path. Equivalent end state to
    /// indexing every event individually, with one aggregate pass per
    /// partition.
    pub fn index_records_bulk(&self, events: Vec<RawRecordEvent>) -> Result<IndexEffects> {
        let mut groups: BTreeMap<String, Vec<(RecordUri, String, serde_json::Value, String)>> =
            BTreeMap::new();
        for ev in events {
            groups
                .entry(ev.uri.collection().to_string())
                .or_default()
                .push((ev.uri, ev.cid, ev.record, ev.timestamp));
        }
        let mut conn = self.db.connect()?;
        let mut effects = IndexEffects::default();
        for (collection, group) in groups {
            let Some(processor) = self.processor_for(&collection) else {
                warn!(collection = %collection, skipped = group.len(), "skipping bulk records for unknown collection");
                continue;
            };
            effects.merge(processor.index_bulk(&mut conn, &group)?);
        }
        Ok(effects)
    }

    /// Tombstones one record. Unknown collections only scrub the generic
    /// record row.
    pub fn delete_record(&self, uri: &RecordUri) -> Result<IndexEffects> {
        let mut conn = self.db.connect()?;
        let Some(processor) = self.processor_for(uri.collection()) else {
            warn!(collection = uri.collection(), %uri, "delete for unknown collection");
            index_db::delete_record_row(&conn, &uri.to_string())?;
            return Ok(IndexEffects::default());
        };
        processor.delete(&mut conn, uri)
    }
}
