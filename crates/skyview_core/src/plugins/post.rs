/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The post plugin owns the primary post table plus the embed tables, the
//! quote table and the feed index. Reply validation, thread-gate policy and
//! the out-of-order notification compensation live here.

use std::collections::HashSet;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use skyview_protocol::records::{Embed, FacetFeature, PostRecord, ThreadGateRecord};
use skyview_protocol::uri::uri_to_did;
use skyview_protocol::{collections, RecordUri};

use crate::aggregates::{
    recompute_post_count, recompute_post_counts, recompute_profile_count,
    recompute_profile_counts, recompute_quote_count, PostCount, ProfileCount,
};
use crate::bulk::BulkWriter;
use crate::datetime::{normalize_datetime, sort_at};
use crate::notifications::{DeleteNotifs, Notification, NotificationReason};
use crate::processor::{RecordEvent, RecordPlugin};
use crate::thread::{self, PostAncestor, PostDescendant};

pub struct PostPlugin {
    reply_notif_depth: i64,
}

impl PostPlugin {
    pub fn new(reply_notif_depth: i64) -> Self {
        Self { reply_notif_depth }
    }
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub uri: String,
    pub cid: String,
    pub creator: String,
    pub text: String,
    pub reply_root: Option<String>,
    pub reply_root_cid: Option<String>,
    pub reply_parent: Option<String>,
    pub reply_parent_cid: Option<String>,
    pub langs: Option<String>,
    pub tags: Option<String>,
    pub invalid_reply_root: Option<bool>,
    pub violates_thread_gate: Option<bool>,
    pub violates_embedding_rules: Option<bool>,
    pub created_at: String,
    pub indexed_at: String,
    pub sort_at: String,
}

#[derive(Debug, Clone)]
pub struct ImageEmbedRow {
    pub post_uri: String,
    pub position: i64,
    pub image_cid: String,
    pub alt: String,
}

#[derive(Debug, Clone)]
pub struct ExternalEmbedRow {
    pub post_uri: String,
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb_cid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordEmbedRow {
    pub post_uri: String,
    pub embed_uri: String,
    pub embed_cid: String,
}

#[derive(Debug, Clone)]
pub struct VideoEmbedRow {
    pub post_uri: String,
    pub video_cid: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone)]
pub enum IndexedEmbed {
    Images(Vec<ImageEmbedRow>),
    External(ExternalEmbedRow),
    Record(RecordEmbedRow),
    Video(VideoEmbedRow),
}

#[derive(Debug, Clone)]
pub enum FacetSeed {
    Mention(String),
    Link(String),
}

/// Everything derived while indexing one post; notification derivation is a
/// pure function of this.
#[derive(Debug, Clone)]
pub struct IndexedPost {
    pub post: PostRow,
    pub facets: Vec<FacetSeed>,
    pub embeds: Vec<IndexedEmbed>,
    pub ancestors: Vec<PostAncestor>,
    pub descendants: Vec<PostDescendant>,
    pub thread_gate: Option<ThreadGateRecord>,
}

const COLUMNS: [&str; 13] = [
    "uri",
    "cid",
    "creator",
    "text",
    "reply_root",
    "reply_root_cid",
    "reply_parent",
    "reply_parent_cid",
    "langs",
    "tags",
    "created_at",
    "indexed_at",
    "sort_at",
];

const FEED_ITEM_COLUMNS: [&str; 6] = ["uri", "cid", "type", "post_uri", "originator_did", "sort_at"];

fn build_row(uri: &RecordUri, cid: &str, record: &PostRecord, timestamp: &str) -> PostRow {
    let created_at = normalize_datetime(&record.created_at);
    let sort_at = sort_at(&created_at, timestamp);
    PostRow {
        uri: uri.to_string(),
        cid: cid.to_string(),
        creator: uri.did().to_string(),
        text: record.text.clone(),
        reply_root: record.reply.as_ref().map(|r| r.root.uri.clone()),
        reply_root_cid: record.reply.as_ref().map(|r| r.root.cid.clone()),
        reply_parent: record.reply.as_ref().map(|r| r.parent.uri.clone()),
        reply_parent_cid: record.reply.as_ref().map(|r| r.parent.cid.clone()),
        langs: (!record.langs.is_empty())
            .then(|| serde_json::to_string(&record.langs).unwrap_or_default()),
        tags: (!record.tags.is_empty())
            .then(|| serde_json::to_string(&record.tags).unwrap_or_default()),
        invalid_reply_root: None,
        violates_thread_gate: None,
        violates_embedding_rules: None,
        created_at,
        indexed_at: timestamp.to_string(),
        sort_at,
    }
}

fn write_row(writer: &mut BulkWriter<'_>, row: &PostRow) -> Result<bool> {
    let values: [&dyn ToSql; 13] = [
        &row.uri,
        &row.cid,
        &row.creator,
        &row.text,
        &row.reply_root,
        &row.reply_root_cid,
        &row.reply_parent,
        &row.reply_parent_cid,
        &row.langs,
        &row.tags,
        &row.created_at,
        &row.indexed_at,
        &row.sort_at,
    ];
    writer.write(&values)
}

fn write_feed_item(writer: &mut BulkWriter<'_>, row: &PostRow) -> Result<bool> {
    let values: [&dyn ToSql; 6] = [
        &row.uri,
        &row.cid,
        &"post",
        &row.uri,
        &row.creator,
        &row.sort_at,
    ];
    writer.write(&values)
}

/// Record-with-media splits into its record part and its media part; every
/// other embed stands alone.
fn separate_embeds(embed: Option<&Embed>) -> Vec<Embed> {
    match embed {
        None => vec![],
        Some(Embed::RecordWithMedia { record, media }) => vec![
            Embed::Record {
                record: record.clone(),
            },
            (**media).clone(),
        ],
        Some(other) => vec![other.clone()],
    }
}

fn facet_seeds(record: &PostRecord) -> Vec<FacetSeed> {
    record
        .facets
        .iter()
        .flat_map(|f| &f.features)
        .filter_map(|feature| match feature {
            FacetFeature::Mention { did } => Some(FacetSeed::Mention(did.clone())),
            FacetFeature::Link { uri } => Some(FacetSeed::Link(uri.clone())),
            FacetFeature::Tag { .. } => None,
        })
        .collect()
}

/// Indexes every embed of a freshly inserted post. Returns the embed rows,
/// the quoted (uri, cid) subjects whose quote counts need recomputation,
/// and whether a quote violated the quoted post's embedding rules.
fn index_embeds(
    conn: &Connection,
    row: &PostRow,
    record: &PostRecord,
) -> Result<(Vec<IndexedEmbed>, Vec<(String, String)>, Option<bool>)> {
    let mut embeds = Vec::new();
    let mut quoted = Vec::new();
    let mut violates_embedding = None;
    for embed in separate_embeds(record.embed.as_ref()) {
        match embed {
            Embed::Images { images } => {
                let rows: Vec<ImageEmbedRow> = images
                    .iter()
                    .enumerate()
                    .map(|(i, img)| ImageEmbedRow {
                        post_uri: row.uri.clone(),
                        position: i as i64,
                        image_cid: img.image.cid.clone(),
                        alt: img.alt.clone(),
                    })
                    .collect();
                for img in &rows {
                    conn.execute(
                        "INSERT OR IGNORE INTO post_embed_image(post_uri, position, image_cid, alt)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![img.post_uri, img.position, img.image_cid, img.alt],
                    )?;
                }
                embeds.push(IndexedEmbed::Images(rows));
            }
            Embed::External { external } => {
                let ext = ExternalEmbedRow {
                    post_uri: row.uri.clone(),
                    uri: external.uri.clone(),
                    title: external.title.clone(),
                    description: external.description.clone(),
                    thumb_cid: external.thumb.as_ref().map(|t| t.cid.clone()),
                };
                conn.execute(
                    "INSERT OR IGNORE INTO post_embed_external(post_uri, uri, title, description, thumb_cid)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![ext.post_uri, ext.uri, ext.title, ext.description, ext.thumb_cid],
                )?;
                embeds.push(IndexedEmbed::External(ext));
            }
            Embed::Record { record: subject } => {
                let rec = RecordEmbedRow {
                    post_uri: row.uri.clone(),
                    embed_uri: subject.uri.clone(),
                    embed_cid: subject.cid.clone(),
                };
                conn.execute(
                    "INSERT OR IGNORE INTO post_embed_record(post_uri, embed_uri, embed_cid)
                     VALUES (?1, ?2, ?3)",
                    params![rec.post_uri, rec.embed_uri, rec.embed_cid],
                )?;
                let is_post_quote = RecordUri::parse(&subject.uri)
                    .map(|u| u.collection() == collections::POST)
                    .unwrap_or(false);
                if is_post_quote {
                    conn.execute(
                        "INSERT OR IGNORE INTO quote(uri, cid, subject, subject_cid, created_at, indexed_at, sort_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            row.uri,
                            row.cid,
                            subject.uri,
                            subject.cid,
                            row.created_at,
                            row.indexed_at,
                            row.sort_at
                        ],
                    )?;
                    quoted.push((subject.uri.clone(), subject.cid.clone()));
                    if thread::violates_embedding_rules(conn, &subject.uri, &row.uri)? {
                        violates_embedding = Some(true);
                    }
                }
                embeds.push(IndexedEmbed::Record(rec));
            }
            Embed::Video { video, alt } => {
                let vid = VideoEmbedRow {
                    post_uri: row.uri.clone(),
                    video_cid: video.cid.clone(),
                    alt: alt.clone(),
                };
                conn.execute(
                    "INSERT OR IGNORE INTO post_embed_video(post_uri, video_cid, alt)
                     VALUES (?1, ?2, ?3)",
                    params![vid.post_uri, vid.video_cid, vid.alt],
                )?;
                embeds.push(IndexedEmbed::Video(vid));
            }
            Embed::RecordWithMedia { .. } => {
                // Unreachable: separate_embeds already split it.
            }
        }
    }
    Ok((embeds, quoted, violates_embedding))
}

fn select_row(conn: &Connection, uri: &str) -> Result<Option<PostRow>> {
    let row = conn
        .query_row(
            "SELECT uri, cid, creator, text, reply_root, reply_root_cid, reply_parent,
                    reply_parent_cid, langs, tags, invalid_reply_root, violates_thread_gate,
                    violates_embedding_rules, created_at, indexed_at, sort_at
             FROM post WHERE uri=?1",
            params![uri],
            |r| {
                Ok(PostRow {
                    uri: r.get(0)?,
                    cid: r.get(1)?,
                    creator: r.get(2)?,
                    text: r.get(3)?,
                    reply_root: r.get(4)?,
                    reply_root_cid: r.get(5)?,
                    reply_parent: r.get(6)?,
                    reply_parent_cid: r.get(7)?,
                    langs: r.get(8)?,
                    tags: r.get(9)?,
                    invalid_reply_root: r.get(10)?,
                    violates_thread_gate: r.get(11)?,
                    violates_embedding_rules: r.get(12)?,
                    created_at: r.get(13)?,
                    indexed_at: r.get(14)?,
                    sort_at: r.get(15)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Per-operation dedup: at most one notification per (recipient, record)
/// pair, and never one to the notification's own author. Keying on the
/// record keeps the retroactive descendant notifications alive while still
/// collapsing mention+reply overlap for the newly inserted post.
struct NotifAccumulator {
    seen: HashSet<(String, String)>,
    notifs: Vec<Notification>,
}

impl NotifAccumulator {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            notifs: Vec::new(),
        }
    }

    fn push(&mut self, notif: Notification) {
        if notif.did == notif.author {
            return;
        }
        let key = (notif.did.clone(), notif.record_uri.clone());
        if self.seen.insert(key) {
            self.notifs.push(notif);
        }
    }

    fn into_inner(self) -> Vec<Notification> {
        self.notifs
    }
}

impl RecordPlugin for PostPlugin {
    type Record = PostRecord;
    type Row = IndexedPost;

    fn collection(&self) -> &'static str {
        collections::POST
    }

    fn insert(
        &self,
        conn: &Connection,
        uri: &RecordUri,
        cid: &str,
        record: &Self::Record,
        timestamp: &str,
    ) -> Result<Option<Self::Row>> {
        let mut row = build_row(uri, cid, record, timestamp);
        let mut post_writer = BulkWriter::prepare(conn, "post", &COLUMNS)?;
        let mut feed_writer = BulkWriter::prepare(conn, "feed_item", &FEED_ITEM_COLUMNS)?;
        let fresh = write_row(&mut post_writer, &row)?;
        write_feed_item(&mut feed_writer, &row)?;
        if !fresh {
            // Already indexed: skip every side effect.
            return Ok(None);
        }

        if let Some(reply) = &record.reply {
            let validation = thread::validate_reply(conn, &row.creator, reply)?;
            if validation.invalid_reply_root || validation.violates_thread_gate {
                row.invalid_reply_root = Some(validation.invalid_reply_root);
                row.violates_thread_gate = Some(validation.violates_thread_gate);
                conn.execute(
                    "UPDATE post SET invalid_reply_root=?1, violates_thread_gate=?2 WHERE uri=?3",
                    params![
                        validation.invalid_reply_root,
                        validation.violates_thread_gate,
                        row.uri
                    ],
                )?;
            }
        }

        let (embeds, quoted, violates_embedding) = index_embeds(conn, &row, record)?;
        for (subject_uri, subject_cid) in &quoted {
            recompute_quote_count(conn, subject_uri, subject_cid)?;
        }
        if violates_embedding == Some(true) {
            row.violates_embedding_rules = Some(true);
            conn.execute(
                "UPDATE post SET violates_embedding_rules=1 WHERE uri=?1",
                params![row.uri],
            )?;
        }

        let thread_root = row.reply_root.clone().unwrap_or_else(|| row.uri.clone());
        let thread_gate = thread::thread_gate_record(conn, &thread_root)?;
        let ancestors = thread::ancestors_and_self(conn, &row.uri, self.reply_notif_depth)?;
        let descendants = thread::descendants(conn, &row.uri, self.reply_notif_depth)?;

        Ok(Some(IndexedPost {
            post: row,
            facets: facet_seeds(record),
            embeds,
            ancestors,
            descendants,
            thread_gate,
        }))
    }

    fn insert_bulk(
        &self,
        conn: &Connection,
        records: &[RecordEvent<Self::Record>],
    ) -> Result<Vec<Self::Row>> {
        let mut post_writer = BulkWriter::prepare(conn, "post", &COLUMNS)?;
        let mut feed_writer = BulkWriter::prepare(conn, "feed_item", &FEED_ITEM_COLUMNS)?;
        let mut inserted: Vec<(PostRow, &RecordEvent<PostRecord>)> = Vec::new();
        for ev in records {
            let row = build_row(&ev.uri, &ev.cid, &ev.record, &ev.timestamp);
            let fresh = write_row(&mut post_writer, &row)?;
            write_feed_item(&mut feed_writer, &row)?;
            if fresh {
                inserted.push((row, ev));
            }
        }

        let mut quoted_subjects: Vec<(String, String)> = Vec::new();
        for (row, ev) in &mut inserted {
            if let Some(reply) = &ev.record.reply {
                let validation = thread::validate_reply(conn, &row.creator, reply)?;
                if validation.invalid_reply_root || validation.violates_thread_gate {
                    row.invalid_reply_root = Some(validation.invalid_reply_root);
                    row.violates_thread_gate = Some(validation.violates_thread_gate);
                    conn.execute(
                        "UPDATE post SET invalid_reply_root=?1, violates_thread_gate=?2 WHERE uri=?3",
                        params![
                            validation.invalid_reply_root,
                            validation.violates_thread_gate,
                            row.uri
                        ],
                    )?;
                }
            }
            let (_embeds, quoted, violates_embedding) = index_embeds(conn, row, &ev.record)?;
            quoted_subjects.extend(quoted);
            if violates_embedding == Some(true) {
                row.violates_embedding_rules = Some(true);
                conn.execute(
                    "UPDATE post SET violates_embedding_rules=1 WHERE uri=?1",
                    params![row.uri],
                )?;
            }
        }
        quoted_subjects.sort();
        quoted_subjects.dedup();
        for (subject_uri, subject_cid) in &quoted_subjects {
            recompute_quote_count(conn, subject_uri, subject_cid)?;
        }

        // Backfill batches skip facet/thread derivations, so bulk-inserted
        // posts produce flag and aggregate state but no mention/reply
        // notifications.
        Ok(inserted
            .into_iter()
            .map(|(row, _)| IndexedPost {
                post: row,
                facets: vec![],
                embeds: vec![],
                ancestors: vec![],
                descendants: vec![],
                thread_gate: None,
            })
            .collect())
    }

    fn delete(&self, conn: &Connection, uri: &RecordUri) -> Result<Option<Self::Row>> {
        let uri_str = uri.to_string();
        let deleted = select_row(conn, &uri_str)?;
        conn.execute("DELETE FROM post WHERE uri=?1", params![uri_str])?;
        // Takes the post's own feed entry and any repost entries with it.
        conn.execute("DELETE FROM feed_item WHERE post_uri=?1", params![uri_str])?;
        // Quotes *of* the deleted post.
        conn.execute("DELETE FROM quote WHERE subject=?1", params![uri_str])?;

        let mut embeds = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT post_uri, position, image_cid, alt FROM post_embed_image WHERE post_uri=?1",
        )?;
        let images: Vec<ImageEmbedRow> = stmt
            .query_map(params![uri_str], |r| {
                Ok(ImageEmbedRow {
                    post_uri: r.get(0)?,
                    position: r.get(1)?,
                    image_cid: r.get(2)?,
                    alt: r.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if !images.is_empty() {
            conn.execute("DELETE FROM post_embed_image WHERE post_uri=?1", params![uri_str])?;
            embeds.push(IndexedEmbed::Images(images));
        }

        let external = conn
            .query_row(
                "SELECT post_uri, uri, title, description, thumb_cid
                 FROM post_embed_external WHERE post_uri=?1",
                params![uri_str],
                |r| {
                    Ok(ExternalEmbedRow {
                        post_uri: r.get(0)?,
                        uri: r.get(1)?,
                        title: r.get(2)?,
                        description: r.get(3)?,
                        thumb_cid: r.get(4)?,
                    })
                },
            )
            .optional()?;
        if let Some(ext) = external {
            conn.execute(
                "DELETE FROM post_embed_external WHERE post_uri=?1",
                params![uri_str],
            )?;
            embeds.push(IndexedEmbed::External(ext));
        }

        let record_embed = conn
            .query_row(
                "SELECT post_uri, embed_uri, embed_cid FROM post_embed_record WHERE post_uri=?1",
                params![uri_str],
                |r| {
                    Ok(RecordEmbedRow {
                        post_uri: r.get(0)?,
                        embed_uri: r.get(1)?,
                        embed_cid: r.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(rec) = record_embed {
            conn.execute(
                "DELETE FROM post_embed_record WHERE post_uri=?1",
                params![uri_str],
            )?;
            let was_post_quote = RecordUri::parse(&rec.embed_uri)
                .map(|u| u.collection() == collections::POST)
                .unwrap_or(false);
            if was_post_quote {
                conn.execute("DELETE FROM quote WHERE uri=?1", params![uri_str])?;
                recompute_quote_count(conn, &rec.embed_uri, &rec.embed_cid)?;
            }
            embeds.push(IndexedEmbed::Record(rec));
        }

        let video = conn
            .query_row(
                "SELECT post_uri, video_cid, alt FROM post_embed_video WHERE post_uri=?1",
                params![uri_str],
                |r| {
                    Ok(VideoEmbedRow {
                        post_uri: r.get(0)?,
                        video_cid: r.get(1)?,
                        alt: r.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(vid) = video {
            conn.execute(
                "DELETE FROM post_embed_video WHERE post_uri=?1",
                params![uri_str],
            )?;
            embeds.push(IndexedEmbed::Video(vid));
        }

        Ok(deleted.map(|post| IndexedPost {
            post,
            facets: vec![],
            embeds,
            ancestors: vec![],
            descendants: vec![],
            thread_gate: None,
        }))
    }

    fn notifs_for_insert(&self, row: &Self::Row) -> Vec<Notification> {
        let post = &row.post;
        let mut acc = NotifAccumulator::new();

        for facet in &row.facets {
            if let FacetSeed::Mention(did) = facet {
                acc.push(Notification {
                    did: did.clone(),
                    author: post.creator.clone(),
                    reason: NotificationReason::Mention,
                    reason_subject: None,
                    record_uri: post.uri.clone(),
                    record_cid: post.cid.clone(),
                    sort_at: post.sort_at.clone(),
                });
            }
        }

        if post.violates_embedding_rules != Some(true) {
            for embed in &row.embeds {
                if let IndexedEmbed::Record(rec) = embed {
                    let quoted_post = RecordUri::parse(&rec.embed_uri)
                        .map(|u| u.collection() == collections::POST)
                        .unwrap_or(false);
                    if quoted_post {
                        acc.push(Notification {
                            did: uri_to_did(&rec.embed_uri).to_string(),
                            author: post.creator.clone(),
                            reason: NotificationReason::Quote,
                            reason_subject: Some(rec.embed_uri.clone()),
                            record_uri: post.uri.clone(),
                            record_cid: post.cid.clone(),
                            sort_at: post.sort_at.clone(),
                        });
                    }
                }
            }
        }

        // Gate-violating and invalid-root replies never generate reply
        // notifications.
        if post.violates_thread_gate == Some(true) || post.invalid_reply_root == Some(true) {
            return acc.into_inner();
        }

        let hidden: &[String] = row
            .thread_gate
            .as_ref()
            .map(|g| g.hidden_replies.as_slice())
            .unwrap_or(&[]);

        for ancestor in &row.ancestors {
            if ancestor.uri == post.uri {
                continue;
            }
            if ancestor.height < self.reply_notif_depth {
                acc.push(Notification {
                    did: uri_to_did(&ancestor.uri).to_string(),
                    author: post.creator.clone(),
                    reason: NotificationReason::Reply,
                    reason_subject: Some(ancestor.uri.clone()),
                    record_uri: post.uri.clone(),
                    record_cid: post.cid.clone(),
                    sort_at: post.sort_at.clone(),
                });
                // Ancestors behind a hidden reply stay unnotified.
                if hidden.contains(&ancestor.uri) {
                    break;
                }
            }
        }

        // Descendants mean this post arrived after causally later replies;
        // re-derive the reply notifications those replies should have
        // produced through this post.
        for descendant in &row.descendants {
            for ancestor in &row.ancestors {
                if descendant.depth + ancestor.height < self.reply_notif_depth {
                    acc.push(Notification {
                        did: uri_to_did(&ancestor.uri).to_string(),
                        author: descendant.creator.clone(),
                        reason: NotificationReason::Reply,
                        reason_subject: Some(ancestor.uri.clone()),
                        record_uri: descendant.uri.clone(),
                        record_cid: descendant.cid.clone(),
                        sort_at: descendant.sort_at.clone(),
                    });
                }
            }
        }

        acc.into_inner()
    }

    fn notifs_for_delete(
        &self,
        deleted: &Self::Row,
        replaced_by: Option<&Self::Row>,
    ) -> DeleteNotifs {
        let notifs = replaced_by
            .map(|replacement| self.notifs_for_insert(replacement))
            .unwrap_or_default();
        DeleteNotifs {
            notifs,
            to_delete: vec![deleted.post.uri.clone()],
        }
    }

    fn update_aggregates(&self, conn: &Connection, row: &Self::Row) -> Result<()> {
        if let Some(parent) = &row.post.reply_parent {
            recompute_post_count(conn, parent, PostCount::Reply)?;
        }
        recompute_profile_count(conn, &row.post.creator, ProfileCount::Posts)
    }

    fn update_aggregates_bulk(&self, conn: &Connection, rows: &[Self::Row]) -> Result<()> {
        recompute_post_counts(
            conn,
            rows.iter().filter_map(|r| r.post.reply_parent.clone()),
            PostCount::Reply,
        )?;
        recompute_profile_counts(
            conn,
            rows.iter().map(|r| r.post.creator.clone()),
            ProfileCount::Posts,
        )
    }
}
