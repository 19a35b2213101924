/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod records;
pub mod uri;

pub use uri::{RecordUri, UriError};

/// Collection NSIDs for every record type the indexer understands.
pub mod collections {
    pub const POST: &str = "net.skyview.feed.post";
    pub const LIKE: &str = "net.skyview.feed.like";
    pub const REPOST: &str = "net.skyview.feed.repost";
    pub const FEED_GENERATOR: &str = "net.skyview.feed.generator";
    pub const THREAD_GATE: &str = "net.skyview.feed.threadGate";
    pub const POST_GATE: &str = "net.skyview.feed.postGate";
    pub const FOLLOW: &str = "net.skyview.graph.follow";
    pub const LIST: &str = "net.skyview.graph.list";
    pub const LIST_ITEM: &str = "net.skyview.graph.listItem";
    pub const LIST_BLOCK: &str = "net.skyview.graph.listBlock";
    pub const STARTER_PACK: &str = "net.skyview.graph.starterPack";
    pub const VERIFICATION: &str = "net.skyview.graph.verification";
    pub const PROFILE: &str = "net.skyview.actor.profile";
    pub const LABELER: &str = "net.skyview.labeler.service";
}
