/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! One module per record collection. Each plugin owns its primary table and
//! implements the capability interface the processor drives; the post
//! plugin additionally owns the embed tables and the feed index.

pub mod feed_generator;
pub mod follow;
pub mod labeler;
pub mod like;
pub mod list;
pub mod list_block;
pub mod list_item;
pub mod post;
pub mod post_gate;
pub mod profile;
pub mod repost;
pub mod starter_pack;
pub mod thread_gate;
pub mod verification;
