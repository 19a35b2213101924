/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#[derive(Debug, Clone, serde::Deserialize)]
pub struct IndexerConfig {
    /// Reply notifications only reach ancestors within this many hops; also
    /// bounds both thread traversals against cyclic parent pointers.
    pub reply_notif_depth: Option<u32>,

    pub queue_poll_interval_secs: Option<u64>,
    pub queue_drain_batch: Option<u32>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            reply_notif_depth: Some(5),
            queue_poll_interval_secs: Some(5),
            queue_drain_batch: Some(500),
        }
    }
}

impl IndexerConfig {
    pub fn reply_notif_depth(&self) -> i64 {
        i64::from(self.reply_notif_depth.unwrap_or(5).max(1))
    }

    pub fn queue_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.queue_poll_interval_secs.unwrap_or(5).max(1))
    }

    pub fn queue_drain_batch(&self) -> u32 {
        self.queue_drain_batch.unwrap_or(500).max(1)
    }
}
