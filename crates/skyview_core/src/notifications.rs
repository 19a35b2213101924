/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Derived notification records and the background handoff queue. The
//! indexer only *produces* notifications and retraction sets; fan-out to
//! recipients happens asynchronously behind a [`NotificationSink`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::datetime::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationReason {
    Like,
    LikeViaRepost,
    Repost,
    RepostViaRepost,
    Follow,
    Mention,
    Reply,
    Quote,
    Verified,
    Unverified,
    #[serde(rename = "starterpack-joined")]
    StarterPackJoined,
}

impl NotificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::LikeViaRepost => "like-via-repost",
            Self::Repost => "repost",
            Self::RepostViaRepost => "repost-via-repost",
            Self::Follow => "follow",
            Self::Mention => "mention",
            Self::Reply => "reply",
            Self::Quote => "quote",
            Self::Verified => "verified",
            Self::Unverified => "unverified",
            Self::StarterPackJoined => "starterpack-joined",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "like" => Some(Self::Like),
            "like-via-repost" => Some(Self::LikeViaRepost),
            "repost" => Some(Self::Repost),
            "repost-via-repost" => Some(Self::RepostViaRepost),
            "follow" => Some(Self::Follow),
            "mention" => Some(Self::Mention),
            "reply" => Some(Self::Reply),
            "quote" => Some(Self::Quote),
            "verified" => Some(Self::Verified),
            "unverified" => Some(Self::Unverified),
            "starterpack-joined" => Some(Self::StarterPackJoined),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully re-derivable from the indexed row that caused it; never a source
/// of truth.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    /// Recipient identity.
    pub did: String,
    /// Identity whose action caused the notification.
    pub author: String,
    pub reason: NotificationReason,
    pub reason_subject: Option<String>,
    pub record_uri: String,
    pub record_cid: String,
    pub sort_at: String,
}

/// What a delete hands back to the processor: notifications to emit (e.g. a
/// revocation, or the full set for a promoted duplicate) plus record uris
/// whose previously emitted notifications must be retracted.
#[derive(Debug, Clone, Default)]
pub struct DeleteNotifs {
    pub notifs: Vec<Notification>,
    pub to_delete: Vec<String>,
}

/// Accumulated side effects of one indexing operation, returned by value and
/// handed to the queue by the caller.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexEffects {
    pub notifications: Vec<Notification>,
    pub retract_uris: Vec<String>,
}

impl IndexEffects {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.retract_uris.is_empty()
    }

    pub fn merge(&mut self, other: IndexEffects) {
        self.notifications.extend(other.notifications);
        self.retract_uris.extend(other.retract_uris);
    }
}

/// Downstream fan-out boundary. Delivery is fire-and-forget from the
/// indexer's perspective; implementations own retry policy.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, batch: Vec<Notification>) -> Result<()>;
    async fn retract(&self, record_uris: Vec<String>) -> Result<()>;
}

/// Persistent handoff queue between the synchronous indexer and the async
/// fan-out worker. Effects land in queue tables inside one transaction; a
/// tokio worker drains them toward the sink.
#[derive(Clone)]
pub struct NotificationQueue {
    db_path: PathBuf,
    notify: Arc<Notify>,
}

#[derive(Debug, Clone)]
struct QueuedNotification {
    id: i64,
    notif: Notification,
}

impl NotificationQueue {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)
            .with_context(|| format!("open notification queue: {}", db_path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS notification_jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at_ms INTEGER NOT NULL,
              did TEXT NOT NULL,
              author TEXT NOT NULL,
              reason TEXT NOT NULL,
              reason_subject TEXT NULL,
              record_uri TEXT NOT NULL,
              record_cid TEXT NOT NULL,
              sort_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notif_jobs_record ON notification_jobs(record_uri);
            CREATE TABLE IF NOT EXISTS retraction_jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at_ms INTEGER NOT NULL,
              record_uri TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            db_path,
            notify: Arc::new(Notify::new()),
        })
    }

    /// Persists one operation's effects atomically. Retractions also drop
    /// still-pending jobs for the same record so a delete racing its own
    /// insert never fans out.
    pub fn enqueue_blocking(&self, effects: &IndexEffects) -> Result<u64> {
        if effects.is_empty() {
            return Ok(0);
        }
        let now = now_ms();
        let mut conn = Connection::open(&self.db_path)?;
        let tx = conn.transaction()?;
        let mut queued = 0u64;
        for uri in &effects.retract_uris {
            tx.execute(
                "DELETE FROM notification_jobs WHERE record_uri=?1",
                params![uri],
            )?;
            tx.execute(
                "INSERT INTO retraction_jobs(created_at_ms, record_uri) VALUES (?1, ?2)",
                params![now, uri],
            )?;
            queued += 1;
        }
        for n in &effects.notifications {
            tx.execute(
                "INSERT INTO notification_jobs(created_at_ms, did, author, reason, reason_subject, record_uri, record_cid, sort_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    now,
                    n.did,
                    n.author,
                    n.reason.as_str(),
                    n.reason_subject,
                    n.record_uri,
                    n.record_cid,
                    n.sort_at
                ],
            )?;
            queued += 1;
        }
        tx.commit()?;
        self.notify.notify_one();
        Ok(queued)
    }

    pub async fn enqueue(&self, effects: IndexEffects) -> Result<u64> {
        let queue = self.clone();
        tokio::task::spawn_blocking(move || queue.enqueue_blocking(&effects))
            .await
            .context("notification enqueue task panicked")?
    }

    pub fn pending_blocking(&self) -> Result<u64> {
        let conn = Connection::open(&self.db_path)?;
        let notifs: u64 = conn.query_row("SELECT COUNT(*) FROM notification_jobs", [], |r| {
            r.get(0)
        })?;
        let retractions: u64 =
            conn.query_row("SELECT COUNT(*) FROM retraction_jobs", [], |r| r.get(0))?;
        Ok(notifs + retractions)
    }

    fn drain_batch_blocking(&self, limit: u32) -> Result<(Vec<QueuedNotification>, Vec<(i64, String)>)> {
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, did, author, reason, reason_subject, record_uri, record_cid, sort_at
             FROM notification_jobs ORDER BY id ASC LIMIT ?1",
        )?;
        let notifs = stmt
            .query_map(params![limit], |r| {
                let reason: String = r.get(3)?;
                Ok((
                    r.get::<_, i64>(0)?,
                    reason,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let notifs = notifs
            .into_iter()
            .filter_map(|(id, reason, did, author, reason_subject, uri, cid, sort_at)| {
                let Some(reason) = NotificationReason::parse(&reason) else {
                    warn!(id, reason = %reason, "dropping notification job with unknown reason");
                    return None;
                };
                Some(QueuedNotification {
                    id,
                    notif: Notification {
                        did,
                        author,
                        reason,
                        reason_subject,
                        record_uri: uri,
                        record_cid: cid,
                        sort_at,
                    },
                })
            })
            .collect();
        let mut stmt = conn.prepare(
            "SELECT id, record_uri FROM retraction_jobs ORDER BY id ASC LIMIT ?1",
        )?;
        let retractions = stmt
            .query_map(params![limit], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((notifs, retractions))
    }

    fn ack_blocking(&self, notif_ids: &[i64], retraction_ids: &[i64]) -> Result<()> {
        let mut conn = Connection::open(&self.db_path)?;
        let tx = conn.transaction()?;
        for id in notif_ids {
            tx.execute("DELETE FROM notification_jobs WHERE id=?1", params![id])?;
        }
        for id in retraction_ids {
            tx.execute("DELETE FROM retraction_jobs WHERE id=?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Drains everything currently queued into the sink. Returns the number
    /// of jobs handed off.
    pub async fn drain_once(&self, sink: &dyn NotificationSink, batch: u32) -> Result<u64> {
        let queue = self.clone();
        let (notifs, retractions) =
            tokio::task::spawn_blocking(move || queue.drain_batch_blocking(batch))
                .await
                .context("notification drain task panicked")??;
        if notifs.is_empty() && retractions.is_empty() {
            return Ok(0);
        }
        let handed = (notifs.len() + retractions.len()) as u64;
        if !retractions.is_empty() {
            sink.retract(retractions.iter().map(|(_, uri)| uri.clone()).collect())
                .await?;
        }
        if !notifs.is_empty() {
            sink.deliver(notifs.iter().map(|q| q.notif.clone()).collect())
                .await?;
        }
        let notif_ids: Vec<i64> = notifs.iter().map(|q| q.id).collect();
        let retraction_ids: Vec<i64> = retractions.iter().map(|(id, _)| *id).collect();
        let queue = self.clone();
        tokio::task::spawn_blocking(move || queue.ack_blocking(&notif_ids, &retraction_ids))
            .await
            .context("notification ack task panicked")??;
        Ok(handed)
    }

    /// Spawns the drain loop. Wakes on enqueue, polls on an interval as a
    /// fallback, exits when the shutdown watch flips.
    pub fn start_worker(
        &self,
        sink: Arc<dyn NotificationSink>,
        poll_interval: Duration,
        batch: u32,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            info!("notification queue worker started");
            let mut tick = tokio::time::interval(poll_interval.max(Duration::from_millis(100)));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = queue.notify.notified() => {}
                    _ = tick.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("notification queue worker stopping");
                            return;
                        }
                    }
                }
                loop {
                    match queue.drain_once(sink.as_ref(), batch).await {
                        Ok(0) => break,
                        Ok(n) => debug!(handed = n, "notification batch handed to sink"),
                        Err(err) => {
                            warn!(error = %err, "notification drain failed; will retry");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Notification>>,
        retracted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, batch: Vec<Notification>) -> Result<()> {
            self.delivered.lock().unwrap().extend(batch);
            Ok(())
        }

        async fn retract(&self, record_uris: Vec<String>) -> Result<()> {
            self.retracted.lock().unwrap().extend(record_uris);
            Ok(())
        }
    }

    fn notif(record_uri: &str) -> Notification {
        Notification {
            did: "did:plc:bob".into(),
            author: "did:plc:alice".into(),
            reason: NotificationReason::Like,
            reason_subject: Some("sv://did:plc:bob/net.skyview.feed.post/1".into()),
            record_uri: record_uri.into(),
            record_cid: "cid1".into(),
            sort_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn enqueue_and_drain_hands_everything_to_sink() {
        let tmp = TempDir::new().unwrap();
        let queue = NotificationQueue::open(tmp.path().join("queue.db")).unwrap();
        let effects = IndexEffects {
            notifications: vec![notif("sv://did:plc:alice/net.skyview.feed.like/1")],
            retract_uris: vec!["sv://did:plc:alice/net.skyview.feed.like/0".into()],
        };
        queue.enqueue(effects).await.unwrap();
        assert_eq!(queue.pending_blocking().unwrap(), 2);

        let sink = RecordingSink::default();
        let handed = queue.drain_once(&sink, 100).await.unwrap();
        assert_eq!(handed, 2);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(sink.retracted.lock().unwrap().len(), 1);
        assert_eq!(queue.pending_blocking().unwrap(), 0);
    }

    #[tokio::test]
    async fn worker_drains_on_enqueue_and_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let queue = NotificationQueue::open(tmp.path().join("queue.db")).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let config = crate::config::IndexerConfig::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = queue.start_worker(
            sink.clone(),
            config.queue_poll_interval(),
            config.queue_drain_batch(),
            shutdown_rx,
        );

        queue
            .enqueue(IndexEffects {
                notifications: vec![notif("sv://did:plc:alice/net.skyview.feed.like/1")],
                retract_uris: vec![],
            })
            .await
            .unwrap();
        for _ in 0..50 {
            if queue.pending_blocking().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.pending_blocking().unwrap(), 0);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn retraction_drops_pending_jobs_for_same_record() {
        let tmp = TempDir::new().unwrap();
        let queue = NotificationQueue::open(tmp.path().join("queue.db")).unwrap();
        let uri = "sv://did:plc:alice/net.skyview.feed.like/7";
        queue
            .enqueue(IndexEffects {
                notifications: vec![notif(uri)],
                retract_uris: vec![],
            })
            .await
            .unwrap();
        queue
            .enqueue(IndexEffects {
                notifications: vec![],
                retract_uris: vec![uri.to_string()],
            })
            .await
            .unwrap();

        let sink = RecordingSink::default();
        queue.drain_once(&sink, 100).await.unwrap();
        // The pending like notification never reached the sink.
        assert!(sink.delivered.lock().unwrap().is_empty());
        assert_eq!(sink.retracted.lock().unwrap().len(), 1);
    }
}
