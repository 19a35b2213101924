/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};

use skyview_core::config::IndexerConfig;
use skyview_core::datetime::now_rfc3339;
use skyview_core::fingerprint::cid_for_record;
use skyview_core::index_db::IndexDb;
use skyview_core::indexer::Indexer;
use skyview_core::notifications::NotificationQueue;
use skyview_protocol::RecordUri;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db_path = std::env::var("SKYVIEW_DB").unwrap_or_else(|_| "skyview.db".to_string());
    let queue_path =
        std::env::var("SKYVIEW_QUEUE_DB").unwrap_or_else(|_| "skyview-queue.db".to_string());
    let uri = std::env::var("SKYVIEW_URI")
        .context("missing SKYVIEW_URI (sv://<did>/<collection>/<rkey>)")?;
    let record = std::env::var("SKYVIEW_RECORD").context("missing SKYVIEW_RECORD (json body)")?;

    let uri = RecordUri::parse(&uri)?;
    let body: serde_json::Value = serde_json::from_str(&record).context("parse record body")?;
    let cid = std::env::var("SKYVIEW_CID").unwrap_or_else(|_| cid_for_record(&body));
    let timestamp = now_rfc3339();

    let db = IndexDb::open(&db_path)?;
    let indexer = Indexer::new(db, &IndexerConfig::default());
    let queue = NotificationQueue::open(&queue_path)?;

    let effects = indexer.index_record(&uri, &cid, &body, &timestamp)?;
    let queued = queue.enqueue(effects.clone()).await?;

    println!("indexed: {uri} cid={cid}");
    println!("effects: {}", serde_json::to_string_pretty(&effects)?);
    println!("queued {queued} notification jobs into {queue_path}");
    Ok(())
}
