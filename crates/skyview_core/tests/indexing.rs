/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! End-to-end indexing behavior through the public [`Indexer`] surface.

use serde_json::{json, Value};
use tempfile::TempDir;

use skyview_core::aggregates::{post_agg, profile_agg};
use skyview_core::config::IndexerConfig;
use skyview_core::datetime::now_rfc3339;
use skyview_core::fingerprint::cid_for_record;
use skyview_core::index_db::IndexDb;
use skyview_core::indexer::{Indexer, RawRecordEvent};
use skyview_core::notifications::{IndexEffects, NotificationReason};
use skyview_core::processor::IndexError;
use skyview_protocol::{collections, RecordUri};

const ALICE: &str = "did:plc:alice";
const BOB: &str = "did:plc:bob";
const CAROL: &str = "did:plc:carol";

fn setup() -> (Indexer, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db = IndexDb::open(tmp.path().join("index.db")).unwrap();
    (Indexer::new(db, &IndexerConfig::default()), tmp)
}

fn uri(did: &str, collection: &str, rkey: &str) -> RecordUri {
    RecordUri::new(did, collection, rkey)
}

fn index(indexer: &Indexer, uri: &RecordUri, body: &Value) -> IndexEffects {
    indexer
        .index_record(uri, &cid_for_record(body), body, &now_rfc3339())
        .unwrap()
}

fn post_body(text: &str) -> Value {
    json!({"text": text, "createdAt": "2026-02-01T00:00:00Z"})
}

fn reply_body(text: &str, root: &RecordUri, parent: &RecordUri) -> Value {
    json!({
        "text": text,
        "reply": {
            "root": {"uri": root.to_string(), "cid": "rc"},
            "parent": {"uri": parent.to_string(), "cid": "pc"}
        },
        "createdAt": "2026-02-01T00:00:00Z"
    })
}

fn like_body(subject: &RecordUri) -> Value {
    json!({
        "subject": {"uri": subject.to_string(), "cid": "sc"},
        "createdAt": "2026-02-01T00:00:00Z"
    })
}

fn follow_body(subject_did: &str) -> Value {
    json!({"subject": subject_did, "createdAt": "2026-02-01T00:00:00Z"})
}

fn count_rows(indexer: &Indexer, table: &str) -> i64 {
    let conn = indexer.db().connect().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn post_flags(indexer: &Indexer, uri: &RecordUri) -> (Option<bool>, Option<bool>, bool) {
    let conn = indexer.db().connect().unwrap();
    conn.query_row(
        "SELECT invalid_reply_root, violates_thread_gate, has_thread_gate FROM post WHERE uri=?1",
        [uri.to_string()],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .unwrap()
}

#[test]
fn indexing_same_record_twice_is_idempotent() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("hello"));

    let like_uri = uri(BOB, collections::LIKE, "l1");
    let body = like_body(&post_uri);
    let first = index(&indexer, &like_uri, &body);
    assert_eq!(first.notifications.len(), 1);
    assert_eq!(first.notifications[0].reason, NotificationReason::Like);
    assert_eq!(first.notifications[0].did, ALICE);

    let second = index(&indexer, &like_uri, &body);
    assert!(second.notifications.is_empty());
    assert_eq!(count_rows(&indexer, r#""like""#), 1);

    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &post_uri.to_string()).unwrap().0, 1);
}

#[test]
fn aggregates_equal_live_child_rows_after_insert_and_delete() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("subject"));

    let bob_like = uri(BOB, collections::LIKE, "l1");
    let carol_like = uri(CAROL, collections::LIKE, "l2");
    index(&indexer, &bob_like, &like_body(&post_uri));
    index(&indexer, &carol_like, &like_body(&post_uri));
    {
        let conn = indexer.db().connect().unwrap();
        assert_eq!(post_agg(&conn, &post_uri.to_string()).unwrap().0, 2);
    }

    let effects = indexer.delete_record(&bob_like).unwrap();
    assert_eq!(effects.retract_uris, vec![bob_like.to_string()]);
    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &post_uri.to_string()).unwrap().0, 1);
}

#[test]
fn follow_maintains_counters_on_both_sides() {
    let (indexer, _tmp) = setup();
    let follow_uri = uri(BOB, collections::FOLLOW, "f1");
    let effects = index(&indexer, &follow_uri, &follow_body(ALICE));
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Follow);
    assert_eq!(effects.notifications[0].did, ALICE);

    {
        let conn = indexer.db().connect().unwrap();
        assert_eq!(profile_agg(&conn, ALICE).unwrap().0, 1); // followers
        assert_eq!(profile_agg(&conn, BOB).unwrap().1, 1); // follows
    }

    indexer.delete_record(&follow_uri).unwrap();
    let conn = indexer.db().connect().unwrap();
    assert_eq!(profile_agg(&conn, ALICE).unwrap().0, 0);
    assert_eq!(profile_agg(&conn, BOB).unwrap().1, 0);
}

#[test]
fn self_actions_never_notify_their_own_actor() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("mine"));

    // Alice liking her own post.
    let effects = index(&indexer, &uri(ALICE, collections::LIKE, "l1"), &like_body(&post_uri));
    assert!(effects.notifications.is_empty());

    // Bob liking through his own repost: primary notification only.
    let repost_uri = uri(BOB, collections::REPOST, "r1");
    index(
        &indexer,
        &repost_uri,
        &json!({
            "subject": {"uri": post_uri.to_string(), "cid": "sc"},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    let effects = index(
        &indexer,
        &uri(BOB, collections::LIKE, "l2"),
        &json!({
            "subject": {"uri": post_uri.to_string(), "cid": "sc"},
            "via": {"uri": repost_uri.to_string(), "cid": "vc"},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].did, ALICE);
}

#[test]
fn like_via_repost_notifies_the_intermediary() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("subject"));
    let repost_uri = uri(BOB, collections::REPOST, "r1");
    index(
        &indexer,
        &repost_uri,
        &json!({
            "subject": {"uri": post_uri.to_string(), "cid": "sc"},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );

    let effects = index(
        &indexer,
        &uri(CAROL, collections::LIKE, "l1"),
        &json!({
            "subject": {"uri": post_uri.to_string(), "cid": "sc"},
            "via": {"uri": repost_uri.to_string(), "cid": "vc"},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    let reasons: Vec<_> = effects.notifications.iter().map(|n| n.reason).collect();
    assert_eq!(
        reasons,
        vec![NotificationReason::Like, NotificationReason::LikeViaRepost]
    );
    assert_eq!(effects.notifications[1].did, BOB);
}

#[test]
fn reply_notifies_thread_and_invalid_root_propagates() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "root");
    index(&indexer, &root, &post_body("root"));

    // Valid reply notifies the root author.
    let r1 = uri(BOB, collections::POST, "r1");
    let effects = index(&indexer, &r1, &reply_body("re", &root, &root));
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Reply);
    assert_eq!(effects.notifications[0].did, ALICE);
    let (invalid, violates, _) = post_flags(&indexer, &r1);
    assert!(invalid.is_none() || invalid == Some(false));
    assert!(violates.is_none() || violates == Some(false));

    // Reply declaring the wrong root is invalid and generates no reply
    // notifications.
    let other_root = uri(CAROL, collections::POST, "other");
    index(&indexer, &other_root, &post_body("unrelated"));
    let r2 = uri(CAROL, collections::POST, "r2");
    let effects = index(&indexer, &r2, &reply_body("re", &other_root, &r1));
    assert!(effects.notifications.is_empty());
    assert_eq!(post_flags(&indexer, &r2).0, Some(true));

    // Invalidity propagates: a structurally consistent reply under an
    // invalid parent is itself invalid.
    let r3 = uri(BOB, collections::POST, "r3");
    index(&indexer, &r3, &reply_body("re", &other_root, &r2));
    assert_eq!(post_flags(&indexer, &r3).0, Some(true));
}

#[test]
fn thread_gate_denies_until_follow_edge_exists() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "p1");
    index(&indexer, &root, &post_body("gated"));
    let gate_uri = uri(ALICE, collections::THREAD_GATE, "p1");
    index(
        &indexer,
        &gate_uri,
        &json!({
            "post": root.to_string(),
            "allow": [{"type": "following"}],
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    assert!(post_flags(&indexer, &root).2);

    // No follow edge: the reply violates the gate, produces no reply
    // notification and stays out of the reply count.
    let r1 = uri(BOB, collections::POST, "r1");
    let effects = index(&indexer, &r1, &reply_body("denied", &root, &root));
    assert!(effects.notifications.is_empty());
    assert_eq!(post_flags(&indexer, &r1).1, Some(true));
    {
        let conn = indexer.db().connect().unwrap();
        assert_eq!(post_agg(&conn, &root.to_string()).unwrap().2, 0);
    }

    // Once Alice follows Bob the same reply shape is allowed.
    index(&indexer, &uri(ALICE, collections::FOLLOW, "f1"), &follow_body(BOB));
    let r2 = uri(BOB, collections::POST, "r2");
    let effects = index(&indexer, &r2, &reply_body("allowed", &root, &root));
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].did, ALICE);
    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &root.to_string()).unwrap().2, 1);
}

#[test]
fn bulk_likes_and_single_like_converge_on_exact_count() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("popular"));

    let events: Vec<RawRecordEvent> = (0..100)
        .map(|i| {
            let liker = format!("did:plc:u{i}");
            let body = like_body(&post_uri);
            RawRecordEvent {
                uri: uri(&liker, collections::LIKE, "l"),
                cid: cid_for_record(&body),
                record: body,
                timestamp: now_rfc3339(),
            }
        })
        .collect();
    let effects = indexer.index_records_bulk(events).unwrap();
    assert_eq!(effects.notifications.len(), 100);

    index(&indexer, &uri(BOB, collections::LIKE, "l101"), &like_body(&post_uri));

    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &post_uri.to_string()).unwrap().0, 101);
}

#[test]
fn bulk_reingest_produces_no_duplicate_side_effects() {
    let (indexer, _tmp) = setup();
    let post_uri = uri(ALICE, collections::POST, "p1");
    index(&indexer, &post_uri, &post_body("subject"));

    let body = like_body(&post_uri);
    let event = || RawRecordEvent {
        uri: uri(BOB, collections::LIKE, "l1"),
        cid: cid_for_record(&body),
        record: body.clone(),
        timestamp: now_rfc3339(),
    };
    let first = indexer.index_records_bulk(vec![event()]).unwrap();
    assert_eq!(first.notifications.len(), 1);
    // Re-delivered batch: conflict-ignored, side effects derive from the
    // empty inserted subset.
    let second = indexer.index_records_bulk(vec![event()]).unwrap();
    assert!(second.notifications.is_empty());
    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &post_uri.to_string()).unwrap().0, 1);
}

#[test]
fn duplicate_follow_suppressed_and_promoted_without_retraction() {
    let (indexer, _tmp) = setup();
    let f1 = uri(BOB, collections::FOLLOW, "f1");
    let f2 = uri(BOB, collections::FOLLOW, "f2");

    let effects = index(&indexer, &f1, &follow_body(ALICE));
    assert_eq!(effects.notifications.len(), 1);

    // Same creator+subject under a different uri: first writer wins.
    let effects = index(&indexer, &f2, &follow_body(ALICE));
    assert!(effects.notifications.is_empty());
    assert_eq!(count_rows(&indexer, "follow"), 1);

    // Deleting the canonical record promotes the suppressed duplicate and
    // emits no retraction (the promoted record keeps Alice notified).
    let effects = indexer.delete_record(&f1).unwrap();
    assert!(effects.retract_uris.is_empty());
    assert_eq!(count_rows(&indexer, "follow"), 1);
    let conn = indexer.db().connect().unwrap();
    let canonical: String = conn
        .query_row("SELECT uri FROM follow", [], |r| r.get(0))
        .unwrap();
    assert_eq!(canonical, f2.to_string());
    assert_eq!(profile_agg(&conn, ALICE).unwrap().0, 1);
}

#[test]
fn verification_delete_emits_revocation_notification() {
    let (indexer, _tmp) = setup();
    let v1 = uri(ALICE, collections::VERIFICATION, "v1");
    let effects = index(
        &indexer,
        &v1,
        &json!({
            "subject": BOB,
            "handle": "bob.example",
            "displayName": "Bob",
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Verified);

    let effects = indexer.delete_record(&v1).unwrap();
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Unverified);
    assert_eq!(effects.notifications[0].did, BOB);
    assert!(effects.retract_uris.is_empty());
}

#[test]
fn profile_indexes_only_the_self_record() {
    let (indexer, _tmp) = setup();
    let stray = uri(ALICE, collections::PROFILE, "other");
    let effects = index(&indexer, &stray, &json!({"displayName": "Alice"}));
    assert!(effects.notifications.is_empty());
    assert_eq!(count_rows(&indexer, "profile"), 0);

    let pack_uri = uri(BOB, collections::STARTER_PACK, "sp1");
    let effects = index(
        &indexer,
        &uri(ALICE, collections::PROFILE, "self"),
        &json!({
            "displayName": "Alice",
            "joinedViaStarterPack": {"uri": pack_uri.to_string(), "cid": "pc"}
        }),
    );
    assert_eq!(count_rows(&indexer, "profile"), 1);
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(
        effects.notifications[0].reason,
        NotificationReason::StarterPackJoined
    );
    assert_eq!(effects.notifications[0].did, BOB);
}

#[test]
fn list_item_ownership_violation_leaves_no_partial_state() {
    let (indexer, _tmp) = setup();
    let alice_list = uri(ALICE, collections::LIST, "friends");
    index(
        &indexer,
        &alice_list,
        &json!({
            "name": "friends",
            "purpose": "curation",
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );

    let item_uri = uri(BOB, collections::LIST_ITEM, "i1");
    let err = indexer
        .index_record(
            &item_uri,
            "cid",
            &json!({
                "subject": CAROL,
                "list": alice_list.to_string(),
                "createdAt": "2026-02-01T00:00:00Z"
            }),
            &now_rfc3339(),
        )
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::Validation(_))
    ));
    assert_eq!(count_rows(&indexer, "list_item"), 0);
    // The transaction rolled back the generic record row too.
    let conn = indexer.db().connect().unwrap();
    let record: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM record WHERE uri=?1",
            [item_uri.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(record, 0);
}

#[test]
fn thread_gate_mismatched_target_is_rejected() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "p1");
    index(&indexer, &root, &post_body("target"));
    // Bob cannot gate Alice's post.
    let err = indexer
        .index_record(
            &uri(BOB, collections::THREAD_GATE, "p1"),
            "cid",
            &json!({"post": root.to_string(), "createdAt": "2026-02-01T00:00:00Z"}),
            &now_rfc3339(),
        )
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::Validation(_))
    ));
    assert_eq!(count_rows(&indexer, "thread_gate"), 0);
}

#[test]
fn thread_gate_delete_clears_post_flag() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "p1");
    index(&indexer, &root, &post_body("gated"));
    let gate_uri = uri(ALICE, collections::THREAD_GATE, "p1");
    index(
        &indexer,
        &gate_uri,
        &json!({"post": root.to_string(), "createdAt": "2026-02-01T00:00:00Z"}),
    );
    assert!(post_flags(&indexer, &root).2);
    indexer.delete_record(&gate_uri).unwrap();
    assert!(!post_flags(&indexer, &root).2);
}

#[test]
fn out_of_order_reply_is_notified_retroactively() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "root");
    let reply = uri(BOB, collections::POST, "r1");

    // The reply arrives before its root: nothing to notify yet.
    let effects = index(&indexer, &reply, &reply_body("early", &root, &root));
    assert!(effects.notifications.is_empty());

    // When the root finally lands, the pending descendant produces the
    // reply notification that was skipped earlier.
    let effects = index(&indexer, &root, &post_body("late root"));
    assert_eq!(effects.notifications.len(), 1);
    let notif = &effects.notifications[0];
    assert_eq!(notif.reason, NotificationReason::Reply);
    assert_eq!(notif.did, ALICE);
    assert_eq!(notif.author, BOB);
    assert_eq!(notif.record_uri, reply.to_string());
}

#[test]
fn quote_embed_counts_and_notifies() {
    let (indexer, _tmp) = setup();
    let quoted = uri(ALICE, collections::POST, "p1");
    index(&indexer, &quoted, &post_body("original"));
    let quoted_cid = {
        let conn = indexer.db().connect().unwrap();
        conn.query_row(
            "SELECT cid FROM post WHERE uri=?1",
            [quoted.to_string()],
            |r| r.get::<_, String>(0),
        )
        .unwrap()
    };

    let quoting = uri(BOB, collections::POST, "q1");
    let effects = index(
        &indexer,
        &quoting,
        &json!({
            "text": "look at this",
            "embed": {"type": "record", "record": {"uri": quoted.to_string(), "cid": quoted_cid}},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Quote);
    assert_eq!(effects.notifications[0].did, ALICE);
    {
        let conn = indexer.db().connect().unwrap();
        assert_eq!(post_agg(&conn, &quoted.to_string()).unwrap().3, 1);
    }

    indexer.delete_record(&quoting).unwrap();
    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &quoted.to_string()).unwrap().3, 0);
    assert_eq!(count_rows(&indexer, "quote"), 0);
}

#[test]
fn post_gate_disable_embedding_flags_the_quote() {
    let (indexer, _tmp) = setup();
    let gated = uri(ALICE, collections::POST, "p1");
    index(&indexer, &gated, &post_body("no quoting"));
    index(
        &indexer,
        &uri(ALICE, collections::POST_GATE, "p1"),
        &json!({
            "post": gated.to_string(),
            "embeddingRules": [{"type": "disableEmbedding"}],
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );

    let quoting = uri(BOB, collections::POST, "q1");
    let effects = index(
        &indexer,
        &quoting,
        &json!({
            "text": "sneaky quote",
            "embed": {"type": "record", "record": {"uri": gated.to_string(), "cid": "qc"}},
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    // The violating quote is indexed but flagged, and notifies nobody.
    assert!(effects.notifications.is_empty());
    let conn = indexer.db().connect().unwrap();
    let violates: Option<bool> = conn
        .query_row(
            "SELECT violates_embedding_rules FROM post WHERE uri=?1",
            [quoting.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(violates, Some(true));
}

#[test]
fn mention_facets_notify_the_mentioned_identity() {
    let (indexer, _tmp) = setup();
    let effects = index(
        &indexer,
        &uri(ALICE, collections::POST, "p1"),
        &json!({
            "text": "hi @bob",
            "facets": [{
                "index": {"byteStart": 3, "byteEnd": 7},
                "features": [{"type": "mention", "did": BOB}]
            }],
            "createdAt": "2026-02-01T00:00:00Z"
        }),
    );
    assert_eq!(effects.notifications.len(), 1);
    assert_eq!(effects.notifications[0].reason, NotificationReason::Mention);
    assert_eq!(effects.notifications[0].did, BOB);
}

#[test]
fn post_delete_removes_secondary_rows_and_requests_retraction() {
    let (indexer, _tmp) = setup();
    let root = uri(ALICE, collections::POST, "root");
    index(&indexer, &root, &post_body("root"));
    let reply = uri(BOB, collections::POST, "r1");
    index(&indexer, &reply, &reply_body("re", &root, &root));
    {
        let conn = indexer.db().connect().unwrap();
        assert_eq!(post_agg(&conn, &root.to_string()).unwrap().2, 1);
    }

    let effects = indexer.delete_record(&reply).unwrap();
    assert_eq!(effects.retract_uris, vec![reply.to_string()]);
    assert_eq!(count_rows(&indexer, "post"), 1);
    let conn = indexer.db().connect().unwrap();
    assert_eq!(post_agg(&conn, &root.to_string()).unwrap().2, 0);
    let feed_items: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM feed_item WHERE post_uri=?1",
            [reply.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(feed_items, 0);
}

#[test]
fn unknown_collections_are_skipped_not_fatal() {
    let (indexer, _tmp) = setup();
    let stray = uri(ALICE, "net.skyview.unknown.widget", "w1");
    let effects = index(&indexer, &stray, &json!({"anything": true}));
    assert!(effects.notifications.is_empty());
    let effects = indexer.delete_record(&stray).unwrap();
    assert!(effects.notifications.is_empty());
}
