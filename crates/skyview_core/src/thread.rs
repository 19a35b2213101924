/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Reply-thread traversal and policy evaluation. The reply graph is a
//! self-referential parent pointer, not a verified tree, so both walks are
//! depth-bounded rather than cycle-checked.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use skyview_protocol::records::{
    FacetFeature, PostGateRecord, PostGateRule, PostRecord, ReplyRef, ThreadGateRecord,
    ThreadGateRule,
};
use skyview_protocol::uri::{post_uri_to_postgate_uri, post_uri_to_threadgate_uri, uri_to_did};

use crate::index_db;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAncestor {
    pub uri: String,
    /// Hops above the starting post; 0 is the post itself.
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDescendant {
    pub uri: String,
    /// Hops below the starting post; direct replies are depth 1.
    pub depth: i64,
    pub cid: String,
    pub creator: String,
    pub sort_at: String,
}

/// Walks upward through `reply_parent` up to `parent_height` hops, yielding
/// the post itself at height 0. The bound guarantees termination even on
/// cyclic data.
pub fn ancestors_and_self(
    conn: &Connection,
    uri: &str,
    parent_height: i64,
) -> Result<Vec<PostAncestor>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE ancestor(uri, ancestor_uri, height) AS (
           SELECT post.uri, post.reply_parent, 0 FROM post WHERE post.uri = ?1
           UNION ALL
           SELECT post.uri, post.reply_parent, ancestor.height + 1
           FROM post JOIN ancestor ON ancestor.ancestor_uri = post.uri
           WHERE ancestor.height < ?2
         )
         SELECT uri, height FROM ancestor ORDER BY height ASC",
    )?;
    let rows = stmt
        .query_map(params![uri, parent_height], |r| {
            Ok(PostAncestor {
                uri: r.get(0)?,
                height: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Walks downward through replies up to `depth` hops, joined back to the
/// post table for the fields notification derivation needs.
pub fn descendants(conn: &Connection, uri: &str, depth: i64) -> Result<Vec<PostDescendant>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE descendant(uri, depth) AS (
           SELECT post.uri, 1 FROM post WHERE post.reply_parent = ?1
           UNION ALL
           SELECT post.uri, descendant.depth + 1
           FROM post JOIN descendant ON post.reply_parent = descendant.uri
           WHERE descendant.depth < ?2
         )
         SELECT d.uri, d.depth, post.cid, post.creator, post.sort_at
         FROM descendant d JOIN post ON post.uri = d.uri
         ORDER BY d.depth ASC, d.uri ASC",
    )?;
    let rows = stmt
        .query_map(params![uri, depth], |r| {
            Ok(PostDescendant {
                uri: r.get(0)?,
                depth: r.get(1)?,
                cid: r.get(2)?,
                creator: r.get(3)?,
                sort_at: r.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A referenced post as the validator sees it: the stored body plus the
/// cached validity flag on its indexed row.
#[derive(Debug, Clone)]
pub struct ReplyTarget {
    pub record: PostRecord,
    pub invalid_reply_root: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplyRefs {
    pub root: Option<ReplyTarget>,
    pub parent: Option<ReplyTarget>,
    pub gate: Option<ThreadGateRecord>,
}

fn load_reply_target(conn: &Connection, uri: &str) -> Result<Option<ReplyTarget>> {
    let Some(json) = index_db::get_record_json(conn, uri)? else {
        return Ok(None);
    };
    let Ok(record) = serde_json::from_str::<PostRecord>(&json) else {
        return Ok(None);
    };
    let invalid: Option<Option<bool>> = conn
        .query_row(
            "SELECT invalid_reply_root FROM post WHERE uri=?1",
            params![uri],
            |r| r.get(0),
        )
        .optional()?;
    Ok(Some(ReplyTarget {
        record,
        invalid_reply_root: invalid.flatten(),
    }))
}

pub fn thread_gate_record(conn: &Connection, post_uri: &str) -> Result<Option<ThreadGateRecord>> {
    let Some(gate_uri) = post_uri_to_threadgate_uri(post_uri) else {
        return Ok(None);
    };
    let Some(json) = index_db::get_record_json(conn, &gate_uri)? else {
        return Ok(None);
    };
    Ok(serde_json::from_str(&json).ok())
}

pub fn post_gate_record(conn: &Connection, post_uri: &str) -> Result<Option<PostGateRecord>> {
    let Some(gate_uri) = post_uri_to_postgate_uri(post_uri) else {
        return Ok(None);
    };
    let Some(json) = index_db::get_record_json(conn, &gate_uri)? else {
        return Ok(None);
    };
    Ok(serde_json::from_str(&json).ok())
}

/// Resolves the root, parent and (derived-uri) gate a reply points at.
pub fn reply_refs(conn: &Connection, reply: &ReplyRef) -> Result<ReplyRefs> {
    Ok(ReplyRefs {
        root: load_reply_target(conn, &reply.root.uri)?,
        parent: load_reply_target(conn, &reply.parent.uri)?,
        gate: thread_gate_record(conn, &reply.root.uri)?,
    })
}

/// A reply's declared root must hold up transitively through its parent:
/// an invalid parent poisons the child, a parent that *is* the root must
/// not itself be a reply, and otherwise the parent's own root must match.
/// A missing parent row is treated as invalid by the caller.
pub fn invalid_reply_root(reply: &ReplyRef, parent: &ReplyTarget) -> bool {
    if parent.invalid_reply_root == Some(true) {
        return true;
    }
    if reply.parent.uri == reply.root.uri {
        return parent.record.reply.is_some();
    }
    parent
        .record
        .reply
        .as_ref()
        .map(|r| r.root.uri != reply.root.uri)
        .unwrap_or(true)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadGatePolicy {
    /// Short-circuit: owner replying, no gate, or a mention grant matched.
    pub can_reply: bool,
    /// Followers of the owner (replier -> owner edge) may reply.
    pub allow_followers: bool,
    /// Identities the owner follows (owner -> replier edge) may reply.
    pub allow_following: bool,
    pub allow_list_uris: Vec<String>,
}

pub fn parse_thread_gate(
    replier_did: &str,
    owner_did: &str,
    root_post: Option<&PostRecord>,
    gate: Option<&ThreadGateRecord>,
) -> ThreadGatePolicy {
    if replier_did == owner_did {
        return ThreadGatePolicy {
            can_reply: true,
            ..Default::default()
        };
    }
    let Some(gate) = gate else {
        // No gate record: unrestricted.
        return ThreadGatePolicy {
            can_reply: true,
            ..Default::default()
        };
    };
    // Gate present without allow rules: nobody but the owner replies.
    let Some(allow) = gate.allow.as_ref() else {
        return ThreadGatePolicy::default();
    };
    let mut policy = ThreadGatePolicy::default();
    for rule in allow {
        match rule {
            ThreadGateRule::Mention => {
                let mentioned = root_post.is_some_and(|post| {
                    post.facets.iter().flat_map(|f| &f.features).any(|feature| {
                        matches!(feature, FacetFeature::Mention { did } if did == replier_did)
                    })
                });
                if mentioned {
                    policy.can_reply = true;
                }
            }
            ThreadGateRule::Follower => policy.allow_followers = true,
            ThreadGateRule::Following => policy.allow_following = true,
            ThreadGateRule::List { list } => policy.allow_list_uris.push(list.clone()),
        }
    }
    policy
}

fn follow_exists(conn: &Connection, creator: &str, subject: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follow WHERE creator=?1 AND subject_did=?2 LIMIT 1",
            params![creator, subject],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn list_member_exists(conn: &Connection, list_uris: &[String], subject: &str) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM list_item WHERE list_uri=?1 AND subject_did=?2 LIMIT 1",
    )?;
    for list_uri in list_uris {
        let found: Option<i64> = stmt
            .query_row(params![list_uri, subject], |r| r.get(0))
            .optional()?;
        if found.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluates the gate against the relationship tables. Passing any enabled
/// predicate grants permission; a gate with none enabled denies everyone
/// but the owner.
pub fn violates_thread_gate(
    conn: &Connection,
    replier_did: &str,
    owner_did: &str,
    root_post: Option<&PostRecord>,
    gate: Option<&ThreadGateRecord>,
) -> Result<bool> {
    let policy = parse_thread_gate(replier_did, owner_did, root_post, gate);
    if policy.can_reply {
        return Ok(false);
    }
    if policy.allow_followers && follow_exists(conn, replier_did, owner_did)? {
        return Ok(false);
    }
    if policy.allow_following && follow_exists(conn, owner_did, replier_did)? {
        return Ok(false);
    }
    if !policy.allow_list_uris.is_empty()
        && list_member_exists(conn, &policy.allow_list_uris, replier_did)?
    {
        return Ok(false);
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyValidation {
    pub invalid_reply_root: bool,
    pub violates_thread_gate: bool,
}

/// Full validation a reply goes through at index time: root consistency
/// plus thread-gate policy, both cached on the row afterwards.
pub fn validate_reply(conn: &Connection, creator: &str, reply: &ReplyRef) -> Result<ReplyValidation> {
    let refs = reply_refs(conn, reply)?;
    let invalid = match refs.parent.as_ref() {
        Some(parent) => invalid_reply_root(reply, parent),
        None => true,
    };
    let owner = uri_to_did(&reply.root.uri);
    let violates = violates_thread_gate(
        conn,
        creator,
        owner,
        refs.root.as_ref().map(|r| &r.record),
        refs.gate.as_ref(),
    )?;
    Ok(ReplyValidation {
        invalid_reply_root: invalid,
        violates_thread_gate: violates,
    })
}

/// Quote-embed policy: embedding rules on the quoted post's gate. Only the
/// author escapes a disable-embedding rule. Missing gate means allowed.
pub fn parse_post_gate(gate: Option<&PostGateRecord>, quoting_did: &str, author_did: &str) -> bool {
    let Some(gate) = gate else {
        return true;
    };
    if quoting_did == author_did {
        return true;
    }
    !gate
        .embedding_rules
        .iter()
        .any(|rule| matches!(rule, PostGateRule::DisableEmbedding))
}

/// Whether quoting `embed_uri` from `quoting_uri` violates the quoted
/// post's embedding rules.
pub fn violates_embedding_rules(
    conn: &Connection,
    embed_uri: &str,
    quoting_uri: &str,
) -> Result<bool> {
    let gate = post_gate_record(conn, embed_uri)?;
    let can_embed = parse_post_gate(gate.as_ref(), uri_to_did(quoting_uri), uri_to_did(embed_uri));
    Ok(!can_embed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_db::IndexDb;
    use skyview_protocol::records::StrongRef;
    use tempfile::TempDir;

    fn setup() -> (IndexDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = IndexDb::open(tmp.path().join("index.db")).unwrap();
        (db, tmp)
    }

    fn seed_post(conn: &Connection, uri: &str, parent: Option<&str>) {
        conn.execute(
            "INSERT INTO post(uri, cid, creator, text, reply_parent, created_at, indexed_at, sort_at)
             VALUES (?1, 'c', ?2, 't', ?3, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            params![uri, uri_to_did(uri), parent],
        )
        .unwrap();
    }

    fn reply_ref(root: &str, parent: &str) -> ReplyRef {
        ReplyRef {
            root: StrongRef {
                uri: root.into(),
                cid: "rc".into(),
            },
            parent: StrongRef {
                uri: parent.into(),
                cid: "pc".into(),
            },
        }
    }

    fn post_uri(did: &str, rkey: &str) -> String {
        format!("sv://{did}/net.skyview.feed.post/{rkey}")
    }

    #[test]
    fn ancestor_walk_is_height_bounded() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        // Chain p0 <- p1 <- ... <- p7.
        let uris: Vec<String> = (0..8).map(|i| post_uri("did:plc:a", &i.to_string())).collect();
        seed_post(&conn, &uris[0], None);
        for i in 1..8 {
            seed_post(&conn, &uris[i], Some(&uris[i - 1]));
        }
        let ancestors = ancestors_and_self(&conn, &uris[7], 5).unwrap();
        assert_eq!(ancestors.len(), 6); // self + 5 ancestors
        assert_eq!(ancestors[0].uri, uris[7]);
        assert_eq!(ancestors[0].height, 0);
        assert_eq!(ancestors[5].uri, uris[2]);
        assert_eq!(ancestors[5].height, 5);
    }

    #[test]
    fn descendant_walk_is_depth_bounded_and_survives_cycles() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        let a = post_uri("did:plc:a", "a");
        let b = post_uri("did:plc:b", "b");
        seed_post(&conn, &a, Some(&b));
        seed_post(&conn, &b, Some(&a)); // cycle, by broken data
        let descs = descendants(&conn, &a, 5).unwrap();
        // Bounded: terminates and never exceeds the depth budget.
        assert!(descs.iter().all(|d| d.depth <= 5));
    }

    #[test]
    fn invalid_reply_root_rules() {
        let root = post_uri("did:plc:a", "root");
        let mid = post_uri("did:plc:b", "mid");
        let other = post_uri("did:plc:c", "other");

        let root_target = ReplyTarget {
            record: PostRecord {
                text: "root".into(),
                reply: None,
                embed: None,
                facets: vec![],
                langs: vec![],
                tags: vec![],
                created_at: "2026-01-01T00:00:00Z".into(),
            },
            invalid_reply_root: None,
        };
        // Direct reply to a true root: valid.
        assert!(!invalid_reply_root(&reply_ref(&root, &root), &root_target));

        // Parent claims to be the root but is itself a reply: invalid.
        let mut fake_root = root_target.clone();
        fake_root.record.reply = Some(reply_ref(&other, &other));
        assert!(invalid_reply_root(&reply_ref(&mid, &mid), &fake_root));

        // Nested reply whose parent shares the declared root: valid.
        let mut mid_target = root_target.clone();
        mid_target.record.reply = Some(reply_ref(&root, &root));
        assert!(!invalid_reply_root(&reply_ref(&root, &mid), &mid_target));

        // Parent rooted elsewhere: invalid.
        assert!(invalid_reply_root(&reply_ref(&other, &mid), &mid_target));

        // Invalid parent poisons the child regardless of structure.
        let mut poisoned = mid_target.clone();
        poisoned.invalid_reply_root = Some(true);
        assert!(invalid_reply_root(&reply_ref(&root, &mid), &poisoned));
    }

    #[test]
    fn gate_parsing_grants() {
        let gate = ThreadGateRecord {
            post: post_uri("did:plc:owner", "1"),
            allow: Some(vec![ThreadGateRule::Following]),
            hidden_replies: vec![],
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        // Owner always short-circuits.
        let policy = parse_thread_gate("did:plc:owner", "did:plc:owner", None, Some(&gate));
        assert!(policy.can_reply);
        // Stranger only gets the following predicate.
        let policy = parse_thread_gate("did:plc:x", "did:plc:owner", None, Some(&gate));
        assert!(!policy.can_reply);
        assert!(policy.allow_following);
        // No gate at all: unrestricted.
        assert!(parse_thread_gate("did:plc:x", "did:plc:owner", None, None).can_reply);
        // Gate with no allow rules: deny.
        let closed = ThreadGateRecord {
            allow: None,
            ..gate.clone()
        };
        let policy = parse_thread_gate("did:plc:x", "did:plc:owner", None, Some(&closed));
        assert_eq!(policy, ThreadGatePolicy::default());
    }

    #[test]
    fn gate_following_predicate_checks_follow_edge() {
        let (db, _tmp) = setup();
        let conn = db.connect().unwrap();
        let gate = ThreadGateRecord {
            post: post_uri("did:plc:owner", "1"),
            allow: Some(vec![ThreadGateRule::Following]),
            hidden_replies: vec![],
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(violates_thread_gate(&conn, "did:plc:x", "did:plc:owner", None, Some(&gate)).unwrap());
        conn.execute(
            "INSERT INTO follow(uri, cid, creator, subject_did, created_at, indexed_at, sort_at)
             VALUES ('sv://did:plc:owner/net.skyview.graph.follow/1', 'c', 'did:plc:owner', 'did:plc:x',
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        assert!(
            !violates_thread_gate(&conn, "did:plc:x", "did:plc:owner", None, Some(&gate)).unwrap()
        );
    }

    #[test]
    fn post_gate_disable_embedding_spares_the_author() {
        let gate = PostGateRecord {
            post: post_uri("did:plc:author", "1"),
            embedding_rules: vec![PostGateRule::DisableEmbedding],
            detached_embedding_uris: vec![],
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(!parse_post_gate(Some(&gate), "did:plc:x", "did:plc:author"));
        assert!(parse_post_gate(Some(&gate), "did:plc:author", "did:plc:author"));
        assert!(parse_post_gate(None, "did:plc:x", "did:plc:author"));
    }
}
