/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Serde bodies for every record collection. These mirror the wire JSON the
//! upstream repository emits (camelCase keys, `type`-tagged unions); the
//! indexer deserializes them but never validates them against a schema.

use serde::{Deserialize, Serialize};

/// A (uri, cid) pair pointing at a specific revision of another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSpan {
    pub byte_start: u32,
    pub byte_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FacetFeature {
    Mention { did: String },
    Link { uri: String },
    Tag { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facet {
    pub index: ByteSpan,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEmbed {
    pub image: BlobRef,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Embed {
    Images {
        images: Vec<ImageEmbed>,
    },
    External {
        external: ExternalEmbed,
    },
    Record {
        record: StrongRef,
    },
    RecordWithMedia {
        record: StrongRef,
        media: Box<Embed>,
    },
    Video {
        video: BlobRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRecord {
    pub subject: StrongRef,
    /// Set when the like was made through someone else's repost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<StrongRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostRecord {
    pub subject: StrongRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<StrongRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRecord {
    /// Followed identity.
    pub subject: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub name: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description_facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<BlobRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemRecord {
    /// Identity placed on the list.
    pub subject: String,
    /// Uri of the list; its creator must match the item's creator.
    pub list: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBlockRecord {
    /// Uri of the blocked list.
    pub subject: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<BlobRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<BlobRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_via_starter_pack: Option<StrongRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_post: Option<StrongRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedGeneratorRecord {
    /// Service identity answering for this feed.
    pub did: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description_facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<BlobRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelerRecord {
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarterPackRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ThreadGateRule {
    /// Identities mentioned in the root post may reply.
    Mention,
    /// Followers of the thread owner may reply.
    Follower,
    /// Identities the thread owner follows may reply.
    Following,
    /// Members of the given list may reply.
    List { list: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadGateRecord {
    /// The gated post; must share did and rkey with the gate itself.
    pub post: String,
    /// Absent means nobody may reply (other than the owner); each present
    /// rule is an independent grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<ThreadGateRule>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_replies: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PostGateRule {
    /// Nobody but the author may quote-embed the post.
    DisableEmbedding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGateRecord {
    pub post: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_rules: Vec<PostGateRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detached_embedding_uris: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Verified identity.
    pub subject: String,
    pub handle: String,
    pub display_name: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_record_wire_shape() {
        let json = r#"{
            "text": "hello",
            "reply": {
                "root": {"uri": "sv://did:plc:a/net.skyview.feed.post/1", "cid": "c1"},
                "parent": {"uri": "sv://did:plc:a/net.skyview.feed.post/1", "cid": "c1"}
            },
            "embed": {"type": "images", "images": [{"image": {"cid": "img1"}, "alt": "a cat"}]},
            "facets": [{
                "index": {"byteStart": 0, "byteEnd": 5},
                "features": [{"type": "mention", "did": "did:plc:b"}]
            }],
            "langs": ["en"],
            "createdAt": "2026-01-01T00:00:00Z"
        }"#;
        let post: PostRecord = serde_json::from_str(json).unwrap();
        assert_eq!(post.text, "hello");
        assert!(post.reply.is_some());
        assert!(matches!(post.embed, Some(Embed::Images { ref images }) if images.len() == 1));
        assert!(matches!(
            post.facets[0].features[0],
            FacetFeature::Mention { ref did } if did == "did:plc:b"
        ));
    }

    #[test]
    fn thread_gate_rules_wire_shape() {
        let json = r#"{
            "post": "sv://did:plc:a/net.skyview.feed.post/1",
            "allow": [
                {"type": "following"},
                {"type": "list", "list": "sv://did:plc:a/net.skyview.graph.list/friends"}
            ],
            "hiddenReplies": ["sv://did:plc:c/net.skyview.feed.post/9"],
            "createdAt": "2026-01-01T00:00:00Z"
        }"#;
        let gate: ThreadGateRecord = serde_json::from_str(json).unwrap();
        let allow = gate.allow.unwrap();
        assert_eq!(allow.len(), 2);
        assert!(matches!(allow[0], ThreadGateRule::Following));
        assert_eq!(gate.hidden_replies.len(), 1);
    }

    #[test]
    fn minimal_bodies_deserialize_with_defaults() {
        let like: LikeRecord = serde_json::from_str(
            r#"{"subject": {"uri": "sv://did:plc:a/net.skyview.feed.post/1", "cid": "c"},
                "createdAt": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(like.via.is_none());

        let profile: ProfileRecord = serde_json::from_str("{}").unwrap();
        assert!(profile.display_name.is_none());
        assert!(profile.created_at.is_none());
    }
}
