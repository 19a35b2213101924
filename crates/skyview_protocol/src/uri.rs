/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collections;

pub const SCHEME: &str = "sv://";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("record uri must start with {SCHEME}: {0}")]
    BadScheme(String),
    #[error("record uri must have did/collection/rkey segments: {0}")]
    BadSegments(String),
}

/// Canonical address of a logical record: identity + collection + record key,
/// serialized as `sv://<did>/<collection>/<rkey>`. Stable across edits of the
/// same record; the content identifier changes instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordUri {
    did: String,
    collection: String,
    rkey: String,
}

impl RecordUri {
    pub fn new(
        did: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, UriError> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| UriError::BadScheme(input.to_string()))?;
        let mut segments = rest.splitn(3, '/');
        let did = segments.next().unwrap_or_default();
        let collection = segments.next().unwrap_or_default();
        let rkey = segments.next().unwrap_or_default();
        if did.is_empty() || collection.is_empty() || rkey.is_empty() {
            return Err(UriError::BadSegments(input.to_string()));
        }
        Ok(Self::new(did, collection, rkey))
    }

    /// Creator identity (the repo the record lives in).
    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rkey(&self) -> &str {
        &self.rkey
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

impl FromStr for RecordUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordUri {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordUri> for String {
    fn from(value: RecordUri) -> Self {
        value.to_string()
    }
}

/// Extracts the creator identity out of a serialized record uri without a
/// full parse. Returns an empty string for malformed input.
pub fn uri_to_did(uri: &str) -> &str {
    let rest = uri.strip_prefix(SCHEME).unwrap_or("");
    rest.split('/').next().unwrap_or("")
}

/// The thread gate governing a post lives at the same did/rkey under the
/// thread-gate collection; it is derived, never stored as a foreign key.
pub fn post_uri_to_threadgate_uri(post_uri: &str) -> Option<String> {
    let post = RecordUri::parse(post_uri).ok()?;
    Some(RecordUri::new(post.did(), collections::THREAD_GATE, post.rkey()).to_string())
}

/// Same derivation for the quote/embed policy record.
pub fn post_uri_to_postgate_uri(post_uri: &str) -> Option<String> {
    let post = RecordUri::parse(post_uri).ok()?;
    Some(RecordUri::new(post.did(), collections::POST_GATE, post.rkey()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let uri = RecordUri::parse("sv://did:plc:alice/net.skyview.feed.post/3k1").unwrap();
        assert_eq!(uri.did(), "did:plc:alice");
        assert_eq!(uri.collection(), "net.skyview.feed.post");
        assert_eq!(uri.rkey(), "3k1");
        assert_eq!(
            uri.to_string(),
            "sv://did:plc:alice/net.skyview.feed.post/3k1"
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            RecordUri::parse("https://example.com/x"),
            Err(UriError::BadScheme(_))
        ));
        assert!(matches!(
            RecordUri::parse("sv://did:plc:alice/only-two"),
            Err(UriError::BadSegments(_))
        ));
        assert!(matches!(
            RecordUri::parse("sv://did:plc:alice/coll/"),
            Err(UriError::BadSegments(_))
        ));
    }

    #[test]
    fn derived_gate_uris() {
        let post = "sv://did:plc:alice/net.skyview.feed.post/3k1";
        assert_eq!(
            post_uri_to_threadgate_uri(post).unwrap(),
            "sv://did:plc:alice/net.skyview.feed.threadGate/3k1"
        );
        assert_eq!(
            post_uri_to_postgate_uri(post).unwrap(),
            "sv://did:plc:alice/net.skyview.feed.postGate/3k1"
        );
        assert_eq!(post_uri_to_threadgate_uri("nonsense"), None);
    }

    #[test]
    fn uri_to_did_tolerates_malformed_input() {
        assert_eq!(
            uri_to_did("sv://did:plc:bob/net.skyview.feed.like/1"),
            "did:plc:bob"
        );
        assert_eq!(uri_to_did("not-a-uri"), "");
    }
}
