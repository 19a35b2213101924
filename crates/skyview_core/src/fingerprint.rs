/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Content identifiers. A record's cid is the hex SHA-256 of its canonical
//! JSON body; serde_json already orders object keys, so `to_string` is
//! canonical enough for dedup purposes.

use sha2::{Digest, Sha256};

pub fn cid_for_record(body: &serde_json::Value) -> String {
    let digest = Sha256::digest(body.to_string().as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cid_is_stable_across_key_order() {
        let a = json!({"text": "hi", "createdAt": "2026-01-01T00:00:00Z"});
        let b = json!({"createdAt": "2026-01-01T00:00:00Z", "text": "hi"});
        assert_eq!(cid_for_record(&a), cid_for_record(&b));
    }

    #[test]
    fn cid_changes_with_content() {
        let a = json!({"text": "hi"});
        let b = json!({"text": "hi!"});
        assert_ne!(cid_for_record(&a), cid_for_record(&b));
    }
}
