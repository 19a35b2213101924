/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - SKYVIEW Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Timestamp handling. All persisted timestamps are RFC3339 strings in UTC,
//! which keeps chronological ordering a plain string comparison.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Fallback for unparsable record timestamps. Clamping to the epoch keeps a
/// malformed `createdAt` from leapfrogging feeds instead of failing the
/// whole record.
pub const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// Re-serializes an inbound `createdAt` into canonical UTC RFC3339, clamping
/// anything unparsable to the epoch instant.
pub fn normalize_datetime(input: &str) -> String {
    match OffsetDateTime::parse(input, &Rfc3339) {
        Ok(dt) => dt
            .to_offset(time::UtcOffset::UTC)
            .format(&Rfc3339)
            .unwrap_or_else(|_| EPOCH_RFC3339.to_string()),
        Err(_) => EPOCH_RFC3339.to_string(),
    }
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| EPOCH_RFC3339.to_string())
}

/// Feed ordering key: min(createdAt, indexedAt). Backdated or clock-skewed
/// records sort where they were ingested, not where they claim to be.
pub fn sort_at(created_at: &str, indexed_at: &str) -> String {
    if indexed_at < created_at {
        indexed_at.to_string()
    } else {
        created_at.to_string()
    }
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_utc_and_converts_offsets() {
        assert_eq!(
            normalize_datetime("2026-03-01T12:00:00Z"),
            "2026-03-01T12:00:00Z"
        );
        assert_eq!(
            normalize_datetime("2026-03-01T14:00:00+02:00"),
            "2026-03-01T12:00:00Z"
        );
    }

    #[test]
    fn normalize_clamps_garbage_to_epoch() {
        assert_eq!(normalize_datetime("next tuesday"), EPOCH_RFC3339);
        assert_eq!(normalize_datetime(""), EPOCH_RFC3339);
    }

    #[test]
    fn sort_at_picks_earlier_timestamp() {
        let created = "2026-01-01T00:00:00Z";
        let indexed = "2026-01-02T00:00:00Z";
        assert_eq!(sort_at(created, indexed), created);
        // Backdated beyond ingestion time clamps to ingestion.
        assert_eq!(sort_at("2030-01-01T00:00:00Z", indexed), indexed);
    }
}
