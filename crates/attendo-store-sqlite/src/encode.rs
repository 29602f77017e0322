//! Conversions between domain types and the plain values stored in SQLite
//! columns.
//!
//! UUIDs are hyphenated lowercase text. Timestamps are naive local time in a
//! fixed-width format so that text ordering matches time ordering.
//! Embeddings are packed little-endian `f32` blobs.

use attendo_core::case::{CaseStatus, SuspiciousCase};
use attendo_core::types::{AttendanceEvent, Embedding, Identity, ShiftWindow};
use chrono::{NaiveDateTime, NaiveTime, SubsecRound as _};
use uuid::Uuid;

use crate::{Error, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const TIME_FORMAT: &str = "%H:%M:%S";

// ── Uuid ──────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

// ── Time ──────────────────────────────────────────────────────────────────

pub fn encode_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Drop the sub-microsecond part that `encode_ts` does not keep.
pub fn stored_precision(ts: NaiveDateTime) -> NaiveDateTime {
    ts.trunc_subsecs(6)
}

pub fn decode_ts(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn decode_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn decode_shift(start: &str, end: &str) -> Result<ShiftWindow> {
    Ok(ShiftWindow::new(decode_time(start)?, decode_time(end)?))
}

// ── Embedding ─────────────────────────────────────────────────────────────

pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

pub fn decode_embedding(
    identity_id: Uuid,
    blob: &[u8],
    model_version: Option<String>,
) -> Result<Embedding> {
    if blob.len() % 4 != 0 {
        return Err(Error::CorruptEmbedding {
            identity_id,
            len: blob.len(),
        });
    }
    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Embedding {
        values,
        model_version,
    })
}

// ── Row types ─────────────────────────────────────────────────────────────

/// Column list matching [`RawIdentity::from_row`]. Joins resolve the
/// effective shift: the identity's own, else its group's.
pub const IDENTITY_SELECT: &str = "
    SELECT i.identity_id, i.code, i.display_name, i.is_privileged, i.image_url,
           i.embedding IS NOT NULL,
           COALESCE(s.start_time, gs.start_time),
           COALESCE(s.end_time, gs.end_time)
    FROM identities i
    LEFT JOIN shifts s        ON s.shift_id = i.shift_id
    LEFT JOIN staff_groups g  ON g.group_id = i.group_id
    LEFT JOIN shifts gs       ON gs.shift_id = g.shift_id";

pub struct RawIdentity {
    pub identity_id: String,
    pub code: String,
    pub display_name: String,
    pub is_privileged: bool,
    pub image_url: Option<String>,
    pub enrolled: bool,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
}

impl RawIdentity {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identity_id: row.get(0)?,
            code: row.get(1)?,
            display_name: row.get(2)?,
            is_privileged: row.get(3)?,
            image_url: row.get(4)?,
            enrolled: row.get(5)?,
            shift_start: row.get(6)?,
            shift_end: row.get(7)?,
        })
    }

    pub fn into_identity(self) -> Result<Identity> {
        let shift = match (self.shift_start, self.shift_end) {
            (Some(start), Some(end)) => Some(decode_shift(&start, &end)?),
            _ => None,
        };
        Ok(Identity {
            identity_id: decode_uuid(&self.identity_id)?,
            code: self.code,
            display_name: self.display_name,
            is_privileged: self.is_privileged,
            image_url: self.image_url,
            shift,
            enrolled: self.enrolled,
        })
    }
}

pub const EVENT_SELECT: &str =
    "SELECT event_id, identity_id, timestamp, kind, origin FROM attendance_events";

pub struct RawEvent {
    pub event_id: String,
    pub identity_id: String,
    pub timestamp: String,
    pub kind: String,
    pub origin: String,
}

impl RawEvent {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            identity_id: row.get(1)?,
            timestamp: row.get(2)?,
            kind: row.get(3)?,
            origin: row.get(4)?,
        })
    }

    pub fn into_event(self) -> Result<AttendanceEvent> {
        Ok(AttendanceEvent {
            event_id: decode_uuid(&self.event_id)?,
            identity_id: decode_uuid(&self.identity_id)?,
            timestamp: decode_ts(&self.timestamp)?,
            kind: self.kind.parse()?,
            origin: self.origin.parse()?,
        })
    }
}

pub const CASE_SELECT: &str = "
    SELECT case_id, candidate_id, distance, evidence_path, captured_at,
           status, reviewed_by, reviewed_at
    FROM suspicious_cases";

pub struct RawCase {
    pub case_id: String,
    pub candidate_id: Option<String>,
    pub distance: f64,
    pub evidence_path: Option<String>,
    pub captured_at: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
}

impl RawCase {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            case_id: row.get(0)?,
            candidate_id: row.get(1)?,
            distance: row.get(2)?,
            evidence_path: row.get(3)?,
            captured_at: row.get(4)?,
            status: row.get(5)?,
            reviewed_by: row.get(6)?,
            reviewed_at: row.get(7)?,
        })
    }

    pub fn into_case(self) -> Result<SuspiciousCase> {
        Ok(SuspiciousCase {
            case_id: decode_uuid(&self.case_id)?,
            candidate_id: self.candidate_id.as_deref().map(decode_uuid).transpose()?,
            distance: self.distance as f32,
            evidence_path: self.evidence_path,
            captured_at: decode_ts(&self.captured_at)?,
            status: self.status.parse::<CaseStatus>()?,
            reviewed_by: self.reviewed_by.as_deref().map(decode_uuid).transpose()?,
            reviewed_at: self.reviewed_at.as_deref().map(decode_ts).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let early = day.and_hms_opt(9, 5, 0).unwrap();
        let late = day.and_hms_micro_opt(10, 0, 0, 1).unwrap();
        assert!(encode_ts(early) < encode_ts(late));
        assert_eq!(decode_ts(&encode_ts(late)).unwrap(), late);
    }

    #[test]
    fn test_stored_precision_survives_encoding() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let precise = day.and_hms_nano_opt(9, 0, 0, 123_456_789).unwrap();
        let stored = stored_precision(precise);
        assert_eq!(stored, day.and_hms_micro_opt(9, 0, 0, 123_456).unwrap());
        assert_eq!(decode_ts(&encode_ts(stored)).unwrap(), stored);
    }

    #[test]
    fn test_embedding_blob() {
        let id = Uuid::new_v4();
        let e = Embedding::new(vec![0.25, -1.5, 3.0]);
        let blob = encode_embedding(&e);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_embedding(id, &blob, None).unwrap(), e);
        assert!(matches!(
            decode_embedding(id, &blob[..5], None),
            Err(Error::CorruptEmbedding { len: 5, .. })
        ));
    }
}
