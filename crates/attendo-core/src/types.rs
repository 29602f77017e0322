use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Face embedding vector (128-dimensional for the default extractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding, when the extractor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Callers must check that both vectors have the same dimension; extra
    /// components of the longer vector are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise mean of two embeddings of equal dimension.
    pub fn average(&self, other: &Embedding) -> Embedding {
        Embedding {
            values: self
                .values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a + b) / 2.0)
                .collect(),
            model_version: self.model_version.clone(),
        }
    }
}

/// A person known to the roster, with the shift resolved from their own
/// assignment or their group's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub identity_id: Uuid,
    /// Personnel code shown on the kiosk.
    pub code: String,
    pub display_name: String,
    /// Staff and managers. Never clock in or out at the public kiosk.
    pub is_privileged: bool,
    pub image_url: Option<String>,
    pub shift: Option<ShiftWindow>,
    pub enrolled: bool,
}

/// Gallery entry handed to the matcher.
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub identity_id: Uuid,
    pub is_privileged: bool,
    pub embedding: Embedding,
}

/// A daily working window. `end <= start` means the shift ends on the
/// following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ShiftWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Start and end of the window that begins on `date`.
    pub fn bounds(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start);
        let mut end = date.and_time(self.end);
        if self.crosses_midnight() {
            end += Duration::days(1);
        }
        (start, end)
    }

    /// End of the window a session opened at `opened` belongs to.
    ///
    /// For overnight shifts a check-in before the end time belongs to the
    /// window that began the previous evening.
    pub fn session_close(&self, opened: NaiveDateTime) -> NaiveDateTime {
        let date = opened.date();
        if self.crosses_midnight() && opened.time() < self.end {
            date.and_time(self.end)
        } else {
            self.bounds(date).1
        }
    }
}

impl fmt::Display for ShiftWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl FromStr for ShiftWindow {
    type Err = Error;

    /// Parses `"HH:MM-HH:MM"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::UnknownValue {
            field: "shift",
            value: s.to_string(),
        };
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;
        Ok(Self { start, end })
    }
}

/// 23:59 on `date`; closes sessions for identities without a shift.
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default()) + Duration::minutes(23 * 60 + 59)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    In,
    Out,
}

impl EventKind {
    pub fn opposite(self) -> Self {
        match self {
            EventKind::In => EventKind::Out,
            EventKind::Out => EventKind::In,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::In => "in",
            EventKind::Out => "out",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(EventKind::In),
            "out" => Ok(EventKind::Out),
            other => Err(Error::UnknownValue {
                field: "event kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Who caused an event to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventOrigin {
    SelfService,
    AutoBackfill,
    ManagerEntered,
}

impl EventOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            EventOrigin::SelfService => "self-service",
            EventOrigin::AutoBackfill => "auto-backfill",
            EventOrigin::ManagerEntered => "manager-entered",
        }
    }
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self-service" => Ok(EventOrigin::SelfService),
            "auto-backfill" => Ok(EventOrigin::AutoBackfill),
            "manager-entered" => Ok(EventOrigin::ManagerEntered),
            other => Err(Error::UnknownValue {
                field: "event origin",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted clock action. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub event_id: Uuid,
    pub identity_id: Uuid,
    /// Naive local time; the core never converts time zones.
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
    pub origin: EventOrigin,
}

/// An event decided by the resolver but not yet written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEvent {
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
    pub origin: EventOrigin,
}

impl NewEvent {
    pub fn into_event(self, identity_id: Uuid) -> AttendanceEvent {
        AttendanceEvent {
            event_id: Uuid::new_v4(),
            identity_id,
            timestamp: self.timestamp,
            kind: self.kind,
            origin: self.origin,
        }
    }
}
