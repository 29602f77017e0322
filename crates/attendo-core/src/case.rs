//! Suspicious-match cases awaiting human review.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::types::AttendanceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Confirmed,
    Ignored,
    Fraud,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Confirmed => "confirmed",
            CaseStatus::Ignored => "ignored",
            CaseStatus::Fraud => "fraud",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != CaseStatus::Pending
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CaseStatus::Pending),
            "confirmed" => Ok(CaseStatus::Confirmed),
            "ignored" => Ok(CaseStatus::Ignored),
            "fraud" => Ok(CaseStatus::Fraud),
            other => Err(Error::UnknownValue {
                field: "case status",
                value: other.to_string(),
            }),
        }
    }
}

/// A reviewer's verdict on a pending case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseDecision {
    /// The candidate really was at the kiosk; record their attendance.
    Confirmed,
    Ignored,
    Fraud,
}

impl CaseDecision {
    pub fn status(self) -> CaseStatus {
        match self {
            CaseDecision::Confirmed => CaseStatus::Confirmed,
            CaseDecision::Ignored => CaseStatus::Ignored,
            CaseDecision::Fraud => CaseStatus::Fraud,
        }
    }
}

impl FromStr for CaseDecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" | "confirm" => Ok(CaseDecision::Confirmed),
            "ignored" | "ignore" => Ok(CaseDecision::Ignored),
            "fraud" => Ok(CaseDecision::Fraud),
            other => Err(Error::UnknownValue {
                field: "case decision",
                value: other.to_string(),
            }),
        }
    }
}

/// Check that a case in `current` status may take `decision`.
pub fn transition(
    case_id: Uuid,
    current: CaseStatus,
    decision: CaseDecision,
) -> Result<CaseStatus, Error> {
    if current.is_terminal() {
        return Err(Error::InvalidCaseState {
            case_id,
            status: current,
        });
    }
    Ok(decision.status())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousCase {
    pub case_id: Uuid,
    /// Closest identity, if any was close enough to name.
    pub candidate_id: Option<Uuid>,
    /// Euclidean distance of the probe to the candidate.
    pub distance: f32,
    /// Where the captured frame was stored, if storing it succeeded.
    pub evidence_path: Option<String>,
    pub captured_at: NaiveDateTime,
    pub status: CaseStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub candidate_id: Option<Uuid>,
    pub distance: f32,
    pub evidence_path: Option<String>,
    pub captured_at: NaiveDateTime,
}

/// Outcome of resolving a case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResolution {
    pub case: SuspiciousCase,
    /// Events written for the candidate on confirmation.
    pub events: Vec<AttendanceEvent>,
    /// Confirmation found the candidate already recorded inside the cool-down.
    pub duplicate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_case_accepts_every_decision() {
        let id = Uuid::new_v4();
        for decision in [CaseDecision::Confirmed, CaseDecision::Ignored, CaseDecision::Fraud] {
            assert_eq!(
                transition(id, CaseStatus::Pending, decision).unwrap(),
                decision.status()
            );
        }
    }

    #[test]
    fn test_terminal_case_rejects_decisions() {
        let id = Uuid::new_v4();
        let err = transition(id, CaseStatus::Confirmed, CaseDecision::Confirmed).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCaseState {
                status: CaseStatus::Confirmed,
                ..
            }
        ));
        assert!(transition(id, CaseStatus::Fraud, CaseDecision::Ignored).is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("ignored".parse::<CaseStatus>().unwrap(), CaseStatus::Ignored);
        assert_eq!(CaseStatus::Fraud.to_string(), "fraud");
        assert_eq!("confirm".parse::<CaseDecision>().unwrap(), CaseDecision::Confirmed);
        assert!("maybe".parse::<CaseDecision>().is_err());
    }
}
