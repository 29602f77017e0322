//! Error types shared by `attendo-core` and the store backends.

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::case::CaseStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("identity not found: {0}")]
    IdentityNotFound(Uuid),

    #[error("no identity with code {0:?}")]
    UnknownCode(String),

    #[error("suspicious case not found: {0}")]
    CaseNotFound(Uuid),

    #[error("case {case_id} is already {status}; only pending cases can be resolved")]
    InvalidCaseState { case_id: Uuid, status: CaseStatus },

    #[error("identity {identity_id} already has an event at {timestamp}")]
    DuplicateEvent {
        identity_id: Uuid,
        timestamp: NaiveDateTime,
    },

    #[error("unknown {field}: {value:?}")]
    UnknownValue { field: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
