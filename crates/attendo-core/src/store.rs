//! The `AttendanceStore` trait and the roster records it manages.
//!
//! Implemented by storage backends (e.g. `attendo-store-sqlite`). The kiosk
//! pipeline, daemon and CLI depend on this abstraction only.

use std::future::Future;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::case::{CaseDecision, CaseResolution, CaseStatus, NewCase, SuspiciousCase};
use crate::gate::OperatorToken;
use crate::resolver::{DuplicateAttempt, ResolverRules};
use crate::types::{
    AttendanceEvent, Embedding, EnrolledFace, EventKind, EventOrigin, Identity, ShiftWindow,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shift {
    pub shift_id: Uuid,
    pub name: String,
    pub window: ShiftWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub group_id: Uuid,
    pub name: String,
    pub shift_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub code: String,
    pub display_name: String,
    pub is_privileged: bool,
    pub shift_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub image_url: Option<String>,
}

/// Result of an atomic resolve-and-append.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Recorded {
        /// Synthetic out closing an abandoned session, written first.
        backfill: Option<AttendanceEvent>,
        event: AttendanceEvent,
    },
    Duplicate(DuplicateAttempt),
}

/// Abstraction over an attendance store backend.
///
/// Attendance events are append-only. `record_attendance` and `resolve_case`
/// read, decide and write inside one transaction so concurrent calls for the
/// same identity or case are serialised.
pub trait AttendanceStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    // ── Roster ────────────────────────────────────────────────────────────

    fn add_shift(
        &self,
        name: String,
        window: ShiftWindow,
    ) -> impl Future<Output = Result<Shift, Self::Error>> + Send + '_;

    fn add_group(
        &self,
        name: String,
        shift_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

    fn add_identity(
        &self,
        input: NewIdentity,
    ) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

    /// Identity with its effective shift resolved. `None` if not found.
    fn get_identity(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

    fn find_identity_by_code(
        &self,
        code: String,
    ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

    fn list_identities(&self)
        -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

    // ── Enrollment ────────────────────────────────────────────────────────

    /// Every identity that has a reference embedding.
    fn enrolled_faces(
        &self,
    ) -> impl Future<Output = Result<Vec<EnrolledFace>, Self::Error>> + Send + '_;

    fn count_enrolled(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

    fn get_embedding(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = Result<Option<Embedding>, Self::Error>> + Send + '_;

    /// Set or clear (`None`) the reference embedding.
    fn set_embedding(
        &self,
        identity_id: Uuid,
        embedding: Option<Embedding>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    // ── Attendance ────────────────────────────────────────────────────────

    fn last_event(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = Result<Option<AttendanceEvent>, Self::Error>> + Send + '_;

    /// Events with `from <= timestamp < to`, oldest first.
    fn events_between(
        &self,
        identity_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> impl Future<Output = Result<Vec<AttendanceEvent>, Self::Error>> + Send + '_;

    /// Run the attendance resolver for `identity_id` at `now` and append its
    /// events, atomically.
    fn record_attendance(
        &self,
        identity_id: Uuid,
        now: NaiveDateTime,
        origin: EventOrigin,
        rules: ResolverRules,
    ) -> impl Future<Output = Result<Resolution, Self::Error>> + Send + '_;

    /// Append a manager-entered event at an explicit time.
    fn record_manual_event(
        &self,
        identity_id: Uuid,
        timestamp: NaiveDateTime,
        kind: EventKind,
    ) -> impl Future<Output = Result<AttendanceEvent, Self::Error>> + Send + '_;

    // ── Suspicious cases ──────────────────────────────────────────────────

    fn create_case(
        &self,
        input: NewCase,
    ) -> impl Future<Output = Result<SuspiciousCase, Self::Error>> + Send + '_;

    fn get_case(
        &self,
        case_id: Uuid,
    ) -> impl Future<Output = Result<Option<SuspiciousCase>, Self::Error>> + Send + '_;

    /// Newest first.
    fn list_cases(
        &self,
        status: Option<CaseStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SuspiciousCase>, Self::Error>> + Send + '_;

    fn count_cases(
        &self,
        status: Option<CaseStatus>,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

    /// Move a pending case to its terminal status. Confirmation also runs
    /// the resolver for the candidate at the capture time, in the same
    /// transaction. Fails with `InvalidCaseState` when the case is not pending.
    fn resolve_case(
        &self,
        case_id: Uuid,
        decision: CaseDecision,
        operator: OperatorToken,
        reviewed_at: NaiveDateTime,
        rules: ResolverRules,
    ) -> impl Future<Output = Result<CaseResolution, Self::Error>> + Send + '_;
}
