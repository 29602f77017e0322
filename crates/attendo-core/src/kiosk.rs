//! The kiosk pipeline: probe -> matcher -> decision policy -> resolver or
//! case recorder.
//!
//! Replies to the kiosk deliberately collapse staff detection, suspicious
//! matches, unknown faces and an empty roster into one `NotRecognized`
//! outcome. The distinct internal outcome is only logged.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::case::{CaseDecision, CaseResolution, NewCase, SuspiciousCase};
use crate::config::Config;
use crate::enrollment::{EnrollmentError, LivenessPolicy};
use crate::evidence::EvidenceSink;
use crate::gate::{GateError, OperatorGate, OperatorToken};
use crate::matcher::{EuclideanMatcher, MatchError, Matcher};
use crate::policy::{Action, DecisionPolicy, RejectReason, Requester};
use crate::resolver::ResolverRules;
use crate::store::{AttendanceStore, Resolution};
use crate::timesheet::DaySummary;
use crate::types::{AttendanceEvent, Embedding, EventKind, EventOrigin, ShiftWindow};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("embedding extraction failed: {0}")]
    Failed(String),
}

/// Turns a captured image into a face embedding. Supplied by the host.
pub trait EmbeddingExtractor {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ExtractError>;
}

#[derive(Error, Debug)]
pub enum KioskError {
    /// Enrolled data is corrupt. Operator-facing, never shown at the kiosk.
    #[error("enrolled data is inconsistent: {0}")]
    Match(MatchError),
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("identity not found: {0}")]
    IdentityNotFound(Uuid),
    #[error("no identity with code {0:?}")]
    UnknownCode(String),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Extractor(ExtractError),
}

impl KioskError {
    fn store<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KioskError::Store(Box::new(err))
    }
}

/// What the kiosk screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KioskReply {
    Recorded {
        name: String,
        code: String,
        kind: EventKind,
        timestamp: NaiveDateTime,
        image_url: Option<String>,
    },
    AlreadyRecorded,
    FaceNotClear,
    NotRecognized,
}

/// Orchestrates matching, decisions and persistence over a store.
pub struct Kiosk<S, M = EuclideanMatcher> {
    store: S,
    matcher: M,
    policy: DecisionPolicy,
    rules: ResolverRules,
    liveness: LivenessPolicy,
    gate: OperatorGate,
    default_shift: ShiftWindow,
    evidence: Option<Box<dyn EvidenceSink>>,
}

impl<S: AttendanceStore> Kiosk<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            matcher: EuclideanMatcher,
            policy: config.policy(),
            rules: config.rules(),
            liveness: config.liveness(),
            gate: config.operator_gate(),
            default_shift: config.default_shift,
            evidence: None,
        }
    }
}

impl<S: AttendanceStore, M: Matcher> Kiosk<S, M> {
    /// Swap in another nearest-neighbour implementation.
    pub fn with_matcher<N: Matcher>(self, matcher: N) -> Kiosk<S, N> {
        Kiosk {
            store: self.store,
            matcher,
            policy: self.policy,
            rules: self.rules,
            liveness: self.liveness,
            gate: self.gate,
            default_shift: self.default_shift,
            evidence: self.evidence,
        }
    }

    pub fn with_evidence(mut self, sink: impl EvidenceSink + 'static) -> Self {
        self.evidence = Some(Box::new(sink));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Match a probe and apply the decision policy. `None` means the
    /// extractor found no face.
    pub async fn classify(
        &self,
        probe: Option<&Embedding>,
        requester: Requester,
    ) -> Result<Action, KioskError> {
        let Some(probe) = probe else {
            return Ok(self.policy.decide(false, None, requester));
        };

        let gallery = self.store.enrolled_faces().await.map_err(KioskError::store)?;
        let matched = match self.matcher.find_nearest(probe, &gallery) {
            Ok(m) => Some(m),
            Err(MatchError::NoEnrolledIdentities) => None,
            Err(err) => {
                tracing::error!(error = %err, "gallery corrupt");
                return Err(KioskError::Match(err));
            }
        };

        Ok(self.policy.decide(true, matched.as_ref(), requester))
    }

    /// Handle one kiosk capture.
    pub async fn punch(
        &self,
        probe: Option<&Embedding>,
        evidence: Option<&[u8]>,
        now: NaiveDateTime,
    ) -> Result<KioskReply, KioskError> {
        let action = self.classify(probe, Requester::Kiosk).await?;

        match action {
            Action::AttendanceAttempt(identity_id) => {
                self.record(identity_id, now, EventOrigin::SelfService).await
            }
            Action::RecordSuspicious {
                candidate,
                distance,
            } => {
                let case = self
                    .record_suspicious(Some(candidate), distance, evidence, now)
                    .await?;
                tracing::info!(case = %case.case_id, distance, "suspicious match recorded");
                Ok(KioskReply::NotRecognized)
            }
            Action::Reject(reason) => {
                match reason {
                    RejectReason::NothingEnrolled => {
                        tracing::warn!("probe received but no identities are enrolled")
                    }
                    RejectReason::PrivilegedIdentityAtKiosk => {
                        tracing::info!("privileged identity presented at kiosk")
                    }
                    RejectReason::NoFaceDetected | RejectReason::NoMatch => {
                        tracing::debug!(?reason, "probe rejected")
                    }
                }
                Ok(match reason {
                    RejectReason::NoFaceDetected => KioskReply::FaceNotClear,
                    _ => KioskReply::NotRecognized,
                })
            }
        }
    }

    /// Run the extractor on a raw capture, then [`punch`](Self::punch).
    pub async fn punch_image(
        &self,
        extractor: &impl EmbeddingExtractor,
        image: &[u8],
        now: NaiveDateTime,
    ) -> Result<KioskReply, KioskError> {
        let probe = match extractor.extract(image) {
            Ok(embedding) => Some(embedding),
            Err(ExtractError::NoFaceDetected) => None,
            Err(err) => return Err(KioskError::Extractor(err)),
        };
        self.punch(probe.as_ref(), Some(image), now).await
    }

    async fn record(
        &self,
        identity_id: Uuid,
        now: NaiveDateTime,
        origin: EventOrigin,
    ) -> Result<KioskReply, KioskError> {
        let resolution = self
            .store
            .record_attendance(identity_id, now, origin, self.rules)
            .await
            .map_err(KioskError::store)?;

        let (backfill, event) = match resolution {
            Resolution::Recorded { backfill, event } => (backfill, event),
            Resolution::Duplicate(dup) => {
                tracing::info!(identity = %identity_id, last_at = %dup.last_at, "duplicate attempt");
                return Ok(KioskReply::AlreadyRecorded);
            }
        };

        let identity = self
            .store
            .get_identity(identity_id)
            .await
            .map_err(KioskError::store)?
            .ok_or(KioskError::IdentityNotFound(identity_id))?;

        tracing::info!(
            identity = %identity_id,
            kind = %event.kind,
            backfilled = backfill.is_some(),
            "attendance recorded"
        );

        Ok(KioskReply::Recorded {
            name: identity.display_name,
            code: identity.code,
            kind: event.kind,
            timestamp: event.timestamp,
            image_url: identity.image_url,
        })
    }

    /// Persist a pending case. Evidence that cannot be stored is dropped
    /// and the case is recorded without it.
    pub async fn record_suspicious(
        &self,
        candidate_id: Option<Uuid>,
        distance: f32,
        evidence: Option<&[u8]>,
        now: NaiveDateTime,
    ) -> Result<SuspiciousCase, KioskError> {
        let evidence_path = match (&self.evidence, evidence) {
            (Some(sink), Some(image)) => match sink.store(image, now) {
                Ok(path) => Some(path),
                Err(err) => {
                    tracing::warn!(error = %err, "evidence not stored; recording case without image");
                    None
                }
            },
            _ => None,
        };

        self.store
            .create_case(NewCase {
                candidate_id,
                distance,
                evidence_path,
                captured_at: now,
            })
            .await
            .map_err(KioskError::store)
    }

    /// Two-capture enrollment. Stores the averaged reference embedding.
    pub async fn enroll(
        &self,
        identity_id: Uuid,
        first: Option<&Embedding>,
        second: Option<&Embedding>,
    ) -> Result<Embedding, KioskError> {
        let reference = self.liveness.enroll(first, second)?;
        self.store
            .get_identity(identity_id)
            .await
            .map_err(KioskError::store)?
            .ok_or(KioskError::IdentityNotFound(identity_id))?;
        self.store
            .set_embedding(identity_id, Some(reference.clone()))
            .await
            .map_err(KioskError::store)?;
        tracing::info!(identity = %identity_id, dimension = reference.dimension(), "face enrolled");
        Ok(reference)
    }

    /// Face-verify the operator with personnel code `code`.
    pub async fn verify_operator(
        &self,
        code: &str,
        probe: &Embedding,
    ) -> Result<OperatorToken, KioskError> {
        let operator = self
            .store
            .find_identity_by_code(code.to_string())
            .await
            .map_err(KioskError::store)?
            .ok_or_else(|| KioskError::UnknownCode(code.to_string()))?;
        let enrolled = self
            .store
            .get_embedding(operator.identity_id)
            .await
            .map_err(KioskError::store)?;
        Ok(self.gate.verify(&operator, enrolled.as_ref(), probe)?)
    }

    pub async fn resolve_case(
        &self,
        case_id: Uuid,
        decision: CaseDecision,
        operator: OperatorToken,
        now: NaiveDateTime,
    ) -> Result<CaseResolution, KioskError> {
        let reviewer = operator.operator_id();
        let resolution = self
            .store
            .resolve_case(case_id, decision, operator, now, self.rules)
            .await
            .map_err(KioskError::store)?;
        tracing::info!(
            case = %case_id,
            reviewer = %reviewer,
            status = %resolution.case.status,
            events = resolution.events.len(),
            "case resolved"
        );
        Ok(resolution)
    }

    /// Manager-entered event at an explicit time.
    pub async fn record_manual(
        &self,
        operator: &OperatorToken,
        identity_id: Uuid,
        timestamp: NaiveDateTime,
        kind: EventKind,
    ) -> Result<AttendanceEvent, KioskError> {
        let event = self
            .store
            .record_manual_event(identity_id, timestamp, kind)
            .await
            .map_err(KioskError::store)?;
        tracing::info!(
            identity = %identity_id,
            operator = %operator.operator_id(),
            kind = %kind,
            at = %timestamp,
            "manual event recorded"
        );
        Ok(event)
    }

    /// Day summary for one identity, using the default shift when the
    /// identity has none.
    pub async fn timesheet(
        &self,
        identity_id: Uuid,
        date: NaiveDate,
    ) -> Result<DaySummary, KioskError> {
        let identity = self
            .store
            .get_identity(identity_id)
            .await
            .map_err(KioskError::store)?
            .ok_or(KioskError::IdentityNotFound(identity_id))?;
        let from = date.and_time(chrono::NaiveTime::default());
        let events = self
            .store
            .events_between(identity_id, from, from + Duration::days(1))
            .await
            .map_err(KioskError::store)?;
        Ok(DaySummary::compute(
            date,
            &events,
            identity.shift.unwrap_or(self.default_shift),
        ))
    }
}
