use attendo_core::case::{CaseDecision, CaseStatus};
use attendo_core::gate::OperatorToken;
use attendo_core::kiosk::KioskError;
use attendo_core::store::AttendanceStore;
use attendo_core::types::{Embedding, EventKind};
use attendo_core::{Config, Identity, Kiosk};
use attendo_store_sqlite::SqliteStore;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;
use zbus::fdo;
use zbus::interface;

const DEFAULT_CASE_LIMIT: u32 = 50;

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.attendo.Attendance1
/// Object path: /org/attendo/Attendance1
///
/// Embeddings travel as JSON (`{"values": [...]}`); an empty string stands
/// for a capture with no face. Review methods take the operator's code and
/// a live probe, and run only after the probe matches that operator.
pub struct AttendanceService {
    kiosk: Kiosk<SqliteStore>,
    db_path: String,
}

impl AttendanceService {
    pub fn new(kiosk: Kiosk<SqliteStore>, config: &Config) -> Self {
        Self {
            kiosk,
            db_path: config.db_path.display().to_string(),
        }
    }

    async fn operator(&self, code: &str, probe_json: &str) -> fdo::Result<OperatorToken> {
        let probe = parse_probe(probe_json)?
            .ok_or_else(|| fdo::Error::AccessDenied("no operator face in capture".into()))?;
        self.kiosk
            .verify_operator(code, &probe)
            .await
            .map_err(kiosk_error)
    }

    async fn identity_by_code(&self, code: &str) -> fdo::Result<Identity> {
        self.kiosk
            .store()
            .find_identity_by_code(code.to_string())
            .await
            .map_err(failed)?
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("no identity with code {code:?}")))
    }
}

#[interface(name = "org.attendo.Attendance1")]
impl AttendanceService {
    /// Handle one kiosk capture. Returns the kiosk reply as JSON.
    async fn punch(&self, probe: &str, evidence: Vec<u8>) -> fdo::Result<String> {
        let probe = parse_probe(probe)?;
        let evidence = (!evidence.is_empty()).then_some(evidence.as_slice());
        let reply = self
            .kiosk
            .punch(probe.as_ref(), evidence, now())
            .await
            .map_err(kiosk_error)?;
        to_json(&reply)
    }

    /// Two-capture enrollment for the identity with personnel `code`.
    async fn enroll(&self, code: &str, first: &str, second: &str) -> fdo::Result<String> {
        tracing::info!(code, "enroll requested");
        let identity = self.identity_by_code(code).await?;
        let (first, second) = (parse_probe(first)?, parse_probe(second)?);
        let reference = self
            .kiosk
            .enroll(identity.identity_id, first.as_ref(), second.as_ref())
            .await
            .map_err(kiosk_error)?;
        to_json(&serde_json::json!({
            "identity_id": identity.identity_id,
            "dimension": reference.dimension(),
        }))
    }

    /// Suspicious cases, newest first. `status` may be empty for all.
    async fn list_cases(&self, status: &str, limit: u32) -> fdo::Result<String> {
        let status = if status.is_empty() {
            None
        } else {
            Some(status.parse::<CaseStatus>().map_err(invalid_args)?)
        };
        let limit = if limit == 0 { DEFAULT_CASE_LIMIT } else { limit };
        let cases = self
            .kiosk
            .store()
            .list_cases(status, limit as usize)
            .await
            .map_err(failed)?;
        to_json(&cases)
    }

    /// Confirm, ignore or flag a pending case.
    async fn resolve_case(
        &self,
        case_id: &str,
        decision: &str,
        operator_code: &str,
        operator_probe: &str,
    ) -> fdo::Result<String> {
        let case_id = Uuid::parse_str(case_id).map_err(invalid_args)?;
        let decision = decision.parse::<CaseDecision>().map_err(invalid_args)?;
        let operator = self.operator(operator_code, operator_probe).await?;
        let resolution = self
            .kiosk
            .resolve_case(case_id, decision, operator, now())
            .await
            .map_err(kiosk_error)?;
        to_json(&resolution)
    }

    /// Record an event at an explicit time for the identity with `code`.
    async fn manual_event(
        &self,
        code: &str,
        timestamp: &str,
        kind: &str,
        operator_code: &str,
        operator_probe: &str,
    ) -> fdo::Result<String> {
        let timestamp = timestamp
            .parse::<NaiveDateTime>()
            .map_err(invalid_args)?;
        let kind = kind.parse::<EventKind>().map_err(invalid_args)?;
        let operator = self.operator(operator_code, operator_probe).await?;
        let identity = self.identity_by_code(code).await?;
        let event = self
            .kiosk
            .record_manual(&operator, identity.identity_id, timestamp, kind)
            .await
            .map_err(kiosk_error)?;
        to_json(&event)
    }

    /// Arrival, departure and time worked for one day (`YYYY-MM-DD`).
    async fn timesheet(&self, code: &str, date: &str) -> fdo::Result<String> {
        let date = date.parse::<NaiveDate>().map_err(invalid_args)?;
        let identity = self.identity_by_code(code).await?;
        let summary = self
            .kiosk
            .timesheet(identity.identity_id, date)
            .await
            .map_err(kiosk_error)?;
        to_json(&summary)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let store = self.kiosk.store();
        let enrolled = store.count_enrolled().await.map_err(failed)?;
        let pending = store
            .count_cases(Some(CaseStatus::Pending))
            .await
            .map_err(failed)?;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": self.db_path,
            "enrolled": enrolled,
            "pending_cases": pending,
        }))
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Empty input means the extractor found no face.
fn parse_probe(json: &str) -> fdo::Result<Option<Embedding>> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<Option<Embedding>>(json)
        .map_err(|e| fdo::Error::InvalidArgs(format!("invalid embedding: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(failed)
}

fn failed(err: impl std::fmt::Display) -> fdo::Error {
    fdo::Error::Failed(err.to_string())
}

fn invalid_args(err: impl std::fmt::Display) -> fdo::Error {
    fdo::Error::InvalidArgs(err.to_string())
}

fn kiosk_error(err: KioskError) -> fdo::Error {
    match err {
        KioskError::Gate(e) => fdo::Error::AccessDenied(e.to_string()),
        KioskError::UnknownCode(_) | KioskError::IdentityNotFound(_) => invalid_args(err),
        KioskError::Enrollment(_) => invalid_args(err),
        other => {
            tracing::error!(error = %other, "request failed");
            failed(other)
        }
    }
}
