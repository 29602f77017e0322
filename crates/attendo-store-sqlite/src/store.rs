//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::path::Path;

use attendo_core::case::{
    self, CaseDecision, CaseResolution, CaseStatus, NewCase, SuspiciousCase,
};
use attendo_core::gate::OperatorToken;
use attendo_core::resolver::{self, DuplicateAttempt, ResolverRules};
use attendo_core::store::{AttendanceStore, Group, NewIdentity, Resolution, Shift};
use attendo_core::types::{
    AttendanceEvent, Embedding, EnrolledFace, EventKind, EventOrigin, Identity, NewEvent,
    ShiftWindow,
};
use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::encode::{
    decode_embedding, decode_uuid, encode_embedding, encode_time, encode_ts, encode_uuid,
    stored_precision, RawCase, RawEvent, RawIdentity, CASE_SELECT, EVENT_SELECT, IDENTITY_SELECT,
};
use crate::schema::SCHEMA;
use crate::{Error, Result};

type CallResult<T> = std::result::Result<T, tokio_rusqlite::Error>;

/// An attendance store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the same connection thread.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store, for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn query_identity(&self, clause: &'static str, key: String) -> Result<Option<Identity>> {
        let raw = self
            .conn
            .call(move |conn| {
                let sql = format!("{IDENTITY_SELECT} WHERE {clause}");
                Ok(conn
                    .query_row(&sql, [key], RawIdentity::from_row)
                    .optional()?)
            })
            .await?;
        raw.map(RawIdentity::into_identity).transpose()
    }
}

// ── Transaction bodies ────────────────────────────────────────────────────

/// Outcome of running the resolver inside a transaction.
enum Attempt {
    UnknownIdentity,
    Duplicate(DuplicateAttempt),
    Recorded {
        backfill: Option<AttendanceEvent>,
        event: AttendanceEvent,
    },
}

enum CaseOutcome {
    NotFound,
    NotPending(CaseStatus),
    Resolved(CaseResolution),
}

/// Box a decode failure so it can leave a connection closure.
fn other(err: Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Insert one event. `false` when `(identity_id, timestamp)` already exists.
fn insert_event(conn: &rusqlite::Connection, event: &AttendanceEvent) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO attendance_events (event_id, identity_id, timestamp, kind, origin)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            encode_uuid(event.event_id),
            encode_uuid(event.identity_id),
            encode_ts(event.timestamp),
            event.kind.as_str(),
            event.origin.as_str(),
        ],
    );
    match inserted {
        Ok(_) => Ok(true),
        Err(err) if is_constraint_violation(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Read the identity's shift and last event, run the resolver and append
/// its events. Callers must hold an open write transaction on `conn`.
fn resolve_and_append(
    conn: &rusqlite::Connection,
    identity_id: Uuid,
    now: NaiveDateTime,
    origin: EventOrigin,
    rules: ResolverRules,
) -> CallResult<Attempt> {
    let id_str = encode_uuid(identity_id);

    let identity = conn
        .query_row(
            &format!("{IDENTITY_SELECT} WHERE i.identity_id = ?1"),
            [&id_str],
            RawIdentity::from_row,
        )
        .optional()?;
    let Some(identity) = identity else {
        return Ok(Attempt::UnknownIdentity);
    };
    let identity = identity.into_identity().map_err(other)?;

    let last = conn
        .query_row(
            &format!("{EVENT_SELECT} WHERE identity_id = ?1 ORDER BY timestamp DESC LIMIT 1"),
            [&id_str],
            RawEvent::from_row,
        )
        .optional()?
        .map(RawEvent::into_event)
        .transpose()
        .map_err(other)?;

    let planned = match resolver::resolve(
        last.as_ref(),
        identity.shift.as_ref(),
        now,
        origin,
        rules,
    ) {
        Ok(planned) => planned,
        Err(dup) => return Ok(Attempt::Duplicate(dup)),
    };

    let (backfill, event): (Option<NewEvent>, NewEvent) = match planned.as_slice() {
        [event] => (None, *event),
        [backfill, event] => (Some(*backfill), *event),
        _ => {
            return Err(tokio_rusqlite::Error::Other(
                format!("resolver planned {} events", planned.len()).into(),
            ))
        }
    };

    let backfill = backfill.map(|b| b.into_event(identity_id));
    let event = event.into_event(identity_id);
    for written in backfill.iter().chain(std::iter::once(&event)) {
        if !insert_event(conn, written)? {
            // Only reachable with a zero cool-down and an identical timestamp.
            return Ok(Attempt::Duplicate(DuplicateAttempt {
                last_at: written.timestamp,
            }));
        }
    }

    Ok(Attempt::Recorded { backfill, event })
}

// ── AttendanceStore impl ──────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
    type Error = Error;

    async fn add_shift(&self, name: String, window: ShiftWindow) -> Result<Shift> {
        let shift = Shift {
            shift_id: Uuid::new_v4(),
            name,
            window,
        };
        let id = encode_uuid(shift.shift_id);
        let name = shift.name.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO shifts (shift_id, name, start_time, end_time)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        id,
                        name,
                        encode_time(window.start),
                        encode_time(window.end)
                    ],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!(shift = %shift.shift_id, window = %window, "shift added");
        Ok(shift)
    }

    async fn add_group(&self, name: String, shift_id: Option<Uuid>) -> Result<Group> {
        let group = Group {
            group_id: Uuid::new_v4(),
            name,
            shift_id,
        };
        let id = encode_uuid(group.group_id);
        let name = group.name.clone();
        let shift = shift_id.map(encode_uuid);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO staff_groups (group_id, name, shift_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, name, shift],
                )?;
                Ok(())
            })
            .await?;
        Ok(group)
    }

    async fn add_identity(&self, input: NewIdentity) -> Result<Identity> {
        let identity_id = Uuid::new_v4();
        let id = encode_uuid(identity_id);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities
                         (identity_id, code, display_name, is_privileged, image_url,
                          shift_id, group_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id,
                        input.code,
                        input.display_name,
                        input.is_privileged,
                        input.image_url,
                        input.shift_id.map(encode_uuid),
                        input.group_id.map(encode_uuid),
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.get_identity(identity_id)
            .await?
            .ok_or(Error::Core(attendo_core::Error::IdentityNotFound(identity_id)))
    }

    async fn get_identity(&self, identity_id: Uuid) -> Result<Option<Identity>> {
        self.query_identity("i.identity_id = ?1", encode_uuid(identity_id))
            .await
    }

    async fn find_identity_by_code(&self, code: String) -> Result<Option<Identity>> {
        self.query_identity("i.code = ?1", code).await
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        let raws: Vec<RawIdentity> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{IDENTITY_SELECT} ORDER BY i.code"))?;
                let rows = stmt
                    .query_map([], RawIdentity::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawIdentity::into_identity).collect()
    }

    async fn enrolled_faces(&self) -> Result<Vec<EnrolledFace>> {
        let rows: Vec<(String, bool, Vec<u8>, Option<String>)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity_id, is_privileged, embedding, model_version
                     FROM identities WHERE embedding IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, is_privileged, blob, model_version)| {
                let identity_id = decode_uuid(&id)?;
                Ok(EnrolledFace {
                    identity_id,
                    is_privileged,
                    embedding: decode_embedding(identity_id, &blob, model_version)?,
                })
            })
            .collect()
    }

    async fn count_enrolled(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM identities WHERE embedding IS NOT NULL",
                    [],
                    |r| r.get(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn get_embedding(&self, identity_id: Uuid) -> Result<Option<Embedding>> {
        let id = encode_uuid(identity_id);
        let row: Option<(Option<Vec<u8>>, Option<String>)> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT embedding, model_version FROM identities WHERE identity_id = ?1",
                        [id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;

        match row {
            None => Err(attendo_core::Error::IdentityNotFound(identity_id).into()),
            Some((None, _)) => Ok(None),
            Some((Some(blob), model_version)) => {
                decode_embedding(identity_id, &blob, model_version).map(Some)
            }
        }
    }

    async fn set_embedding(&self, identity_id: Uuid, embedding: Option<Embedding>) -> Result<()> {
        let id = encode_uuid(identity_id);
        let blob = embedding.as_ref().map(encode_embedding);
        let model_version = embedding.and_then(|e| e.model_version);
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE identities SET embedding = ?1, model_version = ?2
                     WHERE identity_id = ?3",
                    rusqlite::params![blob, model_version, id],
                )?)
            })
            .await?;
        if updated == 0 {
            return Err(attendo_core::Error::IdentityNotFound(identity_id).into());
        }
        Ok(())
    }

    async fn last_event(&self, identity_id: Uuid) -> Result<Option<AttendanceEvent>> {
        let id = encode_uuid(identity_id);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "{EVENT_SELECT} WHERE identity_id = ?1 ORDER BY timestamp DESC LIMIT 1"
                        ),
                        [id],
                        RawEvent::from_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawEvent::into_event).transpose()
    }

    async fn events_between(
        &self,
        identity_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<AttendanceEvent>> {
        let id = encode_uuid(identity_id);
        let (from, to) = (encode_ts(from), encode_ts(to));
        let raws: Vec<RawEvent> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{EVENT_SELECT}
                     WHERE identity_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
                     ORDER BY timestamp ASC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![id, from, to], RawEvent::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawEvent::into_event).collect()
    }

    async fn record_attendance(
        &self,
        identity_id: Uuid,
        now: NaiveDateTime,
        origin: EventOrigin,
        rules: ResolverRules,
    ) -> Result<Resolution> {
        let now = stored_precision(now);
        let attempt = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let attempt = resolve_and_append(&tx, identity_id, now, origin, rules)?;
                if matches!(attempt, Attempt::Recorded { .. }) {
                    tx.commit()?;
                }
                Ok(attempt)
            })
            .await?;

        match attempt {
            Attempt::UnknownIdentity => {
                Err(attendo_core::Error::IdentityNotFound(identity_id).into())
            }
            Attempt::Duplicate(dup) => Ok(Resolution::Duplicate(dup)),
            Attempt::Recorded { backfill, event } => Ok(Resolution::Recorded { backfill, event }),
        }
    }

    async fn record_manual_event(
        &self,
        identity_id: Uuid,
        timestamp: NaiveDateTime,
        kind: EventKind,
    ) -> Result<AttendanceEvent> {
        let timestamp = stored_precision(timestamp);
        if self.get_identity(identity_id).await?.is_none() {
            return Err(attendo_core::Error::IdentityNotFound(identity_id).into());
        }

        let event = NewEvent {
            timestamp,
            kind,
            origin: EventOrigin::ManagerEntered,
        }
        .into_event(identity_id);
        let row = event.clone();
        let inserted = self
            .conn
            .call(move |conn| Ok(insert_event(conn, &row)?))
            .await?;

        if !inserted {
            return Err(attendo_core::Error::DuplicateEvent {
                identity_id,
                timestamp,
            }
            .into());
        }
        Ok(event)
    }

    async fn create_case(&self, input: NewCase) -> Result<SuspiciousCase> {
        let case = SuspiciousCase {
            case_id: Uuid::new_v4(),
            candidate_id: input.candidate_id,
            distance: input.distance,
            evidence_path: input.evidence_path,
            captured_at: stored_precision(input.captured_at),
            status: CaseStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
        };
        let row = case.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO suspicious_cases
                         (case_id, candidate_id, distance, evidence_path, captured_at, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        encode_uuid(row.case_id),
                        row.candidate_id.map(encode_uuid),
                        f64::from(row.distance),
                        row.evidence_path,
                        encode_ts(row.captured_at),
                        row.status.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(case)
    }

    async fn get_case(&self, case_id: Uuid) -> Result<Option<SuspiciousCase>> {
        let id = encode_uuid(case_id);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("{CASE_SELECT} WHERE case_id = ?1"),
                        [id],
                        RawCase::from_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawCase::into_case).transpose()
    }

    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
        limit: usize,
    ) -> Result<Vec<SuspiciousCase>> {
        let status = status.map(|s| s.as_str());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raws: Vec<RawCase> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{CASE_SELECT}
                     WHERE (?1 IS NULL OR status = ?1)
                     ORDER BY captured_at DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![status, limit], RawCase::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawCase::into_case).collect()
    }

    async fn count_cases(&self, status: Option<CaseStatus>) -> Result<usize> {
        let status = status.map(|s| s.as_str());
        let count: i64 = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM suspicious_cases WHERE (?1 IS NULL OR status = ?1)",
                    [status],
                    |r| r.get(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn resolve_case(
        &self,
        case_id: Uuid,
        decision: CaseDecision,
        operator: OperatorToken,
        reviewed_at: NaiveDateTime,
        rules: ResolverRules,
    ) -> Result<CaseResolution> {
        let reviewer = operator.operator_id();
        let reviewed_at = stored_precision(reviewed_at);
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let id = encode_uuid(case_id);

                let raw = tx
                    .query_row(
                        &format!("{CASE_SELECT} WHERE case_id = ?1"),
                        [&id],
                        RawCase::from_row,
                    )
                    .optional()?;
                let Some(raw) = raw else {
                    return Ok(CaseOutcome::NotFound);
                };
                let mut case = raw.into_case().map_err(other)?;

                let status = match case::transition(case_id, case.status, decision) {
                    Ok(status) => status,
                    Err(_) => return Ok(CaseOutcome::NotPending(case.status)),
                };

                let updated = tx.execute(
                    "UPDATE suspicious_cases
                     SET status = ?1, reviewed_by = ?2, reviewed_at = ?3
                     WHERE case_id = ?4 AND status = 'pending'",
                    rusqlite::params![
                        status.as_str(),
                        encode_uuid(reviewer),
                        encode_ts(reviewed_at),
                        id
                    ],
                )?;
                if updated == 0 {
                    return Ok(CaseOutcome::NotPending(case.status));
                }
                case.status = status;
                case.reviewed_by = Some(reviewer);
                case.reviewed_at = Some(reviewed_at);

                let mut events = Vec::new();
                let mut duplicate = false;
                if let (CaseDecision::Confirmed, Some(candidate)) = (decision, case.candidate_id) {
                    match resolve_and_append(
                        &tx,
                        candidate,
                        case.captured_at,
                        EventOrigin::ManagerEntered,
                        rules,
                    )? {
                        Attempt::Recorded { backfill, event } => {
                            events.extend(backfill);
                            events.push(event);
                        }
                        Attempt::Duplicate(_) => duplicate = true,
                        Attempt::UnknownIdentity => {
                            tracing::warn!(case = %case_id, candidate = %candidate, "candidate no longer exists");
                        }
                    }
                }

                tx.commit()?;
                Ok(CaseOutcome::Resolved(CaseResolution {
                    case,
                    events,
                    duplicate,
                }))
            })
            .await?;

        match outcome {
            CaseOutcome::NotFound => Err(attendo_core::Error::CaseNotFound(case_id).into()),
            CaseOutcome::NotPending(status) => {
                Err(attendo_core::Error::InvalidCaseState { case_id, status }.into())
            }
            CaseOutcome::Resolved(resolution) => Ok(resolution),
        }
    }
}
