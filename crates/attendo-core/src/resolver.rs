//! Decides which attendance events a successful identification produces.
//!
//! The resolver is a pure function of the identity's most recent event, its
//! effective shift and the current time. Stores call it inside the same
//! transaction that reads the last event and writes the result, which makes
//! the read-decide-write sequence atomic per identity.

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

use crate::types::{day_end, AttendanceEvent, EventKind, EventOrigin, NewEvent, ShiftWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverRules {
    /// Minimum time between two accepted events for one identity.
    pub cooldown: Duration,
}

impl Default for ResolverRules {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(5),
        }
    }
}

/// The identity already has an event inside the cool-down window.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("attendance already recorded at {last_at}")]
pub struct DuplicateAttempt {
    pub last_at: NaiveDateTime,
}

/// Compute the events to append for an identity identified at `now`.
///
/// Returns at most one `auto-backfill` out closing an abandoned session,
/// followed by exactly one event with the requested `origin`.
pub fn resolve(
    last: Option<&AttendanceEvent>,
    shift: Option<&ShiftWindow>,
    now: NaiveDateTime,
    origin: EventOrigin,
    rules: ResolverRules,
) -> Result<Vec<NewEvent>, DuplicateAttempt> {
    let Some(last) = last else {
        return Ok(vec![NewEvent {
            timestamp: now,
            kind: EventKind::In,
            origin,
        }]);
    };

    // A clock set backwards also lands here: the delta is negative.
    if now - last.timestamp < rules.cooldown {
        return Err(DuplicateAttempt {
            last_at: last.timestamp,
        });
    }

    let mut events = Vec::with_capacity(2);
    let mut previous_kind = last.kind;

    if last.kind == EventKind::In {
        let close = backfill_timestamp(last.timestamp, shift);
        if is_abandoned(close, shift, now) {
            tracing::debug!(
                identity = %last.identity_id,
                opened = %last.timestamp,
                closed = %close,
                "closing abandoned session"
            );
            events.push(NewEvent {
                timestamp: close,
                kind: EventKind::Out,
                origin: EventOrigin::AutoBackfill,
            });
            previous_kind = EventKind::Out;
        }
    }

    events.push(NewEvent {
        timestamp: now,
        kind: previous_kind.opposite(),
        origin,
    });
    Ok(events)
}

/// Whether an open session whose window closed at `close` was left behind.
///
/// True once the day the window closes on has passed. With a shift, also
/// true past the midpoint between `close` and the start of the next window,
/// which catches an overnight worker arriving early for their next shift.
fn is_abandoned(close: NaiveDateTime, shift: Option<&ShiftWindow>, now: NaiveDateTime) -> bool {
    if close.date() < now.date() {
        return true;
    }
    let Some(shift) = shift else {
        return false;
    };
    if now <= close {
        return false;
    }
    let mut next_start = shift.bounds(close.date()).0;
    if next_start < close {
        next_start += Duration::days(1);
    }
    now >= close + (next_start - close) / 2
}

/// When the synthetic out for a session opened at `opened` is stamped.
///
/// End of the shift window the session belongs to, or 23:59 of that day
/// without a shift. Always strictly after `opened`.
fn backfill_timestamp(opened: NaiveDateTime, shift: Option<&ShiftWindow>) -> NaiveDateTime {
    let close = match shift {
        Some(shift) => shift.session_close(opened),
        None => day_end(opened.date()),
    };
    if close > opened {
        return close;
    }
    let end = day_end(opened.date());
    if end > opened {
        end
    } else {
        opened + Duration::seconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn event(timestamp: NaiveDateTime, kind: EventKind) -> AttendanceEvent {
        AttendanceEvent {
            event_id: Uuid::new_v4(),
            identity_id: Uuid::from_u128(1),
            timestamp,
            kind,
            origin: EventOrigin::SelfService,
        }
    }

    fn day_shift() -> ShiftWindow {
        ShiftWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    fn run(
        last: Option<&AttendanceEvent>,
        shift: Option<&ShiftWindow>,
        now: NaiveDateTime,
    ) -> Result<Vec<NewEvent>, DuplicateAttempt> {
        resolve(last, shift, now, EventOrigin::SelfService, ResolverRules::default())
    }

    #[test]
    fn test_first_event_is_in() {
        let events = run(None, None, at(1, 8, 55)).unwrap();
        assert_eq!(
            events,
            vec![NewEvent {
                timestamp: at(1, 8, 55),
                kind: EventKind::In,
                origin: EventOrigin::SelfService,
            }]
        );
    }

    #[test]
    fn test_same_day_in_toggles_to_out() {
        let last = event(at(1, 9, 0), EventKind::In);
        let events = run(Some(&last), Some(&day_shift()), at(1, 17, 5)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Out);
    }

    #[test]
    fn test_cooldown_rejects_second_attempt() {
        let last = event(at(1, 9, 0), EventKind::In);
        let err = run(Some(&last), None, at(1, 9, 4)).unwrap_err();
        assert_eq!(err.last_at, at(1, 9, 0));
    }

    #[test]
    fn test_cooldown_boundary_accepts() {
        let last = event(at(1, 9, 0), EventKind::In);
        let events = run(Some(&last), None, at(1, 9, 5)).unwrap();
        assert_eq!(events[0].kind, EventKind::Out);
    }

    #[test]
    fn test_event_before_last_is_duplicate() {
        let last = event(at(1, 12, 0), EventKind::Out);
        assert!(run(Some(&last), None, at(1, 11, 0)).is_err());
    }

    #[test]
    fn test_cooldown_is_configurable() {
        let last = event(at(1, 9, 0), EventKind::In);
        let rules = ResolverRules {
            cooldown: Duration::minutes(30),
        };
        assert!(resolve(Some(&last), None, at(1, 9, 20), EventOrigin::SelfService, rules).is_err());
    }

    #[test]
    fn test_yesterday_open_session_is_backfilled_at_shift_end() {
        let last = event(at(1, 9, 2), EventKind::In);
        let events = run(Some(&last), Some(&day_shift()), at(2, 8, 58)).unwrap();
        assert_eq!(
            events,
            vec![
                NewEvent {
                    timestamp: at(1, 17, 0),
                    kind: EventKind::Out,
                    origin: EventOrigin::AutoBackfill,
                },
                NewEvent {
                    timestamp: at(2, 8, 58),
                    kind: EventKind::In,
                    origin: EventOrigin::SelfService,
                },
            ]
        );
    }

    #[test]
    fn test_backfill_without_shift_uses_day_end() {
        let last = event(at(1, 9, 2), EventKind::In);
        let events = run(Some(&last), None, at(3, 10, 0)).unwrap();
        assert_eq!(events[0].timestamp, at(1, 23, 59));
        assert_eq!(events[0].origin, EventOrigin::AutoBackfill);
        assert_eq!(events[1].kind, EventKind::In);
    }

    #[test]
    fn test_backfill_after_late_check_in_falls_back_to_day_end() {
        // Checked in after the shift had already ended.
        let last = event(at(1, 18, 30), EventKind::In);
        let events = run(Some(&last), Some(&day_shift()), at(2, 9, 0)).unwrap();
        assert_eq!(events[0].timestamp, at(1, 23, 59));
    }

    #[test]
    fn test_yesterday_out_has_no_backfill() {
        let last = event(at(1, 17, 0), EventKind::Out);
        let events = run(Some(&last), Some(&day_shift()), at(2, 9, 0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::In);
    }

    #[test]
    fn test_overnight_shift_checkout_next_morning() {
        let night = ShiftWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let last = event(at(1, 21, 55), EventKind::In);
        let events = run(Some(&last), Some(&night), at(2, 6, 3)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Out);
    }

    #[test]
    fn test_overnight_shift_abandoned_session() {
        let night = ShiftWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let last = event(at(1, 22, 0), EventKind::In);
        let events = run(Some(&last), Some(&night), at(3, 21, 58)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, at(2, 6, 0));
        assert_eq!(events[0].kind, EventKind::Out);
        assert_eq!(events[1].kind, EventKind::In);
    }

    #[test]
    fn test_overnight_session_closed_when_next_shift_begins() {
        let night = ShiftWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let last = event(at(1, 22, 0), EventKind::In);
        let events = run(Some(&last), Some(&night), at(2, 21, 0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, at(2, 6, 0));
        assert_eq!(events[0].kind, EventKind::Out);
        assert_eq!(events[0].origin, EventOrigin::AutoBackfill);
        assert_eq!(events[1].kind, EventKind::In);
        assert_eq!(events[1].timestamp, at(2, 21, 0));
    }

    #[test]
    fn test_overnight_late_checkout_before_midpoint_toggles() {
        let night = ShiftWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let last = event(at(1, 22, 0), EventKind::In);
        let events = run(Some(&last), Some(&night), at(2, 13, 59)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Out);
    }

    #[test]
    fn test_consecutive_nights_strict_toggle() {
        let night = ShiftWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let mut history: Vec<AttendanceEvent> = Vec::new();
        for day in 1..=3 {
            for now in [at(day, 21, 50), at(day + 1, 6, 10)] {
                let events = run(history.last(), Some(&night), now).unwrap();
                assert_eq!(events.len(), 1, "no backfill expected at {now}");
                history.push(events[0].into_event(Uuid::from_u128(1)));
            }
        }
        let kinds: Vec<EventKind> = history.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [EventKind::In, EventKind::Out].repeat(3));
    }

    #[test]
    fn test_day_shift_evening_checkout_toggles() {
        let last = event(at(1, 9, 0), EventKind::In);
        let events = run(Some(&last), Some(&day_shift()), at(1, 22, 30)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Out);
    }

    #[test]
    fn test_consecutive_days_strict_toggle() {
        let mut history: Vec<AttendanceEvent> = Vec::new();
        for day in 1..=3 {
            for now in [at(day, 9, 0), at(day, 17, 0)] {
                let events = run(history.last(), Some(&day_shift()), now).unwrap();
                assert_eq!(events.len(), 1, "no backfill expected at {now}");
                history.push(events[0].into_event(Uuid::from_u128(1)));
            }
        }
        let kinds: Vec<EventKind> = history.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::In,
                EventKind::Out,
                EventKind::In,
                EventKind::Out,
                EventKind::In,
                EventKind::Out,
            ]
        );
    }

    #[test]
    fn test_origin_is_carried_on_real_event_only() {
        let last = event(at(1, 9, 0), EventKind::In);
        let events = resolve(
            Some(&last),
            None,
            at(2, 9, 0),
            EventOrigin::ManagerEntered,
            ResolverRules::default(),
        )
        .unwrap();
        assert_eq!(events[0].origin, EventOrigin::AutoBackfill);
        assert_eq!(events[1].origin, EventOrigin::ManagerEntered);
    }
}
