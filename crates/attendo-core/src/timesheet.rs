//! Per-day attendance summary: arrival, departure, tardiness and time worked
//! inside the shift window.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::types::{AttendanceEvent, ShiftWindow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub shift: ShiftWindow,
    /// Earliest event of the day.
    pub arrived: Option<NaiveDateTime>,
    /// Latest event of the day, when it is not also the earliest.
    pub departed: Option<NaiveDateTime>,
    pub tardy: bool,
    /// Seconds between arrival and departure, clipped to the shift window.
    pub worked_seconds: i64,
}

impl DaySummary {
    /// Summarise one identity's events for `date`. Events from other days
    /// are ignored.
    pub fn compute(date: NaiveDate, events: &[AttendanceEvent], shift: ShiftWindow) -> Self {
        let mut stamps: Vec<NaiveDateTime> = events
            .iter()
            .map(|e| e.timestamp)
            .filter(|ts| ts.date() == date)
            .collect();
        stamps.sort();

        let arrived = stamps.first().copied();
        let departed = match (stamps.first(), stamps.last()) {
            (Some(first), Some(last)) if stamps.len() > 1 && last > first => Some(*last),
            _ => None,
        };

        let (start, end) = shift.bounds(date);
        let tardy = arrived.is_some_and(|a| a > start);

        let worked = match (arrived, departed) {
            (Some(a), Some(d)) => {
                let from = a.max(start);
                let to = d.min(end);
                if to > from {
                    to - from
                } else {
                    Duration::zero()
                }
            }
            _ => Duration::zero(),
        };

        Self {
            date,
            shift,
            arrived,
            departed,
            tardy,
            worked_seconds: worked.num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, EventOrigin};
    use chrono::NaiveTime;
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn ev(h: u32, m: u32, kind: EventKind) -> AttendanceEvent {
        AttendanceEvent {
            event_id: Uuid::new_v4(),
            identity_id: Uuid::from_u128(9),
            timestamp: day().and_hms_opt(h, m, 0).unwrap(),
            kind,
            origin: EventOrigin::SelfService,
        }
    }

    fn nine_to_five() -> ShiftWindow {
        ShiftWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_on_time_full_day() {
        let events = [ev(8, 50, EventKind::In), ev(17, 30, EventKind::Out)];
        let summary = DaySummary::compute(day(), &events, nine_to_five());
        assert!(!summary.tardy);
        assert_eq!(summary.worked_seconds, 8 * 3600);
    }

    #[test]
    fn test_late_arrival_early_departure() {
        let events = [ev(16, 0, EventKind::Out), ev(9, 30, EventKind::In)];
        let summary = DaySummary::compute(day(), &events, nine_to_five());
        assert!(summary.tardy);
        assert_eq!(summary.arrived, Some(day().and_hms_opt(9, 30, 0).unwrap()));
        assert_eq!(summary.worked_seconds, 6 * 3600 + 30 * 60);
    }

    #[test]
    fn test_single_event_has_no_departure() {
        let events = [ev(9, 0, EventKind::In)];
        let summary = DaySummary::compute(day(), &events, nine_to_five());
        assert_eq!(summary.departed, None);
        assert_eq!(summary.worked_seconds, 0);
        assert!(!summary.tardy);
    }

    #[test]
    fn test_no_events() {
        let summary = DaySummary::compute(day(), &[], nine_to_five());
        assert_eq!(summary.arrived, None);
        assert!(!summary.tardy);
    }

    #[test]
    fn test_outside_shift_counts_nothing() {
        let events = [ev(18, 0, EventKind::In), ev(19, 0, EventKind::Out)];
        let summary = DaySummary::compute(day(), &events, nine_to_five());
        assert_eq!(summary.worked_seconds, 0);
    }
}
