//! Classifies a match as confident, suspicious, or no match.

use serde::Serialize;
use uuid::Uuid;

use crate::matcher::MatchResult;

/// Where a probe came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// The public clock-in kiosk.
    Kiosk,
    /// A staffed console, e.g. a manager terminal.
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFaceDetected,
    NothingEnrolled,
    PrivilegedIdentityAtKiosk,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reject(RejectReason),
    AttendanceAttempt(Uuid),
    RecordSuspicious { candidate: Uuid, distance: f32 },
}

/// Distance thresholds. Values are tied to one embedding model and come from
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    /// Largest distance accepted as the named identity.
    pub confident_max_distance: f32,
    /// Largest distance still worth a human review.
    pub suspicious_max_distance: f32,
    /// Demote a confident match to suspicious when the runner-up is within
    /// this distance of the best match. `None` disables the check.
    pub ambiguity_margin: Option<f32>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confident_max_distance: 0.5,
            suspicious_max_distance: 0.6,
            ambiguity_margin: None,
        }
    }
}

impl DecisionPolicy {
    /// Decide what to do with a probe. Pure: same inputs, same action.
    ///
    /// `matched` is `None` when nothing is enrolled.
    pub fn decide(
        &self,
        probe_is_present: bool,
        matched: Option<&MatchResult>,
        requester: Requester,
    ) -> Action {
        if !probe_is_present {
            return Action::Reject(RejectReason::NoFaceDetected);
        }
        let Some(m) = matched else {
            return Action::Reject(RejectReason::NothingEnrolled);
        };

        if m.best_distance <= self.confident_max_distance {
            if m.best_is_privileged && requester == Requester::Kiosk {
                return Action::Reject(RejectReason::PrivilegedIdentityAtKiosk);
            }
            if self.is_ambiguous(m) {
                return Action::RecordSuspicious {
                    candidate: m.best_identity,
                    distance: m.best_distance,
                };
            }
            return Action::AttendanceAttempt(m.best_identity);
        }

        if m.best_distance <= self.suspicious_max_distance {
            return Action::RecordSuspicious {
                candidate: m.best_identity,
                distance: m.best_distance,
            };
        }

        Action::Reject(RejectReason::NoMatch)
    }

    fn is_ambiguous(&self, m: &MatchResult) -> bool {
        match (self.ambiguity_margin, m.second_best_distance) {
            (Some(margin), Some(second)) => second - m.best_distance <= margin,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(distance: f32, privileged: bool) -> MatchResult {
        MatchResult {
            best_identity: Uuid::from_u128(0xA),
            best_is_privileged: privileged,
            best_distance: distance,
            second_best_distance: None,
        }
    }

    #[test]
    fn test_confident_match_attempts_attendance() {
        let policy = DecisionPolicy::default();
        let m = result(0.42, false);
        assert_eq!(
            policy.decide(true, Some(&m), Requester::Kiosk),
            Action::AttendanceAttempt(m.best_identity)
        );
    }

    #[test]
    fn test_suspicious_band_records_case() {
        let policy = DecisionPolicy::default();
        let m = result(0.55, false);
        assert_eq!(
            policy.decide(true, Some(&m), Requester::Kiosk),
            Action::RecordSuspicious {
                candidate: m.best_identity,
                distance: 0.55
            }
        );
    }

    #[test]
    fn test_far_probe_is_no_match() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.decide(true, Some(&result(0.9, false)), Requester::Kiosk),
            Action::Reject(RejectReason::NoMatch)
        );
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let policy = DecisionPolicy::default();
        assert!(matches!(
            policy.decide(true, Some(&result(0.5, false)), Requester::Kiosk),
            Action::AttendanceAttempt(_)
        ));
        assert!(matches!(
            policy.decide(true, Some(&result(0.6, false)), Requester::Kiosk),
            Action::RecordSuspicious { .. }
        ));
    }

    #[test]
    fn test_privileged_identity_rejected_at_kiosk() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.decide(true, Some(&result(0.1, true)), Requester::Kiosk),
            Action::Reject(RejectReason::PrivilegedIdentityAtKiosk)
        );
    }

    #[test]
    fn test_privileged_identity_allowed_at_console() {
        let policy = DecisionPolicy::default();
        let m = result(0.1, true);
        assert_eq!(
            policy.decide(true, Some(&m), Requester::Console),
            Action::AttendanceAttempt(m.best_identity)
        );
    }

    #[test]
    fn test_privileged_suspicious_match_still_recorded() {
        let policy = DecisionPolicy::default();
        assert!(matches!(
            policy.decide(true, Some(&result(0.58, true)), Requester::Kiosk),
            Action::RecordSuspicious { .. }
        ));
    }

    #[test]
    fn test_missing_face_checked_first() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.decide(false, Some(&result(0.1, false)), Requester::Kiosk),
            Action::Reject(RejectReason::NoFaceDetected)
        );
        assert_eq!(
            policy.decide(false, None, Requester::Kiosk),
            Action::Reject(RejectReason::NoFaceDetected)
        );
    }

    #[test]
    fn test_nothing_enrolled() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.decide(true, None, Requester::Kiosk),
            Action::Reject(RejectReason::NothingEnrolled)
        );
    }

    #[test]
    fn test_ambiguity_margin_demotes_close_runner_up() {
        let policy = DecisionPolicy {
            ambiguity_margin: Some(0.05),
            ..DecisionPolicy::default()
        };
        let mut m = result(0.30, false);
        m.second_best_distance = Some(0.33);
        assert!(matches!(
            policy.decide(true, Some(&m), Requester::Kiosk),
            Action::RecordSuspicious { .. }
        ));

        m.second_best_distance = Some(0.70);
        assert!(matches!(
            policy.decide(true, Some(&m), Requester::Kiosk),
            Action::AttendanceAttempt(_)
        ));
    }

    #[test]
    fn test_decide_is_deterministic() {
        let policy = DecisionPolicy::default();
        let m = result(0.47, false);
        let first = policy.decide(true, Some(&m), Requester::Kiosk);
        for _ in 0..10 {
            assert_eq!(policy.decide(true, Some(&m), Requester::Kiosk), first);
        }
    }
}
