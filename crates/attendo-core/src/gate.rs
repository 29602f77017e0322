//! Face re-verification of a privileged operator.
//!
//! Review actions take an [`OperatorToken`] instead of consulting any
//! session state. The token can only be minted here, after the operator's
//! live probe matched their own enrolled face.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Embedding, Identity};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("identity {0} is not privileged")]
    NotPrivileged(Uuid),
    #[error("identity {0} has no enrolled face")]
    NotEnrolled(Uuid),
    #[error("probe does not match the operator (distance {distance:.3})")]
    FaceMismatch { distance: f32 },
    #[error("probe has {found} dimensions, enrolled face has {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Proof that a privileged operator was face-verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorToken {
    operator_id: Uuid,
}

impl OperatorToken {
    pub fn operator_id(&self) -> Uuid {
        self.operator_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorGate {
    pub max_distance: f32,
}

impl OperatorGate {
    pub fn verify(
        &self,
        operator: &Identity,
        enrolled: Option<&Embedding>,
        probe: &Embedding,
    ) -> Result<OperatorToken, GateError> {
        if !operator.is_privileged {
            return Err(GateError::NotPrivileged(operator.identity_id));
        }
        let enrolled = enrolled.ok_or(GateError::NotEnrolled(operator.identity_id))?;
        if enrolled.dimension() != probe.dimension() {
            return Err(GateError::DimensionMismatch {
                expected: enrolled.dimension(),
                found: probe.dimension(),
            });
        }

        let distance = enrolled.euclidean_distance(probe);
        if distance > self.max_distance {
            tracing::warn!(operator = %operator.identity_id, distance, "operator face verification failed");
            return Err(GateError::FaceMismatch { distance });
        }

        tracing::info!(operator = %operator.identity_id, distance, "operator verified");
        Ok(OperatorToken {
            operator_id: operator.identity_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator(privileged: bool) -> Identity {
        Identity {
            identity_id: Uuid::new_v4(),
            code: "M-1".into(),
            display_name: "Manager".into(),
            is_privileged: privileged,
            image_url: None,
            shift: None,
            enrolled: true,
        }
    }

    fn gate() -> OperatorGate {
        OperatorGate { max_distance: 0.5 }
    }

    #[test]
    fn test_matching_operator_gets_token() {
        let op = operator(true);
        let face = Embedding::new(vec![0.1, 0.2, 0.3]);
        let probe = Embedding::new(vec![0.1, 0.25, 0.3]);
        let token = gate().verify(&op, Some(&face), &probe).unwrap();
        assert_eq!(token.operator_id(), op.identity_id);
    }

    #[test]
    fn test_non_privileged_rejected() {
        let op = operator(false);
        let face = Embedding::new(vec![0.1]);
        assert_eq!(
            gate().verify(&op, Some(&face), &face),
            Err(GateError::NotPrivileged(op.identity_id))
        );
    }

    #[test]
    fn test_unenrolled_rejected() {
        let op = operator(true);
        let probe = Embedding::new(vec![0.1]);
        assert_eq!(
            gate().verify(&op, None, &probe),
            Err(GateError::NotEnrolled(op.identity_id))
        );
    }

    #[test]
    fn test_different_face_rejected() {
        let op = operator(true);
        let face = Embedding::new(vec![0.0, 0.0]);
        let probe = Embedding::new(vec![0.6, 0.0]);
        assert!(matches!(
            gate().verify(&op, Some(&face), &probe),
            Err(GateError::FaceMismatch { .. })
        ));
    }
}
