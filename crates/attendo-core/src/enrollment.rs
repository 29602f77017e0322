//! Two-frame enrollment with a movement-based liveness check.
//!
//! A printed photo held in front of the camera yields two nearly identical
//! embeddings. A live subject moves between captures, so the two embeddings
//! must be at least `min_movement` apart before they are averaged into the
//! reference embedding.

use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("no face detected in enrollment capture")]
    NoFaceDetected,
    #[error("captures differ by {movement:.3}, below the {required:.3} liveness minimum")]
    NoMovement { movement: f32, required: f32 },
    #[error("captures have different dimensions ({first} vs {second})")]
    DimensionMismatch { first: usize, second: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessPolicy {
    /// Minimum Euclidean distance between the two captures.
    pub min_movement: f32,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self { min_movement: 0.08 }
    }
}

impl LivenessPolicy {
    /// Build the reference embedding from two captures.
    ///
    /// `None` stands for a capture in which the extractor found no face.
    pub fn enroll(
        &self,
        first: Option<&Embedding>,
        second: Option<&Embedding>,
    ) -> Result<Embedding, EnrollmentError> {
        let (Some(first), Some(second)) = (first, second) else {
            return Err(EnrollmentError::NoFaceDetected);
        };
        if first.dimension() != second.dimension() {
            return Err(EnrollmentError::DimensionMismatch {
                first: first.dimension(),
                second: second.dimension(),
            });
        }

        let movement = first.euclidean_distance(second);
        if movement < self.min_movement {
            tracing::warn!(movement, required = self.min_movement, "enrollment liveness check failed");
            return Err(EnrollmentError::NoMovement {
                movement,
                required: self.min_movement,
            });
        }

        Ok(first.average(second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_averages_captures() {
        let a = Embedding::new(vec![0.0, 0.2]);
        let b = Embedding::new(vec![0.2, 0.0]);
        let reference = LivenessPolicy::default().enroll(Some(&a), Some(&b)).unwrap();
        assert!((reference.values[0] - 0.1).abs() < 1e-6);
        assert!((reference.values[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_static_photo_rejected() {
        let a = Embedding::new(vec![0.5, 0.5]);
        let b = Embedding::new(vec![0.51, 0.5]);
        let err = LivenessPolicy::default().enroll(Some(&a), Some(&b)).unwrap_err();
        assert!(matches!(err, EnrollmentError::NoMovement { .. }));
    }

    #[test]
    fn test_identical_captures_rejected() {
        let a = Embedding::new(vec![0.5, 0.5]);
        assert!(LivenessPolicy::default().enroll(Some(&a), Some(&a)).is_err());
    }

    #[test]
    fn test_missing_face() {
        let a = Embedding::new(vec![0.5, 0.5]);
        assert_eq!(
            LivenessPolicy::default().enroll(Some(&a), None),
            Err(EnrollmentError::NoFaceDetected)
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Embedding::new(vec![0.5, 0.5]);
        let b = Embedding::new(vec![0.5, 0.5, 0.9]);
        assert_eq!(
            LivenessPolicy::default().enroll(Some(&a), Some(&b)),
            Err(EnrollmentError::DimensionMismatch { first: 2, second: 3 })
        );
    }

    #[test]
    fn test_custom_threshold() {
        let a = Embedding::new(vec![0.0]);
        let b = Embedding::new(vec![0.05]);
        let lenient = LivenessPolicy { min_movement: 0.01 };
        assert!(lenient.enroll(Some(&a), Some(&b)).is_ok());
    }
}
