//! Nearest-neighbour search over the enrolled gallery.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Embedding, EnrolledFace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    /// A stored vector does not have the probe's length. Indicates corrupted
    /// enrollment data, never a normal outcome.
    #[error("embedding for identity {identity_id} has {found} dimensions, probe has {expected}")]
    DimensionMismatch {
        identity_id: Uuid,
        expected: usize,
        found: usize,
    },
    #[error("no enrolled identities")]
    NoEnrolledIdentities,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub best_identity: Uuid,
    pub best_is_privileged: bool,
    /// Euclidean distance to the nearest reference embedding. Lower = more similar.
    pub best_distance: f32,
    /// Distance to the runner-up, if the gallery holds more than one face.
    pub second_best_distance: Option<f32>,
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
///
/// Implementations must return the same best identity as an exhaustive scan.
pub trait Matcher {
    fn find_nearest(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledFace],
    ) -> Result<MatchResult, MatchError>;
}

/// Brute-force Euclidean matcher.
///
/// Always visits every gallery entry so the nearest neighbour and runner-up
/// are exact.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_nearest(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledFace],
    ) -> Result<MatchResult, MatchError> {
        let mut best: Option<(usize, f32)> = None;
        let mut second: Option<f32> = None;

        for (i, face) in gallery.iter().enumerate() {
            if face.embedding.dimension() != probe.dimension() {
                return Err(MatchError::DimensionMismatch {
                    identity_id: face.identity_id,
                    expected: probe.dimension(),
                    found: face.embedding.dimension(),
                });
            }

            let dist = probe.euclidean_distance(&face.embedding);
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                second = best.map(|(_, best_dist)| best_dist);
                best = Some((i, dist));
            } else if second.map_or(true, |second_dist| dist < second_dist) {
                second = Some(dist);
            }
        }

        let (idx, best_distance) = best.ok_or(MatchError::NoEnrolledIdentities)?;
        let face = &gallery[idx];

        tracing::debug!(
            gallery = gallery.len(),
            best_distance,
            second_best_distance = ?second,
            "nearest neighbour found"
        );

        Ok(MatchResult {
            best_identity: face.identity_id,
            best_is_privileged: face.is_privileged,
            best_distance,
            second_best_distance: second,
        })
    }
}
