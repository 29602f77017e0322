//! attendo-core — Face matching and attendance state engine.
//!
//! Matches probe embeddings against the enrolled roster, classifies the
//! match, and decides which attendance events to record. Storage lives
//! behind the [`store::AttendanceStore`] trait.

pub mod case;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod kiosk;
pub mod matcher;
pub mod policy;
pub mod resolver;
pub mod store;
pub mod timesheet;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use kiosk::{Kiosk, KioskError, KioskReply};
pub use matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher};
pub use types::{
    AttendanceEvent, Embedding, EnrolledFace, EventKind, EventOrigin, Identity, ShiftWindow,
};
