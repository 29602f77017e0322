//! Error type for `attendo-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] attendo_core::Error),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("uuid parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    /// Stored embedding bytes are not a whole number of `f32` values.
    #[error("embedding blob for identity {identity_id} has {len} bytes")]
    CorruptEmbedding { identity_id: uuid::Uuid, len: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
