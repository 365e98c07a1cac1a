//! Types d'erreurs pour utustore

use crate::models::MediaId;

/// Erreurs du magasin durable
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No media row for id {0}")]
    NotFound(MediaId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Type Result spécialisé pour utustore
pub type Result<T> = std::result::Result<T, Error>;
