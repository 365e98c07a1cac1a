//! Types d'erreurs pour utuplayer

/// Erreurs du lecteur
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type Result spécialisé pour utuplayer
pub type Result<T> = std::result::Result<T, Error>;
