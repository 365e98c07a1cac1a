//! Types d'erreurs pour utufetch

/// Erreurs d'ingestion et de récupération
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Host {0} not whitelisted")]
    BadHost(String),

    #[error("Unusable URL: {0}")]
    BadUrl(String),

    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Fetcher error: {0}")]
    Fetcher(String),

    #[error(transparent)]
    Store(#[from] utustore::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type Result spécialisé pour utufetch
pub type Result<T> = std::result::Result<T, Error>;
