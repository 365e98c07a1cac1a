//! Types d'erreurs pour utucontrol

/// Erreurs remontées aux appelants du coordinateur
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] utufetch::Error),

    #[error(transparent)]
    Store(#[from] utustore::Error),
}

impl Error {
    /// Vrai pour les erreurs imputables au client (hôte refusé, URL
    /// inutilisable), à présenter en 4xx plutôt qu'en 500
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Fetch(utufetch::Error::BadHost(_))
                | Error::Fetch(utufetch::Error::BadUrl(_))
                | Error::Fetch(utufetch::Error::UrlParse(_))
        )
    }
}

/// Type Result spécialisé pour utucontrol
pub type Result<T> = std::result::Result<T, Error>;
