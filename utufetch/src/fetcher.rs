//! Capacité de récupération de médias
//!
//! Le cœur ne connaît le récupérateur externe que par ces deux appels : la
//! résolution de métadonnées et le téléchargement effectif. Les
//! implémentations ne sont pas supposées réentrantes ; tous les appels
//! passent par un verrou unique côté implémentation.

use async_trait::async_trait;
use std::path::Path;

/// Métadonnées extraites pour un média
///
/// `raw` est le blob JSON renvoyé par le récupérateur, persisté tel quel ;
/// les autres champs en sont la projection exploitée par le pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// URL canonique selon le récupérateur (peut différer de l'URL soumise)
    pub canonical_url: String,
    /// Nom de fichier annoncé, relatif au répertoire de destination
    pub filename: String,
    pub title: String,
    /// Durée en secondes entières
    pub duration: u64,
    /// Blob de métadonnées opaque
    pub raw: String,
}

/// Capacité externe de résolution et de téléchargement
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Résout les métadonnées d'une URL sans télécharger
    async fn extract_info(&self, url: &str) -> anyhow::Result<MediaDescriptor>;

    /// Télécharge le média dans `dest_dir`, sous le nom annoncé par le
    /// descripteur (le récupérateur peut silencieusement remuxer et changer
    /// l'extension, voir la vérification post-téléchargement du pipeline)
    async fn download(
        &self,
        url: &str,
        descriptor: &MediaDescriptor,
        dest_dir: &Path,
    ) -> anyhow::Result<()>;
}
