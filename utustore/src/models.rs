//! Types de données du magasin
//!
//! Les trois espaces d'identifiants (média, playlist, historique) sont des
//! newtypes disjoints : un id de playlist ne peut pas être passé là où un id
//! de média est attendu. Les ids sont attribués par le magasin et toujours
//! strictement positifs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[cfg_attr(feature = "openapi", derive(ToSchema))]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Construit un id depuis une valeur externe, `None` si non positive
            pub fn from_raw(raw: i64) -> Option<Self> {
                (raw > 0).then_some(Self(raw))
            }

            pub(crate) fn from_db(raw: i64) -> Self {
                debug_assert!(raw > 0);
                Self(raw)
            }

            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifiant d'une ligne média
    MediaId
);
id_type!(
    /// Identifiant d'une ligne de playlist
    PlaylistItemId
);
id_type!(
    /// Identifiant d'une ligne d'historique
    HistoryItemId
);

/// État d'un média dans le pipeline d'ingestion
///
/// La progression normale est Initial → Downloading → Ready ; Failed est un
/// puits dont on ne sort que par une re-soumission explicite de l'URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum MediaStatus {
    Initial,
    Downloading,
    Ready,
    Failed,
}

impl MediaStatus {
    pub(crate) fn to_db(self) -> i64 {
        match self {
            MediaStatus::Initial => 0,
            MediaStatus::Downloading => 1,
            MediaStatus::Ready => 2,
            MediaStatus::Failed => 3,
        }
    }

    pub(crate) fn from_db(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(MediaStatus::Initial),
            1 => Some(MediaStatus::Downloading),
            2 => Some(MediaStatus::Ready),
            3 => Some(MediaStatus::Failed),
            _ => None,
        }
    }
}

/// Raison de fin d'une lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum FinishReason {
    Completed,
    Skipped,
}

/// Issue d'une entrée d'historique
///
/// Une entrée est créée `Unfinished` au retrait de la playlist et finalisée
/// exactement une fois. Persisté comme entier nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum HistoryOutcome {
    Unfinished,
    Finished(FinishReason),
}

impl HistoryOutcome {
    pub(crate) fn to_db(self) -> Option<i64> {
        match self {
            HistoryOutcome::Unfinished => None,
            HistoryOutcome::Finished(FinishReason::Completed) => Some(0),
            HistoryOutcome::Finished(FinishReason::Skipped) => Some(1),
        }
    }

    pub(crate) fn from_db(raw: Option<i64>) -> Self {
        match raw {
            None => HistoryOutcome::Unfinished,
            Some(1) => HistoryOutcome::Finished(FinishReason::Skipped),
            Some(_) => HistoryOutcome::Finished(FinishReason::Completed),
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, HistoryOutcome::Finished(_))
    }
}

/// Champs descriptifs d'un média, hors identifiant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct MediaInfo {
    pub status: MediaStatus,
    /// URL canonique (schéma forcé en https)
    pub url: String,
    /// Nom de fichier relatif au répertoire de cache, vide tant qu'inconnu
    pub filename: String,
    pub title: String,
    /// Durée en secondes entières
    pub length: u64,
    /// Taille en octets
    pub filesize: u64,
    /// Blob opaque renvoyé par le récupérateur de métadonnées
    pub metadata: String,
    pub metadata_time: DateTime<Utc>,
    pub error_message: String,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            status: MediaStatus::Initial,
            url: String::new(),
            filename: String::new(),
            title: String::new(),
            length: 0,
            filesize: 0,
            metadata: String::new(),
            metadata_time: DateTime::<Utc>::UNIX_EPOCH,
            error_message: String::new(),
        }
    }
}

/// Instantané d'une ligne média
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct MediaRecord {
    pub id: MediaId,
    #[serde(flatten)]
    pub info: MediaInfo,
}

/// Entrée de playlist jointe à son média
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PlaylistRecord {
    pub id: PlaylistItemId,
    pub media: MediaId,
    pub queue_time: DateTime<Utc>,
    #[serde(flatten)]
    pub info: MediaInfo,
}

/// Entrée d'historique jointe à son média
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HistoryRecord {
    pub id: HistoryItemId,
    pub media: MediaId,
    pub queue_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub outcome: HistoryOutcome,
    pub skip_count: u64,
    pub skips_needed: u64,
    #[serde(flatten)]
    pub info: MediaInfo,
}
