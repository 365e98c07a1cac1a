//! # utufetch - Ingestion et récupération des médias
//!
//! Cette crate relie les URL soumises par les clients au cache local de
//! fichiers lisibles :
//!
//! - validation d'hôte et canonicalisation des URL ([`ingest`]),
//! - la capacité [`MediaFetcher`] et son implémentation yt-dlp,
//! - le pipeline à deux étages métadonnées → téléchargement ([`Pipeline`]),
//!   qui fait progresser chaque ligne média Initial → Downloading → Ready
//!   (ou Failed) et signale la boucle de lecture quand un média devient
//!   jouable.

mod config_ext;
mod dirs;
mod error;
mod fetcher;
mod ingest;
mod pipeline;
mod ytdlp;

pub use config_ext::DownloaderConfigExt;
pub use dirs::check_directory;
pub use error::{Error, Result};
pub use fetcher::{MediaDescriptor, MediaFetcher};
pub use ingest::{canonicalize_url, HOST_WHITELIST};
pub use pipeline::{MediaReadyFn, Pipeline, PipelineOptions};
pub use ytdlp::{FetchLimits, YtDlpFetcher};
