//! Extension de utuconfig pour le pipeline de récupération

use crate::pipeline::PipelineOptions;
use crate::ytdlp::FetchLimits;
use std::path::PathBuf;
use std::time::Duration;

/// Trait d'extension pour utuconfig::Config
pub trait DownloaderConfigExt {
    /// Limites passées au sélecteur de format du récupérateur
    fn fetch_limits(&self) -> FetchLimits;

    /// Réglages du pipeline (cache, durée maximale, âge des métadonnées)
    fn pipeline_options(&self) -> PipelineOptions;

    /// Répertoire de travail du récupérateur
    fn temp_dir(&self) -> PathBuf;

    /// Sortie verbeuse du récupérateur
    fn downloader_verbose(&self) -> bool;
}

impl DownloaderConfigExt for utuconfig::Config {
    fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            max_filesize: self.get_u64(&["downloader", "maxfilesize"], 0),
            max_width: self.get_u64(&["downloader", "maxwidth"], 0),
            max_height: self.get_u64(&["downloader", "maxheight"], 0),
            max_fps: self.get_u64(&["downloader", "maxfps"], 0),
            max_audio_bitrate: self.get_u64(&["downloader", "maxaudiobitrate"], 0),
            max_video_bitrate: self.get_u64(&["downloader", "maxvideobitrate"], 0),
            extension_whitelist: self.get_str(&["downloader", "extensionwhitelist"], ""),
            vcodec: self.get_str(&["downloader", "vcodec"], ""),
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            cache_dir: PathBuf::from(self.get_str(&["downloader", "cachedir"], "cache")),
            max_length: self.get_u64(&["downloader", "maxlength"], 0),
            max_metadata_age: Duration::from_secs(
                self.get_u64(&["downloader", "maxmetadataage"], 60),
            ),
        }
    }

    fn temp_dir(&self) -> PathBuf {
        PathBuf::from(self.get_str(&["downloader", "tempdir"], "/tmp"))
    }

    fn downloader_verbose(&self) -> bool {
        self.get_bool(&["downloader", "verbose"], false)
    }
}
