//! Implémentation du récupérateur au-dessus de l'exécutable yt-dlp
//!
//! Le sélecteur de format est construit une fois depuis les limites
//! configurées, dans la syntaxe yt-dlp :
//! `bestvideo[contraintes]+bestaudio[contraintes]/best`. Le binaire externe
//! n'est pas réentrant vis-à-vis de son cache disque, donc un seul appel est
//! en vol à la fois, quel que soit le nombre de tâches appelantes.

use crate::fetcher::{MediaDescriptor, MediaFetcher};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Limites appliquées au choix de format, 0 = pas de limite
#[derive(Debug, Clone, Default)]
pub struct FetchLimits {
    pub max_filesize: u64,
    pub max_width: u64,
    pub max_height: u64,
    pub max_fps: u64,
    pub max_audio_bitrate: u64,
    pub max_video_bitrate: u64,
    pub extension_whitelist: String,
    pub vcodec: String,
}

/// Récupérateur pilotant l'exécutable yt-dlp
pub struct YtDlpFetcher {
    format: String,
    temp_dir: PathBuf,
    verbose: bool,
    // un seul appel yt-dlp en vol à la fois
    guard: Mutex<()>,
}

impl YtDlpFetcher {
    pub fn new(limits: &FetchLimits, temp_dir: PathBuf, verbose: bool) -> Self {
        let format = build_format_selector(limits);
        debug!(format, "yt-dlp format selector");

        Self {
            format,
            temp_dir,
            verbose,
            guard: Mutex::new(()),
        }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new("yt-dlp");
        command
            .arg("--no-playlist")
            .arg("--cache-dir")
            .arg(&self.temp_dir)
            .arg("--format")
            .arg(&self.format)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if self.verbose {
            command.arg("--verbose");
        }

        command
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn extract_info(&self, url: &str) -> anyhow::Result<MediaDescriptor> {
        let _guard = self.guard.lock().await;

        debug!(url, "yt-dlp --dump-single-json");
        let output = self
            .base_command()
            .arg("--dump-single-json")
            .arg(url)
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let metadata: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("Unparseable yt-dlp metadata")?;

        descriptor_from_metadata(url, &metadata)
    }

    async fn download(
        &self,
        url: &str,
        descriptor: &MediaDescriptor,
        dest_dir: &Path,
    ) -> anyhow::Result<()> {
        let _guard = self.guard.lock().await;

        let dest = dest_dir.join(&descriptor.filename);
        info!(url, dest = %dest.display(), "yt-dlp download");

        let output = self
            .base_command()
            .arg("--output")
            .arg(&dest)
            .arg(url)
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(())
    }
}

fn descriptor_from_metadata(
    url: &str,
    metadata: &serde_json::Value,
) -> anyhow::Result<MediaDescriptor> {
    let canonical_url = metadata
        .get("webpage_url")
        .and_then(|v| v.as_str())
        .unwrap_or(url)
        .to_string();

    let title = metadata
        .get("title")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Metadata has no title"))?
        .to_string();

    let duration = metadata
        .get("duration")
        .and_then(|v| v.as_f64())
        .map(|secs| secs.round() as u64)
        .ok_or_else(|| anyhow!("Metadata has no duration"))?;

    // yt-dlp annonce parfois le nom final, sinon on applique le gabarit
    // %(id)s.%(ext)s nous-mêmes
    let filename = metadata
        .get("filename")
        .or_else(|| metadata.get("_filename"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| {
            let id = metadata.get("id")?.as_str()?;
            let ext = metadata.get("ext").and_then(|v| v.as_str()).unwrap_or("mp4");
            Some(format!("{id}.{ext}"))
        })
        .ok_or_else(|| anyhow!("Metadata has neither filename nor id"))?;

    if filename.contains(std::path::MAIN_SEPARATOR) {
        warn!(filename, "Fetcher asserted a non-flat filename");
        return Err(anyhow!("Refusing non-flat filename {filename:?}"));
    }

    Ok(MediaDescriptor {
        canonical_url,
        filename,
        title,
        duration,
        raw: metadata.to_string(),
    })
}

/// Construit le sélecteur de format yt-dlp depuis les limites configurées
fn build_format_selector(limits: &FetchLimits) -> String {
    let mut format = String::from("bestvideo");

    if !limits.extension_whitelist.is_empty() {
        let _ = write!(format, "[ext={}]", limits.extension_whitelist);
    }
    if !limits.vcodec.is_empty() {
        let _ = write!(format, "[vcodec={}]", limits.vcodec);
    }
    if limits.max_filesize != 0 {
        let _ = write!(format, "[filesize < {}]", limits.max_filesize);
    }
    if limits.max_width != 0 {
        let _ = write!(format, "[width <=? {}]", limits.max_width);
    }
    if limits.max_height != 0 {
        let _ = write!(format, "[height <=? {}]", limits.max_height);
    }
    if limits.max_fps != 0 {
        let _ = write!(format, "[fps <=? {}]", limits.max_fps);
    }
    if limits.max_video_bitrate != 0 {
        let _ = write!(format, "[vbr <=? {}]", limits.max_video_bitrate);
    }

    format.push_str("+bestaudio");

    if !limits.extension_whitelist.is_empty() {
        let _ = write!(format, "[ext={}]", limits.extension_whitelist);
    }
    if limits.max_filesize != 0 {
        let _ = write!(format, "[filesize < {}]", limits.max_filesize);
    }
    if limits.max_audio_bitrate != 0 {
        let _ = write!(format, "[abr <=? {}]", limits.max_audio_bitrate);
    }

    format.push_str("/best");
    format
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_selector_is_the_plain_fallback_chain() {
        assert_eq!(
            build_format_selector(&FetchLimits::default()),
            "bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn limits_show_up_in_both_halves() {
        let limits = FetchLimits {
            max_filesize: 1000,
            max_width: 1280,
            max_height: 720,
            max_fps: 30,
            max_audio_bitrate: 160,
            max_video_bitrate: 2000,
            extension_whitelist: "mp4".to_string(),
            vcodec: "h264".to_string(),
        };

        assert_eq!(
            build_format_selector(&limits),
            "bestvideo[ext=mp4][vcodec=h264][filesize < 1000][width <=? 1280]\
             [height <=? 720][fps <=? 30][vbr <=? 2000]\
             +bestaudio[ext=mp4][filesize < 1000][abr <=? 160]/best"
        );
    }

    #[test]
    fn descriptor_prefers_asserted_filename() {
        let metadata = serde_json::json!({
            "webpage_url": "https://www.youtube.com/watch?v=AAA",
            "title": "T",
            "duration": 42.4,
            "id": "AAA",
            "ext": "webm",
            "filename": "AAA.mp4",
        });

        let descriptor =
            descriptor_from_metadata("https://youtu.be/AAA", &metadata).unwrap();
        assert_eq!(descriptor.filename, "AAA.mp4");
        assert_eq!(descriptor.canonical_url, "https://www.youtube.com/watch?v=AAA");
        assert_eq!(descriptor.title, "T");
        assert_eq!(descriptor.duration, 42);
    }

    #[test]
    fn descriptor_falls_back_to_id_and_ext() {
        let metadata = serde_json::json!({
            "title": "T",
            "duration": 10,
            "id": "BBB",
            "ext": "webm",
        });

        let descriptor =
            descriptor_from_metadata("https://youtu.be/BBB", &metadata).unwrap();
        assert_eq!(descriptor.filename, "BBB.webm");
        // pas de webpage_url : l'URL soumise reste canonique
        assert_eq!(descriptor.canonical_url, "https://youtu.be/BBB");
    }

    #[test]
    fn descriptor_without_duration_is_an_error() {
        let metadata = serde_json::json!({"title": "T", "id": "x", "ext": "mp4"});
        assert!(descriptor_from_metadata("https://youtu.be/x", &metadata).is_err());
    }
}
