//! Moteur de rendu VLC
//!
//! Pilote l'exécutable `cvlc` : un processus par piste, lancé avec
//! `--play-and-exit`, dont la terminaison vaut fin de flux. La source
//! d'attente est l'image embarquée, affichée en boucle par un processus qui
//! ne se termine pas de lui-même.

use crate::error::{Error, Result};
use crate::renderer::{Renderer, RendererEvent};
use crate::standby::materialize_standby_image;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Verbosité relayée à VLC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlcLogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl VlcLogLevel {
    /// Analyse la valeur de configuration, `Error` par défaut
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "debug" => VlcLogLevel::Debug,
            "info" => VlcLogLevel::Info,
            "warning" | "warn" => VlcLogLevel::Warning,
            _ => VlcLogLevel::Error,
        }
    }
}

/// Réglages du moteur de rendu
#[derive(Debug, Clone)]
pub struct VlcOptions {
    pub fullscreen: bool,
    pub normalize_volume: bool,
    pub audio_device: String,
    pub log_level: VlcLogLevel,
}

/// Session de rendu en cours : un processus cvlc et sa tâche de surveillance
struct Session {
    cancel: CancellationToken,
    watcher: JoinHandle<()>,
}

/// Moteur de rendu fondé sur l'exécutable cvlc
pub struct VlcRenderer {
    options: VlcOptions,
    standby_path: PathBuf,
    tx: mpsc::UnboundedSender<RendererEvent>,
    session: Mutex<Option<Session>>,
}

impl VlcRenderer {
    pub fn new(
        options: VlcOptions,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<RendererEvent>)> {
        let standby_path = materialize_standby_image().map_err(Error::Io)?;
        let (tx, rx) = mpsc::unbounded_channel();

        Ok((
            Arc::new(Self {
                options,
                standby_path,
                tx,
                session: Mutex::new(None),
            }),
            rx,
        ))
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new("cvlc");
        command.arg("--no-video-title-show");

        match self.options.log_level {
            VlcLogLevel::Error => {
                command.arg("--quiet");
            }
            VlcLogLevel::Warning => {}
            VlcLogLevel::Info => {
                command.args(["--verbose", "1"]);
            }
            VlcLogLevel::Debug => {
                command.args(["--verbose", "2"]);
            }
        }

        if self.options.fullscreen {
            command.arg("--fullscreen");
        }
        if self.options.normalize_volume {
            command.args(["--audio-filter", "normvol"]);
        }
        if !self.options.audio_device.is_empty() {
            command.args(["--alsa-audio-device", &self.options.audio_device]);
        }

        command
    }

    /// Remplace la session courante par un nouveau processus cvlc
    async fn replace_session(&self, mut command: Command, notify_end: bool) -> anyhow::Result<()> {
        self.end_session().await;

        command.kill_on_drop(true);
        let mut child = command.spawn()?;

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let exited = tokio::select! {
                    status = child.wait() => {
                        debug!(?status, "cvlc exited");
                        true
                    }
                    _ = cancel.cancelled() => false,
                };

                if exited {
                    if notify_end {
                        let _ = tx.send(RendererEvent::EndReached);
                    }
                } else {
                    if let Err(err) = child.start_kill() {
                        error!("Failed to kill cvlc: {err}");
                    }
                    let _ = child.wait().await;
                }
            })
        };

        *self.session.lock().await = Some(Session { cancel, watcher });
        Ok(())
    }

    async fn end_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.cancel.cancel();
            let _ = session.watcher.await;
        }
    }
}

#[async_trait]
impl Renderer for VlcRenderer {
    async fn play(&self, path: &Path) -> anyhow::Result<()> {
        info!(path = %path.display(), "Starting cvlc");

        let mut command = self.base_command();
        command.arg("--play-and-exit").arg(path);
        self.replace_session(command, true).await
    }

    async fn play_standby(&self) -> anyhow::Result<()> {
        debug!("Starting cvlc on the standby image");

        let mut command = self.base_command();
        command
            .args(["--loop", "--image-duration", "-1"])
            .arg(&self.standby_path);
        self.replace_session(command, false).await
    }

    async fn stop(&self) {
        self.end_session().await;
    }
}
