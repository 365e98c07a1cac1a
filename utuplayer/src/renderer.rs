//! Capacité de rendu vidéo
//!
//! La boucle de lecture ne connaît le moteur de rendu que par ce trait : on
//! lui donne un chemin à jouer (ou l'image d'attente), on lui demande de
//! s'arrêter, et il signale la fin de flux sur un canal d'événements fourni
//! à la construction.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Événements émis par le moteur de rendu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererEvent {
    /// Fin de flux du média courant ; la source d'attente peut l'émettre
    /// de façon répétée, la boucle de lecture le tolère
    EndReached,
}

/// Capacité externe de rendu
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Démarre la lecture d'un fichier du cache
    async fn play(&self, path: &Path) -> anyhow::Result<()>;

    /// Affiche la source d'attente en boucle
    async fn play_standby(&self) -> anyhow::Result<()>;

    /// Coupe la session de rendu en cours
    async fn stop(&self);
}

/// Moteur de rendu factice pour les tests
///
/// Ne rend rien : il mémorise ce qu'on lui demande de jouer et « termine »
/// la piste courante sur commande, ce qui permet de tester la boucle de
/// lecture de bout en bout sans périphérique vidéo.
pub struct FakeRenderer {
    tx: mpsc::UnboundedSender<RendererEvent>,
    current: Mutex<FakeState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum FakeState {
    #[default]
    Stopped,
    Standby,
    Playing(PathBuf),
}

impl FakeRenderer {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<RendererEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                tx,
                current: Mutex::new(FakeState::Stopped),
            }),
            rx,
        )
    }

    /// Émet la fin de flux de la piste courante
    pub fn finish_current(&self) {
        let _ = self.tx.send(RendererEvent::EndReached);
    }

    /// Chemin en cours de lecture, `None` en attente ou à l'arrêt
    pub fn current(&self) -> Option<PathBuf> {
        match &*self.current.lock().unwrap() {
            FakeState::Playing(path) => Some(path.clone()),
            _ => None,
        }
    }

    pub fn on_standby(&self) -> bool {
        *self.current.lock().unwrap() == FakeState::Standby
    }

    pub fn stopped(&self) -> bool {
        *self.current.lock().unwrap() == FakeState::Stopped
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn play(&self, path: &Path) -> anyhow::Result<()> {
        *self.current.lock().unwrap() = FakeState::Playing(path.to_path_buf());
        Ok(())
    }

    async fn play_standby(&self) -> anyhow::Result<()> {
        *self.current.lock().unwrap() = FakeState::Standby;
        Ok(())
    }

    async fn stop(&self) {
        *self.current.lock().unwrap() = FakeState::Stopped;
    }
}
