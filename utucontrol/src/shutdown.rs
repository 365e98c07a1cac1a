//! Machine d'arrêt du processus
//!
//! SIGINT demande un arrêt, SIGHUP un arrêt suivi d'un re-lancement du
//! binaire. La première occurrence est ordonnée (la piste en cours va à son
//! terme, les files se drainent) ; la seconde est immédiate. Les handlers
//! POSIX ne touchent à rien directement : une tâche dédiée possède les flux
//! de signaux et incrémente un compteur atomique, tout le reste passe par
//! des drapeaux visibles et des réveils.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utufetch::Pipeline;
use utuplayer::PlayerSignal;

/// Pilote l'arrêt de tous les composants bloquants
pub struct ShutdownController {
    counter: AtomicU32,
    reexec: AtomicBool,
    pipeline: Arc<Pipeline>,
    player: Arc<PlayerSignal>,
    /// Annulé dès la première demande ; la couche web s'en sert pour cesser
    /// d'accepter des requêtes
    web_token: CancellationToken,
}

impl ShutdownController {
    pub fn new(pipeline: Arc<Pipeline>, player: Arc<PlayerSignal>) -> Self {
        Self {
            counter: AtomicU32::new(0),
            reexec: AtomicBool::new(false),
            pipeline,
            player,
            web_token: CancellationToken::new(),
        }
    }

    /// Jeton observé par la couche web pour son arrêt gracieux
    pub fn web_token(&self) -> CancellationToken {
        self.web_token.clone()
    }

    /// Demande d'arrêt ; la deuxième demande passe en mode immédiat
    pub fn request_shutdown(&self) {
        let prior = self.counter.fetch_add(1, Ordering::SeqCst);
        let immediate = prior > 0;

        info!(immediate, "Shutdown requested");

        self.web_token.cancel();
        self.pipeline.shutdown(immediate);
        self.player.shutdown(immediate);
    }

    /// Arrêt suivi d'un re-lancement du binaire (SIGHUP)
    pub fn request_reexec(&self) {
        self.reexec.store(true, Ordering::SeqCst);
        self.request_shutdown();
    }

    /// Vrai si le binaire doit se relancer après l'arrêt
    pub fn should_reexec(&self) -> bool {
        self.reexec.load(Ordering::SeqCst)
    }
}

/// Installe les flux SIGINT/SIGHUP et démarre la tâche de signaux
pub fn spawn_signal_task(controller: Arc<ShutdownController>) -> io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT received");
                    controller.request_shutdown();
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received");
                    controller.request_reexec();
                }
            }
        }
    }))
}
