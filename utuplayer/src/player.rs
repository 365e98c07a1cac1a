//! Boucle de lecture : l'unique consommateur de la playlist
//!
//! Une seule tâche possède le moteur de rendu et fait tourner la petite
//! machine à états Lecture/Attente. À chaque cycle elle tente de réclamer
//! la prochaine entrée prête ; s'il n'y en a pas, elle affiche la source
//! d'attente. Elle s'endort ensuite sur le [`PlayerSignal`] jusqu'à la fin
//! de flux, un saut voté ou un média devenu prêt, puis finalise l'entrée
//! d'historique avec la raison observée.

use crate::renderer::{Renderer, RendererEvent};
use crate::signal::PlayerSignal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use utustore::{FinishReason, HistoryRecord};

/// Ce que la boucle de lecture attend de son hôte
///
/// Le coordinateur implémente ce trait : le retrait publie l'entrée dans
/// l'emplacement « en cours de lecture », la finalisation y capture les
/// votes et écrit l'historique.
pub trait PlaybackSource: Send + Sync {
    /// Réclame la prochaine entrée prête, `None` si rien à jouer
    fn pop_next_playlist_item(&self) -> Option<HistoryRecord>;

    /// Finalise une entrée dont la lecture vient de se terminer
    fn playlist_item_finished(&self, item: HistoryRecord, reason: FinishReason);
}

/// La boucle de lecture elle-même
pub struct PlaybackLoop {
    source: Arc<dyn PlaybackSource>,
    renderer: Arc<dyn Renderer>,
    events: mpsc::UnboundedReceiver<RendererEvent>,
    signal: Arc<PlayerSignal>,
    cache_dir: PathBuf,
}

impl PlaybackLoop {
    pub fn new(
        source: Arc<dyn PlaybackSource>,
        renderer: Arc<dyn Renderer>,
        events: mpsc::UnboundedReceiver<RendererEvent>,
        signal: Arc<PlayerSignal>,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            renderer,
            events,
            signal,
            cache_dir,
        }
    }

    /// Fait tourner la boucle jusqu'à la demande d'arrêt
    pub async fn run(self) {
        let PlaybackLoop {
            source,
            renderer,
            mut events,
            signal,
            cache_dir,
        } = self;

        // relaie les fins de flux du moteur de rendu vers le signal d'aide
        let forwarder = {
            let signal = signal.clone();
            tokio::spawn(async move {
                while let Some(RendererEvent::EndReached) = events.recv().await {
                    debug!("Renderer reported end of stream");
                    signal.end_reached();
                }
            })
        };

        info!("Playback loop started");

        loop {
            if signal.shutdown_requested() {
                break;
            }

            // armer l'attente avant de consulter la playlist : un média qui
            // devient prêt pendant le retrait réveille le cycle au lieu de
            // tomber dans le vide
            signal.arm();

            let item = source.pop_next_playlist_item();

            match &item {
                Some(item) => {
                    signal.enter_playing();
                    let path = cache_dir.join(&item.info.filename);
                    info!(media = %item.media, title = %item.info.title, "Playing");
                    if let Err(err) = renderer.play(&path).await {
                        // piste injouable : la traiter comme terminée plutôt
                        // que de bloquer la file
                        error!(path = %path.display(), "Renderer refused to play: {err:#}");
                        signal.end_reached();
                    }
                }
                None => {
                    debug!("Nothing ready, standing by");
                    if let Err(err) = renderer.play_standby().await {
                        error!("Renderer refused standby source: {err:#}");
                    }
                }
            }

            signal.wait().await;

            let skipped = signal.take_skipped();
            if let Some(item) = item {
                let reason = if skipped {
                    FinishReason::Skipped
                } else {
                    FinishReason::Completed
                };
                source.playlist_item_finished(item, reason);
            }
        }

        renderer.stop().await;
        forwarder.abort();
        info!("Playback loop stopped");
    }
}
