//! Le coordinateur : l'état partagé entre la couche web et la boucle de
//! lecture
//!
//! Un seul mutex couvre l'emplacement « en cours de lecture », l'ensemble
//! des votes de saut et le registre des clients actifs : les trois se
//! lisent et s'écrivent toujours ensemble (le seuil de votes dépend du
//! nombre de clients, les votes visent la lecture en cours). Les
//! gestionnaires web ne détiennent jamais ce mutex pendant un appel au
//! magasin.

use crate::error::Result;
use crate::hooks::PlaylistObserver;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use utufetch::Pipeline;
use utuplayer::{PlaybackSource, PlayerSignal};
use utustore::{
    FinishReason, HistoryOutcome, HistoryRecord, MediaId, MediaRecord, MediaStatus,
    PlaylistRecord, Store,
};

/// Réglages du coordinateur
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Durée sans activité au bout de laquelle un client ne compte plus
    pub client_timeout: Duration,
    /// Mandataires de confiance dont l'en-tête X-Forwarded-For est cru
    pub forwarders: HashSet<String>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(600),
            forwarders: HashSet::new(),
        }
    }
}

/// État protégé par le mutex du coordinateur
struct Shared {
    now_playing: Option<HistoryRecord>,
    /// Identifiants des clients ayant voté le saut de la lecture en cours
    skips: HashSet<String>,
    /// Dernière activité par identifiant de client
    clients: HashMap<String, Instant>,
    next_cleanup: Instant,
}

impl Shared {
    /// Purge paresseuse du registre : au plus une fois par fenêtre de
    /// `timeout`
    fn prune_clients(&mut self, timeout: Duration) {
        let now = Instant::now();
        if now < self.next_cleanup {
            return;
        }

        let before = self.clients.len();
        self.clients
            .retain(|_, last_active| now.duration_since(*last_active) < timeout);

        let pruned = before - self.clients.len();
        if pruned > 0 {
            debug!(pruned, "Timed out inactive clients");
        }

        self.next_cleanup = now + timeout;
    }

    fn needed_skips(&mut self, timeout: Duration) -> u64 {
        self.prune_clients(timeout);
        let active = self.clients.len() as u64;
        ((active + 1) / 2).max(1)
    }
}

/// Pont entre les requêtes web et le pipeline de lecture
pub struct Coordinator {
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    signal: Arc<PlayerSignal>,
    observers: Vec<Arc<dyn PlaylistObserver>>,
    options: CoordinatorOptions,
    shared: Mutex<Shared>,
}

impl Coordinator {
    pub fn new(
        store: Arc<Store>,
        pipeline: Arc<Pipeline>,
        signal: Arc<PlayerSignal>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            store,
            pipeline,
            signal,
            observers: Vec::new(),
            shared: Mutex::new(Shared {
                now_playing: None,
                skips: HashSet::new(),
                clients: HashMap::new(),
                next_cleanup: Instant::now() + options.client_timeout,
            }),
            options,
        }
    }

    /// Abonne un observateur ; à appeler avant de partager le coordinateur
    pub fn subscribe(&mut self, observer: Arc<dyn PlaylistObserver>) {
        self.observers.push(observer);
    }

    /// Ingestion d'une URL : validation, création ou remise à zéro de la
    /// ligne média, mise en file de lecture
    pub fn add_media(&self, url: &str) -> Result<MediaRecord> {
        let media = self.pipeline.add_media(url)?;
        self.store.add_to_playlist(media.id)?;

        // relu après l'insertion : si le média est déjà téléchargé (re-mise
        // en file, ou pipeline plus rapide que nous), aucun worker ne
        // signalera plus jamais ce Ready : c'est à nous de réveiller la
        // boucle d'attente
        match self.store.get_media_info(media.id) {
            Ok(queued) => {
                if queued.info.status == MediaStatus::Ready {
                    self.signal.media_ready();
                }
                for observer in &self.observers {
                    observer.added_to_playlist(&queued);
                }
            }
            Err(err) => {
                // le worker de métadonnées a pu fusionner la ligne entre
                // temps, l'id d'origine n'existe alors plus
                debug!(media = %media.id, "Queued media no longer readable: {err}");
            }
        }

        Ok(media)
    }

    pub fn get_playlist(&self) -> Result<Vec<PlaylistRecord>> {
        Ok(self.store.get_playlist()?)
    }

    pub fn get_history(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self.store.get_history()?)
    }

    pub fn get_all_media(&self) -> Result<Vec<MediaRecord>> {
        Ok(self.store.get_all_media()?)
    }

    /// Instantané de la lecture en cours
    ///
    /// Le seuil de votes est recalculé à la lecture : il suit le nombre de
    /// clients actifs, pas celui constaté au démarrage de la piste.
    pub fn get_now_playing(&self) -> Option<HistoryRecord> {
        let mut shared = self.shared.lock().unwrap();
        let needed = shared.needed_skips(self.options.client_timeout);

        shared.now_playing.as_ref().map(|item| {
            let mut item = item.clone();
            item.skip_count = shared.skips.len() as u64;
            item.skips_needed = needed;
            item
        })
    }

    /// Note l'activité d'un client ; c'est l'unité de comptage du seuil
    pub fn touch_client(&self, client: &str) {
        let mut shared = self.shared.lock().unwrap();
        shared.clients.insert(client.to_string(), Instant::now());
        shared.prune_clients(self.options.client_timeout);
    }

    /// Nombre de clients vus récemment
    pub fn active_clients(&self) -> usize {
        let mut shared = self.shared.lock().unwrap();
        shared.prune_clients(self.options.client_timeout);
        shared.clients.len()
    }

    /// Seuil courant de votes nécessaires
    pub fn needed_skips(&self) -> u64 {
        self.shared
            .lock()
            .unwrap()
            .needed_skips(self.options.client_timeout)
    }

    /// Identité de requête : l'adresse du pair, sauf si celui-ci est un
    /// mandataire de confiance annonçant un client d'origine
    pub fn resolve_client(&self, peer: &str, forwarded_for: Option<&str>) -> String {
        if self.options.forwarders.contains(peer) {
            if let Some(forwarded) = forwarded_for {
                if let Some(first) = forwarded.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return first.to_string();
                    }
                }
            }
        }

        peer.to_string()
    }

    /// Vote de saut d'un client pour un média donné
    ///
    /// Sans effet si rien ne joue ou si le média visé n'est pas celui en
    /// cours (le client votait sur un instantané périmé). Le vote est
    /// idempotent par client ; au franchissement du seuil, la boucle de
    /// lecture est réveillée et coupe la piste sur son propre fil.
    pub fn skip_video(&self, media: MediaId, client: &str) {
        debug!(media = %media, client, "Skip vote");

        let threshold_reached = {
            let mut shared = self.shared.lock().unwrap();
            let needed = shared.needed_skips(self.options.client_timeout);

            let Some(now_playing) = shared.now_playing.as_ref() else {
                debug!("Skip vote with nothing playing");
                return;
            };

            if now_playing.media != media {
                debug!(
                    requested = %media,
                    playing = %now_playing.media,
                    "Skip vote for a media that is not playing"
                );
                return;
            }

            if !shared.skips.insert(client.to_string()) {
                debug!(client, "Client already voted to skip");
            }

            let count = shared.skips.len() as u64;
            if let Some(now_playing) = shared.now_playing.as_mut() {
                now_playing.skip_count = count;
                now_playing.skips_needed = needed;
            }

            count >= needed
        };

        if threshold_reached {
            info!(media = %media, "Skip threshold reached");
            self.signal.skip_current();
        }
    }
}

impl PlaybackSource for Coordinator {
    /// Réclame la prochaine entrée et la publie comme lecture en cours
    fn pop_next_playlist_item(&self) -> Option<HistoryRecord> {
        let item = self.store.pop_next_playlist_item();

        {
            let mut shared = self.shared.lock().unwrap();
            debug_assert!(shared.now_playing.is_none());
            debug_assert!(shared.skips.is_empty());
            shared.now_playing = item.clone();
        }

        if let Some(item) = &item {
            info!(
                media = %item.media,
                title = %item.info.title,
                url = %item.info.url,
                "Starting playback"
            );
            for observer in &self.observers {
                observer.now_playing(item);
            }
        }

        item
    }

    /// Capture les votes, vide l'emplacement et finalise l'historique
    fn playlist_item_finished(&self, mut item: HistoryRecord, reason: FinishReason) {
        let (skip_count, skips_needed) = {
            let mut shared = self.shared.lock().unwrap();
            let needed = shared.needed_skips(self.options.client_timeout);
            let count = shared.skips.len() as u64;
            shared.now_playing = None;
            shared.skips.clear();
            (count, needed)
        };

        item.skip_count = skip_count;
        item.skips_needed = skips_needed;
        item.outcome = HistoryOutcome::Finished(reason);

        info!(
            media = %item.media,
            title = %item.info.title,
            ?reason,
            "Finished playing"
        );

        if let Err(err) = self.store.playlist_item_finished(&item) {
            warn!(media = %item.media, "Failed to finalise history row: {err}");
        }

        for observer in &self.observers {
            observer.playlist_item_finished(&item);
        }
    }
}
