//! Pipeline d'ingestion : métadonnées puis téléchargement
//!
//! Deux tâches de fond consomment chacune une file en mémoire d'instantanés
//! média. La file de métadonnées reçoit les lignes au statut Initial, la
//! file de téléchargement les lignes au statut Downloading. Au démarrage,
//! les files sont ré-amorcées depuis la base pour reprendre le travail
//! interrompu par un arrêt ou un crash.
//!
//! Les erreurs du récupérateur ne tuent jamais une tâche : elles sont
//! enregistrées sur la ligne média (statut Failed + message) et l'élément
//! n'est pas propagé plus loin.

use crate::dirs::check_directory;
use crate::error::Result;
use crate::fetcher::{MediaDescriptor, MediaFetcher};
use crate::ingest::canonicalize_url;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utustore::{MediaRecord, MediaStatus, Store};

/// Callback signalant à la boucle de lecture qu'un média vient de passer
/// au statut Ready
pub type MediaReadyFn = Arc<dyn Fn() + Send + Sync>;

/// Réglages du pipeline, typiquement issus de `DownloaderConfigExt`
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub cache_dir: PathBuf,
    /// Durée maximale acceptée en secondes, 0 = pas de limite
    pub max_length: u64,
    /// Âge au-delà duquel les métadonnées sont re-résolues avant
    /// téléchargement
    pub max_metadata_age: Duration,
}

/// Pipeline métadonnées → téléchargement
pub struct Pipeline {
    store: Arc<Store>,
    cache_dir: PathBuf,
    metadata_tx: mpsc::UnboundedSender<MediaRecord>,
    graceful: CancellationToken,
    immediate: CancellationToken,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Construit le pipeline et démarre les deux tâches de fond
    ///
    /// Ré-amorce d'abord les files depuis la base : toute ligne Initial est
    /// re-soumise au worker de métadonnées, toute ligne Downloading au
    /// worker de téléchargement. Aucune ligne n'est perdue par un redémarrage.
    pub fn start(
        store: Arc<Store>,
        fetcher: Arc<dyn MediaFetcher>,
        options: PipelineOptions,
        on_media_ready: MediaReadyFn,
    ) -> Result<Self> {
        let cache_dir = check_directory(&options.cache_dir, "cache")?;

        let (metadata_tx, metadata_rx) = mpsc::unbounded_channel();
        let (download_tx, download_rx) = mpsc::unbounded_channel();

        let mut metadata_seed = 0usize;
        let mut download_seed = 0usize;
        for media in store.get_all_media()? {
            match media.info.status {
                MediaStatus::Initial => {
                    metadata_seed += 1;
                    let _ = metadata_tx.send(media);
                }
                MediaStatus::Downloading => {
                    download_seed += 1;
                    let _ = download_tx.send(media);
                }
                MediaStatus::Ready | MediaStatus::Failed => {}
            }
        }
        info!(count = metadata_seed, "Initially need metadata");
        info!(count = download_seed, "Initially need download");

        let graceful = CancellationToken::new();
        let immediate = CancellationToken::new();

        let metadata_worker = MetadataWorker {
            store: store.clone(),
            fetcher: fetcher.clone(),
            max_length: options.max_length,
            download_tx,
        };
        let download_worker = DownloadWorker {
            store: store.clone(),
            fetcher,
            cache_dir: cache_dir.clone(),
            max_metadata_age: options.max_metadata_age,
            on_media_ready,
        };

        // le worker de téléchargement draine jusqu'à fermeture de son canal :
        // son unique émetteur est le worker de métadonnées, un arrêt ordonné
        // laisse donc passer les éléments encore en transit entre les étages
        let workers = vec![
            tokio::spawn(run_worker(
                "metadata",
                metadata_rx,
                graceful.clone(),
                immediate.clone(),
                DrainMode::QueuedOnly,
                metadata_worker,
            )),
            tokio::spawn(run_worker(
                "download",
                download_rx,
                graceful.clone(),
                immediate.clone(),
                DrainMode::UntilClosed,
                download_worker,
            )),
        ];

        Ok(Self {
            store,
            cache_dir,
            metadata_tx,
            graceful,
            immediate,
            workers: tokio::sync::Mutex::new(workers),
        })
    }

    /// Répertoire de cache sous sa forme canonique
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Ingestion d'une URL soumise par un client
    ///
    /// Valide l'hôte, canonicalise, crée ou retrouve la ligne média. Une
    /// ligne Failed est remise à Initial (nouvel essai) ; seule une ligne
    /// Initial part vers le worker de métadonnées, une ligne déjà
    /// Downloading ou Ready n'a rien à refaire.
    pub fn add_media(&self, raw_url: &str) -> Result<MediaRecord> {
        info!(url = raw_url, "Adding media");

        let canonical = canonicalize_url(raw_url)?;
        let mut media = self.store.get_or_add_media_by_url(&canonical)?;

        match media.info.status {
            MediaStatus::Failed => {
                // nouvel essai : remise à zéro puis traitement comme Initial
                media.info.status = MediaStatus::Initial;
                media.info.error_message.clear();
                self.store.update_media_info(&mut media)?;
                self.enqueue_metadata(media.clone());
            }
            MediaStatus::Initial => {
                self.enqueue_metadata(media.clone());
            }
            MediaStatus::Downloading | MediaStatus::Ready => {}
        }

        Ok(media)
    }

    fn enqueue_metadata(&self, media: MediaRecord) {
        if self.metadata_tx.send(media).is_err() {
            warn!("Metadata queue is closed, media stays persisted for next start");
        }
    }

    /// Demande l'arrêt ; `immediate` abandonne les files au lieu de les
    /// drainer
    pub fn shutdown(&self, immediate: bool) {
        if immediate {
            self.immediate.cancel();
        }
        self.graceful.cancel();
    }

    /// Attend la fin des deux tâches de fond
    pub async fn wait(&self) {
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                warn!("Pipeline worker join error: {err}");
            }
        }
    }
}

/// Étape du pipeline : traitement d'un instantané média sorti d'une file
#[async_trait]
trait Stage: Send + 'static {
    async fn process(&mut self, media: MediaRecord);
}

/// Comportement d'un worker lors d'un arrêt ordonné
#[derive(Clone, Copy, PartialEq)]
enum DrainMode {
    /// Traite ce qui est déjà en file puis sort (aucun nouveau travail)
    QueuedOnly,
    /// Continue à recevoir jusqu'à fermeture du canal par l'émetteur
    UntilClosed,
}

/// Boucle commune aux deux workers
///
/// Arrêt ordonné : la file est drainée sans accepter de nouveau travail.
/// Arrêt immédiat : sortie au prochain point de contrôle.
async fn run_worker<S: Stage>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<MediaRecord>,
    graceful: CancellationToken,
    immediate: CancellationToken,
    drain: DrainMode,
    mut stage: S,
) {
    info!(worker = name, "Worker started");

    loop {
        tokio::select! {
            biased;

            _ = immediate.cancelled() => break,

            media = rx.recv() => match media {
                Some(media) => stage.process(media).await,
                None => break,
            },

            _ = graceful.cancelled() => {
                match drain {
                    DrainMode::QueuedOnly => {
                        while let Ok(media) = rx.try_recv() {
                            if immediate.is_cancelled() {
                                break;
                            }
                            stage.process(media).await;
                        }
                    }
                    DrainMode::UntilClosed => loop {
                        tokio::select! {
                            biased;

                            _ = immediate.cancelled() => break,

                            media = rx.recv() => match media {
                                Some(media) => stage.process(media).await,
                                None => break,
                            },
                        }
                    },
                }
                break;
            }
        }
    }

    info!(worker = name, "Worker stopped");
}

/// Résolution de métadonnées pour les lignes Initial
struct MetadataWorker {
    store: Arc<Store>,
    fetcher: Arc<dyn MediaFetcher>,
    max_length: u64,
    download_tx: mpsc::UnboundedSender<MediaRecord>,
}

#[async_trait]
impl Stage for MetadataWorker {
    async fn process(&mut self, mut media: MediaRecord) {
        debug!(media = %media.id, url = %media.info.url, "Resolving metadata");

        match self.fetcher.extract_info(&media.info.url).await {
            Ok(descriptor) => {
                apply_descriptor(&mut media, &descriptor);
                media.info.status = MediaStatus::Downloading;
            }
            Err(err) => {
                error!(media = %media.id, "Metadata extraction failed: {err:#}");
                media.info.status = MediaStatus::Failed;
                media.info.error_message = err.to_string();
            }
        }

        if media.info.status == MediaStatus::Downloading
            && self.max_length > 0
            && media.info.length > self.max_length
        {
            info!(
                media = %media.id,
                length = media.info.length,
                max = self.max_length,
                "Media exceeds maximum length"
            );
            media.info.status = MediaStatus::Failed;
            media.info.error_message =
                format!("Too long ({} > {})", media.info.length, self.max_length);
        }

        // la mise à jour peut fusionner deux lignes média ; l'id réécrit est
        // transmis tel quel à l'étape suivante
        if let Err(err) = self.store.update_media_info(&mut media) {
            error!(media = %media.id, "update_media_info failed: {err}");
            return;
        }

        if media.info.status == MediaStatus::Downloading
            && self.download_tx.send(media).is_err()
        {
            warn!("Download queue is closed, media stays persisted for next start");
        }
    }
}

/// Téléchargement effectif pour les lignes Downloading
struct DownloadWorker {
    store: Arc<Store>,
    fetcher: Arc<dyn MediaFetcher>,
    cache_dir: PathBuf,
    max_metadata_age: Duration,
    on_media_ready: MediaReadyFn,
}

#[async_trait]
impl Stage for DownloadWorker {
    async fn process(&mut self, mut media: MediaRecord) {
        info!(media = %media.id, url = %media.info.url, title = %media.info.title, "Downloading");

        // des métadonnées trop vieilles peuvent pointer des URL de flux
        // expirées, on les re-résout d'abord
        let age = Utc::now().signed_duration_since(media.info.metadata_time);
        let stale = age
            .to_std()
            .map(|age| age > self.max_metadata_age)
            .unwrap_or(true);

        if stale {
            info!(media = %media.id, "Metadata too old, refreshing");
            match self.fetcher.extract_info(&media.info.url).await {
                Ok(descriptor) => apply_descriptor(&mut media, &descriptor),
                Err(err) => {
                    error!(media = %media.id, "Metadata refresh failed: {err:#}");
                    media.info.status = MediaStatus::Failed;
                    media.info.error_message = err.to_string();
                }
            }
        }

        if media.info.status != MediaStatus::Failed {
            let descriptor = descriptor_from_info(&media);
            match self
                .fetcher
                .download(&media.info.url, &descriptor, &self.cache_dir)
                .await
            {
                Ok(()) => self.probe_downloaded_file(&mut media),
                Err(err) => {
                    error!(media = %media.id, "Download failed: {err:#}");
                    media.info.status = MediaStatus::Failed;
                    media.info.error_message = err.to_string();
                }
            }
        }

        if let Err(err) = self.store.update_media_info(&mut media) {
            error!(media = %media.id, "update_media_info failed: {err}");
            return;
        }

        if media.info.status == MediaStatus::Ready {
            (self.on_media_ready)();
        }
    }
}

impl DownloadWorker {
    /// Vérifie que le fichier annoncé existe bel et bien
    ///
    /// Le récupérateur ment parfois sur le nom final (remux silencieux) ;
    /// une seule tentative de correction est faite en remplaçant l'extension
    /// par `.mkv`.
    fn probe_downloaded_file(&self, media: &mut MediaRecord) {
        let final_path = self.cache_dir.join(&media.info.filename);

        if final_path.exists() {
            self.mark_ready(media, &final_path);
            return;
        }

        let Some(stem) = media.info.filename.rsplit_once('.').map(|(stem, _)| stem) else {
            media.info.status = MediaStatus::Failed;
            media.info.error_message =
                "File does not exist after download, filename has no extension".to_string();
            error!(media = %media.id, filename = %media.info.filename, "{}", media.info.error_message);
            return;
        };

        let fixed = format!("{stem}.mkv");
        let fixed_path = self.cache_dir.join(&fixed);
        debug!(media = %media.id, recheck = %fixed, "Probing remuxed filename");

        if fixed_path.exists() {
            info!(media = %media.id, from = %media.info.filename, "Fixed extension to .mkv");
            media.info.filename = fixed;
            self.mark_ready(media, &fixed_path);
        } else {
            media.info.status = MediaStatus::Failed;
            media.info.error_message =
                "File does not exist after download, unable to fix filename".to_string();
            error!(media = %media.id, filename = %media.info.filename, "{}", media.info.error_message);
        }
    }

    fn mark_ready(&self, media: &mut MediaRecord, path: &Path) {
        media.info.status = MediaStatus::Ready;
        if let Ok(metadata) = std::fs::metadata(path) {
            media.info.filesize = metadata.len();
        }
    }
}

fn apply_descriptor(media: &mut MediaRecord, descriptor: &MediaDescriptor) {
    media.info.url = descriptor.canonical_url.clone();
    media.info.filename = descriptor.filename.clone();
    media.info.title = descriptor.title.clone();
    media.info.length = descriptor.duration;
    media.info.metadata = descriptor.raw.clone();
    media.info.metadata_time = Utc::now();
}

fn descriptor_from_info(media: &MediaRecord) -> MediaDescriptor {
    MediaDescriptor {
        canonical_url: media.info.url.clone(),
        filename: media.info.filename.clone(),
        title: media.info.title.clone(),
        duration: media.info.length,
        raw: media.info.metadata.clone(),
    }
}
