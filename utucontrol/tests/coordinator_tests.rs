//! Tests de bout en bout du cœur : ingestion → pipeline → boucle de
//! lecture → historique, votes de saut et comptage des clients, avec les
//! capacités factices (récupérateur et moteur de rendu).

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use utucontrol::{Coordinator, CoordinatorOptions, PlaylistObserver};
use utufetch::{MediaDescriptor, MediaFetcher, Pipeline, PipelineOptions};
use utuplayer::{FakeRenderer, PlaybackLoop, PlayerSignal};
use utustore::{FinishReason, HistoryOutcome, Store};

/// Récupérateur factice : descripteurs déterministes, téléchargement par
/// simple écriture de fichier
struct FakeFetcher;

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn extract_info(&self, url: &str) -> anyhow::Result<MediaDescriptor> {
        let id = url.rsplit('/').next().unwrap_or("unknown").to_string();
        Ok(MediaDescriptor {
            canonical_url: url.to_string(),
            filename: format!("{id}.mp4"),
            title: format!("Title of {id}"),
            duration: 42,
            raw: format!(r#"{{"id":"{id}"}}"#),
        })
    }

    async fn download(
        &self,
        _url: &str,
        descriptor: &MediaDescriptor,
        dest_dir: &Path,
    ) -> anyhow::Result<()> {
        std::fs::write(dest_dir.join(&descriptor.filename), b"video bytes")?;
        Ok(())
    }
}

#[derive(Default)]
struct CountingObserver {
    added: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl PlaylistObserver for CountingObserver {
    fn added_to_playlist(&self, _media: &utustore::MediaRecord) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn now_playing(&self, _item: &utustore::HistoryRecord) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn playlist_item_finished(&self, _item: &utustore::HistoryRecord) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

struct E2e {
    store: Arc<Store>,
    coordinator: Arc<Coordinator>,
    renderer: Arc<FakeRenderer>,
    signal: Arc<PlayerSignal>,
    observer: Arc<CountingObserver>,
    _cache: tempfile::TempDir,
}

fn start_core(options: CoordinatorOptions) -> E2e {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = tempfile::tempdir().unwrap();
    let signal = Arc::new(PlayerSignal::new());

    let pipeline = {
        let signal = signal.clone();
        Arc::new(
            Pipeline::start(
                store.clone(),
                Arc::new(FakeFetcher),
                PipelineOptions {
                    cache_dir: cache.path().to_path_buf(),
                    max_length: 0,
                    max_metadata_age: Duration::from_secs(60),
                },
                Arc::new(move || signal.media_ready()),
            )
            .unwrap(),
        )
    };

    let observer = Arc::new(CountingObserver::default());
    let mut coordinator =
        Coordinator::new(store.clone(), pipeline, signal.clone(), options);
    coordinator.subscribe(observer.clone());
    let coordinator = Arc::new(coordinator);

    let (renderer, events) = FakeRenderer::new();
    tokio::spawn(
        PlaybackLoop::new(
            coordinator.clone(),
            renderer.clone(),
            events,
            signal.clone(),
            cache.path().to_path_buf(),
        )
        .run(),
    );

    E2e {
        store,
        coordinator,
        renderer,
        signal,
        observer,
        _cache: cache,
    }
}

async fn wait_until(what: &str, predicate: impl Fn() -> bool) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting until {what}");
}

#[tokio::test]
async fn submitted_url_plays_and_lands_in_history() {
    let e2e = start_core(CoordinatorOptions::default());

    let media = e2e.coordinator.add_media("https://youtu.be/AAA").unwrap();
    assert!(e2e.coordinator.get_now_playing().is_none());

    // métadonnées, téléchargement, réveil de la boucle : tout s'enchaîne
    wait_until("track is playing", || e2e.renderer.current().is_some()).await;

    let playing = e2e.coordinator.get_now_playing().unwrap();
    assert_eq!(playing.media, media.id);
    assert_eq!(playing.info.title, "Title of AAA");
    assert_eq!(playing.info.length, 42);
    assert_eq!(playing.skip_count, 0);
    // aucun client actif : un seul vote suffirait
    assert_eq!(playing.skips_needed, 1);

    e2e.renderer.finish_current();
    wait_until("history is finalised", || {
        e2e.store
            .get_history()
            .unwrap()
            .first()
            .map(|h| h.outcome.is_finished())
            .unwrap_or(false)
    })
    .await;

    let history = e2e.store.get_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].outcome,
        HistoryOutcome::Finished(FinishReason::Completed)
    );
    assert_eq!(history[0].skip_count, 0);
    assert_eq!(history[0].skips_needed, 1);

    // la playlist est vide et l'emplacement de lecture aussi
    assert!(e2e.store.get_playlist().unwrap().is_empty());
    wait_until("slot is cleared", || {
        e2e.coordinator.get_now_playing().is_none()
    })
    .await;

    assert_eq!(e2e.observer.added.load(Ordering::SeqCst), 1);
    assert_eq!(e2e.observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(e2e.observer.finished.load(Ordering::SeqCst), 1);

    e2e.signal.shutdown(true);
}

#[tokio::test]
async fn one_vote_of_two_clients_skips_the_track() {
    let e2e = start_core(CoordinatorOptions::default());

    e2e.coordinator.touch_client("10.0.0.1");
    e2e.coordinator.touch_client("10.0.0.2");
    assert_eq!(e2e.coordinator.needed_skips(), 1);

    let media = e2e.coordinator.add_media("https://youtu.be/SKIP").unwrap();
    wait_until("track is playing", || e2e.renderer.current().is_some()).await;

    e2e.coordinator.skip_video(media.id, "10.0.0.1");

    wait_until("history records the skip", || {
        e2e.store
            .get_history()
            .unwrap()
            .first()
            .map(|h| h.outcome == HistoryOutcome::Finished(FinishReason::Skipped))
            .unwrap_or(false)
    })
    .await;

    let history = e2e.store.get_history().unwrap();
    assert_eq!(history[0].skip_count, 1);
    assert_eq!(history[0].skips_needed, 1);

    e2e.signal.shutdown(true);
}

#[tokio::test]
async fn duplicate_votes_do_not_cross_the_threshold() {
    let e2e = start_core(CoordinatorOptions::default());

    // trois clients actifs : il faut deux votes distincts
    for client in ["a", "b", "c"] {
        e2e.coordinator.touch_client(client);
    }
    assert_eq!(e2e.coordinator.needed_skips(), 2);

    let media = e2e.coordinator.add_media("https://youtu.be/DUP").unwrap();
    wait_until("track is playing", || e2e.renderer.current().is_some()).await;

    // un vote pour un média qui ne joue pas est ignoré
    let ghost = utustore::MediaId::from_raw(media.id.as_i64() + 40).unwrap();
    e2e.coordinator.skip_video(ghost, "a");

    // le même client a beau insister, le compte reste à un
    e2e.coordinator.skip_video(media.id, "a");
    e2e.coordinator.skip_video(media.id, "a");
    sleep(Duration::from_millis(50)).await;

    let playing = e2e.coordinator.get_now_playing().expect("still playing");
    assert_eq!(playing.skip_count, 1);
    assert_eq!(playing.skips_needed, 2);
    assert!(e2e.store.get_history().unwrap()[0].outcome == HistoryOutcome::Unfinished);

    // un second client fait franchir le seuil
    e2e.coordinator.skip_video(media.id, "b");
    wait_until("history records the skip", || {
        e2e.store
            .get_history()
            .unwrap()
            .first()
            .map(|h| h.outcome == HistoryOutcome::Finished(FinishReason::Skipped))
            .unwrap_or(false)
    })
    .await;

    let history = e2e.store.get_history().unwrap();
    assert_eq!(history[0].skip_count, 2);
    assert_eq!(history[0].skips_needed, 2);

    e2e.signal.shutdown(true);
}

#[tokio::test]
async fn skip_threshold_follows_active_client_count() {
    let e2e = start_core(CoordinatorOptions::default());

    assert_eq!(e2e.coordinator.needed_skips(), 1);

    for (count, expected) in [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3)] {
        e2e.coordinator.touch_client(&format!("client-{count}"));
        assert_eq!(e2e.coordinator.active_clients(), count);
        assert_eq!(e2e.coordinator.needed_skips(), expected as u64);
    }

    e2e.signal.shutdown(true);
}

#[tokio::test]
async fn inactive_clients_stop_counting() {
    let e2e = start_core(CoordinatorOptions {
        client_timeout: Duration::from_millis(50),
        forwarders: Default::default(),
    });

    e2e.coordinator.touch_client("ephemeral");
    assert_eq!(e2e.coordinator.active_clients(), 1);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(e2e.coordinator.active_clients(), 0);
    assert_eq!(e2e.coordinator.needed_skips(), 1);

    e2e.signal.shutdown(true);
}

#[tokio::test]
async fn forwarded_identity_is_honoured_only_for_trusted_proxies() {
    let e2e = start_core(CoordinatorOptions {
        client_timeout: Duration::from_secs(600),
        forwarders: ["10.0.0.254".to_string()].into_iter().collect(),
    });

    // pair de confiance : la première entrée X-Forwarded-For est l'identité
    assert_eq!(
        e2e.coordinator
            .resolve_client("10.0.0.254", Some("192.168.1.7, 10.0.0.254")),
        "192.168.1.7"
    );

    // pair quelconque : l'en-tête est ignoré
    assert_eq!(
        e2e.coordinator
            .resolve_client("10.0.0.9", Some("192.168.1.7")),
        "10.0.0.9"
    );

    // mandataire sans en-tête : retombe sur l'adresse du pair
    assert_eq!(e2e.coordinator.resolve_client("10.0.0.254", None), "10.0.0.254");

    e2e.signal.shutdown(true);
}
