//! Tests HTTP de bout en bout : le cœur complet derrière l'API JSON, avec
//! récupérateur et moteur de rendu factices.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use utucontrol::{Coordinator, CoordinatorOptions};
use utufetch::{MediaDescriptor, MediaFetcher, Pipeline, PipelineOptions};
use utuplayer::{FakeRenderer, PlaybackLoop, PlayerSignal};
use utustore::Store;
use utuweb::ApiState;

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

struct WebHarness {
    base_url: String,
    _renderer: Arc<FakeRenderer>,
    signal: Arc<PlayerSignal>,
    shutdown: CancellationToken,
    _cache: tempfile::TempDir,
}

async fn start_stack(forwarders: HashSet<String>) -> WebHarness {
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

    let coordinator = Arc::new(Coordinator::new(
        store,
        pipeline,
        signal.clone(),
        CoordinatorOptions {
            client_timeout: Duration::from_secs(600),
            forwarders,
        },
    ));

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

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    tokio::spawn(utuweb::serve(
        listener,
        ApiState {
            coordinator,
            debug: true,
        },
        shutdown.clone(),
    ));

    WebHarness {
        base_url: format!("http://{addr}"),
        _renderer: renderer,
        signal,
        shutdown,
        _cache: cache,
    }
}

fn get_json(url: &str) -> Value {
    ureq::get(url).call().unwrap().into_json().unwrap()
}

fn wait_for_json(url: &str, what: &str, predicate: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..500 {
        let value = get_json(url);
        if predicate(&value) {
            return value;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {what} at {url}");
}

fn stop(h: &WebHarness) {
    h.signal.shutdown(true);
    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_host_yields_a_400_with_message() {
    let h = start_stack(HashSet::new()).await;
    let base = h.base_url.clone();

    tokio::task::spawn_blocking(move || {
        let err = ureq::post(&format!("{base}/api/media"))
            .send_json(serde_json::json!({"url": "https://example.com/vid"}))
            .expect_err("must be rejected");

        match err {
            ureq::Error::Status(status, response) => {
                assert_eq!(status, 400);
                let body: Value = response.into_json().unwrap();
                assert_eq!(body["error"], "BAD_HOST");
                assert_eq!(body["message"], "Host example.com not whitelisted");
            }
            other => panic!("unexpected error {other:?}"),
        }

        // aucun média créé
        let media = get_json(&format!("{base}/api/media"));
        assert_eq!(media.as_array().unwrap().len(), 0);
    })
    .await
    .unwrap();

    stop(&h);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_skip_ids_yield_a_400() {
    let h = start_stack(HashSet::new()).await;
    let base = h.base_url.clone();

    tokio::task::spawn_blocking(move || {
        let err = ureq::post(&format!("{base}/api/skip"))
            .send_json(serde_json::json!({"media": 0}))
            .expect_err("must be rejected");

        match err {
            ureq::Error::Status(status, response) => {
                assert_eq!(status, 400);
                let body: Value = response.into_json().unwrap();
                assert_eq!(body["error"], "BAD_ID");
            }
            other => panic!("unexpected error {other:?}"),
        }
    })
    .await
    .unwrap();

    stop(&h);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submitted_url_flows_to_now_playing_and_skip() {
    let h = start_stack(HashSet::new()).await;
    let base = h.base_url.clone();

    let handle = tokio::task::spawn_blocking(move || {
        // en attente : rien en cours de lecture
        assert_eq!(get_json(&format!("{base}/api/nowplaying")), Value::Null);

        let submitted: Value = ureq::post(&format!("{base}/api/media"))
            .send_json(serde_json::json!({"url": "https://youtu.be/AAA"}))
            .unwrap()
            .into_json()
            .unwrap();
        let media_id = submitted["id"].as_i64().unwrap();
        assert_eq!(submitted["status"], "Initial");

        // le pipeline termine et la boucle démarre la lecture
        let playing = wait_for_json(
            &format!("{base}/api/nowplaying"),
            "playback to start",
            |value| !value.is_null(),
        );
        assert_eq!(playing["media"].as_i64().unwrap(), media_id);
        assert_eq!(playing["title"], "Title of AAA");
        assert_eq!(playing["length"], 42);
        // un seul client actif (nous) : un vote suffit
        assert_eq!(playing["skips_needed"], 1);

        // la playlist est déjà vide, l'entrée est passée à l'historique
        let playlist = get_json(&format!("{base}/api/playlist"));
        assert_eq!(playlist.as_array().unwrap().len(), 0);

        // vote de saut de l'unique client actif
        let response = ureq::post(&format!("{base}/api/skip"))
            .send_json(serde_json::json!({"media": media_id}))
            .unwrap();
        assert_eq!(response.status(), 204);

        let history = wait_for_json(
            &format!("{base}/api/history"),
            "history to record the skip",
            |value| {
                value
                    .as_array()
                    .and_then(|rows| rows.first())
                    .map(|row| row["outcome"]["Finished"] == "Skipped")
                    .unwrap_or(false)
            },
        );
        let row = &history.as_array().unwrap()[0];
        assert_eq!(row["skip_count"], 1);
        assert_eq!(row["skips_needed"], 1);

        media_id
    });

    handle.await.unwrap();
    stop(&h);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forwarded_clients_count_separately_behind_a_trusted_proxy() {
    // les tests parlent depuis 127.0.0.1, déclaré mandataire de confiance
    let h = start_stack(["127.0.0.1".to_string()].into_iter().collect()).await;
    let base = h.base_url.clone();

    tokio::task::spawn_blocking(move || {
        // deux identités distinctes annoncées par le mandataire
        for client in ["192.168.1.10", "192.168.1.11"] {
            ureq::get(&format!("{base}/api/nowplaying"))
                .set("X-Forwarded-For", client)
                .call()
                .unwrap();
        }

        ureq::post(&format!("{base}/api/media"))
            .set("X-Forwarded-For", "192.168.1.10")
            .send_json(serde_json::json!({"url": "https://youtu.be/FWD"}))
            .unwrap();

        // les sondes gardent l'identité transmise, pour ne pas compter le
        // mandataire lui-même comme client
        let mut playing = Value::Null;
        for _ in 0..500 {
            playing = ureq::get(&format!("{base}/api/nowplaying"))
                .set("X-Forwarded-For", "192.168.1.10")
                .call()
                .unwrap()
                .into_json()
                .unwrap();
            if !playing.is_null() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        // deux clients actifs : il ne faut toujours qu'un vote (⌈2/2⌉)
        assert_eq!(playing["skips_needed"], 1);
    })
    .await
    .unwrap();

    stop(&h);
}
