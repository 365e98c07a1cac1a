//! Binaire Utuputki : assemblage des composants et cycle de vie du
//! processus
//!
//! La racine de l'application possède tout le monde : magasin, pipeline de
//! récupération, signal de la boucle de lecture, coordinateur, couche web.
//! Les composants ne se connaissent qu'à travers les poignées partagées
//! distribuées ici. SIGINT arrête proprement ; SIGHUP arrête puis relance
//! le binaire dans le même processus.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use utuconfig::get_config;
use utucontrol::{
    spawn_signal_task, Coordinator, CoordinatorConfigExt, ShutdownController,
};
use utufetch::{check_directory, DownloaderConfigExt, Pipeline, YtDlpFetcher};
use utuplayer::{PlaybackLoop, PlayerConfigExt, PlayerSignal, VlcRenderer};
use utustore::{Store, StoreConfigExt};
use utuweb::{ApiState, WebConfigExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = get_config();

    if config.get_bool(&["global", "setcoreulimit"], true) {
        raise_core_limit()?;
    }

    // magasin durable
    let store = Arc::new(Store::open(
        &config.database_path(),
        config.database_reverse(),
    )?);

    // signal partagé de la boucle de lecture, distribué à tous les
    // composants qui doivent la réveiller
    let signal = Arc::new(PlayerSignal::new());

    // pipeline de récupération
    let temp_dir = check_directory(&config.temp_dir(), "temp")?;
    let fetcher = Arc::new(YtDlpFetcher::new(
        &config.fetch_limits(),
        temp_dir,
        config.downloader_verbose(),
    ));
    let pipeline = {
        let signal = signal.clone();
        Arc::new(Pipeline::start(
            store.clone(),
            fetcher,
            config.pipeline_options(),
            Arc::new(move || signal.media_ready()),
        )?)
    };

    // coordinateur et machine d'arrêt
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        pipeline.clone(),
        signal.clone(),
        config.coordinator_options(),
    ));
    let controller = Arc::new(ShutdownController::new(pipeline.clone(), signal.clone()));
    let signal_task = spawn_signal_task(controller.clone())?;

    // couche web
    let listener = utuweb::bind(config.web_port())
        .await
        .context("Failed to bind web port")?;
    let web_task = tokio::spawn(utuweb::serve(
        listener,
        ApiState {
            coordinator: coordinator.clone(),
            debug: config.web_debug(),
        },
        controller.web_token(),
    ));

    // moteur de rendu et boucle de lecture ; run() ne rend la main qu'à
    // l'arrêt
    let (renderer, events) = VlcRenderer::new(config.player_options())?;
    PlaybackLoop::new(
        coordinator,
        renderer,
        events,
        signal,
        pipeline.cache_dir().to_path_buf(),
    )
    .run()
    .await;

    // drainage des workers puis arrêt des tâches annexes
    pipeline.wait().await;
    match web_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("Web server error: {err}"),
        Err(err) => error!("Web task join error: {err}"),
    }
    signal_task.abort();

    if controller.should_reexec() {
        info!("Restarting on SIGHUP");
        return Err(reexec());
    }

    info!("Bye");
    Ok(())
}

/// Monte la limite souple de core dump au niveau de la limite dure
fn raise_core_limit() -> Result<()> {
    info!("Raising core dump ulimit");

    // getrlimit/setrlimit ne touchent que ce processus
    unsafe {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };

        if libc::getrlimit(libc::RLIMIT_CORE, &mut limit) != 0 {
            return Err(std::io::Error::last_os_error()).context("getrlimit failed");
        }

        if limit.rlim_max == 0 {
            return Err(anyhow!(
                "Hard core limit is 0, raise it or disable global.setcoreulimit"
            ));
        }

        limit.rlim_cur = limit.rlim_max;
        if libc::setrlimit(libc::RLIMIT_CORE, &limit) != 0 {
            return Err(std::io::Error::last_os_error()).context("setrlimit failed");
        }
    }

    Ok(())
}

/// Remplace le processus par une nouvelle instance du binaire
///
/// Ne retourne que si `exec` échoue.
fn reexec() -> anyhow::Error {
    use std::os::unix::process::CommandExt;

    match std::env::current_exe() {
        Ok(exe) => {
            let err = std::process::Command::new(exe)
                .args(std::env::args_os().skip(1))
                .exec();
            anyhow!("exec failed: {err}")
        }
        Err(err) => anyhow!("Cannot locate own executable: {err}"),
    }
}
