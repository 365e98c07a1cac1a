//! Démarrage et arrêt du serveur HTTP

use crate::api::{api_router, ApiState};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ouvre le port d'écoute de l'API
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Sert l'API jusqu'à l'annulation du jeton d'arrêt
///
/// L'adresse de chaque pair est conservée pour l'identité client ; l'arrêt
/// est gracieux, les requêtes en cours se terminent mais plus aucune
/// nouvelle n'est acceptée.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "Web API listening");

    axum::serve(
        listener,
        api_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.cancelled().await;
        info!("Web API stops accepting requests");
    })
    .await
}
