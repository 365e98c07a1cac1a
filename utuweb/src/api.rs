//! Gestionnaires REST au-dessus des opérations du coordinateur
//!
//! La couche web reste volontairement mince : chaque gestionnaire résout
//! l'identité du client, note son activité et délègue au coordinateur. Les
//! erreurs clients (hôte refusé) ressortent en 400 avec leur message ; tout
//! le reste devient un 500 dont le corps n'est détaillé qu'en mode debug.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;
use utucontrol::Coordinator;
use utustore::MediaId;

/// État partagé des gestionnaires
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    /// En mode debug, les erreurs internes exposent leur message
    pub debug: bool,
}

/// Corps d'erreur uniforme
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Code d'erreur court
    #[schema(example = "BAD_HOST")]
    pub error: String,
    /// Message lisible
    #[schema(example = "Host example.com not whitelisted")]
    pub message: String,
}

/// Soumission d'une URL
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddMediaRequest {
    /// URL du média à mettre en file
    #[schema(example = "https://youtu.be/dQw4w9WgXcQ")]
    pub url: String,
}

/// Vote de saut
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SkipRequest {
    /// Identifiant du média que le client croit en cours de lecture
    #[schema(example = 17)]
    pub media: i64,
}

/// Construit le routeur de l'API
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/media", post(add_media).get(get_all_media))
        .route("/api/playlist", get(get_playlist))
        .route("/api/history", get(get_history))
        .route("/api/nowplaying", get(get_now_playing))
        .route("/api/skip", post(skip_video))
        .with_state(state)
}

/// Identité de requête : adresse du pair, ou première entrée
/// X-Forwarded-For si le pair est un mandataire de confiance
fn client_identity(state: &ApiState, peer: SocketAddr, headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());

    let client = state
        .coordinator
        .resolve_client(&peer.ip().to_string(), forwarded);
    state.coordinator.touch_client(&client);
    client
}

fn internal_error(state: &ApiState, err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    error!("Request failed: {err}");
    let message = if state.debug {
        err.to_string()
    } else {
        "Internal Server Error".to_string()
    };

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "INTERNAL".to_string(),
            message,
        }),
    )
}

/// Met une URL en file de lecture
#[utoipa::path(
    post,
    path = "/api/media",
    tag = "media",
    request_body = AddMediaRequest,
    responses(
        (status = 200, description = "Média créé ou retrouvé, mis en file", body = utustore::MediaRecord),
        (status = 400, description = "Hôte refusé ou URL inutilisable", body = ErrorResponse),
        (status = 500, description = "Erreur interne", body = ErrorResponse),
    )
)]
pub(crate) async fn add_media(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<AddMediaRequest>,
) -> impl IntoResponse {
    let client = client_identity(&state, peer, &headers);
    debug!(client, url = %request.url, "Media submission");

    match state.coordinator.add_media(&request.url) {
        Ok(media) => (StatusCode::OK, Json(media)).into_response(),
        Err(err) if err.is_client_error() => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "BAD_HOST".to_string(),
                message: err.to_string(),
            }),
        )
            .into_response(),
        Err(err) => internal_error(&state, err).into_response(),
    }
}

/// La playlist courante, par ordre de mise en file
#[utoipa::path(
    get,
    path = "/api/playlist",
    tag = "media",
    responses(
        (status = 200, description = "Entrées en attente de lecture", body = [utustore::PlaylistRecord]),
        (status = 500, description = "Erreur interne", body = ErrorResponse),
    )
)]
pub(crate) async fn get_playlist(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    client_identity(&state, peer, &headers);

    match state.coordinator.get_playlist() {
        Ok(playlist) => (StatusCode::OK, Json(playlist)).into_response(),
        Err(err) => internal_error(&state, err).into_response(),
    }
}

/// L'historique des lectures
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "media",
    responses(
        (status = 200, description = "Lectures passées", body = [utustore::HistoryRecord]),
        (status = 500, description = "Erreur interne", body = ErrorResponse),
    )
)]
pub(crate) async fn get_history(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    client_identity(&state, peer, &headers);

    match state.coordinator.get_history() {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(err) => internal_error(&state, err).into_response(),
    }
}

/// Toutes les lignes média connues
#[utoipa::path(
    get,
    path = "/api/media",
    tag = "media",
    responses(
        (status = 200, description = "Toutes les lignes média", body = [utustore::MediaRecord]),
        (status = 500, description = "Erreur interne", body = ErrorResponse),
    )
)]
pub(crate) async fn get_all_media(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    client_identity(&state, peer, &headers);

    match state.coordinator.get_all_media() {
        Ok(media) => (StatusCode::OK, Json(media)).into_response(),
        Err(err) => internal_error(&state, err).into_response(),
    }
}

/// La lecture en cours, `null` en attente
#[utoipa::path(
    get,
    path = "/api/nowplaying",
    tag = "playback",
    responses(
        (status = 200, description = "Entrée en cours de lecture, ou null", body = utustore::HistoryRecord),
    )
)]
pub(crate) async fn get_now_playing(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    client_identity(&state, peer, &headers);
    Json(state.coordinator.get_now_playing())
}

/// Vote de saut de la lecture en cours
#[utoipa::path(
    post,
    path = "/api/skip",
    tag = "playback",
    request_body = SkipRequest,
    responses(
        (status = 204, description = "Vote enregistré (ou ignoré si le média ne joue pas)"),
        (status = 400, description = "Identifiant de média invalide", body = ErrorResponse),
    )
)]
pub(crate) async fn skip_video(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<SkipRequest>,
) -> impl IntoResponse {
    let client = client_identity(&state, peer, &headers);

    let Some(media) = MediaId::from_raw(request.media) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "BAD_ID".to_string(),
                message: format!("{} is not a valid media id", request.media),
            }),
        )
            .into_response();
    };

    state.coordinator.skip_video(media, &client);
    StatusCode::NO_CONTENT.into_response()
}
