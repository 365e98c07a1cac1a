//! Document OpenAPI de l'API JSON

use utoipa::OpenApi;

/// Description OpenAPI de l'API Utuputki
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Utuputki API",
        description = "File de lecture vidéo partagée : soumission d'URL, \
                       instantanés de playlist et votes de saut",
    ),
    paths(
        crate::api::add_media,
        crate::api::get_all_media,
        crate::api::get_playlist,
        crate::api::get_history,
        crate::api::get_now_playing,
        crate::api::skip_video,
    ),
    components(schemas(
        crate::api::AddMediaRequest,
        crate::api::SkipRequest,
        crate::api::ErrorResponse,
        utustore::MediaRecord,
        utustore::MediaInfo,
        utustore::MediaStatus,
        utustore::PlaylistRecord,
        utustore::HistoryRecord,
        utustore::HistoryOutcome,
        utustore::FinishReason,
        utustore::MediaId,
        utustore::PlaylistItemId,
        utustore::HistoryItemId,
    )),
    tags(
        (name = "media", description = "Soumission et inspection des médias"),
        (name = "playback", description = "Lecture en cours et votes de saut"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/api/media",
            "/api/playlist",
            "/api/history",
            "/api/nowplaying",
            "/api/skip",
        ] {
            assert!(paths.contains(&expected), "missing path {expected}");
        }
    }
}
