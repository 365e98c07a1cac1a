//! Crochets d'observation pour la couche web
//!
//! Le cœur publie trois événements ; les abonnés (par exemple un canal de
//! notification côté web) décident seuls de ce qu'ils en font. Les
//! implémentations par défaut ne font rien, rien dans le cœur n'exige un
//! abonné.

use utustore::{HistoryRecord, MediaRecord};

/// Observateur des événements de playlist
pub trait PlaylistObserver: Send + Sync {
    /// Un média vient d'être mis en file
    fn added_to_playlist(&self, _media: &MediaRecord) {}

    /// La boucle de lecture vient de démarrer cette entrée
    fn now_playing(&self, _item: &HistoryRecord) {}

    /// L'entrée vient de se terminer (complétée ou sautée)
    fn playlist_item_finished(&self, _item: &HistoryRecord) {}
}
