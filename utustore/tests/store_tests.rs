//! Tests d'intégration du magasin : unicité des URL, idempotence de la
//! playlist, contrat de retrait atomique, fusion sur changement d'URL.

use chrono::Utc;
use utustore::{
    FinishReason, HistoryOutcome, MediaRecord, MediaStatus, Store,
};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

/// Crée un média et le fait passer au statut demandé
fn media_with_status(store: &Store, url: &str, status: MediaStatus) -> MediaRecord {
    let mut record = store.get_or_add_media_by_url(url).unwrap();
    record.info.status = status;
    record.info.filename = format!("{}.mp4", record.id);
    record.info.title = format!("title for {url}");
    record.info.length = 42;
    record.info.metadata_time = Utc::now();
    store.update_media_info(&mut record).unwrap();
    record
}

#[test]
fn get_or_add_is_idempotent_per_url() {
    let store = store();

    let first = store.get_or_add_media_by_url("https://youtu.be/AAA").unwrap();
    let second = store.get_or_add_media_by_url("https://youtu.be/AAA").unwrap();
    let other = store.get_or_add_media_by_url("https://youtu.be/BBB").unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.id, other.id);
    assert_eq!(first.info.status, MediaStatus::Initial);

    // une ligne par URL
    let all = store.get_all_media().unwrap();
    assert_eq!(all.len(), 2);
    assert_ne!(all[0].info.url, all[1].info.url);
}

#[test]
fn media_round_trips_through_update_and_read() {
    let store = store();

    let mut record = store.get_or_add_media_by_url("https://youtu.be/RT").unwrap();
    record.info.status = MediaStatus::Downloading;
    record.info.filename = "RT.mp4".to_string();
    record.info.title = "Round trip".to_string();
    record.info.length = 123;
    record.info.filesize = 4567;
    record.info.metadata = r#"{"id":"RT"}"#.to_string();
    record.info.metadata_time = Utc::now();
    record.info.error_message = String::new();
    store.update_media_info(&mut record).unwrap();

    let read_back = store.get_media_info(record.id).unwrap();
    // l'horodatage est tronqué à la microseconde par la persistance
    let mut expected = record.clone();
    expected.info.metadata_time = chrono::DateTime::from_timestamp_micros(
        record.info.metadata_time.timestamp_micros(),
    )
    .unwrap();

    assert_eq!(read_back, expected);
}

#[test]
fn get_media_info_rejects_unknown_id() {
    let store = store();
    let record = store.get_or_add_media_by_url("https://youtu.be/X").unwrap();

    let ghost = utustore::MediaId::from_raw(record.id.as_i64() + 100).unwrap();
    assert!(matches!(
        store.get_media_info(ghost),
        Err(utustore::Error::NotFound(_))
    ));
}

#[test]
fn add_to_playlist_is_idempotent() {
    let store = store();
    let record = media_with_status(&store, "https://youtu.be/PL", MediaStatus::Ready);

    for _ in 0..4 {
        store.add_to_playlist(record.id).unwrap();
    }

    let playlist = store.get_playlist().unwrap();
    assert_eq!(playlist.len(), 1);
    assert_eq!(playlist[0].media, record.id);
    assert_eq!(playlist[0].info.title, record.info.title);
}

#[test]
fn pop_skips_items_that_are_not_ready() {
    let store = store();

    let pending = media_with_status(&store, "https://youtu.be/P1", MediaStatus::Downloading);
    store.add_to_playlist(pending.id).unwrap();

    assert!(store.pop_next_playlist_item().is_none());

    let ready = media_with_status(&store, "https://youtu.be/P2", MediaStatus::Ready);
    store.add_to_playlist(ready.id).unwrap();

    let popped = store.pop_next_playlist_item().unwrap();
    assert_eq!(popped.media, ready.id);
    // l'entrée Downloading est toujours en file
    assert_eq!(store.get_playlist().unwrap().len(), 1);
}

#[test]
fn pop_consumes_in_queue_order_exactly_once() {
    let store = store();

    let first = media_with_status(&store, "https://youtu.be/O1", MediaStatus::Ready);
    store.add_to_playlist(first.id).unwrap();
    let second = media_with_status(&store, "https://youtu.be/O2", MediaStatus::Ready);
    store.add_to_playlist(second.id).unwrap();

    let a = store.pop_next_playlist_item().unwrap();
    let b = store.pop_next_playlist_item().unwrap();

    assert_eq!(a.media, first.id);
    assert_eq!(b.media, second.id);
    assert!(a.queue_time <= b.queue_time);
    assert!(a.queue_time <= a.start_time);

    // la playlist est vide, la troisième tentative ne rend rien
    assert!(store.pop_next_playlist_item().is_none());

    // les deux lectures sont dans l'historique, non finalisées
    let history = store.get_history().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.outcome == HistoryOutcome::Unfinished));
    assert!(history.iter().all(|h| h.end_time.is_none()));
}

#[test]
fn finished_item_is_finalised_once() {
    let store = store();

    let record = media_with_status(&store, "https://youtu.be/F1", MediaStatus::Ready);
    store.add_to_playlist(record.id).unwrap();

    let mut item = store.pop_next_playlist_item().unwrap();
    item.outcome = HistoryOutcome::Finished(FinishReason::Skipped);
    item.skip_count = 2;
    item.skips_needed = 2;
    store.playlist_item_finished(&item).unwrap();

    let history = store.get_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].outcome,
        HistoryOutcome::Finished(FinishReason::Skipped)
    );
    assert_eq!(history[0].skip_count, 2);
    assert_eq!(history[0].skips_needed, 2);

    let end = history[0].end_time.expect("end time must be set");
    assert!(history[0].queue_time <= history[0].start_time);
    assert!(history[0].start_time <= end);
}

#[test]
fn failed_update_evicts_playlist_row_but_not_history() {
    let store = store();

    let record = media_with_status(&store, "https://youtu.be/FAIL", MediaStatus::Ready);
    store.add_to_playlist(record.id).unwrap();

    // une lecture déjà passée reste dans l'historique
    let played = store.pop_next_playlist_item().unwrap();
    store.add_to_playlist(record.id).unwrap();
    assert_eq!(store.get_playlist().unwrap().len(), 1);

    let mut failed = store.get_media_info(record.id).unwrap();
    failed.info.status = MediaStatus::Failed;
    failed.info.error_message = "downloader exploded".to_string();
    store.update_media_info(&mut failed).unwrap();

    assert!(store.get_playlist().unwrap().is_empty());

    let history = store.get_history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, played.id);
}

#[test]
fn url_change_merges_duplicate_rows() {
    let store = store();

    // id 1 mis en file en premier, id 2 ensuite
    let earlier = media_with_status(&store, "https://youtu.be/X", MediaStatus::Ready);
    store.add_to_playlist(earlier.id).unwrap();

    let later = media_with_status(
        &store,
        "https://www.youtube.com/watch?v=X",
        MediaStatus::Downloading,
    );
    store.add_to_playlist(later.id).unwrap();

    // le récupérateur canonicalise la seconde URL vers la première
    let mut updated = store.get_media_info(later.id).unwrap();
    updated.info.url = earlier.info.url.clone();
    store.update_media_info(&mut updated).unwrap();

    // l'id de l'appelant est réécrit vers la ligne survivante
    assert_eq!(updated.id, earlier.id);

    // la ligne en double a disparu
    let all = store.get_all_media().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, earlier.id);

    // seule l'entrée de playlist la plus ancienne subsiste et pointe sur la
    // ligne survivante
    let playlist = store.get_playlist().unwrap();
    assert_eq!(playlist.len(), 1);
    assert_eq!(playlist[0].media, earlier.id);
}

#[test]
fn url_change_without_existing_row_is_a_plain_update() {
    let store = store();

    let record = media_with_status(&store, "https://youtu.be/solo", MediaStatus::Downloading);
    store.add_to_playlist(record.id).unwrap();

    let mut updated = store.get_media_info(record.id).unwrap();
    updated.info.url = "https://www.youtube.com/watch?v=solo".to_string();
    store.update_media_info(&mut updated).unwrap();

    assert_eq!(updated.id, record.id);
    let read_back = store.get_media_info(record.id).unwrap();
    assert_eq!(read_back.info.url, "https://www.youtube.com/watch?v=solo");
    assert_eq!(store.get_playlist().unwrap().len(), 1);
}

#[test]
fn open_creates_schema_on_disk_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("utuputki.sqlite");

    {
        let store = Store::open(&path, false).unwrap();
        let record = media_with_status(&store, "https://youtu.be/DISK", MediaStatus::Ready);
        store.add_to_playlist(record.id).unwrap();
    }

    // réouverture sur la même base : le schéma existe déjà, les données restent
    let store = Store::open(&path, true).unwrap();
    let all = store.get_all_media().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].info.url, "https://youtu.be/DISK");
    assert_eq!(store.get_playlist().unwrap().len(), 1);
}
