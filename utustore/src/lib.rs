//! # utustore - État durable d'Utuputki
//!
//! Trois tables SQLite : `media` (une ligne par URL canonique), `playlist`
//! (les demandes de lecture en attente) et `history` (les lectures
//! effectuées). Chaque opération publique s'exécute dans une transaction
//! exclusive ; les appelants reçoivent des instantanés et n'observent
//! jamais d'état partiel.
//!
//! Le contrat central est `pop_next_playlist_item` : la sélection de la
//! prochaine entrée prête, la suppression de la ligne de playlist et
//! l'insertion de la ligne d'historique forment une seule transaction, donc
//! aucune entrée ne peut être réclamée deux fois.

mod config_ext;
mod error;
mod models;

pub use config_ext::StoreConfigExt;
pub use error::{Error, Result};
pub use models::{
    FinishReason, HistoryItemId, HistoryOutcome, HistoryRecord, MediaId, MediaInfo, MediaRecord,
    MediaStatus, PlaylistItemId, PlaylistRecord,
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info};

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS media (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    status        INTEGER NOT NULL DEFAULT 0,
    url           TEXT    NOT NULL UNIQUE,
    filename      TEXT    NOT NULL DEFAULT '',
    title         TEXT    NOT NULL DEFAULT '',
    length        INTEGER NOT NULL DEFAULT 0,
    filesize      INTEGER NOT NULL DEFAULT 0,
    metadata      TEXT    NOT NULL DEFAULT '',
    metadata_time INTEGER NOT NULL DEFAULT 0,
    error_message TEXT    NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS playlist (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    media      INTEGER NOT NULL REFERENCES media (id),
    queue_time INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_playlist_media ON playlist (media);
CREATE INDEX IF NOT EXISTS idx_playlist_queue_time ON playlist (queue_time);

CREATE TABLE IF NOT EXISTS history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    media         INTEGER NOT NULL REFERENCES media (id),
    queue_time    INTEGER NOT NULL,
    start_time    INTEGER NOT NULL,
    end_time      INTEGER,
    finish_reason INTEGER,
    skip_count    INTEGER NOT NULL DEFAULT 0,
    skips_needed  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_history_queue_time ON history (queue_time);
";

const MEDIA_COLUMNS: &str =
    "status, url, filename, title, length, filesize, metadata, metadata_time, error_message";

/// Magasin SQLite, propriétaire exclusif des trois tables
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Ouvre (ou crée) la base et installe le schéma
    ///
    /// `reverse_unordered` est une aide de débogage qui inverse les
    /// sélections sans ORDER BY pour faire apparaître les dépendances
    /// d'ordre accidentelles.
    pub fn open(path: &Path, reverse_unordered: bool) -> Result<Self> {
        info!(database = %path.display(), "Opening database");

        let conn = Connection::open(path)?;

        // ne pas échouer immédiatement si la base est occupée
        conn.busy_timeout(Duration::from_millis(1000))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        if reverse_unordered {
            debug!("PRAGMA reverse_unordered_selects = ON");
            conn.pragma_update(None, "reverse_unordered_selects", "ON")?;
        }

        // idempotent, CREATE TABLE IF NOT EXISTS partout
        conn.execute_batch(CREATE_TABLES)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Base en mémoire, pour les tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn transaction<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Retourne la ligne média pour cette URL canonique, en la créant au
    /// besoin avec le statut Initial
    pub fn get_or_add_media_by_url(&self, url: &str) -> Result<MediaRecord> {
        assert!(!url.is_empty());

        self.transaction(|tx| {
            if let Some(record) = select_media_by_url(tx, url)? {
                return Ok(record);
            }

            tx.execute("INSERT INTO media (url) VALUES (?1)", params![url])?;
            let id = tx.last_insert_rowid();
            debug!(media = id, url, "Created media row");

            select_media_by_id(tx, id)?.ok_or_else(|| {
                Error::Database(rusqlite::Error::QueryReturnedNoRows)
            })
        })
    }

    /// Instantané d'une ligne média existante
    pub fn get_media_info(&self, id: MediaId) -> Result<MediaRecord> {
        self.transaction(|tx| {
            select_media_by_id(tx, id.as_i64())?.ok_or(Error::NotFound(id))
        })
    }

    /// Toutes les lignes média, par id croissant
    pub fn get_all_media(&self) -> Result<Vec<MediaRecord>> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT id, {MEDIA_COLUMNS} FROM media ORDER BY id ASC"
            ))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(MediaRecord {
                        id: MediaId::from_db(row.get(0)?),
                        info: media_info_from_row(row, 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows)
        })
    }

    /// Applique un instantané média modifié
    ///
    /// Deux règles non triviales s'exécutent dans la même transaction :
    ///
    /// - **fusion sur changement d'URL** : si la nouvelle URL appartient déjà
    ///   à une autre ligne (le récupérateur a normalisé deux soumissions vers
    ///   le même média), les deux lignes fusionnent : l'entrée de playlist la
    ///   plus récente disparaît, l'entrée restante est repointée, la ligne en
    ///   double est supprimée et `media.id` est réécrit vers la ligne
    ///   survivante avant d'appliquer la mise à jour ;
    /// - **éviction sur échec** : un passage au statut Failed retire la ligne
    ///   de playlist correspondante. L'historique n'est jamais touché.
    pub fn update_media_info(&self, media: &mut MediaRecord) -> Result<()> {
        self.transaction(|tx| {
            let old = select_media_by_id(tx, media.id.as_i64())?
                .ok_or(Error::NotFound(media.id))?;

            if media.info.url != old.info.url {
                info!(
                    media = %media.id,
                    old_url = %old.info.url,
                    new_url = %media.info.url,
                    "Media URL changed"
                );

                let other: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM media WHERE url = ?1",
                        params![media.info.url],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(other_id) = other {
                    // la playlist peut contenir les deux lignes, on garde la
                    // plus ancienne
                    let mut stmt = tx.prepare(
                        "SELECT id FROM playlist
                         WHERE media = ?1 OR media = ?2
                         ORDER BY queue_time ASC, id ASC",
                    )?;
                    let queued = stmt
                        .query_map(params![other_id, media.id.as_i64()], |row| {
                            row.get::<_, i64>(0)
                        })?
                        .collect::<rusqlite::Result<Vec<_>>>()?;

                    if queued.len() > 1 {
                        debug!(duplicates = queued.len() - 1, "Dropping later-queued duplicate");
                        tx.execute(
                            "DELETE FROM playlist WHERE id = ?1",
                            params![queued[1]],
                        )?;
                    }

                    tx.execute(
                        "UPDATE playlist SET media = ?1 WHERE media = ?2",
                        params![other_id, media.id.as_i64()],
                    )?;

                    tx.execute(
                        "DELETE FROM media WHERE id = ?1",
                        params![media.id.as_i64()],
                    )?;

                    // la mise à jour qui suit doit viser la ligne survivante
                    media.id = MediaId::from_db(other_id);
                }
            }

            tx.execute(
                "UPDATE media SET
                     status = ?2, url = ?3, filename = ?4, title = ?5,
                     length = ?6, filesize = ?7, metadata = ?8,
                     metadata_time = ?9, error_message = ?10
                 WHERE id = ?1",
                params![
                    media.id.as_i64(),
                    media.info.status.to_db(),
                    media.info.url,
                    media.info.filename,
                    media.info.title,
                    media.info.length as i64,
                    media.info.filesize as i64,
                    media.info.metadata,
                    media.info.metadata_time.timestamp_micros(),
                    media.info.error_message,
                ],
            )?;

            if media.info.status == MediaStatus::Failed {
                info!(
                    media = %media.id,
                    url = %media.info.url,
                    "Media failed, removing from playlist"
                );
                tx.execute(
                    "DELETE FROM playlist WHERE media = ?1",
                    params![media.id.as_i64()],
                )?;
            }

            Ok(())
        })
    }

    /// Ajoute un média à la playlist, silencieusement idempotent
    pub fn add_to_playlist(&self, media: MediaId) -> Result<()> {
        self.transaction(|tx| {
            let already: Option<i64> = tx
                .query_row(
                    "SELECT id FROM playlist WHERE media = ?1",
                    params![media.as_i64()],
                    |row| row.get(0),
                )
                .optional()?;

            if already.is_some() {
                info!(media = %media, "Already on playlist");
                return Ok(());
            }

            tx.execute(
                "INSERT INTO playlist (media, queue_time) VALUES (?1, ?2)",
                params![media.as_i64(), Utc::now().timestamp_micros()],
            )?;
            debug!(media = %media, "Added to playlist");

            Ok(())
        })
    }

    /// La playlist jointe aux médias, par date de mise en file croissante
    pub fn get_playlist(&self) -> Result<Vec<PlaylistRecord>> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT playlist.id, playlist.media, playlist.queue_time, {MEDIA_COLUMNS}
                 FROM playlist JOIN media ON playlist.media = media.id
                 ORDER BY playlist.queue_time ASC, playlist.id ASC"
            ))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(PlaylistRecord {
                        id: PlaylistItemId::from_db(row.get(0)?),
                        media: MediaId::from_db(row.get(1)?),
                        queue_time: micros_to_datetime(row.get(2)?),
                        info: media_info_from_row(row, 3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows)
        })
    }

    /// L'historique joint aux médias, par date de mise en file croissante
    pub fn get_history(&self) -> Result<Vec<HistoryRecord>> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT history.id, history.media, history.queue_time,
                        history.start_time, history.end_time, history.finish_reason,
                        history.skip_count, history.skips_needed, {MEDIA_COLUMNS}
                 FROM history JOIN media ON history.media = media.id
                 ORDER BY history.queue_time ASC, history.id ASC"
            ))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(HistoryRecord {
                        id: HistoryItemId::from_db(row.get(0)?),
                        media: MediaId::from_db(row.get(1)?),
                        queue_time: micros_to_datetime(row.get(2)?),
                        start_time: micros_to_datetime(row.get(3)?),
                        end_time: row.get::<_, Option<i64>>(4)?.map(micros_to_datetime),
                        outcome: HistoryOutcome::from_db(row.get(5)?),
                        skip_count: row.get::<_, i64>(6)? as u64,
                        skips_needed: row.get::<_, i64>(7)? as u64,
                        info: media_info_from_row(row, 8)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows)
        })
    }

    /// Réclame la prochaine entrée prête de la playlist
    ///
    /// Sélectionne l'entrée la plus ancienne dont le média est Ready, la
    /// supprime et insère la ligne d'historique correspondante avec
    /// `start_time = now`, le tout dans une transaction. Retourne `None`
    /// quand rien n'est prêt, ou sur erreur de stockage, journalisée
    /// ici : pour la boucle de lecture, une base en difficulté équivaut à
    /// « rien à jouer ».
    pub fn pop_next_playlist_item(&self) -> Option<HistoryRecord> {
        let result = self.transaction(|tx| {
            let row = tx
                .query_row(
                    &format!(
                        "SELECT playlist.id, playlist.media, playlist.queue_time, {MEDIA_COLUMNS}
                         FROM playlist JOIN media ON playlist.media = media.id
                         WHERE media.status = ?1
                         ORDER BY playlist.queue_time ASC, playlist.id ASC
                         LIMIT 1"
                    ),
                    params![MediaStatus::Ready.to_db()],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            media_info_from_row(row, 3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((playlist_id, media_id, queue_time, info)) = row else {
                return Ok(None);
            };

            tx.execute("DELETE FROM playlist WHERE id = ?1", params![playlist_id])?;

            let start_time = Utc::now().timestamp_micros();
            tx.execute(
                "INSERT INTO history (media, queue_time, start_time) VALUES (?1, ?2, ?3)",
                params![media_id, queue_time, start_time],
            )?;
            let history_id = tx.last_insert_rowid();

            Ok(Some(HistoryRecord {
                id: HistoryItemId::from_db(history_id),
                media: MediaId::from_db(media_id),
                queue_time: micros_to_datetime(queue_time),
                start_time: micros_to_datetime(start_time),
                end_time: None,
                outcome: HistoryOutcome::Unfinished,
                skip_count: 0,
                skips_needed: 0,
                info,
            }))
        });

        match result {
            Ok(item) => item,
            Err(err) => {
                error!("pop_next_playlist_item failed: {err}");
                None
            }
        }
    }

    /// Finalise une ligne d'historique : date de fin, raison et comptage des
    /// votes au moment de la transition
    pub fn playlist_item_finished(&self, item: &HistoryRecord) -> Result<()> {
        self.transaction(|tx| {
            tx.execute(
                "UPDATE history SET
                     end_time = ?2, finish_reason = ?3,
                     skip_count = ?4, skips_needed = ?5
                 WHERE id = ?1",
                params![
                    item.id.as_i64(),
                    Utc::now().timestamp_micros(),
                    item.outcome.to_db(),
                    item.skip_count as i64,
                    item.skips_needed as i64,
                ],
            )?;

            Ok(())
        })
    }
}

fn media_info_from_row(row: &Row, offset: usize) -> rusqlite::Result<MediaInfo> {
    let raw_status: i64 = row.get(offset)?;

    Ok(MediaInfo {
        status: MediaStatus::from_db(raw_status).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(offset, raw_status)
        })?,
        url: row.get(offset + 1)?,
        filename: row.get(offset + 2)?,
        title: row.get(offset + 3)?,
        length: row.get::<_, i64>(offset + 4)? as u64,
        filesize: row.get::<_, i64>(offset + 5)? as u64,
        metadata: row.get(offset + 6)?,
        metadata_time: micros_to_datetime(row.get(offset + 7)?),
        error_message: row.get(offset + 8)?,
    })
}

fn select_media_by_id(tx: &Transaction, id: i64) -> Result<Option<MediaRecord>> {
    let record = tx
        .query_row(
            &format!("SELECT id, {MEDIA_COLUMNS} FROM media WHERE id = ?1"),
            params![id],
            |row| {
                Ok(MediaRecord {
                    id: MediaId::from_db(row.get(0)?),
                    info: media_info_from_row(row, 1)?,
                })
            },
        )
        .optional()?;

    Ok(record)
}

fn select_media_by_url(tx: &Transaction, url: &str) -> Result<Option<MediaRecord>> {
    let record = tx
        .query_row(
            &format!("SELECT id, {MEDIA_COLUMNS} FROM media WHERE url = ?1"),
            params![url],
            |row| {
                Ok(MediaRecord {
                    id: MediaId::from_db(row.get(0)?),
                    info: media_info_from_row(row, 1)?,
                })
            },
        )
        .optional()?;

    Ok(record)
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
