//! Source d'attente embarquée
//!
//! Quand rien n'est prêt, la boucle de lecture affiche cette image en
//! boucle plutôt qu'un écran noir. Embarquée dans le binaire pour que le
//! lecteur n'ait aucune dépendance de fichier externe.

use std::io;
use std::path::PathBuf;

/// Image d'attente, un PNG uni
pub const STANDBY_PNG: &[u8] = include_bytes!("../assets/standby.png");

/// Matérialise l'image d'attente sur disque pour les moteurs de rendu qui
/// ne lisent que des chemins
pub fn materialize_standby_image() -> io::Result<PathBuf> {
    let path = std::env::temp_dir().join("utuputki-standby.png");
    std::fs::write(&path, STANDBY_PNG)?;
    Ok(path)
}
