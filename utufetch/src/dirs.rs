//! Vérification des répertoires de cache et de travail
//!
//! Échouer au démarrage vaut mieux qu'échouer au premier téléchargement :
//! chaque répertoire doit exister, être un répertoire et être inscriptible.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Valide un répertoire et retourne sa forme canonique
pub fn check_directory(dir: &Path, kind: &str) -> Result<PathBuf> {
    let metadata = fs::metadata(dir).map_err(|err| {
        Error::Fetcher(format!(
            "{kind} directory \"{}\" is not accessible: {err}",
            dir.display()
        ))
    })?;

    if !metadata.is_dir() {
        return Err(Error::Fetcher(format!(
            "{kind} directory \"{}\" is not a directory",
            dir.display()
        )));
    }

    // test d'écriture effectif plutôt qu'inspection des bits de permission
    let probe = dir.join(".utuputki-write-probe");
    fs::write(&probe, b"probe").map_err(|err| {
        Error::Fetcher(format!(
            "{kind} directory \"{}\" is not writable: {err}",
            dir.display()
        ))
    })?;
    let _ = fs::remove_file(&probe);

    let canonical = fs::canonicalize(dir)?;
    info!(kind, directory = %canonical.display(), "Directory checked");

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_writable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = check_directory(dir.path(), "cache").unwrap();
        assert!(canonical.is_absolute());
    }

    #[test]
    fn rejects_a_missing_directory() {
        assert!(check_directory(Path::new("/definitely/not/here"), "cache").is_err());
    }

    #[test]
    fn rejects_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(check_directory(&file, "temp").is_err());
    }
}
