//! Extension de utuconfig pour le magasin

use std::path::PathBuf;

/// Trait d'extension pour utuconfig::Config
pub trait StoreConfigExt {
    /// Chemin du fichier de base de données
    fn database_path(&self) -> PathBuf;

    /// Aide de débogage : inverser les sélections non ordonnées
    fn database_reverse(&self) -> bool;
}

impl StoreConfigExt for utuconfig::Config {
    fn database_path(&self) -> PathBuf {
        PathBuf::from(self.get_str(&["database", "file"], "utuputki.sqlite"))
    }

    fn database_reverse(&self) -> bool {
        self.get_bool(&["database", "reverse"], false)
    }
}
