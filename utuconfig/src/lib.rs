//! Configuration YAML pour Utuputki
//!
//! La configuration est un document YAML unique, fusionné depuis plusieurs
//! sources par ordre de priorité croissante :
//!
//! 1. le document par défaut embarqué dans le binaire,
//! 2. un fichier externe (chemin explicite, variable d'environnement
//!    `UTUPUTKI_CONFIG`, `./.utuputki.yml` ou `~/.utuputki.yml`),
//! 3. des surcharges unitaires `UTUPUTKI_CONFIG__section__clef=valeur`.
//!
//! Toutes les clefs sont normalisées en minuscules. L'accès se fait par
//! chemin (`&["downloader", "maxlength"]`) avec des accesseurs typés.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

// Document par défaut embarqué
const DEFAULT_CONFIG: &str = include_str!("utuputki.yaml");

const ENV_CONFIG_FILE: &str = "UTUPUTKI_CONFIG";
const ENV_PREFIX: &str = "UTUPUTKI_CONFIG__";
const LOCAL_CONFIG: &str = ".utuputki.yml";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load("").expect("Failed to load Utuputki configuration"));
}

/// Retourne le singleton de configuration du processus
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

#[derive(Debug)]
pub struct Config {
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Charge la configuration depuis la première source disponible
    ///
    /// `filename` vide signifie « utiliser l'ordre de recherche standard ».
    /// Le document trouvé est fusionné par-dessus les valeurs par défaut.
    pub fn load(filename: &str) -> Result<Self> {
        let mut defaults: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let mut chosen: Option<(PathBuf, Vec<u8>)> = None;

        for candidate in Self::candidate_paths(filename) {
            match fs::read(&candidate) {
                Ok(bytes) => {
                    info!(config_file = %candidate.display(), "Loaded config file");
                    chosen = Some((candidate, bytes));
                    break;
                }
                Err(_) => {
                    debug!(config_file = %candidate.display(), "No config file here");
                }
            }
        }

        let path = match &chosen {
            Some((path, bytes)) => {
                let external: Value = serde_yaml::from_slice(bytes)?;
                merge_yaml(&mut defaults, &external);
                path.clone()
            }
            None => {
                info!("Using embedded default config");
                Self::candidate_paths(filename)
                    .into_iter()
                    .next_back()
                    .ok_or_else(|| anyhow!("No usable config path"))?
            }
        };

        let mut data = lower_keys(defaults);
        apply_env_overrides(&mut data);

        Ok(Config {
            path,
            data: Mutex::new(data),
        })
    }

    fn candidate_paths(filename: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if !filename.is_empty() {
            candidates.push(PathBuf::from(filename));
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
            if !env_path.is_empty() {
                candidates.push(PathBuf::from(env_path));
            }
        }

        candidates.push(PathBuf::from(LOCAL_CONFIG));

        if let Some(home) = home_dir() {
            candidates.push(home.join(LOCAL_CONFIG));
        }

        candidates
    }

    /// Écrit le document courant sur le chemin retenu au chargement
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Valeur brute à un chemin donné, ou `None` si absente
    pub fn get_value(&self, path: &[&str]) -> Option<Value> {
        let data = self.data.lock().unwrap();
        let mut current: &Value = &data;

        for key in path {
            let Value::Mapping(map) = current else {
                return None;
            };
            current = map.get(&Value::String(key.to_lowercase()))?;
        }

        Some(current.clone())
    }

    pub fn get_str(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn get_u64(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_bool(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "yes" | "on" | "1"),
            _ => default,
        }
    }

    /// Liste de chaînes ; un scalaire isolé devient une liste à un élément
    pub fn get_list(&self, path: &[&str]) -> Vec<String> {
        match self.get_value(path) {
            Some(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s],
            _ => Vec::new(),
        }
    }

    /// Remplace la valeur à un chemin donné et sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap();
            set_in(&mut data, path, value)?;
        }
        self.save()
    }

    /// Répertoire géré : lit le chemin configuré (ou `default_name` relatif
    /// au répertoire courant) et le crée s'il n'existe pas encore
    pub fn get_managed_dir(&self, path: &[&str], default_name: &str) -> Result<PathBuf> {
        let configured = self.get_str(path, default_name);
        let dir = PathBuf::from(configured);

        if !dir.exists() {
            info!(directory = %dir.display(), "Creating managed directory");
            fs::create_dir_all(&dir)?;
        }

        Ok(dir)
    }
}

// Clone manuel : le Mutex interne ne se clone pas
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

/// Fusionne `overlay` dans `base`, mapping par mapping
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Normalise récursivement les clefs de mapping en minuscules
fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (key, value) in map {
                let key = match key {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(key, lower_keys(value));
            }
            Value::Mapping(lowered)
        }
        other => other,
    }
}

/// Applique les surcharges `UTUPUTKI_CONFIG__section__clef=valeur`
fn apply_env_overrides(data: &mut Value) {
    for (name, raw) in env::vars() {
        let Some(suffix) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        let path: Vec<String> = suffix.split("__").map(|s| s.to_lowercase()).collect();
        if path.is_empty() {
            continue;
        }

        let value: Value =
            serde_yaml::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));

        let parts: Vec<&str> = path.iter().map(String::as_str).collect();
        if let Err(err) = set_in(data, &parts, value) {
            warn!(variable = %name, "Ignoring bad env override: {err}");
        } else {
            info!(variable = %name, "Applied env override");
        }
    }
}

fn set_in(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let (last, parents) = path
        .split_last()
        .ok_or_else(|| anyhow!("Empty config path"))?;

    let mut current = data;
    for key in parents {
        let key = Value::String(key.to_lowercase());
        let map = current
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("Config path {:?} does not address a mapping", path))?;

        current = map.entry(key).or_insert_with(|| Value::Mapping(Mapping::new()));
    }

    let map = current
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("Config path {:?} does not address a mapping", path))?;
    map.insert(Value::String(last.to_lowercase()), value);

    Ok(())
}
