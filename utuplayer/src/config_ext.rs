//! Extension de utuconfig pour le lecteur

use crate::vlc::{VlcLogLevel, VlcOptions};

/// Trait d'extension pour utuconfig::Config
pub trait PlayerConfigExt {
    /// Réglages du moteur de rendu VLC
    fn player_options(&self) -> VlcOptions;
}

impl PlayerConfigExt for utuconfig::Config {
    fn player_options(&self) -> VlcOptions {
        VlcOptions {
            fullscreen: self.get_bool(&["player", "fullscreen"], true),
            normalize_volume: self.get_bool(&["player", "normalizevolume"], true),
            audio_device: self.get_str(&["player", "audiodevice"], ""),
            log_level: VlcLogLevel::parse(&self.get_str(&["player", "vlcloglevel"], "error")),
        }
    }
}
