//! Extension de utuconfig pour la couche web

/// Trait d'extension pour utuconfig::Config
pub trait WebConfigExt {
    /// Port d'écoute de l'API
    fn web_port(&self) -> u16;

    /// En mode debug, les erreurs internes exposent leur message
    fn web_debug(&self) -> bool;
}

impl WebConfigExt for utuconfig::Config {
    fn web_port(&self) -> u16 {
        self.get_u64(&["webserver", "port"], 8080) as u16
    }

    fn web_debug(&self) -> bool {
        self.get_bool(&["webserver", "debug"], false)
    }
}
