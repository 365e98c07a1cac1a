//! Extension de utuconfig pour le coordinateur

use crate::coordinator::CoordinatorOptions;
use std::time::Duration;

/// Trait d'extension pour utuconfig::Config
pub trait CoordinatorConfigExt {
    /// Réglages du coordinateur (expiration des clients, mandataires)
    fn coordinator_options(&self) -> CoordinatorOptions;
}

impl CoordinatorConfigExt for utuconfig::Config {
    fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            client_timeout: Duration::from_secs(
                self.get_u64(&["webserver", "clienttimeoutseconds"], 600),
            ),
            forwarders: self
                .get_list(&["webserver", "forwarders"])
                .into_iter()
                .collect(),
        }
    }
}
