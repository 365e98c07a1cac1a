//! # utucontrol - Coordination d'Utuputki
//!
//! Le coordinateur détient l'état que la couche web lit et modifie et que
//! la boucle de lecture publie : l'entrée en cours de lecture, les votes de
//! saut et le registre des clients actifs. Il fait aussi le pont côté
//! ingestion (validation puis mise en file) et porte la machine d'arrêt
//! SIGINT/SIGHUP.
//!
//! La racine de l'application possède tous les composants ; le coordinateur
//! ne reçoit que des poignées partagées (magasin, pipeline, signal de la
//! boucle de lecture), jamais de pointeurs croisés.

mod config_ext;
mod coordinator;
mod error;
mod hooks;
mod shutdown;

pub use config_ext::CoordinatorConfigExt;
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{Error, Result};
pub use hooks::PlaylistObserver;
pub use shutdown::{spawn_signal_task, ShutdownController};
