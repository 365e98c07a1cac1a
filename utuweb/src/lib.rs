//! # utuweb - API JSON d'Utuputki
//!
//! Le collaborateur web mince du cœur : il pousse les URL soumises vers le
//! pipeline, expose les instantanés (playlist, historique, lecture en
//! cours), enregistre les votes de saut et alimente le registre des clients
//! actifs dont dépend le seuil de saut. Pas de rendu HTML ici, uniquement
//! du JSON.

mod api;
mod config_ext;
mod openapi;
mod server;

pub use api::{api_router, AddMediaRequest, ApiState, ErrorResponse, SkipRequest};
pub use config_ext::WebConfigExt;
pub use openapi::ApiDoc;
pub use server::{bind, serve};
