//! # utuplayer - Boucle de lecture d'Utuputki
//!
//! L'unique consommateur de la playlist durable. La boucle possède le
//! moteur de rendu et alterne entre deux états : Lecture (une piste du
//! cache) et Attente (l'image embarquée en boucle). Les transitions sont
//! pilotées par le [`PlayerSignal`], l'objet de réveil partagé que la
//! racine de l'application distribue au pipeline de téléchargement (média
//! prêt), au coordinateur (saut voté, arrêt) et au moteur de rendu (fin de
//! flux).

mod config_ext;
mod error;
mod player;
mod renderer;
mod signal;
mod standby;
mod vlc;

pub use config_ext::PlayerConfigExt;
pub use error::{Error, Result};
pub use player::{PlaybackLoop, PlaybackSource};
pub use renderer::{FakeRenderer, Renderer, RendererEvent};
pub use signal::PlayerSignal;
pub use standby::{materialize_standby_image, STANDBY_PNG};
pub use vlc::{VlcLogLevel, VlcOptions, VlcRenderer};
