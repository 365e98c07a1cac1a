//! Objet de réveil partagé de la boucle de lecture
//!
//! C'est l'équivalent d'une variable de condition avec son prédicat : la
//! boucle s'endort dessus pendant qu'une piste joue ou qu'elle est en
//! attente, et tout le monde la réveille à travers lui : fin de flux du
//! moteur de rendu, seuil de votes atteint, média devenu prêt ou demande
//! d'arrêt. L'objet est construit par la racine de l'application et passé
//! aux composants concernés ; personne ne détient de pointeur vers la
//! boucle elle-même.

use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct SignalState {
    on_standby: bool,
    skipped: bool,
    ended: bool,
    ready_kick: bool,
    shutdown: bool,
    immediate: bool,
}

impl SignalState {
    /// Vrai quand la boucle doit sortir de son attente courante
    fn wake_due(&self) -> bool {
        self.ended
            || self.skipped
            || (self.shutdown && (self.immediate || self.on_standby))
            || (self.on_standby && self.ready_kick)
    }
}

/// Point de rendez-vous entre la boucle de lecture et ses réveilleurs
#[derive(Debug, Default)]
pub struct PlayerSignal {
    state: Mutex<SignalState>,
    notify: Notify,
}

impl PlayerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Un média vient de passer Ready ; ne réveille la boucle que si elle
    /// est en attente, car pendant une lecture un réveil signifierait à
    /// tort une fin de piste
    pub fn media_ready(&self) {
        let mut state = self.state.lock().unwrap();
        if state.on_standby {
            debug!("Media ready, waking standby playback loop");
            state.ready_kick = true;
            self.notify.notify_one();
        }
    }

    /// Le seuil de votes est atteint, la piste courante doit être coupée
    pub fn skip_current(&self) {
        let mut state = self.state.lock().unwrap();
        state.skipped = true;
        self.notify.notify_one();
    }

    /// Fin de flux rapportée par le moteur de rendu
    pub fn end_reached(&self) {
        let mut state = self.state.lock().unwrap();
        state.ended = true;
        self.notify.notify_one();
    }

    /// Demande d'arrêt
    ///
    /// Ordonné : la boucle finit sa piste en cours (un réveil immédiat n'a
    /// lieu qu'en attente). Immédiat : la boucle est réveillée même en
    /// pleine lecture.
    pub fn shutdown(&self, immediate: bool) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        if immediate {
            state.immediate = true;
        }
        if immediate || state.on_standby {
            self.notify.notify_one();
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Ouvre un cycle en position d'attente et remet à zéro les causes de
    /// réveil du cycle précédent
    ///
    /// Toujours appelé AVANT le retrait dans la playlist : un média qui
    /// devient prêt pendant le retrait pose son réveil ici au lieu de se
    /// perdre entre deux états.
    pub(crate) fn arm(&self) {
        let mut state = self.state.lock().unwrap();
        state.on_standby = true;
        state.skipped = false;
        state.ended = false;
        state.ready_kick = false;
    }

    /// Bascule le cycle armé en lecture effective
    ///
    /// Les fins de flux et réveils « média prêt » parasites sont purgés ;
    /// un vote de saut déjà posé est conservé, il vise forcément la piste
    /// qui vient d'être réclamée.
    pub(crate) fn enter_playing(&self) {
        let mut state = self.state.lock().unwrap();
        state.on_standby = false;
        state.ended = false;
        state.ready_kick = false;
    }

    /// Consomme l'indicateur de saut du cycle qui s'achève
    pub(crate) fn take_skipped(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.skipped)
    }

    /// Attend la prochaine cause de réveil
    ///
    /// Les permis de réveil périmés d'un cycle précédent ne provoquent
    /// qu'une re-vérification du prédicat, jamais une fin de piste fantôme.
    pub(crate) async fn wait(&self) {
        loop {
            if self.state.lock().unwrap().wake_due() {
                return;
            }
            self.notify.notified().await;
        }
    }
}
