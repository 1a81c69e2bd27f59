//! Garde de cycle de vie — drapeau d'arrêt par session.
//!
//! Chaque point d'entrée d'interception ([`crate::navigate`],
//! [`crate::intercept`]) consulte ce drapeau en premier et court-circuite
//! une fois l'hôte en cours de fermeture. Le drapeau est un objet de session
//! passé à chaque composant à la construction, jamais un statique : deux
//! sessions de surface ne peuvent pas se contaminer mutuellement.
//!
//! La sémantique est volontairement best-effort : une requête qui passe la
//! vérification juste avant l'armement peut encore se terminer après, tant
//! qu'elle ne plante pas (les accès à une surface détruite sont avalés au
//! point d'usage).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Drapeau d'arrêt partagé, armé une seule fois puis jamais effacé.
///
/// Cloner la garde partage le même drapeau sous-jacent.
#[derive(Clone, Debug, Default)]
pub struct LifecycleGuard {
    shutting_down: Arc<AtomicBool>,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marque la session comme en cours de fermeture. Monotone : une fois
    /// armé, le drapeau reste armé pour toute la vie de la session.
    pub fn mark_shutting_down(&self) {
        if !self.shutting_down.swap(true, Ordering::Relaxed) {
            debug!("Session marquée en fermeture, les nouvelles interceptions court-circuitent");
        }
    }

    /// Lecture du drapeau. Un léger retard d'observation est acceptable.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }
}
