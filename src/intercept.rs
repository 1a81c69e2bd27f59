//! Interception des sous-ressources — cœur du pipeline.
//!
//! Pour chaque requête couverte par la table de règles : garde, claim du
//! deferral, fetch hors-bande borné, réécriture pure, réponse synthétique.
//! Le deferral claimé est libéré exactement une fois sur chaque chemin de
//! sortie, y compris les chemins d'erreur et les paniques aval : c'est
//! l'invariant central du pipeline, porté par le RAII de [`DeferralGuard`].
//! Une requête jamais claimée (hôte non suivi, session en fermeture) est
//! rendue au moteur hôte qui suit son chemin réseau normal.
//!
//! Chaque événement est traité par sa propre tâche : aucune sérialisation
//! globale, l'ordre d'achèvement entre requêtes n'est pas garanti.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::fetch::Fetcher;
use crate::lifecycle::LifecycleGuard;
use crate::rules::{ResourceKind, RuleTable};
use crate::theme::ThemeState;

/// Réponse synthétique remise au moteur hôte à la place du trajet réseau.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SyntheticResponse {
    /// Réponse 200 "OK" avec le Content-Type du type de ressource.
    pub fn ok(kind: ResourceKind, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: vec![(
                "Content-Type".to_string(),
                kind.content_type().to_string(),
            )],
            body,
        }
    }
}

/// Jeton de complétion fourni par le moteur hôte : « je fournirai la
/// réponse plus tard ».
///
/// Contrat : `set_response` est appelé au plus une fois, avant `complete` ;
/// `complete` libère le jeton et consomme le deferral. Compléter sans
/// réponse attachée signifie que le moteur reprend son chemin réseau normal.
pub trait Deferral: Send {
    /// Attache la réponse synthétique à la requête déférée.
    fn set_response(&mut self, response: SyntheticResponse);
    /// Libère le jeton. Au plus un appel, garanti par le type.
    fn complete(self: Box<Self>);
}

/// Wrapper RAII garantissant exactement une libération par deferral claimé.
///
/// Tout chemin de sortie passe par un unique `complete()` : explicitement
/// via [`DeferralGuard::respond`] ou [`DeferralGuard::release`], ou par le
/// `Drop` si le chemin a été abandonné en route.
pub struct DeferralGuard {
    deferral: Option<Box<dyn Deferral>>,
}

impl DeferralGuard {
    fn new(deferral: Box<dyn Deferral>) -> Self {
        Self {
            deferral: Some(deferral),
        }
    }

    /// Attache la réponse puis libère le deferral.
    pub fn respond(mut self, response: SyntheticResponse) {
        if let Some(mut deferral) = self.deferral.take() {
            deferral.set_response(response);
            deferral.complete();
        }
    }

    /// Libère sans réponse : le moteur hôte reprend son chemin normal.
    pub fn release(mut self) {
        if let Some(deferral) = self.deferral.take() {
            deferral.complete();
        }
    }
}

impl Drop for DeferralGuard {
    fn drop(&mut self) {
        if let Some(deferral) = self.deferral.take() {
            debug!("Deferral libéré par le drop, sans réponse attachée");
            deferral.complete();
        }
    }
}

/// Événement d'interception reçu du moteur hôte.
///
/// Possédé exclusivement par la tâche qui le traite. Droppé sans claim, le
/// moteur hôte poursuit la requête normalement.
pub struct InterceptedRequest {
    url: Url,
    kind: ResourceKind,
    deferral: Box<dyn Deferral>,
}

impl InterceptedRequest {
    pub fn new(url: Url, kind: ResourceKind, deferral: Box<dyn Deferral>) -> Self {
        Self {
            url,
            kind,
            deferral,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Réclame le deferral. À partir d'ici la libération exactement-une-fois
    /// est garantie par le [`DeferralGuard`].
    pub fn claim(self) -> DeferralGuard {
        DeferralGuard::new(self.deferral)
    }
}

/// Orchestrateur fetch → réécriture → réponse pour les requêtes couvertes.
pub struct ResourceInterceptor {
    rules: Arc<RuleTable>,
    fetcher: Arc<dyn Fetcher>,
    theme: watch::Receiver<ThemeState>,
    lifecycle: LifecycleGuard,
    fetch_config: FetchConfig,
}

impl ResourceInterceptor {
    pub fn new(
        rules: Arc<RuleTable>,
        fetcher: Arc<dyn Fetcher>,
        theme: watch::Receiver<ThemeState>,
        lifecycle: LifecycleGuard,
        fetch_config: FetchConfig,
    ) -> Self {
        Self {
            rules,
            fetcher,
            theme,
            lifecycle,
            fetch_config,
        }
    }

    /// Traite un événement de sous-ressource du moteur hôte.
    pub async fn on_resource_requested(&self, request: InterceptedRequest) {
        // ── 1. Garde : session en fermeture ou couple non suivi ──────────
        if self.lifecycle.is_shutting_down() {
            debug!(url = %request.url(), "Session en fermeture, requête laissée au moteur");
            return;
        }
        let Some(rule) = self.rules.lookup(request.url(), request.kind()) else {
            return; // jamais claimé : pass-through intégral
        };

        let url = request.url().clone();
        let kind = request.kind();

        // ── 2. Claim : libération exactement-une-fois garantie ───────────
        let guard = request.claim();

        // ── 3. Fetch hors-bande borné ────────────────────────────────────
        let timeout = self.fetch_config.timeout_for(kind);
        let body = match self.fetcher.fetch(&url, timeout).await {
            Ok(body) => body,
            Err(error) => {
                warn!(%url, %error, "Fetch hors-bande échoué, deferral libéré sans réponse");
                guard.release();
                return;
            }
        };

        // ── 4. Réécriture pure avec l'instantané de thème courant ────────
        let theme = *self.theme.borrow();
        let rewritten = rule.apply(&body, &theme);

        // ── 5. Réponse synthétique et libération ─────────────────────────
        debug!(%url, ?kind, dark = theme.is_dark, bytes = rewritten.len(), "Réponse synthétique substituée");
        guard.respond(SyntheticResponse::ok(kind, rewritten));
    }
}
