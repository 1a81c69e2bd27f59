//! Assemblage par session des composants du pipeline.
//!
//! Chaque surface embarquée possède sa [`Session`] et donc SES singletons :
//! garde de cycle de vie, table de règles, coordinateur de thème. Deux
//! sessions ne partagent jamais d'état d'arrêt ni de thème. L'hôte fournit
//! ses collaborateurs via [`HostBindings`], branche [`NavigationGate`] sur
//! navigation-start et [`ResourceInterceptor`] sur les événements de
//! sous-ressources filtrés par [`RuleTable::filters`].

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::fetch::{FetchError, HttpFetcher};
use crate::intercept::ResourceInterceptor;
use crate::lifecycle::LifecycleGuard;
use crate::navigate::{NavigationGate, NavigationRedirect, NavigationSurface};
use crate::rules::RuleTable;
use crate::theme::{CookieStore, PageScripting, ThemeCoordinator, ThemeHandle};

/// Collaborateurs fournis par le moteur hôte embarquant la surface.
pub struct HostBindings {
    pub cookies: Arc<dyn CookieStore>,
    pub scripting: Arc<dyn PageScripting>,
    pub navigation: Arc<dyn NavigationSurface>,
}

/// Une session d'interception : un moteur hôte, un état de thème, un arrêt.
pub struct Session {
    lifecycle: LifecycleGuard,
    rules: Arc<RuleTable>,
    theme: ThemeHandle,
    gate: NavigationGate,
    interceptor: ResourceInterceptor,
}

impl Session {
    /// Construit la session et démarre sa tâche de coordination de thème ;
    /// doit donc être appelé dans un contexte de runtime Tokio. Échoue
    /// uniquement si le backend TLS du fetcher ne peut pas s'initialiser.
    pub fn new(
        config: Config,
        host: HostBindings,
        initial_system_dark: bool,
    ) -> Result<Self, FetchError> {
        // ── 1. Singletons de session ─────────────────────────────────────
        let lifecycle = LifecycleGuard::new();
        let rules = Arc::new(RuleTable::builtin());

        // ── 2. Coordinateur de thème, propriétaire unique de l'état ─────
        let theme = ThemeCoordinator::spawn(
            &config.theme,
            initial_system_dark,
            rules.tracked_domains(),
            host.cookies,
            host.scripting,
        );

        // ── 3. Garde de navigation et règles de redirection intégrées ───
        let mut gate = NavigationGate::new(
            host.navigation,
            theme.subscribe(),
            lifecycle.clone(),
            config.navigation.user_agent_suffix.clone(),
        );
        gate.add_rule(NavigationRedirect::bing_welcome());

        // ── 4. Intercepteur de ressources ────────────────────────────────
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let interceptor = ResourceInterceptor::new(
            Arc::clone(&rules),
            fetcher,
            theme.subscribe(),
            lifecycle.clone(),
            config.fetch.clone(),
        );

        info!(
            domains = rules.tracked_domains().len(),
            "Session d'interception construite"
        );
        Ok(Self {
            lifecycle,
            rules,
            theme,
            gate,
            interceptor,
        })
    }

    /// Garde à brancher sur l'événement navigation-start.
    pub fn gate(&self) -> &NavigationGate {
        &self.gate
    }

    /// Intercepteur à brancher sur les événements de sous-ressources.
    pub fn interceptor(&self) -> &ResourceInterceptor {
        &self.interceptor
    }

    /// Poignée de thème : notifications système, bascules explicites,
    /// instantanés.
    pub fn theme(&self) -> &ThemeHandle {
        &self.theme
    }

    /// Table de règles, source des filtres d'enregistrement du moteur hôte.
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Drapeau d'arrêt de la session.
    pub fn lifecycle(&self) -> &LifecycleGuard {
        &self.lifecycle
    }

    /// Marque la session en fermeture : les interceptions et navigations
    /// suivantes court-circuitent. Irréversible.
    pub fn shutdown(&self) {
        self.lifecycle.mark_shutting_down();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Une session détruite sans shutdown explicite est fermée quand même.
        self.lifecycle.mark_shutting_down();
    }
}
