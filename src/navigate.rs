//! Garde de navigation — décision avant chargement.
//!
//! Chaque événement navigation-start passe par [`NavigationGate`] : les
//! règles de redirection sont évaluées dans l'ordre d'enregistrement et la
//! première qui matche gagne (annulation de la navigation d'origine, émission
//! de l'URL reconstruite). Sinon la navigation se poursuit avec le
//! comportement par défaut : suffixe user-agent idempotent et application de
//! la préférence color-scheme.
//!
//! La garde est fail-open : une panique pendant l'évaluation laisse la
//! navigation d'origine se poursuivre telle quelle. Une interception perdue
//! se remarque à peine, un hôte planté se remarque beaucoup.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::lifecycle::LifecycleGuard;
use crate::theme::ThemeState;

/// Décision rendue pour un événement navigation-start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Laisser la navigation d'origine se poursuivre.
    Proceed,
    /// Annuler la navigation d'origine et émettre celle-ci à la place.
    Redirect(Url),
}

/// Règle de redirection sans état propre, évaluée à chaque navigation.
pub struct NavigationRedirect {
    matches: Box<dyn Fn(&Url) -> bool + Send + Sync>,
    build: Box<dyn Fn(&Url, Option<&str>) -> Option<Url> + Send + Sync>,
}

impl NavigationRedirect {
    /// Construit une règle à partir d'un prédicat et d'un constructeur de
    /// cible. Le constructeur reçoit la requête en attente éventuelle et
    /// peut renoncer en rendant `None`.
    pub fn new(
        matches: impl Fn(&Url) -> bool + Send + Sync + 'static,
        build: impl Fn(&Url, Option<&str>) -> Option<Url> + Send + Sync + 'static,
    ) -> Self {
        Self {
            matches: Box::new(matches),
            build: Box::new(build),
        }
    }

    /// Règle intégrée : l'URL d'accueil nue du dictionnaire Bing est
    /// réécrite vers la recherche de la requête en attente. La surface
    /// charge d'abord la page d'accueil pour chauffer le moteur, puis la
    /// vraie recherche part d'ici.
    pub fn bing_welcome() -> Self {
        Self::new(
            |url| {
                url.host_str().is_some_and(|host| host == "cn.bing.com")
                    && matches!(url.path(), "/dict" | "/dict/")
                    && url.query().is_none()
            },
            |_url, pending| {
                let query = pending?;
                let encoded: String =
                    url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
                Url::parse(&format!("https://cn.bing.com/dict/search?q={encoded}")).ok()
            },
        )
    }
}

/// Environnement de navigation exposé par le moteur hôte : user-agent
/// sortant de la surface et préférence de schéma de couleurs.
pub trait NavigationSurface: Send + Sync {
    fn user_agent(&self) -> String;
    fn set_user_agent(&self, user_agent: &str);
    fn set_preferred_color_scheme(&self, dark: bool);
}

/// Garde branchée sur l'événement navigation-start du moteur hôte.
pub struct NavigationGate {
    rules: Vec<NavigationRedirect>,
    surface: Arc<dyn NavigationSurface>,
    theme: watch::Receiver<ThemeState>,
    lifecycle: LifecycleGuard,
    user_agent_suffix: String,
    /// Requête déclarée par l'hôte, consommée par la première redirection
    /// qui aboutit.
    pending_query: Mutex<Option<String>>,
}

impl NavigationGate {
    pub fn new(
        surface: Arc<dyn NavigationSurface>,
        theme: watch::Receiver<ThemeState>,
        lifecycle: LifecycleGuard,
        user_agent_suffix: String,
    ) -> Self {
        Self {
            rules: Vec::new(),
            surface,
            theme,
            lifecycle,
            user_agent_suffix,
            pending_query: Mutex::new(None),
        }
    }

    /// Enregistre une règle. L'ordre d'enregistrement est l'ordre
    /// d'évaluation.
    pub fn add_rule(&mut self, rule: NavigationRedirect) {
        self.rules.push(rule);
    }

    /// Déclare la requête qui réécrira la prochaine URL d'accueil matchée.
    pub fn set_pending_query(&self, query: impl Into<String>) {
        *self.lock_pending() = Some(query.into());
    }

    /// Efface la requête en attente sans la consommer : l'hôte quitte le
    /// flux de recherche avant que l'accueil ne charge, la prochaine URL
    /// d'accueil matchée se poursuit telle quelle.
    pub fn clear_pending_query(&self) {
        *self.lock_pending() = None;
    }

    /// Traite un événement navigation-start. Ne renvoie jamais d'erreur :
    /// toute panique interne dégrade en [`NavigationDecision::Proceed`].
    pub fn on_navigation_starting(&self, url: &Url) -> NavigationDecision {
        if self.lifecycle.is_shutting_down() {
            return NavigationDecision::Proceed;
        }
        catch_unwind(AssertUnwindSafe(|| self.evaluate(url))).unwrap_or_else(|_| {
            warn!(%url, "Panique pendant l'évaluation de navigation, fail-open");
            NavigationDecision::Proceed
        })
    }

    fn evaluate(&self, url: &Url) -> NavigationDecision {
        for rule in &self.rules {
            if (rule.matches)(url) {
                let pending = self.lock_pending().take();
                if let Some(target) = (rule.build)(url, pending.as_deref()) {
                    debug!(from = %url, to = %target, "Navigation redirigée");
                    return NavigationDecision::Redirect(target);
                }
                // Pas de cible construite : la requête en attente est
                // restaurée et la navigation d'origine se poursuit.
                if let Some(query) = pending {
                    *self.lock_pending() = Some(query);
                }
                break; // première règle qui matche, pas de repêchage
            }
        }

        let theme = *self.theme.borrow();
        self.apply_surface_defaults(theme);
        NavigationDecision::Proceed
    }

    /// Suffixe UA une seule fois, puis préférence de schéma de couleurs.
    fn apply_surface_defaults(&self, theme: ThemeState) {
        let user_agent = self.surface.user_agent();
        if !user_agent.contains(&self.user_agent_suffix) {
            let stamped = if user_agent.is_empty() {
                self.user_agent_suffix.clone()
            } else {
                format!("{user_agent} {}", self.user_agent_suffix)
            };
            self.surface.set_user_agent(&stamped);
        }
        self.surface.set_preferred_color_scheme(theme.is_dark);
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<String>> {
        self.pending_query
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemeMode;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockSurface {
        user_agent: Mutex<String>,
        ua_writes: AtomicUsize,
        dark: AtomicBool,
        scheme_writes: AtomicUsize,
    }

    impl MockSurface {
        fn new(user_agent: &str) -> Arc<Self> {
            Arc::new(Self {
                user_agent: Mutex::new(user_agent.to_string()),
                ua_writes: AtomicUsize::new(0),
                dark: AtomicBool::new(false),
                scheme_writes: AtomicUsize::new(0),
            })
        }
    }

    impl NavigationSurface for MockSurface {
        fn user_agent(&self) -> String {
            self.user_agent.lock().unwrap().clone()
        }

        fn set_user_agent(&self, user_agent: &str) {
            *self.user_agent.lock().unwrap() = user_agent.to_string();
            self.ua_writes.fetch_add(1, Ordering::SeqCst);
        }

        fn set_preferred_color_scheme(&self, dark: bool) {
            self.dark.store(dark, Ordering::SeqCst);
            self.scheme_writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gate_with(surface: Arc<MockSurface>, dark: bool) -> NavigationGate {
        let (_tx, rx) = watch::channel(ThemeState {
            mode: ThemeMode::FollowSystem,
            is_dark: dark,
        });
        // The sender side is dropped; the receiver keeps the last value.
        let mut gate = NavigationGate::new(
            surface,
            rx,
            LifecycleGuard::new(),
            "LexiPane/0.1".to_string(),
        );
        gate.add_rule(NavigationRedirect::bing_welcome());
        gate
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_welcome_redirect_consumes_pending_query() {
        let gate = gate_with(MockSurface::new("Mozilla/5.0"), false);
        gate.set_pending_query("hello");

        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(
            decision,
            NavigationDecision::Redirect(url("https://cn.bing.com/dict/search?q=hello"))
        );

        // Consumed: the same welcome URL now proceeds.
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(decision, NavigationDecision::Proceed);
    }

    #[test]
    fn test_pending_query_is_form_encoded() {
        let gate = gate_with(MockSurface::new("Mozilla/5.0"), false);
        gate.set_pending_query("rust lang");
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(
            decision,
            NavigationDecision::Redirect(url("https://cn.bing.com/dict/search?q=rust+lang"))
        );
    }

    #[test]
    fn test_cleared_pending_query_is_not_consumed() {
        let gate = gate_with(MockSurface::new("Mozilla/5.0"), false);
        gate.set_pending_query("hello");
        gate.clear_pending_query();
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(decision, NavigationDecision::Proceed);
    }

    #[test]
    fn test_welcome_without_pending_proceeds() {
        let surface = MockSurface::new("Mozilla/5.0");
        let gate = gate_with(Arc::clone(&surface), false);
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(decision, NavigationDecision::Proceed);
        // Default behavior still ran.
        assert_eq!(surface.scheme_writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_urls_are_not_welcome() {
        let gate = gate_with(MockSurface::new("Mozilla/5.0"), false);
        gate.set_pending_query("hello");
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/search?q=x"));
        assert_eq!(decision, NavigationDecision::Proceed);
    }

    #[test]
    fn test_user_agent_suffix_appended_once() {
        let surface = MockSurface::new("Mozilla/5.0");
        let gate = gate_with(Arc::clone(&surface), false);

        gate.on_navigation_starting(&url("https://dict.youdao.com/"));
        gate.on_navigation_starting(&url("https://dict.baidu.com/"));

        assert_eq!(surface.user_agent(), "Mozilla/5.0 LexiPane/0.1");
        assert_eq!(surface.ua_writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_initial_user_agent_gets_bare_suffix() {
        let surface = MockSurface::new("");
        let gate = gate_with(Arc::clone(&surface), false);
        gate.on_navigation_starting(&url("https://dict.youdao.com/"));
        assert_eq!(surface.user_agent(), "LexiPane/0.1");
    }

    #[test]
    fn test_color_scheme_follows_theme_snapshot() {
        let surface = MockSurface::new("Mozilla/5.0");
        let gate = gate_with(Arc::clone(&surface), true);
        gate.on_navigation_starting(&url("https://dict.youdao.com/"));
        assert!(surface.dark.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_short_circuits() {
        let surface = MockSurface::new("Mozilla/5.0");
        let gate = gate_with(Arc::clone(&surface), false);
        gate.lifecycle.mark_shutting_down();

        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(decision, NavigationDecision::Proceed);
        assert_eq!(surface.ua_writes.load(Ordering::SeqCst), 0);
        assert_eq!(surface.scheme_writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_rule_fails_open() {
        let surface = MockSurface::new("Mozilla/5.0");
        let mut gate = gate_with(Arc::clone(&surface), false);
        gate.add_rule(NavigationRedirect::new(
            |_| panic!("rule blew up"),
            |_, _| None,
        ));

        // Silence the expected panic's backtrace output.
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let decision = gate.on_navigation_starting(&url("https://dict.youdao.com/"));
        std::panic::set_hook(previous);

        assert_eq!(decision, NavigationDecision::Proceed);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let surface = MockSurface::new("Mozilla/5.0");
        let mut gate = gate_with(Arc::clone(&surface), false);
        // A later catch-all must never shadow the earlier welcome rule.
        gate.add_rule(NavigationRedirect::new(
            |_| true,
            |_, _| Url::parse("https://example.com/shadow").ok(),
        ));
        gate.set_pending_query("hello");
        let decision = gate.on_navigation_starting(&url("https://cn.bing.com/dict/"));
        assert_eq!(
            decision,
            NavigationDecision::Redirect(url("https://cn.bing.com/dict/search?q=hello"))
        );
    }
}
