//! Coordination du thème — propriétaire unique de l'état sombre/clair.
//!
//! Une seule tâche possède [`ThemeState`] ; tout le reste du pipeline lit des
//! instantanés via un canal `watch` et ne voit donc jamais d'état
//! intermédiaire. Les événements de thème système arrivent en rafales sur
//! certains hôtes : ils sont debouncés (front descendant, seule la dernière
//! valeur survit), tandis que les bascules explicites de mode s'appliquent
//! immédiatement.
//!
//! Quand la valeur sombre effective change, la tâche propage vers les pages
//! suivies : un cookie de thème par domaine (expiration un an) puis un script
//! dans la page chargée. Les deux propagations sont best-effort, leurs échecs
//! sont consignés en debug et avalés.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ThemeConfig;

/// Durée de vie des cookies de thème.
const COOKIE_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Nom du cookie lu par les pages dictionnaire suivies.
const THEME_COOKIE_NAME: &str = "app_theme";

/// Durée maximale accordée à un script de propagation avant abandon.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Clés de stockage local sous lesquelles les pages suivies cherchent la
/// valeur de thème.
const STORAGE_KEYS: [&str; 3] = ["theme", "app_theme", "color_mode"];

/// Mode de thème demandé (fichier de configuration ou bascule de l'hôte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Suivre le thème effectif du système hôte (`"default"` dans le TOML).
    #[serde(rename = "default")]
    FollowSystem,
    /// Thème clair forcé, les événements système sont ignorés.
    Light,
    /// Thème sombre forcé, les événements système sont ignorés.
    Dark,
}

impl ThemeMode {
    /// Valeur sombre effective pour ce mode, étant donné l'état système.
    pub fn resolve(self, system_dark: bool) -> bool {
        match self {
            ThemeMode::FollowSystem => system_dark,
            ThemeMode::Light => false,
            ThemeMode::Dark => true,
        }
    }
}

/// Instantané cohérent du thème : le mode demandé et la valeur résolue.
///
/// Publié en bloc par le coordinateur, un lecteur voit soit l'ancien état,
/// soit le nouveau.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeState {
    pub mode: ThemeMode,
    pub is_dark: bool,
}

/// Échec best-effort d'une propagation (page détruite, navigation en cours…).
#[derive(Debug)]
pub struct PropagationError(pub String);

impl std::fmt::Display for PropagationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PropagationError {}

/// Cookie de thème écrit sur chaque domaine suivi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Domaine avec point de tête (`.youdao.com`) pour couvrir les
    /// sous-domaines.
    pub domain: String,
    pub path: String,
    pub expires: SystemTime,
}

/// Gestionnaire de cookies du moteur hôte.
pub trait CookieStore: Send + Sync {
    /// Crée ou remplace le cookie. L'échec est consigné puis avalé côté
    /// coordinateur.
    fn add_or_update(&self, cookie: Cookie) -> BoxFuture<'static, Result<(), PropagationError>>;
}

/// Exécution de script dans la page actuellement chargée par la surface.
pub trait PageScripting: Send + Sync {
    fn execute_script(&self, js: &str) -> BoxFuture<'static, Result<(), PropagationError>>;
}

/// Commandes reçues par la tâche coordinatrice.
#[derive(Debug)]
enum ThemeCommand {
    /// Le thème effectif du système hôte a changé (debouncé).
    SystemThemeChanged { is_dark: bool },
    /// Bascule explicite de mode (appliquée immédiatement).
    SetMode(ThemeMode),
}

/// Poignée clonable vers le coordinateur de thème.
#[derive(Clone)]
pub struct ThemeHandle {
    tx: mpsc::UnboundedSender<ThemeCommand>,
    state: watch::Receiver<ThemeState>,
}

impl ThemeHandle {
    /// Instantané de l'état courant.
    pub fn snapshot(&self) -> ThemeState {
        *self.state.borrow()
    }

    /// Abonnement pour les lecteurs du pipeline (intercepteur, garde de
    /// navigation).
    pub fn subscribe(&self) -> watch::Receiver<ThemeState> {
        self.state.clone()
    }

    /// Signale un changement du thème effectif du système hôte. L'événement
    /// sera debouncé par le coordinateur.
    pub fn notify_system_theme_changed(&self, is_dark: bool) {
        if self
            .tx
            .send(ThemeCommand::SystemThemeChanged { is_dark })
            .is_err()
        {
            debug!("Coordinateur de thème arrêté, notification système ignorée");
        }
    }

    /// Bascule explicite de mode, appliquée sans fenêtre de debounce.
    pub fn set_mode(&self, mode: ThemeMode) {
        if self.tx.send(ThemeCommand::SetMode(mode)).is_err() {
            debug!("Coordinateur de thème arrêté, bascule de mode ignorée");
        }
    }
}

/// Propriétaire unique de [`ThemeState`]. Vit dans sa propre tâche, créée par
/// [`ThemeCoordinator::spawn`] ; la tâche se termine quand toutes les
/// [`ThemeHandle`] sont détruites.
pub struct ThemeCoordinator {
    state: ThemeState,
    /// Dernière valeur sombre rapportée par le système, même en mode forcé
    /// (un retour à [`ThemeMode::FollowSystem`] doit la retrouver).
    system_dark: bool,
    debounce: Duration,
    tracked_domains: Vec<String>,
    cookies: Arc<dyn CookieStore>,
    scripting: Arc<dyn PageScripting>,
    publish: watch::Sender<ThemeState>,
}

impl ThemeCoordinator {
    /// Démarre la tâche coordinatrice et rend sa poignée. Doit être appelé
    /// dans un contexte de runtime Tokio.
    pub fn spawn(
        config: &ThemeConfig,
        initial_system_dark: bool,
        tracked_domains: Vec<String>,
        cookies: Arc<dyn CookieStore>,
        scripting: Arc<dyn PageScripting>,
    ) -> ThemeHandle {
        let mode = config.mode;
        let initial = ThemeState {
            mode,
            is_dark: mode.resolve(initial_system_dark),
        };
        let (publish, state) = watch::channel(initial);
        let (tx, rx) = mpsc::unbounded_channel();

        let coordinator = ThemeCoordinator {
            state: initial,
            system_dark: initial_system_dark,
            debounce: Duration::from_millis(config.debounce_ms),
            tracked_domains,
            cookies,
            scripting,
            publish,
        };
        tokio::spawn(coordinator.run(rx));

        info!(?mode, is_dark = initial.is_dark, "Coordinateur de thème démarré");
        ThemeHandle { tx, state }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ThemeCommand>) {
        // Valeur système en attente pendant la fenêtre de debounce. Chaque
        // événement ré-arme la fenêtre, seule la dernière valeur survit.
        let mut pending: Option<bool> = None;
        let mut deadline = Instant::now();

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    None => break,
                    Some(ThemeCommand::SystemThemeChanged { is_dark }) => {
                        pending = Some(is_dark);
                        deadline = Instant::now() + self.debounce;
                    }
                    Some(ThemeCommand::SetMode(mode)) => {
                        // La bascule absorbe la valeur système en attente
                        // et annule la fenêtre en cours.
                        if let Some(system_dark) = pending.take() {
                            self.system_dark = system_dark;
                        }
                        self.state.mode = mode;
                        self.apply(mode.resolve(self.system_dark)).await;
                    }
                },
                _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                    if let Some(system_dark) = pending.take() {
                        self.system_dark = system_dark;
                        self.apply(self.state.mode.resolve(system_dark)).await;
                    }
                }
            }
        }
        debug!("Tâche de coordination du thème terminée");
    }

    /// Publie le nouvel instantané, puis propage vers les pages seulement si
    /// la valeur sombre effective a changé (idempotence).
    async fn apply(&mut self, new_dark: bool) {
        let changed = new_dark != self.state.is_dark;
        self.state.is_dark = new_dark;
        self.publish.send_replace(self.state);

        if !changed {
            debug!(is_dark = new_dark, "Valeur de thème inchangée, propagation sautée");
            return;
        }

        info!(is_dark = new_dark, "Thème effectif changé, propagation vers les pages");
        self.write_cookies(new_dark).await;
        self.run_page_script(new_dark);
    }

    /// Écrit le cookie de thème sur chaque domaine suivi.
    async fn write_cookies(&self, is_dark: bool) {
        let expires = SystemTime::now() + COOKIE_MAX_AGE;
        let value = theme_value(is_dark);
        for domain in &self.tracked_domains {
            let cookie = Cookie {
                name: THEME_COOKIE_NAME.to_string(),
                value: value.to_string(),
                domain: format!(".{domain}"),
                path: "/".to_string(),
                expires,
            };
            if let Err(error) = self.cookies.add_or_update(cookie).await {
                debug!(%error, domain, "Écriture du cookie de thème échouée, ignorée");
            }
        }
    }

    /// Pousse la nouvelle valeur dans la page chargée. Détaché et borné :
    /// une page suspendue ne doit pas bloquer la coordination.
    fn run_page_script(&self, is_dark: bool) {
        let js = build_theme_script(is_dark);
        let scripting = Arc::clone(&self.scripting);
        tokio::spawn(async move {
            match tokio::time::timeout(SCRIPT_TIMEOUT, scripting.execute_script(&js)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => debug!(%error, "Script de thème échoué, ignoré"),
                Err(_) => debug!("Script de thème expiré, ignoré"),
            }
        });
    }
}

/// Valeur textuelle stockée côté page.
fn theme_value(is_dark: bool) -> &'static str {
    if is_dark { "dark" } else { "light" }
}

/// Construit le script poussant la valeur dans la page : clés de stockage
/// local, attribut `data-theme`, puis hook optionnel si la page en expose un.
/// Chaque étape est isolée dans son propre try/catch.
pub fn build_theme_script(is_dark: bool) -> String {
    let value = theme_value(is_dark);
    let mut js = String::from("(function () {\n");
    for key in STORAGE_KEYS {
        js.push_str(&format!(
            "  try {{ localStorage.setItem('{key}', '{value}'); }} catch (e) {{}}\n"
        ));
    }
    js.push_str(&format!(
        "  try {{ document.documentElement.setAttribute('data-theme', '{value}'); }} catch (e) {{}}\n"
    ));
    js.push_str(&format!(
        "  try {{ if (typeof window.__onAppThemeChanged === 'function') {{ window.__onAppThemeChanged('{value}'); }} }} catch (e) {{}}\n"
    ));
    js.push_str("})();");
    js
}
