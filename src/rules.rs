//! Table de règles de réécriture.
//!
//! Registre data-driven des couples (suffixe d'hôte, type de ressource)
//! couverts par le pipeline : ajouter un domaine dictionnaire suivi est un
//! changement de données, pas un nouveau gestionnaire d'événement. La table
//! est construite une fois par session puis uniquement consultée ; elle sert
//! aussi de source aux filtres d'enregistrement du moteur hôte et aux
//! domaines cibles des cookies de thème.

use tracing::info;
use url::Url;

use crate::rewrite;
use crate::theme::ThemeState;

// ─────────────────────────────────────────────────────────────────────────────
// Règles de masquage par domaine
// ─────────────────────────────────────────────────────────────────────────────

/// Masquage youdao : bannière, navigation et encarts publicitaires autour
/// du résultat de dictionnaire.
const YOUDAO_HIDE_CSS: &str = "\
#topImgAd, .top-banner, .dict-nav, .search-wrapper, .side-ads, .fanyi-banner, footer { display: none !important; }";

/// Masquage bing : chrome de recherche et promotions autour du panneau
/// dictionnaire.
const BING_HIDE_CSS: &str = "\
#b_header, #b_footer, .b_scopebar, #b_promoteRight, .sb_ad { display: none !important; }";

/// Masquage baidu : en-tête, barre de navigation et publicités latérales.
const BAIDU_HIDE_CSS: &str = "\
#header, .nav-bar, .banner-ad, .aside-wrapper, #footer { display: none !important; }";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Type de ressource interceptée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Document,
    Stylesheet,
}

impl ResourceKind {
    /// En-tête Content-Type de la réponse synthétique pour ce type.
    pub fn content_type(self) -> &'static str {
        match self {
            ResourceKind::Document => "text/html; charset=utf-8",
            ResourceKind::Stylesheet => "text/css; charset=utf-8",
        }
    }
}

/// Règle de réécriture pour un couple (suffixe d'hôte, type de ressource).
pub struct RewriteRule {
    /// Suffixe de domaine : `youdao.com` couvre aussi `dict.youdao.com`.
    pub host_suffix: String,
    pub kind: ResourceKind,
    /// Règles CSS de masquage propres au domaine.
    pub hide_css: String,
}

impl RewriteRule {
    pub fn new(
        host_suffix: impl Into<String>,
        kind: ResourceKind,
        hide_css: impl Into<String>,
    ) -> Self {
        Self {
            host_suffix: host_suffix.into(),
            kind,
            hide_css: hide_css.into(),
        }
    }

    /// Applique la transformation au contenu récupéré. Fonction pure : le
    /// thème est lu depuis l'instantané passé, jamais depuis un état global.
    pub fn apply(&self, input: &[u8], theme: &ThemeState) -> Vec<u8> {
        match self.kind {
            ResourceKind::Document => {
                rewrite::rewrite_document(input, &self.hide_css, theme.is_dark)
            }
            ResourceKind::Stylesheet => {
                rewrite::rewrite_stylesheet(input, &self.hide_css, theme.is_dark)
            }
        }
    }
}

/// Filtre d'enregistrement à fournir au moteur hôte pour qu'il ne lève des
/// événements d'interception que sur les couples suivis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptFilter {
    /// Motif d'URL au format wildcard du moteur hôte.
    pub url_pattern: String,
    pub kind: ResourceKind,
}

// ─────────────────────────────────────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────────────────────────────────────

/// Table immuable après construction, consultée à chaque requête.
#[derive(Default)]
pub struct RuleTable {
    rules: Vec<RewriteRule>,
}

impl RuleTable {
    /// Table vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table des domaines dictionnaire suivis par l'application : documents
    /// et feuilles de style de youdao, bing et baidu.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (suffix, hide_css) in [
            ("youdao.com", YOUDAO_HIDE_CSS),
            ("bing.com", BING_HIDE_CSS),
            ("baidu.com", BAIDU_HIDE_CSS),
        ] {
            table.push(RewriteRule::new(suffix, ResourceKind::Document, hide_css));
            table.push(RewriteRule::new(suffix, ResourceKind::Stylesheet, hide_css));
        }
        info!(rules = table.len(), "Table de réécriture initialisée");
        table
    }

    /// Ajoute une règle. L'ordre d'insertion est l'ordre de consultation.
    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Première règle couvrant (hôte de l'URL, type), ou `None` si la
    /// requête n'est pas suivie.
    pub fn lookup(&self, url: &Url, kind: ResourceKind) -> Option<&RewriteRule> {
        let host = url.host_str()?;
        self.rules
            .iter()
            .find(|rule| rule.kind == kind && host_matches(host, &rule.host_suffix))
    }

    /// Domaines suivis, dédupliqués dans l'ordre d'enregistrement. Cibles
    /// des cookies de thème.
    pub fn tracked_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !domains.iter().any(|d| d == &rule.host_suffix) {
                domains.push(rule.host_suffix.clone());
            }
        }
        domains
    }

    /// Filtres (motif d'URL, type) à enregistrer auprès du moteur hôte.
    /// Deux motifs par règle, l'apex et ses sous-domaines : la couverture
    /// d'enregistrement doit être exactement celle de la consultation.
    pub fn filters(&self) -> Vec<InterceptFilter> {
        let mut filters = Vec::with_capacity(self.rules.len() * 2);
        for rule in &self.rules {
            for url_pattern in [
                format!("*://{}/*", rule.host_suffix),
                format!("*://*.{}/*", rule.host_suffix),
            ] {
                filters.push(InterceptFilter {
                    url_pattern,
                    kind: rule.kind,
                });
            }
        }
        filters
    }
}

/// Vrai si `host` est exactement `suffix` ou un sous-domaine de `suffix`.
/// `notyoudao.com` ne matche pas `youdao.com`.
fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix
        || (host.len() > suffix.len()
            && host.ends_with(suffix)
            && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
}
