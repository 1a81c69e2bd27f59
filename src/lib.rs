//! # LexiPane — Pipeline d'interception pour surfaces dictionnaire
//!
//! Bibliothèque d'interception de requêtes et de réécriture de contenu pour
//! une surface navigateur embarquée qui affiche des pages de dictionnaire
//! tierces : masquage du chrome étranger, apparence sombre/claire cohérente
//! avec l'hôte, redirection de certaines URL avant chargement.
//!
//! ## Architecture des modules
//!
//! - [`session`] : Assemblage par session — construit et relie les
//!   composants, expose les points de branchement vers le moteur hôte.
//!
//! - [`intercept`] : Cœur du pipeline — claim du deferral, fetch hors-bande,
//!   réécriture, réponse synthétique. La libération exactement-une-fois du
//!   deferral est portée par un garde RAII.
//!
//! - [`rules`] : Table (suffixe d'hôte, type de ressource) → règle de
//!   réécriture. Données plutôt que gestionnaires dupliqués ; fournit aussi
//!   les filtres d'enregistrement du moteur hôte.
//!
//! - [`rewrite`] : Transformations pures octets → octets — injection d'un
//!   bloc `<style>` dans les documents, appension d'overrides aux feuilles
//!   de style.
//!
//! - [`fetch`] : Fetch HTTP hors-bande borné par timeout, via `reqwest`
//!   avec décompression automatique.
//!
//! - [`theme`] : Coordination du thème — une tâche propriétaire de l'état,
//!   debounce des événements système, propagation best-effort par cookies
//!   et script de page.
//!
//! - [`navigate`] : Garde de navigation — redirection première-règle-gagne
//!   ou comportement par défaut (suffixe UA, color-scheme). Fail-open.
//!
//! - [`config`] : Configuration TOML avec defaults complets (mode de thème,
//!   timeouts de fetch, suffixe user-agent).
//!
//! - [`lifecycle`] : Drapeau d'arrêt par session consulté en tête de chaque
//!   chemin d'interception.
//!
//! ## Modules futurs (non implémentés)
//!
//! - `cache` : Cache disque des assets auxiliaires (imagerie de la phrase
//!   du jour)
//! - `script_rules` : Règles de réécriture par script fournies par l'hôte

pub mod config;
pub mod fetch;
pub mod intercept;
pub mod lifecycle;
pub mod navigate;
pub mod rewrite;
pub mod rules;
pub mod session;
pub mod theme;
