//! TOML-based configuration system.
//!
//! Loads settings from a `lexipane.toml` file, falling back to sensible
//! defaults that match the built-in behavior. Every struct implements
//! `Default` so a missing or partial config file produces the same pipeline
//! as no file at all. The library only ever reads configuration; it never
//! writes files back.
//!
//! ## Config file search order
//!
//! 1. `LEXIPANE_CONFIG` environment variable (explicit override)
//! 2. Next to the executable (`<exe_dir>/lexipane.toml`)
//! 3. Platform config directory (`%APPDATA%\LexiPane\lexipane.toml` on Windows)
//! 4. Current working directory (`./lexipane.toml`)
//! 5. No file found → `Config::default()`

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rules::ResourceKind;
use crate::theme::ThemeMode;

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: ThemeConfig,
    pub fetch: FetchConfig,
    pub navigation: NavigationConfig,
}

/// Theme coordination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Requested mode: `"default"` (follow the host system), `"light"` or
    /// `"dark"`.
    pub mode: ThemeMode,
    /// Debounce window for system theme-change events, in milliseconds.
    /// Host environments differ in how hard they stutter; tune this if
    /// theme flapping is observed.
    pub debounce_ms: u64,
}

/// Out-of-band fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for intercepted document and stylesheet fetches, in seconds.
    pub document_timeout_secs: u64,
    /// Timeout for auxiliary image-like assets, in seconds.
    pub auxiliary_timeout_secs: u64,
    /// User-agent sent on out-of-band fetches. Empty = built-in default.
    pub user_agent: String,
}

/// Navigation gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Identifying suffix appended (once) to the surface user-agent.
    /// Empty disables the stamp.
    pub user_agent_suffix: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Default impls
// ─────────────────────────────────────────────────────────────────────────────

// Config derives Default since all fields implement Default.
// (Other structs have custom defaults with non-zero values.)

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::FollowSystem,
            debounce_ms: 120,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            document_timeout_secs: 8,
            auxiliary_timeout_secs: 5,
            user_agent: String::new(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            user_agent_suffix: "LexiPane/0.1".to_string(),
        }
    }
}

impl FetchConfig {
    /// Effective timeout for an intercepted resource of the given kind.
    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Document | ResourceKind::Stylesheet => {
                Duration::from_secs(self.document_timeout_secs)
            }
        }
    }

    /// Effective timeout for auxiliary asset fetches.
    pub fn auxiliary_timeout(&self) -> Duration {
        Duration::from_secs(self.auxiliary_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Loads configuration from a TOML file. Never panics — returns defaults
    /// if no file is found or if parsing fails.
    pub fn load() -> Self {
        match find_config_path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        info!(path = %path.display(), "Configuration loaded");
                        config
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                        Config::default()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read config, using defaults");
                    Config::default()
                }
            },
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    }
}

/// Searches for a config file in the standard locations.
fn find_config_path() -> Option<PathBuf> {
    // 1. Explicit env var override
    if let Ok(path) = std::env::var("LEXIPANE_CONFIG") {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    // 2. Next to the executable
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let p = dir.join("lexipane.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    // 3. Platform config directory
    let platform_dir = platform_config_dir();
    if let Some(dir) = platform_dir {
        let p = dir.join("lexipane.toml");
        if p.is_file() {
            return Some(p);
        }
    }

    // 4. Current working directory
    let p = PathBuf::from("lexipane.toml");
    if p.is_file() {
        return Some(p);
    }

    None
}

/// Returns the platform config directory without adding a dependency.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|appdata| PathBuf::from(appdata).join("LexiPane"))
    }
    #[cfg(not(windows))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .or_else(|| std::env::var("HOME").ok().map(|h| format!("{h}/.config")))
            .map(|dir| PathBuf::from(dir).join("lexipane"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let c = Config::default();
        assert_eq!(c.theme.mode, ThemeMode::FollowSystem);
        assert_eq!(c.theme.debounce_ms, 120);
        assert_eq!(c.fetch.document_timeout_secs, 8);
        assert_eq!(c.fetch.auxiliary_timeout_secs, 5);
        assert!(c.fetch.user_agent.is_empty());
        assert_eq!(c.navigation.user_agent_suffix, "LexiPane/0.1");
    }

    #[test]
    fn test_empty_toml_returns_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.theme.debounce_ms, 120);
        assert_eq!(config.fetch.document_timeout_secs, 8);
        assert_eq!(config.navigation.user_agent_suffix, "LexiPane/0.1");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
[fetch]
document_timeout_secs = 15
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetch.document_timeout_secs, 15);
        assert_eq!(config.fetch.auxiliary_timeout_secs, 5); // default
        assert_eq!(config.theme.debounce_ms, 120); // default
    }

    #[test]
    fn test_theme_mode_parses() {
        let toml = r#"
[theme]
mode = "dark"
debounce_ms = 50
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.theme.mode, ThemeMode::Dark);
        assert_eq!(config.theme.debounce_ms, 50);
    }

    #[test]
    fn test_full_toml_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.theme.mode, config.theme.mode);
        assert_eq!(
            deserialized.fetch.document_timeout_secs,
            config.fetch.document_timeout_secs
        );
        assert_eq!(
            deserialized.navigation.user_agent_suffix,
            config.navigation.user_agent_suffix
        );
    }

    #[test]
    fn test_timeout_mapping() {
        let fetch = FetchConfig::default();
        assert_eq!(
            fetch.timeout_for(ResourceKind::Document),
            Duration::from_secs(8)
        );
        assert_eq!(
            fetch.timeout_for(ResourceKind::Stylesheet),
            Duration::from_secs(8)
        );
        assert_eq!(fetch.auxiliary_timeout(), Duration::from_secs(5));
    }
}
