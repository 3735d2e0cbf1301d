//! Compile options (per request) and compiler configuration (per process).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    #[default]
    Js,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsxMode {
    #[default]
    Automatic,
    Classic,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    Esm,
    Cjs,
    Iife,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub target: String,
    pub format: ModuleFormat,
    #[serde(alias = "jsxMode")]
    pub jsx: JsxMode,
    pub minify: bool,
    pub source_map: bool,
    pub output_type: OutputType,
    pub format_code: bool,
    pub enable_auto_fix: bool,
    pub enable_import_fix: bool,
    pub auto_fix_attempts: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: "es2020".to_string(),
            format: ModuleFormat::Esm,
            jsx: JsxMode::Automatic,
            minify: false,
            source_map: false,
            output_type: OutputType::Js,
            format_code: true,
            enable_auto_fix: true,
            enable_import_fix: false,
            auto_fix_attempts: 2,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESS CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnProvider {
    pub name: String,
    /// URL template with `{package}`, `{version}` and `{subpath}` placeholders.
    pub url_template: String,
}

impl CdnProvider {
    pub fn new(name: &str, url_template: &str) -> Self {
        Self {
            name: name.to_string(),
            url_template: url_template.to_string(),
        }
    }
}

pub fn default_providers() -> Vec<CdnProvider> {
    vec![
        CdnProvider::new("esm.sh", "https://esm.sh/{package}@{version}{subpath}"),
        CdnProvider::new(
            "jsdelivr",
            "https://cdn.jsdelivr.net/npm/{package}@{version}{subpath}/+esm",
        ),
        CdnProvider::new("unpkg", "https://unpkg.com/{package}@{version}{subpath}?module"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Fetch every package through the provider chain before linking it.
    Verify,
    /// Template substitution only. No network.
    Offline,
}

impl std::str::FromStr for ResolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verify" => Ok(ResolveMode::Verify),
            "offline" => Ok(ResolveMode::Offline),
            other => Err(format!("unknown resolve mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub providers: Vec<CdnProvider>,
    pub preferred_provider: String,
    pub fetch_timeout: Duration,
    pub resolve_mode: ResolveMode,
    pub react_version: String,
    pub entry_specifier: String,
    /// Maximum number of cached compile results. Zero disables the cache.
    pub compile_cache_size: u64,
    pub compile_cache_ttl: Duration,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            preferred_provider: "esm.sh".to_string(),
            fetch_timeout: Duration::from_millis(10_000),
            resolve_mode: ResolveMode::Verify,
            react_version: "18.2.0".to_string(),
            entry_specifier: "virtual:component.tsx".to_string(),
            compile_cache_size: 1000,
            compile_cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl CompilerConfig {
    /// Defaults overridden by `TSX_HEAL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(provider) = lookup("TSX_HEAL_CDN_PROVIDER") {
            if config.providers.iter().any(|p| p.name == provider) {
                config.preferred_provider = provider;
            } else {
                warn!(%provider, "unknown CDN provider, keeping default");
            }
        }

        if let Some(ms) = lookup("TSX_HEAL_FETCH_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(ms) if ms > 0 => config.fetch_timeout = Duration::from_millis(ms),
                _ => warn!(value = %ms, "invalid fetch timeout, keeping default"),
            }
        }

        if let Some(mode) = lookup("TSX_HEAL_RESOLVE_MODE") {
            match mode.parse() {
                Ok(mode) => config.resolve_mode = mode,
                Err(e) => warn!(error = %e, "keeping default resolve mode"),
            }
        }

        if let Some(size) = lookup("TSX_HEAL_CACHE_SIZE") {
            match size.parse::<u64>() {
                Ok(size) => config.compile_cache_size = size,
                Err(_) => warn!(value = %size, "invalid compile cache size, keeping default"),
            }
        }

        if let Some(secs) = lookup("TSX_HEAL_CACHE_TTL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.compile_cache_ttl = Duration::from_secs(secs),
                _ => warn!(value = %secs, "invalid compile cache ttl, keeping default"),
            }
        }

        if let Some(version) = lookup("TSX_HEAL_REACT_VERSION") {
            if !version.trim().is_empty() {
                config.react_version = version.trim().to_string();
            }
        }

        config
    }

    pub fn offline(mut self) -> Self {
        self.resolve_mode = ResolveMode::Offline;
        self
    }
}
