//! Module-resolution hooks.
//!
//! The bundling engine consults an ordered [`HookChain`]. Each hook either
//! claims a specifier or passes it on:
//!
//! - [`VirtualModuleProvider`] serves the entry source and any in-memory
//!   auxiliary files, without touching a filesystem.
//! - [`LibraryResolver`] turns package specifiers into content-delivery URLs,
//!   marked external.

use crate::autofix::{ensure_default_import, RUNTIME_DEFAULT, RUNTIME_MODULE};
use crate::cdn::{CdnResolver, UrlOptions, DEFAULT_VERSION};
use crate::config::{CompilerConfig, ResolveMode};
use crate::edits::apply_edits;
use crate::imports::{is_relative, is_url, package_name, split_version, ALIAS_PREFIXES};
use crate::parse::recover_source;
use crate::scope::SourceAnalysis;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An in-memory module the engine should load and compile.
    Module { id: String },
    /// Leave the import in place, pointing at `url`.
    External { url: String, warning: Option<String> },
    /// Not mine; ask the next hook.
    Pass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub id: String,
    pub source: String,
    pub filename: String,
}

#[async_trait]
pub trait ResolveHook: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution;

    async fn load(&self, _id: &str) -> Option<LoadedModule> {
        None
    }
}

#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn ResolveHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn ResolveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// First non-`Pass` answer, with the name of the hook that gave it.
    pub async fn resolve(&self, specifier: &str, importer: Option<&str>) -> Option<(String, Resolution)> {
        for hook in &self.hooks {
            match hook.resolve(specifier, importer).await {
                Resolution::Pass => continue,
                resolution => {
                    debug!(%specifier, hook = hook.name(), ?resolution, "resolved");
                    return Some((hook.name().to_string(), resolution));
                }
            }
        }
        None
    }

    pub async fn load(&self, id: &str) -> Option<LoadedModule> {
        for hook in &self.hooks {
            if let Some(module) = hook.load(id).await {
                return Some(module);
            }
        }
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIRTUAL MODULE PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

const SOURCE_EXTENSIONS: &[&str] = &[".tsx", ".ts", ".jsx", ".js", ".mjs"];

lazy_static! {
    /// Default imports of packages that only ship named exports.
    static ref SPECIFIER_REWRITES: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+(['"])react-dom/client(['"])"#).unwrap(),
            "import * as $1 from ${2}react-dom/client$3",
        ),
        (
            Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+(['"])lodash-es(['"])"#).unwrap(),
            "import * as $1 from ${2}lodash-es$3",
        ),
        (
            Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+(['"])three(['"])"#).unwrap(),
            "import * as $1 from ${2}three$3",
        ),
        (
            Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+(['"])d3(['"])"#).unwrap(),
            "import * as $1 from ${2}d3$3",
        ),
        (
            Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+(['"])chart\.js(['"])"#).unwrap(),
            "import $1 from ${2}chart.js/auto$3",
        ),
    ];
}

/// Final text pass before the entry is handed to the engine.
pub fn prepare_source(source: &str, ensure_runtime_import: bool) -> String {
    let mut out = source.to_string();
    for (pattern, replacement) in SPECIFIER_REWRITES.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    if ensure_runtime_import {
        out = with_runtime_import(out);
    }
    out
}

/// Bind the runtime default as a value import unless something already does.
///
/// Decided on the parsed module. Source that only parses after a rewriting
/// recovery is checked on the recovered text and gets the import prepended,
/// which the wrapping strategy hoists back out of the component body.
fn with_runtime_import(source: String) -> String {
    match SourceAnalysis::analyze(&source, "entry.tsx") {
        Ok(analysis) => {
            if analysis.is_bound(RUNTIME_DEFAULT) {
                return source;
            }
            let edit = ensure_default_import(&analysis, RUNTIME_MODULE, RUNTIME_DEFAULT);
            apply_edits(&source, &[edit])
        }
        Err(_) => {
            let bound = recover_source(&source, "entry.tsx")
                .and_then(|(text, _)| SourceAnalysis::analyze(&text, "entry.tsx").ok())
                .map(|analysis| analysis.is_bound(RUNTIME_DEFAULT))
                .unwrap_or(false);
            if bound {
                source
            } else {
                format!("import {} from '{}';\n{}", RUNTIME_DEFAULT, RUNTIME_MODULE, source)
            }
        }
    }
}

pub struct VirtualModuleProvider {
    entry_specifier: String,
    entry_source: String,
    files: HashMap<String, String>,
}

impl VirtualModuleProvider {
    pub fn new(entry_specifier: &str, entry_source: &str) -> Self {
        Self {
            entry_specifier: entry_specifier.to_string(),
            entry_source: entry_source.to_string(),
            files: HashMap::new(),
        }
    }

    /// Register an auxiliary in-memory file, keyed by its path relative to the entry.
    pub fn with_file(mut self, path: &str, source: &str) -> Self {
        self.files.insert(normalize_path(path), source.to_string());
        self
    }

    pub fn entry_filename(&self) -> String {
        self.entry_specifier
            .rsplit(':')
            .next()
            .unwrap_or(&self.entry_specifier)
            .to_string()
    }

    fn lookup(&self, path: &str) -> Option<String> {
        if self.files.contains_key(path) {
            return Some(path.to_string());
        }
        for ext in SOURCE_EXTENSIONS {
            let candidate = format!("{}{}", path, ext);
            if self.files.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        for ext in SOURCE_EXTENSIONS {
            let candidate = format!("{}/index{}", path, ext);
            if self.files.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl ResolveHook for VirtualModuleProvider {
    fn name(&self) -> &str {
        "virtual-module"
    }

    async fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution {
        if specifier == self.entry_specifier {
            return Resolution::Module {
                id: self.entry_specifier.clone(),
            };
        }
        if !is_relative(specifier) || self.files.is_empty() {
            return Resolution::Pass;
        }

        let base = match importer {
            Some(id) if id != self.entry_specifier => id,
            _ => "",
        };
        let joined = join_paths(base, specifier);
        match self.lookup(&joined) {
            Some(id) => Resolution::Module { id },
            None => Resolution::Pass,
        }
    }

    async fn load(&self, id: &str) -> Option<LoadedModule> {
        if id == self.entry_specifier {
            return Some(LoadedModule {
                id: id.to_string(),
                source: prepare_source(&self.entry_source, true),
                filename: self.entry_filename(),
            });
        }
        self.files.get(id).map(|source| LoadedModule {
            id: id.to_string(),
            source: prepare_source(source, false),
            filename: id.to_string(),
        })
    }
}

fn normalize_path(path: &str) -> String {
    join_paths("", path)
}

/// Resolve `relative` against the directory of `base`. Both are slash-separated
/// paths without a leading slash.
fn join_paths(base: &str, relative: &str) -> String {
    let base_dir = match base.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };

    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIBRARY RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref BUILTIN_MODULES: HashSet<&'static str> = [
        "fs", "path", "os", "crypto", "child_process", "http", "https", "url", "util",
        "stream", "events", "buffer", "zlib", "net", "tls",
    ]
    .into_iter()
    .collect();
}

pub fn is_builtin(specifier: &str) -> bool {
    specifier.starts_with("node:") || BUILTIN_MODULES.contains(specifier)
}

pub struct LibraryResolver {
    cdn: Arc<CdnResolver>,
    mode: ResolveMode,
    react_version: String,
    versions: HashMap<String, String>,
}

impl LibraryResolver {
    pub fn new(cdn: Arc<CdnResolver>, config: &CompilerConfig, libraries: &[String]) -> Self {
        let versions = libraries
            .iter()
            .filter_map(|hint| {
                let (name, version) = split_version(hint);
                version.map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        Self {
            cdn,
            mode: config.resolve_mode,
            react_version: config.react_version.clone(),
            versions,
        }
    }

    /// The runtime packages are pinned so every library shares one instance.
    fn special_case(&self, specifier: &str) -> Option<String> {
        let v = &self.react_version;
        let url = match specifier {
            "react" => format!("https://esm.sh/react@{}", v),
            "react-dom" => format!("https://esm.sh/react-dom@{}", v),
            "react-dom/client" => format!("https://esm.sh/react-dom@{}/client", v),
            "react/jsx-runtime" => format!("https://esm.sh/react@{}/jsx-runtime", v),
            "react/jsx-dev-runtime" => format!("https://esm.sh/react@{}/jsx-dev-runtime", v),
            _ => return None,
        };
        Some(url)
    }

    fn version_for(&self, specifier: &str) -> String {
        self.versions
            .get(&package_name(specifier))
            .cloned()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string())
    }

    fn with_shared_runtime(&self, url: String) -> String {
        if !url.starts_with("https://esm.sh/") {
            return url;
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}deps=react@{v},react-dom@{v}",
            url,
            separator,
            v = self.react_version
        )
    }
}

#[async_trait]
impl ResolveHook for LibraryResolver {
    fn name(&self) -> &str {
        "library"
    }

    async fn resolve(&self, specifier: &str, _importer: Option<&str>) -> Resolution {
        if is_relative(specifier) || is_url(specifier) || is_builtin(specifier) {
            return Resolution::External {
                url: specifier.to_string(),
                warning: None,
            };
        }
        if specifier.starts_with("virtual:") {
            return Resolution::Pass;
        }
        if ALIAS_PREFIXES.iter().any(|p| specifier.starts_with(p)) {
            return Resolution::External {
                url: specifier.to_string(),
                warning: Some(format!(
                    "Internal alias '{}' has no source in this compilation; left as-is",
                    specifier
                )),
            };
        }

        if let Some(url) = self.special_case(specifier) {
            return Resolution::External { url, warning: None };
        }

        let version = self.version_for(specifier);
        match self.mode {
            ResolveMode::Offline => {
                let url = self
                    .cdn
                    .get_package_url(specifier, &version, UrlOptions::default());
                Resolution::External {
                    url: self.with_shared_runtime(url),
                    warning: None,
                }
            }
            ResolveMode::Verify => {
                let fetched = self.cdn.fetch_package(specifier, &version).await;
                match fetched.url {
                    Some(url) if fetched.success => Resolution::External {
                        url: self.with_shared_runtime(url),
                        warning: None,
                    },
                    _ => {
                        let error = fetched.error.unwrap_or_default();
                        warn!(%specifier, %error, "CDN resolution failed, linking preferred provider URL");
                        let url = self.cdn.get_package_url(specifier, &version, UrlOptions::default());
                        Resolution::External {
                            url: self.with_shared_runtime(url),
                            warning: Some(format!(
                                "Could not verify '{}' on any CDN provider: {}",
                                specifier, error
                            )),
                        }
                    }
                }
            }
        }
    }
}
