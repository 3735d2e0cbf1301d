//! # Compilation Pipeline
//!
//! One request moves through a linear state machine:
//!
//! ```text
//! start → auto_fix → validate → import_fix → validate → final_validate
//!       → bundle → format → done
//! ```
//!
//! ## Invariants
//!
//! 1. **Gated repairs**: a repair stage's output replaces the last known-good
//!    source only if it re-parses. Otherwise the stage is rolled back and
//!    recorded as failed.
//! 2. **Rollback is never fatal**: a failed final validation discards every
//!    repair and bundles the original source, with a warning.
//! 3. **Only bundling fails a request**: repair and formatting problems are
//!    warnings. A bundling error yields `success: false` with no artifact.
//!
//! Source that only parses after a rewriting recovery (stripped types, or the
//! component-function wrapper) is repaired in its recovered form. Successful
//! results are cached by a hash of the request.

use crate::autofix::AutoFixer;
use crate::bundle::{pretty_print, BundleEngine, BundleOptions, BundleOutput, OxcBundler};
use crate::cache::{compile_key, short_hash, CdnStats, CompileCache};
use crate::cdn::{CdnResolver, FetchError, HttpFetcher, PackageFetcher};
use crate::config::{CompileOptions, CompilerConfig, OutputType};
use crate::diagnostics::{describe, ErrorDetails};
use crate::document::{detect_component_name, render_document};
use crate::imports::{is_bare_specifier, package_name, split_version};
use crate::normalize::{fix_imports, ImportFixOptions};
use crate::parse::recover_source;
use crate::report::{FixRecord, ReportWarning, RepairReport, StageRecord};
use crate::resolve::{HookChain, LibraryResolver, VirtualModuleProvider};
use crate::validate::{inspect_code, validate_source, CodeInspection, CompilerError, ERR_PARSE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// ENVELOPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    #[serde(alias = "code")]
    pub source: String,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub options: CompileOptions,
    /// Auxiliary in-memory modules keyed by path relative to the entry.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl CompileRequest {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFixSummary {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixes_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixes: Option<Vec<FixRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<ReportWarning>>,
}

impl AutoFixSummary {
    fn from_report(report: &RepairReport, applied: bool) -> Self {
        if report.stages.is_empty() {
            return Self::default();
        }
        Self {
            applied,
            fixes_count: Some(report.accepted_fixes()),
            fixes: Some(report.fixes.clone()),
            stages: Some(report.stages.clone()),
            warnings: Some(report.warnings.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    pub dependencies: Vec<String>,
    pub assets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
    pub auto_fix: AutoFixSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub output_type: OutputType,
    /// Served from the compile cache.
    #[serde(default)]
    pub cached: bool,
}

impl CompileResponse {
    fn failure(error: &CompilerError, source: &str, output_type: OutputType) -> Self {
        Self {
            success: false,
            error: Some(error.message.clone()),
            error_details: Some(describe(error, source)),
            output_type,
            ..Self::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPAIR STAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub code: String,
    pub fixes: Vec<FixRecord>,
    pub errors: Vec<String>,
    pub warnings: Vec<ReportWarning>,
}

pub trait RepairStage: Send + Sync {
    fn name(&self) -> &str;
    fn repair(&self, source: &str, filename: &str) -> StageOutput;
}

pub struct AutoFixStage {
    fixer: AutoFixer,
}

impl AutoFixStage {
    pub fn new(max_fix_attempts: usize) -> Self {
        Self {
            fixer: AutoFixer::new(max_fix_attempts),
        }
    }
}

impl RepairStage for AutoFixStage {
    fn name(&self) -> &str {
        "auto_fix"
    }

    fn repair(&self, source: &str, filename: &str) -> StageOutput {
        let outcome = self.fixer.auto_fix(source, filename);
        StageOutput {
            code: outcome.fixed_code,
            fixes: outcome.fixes,
            errors: outcome.errors,
            warnings: outcome.warnings,
        }
    }
}

pub struct ImportFixStage {
    options: ImportFixOptions,
}

impl ImportFixStage {
    pub fn new(options: ImportFixOptions) -> Self {
        Self { options }
    }
}

impl RepairStage for ImportFixStage {
    fn name(&self) -> &str {
        "import_fix"
    }

    fn repair(&self, source: &str, filename: &str) -> StageOutput {
        let outcome = fix_imports(source, filename, self.options);
        StageOutput {
            code: outcome.fixed_code,
            fixes: outcome.fixes,
            errors: outcome.errors,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Source handed to the bundler.
    pub source: String,
    /// Present only when accepted repairs changed the source.
    pub fixed_code: Option<String>,
    pub report: RepairReport,
    pub rolled_back: bool,
}

pub struct RepairPipeline {
    stages: Vec<Box<dyn RepairStage>>,
}

impl RepairPipeline {
    pub fn new(stages: Vec<Box<dyn RepairStage>>) -> Self {
        Self { stages }
    }

    pub fn for_options(options: &CompileOptions) -> Self {
        let mut stages: Vec<Box<dyn RepairStage>> = Vec::new();
        if options.enable_auto_fix {
            stages.push(Box::new(AutoFixStage::new(options.auto_fix_attempts)));
        }
        if options.enable_import_fix {
            stages.push(Box::new(ImportFixStage::new(ImportFixOptions::default())));
        }
        Self::new(stages)
    }

    pub fn run(&self, original: &str, filename: &str) -> RepairOutcome {
        let mut report = RepairReport::default();
        let mut last_good = original.to_string();

        if !self.stages.is_empty() && validate_source(original, filename).is_err() {
            if let Some((recovered, strategy)) = recover_source(original, filename) {
                debug!(file = filename, ?strategy, "repairing recovered source");
                report.warn(
                    "recovery",
                    format!("Source only parsed after recovery: {}", strategy.describe()),
                );
                last_good = recovered;
            }
        }

        for stage in &self.stages {
            last_good = run_stage(stage.as_ref(), last_good, filename, &mut report);
        }

        let final_check = if last_good == original {
            Ok(())
        } else {
            validate_source(&last_good, filename)
        };
        let (source, rolled_back) = decide_rollback(original, last_good, &final_check, &mut report);

        let fixed_code = if !rolled_back && source != original {
            Some(source.clone())
        } else {
            None
        };
        RepairOutcome {
            source,
            fixed_code,
            report,
            rolled_back,
        }
    }
}

fn run_stage(
    stage: &dyn RepairStage,
    last_good: String,
    filename: &str,
    report: &mut RepairReport,
) -> String {
    let name = stage.name().to_string();
    let output = stage.repair(&last_good, filename);
    report.warnings.extend(output.warnings);
    for error in &output.errors {
        report.warn("repair-error", format!("{}: {}", name, error));
    }

    if output.code == last_good {
        let rejected = output.fixes.iter().filter(|f| !f.success).count();
        report.fixes.extend(output.fixes);
        report.record_stage(
            &name,
            output.errors.is_empty(),
            0,
            if rejected > 0 {
                format!("{} fixes rejected; no changes", rejected)
            } else {
                "no changes".to_string()
            },
        );
        return last_good;
    }

    match validate_source(&output.code, filename) {
        Ok(()) => {
            let applied = output.fixes.iter().filter(|f| f.success).count();
            debug!(stage = %name, applied, "stage accepted");
            report.fixes.extend(output.fixes);
            report.record_stage(&name, true, applied, format!("{} fixes applied", applied));
            output.code
        }
        Err(e) => {
            warn!(stage = %name, error = %e, "stage output failed validation, rolling back");
            report.fixes.extend(output.fixes.into_iter().map(|f| FixRecord {
                success: false,
                error: Some(e.message.clone()),
                ..f
            }));
            report.record_stage(&name, false, 0, format!("rolled back: {}", e.message));
            report.warn(
                "rollback",
                format!("{} output did not parse and was discarded: {}", name, e.message),
            );
            last_good
        }
    }
}

/// After final validation: keep the repaired source, or fall back to the
/// original. Returns the source to bundle and whether a rollback happened.
fn decide_rollback(
    original: &str,
    candidate: String,
    final_check: &Result<(), CompilerError>,
    report: &mut RepairReport,
) -> (String, bool) {
    if report.accepted_fixes() == 0 {
        return (original.to_string(), false);
    }
    match final_check {
        Ok(()) => (candidate, false),
        Err(e) => {
            warn!(error = %e, "final validation failed, discarding all repairs");
            report.record_stage("final_validate", false, 0, e.message.clone());
            report.warn(
                "rollback",
                format!("Repaired source failed final validation; compiling the original: {}", e.message),
            );
            (original.to_string(), true)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStats {
    pub total_compiles: u64,
    pub successful_compiles: u64,
    pub failed_compiles: u64,
    pub total_compile_time_ms: u64,
    pub cache_hits: u64,
    pub cache_entries: u64,
    pub cdn: CdnStats,
}

impl CompileStats {
    /// Share of compiles answered from the compile cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_compiles == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_compiles as f64
        }
    }
}

pub type RepairPlanner = fn(&CompileOptions) -> RepairPipeline;

#[derive(Default)]
struct CompileCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    time_ms: AtomicU64,
}

pub struct Compiler {
    config: CompilerConfig,
    cdn: Arc<CdnResolver>,
    engine: Arc<dyn BundleEngine>,
    repairs: RepairPlanner,
    results: CompileCache<CompileResponse>,
    counters: CompileCounters,
}

impl Compiler {
    /// Compiler backed by the HTTP fetcher.
    pub fn new(config: CompilerConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new()?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: CompilerConfig, fetcher: Arc<dyn PackageFetcher>) -> Self {
        let cdn = Arc::new(CdnResolver::new(&config, fetcher));
        let results = CompileCache::new(config.compile_cache_size, config.compile_cache_ttl);
        Self {
            config,
            cdn,
            engine: Arc::new(OxcBundler),
            repairs: RepairPipeline::for_options,
            results,
            counters: CompileCounters::default(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn BundleEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replace how the repair stages are chosen for a request.
    pub fn with_repairs(mut self, planner: RepairPlanner) -> Self {
        self.repairs = planner;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn cdn(&self) -> &CdnResolver {
        &self.cdn
    }

    fn entry_filename(&self) -> &str {
        let spec = &self.config.entry_specifier;
        spec.rsplit(':').next().unwrap_or(spec)
    }

    pub fn validate_code(&self, code: &str) -> CodeInspection {
        inspect_code(code, self.entry_filename())
    }

    pub async fn compile(&self, request: CompileRequest) -> CompileResponse {
        let started = Instant::now();
        let key = compile_key(
            &request.source,
            &request.libraries,
            &request.options,
            &request.files,
        );

        let response = match self.results.get(&key) {
            Some(mut hit) => {
                debug!(%key, "compile cache hit");
                hit.cached = true;
                hit
            }
            None => {
                let response = self.run(&request).await;
                if response.success {
                    self.results.insert(key, response.clone());
                }
                response
            }
        };

        let elapsed = started.elapsed().as_millis() as u64;
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.time_ms.fetch_add(elapsed, Ordering::Relaxed);
        if response.success {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        info!(
            success = response.success,
            cached = response.cached,
            elapsed_ms = elapsed,
            fixes = response.auto_fix.fixes_count.unwrap_or(0),
            warnings = response.warnings.len(),
            "compile finished"
        );
        response
    }

    async fn run(&self, request: &CompileRequest) -> CompileResponse {
        let options = &request.options;
        let filename = self.entry_filename().to_string();

        if request.source.trim().is_empty() {
            let err = CompilerError::unlocated(ERR_PARSE, "Source is empty", &filename);
            return CompileResponse::failure(&err, &request.source, options.output_type);
        }

        // start → auto_fix → import_fix → final_validate
        let repaired = (self.repairs)(options).run(&request.source, &filename);
        let mut warnings: Vec<String> = repaired
            .report
            .warnings
            .iter()
            .filter(|w| w.kind == "rollback" || w.kind == "recovery")
            .map(|w| w.message.clone())
            .collect();
        let applied = repaired.fixed_code.is_some();

        // bundle
        let hooks = self.hooks(request, &repaired.source);
        let bundle_options = BundleOptions {
            target: options.target.clone(),
            format: options.format.clone(),
            jsx: options.jsx,
            minify: options.minify,
            source_map: options.source_map,
        };
        let bundled = match self
            .engine
            .bundle(&self.config.entry_specifier, &bundle_options, &hooks)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "bundling failed");
                let mut response = CompileResponse::failure(&e, &repaired.source, options.output_type);
                response.warnings = warnings;
                response.auto_fix = AutoFixSummary::from_report(&repaired.report, false);
                return response;
            }
        };
        warnings.extend(bundled.warnings.iter().cloned());

        // format
        let mut code = bundled.code.clone();
        if options.format_code && !options.minify && !options.source_map {
            match pretty_print(&code, "bundle.js") {
                Ok(formatted) => code = formatted,
                Err(e) => warnings.push(format!("Formatting skipped: {}", e.message)),
            }
        }

        let dependencies = referenced_libraries(&bundled, &request.libraries);
        let hash = short_hash(&code);

        let (compiled_code, html_content) = match options.output_type {
            OutputType::Js => (Some(code), None),
            OutputType::Html => {
                let name = detect_component_name(&repaired.source);
                match render_document(&code, &name, &self.config.react_version) {
                    Ok(html) => (None, Some(html)),
                    Err(e) => {
                        warn!(error = %e, "document rendering failed");
                        let mut response = CompileResponse::failure(&e, &repaired.source, options.output_type);
                        response.warnings = warnings;
                        response.auto_fix = AutoFixSummary::from_report(&repaired.report, applied);
                        response.fixed_code = repaired.fixed_code;
                        return response;
                    }
                }
            }
        };

        CompileResponse {
            success: true,
            compiled_code,
            html_content,
            source_map: bundled.source_map,
            dependencies,
            assets: Vec::new(),
            error: None,
            error_details: None,
            warnings,
            fixed_code: repaired.fixed_code,
            auto_fix: AutoFixSummary::from_report(&repaired.report, applied),
            hash: Some(hash),
            output_type: options.output_type,
            cached: false,
        }
    }

    fn hooks(&self, request: &CompileRequest, source: &str) -> HookChain {
        let mut vmp = VirtualModuleProvider::new(&self.config.entry_specifier, source);
        for (path, text) in &request.files {
            vmp = vmp.with_file(path, text);
        }
        HookChain::new().with(Arc::new(vmp)).with(Arc::new(LibraryResolver::new(
            Arc::clone(&self.cdn),
            &self.config,
            &request.libraries,
        )))
    }

    pub fn stats(&self) -> CompileStats {
        CompileStats {
            total_compiles: self.counters.total.load(Ordering::Relaxed),
            successful_compiles: self.counters.successful.load(Ordering::Relaxed),
            failed_compiles: self.counters.failed.load(Ordering::Relaxed),
            total_compile_time_ms: self.counters.time_ms.load(Ordering::Relaxed),
            cache_hits: self.results.hits(),
            cache_entries: self.results.len(),
            cdn: self.cdn.stats(),
        }
    }

    /// Empty the compile cache and the CDN resolution cache. Returns the
    /// number of compile results dropped.
    pub fn clear_cache(&self) -> u64 {
        let cleared = self.results.clear();
        self.cdn.clear_cache();
        info!(cleared, "caches cleared");
        cleared
    }
}

/// Requested libraries that the bundle actually imports, by base package.
fn referenced_libraries(bundle: &BundleOutput, libraries: &[String]) -> Vec<String> {
    let imported: Vec<String> = bundle
        .externals
        .iter()
        .filter(|e| is_bare_specifier(&e.specifier))
        .map(|e| package_name(&e.specifier))
        .collect();

    let mut out: Vec<String> = Vec::new();
    for hint in libraries {
        let name = package_name(split_version(hint).0);
        if imported.contains(&name) && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// NATIVE BINDING
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
static NATIVE_COMPILER: std::sync::OnceLock<Result<Compiler, String>> = std::sync::OnceLock::new();

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub async fn compile_tsx_native(request: serde_json::Value) -> napi::Result<serde_json::Value> {
    let request: CompileRequest =
        serde_json::from_value(request).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let compiler = NATIVE_COMPILER
        .get_or_init(|| Compiler::new(CompilerConfig::from_env()).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| napi::Error::from_reason(e.clone()))?;
    let response = compiler.compile(request).await;
    serde_json::to_value(response).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::IssueKind;

    struct Breaker;

    impl RepairStage for Breaker {
        fn name(&self) -> &str {
            "breaker"
        }

        fn repair(&self, source: &str, _filename: &str) -> StageOutput {
            StageOutput {
                code: format!("{}\nconst = ;", source),
                fixes: vec![FixRecord::applied(IssueKind::UndefinedIdentifier, "broke it")],
                ..StageOutput::default()
            }
        }
    }

    struct Rename;

    impl RepairStage for Rename {
        fn name(&self) -> &str {
            "rename"
        }

        fn repair(&self, source: &str, _filename: &str) -> StageOutput {
            StageOutput {
                code: source.replace("let ", "const "),
                fixes: vec![FixRecord::applied(IssueKind::UndefinedIdentifier, "let to const")],
                ..StageOutput::default()
            }
        }
    }

    #[test]
    fn test_failed_stage_is_rolled_back() {
        let pipeline = RepairPipeline::new(vec![Box::new(Breaker), Box::new(Rename)]);
        let out = pipeline.run("let a = 1;\nexport default a;\n", "component.tsx");

        let breaker = out.report.stage("breaker").unwrap();
        assert!(!breaker.success);
        assert!(breaker.message.starts_with("rolled back"));
        assert!(out.report.fixes.iter().any(|f| f.message == "broke it" && !f.success));

        assert_eq!(out.source, "const a = 1;\nexport default a;\n");
        assert_eq!(out.fixed_code.as_deref(), Some("const a = 1;\nexport default a;\n"));
        assert!(!out.fixed_code.unwrap().contains("const = ;"));
        assert!(out.report.warnings.iter().any(|w| w.kind == "rollback"));
    }

    #[test]
    fn test_no_accepted_fixes_keeps_original() {
        let src = "export default function App() { return null; }\n";
        let out = RepairPipeline::new(vec![Box::new(Breaker)]).run(src, "component.tsx");
        assert_eq!(out.source, src);
        assert!(out.fixed_code.is_none());
        assert!(!out.rolled_back);
    }

    #[test]
    fn test_decide_rollback_on_failed_final_validation() {
        let mut report = RepairReport::default();
        report.fixes.push(FixRecord::applied(IssueKind::MissingNamedImport, "x"));
        let err = CompilerError::unlocated(ERR_PARSE, "bad", "component.tsx");

        let (source, rolled_back) =
            decide_rollback("original", "candidate".to_string(), &Err(err), &mut report);
        assert_eq!(source, "original");
        assert!(rolled_back);
        assert!(!report.stage("final_validate").unwrap().success);

        let (source, rolled_back) =
            decide_rollback("original", "candidate".to_string(), &Ok(()), &mut report);
        assert_eq!(source, "candidate");
        assert!(!rolled_back);
    }

    #[test]
    fn test_stages_follow_options() {
        let mut options = CompileOptions::default();
        assert_eq!(RepairPipeline::for_options(&options).stages.len(), 1);
        options.enable_import_fix = true;
        let names: Vec<String> = RepairPipeline::for_options(&options)
            .stages
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["auto_fix", "import_fix"]);
        options.enable_auto_fix = false;
        options.enable_import_fix = false;
        assert!(RepairPipeline::for_options(&options).stages.is_empty());
    }

    #[test]
    fn test_request_accepts_code_alias() {
        let req: CompileRequest =
            serde_json::from_str(r#"{"code":"export default 1;","libraries":["lodash@4.17.21"]}"#).unwrap();
        assert_eq!(req.source, "export default 1;");
        assert_eq!(req.libraries, vec!["lodash@4.17.21".to_string()]);
        assert_eq!(req.options, CompileOptions::default());
    }
}
