//! Bundling / Transpilation Engine
//!
//! [`BundleEngine`] is the seam the orchestrator drives. The default
//! [`OxcBundler`] compiles one module at a time:
//!
//! 1. load through the hook chain,
//! 2. parse with recovery, lower TS/JSX/syntax with `oxc_transformer`,
//! 3. resolve every remaining import specifier through the chain,
//! 4. rewrite specifiers in the AST (externals → URL, in-memory modules →
//!    recursively compiled `data:` URLs) and print with `oxc_codegen`.
//!
//! Arena data never lives across an await: each module is transpiled twice in
//! synchronous passes, once to discover specifiers and once to print.

use crate::config::{JsxMode, ModuleFormat};
use crate::parse::{parse, parse_with_recovery, SyntaxProfile};
use crate::resolve::{HookChain, LoadedModule, Resolution};
use crate::validate::{CompilerError, ERR_BUNDLE, ERR_FORMAT, ERR_PARSE, ERR_RESOLVE, ERR_TRANSFORM};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportAllDeclaration, ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression,
};
use oxc_ast_visit::{walk, walk_mut, Visit, VisitMut};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{JsxRuntime, TransformOptions, Transformer};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    pub target: String,
    pub format: ModuleFormat,
    pub jsx: JsxMode,
    pub minify: bool,
    pub source_map: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            target: "es2020".to_string(),
            format: ModuleFormat::Esm,
            jsx: JsxMode::Automatic,
            minify: false,
            source_map: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalImport {
    pub specifier: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    pub code: String,
    pub source_map: Option<String>,
    pub externals: Vec<ExternalImport>,
    /// Every in-memory module that was compiled, entry first.
    pub modules: Vec<String>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait BundleEngine: Send + Sync {
    async fn bundle(
        &self,
        entry: &str,
        options: &BundleOptions,
        hooks: &HookChain,
    ) -> Result<BundleOutput, CompilerError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OXC ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct OxcBundler;

type ModuleFuture<'s> = Pin<Box<dyn Future<Output = Result<String, CompilerError>> + Send + 's>>;

#[async_trait]
impl BundleEngine for OxcBundler {
    async fn bundle(
        &self,
        entry: &str,
        options: &BundleOptions,
        hooks: &HookChain,
    ) -> Result<BundleOutput, CompilerError> {
        let mut output = BundleOutput::default();

        if options.format != ModuleFormat::Esm {
            output.warnings.push(format!(
                "Module format '{:?}' is not supported; emitting esm",
                options.format
            ));
        }

        let id = match hooks.resolve(entry, None).await {
            Some((_, Resolution::Module { id })) => id,
            _ => {
                return Err(CompilerError::unlocated(
                    ERR_RESOLVE,
                    &format!("Could not resolve entry '{}'", entry),
                    entry,
                ))
            }
        };

        let code = self
            .compile_module(id, hooks, options, Vec::new(), &mut output)
            .await?;
        check_output(&code)?;
        output.code = code;
        Ok(output)
    }
}

impl OxcBundler {
    fn compile_module<'s>(
        &'s self,
        id: String,
        hooks: &'s HookChain,
        options: &'s BundleOptions,
        stack: Vec<String>,
        output: &'s mut BundleOutput,
    ) -> ModuleFuture<'s> {
        Box::pin(async move {
            if stack.contains(&id) {
                let mut cycle = stack.clone();
                cycle.push(id.clone());
                return Err(CompilerError::unlocated(
                    ERR_BUNDLE,
                    &format!("Circular import: {}", cycle.join(" -> ")),
                    &id,
                ));
            }

            let module = hooks.load(&id).await.ok_or_else(|| {
                CompilerError::unlocated(ERR_BUNDLE, &format!("Could not load '{}'", id), &id)
            })?;
            let is_entry = stack.is_empty();
            output.modules.push(id.clone());

            let discovered = transpile(&module, options, None, false)?;
            output.warnings.extend(discovered.warnings);

            let mut rewrites: HashMap<String, String> = HashMap::new();
            for specifier in discovered.specifiers {
                let resolution = hooks.resolve(&specifier, Some(&id)).await;
                match resolution {
                    Some((_, Resolution::External { url, warning })) => {
                        if let Some(w) = warning {
                            output.warnings.push(w);
                        }
                        if !output.externals.iter().any(|e| e.specifier == specifier) {
                            output.externals.push(ExternalImport {
                                specifier: specifier.clone(),
                                url: url.clone(),
                            });
                        }
                        rewrites.insert(specifier, url);
                    }
                    Some((_, Resolution::Module { id: child })) => {
                        let mut child_stack = stack.clone();
                        child_stack.push(id.clone());
                        let child_code = self
                            .compile_module(child, hooks, options, child_stack, output)
                            .await?;
                        rewrites.insert(specifier, to_data_url(&child_code));
                    }
                    Some((_, Resolution::Pass)) | None => {
                        return Err(CompilerError::unlocated(
                            ERR_RESOLVE,
                            &format!("Could not resolve '{}' from '{}'", specifier, module.filename),
                            &module.filename,
                        ));
                    }
                }
            }

            let printed = transpile(&module, options, Some(&rewrites), is_entry && options.source_map)?;
            if is_entry {
                output.source_map = printed.source_map;
            }
            debug!(module = %id, bytes = printed.code.len(), "module compiled");
            Ok(printed.code)
        })
    }
}

/// The printed bundle must itself be a valid plain module.
fn check_output(code: &str) -> Result<(), CompilerError> {
    let allocator = Allocator::default();
    let outcome = parse(&allocator, code, "bundle.js", SyntaxProfile::Strict);
    match outcome.errors.first() {
        None => Ok(()),
        Some(first) => {
            warn!(error = %first, "bundled output does not parse");
            Err(CompilerError::new(
                ERR_BUNDLE,
                &format!("Bundled output is not valid JavaScript: {}", first.message),
                "bundle.js",
                first.line,
                first.column,
            ))
        }
    }
}

pub fn to_data_url(code: &str) -> String {
    format!("data:text/javascript;base64,{}", BASE64.encode(code.as_bytes()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNCHRONOUS TRANSPILE
// ═══════════════════════════════════════════════════════════════════════════════

struct Transpiled {
    code: String,
    source_map: Option<String>,
    specifiers: Vec<String>,
    warnings: Vec<String>,
}

fn transpile(
    module: &LoadedModule,
    options: &BundleOptions,
    rewrites: Option<&HashMap<String, String>>,
    emit_map: bool,
) -> Result<Transpiled, CompilerError> {
    let allocator = Allocator::default();
    let outcome = parse_with_recovery(
        &allocator,
        &module.source,
        &module.filename,
        SyntaxProfile::Permissive,
    );
    if !outcome.success {
        let first = &outcome.errors[0];
        return Err(CompilerError::new(
            ERR_PARSE,
            &first.message,
            &module.filename,
            first.line,
            first.column,
        ));
    }
    let mut warnings = outcome.warnings;
    let mut program = outcome.program;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

    let mut transform_options = match TransformOptions::from_target(&options.target) {
        Ok(o) => o,
        Err(e) => {
            warnings.push(format!("Unknown target '{}' ({}); using esnext", options.target, e));
            TransformOptions::default()
        }
    };
    transform_options.jsx.runtime = match options.jsx {
        JsxMode::Automatic => JsxRuntime::Automatic,
        JsxMode::Classic => JsxRuntime::Classic,
    };

    let ret = Transformer::new(&allocator, Path::new(&module.filename), &transform_options)
        .build_with_scoping(scoping, &mut program);
    if let Some(e) = ret.errors.first() {
        return Err(CompilerError::unlocated(
            ERR_TRANSFORM,
            &e.to_string(),
            &module.filename,
        ));
    }

    let mut collector = SpecifierCollector::default();
    collector.visit_program(&program);

    if let Some(rewrites) = rewrites {
        SpecifierRewriter {
            allocator: &allocator,
            rewrites,
        }
        .visit_program(&mut program);
    }

    let mut codegen_options = if options.minify {
        CodegenOptions::minify()
    } else {
        CodegenOptions::default()
    };
    if emit_map {
        codegen_options.source_map_path = Some(PathBuf::from(&module.filename));
    }
    let printed = Codegen::new().with_options(codegen_options).build(&program);

    Ok(Transpiled {
        code: printed.code,
        source_map: printed.map.map(|m| m.to_json_string()),
        specifiers: collector.specifiers,
        warnings,
    })
}

/// Import specifiers still present after lowering, in first-seen order.
#[derive(Default)]
struct SpecifierCollector {
    specifiers: Vec<String>,
}

impl SpecifierCollector {
    fn push(&mut self, specifier: &str) {
        if !self.specifiers.iter().any(|s| s == specifier) {
            self.specifiers.push(specifier.to_string());
        }
    }
}

impl<'a> Visit<'a> for SpecifierCollector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            self.push(source.value.as_str());
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.push(decl.source.value.as_str());
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            self.push(lit.value.as_str());
        }
        walk::walk_import_expression(self, expr);
    }
}

struct SpecifierRewriter<'a, 'm> {
    allocator: &'a Allocator,
    rewrites: &'m HashMap<String, String>,
}

impl<'a, 'm> SpecifierRewriter<'a, 'm> {
    fn rewrite(&self, value: &str) -> Option<&'a str> {
        self.rewrites
            .get(value)
            .map(|url| &*self.allocator.alloc_str(url))
    }
}

impl<'a, 'm> VisitMut<'a> for SpecifierRewriter<'a, 'm> {
    fn visit_import_declaration(&mut self, decl: &mut ImportDeclaration<'a>) {
        if let Some(url) = self.rewrite(decl.source.value.as_str()) {
            decl.source.value = url.into();
            decl.source.raw = None;
        }
    }

    fn visit_export_named_declaration(&mut self, decl: &mut ExportNamedDeclaration<'a>) {
        if let Some(source) = &mut decl.source {
            if let Some(url) = self.rewrite(source.value.as_str()) {
                source.value = url.into();
                source.raw = None;
            }
        }
        walk_mut::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &mut ExportAllDeclaration<'a>) {
        if let Some(url) = self.rewrite(decl.source.value.as_str()) {
            decl.source.value = url.into();
            decl.source.raw = None;
        }
    }

    fn visit_import_expression(&mut self, expr: &mut ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &mut expr.source {
            if let Some(url) = self.rewrite(lit.value.as_str()) {
                lit.value = url.into();
                lit.raw = None;
            }
        }
        walk_mut::walk_import_expression(self, expr);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMATTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Re-print bundled JavaScript with default codegen layout.
pub fn pretty_print(code: &str, filename: &str) -> Result<String, CompilerError> {
    let allocator = Allocator::default();
    let outcome = parse(&allocator, code, filename, SyntaxProfile::Strict);
    if !outcome.success {
        let first = &outcome.errors[0];
        warn!(file = filename, error = %first, "formatting skipped");
        return Err(CompilerError::new(
            ERR_FORMAT,
            &first.message,
            filename,
            first.line,
            first.column,
        ));
    }
    Ok(Codegen::new().build(&outcome.program).code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::{CdnResolver, FetchError, PackageFetcher};
    use crate::config::CompilerConfig;
    use crate::resolve::{LibraryResolver, VirtualModuleProvider};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoNetwork;

    #[async_trait]
    impl PackageFetcher for NoNetwork {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            Err(FetchError::Http {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    fn chain(source: &str, files: &[(&str, &str)]) -> HookChain {
        let config = CompilerConfig::default().offline();
        let cdn = Arc::new(CdnResolver::new(&config, Arc::new(NoNetwork)));
        let mut vmp = VirtualModuleProvider::new(&config.entry_specifier, source);
        for (path, src) in files {
            vmp = vmp.with_file(path, src);
        }
        HookChain::new()
            .with(Arc::new(vmp))
            .with(Arc::new(LibraryResolver::new(cdn, &config, &[])))
    }

    #[tokio::test]
    async fn test_bundle_lowers_tsx_and_rewrites_imports() {
        let src = "import { useState } from 'react';\nimport confetti from 'canvas-confetti';\ninterface P { n: number }\nexport default function App({ n }: P) {\n  const [v] = useState<number>(n);\n  confetti();\n  return <div>{v}</div>;\n}\n";
        let hooks = chain(src, &[]);
        let out = OxcBundler
            .bundle("virtual:component.tsx", &BundleOptions::default(), &hooks)
            .await
            .unwrap();

        assert!(!out.code.contains("interface"));
        assert!(!out.code.contains("<div>"));
        assert!(out.code.contains("https://esm.sh/react@18.2.0"));
        assert!(out.code.contains("https://esm.sh/react@18.2.0/jsx-runtime"));
        assert!(out
            .code
            .contains("https://esm.sh/canvas-confetti@latest?deps=react@18.2.0,react-dom@18.2.0"));
        assert!(!out.code.contains("from \"react\""));
        assert_eq!(out.modules, vec!["virtual:component.tsx".to_string()]);
        assert!(out.externals.iter().any(|e| e.specifier == "canvas-confetti"));
    }

    #[tokio::test]
    async fn test_bundle_inlines_virtual_files() {
        let src = "import { Button } from './components/Button';\nexport default () => <Button />;\n";
        let hooks = chain(
            src,
            &[("components/Button.tsx", "export const Button = () => <button>ok</button>;")],
        );
        let out = OxcBundler
            .bundle("virtual:component.tsx", &BundleOptions::default(), &hooks)
            .await
            .unwrap();
        assert!(out.code.contains("data:text/javascript;base64,"));
        assert_eq!(out.modules.len(), 2);
    }

    #[tokio::test]
    async fn test_bundle_detects_cycles() {
        let src = "import { a } from './a';\nexport default a;\n";
        let hooks = chain(
            src,
            &[
                ("a.ts", "import { b } from './b';\nexport const a = b;"),
                ("b.ts", "import { a } from './a';\nexport const b = a;"),
            ],
        );
        let err = OxcBundler
            .bundle("virtual:component.tsx", &BundleOptions::default(), &hooks)
            .await
            .unwrap_err();
        assert_eq!(err.code, ERR_BUNDLE);
        assert!(err.message.contains("Circular import"));
    }

    #[tokio::test]
    async fn test_bundle_unresolvable_source_fails() {
        let hooks = chain("export default function (", &[]);
        let err = OxcBundler
            .bundle("virtual:component.tsx", &BundleOptions::default(), &hooks)
            .await
            .unwrap_err();
        assert_eq!(err.code, ERR_PARSE);
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn test_bundle_wrapped_recovery_is_a_valid_module() {
        let hooks = chain("const [n] = useState(0);\nreturn <div>{n}</div>;\n", &[]);
        let out = OxcBundler
            .bundle("virtual:component.tsx", &BundleOptions::default(), &hooks)
            .await
            .unwrap();
        assert!(out.code.contains("export default function __RecoveredComponent"));
        assert!(out.code.contains("https://esm.sh/react@18.2.0/jsx-runtime"));
        assert!(out.warnings.iter().any(|w| w.contains("wrapped source")));
        assert!(check_output(&out.code).is_ok());
    }

    #[test]
    fn test_check_output_rejects_nested_import() {
        let err = check_output("function f() {\n  import x from 'x';\n}\n").unwrap_err();
        assert_eq!(err.code, ERR_BUNDLE);
        assert!(check_output("export default 1;\n").is_ok());
    }

    #[tokio::test]
    async fn test_bundle_classic_runtime_and_source_map() {
        let options = BundleOptions {
            jsx: JsxMode::Classic,
            source_map: true,
            ..BundleOptions::default()
        };
        let hooks = chain("export default () => <p>hi</p>;\n", &[]);
        let out = OxcBundler
            .bundle("virtual:component.tsx", &options, &hooks)
            .await
            .unwrap();
        assert!(out.code.contains("React.createElement"));
        assert!(out.source_map.unwrap().contains("\"mappings\""));
    }

    #[test]
    fn test_pretty_print() {
        let out = pretty_print("const a=1;export default a;", "bundle.js").unwrap();
        assert!(out.contains("const a = 1;"));
        assert_eq!(pretty_print("const = ;", "bundle.js").unwrap_err().code, ERR_FORMAT);
    }
}
