//! AST Auto-Fixer
//!
//! Detects a closed catalogue of structural defects from the module's binding
//! inventory and repairs each with exactly one rule:
//!
//! - runtime export used without an import → extend or insert a `react` import
//! - markup (or `React.*`) without a live `React` binding → add the default import
//! - unknown icon imported from the icon module → rebind the fallback icon
//!
//! Every fix is applied as a span edit and re-parsed before it is kept. A fix
//! that breaks parsing is dropped and the pre-fix text survives.

use crate::edits::{apply_validated, TextEdit};
use crate::icons::{is_known_icon, FALLBACK_ICON, ICON_MODULE};
use crate::imports::{ImportEntry, ImportModel, ImportSpec};
use crate::report::{FixRecord, IssueKind, RepairIssue, ReportWarning};
use crate::scope::SourceAnalysis;
use crate::validate::CompilerError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

pub const RUNTIME_MODULE: &str = "react";
pub const RUNTIME_DEFAULT: &str = "React";

lazy_static! {
    static ref HOOK_RE: Regex = Regex::new(r"^use[A-Z][A-Za-z0-9]*$").unwrap();

    pub static ref RUNTIME_HOOKS: HashSet<&'static str> = [
        "useState", "useEffect", "useLayoutEffect", "useRef", "useMemo", "useCallback",
        "useContext", "useReducer", "useId", "useTransition", "useDeferredValue",
        "useImperativeHandle", "useDebugValue", "useSyncExternalStore", "useInsertionEffect",
    ]
    .into_iter()
    .collect();

    /// Named exports of the runtime module that may be imported on demand.
    pub static ref RUNTIME_EXPORTS: HashSet<&'static str> = {
        let mut s: HashSet<&'static str> = RUNTIME_HOOKS.iter().copied().collect();
        for name in [
            "Fragment", "StrictMode", "Suspense", "createContext", "forwardRef", "memo",
            "lazy", "createElement", "cloneElement", "isValidElement", "Children",
            "startTransition", "Component", "PureComponent",
        ] {
            s.insert(name);
        }
        s
    };
}

pub fn is_hook_name(name: &str) -> bool {
    HOOK_RE.is_match(name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub issues: Vec<RepairIssue>,
    pub warnings: Vec<ReportWarning>,
}

pub fn detect(source: &str, filename: &str) -> Result<Detection, CompilerError> {
    let analysis = SourceAnalysis::analyze(source, filename)?;
    Ok(detect_in(&analysis, source))
}

fn detect_in(analysis: &SourceAnalysis, source: &str) -> Detection {
    let mut detection = Detection::default();
    let mut default_reported = false;

    for reference in analysis.undefined_references() {
        let (line, column) = SourceAnalysis::location(source, reference.start);
        let name = reference.name.as_str();

        if name == RUNTIME_DEFAULT {
            default_reported = true;
            detection.issues.push(RepairIssue {
                kind: IssueKind::MissingDefaultImport,
                line,
                column,
                identifier: Some(RUNTIME_DEFAULT.to_string()),
                source: Some(RUNTIME_MODULE.to_string()),
            });
        } else if RUNTIME_EXPORTS.contains(name) {
            detection.issues.push(RepairIssue {
                kind: IssueKind::UndefinedIdentifier,
                line,
                column,
                identifier: Some(name.to_string()),
                source: Some(RUNTIME_MODULE.to_string()),
            });
        } else if is_hook_name(name) {
            detection.warnings.push(ReportWarning::new(
                "unknown-hook",
                format!("Hook '{}' is not defined at {}:{}", name, line, column),
            ));
        } else {
            detection.warnings.push(ReportWarning::new(
                "undefined-identifier",
                format!("'{}' is not defined at {}:{}", name, line, column),
            ));
        }
    }

    if let Some(markup) = analysis.markup {
        if !default_reported && !analysis.is_bound(RUNTIME_DEFAULT) {
            let (line, column) = SourceAnalysis::location(source, markup.start);
            detection.issues.push(RepairIssue {
                kind: IssueKind::MissingDefaultImport,
                line,
                column,
                identifier: Some(RUNTIME_DEFAULT.to_string()),
                source: Some(RUNTIME_MODULE.to_string()),
            });
        }
    }

    for entry in analysis.imports.iter().filter(|e| e.source == ICON_MODULE) {
        for spec in entry.named_specs() {
            if spec.type_only || spec.imported == FALLBACK_ICON || is_known_icon(&spec.imported) {
                continue;
            }
            let (line, column) = SourceAnalysis::location(source, spec.start);
            detection.issues.push(RepairIssue {
                kind: IssueKind::MissingNamedImport,
                line,
                column,
                identifier: Some(spec.local.clone()),
                source: Some(ICON_MODULE.to_string()),
            });
        }
    }

    detection
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIX RULES
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a brand-new import statement goes: before the first import, or after
/// the directive prologue when there are none.
fn new_import_offset(analysis: &SourceAnalysis) -> usize {
    analysis
        .imports
        .first()
        .map(|e| e.start as usize)
        .unwrap_or(analysis.top_offset as usize)
}

fn value_imports_from<'e>(
    analysis: &'e SourceAnalysis,
    module: &'e str,
) -> impl Iterator<Item = &'e ImportEntry> + 'e {
    analysis
        .imports
        .iter()
        .filter(move |e| e.source == module && !e.type_only && !e.side_effect)
}

/// Edit that makes `name` a named import from `module`.
pub fn ensure_named_import(analysis: &SourceAnalysis, module: &str, name: &str) -> TextEdit {
    if let Some(last) = value_imports_from(analysis, module)
        .filter_map(|e| e.named_specs().last())
        .next()
    {
        return TextEdit::insert(last.end as usize, format!(", {}", name));
    }

    if let Some(entry) = value_imports_from(analysis, module)
        .find(|e| e.namespace_spec().is_none() && e.default_spec().is_some())
    {
        if let Some(brace) = entry.brace_open {
            return TextEdit::insert(brace as usize + 1, format!(" {}", name));
        }
        let default = entry.default_spec().map(|d| d.end).unwrap_or(entry.start);
        return TextEdit::insert(default as usize, format!(", {{ {} }}", name));
    }

    if let Some(entry) = value_imports_from(analysis, module).find(|e| e.specifiers.is_empty()) {
        if let Some(brace) = entry.brace_open {
            return TextEdit::insert(brace as usize + 1, format!(" {} ", name));
        }
    }

    let statement = ImportModel::new(module)
        .with(ImportSpec::named(name, name))
        .emit('\'');
    TextEdit::insert(new_import_offset(analysis), format!("{}\n", statement))
}

/// Edit that binds `local` as the default import of `module`.
pub fn ensure_default_import(analysis: &SourceAnalysis, module: &str, local: &str) -> TextEdit {
    if let Some(entry) = analysis.imports.iter().find(|e| {
        e.source == module && e.type_only && e.default_spec().is_some_and(|d| d.local == local)
    }) {
        return TextEdit::replace(
            entry.start as usize,
            entry.end as usize,
            entry.value_model().emit(entry.quote),
        );
    }

    if let Some(entry) = value_imports_from(analysis, module)
        .find(|e| e.default_spec().is_none() && e.namespace_spec().is_none())
    {
        if let Some(brace) = entry.brace_open {
            return TextEdit::insert(brace as usize, format!("{}, ", local));
        }
    }

    if let Some(entry) = analysis
        .imports
        .iter()
        .find(|e| e.source == module && e.side_effect)
    {
        let statement = ImportModel::new(module)
            .with(ImportSpec::default(local))
            .emit(entry.quote);
        return TextEdit::replace(entry.start as usize, entry.end as usize, statement);
    }

    let statement = ImportModel::new(module)
        .with(ImportSpec::default(local))
        .emit('\'');
    TextEdit::insert(new_import_offset(analysis), format!("{}\n", statement))
}

/// Edit that rebinds the icon imported as `local` to the fallback icon.
fn alias_to_fallback(analysis: &SourceAnalysis, local: &str) -> Option<(TextEdit, String)> {
    let spec = analysis
        .imports
        .iter()
        .filter(|e| e.source == ICON_MODULE)
        .flat_map(|e| e.named_specs())
        .find(|s| s.local == local)?;

    let replacement = if spec.local == FALLBACK_ICON {
        FALLBACK_ICON.to_string()
    } else {
        format!("{} as {}", FALLBACK_ICON, spec.local)
    };
    Some((
        TextEdit::replace(spec.start as usize, spec.end as usize, replacement),
        spec.imported.clone(),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct AutoFixOutcome {
    pub success: bool,
    pub fixed_code: String,
    pub fixes: Vec<FixRecord>,
    pub errors: Vec<String>,
    pub warnings: Vec<ReportWarning>,
    pub attempts: usize,
}

impl AutoFixOutcome {
    pub fn applied(&self) -> usize {
        self.fixes.iter().filter(|f| f.success).count()
    }
}

pub struct AutoFixer {
    pub max_fix_attempts: usize,
}

impl Default for AutoFixer {
    fn default() -> Self {
        Self { max_fix_attempts: 2 }
    }
}

impl AutoFixer {
    pub fn new(max_fix_attempts: usize) -> Self {
        Self {
            max_fix_attempts: max_fix_attempts.max(1),
        }
    }

    pub fn auto_fix(&self, source: &str, filename: &str) -> AutoFixOutcome {
        let mut current = source.to_string();
        let mut fixes = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut attempts = 0;

        while attempts < self.max_fix_attempts {
            attempts += 1;
            let detection = match detect(&current, filename) {
                Ok(d) => d,
                Err(e) => {
                    errors.push(e.message);
                    break;
                }
            };
            warnings = detection.warnings;
            if detection.issues.is_empty() {
                break;
            }

            debug!(
                file = filename,
                attempt = attempts,
                issues = detection.issues.len(),
                "auto-fix pass"
            );

            let mut applied_this_round = 0;
            for issue in &detection.issues {
                match self.apply_issue(&current, issue, filename) {
                    Ok(Some((next, message))) => {
                        current = next;
                        applied_this_round += 1;
                        fixes.push(FixRecord::applied(issue.kind, message));
                    }
                    Ok(None) => {}
                    Err((message, error)) => {
                        debug!(file = filename, kind = %issue.kind, %error, "fix discarded");
                        errors.push(error.clone());
                        fixes.push(FixRecord::rejected(issue.kind, message, error));
                    }
                }
            }

            if applied_this_round == 0 {
                break;
            }
        }

        AutoFixOutcome {
            success: errors.is_empty(),
            fixed_code: current,
            fixes,
            errors,
            warnings,
            attempts,
        }
    }

    /// Re-analyses the current text, so spans reflect every fix already kept.
    /// `Ok(None)` means the issue is already gone.
    fn apply_issue(
        &self,
        current: &str,
        issue: &RepairIssue,
        filename: &str,
    ) -> Result<Option<(String, String)>, (String, String)> {
        let analysis = SourceAnalysis::analyze(current, filename)
            .map_err(|e| (format!("Re-analysis for {}", issue.kind), e.message))?;
        let Some(name) = issue.identifier.as_deref() else {
            return Ok(None);
        };

        let (edit, message) = match issue.kind {
            IssueKind::UndefinedIdentifier => {
                if analysis.is_bound(name) {
                    return Ok(None);
                }
                (
                    ensure_named_import(&analysis, RUNTIME_MODULE, name),
                    format!("Added import {{ {} }} from '{}'", name, RUNTIME_MODULE),
                )
            }
            IssueKind::MissingDefaultImport => {
                if analysis.is_bound(name) {
                    return Ok(None);
                }
                (
                    ensure_default_import(&analysis, RUNTIME_MODULE, name),
                    format!("Added default import {} from '{}'", name, RUNTIME_MODULE),
                )
            }
            IssueKind::MissingNamedImport => match alias_to_fallback(&analysis, name) {
                Some((edit, imported)) => (
                    edit,
                    format!(
                        "Replaced unknown icon '{}' with '{}' as '{}'",
                        imported, FALLBACK_ICON, name
                    ),
                ),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        apply_validated(current, &[edit], filename)
            .map(|next| Some((next, message.clone())))
            .map_err(|e| (message, e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(src: &str) -> AutoFixOutcome {
        AutoFixer::default().auto_fix(src, "App.tsx")
    }

    #[test]
    fn test_missing_hook_and_default_import() {
        let src = "export default function App() {\n  const [n, setN] = useState(0);\n  return <button onClick={() => setN(n + 1)}>{n}</button>;\n}\n";
        let out = fix(src);
        assert!(out.success);
        assert_eq!(out.applied(), 2);
        assert!(out
            .fixed_code
            .starts_with("import React, { useState } from 'react';\n"));
        assert_eq!(out.fixed_code.matches("from 'react'").count(), 1);
    }

    #[test]
    fn test_extends_existing_named_import() {
        let src = "import React, { useState } from 'react';\nexport const A = () => { useEffect(() => {}, []); const [a] = useState(1); return <p>{a}</p>; };\n";
        let out = fix(src);
        assert!(out
            .fixed_code
            .starts_with("import React, { useState, useEffect } from 'react';"));
        assert_eq!(out.fixes.len(), 1);
        assert_eq!(out.fixes[0].kind, IssueKind::UndefinedIdentifier);
    }

    #[test]
    fn test_default_only_import_gets_named_list() {
        let src = "import React from 'react';\nexport const A = () => { const r = useRef(null); return <div ref={r} />; };\n";
        let out = fix(src);
        assert!(out
            .fixed_code
            .starts_with("import React, { useRef } from 'react';"));
    }

    #[test]
    fn test_type_only_default_import_becomes_value_import() {
        let src = "import type React from 'react';\nexport default () => <p>hi</p>;\n";
        let out = fix(src);
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(out.applied(), 1);
        assert_eq!(out.fixes[0].kind, IssueKind::MissingDefaultImport);
        assert!(out.fixed_code.starts_with("import React from 'react';\n"));
        assert!(!out.fixed_code.contains("import type"));
    }

    #[test]
    fn test_unknown_icon_aliased_to_fallback() {
        let src = "import React from 'react';\nimport { Check, SparkleUnicorn } from 'lucide-react';\nexport default () => <div><Check /><SparkleUnicorn /></div>;\n";
        let out = fix(src);
        assert!(out.success);
        assert!(out
            .fixed_code
            .contains("import { Check, HelpCircle as SparkleUnicorn } from 'lucide-react';"));
        assert_eq!(out.fixes[0].kind, IssueKind::MissingNamedImport);
    }

    #[test]
    fn test_unknown_hook_is_warning_only() {
        let src = "import React from 'react';\nexport const A = () => { const v = useMagic(); return <p>{v}</p>; };\n";
        let out = fix(src);
        assert!(out.success);
        assert!(out.fixes.is_empty());
        assert_eq!(out.fixed_code, src);
        assert_eq!(out.warnings[0].kind, "unknown-hook");
    }

    #[test]
    fn test_idempotent_on_fixed_code() {
        let src = "export default function App() { const [n] = useState(0); return <p>{n}</p>; }\n";
        let once = fix(src);
        let twice = fix(&once.fixed_code);
        assert!(twice.fixes.is_empty());
        assert_eq!(twice.fixed_code, once.fixed_code);
    }

    #[test]
    fn test_unparseable_source_reports_error() {
        let out = fix("const = ;");
        assert!(!out.success);
        assert_eq!(out.fixed_code, "const = ;");
        assert!(!out.errors.is_empty());
    }

    #[test]
    fn test_directive_prologue_preserved() {
        let src = "'use client';\nexport const A = () => { const [a] = useState(0); return a; };\n";
        let out = fix(src);
        assert!(out
            .fixed_code
            .starts_with("'use client';\nimport { useState } from 'react';\n"));
    }

    #[test]
    fn test_hook_name_pattern() {
        assert!(is_hook_name("useState"));
        assert!(is_hook_name("useMyThing2"));
        assert!(!is_hook_name("user"));
        assert!(!is_hook_name("use"));
    }
}
