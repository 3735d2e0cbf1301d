//! Error taxonomy and validation gates.
//!
//! Every repair stage is gated by [`validate_source`]: the candidate text must
//! re-parse cleanly before it is allowed to replace the last known-good source.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse::{parse, SyntaxProfile};
use oxc_allocator::Allocator;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "TSX-PARSE-001";
pub const ERR_BUNDLE: &str = "TSX-BUNDLE-001";
pub const ERR_RESOLVE: &str = "TSX-RESOLVE-001";
pub const ERR_TRANSFORM: &str = "TSX-TRANSFORM-001";
pub const ERR_FORMAT: &str = "TSX-FORMAT-001";
pub const ERR_DOCUMENT: &str = "TSX-DOCUMENT-001";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "Source is parsed under the permissive, plain-script, type-stripped and wrapped profiles before failing.",
        ERR_BUNDLE => "A bundle is only produced when every module in the graph loads and transpiles.",
        ERR_RESOLVE => "Every import specifier is claimed by exactly one resolution hook.",
        ERR_TRANSFORM => "Type annotations and markup are fully lowered before output.",
        ERR_FORMAT => "Formatting never changes program semantics; failures keep the unformatted output.",
        ERR_DOCUMENT => "The HTML document always embeds the complete bundled module.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    /// Error without a meaningful source position.
    pub fn unlocated(code: &str, message: &str, file: &str) -> Self {
        Self::new(code, message, file, 0, 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION GATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Re-parse `source` and require success under the permissive or the
/// plain-script profile, semantic early errors included. No recovery
/// strategies are applied here.
pub fn validate_source(source: &str, filename: &str) -> Result<(), CompilerError> {
    let allocator = Allocator::default();
    let permissive = parse(&allocator, source, filename, SyntaxProfile::Permissive);
    if permissive.success {
        return Ok(());
    }

    let plain = parse(&allocator, source, filename, SyntaxProfile::PlainScript);
    if plain.success {
        return Ok(());
    }

    let first = permissive.errors.first();
    Err(CompilerError::new(
        ERR_PARSE,
        &first
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "source failed to parse".to_string()),
        filename,
        first.map(|e| e.line).unwrap_or(0),
        first.map(|e| e.column).unwrap_or(0),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CODE INSPECTION
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref RUNTIME_IMPORT_RE: Regex =
        Regex::new(r#"import\s+[^;]*from\s+['"]react['"]"#).unwrap();
    static ref COMPONENT_RE: Regex = Regex::new(
        r"(?m)(function\s+[A-Z][A-Za-z0-9_]*\s*\(|(const|let)\s+[A-Z][A-Za-z0-9_]*\s*(:[^=]+)?=\s*(\([^)]*\)|[A-Za-z_]\w*)\s*=>|export\s+default\s+)"
    )
    .unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChecks {
    pub has_jsx: bool,
    pub has_runtime_import: bool,
    pub has_component: bool,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeInspection {
    pub valid: bool,
    pub checks: CodeChecks,
    pub suggestions: Vec<String>,
    pub errors: Vec<CompilerError>,
}

/// Quick structural report on a piece of component source, without repairing it.
pub fn inspect_code(code: &str, filename: &str) -> CodeInspection {
    let allocator = Allocator::default();
    let outcome = parse(&allocator, code, filename, SyntaxProfile::Permissive);
    let has_jsx = outcome.success && crate::scope::contains_markup(&outcome.program);

    let complexity = match code.len() {
        0..=999 => Complexity::Low,
        1000..=4999 => Complexity::Medium,
        _ => Complexity::High,
    };

    let checks = CodeChecks {
        has_jsx,
        has_runtime_import: RUNTIME_IMPORT_RE.is_match(code),
        has_component: COMPONENT_RE.is_match(code),
        complexity,
    };

    let mut suggestions = Vec::new();
    if !checks.has_runtime_import {
        suggestions.push("Add an import from 'react'".to_string());
    }
    if !checks.has_jsx {
        suggestions.push("No JSX markup detected".to_string());
    }
    if checks.complexity == Complexity::High {
        suggestions.push("Component is large; consider splitting it".to_string());
    }

    let errors = outcome
        .errors
        .iter()
        .map(|e| CompilerError::new(ERR_PARSE, &e.message, filename, e.line, e.column))
        .collect();

    CodeInspection {
        valid: outcome.success,
        checks,
        suggestions,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_tsx() {
        let src = "const App = (p: { n: number }) => <div>{p.n}</div>;\nexport default App;";
        assert!(validate_source(src, "App.tsx").is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_source() {
        let err = validate_source("const x = ;", "App.tsx").unwrap_err();
        assert_eq!(err.code, ERR_PARSE);
        assert_eq!(err.line, 1);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_validate_rejects_misplaced_module_syntax() {
        let src = "function App() {\n  import React from 'react';\n  return <p/>;\n}\n";
        let err = validate_source(src, "App.tsx").unwrap_err();
        assert_eq!(err.code, ERR_PARSE);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_error_display_includes_code() {
        let err = CompilerError::new(ERR_BUNDLE, "boom", "entry.tsx", 3, 4);
        assert_eq!(err.to_string(), "[TSX-BUNDLE-001] boom (entry.tsx:3:4)");
        assert!(!err.guarantee.is_empty());
    }

    #[test]
    fn test_inspect_code() {
        let report = inspect_code(
            "import React from 'react';\nexport default function App() { return <p>hi</p>; }",
            "App.tsx",
        );
        assert!(report.valid);
        assert!(report.checks.has_jsx);
        assert!(report.checks.has_runtime_import);
        assert!(report.checks.has_component);
        assert_eq!(report.checks.complexity, Complexity::Low);
        assert!(report.suggestions.is_empty());
    }
}
