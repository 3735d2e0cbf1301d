//! Error categorisation for user-facing failure reports.
//!
//! A failed compile carries a raw [`CompilerError`]; this module classifies
//! its message against a fixed pattern table and attaches severity and
//! suggestions derived from the pattern and from the submitted code.

use crate::validate::{CompilerError, SourceLocation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    SyntaxError,
    TypeError,
    ImportError,
    DependencyError,
    CompilationError,
    SystemError,
    UnknownError,
}

impl ErrorCategory {
    fn label(self) -> &'static str {
        match self {
            ErrorCategory::SyntaxError => "Syntax error",
            ErrorCategory::TypeError => "Type error",
            ErrorCategory::ImportError => "Import error",
            ErrorCategory::DependencyError => "Dependency error",
            ErrorCategory::CompilationError => "Compilation error",
            ErrorCategory::SystemError => "System error",
            ErrorCategory::UnknownError => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub original_error: String,
    pub suggestions: Vec<String>,
    pub location: Option<SourceLocation>,
}

struct Pattern {
    regex: Regex,
    category: ErrorCategory,
    severity: Severity,
    suggestions: &'static [&'static str],
}

fn pattern(
    re: &str,
    category: ErrorCategory,
    severity: Severity,
    suggestions: &'static [&'static str],
) -> Pattern {
    Pattern {
        regex: Regex::new(re).unwrap(),
        category,
        severity,
        suggestions,
    }
}

lazy_static! {
    // First match wins, so the specific `Could not resolve '<x>'` form is
    // listed ahead of the generic import pattern.
    static ref PATTERNS: Vec<Pattern> = vec![
        pattern(
            r"(?i)expected .* but found|unexpected end of file|unexpected token|expected `[^`]*`",
            ErrorCategory::SyntaxError,
            Severity::High,
            &[
                "Check the syntax near the reported position",
                "Make sure brackets and quotes are balanced",
            ],
        ),
        pattern(
            r"(?i)jsx element .* has no corresponding closing tag|expected corresponding jsx closing tag|react .*must be in scope",
            ErrorCategory::SyntaxError,
            Severity::High,
            &[
                "Check that every JSX tag is closed",
                "Self-closing tags must end with '/>'",
                "Add: import React from 'react'",
            ],
        ),
        pattern(
            r"(?i)could not resolve '[^']*'",
            ErrorCategory::DependencyError,
            Severity::Medium,
            &[
                "Check the package name",
                "Add the package to the libraries list, optionally with a version",
            ],
        ),
        pattern(
            r"(?i)cannot resolve module|module .* has no exported member|could not resolve|could not load",
            ErrorCategory::ImportError,
            Severity::Medium,
            &[
                "Check the module name",
                "Make sure relative imports point at a provided file",
            ],
        ),
        pattern(
            r"(?i)type .* is not assignable to type|property .* does not exist on type",
            ErrorCategory::TypeError,
            Severity::Medium,
            &["Check that value types match", "Add an explicit conversion"],
        ),
        pattern(
            r"(?i)circular import|build failed with \d+ errors?",
            ErrorCategory::CompilationError,
            Severity::High,
            &["Fix the errors listed above", "Break the import cycle"],
        ),
        pattern(
            r"ENOENT|EACCES|EPERM|(?i)out of memory|memory allocation failed",
            ErrorCategory::SystemError,
            Severity::Critical,
            &["Retry the request", "Reduce the size of the component"],
        ),
    ];

    static ref PATH_RE: Regex = Regex::new(r"/\S*\.(?:tsx|ts|jsx|js)\b").unwrap();
    static ref POSITION_RE: Regex = Regex::new(r":\d+:\d+").unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref LOCATION_RE: Regex =
        Regex::new(r"(?i)(?:line|:)\s*(\d+)(?:,?\s*(?:column|:)\s*(\d+))?").unwrap();
    static ref HOOK_USE_RE: Regex = Regex::new(r"\b(use[A-Z]\w*)\s*\(").unwrap();
}

/// Strip paths, positions and timestamps; collapse whitespace.
pub fn clean_message(message: &str) -> String {
    let cleaned = PATH_RE.replace_all(message, "<file>");
    let cleaned = POSITION_RE.replace_all(&cleaned, ":<line>:<column>");
    let cleaned = TIMESTAMP_RE.replace_all(&cleaned, "<timestamp>");
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let cut: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    format!("{}...", cut)
}

fn extract_location(message: &str) -> Option<SourceLocation> {
    let caps = LOCATION_RE.captures(message)?;
    let line = caps.get(1)?.as_str().parse().ok()?;
    let column = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(SourceLocation { line, column })
}

/// Classify `error` and attach suggestions informed by `code`.
pub fn describe(error: &CompilerError, code: &str) -> ErrorDetails {
    let original = error.message.clone();
    let cleaned = clean_message(&original);

    let matched = PATTERNS.iter().find(|p| p.regex.is_match(&cleaned));
    let (category, severity, mut suggestions) = match matched {
        Some(p) => (
            p.category,
            p.severity,
            p.suggestions.iter().map(|s| s.to_string()).collect(),
        ),
        None => (
            ErrorCategory::UnknownError,
            Severity::Medium,
            vec![
                "Check the code structure".to_string(),
                "See the full error message".to_string(),
            ],
        ),
    };
    suggestions.extend(error.hints.iter().cloned());
    suggestions.extend(code_suggestions(category, code));
    debug!(?category, ?severity, message = %cleaned, "error categorised");

    let location = if error.line > 0 {
        Some(SourceLocation {
            line: error.line,
            column: error.column,
        })
    } else {
        extract_location(&original)
    };

    ErrorDetails {
        code: error.code.clone(),
        message: format!("{}: {}", category.label(), truncate(&cleaned)),
        category,
        severity,
        original_error: original,
        suggestions,
        location,
    }
}

fn code_suggestions(category: ErrorCategory, code: &str) -> Vec<String> {
    let mut out = Vec::new();
    match category {
        ErrorCategory::SyntaxError => {
            for (open, close, name) in [('(', ')', "parentheses"), ('{', '}', "braces"), ('[', ']', "brackets")] {
                if code.matches(open).count() != code.matches(close).count() {
                    out.push(format!("Unbalanced {}", name));
                }
            }
        }
        ErrorCategory::ImportError | ErrorCategory::DependencyError => {
            if code.contains('<') && !code.contains("import React") {
                out.push("Try adding: import React from 'react'".to_string());
            }
        }
        ErrorCategory::TypeError => {
            if let Some(caps) = HOOK_USE_RE.captures(code) {
                let hook = &caps[1];
                if !code.contains(&format!("import {{ {}", hook)) {
                    out.push(format!("Try adding: import {{ {} }} from 'react'", hook));
                }
            }
        }
        _ => {}
    }
    out
}
