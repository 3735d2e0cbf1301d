//! Source Parser
//!
//! Turns component source text into an oxc `Program`. Three syntax profiles are
//! supported, and a failed parse is retried through an ordered recovery chain:
//!
//! 1. re-parse under the plain-script profile,
//! 2. strip type-annotation-looking text and re-parse as plain script,
//! 3. wrap the statement body in a default-exported function and re-parse
//!    permissively. Module-level imports and re-exports stay outside the wrapper.
//!
//! The first strategy that succeeds wins. If all fail, the original error is kept.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// PROFILES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyntaxProfile {
    /// TypeScript + JSX + module syntax, with every extension oxc supports.
    Permissive,
    /// Plain ECMAScript module, no markup and no type syntax.
    Strict,
    /// JavaScript + JSX, no type annotations.
    PlainScript,
}

impl SyntaxProfile {
    pub fn source_type(self) -> SourceType {
        match self {
            SyntaxProfile::Permissive => SourceType::default()
                .with_typescript(true)
                .with_jsx(true)
                .with_module(true),
            SyntaxProfile::Strict => SourceType::default().with_module(true),
            SyntaxProfile::PlainScript => SourceType::default().with_jsx(true).with_module(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    PlainScript,
    StrippedTypes,
    WrappedFunction,
}

impl RecoveryStrategy {
    pub fn describe(self) -> &'static str {
        match self {
            RecoveryStrategy::PlainScript => "re-parsed as plain script",
            RecoveryStrategy::StrippedTypes => "stripped type annotations",
            RecoveryStrategy::WrappedFunction => "wrapped source in a function body",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParseDiagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseDiagnostic {
    pub fn at(source: &str, offset: usize, message: String) -> Self {
        let (line, column) = line_column(source, offset);
        Self {
            message,
            line,
            column,
        }
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.line, self.column)
    }
}

pub struct ParseOutcome<'a> {
    pub success: bool,
    pub program: Program<'a>,
    /// The text that was actually parsed. Differs from the input when a
    /// rewriting recovery strategy won.
    pub source: &'a str,
    pub profile: SyntaxProfile,
    pub errors: Vec<ParseDiagnostic>,
    pub warnings: Vec<String>,
    pub recovery: Option<RecoveryStrategy>,
}

impl<'a> ParseOutcome<'a> {
    fn recovered(mut self, strategy: RecoveryStrategy, filename: &str) -> Self {
        self.recovery = Some(strategy);
        self.warnings.push(format!(
            "{} parsed after recovery: {}",
            filename,
            strategy.describe()
        ));
        self
    }

    /// True when the parsed text is not the text that was handed in.
    pub fn rewrote_source(&self) -> bool {
        matches!(
            self.recovery,
            Some(RecoveryStrategy::StrippedTypes) | Some(RecoveryStrategy::WrappedFunction)
        )
    }
}

/// 1-based line and column for a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source[..floor_char_boundary(source, offset)];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() as u32 + 1,
        None => before.chars().count() as u32 + 1,
    };
    (line, column)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse `source` under a single profile. No recovery.
pub fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    filename: &str,
    profile: SyntaxProfile,
) -> ParseOutcome<'a> {
    let ret = Parser::new(allocator, source, profile.source_type()).parse();

    let mut errors: Vec<ParseDiagnostic> = ret
        .errors
        .iter()
        .map(|e| diagnostic(source, e))
        .collect();

    if ret.panicked && errors.is_empty() {
        errors.push(ParseDiagnostic::at(
            source,
            0,
            "parser aborted before producing a program".to_string(),
        ));
    }

    // Early errors the parser leaves to semantic analysis, such as an import
    // declaration nested in a function body.
    if errors.is_empty() {
        let checked = SemanticBuilder::new()
            .with_check_syntax_error(true)
            .build(&ret.program);
        errors.extend(checked.errors.iter().map(|e| diagnostic(source, e)));
    }

    let success = errors.is_empty();
    if !success {
        debug!(
            file = filename,
            ?profile,
            error = %errors[0],
            "parse failed"
        );
    }

    ParseOutcome {
        success,
        program: ret.program,
        source,
        profile,
        errors,
        warnings: Vec::new(),
        recovery: None,
    }
}

fn diagnostic(source: &str, error: &oxc_diagnostics::OxcDiagnostic) -> ParseDiagnostic {
    let offset = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0);
    ParseDiagnostic::at(source, offset, error.message.to_string())
}

/// Parse with the full recovery chain.
pub fn parse_with_recovery<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    filename: &str,
    profile: SyntaxProfile,
) -> ParseOutcome<'a> {
    let first = parse(allocator, source, filename, profile);
    if first.success {
        return first;
    }

    let plain = parse(allocator, source, filename, SyntaxProfile::PlainScript);
    if plain.success {
        return plain.recovered(RecoveryStrategy::PlainScript, filename);
    }

    let stripped: &'a str = allocator.alloc_str(&strip_type_annotations(source));
    let outcome = parse(allocator, stripped, filename, SyntaxProfile::PlainScript);
    if outcome.success {
        return outcome.recovered(RecoveryStrategy::StrippedTypes, filename);
    }

    let wrapped: &'a str = allocator.alloc_str(&wrap_in_function(source));
    let outcome = parse(allocator, wrapped, filename, SyntaxProfile::Permissive);
    if outcome.success {
        return outcome.recovered(RecoveryStrategy::WrappedFunction, filename);
    }

    warn!(
        file = filename,
        error = %first.errors[0],
        "all parse recovery strategies failed"
    );
    first
}

/// Text of the first strategy that rewrites `source` into something that
/// parses, or `None` when the source parses as-is or nothing helps.
pub fn recover_source(source: &str, filename: &str) -> Option<(String, RecoveryStrategy)> {
    let allocator = Allocator::default();
    let outcome = parse_with_recovery(&allocator, source, filename, SyntaxProfile::Permissive);
    match outcome.recovery {
        Some(strategy) if outcome.success && outcome.rewrote_source() => {
            Some((outcome.source.to_string(), strategy))
        }
        _ => None,
    }
}

pub const RECOVERED_COMPONENT: &str = "__RecoveredComponent";

lazy_static! {
    static ref IMPORT_START_RE: Regex =
        Regex::new(r#"^\s*import(?:\s+|\s*[{*'"])"#).unwrap();
    static ref IMPORT_END_RE: Regex =
        Regex::new(r#"(?:\bfrom\s*|^\s*import\s*)['"][^'"\n]*['"]"#).unwrap();
    static ref REEXPORT_RE: Regex = Regex::new(
        r#"^\s*export\s*(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"][^'"\n]*['"]\s*;?\s*$"#
    )
    .unwrap();
    static ref EXPORT_LIST_RE: Regex =
        Regex::new(r"^\s*export\s*\{[^}]*\}\s*;?\s*$").unwrap();
    static ref EXPORT_DEFAULT_NAME_RE: Regex =
        Regex::new(r"^\s*export\s+default\s+[A-Za-z_$][\w$]*\s*;?\s*$").unwrap();
    static ref EXPORT_DECL_RE: Regex = Regex::new(
        r"^(\s*)export\s+(?:default\s+)?((?:async\s+)?function\b|class\b|const\b|let\b|var\b)"
    )
    .unwrap();
}

/// Wrap loose statements (a top-level `return`, say) in a default-exported
/// component function.
///
/// Imports and re-exports are hoisted above the wrapper. `export` keywords on
/// declarations inside the body are dropped, as are bare `export default X;`
/// and local `export { .. }` lines, since the wrapper is the module's export.
pub fn wrap_in_function(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut hoisted: Vec<&str> = Vec::new();
    let mut body: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if IMPORT_START_RE.is_match(line) {
            let mut statement = line.to_string();
            let mut end = i;
            while !IMPORT_END_RE.is_match(&statement) && end + 1 < lines.len() {
                end += 1;
                statement.push('\n');
                statement.push_str(lines[end]);
            }
            if IMPORT_END_RE.is_match(&statement) {
                hoisted.extend(&lines[i..=end]);
                i = end + 1;
                continue;
            }
        }

        if REEXPORT_RE.is_match(line) {
            hoisted.push(line);
        } else if EXPORT_DEFAULT_NAME_RE.is_match(line) || EXPORT_LIST_RE.is_match(line) {
            // dropped
        } else {
            body.push(EXPORT_DECL_RE.replace(line, "$1$2").into_owned());
        }
        i += 1;
    }

    let mut out = String::new();
    for line in hoisted {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!(
        "export default function {}() {{\n{}\n}}\n",
        RECOVERED_COMPONENT,
        body.join("\n")
    ));
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE STRIPPING
// ═══════════════════════════════════════════════════════════════════════════════

const TYPE_ATOM: &str = r#"(?:[A-Za-z_$][\w$.]*(?:<[^<>;=]*(?:<[^<>;=]*>[^<>;=]*)*>)?|'[^'\n]*'|"[^"\n]*")(?:\[\])*"#;

lazy_static! {
    static ref IMPORT_TYPE_RE: Regex =
        Regex::new(r#"(?m)^[ \t]*import\s+type\s+[^;\n]+;?[ \t]*$"#).unwrap();
    static ref EXPORT_TYPE_LIST_RE: Regex =
        Regex::new(r#"(?m)^[ \t]*export\s+type\s+\{[^}]*\}[^;\n]*;?[ \t]*$"#).unwrap();
    static ref INTERFACE_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?interface\s+[A-Za-z_$][\w$]*[^{]*\{"
    )
    .unwrap();
    static ref TYPE_ALIAS_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?type\s+[A-Za-z_$][\w$]*\s*(?:<[^=]*>)?\s*="
    )
    .unwrap();
    static ref GENERIC_CALL_RE: Regex = Regex::new(
        r"\b(use[A-Z]\w*|useState|useRef|useMemo|useCallback|useReducer|useContext|createContext|forwardRef|memo)\s*<[^<>()]*(?:<[^<>()]*>[^<>()]*)*>\s*\("
    )
    .unwrap();
    static ref CAST_RE: Regex = Regex::new(&format!(
        r"\s+as\s+(?:const\b|{ty}(?:\s*\|\s*{ty})*)",
        ty = TYPE_ATOM
    ))
    .unwrap();
    static ref DECL_ANNOTATION_RE: Regex = Regex::new(&format!(
        r"\b(const|let|var)(\s+[A-Za-z_$][\w$]*)\s*:\s*{ty}(?:\s*\|\s*{ty})*(\s*=)",
        ty = TYPE_ATOM
    ))
    .unwrap();
    static ref PARAM_ANNOTATION_RE: Regex = Regex::new(&format!(
        r"([(,]\s*(?:\.\.\.)?[A-Za-z_$][\w$]*)\??\s*:\s*{ty}(?:\s*\|\s*{ty})*(\s*[,)=])",
        ty = TYPE_ATOM
    ))
    .unwrap();
    static ref PATTERN_ANNOTATION_RE: Regex = Regex::new(&format!(
        r"([}}\]])\s*:\s*{ty}(?:\s*\|\s*{ty})*(\s*[,)=])",
        ty = TYPE_ATOM
    ))
    .unwrap();
    static ref RETURN_ANNOTATION_RE: Regex = Regex::new(&format!(
        r"\)\s*:\s*{ty}(?:\s*\|\s*{ty})*(\s*(?:=>|\{{))",
        ty = TYPE_ATOM
    ))
    .unwrap();
    static ref NON_NULL_RE: Regex = Regex::new(r"([\w$)\]])!([.\[);,])").unwrap();
}

/// Best-effort mechanical removal of TypeScript-only syntax.
///
/// The output is not guaranteed to be valid; callers re-parse it.
pub fn strip_type_annotations(source: &str) -> String {
    let mut out = IMPORT_TYPE_RE.replace_all(source, "").into_owned();
    out = EXPORT_TYPE_LIST_RE.replace_all(&out, "").into_owned();
    out = remove_interfaces(&out);
    out = remove_type_aliases(&out);
    out = GENERIC_CALL_RE.replace_all(&out, "$1(").into_owned();

    // Casts and annotations are only stripped outside import/export lists,
    // where `as` introduces an alias rather than a type.
    let lines: Vec<String> = out
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("import ") || trimmed.starts_with("export {") {
                return line.to_string();
            }
            let line = CAST_RE.replace_all(line, "");
            let line = DECL_ANNOTATION_RE.replace_all(&line, "$1$2$3");
            let line = PARAM_ANNOTATION_RE.replace_all(&line, "$1$2");
            let line = PATTERN_ANNOTATION_RE.replace_all(&line, "$1$2");
            let line = RETURN_ANNOTATION_RE.replace_all(&line, ")$1");
            NON_NULL_RE.replace_all(&line, "$1$2").into_owned()
        })
        .collect();

    let mut joined = lines.join("\n");
    if source.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

fn remove_interfaces(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    while let Some(m) = INTERFACE_RE.find_at(source, cursor) {
        let open = m.end() - 1;
        match find_balanced_brace_end(source, open) {
            Some(end) => {
                out.push_str(&source[cursor..m.start()]);
                cursor = end;
            }
            None => break,
        }
    }
    out.push_str(&source[cursor..]);
    out
}

fn remove_type_aliases(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    while let Some(m) = TYPE_ALIAS_RE.find_at(source, cursor) {
        out.push_str(&source[cursor..m.start()]);
        cursor = end_of_type_expression(source, m.end());
    }
    out.push_str(&source[cursor..]);
    out
}

/// Scan forward from `start` to the end of a type expression: a `;` at depth
/// zero, or a newline at depth zero not followed by a `|`/`&` continuation.
fn end_of_type_expression(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut depth: i32 = 0;
    let mut i = start;
    let mut seen_content = false;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'(' | b'[' | b'<' => depth += 1,
            b'}' | b')' | b']' | b'>' => depth -= 1,
            b';' if depth <= 0 => return i + 1,
            b'\n' if depth <= 0 && seen_content => {
                let rest = source[i + 1..].trim_start();
                if !(rest.starts_with('|') || rest.starts_with('&')) {
                    return i;
                }
            }
            b if !b.is_ascii_whitespace() => seen_content = true,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Find the end of a balanced brace expression, handling strings and template literals.
/// `start_index` must point at the opening `{`. Returns the byte index after the
/// closing brace, or None if unbalanced.
fn find_balanced_brace_end(source: &str, start_index: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0;
    let mut i = start_index;
    let mut in_string: Option<u8> = None;

    while i < bytes.len() {
        let c = bytes[i];

        if c == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            b'"' | b'\'' | b'`' => in_string = Some(c),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissive_profile_accepts_tsx() {
        let allocator = Allocator::default();
        let src = "interface P { n: number }\nexport const A = ({ n }: P) => <b>{n}</b>;";
        let outcome = parse(&allocator, src, "A.tsx", SyntaxProfile::Permissive);
        assert!(outcome.success);
        assert!(outcome.recovery.is_none());
    }

    #[test]
    fn test_strict_profile_rejects_markup() {
        let allocator = Allocator::default();
        let outcome = parse(&allocator, "const a = <div/>;", "a.js", SyntaxProfile::Strict);
        assert!(!outcome.success);
        assert_eq!(outcome.errors[0].line, 1);
    }

    #[test]
    fn test_recovery_plain_script() {
        let allocator = Allocator::default();
        let outcome =
            parse_with_recovery(&allocator, "const a = <div/>;", "a.js", SyntaxProfile::Strict);
        assert!(outcome.success);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::PlainScript));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(!outcome.rewrote_source());
    }

    #[test]
    fn test_recovery_stripped_types() {
        let allocator = Allocator::default();
        let src = "type Props = { n: number };\nconst a = (p: Props) => <div>{p.n}</div>;";
        let outcome = parse_with_recovery(&allocator, src, "a.tsx", SyntaxProfile::Strict);
        assert!(outcome.success);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::StrippedTypes));
        assert!(!outcome.source.contains("Props"));
    }

    #[test]
    fn test_recovery_wrapped_function() {
        let allocator = Allocator::default();
        let src = "const n = 1;\nreturn <div>{n}</div>;";
        let outcome = parse_with_recovery(&allocator, src, "a.tsx", SyntaxProfile::Permissive);
        assert!(outcome.success);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::WrappedFunction));
        assert!(outcome
            .source
            .starts_with("export default function __RecoveredComponent()"));
    }

    #[test]
    fn test_wrapped_recovery_hoists_imports() {
        let src = "import React from 'react';\nimport {\n  useState,\n} from 'react';\nexport { cn } from './utils';\nconst [n] = useState(0);\nreturn <div>{n}</div>;\n";
        let allocator = Allocator::default();
        let outcome = parse_with_recovery(&allocator, src, "a.tsx", SyntaxProfile::Permissive);
        assert!(outcome.success, "{:?}", outcome.errors);
        assert_eq!(outcome.recovery, Some(RecoveryStrategy::WrappedFunction));
        assert_eq!(
            outcome.source,
            "import React from 'react';\nimport {\n  useState,\n} from 'react';\nexport { cn } from './utils';\nexport default function __RecoveredComponent() {\nconst [n] = useState(0);\nreturn <div>{n}</div>;\n}\n"
        );
    }

    #[test]
    fn test_wrapped_recovery_drops_inner_exports() {
        let src = "export const label = 'hi';\nexport default function Inner() { return null; }\nreturn <p>{label}</p>;\nexport default Inner;\n";
        let wrapped = wrap_in_function(src);
        assert!(!wrapped.contains("export const"));
        assert!(!wrapped.contains("export default Inner"));
        assert!(wrapped.contains("function Inner()"));
        assert_eq!(wrapped.matches("export default").count(), 1);

        let allocator = Allocator::default();
        let outcome = parse(&allocator, &wrapped, "a.tsx", SyntaxProfile::Permissive);
        assert!(outcome.success, "{:?}", outcome.errors);
    }

    #[test]
    fn test_nested_import_is_an_error() {
        let allocator = Allocator::default();
        let src = "function f() {\n  import React from 'react';\n}\n";
        let outcome = parse(&allocator, src, "a.tsx", SyntaxProfile::Permissive);
        assert!(!outcome.success);
        assert_eq!(outcome.errors[0].line, 2);
    }

    #[test]
    fn test_recover_source() {
        assert!(recover_source("export default () => <p/>;", "a.tsx").is_none());
        let (text, strategy) = recover_source("return <p/>;", "a.tsx").unwrap();
        assert_eq!(strategy, RecoveryStrategy::WrappedFunction);
        assert!(text.contains("export default function __RecoveredComponent"));
        assert!(recover_source("const x = ;", "a.tsx").is_none());
    }

    #[test]
    fn test_all_strategies_fail_keeps_original_error() {
        let allocator = Allocator::default();
        let src = "const x = ;\n";
        let outcome = parse_with_recovery(&allocator, src, "a.tsx", SyntaxProfile::Permissive);
        assert!(!outcome.success);
        assert!(outcome.recovery.is_none());
        assert_eq!(outcome.source, src);
        assert_eq!(outcome.errors[0].line, 1);
        assert!(!outcome.errors[0].message.is_empty());
    }

    #[test]
    fn test_strip_type_annotations() {
        let src = r#"import type { FC } from 'react';
interface Props {
  title: string;
  nested: { a: number };
}
type Mode = 'a' | 'b';
const [v, setV] = useState<string | null>(null);
const el = ref.current!.focus();
function Card({ title }: Props): JSX.Element {
  const n: number = 1;
  return <div>{title as string}</div>;
}
"#;
        let out = strip_type_annotations(src);
        assert!(!out.contains("interface"));
        assert!(!out.contains("type Mode"));
        assert!(!out.contains("import type"));
        assert!(out.contains("useState(null)"));
        assert!(out.contains("ref.current.focus()"));
        assert!(out.contains("function Card({ title })"));
        assert!(out.contains("const n = 1;"));
        assert!(out.contains("{title}"));
    }

    #[test]
    fn test_strip_keeps_import_aliases() {
        let src = "import { HelpCircle as Star } from 'lucide-react';\n";
        assert_eq!(strip_type_annotations(src), src);
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("ab\ncd", 0), (1, 1));
        assert_eq!(line_column("ab\ncd", 4), (2, 2));
        assert_eq!(line_column("ab", 99), (1, 3));
    }

    #[test]
    fn test_find_balanced_brace() {
        assert_eq!(find_balanced_brace_end("{hello}", 0), Some(7));
        assert_eq!(find_balanced_brace_end("{'a { b'}", 0), Some(9));
        assert_eq!(find_balanced_brace_end("{ open", 0), None);
    }
}
