//! Binding and reference inventory.
//!
//! Both repair passes work from the same picture of a module: which names are
//! bound anywhere, which names are referenced (in source order), which names
//! are types, where the imports sit, and whether the module produces markup.

use crate::imports::{collect_imports, ImportEntry};
use crate::parse::{line_column, parse, ParseOutcome, SyntaxProfile};
use crate::validate::{CompilerError, ERR_PARSE};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, Class, Function, IdentifierReference, JSXElement, JSXFragment, Program,
    TSEnumDeclaration, TSInterfaceDeclaration, TSModuleDeclaration, TSModuleDeclarationName,
    TSTypeAliasDeclaration, TSTypeParameter,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

lazy_static::lazy_static! {
    /// Names that resolve at runtime in the preview document without any import.
    pub static ref KNOWN_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        // Language globals
        for name in [
            "Math", "console", "JSON", "Date", "String", "Number", "Boolean", "Array",
            "Object", "Promise", "Map", "Set", "WeakMap", "WeakSet", "Symbol", "BigInt",
            "Error", "TypeError", "RangeError", "SyntaxError", "RegExp", "Reflect", "Proxy",
            "Intl", "undefined", "NaN", "Infinity", "globalThis", "parseInt", "parseFloat",
            "isNaN", "isFinite", "encodeURIComponent", "decodeURIComponent", "encodeURI",
            "decodeURI", "structuredClone", "queueMicrotask", "arguments",
            "Uint8Array", "Int32Array", "Float32Array", "Float64Array", "ArrayBuffer",
            "DataView", "TextEncoder", "TextDecoder", "atob", "btoa",
        ] {
            s.insert(name);
        }

        // Browser environment
        for name in [
            "window", "document", "navigator", "location", "history", "localStorage",
            "sessionStorage", "fetch", "setTimeout", "clearTimeout", "setInterval",
            "clearInterval", "requestAnimationFrame", "cancelAnimationFrame", "alert",
            "confirm", "prompt", "performance", "crypto", "URL", "URLSearchParams",
            "FormData", "Blob", "File", "FileReader", "Headers", "Request", "Response",
            "AbortController", "Event", "CustomEvent", "KeyboardEvent", "MouseEvent",
            "HTMLElement", "HTMLInputElement", "HTMLDivElement", "HTMLCanvasElement",
            "Element", "Node", "Image", "Audio", "WebSocket", "Worker",
            "ResizeObserver", "IntersectionObserver", "MutationObserver",
            "getComputedStyle", "matchMedia", "innerWidth", "innerHeight",
        ] {
            s.insert(name);
        }

        // Ambient type names that show up in annotations
        for name in [
            "JSX", "Record", "Partial", "Required", "Readonly", "Pick", "Omit",
            "ReturnType", "Parameters", "Exclude", "Extract", "NonNullable", "Awaited",
        ] {
            s.insert(name);
        }

        // Preview host
        s.insert("__modelBridge");
        s
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every identifier reference, in source order.
struct ReferenceCollector {
    references: Vec<(String, Span)>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references.push((ident.name.to_string(), ident.span));
    }
}

/// Every bound name anywhere in the module, plus every declared type name.
///
/// Scopes are flattened: a name bound in any scope counts as bound everywhere.
pub struct BindingCollector<'s> {
    pub symbols: &'s mut HashSet<String>,
    pub types: &'s mut HashSet<String>,
}

impl<'s, 'b> Visit<'b> for BindingCollector<'s> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'b>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, func: &Function<'b>, flags: ScopeFlags) {
        if let Some(id) = &func.id {
            self.symbols.insert(id.name.to_string());
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_class(&mut self, class: &Class<'b>) {
        if let Some(id) = &class.id {
            self.symbols.insert(id.name.to_string());
        }
        walk::walk_class(self, class);
    }

    fn visit_ts_interface_declaration(&mut self, decl: &TSInterfaceDeclaration<'b>) {
        self.types.insert(decl.id.name.to_string());
        walk::walk_ts_interface_declaration(self, decl);
    }

    fn visit_ts_type_alias_declaration(&mut self, decl: &TSTypeAliasDeclaration<'b>) {
        self.types.insert(decl.id.name.to_string());
        walk::walk_ts_type_alias_declaration(self, decl);
    }

    fn visit_ts_type_parameter(&mut self, param: &TSTypeParameter<'b>) {
        self.types.insert(param.name.name.to_string());
        walk::walk_ts_type_parameter(self, param);
    }

    fn visit_ts_enum_declaration(&mut self, decl: &TSEnumDeclaration<'b>) {
        self.symbols.insert(decl.id.name.to_string());
        self.types.insert(decl.id.name.to_string());
        walk::walk_ts_enum_declaration(self, decl);
    }

    fn visit_ts_module_declaration(&mut self, decl: &TSModuleDeclaration<'b>) {
        if let TSModuleDeclarationName::Identifier(id) = &decl.id {
            self.symbols.insert(id.name.to_string());
            self.types.insert(id.name.to_string());
        }
        walk::walk_ts_module_declaration(self, decl);
    }
}

/// Records the first markup-producing node.
struct MarkupFinder {
    first: Option<Span>,
}

impl<'a> Visit<'a> for MarkupFinder {
    fn visit_jsx_element(&mut self, elem: &JSXElement<'a>) {
        if self.first.is_none() {
            self.first = Some(elem.span);
        }
    }

    fn visit_jsx_fragment(&mut self, frag: &JSXFragment<'a>) {
        if self.first.is_none() {
            self.first = Some(frag.span);
        }
    }
}

pub fn first_markup(program: &Program) -> Option<Span> {
    let mut finder = MarkupFinder { first: None };
    finder.visit_program(program);
    finder.first
}

pub fn contains_markup(program: &Program) -> bool {
    first_markup(program).is_some()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

/// Owned snapshot of a parsed module. Holds no arena data, so it can outlive
/// the allocator and be carried across await points.
#[derive(Debug, Clone)]
pub struct SourceAnalysis {
    pub imports: Vec<ImportEntry>,
    pub bindings: HashSet<String>,
    pub type_names: HashSet<String>,
    pub references: Vec<Reference>,
    pub referenced: HashSet<String>,
    pub markup: Option<Span>,
    /// Offset at which a first import may be inserted: after any hashbang and
    /// directive prologue.
    pub top_offset: u32,
}

impl SourceAnalysis {
    /// Parse `source` (permissive, then plain script; no rewriting recovery)
    /// and take the inventory.
    pub fn analyze(source: &str, filename: &str) -> Result<Self, CompilerError> {
        let allocator = Allocator::default();
        let mut outcome = parse(&allocator, source, filename, SyntaxProfile::Permissive);
        if !outcome.success {
            let plain = parse(&allocator, source, filename, SyntaxProfile::PlainScript);
            if !plain.success {
                let first = &outcome.errors[0];
                return Err(CompilerError::new(
                    ERR_PARSE,
                    &first.message,
                    filename,
                    first.line,
                    first.column,
                ));
            }
            outcome = plain;
        }
        Ok(Self::from_outcome(&outcome))
    }

    pub fn from_outcome(outcome: &ParseOutcome) -> Self {
        let program = &outcome.program;

        let mut refs = ReferenceCollector { references: vec![] };
        refs.visit_program(program);

        let mut bindings = HashSet::new();
        let mut type_names = HashSet::new();
        BindingCollector {
            symbols: &mut bindings,
            types: &mut type_names,
        }
        .visit_program(program);

        let references: Vec<Reference> = refs
            .references
            .into_iter()
            .map(|(name, span)| Reference {
                name,
                start: span.start,
                end: span.end,
            })
            .collect();
        let referenced = references.iter().map(|r| r.name.clone()).collect();

        let mut top_offset = 0u32;
        if let Some(hashbang) = &program.hashbang {
            top_offset = top_offset.max(hashbang.span.end);
        }
        if let Some(last) = program.directives.last() {
            top_offset = top_offset.max(last.span().end);
        }
        if top_offset > 0 {
            let rest = &outcome.source[top_offset as usize..];
            if let Some(nl) = rest.find('\n') {
                top_offset += nl as u32 + 1;
            } else {
                top_offset = outcome.source.len() as u32;
            }
        }

        Self {
            imports: collect_imports(program, outcome.source),
            bindings,
            type_names,
            references,
            referenced,
            markup: first_markup(program),
            top_offset,
        }
    }

    /// Bound as a runtime value. A name that only a type-only import binds
    /// does not count.
    pub fn is_bound(&self, name: &str) -> bool {
        if !self.bindings.contains(name) {
            return false;
        }
        let mut importers = self.imports.iter().filter(|e| e.binds(name)).peekable();
        importers.peek().is_none() || importers.any(|e| e.binds_value(name))
    }

    pub fn is_type_name(&self, name: &str) -> bool {
        self.type_names.contains(name)
    }

    /// References with no binding anywhere in the module that are neither a
    /// known global nor a declared type. Each name is reported once, at its
    /// first occurrence.
    pub fn undefined_references(&self) -> Vec<&Reference> {
        let mut seen = HashSet::new();
        self.references
            .iter()
            .filter(|r| {
                !self.bindings.contains(&r.name)
                    && !self.type_names.contains(&r.name)
                    && !KNOWN_GLOBALS.contains(r.name.as_str())
                    && seen.insert(r.name.as_str())
            })
            .collect()
    }

    pub fn has_markup(&self) -> bool {
        self.markup.is_some()
    }

    pub fn location(source: &str, offset: u32) -> (u32, u32) {
        line_column(source, offset as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_references_skip_bindings_types_and_globals() {
        let src = r#"
interface Props { label: string }
type Mode = 'a' | 'b';
export function Card({ label }: Props) {
  const [open, setOpen] = useState(false);
  const m: Mode = 'a';
  console.log(window.innerWidth, m);
  return <Button onClick={() => setOpen(!open)}>{label}</Button>;
}
"#;
        let analysis = SourceAnalysis::analyze(src, "Card.tsx").unwrap();
        let names: Vec<&str> = analysis
            .undefined_references()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["useState", "Button"]);
        assert!(analysis.has_markup());
        assert!(analysis.is_type_name("Props"));
        assert!(analysis.is_bound("setOpen"));
    }

    #[test]
    fn test_top_offset_skips_directives() {
        let src = "'use client';\nconst a = 1;\n";
        let analysis = SourceAnalysis::analyze(src, "a.tsx").unwrap();
        assert_eq!(analysis.top_offset as usize, "'use client';\n".len());

        let analysis = SourceAnalysis::analyze("const a = 1;", "a.tsx").unwrap();
        assert_eq!(analysis.top_offset, 0);
    }

    #[test]
    fn test_analyze_reports_parse_error() {
        let err = SourceAnalysis::analyze("const = ;", "a.tsx").unwrap_err();
        assert_eq!(err.code, ERR_PARSE);
    }

    #[test]
    fn test_type_only_imports_are_not_value_bindings() {
        let src = "import type React from 'react';\nimport { type FC, useState } from 'react';\nconst A: FC = () => null;\nuseState(0);\n";
        let analysis = SourceAnalysis::analyze(src, "a.tsx").unwrap();
        assert!(!analysis.is_bound("React"));
        assert!(!analysis.is_bound("FC"));
        assert!(analysis.is_bound("useState"));
        assert!(analysis.is_bound("A"));
    }

    #[test]
    fn test_import_bindings_count_as_bound() {
        let src = "import { useState } from 'react';\nuseState(0);\n";
        let analysis = SourceAnalysis::analyze(src, "a.tsx").unwrap();
        assert!(analysis.undefined_references().is_empty());
        assert!(analysis.referenced.contains("useState"));
    }
}
