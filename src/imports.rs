//! Import-declaration inventory and emission.
//!
//! Collected straight from the module's top-level `ImportDeclaration`s, with
//! byte offsets so repairs can splice against the original text.

use oxc_ast::ast::{ImportDeclarationSpecifier, ModuleExportName, Program, Statement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecifierKind {
    Default,
    Namespace,
    Named,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub kind: SpecifierKind,
    /// Exported name for named specifiers; `default` / `*` otherwise.
    pub imported: String,
    pub local: String,
    pub type_only: bool,
    pub start: u32,
    pub end: u32,
}

impl ImportSpec {
    pub fn named(imported: &str, local: &str) -> Self {
        Self {
            kind: SpecifierKind::Named,
            imported: imported.to_string(),
            local: local.to_string(),
            type_only: false,
            start: 0,
            end: 0,
        }
    }

    pub fn default(local: &str) -> Self {
        Self {
            kind: SpecifierKind::Default,
            imported: "default".to_string(),
            local: local.to_string(),
            type_only: false,
            start: 0,
            end: 0,
        }
    }

    pub fn namespace(local: &str) -> Self {
        Self {
            kind: SpecifierKind::Namespace,
            imported: "*".to_string(),
            local: local.to_string(),
            type_only: false,
            start: 0,
            end: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub source: String,
    pub start: u32,
    pub end: u32,
    pub quote: char,
    pub type_only: bool,
    /// `import 'x';` with no specifier list at all.
    pub side_effect: bool,
    pub specifiers: Vec<ImportSpec>,
    /// Offset of the `{` opening the named list, when present.
    pub brace_open: Option<u32>,
}

impl ImportEntry {
    pub fn default_spec(&self) -> Option<&ImportSpec> {
        self.specifiers
            .iter()
            .find(|s| s.kind == SpecifierKind::Default)
    }

    pub fn namespace_spec(&self) -> Option<&ImportSpec> {
        self.specifiers
            .iter()
            .find(|s| s.kind == SpecifierKind::Namespace)
    }

    pub fn named_specs(&self) -> impl Iterator<Item = &ImportSpec> {
        self.specifiers
            .iter()
            .filter(|s| s.kind == SpecifierKind::Named)
    }

    pub fn binds(&self, local: &str) -> bool {
        self.specifiers.iter().any(|s| s.local == local)
    }

    /// True when `local` is bound by this declaration as a runtime value,
    /// not through `import type` or an inline `type` specifier.
    pub fn binds_value(&self, local: &str) -> bool {
        !self.type_only
            && self
                .specifiers
                .iter()
                .any(|s| s.local == local && !s.type_only)
    }

    /// The same declaration with the statement-level `type` keyword dropped.
    /// Named specifiers stay type-only.
    pub fn value_model(&self) -> ImportModel {
        let mut model = self.model();
        if model.type_only {
            model.type_only = false;
            for spec in &mut model.specifiers {
                if spec.kind == SpecifierKind::Named {
                    spec.type_only = true;
                }
            }
        }
        model
    }

    pub fn model(&self) -> ImportModel {
        ImportModel {
            source: self.source.clone(),
            type_only: self.type_only,
            specifiers: self.specifiers.clone(),
        }
    }
}

pub fn collect_imports(program: &Program, source: &str) -> Vec<ImportEntry> {
    let mut entries = Vec::new();

    for stmt in program.body.iter() {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };

        let mut specifiers = Vec::new();
        if let Some(list) = &decl.specifiers {
            for specifier in list.iter() {
                let spec = match specifier {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => ImportSpec {
                        kind: SpecifierKind::Named,
                        imported: export_name(&s.imported),
                        local: s.local.name.to_string(),
                        type_only: s.import_kind.is_type(),
                        start: s.span.start,
                        end: s.span.end,
                    },
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportSpec {
                        kind: SpecifierKind::Default,
                        imported: "default".to_string(),
                        local: s.local.name.to_string(),
                        type_only: false,
                        start: s.span.start,
                        end: s.span.end,
                    },
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ImportSpec {
                        kind: SpecifierKind::Namespace,
                        imported: "*".to_string(),
                        local: s.local.name.to_string(),
                        type_only: false,
                        start: s.span.start,
                        end: s.span.end,
                    },
                };
                specifiers.push(spec);
            }
        }

        let decl_start = decl.span.start as usize;
        let source_start = decl.source.span.start as usize;
        let brace_open = source
            .get(decl_start..source_start)
            .and_then(|head| head.find('{'))
            .map(|i| (decl_start + i) as u32);
        let quote = source[source_start..].chars().next().unwrap_or('\'');

        entries.push(ImportEntry {
            source: decl.source.value.to_string(),
            start: decl.span.start,
            end: decl.span.end,
            quote: if quote == '"' { '"' } else { '\'' },
            type_only: decl.import_kind.is_type(),
            side_effect: decl.specifiers.is_none(),
            specifiers,
            brace_open,
        });
    }

    entries
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMISSION
// ═══════════════════════════════════════════════════════════════════════════════

/// A declaration to be printed, independent of any source offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportModel {
    pub source: String,
    pub type_only: bool,
    pub specifiers: Vec<ImportSpec>,
}

impl ImportModel {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            type_only: false,
            specifiers: Vec::new(),
        }
    }

    pub fn with(mut self, spec: ImportSpec) -> Self {
        self.push(spec);
        self
    }

    /// Add a specifier unless its local name is already bound here.
    pub fn push(&mut self, spec: ImportSpec) {
        if !self.specifiers.iter().any(|s| s.local == spec.local) {
            self.specifiers.push(spec);
        }
    }

    pub fn emit(&self, quote: char) -> String {
        let default = self
            .specifiers
            .iter()
            .find(|s| s.kind == SpecifierKind::Default);
        let namespace = self
            .specifiers
            .iter()
            .find(|s| s.kind == SpecifierKind::Namespace);
        let named: Vec<String> = self
            .specifiers
            .iter()
            .filter(|s| s.kind == SpecifierKind::Named)
            .map(|s| {
                let prefix = if s.type_only && !self.type_only {
                    "type "
                } else {
                    ""
                };
                if s.imported == s.local {
                    format!("{}{}", prefix, s.local)
                } else {
                    format!("{}{} as {}", prefix, s.imported, s.local)
                }
            })
            .collect();

        let mut clauses = Vec::new();
        if let Some(d) = default {
            clauses.push(d.local.clone());
        }
        if let Some(ns) = namespace {
            clauses.push(format!("* as {}", ns.local));
        }
        if !named.is_empty() {
            clauses.push(format!("{{ {} }}", named.join(", ")));
        }

        let keyword = if self.type_only { "import type" } else { "import" };
        if clauses.is_empty() {
            format!("import {q}{}{q};", self.source, q = quote)
        } else {
            format!(
                "{} {} from {q}{}{q};",
                keyword,
                clauses.join(", "),
                self.source,
                q = quote
            )
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECIFIER HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub const ALIAS_PREFIXES: &[&str] = &["@/", "~/", "#/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportGroup {
    External,
    Alias,
    Relative,
}

pub fn import_group(specifier: &str) -> ImportGroup {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        ImportGroup::Relative
    } else if ALIAS_PREFIXES.iter().any(|p| specifier.starts_with(p)) {
        ImportGroup::Alias
    } else {
        ImportGroup::External
    }
}

pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

pub fn is_url(specifier: &str) -> bool {
    specifier.starts_with("http://")
        || specifier.starts_with("https://")
        || specifier.starts_with("data:")
        || specifier.starts_with("blob:")
}

/// A package specifier resolvable against a registry or CDN.
pub fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.is_empty()
        && !is_relative(specifier)
        && !specifier.starts_with('.')
        && !is_url(specifier)
        && !ALIAS_PREFIXES.iter().any(|p| specifier.starts_with(p))
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `/sub/path`) and
/// `pkg/sub` into (`pkg`, `/sub`).
pub fn split_specifier(specifier: &str) -> (String, String) {
    let parts: Vec<&str> = specifier.split('/').collect();
    let base_len = if specifier.starts_with('@') && parts.len() >= 2 {
        2
    } else {
        1
    };
    let base = parts[..base_len.min(parts.len())].join("/");
    let subpath = if parts.len() > base_len {
        format!("/{}", parts[base_len..].join("/"))
    } else {
        String::new()
    };
    (base, subpath)
}

pub fn package_name(specifier: &str) -> String {
    split_specifier(specifier).0
}

/// Split a library hint `name@1.2.3` (or `@scope/name@1.2.3`) into name and version.
pub fn split_version(hint: &str) -> (&str, Option<&str>) {
    let search_from = if hint.starts_with('@') { 1 } else { 0 };
    match hint[search_from..].find('@') {
        Some(i) => {
            let at = search_from + i;
            let version = &hint[at + 1..];
            if version.is_empty() {
                (&hint[..at], None)
            } else {
                (&hint[..at], Some(version))
            }
        }
        None => (hint, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, SyntaxProfile};
    use oxc_allocator::Allocator;

    #[test]
    fn test_collect_imports() {
        let src = "import React, { useState as S, type FC } from \"react\";\nimport * as THREE from 'three';\nimport './styles.css';\n";
        let allocator = Allocator::default();
        let outcome = parse(&allocator, src, "a.tsx", SyntaxProfile::Permissive);
        let imports = collect_imports(&outcome.program, src);
        assert_eq!(imports.len(), 3);

        let react = &imports[0];
        assert_eq!(react.source, "react");
        assert_eq!(react.quote, '"');
        assert_eq!(react.default_spec().unwrap().local, "React");
        let named: Vec<_> = react.named_specs().collect();
        assert_eq!(named[0].imported, "useState");
        assert_eq!(named[0].local, "S");
        assert!(named[1].type_only);
        assert_eq!(react.brace_open, Some(14));

        assert_eq!(imports[1].namespace_spec().unwrap().local, "THREE");
        assert!(imports[2].side_effect);
        assert_eq!(&src[imports[2].start as usize..imports[2].end as usize], "import './styles.css';");
    }

    #[test]
    fn test_emit() {
        let model = ImportModel::new("react")
            .with(ImportSpec::default("React"))
            .with(ImportSpec::named("useState", "useState"))
            .with(ImportSpec::named("HelpCircle", "Sparkle"));
        assert_eq!(
            model.emit('\''),
            "import React, { useState, HelpCircle as Sparkle } from 'react';"
        );
        assert_eq!(ImportModel::new("x.css").emit('"'), "import \"x.css\";");
        assert_eq!(
            ImportModel::new("d3").with(ImportSpec::namespace("d3")).emit('\''),
            "import * as d3 from 'd3';"
        );
    }

    #[test]
    fn test_split_specifier() {
        assert_eq!(split_specifier("react"), ("react".into(), "".into()));
        assert_eq!(split_specifier("react-dom/client"), ("react-dom".into(), "/client".into()));
        assert_eq!(
            split_specifier("@heroicons/react/24/outline"),
            ("@heroicons/react".into(), "/24/outline".into())
        );
        assert_eq!(package_name("@scope/pkg"), "@scope/pkg");
    }

    #[test]
    fn test_split_version() {
        assert_eq!(split_version("lodash@4.17.21"), ("lodash", Some("4.17.21")));
        assert_eq!(split_version("@scope/pkg@1.0.0"), ("@scope/pkg", Some("1.0.0")));
        assert_eq!(split_version("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(split_version("lodash"), ("lodash", None));
    }

    #[test]
    fn test_groups_and_bare() {
        assert_eq!(import_group("react"), ImportGroup::External);
        assert_eq!(import_group("@/lib/utils"), ImportGroup::Alias);
        assert_eq!(import_group("./Button"), ImportGroup::Relative);
        assert!(is_bare_specifier("@scope/pkg"));
        assert!(!is_bare_specifier("https://esm.sh/react"));
        assert!(!is_bare_specifier("../x"));
    }
}
