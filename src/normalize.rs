//! Import Normalizer
//!
//! Five ordered passes over the module's import declarations:
//!
//! 1. add imports for undefined names found in the well-known table
//! 2. drop specifiers (and whole statements) nothing references
//! 3. merge statements that share a source
//! 4. rewrite known-incorrect paths
//! 5. regroup into external / alias / relative buckets, sorted by source
//!
//! Each pass works from a fresh analysis of the previous pass's output and is
//! validated on its own. A pass whose output fails to re-parse is discarded.
//! When a path correction lands, duplicates are merged once more.

use crate::autofix::{ensure_default_import, RUNTIME_DEFAULT, RUNTIME_EXPORTS, RUNTIME_MODULE};
use crate::edits::{apply_validated, remove_statement, TextEdit};
use crate::imports::{import_group, ImportEntry, ImportModel, ImportSpec, SpecifierKind};
use crate::report::{FixRecord, IssueKind};
use crate::scope::SourceAnalysis;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

lazy_static::lazy_static! {
    /// Identifier → (source, kind) for names that are safe to import on sight.
    static ref WELL_KNOWN_IMPORTS: HashMap<&'static str, (&'static str, SpecifierKind)> = {
        let mut m = HashMap::new();
        for name in RUNTIME_EXPORTS.iter() {
            m.insert(*name, (RUNTIME_MODULE, SpecifierKind::Named));
        }
        m.insert(RUNTIME_DEFAULT, (RUNTIME_MODULE, SpecifierKind::Default));
        m.insert("ReactDOM", ("react-dom/client", SpecifierKind::Namespace));
        m.insert("motion", ("framer-motion", SpecifierKind::Named));
        m.insert("AnimatePresence", ("framer-motion", SpecifierKind::Named));
        m.insert("clsx", ("clsx", SpecifierKind::Default));
        m.insert("axios", ("axios", SpecifierKind::Default));
        m.insert("dayjs", ("dayjs", SpecifierKind::Default));
        m.insert("twMerge", ("tailwind-merge", SpecifierKind::Named));
        m
    };

    static ref PATH_CORRECTIONS: HashMap<&'static str, &'static str> = [
        ("framer-motion/dist/framer-motion", "framer-motion"),
        ("lucide-react/icons", "lucide-react"),
        ("@heroicons/react/outline", "@heroicons/react/24/outline"),
        ("@heroicons/react/solid", "@heroicons/react/24/solid"),
        ("react-dom/client.js", "react-dom/client"),
        ("recharts/lib", "recharts"),
    ]
    .into_iter()
    .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFixOptions {
    pub add_missing: bool,
    pub remove_unused: bool,
    pub merge_duplicates: bool,
    pub fix_paths: bool,
    pub sort_imports: bool,
}

impl Default for ImportFixOptions {
    fn default() -> Self {
        Self {
            add_missing: true,
            remove_unused: true,
            merge_duplicates: true,
            fix_paths: true,
            sort_imports: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFixOutcome {
    pub success: bool,
    pub fixed_code: String,
    pub fixes: Vec<FixRecord>,
    pub errors: Vec<String>,
}

/// Edits plus the records they earn if they survive validation.
type PassPlan = (Vec<TextEdit>, Vec<FixRecord>);

pub fn fix_imports(code: &str, filename: &str, options: ImportFixOptions) -> ImportFixOutcome {
    let passes: [(&str, bool, PassPlanner); 5] = [
        ("add_missing", options.add_missing, plan_add_missing),
        ("remove_unused", options.remove_unused, plan_remove_unused),
        ("merge_duplicates", options.merge_duplicates, plan_merge_duplicates),
        ("fix_paths", options.fix_paths, plan_fix_paths),
        ("sort_imports", options.sort_imports, plan_sort_imports),
    ];

    let mut run = PassRun {
        filename,
        current: code.to_string(),
        fixes: Vec::new(),
        errors: Vec::new(),
    };

    for (name, enabled, plan) in passes {
        if !enabled {
            continue;
        }
        match run.pass(name, plan) {
            Err(()) => break,
            // A corrected path can land on a source that is already imported.
            Ok(true) if name == "fix_paths" && options.merge_duplicates => {
                if run.pass("merge_duplicates", plan_merge_duplicates).is_err() {
                    break;
                }
            }
            Ok(_) => {}
        }
    }

    ImportFixOutcome {
        success: run.errors.is_empty(),
        fixed_code: run.current,
        fixes: run.fixes,
        errors: run.errors,
    }
}

type PassPlanner = fn(&SourceAnalysis, &str) -> PassPlan;

struct PassRun<'f> {
    filename: &'f str,
    current: String,
    fixes: Vec<FixRecord>,
    errors: Vec<String>,
}

impl PassRun<'_> {
    /// Plan against a fresh analysis and apply if the result re-parses.
    /// `Ok(true)` when the pass changed the source; `Err` when the current
    /// text can no longer be analysed.
    fn pass(&mut self, name: &str, plan: PassPlanner) -> Result<bool, ()> {
        let analysis = match SourceAnalysis::analyze(&self.current, self.filename) {
            Ok(a) => a,
            Err(e) => {
                self.errors.push(e.message);
                return Err(());
            }
        };

        let (edits, records) = plan(&analysis, &self.current);
        if edits.is_empty() {
            return Ok(false);
        }

        match apply_validated(&self.current, &edits, self.filename) {
            Ok(next) => {
                debug!(file = self.filename, pass = name, fixes = records.len(), "import pass applied");
                self.current = next;
                self.fixes.extend(records);
                Ok(true)
            }
            Err(e) => {
                debug!(file = self.filename, pass = name, error = %e, "import pass discarded");
                self.errors.push(format!("{}: {}", name, e.message));
                self.fixes.extend(records.into_iter().map(|r| FixRecord {
                    success: false,
                    error: Some(e.message.clone()),
                    ..r
                }));
                Ok(false)
            }
        }
    }
}

fn first_import_offset(analysis: &SourceAnalysis) -> usize {
    analysis
        .imports
        .first()
        .map(|e| e.start as usize)
        .unwrap_or(analysis.top_offset as usize)
}

fn is_value_import(entry: &ImportEntry) -> bool {
    !entry.type_only && !entry.side_effect
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 1: ADD MISSING
// ═══════════════════════════════════════════════════════════════════════════════

fn plan_add_missing(analysis: &SourceAnalysis, _source: &str) -> PassPlan {
    let mut wanted: BTreeMap<&'static str, Vec<ImportSpec>> = BTreeMap::new();
    let mut add = |name: &str, source: &'static str, kind: SpecifierKind| {
        let spec = match kind {
            SpecifierKind::Default => ImportSpec::default(name),
            SpecifierKind::Namespace => ImportSpec::namespace(name),
            SpecifierKind::Named => ImportSpec::named(name, name),
        };
        let list = wanted.entry(source).or_default();
        if !list.iter().any(|s| s.local == spec.local) {
            list.push(spec);
        }
    };

    for reference in analysis.undefined_references() {
        if let Some((source, kind)) = WELL_KNOWN_IMPORTS.get(reference.name.as_str()) {
            add(&reference.name, *source, *kind);
        }
    }
    let mut edits = Vec::new();
    let mut records = Vec::new();

    if analysis.has_markup() && !analysis.is_bound(RUNTIME_DEFAULT) {
        let type_only_default = analysis.imports.iter().any(|e| {
            e.source == RUNTIME_MODULE
                && e.type_only
                && e.default_spec().is_some_and(|d| d.local == RUNTIME_DEFAULT)
        });
        if type_only_default {
            edits.push(ensure_default_import(analysis, RUNTIME_MODULE, RUNTIME_DEFAULT));
            records.push(FixRecord::applied(
                IssueKind::MissingDefaultImport,
                format!("Made '{}' from '{}' a value import", RUNTIME_DEFAULT, RUNTIME_MODULE),
            ));
        } else {
            add(RUNTIME_DEFAULT, RUNTIME_MODULE, SpecifierKind::Default);
        }
    }
    let insert_at = first_import_offset(analysis);

    for (source, specs) in wanted {
        let names: Vec<String> = specs.iter().map(|s| s.local.clone()).collect();

        let target = analysis.imports.iter().find(|e| {
            e.source == source
                && is_value_import(e)
                && e.namespace_spec().is_none()
                && compatible(e, &specs)
        });

        match target {
            Some(entry) => {
                let mut model = entry.model();
                for spec in specs {
                    model.push(spec);
                }
                edits.push(TextEdit::replace(
                    entry.start as usize,
                    entry.end as usize,
                    model.emit(entry.quote),
                ));
            }
            None => {
                let mut model = ImportModel::new(source);
                for spec in specs {
                    model.push(spec);
                }
                edits.push(TextEdit::insert(insert_at, format!("{}\n", model.emit('\''))));
            }
        }

        for name in names {
            records.push(FixRecord::applied(
                IssueKind::MissingNamedImport,
                format!("Added import for '{}' from '{}'", name, source),
            ));
        }
    }

    (edits, records)
}

/// A namespace specifier cannot share a statement with named ones, and a
/// statement holds a single default.
fn compatible(entry: &ImportEntry, additions: &[ImportSpec]) -> bool {
    let adds_namespace = additions.iter().any(|s| s.kind == SpecifierKind::Namespace);
    let adds_default = additions.iter().any(|s| s.kind == SpecifierKind::Default);
    !adds_namespace && !(adds_default && entry.default_spec().is_some())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 2: REMOVE UNUSED
// ═══════════════════════════════════════════════════════════════════════════════

fn is_used(analysis: &SourceAnalysis, spec: &ImportSpec) -> bool {
    analysis.referenced.contains(&spec.local)
        || (spec.local == RUNTIME_DEFAULT && analysis.has_markup())
}

fn plan_remove_unused(analysis: &SourceAnalysis, source: &str) -> PassPlan {
    let mut edits = Vec::new();
    let mut records = Vec::new();

    for entry in &analysis.imports {
        if entry.side_effect || entry.specifiers.is_empty() {
            continue;
        }
        let (used, unused): (Vec<&ImportSpec>, Vec<&ImportSpec>) =
            entry.specifiers.iter().partition(|s| is_used(analysis, s));
        if unused.is_empty() {
            continue;
        }

        if used.is_empty() {
            edits.push(remove_statement(source, entry.start as usize, entry.end as usize));
        } else {
            let model = ImportModel {
                source: entry.source.clone(),
                type_only: entry.type_only,
                specifiers: used.into_iter().cloned().collect(),
            };
            edits.push(TextEdit::replace(
                entry.start as usize,
                entry.end as usize,
                model.emit(entry.quote),
            ));
        }

        for spec in unused {
            records.push(FixRecord::applied(
                IssueKind::UnusedImport,
                format!("Removed unused import '{}' from '{}'", spec.local, entry.source),
            ));
        }
    }

    (edits, records)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 3: MERGE DUPLICATES
// ═══════════════════════════════════════════════════════════════════════════════

fn plan_merge_duplicates(analysis: &SourceAnalysis, source: &str) -> PassPlan {
    let mut groups: BTreeMap<(&str, bool), Vec<&ImportEntry>> = BTreeMap::new();
    for entry in analysis.imports.iter().filter(|e| !e.side_effect) {
        groups
            .entry((entry.source.as_str(), entry.type_only))
            .or_default()
            .push(entry);
    }

    let mut edits = Vec::new();
    let mut records = Vec::new();

    for ((module, _), entries) in groups {
        if entries.len() < 2 {
            continue;
        }

        let mut merged = entries[0].model();
        for entry in &entries[1..] {
            for spec in &entry.specifiers {
                merged.push(spec.clone());
            }
        }

        let defaults = entries
            .iter()
            .flat_map(|e| e.specifiers.iter())
            .filter(|s| s.kind == SpecifierKind::Default)
            .map(|s| s.local.as_str())
            .collect::<std::collections::HashSet<_>>();
        let has_namespace = merged
            .specifiers
            .iter()
            .any(|s| s.kind == SpecifierKind::Namespace);
        let has_named = merged.specifiers.iter().any(|s| s.kind == SpecifierKind::Named);
        if defaults.len() > 1 || (has_namespace && has_named) {
            debug!(source = module, "duplicate imports cannot share one statement");
            continue;
        }

        let first = entries[0];
        edits.push(TextEdit::replace(
            first.start as usize,
            first.end as usize,
            merged.emit(first.quote),
        ));
        for entry in &entries[1..] {
            edits.push(remove_statement(source, entry.start as usize, entry.end as usize));
        }
        records.push(FixRecord::applied(
            IssueKind::DuplicateImportSource,
            format!("Merged {} imports from '{}'", entries.len(), module),
        ));
    }

    (edits, records)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 4: FIX PATHS
// ═══════════════════════════════════════════════════════════════════════════════

fn plan_fix_paths(analysis: &SourceAnalysis, source: &str) -> PassPlan {
    let mut edits = Vec::new();
    let mut records = Vec::new();

    for entry in &analysis.imports {
        let Some(corrected) = PATH_CORRECTIONS.get(entry.source.as_str()) else {
            continue;
        };
        let literal = format!("{q}{}{q}", entry.source, q = entry.quote);
        let statement = &source[entry.start as usize..entry.end as usize];
        let Some(at) = statement.rfind(&literal) else {
            continue;
        };
        let start = entry.start as usize + at;
        edits.push(TextEdit::replace(
            start,
            start + literal.len(),
            format!("{q}{}{q}", corrected, q = entry.quote),
        ));
        records.push(FixRecord::applied(
            IssueKind::IncorrectImportPath,
            format!("Rewrote import path '{}' to '{}'", entry.source, corrected),
        ));
    }

    (edits, records)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS 5: SORT
// ═══════════════════════════════════════════════════════════════════════════════

fn plan_sort_imports(analysis: &SourceAnalysis, source: &str) -> PassPlan {
    if analysis.imports.len() < 2 {
        return (vec![], vec![]);
    }

    let mut order: Vec<usize> = (0..analysis.imports.len()).collect();
    order.sort_by(|&a, &b| {
        let ea = &analysis.imports[a];
        let eb = &analysis.imports[b];
        import_group(&ea.source)
            .cmp(&import_group(&eb.source))
            .then_with(|| ea.source.cmp(&eb.source))
    });

    if order.iter().enumerate().all(|(pos, &i)| pos == i) {
        return (vec![], vec![]);
    }

    let mut previous_group = None;
    let mut block = String::new();
    for &i in &order {
        let entry = &analysis.imports[i];
        let group = import_group(&entry.source);
        if previous_group.is_some() && previous_group != Some(group) {
            block.push('\n');
        }
        previous_group = Some(group);
        block.push_str(&source[entry.start as usize..entry.end as usize]);
        block.push('\n');
    }

    let mut edits: Vec<TextEdit> = analysis
        .imports
        .iter()
        .map(|e| remove_statement(source, e.start as usize, e.end as usize))
        .collect();
    let insert_at = edits.iter().map(|e| e.start).min().unwrap_or(0);
    edits.push(TextEdit::insert(insert_at, block));

    let records = vec![FixRecord::applied(
        IssueKind::UnsortedImports,
        format!(
            "Reordered {} imports into external, alias and relative groups",
            analysis.imports.len()
        ),
    )];
    (edits, records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> ImportFixOutcome {
        fix_imports(src, "App.tsx", ImportFixOptions::default())
    }

    fn only(pass: &str) -> ImportFixOptions {
        ImportFixOptions {
            add_missing: pass == "add",
            remove_unused: pass == "remove",
            merge_duplicates: pass == "merge",
            fix_paths: pass == "paths",
            sort_imports: pass == "sort",
        }
    }

    #[test]
    fn test_adds_well_known_imports() {
        let src = "export const A = () => {\n  const c = clsx('a', 'b');\n  return <motion.div className={c} />;\n};\n";
        let out = fix_imports(src, "A.tsx", only("add"));
        assert!(out.success);
        assert!(out.fixed_code.contains("import clsx from 'clsx';\n"));
        assert!(out.fixed_code.contains("import { motion } from 'framer-motion';\n"));
        assert!(out.fixed_code.contains("import React from 'react';\n"));
        assert_eq!(out.fixes.len(), 3);
    }

    #[test]
    fn test_adds_into_existing_statement() {
        let src = "import React from 'react';\nexport const A = () => { const [a] = useState(0); return <p>{a}</p>; };\n";
        let out = fix_imports(src, "A.tsx", only("add"));
        assert!(out
            .fixed_code
            .starts_with("import React, { useState } from 'react';\n"));
    }

    #[test]
    fn test_removes_unused_specifiers_and_statements() {
        let src = "import React, { useState, useEffect } from 'react';\nimport axios from 'axios';\nexport const A = () => { const [a] = useState(0); return <p>{a}</p>; };\n";
        let out = fix_imports(src, "A.tsx", only("remove"));
        assert!(out.success);
        assert!(out
            .fixed_code
            .starts_with("import React, { useState } from 'react';\nexport const A"));
        assert_eq!(out.fixes.len(), 2);
        assert!(out.fixes.iter().all(|f| f.kind == IssueKind::UnusedImport));
    }

    #[test]
    fn test_react_kept_when_markup_present() {
        let src = "import React from 'react';\nexport default () => <p />;\n";
        let out = fix_imports(src, "A.tsx", only("remove"));
        assert_eq!(out.fixed_code, src);
        assert!(out.fixes.is_empty());
    }

    #[test]
    fn test_merges_duplicate_sources() {
        let src = "import { useState } from 'react';\nimport { useEffect } from 'react';\nuseState(); useEffect();\n";
        let out = fix_imports(src, "A.tsx", only("merge"));
        assert_eq!(
            out.fixed_code,
            "import { useState, useEffect } from 'react';\nuseState(); useEffect();\n"
        );
        assert_eq!(out.fixes[0].kind, IssueKind::DuplicateImportSource);
    }

    #[test]
    fn test_merge_skips_namespace_with_named() {
        let src = "import * as R from 'react';\nimport { useState } from 'react';\nR; useState();\n";
        let out = fix_imports(src, "A.tsx", only("merge"));
        assert_eq!(out.fixed_code, src);
    }

    #[test]
    fn test_fixes_known_paths() {
        let src = "import { motion } from \"framer-motion/dist/framer-motion\";\nmotion;\n";
        let out = fix_imports(src, "A.tsx", only("paths"));
        assert_eq!(out.fixed_code, "import { motion } from \"framer-motion\";\nmotion;\n");
        assert_eq!(out.fixes[0].kind, IssueKind::IncorrectImportPath);
    }

    #[test]
    fn test_corrected_path_is_merged_into_existing_import() {
        let src = "import { motion } from 'framer-motion';\nimport { AnimatePresence } from 'framer-motion/dist/framer-motion';\nconsole.log(motion, AnimatePresence);\n";
        let options = ImportFixOptions {
            merge_duplicates: true,
            ..only("paths")
        };
        let out = fix_imports(src, "A.tsx", options);
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(
            out.fixed_code,
            "import { motion, AnimatePresence } from 'framer-motion';\nconsole.log(motion, AnimatePresence);\n"
        );
        let kinds: Vec<IssueKind> = out.fixes.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![IssueKind::IncorrectImportPath, IssueKind::DuplicateImportSource]
        );
    }

    #[test]
    fn test_type_only_runtime_import_is_promoted() {
        let src = "import type React from 'react';\nexport default () => <p />;\n";
        let out = fix_imports(src, "A.tsx", only("add"));
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(out.fixed_code, "import React from 'react';\nexport default () => <p />;\n");
    }

    #[test]
    fn test_sorts_into_groups() {
        let src = "import { b } from './b';\nimport { u } from '@/lib/u';\nimport z from 'zod';\nimport a from 'axios';\nconsole.log(a, b, u, z);\n";
        let out = fix_imports(src, "A.tsx", only("sort"));
        assert_eq!(
            out.fixed_code,
            "import a from 'axios';\nimport z from 'zod';\n\nimport { u } from '@/lib/u';\n\nimport { b } from './b';\nconsole.log(a, b, u, z);\n"
        );
        assert_eq!(out.fixes.len(), 1);
        assert_eq!(out.fixes[0].kind, IssueKind::UnsortedImports);
    }

    #[test]
    fn test_clean_source_is_unchanged() {
        let src = "import React, { useState } from 'react';\n\nexport default function App() {\n  const [n] = useState(0);\n  return <p>{n}</p>;\n}\n";
        let out = run(src);
        assert!(out.success);
        assert!(out.fixes.is_empty());
        assert_eq!(out.fixed_code, src);
    }
}
