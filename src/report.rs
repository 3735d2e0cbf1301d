//! Repair bookkeeping: issues, fix records, stage history.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    UndefinedIdentifier,
    MissingDefaultImport,
    MissingNamedImport,
    UnusedImport,
    DuplicateImportSource,
    UnsortedImports,
    IncorrectImportPath,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::UndefinedIdentifier => "undefined-identifier",
            IssueKind::MissingDefaultImport => "missing-default-import",
            IssueKind::MissingNamedImport => "missing-named-import",
            IssueKind::UnusedImport => "unused-import",
            IssueKind::DuplicateImportSource => "duplicate-import-source",
            IssueKind::UnsortedImports => "unsorted-imports",
            IssueKind::IncorrectImportPath => "incorrect-import-path",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairIssue {
    pub kind: IssueKind,
    pub line: u32,
    pub column: u32,
    /// Offending identifier, when there is one.
    pub identifier: Option<String>,
    /// Import source the issue concerns, when there is one.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixRecord {
    pub fn applied(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            success: true,
            error: None,
        }
    }

    pub fn rejected(kind: IssueKind, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage_name: String,
    pub success: bool,
    pub fixes_applied: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ReportWarning {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub stages: Vec<StageRecord>,
    pub fixes: Vec<FixRecord>,
    pub warnings: Vec<ReportWarning>,
}

impl RepairReport {
    pub fn record_stage(
        &mut self,
        name: &str,
        success: bool,
        fixes_applied: usize,
        message: impl Into<String>,
    ) {
        self.stages.push(StageRecord {
            stage_name: name.to_string(),
            success,
            fixes_applied,
            message: message.into(),
        });
    }

    pub fn warn(&mut self, kind: &str, message: impl Into<String>) {
        self.warnings.push(ReportWarning::new(kind, message));
    }

    pub fn accepted_fixes(&self) -> usize {
        self.fixes.iter().filter(|f| f.success).count()
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().rev().find(|s| s.stage_name == name)
    }
}
