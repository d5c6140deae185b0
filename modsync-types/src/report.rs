use crate::manifest::{ApplyMode, ModuleFlags};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Outcome of one `update` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub run_id: String,
    pub tool: ToolInfo,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    /// Resolved application order (all modules, pending or not).
    #[serde(default)]
    pub order: Vec<String>,

    #[serde(default)]
    pub modules: Vec<ModuleReport>,

    #[serde(default)]
    pub deletions: Vec<DeletionReport>,

    pub summary: RunSummary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn new(tool: ToolInfo, run_id: String) -> Self {
        Self {
            schema: crate::schema_ids::MODSYNC_REPORT_V1.to_string(),
            run_id,
            tool,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Success,
            order: vec![],
            modules: vec![],
            deletions: vec![],
            summary: RunSummary::default(),
            errors: vec![],
        }
    }

    /// Recompute `summary` from module and deletion reports.
    pub fn summarize(&mut self) {
        let mut summary = RunSummary::default();
        for m in &self.modules {
            if m.status == ModuleStatus::Applied {
                summary.modules_applied += 1;
            }
            summary.created += m.counts.created + m.counts.recreated;
            summary.updated += m.counts.updated;
            summary.unchanged += m.counts.unchanged;
            summary.skipped += m.counts.skipped;
            summary.conflicts += m.conflicts.len() as u64;
        }
        for d in &self.deletions {
            match d.outcome {
                DeletionOutcome::Deleted | DeletionOutcome::AlreadyGone => summary.deleted += 1,
                DeletionOutcome::Retained { .. } => summary.retained += 1,
            }
        }
        self.summary = summary;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Completed with conflicts or retained orphans.
    Warn,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub modules_applied: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub conflicts: u64,
    pub deleted: u64,
    pub retained: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReport {
    pub name: String,
    pub version: String,
    pub mode: ApplyMode,
    pub status: ModuleStatus,

    #[serde(default)]
    pub files: Vec<FileReport>,

    #[serde(default)]
    pub counts: RecordCounts,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleReport {
    pub fn new(name: impl Into<String>, version: impl Into<String>, mode: ApplyMode) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            mode,
            status: ModuleStatus::Applied,
            files: vec![],
            counts: RecordCounts::default(),
            conflicts: vec![],
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Applied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    pub instructions: u64,

    /// Why the file was not applied (unknown extension, SQL outside install).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Per-module record counters. Each applied instruction lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub created: u64,
    /// Backing row vanished since the last apply and was created again.
    pub recreated: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Existing record inside a `noupdate` block.
    pub skipped: u64,
    pub statements: u64,
    pub translations: u64,
}

impl RecordCounts {
    pub fn writes(&self) -> u64 {
        self.created + self.recreated + self.updated + self.translations
    }
}

/// A field whose live value was changed outside reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub xml_id: String,
    pub model: String,
    pub res_id: i64,
    pub field: String,
    pub live: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,

    pub declared: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub xml_id: String,
    pub model: String,
    pub res_id: i64,
    pub outcome: DeletionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    /// Backing row was already gone; only provenance was dropped.
    AlreadyGone,
    /// Still referenced elsewhere; kept for manual cleanup.
    Retained { reason: String },
}

/// Resolved application order, as printed by `modsync order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReport {
    pub schema: String,
    pub modules: Vec<OrderedModule>,
}

impl OrderReport {
    pub fn new(modules: Vec<OrderedModule>) -> Self {
        Self {
            schema: crate::schema_ids::MODSYNC_ORDER_V1.to_string(),
            modules,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedModule {
    pub name: String,
    pub depth: u32,
    pub flags: ModuleFlags,
}
