//! Shared DTOs (schemas-as-code) for the modsync workspace.
//!
//! # Design constraints
//! - Manifests, schema files and run reports are read from / written to disk.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

use std::collections::BTreeMap;

pub mod manifest;
pub mod provenance;
pub mod record;
pub mod report;
pub mod schema;

/// Field-name → value map used for record reads, writes and snapshots.
pub type Values = BTreeMap<String, serde_json::Value>;

/// Schema identifiers.
pub mod schema_ids {
    pub const MODSYNC_REPORT_V1: &str = "modsync.report.v1";
    pub const MODSYNC_ORDER_V1: &str = "modsync.order.v1";
}
