//! Reconciliation engine for declared records.
//!
//! Responsibilities:
//! - Apply parsed instructions idempotently, keyed by provenance (module, declared id).
//! - Detect fields edited outside reconciliation and leave them alone.
//! - Collect records whose declarations disappeared, once every module is applied.
//!
//! Storage is reached only through the traits in [`ports`]; [`MemoryDatabase`] implements all
//! of them.

mod error;
mod ledger;
mod memory;
mod normalize;
mod orphans;
pub mod ports;
mod reconciler;

pub use error::{ReconcileError, StorageError};
pub use ledger::DeleteLedger;
pub use memory::{DatabaseState, MemoryDatabase, TranslationRow, WriteStats};
pub use normalize::normalize;
pub use orphans::{IR_VALUES, WORKFLOW_ACTIVITY, WORKFLOW_TRANSITION, WORKFLOW_WORKITEM, collect_orphans};
pub use ports::Database;
pub use reconciler::{ApplyContext, MENU_MODEL, Reconciler};
