//! Error types for modsync-reconcile.
//!
//! Everything here aborts the current record and fails the module apply. Conflicts and retained
//! deletions are not errors; they are reported and processing continues.

use modsync_domain::{ExprError, ParseError};
use modsync_types::schema::FieldKind;
use thiserror::Error;

/// Failure reported by a storage collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Deletion refused because other rows still point at the record.
    #[error("{model},{id} is still referenced by {referrer}")]
    StillReferenced {
        model: String,
        id: i64,
        referrer: String,
    },

    #[error("record {model},{id} does not exist")]
    NotFound { model: String, id: i64 },

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("storage backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unresolved reference `{id}`: {reason}")]
    Reference { id: String, reason: String },

    #[error("search on `{model}` matched {count} records, expected exactly one")]
    Ambiguous { model: String, count: usize },

    #[error("`{xml_id}` is recorded as `{recorded}` but declared as `{declared}`")]
    ModelMismatch {
        xml_id: String,
        recorded: String,
        declared: String,
    },

    #[error("unknown model `{model}`")]
    UnknownModel { model: String },

    #[error("unknown field `{model}.{field}`")]
    UnknownField { model: String, field: String },

    #[error("field `{model}.{field}` of kind {kind:?} cannot be reconciled")]
    UnsupportedField {
        model: String,
        field: String,
        kind: FieldKind,
    },

    #[error("invalid value for `{model}.{field}`: {reason}")]
    InvalidValue {
        model: String,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReconcileError {
    pub(crate) fn reference(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reference {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
