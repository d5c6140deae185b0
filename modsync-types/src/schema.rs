//! Model metadata exposed by the storage collaborator.
//!
//! The reconciler never migrates tables; it only reads field kinds to normalize values,
//! pick translatable columns, and resolve relations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Char,
    Text,
    Html,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Selection,
    Many2one,
    One2many,
    Many2many,
    Reference,
    Binary,
}

impl FieldKind {
    pub fn is_textual(self) -> bool {
        matches!(self, FieldKind::Char | FieldKind::Text | FieldKind::Html)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            FieldKind::Many2one | FieldKind::One2many | FieldKind::Many2many
        )
    }
}

/// What happens to a many2one column when its target row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    SetNull,
    Restrict,
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,

    /// Target model of relational fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    #[serde(default)]
    pub translate: bool,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub ondelete: OnDelete,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            relation: None,
            translate: false,
            required: false,
            ondelete: OnDelete::default(),
        }
    }

    pub fn many2one(relation: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::new(FieldKind::Many2one)
        }
    }

    pub fn many2many(relation: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::new(FieldKind::Many2many)
        }
    }

    pub fn translatable(mut self) -> Self {
        self.translate = true;
        self
    }

    pub fn on_delete(mut self, ondelete: OnDelete) -> Self {
        self.ondelete = ondelete;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl ModelDef {
    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

/// On-disk schema file (`schema.toml`): model name → definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDef>,
}

/// One `(field, operator, value)` search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTerm {
    pub field: String,
    pub op: DomainOp,
    pub value: serde_json::Value,
}

impl DomainTerm {
    pub fn equals(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            op: DomainOp::Eq,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "ilike")]
    Ilike,
}

impl DomainOp {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            "in" => Some(Self::In),
            "ilike" | "like" => Some(Self::Ilike),
            _ => None,
        }
    }
}

/// Conjunction of search terms; empty matches every record.
pub type Domain = Vec<DomainTerm>;
