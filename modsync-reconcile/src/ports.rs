//! Collaborator seams consumed by the reconciler.
//!
//! The core never talks to a database directly. Backends implement these traits; `Database` is
//! the combination the pipeline hands around as `&mut dyn Database`.

use crate::error::StorageError;
use modsync_types::Values;
use modsync_types::provenance::{NewProvenance, ProvenanceEntry, TranslationKey};
use modsync_types::schema::{Domain, ModelDef};
use std::collections::BTreeSet;

/// Typed record primitives.
pub trait Storage {
    fn model(&self, name: &str) -> Option<ModelDef>;

    fn create(&mut self, model: &str, values: &Values) -> Result<i64, StorageError>;

    /// `None` when the row does not exist. An empty `fields` slice reads every stored field.
    fn read(&self, model: &str, id: i64, fields: &[&str]) -> Result<Option<Values>, StorageError>;

    fn write(&mut self, model: &str, id: i64, values: &Values) -> Result<(), StorageError>;

    fn delete(&mut self, model: &str, id: i64) -> Result<(), StorageError>;

    /// Fails like `delete` would, without deleting anything. Rows in `detached` are treated as
    /// no longer pointing at the record.
    fn check_delete(
        &self,
        model: &str,
        id: i64,
        detached: &[(String, i64)],
    ) -> Result<(), StorageError>;

    /// Ids matching `domain`, ascending.
    fn search(&self, model: &str, domain: &Domain) -> Result<Vec<i64>, StorageError>;

    /// Raw bootstrap statement.
    fn execute(&mut self, statement: &str) -> Result<(), StorageError>;
}

/// Durable (module, declared id) -> (model, row, snapshot) mapping.
pub trait ProvenanceStore {
    fn lookup(&self, module: &str, name: &str) -> Result<Option<ProvenanceEntry>, StorageError>;

    /// Insert or replace; an existing key keeps its `seq`.
    fn upsert(&mut self, entry: NewProvenance) -> Result<ProvenanceEntry, StorageError>;

    fn list_owned(&self, module: &str) -> Result<BTreeSet<String>, StorageError>;

    fn delete_entry(&mut self, module: &str, name: &str) -> Result<(), StorageError>;

    /// Every (module, name) pointing at the row.
    fn entries_for_record(
        &self,
        model: &str,
        id: i64,
    ) -> Result<Vec<(String, String)>, StorageError>;
}

pub trait Translations {
    fn translation_source(&self, key: &TranslationKey) -> Result<Option<String>, StorageError>;

    fn set_translation_source(&mut self, key: &TranslationKey, src: &str)
    -> Result<(), StorageError>;
}

pub trait ModuleRegistry {
    fn installed_version(&self, module: &str) -> Result<Option<String>, StorageError>;

    fn mark_installed(&mut self, module: &str, version: &str) -> Result<(), StorageError>;
}

pub trait UnitOfWork {
    fn commit(&mut self) -> anyhow::Result<()>;

    fn rollback(&mut self) -> anyhow::Result<()>;
}

pub trait Database: Storage + ProvenanceStore + Translations + ModuleRegistry + UnitOfWork {}

impl<T> Database for T where T: Storage + ProvenanceStore + Translations + ModuleRegistry + UnitOfWork
{}
