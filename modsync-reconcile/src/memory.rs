//! In-memory `Database` with snapshot-based rollback.
//!
//! Referential integrity follows each many2one field's `ondelete` rule, so deletion conflicts
//! surface exactly as a real backend would report them.

use crate::error::StorageError;
use crate::ports::{ModuleRegistry, ProvenanceStore, Storage, Translations, UnitOfWork};
use modsync_types::Values;
use modsync_types::provenance::{NewProvenance, ProvenanceEntry, TranslationKey};
use modsync_types::schema::{Domain, DomainOp, FieldKind, ModelDef, OnDelete, SchemaFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Everything a database holds, in a serializable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseState {
    /// model -> id -> stored values.
    #[serde(default)]
    pub tables: BTreeMap<String, BTreeMap<i64, Values>>,

    /// Next row id, shared by every table so ids are never reused.
    pub next_id: i64,

    /// module -> declared name -> entry.
    #[serde(default)]
    pub provenance: BTreeMap<String, BTreeMap<String, ProvenanceEntry>>,

    pub next_seq: u64,

    #[serde(default)]
    pub translations: Vec<TranslationRow>,

    /// module -> installed version.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,

    /// Raw statements executed, in order.
    #[serde(default)]
    pub executed: Vec<String>,
}

impl Default for DatabaseState {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            next_id: 1,
            provenance: BTreeMap::new(),
            next_seq: 1,
            translations: vec![],
            modules: BTreeMap::new(),
            executed: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRow {
    #[serde(flatten)]
    pub key: TranslationKey,
    pub src: String,
}

/// Mutation counters; never rolled back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub creates: u64,
    pub writes: u64,
    pub deletes: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    schema: SchemaFile,
    committed: DatabaseState,
    working: DatabaseState,
    stats: WriteStats,
}

impl MemoryDatabase {
    pub fn new(schema: SchemaFile) -> Self {
        Self::with_state(schema, DatabaseState::default())
    }

    pub fn with_state(schema: SchemaFile, state: DatabaseState) -> Self {
        Self {
            schema,
            committed: state.clone(),
            working: state,
            stats: WriteStats::default(),
        }
    }

    pub fn schema(&self) -> &SchemaFile {
        &self.schema
    }

    /// Current (uncommitted) state.
    pub fn state(&self) -> &DatabaseState {
        &self.working
    }

    pub fn committed(&self) -> &DatabaseState {
        &self.committed
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = WriteStats::default();
    }

    fn model_def(&self, model: &str) -> Result<&ModelDef, StorageError> {
        self.schema
            .models
            .get(model)
            .ok_or_else(|| StorageError::UnknownModel(model.to_string()))
    }

    fn check_fields(&self, model: &str, values: &Values) -> Result<(), StorageError> {
        let def = self.model_def(model)?;
        for (field, value) in values {
            let Some(field_def) = def.field(field) else {
                return Err(StorageError::Backend(format!(
                    "unknown field `{model}.{field}`"
                )));
            };
            if field_def.kind == FieldKind::Many2one
                && let (Some(target), Some(id)) = (&field_def.relation, value.as_i64())
                && !self.row_exists(target, id)
            {
                return Err(StorageError::Backend(format!(
                    "`{model}.{field}` points at missing row {target},{id}"
                )));
            }
        }
        Ok(())
    }

    fn row_exists(&self, model: &str, id: i64) -> bool {
        self.working
            .tables
            .get(model)
            .is_some_and(|rows| rows.contains_key(&id))
    }

    /// (model, field, ondelete) of every many2one pointing at `target`.
    fn referrers(&self, target: &str) -> Vec<(String, String, OnDelete)> {
        let mut out = Vec::new();
        for (model, def) in &self.schema.models {
            for (field, field_def) in &def.fields {
                if field_def.kind == FieldKind::Many2one
                    && field_def.relation.as_deref() == Some(target)
                {
                    out.push((model.clone(), field.clone(), field_def.ondelete));
                }
            }
        }
        out
    }

    fn rows_pointing_at(&self, model: &str, field: &str, id: i64) -> Vec<i64> {
        self.working
            .tables
            .get(model)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, values)| values.get(field).and_then(Value::as_i64) == Some(id))
                    .map(|(rid, _)| *rid)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Collect `model,id` and everything cascading from it; fail on a restricting referrer.
    fn delete_plan(
        &self,
        model: &str,
        id: i64,
        plan: &mut BTreeSet<(String, i64)>,
    ) -> Result<(), StorageError> {
        if !plan.insert((model.to_string(), id)) {
            return Ok(());
        }
        for (ref_model, ref_field, ondelete) in self.referrers(model) {
            for rid in self.rows_pointing_at(&ref_model, &ref_field, id) {
                if plan.contains(&(ref_model.clone(), rid)) {
                    continue;
                }
                match ondelete {
                    OnDelete::Restrict => {
                        return Err(StorageError::StillReferenced {
                            model: model.to_string(),
                            id,
                            referrer: format!("{ref_model}.{ref_field} of {ref_model},{rid}"),
                        });
                    }
                    OnDelete::Cascade => self.delete_plan(&ref_model, rid, plan)?,
                    OnDelete::SetNull => {}
                }
            }
        }
        Ok(())
    }

    /// Null out many2one columns and drop many2many ids pointing at removed rows.
    fn clear_references(&mut self, removed: &BTreeSet<(String, i64)>) {
        for (model, def) in &self.schema.models {
            let Some(rows) = self.working.tables.get_mut(model) else {
                continue;
            };
            for (field, field_def) in &def.fields {
                let Some(target) = field_def.relation.as_deref() else {
                    continue;
                };
                let gone = |id: i64| removed.contains(&(target.to_string(), id));
                for values in rows.values_mut() {
                    match (field_def.kind, values.get_mut(field)) {
                        (FieldKind::Many2one, Some(value))
                            if value.as_i64().is_some_and(gone) =>
                        {
                            *value = Value::Bool(false);
                        }
                        (FieldKind::Many2many, Some(Value::Array(ids))) => {
                            ids.retain(|v| !v.as_i64().is_some_and(gone));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn matches_domain(id: i64, values: &Values, domain: &Domain) -> bool {
    domain.iter().all(|term| {
        let id_value = Value::from(id);
        let value = if term.field == "id" {
            &id_value
        } else {
            values.get(&term.field).unwrap_or(&Value::Bool(false))
        };
        let equal = |expected: &Value| {
            value == expected || (value.is_null() && *expected == Value::Bool(false))
        };
        match term.op {
            DomainOp::Eq => equal(&term.value),
            DomainOp::Ne => !equal(&term.value),
            DomainOp::In => term
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(equal)),
            DomainOp::Ilike => match (value.as_str(), term.value.as_str()) {
                (Some(haystack), Some(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
        }
    })
}

impl Storage for MemoryDatabase {
    fn model(&self, name: &str) -> Option<ModelDef> {
        self.schema.models.get(name).cloned()
    }

    fn create(&mut self, model: &str, values: &Values) -> Result<i64, StorageError> {
        self.check_fields(model, values)?;
        let id = self.working.next_id;
        self.working.next_id += 1;
        self.working
            .tables
            .entry(model.to_string())
            .or_default()
            .insert(id, values.clone());
        self.stats.creates += 1;
        Ok(id)
    }

    fn read(&self, model: &str, id: i64, fields: &[&str]) -> Result<Option<Values>, StorageError> {
        self.model_def(model)?;
        let Some(row) = self.working.tables.get(model).and_then(|rows| rows.get(&id)) else {
            return Ok(None);
        };
        if fields.is_empty() {
            return Ok(Some(row.clone()));
        }
        Ok(Some(
            row.iter()
                .filter(|(field, _)| fields.contains(&field.as_str()))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        ))
    }

    fn write(&mut self, model: &str, id: i64, values: &Values) -> Result<(), StorageError> {
        self.check_fields(model, values)?;
        let row = self
            .working
            .tables
            .get_mut(model)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or_else(|| StorageError::NotFound {
                model: model.to_string(),
                id,
            })?;
        row.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.stats.writes += 1;
        Ok(())
    }

    fn delete(&mut self, model: &str, id: i64) -> Result<(), StorageError> {
        self.model_def(model)?;
        if !self.row_exists(model, id) {
            return Err(StorageError::NotFound {
                model: model.to_string(),
                id,
            });
        }

        let mut plan = BTreeSet::new();
        self.delete_plan(model, id, &mut plan)?;
        for (m, rid) in &plan {
            if let Some(rows) = self.working.tables.get_mut(m) {
                rows.remove(rid);
            }
        }
        self.clear_references(&plan);
        self.stats.deletes += 1;
        Ok(())
    }

    fn check_delete(
        &self,
        model: &str,
        id: i64,
        detached: &[(String, i64)],
    ) -> Result<(), StorageError> {
        self.model_def(model)?;
        let mut plan: BTreeSet<(String, i64)> = detached.iter().cloned().collect();
        plan.remove(&(model.to_string(), id));
        self.delete_plan(model, id, &mut plan)
    }

    fn search(&self, model: &str, domain: &Domain) -> Result<Vec<i64>, StorageError> {
        self.model_def(model)?;
        Ok(self
            .working
            .tables
            .get(model)
            .map(|rows| {
                rows.iter()
                    .filter(|(id, values)| matches_domain(**id, values, domain))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn execute(&mut self, statement: &str) -> Result<(), StorageError> {
        self.working.executed.push(statement.to_string());
        Ok(())
    }
}

impl ProvenanceStore for MemoryDatabase {
    fn lookup(&self, module: &str, name: &str) -> Result<Option<ProvenanceEntry>, StorageError> {
        Ok(self
            .working
            .provenance
            .get(module)
            .and_then(|entries| entries.get(name))
            .cloned())
    }

    fn upsert(&mut self, entry: NewProvenance) -> Result<ProvenanceEntry, StorageError> {
        let entries = self
            .working
            .provenance
            .entry(entry.module.clone())
            .or_default();
        let seq = match entries.get(&entry.name) {
            Some(existing) => existing.seq,
            None => {
                let seq = self.working.next_seq;
                self.working.next_seq += 1;
                seq
            }
        };
        let stored = ProvenanceEntry {
            module: entry.module,
            name: entry.name,
            model: entry.model,
            res_id: entry.res_id,
            snapshot: entry.snapshot,
            noupdate: entry.noupdate,
            seq,
        };
        entries.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    fn list_owned(&self, module: &str) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .working
            .provenance
            .get(module)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_entry(&mut self, module: &str, name: &str) -> Result<(), StorageError> {
        if let Some(entries) = self.working.provenance.get_mut(module) {
            entries.remove(name);
            if entries.is_empty() {
                self.working.provenance.remove(module);
            }
        }
        Ok(())
    }

    fn entries_for_record(
        &self,
        model: &str,
        id: i64,
    ) -> Result<Vec<(String, String)>, StorageError> {
        Ok(self
            .working
            .provenance
            .values()
            .flat_map(BTreeMap::values)
            .filter(|e| e.model == model && e.res_id == id)
            .map(|e| (e.module.clone(), e.name.clone()))
            .collect())
    }
}

impl Translations for MemoryDatabase {
    fn translation_source(&self, key: &TranslationKey) -> Result<Option<String>, StorageError> {
        Ok(self
            .working
            .translations
            .iter()
            .find(|row| row.key == *key)
            .map(|row| row.src.clone()))
    }

    fn set_translation_source(&mut self, key: &TranslationKey, src: &str) -> Result<(), StorageError> {
        match self.working.translations.iter_mut().find(|row| row.key == *key) {
            Some(row) => row.src = src.to_string(),
            None => {
                self.working.translations.push(TranslationRow {
                    key: key.clone(),
                    src: src.to_string(),
                });
                self.working.translations.sort_by(|a, b| a.key.cmp(&b.key));
            }
        }
        Ok(())
    }
}

impl ModuleRegistry for MemoryDatabase {
    fn installed_version(&self, module: &str) -> Result<Option<String>, StorageError> {
        Ok(self.working.modules.get(module).cloned())
    }

    fn mark_installed(&mut self, module: &str, version: &str) -> Result<(), StorageError> {
        self.working
            .modules
            .insert(module.to_string(), version.to_string());
        Ok(())
    }
}

impl UnitOfWork for MemoryDatabase {
    fn commit(&mut self) -> anyhow::Result<()> {
        self.committed = self.working.clone();
        Ok(())
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        self.working = self.committed.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modsync_types::schema::{DomainTerm, FieldDef};
    use serde_json::json;

    fn schema(ondelete: OnDelete) -> SchemaFile {
        let mut schema = SchemaFile::default();
        schema.models.insert(
            "res.country".into(),
            ModelDef::default().with_field("name", FieldDef::new(FieldKind::Char)),
        );
        schema.models.insert(
            "res.partner".into(),
            ModelDef::default()
                .with_field("name", FieldDef::new(FieldKind::Char))
                .with_field(
                    "country_id",
                    FieldDef::many2one("res.country").on_delete(ondelete),
                )
                .with_field("tag_ids", FieldDef::many2many("res.country")),
        );
        schema
    }

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn restrict_blocks_delete() {
        let mut db = MemoryDatabase::new(schema(OnDelete::Restrict));
        let be = db.create("res.country", &values(&[("name", json!("BE"))])).unwrap();
        db.create("res.partner", &values(&[("country_id", json!(be))]))
            .unwrap();

        let err = db.delete("res.country", be).unwrap_err();
        assert!(matches!(err, StorageError::StillReferenced { .. }));
        assert!(db.row_exists("res.country", be));
    }

    #[test]
    fn check_delete_reports_without_deleting() {
        let mut db = MemoryDatabase::new(schema(OnDelete::Restrict));
        let be = db.create("res.country", &values(&[("name", json!("BE"))])).unwrap();
        let p = db
            .create("res.partner", &values(&[("country_id", json!(be))]))
            .unwrap();

        let err = db.check_delete("res.country", be, &[]).unwrap_err();
        assert!(matches!(err, StorageError::StillReferenced { .. }));
        db.check_delete("res.country", be, &[("res.partner".to_string(), p)])
            .unwrap();
        assert!(db.row_exists("res.country", be));
        assert!(db.row_exists("res.partner", p));
    }

    #[test]
    fn set_null_and_many2many_cleanup() {
        let mut db = MemoryDatabase::new(schema(OnDelete::SetNull));
        let be = db.create("res.country", &values(&[("name", json!("BE"))])).unwrap();
        let p = db
            .create(
                "res.partner",
                &values(&[("country_id", json!(be)), ("tag_ids", json!([be]))]),
            )
            .unwrap();

        db.delete("res.country", be).unwrap();
        let row = db.read("res.partner", p, &[]).unwrap().unwrap();
        assert_eq!(row["country_id"], json!(false));
        assert_eq!(row["tag_ids"], json!([]));
    }

    #[test]
    fn cascade_removes_dependents() {
        let mut db = MemoryDatabase::new(schema(OnDelete::Cascade));
        let be = db.create("res.country", &values(&[("name", json!("BE"))])).unwrap();
        let p = db
            .create("res.partner", &values(&[("country_id", json!(be))]))
            .unwrap();

        db.delete("res.country", be).unwrap();
        assert_eq!(db.read("res.partner", p, &[]).unwrap(), None);
    }

    #[test]
    fn rollback_restores_committed_state() {
        let mut db = MemoryDatabase::new(schema(OnDelete::SetNull));
        let be = db.create("res.country", &values(&[("name", json!("BE"))])).unwrap();
        db.commit().unwrap();

        db.create("res.country", &values(&[("name", json!("FR"))]))
            .unwrap();
        db.rollback().unwrap();

        assert_eq!(db.search("res.country", &vec![]).unwrap(), vec![be]);
    }

    #[test]
    fn search_terms() {
        let mut db = MemoryDatabase::new(schema(OnDelete::SetNull));
        let be = db.create("res.country", &values(&[("name", json!("Belgium"))])).unwrap();
        let fr = db.create("res.country", &values(&[("name", json!("France"))])).unwrap();

        let eq = vec![DomainTerm::equals("name", json!("France"))];
        assert_eq!(db.search("res.country", &eq).unwrap(), vec![fr]);

        let like = vec![DomainTerm {
            field: "name".into(),
            op: DomainOp::Ilike,
            value: json!("BEL"),
        }];
        assert_eq!(db.search("res.country", &like).unwrap(), vec![be]);

        let by_id = vec![DomainTerm {
            field: "id".into(),
            op: DomainOp::In,
            value: json!([be, fr]),
        }];
        assert_eq!(db.search("res.country", &by_id).unwrap(), vec![be, fr]);
    }

    #[test]
    fn upsert_keeps_seq_and_ids_are_never_reused() {
        let mut db = MemoryDatabase::new(schema(OnDelete::SetNull));
        let first = db
            .upsert(NewProvenance {
                module: "base".into(),
                name: "x".into(),
                model: "res.country".into(),
                res_id: 1,
                snapshot: Values::new(),
                noupdate: false,
            })
            .unwrap();
        let again = db.upsert(NewProvenance::from_entry(&first)).unwrap();
        assert_eq!(first.seq, again.seq);

        let a = db.create("res.country", &Values::new()).unwrap();
        db.delete("res.country", a).unwrap();
        let b = db.create("res.country", &Values::new()).unwrap();
        assert!(b > a);
    }
}
