//! Default filesystem-backed port implementations.

use crate::ports::{ManifestSource, ModuleSource, WritePort};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use modsync_manifest::{LoadedManifest, MANIFEST_FILE_NAME};
use modsync_reconcile::ports::{
    ModuleRegistry, ProvenanceStore, Storage, Translations, UnitOfWork,
};
use modsync_reconcile::{DatabaseState, MemoryDatabase, StorageError};
use modsync_types::Values;
use modsync_types::manifest::Manifest;
use modsync_types::provenance::{NewProvenance, ProvenanceEntry, TranslationKey};
use modsync_types::schema::{Domain, ModelDef, SchemaFile};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

pub const SCHEMA_FILE_NAME: &str = "schema.toml";
pub const STATE_FILE_NAME: &str = "state.json";

/// Loads manifests from an addons directory via `modsync_manifest::load_manifests`.
#[derive(Debug, Clone)]
pub struct FsManifestSource {
    pub addons_dir: Utf8PathBuf,
}

impl FsManifestSource {
    pub fn new(addons_dir: Utf8PathBuf) -> Self {
        Self { addons_dir }
    }
}

impl ManifestSource for FsManifestSource {
    fn load_manifests(&self) -> anyhow::Result<Vec<LoadedManifest>> {
        modsync_manifest::load_manifests(&self.addons_dir)
            .with_context(|| format!("load manifests from {}", self.addons_dir))
    }
}

/// In-memory modules for embedding and testing.
///
/// Serves both the manifests and the data files they reference. Manifests are sorted by name on
/// construction to match `FsManifestSource`'s deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModules {
    manifests: Vec<Manifest>,
    files: BTreeMap<(String, Utf8PathBuf), String>,
}

impl InMemoryModules {
    pub fn new(mut manifests: Vec<Manifest>) -> Self {
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            manifests,
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(
        mut self,
        module: impl Into<String>,
        rel: impl Into<Utf8PathBuf>,
        contents: impl Into<String>,
    ) -> Self {
        self.files
            .insert((module.into(), rel.into()), contents.into());
        self
    }
}

impl ManifestSource for InMemoryModules {
    fn load_manifests(&self) -> anyhow::Result<Vec<LoadedManifest>> {
        Ok(self
            .manifests
            .iter()
            .map(|m| LoadedManifest {
                path: Utf8PathBuf::from(m.name.as_str()).join(MANIFEST_FILE_NAME),
                name: m.name.clone(),
                manifest: Ok(m.clone()),
            })
            .collect())
    }
}

impl ModuleSource for InMemoryModules {
    fn read_data_file(&self, module: &str, rel: &Utf8Path) -> anyhow::Result<String> {
        self.files
            .get(&(module.to_string(), rel.to_path_buf()))
            .cloned()
            .with_context(|| format!("no file {} in module {}", rel, module))
    }

    fn exists(&self, module: &str, rel: &Utf8Path) -> bool {
        self.files
            .contains_key(&(module.to_string(), rel.to_path_buf()))
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}

/// File-backed database: `schema.toml` plus `state.json` in one directory.
///
/// All work happens in an inner [`MemoryDatabase`]; `commit` persists the committed state.
#[derive(Debug, Clone)]
pub struct JsonFileDatabase {
    dir: Utf8PathBuf,
    inner: MemoryDatabase,
}

impl JsonFileDatabase {
    /// Open the database in `dir`. A missing `state.json` means an empty database.
    pub fn open(dir: &Utf8Path) -> anyhow::Result<Self> {
        let schema_path = dir.join(SCHEMA_FILE_NAME);
        let raw = fs::read_to_string(&schema_path)
            .with_context(|| format!("read schema {}", schema_path))?;
        let schema: SchemaFile =
            toml::from_str(&raw).with_context(|| format!("parse schema {}", schema_path))?;

        let state_path = dir.join(STATE_FILE_NAME);
        let state = if state_path.exists() {
            let raw = fs::read_to_string(&state_path)
                .with_context(|| format!("read state {}", state_path))?;
            serde_json::from_str(&raw).with_context(|| format!("parse state {}", state_path))?
        } else {
            debug!(path = %state_path, "no state file; starting empty");
            DatabaseState::default()
        };

        info!(
            dir = %dir,
            models = schema.models.len(),
            modules = state.modules.len(),
            "opened database"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            inner: MemoryDatabase::with_state(schema, state),
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn inner(&self) -> &MemoryDatabase {
        &self.inner
    }

    fn persist(&self) -> anyhow::Result<()> {
        let path = self.dir.join(STATE_FILE_NAME);
        let tmp = self.dir.join(format!("{STATE_FILE_NAME}.tmp"));
        let json =
            serde_json::to_string_pretty(self.inner.committed()).context("serialize state")?;
        fs::write(&tmp, json.as_bytes()).with_context(|| format!("write {}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("replace {}", path))?;
        debug!(path = %path, "persisted state");
        Ok(())
    }
}

impl Storage for JsonFileDatabase {
    fn model(&self, name: &str) -> Option<ModelDef> {
        self.inner.model(name)
    }

    fn create(&mut self, model: &str, values: &Values) -> Result<i64, StorageError> {
        self.inner.create(model, values)
    }

    fn read(&self, model: &str, id: i64, fields: &[&str]) -> Result<Option<Values>, StorageError> {
        self.inner.read(model, id, fields)
    }

    fn write(&mut self, model: &str, id: i64, values: &Values) -> Result<(), StorageError> {
        self.inner.write(model, id, values)
    }

    fn delete(&mut self, model: &str, id: i64) -> Result<(), StorageError> {
        self.inner.delete(model, id)
    }

    fn check_delete(
        &self,
        model: &str,
        id: i64,
        detached: &[(String, i64)],
    ) -> Result<(), StorageError> {
        self.inner.check_delete(model, id, detached)
    }

    fn search(&self, model: &str, domain: &Domain) -> Result<Vec<i64>, StorageError> {
        self.inner.search(model, domain)
    }

    fn execute(&mut self, statement: &str) -> Result<(), StorageError> {
        self.inner.execute(statement)
    }
}

impl ProvenanceStore for JsonFileDatabase {
    fn lookup(&self, module: &str, name: &str) -> Result<Option<ProvenanceEntry>, StorageError> {
        self.inner.lookup(module, name)
    }

    fn upsert(&mut self, entry: NewProvenance) -> Result<ProvenanceEntry, StorageError> {
        self.inner.upsert(entry)
    }

    fn list_owned(&self, module: &str) -> Result<BTreeSet<String>, StorageError> {
        self.inner.list_owned(module)
    }

    fn delete_entry(&mut self, module: &str, name: &str) -> Result<(), StorageError> {
        self.inner.delete_entry(module, name)
    }

    fn entries_for_record(
        &self,
        model: &str,
        id: i64,
    ) -> Result<Vec<(String, String)>, StorageError> {
        self.inner.entries_for_record(model, id)
    }
}

impl Translations for JsonFileDatabase {
    fn translation_source(&self, key: &TranslationKey) -> Result<Option<String>, StorageError> {
        self.inner.translation_source(key)
    }

    fn set_translation_source(
        &mut self,
        key: &TranslationKey,
        src: &str,
    ) -> Result<(), StorageError> {
        self.inner.set_translation_source(key, src)
    }
}

impl ModuleRegistry for JsonFileDatabase {
    fn installed_version(&self, module: &str) -> Result<Option<String>, StorageError> {
        self.inner.installed_version(module)
    }

    fn mark_installed(&mut self, module: &str, version: &str) -> Result<(), StorageError> {
        self.inner.mark_installed(module, version)
    }
}

impl UnitOfWork for JsonFileDatabase {
    fn commit(&mut self) -> anyhow::Result<()> {
        self.inner.commit()?;
        self.persist()
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        self.inner.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
[models."res.country".fields.name]
kind = "char"

[models."res.country".fields.code]
kind = "char"
"#;

    fn db_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        std::fs::write(root.join(SCHEMA_FILE_NAME), SCHEMA).expect("write schema");
        (temp, root)
    }

    fn country(code: &str) -> Values {
        Values::from([("code".to_string(), json!(code))])
    }

    #[test]
    fn commit_persists_and_reopen_restores() {
        let (_temp, root) = db_dir();
        let mut db = JsonFileDatabase::open(&root).expect("open");
        let id = db.create("res.country", &country("BE")).unwrap();
        db.mark_installed("base", "1.0").unwrap();
        db.commit().unwrap();
        assert!(root.join(STATE_FILE_NAME).exists());

        let reopened = JsonFileDatabase::open(&root).expect("reopen");
        assert_eq!(
            reopened.read("res.country", id, &["code"]).unwrap(),
            Some(country("BE"))
        );
        assert_eq!(
            reopened.installed_version("base").unwrap().as_deref(),
            Some("1.0")
        );
    }

    #[test]
    fn uncommitted_work_is_not_persisted() {
        let (_temp, root) = db_dir();
        let mut db = JsonFileDatabase::open(&root).expect("open");
        db.create("res.country", &country("BE")).unwrap();
        db.commit().unwrap();
        let second = db.create("res.country", &country("FR")).unwrap();
        db.rollback().unwrap();

        assert_eq!(db.read("res.country", second, &[]).unwrap(), None);
        let reopened = JsonFileDatabase::open(&root).expect("reopen");
        assert_eq!(reopened.search("res.country", &vec![]).unwrap().len(), 1);
    }

    #[test]
    fn missing_schema_is_an_error() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        let err = JsonFileDatabase::open(&root).unwrap_err();
        assert!(format!("{err:#}").contains("read schema"));
    }

    #[test]
    fn in_memory_modules_serve_manifests_and_files() {
        let modules = InMemoryModules::new(vec![Manifest::new("sale"), Manifest::new("base")])
            .with_file("base", "data.xml", "<openerp/>");

        let loaded = modules.load_manifests().unwrap();
        let names: Vec<&str> = loaded.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["base", "sale"]);
        assert!(modules.exists("base", Utf8Path::new("data.xml")));
        assert!(!modules.exists("sale", Utf8Path::new("data.xml")));
        assert_eq!(
            modules
                .read_data_file("base", Utf8Path::new("data.xml"))
                .unwrap(),
            "<openerp/>"
        );
        assert!(
            modules
                .read_data_file("sale", Utf8Path::new("data.xml"))
                .is_err()
        );
    }
}
