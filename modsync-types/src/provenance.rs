use crate::Values;
use crate::record::XmlId;
use serde::{Deserialize, Serialize};

/// Durable link between a declared record and the live row it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub module: String,
    pub name: String,
    pub model: String,
    pub res_id: i64,

    /// Normalized field values in effect at the last apply.
    #[serde(default)]
    pub snapshot: Values,

    /// Created inside a `noupdate` block; never collected as an orphan.
    #[serde(default)]
    pub noupdate: bool,

    /// Creation sequence assigned by the store.
    pub seq: u64,
}

impl ProvenanceEntry {
    pub fn xml_id(&self) -> XmlId {
        XmlId::new(&self.module, &self.name)
    }
}

/// Upsert payload; the store keeps `seq` stable for existing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProvenance {
    pub module: String,
    pub name: String,
    pub model: String,
    pub res_id: i64,
    pub snapshot: Values,
    pub noupdate: bool,
}

impl NewProvenance {
    pub fn from_entry(entry: &ProvenanceEntry) -> Self {
        Self {
            module: entry.module.clone(),
            name: entry.name.clone(),
            model: entry.model.clone(),
            res_id: entry.res_id,
            snapshot: entry.snapshot.clone(),
            noupdate: entry.noupdate,
        }
    }
}

/// Key of a translation row mirroring a translatable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TranslationKey {
    pub model: String,
    pub field: String,
    pub lang: String,
    pub res_id: i64,
}

impl std::fmt::Display for TranslationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{}@{}#{}",
            self.model, self.field, self.lang, self.res_id
        )
    }
}
