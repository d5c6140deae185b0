use modsync_types::record::XmlId;
use std::collections::{BTreeMap, BTreeSet};

/// Working delete sets for one run.
///
/// Each module's set starts as everything it owned before the run and shrinks as its records are
/// declared again. Whatever remains once every module is applied is orphaned.
#[derive(Debug, Clone, Default)]
pub struct DeleteLedger {
    pending: BTreeMap<String, BTreeSet<String>>,
}

impl DeleteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `module`. A module is seeded once per run.
    pub fn seed(&mut self, module: &str, owned: BTreeSet<String>) {
        self.pending.entry(module.to_string()).or_insert(owned);
    }

    pub fn is_seeded(&self, module: &str) -> bool {
        self.pending.contains_key(module)
    }

    /// Mark `id` as declared. Returns true if it was pending deletion.
    pub fn touch(&mut self, id: &XmlId) -> bool {
        self.pending
            .get_mut(&id.module)
            .is_some_and(|names| names.remove(&id.name))
    }

    pub fn remaining(&self) -> impl Iterator<Item = XmlId> + '_ {
        self.pending
            .iter()
            .flat_map(|(module, names)| names.iter().map(move |name| XmlId::new(module, name)))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(BTreeSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_shrinks_only_seeded_modules() {
        let mut ledger = DeleteLedger::new();
        ledger.seed("base", BTreeSet::from(["x".to_string(), "y".to_string()]));

        assert!(ledger.touch(&XmlId::new("base", "x")));
        assert!(!ledger.touch(&XmlId::new("base", "x")));
        assert!(!ledger.touch(&XmlId::new("sale", "x")));

        let left: Vec<_> = ledger.remaining().map(|id| id.to_string()).collect();
        assert_eq!(left, vec!["base.y"]);
        assert!(!ledger.is_empty());
    }

    #[test]
    fn seeding_twice_keeps_progress() {
        let mut ledger = DeleteLedger::new();
        ledger.seed("base", BTreeSet::from(["x".to_string()]));
        ledger.touch(&XmlId::new("base", "x"));
        ledger.seed("base", BTreeSet::from(["x".to_string()]));
        assert!(ledger.is_seeded("base"));
        assert!(ledger.is_empty());
    }
}
