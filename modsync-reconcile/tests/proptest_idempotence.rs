//! Property-based tests for repeated applies.
//!
//! These tests verify that:
//! - A second apply of the same declarations writes nothing
//! - Changing declarations updates exactly the changed records, then settles

mod common;

use common::{apply_once, schema};
use modsync_reconcile::MemoryDatabase;
use modsync_types::manifest::ApplyMode;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Partner {
    name: String,
    credit: i32,
    active: bool,
}

fn arb_partner() -> impl Strategy<Value = Partner> {
    ("[A-Za-z][A-Za-z0-9]{0,11}", any::<i32>(), any::<bool>()).prop_map(
        |(name, credit, active)| Partner {
            name,
            credit,
            active,
        },
    )
}

fn document(partners: &[Partner]) -> String {
    let mut xml = String::from("<openerp><data>\n");
    for (i, p) in partners.iter().enumerate() {
        let active = if p.active { "True" } else { "False" };
        xml.push_str(&format!(
            "  <record model=\"res.partner\" id=\"p{i}\">\
<field name=\"name\">{}</field>\
<field name=\"credit\" type=\"int\">{}</field>\
<field name=\"active\" eval=\"{active}\"/></record>\n",
            p.name, p.credit
        ));
    }
    xml.push_str("</data></openerp>");
    xml
}

proptest! {
    #[test]
    fn second_apply_writes_nothing(partners in prop::collection::vec(arb_partner(), 1..8)) {
        let mut db = MemoryDatabase::new(schema());
        let xml = document(&partners);
        let first = apply_once(&mut db, "base", ApplyMode::Init, &xml);
        prop_assert_eq!(first.counts.created, partners.len() as u64);
        db.reset_stats();

        let second = apply_once(&mut db, "base", ApplyMode::Update, &xml);

        prop_assert_eq!(second.counts.writes(), 0);
        prop_assert_eq!(second.counts.unchanged, partners.len() as u64);
        prop_assert!(second.conflicts.is_empty());
        let stats = db.stats();
        prop_assert_eq!(stats.creates + stats.writes + stats.deletes, 0);
    }

    #[test]
    fn changed_declarations_update_then_settle(
        pairs in prop::collection::vec((arb_partner(), arb_partner()), 1..8),
    ) {
        let before: Vec<Partner> = pairs.iter().map(|(a, _)| a.clone()).collect();
        let after: Vec<Partner> = pairs.iter().map(|(_, b)| b.clone()).collect();
        let changed = pairs.iter().filter(|(a, b)| a != b).count() as u64;

        let mut db = MemoryDatabase::new(schema());
        apply_once(&mut db, "base", ApplyMode::Init, &document(&before));

        let update = apply_once(&mut db, "base", ApplyMode::Update, &document(&after));
        prop_assert_eq!(update.counts.updated, changed);
        prop_assert!(update.conflicts.is_empty());

        db.reset_stats();
        let settled = apply_once(&mut db, "base", ApplyMode::Update, &document(&after));
        prop_assert_eq!(settled.counts.writes(), 0);
        prop_assert_eq!(db.stats().writes, 0);
    }
}
