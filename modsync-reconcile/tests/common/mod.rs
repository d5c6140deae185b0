#![allow(dead_code)]

use chrono::NaiveDate;
use modsync_domain::{ParseOptions, parse_xml};
use modsync_reconcile::ports::ProvenanceStore;
use modsync_reconcile::{ApplyContext, DeleteLedger, MemoryDatabase, ReconcileError, Reconciler};
use modsync_types::manifest::ApplyMode;
use modsync_types::report::ModuleReport;
use modsync_types::schema::{FieldDef, FieldKind, ModelDef, OnDelete, SchemaFile};

pub fn schema() -> SchemaFile {
    let mut schema = SchemaFile::default();
    let mut add = |name: &str, def: ModelDef| {
        schema.models.insert(name.to_string(), def);
    };

    add(
        "res.country",
        ModelDef::default()
            .with_field("name", FieldDef::new(FieldKind::Char))
            .with_field("code", FieldDef::new(FieldKind::Char)),
    );
    add(
        "res.partner",
        ModelDef::default()
            .with_field("name", FieldDef::new(FieldKind::Char).translatable())
            .with_field("credit", FieldDef::new(FieldKind::Integer))
            .with_field("active", FieldDef::new(FieldKind::Boolean))
            .with_field("country_id", FieldDef::many2one("res.country"))
            .with_field(
                "parent_id",
                FieldDef::many2one("res.partner").on_delete(OnDelete::Restrict),
            )
            .with_field("category_ids", FieldDef::many2many("res.country"))
            .with_field("child_ids", FieldDef::new(FieldKind::One2many)),
    );
    add(
        "ir.actions.act_window",
        ModelDef::default()
            .with_field("name", FieldDef::new(FieldKind::Char))
            .with_field("res_model", FieldDef::new(FieldKind::Char))
            .with_field("view_type", FieldDef::new(FieldKind::Selection)),
    );
    add(
        "ir.ui.menu",
        ModelDef::default()
            .with_field("name", FieldDef::new(FieldKind::Char).translatable())
            .with_field("parent_id", FieldDef::many2one("ir.ui.menu"))
            .with_field("sequence", FieldDef::new(FieldKind::Integer))
            .with_field("icon", FieldDef::new(FieldKind::Char))
            .with_field("action", FieldDef::new(FieldKind::Reference))
            .with_field("active", FieldDef::new(FieldKind::Boolean)),
    );
    add(
        "ir.values",
        ModelDef::default()
            .with_field("name", FieldDef::new(FieldKind::Char))
            .with_field("value", FieldDef::new(FieldKind::Char)),
    );
    add(
        "workflow.activity",
        ModelDef::default().with_field("name", FieldDef::new(FieldKind::Char)),
    );
    add(
        "workflow.transition",
        ModelDef::default()
            .with_field(
                "act_from",
                FieldDef::many2one("workflow.activity").on_delete(OnDelete::Cascade),
            )
            .with_field(
                "act_to",
                FieldDef::many2one("workflow.activity").on_delete(OnDelete::Cascade),
            ),
    );
    add(
        "workflow.workitem",
        ModelDef::default().with_field(
            "act_id",
            FieldDef::many2one("workflow.activity").on_delete(OnDelete::Restrict),
        ),
    );
    add(
        "workflow.log",
        ModelDef::default()
            .with_field(
                "activity_id",
                FieldDef::many2one("workflow.activity").on_delete(OnDelete::Restrict),
            )
            .with_field(
                "transition_id",
                FieldDef::many2one("workflow.transition").on_delete(OnDelete::Restrict),
            ),
    );
    schema
}

pub fn ctx(module: &str, mode: ApplyMode) -> ApplyContext {
    ApplyContext {
        module: module.to_string(),
        mode,
        lang: "en_US".to_string(),
        now: NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap(),
        server_version: "5.0.0".to_string(),
    }
}

/// Apply one markup document as `module`, seeding the ledger the way a pipeline run does.
pub fn try_apply(
    db: &mut MemoryDatabase,
    ledger: &mut DeleteLedger,
    module: &str,
    mode: ApplyMode,
    xml: &str,
) -> Result<ModuleReport, ReconcileError> {
    if !ledger.is_seeded(module) {
        ledger.seed(module, db.list_owned(module)?);
    }
    let instructions = parse_xml(xml, &ParseOptions::default())?;
    let ctx = ctx(module, mode);
    let mut report = ModuleReport::new(module, "1.0", mode);
    let mut reconciler = Reconciler::new(db, ledger, &ctx);
    for instruction in &instructions {
        reconciler.apply(instruction, &mut report)?;
    }
    Ok(report)
}

pub fn apply(
    db: &mut MemoryDatabase,
    ledger: &mut DeleteLedger,
    module: &str,
    mode: ApplyMode,
    xml: &str,
) -> ModuleReport {
    try_apply(db, ledger, module, mode, xml).expect("apply")
}

/// Apply in a fresh run (new ledger).
pub fn apply_once(db: &mut MemoryDatabase, module: &str, mode: ApplyMode, xml: &str) -> ModuleReport {
    apply(db, &mut DeleteLedger::new(), module, mode, xml)
}

pub fn res_id(db: &MemoryDatabase, module: &str, name: &str) -> i64 {
    db.lookup(module, name)
        .unwrap()
        .unwrap_or_else(|| panic!("no entry for {module}.{name}"))
        .res_id
}
