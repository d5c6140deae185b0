use crate::error::ReconcileError;
use crate::ledger::DeleteLedger;
use crate::normalize::normalize;
use crate::ports::Database;
use chrono::NaiveDateTime;
use modsync_domain::{EvalEnv, ExprError, RefResolver, coerce_literal, evaluate, parse_domain};
use modsync_types::Values;
use modsync_types::manifest::ApplyMode;
use modsync_types::provenance::{NewProvenance, ProvenanceEntry, TranslationKey};
use modsync_types::record::{FieldExpr, Instruction, MenuInstruction, RecordInstruction, XmlId};
use modsync_types::report::{Conflict, ModuleReport};
use modsync_types::schema::{FieldDef, FieldKind, ModelDef};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const MENU_MODEL: &str = "ir.ui.menu";

/// Per-module settings for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    pub module: String,
    pub mode: ApplyMode,
    /// Source language of translatable fields.
    pub lang: String,
    pub now: NaiveDateTime,
    pub server_version: String,
}

/// Applies instructions of one module against a database.
pub struct Reconciler<'a> {
    db: &'a mut dyn Database,
    ledger: &'a mut DeleteLedger,
    ctx: &'a ApplyContext,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a mut dyn Database, ledger: &'a mut DeleteLedger, ctx: &'a ApplyContext) -> Self {
        Self { db, ledger, ctx }
    }

    /// Apply one instruction, recording its effect in `report`.
    pub fn apply(
        &mut self,
        instruction: &Instruction,
        report: &mut ModuleReport,
    ) -> Result<(), ReconcileError> {
        match instruction {
            Instruction::Record(record) => self.apply_declared(
                &record.model,
                record.id.as_deref(),
                record.update_allowed,
                report,
                |this, def| this.record_values(record, def),
            ),
            Instruction::Menu(menu) => self.apply_declared(
                MENU_MODEL,
                Some(&menu.id),
                menu.update_allowed,
                report,
                |this, def| this.menu_values(menu, def),
            ),
            Instruction::Sql { statement } => {
                if self.ctx.mode != ApplyMode::Init {
                    debug!(module = %self.ctx.module, "skipping sql statement outside install");
                    return Ok(());
                }
                self.db.execute(statement)?;
                report.counts.statements += 1;
                Ok(())
            }
        }
    }

    fn apply_declared<F>(
        &mut self,
        model: &str,
        id: Option<&str>,
        update_allowed: bool,
        report: &mut ModuleReport,
        build: F,
    ) -> Result<(), ReconcileError>
    where
        F: FnOnce(&Self, &ModelDef) -> Result<Values, ReconcileError>,
    {
        let model_def = self
            .db
            .model(model)
            .ok_or_else(|| ReconcileError::UnknownModel {
                model: model.to_string(),
            })?;

        let target = match id {
            Some(raw) => Some(self.target(model, raw)?),
            None => None,
        };

        if let Some((xml_id, Some(entry))) = &target
            && !update_allowed
        {
            self.ledger.touch(xml_id);
            report.counts.skipped += 1;
            debug!(xml_id = %xml_id, res_id = entry.res_id, "record is noupdate; leaving it alone");
            return Ok(());
        }

        let values = build(self, &model_def)?;

        let Some((xml_id, entry)) = target else {
            return self.create_untracked(model, &model_def, values, report);
        };
        self.ledger.touch(&xml_id);

        match entry {
            None => {
                let res_id = self.create_tracked(model, &xml_id, &values, !update_allowed)?;
                report.counts.created += 1;
                self.mirror_translations(model, &model_def, res_id, &values, report)
            }
            Some(entry) => self.update(model, &model_def, &xml_id, entry, values, report),
        }
    }

    /// Resolve a declared id and its existing provenance entry, if any.
    fn target(
        &self,
        model: &str,
        raw: &str,
    ) -> Result<(XmlId, Option<ProvenanceEntry>), ReconcileError> {
        let xml_id = XmlId::resolve(raw, &self.ctx.module)
            .ok_or_else(|| ReconcileError::reference(raw, "invalid identifier"))?;
        let entry = self.db.lookup(&xml_id.module, &xml_id.name)?;
        if let Some(entry) = &entry
            && entry.model != model
        {
            return Err(ReconcileError::ModelMismatch {
                xml_id: xml_id.to_string(),
                recorded: entry.model.clone(),
                declared: model.to_string(),
            });
        }
        Ok((xml_id, entry))
    }

    fn create_untracked(
        &mut self,
        model: &str,
        model_def: &ModelDef,
        values: Values,
        report: &mut ModuleReport,
    ) -> Result<(), ReconcileError> {
        if self.ctx.mode != ApplyMode::Init {
            report.counts.skipped += 1;
            debug!(module = %self.ctx.module, model = %model, "skipping record without id outside install");
            return Ok(());
        }
        let res_id = self.db.create(model, &values)?;
        report.counts.created += 1;
        info!(module = %self.ctx.module, model = %model, res_id, "created untracked record");
        self.mirror_translations(model, model_def, res_id, &values, report)
    }

    fn create_tracked(
        &mut self,
        model: &str,
        xml_id: &XmlId,
        values: &Values,
        noupdate: bool,
    ) -> Result<i64, ReconcileError> {
        let res_id = self.db.create(model, values)?;
        self.db.upsert(NewProvenance {
            module: xml_id.module.clone(),
            name: xml_id.name.clone(),
            model: model.to_string(),
            res_id,
            snapshot: values.clone(),
            noupdate,
        })?;
        info!(xml_id = %xml_id, model = %model, res_id, "created record");
        Ok(res_id)
    }

    fn update(
        &mut self,
        model: &str,
        model_def: &ModelDef,
        xml_id: &XmlId,
        entry: ProvenanceEntry,
        values: Values,
        report: &mut ModuleReport,
    ) -> Result<(), ReconcileError> {
        let fields: Vec<&str> = values.keys().map(String::as_str).collect();
        let Some(live) = self.db.read(model, entry.res_id, &fields)? else {
            // Values other modules merged into the snapshot come back with the row.
            let mut restored = entry.snapshot.clone();
            restored.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            let res_id = self.create_tracked(model, xml_id, &restored, entry.noupdate)?;
            report.counts.recreated += 1;
            info!(xml_id = %xml_id, old_id = entry.res_id, res_id, "backing row was gone; recreated");
            return self.mirror_translations(model, model_def, res_id, &values, report);
        };

        let mut snapshot = entry.snapshot.clone();
        let mut changes = Values::new();
        for (field, declared) in &values {
            let def = field_def(model_def, model, field)?;
            let live_value = normalize(model, field, def, live.get(field).unwrap_or(&Value::Null))?;
            let recorded = snapshot.get(field).cloned();

            if live_value == *declared {
                snapshot.insert(field.clone(), declared.clone());
            } else if recorded.is_none() || recorded.as_ref() == Some(&live_value) {
                changes.insert(field.clone(), declared.clone());
                snapshot.insert(field.clone(), declared.clone());
            } else {
                warn!(
                    xml_id = %xml_id,
                    model = %model,
                    field = %field,
                    live = %live_value,
                    declared = %declared,
                    "field changed outside reconciliation; keeping live value"
                );
                report.conflicts.push(Conflict {
                    xml_id: xml_id.to_string(),
                    model: model.to_string(),
                    res_id: entry.res_id,
                    field: field.clone(),
                    live: live_value,
                    snapshot: recorded,
                    declared: declared.clone(),
                });
            }
        }

        if changes.is_empty() {
            report.counts.unchanged += 1;
            debug!(xml_id = %xml_id, "record unchanged");
        } else {
            self.db.write(model, entry.res_id, &changes)?;
            report.counts.updated += 1;
            info!(xml_id = %xml_id, model = %model, fields = changes.len(), "updated record");
        }

        if snapshot != entry.snapshot {
            self.db.upsert(NewProvenance {
                snapshot,
                ..NewProvenance::from_entry(&entry)
            })?;
        }

        self.mirror_translations(model, model_def, entry.res_id, &values, report)
    }

    fn mirror_translations(
        &mut self,
        model: &str,
        model_def: &ModelDef,
        res_id: i64,
        values: &Values,
        report: &mut ModuleReport,
    ) -> Result<(), ReconcileError> {
        for (field, value) in values {
            let Some(def) = model_def.field(field) else {
                continue;
            };
            let Value::String(src) = value else {
                continue;
            };
            if !def.translate || !def.kind.is_textual() {
                continue;
            }

            let key = TranslationKey {
                model: model.to_string(),
                field: field.clone(),
                lang: self.ctx.lang.clone(),
                res_id,
            };
            if self.db.translation_source(&key)?.as_deref() != Some(src.as_str()) {
                self.db.set_translation_source(&key, src)?;
                report.counts.translations += 1;
                debug!(key = %key, "mirrored translation source");
            }
        }
        Ok(())
    }

    fn record_values(
        &self,
        record: &RecordInstruction,
        model_def: &ModelDef,
    ) -> Result<Values, ReconcileError> {
        let mut values = Values::new();
        for decl in &record.fields {
            let def = field_def(model_def, &record.model, &decl.name)?;
            let raw = self.resolve_field(&record.model, &decl.name, def, &decl.expr)?;
            values.insert(
                decl.name.clone(),
                normalize(&record.model, &decl.name, def, &raw)?,
            );
        }
        Ok(values)
    }

    fn menu_values(
        &self,
        menu: &MenuInstruction,
        model_def: &ModelDef,
    ) -> Result<Values, ReconcileError> {
        let mut raw = Values::new();
        let mut icon = menu.icon.clone();
        let mut action_name = None;

        if let Some(action) = &menu.action {
            let entry = self.resolve_entry(action)?;
            let details = self.read_action(&entry)?;
            action_name = details
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            if icon.is_none() {
                let view_type = details.get("view_type").and_then(Value::as_str);
                icon = Some(default_icon(&entry.model, view_type).to_string());
            }
            raw.insert(
                "action".into(),
                Value::String(format!("{},{}", entry.model, entry.res_id)),
            );
        }

        let name = menu
            .name
            .clone()
            .or(action_name)
            .unwrap_or_else(|| menu.id.clone());
        raw.insert("name".into(), Value::String(name));

        let parent = match &menu.parent {
            Some(parent) => Value::from(self.resolve_entry(parent)?.res_id),
            None => Value::Bool(false),
        };
        raw.insert("parent_id".into(), parent);
        raw.insert(
            "sequence".into(),
            Value::String(menu.sequence.clone().unwrap_or_else(|| "10".to_string())),
        );
        raw.insert(
            "icon".into(),
            Value::String(icon.unwrap_or_else(|| "STOCK_OPEN".to_string())),
        );
        if let Some(active) = &menu.active {
            raw.insert("active".into(), Value::String(active.clone()));
        }

        raw.into_iter()
            .map(|(field, value)| {
                let def = field_def(model_def, MENU_MODEL, &field)?;
                let value = normalize(MENU_MODEL, &field, def, &value)?;
                Ok((field, value))
            })
            .collect()
    }

    /// `name` and `view_type` of an action row, when the action model has them.
    fn read_action(&self, entry: &ProvenanceEntry) -> Result<Values, ReconcileError> {
        let Some(def) = self.db.model(&entry.model) else {
            return Ok(Values::new());
        };
        let fields: Vec<&str> = ["name", "view_type"]
            .into_iter()
            .filter(|f| def.field(f).is_some())
            .collect();
        if fields.is_empty() {
            return Ok(Values::new());
        }
        Ok(self
            .db
            .read(&entry.model, entry.res_id, &fields)?
            .unwrap_or_default())
    }

    fn resolve_field(
        &self,
        model: &str,
        field: &str,
        def: &FieldDef,
        expr: &FieldExpr,
    ) -> Result<Value, ReconcileError> {
        match expr {
            FieldExpr::Literal { text, literal } => {
                coerce_literal(text, *literal).map_err(|reason| ReconcileError::InvalidValue {
                    model: model.to_string(),
                    field: field.to_string(),
                    reason,
                })
            }
            FieldExpr::RefNull => Ok(Value::Bool(false)),
            FieldExpr::Ref { id } => {
                let entry = self.resolve_entry(id)?;
                if def.kind == FieldKind::Reference {
                    Ok(Value::String(format!("{},{}", entry.model, entry.res_id)))
                } else {
                    Ok(Value::from(entry.res_id))
                }
            }
            FieldExpr::Eval { expr } => Ok(self.evaluate(expr)?),
            FieldExpr::Search {
                domain,
                model: search_model,
            } => {
                let target = search_model
                    .as_deref()
                    .or(def.relation.as_deref())
                    .ok_or_else(|| ReconcileError::InvalidValue {
                        model: model.to_string(),
                        field: field.to_string(),
                        reason: "search needs a model".to_string(),
                    })?;
                let terms = parse_domain(&self.evaluate(domain)?)?;
                let ids = self.db.search(target, &terms)?;

                match (def.kind, ids.as_slice()) {
                    (FieldKind::Many2many, _) => {
                        Ok(Value::Array(ids.iter().copied().map(Value::from).collect()))
                    }
                    (FieldKind::Reference, [id]) => Ok(Value::String(format!("{target},{id}"))),
                    (_, [id]) => Ok(Value::from(*id)),
                    (_, []) => Err(ReconcileError::reference(
                        domain.as_str(),
                        format!("no `{target}` record matches"),
                    )),
                    (_, many) => Err(ReconcileError::Ambiguous {
                        model: target.to_string(),
                        count: many.len(),
                    }),
                }
            }
        }
    }

    fn evaluate(&self, expr: &str) -> Result<Value, ExprError> {
        let mut refs = ProvenanceRefs {
            db: &*self.db,
            module: &self.ctx.module,
        };
        let mut env = EvalEnv {
            refs: &mut refs,
            now: self.ctx.now,
            version: &self.ctx.server_version,
        };
        evaluate(expr, &mut env)
    }

    fn resolve_entry(&self, raw: &str) -> Result<ProvenanceEntry, ReconcileError> {
        let xml_id = XmlId::resolve(raw, &self.ctx.module)
            .ok_or_else(|| ReconcileError::reference(raw, "invalid identifier"))?;
        self.db
            .lookup(&xml_id.module, &xml_id.name)?
            .ok_or_else(|| ReconcileError::reference(xml_id.to_string(), "not declared"))
    }
}

struct ProvenanceRefs<'r> {
    db: &'r dyn Database,
    module: &'r str,
}

impl RefResolver for ProvenanceRefs<'_> {
    fn resolve_ref(&mut self, id: &str) -> Result<i64, ExprError> {
        let reference = |reason: String| ExprError::Reference {
            id: id.to_string(),
            reason,
        };
        let xml_id = XmlId::resolve(id, self.module)
            .ok_or_else(|| reference("invalid identifier".to_string()))?;
        self.db
            .lookup(&xml_id.module, &xml_id.name)
            .map_err(|e| reference(e.to_string()))?
            .map(|entry| entry.res_id)
            .ok_or_else(|| reference("not declared".to_string()))
    }
}

fn field_def<'m>(
    model_def: &'m ModelDef,
    model: &str,
    field: &str,
) -> Result<&'m FieldDef, ReconcileError> {
    model_def
        .field(field)
        .ok_or_else(|| ReconcileError::UnknownField {
            model: model.to_string(),
            field: field.to_string(),
        })
}

fn default_icon(action_model: &str, view_type: Option<&str>) -> &'static str {
    match action_model
        .strip_prefix("ir.actions.")
        .unwrap_or(action_model)
    {
        "act_window" if view_type == Some("tree") => "STOCK_INDENT",
        "act_window" => "STOCK_NEW",
        "report.xml" => "STOCK_PASTE",
        "wizard" => "STOCK_EXECUTE",
        "act_url" | "url" => "STOCK_JUMP_TO",
        _ => "STOCK_OPEN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_follow_action_type() {
        assert_eq!(default_icon("ir.actions.act_window", None), "STOCK_NEW");
        assert_eq!(default_icon("ir.actions.act_window", Some("tree")), "STOCK_INDENT");
        assert_eq!(default_icon("ir.actions.report.xml", None), "STOCK_PASTE");
        assert_eq!(default_icon("ir.actions.wizard", None), "STOCK_EXECUTE");
        assert_eq!(default_icon("ir.actions.act_url", None), "STOCK_JUMP_TO");
        assert_eq!(default_icon("ir.actions.server", None), "STOCK_OPEN");
    }
}
