use crate::error::{ReconcileError, StorageError};
use crate::ledger::DeleteLedger;
use crate::ports::Database;
use modsync_types::Values;
use modsync_types::provenance::ProvenanceEntry;
use modsync_types::report::{DeletionOutcome, DeletionReport};
use modsync_types::schema::DomainTerm;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub const WORKFLOW_ACTIVITY: &str = "workflow.activity";
pub const WORKFLOW_TRANSITION: &str = "workflow.transition";
pub const WORKFLOW_WORKITEM: &str = "workflow.workitem";
pub const IR_VALUES: &str = "ir.values";

/// Delete every record whose declared id is still pending in `ledger`.
///
/// Newest records go first (`seq` descending). Records created in `noupdate` blocks are kept.
/// A record that is still referenced elsewhere is retained and reported; the run continues.
pub fn collect_orphans(
    db: &mut dyn Database,
    ledger: &DeleteLedger,
) -> Result<Vec<DeletionReport>, ReconcileError> {
    let mut orphans: Vec<ProvenanceEntry> = Vec::new();
    for xml_id in ledger.remaining() {
        match db.lookup(&xml_id.module, &xml_id.name)? {
            Some(entry) if entry.noupdate => {
                debug!(xml_id = %xml_id, "keeping orphan created under noupdate");
            }
            Some(entry) => orphans.push(entry),
            None => {}
        }
    }
    orphans.sort_by(|a, b| b.seq.cmp(&a.seq));

    let mut out = Vec::with_capacity(orphans.len());
    for entry in orphans {
        // Entries sharing a row vanish with the first delete of that row.
        if db.lookup(&entry.module, &entry.name)?.is_none() {
            continue;
        }
        out.push(delete_orphan(db, &entry)?);
    }
    Ok(out)
}

fn delete_orphan(
    db: &mut dyn Database,
    entry: &ProvenanceEntry,
) -> Result<DeletionReport, ReconcileError> {
    let xml_id = entry.xml_id();
    let report = |outcome| DeletionReport {
        xml_id: xml_id.to_string(),
        model: entry.model.clone(),
        res_id: entry.res_id,
        outcome,
    };

    let exists = db.model(&entry.model).is_some()
        && db.read(&entry.model, entry.res_id, &[])?.is_some();
    if !exists {
        db.delete_entry(&entry.module, &entry.name)?;
        debug!(xml_id = %xml_id, "orphan row already gone; dropped provenance");
        return Ok(report(DeletionOutcome::AlreadyGone));
    }

    let relink = if entry.model == WORKFLOW_ACTIVITY {
        match plan_relink(&*db, entry.res_id)? {
            Ok(relink) => Some(relink),
            Err(referrer) => return Ok(report(retained(entry, referrer))),
        }
    } else {
        None
    };

    if let Some(relink) = relink {
        relink.apply(db)?;
    }

    match db.delete(&entry.model, entry.res_id) {
        Ok(()) => {}
        Err(StorageError::StillReferenced { referrer, .. }) => {
            return Ok(report(retained(entry, referrer)));
        }
        Err(e) => return Err(e.into()),
    }

    for (module, name) in db.entries_for_record(&entry.model, entry.res_id)? {
        db.delete_entry(&module, &name)?;
    }
    unbind_values(db, &entry.model, entry.res_id)?;

    info!(xml_id = %xml_id, model = %entry.model, res_id = entry.res_id, "deleted orphaned record");
    Ok(report(DeletionOutcome::Deleted))
}

fn retained(entry: &ProvenanceEntry, referrer: String) -> DeletionOutcome {
    warn!(
        xml_id = %entry.xml_id(),
        model = %entry.model,
        res_id = entry.res_id,
        referrer = %referrer,
        "orphan is still referenced; keeping it"
    );
    DeletionOutcome::Retained {
        reason: format!("still referenced by {referrer}"),
    }
}

/// Workitems to move off a deleted activity and transitions into it.
struct Relink {
    activity: i64,
    predecessor: Option<i64>,
    workitems: Vec<i64>,
    incoming: Vec<i64>,
}

impl Relink {
    fn apply(&self, db: &mut dyn Database) -> Result<(), ReconcileError> {
        if let Some(predecessor) = self.predecessor {
            let relinked = Values::from([("act_id".to_string(), json!(predecessor))]);
            for workitem in &self.workitems {
                db.write(WORKFLOW_WORKITEM, *workitem, &relinked)?;
            }
            debug!(
                activity = self.activity,
                predecessor,
                count = self.workitems.len(),
                "relinked workitems"
            );
        }
        for transition in &self.incoming {
            db.delete(WORKFLOW_TRANSITION, *transition)?;
        }
        Ok(())
    }
}

/// Work out the relink for `activity` and check that it and the activity delete would go
/// through. Nothing is written here; the inner `Err` names the blocking referrer.
fn plan_relink(
    db: &dyn Database,
    activity: i64,
) -> Result<Result<Relink, String>, ReconcileError> {
    let mut relink = Relink {
        activity,
        predecessor: None,
        workitems: Vec::new(),
        incoming: Vec::new(),
    };
    if db.model(WORKFLOW_TRANSITION).is_some() {
        relink.incoming = db.search(
            WORKFLOW_TRANSITION,
            &vec![DomainTerm::equals("act_to", json!(activity))],
        )?;
    }

    for transition in &relink.incoming {
        let from = db
            .read(WORKFLOW_TRANSITION, *transition, &["act_from"])?
            .and_then(|values| values.get("act_from").and_then(Value::as_i64));
        if let Some(from) = from
            && from != activity
        {
            relink.predecessor = Some(from);
            break;
        }
    }

    if relink.predecessor.is_some() && db.model(WORKFLOW_WORKITEM).is_some() {
        relink.workitems = db.search(
            WORKFLOW_WORKITEM,
            &vec![DomainTerm::equals("act_id", json!(activity))],
        )?;
    }

    let mut detached = Vec::new();
    for transition in &relink.incoming {
        if let Some(referrer) = refusal(db.check_delete(WORKFLOW_TRANSITION, *transition, &[]))? {
            return Ok(Err(referrer));
        }
        detached.push((WORKFLOW_TRANSITION.to_string(), *transition));
    }
    detached.extend(
        relink
            .workitems
            .iter()
            .map(|w| (WORKFLOW_WORKITEM.to_string(), *w)),
    );
    if let Some(referrer) = refusal(db.check_delete(WORKFLOW_ACTIVITY, activity, &detached))? {
        return Ok(Err(referrer));
    }
    Ok(Ok(relink))
}

/// The referrer of a refused delete; other storage errors pass through.
fn refusal(result: Result<(), StorageError>) -> Result<Option<String>, ReconcileError> {
    match result {
        Ok(()) => Ok(None),
        Err(StorageError::StillReferenced { referrer, .. }) => Ok(Some(referrer)),
        Err(e) => Err(e.into()),
    }
}

/// Remove `ir.values` bindings whose value is `model,id`.
fn unbind_values(db: &mut dyn Database, model: &str, id: i64) -> Result<(), ReconcileError> {
    if db.model(IR_VALUES).is_none() {
        return Ok(());
    }
    let bindings = db.search(
        IR_VALUES,
        &vec![DomainTerm::equals("value", json!(format!("{model},{id}")))],
    )?;
    for binding in bindings {
        db.delete(IR_VALUES, binding)?;
    }
    Ok(())
}
