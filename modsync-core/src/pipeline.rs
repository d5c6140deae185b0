//! Resolve and update pipelines, extracted from the CLI.
//!
//! These entry points are I/O-agnostic: manifests, data files, the database and artifact
//! writes all go through port traits.

use crate::ports::{Database, ManifestSource, ModuleSource, WritePort};
use crate::settings::UpdateSettings;
use anyhow::Context;
use camino::Utf8Path;
use chrono::Utc;
use modsync_domain::{
    DataFileKind, Graph, Node, ParseOptions, ResolveError, UpdateRequest, parse_data_file,
    resolve,
};
use modsync_manifest::LoadedManifest;
use modsync_reconcile::{ApplyContext, DeleteLedger, Reconciler, collect_orphans};
use modsync_render::render_run_md;
use modsync_types::manifest::{ApplyMode, Manifest, ModuleFlags};
use modsync_types::report::{
    FileReport, ModuleReport, ModuleStatus, OrderReport, RunReport, RunStatus, ToolInfo,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error type for pipeline results. Exit code 2 = resolution failure, 1 = tool error.
///
/// A module that fails to apply is not an error here: the run report carries it with
/// `RunStatus::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Resolve(_) => 2,
            PipelineError::Internal(_) => 1,
        }
    }
}

/// Resolve the application order without touching any database.
pub fn resolve_order(
    source: &dyn ManifestSource,
    request: &UpdateRequest,
) -> Result<OrderReport, PipelineError> {
    let (manifests, problems) = usable_manifests(source.load_manifests()?);
    for problem in &problems {
        warn!(problem = %problem, "skipping unusable manifest");
    }
    let graph = resolve(&manifests, request)?;
    Ok(OrderReport::new(graph.ordered_modules()))
}

/// Run one update: resolve, apply every pending module in order, then collect orphans.
///
/// Each module is one unit of work. The first module that fails is rolled back and stops the
/// run. `cancel` is checked before each module.
pub fn run_update(
    settings: &UpdateSettings,
    modules: &dyn ManifestSource,
    files: &dyn ModuleSource,
    db: &mut dyn Database,
    tool: ToolInfo,
    cancel: &AtomicBool,
) -> Result<RunReport, PipelineError> {
    let mut run = RunReport::new(tool, Uuid::new_v4().to_string());

    let (manifests, problems) = usable_manifests(modules.load_manifests()?);
    for problem in &problems {
        warn!(problem = %problem, "skipping unusable manifest");
    }
    run.errors.extend(problems);

    let graph = resolve(&manifests, &settings.request())?;
    let order = graph.order();
    run.order = order.iter().map(|n| n.name.clone()).collect();
    info!(modules = order.len(), "resolved module order");

    let by_name: BTreeMap<&str, &Manifest> =
        manifests.iter().map(|m| (m.name.as_str(), m)).collect();
    let opts = ParseOptions {
        test_mode: settings.test_mode,
    };
    let now = run.started_at.naive_utc();
    let mut ledger = DeleteLedger::new();

    for (node, mode) in modules_to_apply(&graph, &*db)? {
        if cancel.load(Ordering::SeqCst) {
            warn!(module = %node.name, "run cancelled; skipping remaining modules");
            run.status = RunStatus::Cancelled;
            break;
        }
        let Some(manifest) = by_name.get(node.name.as_str()) else {
            continue;
        };

        let ctx = ApplyContext {
            module: manifest.name.clone(),
            mode,
            lang: settings.lang.clone(),
            now,
            server_version: settings.server_version.clone(),
        };

        info!(module = %manifest.name, version = %manifest.version, mode = ?mode, "applying module");
        let mut report = ModuleReport::new(&manifest.name, &manifest.version, mode);
        let outcome = apply_module(
            db,
            files,
            manifest,
            node.flags,
            &ctx,
            &opts,
            &mut ledger,
            &mut report,
        )
        .and_then(|()| {
            db.commit()
                .with_context(|| format!("commit module {}", manifest.name))
        });

        match outcome {
            Ok(()) => {
                info!(
                    module = %manifest.name,
                    created = report.counts.created + report.counts.recreated,
                    updated = report.counts.updated,
                    unchanged = report.counts.unchanged,
                    conflicts = report.conflicts.len(),
                    "module applied"
                );
                run.modules.push(report);
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(module = %manifest.name, error = %message, "module failed; rolling back");
                db.rollback()
                    .with_context(|| format!("roll back module {}", manifest.name))?;
                report.status = ModuleStatus::Failed;
                report.error = Some(message.clone());
                run.errors.push(format!("{}: {}", manifest.name, message));
                run.modules.push(report);
                run.status = RunStatus::Failed;
                break;
            }
        }
    }

    if run.status == RunStatus::Success {
        if settings.skip_orphan_delete {
            info!("partial import; leaving orphaned records in place");
        } else {
            collect(db, &ledger, &mut run)?;
        }
    }

    run.summarize();
    if run.status == RunStatus::Success && (run.summary.conflicts > 0 || run.summary.retained > 0)
    {
        run.status = RunStatus::Warn;
    }
    run.ended_at = Some(Utc::now());
    Ok(run)
}

/// Modules this run applies, in graph order, with the mode each one runs in.
///
/// Installed modules are applied when flagged. A module that is not installed yet is applied
/// only when it was requested for install or is a dependency of one; it then runs in `Init`.
fn modules_to_apply<'g>(
    graph: &'g Graph,
    db: &dyn Database,
) -> anyhow::Result<Vec<(&'g Node, ApplyMode)>> {
    let order = graph.order();
    let mut wanted: BTreeSet<&str> = BTreeSet::new();
    for node in order.iter().rev() {
        if node.flags.install || wanted.contains(node.name.as_str()) {
            wanted.insert(node.name.as_str());
            wanted.extend(node.parents.iter().map(|p| graph.node(*p).name.as_str()));
        }
    }

    let mut out = Vec::new();
    for node in order {
        let installed = db
            .installed_version(&node.name)
            .with_context(|| format!("look up installed version of {}", node.name))?
            .is_some();
        if installed {
            if node.flags.is_pending() {
                out.push((node, ApplyMode::Update));
            }
        } else if wanted.contains(node.name.as_str()) {
            if !node.flags.install {
                debug!(module = %node.name, "installing missing dependency");
            }
            out.push((node, ApplyMode::Init));
        } else if node.flags.is_pending() {
            debug!(module = %node.name, "not installed; skipping update");
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn apply_module(
    db: &mut dyn Database,
    files: &dyn ModuleSource,
    manifest: &Manifest,
    flags: ModuleFlags,
    ctx: &ApplyContext,
    opts: &ParseOptions,
    ledger: &mut DeleteLedger,
    report: &mut ModuleReport,
) -> anyhow::Result<()> {
    let owned = db
        .list_owned(&manifest.name)
        .context("list owned records")?;
    ledger.seed(&manifest.name, owned);

    let mut rels: Vec<&str> = manifest.data_files().collect();
    if flags.demo {
        rels.extend(manifest.demo.iter().map(String::as_str));
    }

    for rel in rels {
        let rel = Utf8Path::new(rel);
        let skipped = match DataFileKind::from_path(rel) {
            DataFileKind::Unknown => Some("unsupported file type"),
            DataFileKind::Sql if ctx.mode != ApplyMode::Init => {
                Some("sql is only loaded on install")
            }
            _ => None,
        };
        if let Some(reason) = skipped {
            debug!(module = %manifest.name, file = %rel, reason, "skipping data file");
            report.files.push(FileReport {
                path: rel.to_string(),
                sha256: None,
                instructions: 0,
                skipped: Some(reason.to_string()),
            });
            continue;
        }

        let contents = files.read_data_file(&manifest.name, rel)?;
        let instructions = parse_data_file(rel, &contents, opts)
            .with_context(|| format!("parse {}/{}", manifest.name, rel))?;
        debug!(module = %manifest.name, file = %rel, instructions = instructions.len(), "loading data file");

        let mut reconciler = Reconciler::new(&mut *db, &mut *ledger, ctx);
        for instruction in &instructions {
            reconciler
                .apply(instruction, report)
                .with_context(|| format!("apply {}/{}", manifest.name, rel))?;
        }

        report.files.push(FileReport {
            path: rel.to_string(),
            sha256: Some(sha256_hex(contents.as_bytes())),
            instructions: instructions.len() as u64,
            skipped: None,
        });
    }

    db.mark_installed(&manifest.name, &manifest.version)
        .context("record installed version")?;
    Ok(())
}

/// Orphan collection runs as its own unit of work.
fn collect(
    db: &mut dyn Database,
    ledger: &DeleteLedger,
    run: &mut RunReport,
) -> Result<(), PipelineError> {
    if ledger.is_empty() {
        debug!("no orphaned records");
        return Ok(());
    }
    match collect_orphans(db, ledger)
        .context("collect orphans")
        .and_then(|deletions| {
            db.commit().context("commit orphan deletions")?;
            Ok(deletions)
        }) {
        Ok(deletions) => {
            info!(count = deletions.len(), "orphan collection finished");
            run.deletions = deletions;
        }
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "orphan collection failed; rolling back");
            db.rollback().context("roll back orphan deletions")?;
            run.errors.push(message);
            run.status = RunStatus::Failed;
        }
    }
    Ok(())
}

/// Valid manifests plus one message per manifest that could not be loaded.
fn usable_manifests(loaded: Vec<LoadedManifest>) -> (Vec<Manifest>, Vec<String>) {
    let mut manifests = Vec::with_capacity(loaded.len());
    let mut problems = Vec::new();
    for lm in loaded {
        match lm.manifest {
            Ok(m) => manifests.push(m),
            Err(e) => problems.push(format!("{}: {}", lm.path, e)),
        }
    }
    (manifests, problems)
}

/// Write `report.json` and `report.md` to the output directory.
pub fn write_update_artifacts(
    report: &RunReport,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    writer.write_file(&out_dir.join("report.json"), json.as_bytes())?;

    let md = render_run_md(report);
    writer.write_file(&out_dir.join("report.md"), md.as_bytes())?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
