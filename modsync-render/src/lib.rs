//! Rendering helpers (markdown) for human-readable artifacts.

use modsync_types::manifest::{ApplyMode, ModuleFlags};
use modsync_types::report::{DeletionOutcome, ModuleStatus, OrderReport, RunReport, RunStatus};

pub fn render_run_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# modsync update\n\n");
    out.push_str(&format!("- Run: `{}`\n", report.run_id));
    out.push_str(&format!("- Status: `{}`\n", run_status_label(report.status)));
    out.push_str(&format!(
        "- Started: {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(ended) = report.ended_at {
        out.push_str(&format!(
            "- Ended: {}\n",
            ended.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    let s = &report.summary;
    out.push_str(&format!(
        "- Modules applied: {}\n- Created: {}\n- Updated: {}\n- Unchanged: {}\n- Skipped: {}\n- Conflicts: {}\n- Deleted: {}\n- Retained: {}\n\n",
        s.modules_applied,
        s.created,
        s.updated,
        s.unchanged,
        s.skipped,
        s.conflicts,
        s.deleted,
        s.retained
    ));

    if !report.errors.is_empty() {
        out.push_str("## Errors\n\n");
        for e in &report.errors {
            out.push_str(&format!("- {}\n", e));
        }
        out.push('\n');
    }

    out.push_str("## Modules\n\n");
    if report.modules.is_empty() {
        out.push_str("_No modules applied._\n");
    }
    for (i, m) in report.modules.iter().enumerate() {
        out.push_str(&format!("### {}. {} {}\n\n", i + 1, m.name, m.version));
        out.push_str(&format!("- Mode: `{}`\n", mode_label(m.mode)));
        out.push_str(&format!("- Status: `{}`\n", module_status_label(m.status)));
        let c = &m.counts;
        out.push_str(&format!(
            "- Records: {} created, {} recreated, {} updated, {} unchanged, {} skipped\n",
            c.created, c.recreated, c.updated, c.unchanged, c.skipped
        ));
        if c.statements > 0 {
            out.push_str(&format!("- SQL statements: {}\n", c.statements));
        }
        if c.translations > 0 {
            out.push_str(&format!("- Translations: {}\n", c.translations));
        }
        if let Some(err) = &m.error {
            out.push_str(&format!("- Error: {}\n", err));
        }

        if !m.files.is_empty() {
            out.push_str("\n**Files**\n\n");
            for f in &m.files {
                match &f.skipped {
                    Some(reason) => out.push_str(&format!("- `{}` skipped: {}\n", f.path, reason)),
                    None => out.push_str(&format!(
                        "- `{}` {} instructions, sha256 {}\n",
                        f.path,
                        f.instructions,
                        f.sha256.as_deref().unwrap_or("-")
                    )),
                }
            }
        }

        if !m.conflicts.is_empty() {
            out.push_str("\n**Conflicts**\n\n");
            for c in &m.conflicts {
                let snapshot = c
                    .snapshot
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!(
                    "- `{}` `{}`: live {}, applied {}, declared {}\n",
                    c.xml_id, c.field, c.live, snapshot, c.declared
                ));
            }
        }
        out.push('\n');
    }

    if !report.deletions.is_empty() {
        out.push_str("## Deletions\n\n");
        for d in &report.deletions {
            let outcome = match &d.outcome {
                DeletionOutcome::Deleted => "deleted".to_string(),
                DeletionOutcome::AlreadyGone => "already gone".to_string(),
                DeletionOutcome::Retained { reason } => format!("retained ({})", reason),
            };
            out.push_str(&format!(
                "- `{}` {},{}: {}\n",
                d.xml_id, d.model, d.res_id, outcome
            ));
        }
    }

    out
}

pub fn render_order_md(order: &OrderReport) -> String {
    let mut out = String::new();
    out.push_str("# modsync order\n\n");
    if order.modules.is_empty() {
        out.push_str("_No modules._\n");
        return out;
    }

    out.push_str("| # | Module | Depth | Pending |\n");
    out.push_str("|---|--------|-------|---------|\n");
    for (i, m) in order.modules.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            i + 1,
            m.name,
            m.depth,
            flags_label(m.flags)
        ));
    }
    out
}

/// Comma-separated pending flags, `-` when none.
pub fn flags_label(flags: ModuleFlags) -> String {
    let mut parts = Vec::new();
    if flags.install {
        parts.push("install");
    }
    if flags.update {
        parts.push("update");
    }
    if flags.demo {
        parts.push("demo");
    }
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(",")
    }
}

fn run_status_label(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Success => "success",
        RunStatus::Warn => "warn",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn module_status_label(s: ModuleStatus) -> &'static str {
    match s {
        ModuleStatus::Applied => "applied",
        ModuleStatus::Failed => "failed",
    }
}

fn mode_label(m: ApplyMode) -> &'static str {
    match m {
        ApplyMode::Init => "init",
        ApplyMode::Update => "update",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use modsync_types::report::{
        Conflict, DeletionReport, FileReport, ModuleReport, OrderedModule, ToolInfo,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run_report() -> RunReport {
        let mut report = RunReport::new(
            ToolInfo {
                name: "modsync".into(),
                version: Some("0.1.0".into()),
            },
            "run-1".into(),
        );
        report.started_at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        report
    }

    #[test]
    fn empty_run_says_so() {
        let md = render_run_md(&run_report());
        assert!(md.starts_with("# modsync update\n"));
        assert!(md.contains("- Status: `success`"));
        assert!(md.contains("- Started: 2024-03-05 12:00:00 UTC"));
        assert!(md.contains("_No modules applied._"));
        assert!(!md.contains("## Deletions"));
    }

    #[test]
    fn modules_conflicts_and_deletions_are_listed() {
        let mut report = run_report();
        let mut base = ModuleReport::new("base", "1.0", ApplyMode::Update);
        base.counts.updated = 2;
        base.files.push(FileReport {
            path: "data.xml".into(),
            sha256: Some("abc".into()),
            instructions: 3,
            skipped: None,
        });
        base.files.push(FileReport {
            path: "init.sql".into(),
            sha256: None,
            instructions: 0,
            skipped: Some("sql is only loaded on install".into()),
        });
        base.conflicts.push(Conflict {
            xml_id: "base.partner_1".into(),
            model: "res.partner".into(),
            res_id: 7,
            field: "name".into(),
            live: json!("Mine"),
            snapshot: None,
            declared: json!("Theirs"),
        });
        report.modules.push(base);
        report.deletions.push(DeletionReport {
            xml_id: "base.old".into(),
            model: "res.country".into(),
            res_id: 3,
            outcome: DeletionOutcome::Retained {
                reason: "still referenced by res.partner.country_id of res.partner,9".into(),
            },
        });
        report.summarize();

        let md = render_run_md(&report);
        assert!(md.contains("### 1. base 1.0"));
        assert!(md.contains("- Mode: `update`"));
        assert!(md.contains("0 created, 0 recreated, 2 updated, 0 unchanged, 0 skipped"));
        assert!(md.contains("- `data.xml` 3 instructions, sha256 abc"));
        assert!(md.contains("- `init.sql` skipped: sql is only loaded on install"));
        assert!(md.contains("- `base.partner_1` `name`: live \"Mine\", applied -, declared \"Theirs\""));
        assert!(md.contains("- `base.old` res.country,3: retained (still referenced"));
        assert!(md.contains("- Retained: 1"));
    }

    #[test]
    fn order_table_lists_flags() {
        let order = OrderReport::new(vec![
            OrderedModule {
                name: "base".into(),
                depth: 0,
                flags: ModuleFlags {
                    install: true,
                    update: false,
                    demo: true,
                },
            },
            OrderedModule {
                name: "sale".into(),
                depth: 1,
                flags: ModuleFlags::default(),
            },
        ]);
        let md = render_order_md(&order);
        assert_eq!(
            md,
            "# modsync order\n\n| # | Module | Depth | Pending |\n|---|--------|-------|---------|\n| 1 | base | 0 | install,demo |\n| 2 | sale | 1 | - |\n"
        );
    }
}
