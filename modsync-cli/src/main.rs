mod config;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use config::{ConfigMerger, UpdateOverrides};
use modsync_core::adapters::{FsManifestSource, FsWritePort, JsonFileDatabase};
use modsync_core::pipeline::{resolve_order, run_update, write_update_artifacts};
use modsync_domain::{FsModuleSource, UpdateRequest};
use modsync_render::{flags_label, render_order_md};
use modsync_types::report::{RunStatus, ToolInfo};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "modsync",
    version,
    about = "Dependency-ordered module updates with idempotent record reconciliation."
)]
struct Cli {
    /// Config file (default: ./modsync.toml when present).
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install or update modules and reconcile their declared records.
    Update(UpdateArgs),
    /// Print the resolved module application order.
    Order(OrderArgs),
}

#[derive(Debug, Parser)]
struct UpdateArgs {
    /// Addons directory, one subdirectory per module.
    #[arg(long)]
    addons: Option<Utf8PathBuf>,

    /// Database directory holding schema.toml and state.json.
    #[arg(long)]
    db: Option<Utf8PathBuf>,

    /// Modules to install (comma-separated, repeatable; `all` for every module).
    #[arg(short = 'i', long = "install", value_name = "NAMES")]
    install: Vec<String>,

    /// Modules to update (comma-separated, repeatable; `all` for every module).
    #[arg(short = 'u', long = "update", value_name = "NAMES")]
    update: Vec<String>,

    /// Update every module.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Load demo data of newly installed modules.
    #[arg(long, default_value_t = false)]
    demo: bool,

    /// Test mode: skip data blocks marked `skip_test`.
    #[arg(long = "test", default_value_t = false)]
    test_mode: bool,

    /// Partial import: keep records no longer declared.
    #[arg(long, default_value_t = false)]
    partial: bool,

    /// Source language of translatable fields.
    #[arg(long)]
    lang: Option<String>,

    /// Output directory for run reports.
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct OrderArgs {
    /// Addons directory, one subdirectory per module.
    #[arg(long)]
    addons: Option<Utf8PathBuf>,

    /// Show install flags as if these modules were requested.
    #[arg(short = 'i', long = "install", value_name = "NAMES", value_delimiter = ',')]
    install: Vec<String>,

    /// Show update flags as if these modules were requested.
    #[arg(short = 'u', long = "update", value_name = "NAMES", value_delimiter = ',')]
    update: Vec<String>,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Md,
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file_config = config::load_or_default(cli.config.as_deref(), Utf8Path::new("."))
        .context("load modsync.toml config")?;
    let merger = ConfigMerger::new(file_config);

    match cli.cmd {
        Command::Update(args) => cmd_update(args, merger),
        Command::Order(args) => cmd_order(args, merger),
    }
}

fn cmd_update(args: UpdateArgs, merger: ConfigMerger) -> anyhow::Result<ExitCode> {
    let settings = merger.merge_update_args(UpdateOverrides {
        addons: args.addons,
        db: args.db,
        out_dir: args.out_dir,
        install: args.install,
        update: args.update,
        all: args.all,
        demo: args.demo,
        test_mode: args.test_mode,
        partial: args.partial,
        lang: args.lang,
    });

    let mut db = JsonFileDatabase::open(&settings.db_dir)
        .with_context(|| format!("open database {}", settings.db_dir))?;
    let manifests = FsManifestSource::new(settings.addons_dir.clone());
    let files = FsModuleSource::new(settings.addons_dir.clone());
    let cancel = AtomicBool::new(false);

    let report = match run_update(&settings, &manifests, &files, &mut db, tool(), &cancel) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    write_update_artifacts(&report, &settings.out_dir, &FsWritePort)
        .with_context(|| format!("write reports to {}", settings.out_dir))?;
    info!(
        status = ?report.status,
        modules = report.summary.modules_applied,
        created = report.summary.created,
        updated = report.summary.updated,
        conflicts = report.summary.conflicts,
        deleted = report.summary.deleted,
        "wrote run report to {}",
        settings.out_dir
    );

    Ok(match report.status {
        RunStatus::Success => ExitCode::from(0),
        RunStatus::Warn => {
            warn!("completed with warnings; see report.md");
            ExitCode::from(0)
        }
        RunStatus::Failed | RunStatus::Cancelled => ExitCode::from(1),
    })
}

fn cmd_order(args: OrderArgs, merger: ConfigMerger) -> anyhow::Result<ExitCode> {
    let addons = merger.addons_dir(args.addons.as_deref());
    let request = UpdateRequest {
        install: args.install.into_iter().collect(),
        update: args.update.into_iter().collect(),
        ..UpdateRequest::default()
    };

    let order = match resolve_order(&FsManifestSource::new(addons), &request) {
        Ok(order) => order,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    match args.format {
        OutputFormat::Text => {
            for (i, m) in order.modules.iter().enumerate() {
                println!(
                    "{:>3}. {} (depth {}) [{}]",
                    i + 1,
                    m.name,
                    m.depth,
                    flags_label(m.flags)
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&order).context("serialize order")?;
            println!("{json}");
        }
        OutputFormat::Md => print!("{}", render_order_md(&order)),
    }
    Ok(ExitCode::from(0))
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "modsync".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}
