//! Configuration file loading for modsync.
//!
//! Discovers and loads `modsync.toml` from the working directory.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use modsync_core::settings::UpdateSettings;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "modsync.toml";

/// Module name that stands for every module in `install` / `update` lists.
pub const ALL_MODULES: &str = "all";

/// Top-level configuration from modsync.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModsyncConfig {
    pub paths: PathsConfig,
    pub run: RunConfig,
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one subdirectory per module.
    pub addons: Option<Utf8PathBuf>,

    /// Database directory (`schema.toml` + `state.json`).
    pub db: Option<Utf8PathBuf>,

    /// Where run reports are written.
    pub out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub lang: Option<String>,
    pub demo: bool,
    pub test_mode: bool,
    /// Partial import: skip orphan deletion.
    pub partial: bool,
    pub server_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub install: Vec<String>,
    pub update: Vec<String>,
}

/// Discover the modsync.toml config file in `dir`.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a modsync.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<ModsyncConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<ModsyncConfig> {
    let config: ModsyncConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit config file, or discover one in `dir`, or fall back to defaults.
pub fn load_or_default(explicit: Option<&Utf8Path>, dir: &Utf8Path) -> anyhow::Result<ModsyncConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match discover_config(dir) {
        Some(path) => load_config(&path),
        None => Ok(ModsyncConfig::default()),
    }
}

/// CLI values for the `update` command, before merging.
#[derive(Debug, Clone, Default)]
pub struct UpdateOverrides {
    pub addons: Option<Utf8PathBuf>,
    pub db: Option<Utf8PathBuf>,
    pub out_dir: Option<Utf8PathBuf>,
    pub install: Vec<String>,
    pub update: Vec<String>,
    pub all: bool,
    pub demo: bool,
    pub test_mode: bool,
    pub partial: bool,
    pub lang: Option<String>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: ModsyncConfig,
}

impl ConfigMerger {
    pub fn new(config: ModsyncConfig) -> Self {
        Self { config }
    }

    /// Addons directory: CLI, then config file, then the default.
    pub fn addons_dir(&self, cli: Option<&Utf8Path>) -> Utf8PathBuf {
        cli.map(Utf8Path::to_path_buf)
            .or_else(|| self.config.paths.addons.clone())
            .unwrap_or_else(|| UpdateSettings::default().addons_dir)
    }

    /// Merge with update command CLI arguments.
    ///
    /// Paths and `lang` from the CLI replace config values. Module lists extend the config
    /// lists, and boolean flags are enabled by either source.
    pub fn merge_update_args(self, cli: UpdateOverrides) -> UpdateSettings {
        let defaults = UpdateSettings::default();
        let paths = self.config.paths;
        let run = self.config.run;

        let mut install: BTreeSet<String> = self.config.modules.install.into_iter().collect();
        install.extend(split_names(&cli.install));
        let mut update: BTreeSet<String> = self.config.modules.update.into_iter().collect();
        update.extend(split_names(&cli.update));

        let install_all = install.remove(ALL_MODULES);
        let update_all = update.remove(ALL_MODULES) || cli.all;

        UpdateSettings {
            addons_dir: cli.addons.or(paths.addons).unwrap_or(defaults.addons_dir),
            db_dir: cli.db.or(paths.db).unwrap_or(defaults.db_dir),
            out_dir: cli.out_dir.or(paths.out_dir).unwrap_or(defaults.out_dir),
            install,
            update,
            install_all,
            update_all,
            demo: cli.demo || run.demo,
            test_mode: cli.test_mode || run.test_mode,
            skip_orphan_delete: cli.partial || run.partial,
            lang: cli.lang.or(run.lang).unwrap_or(defaults.lang),
            server_version: run.server_version.unwrap_or(defaults.server_version),
        }
    }
}

/// Flatten `-i a,b -i c` style values into trimmed, non-empty names.
fn split_names(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
