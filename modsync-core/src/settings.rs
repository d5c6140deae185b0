//! Clap-free settings for the update pipeline.

use camino::Utf8PathBuf;
use modsync_domain::UpdateRequest;
use std::collections::BTreeSet;

/// Settings for one `update` run.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub addons_dir: Utf8PathBuf,
    pub db_dir: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,

    // Requested work
    pub install: BTreeSet<String>,
    pub update: BTreeSet<String>,
    pub install_all: bool,
    pub update_all: bool,
    pub demo: bool,

    // Loading behaviour
    pub test_mode: bool,
    /// Partial import: leave orphaned records in place.
    pub skip_orphan_delete: bool,
    pub lang: String,
    /// Exposed to expressions as `version`.
    pub server_version: String,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            addons_dir: Utf8PathBuf::from("addons"),
            db_dir: Utf8PathBuf::from("db"),
            out_dir: Utf8PathBuf::from("artifacts/modsync"),
            install: BTreeSet::new(),
            update: BTreeSet::new(),
            install_all: false,
            update_all: false,
            demo: false,
            test_mode: false,
            skip_orphan_delete: false,
            lang: "en_US".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl UpdateSettings {
    pub fn request(&self) -> UpdateRequest {
        UpdateRequest {
            install: self.install.clone(),
            update: self.update.clone(),
            install_all: self.install_all,
            update_all: self.update_all,
            demo: self.demo,
        }
    }
}
