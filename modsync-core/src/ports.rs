//! Port traits abstracting all I/O away from the pipeline.

use camino::Utf8Path;
use modsync_manifest::LoadedManifest;

pub use modsync_domain::ModuleSource;
pub use modsync_reconcile::ports::Database;

/// Source of module manifests.
pub trait ManifestSource {
    fn load_manifests(&self) -> anyhow::Result<Vec<LoadedManifest>>;
}

/// File-system write operations.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
