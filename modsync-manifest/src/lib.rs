//! Module manifest ingestion.
//!
//! modsync discovers modules as `<addons>/<name>/module.toml`. Loading is tolerant: a manifest that
//! cannot be read or parsed is reported alongside the good ones instead of aborting discovery, so the
//! dependency resolver can name exactly which modules are unusable.

mod load;

pub use load::{LoadedManifest, MANIFEST_FILE_NAME, ManifestLoadError, load_manifests, parse_manifest};
