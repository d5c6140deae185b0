use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::glob;
use modsync_types::manifest::Manifest;
use thiserror::Error;
use tracing::{debug, info};

pub const MANIFEST_FILE_NAME: &str = "module.toml";

#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub path: Utf8PathBuf,
    /// Module name, taken from the directory holding the manifest.
    pub name: String,
    pub manifest: Result<Manifest, ManifestLoadError>,
}

impl LoadedManifest {
    /// Directory holding the manifest; data file paths are relative to it.
    pub fn module_dir(&self) -> &Utf8Path {
        self.path.parent().unwrap_or(Utf8Path::new("."))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestLoadError {
    #[error("io error: {message}")]
    Io { message: String },

    #[error("toml parse error: {message}")]
    Toml { message: String },

    #[error("manifest declares name `{declared}` but lives in directory `{directory}`")]
    NameMismatch { declared: String, directory: String },
}

/// Scan `<addons_dir>/*/module.toml`.
///
/// Unreadable or invalid manifests are returned with their error. Manifests marked
/// `installable = false` are left out. Output is sorted by module name.
pub fn load_manifests(addons_dir: &Utf8Path) -> anyhow::Result<Vec<LoadedManifest>> {
    let pattern = addons_dir.join(format!("*/{MANIFEST_FILE_NAME}"));
    let pattern_str = pattern.as_str();

    debug!(pattern = %pattern_str, "scanning addons for module manifests");

    let mut out = Vec::new();
    for entry in glob(pattern_str).context("glob addons/*/module.toml")? {
        let path = entry
            .map_err(|e| anyhow::anyhow!("glob error: {e}"))?
            .to_string_lossy()
            .to_string();

        let utf8_path = Utf8PathBuf::from(path);
        let name = utf8_path
            .parent()
            .and_then(|p| p.file_name())
            .unwrap_or("unknown")
            .to_string();

        let manifest = match fs::read_to_string(&utf8_path) {
            Ok(s) => parse_manifest(&name, &s),
            Err(e) => Err(ManifestLoadError::Io {
                message: e.to_string(),
            }),
        };

        if let Ok(m) = &manifest
            && !m.installable
        {
            info!(module = %name, "skipping non-installable module");
            continue;
        }

        out.push(LoadedManifest {
            path: utf8_path,
            name,
            manifest,
        });
    }

    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok(out)
}

/// Parse manifest text for the module living in directory `name`.
///
/// A missing `name` key is filled from the directory.
pub fn parse_manifest(name: &str, contents: &str) -> Result<Manifest, ManifestLoadError> {
    let mut manifest: Manifest = toml::from_str(contents).map_err(|e| ManifestLoadError::Toml {
        message: e.to_string(),
    })?;

    if manifest.name.is_empty() {
        manifest.name = name.to_string();
    } else if manifest.name != name {
        return Err(ManifestLoadError::NameMismatch {
            declared: manifest.name,
            directory: name.to_string(),
        });
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fills_name_from_directory() {
        let m = parse_manifest("sale", "version = \"1.0\"\ndepends = [\"base\"]\n").expect("parse");
        assert_eq!(m.name, "sale");
        assert_eq!(m.depends, vec!["base".to_string()]);
    }

    #[test]
    fn parse_rejects_mismatched_name() {
        let err = parse_manifest("sale", "name = \"crm\"\n").expect_err("mismatch");
        assert_eq!(
            err,
            ManifestLoadError::NameMismatch {
                declared: "crm".to_string(),
                directory: "sale".to_string(),
            }
        );
    }

    #[test]
    fn parse_reports_toml_errors() {
        let err = parse_manifest("sale", "depends = [").expect_err("bad toml");
        assert!(matches!(err, ManifestLoadError::Toml { .. }));
    }
}
