use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;

/// Read-only access to module data files.
///
/// Paths are relative to the module's directory.
pub trait ModuleSource {
    fn read_data_file(&self, module: &str, rel: &Utf8Path) -> anyhow::Result<String>;

    fn exists(&self, module: &str, rel: &Utf8Path) -> bool;
}

/// File-system backed `ModuleSource` rooted at an addons directory.
#[derive(Debug, Clone)]
pub struct FsModuleSource {
    root: Utf8PathBuf,
}

impl FsModuleSource {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn abs(&self, module: &str, rel: &Utf8Path) -> Utf8PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(module).join(rel)
        }
    }
}

impl ModuleSource for FsModuleSource {
    fn read_data_file(&self, module: &str, rel: &Utf8Path) -> anyhow::Result<String> {
        let abs = self.abs(module, rel);
        fs::read_to_string(&abs).with_context(|| format!("read {}", abs))
    }

    fn exists(&self, module: &str, rel: &Utf8Path) -> bool {
        self.abs(module, rel).exists()
    }
}
