use serde::{Deserialize, Serialize};

/// A module manifest (`<addons>/<name>/module.toml`).
///
/// The loader is tolerant: unknown keys are ignored and every list defaults to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Module name. Implicit from the directory; when present it must match.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub depends: Vec<String>,

    /// Ordered declarative data files, relative to the module directory.
    pub data: Vec<String>,

    /// Legacy alias for `data`; appended after it.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub xml: Vec<String>,

    /// Demo data files, loaded only when the demo flag is set.
    pub demo: Vec<String>,

    pub installable: bool,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.0.0".to_string(),
            description: None,
            depends: Vec::new(),
            data: Vec::new(),
            xml: Vec::new(),
            demo: Vec::new(),
            installable: true,
        }
    }
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data<I, S>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data = data.into_iter().map(Into::into).collect();
        self
    }

    /// Data files in application order (`data` then `xml`).
    pub fn data_files(&self) -> impl Iterator<Item = &str> {
        self.data.iter().chain(self.xml.iter()).map(String::as_str)
    }
}

/// Pending work resolved for a module by the dependency graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleFlags {
    pub install: bool,
    pub update: bool,
    pub demo: bool,
}

impl ModuleFlags {
    pub fn is_pending(self) -> bool {
        self.install || self.update
    }
}

/// How a module's data files are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// First installation: records without ids and raw SQL files are loaded.
    Init,
    Update,
}
