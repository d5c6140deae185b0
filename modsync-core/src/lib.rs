//! Embeddable core library for modsync.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for linking
//! into a server process or a CLI.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`ManifestSource`](ports::ManifestSource): load module manifests
//! - [`ModuleSource`](ports::ModuleSource): read a module's data files
//! - [`Database`](ports::Database): storage, provenance, translations, registry, unit of work
//! - [`WritePort`](ports::WritePort): write report artifacts
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`resolve_order`](pipeline::resolve_order): resolved application order
//! - [`run_update`](pipeline::run_update): apply pending modules and collect orphans

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;

// Re-export the loader types so embedders don't need modsync-manifest directly.
pub use modsync_manifest::{LoadedManifest, ManifestLoadError};

// Re-export the backends so embedders don't need modsync-reconcile directly.
pub use modsync_reconcile::{DatabaseState, MemoryDatabase};
