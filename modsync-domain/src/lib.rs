//! Domain logic: module manifests to a deterministic application order, and data files to
//! ordered record-apply instructions.
//!
//! This crate owns *what* gets applied and in which order. It never touches storage; applying
//! instructions against a database is the `modsync-reconcile` crate.

mod bulk;
mod error;
mod expr;
mod graph;
mod parser;
mod ports;
mod sql;

pub use bulk::parse_csv;
pub use error::{ExprError, ParseError, ResolveError};
pub use expr::{EvalEnv, Expr, RefResolver, evaluate, parse_domain, parse_expr};
pub use graph::{Flag, Graph, Node, NodeId, UpdateRequest, resolve};
pub use parser::{
    DataFileKind, ParseOptions, coerce_literal, parse_data_file, parse_xml,
};
pub use ports::{FsModuleSource, ModuleSource};
pub use sql::parse_sql;
