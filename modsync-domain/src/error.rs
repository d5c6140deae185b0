use thiserror::Error;

/// Dependency resolution failure. Fatal before any record is applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "unresolvable modules: {} (missing dependencies: {})",
        .unresolved.join(", "),
        list_or_none(.missing)
    )]
    Unresolved {
        unresolved: Vec<String>,
        missing: Vec<String>,
    },

    #[error("duplicate module `{name}`")]
    Duplicate { name: String },

    #[error("edge {parent} -> {child} would close a cycle")]
    Cycle { parent: String, child: String },
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed xml: {message}")]
    Xml { message: String },

    #[error("line {line}: <{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: String,
        attribute: String,
        line: u32,
    },

    #[error("line {line}: invalid identifier `{id}`")]
    InvalidId { id: String, line: u32 },

    #[error("line {line}: invalid `{attribute}` value {value:?}")]
    InvalidAttribute {
        attribute: String,
        value: String,
        line: u32,
    },

    #[error("line {line}: field `{field}` holds an invalid {literal} literal {text:?}")]
    InvalidLiteral {
        field: String,
        literal: String,
        text: String,
        line: u32,
    },

    #[error("csv: {message}")]
    Csv { message: String },

    #[error("unterminated quoted string in sql statement starting at byte {offset}")]
    Sql { offset: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown name `{0}`")]
    UnknownName(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("{function}() expects {expected}")]
    Arguments {
        function: String,
        expected: &'static str,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("invalid strftime format {0:?}")]
    Format(String),

    #[error("invalid search domain: {0}")]
    Domain(String),

    #[error("unresolved reference `{id}`: {reason}")]
    Reference { id: String, reason: String },
}
