use serde::{Deserialize, Serialize};

/// Declared `type` of a literal `<field>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    /// Plain text; coerced later by the target field's kind.
    #[default]
    Char,
    Int,
    Float,
    Bool,
    /// Inner markup kept verbatim.
    Xml,
    Html,
    Base64,
}

impl LiteralType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "char" | "" => Some(Self::Char),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "xml" => Some(Self::Xml),
            "html" => Some(Self::Html),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }
}

/// How a declared field value is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldExpr {
    Literal {
        text: String,
        #[serde(default)]
        literal: LiteralType,
    },
    /// Id(s) of records matching a domain expression.
    Search {
        domain: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Database id of a declared record, qualified (`module.id`) or local.
    Ref { id: String },
    /// `ref="null"`: explicit empty relation.
    RefNull,
    /// Expression in the closed `eval` grammar.
    Eval { expr: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub expr: FieldExpr,
}

/// Create-or-update of one typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInstruction {
    pub model: String,

    /// Declared identifier; records without one are created on install only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDecl>,

    /// False inside `noupdate` blocks: existing records are left untouched.
    pub update_allowed: bool,
}

/// `<menuitem>` shorthand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuInstruction {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,

    pub update_allowed: bool,
}

/// One record-apply instruction produced by a data file parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    Record(RecordInstruction),
    Menu(MenuInstruction),
    /// Raw bootstrap statement; executed only when installing.
    Sql { statement: String },
}

impl Instruction {
    /// Declared identifier, if any.
    pub fn xml_id(&self) -> Option<&str> {
        match self {
            Instruction::Record(r) => r.id.as_deref(),
            Instruction::Menu(m) => Some(m.id.as_str()),
            Instruction::Sql { .. } => None,
        }
    }
}

/// A `module.local-id` reference resolved against a default module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct XmlId {
    pub module: String,
    pub name: String,
}

impl XmlId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Split `raw` into (module, name); unqualified ids belong to `default_module`.
    ///
    /// Returns `None` for empty parts or more than one dot.
    pub fn resolve(raw: &str, default_module: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        let first = parts.next()?;
        match (parts.next(), parts.next()) {
            (None, _) if !first.is_empty() => Some(Self::new(default_module, first)),
            (Some(second), None) if !first.is_empty() && !second.is_empty() => {
                Some(Self::new(first, second))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for XmlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}
