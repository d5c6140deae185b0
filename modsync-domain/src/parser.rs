use crate::error::ParseError;
use camino::Utf8Path;
use modsync_types::record::{
    FieldDecl, FieldExpr, Instruction, LiteralType, MenuInstruction, RecordInstruction,
};
use roxmltree::{Document, Node};
use serde_json::{Number, Value};
use tracing::{debug, warn};

/// Knobs that change which parts of a data file are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Drop `<data skip_test="1">` blocks.
    pub test_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileKind {
    Xml,
    Csv,
    Sql,
    Unknown,
}

impl DataFileKind {
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("xml") => Self::Xml,
            Some("csv") => Self::Csv,
            Some("sql") => Self::Sql,
            _ => Self::Unknown,
        }
    }
}

/// Translate one data file into instructions, dispatching on its extension.
///
/// CSV files take their model from the file stem. Unknown extensions yield nothing.
pub fn parse_data_file(
    path: &Utf8Path,
    contents: &str,
    opts: &ParseOptions,
) -> Result<Vec<Instruction>, ParseError> {
    match DataFileKind::from_path(path) {
        DataFileKind::Xml => parse_xml(contents, opts),
        DataFileKind::Csv => crate::bulk::parse_csv(path.file_stem().unwrap_or_default(), contents),
        DataFileKind::Sql => crate::sql::parse_sql(contents),
        DataFileKind::Unknown => {
            warn!(path = %path, "skipping data file with unknown extension");
            Ok(vec![])
        }
    }
}

/// Parse declarative markup. Pure: nothing is resolved against storage here.
pub fn parse_xml(src: &str, opts: &ParseOptions) -> Result<Vec<Instruction>, ParseError> {
    let doc = Document::parse(src).map_err(|e| ParseError::Xml {
        message: e.to_string(),
    })?;
    let reader = XmlReader { doc: &doc, src };

    let root = doc.root_element();
    let mut out = Vec::new();
    if root.has_tag_name("data") {
        reader.block(root, opts, &mut out)?;
        return Ok(out);
    }

    for child in root.children().filter(Node::is_element) {
        if child.has_tag_name("data") {
            reader.block(child, opts, &mut out)?;
        } else {
            warn!(
                tag = child.tag_name().name(),
                line = reader.line(child),
                "ignoring unsupported top-level element"
            );
        }
    }
    Ok(out)
}

struct XmlReader<'a, 'i> {
    doc: &'a Document<'i>,
    src: &'i str,
}

impl XmlReader<'_, '_> {
    fn line(&self, node: Node<'_, '_>) -> u32 {
        self.doc.text_pos_at(node.range().start).row
    }

    fn required<'n>(&self, node: Node<'n, '_>, attribute: &str) -> Result<&'n str, ParseError> {
        node.attribute(attribute)
            .ok_or_else(|| ParseError::MissingAttribute {
                element: node.tag_name().name().to_string(),
                attribute: attribute.to_string(),
                line: self.line(node),
            })
    }

    fn flag(&self, node: Node<'_, '_>, attribute: &str) -> Result<Option<bool>, ParseError> {
        match node.attribute(attribute) {
            None => Ok(None),
            Some(raw) => parse_bool(raw).map(Some).ok_or_else(|| ParseError::InvalidAttribute {
                attribute: attribute.to_string(),
                value: raw.to_string(),
                line: self.line(node),
            }),
        }
    }

    fn id(&self, node: Node<'_, '_>, raw: &str) -> Result<String, ParseError> {
        if is_valid_id(raw) {
            Ok(raw.to_string())
        } else {
            Err(ParseError::InvalidId {
                id: raw.to_string(),
                line: self.line(node),
            })
        }
    }

    fn block(
        &self,
        block: Node<'_, '_>,
        opts: &ParseOptions,
        out: &mut Vec<Instruction>,
    ) -> Result<(), ParseError> {
        let noupdate = self.flag(block, "noupdate")?.unwrap_or(false);
        if opts.test_mode && self.flag(block, "skip_test")?.unwrap_or(false) {
            debug!(line = self.line(block), "skipping data block in test mode");
            return Ok(());
        }

        for child in block.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "record" => out.push(Instruction::Record(self.record(child, noupdate)?)),
                "menuitem" => out.push(Instruction::Menu(self.menu(child, noupdate)?)),
                other => warn!(
                    tag = other,
                    line = self.line(child),
                    "ignoring unsupported element"
                ),
            }
        }
        Ok(())
    }

    fn record(&self, node: Node<'_, '_>, noupdate: bool) -> Result<RecordInstruction, ParseError> {
        let model = self.required(node, "model")?.to_string();
        let id = node.attribute("id").map(|raw| self.id(node, raw)).transpose()?;
        let update_allowed = self.flag(node, "update")?.unwrap_or(!noupdate);

        let mut fields = Vec::new();
        for child in node.children().filter(Node::is_element) {
            if !child.has_tag_name("field") {
                warn!(
                    tag = child.tag_name().name(),
                    line = self.line(child),
                    "ignoring unsupported record child"
                );
                continue;
            }
            fields.push(self.field(child)?);
        }

        Ok(RecordInstruction {
            model,
            id,
            fields,
            update_allowed,
        })
    }

    fn field(&self, node: Node<'_, '_>) -> Result<FieldDecl, ParseError> {
        let name = self.required(node, "name")?.to_string();

        let expr = if let Some(domain) = node.attribute("search") {
            FieldExpr::Search {
                domain: domain.to_string(),
                model: node.attribute("model").map(str::to_string),
            }
        } else if let Some(raw) = node.attribute("ref") {
            if raw == "null" {
                FieldExpr::RefNull
            } else {
                FieldExpr::Ref {
                    id: self.id(node, raw)?,
                }
            }
        } else if let Some(expr) = node.attribute("eval") {
            FieldExpr::Eval {
                expr: expr.to_string(),
            }
        } else {
            let raw_type = node.attribute("type").unwrap_or("char");
            let literal =
                LiteralType::parse(raw_type).ok_or_else(|| ParseError::InvalidAttribute {
                    attribute: "type".to_string(),
                    value: raw_type.to_string(),
                    line: self.line(node),
                })?;
            let text = match literal {
                LiteralType::Xml | LiteralType::Html => self.inner_markup(node).to_string(),
                _ => text_content(node),
            };
            coerce_literal(&text, literal).map_err(|_| ParseError::InvalidLiteral {
                field: name.clone(),
                literal: raw_type.to_string(),
                text: text.clone(),
                line: self.line(node),
            })?;
            FieldExpr::Literal { text, literal }
        };

        Ok(FieldDecl { name, expr })
    }

    fn menu(&self, node: Node<'_, '_>, noupdate: bool) -> Result<MenuInstruction, ParseError> {
        let id = self.id(node, self.required(node, "id")?)?;
        let attr = |name: &str| node.attribute(name).map(str::to_string);

        Ok(MenuInstruction {
            id,
            name: attr("name"),
            icon: attr("icon"),
            sequence: attr("sequence"),
            parent: attr("parent"),
            action: attr("action"),
            active: attr("active"),
            update_allowed: !noupdate,
        })
    }

    fn inner_markup(&self, node: Node<'_, '_>) -> &str {
        match (node.first_child(), node.last_child()) {
            (Some(first), Some(last)) => &self.src[first.range().start..last.range().end],
            _ => "",
        }
    }
}

fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

/// `module.id` or `id`; more than one dot or an empty part is invalid.
fn is_valid_id(raw: &str) -> bool {
    let mut parts = raw.split('.');
    let valid_part = |p: Option<&str>| p.is_some_and(|p| !p.is_empty());
    match raw.matches('.').count() {
        0 => valid_part(parts.next()),
        1 => valid_part(parts.next()) && valid_part(parts.next()),
        _ => false,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "True" | "yes" => Some(true),
        "0" | "false" | "False" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Convert literal text to a value according to its declared `type`.
pub fn coerce_literal(text: &str, literal: LiteralType) -> Result<Value, String> {
    match literal {
        LiteralType::Char | LiteralType::Xml | LiteralType::Html => Ok(Value::String(text.to_string())),
        LiteralType::Base64 => Ok(Value::String(
            text.chars().filter(|c| !c.is_whitespace()).collect(),
        )),
        LiteralType::Int => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| e.to_string()),
        LiteralType::Float => text
            .trim()
            .parse::<f64>()
            .map_err(|e| e.to_string())
            .and_then(|f| {
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("non-finite float {f}"))
            }),
        LiteralType::Bool => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| format!("not a boolean: {text:?}")),
    }
}
