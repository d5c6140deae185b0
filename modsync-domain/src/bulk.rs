use crate::error::ParseError;
use modsync_types::record::{FieldDecl, FieldExpr, Instruction, LiteralType, RecordInstruction};

/// Parse a bulk-record CSV file whose rows all target `model`.
///
/// The `id` column supplies declared identifiers and `<field>:id` columns are references.
/// Empty cells leave the field undeclared, except references, where they mean "no record".
pub fn parse_csv(model: &str, src: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(src.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ParseError::Csv {
            message: e.to_string(),
        })?
        .clone();

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ParseError::Csv {
            message: e.to_string(),
        })?;

        let mut id = None;
        let mut fields = Vec::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header == "id" {
                if !cell.is_empty() {
                    id = Some(cell.to_string());
                }
            } else if let Some(field) = header.strip_suffix(":id") {
                let expr = if cell.is_empty() {
                    FieldExpr::RefNull
                } else {
                    FieldExpr::Ref {
                        id: cell.to_string(),
                    }
                };
                fields.push(FieldDecl {
                    name: field.to_string(),
                    expr,
                });
            } else if !cell.is_empty() {
                fields.push(FieldDecl {
                    name: header.to_string(),
                    expr: FieldExpr::Literal {
                        text: cell.to_string(),
                        literal: LiteralType::Char,
                    },
                });
            }
        }

        out.push(Instruction::Record(RecordInstruction {
            model: model.to_string(),
            id,
            fields,
            update_allowed: true,
        }));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rows_become_records() {
        let src = "id,name,code,currency_id:id\nbe,Belgium,BE,base.EUR\nxx,Nowhere,,\n";
        let ins = parse_csv("res.country", src).unwrap();
        assert_eq!(ins.len(), 2);

        let Instruction::Record(first) = &ins[0] else {
            panic!("expected record");
        };
        assert_eq!(first.model, "res.country");
        assert_eq!(first.id.as_deref(), Some("be"));
        assert_eq!(first.fields.len(), 3);
        assert_eq!(
            first.fields[2],
            FieldDecl {
                name: "currency_id".into(),
                expr: FieldExpr::Ref {
                    id: "base.EUR".into()
                }
            }
        );

        let Instruction::Record(second) = &ins[1] else {
            panic!("expected record");
        };
        let names: Vec<_> = second.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "currency_id"]);
        assert_eq!(second.fields[1].expr, FieldExpr::RefNull);
    }

    #[test]
    fn ragged_rows_are_errors() {
        let err = parse_csv("res.country", "id,name\nbe,Belgium,extra\n").unwrap_err();
        assert!(matches!(err, ParseError::Csv { .. }));
    }
}
