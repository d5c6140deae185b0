use crate::error::ParseError;
use modsync_types::record::Instruction;

/// Split a bootstrap SQL file into statements.
///
/// Statements end at `;` outside single-quoted strings. `--` comments run to the end of the line.
pub fn parse_sql(src: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote_start = None;
    let mut chars = src.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => {
                quote_start = match quote_start {
                    Some(_) if chars.peek().is_some_and(|&(_, n)| n == '\'') => {
                        current.push(c);
                        chars.next();
                        quote_start
                    }
                    Some(_) => None,
                    None => Some(i),
                };
                current.push(c);
            }
            '-' if quote_start.is_none() && chars.peek().is_some_and(|&(_, n)| n == '-') => {
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            ';' if quote_start.is_none() => push_statement(&mut out, &mut current),
            _ => current.push(c),
        }
    }

    if let Some(offset) = quote_start {
        return Err(ParseError::Sql { offset });
    }
    push_statement(&mut out, &mut current);
    Ok(out)
}

fn push_statement(out: &mut Vec<Instruction>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        out.push(Instruction::Sql {
            statement: statement.to_string(),
        });
    }
    current.clear();
}
