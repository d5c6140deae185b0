use crate::error::ReconcileError;
use modsync_domain::coerce_literal;
use modsync_types::record::LiteralType;
use modsync_types::schema::{FieldDef, FieldKind};
use serde_json::{Number, Value};

/// Canonical form of `value` for a field of `def.kind`.
///
/// Declared values, live values and snapshots all pass through here before they are compared,
/// so equality on the result is the only comparison the reconciler needs. `false` is the empty
/// value of every kind except many2many, which uses `[]`.
pub fn normalize(
    model: &str,
    field: &str,
    def: &FieldDef,
    value: &Value,
) -> Result<Value, ReconcileError> {
    let invalid = |reason: String| ReconcileError::InvalidValue {
        model: model.to_string(),
        field: field.to_string(),
        reason,
    };

    let empty_is_false = !matches!(def.kind, FieldKind::Many2many | FieldKind::One2many);
    if empty_is_false && matches!(value, Value::Null | Value::Bool(false)) {
        return Ok(Value::Bool(false));
    }

    match def.kind {
        FieldKind::Char
        | FieldKind::Text
        | FieldKind::Html
        | FieldKind::Selection
        | FieldKind::Date
        | FieldKind::Datetime
        | FieldKind::Binary => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(invalid(format!("expected text, got {other}"))),
        },
        FieldKind::Integer => match value {
            Value::Bool(true) => Ok(Value::from(1)),
            Value::Number(n) => integer(n)
                .map(Value::from)
                .ok_or_else(|| invalid(format!("{n} is not an integer"))),
            Value::String(s) => coerce_literal(s, LiteralType::Int).map_err(invalid),
            other => Err(invalid(format!("expected an integer, got {other}"))),
        },
        FieldKind::Float => match value {
            Value::Bool(true) => float(1.0).map_err(invalid),
            Value::Number(n) => float(n.as_f64().unwrap_or_default()).map_err(invalid),
            Value::String(s) => coerce_literal(s, LiteralType::Float).map_err(invalid),
            other => Err(invalid(format!("expected a number, got {other}"))),
        },
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => coerce_literal(s, LiteralType::Bool).map_err(invalid),
            other => Err(invalid(format!("expected a boolean, got {other}"))),
        },
        FieldKind::Many2one => match value {
            Value::Number(n) => integer(n)
                .map(Value::from)
                .ok_or_else(|| invalid(format!("{n} is not a record id"))),
            Value::String(s) => coerce_literal(s, LiteralType::Int).map_err(invalid),
            // (id, display_name) pairs as returned by name_get-style reads.
            Value::Array(items) => match items.first() {
                Some(Value::Number(n)) => integer(n)
                    .map(Value::from)
                    .ok_or_else(|| invalid(format!("{n} is not a record id"))),
                _ => Err(invalid(format!("expected a record id, got {value}"))),
            },
            other => Err(invalid(format!("expected a record id, got {other}"))),
        },
        FieldKind::Reference => match value {
            Value::String(s) if is_reference(s) => Ok(value.clone()),
            other => Err(invalid(format!("expected \"model,id\", got {other}"))),
        },
        FieldKind::Many2many => many2many_ids(value).map_err(invalid),
        FieldKind::One2many => Err(ReconcileError::UnsupportedField {
            model: model.to_string(),
            field: field.to_string(),
            kind: def.kind,
        }),
    }
}

fn integer(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn float(f: f64) -> Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("non-finite float {f}"))
}

fn is_reference(s: &str) -> bool {
    s.split_once(',')
        .is_some_and(|(model, id)| !model.is_empty() && id.trim().parse::<i64>().is_ok())
}

/// Sorted, deduplicated id list from a plain list, a single id, or `(6, 0, ids)` / `(4, id)`
/// commands.
fn many2many_ids(value: &Value) -> Result<Value, String> {
    let mut ids = Vec::new();
    match value {
        Value::Null | Value::Bool(false) => {}
        Value::Number(n) => ids.push(integer(n).ok_or_else(|| format!("{n} is not a record id"))?),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Number(n) => {
                        ids.push(integer(n).ok_or_else(|| format!("{n} is not a record id"))?)
                    }
                    Value::Array(command) => apply_command(command, &mut ids)?,
                    other => return Err(format!("expected record ids, got {other}")),
                }
            }
        }
        other => return Err(format!("expected record ids, got {other}")),
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(Value::Array(ids.into_iter().map(Value::from).collect()))
}

fn apply_command(command: &[Value], ids: &mut Vec<i64>) -> Result<(), String> {
    let code = command.first().and_then(Value::as_i64);
    match (code, command) {
        (Some(6), [_, _, Value::Array(replacement)]) => {
            ids.clear();
            for v in replacement {
                let n = v.as_i64().ok_or_else(|| format!("{v} is not a record id"))?;
                ids.push(n);
            }
            Ok(())
        }
        (Some(4), [_, id, ..]) => {
            ids.push(id.as_i64().ok_or_else(|| format!("{id} is not a record id"))?);
            Ok(())
        }
        (Some(5), _) => {
            ids.clear();
            Ok(())
        }
        _ => Err(format!(
            "unsupported many2many command {}",
            Value::Array(command.to_vec())
        )),
    }
}
