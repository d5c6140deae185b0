//! Closed-grammar evaluator for `eval` and `search` attribute values.
//!
//! Grammar:
//!
//! ```text
//! expr    := unary (('+' | '-') unary)*
//! unary   := '-' unary | primary
//! primary := INT | FLOAT | STRING | NAME | NAME '(' args ')'
//!          | '(' items ')' | '[' items ']' | '{' (expr ':' expr),* '}'
//! ```
//!
//! Names are `True`, `False`, `None` and `version`. Callable names are `ref`, `time.strftime`,
//! `now` and `today`. Nothing else evaluates.

use crate::error::ExprError;
use chrono::NaiveDateTime;
use chrono::format::{Item, StrftimeItems};
use modsync_types::schema::{Domain, DomainOp, DomainTerm};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;

/// Resolves `ref('module.id')` to a database id.
pub trait RefResolver {
    fn resolve_ref(&mut self, id: &str) -> Result<i64, ExprError>;
}

/// Everything an expression may observe.
pub struct EvalEnv<'a> {
    pub refs: &'a mut dyn RefResolver,
    pub now: NaiveDateTime,
    pub version: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Call { function: String, args: Vec<Expr> },
}

pub fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some((offset, tok)) => Err(ExprError::Syntax {
            offset: *offset,
            message: format!("unexpected {tok:?}"),
        }),
    }
}

/// Parse and evaluate `src` in one step.
pub fn evaluate(src: &str, env: &mut EvalEnv<'_>) -> Result<Value, ExprError> {
    parse_expr(src)?.eval(env)
}

/// Turn an evaluated `[(field, op, value), ...]` list into a search domain.
pub fn parse_domain(value: &Value) -> Result<Domain, ExprError> {
    let Value::Array(terms) = value else {
        return Err(ExprError::Domain(format!("expected a list, got {value}")));
    };

    terms
        .iter()
        .map(|term| match term.as_array().map(Vec::as_slice) {
            Some([Value::String(field), Value::String(op), value]) => {
                let op = DomainOp::parse(op)
                    .ok_or_else(|| ExprError::Domain(format!("unsupported operator `{op}`")))?;
                Ok(DomainTerm {
                    field: field.clone(),
                    op,
                    value: value.clone(),
                })
            }
            _ => Err(ExprError::Domain(format!(
                "expected a (field, operator, value) triple, got {term}"
            ))),
        })
        .collect()
}

impl Expr {
    pub fn eval(&self, env: &mut EvalEnv<'_>) -> Result<Value, ExprError> {
        match self {
            Expr::Int(i) => Ok(Value::from(*i)),
            Expr::Float(f) => float(*f),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Name(name) => match name.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                "version" => Ok(Value::String(env.version.to_string())),
                _ => Err(ExprError::UnknownName(name.clone())),
            },
            Expr::List(items) => items
                .iter()
                .map(|e| e.eval(env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Dict(pairs) => {
                let mut map = Map::new();
                for (k, v) in pairs {
                    let key = match k.eval(env)? {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        other => return Err(ExprError::Type(format!("unhashable key {other}"))),
                    };
                    map.insert(key, v.eval(env)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Neg(inner) => match inner.eval(env)? {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        i.checked_neg()
                            .map(Value::from)
                            .ok_or_else(|| ExprError::Type("integer overflow".into()))
                    } else {
                        float(-n.as_f64().unwrap_or_default())
                    }
                }
                other => Err(ExprError::Type(format!("cannot negate {other}"))),
            },
            Expr::Add(lhs, rhs) => add(lhs.eval(env)?, rhs.eval(env)?),
            Expr::Sub(lhs, rhs) => sub(lhs.eval(env)?, rhs.eval(env)?),
            Expr::Call { function, args } => call(function, args, env),
        }
    }
}

fn float(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("non-finite float {f}")))
}

fn add(lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Value::from)
                .ok_or_else(|| ExprError::Type("integer overflow".into())),
            _ => float(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()),
        },
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (a, b) => Err(ExprError::Type(format!("cannot add {a} and {b}"))),
    }
}

fn sub(lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_sub(b)
                .map(Value::from)
                .ok_or_else(|| ExprError::Type("integer overflow".into())),
            _ => float(a.as_f64().unwrap_or_default() - b.as_f64().unwrap_or_default()),
        },
        (a, b) => Err(ExprError::Type(format!("cannot subtract {b} from {a}"))),
    }
}

fn call(function: &str, args: &[Expr], env: &mut EvalEnv<'_>) -> Result<Value, ExprError> {
    match function {
        "ref" => match args {
            [arg] => match arg.eval(env)? {
                Value::String(id) => env.refs.resolve_ref(&id).map(Value::from),
                _ => Err(ExprError::Arguments {
                    function: function.into(),
                    expected: "one string argument",
                }),
            },
            _ => Err(ExprError::Arguments {
                function: function.into(),
                expected: "one string argument",
            }),
        },
        "time.strftime" => match args {
            [arg] => match arg.eval(env)? {
                Value::String(fmt) => strftime(env.now, &fmt).map(Value::String),
                _ => Err(ExprError::Arguments {
                    function: function.into(),
                    expected: "one format string",
                }),
            },
            _ => Err(ExprError::Arguments {
                function: function.into(),
                expected: "one format string",
            }),
        },
        "now" | "today" if !args.is_empty() => Err(ExprError::Arguments {
            function: function.into(),
            expected: "no arguments",
        }),
        "now" => strftime(env.now, "%Y-%m-%d %H:%M:%S").map(Value::String),
        "today" => strftime(env.now, "%Y-%m-%d").map(Value::String),
        _ => Err(ExprError::UnknownFunction(function.to_string())),
    }
}

fn strftime(now: NaiveDateTime, fmt: &str) -> Result<String, ExprError> {
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(ExprError::Format(fmt.to_string()));
    }
    let mut out = String::new();
    write!(out, "{}", now.format(fmt)).map_err(|_| ExprError::Format(fmt.to_string()))?;
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Punct(char),
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let mut out = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut end = start;
            let mut is_float = false;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_digit() || (d == '.' && !is_float) {
                    is_float |= d == '.';
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &src[start..end];
            let token = if is_float {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            out.push((
                start,
                token.ok_or_else(|| ExprError::Syntax {
                    offset: start,
                    message: format!("invalid number `{text}`"),
                })?,
            ));
        } else if c.is_alphabetic() || c == '_' {
            let mut end = start;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' || d == '.' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            out.push((start, Token::Ident(src[start..end].to_string())));
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, d)) = chars.next() {
                match d {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, other)) => text.push(other),
                        None => break,
                    },
                    d if d == c => {
                        closed = true;
                        break;
                    }
                    d => text.push(d),
                }
            }
            if !closed {
                return Err(ExprError::Syntax {
                    offset: start,
                    message: "unterminated string".into(),
                });
            }
            out.push((start, Token::Str(text)));
        } else if "()[]{},:+-".contains(c) {
            chars.next();
            out.push((start, Token::Punct(c)));
        } else {
            return Err(ExprError::Syntax {
                offset: start,
                message: format!("unexpected character {c:?}"),
            });
        }
    }

    Ok(out)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn offset(&self) -> usize {
        self.peek()
            .map(|(o, _)| *o)
            .or_else(|| self.tokens.last().map(|(o, _)| *o + 1))
            .unwrap_or(0)
    }

    fn eat(&mut self, c: char) -> bool {
        if matches!(self.peek(), Some((_, Token::Punct(p))) if *p == c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ExprError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(ExprError::Syntax {
                offset: self.offset(),
                message: format!("expected `{c}`"),
            })
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat('+') {
                lhs = Expr::Add(Box::new(lhs), Box::new(self.unary()?));
            } else if self.eat('-') {
                lhs = Expr::Sub(Box::new(lhs), Box::new(self.unary()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat('-') {
            Ok(Expr::Neg(Box::new(self.unary()?)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.next() {
            Some((_, Token::Int(i))) => Ok(Expr::Int(i)),
            Some((_, Token::Float(f))) => Ok(Expr::Float(f)),
            Some((_, Token::Str(s))) => Ok(Expr::Str(s)),
            Some((_, Token::Ident(name))) => {
                if self.eat('(') {
                    let (args, _) = self.items(')')?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Some((_, Token::Punct('('))) => {
                let (mut items, trailing_comma) = self.items(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::List(items))
                }
            }
            Some((_, Token::Punct('['))) => Ok(Expr::List(self.items(']')?.0)),
            Some((_, Token::Punct('{'))) => {
                let mut pairs = Vec::new();
                while !self.eat('}') {
                    let key = self.expr()?;
                    self.expect(':')?;
                    let value = self.expr()?;
                    pairs.push((key, value));
                    if !self.eat(',') {
                        self.expect('}')?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            Some((_, tok)) => Err(ExprError::Syntax {
                offset,
                message: format!("unexpected {tok:?}"),
            }),
            None => Err(ExprError::Syntax {
                offset,
                message: "unexpected end of expression".into(),
            }),
        }
    }

    /// Comma separated expressions up to `close`; reports whether a trailing comma was seen.
    fn items(&mut self, close: char) -> Result<(Vec<Expr>, bool), ExprError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while !self.eat(close) {
            items.push(self.expr()?);
            trailing_comma = self.eat(',');
            if !trailing_comma {
                self.expect(close)?;
                break;
            }
        }
        Ok((items, trailing_comma))
    }
}
