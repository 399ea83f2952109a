//! Edge-guard condition expressions.
//!
//! Grammar:
//! ```text
//! ConditionExpr ::= Clause ( '&&' Clause )*
//! Clause        ::= Key ( '=' | '!=' ) Literal
//! Key           ::= identifier ( '.' identifier )*
//! Literal       ::= quoted string | bare word
//! ```
//!
//! Evaluation is total: an empty expression is true, a malformed expression
//! is false. [`parse_condition`] exposes parse failures so validation can
//! diagnose them ahead of a run.

use conductor_types::ConductorError;

/// A parsed condition: one or more clauses joined by `&&`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    pub clauses: Vec<Clause>,
}

/// A single `key op value` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
}

/// Parse a condition string. Empty or whitespace-only input produces a
/// zero-clause expression, which evaluates to true.
pub fn parse_condition(input: &str) -> conductor_types::Result<ConditionExpr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(ConditionExpr { clauses: Vec::new() });
    }

    trimmed
        .split("&&")
        .map(|part| parse_clause(part.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map(|clauses| ConditionExpr { clauses })
}

fn parse_clause(input: &str) -> conductor_types::Result<Clause> {
    if input.is_empty() {
        return Err(parse_error("empty clause"));
    }

    let (key_end, operator, op_len) = locate_operator(input)
        .ok_or_else(|| parse_error(&format!("no operator in '{input}'")))?;

    let key = input[..key_end].trim();
    if key.is_empty() {
        return Err(parse_error(&format!("missing key in '{input}'")));
    }
    let key_is_valid = key.split('.').all(|segment| {
        !segment.is_empty() && segment.chars().all(|c| c.is_alphanumeric() || c == '_')
    });
    if !key_is_valid {
        return Err(parse_error(&format!("invalid key '{key}'")));
    }

    let raw_value = input[key_end + op_len..].trim();
    if raw_value.is_empty() {
        return Err(parse_error(&format!("missing value in '{input}'")));
    }

    Ok(Clause {
        key: key.to_string(),
        operator,
        value: unquote(raw_value),
    })
}

/// Find the first `=` or `!=` outside quoted regions.
fn locate_operator(input: &str) -> Option<(usize, Operator, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => return Some((i, Operator::NotEq, 2)),
            b'=' => return Some((i, Operator::Eq, 1)),
            _ => i += 1,
        }
    }
    None
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn parse_error(message: &str) -> ConductorError {
    ConductorError::Other(format!("condition parse error: {message}"))
}

/// Evaluate a condition string against values provided by a resolver.
///
/// The resolver maps a key (`outcome`, or any context key) to its string
/// value; absent keys should resolve to the empty string. This function
/// never fails: malformed input is simply false.
pub fn evaluate_condition(input: &str, resolve: &dyn Fn(&str) -> String) -> bool {
    match parse_condition(input) {
        Ok(expr) => evaluate_expr(&expr, resolve),
        Err(_) => false,
    }
}

/// Evaluate a parsed expression. Zero clauses is vacuously true.
pub fn evaluate_expr(expr: &ConditionExpr, resolve: &dyn Fn(&str) -> String) -> bool {
    expr.clauses.iter().all(|clause| {
        let actual = resolve(&clause.key);
        match clause.operator {
            Operator::Eq => actual == clause.value,
            Operator::NotEq => actual != clause.value,
        }
    })
}
