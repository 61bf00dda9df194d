//! Filter evaluation over stored rows.
//!
//! Follows SQL three-valued logic: a comparison involving NULL is unknown
//! (`None`), and only rows whose filter is definitely true are selected.

use std::cmp::Ordering;

use regex::Regex;
use repokit_core::{Error, Result, Row, Value};
use repokit_query::{BinaryOp, Expr};

/// Whether `row` is selected by `filter`. No filter selects every row.
pub(crate) fn matches(filter: Option<&Expr>, row: &Row) -> Result<bool> {
    match filter {
        Some(expr) => Ok(eval(expr, row)? == Some(true)),
        None => Ok(true),
    }
}

/// Evaluate `expr` as a predicate.
pub(crate) fn eval(expr: &Expr, row: &Row) -> Result<Option<bool>> {
    match expr {
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => Ok(match (eval(left, row)?, eval(right, row)?) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }),
            BinaryOp::Or => Ok(match (eval(left, row)?, eval(right, row)?) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }),
            cmp => {
                let ordering = compare(&operand(left, row)?, &operand(right, row)?);
                Ok(ordering.map(|o| match cmp {
                    BinaryOp::Eq => o == Ordering::Equal,
                    BinaryOp::Ne => o != Ordering::Equal,
                    BinaryOp::Lt => o == Ordering::Less,
                    BinaryOp::Le => o != Ordering::Greater,
                    BinaryOp::Gt => o == Ordering::Greater,
                    BinaryOp::Ge => o != Ordering::Less,
                    BinaryOp::And | BinaryOp::Or => false,
                }))
            }
        },
        Expr::Not(inner) => Ok(eval(inner, row)?.map(|b| !b)),
        Expr::IsNull(inner) => Ok(Some(operand(inner, row)?.is_null())),
        Expr::IsNotNull(inner) => Ok(Some(!operand(inner, row)?.is_null())),
        Expr::InList { expr, values } => {
            let value = operand(expr, row)?;
            if value.is_null() {
                return Ok(None);
            }
            Ok(Some(
                values
                    .iter()
                    .any(|v| compare(&value, v) == Some(Ordering::Equal)),
            ))
        }
        Expr::Like { expr, pattern } => match operand(expr, row)? {
            Value::Text(text) => Ok(Some(like_regex(pattern)?.is_match(&text))),
            _ => Ok(None),
        },
        Expr::Column(_) | Expr::Literal(_) => match operand(expr, row)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            other => Err(Error::Custom(format!(
                "expected a boolean expression, found {} value",
                other.type_name()
            ))),
        },
    }
}

/// Evaluate `expr` as a value. Predicates yield `Bool` (or `Null` when
/// unknown).
fn operand(expr: &Expr, row: &Row) -> Result<Value> {
    match expr {
        Expr::Column(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Custom(format!("unknown column `{name}`"))),
        Expr::Literal(value) => Ok(value.clone()),
        other => Ok(eval(other, row)?.map_or(Value::Null, Value::Bool)),
    }
}

/// Compare two values; `None` when either is NULL or the types differ.
///
/// Integers and doubles compare numerically across widths.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::Double(x), other) | (other, Value::Double(x)) => {
            let y = other.as_i64()? as f64;
            let ordering = x.partial_cmp(&y)?;
            // Flip when the double was on the right.
            if matches!(a, Value::Double(_)) {
                Some(ordering)
            } else {
                Some(ordering.reverse())
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (x, y) => Some(x.as_i64()?.cmp(&y.as_i64()?)),
    }
}

/// Total order used by `ORDER BY`: NULLs first, incomparable values equal.
pub(crate) fn order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Translate a LIKE pattern (`%` any run, `_` any one character) into an
/// anchored regex.
fn like_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| Error::Custom(format!("invalid LIKE pattern: {e}")))
}
