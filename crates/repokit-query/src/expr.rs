//! Filter expressions handed to a store.
//!
//! `Expr` is a small, typed predicate tree. The session composes it (adding
//! the soft-delete visibility filter, key lookups) and the store translates it
//! into its own query language; repokit never interprets it beyond that.

use std::fmt;

use repokit_core::Value;
use serde::{Deserialize, Serialize};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl BinaryOp {
    /// SQL spelling of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference.
    Column(String),
    /// Literal value.
    Literal(Value),
    /// Binary operation.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// `IS NULL`
    IsNull(Box<Expr>),
    /// `IS NOT NULL`
    IsNotNull(Box<Expr>),
    /// `IN (...)`
    InList {
        /// Tested expression.
        expr: Box<Expr>,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `LIKE` with `%` and `_` wildcards.
    Like {
        /// Tested expression.
        expr: Box<Expr>,
        /// Pattern.
        pattern: String,
    },
}

impl Expr {
    /// Reference a column.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// A literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// `self = value`
    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Eq, Expr::lit(value))
    }

    /// `self <> value`
    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ne, Expr::lit(value))
    }

    /// `self < value`
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Lt, Expr::lit(value))
    }

    /// `self <= value`
    pub fn le(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Le, Expr::lit(value))
    }

    /// `self > value`
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Gt, Expr::lit(value))
    }

    /// `self >= value`
    pub fn ge(self, value: impl Into<Value>) -> Self {
        self.binary(BinaryOp::Ge, Expr::lit(value))
    }

    /// `self = other` for two expressions (e.g. column to column).
    pub fn eq_expr(self, other: Expr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self AND other`
    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`
    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `NOT self`
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Self {
        Expr::IsNotNull(Box::new(self))
    }

    /// `self IN (values...)`
    pub fn in_list<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `self LIKE pattern`
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
        }
    }

    /// AND together an optional filter with another.
    #[must_use]
    pub fn and_maybe(left: Option<Expr>, right: Option<Expr>) -> Option<Expr> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "\"{name}\""),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Binary { left, op, right } => write!(f, "({left} {} {right})", op.as_str()),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::IsNull(inner) => write!(f, "{inner} IS NULL"),
            Expr::IsNotNull(inner) => write!(f, "{inner} IS NOT NULL"),
            Expr::InList { expr, values } => {
                write!(f, "{expr} IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
            Expr::Like { expr, pattern } => {
                write!(f, "{expr} LIKE '{}'", pattern.replace('\'', "''"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_renders_sql() {
        let expr = Expr::col("age").ge(18_i32).and(Expr::col("name").like("A%"));
        assert_eq!(expr.to_string(), "((\"age\" >= 18) AND \"name\" LIKE 'A%')");
    }

    #[test]
    fn test_in_list_and_null_checks() {
        let expr = Expr::col("id").in_list([1_i64, 2, 3]);
        assert_eq!(expr.to_string(), "\"id\" IN (1, 2, 3)");
        assert_eq!(
            Expr::col("team_id").is_null().to_string(),
            "\"team_id\" IS NULL"
        );
    }

    #[test]
    fn test_and_maybe() {
        assert_eq!(Expr::and_maybe(None, None), None);
        let only = Expr::and_maybe(Some(Expr::col("a").eq(1_i64)), None).unwrap();
        assert_eq!(only, Expr::col("a").eq(1_i64));
        let both = Expr::and_maybe(
            Some(Expr::col("a").eq(1_i64)),
            Some(Expr::col("b").eq(2_i64)),
        )
        .unwrap();
        assert!(matches!(both, Expr::Binary { op: BinaryOp::And, .. }));
    }
}
