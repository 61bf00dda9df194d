//! Select queries as handed to a store.

use std::fmt;

use repokit_core::{EntityType, NavigationInfo};

use crate::expr::Expr;

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort by.
    pub column: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order by `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending order by `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// One resolved hop of an eager-load path.
#[derive(Debug, Clone)]
pub struct IncludeStep {
    /// Navigation metadata on the owner of this hop.
    pub navigation: &'static NavigationInfo,
    /// Extra predicate on the related rows (the visibility filter).
    pub filter: Option<Expr>,
}

/// A resolved eager-load path: each hop starts at the previous hop's target.
#[derive(Debug, Clone, Default)]
pub struct IncludePlan {
    /// Hops, root first.
    pub steps: Vec<IncludeStep>,
}

/// A query over one record type.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// Record type being queried.
    pub entity: &'static EntityType,
    /// Row predicate.
    pub filter: Option<Expr>,
    /// Sort keys, most significant first. Ties keep storage order.
    pub order_by: Vec<OrderBy>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Eager-load paths.
    pub includes: Vec<IncludePlan>,
}

impl SelectQuery {
    /// Select every row of `entity`.
    #[must_use]
    pub fn new(entity: &'static EntityType) -> Self {
        Self {
            entity,
            filter: None,
            order_by: Vec::new(),
            limit: None,
            includes: Vec::new(),
        }
    }

    /// AND a predicate onto the filter.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Expr::and_maybe(self.filter.take(), Some(expr));
        self
    }

    /// AND an optional predicate onto the filter.
    #[must_use]
    pub fn filter_opt(self, expr: Option<Expr>) -> Self {
        match expr {
            Some(expr) => self.filter(expr),
            None => self,
        }
    }

    /// Append a sort key.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the number of rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add an eager-load path.
    #[must_use]
    pub fn include(mut self, plan: IncludePlan) -> Self {
        self.includes.push(plan);
        self
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT * FROM \"{}\"", self.entity.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                let dir = if order.descending { "DESC" } else { "ASC" };
                write!(f, "\"{}\" {dir}", order.column)?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
