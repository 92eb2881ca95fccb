//! Generic filter/order/paginate machinery for list endpoints.
//!
//! Every entity list is the same shape: a SELECT head, a pile of optional
//! filter clauses, ordering by an allow-listed column, and LIMIT/OFFSET
//! pagination with a `COUNT(*) OVER()` total. [`ListQuery`] wraps
//! `sqlx::QueryBuilder` so repositories only declare the clauses.
//!
//! Column names are compile-time strings supplied by repositories; only
//! values are bound.

use sqlx::{Postgres, QueryBuilder};

use crate::models::{Pagination, ValidationError};

/// Resolved ordering: a vetted SQL expression plus direction.
#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    sql: &'static str,
    ascending: bool,
}

impl OrderBy {
    /// Resolve a requested order column against an allow-list.
    ///
    /// `allowed` maps API names to SQL expressions. Unknown names are
    /// rejected rather than silently ignored.
    pub fn resolve(
        requested: Option<&str>,
        ascending: bool,
        allowed: &[(&'static str, &'static str)],
        default_sql: &'static str,
    ) -> Result<Self, ValidationError> {
        let sql = match requested {
            None | Some("") => default_sql,
            Some(name) => allowed
                .iter()
                .find(|(api, _)| *api == name)
                .map(|(_, sql)| *sql)
                .ok_or_else(|| ValidationError::InvalidVariant {
                    field: "order_by",
                    value: name.to_owned(),
                })?,
        };

        Ok(Self { sql, ascending })
    }
}

/// Incremental builder for a filtered, ordered, paginated list query.
pub struct ListQuery {
    builder: QueryBuilder<'static, Postgres>,
}

impl ListQuery {
    /// Start from a SELECT head. The head must already contain a WHERE
    /// clause (conventionally `WHERE TRUE`) so filters can append `AND`s.
    pub fn new(select_head: &str) -> Self {
        Self {
            builder: QueryBuilder::new(select_head),
        }
    }

    /// Case-insensitive substring match, skipped when the value is absent.
    pub fn contains(&mut self, column: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.builder
                .push(" AND ")
                .push(column)
                .push(" ILIKE ")
                .push_bind(format!("%{}%", escape_like(value.trim())));
        }
        self
    }

    /// Substring match against either of two alternatives.
    pub fn either_contains(&mut self, column: &'static str, a: &str, b: &str) -> &mut Self {
        self.builder
            .push(" AND (")
            .push(column)
            .push(" ILIKE ")
            .push_bind(format!("%{}%", escape_like(a)));
        self.builder
            .push(" OR ")
            .push(column)
            .push(" ILIKE ")
            .push_bind(format!("%{}%", escape_like(b)));
        self.builder.push(")");
        self
    }

    /// Exact (case-insensitive) text match, skipped when absent.
    pub fn eq_text(&mut self, column: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.builder
                .push(" AND LOWER(")
                .push(column)
                .push(") = LOWER(")
                .push_bind(value.trim().to_owned());
            self.builder.push(")");
        }
        self
    }

    /// Exact integer match, skipped when absent.
    pub fn eq_i64(&mut self, column: &'static str, value: Option<i64>) -> &mut Self {
        if let Some(value) = value {
            self.builder
                .push(" AND ")
                .push(column)
                .push(" = ")
                .push_bind(value);
        }
        self
    }

    /// Restrict under-review rows to their importer.
    ///
    /// Imported entities stay invisible to everyone but the owner until the
    /// review flag is cleared.
    pub fn review_visible(&mut self, viewer_id: i64) -> &mut Self {
        self.builder
            .push(" AND (NOT e.under_review OR e.owner_id = ")
            .push_bind(viewer_id);
        self.builder.push(")");
        self
    }

    /// Verbatim extra clause (no bound values), prefixed with AND.
    pub fn raw(&mut self, clause: &'static str) -> &mut Self {
        self.builder.push(" AND ").push(clause);
        self
    }

    /// Append ORDER BY.
    pub fn order(&mut self, order: &OrderBy) -> &mut Self {
        self.builder
            .push(" ORDER BY ")
            .push(order.sql)
            .push(if order.ascending { " ASC" } else { " DESC" });
        self
    }

    /// Append LIMIT/OFFSET.
    pub fn paginate(&mut self, page: Pagination) -> &mut Self {
        self.builder
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        self
    }

    /// Access the underlying builder to execute the query.
    pub fn builder(&mut self) -> &mut QueryBuilder<'static, Postgres> {
        &mut self.builder
    }

    /// The SQL built so far (for tests and logging).
    pub fn sql(&mut self) -> &str {
        self.builder.sql()
    }
}

/// Escape LIKE wildcards so user input only ever matches literally.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: &[(&str, &str)] = &[
        ("label", "e.label"),
        ("id", "e.id"),
        ("host", "a.host"),
    ];

    #[test]
    fn resolves_allowed_order() {
        let order = OrderBy::resolve(Some("host"), false, ALLOWED, "e.label").unwrap();
        assert_eq!(order.sql, "a.host");
        assert!(!order.ascending);
    }

    #[test]
    fn defaults_when_unspecified() {
        let order = OrderBy::resolve(None, true, ALLOWED, "e.label").unwrap();
        assert_eq!(order.sql, "e.label");
    }

    #[test]
    fn rejects_unknown_order_column() {
        let err = OrderBy::resolve(Some("password_hash"), true, ALLOWED, "e.label").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidVariant { .. }));
    }

    #[test]
    fn builds_filtered_query() {
        let mut query = ListQuery::new("SELECT * FROM entities e WHERE TRUE");
        query
            .contains("e.label", Some("gfp"))
            .eq_i64("e.owner_id", Some(7))
            .contains("e.origin", None);

        let order = OrderBy::resolve(Some("id"), true, ALLOWED, "e.label").unwrap();
        query.order(&order).paginate(Pagination::new(2, 25));

        let sql = query.sql().to_owned();
        assert!(sql.contains("e.label ILIKE $1"));
        assert!(sql.contains("e.owner_id = $2"));
        assert!(!sql.contains("e.origin"));
        assert!(sql.contains("ORDER BY e.id ASC"));
        assert!(sql.contains("LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn blank_filters_are_skipped() {
        let mut query = ListQuery::new("SELECT * FROM entities e WHERE TRUE");
        query.contains("e.label", Some("   "));
        assert_eq!(query.sql(), "SELECT * FROM entities e WHERE TRUE");
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_x"), "50\\%\\_x");
    }
}
