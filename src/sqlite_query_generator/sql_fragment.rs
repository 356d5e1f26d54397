use std::collections::BTreeSet;

use serde_json::Value;

/// A piece of SQL together with the parameters its `?` placeholders bind,
/// in left-to-right order, and the table aliases it references.
///
/// All SQL in the translator is assembled through this type: appending a
/// fragment appends its parameters, so the placeholder count and the
/// parameter count cannot drift apart - including when the same sub-fragment
/// is spliced in twice (the parameters are duplicated with it).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
    /// Table aliases this fragment's SQL reads from. Consumers use this for
    /// grouping-key decisions and ORDER BY validation.
    pub tables: BTreeSet<String>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// A lone `?` placeholder bound to `value`.
    pub fn parameter(value: Value) -> Self {
        SqlFragment {
            sql: "?".to_string(),
            params: vec![value],
            tables: BTreeSet::new(),
        }
    }

    pub fn with_table(sql: impl Into<String>, table: impl Into<String>) -> Self {
        let mut frag = SqlFragment::new(sql);
        frag.tables.insert(table.into());
        frag
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Append raw SQL text (no parameters).
    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append another fragment: SQL text, parameters, and table references.
    pub fn push_fragment(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self.tables.extend(other.tables);
    }

    /// Append a `?` placeholder bound to `value`.
    pub fn push_parameter(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// `format!`-style convenience: wraps this fragment's SQL as
    /// `prefix + self.sql + suffix`, keeping parameters.
    pub fn wrap(mut self, prefix: &str, suffix: &str) -> SqlFragment {
        self.sql = format!("{}{}{}", prefix, self.sql, suffix);
        self
    }

    /// Join fragments with a separator, concatenating parameter lists in
    /// order.
    pub fn join(fragments: Vec<SqlFragment>, separator: &str) -> SqlFragment {
        let mut out = SqlFragment::default();
        for (i, frag) in fragments.into_iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_fragment(frag);
        }
        out
    }

    /// Number of `?` placeholders in the SQL text. Equals `params.len()` by
    /// construction; exposed for assertions.
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

impl From<&str> for SqlFragment {
    fn from(sql: &str) -> Self {
        SqlFragment::new(sql)
    }
}

impl From<String> for SqlFragment {
    fn from(sql: String) -> Self {
        SqlFragment::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_fragment_carries_params_in_order() {
        let mut frag = SqlFragment::new("a = ");
        frag.push_parameter(json!(1));
        let mut rhs = SqlFragment::new(" AND b = ");
        rhs.push_parameter(json!("x"));
        frag.push_fragment(rhs);

        assert_eq!(frag.sql, "a = ? AND b = ?");
        assert_eq!(frag.params, vec![json!(1), json!("x")]);
        assert_eq!(frag.placeholder_count(), frag.params.len());
    }

    #[test]
    fn duplicated_subfragment_duplicates_params() {
        let mut inner = SqlFragment::new("x > ");
        inner.push_parameter(json!(5));

        let mut outer = SqlFragment::new("CASE WHEN ");
        outer.push_fragment(inner.clone());
        outer.push(" THEN 1 WHEN ");
        outer.push_fragment(inner);
        outer.push(" THEN 2 END");

        assert_eq!(outer.params, vec![json!(5), json!(5)]);
        assert_eq!(outer.placeholder_count(), 2);
    }

    #[test]
    fn join_interleaves_separator() {
        let frags = vec![
            SqlFragment::parameter(json!(1)),
            SqlFragment::parameter(json!(2)),
            SqlFragment::parameter(json!(3)),
        ];
        let joined = SqlFragment::join(frags, ", ");
        assert_eq!(joined.sql, "?, ?, ?");
        assert_eq!(joined.params.len(), 3);
    }

    #[test]
    fn tables_are_merged() {
        let mut frag = SqlFragment::with_table("n0.id", "n0");
        frag.push(" = ");
        frag.push_fragment(SqlFragment::with_table("e0.source_id", "e0"));
        assert!(frag.tables.contains("n0"));
        assert!(frag.tables.contains("e0"));
    }
}
