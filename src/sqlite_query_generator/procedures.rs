//! Metadata procedures.
//!
//! Two procedures are in translator scope, both answered straight from the
//! physical tables:
//! - `db.labels()` - every distinct label across the `nodes.label` arrays
//! - `db.relationshipTypes()` - every distinct `edges.type`
//!
//! A CALL followed by RETURN feeds the projection builder through the
//! context's call record; a standalone CALL synthesizes its own
//! `SELECT DISTINCT` here.

use super::context::{CallRecord, TranslationContext};
use super::errors::TranslatorError;
use super::expression::ExpressionTranslator;
use super::sql_fragment::SqlFragment;
use super::SqlStatement;

use crate::cypher_ast::ast::CallClause;

pub fn call_record(clause: &CallClause) -> Result<CallRecord, TranslatorError> {
    let (default_yield, from_sql, column_sql) = match clause.procedure.as_str() {
        "db.labels" => (
            "label",
            "nodes, json_each(nodes.label)".to_string(),
            "json_each.value".to_string(),
        ),
        "db.relationshipTypes" => (
            "relationshipType",
            "edges".to_string(),
            "edges.type".to_string(),
        ),
        other => {
            return Err(TranslatorError::unsupported(format!(
                "unknown procedure '{}'",
                other
            )))
        }
    };
    Ok(CallRecord {
        yield_name: clause
            .yield_alias
            .clone()
            .unwrap_or_else(|| default_yield.to_string()),
        from_sql,
        column_sql,
        where_clause: clause.where_clause.clone(),
    })
}

/// `CALL db.labels()` with no RETURN: one `SELECT DISTINCT` over the
/// backing table, with an empty-string guard and the yield-scoped WHERE.
pub fn standalone_statement(
    ctx: &TranslationContext,
) -> Result<(SqlStatement, Vec<String>), TranslatorError> {
    let call = ctx
        .call
        .as_ref()
        .ok_or_else(|| TranslatorError::syntax("no CALL clause to synthesize"))?;

    let mut sql = SqlFragment::new(format!(
        "SELECT DISTINCT {} AS \"{}\" FROM {} WHERE {} <> ''",
        call.column_sql, call.yield_name, call.from_sql, call.column_sql
    ));
    if let Some(cond) = &call.where_clause {
        let mut tr = ExpressionTranslator::new(ctx);
        sql.push(" AND ");
        sql.push_fragment(tr.translate_condition(cond)?);
    }
    Ok((
        SqlStatement {
            sql: sql.sql,
            params: sql.params,
        },
        vec![call.yield_name.clone()],
    ))
}
