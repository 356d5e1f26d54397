//! Cypher-to-SQL translation for the fixed two-table graph schema
//! `nodes(id, label, properties)` / `edges(id, type, source_id, target_id,
//! properties)`.
//!
//! [`translate`] drives one [`Translator`] over the clause list. Reading
//! clauses mutate the [`context::TranslationContext`]; the RETURN clause
//! (or a standalone CALL) synthesizes one composite SELECT via
//! [`plan_builder`]; write clauses emit their statements immediately, in
//! clause order.

pub mod context;
pub mod errors;
pub mod expression;
pub mod function_registry;
pub mod function_translator;
pub mod match_registrar;
pub mod pattern_subquery;
pub mod plan_builder;
pub mod procedures;
pub mod sql_fragment;
pub mod temporal;
pub mod variable_length_cte;
pub mod where_clause;
pub mod write_clauses;

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::cypher_ast::ast::{
    Clause, Expression, ProjectionClause, Query, UnionClause, UnwindClause,
};

use context::{ScopeVariable, TranslationContext, UnwindRecord, VariableKind, WithModifiers};
use errors::TranslatorError;

/// One parameterized SQL statement: the number of `?` placeholders in
/// `sql` equals `params.len()`, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// The translation result: ordered statements plus the result column names
/// of the projecting statement, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub statements: Vec<SqlStatement>,
    pub return_columns: Option<Vec<String>>,
}

/// Translate one parsed query against a parameter map.
pub fn translate(
    query: &Query,
    params: &Map<String, Value>,
) -> Result<Translation, TranslatorError> {
    Translator::new(params.clone()).run(query)
}

/// Single-use, single-threaded translation driver. One instance owns one
/// context and processes one query front to back.
pub struct Translator {
    ctx: TranslationContext,
    statements: Vec<SqlStatement>,
    return_columns: Option<Vec<String>>,
}

impl Translator {
    pub fn new(params: Map<String, Value>) -> Self {
        Translator {
            ctx: TranslationContext::new(params),
            statements: Vec::new(),
            return_columns: None,
        }
    }

    pub fn run(mut self, query: &Query) -> Result<Translation, TranslatorError> {
        for (index, clause) in query.clauses.iter().enumerate() {
            self.ctx.current_clause_index = index;
            match clause {
                Clause::Match(m) => match_registrar::register_match(&mut self.ctx, m, false)?,
                Clause::OptionalMatch(m) => {
                    match_registrar::register_match(&mut self.ctx, m, true)?
                }
                Clause::Unwind(u) => self.handle_unwind(u)?,
                Clause::With(p) => self.handle_with(p)?,
                Clause::Return(p) => {
                    let (stmt, columns) = plan_builder::build_select(&mut self.ctx, p)?;
                    self.statements.push(stmt);
                    self.return_columns = Some(columns);
                }
                Clause::Union(u) => self.handle_union(u)?,
                Clause::Call(c) => {
                    self.ctx.call = Some(procedures::call_record(c)?);
                }
                Clause::Create(c) => {
                    let stmts = write_clauses::translate_create(&mut self.ctx, c)?;
                    self.statements.extend(stmts);
                }
                Clause::Merge(m) => {
                    let stmts = write_clauses::translate_merge(&mut self.ctx, m)?;
                    self.statements.extend(stmts);
                }
                Clause::Set(s) => {
                    let stmts = write_clauses::translate_set(&mut self.ctx, s)?;
                    self.statements.extend(stmts);
                }
                Clause::Remove(r) => {
                    let stmts = write_clauses::translate_remove(&mut self.ctx, r)?;
                    self.statements.extend(stmts);
                }
                Clause::Delete(d) => {
                    let stmts = write_clauses::translate_delete(&mut self.ctx, d)?;
                    self.statements.extend(stmts);
                }
            }
        }

        // A CALL with no following RETURN stands alone.
        if self.return_columns.is_none() && self.ctx.call.is_some() {
            let (stmt, columns) = procedures::standalone_statement(&self.ctx)?;
            self.statements.push(stmt);
            self.return_columns = Some(columns);
        }

        Ok(Translation {
            statements: self.statements,
            return_columns: self.return_columns,
        })
    }

    fn handle_unwind(&mut self, clause: &UnwindClause) -> Result<(), TranslatorError> {
        let name = &clause.alias;
        let shadowed = self.ctx.lookup_variable(name).is_some()
            || self.ctx.created.contains_key(name)
            || self.ctx.find_unwind(name).is_some()
            || self
                .ctx
                .resolve_with_alias(name, usize::MAX)
                .is_some();
        if shadowed {
            return Err(TranslatorError::VariableAlreadyBound(name.clone()));
        }
        let alias = self.ctx.next_alias("u");
        self.ctx.unwinds.push(UnwindRecord {
            alias,
            variable: name.clone(),
            expression: clause.expression.clone(),
            consumed: false,
        });
        Ok(())
    }

    /// WITH: rebind the variable table, push an alias scope, accumulate
    /// modifiers and WHERE for the next projection. No SQL is emitted here.
    fn handle_with(&mut self, proj: &ProjectionClause) -> Result<(), TranslatorError> {
        let mut passthrough: Vec<(String, String)> = Vec::new();
        let mut alias_items: Vec<(String, Expression)> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for item in &proj.items {
            let name = match (&item.alias, &item.expression) {
                (Some(alias), _) => alias.clone(),
                (None, Expression::Variable(v)) => v.clone(),
                _ => {
                    return Err(TranslatorError::syntax(
                        "WITH expressions require an AS alias",
                    ))
                }
            };
            if seen.contains(&name) {
                return Err(TranslatorError::syntax(format!(
                    "duplicate column name '{}'",
                    name
                )));
            }
            seen.push(name.clone());

            match &item.expression {
                Expression::Variable(v) if self.ctx.lookup_variable(v).is_some() => {
                    passthrough.push((name, v.clone()));
                }
                other => alias_items.push((name, other.clone())),
            }
        }

        if !proj.star {
            if passthrough.is_empty() {
                // Zero graph variables cross this WITH. Patterns still
                // referenced by the projected expressions become pre-WITH
                // row sources; otherwise the scope separates.
                let references_graph = alias_items
                    .iter()
                    .any(|(_, expr)| references_graph_variable(&self.ctx, expr));
                if references_graph {
                    log::debug!(
                        "WITH captures {} pattern(s) as pre-WITH sources",
                        self.ctx.patterns.len()
                    );
                    // Graph bindings stay resolvable so the captured alias
                    // expressions can still be inlined at projection time.
                    self.ctx.capture_pre_with_patterns();
                } else {
                    self.ctx.patterns.clear();
                    self.ctx.standalone_nodes.clear();
                    self.ctx.bump_edge_scope();
                    self.ctx.clear_graph_variables();
                }
            } else {
                let mut new_vars: HashMap<String, ScopeVariable> = HashMap::new();
                let mut new_order: Vec<String> = Vec::new();
                for (new_name, old_name) in &passthrough {
                    let variable = self
                        .ctx
                        .variables
                        .get(old_name)
                        .cloned()
                        .ok_or_else(|| TranslatorError::UnknownVariable(old_name.clone()))?;
                    new_vars.insert(new_name.clone(), variable);
                    new_order.push(new_name.clone());
                }
                // Path records follow their (possibly renamed) variables.
                self.ctx.path_records.retain_mut(|record| {
                    match passthrough.iter().find(|(_, old)| *old == record.variable) {
                        Some((new_name, _)) => {
                            record.variable = new_name.clone();
                            true
                        }
                        None => new_vars.contains_key(&record.variable),
                    }
                });
                self.ctx.variables = new_vars;
                self.ctx.variable_order = new_order;
            }
        }

        self.ctx.with_alias_stack.push(alias_items);

        if let Some(where_clause) = &proj.where_clause {
            self.ctx.with_where.push(where_clause.clone());
        }

        if proj.distinct || !proj.order_by.is_empty() || proj.skip.is_some() || proj.limit.is_some()
        {
            if let Some(skip) = &proj.skip {
                plan_builder::page_fragment(&self.ctx, skip, "SKIP")?;
            }
            if let Some(limit) = &proj.limit {
                plan_builder::page_fragment(&self.ctx, limit, "LIMIT")?;
            }
            self.ctx.with_modifiers = Some(WithModifiers {
                distinct: proj.distinct,
                order_by: proj.order_by.clone(),
                skip: proj.skip.clone(),
                limit: proj.limit.clone(),
            });
        }
        Ok(())
    }

    /// UNION: the right-hand side runs through a fresh translator sharing
    /// the parameter map; column name sets must match exactly.
    fn handle_union(&mut self, union: &UnionClause) -> Result<(), TranslatorError> {
        let left_columns = self.return_columns.clone().ok_or_else(|| {
            TranslatorError::syntax("UNION requires a RETURN on its left-hand side")
        })?;
        let right = translate(&union.query, &self.ctx.params)?;
        let right_columns = right
            .return_columns
            .ok_or_else(|| TranslatorError::syntax("UNION requires a RETURN on its right-hand side"))?;

        let mut left_sorted = left_columns.clone();
        let mut right_sorted = right_columns;
        left_sorted.sort();
        right_sorted.sort();
        if left_sorted != right_sorted {
            return Err(TranslatorError::syntax(
                "UNION sides must return the same column names",
            ));
        }
        if right.statements.len() != 1 {
            return Err(TranslatorError::unsupported(
                "UNION sides must be single-statement queries",
            ));
        }

        let left_stmt = self
            .statements
            .pop()
            .ok_or_else(|| TranslatorError::syntax("UNION with no left-hand statement"))?;
        let right_stmt = right.statements.into_iter().next().expect("checked above");
        // A WITH clause is only legal at statement start; a right-hand side
        // that needs its own leading CTE cannot be concatenated.
        if right_stmt.sql.starts_with("WITH ") || right_stmt.sql.starts_with("WITH RECURSIVE") {
            return Err(TranslatorError::unsupported(
                "the right-hand side of UNION cannot require a leading CTE",
            ));
        }
        let keyword = if union.all { "UNION ALL" } else { "UNION" };
        let mut params = left_stmt.params;
        params.extend(right_stmt.params);
        self.statements.push(SqlStatement {
            sql: format!("{} {} {}", left_stmt.sql, keyword, right_stmt.sql),
            params,
        });
        self.return_columns = Some(left_columns);
        Ok(())
    }
}

fn references_graph_variable(ctx: &TranslationContext, expr: &Expression) -> bool {
    let is_graph = |name: &str| {
        ctx.lookup_variable(name)
            .map(|v| {
                matches!(
                    v.kind,
                    VariableKind::Node
                        | VariableKind::Edge
                        | VariableKind::VarLengthEdge
                        | VariableKind::Path
                )
            })
            .unwrap_or(false)
    };
    match expr {
        Expression::Variable(name) | Expression::Property { base: name, .. } => is_graph(name),
        Expression::PropertyAccess { base, .. } => references_graph_variable(ctx, base),
        Expression::FunctionCall(call) => call
            .args
            .iter()
            .any(|a| references_graph_variable(ctx, a)),
        Expression::Binary { left, right, .. } | Expression::Comparison { left, right, .. } => {
            references_graph_variable(ctx, left) || references_graph_variable(ctx, right)
        }
        Expression::Unary { operand, .. } => references_graph_variable(ctx, operand),
        Expression::List(items) => items.iter().any(|i| references_graph_variable(ctx, i)),
        Expression::Map(entries) => entries
            .iter()
            .any(|(_, v)| references_graph_variable(ctx, v)),
        Expression::In { needle, haystack } => {
            references_graph_variable(ctx, needle) || references_graph_variable(ctx, haystack)
        }
        Expression::StringOp { left, right, .. } => {
            references_graph_variable(ctx, left) || references_graph_variable(ctx, right)
        }
        Expression::Case(case) => {
            case.when_then
                .iter()
                .any(|(_, then)| references_graph_variable(ctx, then))
                || case
                    .else_expr
                    .as_deref()
                    .map(|e| references_graph_variable(ctx, e))
                    .unwrap_or(false)
        }
        Expression::ListComprehension(comp) => references_graph_variable(ctx, &comp.list),
        Expression::ListPredicate(pred) => references_graph_variable(ctx, &pred.list),
        Expression::PatternComprehension(_) => true,
        Expression::Subscript { base, index } => {
            references_graph_variable(ctx, base) || references_graph_variable(ctx, index)
        }
        Expression::Slice { base, .. } => references_graph_variable(ctx, base),
        _ => false,
    }
}
