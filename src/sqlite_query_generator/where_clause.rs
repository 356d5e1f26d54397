//! WHERE condition translation.
//!
//! Conditions compile to scalar predicates (`1`/`0`/`NULL`). Boolean
//! connectives route through the `cypher_and`/`cypher_or`/`cypher_not`
//! helpers so three-valued logic holds whatever shape the operands take;
//! ordering comparisons ride the `cypher_lt` family; pattern predicates
//! become correlated EXISTS subqueries.

use crate::cypher_ast::ast::{Expression, WhereCondition};

use super::context::{TranslationContext, VariableKind};
use super::errors::TranslatorError;
use super::expression::ExpressionTranslator;
use super::pattern_subquery;
use super::sql_fragment::SqlFragment;

impl<'a> ExpressionTranslator<'a> {
    pub fn translate_condition(
        &mut self,
        condition: &WhereCondition,
    ) -> Result<SqlFragment, TranslatorError> {
        match condition {
            WhereCondition::Comparison { op, left, right } => {
                self.translate_comparison(*op, left, right)
            }
            WhereCondition::And(left, right) => {
                let l = self.translate_condition(left)?;
                let r = self.translate_condition(right)?;
                let mut frag = l.wrap("cypher_and(", ", ");
                frag.push_fragment(r);
                frag.push(")");
                Ok(frag)
            }
            WhereCondition::Or(left, right) => {
                let l = self.translate_condition(left)?;
                let r = self.translate_condition(right)?;
                let mut frag = l.wrap("cypher_or(", ", ");
                frag.push_fragment(r);
                frag.push(")");
                Ok(frag)
            }
            WhereCondition::Not(inner) => {
                Ok(self.translate_condition(inner)?.wrap("cypher_not(", ")"))
            }
            WhereCondition::StringOp { op, left, right } => {
                self.translate_string_op(*op, left, right)
            }
            WhereCondition::IsNull {
                expression,
                negated,
            } => {
                let inner = self.translate_scalar(expression)?;
                let suffix = if *negated {
                    " IS NOT NULL)"
                } else {
                    " IS NULL)"
                };
                Ok(inner.wrap("(", suffix))
            }
            WhereCondition::Exists {
                pattern,
                where_clause,
            } => pattern_subquery::translate_exists(self, pattern, where_clause.as_deref()),
            WhereCondition::PatternMatch(pattern) => {
                pattern_subquery::translate_exists(self, pattern, None)
            }
            WhereCondition::In {
                needle,
                haystack,
                negated,
            } => {
                let frag = self.translate_membership(needle, haystack)?;
                if *negated {
                    Ok(frag.wrap("cypher_not(", ")"))
                } else {
                    Ok(frag)
                }
            }
            WhereCondition::ListPredicate(pred) => self.translate_list_predicate(pred),
            WhereCondition::Expression(expr) => {
                if let Expression::Variable(name) = expr {
                    if let Some(variable) = self.ctx.lookup_variable(name) {
                        if matches!(
                            variable.kind,
                            VariableKind::Node | VariableKind::Edge | VariableKind::Path
                        ) {
                            return Err(TranslatorError::syntax(format!(
                                "'{}' is a graph variable and cannot be used as a predicate",
                                name
                            )));
                        }
                    }
                }
                let t = self.static_type(expr);
                if !t.boolean_compatible() {
                    return Err(TranslatorError::syntax(format!(
                        "expected a boolean predicate, got {:?}",
                        t
                    )));
                }
                self.translate_predicate_expr(expr)
            }
        }
    }
}

/// Does the condition reference any aggregate (directly or through a WITH
/// alias)? Such conditions route to HAVING rather than WHERE.
pub fn condition_contains_aggregate(ctx: &TranslationContext, condition: &WhereCondition) -> bool {
    let expr_has = |e: &Expression| {
        let tr = ExpressionTranslator::new(ctx);
        tr.contains_aggregate(e)
    };
    match condition {
        WhereCondition::Comparison { left, right, .. }
        | WhereCondition::StringOp { left, right, .. } => expr_has(left) || expr_has(right),
        WhereCondition::And(a, b) | WhereCondition::Or(a, b) => {
            condition_contains_aggregate(ctx, a) || condition_contains_aggregate(ctx, b)
        }
        WhereCondition::Not(inner) => condition_contains_aggregate(ctx, inner),
        WhereCondition::IsNull { expression, .. } => expr_has(expression),
        WhereCondition::In {
            needle, haystack, ..
        } => expr_has(needle) || expr_has(haystack),
        WhereCondition::ListPredicate(pred) => expr_has(&pred.list),
        WhereCondition::Expression(expr) => expr_has(expr),
        WhereCondition::Exists { .. } | WhereCondition::PatternMatch(_) => false,
    }
}

/// Aggregate-backed WITH aliases referenced from list predicates inside a
/// condition; these force the `__aggregates__` CTE.
pub fn aggregate_aliases_in_condition(
    ctx: &TranslationContext,
    condition: &WhereCondition,
    out: &mut Vec<String>,
) {
    match condition {
        WhereCondition::And(a, b) | WhereCondition::Or(a, b) => {
            aggregate_aliases_in_condition(ctx, a, out);
            aggregate_aliases_in_condition(ctx, b, out);
        }
        WhereCondition::Not(inner) => aggregate_aliases_in_condition(ctx, inner, out),
        WhereCondition::ListPredicate(pred) => {
            if let Expression::Variable(name) = pred.list.as_ref() {
                if let Some((level, aliased)) = ctx.resolve_with_alias(name, usize::MAX) {
                    let tr = ExpressionTranslator::new(ctx);
                    let _ = level;
                    if tr.contains_aggregate(aliased) && !out.contains(name) {
                        out.push(name.clone());
                    }
                }
            }
        }
        WhereCondition::Expression(expr) => {
            super::expression::aggregate_aliases_in_list_predicates(ctx, expr, out)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_ast::ast::{ComparisonOp, Expression as E, Literal, StringOp};
    use crate::sqlite_query_generator::context::{ScopeVariable, TranslationContext};

    fn ctx_with_node() -> TranslationContext {
        let mut ctx = TranslationContext::default();
        ctx.declare_variable(
            "n",
            ScopeVariable {
                kind: VariableKind::Node,
                alias: "n0".into(),
                id: None,
                path_cte: None,
            },
        )
        .unwrap();
        ctx
    }

    #[test]
    fn and_routes_through_helper() {
        let ctx = ctx_with_node();
        let mut tr = ExpressionTranslator::new(&ctx);
        let cond = WhereCondition::And(
            Box::new(WhereCondition::Comparison {
                op: ComparisonOp::Gt,
                left: E::property("n", "age"),
                right: E::integer(30),
            }),
            Box::new(WhereCondition::IsNull {
                expression: E::property("n", "name"),
                negated: true,
            }),
        );
        let frag = tr.translate_condition(&cond).unwrap();
        assert!(frag.sql.starts_with("cypher_and(cypher_gt("), "sql: {}", frag.sql);
        assert!(frag.sql.contains("IS NOT NULL"), "sql: {}", frag.sql);
    }

    #[test]
    fn contains_uses_instr_with_type_guard() {
        let ctx = ctx_with_node();
        let mut tr = ExpressionTranslator::new(&ctx);
        let cond = WhereCondition::StringOp {
            op: StringOp::Contains,
            left: E::property("n", "name"),
            right: E::string("li"),
        };
        let frag = tr.translate_condition(&cond).unwrap();
        assert!(frag.sql.contains("typeof("), "sql: {}", frag.sql);
        assert!(frag.sql.contains("INSTR("), "sql: {}", frag.sql);
        assert!(frag.sql.contains("THEN NULL"), "sql: {}", frag.sql);
    }

    #[test]
    fn bare_graph_variable_is_rejected() {
        let ctx = ctx_with_node();
        let mut tr = ExpressionTranslator::new(&ctx);
        let cond = WhereCondition::Expression(E::variable("n"));
        assert!(matches!(
            tr.translate_condition(&cond),
            Err(TranslatorError::SyntaxError(_))
        ));
    }

    #[test]
    fn bare_non_boolean_literal_is_rejected() {
        let ctx = TranslationContext::default();
        let mut tr = ExpressionTranslator::new(&ctx);
        let cond = WhereCondition::Expression(E::Literal(Literal::Integer(5)));
        assert!(matches!(
            tr.translate_condition(&cond),
            Err(TranslatorError::SyntaxError(_))
        ));
    }
}
