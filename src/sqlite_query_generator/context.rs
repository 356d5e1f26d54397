//! Mutable translation state.
//!
//! One [`TranslationContext`] lives for the duration of one query
//! translation. Clauses that do not emit SQL themselves (MATCH, WITH,
//! UNWIND, CALL) record their effects here; the projection builder reads it
//! all back when a RETURN (or terminal WITH) synthesizes the composite
//! SELECT.
//!
//! Every stash is a typed field - per-alias flags live in [`NodeMeta`]
//! keyed by alias, not in string-keyed dynamic properties.

use std::cell::Cell;
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::cypher_ast::ast::{
    Direction, Expression, NodePattern, OrderByItem, VarLengthSpec, WhereCondition,
};


use super::errors::TranslatorError;

/// What a Cypher identifier is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Node,
    Edge,
    VarLengthEdge,
    Path,
}

/// One scope-variable binding: Cypher name → SQL source.
#[derive(Debug, Clone)]
pub struct ScopeVariable {
    pub kind: VariableKind,
    /// SQL alias of the backing row source.
    pub alias: String,
    /// UUID of a just-created row (CREATE/MERGE), when no FROM alias exists.
    pub id: Option<String>,
    /// Backing recursive CTE for variable-length edges and paths.
    pub path_cte: Option<String>,
}

/// Relationship-pattern record: one hop registered by MATCH/OPTIONAL MATCH,
/// consumed by the plan builder when it synthesizes JOIN topology.
#[derive(Debug, Clone)]
pub struct RelPatternRecord {
    pub source_alias: String,
    pub target_alias: String,
    pub edge_alias: String,
    pub direction: Direction,
    pub types: Vec<String>,
    pub edge_properties: Vec<(String, Expression)>,
    pub var_length: Option<VarLengthSpec>,
    pub optional: bool,
    /// Uniqueness stamp: constraints are emitted only among edges sharing it.
    pub edge_scope: u32,
    pub clause_index: usize,
    pub source_is_new: bool,
    pub target_is_new: bool,
    /// False when the edge variable was already bound by an earlier pattern;
    /// the plan builder then verifies endpoints instead of re-joining.
    pub edge_is_new: bool,
    /// Original (source, target) aliases of a re-used edge variable.
    pub bound_edge_endpoints: Option<(String, String)>,
    pub target_has_label: bool,
    /// Endpoint patterns as written in THIS clause. A bound alias reused
    /// with extra labels/properties gets those extras enforced per pattern
    /// (in ON when optional), not just at first introduction.
    pub source_pattern: NodePattern,
    pub target_pattern: NodePattern,
    /// Pre-allocated CTE name for variable-length hops.
    pub path_cte_name: Option<String>,
    /// WHERE of an OPTIONAL MATCH owning this pattern; pushed to the ON
    /// clause (or an EXISTS over the edge) rather than the top-level WHERE.
    pub optional_where: Option<WhereCondition>,
}

/// A standalone `(n)` pattern with no relationship.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub alias: String,
    pub optional: bool,
    pub clause_index: usize,
    /// WHERE of an OPTIONAL MATCH that introduced only this node; lands in
    /// the LEFT JOIN's ON clause.
    pub optional_where: Option<WhereCondition>,
}

/// Per-alias node/edge metadata: the original pattern (label + property
/// predicates) and whether the alias was introduced optionally.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub pattern: NodePattern,
    pub optional: bool,
}

/// `p = (a)-[..]-(b)`: node sequence preserved (with duplicates) for
/// projection, deduplicated alias list for joins.
#[derive(Debug, Clone)]
pub struct PathRecord {
    pub variable: String,
    pub node_sequence: Vec<String>,
    pub node_aliases: Vec<String>,
    pub edge_aliases: Vec<String>,
    pub is_var_length: bool,
    pub path_cte_name: Option<String>,
    pub optional: bool,
}

/// `UNWIND expr AS v`, joined as `json_each(expr)` during projection.
#[derive(Debug, Clone)]
pub struct UnwindRecord {
    /// SQL alias of the `json_each` source.
    pub alias: String,
    pub variable: String,
    pub expression: Expression,
    /// Set when an outer aggregate subquery has already absorbed this
    /// unwind; the projection must not join it a second time.
    pub consumed: bool,
}

/// `CALL db.labels()` / `CALL db.relationshipTypes()`.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub yield_name: String,
    /// Row source, e.g. `nodes, json_each(nodes.label)`.
    pub from_sql: String,
    /// Yield column expression, e.g. `json_each.value`.
    pub column_sql: String,
    pub where_clause: Option<WhereCondition>,
}

/// Modifiers of the most recent WITH, applied (or subquery-wrapped) by the
/// next projection.
#[derive(Debug, Clone, Default)]
pub struct WithModifiers {
    pub distinct: bool,
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
}

impl WithModifiers {
    pub fn limits_rows(&self) -> bool {
        self.distinct || self.skip.is_some() || self.limit.is_some()
    }
}

/// A node or edge created earlier in the same query; later clauses address
/// it by UUID since it has no FROM alias.
#[derive(Debug, Clone)]
pub struct CreatedEntity {
    pub kind: VariableKind,
    pub id: String,
    pub labels: Vec<String>,
    /// Property values resolved at translation time, for in-clause
    /// references from later CREATE property maps.
    pub properties: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct TranslationContext {
    pub params: Map<String, Value>,
    alias_counter: Cell<usize>,
    path_cte_counter: Cell<usize>,
    pub variables: HashMap<String, ScopeVariable>,
    /// Declaration order of variable names, for deterministic `RETURN *`.
    pub variable_order: Vec<String>,
    pub patterns: Vec<RelPatternRecord>,
    pub standalone_nodes: Vec<NodeRecord>,
    /// Patterns captured just before a WITH that passes no graph variable;
    /// re-materialized as row sources during the next projection.
    pub pre_with_patterns: Vec<RelPatternRecord>,
    pub pre_with_nodes: Vec<NodeRecord>,
    pub path_records: Vec<PathRecord>,
    pub node_meta: HashMap<String, NodeMeta>,
    /// WITH alias scopes, innermost last. Insertion order preserved for
    /// `RETURN *` expansion.
    pub with_alias_stack: Vec<Vec<(String, Expression)>>,
    /// WHERE conditions accumulated from WITH clauses, applied by the next
    /// projection (aggregate-referencing ones route to HAVING).
    pub with_where: Vec<WhereCondition>,
    pub with_modifiers: Option<WithModifiers>,
    /// WHERE conditions of required MATCH clauses, pending projection.
    pub match_where: Vec<WhereCondition>,
    pub edge_scope: u32,
    pub unwinds: Vec<UnwindRecord>,
    pub call: Option<CallRecord>,
    /// WITH aggregate aliases that list predicates forced into the
    /// `__aggregates__` CTE.
    pub materialized_aggregates: Vec<String>,
    pub created: HashMap<String, CreatedEntity>,
    pub current_clause_index: usize,
}

impl TranslationContext {
    pub fn new(params: Map<String, Value>) -> Self {
        TranslationContext {
            params,
            ..Default::default()
        }
    }

    /// Fresh SQL alias with a kind prefix; one counter keeps all aliases
    /// distinct regardless of prefix.
    pub fn next_alias(&self, prefix: &str) -> String {
        let n = self.alias_counter.get();
        self.alias_counter.set(n + 1);
        format!("{}{}", prefix, n)
    }

    pub fn next_path_cte_name(&self) -> String {
        let n = self.path_cte_counter.get();
        self.path_cte_counter.set(n + 1);
        format!("path_{}", n)
    }

    /// Bind `name`. Rebinding the same name to a different kind (or to a
    /// fresh row source of any kind) is an error.
    pub fn declare_variable(
        &mut self,
        name: &str,
        variable: ScopeVariable,
    ) -> Result<(), TranslatorError> {
        if self.variables.contains_key(name) {
            return Err(TranslatorError::VariableAlreadyBound(name.to_string()));
        }
        log::debug!(
            "binding '{}' as {:?} -> alias {}",
            name,
            variable.kind,
            variable.alias
        );
        self.variables.insert(name.to_string(), variable);
        self.variable_order.push(name.to_string());
        Ok(())
    }

    /// Currently bound variable names in declaration order.
    pub fn variables_in_order(&self) -> Vec<String> {
        self.variable_order
            .iter()
            .filter(|name| self.variables.contains_key(*name))
            .cloned()
            .collect()
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&ScopeVariable> {
        self.variables.get(name)
    }

    pub fn param_value(&self, name: &str) -> Result<Value, TranslatorError> {
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| TranslatorError::UnknownParameter(name.to_string()))
    }

    /// Resolve a WITH alias, looking only at scopes strictly below
    /// `below_level`. Callers resolving an alias's own defining expression
    /// pass the level it was defined at, which makes `WITH x + 1 AS x`
    /// reach the previous binding of `x` instead of recursing.
    pub fn resolve_with_alias(
        &self,
        name: &str,
        below_level: usize,
    ) -> Option<(usize, &Expression)> {
        let limit = below_level.min(self.with_alias_stack.len());
        for level in (0..limit).rev() {
            if let Some((_, expr)) = self.with_alias_stack[level].iter().find(|(n, _)| n == name) {
                return Some((level, expr));
            }
        }
        None
    }

    pub fn with_alias_top_level(&self) -> usize {
        self.with_alias_stack.len()
    }

    /// Aliases of the innermost WITH scope, in projection order.
    pub fn current_with_aliases(&self) -> &[(String, Expression)] {
        self.with_alias_stack.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_unwind(&self, variable: &str) -> Option<&UnwindRecord> {
        self.unwinds.iter().find(|u| u.variable == variable)
    }

    /// Open a new edge-uniqueness scope (WITH boundary that separates
    /// pattern scopes).
    pub fn bump_edge_scope(&mut self) {
        self.edge_scope += 1;
        log::debug!("edge scope -> {}", self.edge_scope);
    }

    /// Move currently registered patterns to the pre-WITH stash; they will
    /// re-enter the FROM list as captured row sources.
    pub fn capture_pre_with_patterns(&mut self) {
        self.pre_with_patterns.append(&mut self.patterns);
        self.pre_with_nodes.append(&mut self.standalone_nodes);
    }

    /// Drop all graph bindings (WITH without graph passthrough).
    pub fn clear_graph_variables(&mut self) {
        self.variables.clear();
        self.path_records.clear();
    }

    /// All relationship patterns the next projection must materialize:
    /// captured pre-WITH ones first, then the live ones, in clause order.
    pub fn all_patterns(&self) -> Vec<&RelPatternRecord> {
        self.pre_with_patterns.iter().chain(self.patterns.iter()).collect()
    }

    pub fn all_standalone_nodes(&self) -> Vec<&NodeRecord> {
        self.pre_with_nodes
            .iter()
            .chain(self.standalone_nodes.iter())
            .collect()
    }

    pub fn find_path(&self, variable: &str) -> Option<&PathRecord> {
        self.path_records.iter().find(|p| p.variable == variable)
    }

    /// True when the alias was introduced by an OPTIONAL MATCH.
    pub fn alias_is_optional(&self, alias: &str) -> bool {
        self.node_meta.get(alias).map(|m| m.optional).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_counter_is_shared_across_prefixes() {
        let ctx = TranslationContext::default();
        assert_eq!(ctx.next_alias("n"), "n0");
        assert_eq!(ctx.next_alias("e"), "e1");
        assert_eq!(ctx.next_alias("n"), "n2");
    }

    #[test]
    fn rebinding_is_rejected() {
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
        let err = ctx
            .declare_variable(
                "n",
                ScopeVariable {
                    kind: VariableKind::Edge,
                    alias: "e1".into(),
                    id: None,
                    path_cte: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, TranslatorError::VariableAlreadyBound("n".into()));
    }

    #[test]
    fn with_alias_self_reference_resolves_below() {
        let mut ctx = TranslationContext::default();
        ctx.with_alias_stack
            .push(vec![("x".to_string(), Expression::integer(1))]);
        ctx.with_alias_stack
            .push(vec![("x".to_string(), Expression::integer(2))]);

        // Innermost first when unrestricted.
        let (level, expr) = ctx.resolve_with_alias("x", usize::MAX).unwrap();
        assert_eq!(level, 1);
        assert_eq!(*expr, Expression::integer(2));

        // Resolving from inside level 1's definition reaches level 0.
        let (level, expr) = ctx.resolve_with_alias("x", 1).unwrap();
        assert_eq!(level, 0);
        assert_eq!(*expr, Expression::integer(1));
    }
}
