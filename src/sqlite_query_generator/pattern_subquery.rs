//! Correlated subqueries over graph patterns.
//!
//! Serves three translation sites that all need "this pattern, as a
//! subquery correlated to the enclosing SELECT":
//! - pattern comprehensions `[(a)-[:T]->(b) | b.name]`,
//! - EXISTS / bare-pattern predicates in WHERE,
//! - variable-length reachability predicates, which inline a recursive CTE
//!   inside the EXISTS body.
//!
//! Variables already bound outside correlate by alias; new pattern
//! variables get `__pc_`-prefixed subquery aliases and are bound as entity
//! locals for the duration of the projection/filter translation.

use std::collections::HashMap;

use serde_json::Value;

use crate::cypher_ast::ast::{
    Direction, EdgePattern, NodePattern, NodeRef, PathPattern, PatternComprehension,
    PatternElement, RelationshipPattern, WhereCondition,
};

use super::context::VariableKind;
use super::errors::TranslatorError;
use super::expression::{ExpressionTranslator, ValueContext};
use super::sql_fragment::SqlFragment;
use super::variable_length_cte::VariableLengthCteGenerator;

/// How a pattern endpoint resolves inside the subquery.
#[derive(Debug, Clone)]
enum Endpoint {
    /// Bound in the enclosing query; correlate through its alias.
    Outer(String),
    /// Introduced by this pattern; a fresh subquery alias.
    Local(String),
}

impl Endpoint {
    fn id_sql(&self) -> String {
        match self {
            Endpoint::Outer(alias) | Endpoint::Local(alias) => format!("{}.id", alias),
        }
    }
}

struct SubqueryParts {
    from: String,
    joins: Vec<SqlFragment>,
    conditions: Vec<SqlFragment>,
    /// Leading `WITH RECURSIVE ..` for variable-length hops.
    recursive_prefix: Option<SqlFragment>,
    outer_tables: Vec<String>,
    locals_pushed: usize,
}

pub(crate) fn translate_pattern_comprehension(
    tr: &mut ExpressionTranslator,
    comp: &PatternComprehension,
) -> Result<SqlFragment, TranslatorError> {
    let parts = build_subquery(tr, &comp.pattern, comp.where_clause.as_deref(), false)?;
    let result = (|| {
        let projection = tr.translate_in(&comp.projection, ValueContext::Json)?;
        let mut frag = SqlFragment::new("(SELECT COALESCE(json_group_array(");
        frag.push_fragment(projection);
        frag.push(&format!("), json('[]')) FROM {}", parts.from));
        for join in &parts.joins {
            frag.push(" ");
            frag.push_fragment(join.clone());
        }
        if !parts.conditions.is_empty() {
            frag.push(" WHERE ");
            frag.push_fragment(SqlFragment::join(parts.conditions.clone(), " AND "));
        }
        frag.push(")");
        // Only the correlated outer aliases leak out of the subquery; they
        // drive identity-based grouping for the enclosing projection.
        frag.tables = parts.outer_tables.iter().cloned().collect();
        Ok(frag)
    })();
    for _ in 0..parts.locals_pushed {
        tr.pop_local();
    }
    result
}

pub(crate) fn translate_exists(
    tr: &mut ExpressionTranslator,
    pattern: &PathPattern,
    where_clause: Option<&WhereCondition>,
) -> Result<SqlFragment, TranslatorError> {
    let parts = build_subquery(tr, pattern, where_clause, true)?;
    let mut frag = SqlFragment::new("EXISTS (");
    if let Some(prefix) = &parts.recursive_prefix {
        frag.push_fragment(prefix.clone());
        frag.push(" ");
    }
    frag.push(&format!("SELECT 1 FROM {}", parts.from));
    for join in &parts.joins {
        frag.push(" ");
        frag.push_fragment(join.clone());
    }
    if !parts.conditions.is_empty() {
        frag.push(" WHERE ");
        frag.push_fragment(SqlFragment::join(parts.conditions.clone(), " AND "));
    }
    frag.push(")");
    frag.tables = parts.outer_tables.iter().cloned().collect();
    for _ in 0..parts.locals_pushed {
        tr.pop_local();
    }
    Ok(frag)
}

fn build_subquery(
    tr: &mut ExpressionTranslator,
    pattern: &PathPattern,
    where_clause: Option<&WhereCondition>,
    allow_var_length: bool,
) -> Result<SubqueryParts, TranslatorError> {
    let mut parts = SubqueryParts {
        from: String::new(),
        joins: Vec::new(),
        conditions: Vec::new(),
        recursive_prefix: None,
        outer_tables: Vec::new(),
        locals_pushed: 0,
    };
    // Aliases for nodes this pattern introduces: by name for named nodes,
    // by Rc identity for anonymous chain nodes.
    let mut named: HashMap<String, Endpoint> = HashMap::new();
    let mut anonymous: HashMap<usize, Endpoint> = HashMap::new();

    match &pattern.element {
        PatternElement::Node(node) => {
            let alias = tr.ctx.next_alias("__pc_n_");
            let node_ref = node.borrow();
            parts.from = format!("nodes {}", alias);
            if let Some(name) = &node_ref.variable {
                if let Some(outer) = outer_node_alias(tr, name) {
                    parts
                        .conditions
                        .push(SqlFragment::with_table(
                            format!("{}.id = {}.id", alias, outer),
                            outer.clone(),
                        ));
                    parts.outer_tables.push(outer);
                } else {
                    tr.push_entity_local(name, &alias);
                    parts.locals_pushed += 1;
                }
            }
            push_node_predicates(tr, &node_ref, &alias, &mut parts.conditions)?;
        }
        PatternElement::Connected(rels) => {
            let mut hop_edge_aliases: Vec<String> = Vec::new();
            for (i, rel) in rels.iter().enumerate() {
                if rel.edge.var_length.is_some() {
                    if !allow_var_length || rels.len() != 1 {
                        return Err(TranslatorError::unsupported(
                            "variable-length hops are not supported inside this pattern position",
                        ));
                    }
                    build_var_length_exists(tr, rel, &mut parts, &mut named, &mut anonymous)?;
                    continue;
                }
                let edge_alias = build_hop(
                    tr,
                    rel,
                    i == 0,
                    &mut parts,
                    &mut named,
                    &mut anonymous,
                )?;
                hop_edge_aliases.push(edge_alias);
            }
            // `p = pattern | p` projections read the alternating property
            // arrays straight from the subquery aliases.
            if let Some(path_var) = &pattern.variable {
                if hop_edge_aliases.len() == rels.len() {
                    let mut pieces: Vec<String> = Vec::new();
                    for (i, rel) in rels.iter().enumerate() {
                        if i == 0 {
                            pieces.push(format!(
                                "{}.properties",
                                endpoint_alias(tr, &rel.source, &named, &anonymous)?
                            ));
                        }
                        pieces.push(format!("{}.properties", hop_edge_aliases[i]));
                        pieces.push(format!(
                            "{}.properties",
                            endpoint_alias(tr, &rel.target, &named, &anonymous)?
                        ));
                    }
                    tr.push_local(path_var, format!("json_array({})", pieces.join(", ")), None);
                    parts.locals_pushed += 1;
                }
            }
        }
    }

    if let Some(cond) = where_clause {
        let translated = tr.translate_condition(cond)?;
        parts.conditions.push(translated);
    }
    Ok(parts)
}

fn outer_node_alias(tr: &ExpressionTranslator, name: &str) -> Option<String> {
    tr.ctx
        .lookup_variable(name)
        .filter(|v| v.kind == VariableKind::Node)
        .map(|v| v.alias.clone())
}

fn endpoint_alias(
    tr: &ExpressionTranslator,
    node: &NodeRef,
    named: &HashMap<String, Endpoint>,
    anonymous: &HashMap<usize, Endpoint>,
) -> Result<String, TranslatorError> {
    let node_ref = node.borrow();
    if let Some(name) = &node_ref.variable {
        if let Some(Endpoint::Local(alias)) = named.get(name) {
            return Ok(alias.clone());
        }
        if let Some(alias) = outer_node_alias(tr, name) {
            return Ok(alias);
        }
    }
    if let Some(Endpoint::Local(alias) | Endpoint::Outer(alias)) =
        anonymous.get(&(node.as_ptr() as usize))
    {
        return Ok(alias.clone());
    }
    Err(TranslatorError::malformed(
        "pattern endpoint was not resolved",
    ))
}

/// Resolve one endpoint, creating (and recording) nothing yet; the caller
/// decides whether a Local endpoint needs a `JOIN nodes`.
fn resolve_endpoint(
    tr: &mut ExpressionTranslator,
    node: &NodeRef,
    named: &mut HashMap<String, Endpoint>,
    anonymous: &mut HashMap<usize, Endpoint>,
) -> (Endpoint, bool) {
    let key = node.as_ptr() as usize;
    if let Some(existing) = anonymous.get(&key) {
        return (existing.clone(), false);
    }
    let node_ref = node.borrow();
    if let Some(name) = &node_ref.variable {
        if let Some(existing) = named.get(name) {
            let endpoint = existing.clone();
            anonymous.insert(key, endpoint.clone());
            return (endpoint, false);
        }
        if let Some(outer) = outer_node_alias(tr, name) {
            let endpoint = Endpoint::Outer(outer);
            named.insert(name.clone(), endpoint.clone());
            anonymous.insert(key, endpoint.clone());
            return (endpoint, false);
        }
        let alias = tr.ctx.next_alias("__pc_t_");
        tr.push_entity_local(name, &alias);
        let endpoint = Endpoint::Local(alias);
        named.insert(name.clone(), endpoint.clone());
        anonymous.insert(key, endpoint.clone());
        return (endpoint, true);
    }
    let alias = tr.ctx.next_alias("__pc_t_");
    let endpoint = Endpoint::Local(alias);
    anonymous.insert(key, endpoint.clone());
    (endpoint, true)
}

fn push_node_predicates(
    tr: &mut ExpressionTranslator,
    node: &NodePattern,
    alias: &str,
    out: &mut Vec<SqlFragment>,
) -> Result<(), TranslatorError> {
    for label in &node.labels {
        let mut frag = SqlFragment::new(format!(
            "EXISTS (SELECT 1 FROM json_each({}.label) WHERE value = ",
            alias
        ));
        frag.push_parameter(Value::String(label.clone()));
        frag.push(")");
        out.push(frag);
    }
    for (key, value) in &node.properties {
        let mut frag = SqlFragment::new(format!(
            "json_extract({}.properties, '${}') = ",
            alias,
            super::expression::json_path_segment(key)
        ));
        frag.push_fragment(tr.translate_scalar(value)?);
        out.push(frag);
    }
    Ok(())
}

fn push_edge_predicates(
    tr: &mut ExpressionTranslator,
    edge: &EdgePattern,
    alias: &str,
    out: &mut Vec<SqlFragment>,
) -> Result<(), TranslatorError> {
    match edge.types.len() {
        0 => {}
        1 => {
            let mut frag = SqlFragment::new(format!("{}.type = ", alias));
            frag.push_parameter(Value::String(edge.types[0].clone()));
            out.push(frag);
        }
        _ => {
            let mut frag = SqlFragment::new(format!("{}.type IN (", alias));
            for (i, t) in edge.types.iter().enumerate() {
                if i > 0 {
                    frag.push(", ");
                }
                frag.push_parameter(Value::String(t.clone()));
            }
            frag.push(")");
            out.push(frag);
        }
    }
    for (key, value) in &edge.properties {
        let mut frag = SqlFragment::new(format!(
            "json_extract({}.properties, '${}') = ",
            alias,
            super::expression::json_path_segment(key)
        ));
        frag.push_fragment(tr.translate_scalar(value)?);
        out.push(frag);
    }
    Ok(())
}

fn record_outer(endpoint: &Endpoint, parts: &mut SubqueryParts) {
    if let Endpoint::Outer(alias) = endpoint {
        if !parts.outer_tables.contains(alias) {
            parts.outer_tables.push(alias.clone());
        }
    }
}

/// A new endpoint joins `nodes`, keyed to the edge per direction; its own
/// label/property predicates ride on the join.
#[allow(clippy::too_many_arguments)]
fn join_new_endpoint(
    tr: &mut ExpressionTranslator,
    parts: &mut SubqueryParts,
    direction: &Direction,
    edge_alias: &str,
    endpoint: &Endpoint,
    node: &NodeRef,
    is_target: bool,
) -> Result<(), TranslatorError> {
    if let Endpoint::Local(alias) = endpoint {
        let mut preds = Vec::new();
        push_node_predicates(tr, &node.borrow(), alias, &mut preds)?;
        let link = match (direction, is_target) {
            (Direction::Either, _) => format!(
                "({e}.source_id = {a}.id OR {e}.target_id = {a}.id)",
                e = edge_alias,
                a = alias
            ),
            (Direction::Right, true) | (Direction::Left, false) => {
                format!("{}.target_id = {}.id", edge_alias, alias)
            }
            (Direction::Right, false) | (Direction::Left, true) => {
                format!("{}.source_id = {}.id", edge_alias, alias)
            }
        };
        let mut on = SqlFragment::new(format!("JOIN nodes {} ON {}", alias, link));
        for pred in preds {
            on.push(" AND ");
            on.push_fragment(pred);
        }
        parts.joins.push(on);
    }
    Ok(())
}

fn build_hop(
    tr: &mut ExpressionTranslator,
    rel: &RelationshipPattern,
    first: bool,
    parts: &mut SubqueryParts,
    named: &mut HashMap<String, Endpoint>,
    anonymous: &mut HashMap<usize, Endpoint>,
) -> Result<String, TranslatorError> {
    let edge_alias = tr.ctx.next_alias("__pc_e_");
    if let Some(name) = &rel.edge.variable {
        tr.push_entity_local(name, &edge_alias);
        named.insert(name.clone(), Endpoint::Local(edge_alias.clone()));
        parts.locals_pushed += 1;
    }
    if first {
        parts.from = format!("edges {}", edge_alias);
    } else {
        parts
            .joins
            .push(SqlFragment::new(format!("JOIN edges {} ON 1=1", edge_alias)));
    }
    push_edge_predicates(tr, &rel.edge, &edge_alias, &mut parts.conditions)?;

    let (source, source_is_new) = resolve_endpoint(tr, &rel.source, named, anonymous);
    if source_is_new && rel.source.borrow().variable.is_some() {
        parts.locals_pushed += 1;
    }
    let (target, target_is_new) = resolve_endpoint(tr, &rel.target, named, anonymous);
    if target_is_new && rel.target.borrow().variable.is_some() {
        parts.locals_pushed += 1;
    }

    if source_is_new {
        join_new_endpoint(tr, parts, &rel.edge.direction, &edge_alias, &source, &rel.source, false)?;
    }
    if target_is_new {
        join_new_endpoint(tr, parts, &rel.edge.direction, &edge_alias, &target, &rel.target, true)?;
    }

    // Correlation/link conditions for already-available endpoints.
    let src_id = source.id_sql();
    let tgt_id = target.id_sql();
    record_outer(&source, parts);
    record_outer(&target, parts);

    match rel.edge.direction {
        Direction::Right => {
            if !source_is_new {
                parts
                    .conditions
                    .push(SqlFragment::new(format!("{}.source_id = {}", edge_alias, src_id)));
            }
            if !target_is_new {
                parts
                    .conditions
                    .push(SqlFragment::new(format!("{}.target_id = {}", edge_alias, tgt_id)));
            }
        }
        Direction::Left => {
            if !source_is_new {
                parts
                    .conditions
                    .push(SqlFragment::new(format!("{}.target_id = {}", edge_alias, src_id)));
            }
            if !target_is_new {
                parts
                    .conditions
                    .push(SqlFragment::new(format!("{}.source_id = {}", edge_alias, tgt_id)));
            }
        }
        Direction::Either => {
            parts.conditions.push(SqlFragment::new(format!(
                "(({e}.source_id = {s} AND {e}.target_id = {t}) OR ({e}.source_id = {t} AND {e}.target_id = {s}))",
                e = edge_alias,
                s = src_id,
                t = tgt_id
            )));
        }
    }
    Ok(edge_alias)
}

/// Variable-length reachability inside EXISTS: inline recursive CTE plus
/// endpoint correlation.
fn build_var_length_exists(
    tr: &mut ExpressionTranslator,
    rel: &RelationshipPattern,
    parts: &mut SubqueryParts,
    named: &mut HashMap<String, Endpoint>,
    anonymous: &mut HashMap<usize, Endpoint>,
) -> Result<(), TranslatorError> {
    let spec = rel.edge.var_length.expect("checked by caller");
    let cte_name = tr.ctx.next_path_cte_name();
    let generator = VariableLengthCteGenerator {
        cte_name: cte_name.clone(),
        direction: rel.edge.direction,
        min_hops: spec.effective_min_hops(),
        max_hops: spec.max_hops,
        types: rel.edge.types.clone(),
        edge_condition: None,
    };
    let mut prefix = SqlFragment::new("WITH RECURSIVE ");
    prefix.push_fragment(generator.generate_definition());
    parts.recursive_prefix = Some(prefix);
    parts.from = cte_name.clone();

    let (source, source_is_new) = resolve_endpoint(tr, &rel.source, named, anonymous);
    if source_is_new && rel.source.borrow().variable.is_some() {
        parts.locals_pushed += 1;
    }
    let (target, target_is_new) = resolve_endpoint(tr, &rel.target, named, anonymous);
    if target_is_new && rel.target.borrow().variable.is_some() {
        parts.locals_pushed += 1;
    }

    attach_cte_endpoint(tr, parts, &cte_name, &source, source_is_new, &rel.source, "start_id")?;
    attach_cte_endpoint(tr, parts, &cte_name, &target, target_is_new, &rel.target, "end_id")?;

    if spec.effective_min_hops() >= 2 {
        parts.conditions.push(SqlFragment::new(format!(
            "{}.depth >= {}",
            cte_name,
            spec.effective_min_hops()
        )));
    }
    Ok(())
}

/// Tie one CTE endpoint column to its node: correlation for outer
/// variables, a `JOIN nodes` for new locals, an equality for locals the
/// chain already joined.
#[allow(clippy::too_many_arguments)]
fn attach_cte_endpoint(
    tr: &mut ExpressionTranslator,
    parts: &mut SubqueryParts,
    cte_name: &str,
    endpoint: &Endpoint,
    is_new: bool,
    node: &NodeRef,
    column: &str,
) -> Result<(), TranslatorError> {
    match endpoint {
        Endpoint::Outer(alias) => {
            parts.conditions.push(SqlFragment::with_table(
                format!("{}.{} = {}.id", cte_name, column, alias),
                alias.clone(),
            ));
            if !parts.outer_tables.contains(alias) {
                parts.outer_tables.push(alias.clone());
            }
        }
        Endpoint::Local(alias) => {
            if is_new {
                let mut preds = Vec::new();
                push_node_predicates(tr, &node.borrow(), alias, &mut preds)?;
                let mut on = SqlFragment::new(format!(
                    "JOIN nodes {} ON {}.{} = {}.id",
                    alias, cte_name, column, alias
                ));
                for pred in preds {
                    on.push(" AND ");
                    on.push_fragment(pred);
                }
                parts.joins.push(on);
            } else {
                parts.conditions.push(SqlFragment::new(format!(
                    "{}.{} = {}.id",
                    cte_name, column, alias
                )));
            }
        }
    }
    Ok(())
}
