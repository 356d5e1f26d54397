//! MATCH / OPTIONAL MATCH registration.
//!
//! No SQL comes out of here. Each pattern gets its aliases assigned and is
//! recorded into the context; the projection builder later turns the
//! records into FROM/JOIN topology. Four endpoint resolutions exist: a new
//! variable, a variable bound earlier, a chain-shared node (same
//! `Rc<RefCell<NodePattern>>` as the previous hop's endpoint), and an
//! anonymous node reused through that same sharing.

use std::collections::HashMap;

use crate::cypher_ast::ast::{Expression, MatchClause, NodeRef, PatternElement, WhereCondition};

use super::context::{
    NodeMeta, NodeRecord, PathRecord, RelPatternRecord, ScopeVariable, TranslationContext,
    VariableKind,
};
use super::errors::TranslatorError;

pub fn register_match(
    ctx: &mut TranslationContext,
    clause: &MatchClause,
    optional: bool,
) -> Result<(), TranslatorError> {
    // Rc-identity map for chain sharing within this clause.
    let mut shared: HashMap<usize, String> = HashMap::new();
    let mut last_rel_index: Option<usize> = None;
    let mut last_node_index: Option<usize> = None;

    for pattern in &clause.patterns {
        match &pattern.element {
            PatternElement::Node(node) => {
                let alias = resolve_node(ctx, node, optional, &mut shared, true)?;
                if let Some(alias) = alias {
                    last_node_index = Some(ctx.standalone_nodes.len());
                    ctx.standalone_nodes.push(NodeRecord {
                        alias,
                        optional,
                        clause_index: ctx.current_clause_index,
                        optional_where: None,
                    });
                }
                if pattern.variable.is_some() {
                    return Err(TranslatorError::unsupported(
                        "path variables require a relationship pattern",
                    ));
                }
            }
            PatternElement::Connected(rels) => {
                let mut node_sequence: Vec<String> = Vec::new();
                let mut edge_aliases: Vec<String> = Vec::new();
                let mut is_var_length = false;
                let mut var_length_cte: Option<String> = None;

                for rel in rels {
                    let source_known = node_is_known(ctx, &rel.source, &shared);
                    let source_alias = resolve_node(ctx, &rel.source, optional, &mut shared, false)?
                        .expect("relationship endpoints always resolve to an alias");
                    let target_known = node_is_known(ctx, &rel.target, &shared);
                    let target_alias = resolve_node(ctx, &rel.target, optional, &mut shared, false)?
                        .expect("relationship endpoints always resolve to an alias");

                    if node_sequence.is_empty() {
                        node_sequence.push(source_alias.clone());
                    }
                    node_sequence.push(target_alias.clone());

                    let (edge_alias, edge_is_new, bound_endpoints, path_cte_name) =
                        resolve_edge(ctx, rel, optional)?;
                    edge_aliases.push(edge_alias.clone());
                    if rel.edge.var_length.is_some() {
                        is_var_length = true;
                        var_length_cte = path_cte_name.clone();
                    }

                    log::debug!(
                        "pattern hop {} -[{}]-> {} (optional={}, scope={})",
                        source_alias,
                        edge_alias,
                        target_alias,
                        optional,
                        ctx.edge_scope
                    );

                    last_rel_index = Some(ctx.patterns.len());
                    ctx.patterns.push(RelPatternRecord {
                        source_alias,
                        target_alias,
                        edge_alias,
                        direction: rel.edge.direction,
                        types: rel.edge.types.clone(),
                        edge_properties: rel.edge.properties.clone(),
                        var_length: rel.edge.var_length,
                        optional,
                        edge_scope: ctx.edge_scope,
                        clause_index: ctx.current_clause_index,
                        source_is_new: !source_known,
                        target_is_new: !target_known,
                        edge_is_new,
                        bound_edge_endpoints: bound_endpoints,
                        target_has_label: !rel.target.borrow().labels.is_empty(),
                        path_cte_name,
                        optional_where: None,
                        source_pattern: rel.source.borrow().clone(),
                        target_pattern: rel.target.borrow().clone(),
                    });
                }

                if let Some(path_var) = &pattern.variable {
                    let mut deduped = Vec::new();
                    for alias in &node_sequence {
                        if !deduped.contains(alias) {
                            deduped.push(alias.clone());
                        }
                    }
                    ctx.declare_variable(
                        path_var,
                        ScopeVariable {
                            kind: VariableKind::Path,
                            alias: var_length_cte
                                .clone()
                                .unwrap_or_else(|| node_sequence[0].clone()),
                            id: None,
                            path_cte: var_length_cte.clone(),
                        },
                    )?;
                    ctx.path_records.push(PathRecord {
                        variable: path_var.clone(),
                        node_sequence,
                        node_aliases: deduped,
                        edge_aliases,
                        is_var_length,
                        path_cte_name: var_length_cte,
                        optional,
                    });
                }
            }
        }
    }

    if let Some(where_clause) = &clause.where_clause {
        attach_where(ctx, where_clause, optional, last_rel_index, last_node_index);
    }
    Ok(())
}

fn attach_where(
    ctx: &mut TranslationContext,
    where_clause: &WhereCondition,
    optional: bool,
    last_rel_index: Option<usize>,
    last_node_index: Option<usize>,
) {
    if !optional {
        ctx.match_where.push(where_clause.clone());
        return;
    }
    // An OPTIONAL MATCH's WHERE must not filter rows of prior required
    // matches, so it rides on the owning pattern and lands in an ON clause.
    if let Some(index) = last_rel_index {
        ctx.patterns[index].optional_where = Some(where_clause.clone());
    } else if let Some(index) = last_node_index {
        ctx.standalone_nodes[index].optional_where = Some(where_clause.clone());
    } else {
        ctx.match_where.push(where_clause.clone());
    }
}

fn node_is_known(
    ctx: &TranslationContext,
    node: &NodeRef,
    shared: &HashMap<usize, String>,
) -> bool {
    if shared.contains_key(&(node.as_ptr() as usize)) {
        return true;
    }
    node.borrow()
        .variable
        .as_ref()
        .map(|name| ctx.lookup_variable(name).is_some())
        .unwrap_or(false)
}

/// Resolve one node to an alias. Returns `None` for a standalone re-use of
/// an already bound variable with nothing new to record.
fn resolve_node(
    ctx: &mut TranslationContext,
    node: &NodeRef,
    optional: bool,
    shared: &mut HashMap<usize, String>,
    standalone: bool,
) -> Result<Option<String>, TranslatorError> {
    let key = node.as_ptr() as usize;
    if let Some(alias) = shared.get(&key) {
        return Ok(Some(alias.clone()));
    }
    let node_ref = node.borrow();

    if let Some(name) = &node_ref.variable {
        if let Some(bound) = ctx.lookup_variable(name) {
            if bound.kind != VariableKind::Node {
                return Err(TranslatorError::VariableAlreadyBound(name.clone()));
            }
            let alias = bound.alias.clone();
            shared.insert(key, alias.clone());
            if standalone {
                // Re-matching a bound node on its own only adds constraints.
                push_rebind_constraints(ctx, name, &node_ref);
                return Ok(None);
            }
            return Ok(Some(alias));
        }
        if ctx.created.contains_key(name) {
            return Err(TranslatorError::VariableAlreadyBound(name.clone()));
        }
        let alias = ctx.next_alias("n");
        ctx.declare_variable(
            name,
            ScopeVariable {
                kind: VariableKind::Node,
                alias: alias.clone(),
                id: None,
                path_cte: None,
            },
        )?;
        ctx.node_meta.insert(
            alias.clone(),
            NodeMeta {
                pattern: node_ref.clone(),
                optional,
            },
        );
        shared.insert(key, alias.clone());
        return Ok(Some(alias));
    }

    let alias = ctx.next_alias("n");
    ctx.node_meta.insert(
        alias.clone(),
        NodeMeta {
            pattern: node_ref.clone(),
            optional,
        },
    );
    shared.insert(key, alias.clone());
    Ok(Some(alias))
}

/// Extra labels/properties on a standalone rebind become plain WHERE
/// conditions on the existing alias.
fn push_rebind_constraints(
    ctx: &mut TranslationContext,
    name: &str,
    node: &crate::cypher_ast::ast::NodePattern,
) {
    if !node.labels.is_empty() {
        ctx.match_where
            .push(WhereCondition::Expression(Expression::LabelPredicate {
                variable: name.to_string(),
                labels: node.labels.clone(),
            }));
    }
    for (k, v) in &node.properties {
        ctx.match_where.push(WhereCondition::Comparison {
            op: crate::cypher_ast::ast::ComparisonOp::Eq,
            left: Expression::property(name, k.clone()),
            right: v.clone(),
        });
    }
}

/// Returns (alias, is_new, bound original endpoints, var-length CTE name).
fn resolve_edge(
    ctx: &mut TranslationContext,
    rel: &crate::cypher_ast::ast::RelationshipPattern,
    optional: bool,
) -> Result<(String, bool, Option<(String, String)>, Option<String>), TranslatorError> {
    let _ = optional;
    let var_length = rel.edge.var_length;

    if let Some(name) = &rel.edge.variable {
        if let Some(bound) = ctx.lookup_variable(name) {
            match bound.kind {
                VariableKind::Edge => {
                    if var_length.is_some() {
                        return Err(TranslatorError::VariableAlreadyBound(name.clone()));
                    }
                    let alias = bound.alias.clone();
                    let endpoints = ctx
                        .patterns
                        .iter()
                        .find(|p| p.edge_alias == alias)
                        .map(|p| (p.source_alias.clone(), p.target_alias.clone()));
                    return Ok((alias, false, endpoints, None));
                }
                _ => return Err(TranslatorError::VariableAlreadyBound(name.clone())),
            }
        }
    }

    if var_length.is_some() {
        let cte_name = ctx.next_path_cte_name();
        if let Some(name) = &rel.edge.variable {
            ctx.declare_variable(
                name,
                ScopeVariable {
                    kind: VariableKind::VarLengthEdge,
                    alias: cte_name.clone(),
                    id: None,
                    path_cte: Some(cte_name.clone()),
                },
            )?;
        }
        return Ok((cte_name.clone(), true, None, Some(cte_name)));
    }

    let alias = ctx.next_alias("e");
    if let Some(name) = &rel.edge.variable {
        ctx.declare_variable(
            name,
            ScopeVariable {
                kind: VariableKind::Edge,
                alias: alias.clone(),
                id: None,
                path_cte: None,
            },
        )?;
    }
    Ok((alias, true, None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_ast::ast::{
        node_ref, Direction, EdgePattern, NodePattern, PathPattern, RelationshipPattern,
        VarLengthSpec,
    };

    fn rel(
        source: NodeRef,
        direction: Direction,
        types: &[&str],
        target: NodeRef,
    ) -> RelationshipPattern {
        RelationshipPattern {
            source,
            edge: EdgePattern {
                types: types.iter().map(|t| t.to_string()).collect(),
                direction,
                ..Default::default()
            },
            target,
        }
    }

    #[test]
    fn chain_shares_middle_node() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(NodePattern::named("a"));
        let b = node_ref(NodePattern::default());
        let c = node_ref(NodePattern::named("c"));
        let clause = MatchClause {
            patterns: vec![PathPattern::connected(vec![
                rel(a, Direction::Right, &["R"], b.clone()),
                rel(b, Direction::Right, &["S"], c),
            ])],
            where_clause: None,
        };
        register_match(&mut ctx, &clause, false).unwrap();
        assert_eq!(ctx.patterns.len(), 2);
        assert_eq!(ctx.patterns[0].target_alias, ctx.patterns[1].source_alias);
        assert!(!ctx.patterns[1].source_is_new, "shared middle node is not new");
    }

    #[test]
    fn bound_variable_reuses_alias_across_clauses() {
        let mut ctx = TranslationContext::default();
        let a1 = node_ref(NodePattern::named("a"));
        let b = node_ref(NodePattern::named("b"));
        register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::connected(vec![rel(
                    a1,
                    Direction::Right,
                    &["R"],
                    b,
                )])],
                where_clause: None,
            },
            false,
        )
        .unwrap();

        let a2 = node_ref(NodePattern::named("a"));
        let c = node_ref(NodePattern::named("c"));
        register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::connected(vec![rel(
                    a2,
                    Direction::Right,
                    &["S"],
                    c,
                )])],
                where_clause: None,
            },
            true,
        )
        .unwrap();

        assert_eq!(ctx.patterns[0].source_alias, ctx.patterns[1].source_alias);
        assert!(!ctx.patterns[1].source_is_new);
        assert!(ctx.patterns[1].optional);
        assert!(ctx.patterns[1].target_is_new);
    }

    #[test]
    fn edge_variable_cannot_rebind_as_node() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(NodePattern::named("a"));
        let b = node_ref(NodePattern::named("b"));
        let mut pattern = rel(a, Direction::Right, &["R"], b);
        pattern.edge.variable = Some("e".to_string());
        register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::connected(vec![pattern])],
                where_clause: None,
            },
            false,
        )
        .unwrap();

        let err = register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::node(NodePattern::named("e"))],
                where_clause: None,
            },
            false,
        )
        .unwrap_err();
        assert!(matches!(err, TranslatorError::VariableAlreadyBound(name) if name == "e"));
    }

    #[test]
    fn var_length_edge_preallocates_cte_name() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(NodePattern::named("a"));
        let b = node_ref(NodePattern::named("b"));
        let mut pattern = rel(a, Direction::Right, &["KNOWS"], b);
        pattern.edge.variable = Some("r".to_string());
        pattern.edge.var_length = Some(VarLengthSpec::range(1, 3));
        register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::connected(vec![pattern])],
                where_clause: None,
            },
            false,
        )
        .unwrap();
        assert_eq!(ctx.patterns[0].path_cte_name.as_deref(), Some("path_0"));
        let r = ctx.lookup_variable("r").unwrap();
        assert_eq!(r.kind, VariableKind::VarLengthEdge);
        assert_eq!(r.path_cte.as_deref(), Some("path_0"));
    }

    #[test]
    fn optional_where_attaches_to_owning_pattern() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(NodePattern::named("a"));
        let b = node_ref(NodePattern::named("b"));
        register_match(
            &mut ctx,
            &MatchClause {
                patterns: vec![PathPattern::connected(vec![rel(
                    a,
                    Direction::Right,
                    &["R"],
                    b,
                )])],
                where_clause: Some(WhereCondition::IsNull {
                    expression: Expression::property("b", "deleted"),
                    negated: false,
                }),
            },
            true,
        )
        .unwrap();
        assert!(ctx.patterns[0].optional_where.is_some());
        assert!(ctx.match_where.is_empty());
    }
}
