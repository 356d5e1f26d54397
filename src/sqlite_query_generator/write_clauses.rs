//! Write clause translation: CREATE, MERGE, SET, REMOVE, DELETE.
//!
//! Each clause emits its own ordered statements. Rows created earlier in
//! the same query are addressed by their freshly minted UUID; rows bound
//! by MATCH are addressed through an `id IN (SELECT <alias>.id FROM ..)`
//! subselect over the registered topology.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cypher_ast::ast::{
    CreateClause, DeleteClause, Direction, EdgePattern, Expression, MergeClause, NodePattern,
    NodeRef, PatternElement, RemoveClause, RemoveItem, SetClause, SetItem,
};

use super::context::{CreatedEntity, NodeMeta, NodeRecord, ScopeVariable, TranslationContext, VariableKind};
use super::errors::TranslatorError;
use super::expression::{self, ExpressionTranslator, StaticType};
use super::plan_builder;
use super::sql_fragment::SqlFragment;
use super::SqlStatement;

fn statement(frag: SqlFragment) -> SqlStatement {
    SqlStatement {
        sql: frag.sql,
        params: frag.params,
    }
}

fn labels_param(labels: &[String]) -> Value {
    Value::String(
        serde_json::to_string(&labels.iter().collect::<Vec<_>>()).unwrap_or_else(|_| "[]".into()),
    )
}

/// `json_object('k', <v>, ..)` plus the translation-time constant view of
/// the map (for later in-clause references to the created row).
fn properties_fragment(
    ctx: &TranslationContext,
    properties: &[(String, Expression)],
) -> Result<(SqlFragment, Map<String, Value>), TranslatorError> {
    if properties.is_empty() {
        return Ok((SqlFragment::new("json('{}')"), Map::new()));
    }
    let mut resolved = Map::new();
    let mut parts = Vec::new();
    for (key, value) in properties {
        let mut tr = ExpressionTranslator::new(ctx);
        if let Some(constant) = tr.constant_value(value) {
            resolved.insert(key.clone(), constant);
        }
        let mut frag = SqlFragment::default();
        frag.push_parameter(Value::String(key.clone()));
        frag.push(", ");
        frag.push_fragment(tr.translate_value(value)?);
        parts.push(frag);
    }
    Ok((
        SqlFragment::join(parts, ", ").wrap("json_object(", ")"),
        resolved,
    ))
}

enum CreateEndpoint {
    /// Created in this query - the UUID is a direct parameter.
    Created(String),
    /// Bound by MATCH - resolved through the topology subselect.
    Bound(String),
}

pub fn translate_create(
    ctx: &mut TranslationContext,
    clause: &CreateClause,
) -> Result<Vec<SqlStatement>, TranslatorError> {
    let mut statements = Vec::new();
    for pattern in &clause.patterns {
        match &pattern.element {
            PatternElement::Node(node) => {
                let node_ref = node.borrow();
                if let Some(name) = &node_ref.variable {
                    if ctx.lookup_variable(name).is_some() || ctx.created.contains_key(name) {
                        return Err(TranslatorError::VariableAlreadyBound(name.clone()));
                    }
                }
                statements.push(create_node(ctx, &node_ref)?);
            }
            PatternElement::Connected(rels) => {
                for rel in rels {
                    let source = resolve_create_endpoint(ctx, &rel.source, &mut statements)?;
                    let target = resolve_create_endpoint(ctx, &rel.target, &mut statements)?;
                    statements.push(create_edge(ctx, rel_edge(rel)?, source, target)?);
                }
            }
        }
    }
    Ok(statements)
}

fn rel_edge(rel: &crate::cypher_ast::ast::RelationshipPattern) -> Result<&EdgePattern, TranslatorError> {
    if rel.edge.var_length.is_some() {
        return Err(TranslatorError::syntax(
            "CREATE cannot use a variable-length relationship",
        ));
    }
    if rel.edge.types.len() != 1 {
        return Err(TranslatorError::syntax(
            "CREATE requires exactly one relationship type",
        ));
    }
    if rel.edge.direction == Direction::Either {
        return Err(TranslatorError::syntax(
            "CREATE requires a directed relationship",
        ));
    }
    Ok(&rel.edge)
}

fn resolve_create_endpoint(
    ctx: &mut TranslationContext,
    node: &NodeRef,
    statements: &mut Vec<SqlStatement>,
) -> Result<CreateEndpoint, TranslatorError> {
    let node_ref = node.borrow();
    if let Some(name) = &node_ref.variable {
        if let Some(created) = ctx.created.get(name) {
            if created.kind != VariableKind::Node {
                return Err(TranslatorError::VariableAlreadyBound(name.clone()));
            }
            if !node_ref.labels.is_empty() || !node_ref.properties.is_empty() {
                return Err(TranslatorError::VariableAlreadyBound(name.clone()));
            }
            return Ok(CreateEndpoint::Created(created.id.clone()));
        }
        if let Some(bound) = ctx.lookup_variable(name) {
            if bound.kind != VariableKind::Node {
                return Err(TranslatorError::VariableAlreadyBound(name.clone()));
            }
            if !node_ref.labels.is_empty() || !node_ref.properties.is_empty() {
                return Err(TranslatorError::VariableAlreadyBound(name.clone()));
            }
            return Ok(CreateEndpoint::Bound(bound.alias.clone()));
        }
    }
    let stmt = create_node(ctx, &node_ref)?;
    let id = match stmt.params.first() {
        Some(Value::String(id)) => id.clone(),
        _ => unreachable!("node inserts lead with the id parameter"),
    };
    statements.push(stmt);
    Ok(CreateEndpoint::Created(id))
}

fn create_node(
    ctx: &mut TranslationContext,
    node: &NodePattern,
) -> Result<SqlStatement, TranslatorError> {
    let id = Uuid::new_v4().to_string();
    let (props, resolved) = properties_fragment(ctx, &node.properties)?;
    if !props.tables.is_empty() {
        return Err(TranslatorError::unsupported(
            "CREATE property values may reference created rows and parameters only",
        ));
    }

    let mut frag = SqlFragment::new("INSERT INTO nodes (id, label, properties) VALUES (");
    frag.push_parameter(Value::String(id.clone()));
    frag.push(", json(");
    frag.push_parameter(labels_param(&node.labels));
    frag.push("), ");
    frag.push_fragment(props);
    frag.push(")");

    if let Some(name) = &node.variable {
        log::debug!("created node '{}' -> {}", name, id);
        ctx.created.insert(
            name.clone(),
            CreatedEntity {
                kind: VariableKind::Node,
                id,
                labels: node.labels.clone(),
                properties: resolved,
            },
        );
    }
    Ok(statement(frag))
}

fn create_edge(
    ctx: &mut TranslationContext,
    edge: &EdgePattern,
    source: CreateEndpoint,
    target: CreateEndpoint,
) -> Result<SqlStatement, TranslatorError> {
    let id = Uuid::new_v4().to_string();
    let (props, resolved) = properties_fragment(ctx, &edge.properties)?;
    // `<-` swaps the stored endpoints.
    let (source, target) = match edge.direction {
        Direction::Left => (target, source),
        _ => (source, target),
    };

    let any_bound = matches!(source, CreateEndpoint::Bound(_))
        || matches!(target, CreateEndpoint::Bound(_));

    let endpoint = |e: &CreateEndpoint| -> SqlFragment {
        match e {
            CreateEndpoint::Created(id) => SqlFragment::parameter(Value::String(id.clone())),
            CreateEndpoint::Bound(alias) => SqlFragment::new(format!("{}.id", alias)),
        }
    };

    let mut frag = SqlFragment::new("INSERT INTO edges (id, type, source_id, target_id, properties) ");
    if any_bound {
        // MATCH-bound endpoints: replay the match topology to select ids.
        frag.push("SELECT ");
        frag.push_parameter(Value::String(id.clone()));
        frag.push(", ");
        frag.push_parameter(Value::String(edge.types[0].clone()));
        frag.push(", ");
        frag.push_fragment(endpoint(&source));
        frag.push(", ");
        frag.push_fragment(endpoint(&target));
        frag.push(", ");
        frag.push_fragment(props);

        let topo = plan_builder::build_topology(ctx)?;
        frag.push(" FROM ");
        frag.push_fragment(SqlFragment::join(topo.from_items, ", "));
        for join in topo.joins {
            frag.push(" ");
            frag.push_fragment(join);
        }
        let mut wheres = topo.where_conjuncts;
        for cond in &ctx.match_where {
            let mut tr = ExpressionTranslator::new(ctx);
            wheres.push(tr.translate_condition(cond)?);
        }
        if !wheres.is_empty() {
            frag.push(" WHERE ");
            frag.push_fragment(SqlFragment::join(wheres, " AND "));
        }
    } else {
        frag.push("VALUES (");
        frag.push_parameter(Value::String(id.clone()));
        frag.push(", ");
        frag.push_parameter(Value::String(edge.types[0].clone()));
        frag.push(", ");
        frag.push_fragment(endpoint(&source));
        frag.push(", ");
        frag.push_fragment(endpoint(&target));
        frag.push(", ");
        frag.push_fragment(props);
        frag.push(")");
    }

    if let Some(name) = &edge.variable {
        if ctx.lookup_variable(name).is_some() || ctx.created.contains_key(name) {
            return Err(TranslatorError::VariableAlreadyBound(name.clone()));
        }
        ctx.created.insert(
            name.clone(),
            CreatedEntity {
                kind: VariableKind::Edge,
                id,
                labels: edge.types.clone(),
                properties: resolved,
            },
        );
    }
    Ok(statement(frag))
}

pub fn translate_merge(
    ctx: &mut TranslationContext,
    clause: &MergeClause,
) -> Result<Vec<SqlStatement>, TranslatorError> {
    if clause.patterns.len() != 1 {
        return Err(TranslatorError::unsupported(
            "MERGE supports exactly one pattern",
        ));
    }
    let node = match &clause.patterns[0].element {
        PatternElement::Node(node) => node.borrow(),
        PatternElement::Connected(_) => {
            return Err(TranslatorError::unsupported(
                "relationship MERGE is delegated to the executor",
            ))
        }
    };

    for (key, value) in &node.properties {
        let tr = ExpressionTranslator::new(ctx);
        if tr.constant_value(value) == Some(Value::Null) {
            return Err(TranslatorError::invalid_argument(format!(
                "MERGE cannot match on null property '{}'",
                key
            )));
        }
    }

    let id = Uuid::new_v4().to_string();
    let (props, _resolved) = properties_fragment(ctx, &node.properties)?;

    let mut frag = SqlFragment::new("INSERT OR IGNORE INTO nodes (id, label, properties) SELECT ");
    frag.push_parameter(Value::String(id));
    frag.push(", json(");
    frag.push_parameter(labels_param(&node.labels));
    frag.push("), ");
    frag.push_fragment(props);
    frag.push(" WHERE NOT EXISTS (SELECT 1 FROM nodes WHERE 1=1");
    for label in &node.labels {
        frag.push(" AND EXISTS (SELECT 1 FROM json_each(nodes.label) WHERE value = ");
        frag.push_parameter(Value::String(label.clone()));
        frag.push(")");
    }
    for (key, value) in &node.properties {
        let mut tr = ExpressionTranslator::new(ctx);
        frag.push(&format!(
            " AND json_extract(nodes.properties, '${}') = ",
            expression::json_path_segment(key)
        ));
        frag.push_fragment(tr.translate_scalar(value)?);
    }
    frag.push(")");

    // The merged variable binds like a MATCH so later clauses address
    // whichever row exists after the insert-or-ignore.
    if let Some(name) = &node.variable {
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
                pattern: node.clone(),
                optional: false,
            },
        );
        ctx.standalone_nodes.push(NodeRecord {
            alias,
            optional: false,
            clause_index: ctx.current_clause_index,
            optional_where: None,
        });
    }
    Ok(vec![statement(frag)])
}

/// Resolve a SET/REMOVE/DELETE target to its table and UPDATE/DELETE row
/// filter.
fn target_filter(
    ctx: &TranslationContext,
    variable: &str,
) -> Result<(&'static str, VariableKind, SqlFragment), TranslatorError> {
    if let Some(bound) = ctx.lookup_variable(variable) {
        let table = match bound.kind {
            VariableKind::Node => "nodes",
            VariableKind::Edge => "edges",
            _ => {
                return Err(TranslatorError::type_mismatch(format!(
                    "'{}' is not a node or relationship",
                    variable
                )))
            }
        };
        let mut frag = SqlFragment::new("id IN (");
        frag.push_fragment(plan_builder::entity_id_subquery(ctx, &bound.alias)?);
        frag.push(")");
        return Ok((table, bound.kind, frag));
    }
    if let Some(created) = ctx.created.get(variable) {
        let table = match created.kind {
            VariableKind::Edge => "edges",
            _ => "nodes",
        };
        let mut frag = SqlFragment::new("id = ");
        frag.push_parameter(Value::String(created.id.clone()));
        return Ok((table, created.kind, frag));
    }
    Err(TranslatorError::UnknownVariable(variable.to_string()))
}

/// Translate a SET value. The updated row's own variable resolves to the
/// UPDATE target columns; created rows resolve by UUID subquery.
fn set_value(
    ctx: &TranslationContext,
    target: &str,
    value: &Expression,
) -> Result<SqlFragment, TranslatorError> {
    let mut tr = ExpressionTranslator::new(ctx);
    tr.push_local(target, "json_set(properties, '$._nf_id', id)".to_string(), None);
    let frag = tr.translate_value(value)?;
    tr.pop_local();
    if !frag.tables.is_empty() {
        return Err(TranslatorError::unsupported(
            "SET values may reference the updated row, created rows, and parameters",
        ));
    }
    Ok(frag)
}

pub fn translate_set(
    ctx: &mut TranslationContext,
    clause: &SetClause,
) -> Result<Vec<SqlStatement>, TranslatorError> {
    let mut statements = Vec::new();
    for item in &clause.items {
        match item {
            SetItem::Property {
                variable,
                key,
                value,
            } => {
                let (table, _, filter) = target_filter(ctx, variable)?;
                let mut frag = SqlFragment::new(format!(
                    "UPDATE {} SET properties = json_set(properties, '${}', ",
                    table,
                    expression::json_path_segment(key)
                ));
                frag.push_fragment(set_value(ctx, variable, value)?);
                frag.push(") WHERE ");
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
            SetItem::Labels { variable, labels } => {
                let (table, kind, filter) = target_filter(ctx, variable)?;
                if kind != VariableKind::Node {
                    return Err(TranslatorError::type_mismatch(
                        "labels can only be set on nodes",
                    ));
                }
                let mut frag = SqlFragment::new(format!(
                    "UPDATE {} SET label = (SELECT json_group_array(value) FROM (SELECT value FROM json_each(label)",
                    table
                ));
                for label in labels {
                    frag.push(" UNION SELECT ");
                    frag.push_parameter(Value::String(label.clone()));
                }
                frag.push(")) WHERE ");
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
            SetItem::ReplaceMap { variable, value } => {
                let (table, _, filter) = target_filter(ctx, variable)?;
                {
                    let tr = ExpressionTranslator::new(ctx);
                    let t = tr.static_type(value);
                    if !matches!(t, StaticType::Map | StaticType::Unknown) {
                        return Err(TranslatorError::type_mismatch(
                            "node/relationship assignment requires a map",
                        ));
                    }
                }
                let mut frag =
                    SqlFragment::new(format!("UPDATE {} SET properties = ", table));
                frag.push_fragment(set_value(ctx, variable, value)?);
                frag.push(" WHERE ");
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
            SetItem::MergeMap { variable, value } => {
                let (table, _, filter) = target_filter(ctx, variable)?;
                // json_patch merges; keys set to null in the patch drop out
                // of the result, and an explicit json_remove keeps that
                // true for literal null entries.
                let null_keys: Vec<String> = match value {
                    Expression::Map(entries) => entries
                        .iter()
                        .filter(|(_, v)| matches!(v, Expression::Literal(crate::cypher_ast::ast::Literal::Null)))
                        .map(|(k, _)| k.clone())
                        .collect(),
                    _ => Vec::new(),
                };
                let mut frag = SqlFragment::new(format!("UPDATE {} SET properties = ", table));
                if null_keys.is_empty() {
                    frag.push("json_patch(properties, ");
                    frag.push_fragment(set_value(ctx, variable, value)?);
                    frag.push(")");
                } else {
                    frag.push("json_remove(json_patch(properties, ");
                    frag.push_fragment(set_value(ctx, variable, value)?);
                    frag.push(")");
                    for key in &null_keys {
                        frag.push(&format!(
                            ", '${}'",
                            expression::json_path_segment(key)
                        ));
                    }
                    frag.push(")");
                }
                frag.push(" WHERE ");
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
        }
    }
    Ok(statements)
}

pub fn translate_remove(
    ctx: &mut TranslationContext,
    clause: &RemoveClause,
) -> Result<Vec<SqlStatement>, TranslatorError> {
    let mut statements = Vec::new();
    for item in &clause.items {
        match item {
            RemoveItem::Property { variable, key } => {
                let (table, _, filter) = target_filter(ctx, variable)?;
                let mut frag = SqlFragment::new(format!(
                    "UPDATE {} SET properties = json_remove(properties, '${}') WHERE ",
                    table,
                    expression::json_path_segment(key)
                ));
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
            RemoveItem::Labels { variable, labels } => {
                let (table, kind, filter) = target_filter(ctx, variable)?;
                if kind != VariableKind::Node {
                    return Err(TranslatorError::type_mismatch(
                        "labels can only be removed from nodes",
                    ));
                }
                let mut frag = SqlFragment::new(format!(
                    "UPDATE {} SET label = (SELECT json_group_array(value) FROM json_each(label) WHERE value NOT IN (",
                    table
                ));
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        frag.push(", ");
                    }
                    frag.push_parameter(Value::String(label.clone()));
                }
                frag.push(")) WHERE ");
                frag.push_fragment(filter);
                statements.push(statement(frag));
            }
        }
    }
    Ok(statements)
}

pub fn translate_delete(
    ctx: &mut TranslationContext,
    clause: &DeleteClause,
) -> Result<Vec<SqlStatement>, TranslatorError> {
    let mut statements = Vec::new();
    for item in &clause.items {
        let variable = match item {
            Expression::Variable(name) => name,
            _ => {
                return Err(TranslatorError::type_mismatch(
                    "DELETE requires node or relationship variables",
                ))
            }
        };
        let (table, kind, filter) = target_filter(ctx, variable)?;
        if kind == VariableKind::Node && clause.detach {
            // Incident edges go first.
            let id_set = match ctx.lookup_variable(variable) {
                Some(bound) => {
                    let mut frag = SqlFragment::new("IN (");
                    frag.push_fragment(plan_builder::entity_id_subquery(ctx, &bound.alias)?);
                    frag.push(")");
                    frag
                }
                None => {
                    let created = ctx
                        .created
                        .get(variable)
                        .ok_or_else(|| TranslatorError::UnknownVariable(variable.clone()))?;
                    let mut frag = SqlFragment::new("= ");
                    frag.push_parameter(Value::String(created.id.clone()));
                    frag
                }
            };
            let mut frag = SqlFragment::new("DELETE FROM edges WHERE source_id ");
            frag.push_fragment(id_set.clone());
            frag.push(" OR target_id ");
            frag.push_fragment(id_set);
            statements.push(statement(frag));
        }
        let mut frag = SqlFragment::new(format!("DELETE FROM {} WHERE ", table));
        frag.push_fragment(filter);
        statements.push(statement(frag));
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_ast::ast::{node_ref, PathPattern};
    use serde_json::json;

    fn named_node(name: &str, labels: &[&str], props: &[(&str, Expression)]) -> NodePattern {
        NodePattern {
            variable: Some(name.to_string()),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn create_node_emits_insert_with_uuid() {
        let mut ctx = TranslationContext::default();
        let clause = CreateClause {
            patterns: vec![PathPattern::node(named_node(
                "n",
                &["Person"],
                &[("name", Expression::string("Alice"))],
            ))],
        };
        let stmts = translate_create(&mut ctx, &clause).unwrap();
        assert_eq!(stmts.len(), 1);
        let stmt = &stmts[0];
        assert!(
            stmt.sql
                .starts_with("INSERT INTO nodes (id, label, properties) VALUES (?, json(?), "),
            "sql: {}",
            stmt.sql
        );
        assert_eq!(stmt.params.len(), stmt.sql.matches('?').count());
        // id, labels, key, value
        assert_eq!(stmt.params[1], json!("[\"Person\"]"));
        assert_eq!(stmt.params[2], json!("name"));
        assert_eq!(stmt.params[3], json!("Alice"));
        assert!(ctx.created.contains_key("n"));
    }

    #[test]
    fn create_chain_orders_nodes_before_edge() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(named_node("a", &[], &[]));
        let b = node_ref(named_node("b", &[], &[]));
        let clause = CreateClause {
            patterns: vec![PathPattern::connected(vec![
                crate::cypher_ast::ast::RelationshipPattern {
                    source: a,
                    edge: EdgePattern {
                        types: vec!["KNOWS".to_string()],
                        direction: Direction::Right,
                        ..Default::default()
                    },
                    target: b,
                },
            ])],
        };
        let stmts = translate_create(&mut ctx, &clause).unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].sql.starts_with("INSERT INTO nodes"));
        assert!(stmts[1].sql.starts_with("INSERT INTO nodes"));
        assert!(stmts[2].sql.starts_with("INSERT INTO edges"));
        // Edge endpoints are the two node UUIDs.
        let a_id = stmts[0].params[0].clone();
        let b_id = stmts[1].params[0].clone();
        assert_eq!(stmts[2].params[2], a_id);
        assert_eq!(stmts[2].params[3], b_id);
    }

    #[test]
    fn left_direction_swaps_edge_endpoints() {
        let mut ctx = TranslationContext::default();
        let a = node_ref(named_node("a", &[], &[]));
        let b = node_ref(named_node("b", &[], &[]));
        let clause = CreateClause {
            patterns: vec![PathPattern::connected(vec![
                crate::cypher_ast::ast::RelationshipPattern {
                    source: a,
                    edge: EdgePattern {
                        types: vec!["KNOWS".to_string()],
                        direction: Direction::Left,
                        ..Default::default()
                    },
                    target: b,
                },
            ])],
        };
        let stmts = translate_create(&mut ctx, &clause).unwrap();
        let a_id = stmts[0].params[0].clone();
        let b_id = stmts[1].params[0].clone();
        // (a)<-[:KNOWS]-(b): the edge goes b -> a.
        assert_eq!(stmts[2].params[2], b_id);
        assert_eq!(stmts[2].params[3], a_id);
    }

    #[test]
    fn merge_rejects_null_property() {
        let mut ctx = TranslationContext::default();
        let clause = MergeClause {
            patterns: vec![PathPattern::node(named_node(
                "n",
                &["Person"],
                &[("name", Expression::Literal(crate::cypher_ast::ast::Literal::Null))],
            ))],
        };
        let err = translate_merge(&mut ctx, &clause).unwrap_err();
        assert!(matches!(err, TranslatorError::InvalidArgument(_)));
    }

    #[test]
    fn merge_emits_insert_guarded_by_not_exists() {
        let mut ctx = TranslationContext::default();
        let clause = MergeClause {
            patterns: vec![PathPattern::node(named_node(
                "n",
                &["Person"],
                &[("name", Expression::string("Alice"))],
            ))],
        };
        let stmts = translate_merge(&mut ctx, &clause).unwrap();
        let sql = &stmts[0].sql;
        assert!(
            sql.starts_with("INSERT OR IGNORE INTO nodes"),
            "sql: {}",
            sql
        );
        assert!(sql.contains("WHERE NOT EXISTS (SELECT 1 FROM nodes"), "sql: {}", sql);
        assert!(sql.contains("json_each(nodes.label)"), "sql: {}", sql);
        assert!(ctx.lookup_variable("n").is_some());
    }

    #[test]
    fn detach_delete_removes_incident_edges_first() {
        let mut ctx = TranslationContext::default();
        let clause = CreateClause {
            patterns: vec![PathPattern::node(named_node("n", &[], &[]))],
        };
        translate_create(&mut ctx, &clause).unwrap();
        let delete = DeleteClause {
            detach: true,
            items: vec![Expression::variable("n")],
        };
        let stmts = translate_delete(&mut ctx, &delete).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].sql.starts_with("DELETE FROM edges WHERE source_id ="));
        assert!(stmts[1].sql.starts_with("DELETE FROM nodes WHERE id ="));
    }

    #[test]
    fn set_merge_map_uses_json_patch() {
        let mut ctx = TranslationContext::default();
        translate_create(
            &mut ctx,
            &CreateClause {
                patterns: vec![PathPattern::node(named_node("n", &[], &[]))],
            },
        )
        .unwrap();
        let clause = SetClause {
            items: vec![SetItem::MergeMap {
                variable: "n".to_string(),
                value: Expression::Map(vec![
                    ("age".to_string(), Expression::integer(40)),
                    (
                        "old".to_string(),
                        Expression::Literal(crate::cypher_ast::ast::Literal::Null),
                    ),
                ]),
            }],
        };
        let stmts = translate_set(&mut ctx, &clause).unwrap();
        let sql = &stmts[0].sql;
        assert!(sql.contains("json_remove(json_patch(properties, "), "sql: {}", sql);
        assert!(sql.contains(", '$.old')"), "sql: {}", sql);
    }
}
