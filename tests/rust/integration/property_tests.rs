//! Cross-cutting guarantees of the emitted SQL.

use crate::helpers::*;
use litegraph::cypher_ast::ast::*;
use serde_json::json;

fn chain(names: &[&str], types: &[&str]) -> Vec<RelationshipPattern> {
    let nodes: Vec<NodeRef> = names.iter().map(|n| node_ref(node(n, &[], vec![]))).collect();
    types
        .iter()
        .enumerate()
        .map(|(i, t)| RelationshipPattern {
            source: nodes[i].clone(),
            edge: edge(&[*t], Direction::Right),
            target: nodes[i + 1].clone(),
        })
        .collect()
}

#[test]
fn placeholder_parameter_parity_across_query_shapes() {
    // A query with parameters in several positions, including a duplicated
    // subexpression via a string predicate.
    let translation = run_with_params(
        vec![
            Clause::Match(MatchClause {
                patterns: vec![PathPattern::node(node(
                    "n",
                    &["Person"],
                    vec![("city", Expression::Parameter("city".to_string()))],
                ))],
                where_clause: Some(WhereCondition::StringOp {
                    op: StringOp::Contains,
                    left: Expression::property("n", "name"),
                    right: Expression::Parameter("needle".to_string()),
                }),
            }),
            return_items(vec![(Expression::property("n", "name"), "name")]),
        ],
        vec![("city", json!("Oslo")), ("needle", json!("li"))],
    )
    .unwrap();
    assert_placeholder_parity(&translation);

    let stmt = &translation.statements[0];
    // The CONTAINS guard reads both operands twice; the needle parameter
    // must appear once per textual occurrence.
    let needle_count = stmt.params.iter().filter(|p| **p == json!("li")).count();
    assert!(needle_count >= 2, "params: {:?}", stmt.params);
}

#[test]
fn connected_edges_get_pairwise_uniqueness() {
    // MATCH (a)-[e1:R]->(b)-[e2:R]->(c) RETURN a
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(chain(
            &["a", "b", "c"],
            &["R", "R"],
        ))]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains(".id <> "),
        "expected an edge-id inequality: {}",
        stmt.sql
    );
}

#[test]
fn three_edge_chain_gets_three_inequalities() {
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(chain(
            &["a", "b", "c", "d"],
            &["R", "R", "R"],
        ))]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    let count = stmt.sql.matches(".id <> ").count();
    assert!(count >= 3, "expected 3 pairwise constraints, got {}: {}", count, stmt.sql);
}

#[test]
fn disconnected_patterns_skip_uniqueness() {
    // MATCH (a)-[:R]->(b) MATCH (c)-[:R]->(d): separate components.
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(chain(&["a", "b"], &["R"]))]),
        match_clause(vec![PathPattern::connected(chain(&["c", "d"], &["R"]))]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        !stmt.sql.contains(".id <> "),
        "disconnected edges need no uniqueness constraint: {}",
        stmt.sql
    );
}

#[test]
fn optional_edges_get_null_tolerant_uniqueness() {
    // OPTIONAL MATCH (a)-[:R]->(b)-[:R]->(c)
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("a", &[], vec![]))]),
        optional_match(vec![PathPattern::connected(chain(
            &["a", "b", "c"],
            &["R", "R"],
        ))]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains(".id IS NULL OR "),
        "optional uniqueness must tolerate NULL edges: {}",
        stmt.sql
    );
}

#[test]
fn impossible_hop_range_produces_zero_rows() {
    // MATCH (a)-[*3..1]->(b) RETURN b
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&[], Direction::Right), b);
    rel.edge.var_length = Some(VarLengthSpec {
        min_hops: Some(3),
        max_hops: Some(1),
    });
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("b"), "b")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains("WHERE 0"), "sql: {}", stmt.sql);
}

#[test]
fn unbounded_hops_have_no_depth_guard() {
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&["R"], Direction::Right), b);
    rel.edge.var_length = Some(VarLengthSpec::unbounded());
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("b"), "b")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(!stmt.sql.contains("p.depth <"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql.contains("json_each(p.edge_ids)"),
        "visited-edge guard still applies: {}",
        stmt.sql
    );
}

#[test]
fn minimum_depth_is_enforced_for_multi_hop_floors() {
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&["R"], Direction::Right), b);
    rel.edge.var_length = Some(VarLengthSpec::range(2, 4));
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("b"), "b")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains("path_0.depth >= 2"),
        "sql: {}",
        stmt.sql
    );
}

#[test]
fn bound_edges_are_excluded_from_path_traversal() {
    // MATCH (a)-[e:R]->(b) MATCH (a)-[*1..2]->(c) RETURN c
    let a1 = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut first = hop(a1, edge(&["R"], Direction::Right), b);
    first.edge.variable = Some("e".to_string());

    let a2 = node_ref(node("a", &[], vec![]));
    let c = node_ref(node("c", &[], vec![]));
    let mut second = hop(a2, edge(&[], Direction::Right), c);
    second.edge.var_length = Some(VarLengthSpec::range(1, 2));

    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![first])]),
        match_clause(vec![PathPattern::connected(vec![second])]),
        return_items(vec![(Expression::variable("c"), "c")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains(
            "NOT EXISTS (SELECT 1 FROM json_each(path_0.edge_ids) WHERE json_extract(value, '$.id') = e2.id)"
        ),
        "sql: {}",
        stmt.sql
    );
}

#[test]
fn projected_nodes_carry_the_identity_key() {
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        return_items(vec![(Expression::variable("n"), "n")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("json_set(n0.properties, '$._nf_id', n0.id)"),
        "sql: {}",
        stmt.sql
    );
}

#[test]
fn distinct_on_entities_distinguishes_by_identity() {
    // RETURN DISTINCT n: the _nf_id key makes two property-equal nodes
    // distinct rows.
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Return(ProjectionClause {
            distinct: true,
            items: vec![ProjectionItem {
                expression: Expression::variable("n"),
                alias: Some("n".to_string()),
            }],
            ..Default::default()
        }),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(stmt.sql.starts_with("SELECT DISTINCT json_set("), "sql: {}", stmt.sql);
}
