//! End-to-end translation scenarios: full queries in, SQL shapes out.

use crate::helpers::*;
use litegraph::cypher_ast::ast::*;
use serde_json::json;

#[test]
fn simple_match_with_label_and_property_filter() {
    // MATCH (n:Person {name: 'Alice'}) RETURN n.age AS age
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node(
            "n",
            &["Person"],
            vec![("name", Expression::string("Alice"))],
        ))]),
        return_items(vec![(Expression::property("n", "age"), "age")]),
    ])
    .unwrap();

    assert_eq!(translation.statements.len(), 1);
    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains("AS \"age\""), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("FROM nodes n0"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql
            .contains("EXISTS (SELECT 1 FROM json_each(n0.label) WHERE value = ?)"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql
            .contains("json_extract(n0.properties, '$.name') = ?"),
        "sql: {}",
        stmt.sql
    );
    assert_eq!(stmt.params, vec![json!("Person"), json!("Alice")]);
    assert_eq!(
        translation.return_columns,
        Some(vec!["age".to_string()])
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn optional_match_keeps_new_target_predicates_in_on() {
    // MATCH (a:A) OPTIONAL MATCH (a)-[:R]->(b:B) RETURN a, b
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &["B"], vec![]));
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("a", &["A"], vec![]))]),
        optional_match(vec![PathPattern::connected(vec![hop(
            a,
            edge(&["R"], Direction::Right),
            b,
        )])]),
        return_items(vec![
            (Expression::variable("a"), "a"),
            (Expression::variable("b"), "b"),
        ]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains("FROM nodes n0"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql
            .contains("LEFT JOIN edges e2 ON e2.source_id = n0.id AND e2.type = ?"),
        "sql: {}",
        stmt.sql
    );
    // The target's label predicate lives in the target join's ON clause.
    assert!(
        stmt.sql.contains(
            "LEFT JOIN nodes n1 ON e2.target_id = n1.id AND EXISTS (SELECT 1 FROM json_each(n1.label) WHERE value = ?)"
        ),
        "sql: {}",
        stmt.sql
    );
    // Top-level WHERE carries only the required node's label.
    let where_part = stmt.sql.rsplit("LEFT JOIN nodes n1").next().unwrap();
    assert!(
        !where_part.contains("WHERE EXISTS (SELECT 1 FROM json_each(n1.label)"),
        "optional label must not filter required rows: {}",
        stmt.sql
    );
    // Text order: edge type, target label, then the required label.
    assert_eq!(stmt.params, vec![json!("R"), json!("B"), json!("A")]);
    assert_placeholder_parity(&translation);
}

#[test]
fn variable_length_path_compiles_to_recursive_cte() {
    // MATCH (a)-[:KNOWS*1..3]->(b) RETURN b
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&["KNOWS"], Direction::Right), b);
    rel.edge.var_length = Some(VarLengthSpec::range(1, 3));
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("b"), "b")]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .starts_with("WITH RECURSIVE path_0(start_id, end_id, depth, edge_ids) AS ("),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains("p.depth < 3"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql.contains(
            "NOT EXISTS (SELECT 1 FROM json_each(p.edge_ids) WHERE json_extract(value, '$.id') = e.id)"
        ),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql.contains("FROM nodes n0, path_0, nodes n1"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql.contains("n0.id = path_0.start_id"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql.contains("n1.id = path_0.end_id"),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn aggregation_after_limited_with_wraps_a_subquery() {
    // MATCH (n) WITH n LIMIT 2 RETURN count(*) AS c
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::With(ProjectionClause {
            items: vec![ProjectionItem {
                expression: Expression::variable("n"),
                alias: None,
            }],
            limit: Some(Expression::integer(2)),
            ..Default::default()
        }),
        return_items(vec![(
            Expression::FunctionCall(FunctionCall::new("count", vec![])),
            "c",
        )]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert_eq!(
        stmt.sql,
        "SELECT COUNT(*) AS \"c\" FROM (SELECT * FROM nodes n0 LIMIT ?) __with_subquery__"
    );
    assert_eq!(stmt.params, vec![json!(2)]);
    assert_placeholder_parity(&translation);
}

#[test]
fn list_predicate_over_with_aggregate_materializes_cte() {
    // MATCH (n) WITH collect(n.age) AS ages RETURN all(x IN ages WHERE x > 0) AS ok
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::With(with_items(vec![(
            Expression::FunctionCall(FunctionCall::new(
                "collect",
                vec![Expression::property("n", "age")],
            )),
            "ages",
        )])),
        return_items(vec![(
            Expression::ListPredicate(ListPredicate {
                kind: ListPredicateKind::All,
                variable: "x".to_string(),
                list: Box::new(Expression::variable("ages")),
                condition: Some(Box::new(WhereCondition::Comparison {
                    op: ComparisonOp::Gt,
                    left: Expression::variable("x"),
                    right: Expression::integer(0),
                })),
            }),
            "ok",
        )]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.starts_with("WITH __aggregates__ AS (SELECT json_group_array("),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains("AS \"ages\""), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("FROM nodes n0"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql.contains("FROM __aggregates__"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql
            .contains("json_each(__aggregates__.\"ages\")"),
        "sql: {}",
        stmt.sql
    );
    // Three-valued ALL: unknown elements push the result to NULL.
    assert!(stmt.sql.contains("THEN NULL ELSE 1 END"), "sql: {}", stmt.sql);
    assert_placeholder_parity(&translation);
}

#[test]
fn pattern_comprehension_is_a_correlated_subquery() {
    // MATCH (a:A) RETURN [(a)-[:T]->(b:B) | b.name] AS names
    let src = node_ref(node("a", &[], vec![]));
    let tgt = node_ref(node("b", &["B"], vec![]));
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("a", &["A"], vec![]))]),
        return_items(vec![(
            Expression::PatternComprehension(PatternComprehension {
                pattern: PathPattern::connected(vec![hop(
                    src,
                    edge(&["T"], Direction::Right),
                    tgt,
                )]),
                where_clause: None,
                projection: Box::new(Expression::property("b", "name")),
            }),
            "names",
        )]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("(SELECT COALESCE(json_group_array("),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains("FROM edges __pc_e_"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("JOIN nodes __pc_t_"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains(".source_id = n0.id"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains(".type = ?"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("json('[]')"), "sql: {}", stmt.sql);
    assert_placeholder_parity(&translation);
}

#[test]
fn undirected_required_match_doubles_directions() {
    // MATCH (a)-[:R]-(b) RETURN a
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![hop(
            a,
            edge(&["R"], Direction::Either),
            b,
        )])]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("(SELECT 1 AS _d UNION ALL SELECT 2 AS _d) _dir0"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql.contains("_dir0._d = 1 AND e2.source_id = n0.id AND e2.target_id = n1.id"),
        "sql: {}",
        stmt.sql
    );
    assert!(
        stmt.sql.contains("NOT (n0.id = n1.id AND _dir0._d = 2)"),
        "self-loop duplicate must be suppressed: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn where_exists_pattern_becomes_correlated_subquery() {
    // MATCH (a) WHERE EXISTS { (a)-[:R]->(:B) } RETURN a
    let src = node_ref(node("a", &[], vec![]));
    let tgt = node_ref(node("", &["B"], vec![]));
    let translation = run(vec![
        Clause::Match(MatchClause {
            patterns: vec![PathPattern::node(node("a", &[], vec![]))],
            where_clause: Some(WhereCondition::Exists {
                pattern: PathPattern::connected(vec![hop(
                    src,
                    edge(&["R"], Direction::Right),
                    tgt,
                )]),
                where_clause: None,
            }),
        }),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains("EXISTS (SELECT 1 FROM edges __pc_e_"),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains(".source_id = n0.id"), "sql: {}", stmt.sql);
    assert_placeholder_parity(&translation);
}

#[test]
fn grouping_keys_are_the_non_aggregate_items() {
    // MATCH (n) RETURN n.city AS city, count(*) AS c
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        return_items(vec![
            (Expression::property("n", "city"), "city"),
            (
                Expression::FunctionCall(FunctionCall::new("count", vec![])),
                "c",
            ),
        ]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("GROUP BY n0.properties -> '$.city'"),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn with_where_on_aggregate_routes_to_having() {
    // MATCH (n) WITH n.city AS city, count(*) AS c WHERE c > 10 RETURN city, c
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::With(ProjectionClause {
            items: vec![
                ProjectionItem {
                    expression: Expression::property("n", "city"),
                    alias: Some("city".to_string()),
                },
                ProjectionItem {
                    expression: Expression::FunctionCall(FunctionCall::new("count", vec![])),
                    alias: Some("c".to_string()),
                },
            ],
            where_clause: Some(WhereCondition::Comparison {
                op: ComparisonOp::Gt,
                left: Expression::variable("c"),
                right: Expression::integer(10),
            }),
            ..Default::default()
        }),
        return_items(vec![
            (Expression::variable("city"), "city"),
            (Expression::variable("c"), "c"),
        ]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains(" GROUP BY "), "sql: {}", stmt.sql);
    assert!(
        stmt.sql.contains(" HAVING cypher_gt(COUNT(*), 10)"),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn path_variable_projects_alternating_sequence() {
    // MATCH p = (a)-[:R]->(b) RETURN p
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let translation = run(vec![
        match_clause(vec![PathPattern {
            variable: Some("p".to_string()),
            element: PatternElement::Connected(vec![hop(
                a,
                edge(&["R"], Direction::Right),
                b,
            )]),
        }]),
        return_items(vec![(Expression::variable("p"), "p")]),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains(
            "json_array(json_set(n0.properties, '$._nf_id', n0.id), json_set(e2.properties, '$._nf_id', e2.id), json_set(n1.properties, '$._nf_id', n1.id))"
        ),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn zero_length_path_degenerates_to_identity() {
    // MATCH (a)-[*0..0]->(b) RETURN a
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&[], Direction::Right), b);
    rel.edge.var_length = Some(VarLengthSpec { min_hops: Some(0), max_hops: Some(0) });
    let translation = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(!stmt.sql.contains("WITH RECURSIVE"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("n0.id = n1.id"), "sql: {}", stmt.sql);
}
