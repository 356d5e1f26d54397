//! Statement-level shapes: write clauses, UNWIND, CALL, parameters.

use crate::helpers::*;
use litegraph::cypher_ast::ast::*;
use litegraph::TranslatorError;
use serde_json::json;

#[test]
fn create_then_return_addresses_row_by_uuid() {
    // CREATE (n:Person {name: 'Alice'}) RETURN n
    let translation = run(vec![
        Clause::Create(CreateClause {
            patterns: vec![PathPattern::node(node(
                "n",
                &["Person"],
                vec![("name", Expression::string("Alice"))],
            ))],
        }),
        return_items(vec![(Expression::variable("n"), "n")]),
    ])
    .unwrap();

    assert_eq!(translation.statements.len(), 2);
    let insert = &translation.statements[0];
    assert!(insert.sql.starts_with("INSERT INTO nodes"));
    let select = &translation.statements[1];
    assert!(
        select
            .sql
            .contains("(SELECT json_set(properties, '$._nf_id', id) FROM nodes WHERE id = ?)"),
        "sql: {}",
        select.sql
    );
    // The SELECT binds the same UUID the INSERT generated.
    assert_eq!(select.params[0], insert.params[0]);
    assert_placeholder_parity(&translation);
}

#[test]
fn create_edge_between_matched_nodes_replays_topology() {
    // MATCH (a:A) MATCH (b:B) CREATE (a)-[:KNOWS]->(b)
    let a = node_ref(node("a", &["A"], vec![]));
    let b = node_ref(node("b", &["B"], vec![]));
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("a", &["A"], vec![]))]),
        match_clause(vec![PathPattern::node(node("b", &["B"], vec![]))]),
        Clause::Create(CreateClause {
            patterns: vec![PathPattern::connected(vec![hop(
                a,
                edge(&["KNOWS"], Direction::Right),
                b,
            )])],
        }),
    ])
    .unwrap();

    assert_eq!(translation.statements.len(), 1);
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .starts_with("INSERT INTO edges (id, type, source_id, target_id, properties) SELECT ?, ?, n0.id, n1.id"),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains("FROM nodes n0, nodes n1"), "sql: {}", stmt.sql);
    assert_placeholder_parity(&translation);
}

#[test]
fn set_property_on_matched_node_uses_id_subselect() {
    // MATCH (n:Person) SET n.age = 42
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &["Person"], vec![]))]),
        Clause::Set(SetClause {
            items: vec![SetItem::Property {
                variable: "n".to_string(),
                key: "age".to_string(),
                value: Expression::integer(42),
            }],
        }),
    ])
    .unwrap();

    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .starts_with("UPDATE nodes SET properties = json_set(properties, '$.age', 42) WHERE id IN (SELECT n0.id FROM nodes n0"),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn set_labels_on_relationship_is_rejected() {
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&["R"], Direction::Right), b);
    rel.edge.variable = Some("e".to_string());
    let err = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        Clause::Set(SetClause {
            items: vec![SetItem::Labels {
                variable: "e".to_string(),
                labels: vec!["Nope".to_string()],
            }],
        }),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::TypeMismatch(_)));
}

#[test]
fn remove_label_filters_label_array() {
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Remove(RemoveClause {
            items: vec![RemoveItem::Labels {
                variable: "n".to_string(),
                labels: vec!["Old".to_string()],
            }],
        }),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql.contains(
            "SET label = (SELECT json_group_array(value) FROM json_each(label) WHERE value NOT IN (?))"
        ),
        "sql: {}",
        stmt.sql
    );
    assert_placeholder_parity(&translation);
}

#[test]
fn write_statements_preserve_clause_order() {
    // CREATE (a) CREATE (b) MATCH.. is not needed; two creates then delete.
    let translation = run(vec![
        Clause::Create(CreateClause {
            patterns: vec![PathPattern::node(node("a", &[], vec![]))],
        }),
        Clause::Create(CreateClause {
            patterns: vec![PathPattern::node(node("b", &[], vec![]))],
        }),
        Clause::Delete(DeleteClause {
            detach: false,
            items: vec![Expression::variable("a")],
        }),
    ])
    .unwrap();
    assert_eq!(translation.statements.len(), 3);
    assert!(translation.statements[0].sql.starts_with("INSERT INTO nodes"));
    assert!(translation.statements[1].sql.starts_with("INSERT INTO nodes"));
    assert!(translation.statements[2].sql.starts_with("DELETE FROM nodes"));
    // The delete addresses the first node's id.
    assert_eq!(
        translation.statements[2].params[0],
        translation.statements[0].params[0]
    );
}

#[test]
fn unwind_joins_json_each() {
    // UNWIND [1, 2, 3] AS x RETURN x
    let translation = run(vec![
        Clause::Unwind(UnwindClause {
            expression: Expression::List(vec![
                Expression::integer(1),
                Expression::integer(2),
                Expression::integer(3),
            ]),
            alias: "x".to_string(),
        }),
        return_items(vec![(Expression::variable("x"), "x")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("FROM json_each(json_array(1, 2, 3)) AS u0"),
        "sql: {}",
        stmt.sql
    );
    assert!(stmt.sql.contains("u0.value AS \"x\""), "sql: {}", stmt.sql);
}

#[test]
fn unwind_of_matched_property_is_a_cross_join() {
    // MATCH (n) UNWIND n.tags AS tag RETURN tag
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Unwind(UnwindClause {
            expression: Expression::property("n", "tags"),
            alias: "tag".to_string(),
        }),
        return_items(vec![(Expression::variable("tag"), "tag")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(
        stmt.sql
            .contains("CROSS JOIN json_each(json_extract(n0.properties, '$.tags')) AS u1"),
        "sql: {}",
        stmt.sql
    );
}

#[test]
fn standalone_call_synthesizes_distinct_select() {
    let translation = run(vec![Clause::Call(CallClause {
        procedure: "db.labels".to_string(),
        yield_alias: None,
        where_clause: None,
    })])
    .unwrap();
    assert_eq!(
        translation.statements[0].sql,
        "SELECT DISTINCT json_each.value AS \"label\" FROM nodes, json_each(nodes.label) WHERE json_each.value <> ''"
    );
    assert_eq!(translation.return_columns, Some(vec!["label".to_string()]));
}

#[test]
fn call_feeding_return_joins_backing_table() {
    // CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType AS t
    let translation = run(vec![
        Clause::Call(CallClause {
            procedure: "db.relationshipTypes".to_string(),
            yield_alias: None,
            where_clause: None,
        }),
        return_items(vec![(Expression::variable("relationshipType"), "t")]),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains("FROM edges"), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("edges.type AS \"t\""), "sql: {}", stmt.sql);
    assert!(stmt.sql.contains("edges.type <> ''"), "sql: {}", stmt.sql);
}

#[test]
fn parameters_resolve_from_the_binding_map() {
    // MATCH (n {name: $who}) RETURN n.name AS name
    let translation = run_with_params(
        vec![
            match_clause(vec![PathPattern::node(node(
                "n",
                &[],
                vec![("name", Expression::Parameter("who".to_string()))],
            ))]),
            return_items(vec![(Expression::property("n", "name"), "name")]),
        ],
        vec![("who", json!("Alice"))],
    )
    .unwrap();
    assert_eq!(translation.statements[0].params, vec![json!("Alice")]);
    assert_placeholder_parity(&translation);
}

#[test]
fn missing_parameter_is_an_error() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node(
            "n",
            &[],
            vec![("name", Expression::Parameter("who".to_string()))],
        ))]),
        return_items(vec![(Expression::variable("n"), "n")]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::UnknownParameter(p) if p == "who"));
}

#[test]
fn union_concatenates_and_checks_columns() {
    let left_return = return_items(vec![(Expression::property("n", "name"), "name")]);
    let right = Query {
        clauses: vec![
            match_clause(vec![PathPattern::node(node("m", &["Org"], vec![]))]),
            return_items(vec![(Expression::property("m", "name"), "name")]),
        ],
    };
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &["Person"], vec![]))]),
        left_return,
        Clause::Union(UnionClause {
            all: true,
            query: right,
        }),
    ])
    .unwrap();
    assert_eq!(translation.statements.len(), 1);
    let stmt = &translation.statements[0];
    assert!(stmt.sql.contains(" UNION ALL "), "sql: {}", stmt.sql);
    // Left label param then right label param.
    assert_eq!(stmt.params, vec![json!("Person"), json!("Org")]);
    assert_placeholder_parity(&translation);
}

#[test]
fn union_with_mismatched_columns_is_rejected() {
    let right = Query {
        clauses: vec![
            match_clause(vec![PathPattern::node(node("m", &[], vec![]))]),
            return_items(vec![(Expression::property("m", "other"), "other")]),
        ],
    };
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        return_items(vec![(Expression::property("n", "name"), "name")]),
        Clause::Union(UnionClause {
            all: false,
            query: right,
        }),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::SyntaxError(_)));
}

#[test]
fn merge_registers_variable_for_return() {
    let translation = run(vec![
        Clause::Merge(MergeClause {
            patterns: vec![PathPattern::node(node(
                "n",
                &["Person"],
                vec![("name", Expression::string("Alice"))],
            ))],
        }),
        return_items(vec![(Expression::property("n", "name"), "name")]),
    ])
    .unwrap();
    assert_eq!(translation.statements.len(), 2);
    assert!(
        translation.statements[0]
            .sql
            .starts_with("INSERT OR IGNORE INTO nodes"),
        "sql: {}",
        translation.statements[0].sql
    );
    assert!(translation.statements[0]
        .sql
        .contains("WHERE NOT EXISTS (SELECT 1 FROM nodes"));
    assert!(translation.statements[1].sql.contains("FROM nodes n0"));
    assert_placeholder_parity(&translation);
}
