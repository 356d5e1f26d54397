//! Translation-time validation: the errors a query must hit before any SQL
//! is produced.

use crate::helpers::*;
use litegraph::cypher_ast::ast::*;
use litegraph::TranslatorError;
use serde_json::json;

#[test]
fn duplicate_return_columns_are_rejected() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        return_items(vec![
            (Expression::property("n", "name"), "x"),
            (Expression::property("n", "age"), "x"),
        ]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::SyntaxError(m) if m.contains("duplicate")));
}

#[test]
fn unknown_variable_in_return_is_rejected() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        return_items(vec![(Expression::property("ghost", "name"), "name")]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::UnknownVariable(v) if v == "ghost"));
}

#[test]
fn order_by_under_distinct_must_reference_returned_columns() {
    // RETURN DISTINCT n.name AS name ORDER BY n.age - n is not returned.
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Return(ProjectionClause {
            distinct: true,
            items: vec![ProjectionItem {
                expression: Expression::property("n", "name"),
                alias: Some("name".to_string()),
            }],
            order_by: vec![OrderByItem {
                expression: Expression::property("n", "age"),
                descending: false,
            }],
            ..Default::default()
        }),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::SyntaxError(_)));
}

#[test]
fn order_by_property_of_returned_variable_is_allowed_under_distinct() {
    // RETURN DISTINCT n ORDER BY n.age - n itself is returned.
    let translation = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Return(ProjectionClause {
            distinct: true,
            items: vec![ProjectionItem {
                expression: Expression::variable("n"),
                alias: Some("n".to_string()),
            }],
            order_by: vec![OrderByItem {
                expression: Expression::property("n", "age"),
                descending: true,
            }],
            ..Default::default()
        }),
    ])
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(stmt.sql.starts_with("SELECT DISTINCT"), "sql: {}", stmt.sql);
    assert!(
        stmt.sql
            .contains("ORDER BY json_extract(n0.properties, '$.age') DESC"),
        "sql: {}",
        stmt.sql
    );
}

#[test]
fn order_by_under_aggregation_must_be_projected_or_aggregate() {
    // RETURN count(*) AS c ORDER BY n.name
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Return(ProjectionClause {
            items: vec![ProjectionItem {
                expression: Expression::FunctionCall(FunctionCall::new("count", vec![])),
                alias: Some("c".to_string()),
            }],
            order_by: vec![OrderByItem {
                expression: Expression::property("n", "name"),
                descending: false,
            }],
            ..Default::default()
        }),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::SyntaxError(_)));
}

#[test]
fn negative_limit_is_rejected() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::Return(ProjectionClause {
            items: vec![ProjectionItem {
                expression: Expression::variable("n"),
                alias: Some("n".to_string()),
            }],
            limit: Some(Expression::Unary {
                op: UnaryOp::Minus,
                operand: Box::new(Expression::integer(1)),
            }),
            ..Default::default()
        }),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::InvalidArgument(_)));
}

#[test]
fn negative_skip_in_with_is_rejected() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::With(ProjectionClause {
            items: vec![ProjectionItem {
                expression: Expression::variable("n"),
                alias: None,
            }],
            skip: Some(Expression::integer(-2)),
            ..Default::default()
        }),
        return_items(vec![(Expression::variable("n"), "n")]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::InvalidArgument(_)));
}

#[test]
fn limit_accepts_a_parameter() {
    let translation = run_with_params(
        vec![
            match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
            Clause::Return(ProjectionClause {
                items: vec![ProjectionItem {
                    expression: Expression::variable("n"),
                    alias: Some("n".to_string()),
                }],
                limit: Some(Expression::Parameter("max".to_string())),
                ..Default::default()
            }),
        ],
        vec![("max", json!(10))],
    )
    .unwrap();
    let stmt = &translation.statements[0];
    assert!(stmt.sql.ends_with("LIMIT ?"), "sql: {}", stmt.sql);
    assert_eq!(stmt.params.last(), Some(&json!(10)));
}

#[test]
fn rebinding_a_node_variable_as_an_edge_is_rejected() {
    let a = node_ref(node("a", &[], vec![]));
    let b = node_ref(node("b", &[], vec![]));
    let mut rel = hop(a, edge(&["R"], Direction::Right), b);
    // The edge variable collides with the source node variable.
    rel.edge.variable = Some("a".to_string());
    let err = run(vec![
        match_clause(vec![PathPattern::connected(vec![rel])]),
        return_items(vec![(Expression::variable("a"), "a")]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::VariableAlreadyBound(v) if v == "a"));
}

#[test]
fn merge_with_multiple_patterns_is_unsupported() {
    let err = run(vec![Clause::Merge(MergeClause {
        patterns: vec![
            PathPattern::node(node("a", &[], vec![])),
            PathPattern::node(node("b", &[], vec![])),
        ],
    })])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::UnsupportedFeature(_)));
}

#[test]
fn unknown_procedure_is_unsupported() {
    let err = run(vec![Clause::Call(CallClause {
        procedure: "apoc.refactor.everything".to_string(),
        yield_alias: None,
        where_clause: None,
    })])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::UnsupportedFeature(_)));
}

#[test]
fn with_expression_without_alias_is_rejected() {
    let err = run(vec![
        match_clause(vec![PathPattern::node(node("n", &[], vec![]))]),
        Clause::With(ProjectionClause {
            items: vec![ProjectionItem {
                expression: Expression::property("n", "name"),
                alias: None,
            }],
            ..Default::default()
        }),
        return_items(vec![(Expression::integer(1), "one")]),
    ])
    .unwrap_err();
    assert!(matches!(err, TranslatorError::SyntaxError(_)));
}
