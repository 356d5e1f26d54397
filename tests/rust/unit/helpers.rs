//! Shared AST construction helpers for the test suites.

#![allow(dead_code)]

use litegraph::cypher_ast::ast::*;
use litegraph::{translate, Translation, TranslatorError};
use serde_json::{Map, Value};

pub fn node(variable: &str, labels: &[&str], properties: Vec<(&str, Expression)>) -> NodePattern {
    NodePattern {
        variable: if variable.is_empty() {
            None
        } else {
            Some(variable.to_string())
        },
        labels: labels.iter().map(|l| l.to_string()).collect(),
        properties: properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

pub fn edge(types: &[&str], direction: Direction) -> EdgePattern {
    EdgePattern {
        types: types.iter().map(|t| t.to_string()).collect(),
        direction,
        ..Default::default()
    }
}

pub fn hop(source: NodeRef, edge: EdgePattern, target: NodeRef) -> RelationshipPattern {
    RelationshipPattern {
        source,
        edge,
        target,
    }
}

pub fn match_clause(patterns: Vec<PathPattern>) -> Clause {
    Clause::Match(MatchClause {
        patterns,
        where_clause: None,
    })
}

pub fn optional_match(patterns: Vec<PathPattern>) -> Clause {
    Clause::OptionalMatch(MatchClause {
        patterns,
        where_clause: None,
    })
}

pub fn return_items(items: Vec<(Expression, &str)>) -> Clause {
    Clause::Return(ProjectionClause {
        items: items
            .into_iter()
            .map(|(expression, alias)| ProjectionItem {
                expression,
                alias: Some(alias.to_string()),
            })
            .collect(),
        ..Default::default()
    })
}

pub fn with_items(items: Vec<(Expression, &str)>) -> ProjectionClause {
    ProjectionClause {
        items: items
            .into_iter()
            .map(|(expression, alias)| ProjectionItem {
                expression,
                alias: Some(alias.to_string()),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn run(clauses: Vec<Clause>) -> Result<Translation, TranslatorError> {
    translate(&Query { clauses }, &Map::new())
}

pub fn run_with_params(
    clauses: Vec<Clause>,
    params: Vec<(&str, Value)>,
) -> Result<Translation, TranslatorError> {
    let mut map = Map::new();
    for (k, v) in params {
        map.insert(k.to_string(), v);
    }
    translate(&Query { clauses }, &map)
}

/// Every statement keeps its `?` count equal to its parameter count.
pub fn assert_placeholder_parity(translation: &Translation) {
    for statement in &translation.statements {
        assert_eq!(
            statement.sql.matches('?').count(),
            statement.params.len(),
            "placeholder/parameter drift in: {}",
            statement.sql
        );
    }
}
