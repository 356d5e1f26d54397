//! Recursive CTE generation for variable-length relationships.
//!
//! One emitter covers every combination the planner needs: directed or
//! undirected traversal, `minHops` of 0 or more, bounded or unbounded
//! `maxHops`, and optional type/property filters. The CTE shape is
//!
//! ```text
//! path_N(start_id, end_id, depth, edge_ids) AS (
//!     <base: depth-1 edge rows, or depth-0 self-paths when minHops = 0>
//!     UNION ALL
//!     <step: extend by one edge, tracking visited edges in edge_ids>
//! )
//! ```
//!
//! `edge_ids` is a JSON array of full edge objects, which both prevents
//! edge reuse (`NOT EXISTS` over `json_each`) and backs `relationships(p)`
//! projections without a second lookup.

use crate::cypher_ast::ast::Direction;
use serde_json::Value;

use super::sql_fragment::SqlFragment;

/// The JSON object stored per traversed edge.
const EDGE_OBJECT: &str = "json_object('id', e.id, 'type', e.type, 'source_id', e.source_id, \
                           'target_id', e.target_id, 'properties', json(e.properties))";

#[derive(Debug, Clone)]
pub struct VariableLengthCteGenerator {
    pub cte_name: String,
    pub direction: Direction,
    pub min_hops: u32,
    pub max_hops: Option<u32>,
    pub types: Vec<String>,
    /// Extra edge condition over the alias `e` (property predicates).
    pub edge_condition: Option<SqlFragment>,
}

impl VariableLengthCteGenerator {
    pub fn new(cte_name: String, direction: Direction, min_hops: u32, max_hops: Option<u32>) -> Self {
        VariableLengthCteGenerator {
            cte_name,
            direction,
            min_hops,
            max_hops,
            types: Vec::new(),
            edge_condition: None,
        }
    }

    /// `name(start_id, end_id, depth, edge_ids) AS (body)` - spliced after
    /// `WITH RECURSIVE` by the caller, so several CTEs can share one prefix.
    pub fn generate_definition(&self) -> SqlFragment {
        let mut frag = SqlFragment::new(format!(
            "{}(start_id, end_id, depth, edge_ids) AS (",
            self.cte_name
        ));
        frag.push_fragment(self.generate_body());
        frag.push(")");
        frag
    }

    fn generate_body(&self) -> SqlFragment {
        if let Some(max) = self.max_hops {
            if self.min_hops > max {
                // An impossible range still emits a well-formed CTE; every
                // consumer of the path then sees zero rows.
                return SqlFragment::new(
                    "SELECT NULL AS start_id, NULL AS end_id, NULL AS depth, NULL AS edge_ids WHERE 0",
                );
            }
        }
        let mut frag = self.generate_base();
        frag.push(" UNION ALL ");
        frag.push_fragment(self.generate_step());
        frag
    }

    /// Per-edge type/property filter over the alias `e`.
    fn edge_filter(&self) -> Option<SqlFragment> {
        let mut parts: Vec<SqlFragment> = Vec::new();
        match self.types.len() {
            0 => {}
            1 => {
                let mut frag = SqlFragment::new("e.type = ");
                frag.push_parameter(Value::String(self.types[0].clone()));
                parts.push(frag);
            }
            _ => {
                let mut frag = SqlFragment::new("e.type IN (");
                for (i, t) in self.types.iter().enumerate() {
                    if i > 0 {
                        frag.push(", ");
                    }
                    frag.push_parameter(Value::String(t.clone()));
                }
                frag.push(")");
                parts.push(frag);
            }
        }
        if let Some(cond) = &self.edge_condition {
            parts.push(cond.clone());
        }
        if parts.is_empty() {
            None
        } else {
            Some(SqlFragment::join(parts, " AND "))
        }
    }

    fn generate_base(&self) -> SqlFragment {
        if self.min_hops == 0 {
            // Zero-hop paths seed every node as its own endpoint; the
            // recursive step grows real hops from there.
            return SqlFragment::new(
                "SELECT n.id AS start_id, n.id AS end_id, 0 AS depth, json_array() AS edge_ids FROM nodes n",
            );
        }
        match self.direction {
            Direction::Right => self.base_row("e.source_id", "e.target_id"),
            Direction::Left => self.base_row("e.target_id", "e.source_id"),
            Direction::Either => {
                let mut frag = self.base_row("e.source_id", "e.target_id");
                frag.push(" UNION ALL ");
                frag.push_fragment(self.base_row("e.target_id", "e.source_id"));
                frag
            }
        }
    }

    fn base_row(&self, start: &str, end: &str) -> SqlFragment {
        let mut frag = SqlFragment::new(format!(
            "SELECT {} AS start_id, {} AS end_id, 1 AS depth, json_array({}) AS edge_ids FROM edges e",
            start, end, EDGE_OBJECT
        ));
        if let Some(filter) = self.edge_filter() {
            frag.push(" WHERE ");
            frag.push_fragment(filter);
        }
        frag
    }

    fn generate_step(&self) -> SqlFragment {
        let (join_on, next_end) = match self.direction {
            Direction::Right => ("p.end_id = e.source_id".to_string(), "e.target_id".to_string()),
            Direction::Left => ("p.end_id = e.target_id".to_string(), "e.source_id".to_string()),
            Direction::Either => (
                "(e.source_id = p.end_id OR e.target_id = p.end_id)".to_string(),
                "CASE WHEN e.source_id = p.end_id THEN e.target_id ELSE e.source_id END"
                    .to_string(),
            ),
        };

        let mut frag = SqlFragment::new(format!(
            "SELECT p.start_id, {} AS end_id, p.depth + 1, json_insert(p.edge_ids, '$[#]', {}) FROM {} p JOIN edges e ON {}",
            next_end, EDGE_OBJECT, self.cte_name, join_on
        ));
        frag.push(" WHERE ");
        if let Some(max) = self.max_hops {
            frag.push(&format!("p.depth < {} AND ", max));
        }
        if let Some(filter) = self.edge_filter() {
            frag.push_fragment(filter);
            frag.push(" AND ");
        }
        // No edge appears twice on one path.
        frag.push(
            "NOT EXISTS (SELECT 1 FROM json_each(p.edge_ids) WHERE json_extract(value, '$.id') = e.id)",
        );
        frag
    }
}
