//! Projection planning: RETURN (and the effects of preceding WITH clauses)
//! becomes one composite SELECT.
//!
//! The builder consumes everything the earlier clauses stashed in the
//! context - relationship-pattern records, standalone nodes, path records,
//! WITH aliases and modifiers, unwinds, the CALL record - and synthesizes
//! FROM/JOIN topology, uniqueness constraints, grouping, and paging. All
//! SQL text is assembled in final statement order so the parameter list
//! lines up with the `?` placeholders by construction.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::cypher_ast::ast::{
    Direction, Expression, NodePattern, OrderByItem, ProjectionClause, ProjectionItem,
};

use super::context::{NodeRecord, RelPatternRecord, TranslationContext};
use super::errors::TranslatorError;
use super::expression::{self, ExpressionTranslator};
use super::sql_fragment::SqlFragment;
use super::variable_length_cte::VariableLengthCteGenerator;
use super::where_clause::{aggregate_aliases_in_condition, condition_contains_aggregate};
use super::SqlStatement;

#[derive(Debug, Default)]
pub(crate) struct Topology {
    pub ctes: Vec<SqlFragment>,
    pub from_items: Vec<SqlFragment>,
    pub joins: Vec<SqlFragment>,
    pub where_conjuncts: Vec<SqlFragment>,
    pub included: BTreeSet<String>,
}

impl Topology {
    fn has_row_source(&self) -> bool {
        !self.from_items.is_empty() || !self.joins.is_empty()
    }
}

fn node_predicates(
    ctx: &TranslationContext,
    alias: &str,
    pattern: &NodePattern,
) -> Result<Vec<SqlFragment>, TranslatorError> {
    let mut out = Vec::new();
    for label in &pattern.labels {
        let mut frag = SqlFragment::with_table(
            format!("EXISTS (SELECT 1 FROM json_each({}.label) WHERE value = ", alias),
            alias,
        );
        frag.push_parameter(Value::String(label.clone()));
        frag.push(")");
        out.push(frag);
    }
    for (key, value) in &pattern.properties {
        let mut tr = ExpressionTranslator::new(ctx);
        let mut frag = SqlFragment::with_table(
            format!(
                "json_extract({}.properties, '${}') = ",
                alias,
                expression::json_path_segment(key)
            ),
            alias,
        );
        frag.push_fragment(tr.translate_scalar(value)?);
        out.push(frag);
    }
    Ok(out)
}

fn edge_conditions(
    ctx: &TranslationContext,
    alias: &str,
    record: &RelPatternRecord,
) -> Result<Vec<SqlFragment>, TranslatorError> {
    let mut out = Vec::new();
    match record.types.len() {
        0 => {}
        1 => {
            let mut frag = SqlFragment::new(format!("{}.type = ", alias));
            frag.push_parameter(Value::String(record.types[0].clone()));
            out.push(frag);
        }
        _ => {
            let mut frag = SqlFragment::new(format!("{}.type IN (", alias));
            for (i, t) in record.types.iter().enumerate() {
                if i > 0 {
                    frag.push(", ");
                }
                frag.push_parameter(Value::String(t.clone()));
            }
            frag.push(")");
            out.push(frag);
        }
    }
    for (key, value) in &record.edge_properties {
        let mut tr = ExpressionTranslator::new(ctx);
        let mut frag = SqlFragment::new(format!(
            "json_extract({}.properties, '${}') = ",
            alias,
            expression::json_path_segment(key)
        ));
        frag.push_fragment(tr.translate_scalar(value)?);
        out.push(frag);
    }
    Ok(out)
}

/// Labels/properties this pattern adds over what the alias was introduced
/// with (re-binding a bound variable with extra constraints).
fn rebind_extras(ctx: &TranslationContext, alias: &str, pattern: &NodePattern) -> NodePattern {
    let base = ctx.node_meta.get(alias);
    let mut extras = NodePattern::default();
    for label in &pattern.labels {
        let known = base.map(|m| m.pattern.has_label(label)).unwrap_or(false);
        if !known {
            extras.labels.push(label.clone());
        }
    }
    for (key, value) in &pattern.properties {
        let known = base
            .map(|m| m.pattern.properties.iter().any(|(k, _)| k == key))
            .unwrap_or(false);
        if !known {
            extras.properties.push((key.clone(), value.clone()));
        }
    }
    extras
}

struct TopologyBuilder<'a> {
    ctx: &'a TranslationContext,
    topo: Topology,
    predicated: BTreeSet<String>,
    dir_counter: usize,
}

impl<'a> TopologyBuilder<'a> {
    fn new(ctx: &'a TranslationContext) -> Self {
        TopologyBuilder {
            ctx,
            topo: Topology::default(),
            predicated: BTreeSet::new(),
            dir_counter: 0,
        }
    }

    /// Put a node alias into FROM (comma source) with its predicates in
    /// WHERE, once.
    fn ensure_node(
        &mut self,
        alias: &str,
        pattern: Option<&NodePattern>,
    ) -> Result<(), TranslatorError> {
        if !self.topo.included.contains(alias) {
            self.topo
                .from_items
                .push(SqlFragment::new(format!("nodes {}", alias)));
            self.topo.included.insert(alias.to_string());
        }
        if !self.predicated.contains(alias) {
            let meta_pattern = self.ctx.node_meta.get(alias).map(|m| m.pattern.clone());
            let effective = pattern.cloned().or(meta_pattern);
            if let Some(pattern) = effective {
                for pred in node_predicates(self.ctx, alias, &pattern)? {
                    self.topo.where_conjuncts.push(pred);
                }
            }
            self.predicated.insert(alias.to_string());
        } else if let Some(pattern) = pattern {
            let extras = rebind_extras(self.ctx, alias, pattern);
            for pred in node_predicates(self.ctx, alias, &extras)? {
                self.topo.where_conjuncts.push(pred);
            }
        }
        Ok(())
    }

    fn build(mut self) -> Result<Topology, TranslatorError> {
        let records: Vec<RelPatternRecord> =
            self.ctx.all_patterns().into_iter().cloned().collect();
        let nodes: Vec<NodeRecord> = self
            .ctx
            .all_standalone_nodes()
            .into_iter()
            .cloned()
            .collect();

        for node in nodes.iter().filter(|n| !n.optional) {
            self.ensure_node(&node.alias, None)?;
        }

        for record in &records {
            if record.var_length.is_some() {
                self.build_var_length(record)?;
            } else if !record.edge_is_new {
                self.build_bound_edge(record)?;
            } else if record.optional {
                self.build_optional_hop(record)?;
            } else {
                self.build_required_hop(record)?;
            }
        }

        self.build_edge_uniqueness(&records);
        self.build_var_length_exclusions(&records);

        for node in nodes.iter().filter(|n| n.optional) {
            let mut on = SqlFragment::new("1=1");
            if let Some(meta) = self.ctx.node_meta.get(&node.alias) {
                for pred in node_predicates(self.ctx, &node.alias, &meta.pattern)? {
                    on.push(" AND ");
                    on.push_fragment(pred);
                }
            }
            if let Some(cond) = &node.optional_where {
                let mut tr = ExpressionTranslator::new(self.ctx);
                on.push(" AND ");
                on.push_fragment(tr.translate_condition(cond)?);
            }
            let mut join = SqlFragment::new(format!("LEFT JOIN nodes {} ON ", node.alias));
            join.push_fragment(on);
            self.topo.joins.push(join);
            self.topo.included.insert(node.alias.clone());
            self.predicated.insert(node.alias.clone());
        }

        for unwind in self.ctx.unwinds.iter().filter(|u| !u.consumed) {
            let mut tr = ExpressionTranslator::new(self.ctx);
            let expr = tr.translate_scalar(&unwind.expression)?;
            if self.topo.has_row_source() {
                let mut join = SqlFragment::new("CROSS JOIN json_each(");
                join.push_fragment(expr);
                join.push(&format!(") AS {}", unwind.alias));
                self.topo.joins.push(join);
            } else {
                let mut item = SqlFragment::new("json_each(");
                item.push_fragment(expr);
                item.push(&format!(") AS {}", unwind.alias));
                self.topo.from_items.push(item);
            }
            self.topo.included.insert(unwind.alias.clone());
        }

        if let Some(call) = &self.ctx.call {
            self.topo
                .from_items
                .push(SqlFragment::new(call.from_sql.clone()));
            self.topo
                .where_conjuncts
                .push(SqlFragment::new(format!("{} <> ''", call.column_sql)));
            if let Some(cond) = &call.where_clause {
                let mut tr = ExpressionTranslator::new(self.ctx);
                let translated = tr.translate_condition(cond)?;
                self.topo.where_conjuncts.push(translated);
            }
        }

        Ok(self.topo)
    }

    fn build_required_hop(&mut self, record: &RelPatternRecord) -> Result<(), TranslatorError> {
        self.ensure_node(&record.source_alias, Some(&record.source_pattern))?;
        self.topo
            .from_items
            .push(SqlFragment::new(format!("edges {}", record.edge_alias)));
        self.topo.included.insert(record.edge_alias.clone());
        for cond in edge_conditions(self.ctx, &record.edge_alias, record)? {
            self.topo.where_conjuncts.push(cond);
        }
        self.ensure_node(&record.target_alias, Some(&record.target_pattern))?;

        let (e, s, t) = (
            &record.edge_alias,
            &record.source_alias,
            &record.target_alias,
        );
        match record.direction {
            Direction::Right => {
                self.topo
                    .where_conjuncts
                    .push(SqlFragment::new(format!("{}.source_id = {}.id", e, s)));
                self.topo
                    .where_conjuncts
                    .push(SqlFragment::new(format!("{}.target_id = {}.id", e, t)));
            }
            Direction::Left => {
                self.topo
                    .where_conjuncts
                    .push(SqlFragment::new(format!("{}.source_id = {}.id", e, t)));
                self.topo
                    .where_conjuncts
                    .push(SqlFragment::new(format!("{}.target_id = {}.id", e, s)));
            }
            Direction::Either => {
                // Row-doubling subquery: each edge row is tried in both
                // orientations, with the duplicate suppressed for
                // self-loops.
                let d = format!("_dir{}", self.dir_counter);
                self.dir_counter += 1;
                self.topo.from_items.push(SqlFragment::new(format!(
                    "(SELECT 1 AS _d UNION ALL SELECT 2 AS _d) {}",
                    d
                )));
                self.topo.where_conjuncts.push(SqlFragment::new(format!(
                    "(({d}._d = 1 AND {e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                     ({d}._d = 2 AND {e}.source_id = {t}.id AND {e}.target_id = {s}.id))",
                    d = d,
                    e = e,
                    s = s,
                    t = t
                )));
                self.topo.where_conjuncts.push(SqlFragment::new(format!(
                    "NOT ({}.id = {}.id AND {}._d = 2)",
                    s, t, d
                )));
            }
        }
        Ok(())
    }

    fn build_optional_hop(&mut self, record: &RelPatternRecord) -> Result<(), TranslatorError> {
        // Bound required aliases referenced by this optional pattern must
        // already be row sources.
        for (alias, is_new) in [
            (&record.source_alias, record.source_is_new),
            (&record.target_alias, record.target_is_new),
        ] {
            if !is_new
                && !self.topo.included.contains(alias)
                && !self.ctx.alias_is_optional(alias)
            {
                self.ensure_node(alias, None)?;
            }
        }

        let src_in = self.topo.included.contains(&record.source_alias);
        let tgt_in = self.topo.included.contains(&record.target_alias);
        let (e, s, t) = (
            &record.edge_alias,
            &record.source_alias,
            &record.target_alias,
        );

        let mut edge_on: Vec<SqlFragment> = Vec::new();
        let mut tail_joins: Vec<SqlFragment> = Vec::new();

        let link = |from: &str, to: &str| SqlFragment::new(format!("{} = {}", from, to));
        match (src_in, tgt_in) {
            // The usual shape: bound source, new (or absent) target.
            (true, false) => {
                match record.direction {
                    Direction::Right => {
                        edge_on.push(link(&format!("{}.source_id", e), &format!("{}.id", s)))
                    }
                    Direction::Left => {
                        edge_on.push(link(&format!("{}.target_id", e), &format!("{}.id", s)))
                    }
                    Direction::Either => edge_on.push(SqlFragment::new(format!(
                        "({e}.source_id = {s}.id OR {e}.target_id = {s}.id)",
                        e = e,
                        s = s
                    ))),
                }
                edge_on.extend(edge_conditions(self.ctx, e, record)?);

                let mut target_on: Vec<SqlFragment> = Vec::new();
                match record.direction {
                    Direction::Right => {
                        target_on.push(link(&format!("{}.target_id", e), &format!("{}.id", t)))
                    }
                    Direction::Left => {
                        target_on.push(link(&format!("{}.source_id", e), &format!("{}.id", t)))
                    }
                    Direction::Either => target_on.push(SqlFragment::new(format!(
                        "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                         ({e}.target_id = {s}.id AND {e}.source_id = {t}.id))",
                        e = e,
                        s = s,
                        t = t
                    ))),
                }
                target_on.extend(node_predicates(self.ctx, t, &record.target_pattern)?);
                let mut join = SqlFragment::new(format!("LEFT JOIN nodes {} ON ", t));
                join.push_fragment(SqlFragment::join(target_on, " AND "));
                tail_joins.push(join);
                self.topo.included.insert(t.clone());
                self.predicated.insert(t.clone());
            }
            // Both endpoints bound: the edge alone is joined; predicates a
            // rebind adds on the bound target ride the ON clause so prior
            // rows survive unmatched.
            (true, true) => {
                match record.direction {
                    Direction::Right => {
                        edge_on.push(link(&format!("{}.source_id", e), &format!("{}.id", s)));
                        edge_on.push(link(&format!("{}.target_id", e), &format!("{}.id", t)));
                    }
                    Direction::Left => {
                        edge_on.push(link(&format!("{}.source_id", e), &format!("{}.id", t)));
                        edge_on.push(link(&format!("{}.target_id", e), &format!("{}.id", s)));
                    }
                    Direction::Either => edge_on.push(SqlFragment::new(format!(
                        "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                         ({e}.source_id = {t}.id AND {e}.target_id = {s}.id))",
                        e = e,
                        s = s,
                        t = t
                    ))),
                }
                edge_on.extend(edge_conditions(self.ctx, e, record)?);
                let extras = rebind_extras(self.ctx, t, &record.target_pattern);
                edge_on.extend(node_predicates(self.ctx, t, &extras)?);
                let source_extras = rebind_extras(self.ctx, s, &record.source_pattern);
                edge_on.extend(node_predicates(self.ctx, s, &source_extras)?);
            }
            // New source with a bound target: key the edge on the target
            // first, then join the source.
            (false, true) => {
                match record.direction {
                    Direction::Right => {
                        edge_on.push(link(&format!("{}.target_id", e), &format!("{}.id", t)))
                    }
                    Direction::Left => {
                        edge_on.push(link(&format!("{}.source_id", e), &format!("{}.id", t)))
                    }
                    Direction::Either => edge_on.push(SqlFragment::new(format!(
                        "({e}.source_id = {t}.id OR {e}.target_id = {t}.id)",
                        e = e,
                        t = t
                    ))),
                }
                edge_on.extend(edge_conditions(self.ctx, e, record)?);

                let mut source_on: Vec<SqlFragment> = Vec::new();
                match record.direction {
                    Direction::Right => {
                        source_on.push(link(&format!("{}.source_id", e), &format!("{}.id", s)))
                    }
                    Direction::Left => {
                        source_on.push(link(&format!("{}.target_id", e), &format!("{}.id", s)))
                    }
                    Direction::Either => source_on.push(SqlFragment::new(format!(
                        "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                         ({e}.target_id = {s}.id AND {e}.source_id = {t}.id))",
                        e = e,
                        s = s,
                        t = t
                    ))),
                }
                source_on.extend(node_predicates(self.ctx, s, &record.source_pattern)?);
                let mut join = SqlFragment::new(format!("LEFT JOIN nodes {} ON ", s));
                join.push_fragment(SqlFragment::join(source_on, " AND "));
                tail_joins.push(join);
                self.topo.included.insert(s.clone());
                self.predicated.insert(s.clone());
            }
            // Fully new optional pattern: chain from a free source join.
            (false, false) => {
                let mut source_on = vec![SqlFragment::new("1=1")];
                source_on.extend(node_predicates(self.ctx, s, &record.source_pattern)?);
                let mut join = SqlFragment::new(format!("LEFT JOIN nodes {} ON ", s));
                join.push_fragment(SqlFragment::join(source_on, " AND "));
                self.topo.joins.push(join);
                self.topo.included.insert(s.clone());
                self.predicated.insert(s.clone());

                match record.direction {
                    Direction::Right => {
                        edge_on.push(link(&format!("{}.source_id", e), &format!("{}.id", s)))
                    }
                    Direction::Left => {
                        edge_on.push(link(&format!("{}.target_id", e), &format!("{}.id", s)))
                    }
                    Direction::Either => edge_on.push(SqlFragment::new(format!(
                        "({e}.source_id = {s}.id OR {e}.target_id = {s}.id)",
                        e = e,
                        s = s
                    ))),
                }
                edge_on.extend(edge_conditions(self.ctx, e, record)?);

                let mut target_on: Vec<SqlFragment> = Vec::new();
                match record.direction {
                    Direction::Right => {
                        target_on.push(link(&format!("{}.target_id", e), &format!("{}.id", t)))
                    }
                    Direction::Left => {
                        target_on.push(link(&format!("{}.source_id", e), &format!("{}.id", t)))
                    }
                    Direction::Either => target_on.push(SqlFragment::new(format!(
                        "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                         ({e}.target_id = {s}.id AND {e}.source_id = {t}.id))",
                        e = e,
                        s = s,
                        t = t
                    ))),
                }
                target_on.extend(node_predicates(self.ctx, t, &record.target_pattern)?);
                let mut join = SqlFragment::new(format!("LEFT JOIN nodes {} ON ", t));
                join.push_fragment(SqlFragment::join(target_on, " AND "));
                tail_joins.push(join);
                self.topo.included.insert(t.clone());
                self.predicated.insert(t.clone());
            }
        }

        let mut edge_join = SqlFragment::new(format!("LEFT JOIN edges {} ON ", e));
        edge_join.push_fragment(SqlFragment::join(edge_on, " AND "));
        self.topo.joins.push(edge_join);
        self.topo.included.insert(e.clone());
        self.topo.joins.extend(tail_joins);

        // The clause's WHERE joins the last ON so it cannot eliminate rows
        // of earlier required matches.
        if let Some(cond) = &record.optional_where {
            let mut tr = ExpressionTranslator::new(self.ctx);
            let translated = tr.translate_condition(cond)?;
            if let Some(last) = self.topo.joins.last_mut() {
                last.push(" AND ");
                last.push_fragment(translated);
            }
        }
        Ok(())
    }

    /// Re-used edge variable: no new join, just endpoint verification
    /// against the original edge alias.
    fn build_bound_edge(&mut self, record: &RelPatternRecord) -> Result<(), TranslatorError> {
        self.ensure_node(&record.source_alias, Some(&record.source_pattern))?;
        self.ensure_node(&record.target_alias, Some(&record.target_pattern))?;
        let (e, s, t) = (
            &record.edge_alias,
            &record.source_alias,
            &record.target_alias,
        );
        let cond = match record.direction {
            Direction::Right => format!(
                "{e}.source_id = {s}.id AND {e}.target_id = {t}.id",
                e = e,
                s = s,
                t = t
            ),
            Direction::Left => format!(
                "{e}.source_id = {t}.id AND {e}.target_id = {s}.id",
                e = e,
                s = s,
                t = t
            ),
            Direction::Either => format!(
                "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                 ({e}.source_id = {t}.id AND {e}.target_id = {s}.id))",
                e = e,
                s = s,
                t = t
            ),
        };
        self.topo.where_conjuncts.push(SqlFragment::new(cond));
        Ok(())
    }

    fn build_var_length(&mut self, record: &RelPatternRecord) -> Result<(), TranslatorError> {
        let spec = record.var_length.expect("checked by caller");
        let min = spec.effective_min_hops();

        // *0..0 degenerates to identity of the two endpoints.
        if min == 0 && spec.max_hops == Some(0) {
            self.ensure_node(&record.source_alias, Some(&record.source_pattern))?;
            self.ensure_node(&record.target_alias, Some(&record.target_pattern))?;
            self.topo.where_conjuncts.push(SqlFragment::new(format!(
                "{}.id = {}.id",
                record.source_alias, record.target_alias
            )));
            return Ok(());
        }

        let cte_name = record
            .path_cte_name
            .clone()
            .unwrap_or_else(|| self.ctx.next_path_cte_name());

        let edge_condition = {
            let conds = edge_conditions(self.ctx, "e", record)?;
            let filtered: Vec<SqlFragment> = conds
                .into_iter()
                .filter(|c| !c.sql.starts_with("e.type"))
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(SqlFragment::join(filtered, " AND "))
            }
        };
        let generator = VariableLengthCteGenerator {
            cte_name: cte_name.clone(),
            direction: record.direction,
            min_hops: spec.min_hops.unwrap_or(1),
            max_hops: spec.max_hops,
            types: record.types.clone(),
            edge_condition,
        };
        self.topo.ctes.push(generator.generate_definition());

        if !record.optional {
            self.ensure_node(&record.source_alias, Some(&record.source_pattern))?;
            self.topo
                .from_items
                .push(SqlFragment::new(cte_name.clone()));
            self.topo.included.insert(cte_name.clone());
            self.ensure_node(&record.target_alias, Some(&record.target_pattern))?;
            self.topo.where_conjuncts.push(SqlFragment::new(format!(
                "{}.id = {}.start_id",
                record.source_alias, cte_name
            )));
            self.topo.where_conjuncts.push(SqlFragment::new(format!(
                "{}.id = {}.end_id",
                record.target_alias, cte_name
            )));
            if min >= 2 {
                self.topo
                    .where_conjuncts
                    .push(SqlFragment::new(format!("{}.depth >= {}", cte_name, min)));
            }
            return Ok(());
        }

        // Optional: LEFT JOIN the CTE; when the end node came bound from a
        // required MATCH, the CTE joins on both endpoints.
        if !record.source_is_new
            && !self.topo.included.contains(&record.source_alias)
            && !self.ctx.alias_is_optional(&record.source_alias)
        {
            self.ensure_node(&record.source_alias, None)?;
        }
        if !self.topo.included.contains(&record.source_alias) {
            // Fully optional start node: free-join it ahead of the CTE.
            let mut source_on = vec![SqlFragment::new("1=1")];
            source_on.extend(node_predicates(
                self.ctx,
                &record.source_alias,
                &record.source_pattern,
            )?);
            let mut join = SqlFragment::new(format!(
                "LEFT JOIN nodes {} ON ",
                record.source_alias
            ));
            join.push_fragment(SqlFragment::join(source_on, " AND "));
            self.topo.joins.push(join);
            self.topo.included.insert(record.source_alias.clone());
            self.predicated.insert(record.source_alias.clone());
        }
        let target_bound = self.topo.included.contains(&record.target_alias);
        let mut on = SqlFragment::new(format!(
            "{}.id = {}.start_id",
            record.source_alias, cte_name
        ));
        if target_bound {
            on.push(&format!(
                " AND {}.id = {}.end_id",
                record.target_alias, cte_name
            ));
        }
        if min >= 2 {
            on.push(&format!(" AND {}.depth >= {}", cte_name, min));
        }
        let mut join = SqlFragment::new(format!("LEFT JOIN {} ON ", cte_name));
        join.push_fragment(on);
        self.topo.joins.push(join);
        self.topo.included.insert(cte_name.clone());

        if !target_bound {
            let mut target_on = vec![SqlFragment::new(format!(
                "{}.end_id = {}.id",
                cte_name, record.target_alias
            ))];
            target_on.extend(node_predicates(
                self.ctx,
                &record.target_alias,
                &record.target_pattern,
            )?);
            let mut join = SqlFragment::new(format!(
                "LEFT JOIN nodes {} ON ",
                record.target_alias
            ));
            join.push_fragment(SqlFragment::join(target_on, " AND "));
            self.topo.joins.push(join);
            self.topo.included.insert(record.target_alias.clone());
            self.predicated.insert(record.target_alias.clone());
        }
        Ok(())
    }

    /// Pattern relationship uniqueness: distinct edge aliases in one
    /// connected component (same optionality, same edge scope) must bind
    /// distinct rows.
    fn build_edge_uniqueness(&mut self, records: &[RelPatternRecord]) {
        let singles: Vec<&RelPatternRecord> = records
            .iter()
            .filter(|r| r.var_length.is_none() && r.edge_is_new)
            .collect();

        let mut groups: HashMap<(bool, u32), Vec<&RelPatternRecord>> = HashMap::new();
        for record in singles {
            groups
                .entry((record.optional, record.edge_scope))
                .or_default()
                .push(record);
        }

        for ((optional, _scope), group) in groups {
            // Union-find over node aliases.
            let mut parent: HashMap<String, String> = HashMap::new();
            fn find(parent: &mut HashMap<String, String>, alias: &str) -> String {
                let p = match parent.get(alias) {
                    Some(p) => p.clone(),
                    None => {
                        parent.insert(alias.to_string(), alias.to_string());
                        return alias.to_string();
                    }
                };
                if p == alias {
                    return p;
                }
                let root = find(parent, &p);
                parent.insert(alias.to_string(), root.clone());
                root
            }
            for record in &group {
                let a = find(&mut parent, &record.source_alias);
                let b = find(&mut parent, &record.target_alias);
                if a != b {
                    parent.insert(a, b);
                }
            }

            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    if group[i].edge_alias == group[j].edge_alias {
                        continue;
                    }
                    let same_component = find(&mut parent, &group[i].source_alias)
                        == find(&mut parent, &group[j].source_alias);
                    if !same_component {
                        continue;
                    }
                    let (a, b) = (&group[i].edge_alias, &group[j].edge_alias);
                    let cond = if optional {
                        format!(
                            "({a}.id IS NULL OR {b}.id IS NULL OR {a}.id <> {b}.id)",
                            a = a,
                            b = b
                        )
                    } else {
                        format!("{}.id <> {}.id", a, b)
                    };
                    log::debug!("edge uniqueness: {}", cond);
                    self.topo.where_conjuncts.push(SqlFragment::new(cond));
                }
            }
        }
    }

    /// Edges bound outside a variable-length pattern must not be
    /// re-traversed by it.
    fn build_var_length_exclusions(&mut self, records: &[RelPatternRecord]) {
        for vlp in records.iter().filter(|r| r.var_length.is_some()) {
            let cte = match &vlp.path_cte_name {
                Some(name) => name.clone(),
                None => continue,
            };
            for edge in records
                .iter()
                .filter(|r| r.var_length.is_none() && r.edge_is_new && r.edge_scope == vlp.edge_scope)
            {
                let guard = format!(
                    "NOT EXISTS (SELECT 1 FROM json_each({}.edge_ids) WHERE json_extract(value, '$.id') = {}.id)",
                    cte, edge.edge_alias
                );
                let cond = if vlp.optional || edge.optional {
                    format!(
                        "({}.edge_ids IS NULL OR {}.id IS NULL OR {})",
                        cte, edge.edge_alias, guard
                    )
                } else {
                    guard
                };
                self.topo.where_conjuncts.push(SqlFragment::new(cond));
            }
        }
    }
}

pub(crate) fn build_topology(ctx: &TranslationContext) -> Result<Topology, TranslatorError> {
    TopologyBuilder::new(ctx).build()
}

/// `SELECT <alias>.id FROM <topology> WHERE ..` - write clauses address
/// match-bound rows through this subquery.
pub(crate) fn entity_id_subquery(
    ctx: &TranslationContext,
    alias: &str,
) -> Result<SqlFragment, TranslatorError> {
    let topo = build_topology(ctx)?;
    let mut sql = SqlFragment::default();
    if !topo.ctes.is_empty() {
        sql.push("WITH RECURSIVE ");
        sql.push_fragment(SqlFragment::join(topo.ctes, ", "));
        sql.push(" ");
    }
    sql.push(&format!("SELECT {}.id FROM ", alias));
    sql.push_fragment(SqlFragment::join(topo.from_items, ", "));
    for join in topo.joins {
        sql.push(" ");
        sql.push_fragment(join);
    }
    let mut wheres = topo.where_conjuncts;
    for cond in &ctx.match_where {
        let mut tr = ExpressionTranslator::new(ctx);
        wheres.push(tr.translate_condition(cond)?);
    }
    if !wheres.is_empty() {
        sql.push(" WHERE ");
        sql.push_fragment(SqlFragment::join(wheres, " AND "));
    }
    Ok(sql)
}

struct ResolvedItem {
    name: String,
    expression: Expression,
    is_aggregate: bool,
    has_pattern_comprehension: bool,
}

fn expand_items(
    ctx: &TranslationContext,
    proj: &ProjectionClause,
) -> Result<Vec<ResolvedItem>, TranslatorError> {
    let mut items: Vec<ProjectionItem> = Vec::new();
    if proj.star {
        for (name, _) in ctx.current_with_aliases() {
            items.push(ProjectionItem {
                expression: Expression::Variable(name.clone()),
                alias: Some(name.clone()),
            });
        }
        for name in ctx.variables_in_order() {
            if ctx
                .current_with_aliases()
                .iter()
                .any(|(alias, _)| *alias == name)
            {
                continue;
            }
            items.push(ProjectionItem {
                expression: Expression::Variable(name.clone()),
                alias: Some(name.clone()),
            });
        }
        if items.is_empty() && proj.items.is_empty() {
            return Err(TranslatorError::syntax(
                "RETURN * requires variables in scope",
            ));
        }
    }
    items.extend(proj.items.iter().cloned());

    let mut resolved = Vec::new();
    let mut seen = BTreeSet::new();
    for item in items {
        let name = match (&item.alias, &item.expression) {
            (Some(alias), _) => alias.clone(),
            (None, Expression::Variable(name)) => name.clone(),
            (None, Expression::Property { base, key }) => format!("{}.{}", base, key),
            _ => {
                return Err(TranslatorError::syntax(
                    "projection expressions require an AS alias",
                ))
            }
        };
        if !seen.insert(name.clone()) {
            return Err(TranslatorError::syntax(format!(
                "duplicate column name '{}'",
                name
            )));
        }
        let tr = ExpressionTranslator::new(ctx);
        resolved.push(ResolvedItem {
            is_aggregate: tr.contains_aggregate(&item.expression),
            has_pattern_comprehension: has_pattern_comprehension(&item.expression),
            name,
            expression: item.expression,
        });
    }
    Ok(resolved)
}

fn has_pattern_comprehension(expr: &Expression) -> bool {
    match expr {
        Expression::PatternComprehension(_) => true,
        Expression::FunctionCall(call) => call.args.iter().any(has_pattern_comprehension),
        Expression::Binary { left, right, .. } | Expression::Comparison { left, right, .. } => {
            has_pattern_comprehension(left) || has_pattern_comprehension(right)
        }
        Expression::Unary { operand, .. } => has_pattern_comprehension(operand),
        Expression::List(items) => items.iter().any(has_pattern_comprehension),
        Expression::Map(entries) => entries.iter().any(|(_, v)| has_pattern_comprehension(v)),
        _ => false,
    }
}

fn validate_order_by(
    ctx: &TranslationContext,
    proj: &ProjectionClause,
    items: &[ResolvedItem],
    order_by: &[OrderByItem],
) -> Result<(), TranslatorError> {
    let any_aggregate = items.iter().any(|i| i.is_aggregate);
    if !proj.distinct && !any_aggregate {
        return Ok(());
    }
    for order in order_by {
        let by_alias = matches!(
            &order.expression,
            Expression::Variable(name) if items.iter().any(|i| i.name == *name)
        );
        let structural = items.iter().any(|i| i.expression == order.expression);
        if by_alias || structural {
            continue;
        }
        if proj.distinct && !any_aggregate {
            // Properties of returned variables stay addressable.
            if let Expression::Property { base, .. } = &order.expression {
                let returned = items
                    .iter()
                    .any(|i| matches!(&i.expression, Expression::Variable(v) if v == base));
                if returned {
                    continue;
                }
            }
            return Err(TranslatorError::syntax(
                "ORDER BY with DISTINCT may only reference returned columns or their properties",
            ));
        }
        let tr = ExpressionTranslator::new(ctx);
        if tr.contains_aggregate(&order.expression) {
            continue;
        }
        return Err(TranslatorError::syntax(
            "ORDER BY with aggregation may only reference projected expressions or aggregates",
        ));
    }
    Ok(())
}

pub(crate) fn page_fragment(
    ctx: &TranslationContext,
    expr: &Expression,
    what: &str,
) -> Result<SqlFragment, TranslatorError> {
    let tr = ExpressionTranslator::new(ctx);
    let value = tr
        .constant_value(expr)
        .ok_or_else(|| {
            TranslatorError::invalid_argument(format!("{} requires an integer or parameter", what))
        })?;
    let n = value.as_i64().ok_or_else(|| {
        TranslatorError::invalid_argument(format!("{} must be an integer", what))
    })?;
    if n < 0 {
        return Err(TranslatorError::invalid_argument(format!(
            "{} must not be negative",
            what
        )));
    }
    Ok(SqlFragment::parameter(Value::from(n)))
}

/// RETURN synthesis - the terminal step of a read query.
pub fn build_select(
    ctx: &mut TranslationContext,
    proj: &ProjectionClause,
) -> Result<(SqlStatement, Vec<String>), TranslatorError> {
    // Step 3: list predicates over WITH aggregate aliases force the
    // __aggregates__ CTE.
    let mut materialized = Vec::new();
    for item in &proj.items {
        expression::aggregate_aliases_in_list_predicates(ctx, &item.expression, &mut materialized);
    }
    for cond in &ctx.with_where {
        aggregate_aliases_in_condition(ctx, cond, &mut materialized);
    }
    if let Some(cond) = &proj.where_clause {
        aggregate_aliases_in_condition(ctx, cond, &mut materialized);
    }
    ctx.materialized_aggregates = materialized;

    let items = expand_items(ctx, proj)?;
    if items.is_empty() {
        return Err(TranslatorError::syntax("RETURN requires at least one item"));
    }
    validate_order_by(ctx, proj, &items, &proj.order_by)?;

    if !ctx.materialized_aggregates.is_empty() {
        return build_select_with_aggregates_cte(ctx, proj, items);
    }

    let all_aggregate = items.iter().all(|i| i.is_aggregate);
    let any_aggregate = items.iter().any(|i| i.is_aggregate);
    let wrap_with_subquery = ctx
        .with_modifiers
        .as_ref()
        .map(|m| m.limits_rows())
        .unwrap_or(false)
        && all_aggregate;

    let topo = build_topology(ctx)?;

    // Partition accumulated WITH WHERE into row filters and HAVING.
    let mut where_conjuncts = topo.where_conjuncts.clone();
    let mut having: Vec<SqlFragment> = Vec::new();
    {
        let match_where = ctx.match_where.clone();
        for cond in &match_where {
            let mut tr = ExpressionTranslator::new(ctx);
            where_conjuncts.push(tr.translate_condition(cond)?);
        }
        let with_where = ctx.with_where.clone();
        for cond in &with_where {
            let mut tr = ExpressionTranslator::new(ctx);
            let translated = tr.translate_condition(cond)?;
            if condition_contains_aggregate(ctx, cond) {
                having.push(translated);
            } else {
                where_conjuncts.push(translated);
            }
        }
        if let Some(cond) = &proj.where_clause {
            let mut tr = ExpressionTranslator::new(ctx);
            let translated = tr.translate_condition(cond)?;
            if condition_contains_aggregate(ctx, cond) {
                having.push(translated);
            } else {
                where_conjuncts.push(translated);
            }
        }
    }

    let mut sql = SqlFragment::default();
    if !topo.ctes.is_empty() {
        sql.push("WITH RECURSIVE ");
        sql.push_fragment(SqlFragment::join(topo.ctes.clone(), ", "));
        sql.push(" ");
    }
    sql.push("SELECT ");
    let inherited_distinct = ctx
        .with_modifiers
        .as_ref()
        .map(|m| m.distinct)
        .unwrap_or(false);
    if (proj.distinct || inherited_distinct) && !wrap_with_subquery {
        sql.push("DISTINCT ");
    }

    // When aggregation runs over a row-limited WITH, the modifiers apply to
    // raw rows inside a subquery; the outer query only aggregates.
    let consumed_with_modifiers = wrap_with_subquery;
    if wrap_with_subquery {
        let modifiers = ctx.with_modifiers.clone().unwrap_or_default();
        let mut inner = SqlFragment::new("SELECT ");
        if modifiers.distinct {
            inner.push("DISTINCT ");
        }
        inner.push("* FROM ");
        inner.push_fragment(SqlFragment::join(topo.from_items.clone(), ", "));
        for join in &topo.joins {
            inner.push(" ");
            inner.push_fragment(join.clone());
        }
        if !where_conjuncts.is_empty() {
            inner.push(" WHERE ");
            inner.push_fragment(SqlFragment::join(where_conjuncts.clone(), " AND "));
        }
        if !modifiers.order_by.is_empty() {
            inner.push(" ORDER BY ");
            for (i, item) in modifiers.order_by.iter().enumerate() {
                if i > 0 {
                    inner.push(", ");
                }
                let mut tr = ExpressionTranslator::new(ctx);
                inner.push_fragment(tr.translate_scalar(&item.expression)?);
                if item.descending {
                    inner.push(" DESC");
                }
            }
        }
        match (&modifiers.limit, &modifiers.skip) {
            (Some(limit), Some(skip)) => {
                inner.push(" LIMIT ");
                inner.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
                inner.push(" OFFSET ");
                inner.push_fragment(page_fragment(ctx, skip, "SKIP")?);
            }
            (Some(limit), None) => {
                inner.push(" LIMIT ");
                inner.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
            }
            (None, Some(skip)) => {
                inner.push(" LIMIT -1 OFFSET ");
                inner.push_fragment(page_fragment(ctx, skip, "SKIP")?);
            }
            (None, None) => {}
        }

        // Variables now resolve against the wrapped row source.
        for variable in ctx.variables.values_mut() {
            if topo.included.contains(&variable.alias) {
                variable.alias = "__with_subquery__".to_string();
            }
        }

        let mut select_parts = Vec::new();
        for item in &items {
            let mut tr = ExpressionTranslator::new(ctx);
            let mut frag = tr.translate_value(&item.expression)?;
            frag.push(&format!(" AS \"{}\"", item.name));
            select_parts.push(frag);
        }
        sql.push_fragment(SqlFragment::join(select_parts, ", "));
        sql.push(" FROM (");
        sql.push_fragment(inner);
        sql.push(") __with_subquery__");
    } else {
        let mut select_parts = Vec::new();
        let mut group_keys: Vec<SqlFragment> = Vec::new();
        for item in &items {
            let mut tr = ExpressionTranslator::new(ctx);
            let mut frag = tr.translate_value(&item.expression)?;
            if any_aggregate && !all_aggregate && !item.is_aggregate {
                if item.has_pattern_comprehension {
                    // Group by the correlated entities' identities, not the
                    // whole subquery text.
                    for table in frag.tables.iter().filter(|t| topo.included.contains(*t)) {
                        let key = format!("{}.id", table);
                        if !group_keys.iter().any(|g| g.sql == key) {
                            group_keys.push(SqlFragment::new(key));
                        }
                    }
                } else {
                    let key = frag.clone();
                    if !group_keys.iter().any(|g| g.sql == key.sql) {
                        group_keys.push(key);
                    }
                }
            }
            frag.push(&format!(" AS \"{}\"", item.name));
            select_parts.push(frag);
        }
        sql.push_fragment(SqlFragment::join(select_parts, ", "));
        if topo.has_row_source() {
            sql.push(" FROM ");
            sql.push_fragment(SqlFragment::join(topo.from_items.clone(), ", "));
            for join in &topo.joins {
                sql.push(" ");
                sql.push_fragment(join.clone());
            }
        }
        if !where_conjuncts.is_empty() {
            sql.push(" WHERE ");
            sql.push_fragment(SqlFragment::join(where_conjuncts, " AND "));
        }
        if !group_keys.is_empty() {
            sql.push(" GROUP BY ");
            sql.push_fragment(SqlFragment::join(group_keys, ", "));
        }
        if !having.is_empty() {
            sql.push(" HAVING ");
            sql.push_fragment(SqlFragment::join(having, " AND "));
        }
    }

    // Step 11: effective modifiers - RETURN's override the WITH's.
    let with_modifiers = if consumed_with_modifiers {
        None
    } else {
        ctx.with_modifiers.clone()
    };
    let effective_order: Vec<OrderByItem> = if !proj.order_by.is_empty() {
        proj.order_by.clone()
    } else if all_aggregate {
        // Row order is meaningless once everything aggregates; a collect()
        // already inherited the WITH ordering inside the aggregate.
        Vec::new()
    } else {
        with_modifiers
            .as_ref()
            .map(|m| m.order_by.clone())
            .unwrap_or_default()
    };
    if !effective_order.is_empty() {
        sql.push(" ORDER BY ");
        for (i, order) in effective_order.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            let alias_match = items.iter().find(|item| {
                item.expression == order.expression
                    || matches!(&order.expression, Expression::Variable(name) if *name == item.name)
            });
            if let Some(item) = alias_match {
                sql.push(&format!("\"{}\"", item.name));
            } else {
                let mut tr = ExpressionTranslator::new(ctx);
                sql.push_fragment(tr.translate_scalar(&order.expression)?);
            }
            if order.descending {
                sql.push(" DESC");
            }
        }
    }
    let effective_limit = proj
        .limit
        .clone()
        .or_else(|| with_modifiers.as_ref().and_then(|m| m.limit.clone()));
    let effective_skip = proj
        .skip
        .clone()
        .or_else(|| with_modifiers.as_ref().and_then(|m| m.skip.clone()));
    match (&effective_limit, &effective_skip) {
        (Some(limit), Some(skip)) => {
            sql.push(" LIMIT ");
            sql.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
            sql.push(" OFFSET ");
            sql.push_fragment(page_fragment(ctx, skip, "SKIP")?);
        }
        (Some(limit), None) => {
            sql.push(" LIMIT ");
            sql.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
        }
        (None, Some(skip)) => {
            sql.push(" LIMIT -1 OFFSET ");
            sql.push_fragment(page_fragment(ctx, skip, "SKIP")?);
        }
        (None, None) => {}
    }

    debug_assert_eq!(sql.placeholder_count(), sql.params.len());
    let columns: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
    Ok((
        SqlStatement {
            sql: sql.sql,
            params: sql.params,
        },
        columns,
    ))
}

/// List predicates against WITH aggregates: materialize those aggregates
/// as a leading CTE and select from it.
fn build_select_with_aggregates_cte(
    ctx: &mut TranslationContext,
    proj: &ProjectionClause,
    items: Vec<ResolvedItem>,
) -> Result<(SqlStatement, Vec<String>), TranslatorError> {
    let topo = build_topology(ctx)?;

    let mut cte = SqlFragment::new("__aggregates__ AS (SELECT ");
    let materialized = ctx.materialized_aggregates.clone();
    // Resolve the alias expressions without the materialized rewrite.
    ctx.materialized_aggregates.clear();
    let mut parts = Vec::new();
    for name in &materialized {
        let (_, expr) = ctx
            .resolve_with_alias(name, usize::MAX)
            .ok_or_else(|| TranslatorError::UnknownVariable(name.clone()))?;
        let expr = expr.clone();
        let mut tr = ExpressionTranslator::new(ctx);
        let mut frag = tr.translate_value(&expr)?;
        frag.push(&format!(" AS \"{}\"", name));
        parts.push(frag);
    }
    ctx.materialized_aggregates = materialized;
    cte.push_fragment(SqlFragment::join(parts, ", "));
    if topo.has_row_source() {
        cte.push(" FROM ");
        cte.push_fragment(SqlFragment::join(topo.from_items.clone(), ", "));
        for join in &topo.joins {
            cte.push(" ");
            cte.push_fragment(join.clone());
        }
    }
    let mut inner_where = topo.where_conjuncts.clone();
    let match_where = ctx.match_where.clone();
    for cond in &match_where {
        let mut tr = ExpressionTranslator::new(ctx);
        inner_where.push(tr.translate_condition(cond)?);
    }
    if !inner_where.is_empty() {
        cte.push(" WHERE ");
        cte.push_fragment(SqlFragment::join(inner_where, " AND "));
    }
    cte.push(")");

    let mut sql = SqlFragment::new("WITH ");
    if !topo.ctes.is_empty() {
        sql = SqlFragment::new("WITH RECURSIVE ");
        sql.push_fragment(SqlFragment::join(topo.ctes.clone(), ", "));
        sql.push(", ");
    }
    sql.push_fragment(cte);
    sql.push(" SELECT ");
    if proj.distinct {
        sql.push("DISTINCT ");
    }
    let mut select_parts = Vec::new();
    for item in &items {
        let mut tr = ExpressionTranslator::new(ctx);
        let mut frag = tr.translate_value(&item.expression)?;
        frag.push(&format!(" AS \"{}\"", item.name));
        select_parts.push(frag);
    }
    sql.push_fragment(SqlFragment::join(select_parts, ", "));
    sql.push(" FROM __aggregates__");

    let mut outer_where = Vec::new();
    let with_where = ctx.with_where.clone();
    for cond in &with_where {
        if condition_contains_aggregate(ctx, cond) {
            let mut tr = ExpressionTranslator::new(ctx);
            outer_where.push(tr.translate_condition(cond)?);
        }
    }
    if let Some(cond) = &proj.where_clause {
        let mut tr = ExpressionTranslator::new(ctx);
        outer_where.push(tr.translate_condition(cond)?);
    }
    if !outer_where.is_empty() {
        sql.push(" WHERE ");
        sql.push_fragment(SqlFragment::join(outer_where, " AND "));
    }

    match (&proj.limit, &proj.skip) {
        (Some(limit), Some(skip)) => {
            sql.push(" LIMIT ");
            sql.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
            sql.push(" OFFSET ");
            sql.push_fragment(page_fragment(ctx, skip, "SKIP")?);
        }
        (Some(limit), None) => {
            sql.push(" LIMIT ");
            sql.push_fragment(page_fragment(ctx, limit, "LIMIT")?);
        }
        (None, Some(skip)) => {
            sql.push(" LIMIT -1 OFFSET ");
            sql.push_fragment(page_fragment(ctx, skip, "SKIP")?);
        }
        (None, None) => {}
    }

    let columns: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
    Ok((
        SqlStatement {
            sql: sql.sql,
            params: sql.params,
        },
        columns,
    ))
}
