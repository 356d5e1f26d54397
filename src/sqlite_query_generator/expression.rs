//! Expression translation.
//!
//! The walker produces [`SqlFragment`]s - SQL text, bound parameters in
//! left-to-right placeholder order, and the set of table aliases the SQL
//! reads. Two value contexts exist:
//! - `Json`: the result must survive a round-trip through JSON (projection
//!   items, list/map elements, CASE branches). Booleans render as
//!   `json('true')`/`json('false')`, property access uses `->`.
//! - `Scalar`: the result feeds comparisons, arithmetic, or function
//!   arguments. Booleans render as `1`/`0`, property access uses
//!   `json_extract`.
//!
//! Integer literals are inlined (never bound) so SQLite's integer division
//! survives; strings and parameters bind as `?`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::cypher_ast::ast::{
    BinaryOp, CaseWhen, ComparisonOp, Expression, FunctionCall, ListPredicate, ListPredicateKind,
    Literal, StringOp, UnaryOp, WhereCondition,
};

use super::context::{TranslationContext, VariableKind};
use super::errors::TranslatorError;
use super::function_registry::{self, FunctionKind};
use super::sql_fragment::SqlFragment;
use super::temporal::TemporalKind;

/// Compile-time type classification used for operator dispatch, `CASE`
/// type tags, and orderability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticType {
    Integer,
    Float,
    String,
    Boolean,
    Null,
    List,
    Map,
    Node,
    Edge,
    Path,
    Temporal(TemporalKind),
    Duration,
    Unknown,
}

impl StaticType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, StaticType::Integer | StaticType::Float)
    }

    /// Tag string for `cypher_case_eq`.
    pub fn case_tag(&self) -> &'static str {
        match self {
            StaticType::Integer => "integer",
            StaticType::Float => "float",
            StaticType::String => "string",
            StaticType::Boolean => "boolean",
            StaticType::Null => "null",
            StaticType::List => "list",
            StaticType::Map => "map",
            _ => "unknown",
        }
    }

    /// May this expression produce a boolean? AND/OR/NOT/XOR operands are
    /// validated against this (statically non-boolean types are rejected).
    pub fn boolean_compatible(&self) -> bool {
        matches!(
            self,
            StaticType::Boolean | StaticType::Null | StaticType::Unknown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueContext {
    Json,
    Scalar,
}

/// A comprehension-scope binding: Cypher name → SQL value expression
/// (e.g. `__lc__.value`). Entity bindings additionally carry the subquery
/// alias of a node/edge row so property access reads the column directly.
#[derive(Debug, Clone)]
struct LocalBinding {
    name: String,
    value_sql: String,
    table: Option<String>,
    entity_alias: Option<String>,
}

pub struct ExpressionTranslator<'a> {
    pub ctx: &'a TranslationContext,
    locals: Vec<LocalBinding>,
    /// Depth of nested comprehension scopes, for `__lc__`, `__lc__i`, ...
    comprehension_depth: usize,
    /// WITH-alias resolution ceiling; lowered while inlining an alias's
    /// defining expression so `WITH x + 1 AS x` resolves `x` one level down.
    alias_level: usize,
    in_aggregate: bool,
}

impl<'a> ExpressionTranslator<'a> {
    pub fn new(ctx: &'a TranslationContext) -> Self {
        ExpressionTranslator {
            ctx,
            locals: Vec::new(),
            comprehension_depth: 0,
            alias_level: ctx.with_alias_top_level(),
            in_aggregate: false,
        }
    }

    /// JSON value context (projection items, list elements).
    pub fn translate_value(&mut self, expr: &Expression) -> Result<SqlFragment, TranslatorError> {
        self.translate_in(expr, ValueContext::Json)
    }

    /// Scalar context (comparison operands, arithmetic, function args).
    pub fn translate_scalar(&mut self, expr: &Expression) -> Result<SqlFragment, TranslatorError> {
        self.translate_in(expr, ValueContext::Scalar)
    }

    /// Predicate position: scalar booleans (`1`/`0`/`NULL`).
    pub fn translate_predicate_expr(
        &mut self,
        expr: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        self.translate_in(expr, ValueContext::Scalar)
    }

    pub(crate) fn comprehension_alias(&self) -> String {
        format!("__lc__{}", "i".repeat(self.comprehension_depth))
    }

    pub(crate) fn push_local(&mut self, name: &str, value_sql: String, table: Option<String>) {
        self.locals.push(LocalBinding {
            name: name.to_string(),
            value_sql,
            table,
            entity_alias: None,
        });
    }

    /// Bind a pattern-subquery node/edge variable to its subquery alias.
    pub(crate) fn push_entity_local(&mut self, name: &str, alias: &str) {
        self.locals.push(LocalBinding {
            name: name.to_string(),
            value_sql: format!("json_set({a}.properties, '$._nf_id', {a}.id)", a = alias),
            table: None,
            entity_alias: Some(alias.to_string()),
        });
    }

    pub(crate) fn is_in_aggregate(&self) -> bool {
        self.in_aggregate
    }

    pub(crate) fn pop_local(&mut self) {
        self.locals.pop();
    }

    pub(crate) fn enter_comprehension(&mut self) {
        self.comprehension_depth += 1;
    }

    pub(crate) fn exit_comprehension(&mut self) {
        self.comprehension_depth -= 1;
    }

    fn local(&self, name: &str) -> Option<&LocalBinding> {
        self.locals.iter().rev().find(|b| b.name == name)
    }

    // ===== static typing =====

    pub fn static_type(&self, expr: &Expression) -> StaticType {
        match expr {
            Expression::Literal(Literal::Integer(_)) => StaticType::Integer,
            Expression::Literal(Literal::Float(_)) => StaticType::Float,
            Expression::Literal(Literal::String(_)) => StaticType::String,
            Expression::Literal(Literal::Boolean(_)) => StaticType::Boolean,
            Expression::Literal(Literal::Null) => StaticType::Null,
            Expression::Parameter(name) => match self.ctx.params.get(name) {
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => StaticType::Integer,
                Some(Value::Number(_)) => StaticType::Float,
                Some(Value::String(_)) => StaticType::String,
                Some(Value::Bool(_)) => StaticType::Boolean,
                Some(Value::Array(_)) => StaticType::List,
                Some(Value::Object(_)) => StaticType::Map,
                Some(Value::Null) => StaticType::Null,
                None => StaticType::Unknown,
            },
            Expression::Variable(name) => {
                if self.local(name).is_some() {
                    return StaticType::Unknown;
                }
                if let Some((level, aliased)) = self.ctx.resolve_with_alias(name, self.alias_level)
                {
                    return self.static_type_at(aliased, level);
                }
                if self.ctx.find_unwind(name).is_some() {
                    return StaticType::Unknown;
                }
                match self.ctx.lookup_variable(name).map(|v| v.kind) {
                    Some(VariableKind::Node) => StaticType::Node,
                    Some(VariableKind::Edge) => StaticType::Edge,
                    Some(VariableKind::VarLengthEdge) => StaticType::List,
                    Some(VariableKind::Path) => StaticType::Path,
                    None => match self.ctx.created.get(name).map(|c| c.kind) {
                        Some(VariableKind::Node) => StaticType::Node,
                        Some(VariableKind::Edge) => StaticType::Edge,
                        _ => StaticType::Unknown,
                    },
                }
            }
            Expression::Property { .. } | Expression::PropertyAccess { .. } => StaticType::Unknown,
            Expression::FunctionCall(call) => function_registry::lookup(&call.name)
                .map(|spec| spec.result)
                .unwrap_or(StaticType::Unknown),
            Expression::Binary { op, left, right } => match op {
                BinaryOp::Add => {
                    let (lt, rt) = (self.static_type(left), self.static_type(right));
                    if lt == StaticType::List || rt == StaticType::List {
                        StaticType::List
                    } else if lt == StaticType::String || rt == StaticType::String {
                        StaticType::String
                    } else if let StaticType::Temporal(kind) = lt {
                        StaticType::Temporal(kind)
                    } else if lt == StaticType::Integer && rt == StaticType::Integer {
                        StaticType::Integer
                    } else if lt.is_numeric() && rt.is_numeric() {
                        StaticType::Float
                    } else {
                        StaticType::Unknown
                    }
                }
                BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Modulo => {
                    let (lt, rt) = (self.static_type(left), self.static_type(right));
                    if let StaticType::Temporal(kind) = lt {
                        StaticType::Temporal(kind)
                    } else if lt == StaticType::Integer && rt == StaticType::Integer {
                        StaticType::Integer
                    } else if lt.is_numeric() && rt.is_numeric() {
                        StaticType::Float
                    } else {
                        StaticType::Unknown
                    }
                }
                BinaryOp::Divide => {
                    let (lt, rt) = (self.static_type(left), self.static_type(right));
                    if lt == StaticType::Integer && rt == StaticType::Integer {
                        StaticType::Integer
                    } else if lt.is_numeric() && rt.is_numeric() {
                        StaticType::Float
                    } else {
                        StaticType::Unknown
                    }
                }
                BinaryOp::Power => StaticType::Float,
                BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => StaticType::Boolean,
            },
            Expression::Unary { op, .. } => match op {
                UnaryOp::Not => StaticType::Boolean,
                UnaryOp::Minus => StaticType::Unknown,
            },
            Expression::Comparison { .. }
            | Expression::LabelPredicate { .. }
            | Expression::In { .. }
            | Expression::StringOp { .. }
            | Expression::ListPredicate(_) => StaticType::Boolean,
            Expression::Case(case) => case
                .when_then
                .first()
                .map(|(_, then)| self.static_type(then))
                .unwrap_or(StaticType::Unknown),
            Expression::Map(_) => StaticType::Map,
            Expression::List(_) => StaticType::List,
            Expression::ListComprehension(_)
            | Expression::PatternComprehension(_)
            | Expression::Slice { .. } => StaticType::List,
            Expression::Subscript { .. } => StaticType::Unknown,
        }
    }

    fn static_type_at(&self, expr: &Expression, _level: usize) -> StaticType {
        // Alias expressions were validated when the WITH was processed; the
        // ceiling only matters for SQL generation, not for typing.
        self.static_type(expr)
    }

    /// Does this expression (after WITH-alias inlining) contain an
    /// aggregate function call?
    pub fn contains_aggregate(&self, expr: &Expression) -> bool {
        contains_aggregate_inner(self.ctx, expr, self.alias_level)
    }

    // ===== main walker =====

    pub(crate) fn translate_in(
        &mut self,
        expr: &Expression,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        match expr {
            Expression::Literal(lit) => self.translate_literal(lit, vctx),
            Expression::Parameter(name) => {
                let value = self.ctx.param_value(name)?;
                let needs_json = matches!(value, Value::Array(_) | Value::Object(_));
                let mut frag = SqlFragment::default();
                if needs_json {
                    frag.push("json(");
                    frag.push_parameter(Value::String(
                        serde_json::to_string(&value).unwrap_or_default(),
                    ));
                    frag.push(")");
                } else if let Value::Bool(b) = value {
                    return Ok(self.boolean_sql(b, vctx));
                } else {
                    frag.push_parameter(value);
                }
                Ok(frag)
            }
            Expression::Variable(name) => self.translate_variable(name, vctx),
            Expression::Property { base, key } => self.translate_property(base, key, vctx),
            Expression::PropertyAccess { base, keys } => {
                if matches!(
                    self.static_type(base),
                    StaticType::Integer | StaticType::Float | StaticType::Boolean | StaticType::String
                ) {
                    return Err(TranslatorError::malformed(
                        "property access on a value that is not a map",
                    ));
                }
                let inner = self.translate_scalar(base)?;
                let path = keys
                    .iter()
                    .map(|k| json_path_segment(k))
                    .collect::<Vec<_>>()
                    .join("");
                Ok(inner.wrap("json_extract(", &format!(", '${}')", path)))
            }
            Expression::FunctionCall(call) => self.translate_function(call, vctx),
            Expression::Binary { op, left, right } => self.translate_binary(*op, left, right, vctx),
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let operand_type = self.static_type(operand);
                    if !operand_type.boolean_compatible() {
                        return Err(TranslatorError::syntax(format!(
                            "NOT requires a boolean operand, got {:?}",
                            operand_type
                        )));
                    }
                    let inner = self.translate_predicate_expr(operand)?;
                    Ok(self.shape_boolean(inner.wrap("cypher_not(", ")"), vctx))
                }
                UnaryOp::Minus => {
                    let inner = self.translate_scalar(operand)?;
                    Ok(inner.wrap("(-", ")"))
                }
            },
            Expression::Comparison { op, left, right } => {
                let frag = self.translate_comparison(*op, left, right)?;
                Ok(self.shape_boolean(frag, vctx))
            }
            Expression::Case(case) => self.translate_case(case, vctx),
            Expression::Map(entries) => {
                let mut parts = Vec::new();
                for (key, value) in entries {
                    let mut frag = SqlFragment::default();
                    frag.push_parameter(Value::String(key.clone()));
                    frag.push(", ");
                    frag.push_fragment(self.translate_value(value)?);
                    parts.push(frag);
                }
                Ok(SqlFragment::join(parts, ", ").wrap("json_object(", ")"))
            }
            Expression::List(items) => {
                let mut parts = Vec::new();
                for item in items {
                    parts.push(self.translate_value(item)?);
                }
                Ok(SqlFragment::join(parts, ", ").wrap("json_array(", ")"))
            }
            Expression::ListComprehension(comp) => self.translate_list_comprehension(comp),
            Expression::PatternComprehension(comp) => {
                self.translate_pattern_comprehension(comp)
            }
            Expression::ListPredicate(pred) => {
                let frag = self.translate_list_predicate(pred)?;
                Ok(self.shape_boolean(frag, vctx))
            }
            Expression::LabelPredicate { variable, labels } => {
                let frag = self.translate_label_predicate(variable, labels)?;
                Ok(self.shape_boolean(frag, vctx))
            }
            Expression::In { needle, haystack } => {
                let frag = self.translate_membership(needle, haystack)?;
                Ok(self.shape_boolean(frag, vctx))
            }
            Expression::StringOp { op, left, right } => {
                let frag = self.translate_string_op(*op, left, right)?;
                Ok(self.shape_boolean(frag, vctx))
            }
            Expression::Subscript { base, index } => self.translate_subscript(base, index),
            Expression::Slice { base, from, to } => self.translate_slice(base, from, to),
        }
    }

    fn translate_literal(
        &mut self,
        lit: &Literal,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        Ok(match lit {
            Literal::Integer(i) => SqlFragment::new(i.to_string()),
            Literal::Float(f) => {
                if !f.is_finite() {
                    return Err(TranslatorError::type_mismatch(
                        "non-finite numbers are not valid values",
                    ));
                }
                // Keep float-ness in the SQL text so 1.0 stays a REAL.
                if f.fract() == 0.0 {
                    SqlFragment::new(format!("{:.1}", f))
                } else {
                    SqlFragment::new(f.to_string())
                }
            }
            Literal::String(s) => SqlFragment::parameter(Value::String(s.clone())),
            Literal::Boolean(b) => self.boolean_sql(*b, vctx),
            Literal::Null => SqlFragment::new("NULL"),
        })
    }

    fn boolean_sql(&self, value: bool, vctx: ValueContext) -> SqlFragment {
        match (vctx, value) {
            (ValueContext::Json, true) => SqlFragment::new("json('true')"),
            (ValueContext::Json, false) => SqlFragment::new("json('false')"),
            (ValueContext::Scalar, true) => SqlFragment::new("1"),
            (ValueContext::Scalar, false) => SqlFragment::new("0"),
        }
    }

    /// Wrap a 1/0/NULL predicate into a JSON boolean when the surrounding
    /// context is JSON-valued.
    fn shape_boolean(&self, frag: SqlFragment, vctx: ValueContext) -> SqlFragment {
        match vctx {
            ValueContext::Scalar => frag,
            ValueContext::Json => {
                frag.wrap("CASE ", " WHEN 1 THEN json('true') WHEN 0 THEN json('false') END")
            }
        }
    }

    // ===== variables and properties =====

    fn translate_variable(
        &mut self,
        name: &str,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        if let Some(binding) = self.local(name) {
            let mut frag = SqlFragment::new(binding.value_sql.clone());
            if let Some(table) = &binding.table {
                frag.tables.insert(table.clone());
            }
            return Ok(frag);
        }

        if let Some((level, aliased)) = self.ctx.resolve_with_alias(name, self.alias_level) {
            if self.ctx.materialized_aggregates.iter().any(|a| a == name) {
                return Ok(SqlFragment::with_table(
                    format!("__aggregates__.\"{}\"", name),
                    "__aggregates__",
                ));
            }
            let aliased = aliased.clone();
            let saved = self.alias_level;
            self.alias_level = level;
            let result = self.translate_in(&aliased, vctx);
            self.alias_level = saved;
            return result;
        }

        if let Some(unwind) = self.ctx.find_unwind(name) {
            return Ok(SqlFragment::with_table(
                format!("{}.value", unwind.alias),
                unwind.alias.clone(),
            ));
        }

        if let Some(variable) = self.ctx.lookup_variable(name) {
            return Ok(match variable.kind {
                VariableKind::Node | VariableKind::Edge => entity_json(&variable.alias),
                VariableKind::VarLengthEdge => {
                    let cte = variable.path_cte.clone().unwrap_or_else(|| variable.alias.clone());
                    SqlFragment::with_table(format!("{}.edge_ids", cte), cte)
                }
                VariableKind::Path => self.translate_path_value(name)?,
            });
        }

        if let Some(created) = self.ctx.created.get(name) {
            let table = match created.kind {
                VariableKind::Edge => "edges",
                _ => "nodes",
            };
            let mut frag = SqlFragment::new(format!(
                "(SELECT json_set(properties, '$._nf_id', id) FROM {} WHERE id = ",
                table
            ));
            frag.push_parameter(Value::String(created.id.clone()));
            frag.push(")");
            return Ok(frag);
        }

        if let Some(call) = &self.ctx.call {
            if call.yield_name == name {
                return Ok(SqlFragment::new(call.column_sql.clone()));
            }
        }

        Err(TranslatorError::UnknownVariable(name.to_string()))
    }

    /// Path projection: alternating `[node, edge, node, ..]` for fixed-length
    /// paths, `{nodes, edges}` for variable-length ones.
    fn translate_path_value(&self, name: &str) -> Result<SqlFragment, TranslatorError> {
        let record = self
            .ctx
            .find_path(name)
            .ok_or_else(|| TranslatorError::UnknownVariable(name.to_string()))?;
        if record.is_var_length {
            let cte = record
                .path_cte_name
                .clone()
                .unwrap_or_else(|| "path_0".to_string());
            let mut frag = SqlFragment::new("json_object('nodes', json_array(");
            let first = record.node_sequence.first();
            let last = record.node_sequence.last();
            if let (Some(first), Some(last)) = (first, last) {
                frag.push_fragment(entity_json(first));
                frag.push(", ");
                frag.push_fragment(entity_json(last));
            }
            frag.push(&format!("), 'edges', json({}.edge_ids))", cte));
            frag.tables.insert(cte);
            Ok(frag)
        } else {
            let mut parts: Vec<SqlFragment> = Vec::new();
            for (i, node_alias) in record.node_sequence.iter().enumerate() {
                if i > 0 {
                    if let Some(edge_alias) = record.edge_aliases.get(i - 1) {
                        parts.push(entity_json(edge_alias));
                    }
                }
                parts.push(entity_json(node_alias));
            }
            Ok(SqlFragment::join(parts, ", ").wrap("json_array(", ")"))
        }
    }

    fn translate_property(
        &mut self,
        base: &str,
        key: &str,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        let path = json_path_segment(key);

        if let Some(binding) = self.local(base) {
            let mut frag = match (&binding.entity_alias, vctx) {
                (Some(alias), ValueContext::Json) => {
                    SqlFragment::new(format!("{}.properties -> '${}'", alias, path))
                }
                (Some(alias), ValueContext::Scalar) => SqlFragment::new(format!(
                    "json_extract({}.properties, '${}')",
                    alias, path
                )),
                (None, _) => {
                    SqlFragment::new(format!("json_extract({}, '${}')", binding.value_sql, path))
                }
            };
            if let Some(table) = &binding.table {
                frag.tables.insert(table.clone());
            }
            return Ok(frag);
        }

        if let Some((level, aliased)) = self.ctx.resolve_with_alias(base, self.alias_level) {
            if self.ctx.materialized_aggregates.iter().any(|a| a == base) {
                return Ok(SqlFragment::with_table(
                    format!("json_extract(__aggregates__.\"{}\", '${}')", base, path),
                    "__aggregates__",
                ));
            }
            let aliased = aliased.clone();
            let saved = self.alias_level;
            self.alias_level = level;
            let inner = self.translate_scalar(&aliased);
            self.alias_level = saved;
            return Ok(inner?.wrap("json_extract(", &format!(", '${}')", path)));
        }

        if let Some(unwind) = self.ctx.find_unwind(base) {
            return Ok(SqlFragment::with_table(
                format!("json_extract({}.value, '${}')", unwind.alias, path),
                unwind.alias.clone(),
            ));
        }

        if let Some(variable) = self.ctx.lookup_variable(base) {
            return match variable.kind {
                VariableKind::Node | VariableKind::Edge => {
                    let sql = match vctx {
                        ValueContext::Json => {
                            format!("{}.properties -> '${}'", variable.alias, path)
                        }
                        ValueContext::Scalar => {
                            format!("json_extract({}.properties, '${}')", variable.alias, path)
                        }
                    };
                    Ok(SqlFragment::with_table(sql, variable.alias.clone()))
                }
                VariableKind::VarLengthEdge | VariableKind::Path => {
                    Err(TranslatorError::type_mismatch(format!(
                        "property access on '{}' requires a node or relationship",
                        base
                    )))
                }
            };
        }

        if let Some(created) = self.ctx.created.get(base) {
            let table = match created.kind {
                VariableKind::Edge => "edges",
                _ => "nodes",
            };
            let mut frag = SqlFragment::new(format!(
                "(SELECT json_extract(properties, '${}') FROM {} WHERE id = ",
                path, table
            ));
            frag.push_parameter(Value::String(created.id.clone()));
            frag.push(")");
            return Ok(frag);
        }

        Err(TranslatorError::UnknownVariable(base.to_string()))
    }

    // ===== operators =====

    fn translate_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        match op {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                for operand in [left, right] {
                    let t = self.static_type(operand);
                    if !t.boolean_compatible() {
                        return Err(TranslatorError::syntax(format!(
                            "boolean operator requires boolean operands, got {:?}",
                            t
                        )));
                    }
                }
                let l = self.translate_predicate_expr(left)?;
                let r = self.translate_predicate_expr(right)?;
                let frag = match op {
                    BinaryOp::And => combine2("cypher_and", l, r),
                    BinaryOp::Or => combine2("cypher_or", l, r),
                    // XOR expands so three-valued logic falls out of the
                    // helpers instead of needing one of its own.
                    BinaryOp::Xor => {
                        let a_and_not_b =
                            combine2("cypher_and", l.clone(), r.clone().wrap("cypher_not(", ")"));
                        let not_a_and_b = combine2("cypher_and", l.wrap("cypher_not(", ")"), r);
                        combine2("cypher_or", a_and_not_b, not_a_and_b)
                    }
                    _ => unreachable!(),
                };
                Ok(self.shape_boolean(frag, vctx))
            }
            BinaryOp::Add => self.translate_addition(left, right, vctx),
            BinaryOp::Subtract if self.is_temporal_duration_pair(left, right) => {
                self.translate_temporal_arithmetic(left, right, true)
            }
            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                let symbol = match op {
                    BinaryOp::Subtract => " - ",
                    BinaryOp::Multiply => " * ",
                    BinaryOp::Divide => " / ",
                    _ => " % ",
                };
                let mut frag = self.translate_scalar(left)?.wrap("(", "");
                frag.push(symbol);
                frag.push_fragment(self.translate_scalar(right)?);
                frag.push(")");
                Ok(frag)
            }
            BinaryOp::Power => {
                let mut frag = self.translate_scalar(left)?.wrap("POWER(", ", ");
                frag.push_fragment(self.translate_scalar(right)?);
                frag.push(")");
                Ok(frag)
            }
        }
    }

    fn is_temporal_duration_pair(&self, left: &Expression, right: &Expression) -> bool {
        matches!(self.static_type(left), StaticType::Temporal(_))
            && self.static_type(right) == StaticType::Duration
    }

    /// `+` dispatches on compile-time types: list concatenation, string
    /// concatenation, temporal-plus-duration, numeric addition, or a runtime
    /// `CASE json_type` when two property accesses leave it open.
    fn translate_addition(
        &mut self,
        left: &Expression,
        right: &Expression,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        let (lt, rt) = (self.static_type(left), self.static_type(right));

        if matches!(lt, StaticType::Temporal(_)) && rt == StaticType::Duration {
            return self.translate_temporal_arithmetic(left, right, false);
        }

        if lt == StaticType::List && rt == StaticType::List {
            let l = self.translate_scalar(left)?;
            let r = self.translate_scalar(right)?;
            let mut frag = SqlFragment::new(
                "(SELECT json_group_array(value) FROM (SELECT value FROM json_each(",
            );
            frag.push_fragment(l);
            frag.push(") UNION ALL SELECT value FROM json_each(");
            frag.push_fragment(r);
            frag.push(")))");
            return Ok(frag);
        }
        if lt == StaticType::List {
            let l = self.translate_scalar(left)?;
            let r = self.translate_value(right)?;
            let mut frag = SqlFragment::new(
                "(SELECT json_group_array(value) FROM (SELECT value FROM json_each(",
            );
            frag.push_fragment(l);
            frag.push(") UNION ALL SELECT json_quote(");
            frag.push_fragment(r);
            frag.push(")))");
            return Ok(frag);
        }
        if rt == StaticType::List {
            let l = self.translate_value(left)?;
            let r = self.translate_scalar(right)?;
            let mut frag =
                SqlFragment::new("(SELECT json_group_array(value) FROM (SELECT json_quote(");
            frag.push_fragment(l);
            frag.push(") AS value UNION ALL SELECT value FROM json_each(");
            frag.push_fragment(r);
            frag.push(")))");
            return Ok(frag);
        }

        if self.is_string_chain(left) || self.is_string_chain(right) {
            let mut frag = self.translate_scalar(left)?.wrap("(", " || ");
            frag.push_fragment(self.translate_scalar(right)?);
            frag.push(")");
            return Ok(frag);
        }

        // Two property accesses: decide list-vs-number at runtime.
        if lt == StaticType::Unknown
            && rt == StaticType::Unknown
            && is_property_shaped(left)
            && is_property_shaped(right)
        {
            let l = self.translate_scalar(left)?;
            let r = self.translate_scalar(right)?;
            let mut frag = SqlFragment::new("CASE WHEN json_valid(");
            frag.push_fragment(l.clone());
            frag.push(") AND json_type(");
            frag.push_fragment(l.clone());
            frag.push(") = 'array' THEN (SELECT json_group_array(value) FROM (SELECT value FROM json_each(");
            frag.push_fragment(l.clone());
            frag.push(") UNION ALL SELECT value FROM json_each(CASE WHEN json_valid(");
            frag.push_fragment(r.clone());
            frag.push(") AND json_type(");
            frag.push_fragment(r.clone());
            frag.push(") = 'array' THEN ");
            frag.push_fragment(r.clone());
            frag.push(" ELSE json_array(");
            frag.push_fragment(r.clone());
            frag.push(") END))) ELSE (");
            frag.push_fragment(l);
            frag.push(" + ");
            frag.push_fragment(r);
            frag.push(") END");
            return Ok(frag);
        }

        let _ = vctx;
        let mut frag = self.translate_scalar(left)?.wrap("(", " + ");
        frag.push_fragment(self.translate_scalar(right)?);
        frag.push(")");
        Ok(frag)
    }

    fn is_string_chain(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Literal(Literal::String(_)) => true,
            Expression::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => self.is_string_chain(left) || self.is_string_chain(right),
            _ => self.static_type(expr) == StaticType::String,
        }
    }

    /// `temporal ± duration` lowers to `DATETIME(base, modifier, ..)` (or
    /// the DATE/TIME equivalent for date/time operands).
    fn translate_temporal_arithmetic(
        &mut self,
        base: &Expression,
        duration: &Expression,
        negate: bool,
    ) -> Result<SqlFragment, TranslatorError> {
        let kind = match self.static_type(base) {
            StaticType::Temporal(kind) => kind,
            _ => TemporalKind::DateTime,
        };
        let base_sql = self.translate_scalar(base)?;
        let mut frag = base_sql.wrap(&format!("{}(", kind.sqlite_function()), "");

        if let Some(value) = self.constant_duration(duration)? {
            for modifier in value.to_modifiers(negate) {
                frag.push(&format!(", '{}'", modifier));
            }
        } else if let Expression::FunctionCall(call) = duration {
            // duration({..}) with dynamic component values: printf per
            // component at runtime.
            if let Some(Expression::Map(entries)) = call.args.first() {
                let sign = if negate { "-" } else { "+" };
                for (key, value) in entries {
                    let (unit, multiplier) = duration_component_unit(key).ok_or_else(|| {
                        TranslatorError::invalid_argument(format!(
                            "duration component '{}' cannot be applied dynamically",
                            key
                        ))
                    })?;
                    let inner = self.translate_scalar(value)?;
                    if multiplier == 1 {
                        frag.push(&format!(", printf('%+d {}', {}(", unit, sign));
                        frag.push_fragment(inner);
                        frag.push("))");
                    } else {
                        frag.push(&format!(", printf('%+d {}', {}({} * (", unit, sign, multiplier));
                        frag.push_fragment(inner);
                        frag.push(")))");
                    }
                }
            } else {
                return Err(TranslatorError::unsupported(
                    "temporal arithmetic requires a duration literal or map",
                ));
            }
        } else {
            return Err(TranslatorError::unsupported(
                "temporal arithmetic requires a duration literal or map",
            ));
        }
        frag.push(")");
        Ok(frag)
    }

    /// Resolve a duration expression to a translation-time value when its
    /// components are literals or parameters.
    pub(crate) fn constant_duration(
        &self,
        expr: &Expression,
    ) -> Result<Option<super::temporal::DurationValue>, TranslatorError> {
        let call = match expr {
            Expression::FunctionCall(call) if call.name.eq_ignore_ascii_case("duration") => call,
            _ => return Ok(None),
        };
        match call.args.first() {
            Some(Expression::Map(entries)) => {
                let mut resolved = Vec::new();
                for (key, value) in entries {
                    match self.constant_value(value) {
                        Some(v) => resolved.push((key.clone(), v)),
                        None => return Ok(None),
                    }
                }
                super::temporal::DurationValue::from_map(&resolved).map(Some)
            }
            Some(Expression::Literal(Literal::String(s))) => {
                super::temporal::DurationValue::parse_iso(s)
                    .ok_or_else(|| {
                        TranslatorError::invalid_argument(format!(
                            "cannot parse '{}' as a duration",
                            s
                        ))
                    })
                    .map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Literal/parameter constant folding for translation-time evaluation.
    pub(crate) fn constant_value(&self, expr: &Expression) -> Option<Value> {
        match expr {
            Expression::Literal(Literal::Integer(i)) => Some(Value::from(*i)),
            Expression::Literal(Literal::Float(f)) => Value::Number(
                serde_json::Number::from_f64(*f)?,
            )
            .into(),
            Expression::Literal(Literal::String(s)) => Some(Value::String(s.clone())),
            Expression::Literal(Literal::Boolean(b)) => Some(Value::Bool(*b)),
            Expression::Literal(Literal::Null) => Some(Value::Null),
            Expression::Parameter(name) => self.ctx.params.get(name).cloned(),
            Expression::Unary {
                op: UnaryOp::Minus,
                operand,
            } => match self.constant_value(operand)? {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(Value::from(-i))
                    } else {
                        serde_json::Number::from_f64(-n.as_f64()?).map(Value::Number)
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn translate_comparison(
        &mut self,
        op: ComparisonOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        let (lt, rt) = (self.static_type(left), self.static_type(right));
        let structural = |t: StaticType| {
            matches!(
                t,
                StaticType::List | StaticType::Map | StaticType::Node | StaticType::Edge
            )
        };

        let l = self.translate_scalar(left)?;
        let r = self.translate_scalar(right)?;

        let frag = match op {
            ComparisonOp::Eq | ComparisonOp::NotEq => {
                let eq = if structural(lt) || structural(rt) {
                    combine2("cypher_equals", l, r)
                } else {
                    let mut frag = l.wrap("(", " = ");
                    frag.push_fragment(r);
                    frag.push(")");
                    frag
                };
                if op == ComparisonOp::NotEq {
                    eq.wrap("cypher_not(", ")")
                } else {
                    eq
                }
            }
            ComparisonOp::Lt => combine2("cypher_lt", l, r),
            ComparisonOp::Lte => combine2("cypher_lte", l, r),
            ComparisonOp::Gt => combine2("cypher_gt", l, r),
            ComparisonOp::Gte => combine2("cypher_gte", l, r),
        };

        // A division anywhere in the operands can produce NaN at runtime;
        // NaN compares as false, which NULL-propagating helpers would
        // otherwise report as unknown.
        if contains_division(left) || contains_division(right) {
            let fallback = match op {
                ComparisonOp::NotEq => "1",
                _ => "0",
            };
            return Ok(frag.wrap("COALESCE(", &format!(", {})", fallback)));
        }
        Ok(frag)
    }

    fn translate_case(
        &mut self,
        case: &crate::cypher_ast::ast::CaseExpression,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        let mut frag = SqlFragment::new("CASE");
        for (when, then) in &case.when_then {
            frag.push(" WHEN ");
            match (&case.operand, when) {
                (Some(operand), CaseWhen::Value(value)) => {
                    // SQLite's CASE x WHEN v cannot tell integers from
                    // booleans, so simple-form equality goes through
                    // cypher_case_eq with compile-time type tags.
                    let operand_type = self.static_type(operand);
                    let value_type = self.static_type(when_value(when));
                    let o = self.translate_scalar(operand)?;
                    let v = self.translate_scalar(value)?;
                    frag.push("cypher_case_eq(");
                    frag.push_fragment(o);
                    frag.push(&format!(", '{}', ", operand_type.case_tag()));
                    frag.push_fragment(v);
                    frag.push(&format!(", '{}')", value_type.case_tag()));
                }
                (None, CaseWhen::Predicate(cond)) => {
                    let pred = self.translate_condition(cond)?;
                    frag.push_fragment(pred);
                }
                (Some(_), CaseWhen::Predicate(_)) => {
                    return Err(TranslatorError::malformed(
                        "simple CASE requires value WHEN arms",
                    ));
                }
                (None, CaseWhen::Value(_)) => {
                    return Err(TranslatorError::malformed(
                        "searched CASE requires predicate WHEN arms",
                    ));
                }
            }
            frag.push(" THEN ");
            frag.push_fragment(self.translate_in(then, vctx)?);
        }
        if let Some(else_expr) = &case.else_expr {
            frag.push(" ELSE ");
            frag.push_fragment(self.translate_in(else_expr, vctx)?);
        }
        frag.push(" END");
        Ok(frag)
    }

    // ===== collections =====

    fn translate_list_comprehension(
        &mut self,
        comp: &crate::cypher_ast::ast::ListComprehension,
    ) -> Result<SqlFragment, TranslatorError> {
        let list = self.translate_scalar(&comp.list)?;
        let alias = self.comprehension_alias();
        self.enter_comprehension();
        self.push_local(
            &comp.variable,
            format!("{}.value", alias),
            Some(alias.clone()),
        );

        let result = (|| {
            let projection = match &comp.projection {
                Some(projection) => self.translate_value(projection)?,
                None => SqlFragment::new(format!("{}.value", alias)),
            };
            let filter = match &comp.filter {
                Some(filter) => Some(self.translate_condition(filter)?),
                None => None,
            };
            let mut frag = SqlFragment::new("(SELECT json_group_array(");
            frag.push_fragment(projection);
            frag.push(") FROM json_each(");
            frag.push_fragment(list);
            frag.push(&format!(") AS {}", alias));
            if let Some(filter) = filter {
                frag.push(" WHERE ");
                frag.push_fragment(filter);
            }
            frag.push(")");
            frag.tables.remove(&alias);
            Ok(frag)
        })();

        self.pop_local();
        self.exit_comprehension();
        result
    }

    fn translate_pattern_comprehension(
        &mut self,
        comp: &crate::cypher_ast::ast::PatternComprehension,
    ) -> Result<SqlFragment, TranslatorError> {
        super::pattern_subquery::translate_pattern_comprehension(self, comp)
    }

    pub(crate) fn translate_list_predicate(
        &mut self,
        pred: &ListPredicate,
    ) -> Result<SqlFragment, TranslatorError> {
        let condition = pred.condition.as_deref().ok_or_else(|| {
            TranslatorError::malformed("list predicate requires a WHERE condition")
        })?;
        self.check_list_predicate_types(pred, condition)?;

        let list = self.translate_scalar(&pred.list)?;
        let alias = self.comprehension_alias();
        self.enter_comprehension();
        self.push_local(
            &pred.variable,
            format!("{}.value", alias),
            Some(alias.clone()),
        );
        let cond = self.translate_condition(condition);
        self.pop_local();
        self.exit_comprehension();
        let cond = cond?;

        let count_where = |filter: Option<&str>| -> SqlFragment {
            let mut frag = SqlFragment::new("(SELECT COUNT(*) FROM json_each(");
            frag.push_fragment(list.clone());
            frag.push(&format!(") AS {}", alias));
            if let Some(filter) = filter {
                frag.push(" WHERE (");
                frag.push_fragment(cond.clone());
                frag.push(&format!(") {}", filter));
            }
            frag.push(")");
            frag.tables.remove(&alias);
            frag
        };

        let total = count_where(None);
        let matches = count_where(Some("= 1"));
        let fails = count_where(Some("= 0"));

        // Unknown element count = total - matches - fails; three-valued
        // results fall out of the counts.
        let mut unknowns = total.wrap("(", " - ");
        unknowns.push_fragment(matches.clone());
        unknowns.push(" - ");
        unknowns.push_fragment(fails.clone());
        unknowns.push(")");

        let mut frag = SqlFragment::new("CASE WHEN ");
        match pred.kind {
            ListPredicateKind::All => {
                frag.push_fragment(fails);
                frag.push(" > 0 THEN 0 WHEN ");
                frag.push_fragment(unknowns);
                frag.push(" > 0 THEN NULL ELSE 1 END");
            }
            ListPredicateKind::Any => {
                frag.push_fragment(matches);
                frag.push(" > 0 THEN 1 WHEN ");
                frag.push_fragment(unknowns);
                frag.push(" > 0 THEN NULL ELSE 0 END");
            }
            ListPredicateKind::None => {
                frag.push_fragment(matches);
                frag.push(" > 0 THEN 0 WHEN ");
                frag.push_fragment(unknowns);
                frag.push(" > 0 THEN NULL ELSE 1 END");
            }
            ListPredicateKind::Single => {
                frag.push_fragment(matches.clone());
                frag.push(" > 1 THEN 0 WHEN ");
                frag.push_fragment(unknowns);
                frag.push(" > 0 THEN NULL WHEN ");
                frag.push_fragment(matches);
                frag.push(" = 1 THEN 1 ELSE 0 END");
            }
        }
        Ok(frag)
    }

    /// Literal list with a uniform element type + arithmetic on the bound
    /// variable in the filter: catch the type clash at translation time.
    fn check_list_predicate_types(
        &self,
        pred: &ListPredicate,
        condition: &WhereCondition,
    ) -> Result<(), TranslatorError> {
        let element_type = match pred.list.as_ref() {
            Expression::List(items) if !items.is_empty() => {
                let first = self.static_type(&items[0]);
                if items.iter().all(|i| self.static_type(i) == first) {
                    first
                } else {
                    return Ok(());
                }
            }
            _ => return Ok(()),
        };
        if element_type != StaticType::String {
            return Ok(());
        }
        if condition_does_arithmetic_on(condition, &pred.variable) {
            return Err(TranslatorError::type_mismatch(format!(
                "list elements are strings but the predicate applies arithmetic to '{}'",
                pred.variable
            )));
        }
        Ok(())
    }

    pub(crate) fn translate_label_predicate(
        &mut self,
        variable: &str,
        labels: &[String],
    ) -> Result<SqlFragment, TranslatorError> {
        let entity_alias = self
            .local(variable)
            .and_then(|b| b.entity_alias.clone());
        let label_source: SqlFragment = if let Some(alias) = entity_alias {
            SqlFragment::new(format!("{}.label", alias))
        } else if let Some(v) = self.ctx.lookup_variable(variable) {
            if v.kind != VariableKind::Node {
                return Err(TranslatorError::type_mismatch(format!(
                    "label predicate requires a node, '{}' is not one",
                    variable
                )));
            }
            SqlFragment::with_table(format!("{}.label", v.alias), v.alias.clone())
        } else if let Some(created) = self.ctx.created.get(variable) {
            let mut frag = SqlFragment::new("(SELECT label FROM nodes WHERE id = ");
            frag.push_parameter(Value::String(created.id.clone()));
            frag.push(")");
            frag
        } else {
            return Err(TranslatorError::UnknownVariable(variable.to_string()));
        };

        let mut parts = Vec::new();
        for label in labels {
            let mut frag = SqlFragment::new("EXISTS (SELECT 1 FROM json_each(");
            frag.push_fragment(label_source.clone());
            frag.push(") WHERE value = ");
            frag.push_parameter(Value::String(label.clone()));
            frag.push(")");
            parts.push(frag);
        }
        Ok(SqlFragment::join(parts, " AND ").wrap("(", ")"))
    }

    /// `needle IN haystack` with Cypher null semantics.
    pub(crate) fn translate_membership(
        &mut self,
        needle: &Expression,
        haystack: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        if let Expression::List(items) = haystack {
            if items.is_empty() {
                return Ok(SqlFragment::new("0"));
            }
            let simple = items.iter().all(|item| {
                matches!(
                    self.static_type(item),
                    StaticType::Integer | StaticType::Float | StaticType::String
                )
            });
            if simple {
                // SQL IN already yields NULL when the needle is absent and
                // the list is null-free, matching Cypher.
                let mut frag = self.translate_scalar(needle)?.wrap("(", " IN (");
                let mut parts = Vec::new();
                for item in items {
                    parts.push(self.translate_scalar(item)?);
                }
                frag.push_fragment(SqlFragment::join(parts, ", "));
                frag.push("))");
                return Ok(frag);
            }
        }

        // General form: deep comparison per element; an unknown element
        // comparison makes the whole membership unknown unless a definite
        // match exists.
        let needle_sql = self.translate_scalar(needle)?;
        let haystack_sql = self.translate_scalar(haystack)?;
        let branch = |cmp: &str| -> SqlFragment {
            let mut frag = SqlFragment::new("EXISTS (SELECT 1 FROM json_each(");
            frag.push_fragment(haystack_sql.clone());
            frag.push(") WHERE cypher_equals(value, ");
            frag.push_fragment(needle_sql.clone());
            frag.push(&format!(") {}", cmp));
            frag.push(")");
            frag
        };
        let mut frag = SqlFragment::new("CASE WHEN ");
        frag.push_fragment(branch("= 1"));
        frag.push(" THEN 1 WHEN ");
        frag.push_fragment(branch("IS NULL"));
        frag.push(" THEN NULL ELSE 0 END");
        Ok(frag)
    }

    pub(crate) fn translate_string_op(
        &mut self,
        op: StringOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        let l = self.translate_scalar(left)?;
        let r = self.translate_scalar(right)?;

        let mut frag = SqlFragment::new("CASE WHEN typeof(");
        frag.push_fragment(l.clone());
        frag.push(") <> 'text' OR typeof(");
        frag.push_fragment(r.clone());
        frag.push(") <> 'text' THEN NULL WHEN ");
        match op {
            StringOp::Contains => {
                frag.push("INSTR(");
                frag.push_fragment(l);
                frag.push(", ");
                frag.push_fragment(r);
                frag.push(") > 0");
            }
            StringOp::StartsWith => {
                frag.push("SUBSTR(");
                frag.push_fragment(l);
                frag.push(", 1, LENGTH(");
                frag.push_fragment(r.clone());
                frag.push(")) = ");
                frag.push_fragment(r);
            }
            StringOp::EndsWith => {
                frag.push("SUBSTR(");
                frag.push_fragment(l);
                frag.push(", -LENGTH(");
                frag.push_fragment(r.clone());
                frag.push(")) = ");
                frag.push_fragment(r);
            }
        }
        frag.push(" THEN 1 ELSE 0 END");
        Ok(frag)
    }

    fn translate_subscript(
        &mut self,
        base: &Expression,
        index: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        let base_type = self.static_type(base);
        if matches!(
            base_type,
            StaticType::Integer | StaticType::Float | StaticType::Boolean
        ) {
            return Err(TranslatorError::type_mismatch(
                "subscript on a non-subscriptable value",
            ));
        }
        match self.static_type(index) {
            StaticType::Float | StaticType::Boolean => {
                return Err(TranslatorError::type_mismatch(
                    "list index must be an integer",
                ));
            }
            StaticType::String if base_type == StaticType::List => {
                return Err(TranslatorError::type_mismatch(
                    "list index must be an integer",
                ));
            }
            _ => {}
        }

        if let Some(Value::Number(n)) = self.constant_value(index) {
            if let Some(i) = n.as_i64() {
                let base_sql = self.translate_scalar(base)?;
                let path = if i >= 0 {
                    format!(", '$[{}]')", i)
                } else {
                    format!(", '$[#{}]')", i)
                };
                return Ok(base_sql.wrap("json_extract(", &path));
            }
        }

        // Dynamic index: json_each keys are array offsets (or object keys),
        // so one shape serves both.
        let base_sql = self.translate_scalar(base)?;
        let index_sql = self.translate_scalar(index)?;
        let mut frag = SqlFragment::new("(SELECT value FROM json_each(");
        frag.push_fragment(base_sql);
        frag.push(") WHERE key = ");
        frag.push_fragment(index_sql);
        frag.push(")");
        Ok(frag)
    }

    fn translate_slice(
        &mut self,
        base: &Expression,
        from: &Option<Box<Expression>>,
        to: &Option<Box<Expression>>,
    ) -> Result<SqlFragment, TranslatorError> {
        let base_sql = self.translate_scalar(base)?;

        let mut frag =
            SqlFragment::new("(SELECT json_group_array(value) FROM (SELECT value FROM json_each(");
        frag.push_fragment(base_sql);
        frag.push(") WHERE 1");
        if let Some(from) = from {
            frag.push(" AND key >= ");
            let bound = self.translate_slice_bound(base, from)?;
            frag.push_fragment(bound);
        }
        if let Some(to) = to {
            frag.push(" AND key < ");
            let bound = self.translate_slice_bound(base, to)?;
            frag.push_fragment(bound);
        }
        frag.push(" ORDER BY key))");
        Ok(frag)
    }

    /// A slice bound; negative literals count back from the list's end.
    fn translate_slice_bound(
        &mut self,
        base: &Expression,
        bound: &Expression,
    ) -> Result<SqlFragment, TranslatorError> {
        if let Some(Value::Number(n)) = self.constant_value(bound) {
            if let Some(i) = n.as_i64() {
                if i < 0 {
                    let mut frag = SqlFragment::new("(json_array_length(");
                    frag.push_fragment(self.translate_scalar(base)?);
                    frag.push(&format!(") + {})", i));
                    return Ok(frag);
                }
                return Ok(SqlFragment::new(i.to_string()));
            }
        }
        self.translate_scalar(bound)
    }

    fn translate_function(
        &mut self,
        call: &FunctionCall,
        vctx: ValueContext,
    ) -> Result<SqlFragment, TranslatorError> {
        let spec = function_registry::lookup(&call.name)
            .ok_or_else(|| TranslatorError::UnknownFunction(call.name.clone()))?;
        spec.check_arity(&call.name, call.args.len())?;
        if self.in_aggregate && !spec.deterministic {
            return Err(TranslatorError::syntax(format!(
                "non-deterministic function {}() cannot be used inside an aggregate",
                call.name
            )));
        }
        if spec.kind == FunctionKind::Aggregate {
            if self.in_aggregate {
                return Err(TranslatorError::syntax(
                    "aggregate functions cannot be nested",
                ));
            }
            self.in_aggregate = true;
            let result = super::function_translator::translate_aggregate(self, call, spec);
            self.in_aggregate = false;
            return result;
        }
        let frag = super::function_translator::translate_scalar_function(self, call, spec)?;
        if spec.result == StaticType::Boolean {
            return Ok(self.shape_boolean(frag, vctx));
        }
        Ok(frag)
    }
}

fn when_value(when: &CaseWhen) -> &Expression {
    match when {
        CaseWhen::Value(value) => value,
        CaseWhen::Predicate(_) => unreachable!("checked by caller"),
    }
}

/// The `json_set(props, '$._nf_id', id)` projection of a node or edge row.
/// `_nf_id` is the hidden identity key that makes DISTINCT/UNION/GROUP BY
/// compare rows by identity rather than property equality.
pub(crate) fn entity_json(alias: &str) -> SqlFragment {
    SqlFragment::with_table(
        format!("json_set({a}.properties, '$._nf_id', {a}.id)", a = alias),
        alias,
    )
}

fn combine2(helper: &str, a: SqlFragment, b: SqlFragment) -> SqlFragment {
    let mut frag = SqlFragment::new(format!("{}(", helper));
    frag.push_fragment(a);
    frag.push(", ");
    frag.push_fragment(b);
    frag.push(")");
    frag
}

/// JSON path segment for a property key; quoted when it would not parse as
/// a bare identifier.
pub(crate) fn json_path_segment(key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !key.chars().next().unwrap().is_ascii_digit();
    if plain {
        format!(".{}", key)
    } else {
        format!(".\"{}\"", key.replace('"', ""))
    }
}

/// SQLite DATETIME modifier unit (and multiplier into it) for a duration
/// component key applied with runtime values. Sub-second components have no
/// integer modifier and are rejected for the dynamic form.
fn duration_component_unit(key: &str) -> Option<(&'static str, i64)> {
    match key {
        "years" => Some(("years", 1)),
        "months" => Some(("months", 1)),
        "weeks" => Some(("days", 7)),
        "days" => Some(("days", 1)),
        "hours" => Some(("hours", 1)),
        "minutes" => Some(("minutes", 1)),
        "seconds" => Some(("seconds", 1)),
        _ => None,
    }
}

fn is_property_shaped(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Property { .. } | Expression::PropertyAccess { .. }
    )
}

pub(crate) fn contains_division(expr: &Expression) -> bool {
    match expr {
        Expression::Binary { op, left, right } => {
            *op == BinaryOp::Divide || contains_division(left) || contains_division(right)
        }
        Expression::Unary { operand, .. } => contains_division(operand),
        Expression::FunctionCall(call) => call.args.iter().any(contains_division),
        Expression::Comparison { left, right, .. } => {
            contains_division(left) || contains_division(right)
        }
        _ => false,
    }
}

fn condition_does_arithmetic_on(condition: &WhereCondition, variable: &str) -> bool {
    fn expr_arith(expr: &Expression, variable: &str) -> bool {
        match expr {
            Expression::Binary { op, left, right } => {
                let arithmetic = matches!(
                    op,
                    BinaryOp::Add
                        | BinaryOp::Subtract
                        | BinaryOp::Multiply
                        | BinaryOp::Divide
                        | BinaryOp::Modulo
                        | BinaryOp::Power
                );
                let touches = matches!(left.as_ref(), Expression::Variable(v) if v == variable)
                    || matches!(right.as_ref(), Expression::Variable(v) if v == variable);
                (arithmetic && touches)
                    || expr_arith(left, variable)
                    || expr_arith(right, variable)
            }
            Expression::Unary { operand, .. } => expr_arith(operand, variable),
            Expression::FunctionCall(call) => call.args.iter().any(|a| expr_arith(a, variable)),
            _ => false,
        }
    }
    match condition {
        WhereCondition::Comparison { left, right, .. } => {
            expr_arith(left, variable) || expr_arith(right, variable)
        }
        WhereCondition::And(a, b) | WhereCondition::Or(a, b) => {
            condition_does_arithmetic_on(a, variable) || condition_does_arithmetic_on(b, variable)
        }
        WhereCondition::Not(inner) => condition_does_arithmetic_on(inner, variable),
        WhereCondition::Expression(expr) => expr_arith(expr, variable),
        _ => false,
    }
}

fn contains_aggregate_inner(ctx: &TranslationContext, expr: &Expression, level: usize) -> bool {
    let recurse = |e: &Expression| contains_aggregate_inner(ctx, e, level);
    match expr {
        Expression::FunctionCall(call) => {
            if function_registry::lookup(&call.name)
                .map(|s| s.kind == FunctionKind::Aggregate)
                .unwrap_or(false)
            {
                return true;
            }
            call.args.iter().any(recurse)
        }
        Expression::Variable(name) => ctx
            .resolve_with_alias(name, level)
            .map(|(l, aliased)| contains_aggregate_inner(ctx, aliased, l))
            .unwrap_or(false),
        Expression::Binary { left, right, .. } | Expression::Comparison { left, right, .. } => {
            recurse(left) || recurse(right)
        }
        Expression::Unary { operand, .. } => recurse(operand),
        Expression::PropertyAccess { base, .. } => recurse(base),
        Expression::Case(case) => {
            case.operand.as_deref().map(&recurse).unwrap_or(false)
                || case.when_then.iter().any(|(w, t)| {
                    recurse(t)
                        || match w {
                            CaseWhen::Value(v) => recurse(v),
                            CaseWhen::Predicate(_) => false,
                        }
                })
                || case.else_expr.as_deref().map(&recurse).unwrap_or(false)
        }
        Expression::List(items) => items.iter().any(recurse),
        Expression::Map(entries) => entries.iter().any(|(_, v)| recurse(v)),
        Expression::In { needle, haystack } => recurse(needle) || recurse(haystack),
        Expression::StringOp { left, right, .. } => recurse(left) || recurse(right),
        Expression::Subscript { base, index } => recurse(base) || recurse(index),
        Expression::Slice { base, from, to } => {
            recurse(base)
                || from.as_deref().map(&recurse).unwrap_or(false)
                || to.as_deref().map(&recurse).unwrap_or(false)
        }
        Expression::ListPredicate(pred) => recurse(&pred.list),
        Expression::ListComprehension(comp) => recurse(&comp.list),
        _ => false,
    }
}

/// Does this expression reference a WITH aggregate alias from inside a list
/// predicate? Those aliases must be materialized as the `__aggregates__`
/// CTE so the predicate's correlated subqueries can read them.
pub fn aggregate_aliases_in_list_predicates(
    ctx: &TranslationContext,
    expr: &Expression,
    out: &mut Vec<String>,
) {
    fn collect_refs(ctx: &TranslationContext, expr: &Expression, out: &mut Vec<String>) {
        match expr {
            Expression::Variable(name) | Expression::Property { base: name, .. } => {
                if let Some((level, aliased)) = ctx.resolve_with_alias(name, usize::MAX) {
                    if contains_aggregate_inner(ctx, aliased, level) && !out.contains(name) {
                        out.push(name.clone());
                    }
                }
            }
            Expression::FunctionCall(call) => {
                for arg in &call.args {
                    collect_refs(ctx, arg, out);
                }
            }
            Expression::Binary { left, right, .. }
            | Expression::Comparison { left, right, .. } => {
                collect_refs(ctx, left, out);
                collect_refs(ctx, right, out);
            }
            Expression::Unary { operand, .. } => collect_refs(ctx, operand, out),
            _ => {}
        }
    }

    fn walk_condition(ctx: &TranslationContext, cond: &WhereCondition, out: &mut Vec<String>) {
        match cond {
            WhereCondition::And(a, b) | WhereCondition::Or(a, b) => {
                walk_condition(ctx, a, out);
                walk_condition(ctx, b, out);
            }
            WhereCondition::Not(inner) => walk_condition(ctx, inner, out),
            WhereCondition::ListPredicate(pred) => {
                collect_refs(ctx, &pred.list, out);
            }
            WhereCondition::Expression(expr) => {
                aggregate_aliases_in_list_predicates(ctx, expr, out)
            }
            _ => {}
        }
    }

    match expr {
        Expression::ListPredicate(pred) => {
            collect_refs(ctx, &pred.list, out);
        }
        Expression::FunctionCall(call) => {
            for arg in &call.args {
                aggregate_aliases_in_list_predicates(ctx, arg, out);
            }
        }
        Expression::Binary { left, right, .. } | Expression::Comparison { left, right, .. } => {
            aggregate_aliases_in_list_predicates(ctx, left, out);
            aggregate_aliases_in_list_predicates(ctx, right, out);
        }
        Expression::Unary { operand, .. } => {
            aggregate_aliases_in_list_predicates(ctx, operand, out)
        }
        Expression::ListComprehension(comp) => {
            if let Some(filter) = &comp.filter {
                walk_condition(ctx, filter, out);
            }
        }
        Expression::Case(case) => {
            for (when, then) in &case.when_then {
                if let CaseWhen::Predicate(cond) = when {
                    walk_condition(ctx, cond, out);
                }
                aggregate_aliases_in_list_predicates(ctx, then, out);
            }
        }
        _ => {}
    }
}

/// Collect the table aliases an already-translated fragment references,
/// excluding subquery-local ones.
pub fn referenced_tables(frag: &SqlFragment) -> BTreeSet<String> {
    frag.tables.clone()
}
