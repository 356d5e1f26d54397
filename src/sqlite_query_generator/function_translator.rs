//! SQL emission for the Cypher function library.
//!
//! [`super::function_registry`] owns the metadata (arity, aggregate/scalar,
//! determinism, result type); this module owns the per-function SQL shapes.

use serde_json::Value;

use crate::cypher_ast::ast::{Expression, FunctionCall};

use super::context::VariableKind;
use super::errors::TranslatorError;
use super::expression::{ExpressionTranslator, StaticType};
use super::function_registry::FunctionSpec;
use super::sql_fragment::SqlFragment;
use super::temporal::{self, TemporalKind};

pub(crate) fn translate_aggregate(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    spec: &FunctionSpec,
) -> Result<SqlFragment, TranslatorError> {
    match spec.canonical {
        "count" => {
            if call.args.is_empty() {
                return Ok(SqlFragment::new("COUNT(*)"));
            }
            let arg = tr.translate_scalar(&call.args[0])?;
            let prefix = if call.distinct {
                "COUNT(DISTINCT "
            } else {
                "COUNT("
            };
            Ok(arg.wrap(prefix, ")"))
        }
        "sum" => {
            let arg = tr.translate_scalar(&call.args[0])?;
            Ok(arg.wrap("COALESCE(SUM(", "), 0)"))
        }
        "avg" => Ok(tr.translate_scalar(&call.args[0])?.wrap("AVG(", ")")),
        "min" => Ok(tr.translate_scalar(&call.args[0])?.wrap("MIN(", ")")),
        "max" => Ok(tr.translate_scalar(&call.args[0])?.wrap("MAX(", ")")),
        "collect" => {
            let element = tr.translate_value(&call.args[0])?;
            if call.distinct {
                return Ok(element.wrap("json_group_array(DISTINCT ", ")"));
            }
            // A collect after `WITH .. ORDER BY` inherits the ordering into
            // the aggregate, since the outer SELECT's ORDER BY runs after
            // grouping has collapsed the rows.
            let inherited: Vec<_> = tr
                .ctx
                .with_modifiers
                .as_ref()
                .map(|m| m.order_by.clone())
                .unwrap_or_default();
            let mut frag = element.wrap("json_group_array(", "");
            if !inherited.is_empty() {
                frag.push(" ORDER BY ");
                for (i, item) in inherited.iter().enumerate() {
                    if i > 0 {
                        frag.push(", ");
                    }
                    frag.push_fragment(tr.translate_scalar(&item.expression)?);
                    if item.descending {
                        frag.push(" DESC");
                    }
                }
            }
            frag.push(")");
            Ok(frag)
        }
        "percentiledisc" | "percentilecont" => {
            translate_percentile(tr, call, spec.canonical == "percentilecont")
        }
        other => Err(TranslatorError::UnknownFunction(other.to_string())),
    }
}

fn percentile_fraction(
    tr: &ExpressionTranslator,
    call: &FunctionCall,
) -> Result<(), TranslatorError> {
    let in_unit = |v: &Value| v.as_f64().map(|f| (0.0..=1.0).contains(&f)).unwrap_or(false);
    if let Some(p) = tr.constant_value(&call.args[1]) {
        if !in_unit(&p) {
            // A percentile-looking first argument means the caller swapped
            // the value and the fraction.
            if tr
                .constant_value(&call.args[0])
                .map(|v| in_unit(&v))
                .unwrap_or(false)
            {
                return Err(TranslatorError::invalid_argument(
                    "percentile arguments are (value, fraction); they appear swapped",
                ));
            }
            return Err(TranslatorError::invalid_argument(
                "percentile fraction must be within [0, 1]",
            ));
        }
    }
    Ok(())
}

fn translate_percentile(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    continuous: bool,
) -> Result<SqlFragment, TranslatorError> {
    percentile_fraction(tr, call)?;
    let x = tr.translate_scalar(&call.args[0])?;
    let p = tr.translate_scalar(&call.args[1])?;

    let sorted = {
        let mut frag = x.clone().wrap("json_group_array(", " ORDER BY ");
        frag.push_fragment(x.clone());
        frag.push(")");
        frag
    };
    // p * (count - 1), the continuous rank.
    let rank = {
        let mut frag = p.clone().wrap("(", " * (COUNT(");
        frag.push_fragment(x.clone());
        frag.push(") - 1))");
        frag
    };

    if !continuous {
        // Discrete: element at ceil(p * n) - 1, clamped to 0.
        let mut frag = SqlFragment::new("json_extract(");
        frag.push_fragment(sorted);
        frag.push(", printf('$[%d]', MAX(CAST(CEIL(");
        frag.push_fragment(p);
        frag.push(" * COUNT(");
        frag.push_fragment(x);
        frag.push(")) AS INTEGER) - 1, 0)))");
        return Ok(frag);
    }

    let floor_rank = rank.clone().wrap("CAST(", " AS INTEGER)");
    let lower = {
        let mut frag = SqlFragment::new("json_extract(");
        frag.push_fragment(sorted.clone());
        frag.push(", printf('$[%d]', ");
        frag.push_fragment(floor_rank.clone());
        frag.push("))");
        frag
    };
    let upper = {
        let mut frag = SqlFragment::new("COALESCE(json_extract(");
        frag.push_fragment(sorted);
        frag.push(", printf('$[%d]', ");
        frag.push_fragment(floor_rank.clone());
        frag.push(" + 1)), ");
        frag.push_fragment(lower.clone());
        frag.push(")");
        frag
    };

    // lower + (rank - floor(rank)) * (upper - lower)
    let mut frag = lower.clone().wrap("(", " + (");
    frag.push_fragment(rank);
    frag.push(" - ");
    frag.push_fragment(floor_rank);
    frag.push(") * (");
    frag.push_fragment(upper);
    frag.push(" - ");
    frag.push_fragment(lower);
    frag.push("))");
    Ok(frag)
}

enum EntityRef {
    /// A row source alias in the current query.
    Alias(String),
    /// A row created earlier in this query, addressed by UUID.
    Created { table: &'static str, id: String },
}

fn entity_ref(
    tr: &ExpressionTranslator,
    expr: &Expression,
    want: &[VariableKind],
    function: &str,
) -> Result<(EntityRef, VariableKind), TranslatorError> {
    let name = match expr {
        Expression::Variable(name) => name,
        _ => {
            return Err(TranslatorError::type_mismatch(format!(
                "{}() requires a bound node or relationship variable",
                function
            )))
        }
    };
    if let Some(variable) = tr.ctx.lookup_variable(name) {
        if !want.contains(&variable.kind) {
            return Err(TranslatorError::type_mismatch(format!(
                "{}() cannot be applied to '{}' ({:?})",
                function, name, variable.kind
            )));
        }
        return Ok((EntityRef::Alias(variable.alias.clone()), variable.kind));
    }
    if let Some(created) = tr.ctx.created.get(name) {
        if !want.contains(&created.kind) {
            return Err(TranslatorError::type_mismatch(format!(
                "{}() cannot be applied to '{}'",
                function, name
            )));
        }
        let table = match created.kind {
            VariableKind::Edge => "edges",
            _ => "nodes",
        };
        return Ok((
            EntityRef::Created {
                table,
                id: created.id.clone(),
            },
            created.kind,
        ));
    }
    Err(TranslatorError::UnknownVariable(name.to_string()))
}

fn entity_column(entity: &EntityRef, column: &str) -> SqlFragment {
    match entity {
        EntityRef::Alias(alias) => {
            SqlFragment::with_table(format!("{}.{}", alias, column), alias.clone())
        }
        EntityRef::Created { table, id } => {
            let mut frag = SqlFragment::new(format!("(SELECT {} FROM {} WHERE id = ", column, table));
            frag.push_parameter(Value::String(id.clone()));
            frag.push(")");
            frag
        }
    }
}

pub(crate) fn translate_scalar_function(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    spec: &FunctionSpec,
) -> Result<SqlFragment, TranslatorError> {
    match spec.canonical {
        "coalesce" => {
            let mut parts = Vec::new();
            for arg in &call.args {
                parts.push(tr.translate_scalar(arg)?);
            }
            Ok(SqlFragment::join(parts, ", ").wrap("COALESCE(", ")"))
        }

        // ===== math =====
        "abs" => Ok(tr.translate_scalar(&call.args[0])?.wrap("ABS(", ")")),
        "round" => {
            let mut frag = tr.translate_scalar(&call.args[0])?.wrap("ROUND(", "");
            if let Some(precision) = call.args.get(1) {
                frag.push(", ");
                frag.push_fragment(tr.translate_scalar(precision)?);
            }
            frag.push(")");
            Ok(frag)
        }
        "floor" => Ok(tr.translate_scalar(&call.args[0])?.wrap("FLOOR(", ")")),
        "ceil" => Ok(tr.translate_scalar(&call.args[0])?.wrap("CEIL(", ")")),
        "sqrt" => Ok(tr.translate_scalar(&call.args[0])?.wrap("SQRT(", ")")),
        "sign" => Ok(tr.translate_scalar(&call.args[0])?.wrap("SIGN(", ")")),
        "rand" => Ok(SqlFragment::new(
            "(ABS(RANDOM()) / 9223372036854775808.0)",
        )),

        // ===== collections =====
        "size" => {
            let arg = &call.args[0];
            let inner = tr.translate_scalar(arg)?;
            match tr.static_type(arg) {
                StaticType::List => Ok(inner.wrap("json_array_length(", ")")),
                StaticType::String => Ok(inner.wrap("LENGTH(", ")")),
                _ => {
                    let mut frag = SqlFragment::new("CASE WHEN json_valid(");
                    frag.push_fragment(inner.clone());
                    frag.push(") AND json_type(");
                    frag.push_fragment(inner.clone());
                    frag.push(") = 'array' THEN json_array_length(");
                    frag.push_fragment(inner.clone());
                    frag.push(") ELSE LENGTH(");
                    frag.push_fragment(inner);
                    frag.push(") END");
                    Ok(frag)
                }
            }
        }
        "head" => Ok(tr
            .translate_scalar(&call.args[0])?
            .wrap("json_extract(", ", '$[0]')")),
        "last" => Ok(tr
            .translate_scalar(&call.args[0])?
            .wrap("json_extract(", ", '$[#-1]')")),
        "tail" => {
            let inner = tr.translate_scalar(&call.args[0])?;
            Ok(inner.wrap(
                "(SELECT json_group_array(value) FROM (SELECT value FROM json_each(",
                ") WHERE key >= 1 ORDER BY key))",
            ))
        }
        "keys" => {
            let props = match &call.args[0] {
                Expression::Variable(_) => {
                    let (entity, _) = entity_ref(
                        tr,
                        &call.args[0],
                        &[VariableKind::Node, VariableKind::Edge],
                        "keys",
                    )?;
                    entity_column(&entity, "properties")
                }
                other => tr.translate_scalar(other)?,
            };
            Ok(props.wrap(
                "(SELECT json_group_array(key) FROM json_each(",
                "))",
            ))
        }
        "range" => translate_range(tr, call),
        "reverse" => {
            let arg = &call.args[0];
            let inner = tr.translate_scalar(arg)?;
            if tr.static_type(arg) == StaticType::List {
                return Ok(inner.wrap(
                    "(SELECT json_group_array(value) FROM (SELECT value FROM json_each(",
                    ") ORDER BY key DESC))",
                ));
            }
            // Compile-time choice: anything not statically a list reverses
            // as a string.
            let mut frag = SqlFragment::new(
                "(SELECT group_concat(ch, '') FROM (WITH RECURSIVE __rev__(i, ch) AS (SELECT LENGTH(",
            );
            frag.push_fragment(inner.clone());
            frag.push(") + 1, NULL UNION ALL SELECT i - 1, SUBSTR(");
            frag.push_fragment(inner);
            frag.push(", i - 1, 1) FROM __rev__ WHERE i > 1) SELECT ch FROM __rev__ WHERE ch IS NOT NULL))");
            Ok(frag)
        }

        // ===== strings =====
        "split" => {
            let source = tr.translate_scalar(&call.args[0])?;
            let delim = tr.translate_scalar(&call.args[1])?;
            let mut frag = SqlFragment::new(
                "(SELECT json_group_array(part) FROM (WITH RECURSIVE __split__(part, rest) AS (SELECT NULL, ",
            );
            frag.push_fragment(source);
            frag.push(" UNION ALL SELECT CASE WHEN INSTR(rest, ");
            frag.push_fragment(delim.clone());
            frag.push(") > 0 THEN SUBSTR(rest, 1, INSTR(rest, ");
            frag.push_fragment(delim.clone());
            frag.push(") - 1) ELSE rest END, CASE WHEN INSTR(rest, ");
            frag.push_fragment(delim.clone());
            frag.push(") > 0 THEN SUBSTR(rest, INSTR(rest, ");
            frag.push_fragment(delim.clone());
            frag.push(") + LENGTH(");
            frag.push_fragment(delim);
            frag.push(")) ELSE NULL END FROM __split__ WHERE rest IS NOT NULL) SELECT part FROM __split__ WHERE part IS NOT NULL))");
            Ok(frag)
        }
        "toupper" => Ok(tr.translate_scalar(&call.args[0])?.wrap("UPPER(", ")")),
        "tolower" => Ok(tr.translate_scalar(&call.args[0])?.wrap("LOWER(", ")")),
        "trim" => Ok(tr.translate_scalar(&call.args[0])?.wrap("TRIM(", ")")),
        "ltrim" => Ok(tr.translate_scalar(&call.args[0])?.wrap("LTRIM(", ")")),
        "rtrim" => Ok(tr.translate_scalar(&call.args[0])?.wrap("RTRIM(", ")")),
        "substring" => {
            // Cypher is 0-indexed, SQLite SUBSTR is 1-indexed.
            let mut frag = tr.translate_scalar(&call.args[0])?.wrap("SUBSTR(", ", ");
            frag.push_fragment(tr.translate_scalar(&call.args[1])?.wrap("(", " + 1)"));
            if let Some(len) = call.args.get(2) {
                frag.push(", ");
                frag.push_fragment(tr.translate_scalar(len)?);
            }
            frag.push(")");
            Ok(frag)
        }
        "replace" => {
            let mut frag = tr.translate_scalar(&call.args[0])?.wrap("REPLACE(", ", ");
            frag.push_fragment(tr.translate_scalar(&call.args[1])?);
            frag.push(", ");
            frag.push_fragment(tr.translate_scalar(&call.args[2])?);
            frag.push(")");
            Ok(frag)
        }
        "left" => {
            let mut frag = tr.translate_scalar(&call.args[0])?.wrap("SUBSTR(", ", 1, ");
            frag.push_fragment(tr.translate_scalar(&call.args[1])?);
            frag.push(")");
            Ok(frag)
        }
        "right" => {
            let mut frag = tr.translate_scalar(&call.args[0])?.wrap("SUBSTR(", ", -(");
            frag.push_fragment(tr.translate_scalar(&call.args[1])?);
            frag.push("))");
            Ok(frag)
        }
        "tostring" => {
            let arg = &call.args[0];
            let inner = tr.translate_scalar(arg)?;
            match tr.static_type(arg) {
                StaticType::String => Ok(inner),
                StaticType::Boolean => {
                    let mut frag = SqlFragment::new("CASE ");
                    frag.push_fragment(inner);
                    frag.push(" WHEN 1 THEN 'true' WHEN 0 THEN 'false' END");
                    Ok(frag)
                }
                StaticType::Integer | StaticType::Float => Ok(inner.wrap("CAST(", " AS TEXT)")),
                _ => {
                    let mut frag = SqlFragment::new("CASE typeof(");
                    frag.push_fragment(inner.clone());
                    frag.push(") WHEN 'null' THEN NULL ELSE CAST(");
                    frag.push_fragment(inner);
                    frag.push(" AS TEXT) END");
                    Ok(frag)
                }
            }
        }
        "tointeger" => translate_numeric_coercion(tr, call, "INTEGER"),
        "tofloat" => translate_numeric_coercion(tr, call, "REAL"),
        "toboolean" => {
            let inner = tr.translate_scalar(&call.args[0])?;
            let mut frag = SqlFragment::new("CASE WHEN typeof(");
            frag.push_fragment(inner.clone());
            frag.push(") = 'integer' THEN (");
            frag.push_fragment(inner.clone());
            frag.push(" <> 0) WHEN LOWER(TRIM(");
            frag.push_fragment(inner.clone());
            frag.push(")) = 'true' THEN 1 WHEN LOWER(TRIM(");
            frag.push_fragment(inner);
            frag.push(")) = 'false' THEN 0 ELSE NULL END");
            Ok(frag)
        }

        // ===== graph entities =====
        "labels" => {
            let (entity, _) = entity_ref(tr, &call.args[0], &[VariableKind::Node], "labels")?;
            Ok(entity_column(&entity, "label").wrap("json(", ")"))
        }
        "type" => {
            let (entity, _) = entity_ref(tr, &call.args[0], &[VariableKind::Edge], "type")?;
            Ok(entity_column(&entity, "type"))
        }
        "properties" => match &call.args[0] {
            Expression::Variable(_) => {
                let (entity, _) = entity_ref(
                    tr,
                    &call.args[0],
                    &[VariableKind::Node, VariableKind::Edge],
                    "properties",
                )?;
                Ok(entity_column(&entity, "properties").wrap("json(", ")"))
            }
            other if matches!(tr.static_type(other), StaticType::Map) => {
                tr.translate_scalar(other)
            }
            _ => Err(TranslatorError::type_mismatch(
                "properties() requires a node, relationship, or map",
            )),
        },
        "id" => {
            let (entity, _) = entity_ref(
                tr,
                &call.args[0],
                &[VariableKind::Node, VariableKind::Edge],
                "id",
            )?;
            Ok(entity_column(&entity, "id"))
        }

        // ===== paths =====
        "length" => translate_length(tr, call),
        "nodes" => {
            let record = path_record(tr, &call.args[0], "nodes")?;
            if record.is_var_length {
                let mut parts = Vec::new();
                if let Some(first) = record.node_sequence.first() {
                    parts.push(super::expression::entity_json(first));
                }
                if let Some(last) = record.node_sequence.last() {
                    parts.push(super::expression::entity_json(last));
                }
                return Ok(SqlFragment::join(parts, ", ").wrap("json_array(", ")"));
            }
            let parts = record
                .node_sequence
                .iter()
                .map(|alias| super::expression::entity_json(alias))
                .collect();
            Ok(SqlFragment::join(parts, ", ").wrap("json_array(", ")"))
        }
        "relationships" => {
            let record = path_record(tr, &call.args[0], "relationships")?;
            if record.is_var_length {
                let cte = record
                    .path_cte_name
                    .clone()
                    .unwrap_or_else(|| "path_0".to_string());
                return Ok(SqlFragment::with_table(
                    format!("json({}.edge_ids)", cte),
                    cte,
                ));
            }
            let parts = record
                .edge_aliases
                .iter()
                .map(|alias| super::expression::entity_json(alias))
                .collect();
            Ok(SqlFragment::join(parts, ", ").wrap("json_array(", ")"))
        }

        // ===== temporal =====
        "date" | "localtime" | "time" | "localdatetime" | "datetime" => {
            let kind = match spec.result {
                StaticType::Temporal(kind) => kind,
                _ => TemporalKind::DateTime,
            };
            translate_temporal_constructor(tr, call, kind)
        }
        "timestamp" => Ok(SqlFragment::new(
            "CAST((JULIANDAY('now') - 2440587.5) * 86400000 AS INTEGER)",
        )),
        "duration" => {
            match tr.constant_duration(&Expression::FunctionCall(call.clone()))? {
                Some(value) => Ok(SqlFragment::parameter(Value::String(value.to_iso_string()))),
                None => Err(TranslatorError::invalid_argument(
                    "duration() components must be literals or parameters",
                )),
            }
        }
        "duration.between" | "duration.indays" | "duration.inseconds" | "duration.inmonths" => {
            translate_duration_between(tr, call, spec.canonical)
        }

        other => Err(TranslatorError::UnknownFunction(other.to_string())),
    }
}

fn translate_numeric_coercion(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    target: &str,
) -> Result<SqlFragment, TranslatorError> {
    let inner = tr.translate_scalar(&call.args[0])?;
    // GLOB pins down "looks numeric" before CAST, which would otherwise
    // coerce arbitrary text to 0.
    let mut frag = SqlFragment::new("CASE WHEN typeof(");
    frag.push_fragment(inner.clone());
    frag.push(") IN ('integer', 'real') THEN CAST(");
    frag.push_fragment(inner.clone());
    frag.push(&format!(" AS {}) WHEN typeof(", target));
    frag.push_fragment(inner.clone());
    frag.push(") = 'text' AND (TRIM(");
    frag.push_fragment(inner.clone());
    frag.push(") GLOB '-[0-9]*' OR TRIM(");
    frag.push_fragment(inner.clone());
    frag.push(") GLOB '[0-9]*') AND NOT TRIM(");
    frag.push_fragment(inner.clone());
    frag.push(") GLOB '*[^0-9.+-]*' THEN CAST(");
    frag.push_fragment(inner);
    frag.push(&format!(" AS {}) ELSE NULL END", target));
    Ok(frag)
}

fn translate_range(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
) -> Result<SqlFragment, TranslatorError> {
    for arg in &call.args {
        if let Some(value) = tr.constant_value(arg) {
            if value.as_i64().is_none() {
                return Err(TranslatorError::invalid_argument(
                    "range() bounds and step must be integers",
                ));
            }
        }
    }
    if let Some(step) = call.args.get(2) {
        if tr.constant_value(step).and_then(|v| v.as_i64()) == Some(0) {
            return Err(TranslatorError::invalid_argument(
                "range() step must not be zero",
            ));
        }
    }

    let start = tr.translate_scalar(&call.args[0])?;
    let end = tr.translate_scalar(&call.args[1])?;
    let step = match call.args.get(2) {
        Some(step) => tr.translate_scalar(step)?,
        None => SqlFragment::new("1"),
    };

    let mut frag = SqlFragment::new(
        "(SELECT json_group_array(value) FROM (WITH RECURSIVE __range__(value) AS (SELECT ",
    );
    frag.push_fragment(start);
    frag.push(" UNION ALL SELECT value + ");
    frag.push_fragment(step.clone());
    frag.push(" FROM __range__ WHERE (");
    frag.push_fragment(step.clone());
    frag.push(" > 0 AND value + ");
    frag.push_fragment(step.clone());
    frag.push(" <= ");
    frag.push_fragment(end.clone());
    frag.push(") OR (");
    frag.push_fragment(step.clone());
    frag.push(" < 0 AND value + ");
    frag.push_fragment(step.clone());
    frag.push(" >= ");
    frag.push_fragment(end.clone());
    frag.push(")) SELECT value FROM __range__ WHERE (");
    frag.push_fragment(step.clone());
    frag.push(" > 0 AND value <= ");
    frag.push_fragment(end.clone());
    frag.push(") OR (");
    frag.push_fragment(step);
    frag.push(" < 0 AND value >= ");
    frag.push_fragment(end);
    frag.push(")))");
    Ok(frag)
}

fn path_record<'a>(
    tr: &'a ExpressionTranslator,
    expr: &Expression,
    function: &str,
) -> Result<&'a super::context::PathRecord, TranslatorError> {
    let name = match expr {
        Expression::Variable(name) => name,
        _ => {
            return Err(TranslatorError::type_mismatch(format!(
                "{}() requires a path variable",
                function
            )))
        }
    };
    tr.ctx
        .find_path(name)
        .ok_or_else(|| TranslatorError::type_mismatch(format!("'{}' is not a path", name)))
}

fn translate_length(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
) -> Result<SqlFragment, TranslatorError> {
    if let Expression::Variable(name) = &call.args[0] {
        if let Some(record) = tr.ctx.find_path(name) {
            if record.is_var_length {
                let cte = record
                    .path_cte_name
                    .clone()
                    .unwrap_or_else(|| "path_0".to_string());
                return Ok(SqlFragment::with_table(format!("{}.depth", cte), cte));
            }
            return Ok(SqlFragment::new(record.edge_aliases.len().to_string()));
        }
    }
    let inner = tr.translate_scalar(&call.args[0])?;
    let mut frag = SqlFragment::new("CASE WHEN json_valid(");
    frag.push_fragment(inner.clone());
    frag.push(") AND json_type(");
    frag.push_fragment(inner.clone());
    frag.push(") = 'array' THEN json_array_length(");
    frag.push_fragment(inner.clone());
    frag.push(") ELSE LENGTH(");
    frag.push_fragment(inner);
    frag.push(") END");
    Ok(frag)
}

fn translate_temporal_constructor(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    kind: TemporalKind,
) -> Result<SqlFragment, TranslatorError> {
    if call.args.is_empty() {
        if tr.is_in_aggregate() {
            return Err(TranslatorError::syntax(format!(
                "non-deterministic function {}() cannot be used inside an aggregate",
                kind.function_name()
            )));
        }
        return Ok(SqlFragment::new(match kind {
            TemporalKind::Date => "DATE('now')".to_string(),
            TemporalKind::LocalTime | TemporalKind::Time => "STRFTIME('%H:%M:%f', 'now')".to_string(),
            TemporalKind::LocalDateTime => {
                "STRFTIME('%Y-%m-%dT%H:%M:%f', 'now')".to_string()
            }
            TemporalKind::DateTime => "STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')".to_string(),
        }));
    }

    let arg = &call.args[0];
    // Literal and parameter forms normalize at translation time.
    if let Some(Value::String(text)) = tr.constant_value(arg) {
        let value = temporal::parse_temporal_string(kind, &text)?;
        return Ok(SqlFragment::parameter(Value::String(value.render(kind))));
    }
    if let Expression::Map(entries) = arg {
        let mut resolved = Vec::new();
        let mut all_constant = true;
        for (key, value) in entries {
            match tr.constant_value(value) {
                Some(v) => resolved.push((key.clone(), v)),
                None => {
                    all_constant = false;
                    break;
                }
            }
        }
        if all_constant {
            let value = temporal::temporal_from_map(kind, &resolved)?;
            return Ok(SqlFragment::parameter(Value::String(value.render(kind))));
        }
        return Err(TranslatorError::invalid_argument(format!(
            "{}() component map values must be literals or parameters",
            kind.function_name()
        )));
    }

    // Dynamic operand: normalize at runtime with the SQLite date functions.
    let inner = tr.translate_scalar(arg)?;
    Ok(match kind {
        TemporalKind::Date => inner.wrap("DATE(", ")"),
        TemporalKind::LocalTime | TemporalKind::Time => {
            inner.wrap("STRFTIME('%H:%M:%f', ", ")")
        }
        TemporalKind::LocalDateTime | TemporalKind::DateTime => {
            inner.wrap("STRFTIME('%Y-%m-%dT%H:%M:%f', ", ")")
        }
    })
}

fn translate_duration_between(
    tr: &mut ExpressionTranslator,
    call: &FunctionCall,
    canonical: &str,
) -> Result<SqlFragment, TranslatorError> {
    let a = tr.translate_scalar(&call.args[0])?;
    let b = tr.translate_scalar(&call.args[1])?;

    let day_diff = {
        let mut frag = SqlFragment::new("JULIANDAY(");
        frag.push_fragment(b.clone());
        frag.push(") - JULIANDAY(");
        frag.push_fragment(a.clone());
        frag.push(")");
        frag
    };

    Ok(match canonical {
        "duration.inseconds" => {
            let mut frag = SqlFragment::new("printf('PT%dS', CAST(ROUND((");
            frag.push_fragment(day_diff);
            frag.push(") * 86400) AS INTEGER))");
            frag
        }
        "duration.indays" => {
            let mut frag = SqlFragment::new("printf('P%dD', CAST(");
            frag.push_fragment(day_diff);
            frag.push(" AS INTEGER))");
            frag
        }
        "duration.inmonths" => {
            let mut frag = SqlFragment::new("printf('P%dM', (CAST(STRFTIME('%Y', ");
            frag.push_fragment(b.clone());
            frag.push(") AS INTEGER) - CAST(STRFTIME('%Y', ");
            frag.push_fragment(a.clone());
            frag.push(") AS INTEGER)) * 12 + CAST(STRFTIME('%m', ");
            frag.push_fragment(b);
            frag.push(") AS INTEGER) - CAST(STRFTIME('%m', ");
            frag.push_fragment(a);
            frag.push(") AS INTEGER))");
            frag
        }
        // between: whole days plus the leftover seconds.
        _ => {
            let mut frag = SqlFragment::new("printf('P%dDT%dS', CAST(");
            frag.push_fragment(day_diff.clone());
            frag.push(" AS INTEGER), CAST(ROUND(((");
            frag.push_fragment(day_diff.clone());
            frag.push(") - CAST(");
            frag.push_fragment(day_diff);
            frag.push(" AS INTEGER)) * 86400) AS INTEGER))");
            frag
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_ast::ast::{Expression as E, Literal};
    use crate::sqlite_query_generator::context::TranslationContext;
    use serde_json::json;

    fn translate(expr: E) -> Result<SqlFragment, TranslatorError> {
        let ctx = TranslationContext::default();
        let mut tr = ExpressionTranslator::new(&ctx);
        tr.translate_scalar(&expr)
    }

    fn call(name: &str, args: Vec<E>) -> E {
        E::FunctionCall(FunctionCall::new(name, args))
    }

    #[test]
    fn substring_shifts_to_one_based() {
        let frag = translate(call("substring", vec![E::string("abc"), E::integer(1)])).unwrap();
        assert_eq!(frag.sql, "SUBSTR(?, (1 + 1))");
    }

    #[test]
    fn to_integer_validates_with_glob() {
        let frag = translate(call("toInteger", vec![E::string("42")])).unwrap();
        assert!(frag.sql.contains("GLOB '-[0-9]*'"), "sql: {}", frag.sql);
        assert!(frag.sql.contains("CAST("), "sql: {}", frag.sql);
    }

    #[test]
    fn range_rejects_zero_step() {
        let err = translate(call(
            "range",
            vec![E::integer(0), E::integer(10), E::integer(0)],
        ))
        .unwrap_err();
        assert!(matches!(err, TranslatorError::InvalidArgument(_)));
    }

    #[test]
    fn range_rejects_non_integer_bounds() {
        let err = translate(call(
            "range",
            vec![E::Literal(Literal::Float(1.5)), E::integer(10)],
        ))
        .unwrap_err();
        assert!(matches!(err, TranslatorError::InvalidArgument(_)));
    }

    #[test]
    fn percentile_out_of_range_is_rejected() {
        let err = translate(call(
            "percentileDisc",
            vec![E::integer(10), E::Literal(Literal::Float(1.5))],
        ))
        .unwrap_err();
        assert!(err.to_string().contains("[0, 1]"));
    }

    #[test]
    fn swapped_percentile_arguments_are_detected() {
        let err = translate(call(
            "percentileDisc",
            vec![E::Literal(Literal::Float(0.5)), E::integer(10)],
        ))
        .unwrap_err();
        assert!(err.to_string().contains("swapped"));
    }

    #[test]
    fn datetime_literal_normalizes_at_translation_time() {
        let frag = translate(call("datetime", vec![E::string("20200630T12")])).unwrap();
        assert_eq!(frag.sql, "?");
        assert_eq!(frag.params, vec![json!("2020-06-30T12:00:00Z")]);
    }

    #[test]
    fn date_map_constructs_at_translation_time() {
        let frag = translate(call(
            "date",
            vec![E::Map(vec![
                ("year".into(), E::integer(2020)),
                ("week".into(), E::integer(5)),
                ("dayOfWeek".into(), E::integer(2)),
            ])],
        ))
        .unwrap();
        assert_eq!(frag.params, vec![json!("2020-01-28")]);
    }

    #[test]
    fn duration_map_becomes_iso_parameter() {
        let frag = translate(call(
            "duration",
            vec![E::Map(vec![
                ("days".into(), E::integer(3)),
                ("hours".into(), E::integer(12)),
            ])],
        ))
        .unwrap();
        assert_eq!(frag.params, vec![json!("P3DT12H")]);
    }

    #[test]
    fn unknown_function_is_an_error() {
        let ctx = TranslationContext::default();
        let mut tr = ExpressionTranslator::new(&ctx);
        let err = tr
            .translate_scalar(&call("frobnicate", vec![]))
            .unwrap_err();
        assert!(matches!(err, TranslatorError::UnknownFunction(_)));
    }
}
