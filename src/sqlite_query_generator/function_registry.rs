//! Cypher function registry.
//!
//! One table maps lowercase function names to their arity bounds,
//! aggregate/scalar classification, determinism, and static result type.
//! The SQL emission itself lives in [`super::function_translator`]; keeping
//! the metadata table-driven is what lets the "no non-deterministic
//! function inside an aggregate" rule be enforced in one place.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::errors::TranslatorError;
use super::expression::StaticType;
use super::temporal::TemporalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    /// Canonical lowercase name, used by the emission match.
    pub canonical: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub kind: FunctionKind,
    pub deterministic: bool,
    pub result: StaticType,
}

impl FunctionSpec {
    pub fn check_arity(&self, name: &str, count: usize) -> Result<(), TranslatorError> {
        if count < self.min_args || self.max_args.map(|max| count > max).unwrap_or(false) {
            let expected = match (self.min_args, self.max_args) {
                (min, Some(max)) if min == max => format!("{}", min),
                (min, Some(max)) => format!("{}..{}", min, max),
                (min, None) => format!("at least {}", min),
            };
            return Err(TranslatorError::invalid_argument(format!(
                "{}() expects {} argument(s), got {}",
                name, expected, count
            )));
        }
        Ok(())
    }
}

macro_rules! spec {
    ($map:ident, $name:literal, $min:literal..=$max:literal, $kind:ident, det: $det:literal, $result:expr) => {
        $map.insert(
            $name,
            FunctionSpec {
                canonical: $name,
                min_args: $min,
                max_args: Some($max),
                kind: FunctionKind::$kind,
                deterministic: $det,
                result: $result,
            },
        );
    };
    ($map:ident, $name:literal, $min:literal.., $kind:ident, det: $det:literal, $result:expr) => {
        $map.insert(
            $name,
            FunctionSpec {
                canonical: $name,
                min_args: $min,
                max_args: None,
                kind: FunctionKind::$kind,
                deterministic: $det,
                result: $result,
            },
        );
    };
}

lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionSpec> = {
        let mut m = HashMap::new();

        // ===== AGGREGATES =====
        spec!(m, "count", 0..=1, Aggregate, det: true, StaticType::Integer);
        spec!(m, "sum", 1..=1, Aggregate, det: true, StaticType::Unknown);
        spec!(m, "avg", 1..=1, Aggregate, det: true, StaticType::Float);
        spec!(m, "min", 1..=1, Aggregate, det: true, StaticType::Unknown);
        spec!(m, "max", 1..=1, Aggregate, det: true, StaticType::Unknown);
        spec!(m, "collect", 1..=1, Aggregate, det: true, StaticType::List);
        spec!(m, "percentiledisc", 2..=2, Aggregate, det: true, StaticType::Unknown);
        spec!(m, "percentilecont", 2..=2, Aggregate, det: true, StaticType::Float);

        // ===== SCALAR =====
        spec!(m, "coalesce", 1.., Scalar, det: true, StaticType::Unknown);

        // math
        spec!(m, "abs", 1..=1, Scalar, det: true, StaticType::Unknown);
        spec!(m, "round", 1..=2, Scalar, det: true, StaticType::Float);
        spec!(m, "floor", 1..=1, Scalar, det: true, StaticType::Float);
        spec!(m, "ceil", 1..=1, Scalar, det: true, StaticType::Float);
        spec!(m, "sqrt", 1..=1, Scalar, det: true, StaticType::Float);
        spec!(m, "sign", 1..=1, Scalar, det: true, StaticType::Integer);
        spec!(m, "rand", 0..=0, Scalar, det: false, StaticType::Float);

        // lists and collections
        spec!(m, "size", 1..=1, Scalar, det: true, StaticType::Integer);
        spec!(m, "head", 1..=1, Scalar, det: true, StaticType::Unknown);
        spec!(m, "last", 1..=1, Scalar, det: true, StaticType::Unknown);
        spec!(m, "tail", 1..=1, Scalar, det: true, StaticType::List);
        spec!(m, "keys", 1..=1, Scalar, det: true, StaticType::List);
        spec!(m, "range", 2..=3, Scalar, det: true, StaticType::List);
        spec!(m, "reverse", 1..=1, Scalar, det: true, StaticType::Unknown);

        // strings
        spec!(m, "split", 2..=2, Scalar, det: true, StaticType::List);
        spec!(m, "toupper", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "tolower", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "trim", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "ltrim", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "rtrim", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "substring", 2..=3, Scalar, det: true, StaticType::String);
        spec!(m, "replace", 3..=3, Scalar, det: true, StaticType::String);
        spec!(m, "left", 2..=2, Scalar, det: true, StaticType::String);
        spec!(m, "right", 2..=2, Scalar, det: true, StaticType::String);
        spec!(m, "tostring", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "tointeger", 1..=1, Scalar, det: true, StaticType::Integer);
        spec!(m, "tofloat", 1..=1, Scalar, det: true, StaticType::Float);
        spec!(m, "toboolean", 1..=1, Scalar, det: true, StaticType::Boolean);

        // nodes, relationships, paths
        spec!(m, "labels", 1..=1, Scalar, det: true, StaticType::List);
        spec!(m, "type", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "properties", 1..=1, Scalar, det: true, StaticType::Map);
        spec!(m, "id", 1..=1, Scalar, det: true, StaticType::String);
        spec!(m, "length", 1..=1, Scalar, det: true, StaticType::Integer);
        spec!(m, "nodes", 1..=1, Scalar, det: true, StaticType::List);
        spec!(m, "relationships", 1..=1, Scalar, det: true, StaticType::List);

        // temporal constructors are deterministic with arguments; the
        // zero-argument "now" forms are rejected inside aggregates by the
        // emitter.
        spec!(m, "date", 0..=1, Scalar, det: true, StaticType::Temporal(TemporalKind::Date));
        spec!(m, "localtime", 0..=1, Scalar, det: true, StaticType::Temporal(TemporalKind::LocalTime));
        spec!(m, "time", 0..=1, Scalar, det: true, StaticType::Temporal(TemporalKind::Time));
        spec!(m, "localdatetime", 0..=1, Scalar, det: true, StaticType::Temporal(TemporalKind::LocalDateTime));
        spec!(m, "datetime", 0..=1, Scalar, det: true, StaticType::Temporal(TemporalKind::DateTime));
        spec!(m, "timestamp", 0..=0, Scalar, det: false, StaticType::Integer);

        spec!(m, "duration", 1..=1, Scalar, det: true, StaticType::Duration);
        spec!(m, "duration.between", 2..=2, Scalar, det: true, StaticType::Duration);
        spec!(m, "duration.inmonths", 2..=2, Scalar, det: true, StaticType::Duration);
        spec!(m, "duration.indays", 2..=2, Scalar, det: true, StaticType::Duration);
        spec!(m, "duration.inseconds", 2..=2, Scalar, det: true, StaticType::Duration);

        m
    };
}

pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.get(name.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("toUpper").is_some());
        assert!(lookup("COUNT").is_some());
        assert!(lookup("no_such_function").is_none());
    }

    #[test]
    fn arity_errors_name_the_function() {
        let spec = lookup("substring").unwrap();
        let err = spec.check_arity("substring", 1).unwrap_err();
        assert!(err.to_string().contains("substring()"));
        assert!(spec.check_arity("substring", 2).is_ok());
        assert!(spec.check_arity("substring", 3).is_ok());
    }

    #[test]
    fn aggregates_are_classified() {
        assert_eq!(lookup("collect").unwrap().kind, FunctionKind::Aggregate);
        assert_eq!(lookup("size").unwrap().kind, FunctionKind::Scalar);
        assert!(!lookup("rand").unwrap().deterministic);
    }
}
