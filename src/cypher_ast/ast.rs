use std::{cell::RefCell, fmt, rc::Rc};

/// A complete Cypher query: an ordered list of clauses.
///
/// Clause order is meaningful - the translator processes clauses first to
/// last, and a `RETURN` (or standalone `CALL`) terminates the read side of
/// the query by synthesizing one composite SELECT.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

/// One Cypher clause.
#[derive(Debug, PartialEq, Clone)]
pub enum Clause {
    Match(MatchClause),
    OptionalMatch(MatchClause),
    Create(CreateClause),
    Merge(MergeClause),
    Set(SetClause),
    Remove(RemoveClause),
    Delete(DeleteClause),
    With(ProjectionClause),
    Return(ProjectionClause),
    Unwind(UnwindClause),
    Union(UnionClause),
    Call(CallClause),
}

/// MATCH or OPTIONAL MATCH (which of the two is carried by the `Clause`
/// variant wrapping this struct).
#[derive(Debug, PartialEq, Clone)]
pub struct MatchClause {
    pub patterns: Vec<PathPattern>,
    /// WHERE attached to this MATCH (OpenCypher grammar allows one per MATCH).
    pub where_clause: Option<WhereCondition>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CreateClause {
    pub patterns: Vec<PathPattern>,
}

/// MERGE supports exactly one node pattern in translator scope; multiple
/// patterns or relationship patterns are rejected as unsupported.
#[derive(Debug, PartialEq, Clone)]
pub struct MergeClause {
    pub patterns: Vec<PathPattern>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SetClause {
    pub items: Vec<SetItem>,
}

/// One item of a SET clause.
///
/// Examples: `n.age = 42`, `n:Admin:Verified`, `n = {name: 'x'}`,
/// `n += {age: 42}`.
#[derive(Debug, PartialEq, Clone)]
pub enum SetItem {
    /// `n.key = expr`
    Property {
        variable: String,
        key: String,
        value: Expression,
    },
    /// `n:Label1:Label2` - label addition
    Labels { variable: String, labels: Vec<String> },
    /// `n = {..}` - replace the whole property map
    ReplaceMap { variable: String, value: Expression },
    /// `n += {..}` - merge into the property map (null values remove keys)
    MergeMap { variable: String, value: Expression },
}

#[derive(Debug, PartialEq, Clone)]
pub struct RemoveClause {
    pub items: Vec<RemoveItem>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RemoveItem {
    /// `REMOVE n.key`
    Property { variable: String, key: String },
    /// `REMOVE n:Label1:Label2`
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeleteClause {
    /// DETACH DELETE first removes incident edges.
    pub detach: bool,
    /// The variables to delete (each must resolve to a node or edge).
    pub items: Vec<Expression>,
}

/// UNWIND transforms a list into rows.
///
/// Example: `UNWIND [1, 2, 3] AS x`, `UNWIND n.tags AS tag`.
#[derive(Debug, PartialEq, Clone)]
pub struct UnwindClause {
    pub expression: Expression,
    pub alias: String,
}

/// A UNION arm. Appears in the clause list after the left-hand query's
/// RETURN; the right-hand side is a complete query of its own.
#[derive(Debug, PartialEq, Clone)]
pub struct UnionClause {
    /// UNION ALL keeps duplicates; plain UNION removes them.
    pub all: bool,
    pub query: Query,
}

/// CALL of a supported metadata procedure.
///
/// Only `db.labels` and `db.relationshipTypes` are in translator scope.
#[derive(Debug, PartialEq, Clone)]
pub struct CallClause {
    /// Dotted procedure name, e.g. `"db.labels"`.
    pub procedure: String,
    /// Optional YIELD name override; defaults to the procedure's yield column.
    pub yield_alias: Option<String>,
    /// WHERE over the yielded column.
    pub where_clause: Option<WhereCondition>,
}

/// RETURN or WITH (which of the two is carried by the `Clause` variant).
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ProjectionClause {
    pub distinct: bool,
    /// `RETURN *` / `WITH *` - expands to all bound variables; explicit
    /// `items` after the star are kept in addition.
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<OrderByItem>,
    /// SKIP count - an integer literal or a parameter.
    pub skip: Option<Expression>,
    /// LIMIT count - an integer literal or a parameter.
    pub limit: Option<Expression>,
    /// WHERE after WITH, filtering the intermediate rows.
    pub where_clause: Option<WhereCondition>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ProjectionItem {
    pub expression: Expression,
    /// Explicit `AS` alias. For plain variable projections the variable name
    /// is used when absent; every other expression shape requires one.
    pub alias: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct OrderByItem {
    pub expression: Expression,
    pub descending: bool,
}

/// Shared node reference. Chained patterns like `(a)-[r1]->(b)-[r2]->(c)`
/// are a list of [`RelationshipPattern`]s where consecutive entries share
/// the middle `NodePattern` by pointer - the registrar relies on `Rc`
/// identity to detect that sharing for anonymous middle nodes.
pub type NodeRef = Rc<RefCell<NodePattern>>;

/// Wrap a [`NodePattern`] into the shared-reference form patterns use.
pub fn node_ref(node: NodePattern) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// One path pattern of a MATCH/CREATE/MERGE clause, with its optional
/// path variable (`p = (a)-[..]-(b)`).
#[derive(Debug, PartialEq, Clone)]
pub struct PathPattern {
    pub variable: Option<String>,
    pub element: PatternElement,
}

impl PathPattern {
    pub fn node(node: NodePattern) -> Self {
        PathPattern {
            variable: None,
            element: PatternElement::Node(node_ref(node)),
        }
    }

    pub fn connected(rels: Vec<RelationshipPattern>) -> Self {
        PathPattern {
            variable: None,
            element: PatternElement::Connected(rels),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum PatternElement {
    /// Standalone node: `(a)`
    Node(NodeRef),
    /// Nodes with relationships: `(a)-[:REL]->(b)-[:REL]->(c)`
    Connected(Vec<RelationshipPattern>),
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct NodePattern {
    /// `a` in `(a:Person)`.
    pub variable: Option<String>,
    /// `Person` in `(a:Person)`; empty means unlabeled.
    pub labels: Vec<String>,
    /// `{name: 'Alice'}` - property equality predicates.
    pub properties: Vec<(String, Expression)>,
}

impl NodePattern {
    pub fn named(variable: impl Into<String>) -> Self {
        NodePattern {
            variable: Some(variable.into()),
            ..Default::default()
        }
    }

    /// First label, for single-label call sites.
    pub fn first_label(&self) -> Option<&str> {
        self.labels.first().map(|l| l.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// `source -edge-> target` (one hop of a path).
#[derive(Debug, PartialEq, Clone)]
pub struct RelationshipPattern {
    pub source: NodeRef,
    pub edge: EdgePattern,
    pub target: NodeRef,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct EdgePattern {
    pub variable: Option<String>,
    /// Relationship types; `[:A|B]` carries both, empty means any type.
    pub types: Vec<String>,
    pub direction: Direction,
    /// `{since: 2020}` - property equality predicates on the edge.
    pub properties: Vec<(String, Expression)>,
    /// `*min..max` - present only for variable-length relationships.
    pub var_length: Option<VarLengthSpec>,
}

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub enum Direction {
    /// `<-[..]-`
    Left,
    /// `-[..]->`
    Right,
    /// `-[..]-`
    #[default]
    Either,
}

/// Variable-length bounds: `*1..3`, `*..5`, `*2`, `*`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct VarLengthSpec {
    pub min_hops: Option<u32>,
    pub max_hops: Option<u32>,
}

impl VarLengthSpec {
    /// `*2` becomes min=2, max=2.
    pub fn fixed(hops: u32) -> Self {
        VarLengthSpec {
            min_hops: Some(hops),
            max_hops: Some(hops),
        }
    }

    /// `*1..3` becomes min=1, max=3.
    pub fn range(min: u32, max: u32) -> Self {
        VarLengthSpec {
            min_hops: Some(min),
            max_hops: Some(max),
        }
    }

    /// `*..5` becomes min=1, max=5.
    pub fn max_only(max: u32) -> Self {
        VarLengthSpec {
            min_hops: Some(1),
            max_hops: Some(max),
        }
    }

    /// `*2..` becomes min=2, unbounded.
    pub fn min_only(min: u32) -> Self {
        VarLengthSpec {
            min_hops: Some(min),
            max_hops: None,
        }
    }

    /// `*` becomes min=1, unbounded.
    pub fn unbounded() -> Self {
        VarLengthSpec {
            min_hops: Some(1),
            max_hops: None,
        }
    }

    /// Effective minimum hops (defaults to 1).
    pub fn effective_min_hops(&self) -> u32 {
        self.min_hops.unwrap_or(1)
    }

    /// True when min and max are both an exact 1 (degenerate single hop).
    pub fn is_single_hop(&self) -> bool {
        self.min_hops == Some(1) && self.max_hops == Some(1)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOp {
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %
    Power,    // ^
    And,
    Or,
    Xor,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ComparisonOp {
    Eq,    // =
    NotEq, // <>
    Lt,    // <
    Lte,   // <=
    Gt,    // >
    Gte,   // >=
}

/// Case-sensitive string predicates.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StringOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ListPredicateKind {
    All,
    Any,
    None,
    Single,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
    /// `count(DISTINCT x)`, `collect(DISTINCT x)`.
    pub distinct: bool,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        FunctionCall {
            name: name.into(),
            args,
            distinct: false,
        }
    }
}

/// CASE expression, simple or searched.
///
/// Simple form carries `operand` and [`CaseWhen::Value`] arms; searched form
/// has no operand and [`CaseWhen::Predicate`] arms.
#[derive(Debug, PartialEq, Clone)]
pub struct CaseExpression {
    pub operand: Option<Box<Expression>>,
    pub when_then: Vec<(CaseWhen, Expression)>,
    pub else_expr: Option<Box<Expression>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum CaseWhen {
    /// Simple CASE: `WHEN <value> THEN ..`
    Value(Expression),
    /// Searched CASE: `WHEN <predicate> THEN ..`
    Predicate(WhereCondition),
}

/// `all(x IN list WHERE cond)` and friends.
#[derive(Debug, PartialEq, Clone)]
pub struct ListPredicate {
    pub kind: ListPredicateKind,
    pub variable: String,
    pub list: Box<Expression>,
    pub condition: Option<Box<WhereCondition>>,
}

/// `[v IN list WHERE filter | projection]`.
#[derive(Debug, PartialEq, Clone)]
pub struct ListComprehension {
    pub variable: String,
    pub list: Box<Expression>,
    pub filter: Option<Box<WhereCondition>>,
    pub projection: Option<Box<Expression>>,
}

/// `[(a)-[:T]->(b) WHERE cond | projection]`.
#[derive(Debug, PartialEq, Clone)]
pub struct PatternComprehension {
    pub pattern: PathPattern,
    pub where_clause: Option<Box<WhereCondition>>,
    pub projection: Box<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A number, string, boolean, or null.
    Literal(Literal),
    /// `$param`.
    Parameter(String),
    /// A bound variable or WITH alias.
    Variable(String),
    /// Static property access on a variable: `n.key`.
    Property { base: String, key: String },
    /// Chained property access on an arbitrary base: `expr.k1.k2`.
    PropertyAccess {
        base: Box<Expression>,
        keys: Vec<String>,
    },
    FunctionCall(FunctionCall),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Case(CaseExpression),
    /// Map literal: `{k1: v1, k2: v2}`.
    Map(Vec<(String, Expression)>),
    /// List literal: `[1, 2, 3]`.
    List(Vec<Expression>),
    ListComprehension(ListComprehension),
    PatternComprehension(PatternComprehension),
    ListPredicate(ListPredicate),
    /// `n:Person` as a boolean expression.
    LabelPredicate {
        variable: String,
        labels: Vec<String>,
    },
    /// `needle IN haystack`.
    In {
        needle: Box<Expression>,
        haystack: Box<Expression>,
    },
    StringOp {
        op: StringOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `list[index]` - 0-based element access.
    Subscript {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    /// `list[from..to]` - half-open slice; both bounds optional.
    Slice {
        base: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
}

impl Expression {
    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Expression::Literal(Literal::Integer(i))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn property(base: impl Into<String>, key: impl Into<String>) -> Self {
        Expression::Property {
            base: base.into(),
            key: key.into(),
        }
    }
}

/// The WHERE condition tree.
///
/// Kept separate from [`Expression`] so the WHERE translator's routing
/// decisions (helper-function comparisons, EXISTS subqueries, pattern
/// predicates) are exhaustive over a closed set of shapes.
#[derive(Debug, PartialEq, Clone)]
pub enum WhereCondition {
    Comparison {
        op: ComparisonOp,
        left: Expression,
        right: Expression,
    },
    And(Box<WhereCondition>, Box<WhereCondition>),
    Or(Box<WhereCondition>, Box<WhereCondition>),
    Not(Box<WhereCondition>),
    StringOp {
        op: StringOp,
        left: Expression,
        right: Expression,
    },
    IsNull {
        expression: Expression,
        negated: bool,
    },
    /// `EXISTS { (pattern) [WHERE ..] }`.
    Exists {
        pattern: PathPattern,
        where_clause: Option<Box<WhereCondition>>,
    },
    /// A bare pattern used as a predicate: `WHERE (a)-[:KNOWS]->(b)`.
    PatternMatch(PathPattern),
    In {
        needle: Expression,
        haystack: Expression,
        negated: bool,
    },
    ListPredicate(ListPredicate),
    /// Any other boolean-valued expression.
    Expression(Expression),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
