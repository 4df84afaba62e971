//! Cypher concrete syntax tree.
//!
//! These types represent parsed Cypher scripts. They are pure data —
//! no behavior beyond small structural accessors, no storage references,
//! no execution logic. Backends read clause data from these nodes and
//! never re-tokenize the source.

// ============================================================================
// Script structure
// ============================================================================

/// A parsed script: one or more queries separated by semicolons.
#[derive(Debug, Clone)]
pub struct Script {
    pub queries: Vec<Query>,
}

/// One query in a script.
#[derive(Debug, Clone)]
pub enum Query {
    Regular(RegularQuery),
    /// Standalone `CALL proc(args) [YIELD cols]`.
    StandaloneCall(CallClause),
    Show(ShowCommand),
    Schema(SchemaCommand),
    Transaction(TxCommand),
}

/// A regular query: zero or more WITH-terminated parts, then a final part.
#[derive(Debug, Clone)]
pub struct RegularQuery {
    pub parts: Vec<QueryPart>,
    pub tail: SinglePart,
}

/// A WITH-terminated segment of a multi-part query.
#[derive(Debug, Clone)]
pub struct QueryPart {
    pub clauses: Vec<Clause>,
    pub with: WithClause,
}

/// The final segment: clauses plus an optional RETURN.
#[derive(Debug, Clone)]
pub struct SinglePart {
    pub clauses: Vec<Clause>,
    pub return_clause: Option<ReturnClause>,
}

/// A reading or updating clause, in source order.
#[derive(Debug, Clone)]
pub enum Clause {
    Reading(ReadingClause),
    Updating(UpdatingClause),
}

#[derive(Debug, Clone)]
pub enum ReadingClause {
    Match(MatchClause),
    Unwind(UnwindClause),
    Call(CallClause),
}

#[derive(Debug, Clone)]
pub enum UpdatingClause {
    Create(CreateClause),
    Merge(MergeClause),
    Delete(DeleteClause),
    Set(SetClause),
    Remove(RemoveClause),
}

impl SinglePart {
    pub fn has_updates(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::Updating(_)))
    }
}

// ============================================================================
// Reading clauses
// ============================================================================

/// MATCH / OPTIONAL MATCH with patterns and optional WHERE.
#[derive(Debug, Clone)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<PatternPart>,
    pub where_clause: Option<Expr>,
}

/// UNWIND expr AS variable.
#[derive(Debug, Clone)]
pub struct UnwindClause {
    pub expr: Expr,
    pub alias: String,
}

/// CALL name(args) [YIELD columns].
#[derive(Debug, Clone)]
pub struct CallClause {
    pub name: String,
    pub args: Vec<Expr>,
    pub yields: Vec<String>,
}

// ============================================================================
// Updating clauses
// ============================================================================

/// CREATE with one or more patterns.
#[derive(Debug, Clone)]
pub struct CreateClause {
    pub patterns: Vec<PatternPart>,
}

/// MERGE with optional ON CREATE / ON MATCH actions.
#[derive(Debug, Clone)]
pub struct MergeClause {
    pub pattern: PatternPart,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
}

/// [DETACH] DELETE var, var, ...
#[derive(Debug, Clone)]
pub struct DeleteClause {
    pub detach: bool,
    pub variables: Vec<String>,
}

/// SET with one or more assignments.
#[derive(Debug, Clone)]
pub struct SetClause {
    pub items: Vec<SetItem>,
}

/// REMOVE with one or more items.
#[derive(Debug, Clone)]
pub struct RemoveClause {
    pub items: Vec<RemoveItem>,
}

/// Single SET item.
#[derive(Debug, Clone)]
pub enum SetItem {
    /// SET n.prop = expr
    Property { variable: String, key: String, value: Expr },
    /// SET n = {map}
    AllProperties { variable: String, value: Expr },
    /// SET n += {map}
    MergeProperties { variable: String, value: Expr },
    /// SET n:Label
    Label { variable: String, label: String },
}

/// Single REMOVE item.
#[derive(Debug, Clone)]
pub enum RemoveItem {
    /// REMOVE n.prop
    Property { variable: String, key: String },
    /// REMOVE n:Label
    Label { variable: String, label: String },
}

// ============================================================================
// Patterns
// ============================================================================

/// One comma-separated pattern part, optionally named: `p = (a)-[r]->(b)`.
#[derive(Debug, Clone)]
pub struct PatternPart {
    pub variable: Option<String>,
    pub shortest: Option<ShortestKind>,
    pub start: NodePattern,
    pub chain: Vec<(RelPattern, NodePattern)>,
}

/// shortestPath(...) / allShortestPaths(...) wrapper in pattern position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortestKind {
    Single,
    All,
}

/// Node pattern: (alias:Label1:Label2 {prop: value}).
#[derive(Debug, Clone)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

/// Relationship pattern: -[alias:TYPE1|TYPE2 *min..max {props}]->.
#[derive(Debug, Clone)]
pub struct RelPattern {
    pub variable: Option<String>,
    pub rel_types: Vec<String>,
    pub direction: PatternDirection,
    pub properties: Vec<(String, Expr)>,
    pub var_length: Option<VarLength>,
}

/// Pattern direction, as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    /// -[]->
    Outgoing,
    /// <-[]-
    Incoming,
    /// -[]-
    Undirected,
}

/// Variable-length span `*min..max`. `None` bounds take the engine defaults.
#[derive(Debug, Clone, Copy)]
pub struct VarLength {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

// ============================================================================
// Projections
// ============================================================================

/// RETURN clause with its trailing modifiers.
#[derive(Debug, Clone)]
pub struct ReturnClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

/// WITH clause: a projection that rewrites the binding set.
#[derive(Debug, Clone)]
pub struct WithClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    /// WHERE after WITH; acts as HAVING when the projection aggregates.
    pub where_clause: Option<Expr>,
}

/// Single projection item.
#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ProjectionItem {
    /// Does this item trigger aggregation?
    pub fn has_aggregate(&self) -> bool {
        self.expr.contains_aggregate()
    }
}

/// ORDER BY item.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: Expr,
    pub ascending: bool,
}

// ============================================================================
// Commands
// ============================================================================

/// SHOW commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowCommand {
    Indexes,
    Constraints,
    Procedures,
    Functions,
}

/// Transaction control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCommand {
    Begin,
    Commit,
    Rollback,
}

/// Schema commands (CREATE/DROP INDEX, CREATE/DROP CONSTRAINT).
#[derive(Debug, Clone)]
pub enum SchemaCommand {
    CreateIndex { name: Option<String>, label: String, properties: Vec<String> },
    DropIndex { name: String },
    CreateConstraint {
        name: Option<String>,
        label: String,
        property: String,
        constraint_type: String,
    },
    DropConstraint { name: String },
}

// ============================================================================
// Expressions
// ============================================================================

/// Expression in Cypher.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value
    Literal(Literal),
    /// Variable reference: `n`, `r`, `p`
    Variable(String),
    /// Parameter: `$name`
    Parameter(String),
    /// Property access: `n.name`
    Property { expr: Box<Expr>, key: String },
    /// Function call: `count(n)`, `id(n)`, `labels(n)`
    FunctionCall { name: String, args: Vec<Expr>, distinct: bool },
    /// Binary operation: `a + b`, `a = b`, `a AND b`
    BinaryOp { left: Box<Expr>, op: BinaryOp, right: Box<Expr> },
    /// Unary operation: `NOT a`, `-a`
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    /// List: `[1, 2, 3]`
    List(Vec<Expr>),
    /// Map: `{name: 'Ada', age: 3}` — entries keep source order
    MapLiteral(Vec<(String, Expr)>),
    /// CASE expression (simple when `operand` is present, searched otherwise)
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// IN predicate: `x IN [1, 2, 3]`
    In { expr: Box<Expr>, list: Box<Expr> },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// Label check: `n:Person`
    HasLabel { expr: Box<Expr>, label: String },
    /// String operations: STARTS WITH, ENDS WITH, CONTAINS
    StringOp { left: Box<Expr>, op: StringOp, right: Box<Expr> },
    /// List comprehension: `[x IN list WHERE pred | expr]`
    ListComprehension {
        variable: String,
        list: Box<Expr>,
        predicate: Option<Box<Expr>>,
        projection: Option<Box<Expr>>,
    },
    /// EXISTS { pattern [WHERE ...] }
    ExistsSubquery(Box<SubqueryPattern>),
    /// COUNT { pattern [WHERE ...] }
    CountSubquery(Box<SubqueryPattern>),
    /// Wildcard: `*` (in RETURN *)
    Star,
}

/// The body of an EXISTS / COUNT subquery expression.
#[derive(Debug, Clone)]
pub struct SubqueryPattern {
    pub patterns: Vec<PatternPart>,
    pub where_clause: Option<Expr>,
}

/// Literal values.
#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod, Pow,
    // Comparison
    Eq, Neq, Lt, Lte, Gt, Gte,
    // Logical
    And, Or, Xor,
    // String
    RegexMatch,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// String-specific operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    StartsWith,
    EndsWith,
    Contains,
}

/// Names of the aggregation builtins.
pub const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "avg", "min", "max", "collect"];

pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.iter().any(|f| name.eq_ignore_ascii_case(f))
}

impl Expr {
    /// Does any aggregation call appear in this expression tree?
    ///
    /// Subquery expressions are opaque: aggregates inside EXISTS/COUNT bodies
    /// belong to the subquery, not to the enclosing projection.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::FunctionCall { name, args, .. } => {
                is_aggregate_function(name) || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Property { expr, .. } => expr.contains_aggregate(),
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::UnaryOp { expr, .. } => expr.contains_aggregate(),
            Expr::List(items) => items.iter().any(Expr::contains_aggregate),
            Expr::MapLiteral(entries) => entries.iter().any(|(_, e)| e.contains_aggregate()),
            Expr::Case { operand, whens, else_expr } => {
                operand.as_deref().is_some_and(Expr::contains_aggregate)
                    || whens.iter().any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || else_expr.as_deref().is_some_and(Expr::contains_aggregate)
            }
            Expr::In { expr, list } => expr.contains_aggregate() || list.contains_aggregate(),
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            Expr::HasLabel { expr, .. } => expr.contains_aggregate(),
            Expr::StringOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::ListComprehension { list, predicate, projection, .. } => {
                list.contains_aggregate()
                    || predicate.as_deref().is_some_and(Expr::contains_aggregate)
                    || projection.as_deref().is_some_and(Expr::contains_aggregate)
            }
            Expr::Literal(_)
            | Expr::Variable(_)
            | Expr::Parameter(_)
            | Expr::ExistsSubquery(_)
            | Expr::CountSubquery(_)
            | Expr::Star => false,
        }
    }
}

// ============================================================================
// Rendering (column names for unaliased projections)
// ============================================================================

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::RegexMatch => "=~",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Literal::Null) => write!(f, "NULL"),
            Expr::Literal(Literal::Bool(b)) => write!(f, "{b}"),
            Expr::Literal(Literal::Int(i)) => write!(f, "{i}"),
            Expr::Literal(Literal::Float(v)) => write!(f, "{v}"),
            Expr::Literal(Literal::String(s)) => write!(f, "'{s}'"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Parameter(name) => write!(f, "${name}"),
            Expr::Property { expr, key } => write!(f, "{expr}.{key}"),
            Expr::FunctionCall { name, args, distinct } => {
                if args.is_empty() && is_aggregate_function(name) {
                    return write!(f, "{name}(*)");
                }
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                if *distinct {
                    write!(f, "{name}(DISTINCT {})", rendered.join(", "))
                } else {
                    write!(f, "{name}({})", rendered.join(", "))
                }
            }
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op: UnaryOp::Not, expr } => write!(f, "NOT {expr}"),
            Expr::UnaryOp { op: UnaryOp::Negate, expr } => write!(f, "-{expr}"),
            Expr::List(items) => {
                let rendered: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Expr::MapLiteral(entries) => {
                let rendered: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Expr::Case { .. } => write!(f, "CASE"),
            Expr::In { expr, list } => write!(f, "{expr} IN {list}"),
            Expr::IsNull { expr, negated: false } => write!(f, "{expr} IS NULL"),
            Expr::IsNull { expr, negated: true } => write!(f, "{expr} IS NOT NULL"),
            Expr::HasLabel { expr, label } => write!(f, "{expr}:{label}"),
            Expr::StringOp { left, op: StringOp::StartsWith, right } => {
                write!(f, "{left} STARTS WITH {right}")
            }
            Expr::StringOp { left, op: StringOp::EndsWith, right } => {
                write!(f, "{left} ENDS WITH {right}")
            }
            Expr::StringOp { left, op: StringOp::Contains, right } => {
                write!(f, "{left} CONTAINS {right}")
            }
            Expr::ListComprehension { variable, list, .. } => {
                write!(f, "[{variable} IN {list} ...]")
            }
            Expr::ExistsSubquery(_) => write!(f, "EXISTS {{ ... }}"),
            Expr::CountSubquery(_) => write!(f, "count {{ ... }}"),
            Expr::Star => write!(f, "*"),
        }
    }
}
