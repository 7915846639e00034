//! The closed AST sum type produced by the parser (spec §3, "AST nodes").
//!
//! Kept as an exhaustively-matched enum rather than a trait-object visitor
//! hierarchy per the REDESIGN FLAGS (spec §9): no dynamic dispatch on node
//! kind, only on the dialect.

/// Inferred primitive kind of a literal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    /// A FHIRPath quantity literal (`4 days`, `10 'mg'`). `value` holds the
    /// numeric part and unit joined as `"<number>|<unit>"`.
    Quantity,
}

/// Discriminates the `Operator` node's semantics (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Binary,
    Unary,
    Comparison,
    Logical,
    Union,
}

/// Which of `is` / `as` / `ofType` a `TypeOperation` node represents
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    Is,
    As,
    OfType,
}

/// A node in the FHIRPath abstract syntax tree.
///
/// Every variant carries the source text it was parsed from (for
/// diagnostics) and its child nodes, where applicable.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Literal {
        kind: LiteralKind,
        value: String,
        text: String,
    },
    Identifier {
        name: String,
        text: String,
    },
    FunctionCall {
        name: String,
        target: Option<Box<AstNode>>,
        args: Vec<AstNode>,
        text: String,
    },
    Operator {
        operator_text: String,
        kind: OperatorKind,
        children: Vec<AstNode>,
        text: String,
    },
    Conditional {
        children: Vec<AstNode>,
        text: String,
    },
    Aggregation {
        function: String,
        kind: AggregationKind,
        target: Box<AstNode>,
        text: String,
    },
    TypeOperation {
        operation: TypeOp,
        target_type: String,
        target: Box<AstNode>,
        text: String,
    },
}

/// Which aggregate function an `Aggregation` node invokes (spec §4.4,
/// "visit_aggregation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    AllTrue,
    AnyTrue,
    AllFalse,
    AnyFalse,
}

impl AstNode {
    /// The original source text this node was parsed from, used in
    /// diagnostics and masked-expression snippet search.
    pub fn text(&self) -> &str {
        match self {
            AstNode::Literal { text, .. } => text,
            AstNode::Identifier { text, .. } => text,
            AstNode::FunctionCall { text, .. } => text,
            AstNode::Operator { text, .. } => text,
            AstNode::Conditional { text, .. } => text,
            AstNode::Aggregation { text, .. } => text,
            AstNode::TypeOperation { text, .. } => text,
        }
    }

    /// Direct children, in left-to-right evaluation order (spec §5,
    /// "Ordering guarantees").
    pub fn children(&self) -> Vec<&AstNode> {
        match self {
            AstNode::Literal { .. } | AstNode::Identifier { .. } => Vec::new(),
            AstNode::FunctionCall { target, args, .. } => {
                let mut out: Vec<&AstNode> = target.iter().map(|b| b.as_ref()).collect();
                out.extend(args.iter());
                out
            }
            AstNode::Operator { children, .. } => children.iter().collect(),
            AstNode::Conditional { children, .. } => children.iter().collect(),
            AstNode::Aggregation { target, .. } => vec![target.as_ref()],
            AstNode::TypeOperation { target, .. } => vec![target.as_ref()],
        }
    }
}
