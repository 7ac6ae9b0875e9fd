use arrow_schema::{DataType, Schema};
use csql_catalog::SourceKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Unresolved column name; never survives analysis.
    Column(String),
    /// Resolved column reference into the input row.
    ColumnRef { name: String, index: usize },
    Literal(LiteralValue),
    Cast {
        expr: Box<Expr>,
        to_type: DataType,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// A registry-resolved scalar function call.
    ///
    /// `arg_types` are the declared types of the resolved overload, so the
    /// runtime lookup lands on exactly the callable analysis bound.
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        arg_types: Vec<DataType>,
        return_type: DataType,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AggExpr {
    Count(Expr),
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Avg(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Full,
}

/// The logical operator tree.
///
/// Every node carries its output schema and key field, computed bottom-up at
/// build time; the tree is immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalPlan {
    SourceScan {
        source: String,
        topic: String,
        kind: SourceKind,
        schema: Schema,
        key_field: Option<String>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    Project {
        exprs: Vec<(Expr, String)>,
        schema: Schema,
        input: Box<LogicalPlan>,
    },
    Aggregate {
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        schema: Schema,
        key_field: Option<String>,
        input: Box<LogicalPlan>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        /// Resolved equality pair `(left_key, right_key)`.
        on: (String, String),
        join_type: JoinType,
        schema: Schema,
        key_field: Option<String>,
    },
    Sink {
        name: String,
        kind: SourceKind,
        schema: Schema,
        key_field: Option<String>,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn schema(&self) -> &Schema {
        match self {
            LogicalPlan::SourceScan { schema, .. }
            | LogicalPlan::Project { schema, .. }
            | LogicalPlan::Aggregate { schema, .. }
            | LogicalPlan::Join { schema, .. }
            | LogicalPlan::Sink { schema, .. } => schema,
            LogicalPlan::Filter { input, .. } => input.schema(),
        }
    }

    pub fn key_field(&self) -> Option<&str> {
        match self {
            LogicalPlan::SourceScan { key_field, .. }
            | LogicalPlan::Aggregate { key_field, .. }
            | LogicalPlan::Join { key_field, .. }
            | LogicalPlan::Sink { key_field, .. } => key_field.as_deref(),
            LogicalPlan::Filter { input, .. } => input.key_field(),
            LogicalPlan::Project { schema, input, .. } => input
                .key_field()
                .filter(|k| schema.fields().iter().any(|f| f.name() == k)),
        }
    }

    /// Direct child operators, used by inspection code.
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::SourceScan { .. } => vec![],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sink { input, .. } => vec![input.as_ref()],
            LogicalPlan::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }
}
