//! Abstract syntax tree types produced by the parser.

mod expression;
mod statement;
mod types;

pub use expression::{
    BinaryOp, Expr, FrameBound, FrameExclusion, FrameUnits, FunctionCall, InList, Literal,
    UnaryOp, WindowFrame, WindowSpec,
};
pub use statement::{
    CompoundSelect, CreateTable, Cte, Delete, Insert, InsertSource, Join, JoinConstraint,
    JoinType, NullOrdering, OrderBy, OrderDirection, Query, Select, SelectItem, SetOp, Statement,
    TableRef, Update,
};
pub use types::{ColumnDef, TableConstraint};
