//! Abstract syntax tree produced by the parser.
//!
//! Every expression and statement carries the 1-based source line it started
//! on; the compiler threads the lines into the bytecode for stack traces.

use crate::value::Kind;

/// A typed assignment marker (`=s`, `=i`, `=f`, `=b`, `=l`, `=d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMarker {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
}

impl TypeMarker {
    /// The marker as written in source.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "=s",
            Self::Int => "=i",
            Self::Float => "=f",
            Self::Bool => "=b",
            Self::List => "=l",
            Self::Dict => "=d",
        }
    }

    /// The value kind this marker accepts.
    #[must_use]
    pub fn kind(self) -> Kind {
        match self {
            Self::Str => Kind::Str,
            Self::Int => Kind::Int,
            Self::Float => Kind::Float,
            Self::Bool => Kind::Bool,
            Self::List => Kind::List,
            Self::Dict => Kind::Dict,
        }
    }
}

/// A literal value as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Binary operators, including the short-circuit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An expression with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Var(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// The `call name(index)` indexing form.
    Index {
        name: String,
        index: Box<Expr>,
    },
    ListLit(Vec<Expr>),
    DictLit(Vec<(Expr, Expr)>),
}

/// A function parameter: name plus required type marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub marker: TypeMarker,
}

/// A brace-delimited statement sequence.
pub type Block = Vec<Stmt>;

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarAssign {
        name: String,
        marker: TypeMarker,
        value: Expr,
    },
    If {
        /// `(condition, block)` for the `if` and every `elif`.
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        var: String,
        iterable: Expr,
        body: Block,
    },
    Stop,
    Continue,
    FuncDef {
        name: String,
        params: Vec<Param>,
        body: Block,
    },
    Return {
        value: Option<Expr>,
    },
    Match {
        scrutinee: Expr,
        /// Case heads are restricted to literals.
        cases: Vec<(Literal, Block)>,
        else_block: Option<Block>,
    },
    Import {
        path: String,
    },
    Export {
        name: String,
    },
    /// `set name(index) to value` for both lists and dicts.
    SetIndex {
        name: String,
        index: Expr,
        value: Expr,
    },
    /// `add name(value)`
    ListAdd {
        name: String,
        value: Expr,
    },
    /// `insert name(index, value)`
    ListInsert {
        name: String,
        index: Expr,
        value: Expr,
    },
    /// `remove name(index)` — index for lists, key for dicts.
    Remove {
        name: String,
        index: Expr,
    },
    /// `trace on` / `trace off`
    TraceToggle {
        on: bool,
    },
    /// A statement-level expression, notably calls and `call name(idx)`.
    Expr(Expr),
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}
