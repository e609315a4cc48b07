use anyhow::{anyhow, bail, Result};

use crate::symbols::{GlobalVariable, Locals};
use crate::types::{FunctionType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    LogicalNot,
    AddrOf,
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    // Logical
    LogicalAnd,
    LogicalOr,
    // Comparisons (result is int 0/1)
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::LogicalNot => "!",
            UnaryOp::AddrOf => "&",
            UnaryOp::Deref => "*",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// Member named by `.`/`->`. The parser records only the name; the
/// annotator swaps in the resolved variant once the base type is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Unresolved(String),
    Resolved { name: String, offset: usize, ty: Type },
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Unresolved(name) | Field::Resolved { name, .. } => name,
        }
    }

    pub fn offset(&self) -> Result<usize> {
        match self {
            Field::Resolved { offset, .. } => Ok(*offset),
            Field::Unresolved(name) => bail!("member '{}' was never resolved", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Num(i32),
    Str { id: usize, text: String },
    Local { name: String, offset: usize },
    Global { name: String },
    /// Identifier that matched neither a local nor a global when parsed.
    Unresolved(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    Member { base: Box<Expr>, field: Field, arrow: bool },
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, ty: None }
    }

    pub fn typed(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty: Some(ty) }
    }

    pub fn num(v: i32) -> Self {
        Self::typed(ExprKind::Num(v), Type::Int)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary { op, operand: Box::new(operand) })
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn ty(&self) -> Result<&Type> {
        self.ty
            .as_ref()
            .ok_or_else(|| anyhow!("expression '{}' has no type", self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    VarDecl { name: String, offset: usize, ty: Type, init: Option<Expr> },
    Return(Option<Expr>),
    Break,
    Continue,
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    For { init: Option<Expr>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
    Block(Vec<Stmt>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub ty: FunctionType,
    pub body: Vec<Stmt>,
    /// Parameters followed by every local declared in the body.
    pub locals: Locals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Function(Function),
    Global(GlobalVariable),
    Typedef { name: String, ty: Type },
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Function(f) => &f.name,
            Declaration::Global(g) => &g.name,
            Declaration::Typedef { name, .. } => name,
        }
    }
}
