//! Untyped surface syntax tree.
//!
//! The parser produces these nodes from tokens; all semantic
//! information (types, declarations, constant values) is added by the
//! checker, which lowers this tree into the typed HIR.

use crate::intern::Symbol;
use crate::span::Pos;
use crate::types::IntKind;

/// A parsed compilation unit: the top-level statement sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    Int(IntKind),
    Bool,
    Str,
    CStr,
    Named(Symbol),
    Ptr(Box<TypeExpr>),
    Array { len: ArrayLen, item: Box<TypeExpr> },
}

/// Array length position in a type: `[]T` or `[expr]T`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayLen {
    Dynamic,
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Str(String),
    Ident(Symbol),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        value: Box<Expr>,
        ty: TypeExpr,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        base: Box<Expr>,
        name: Symbol,
        name_pos: Pos,
    },
    /// `.length` pseudo-member.
    Length {
        base: Box<Expr>,
    },
    ArrayLit(Vec<Expr>),
    New {
        ty: TypeExpr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Compl,
    AddrOf,
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    BitOr,
    BitXor,
    Mul,
    Div,
    Rem,
    BitAnd,
}

impl BinOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        use BinOp::*;
        match self {
            Or => 1,
            And => 2,
            Eq | Ne => 3,
            Lt | Gt | Le | Ge => 4,
            Add | Sub | BitOr | BitXor => 5,
            Mul | Div | Rem | BitAnd => 6,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(&self) -> &'static str {
        use BinOp::*;
        match self {
            Or => "||",
            And => "&&",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Add => "+",
            Sub => "-",
            BitOr => "|",
            BitXor => "^",
            Mul => "*",
            Div => "//",
            Rem => "%",
            BitAnd => "&",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumItemAst {
    pub name: Symbol,
    pub value: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Print(Vec<Expr>),
    Var {
        name: Symbol,
        ty: TypeExpr,
        init: Option<Expr>,
        exported: bool,
    },
    Func {
        name: Symbol,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Vec<Stmt>,
        exported: bool,
    },
    Record {
        name: Symbol,
        is_union: bool,
        members: Vec<Field>,
        exported: bool,
    },
    Enum {
        name: Symbol,
        items: Vec<EnumItemAst>,
        exported: bool,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    ForRange {
        var: Symbol,
        var_pos: Pos,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    ForEach {
        var: Symbol,
        var_pos: Pos,
        seq: Expr,
        body: Vec<Stmt>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Call(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Delete(Expr),
    Import {
        /// Explicit name list, or `None` for a bare import of every
        /// exported declaration.
        names: Option<Vec<(Symbol, Pos)>>,
        path: String,
    },
    Foreign {
        lib: String,
        items: Vec<ForeignItem>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForeignItem {
    Func {
        name: Symbol,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        pos: Pos,
    },
    Var {
        name: Symbol,
        ty: TypeExpr,
        pos: Pos,
    },
}
