//! Typed intermediate representation.
//!
//! The checker lowers the surface tree into these nodes: every name is
//! resolved to a `DeclId`, every expression carries its type, constant
//! subtrees are already folded into literal nodes, and implicit casts
//! have been made explicit. Code generation walks this tree without
//! consulting the source again.

use crate::ast::{BinOp, UnaryOp};
use crate::scope::{DeclId, UnitId};
use crate::span::Pos;
use crate::types::Type;

/// An analyzed unit, ready for code generation.
#[derive(Debug)]
pub struct HirUnit {
    pub unit: UnitId,
    /// Top-level statements in lexical order; these become the unit's
    /// entry function body.
    pub body: Vec<HirStmt>,
    /// Every function declared anywhere in the unit, nested ones
    /// included (they are lifted to the top level in C).
    pub funcs: Vec<HirFunc>,
    /// Struct and union declarations, in definition order.
    pub records: Vec<DeclId>,
    /// Unit-level variables, in declaration order.
    pub globals: Vec<DeclId>,
    /// Foreign prototypes.
    pub foreigns: Vec<DeclId>,
    /// Units this one imports, in first-import order.
    pub imports: Vec<UnitId>,
    /// The builtin `args` global of this unit.
    pub args: DeclId,
}

#[derive(Debug)]
pub struct HirFunc {
    pub decl: DeclId,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone)]
pub struct HirExpr {
    pub kind: HirExprKind,
    /// `None` for calls of functions without a return value.
    pub ty: Option<Type>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub enum HirExprKind {
    Int(i64),
    Bool(bool),
    Str(String),
    /// A folded `as cstring` of a string literal.
    CStr(String),
    Var(DeclId),
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    /// A runtime conversion that survived folding; the target type is
    /// the expression's own `ty`.
    Cast {
        value: Box<HirExpr>,
    },
    Index {
        base: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    Call {
        callee: Box<HirExpr>,
        args: Vec<HirExpr>,
    },
    Member {
        base: Box<HirExpr>,
        field: DeclId,
    },
    /// `.length` of a string, fixed array or dynamic array.
    Length {
        base: Box<HirExpr>,
    },
    ArrayLit(Vec<HirExpr>),
    /// Heap allocation; `len` is present for dynamic arrays whose
    /// length is not a constant.
    New {
        len: Option<Box<HirExpr>>,
    },
}

impl HirExpr {
    pub fn int(value: i64, ty: Type, pos: Pos) -> HirExpr {
        HirExpr {
            kind: HirExprKind::Int(value),
            ty: Some(ty),
            pos,
        }
    }

    /// The constant integer value, if this node folded to one.
    pub fn const_int(&self) -> Option<i64> {
        match self.kind {
            HirExprKind::Int(v) => Some(v),
            HirExprKind::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            HirExprKind::Int(_)
                | HirExprKind::Bool(_)
                | HirExprKind::Str(_)
                | HirExprKind::CStr(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct HirStmt {
    pub kind: HirStmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub enum HirStmtKind {
    Print(Vec<HirExpr>),
    /// Declaration point of a variable; globals get their initializer
    /// run here inside the entry function.
    VarInit {
        decl: DeclId,
        init: Option<HirExpr>,
    },
    If {
        cond: HirExpr,
        then_body: Vec<HirStmt>,
        else_body: Option<Vec<HirStmt>>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    ForRange {
        var: DeclId,
        start: HirExpr,
        end: HirExpr,
        body: Vec<HirStmt>,
    },
    ForEach {
        var: DeclId,
        seq: HirExpr,
        body: Vec<HirStmt>,
    },
    Assign {
        target: HirExpr,
        value: HirExpr,
    },
    Call(HirExpr),
    Return(Option<HirExpr>),
    Break,
    Continue,
    Delete(HirExpr),
    /// Run an imported unit's one-time initializer at this point.
    ImportInit {
        unit: UnitId,
    },
}
