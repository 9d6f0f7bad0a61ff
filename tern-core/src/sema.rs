//! Semantic analysis: name resolution, type checking, constant
//! folding, and lowering to the typed HIR.
//!
//! Each block is processed in two phases. The declare phase registers
//! every declaration of the block (types first, then signatures), so
//! forward references to functions and types resolve without a
//! separate forward-declaration syntax. The check phase then walks the
//! statements in order, typing expressions and folding constants as it
//! goes. Function bodies are queued and checked after the enclosing
//! block, which lets mutually recursive functions see each other.
//!
//! Variables stay order-sensitive: referring to a variable above its
//! declaration in the same function is an error here. References that
//! cross a function boundary are recorded as dependencies instead and
//! validated later by the dependency pass.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::ast::{
    ArrayLen, BinOp, Expr, ExprKind, Module, Stmt, StmtKind, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::hir::{HirExpr, HirExprKind, HirFunc, HirStmt, HirStmtKind, HirUnit};
use crate::intern::Symbol;
use crate::scope::{Ctx, Decl, DeclId, DeclKind, EnumItem, ScopeId, UnitId};
use crate::span::Pos;
use crate::types::{IntKind, Type};

/// Analyze one parsed unit. Units named by its import statements must
/// already be analyzed and present in `imports` (path as written in
/// the source, mapped to the unit id).
pub fn analyze(
    module: &Module,
    unit: UnitId,
    ctx: &mut Ctx,
    imports: &HashMap<String, UnitId>,
) -> Result<HirUnit, CoreError> {
    let root = ctx.unit(unit).root_scope;
    let source = ctx.unit(unit).source.clone();

    let args_name = ctx.interner.intern("args");
    let args = ctx.add_decl(Decl {
        name: args_name,
        kind: DeclKind::Var { is_param: false },
        pos: Pos::builtin(),
        scope: root,
        unit,
        ty: Type::ptr(Type::array(Type::Str, None)),
        local_name: String::new(),
        public_name: String::new(),
        imported: false,
        exported: false,
        builtin: true,
        prototype: false,
        foreign: false,
        deps_scanned: true,
        origin: None,
    });

    let mut checker = Checker {
        ctx,
        unit,
        root,
        source,
        imports,
        imported_units: HashSet::new(),
        unit_imports: Vec::new(),
        deferred: Vec::new(),
        funcs: Vec::new(),
        records: Vec::new(),
        globals: Vec::new(),
        foreigns: Vec::new(),
    };

    let body = checker.check_block(&module.stmts, root)?;
    while let Some((decl, scope, stmts)) = checker.deferred.pop() {
        let body = checker.check_block(stmts, scope)?;
        checker.funcs.push(HirFunc { decl, body });
    }

    Ok(HirUnit {
        unit,
        body,
        funcs: checker.funcs,
        records: checker.records,
        globals: checker.globals,
        foreigns: checker.foreigns,
        imports: checker.unit_imports,
        args,
    })
}

/// What the declare phase registered for one statement.
enum Registered {
    Nothing,
    One(DeclId),
    Many(Vec<DeclId>),
    Unit(UnitId),
}

struct Checker<'c, 'm> {
    ctx: &'c mut Ctx,
    unit: UnitId,
    root: ScopeId,
    source: String,
    imports: &'c HashMap<String, UnitId>,
    imported_units: HashSet<UnitId>,
    unit_imports: Vec<UnitId>,
    /// Function bodies waiting to be checked.
    deferred: Vec<(DeclId, ScopeId, &'m [Stmt])>,
    funcs: Vec<HirFunc>,
    records: Vec<DeclId>,
    globals: Vec<DeclId>,
    foreigns: Vec<DeclId>,
}

impl<'c, 'm> Checker<'c, 'm> {
    fn err(&self, message: impl Into<String>, pos: Pos) -> CoreError {
        CoreError::Semantic(Diagnostic::new(message, pos, &self.source))
    }

    fn text(&self, sym: Symbol) -> String {
        self.ctx.interner.resolve(sym).to_string()
    }

    fn type_name(&self, ty: &Type) -> String {
        self.ctx.type_name(ty)
    }

    // ---------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------

    fn check_block(&mut self, stmts: &'m [Stmt], scope: ScopeId) -> Result<Vec<HirStmt>, CoreError> {
        let registered = self.declare_block(stmts, scope)?;
        let mut out = Vec::new();
        for (stmt, reg) in stmts.iter().zip(&registered) {
            if let Some(h) = self.check_stmt(stmt, scope, reg)? {
                out.push(h);
            }
        }
        Ok(out)
    }

    /// Register every declaration of the block, then resolve their
    /// types: enums first, then struct bodies, then signatures and
    /// variable types. Imports and foreign blocks are fully handled
    /// here so later type references can see their bindings.
    fn declare_block(
        &mut self,
        stmts: &'m [Stmt],
        scope: ScopeId,
    ) -> Result<Vec<Registered>, CoreError> {
        let mut registered = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let reg = match &stmt.kind {
                StmtKind::Var { name, exported, .. } => {
                    let d = self.install(
                        *name,
                        DeclKind::Var { is_param: false },
                        stmt.pos,
                        scope,
                        *exported,
                        false,
                    )?;
                    if scope == self.root {
                        self.globals.push(d);
                    }
                    Registered::One(d)
                }
                StmtKind::Func { name, exported, .. } => Registered::One(self.install(
                    *name,
                    DeclKind::Func {
                        params: Vec::new(),
                        deps: Vec::new(),
                    },
                    stmt.pos,
                    scope,
                    *exported,
                    false,
                )?),
                StmtKind::Record {
                    name,
                    is_union,
                    members,
                    exported,
                } => {
                    if members.is_empty() {
                        return Err(self.err(
                            format!("'{}' is an empty structure", self.text(*name)),
                            stmt.pos,
                        ));
                    }
                    let d = self.install(
                        *name,
                        DeclKind::Record {
                            members: Vec::new(),
                            is_union: *is_union,
                        },
                        stmt.pos,
                        scope,
                        *exported,
                        false,
                    )?;
                    self.records.push(d);
                    Registered::One(d)
                }
                StmtKind::Enum {
                    name,
                    items,
                    exported,
                } => {
                    if items.is_empty() {
                        return Err(self.err(
                            format!("'{}' is an empty structure", self.text(*name)),
                            stmt.pos,
                        ));
                    }
                    Registered::One(self.install(
                        *name,
                        DeclKind::Enum { items: Vec::new() },
                        stmt.pos,
                        scope,
                        *exported,
                        false,
                    )?)
                }
                StmtKind::Import { names, path } => {
                    Registered::Unit(self.declare_import(names.as_deref(), path, stmt.pos, scope)?)
                }
                StmtKind::Foreign { items, .. } => {
                    let mut ids = Vec::new();
                    for item in items {
                        use crate::ast::ForeignItem;
                        let (name, kind, pos) = match item {
                            ForeignItem::Func { name, pos, .. } => (
                                *name,
                                DeclKind::Func {
                                    params: Vec::new(),
                                    deps: Vec::new(),
                                },
                                *pos,
                            ),
                            ForeignItem::Var { name, pos, .. } => {
                                (*name, DeclKind::Var { is_param: false }, *pos)
                            }
                        };
                        let d = self.install(name, kind, pos, scope, false, true)?;
                        self.foreigns.push(d);
                        ids.push(d);
                    }
                    Registered::Many(ids)
                }
                _ => Registered::Nothing,
            };
            registered.push(reg);
        }

        // Enum values are constants every later type may mention.
        for (stmt, reg) in stmts.iter().zip(&registered) {
            if let (StmtKind::Enum { items, .. }, Registered::One(d)) = (&stmt.kind, reg) {
                self.resolve_enum(*d, items, scope)?;
            }
        }
        for (stmt, reg) in stmts.iter().zip(&registered) {
            if let (StmtKind::Record { members, is_union, .. }, Registered::One(d)) =
                (&stmt.kind, reg)
            {
                self.resolve_record(*d, members, *is_union, scope)?;
            }
        }
        for (stmt, reg) in stmts.iter().zip(&registered) {
            match (&stmt.kind, reg) {
                (StmtKind::Var { ty, .. }, Registered::One(d)) => {
                    let resolved = self.resolve_type(ty, scope)?;
                    self.ctx.decl_mut(*d).ty = resolved;
                }
                (StmtKind::Func { params, ret, .. }, Registered::One(d)) => {
                    let ty = self.resolve_signature(params, ret.as_ref(), scope)?;
                    self.ctx.decl_mut(*d).ty = ty;
                }
                (StmtKind::Foreign { items, .. }, Registered::Many(ids)) => {
                    use crate::ast::ForeignItem;
                    for (item, d) in items.iter().zip(ids) {
                        let ty = match item {
                            ForeignItem::Func { params, ret, .. } => {
                                self.resolve_signature(params, ret.as_ref(), scope)?
                            }
                            ForeignItem::Var { ty, .. } => self.resolve_type(ty, scope)?,
                        };
                        self.ctx.decl_mut(*d).ty = ty;
                    }
                }
                _ => {}
            }
        }

        if scope == self.root {
            for reg in &registered {
                if let Registered::One(d) = reg {
                    if self.ctx.decl(*d).exported {
                        let ty = self.ctx.decl(*d).ty.clone();
                        self.mark_type_exported(&ty);
                    }
                }
            }
        }
        Ok(registered)
    }

    fn install(
        &mut self,
        name: Symbol,
        kind: DeclKind,
        pos: Pos,
        scope: ScopeId,
        exported: bool,
        foreign: bool,
    ) -> Result<DeclId, CoreError> {
        if self.ctx.lookup_flat(scope, name).is_some() {
            return Err(self.err(format!("'{}' is redeclared", self.text(name)), pos));
        }
        Ok(self.ctx.add_decl(Decl {
            name,
            kind,
            pos,
            scope,
            unit: self.unit,
            ty: Type::INT,
            local_name: String::new(),
            public_name: String::new(),
            imported: false,
            exported,
            builtin: false,
            prototype: foreign,
            foreign,
            deps_scanned: foreign,
            origin: None,
        }))
    }

    fn declare_import(
        &mut self,
        names: Option<&[(Symbol, Pos)]>,
        path: &str,
        pos: Pos,
        scope: ScopeId,
    ) -> Result<UnitId, CoreError> {
        let Some(&target) = self.imports.get(path) else {
            return Err(CoreError::MissingUnit(PathBuf::from(path)));
        };
        if !self.imported_units.insert(target) {
            return Err(self.err(format!("unit \"{path}\" is already imported"), pos));
        }
        self.unit_imports.push(target);
        let target_root = self.ctx.unit(target).root_scope;
        match names {
            None => {
                let decls = self.ctx.scope(target_root).decls.clone();
                for id in decls {
                    if !self.ctx.decl(id).exported {
                        continue;
                    }
                    let name = self.ctx.decl(id).name;
                    if self.ctx.lookup_flat(scope, name).is_some() {
                        return Err(
                            self.err(format!("'{}' is redeclared", self.text(name)), pos)
                        );
                    }
                    self.ctx.bind_import(id, scope);
                }
            }
            Some(names) => {
                for &(name, name_pos) in names {
                    let found = self
                        .ctx
                        .lookup_flat(target_root, name)
                        .filter(|&d| self.ctx.decl(d).exported);
                    let Some(found) = found else {
                        return Err(self.err(
                            format!("no exported symbol '{}' in \"{}\"", self.text(name), path),
                            name_pos,
                        ));
                    };
                    if self.ctx.lookup_flat(scope, name).is_some() {
                        return Err(
                            self.err(format!("'{}' is redeclared", self.text(name)), name_pos)
                        );
                    }
                    self.ctx.bind_import(found, scope);
                }
            }
        }
        Ok(target)
    }

    fn resolve_enum(
        &mut self,
        d: DeclId,
        items: &[crate::ast::EnumItemAst],
        scope: ScopeId,
    ) -> Result<(), CoreError> {
        let mut resolved: Vec<EnumItem> = Vec::new();
        let mut next = 0i64;
        for item in items {
            if resolved.iter().any(|r| r.name == item.name) {
                return Err(self.err(format!("'{}' is redeclared", self.text(item.name)), item.pos));
            }
            let value = match &item.value {
                Some(expr) => {
                    let h = self.check_expr(expr, scope)?;
                    h.const_int()
                        .ok_or_else(|| self.err("enum item value must be constant", expr.pos))?
                }
                None => next,
            };
            next = value.wrapping_add(1);
            resolved.push(EnumItem {
                name: item.name,
                value,
            });
        }
        let decl = self.ctx.decl_mut(d);
        decl.kind = DeclKind::Enum { items: resolved };
        decl.ty = Type::Enum(d);
        Ok(())
    }

    fn resolve_record(
        &mut self,
        d: DeclId,
        members: &[crate::ast::Field],
        is_union: bool,
        scope: ScopeId,
    ) -> Result<(), CoreError> {
        let body = self.ctx.push_scope(scope);
        {
            let s = self.ctx.scope_mut(body);
            s.structhost = Some(d);
            s.funchost = None;
        }
        let mut ids = Vec::new();
        for field in members {
            let ty = self.resolve_type(&field.ty, scope)?;
            self.ensure_sized(&ty, field.pos)?;
            let f = self.install(field.name, DeclKind::Field, field.pos, body, false, false)?;
            self.ctx.decl_mut(f).ty = ty;
            ids.push(f);
        }
        let ty = if is_union { Type::Union(d) } else { Type::Struct(d) };
        let decl = self.ctx.decl_mut(d);
        decl.kind = DeclKind::Record {
            members: ids,
            is_union,
        };
        decl.ty = ty;
        Ok(())
    }

    fn resolve_signature(
        &mut self,
        params: &[crate::ast::Param],
        ret: Option<&TypeExpr>,
        scope: ScopeId,
    ) -> Result<Type, CoreError> {
        let mut ptypes = Vec::new();
        for p in params {
            let ty = self.resolve_type(&p.ty, scope)?;
            self.ensure_sized(&ty, p.pos)?;
            ptypes.push(ty);
        }
        let ret = match ret {
            Some(te) => {
                let ty = self.resolve_type(te, scope)?;
                self.ensure_sized(&ty, te.pos)?;
                Some(Box::new(ty))
            }
            None => None,
        };
        Ok(Type::Fn {
            params: ptypes,
            ret,
        })
    }

    fn mark_type_exported(&mut self, ty: &Type) {
        match ty {
            Type::Ptr(inner) => self.mark_type_exported(&inner.clone()),
            Type::Array { item, .. } => self.mark_type_exported(&item.clone()),
            Type::Fn { params, ret } => {
                for p in params.clone() {
                    self.mark_type_exported(&p);
                }
                if let Some(ret) = ret.clone() {
                    self.mark_type_exported(&ret);
                }
            }
            Type::Struct(d) | Type::Union(d) => {
                if !self.ctx.decl(*d).exported {
                    self.ctx.decl_mut(*d).exported = true;
                    if let DeclKind::Record { members, .. } = self.ctx.decl(*d).kind.clone() {
                        for m in members {
                            let ty = self.ctx.decl(m).ty.clone();
                            self.mark_type_exported(&ty);
                        }
                    }
                }
            }
            Type::Enum(d) => self.ctx.decl_mut(*d).exported = true,
            _ => {}
        }
    }

    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    fn resolve_type(&mut self, te: &TypeExpr, scope: ScopeId) -> Result<Type, CoreError> {
        Ok(match &te.kind {
            TypeExprKind::Int(kind) => Type::Int(*kind),
            TypeExprKind::Bool => Type::Bool,
            TypeExprKind::Str => Type::Str,
            TypeExprKind::CStr => Type::CStr,
            TypeExprKind::Ptr(inner) => Type::ptr(self.resolve_type(inner, scope)?),
            TypeExprKind::Array { len, item } => {
                let item = self.resolve_type(item, scope)?;
                let len = match len {
                    ArrayLen::Dynamic => None,
                    ArrayLen::Expr(expr) => {
                        let h = self.check_expr(expr, scope)?;
                        let value = h
                            .const_int()
                            .ok_or_else(|| self.err("array length must be constant", expr.pos))?;
                        if value < 0 {
                            return Err(self.err("array length is negative", expr.pos));
                        }
                        Some(value as u32)
                    }
                };
                Type::array(item, len)
            }
            TypeExprKind::Named(sym) => {
                let Some(found) = self.ctx.lookup(scope, *sym) else {
                    return Err(
                        self.err(format!("type '{}' is not defined", self.text(*sym)), te.pos)
                    );
                };
                let d = self.ctx.resolve_origin(found);
                match &self.ctx.decl(d).kind {
                    DeclKind::Record { is_union: true, .. } => Type::Union(d),
                    DeclKind::Record { .. } => Type::Struct(d),
                    DeclKind::Enum { .. } => Type::Enum(d),
                    _ => {
                        return Err(
                            self.err(format!("'{}' is not a type", self.text(*sym)), te.pos)
                        );
                    }
                }
            }
        })
    }

    /// Arrays held by value must have a known length; behind a pointer
    /// the length may stay dynamic.
    fn ensure_sized(&self, ty: &Type, pos: Pos) -> Result<(), CoreError> {
        match ty {
            Type::Array { len: None, .. } => Err(self.err("array length is unknown", pos)),
            Type::Array {
                item,
                len: Some(_),
            } => self.ensure_sized(item, pos),
            _ => Ok(()),
        }
    }

    /// Back-fill declared-but-unknown array lengths from the
    /// initializer's type, recursively through value arrays.
    fn complete_length(&self, declared: &Type, actual: &Type) -> Type {
        match (declared, actual) {
            (
                Type::Array {
                    item: di,
                    len: dl,
                },
                Type::Array {
                    item: ai,
                    len: al,
                },
            ) => Type::array(self.complete_length(di, ai), dl.or(*al)),
            _ => declared.clone(),
        }
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn check_stmt(
        &mut self,
        stmt: &'m Stmt,
        scope: ScopeId,
        registered: &Registered,
    ) -> Result<Option<HirStmt>, CoreError> {
        let pos = stmt.pos;
        let kind = match &stmt.kind {
            StmtKind::Print(args) => {
                let mut out = Vec::new();
                for arg in args {
                    let h = self.check_expr(arg, scope)?;
                    self.value_ty(&h)?;
                    out.push(h);
                }
                HirStmtKind::Print(out)
            }
            StmtKind::Var { init, .. } => {
                let Registered::One(d) = registered else {
                    return Ok(None);
                };
                let d = *d;
                let declared = self.ctx.decl(d).ty.clone();
                let init = match init {
                    Some(expr) => {
                        let h = self.check_expr(expr, scope)?;
                        let actual = self.value_ty(&h)?;
                        let completed = self.complete_length(&declared, &actual);
                        self.ensure_sized(&completed, pos)?;
                        self.ctx.decl_mut(d).ty = completed.clone();
                        Some(self.coerce(h, &completed, false)?)
                    }
                    None => {
                        self.ensure_sized(&declared, pos)?;
                        None
                    }
                };
                HirStmtKind::VarInit { decl: d, init }
            }
            StmtKind::Func { params, body, .. } => {
                let Registered::One(d) = registered else {
                    return Ok(None);
                };
                let d = *d;
                let Type::Fn {
                    params: ptypes, ..
                } = self.ctx.decl(d).ty.clone()
                else {
                    return Ok(None);
                };
                let body_scope = self.ctx.push_scope(scope);
                {
                    let s = self.ctx.scope_mut(body_scope);
                    s.funchost = Some(d);
                    s.in_loop = false;
                }
                let mut param_ids = Vec::new();
                for (p, ty) in params.iter().zip(ptypes) {
                    let pd = self.install(
                        p.name,
                        DeclKind::Var { is_param: true },
                        p.pos,
                        body_scope,
                        false,
                        false,
                    )?;
                    self.ctx.decl_mut(pd).ty = ty;
                    param_ids.push(pd);
                }
                if let DeclKind::Func { params, .. } = &mut self.ctx.decl_mut(d).kind {
                    *params = param_ids;
                }
                self.deferred.push((d, body_scope, body.as_slice()));
                return Ok(None);
            }
            StmtKind::Record { .. } | StmtKind::Enum { .. } | StmtKind::Foreign { .. } => {
                return Ok(None);
            }
            StmtKind::Import { .. } => {
                let Registered::Unit(target) = registered else {
                    return Ok(None);
                };
                HirStmtKind::ImportInit { unit: *target }
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.check_expr(cond, scope)?;
                let cond = self.coerce(cond, &Type::Bool, false)?;
                let then_scope = self.ctx.push_scope(scope);
                let then_body = self.check_block(then_body, then_scope)?;
                let else_body = match else_body {
                    Some(stmts) => {
                        let else_scope = self.ctx.push_scope(scope);
                        Some(self.check_block(stmts, else_scope)?)
                    }
                    None => None,
                };
                HirStmtKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            StmtKind::While { cond, body } => {
                let cond = self.check_expr(cond, scope)?;
                let cond = self.coerce(cond, &Type::Bool, false)?;
                let body_scope = self.ctx.push_scope(scope);
                self.ctx.scope_mut(body_scope).in_loop = true;
                let body = self.check_block(body, body_scope)?;
                HirStmtKind::While { cond, body }
            }
            StmtKind::ForRange {
                var,
                var_pos,
                start,
                end,
                body,
            } => {
                let start = self.check_expr(start, scope)?;
                let start = self.coerce(start, &Type::INT, false)?;
                let end = self.check_expr(end, scope)?;
                let end = self.coerce(end, &Type::INT, false)?;
                let body_scope = self.ctx.push_scope(scope);
                self.ctx.scope_mut(body_scope).in_loop = true;
                let v = self.install(
                    *var,
                    DeclKind::Var { is_param: false },
                    *var_pos,
                    body_scope,
                    false,
                    false,
                )?;
                self.ctx.decl_mut(v).ty = Type::INT;
                let body = self.check_block(body, body_scope)?;
                HirStmtKind::ForRange {
                    var: v,
                    start,
                    end,
                    body,
                }
            }
            StmtKind::ForEach {
                var,
                var_pos,
                seq,
                body,
            } => {
                let seq = self.check_expr(seq, scope)?;
                let seq_ty = self.value_ty(&seq)?;
                let item_ty = match &seq_ty {
                    Type::Array { item, .. } => (**item).clone(),
                    Type::Ptr(inner) => match &**inner {
                        Type::Array { item, .. } => (**item).clone(),
                        _ => {
                            return Err(self.err(
                                format!("cannot iterate over {}", self.type_name(&seq_ty)),
                                seq.pos,
                            ));
                        }
                    },
                    Type::Str => Type::Str,
                    _ => {
                        return Err(self.err(
                            format!("cannot iterate over {}", self.type_name(&seq_ty)),
                            seq.pos,
                        ));
                    }
                };
                let body_scope = self.ctx.push_scope(scope);
                self.ctx.scope_mut(body_scope).in_loop = true;
                let v = self.install(
                    *var,
                    DeclKind::Var { is_param: false },
                    *var_pos,
                    body_scope,
                    false,
                    false,
                )?;
                self.ctx.decl_mut(v).ty = item_ty;
                let body = self.check_block(body, body_scope)?;
                HirStmtKind::ForEach { var: v, seq, body }
            }
            StmtKind::Assign { target, value } => {
                let target = self.check_expr(target, scope)?;
                if !self.is_lvalue(&target) {
                    return Err(self.err("invalid assignment target", pos));
                }
                let target_ty = self.value_ty(&target)?;
                let value = self.check_expr(value, scope)?;
                let value = self.coerce(value, &target_ty, false)?;
                HirStmtKind::Assign { target, value }
            }
            StmtKind::Call(expr) => HirStmtKind::Call(self.check_expr(expr, scope)?),
            StmtKind::Return(value) => {
                let Some(f) = self.ctx.scope(scope).funchost else {
                    return Err(self.err("'return' outside of a function", pos));
                };
                let ret = match &self.ctx.decl(f).ty {
                    Type::Fn { ret, .. } => ret.clone(),
                    _ => None,
                };
                let value = match (value, ret) {
                    (Some(expr), Some(ret)) => {
                        let h = self.check_expr(expr, scope)?;
                        Some(self.coerce(h, &ret, false)?)
                    }
                    (None, None) => None,
                    (Some(expr), None) => {
                        return Err(self.err("function does not return a value", expr.pos));
                    }
                    (None, Some(_)) => {
                        return Err(self.err("return value required", pos));
                    }
                };
                HirStmtKind::Return(value)
            }
            StmtKind::Break => {
                if !self.ctx.scope(scope).in_loop {
                    return Err(self.err("'break' outside of a loop", pos));
                }
                HirStmtKind::Break
            }
            StmtKind::Continue => {
                if !self.ctx.scope(scope).in_loop {
                    return Err(self.err("'continue' outside of a loop", pos));
                }
                HirStmtKind::Continue
            }
            StmtKind::Delete(expr) => {
                let h = self.check_expr(expr, scope)?;
                let ty = self.value_ty(&h)?;
                if !matches!(ty, Type::Ptr(_) | Type::CStr) {
                    return Err(self.err(
                        format!("'delete' needs a pointer, found {}", self.type_name(&ty)),
                        expr.pos,
                    ));
                }
                HirStmtKind::Delete(h)
            }
        };
        Ok(Some(HirStmt { kind, pos }))
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn check_expr(&mut self, expr: &Expr, scope: ScopeId) -> Result<HirExpr, CoreError> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(value) => Ok(HirExpr::int(*value, Type::INT, pos)),
            ExprKind::Bool(value) => Ok(HirExpr {
                kind: HirExprKind::Bool(*value),
                ty: Some(Type::Bool),
                pos,
            }),
            ExprKind::Str(text) => Ok(HirExpr {
                kind: HirExprKind::Str(text.clone()),
                ty: Some(Type::Str),
                pos,
            }),
            ExprKind::Ident(sym) => self.check_ident(*sym, pos, scope),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, pos, scope),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, pos, scope),
            ExprKind::Cast { value, ty } => {
                let target = self.resolve_type(ty, scope)?;
                let h = self.check_expr(value, scope)?;
                self.coerce(h, &target, true)
            }
            ExprKind::Index { base, index } => self.check_index(base, index, pos, scope),
            ExprKind::Call { callee, args } => self.check_call(callee, args, pos, scope),
            ExprKind::Member {
                base,
                name,
                name_pos,
            } => self.check_member(base, *name, *name_pos, pos, scope),
            ExprKind::Length { base } => self.check_length(base, pos, scope),
            ExprKind::ArrayLit(items) => {
                if items.is_empty() {
                    return Err(self.err("empty array literal has no type", pos));
                }
                let first = self.check_expr(&items[0], scope)?;
                let item_ty = self.value_ty(&first)?;
                let mut out = vec![first];
                for item in &items[1..] {
                    let h = self.check_expr(item, scope)?;
                    out.push(self.coerce(h, &item_ty, false)?);
                }
                let len = out.len() as u32;
                Ok(HirExpr {
                    kind: HirExprKind::ArrayLit(out),
                    ty: Some(Type::array(item_ty, Some(len))),
                    pos,
                })
            }
            ExprKind::New { ty } => self.check_new(ty, pos, scope),
        }
    }

    fn check_ident(&mut self, sym: Symbol, pos: Pos, scope: ScopeId) -> Result<HirExpr, CoreError> {
        let Some(found) = self.ctx.lookup(scope, sym) else {
            return Err(self.err(format!("'{}' is not defined", self.text(sym)), pos));
        };
        let origin = self.ctx.resolve_origin(found);
        let decl = self.ctx.decl(origin);
        if matches!(decl.kind, DeclKind::Record { .. } | DeclKind::Enum { .. }) {
            return Err(self.err(
                format!("'{}' is a type, not a value", self.text(sym)),
                pos,
            ));
        }
        let ty = decl.ty.clone();
        let decl_pos = decl.pos;
        let decl_unit = decl.unit;
        let decl_scope = decl.scope;
        let is_var = decl.is_var();
        let is_func = decl.is_func();
        let builtin = decl.builtin;
        let use_funchost = self.ctx.scope(scope).funchost;
        let decl_funchost = self.ctx.scope(decl_scope).funchost;
        if is_var && !builtin && decl_unit == self.unit {
            if decl_funchost == use_funchost {
                if decl_pos.offset > pos.offset {
                    return Err(
                        self.err(format!("'{}' is declared later", self.text(sym)), pos)
                    );
                }
            } else if use_funchost.is_some() {
                self.note_dep(use_funchost, origin);
            }
        } else if is_func {
            self.note_dep(use_funchost, origin);
        }
        Ok(HirExpr {
            kind: HirExprKind::Var(origin),
            ty: Some(ty),
            pos,
        })
    }

    /// Record that the current function reads `target`, an outer
    /// variable or another function.
    fn note_dep(&mut self, funchost: Option<DeclId>, target: DeclId) {
        let Some(f) = funchost else { return };
        if f == target {
            return;
        }
        if let DeclKind::Func { deps, .. } = &mut self.ctx.decl_mut(f).kind {
            if !deps.contains(&target) {
                deps.push(target);
            }
        }
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        pos: Pos,
        scope: ScopeId,
    ) -> Result<HirExpr, CoreError> {
        let h = self.check_expr(operand, scope)?;
        let ty = self.value_ty(&h)?;
        match op {
            UnaryOp::Neg | UnaryOp::Compl => {
                let Some(kind) = ty.int_kind() else {
                    return Err(self.err(
                        format!(
                            "operator '{}' needs an integer operand, found {}",
                            if op == UnaryOp::Neg { "-" } else { "~" },
                            self.type_name(&ty)
                        ),
                        pos,
                    ));
                };
                if let Some(v) = h.const_int() {
                    let value = match op {
                        UnaryOp::Neg => v.wrapping_neg(),
                        _ => !v,
                    };
                    return Ok(HirExpr::int(kind.truncate(value), ty, pos));
                }
                Ok(HirExpr {
                    kind: HirExprKind::Unary {
                        op,
                        operand: Box::new(h),
                    },
                    ty: Some(ty),
                    pos,
                })
            }
            UnaryOp::AddrOf => {
                if !self.is_lvalue(&h) {
                    return Err(self.err("cannot take the address of this expression", pos));
                }
                Ok(HirExpr {
                    kind: HirExprKind::Unary {
                        op,
                        operand: Box::new(h),
                    },
                    ty: Some(Type::ptr(ty)),
                    pos,
                })
            }
            UnaryOp::Deref => match &ty {
                Type::Ptr(inner) if !matches!(**inner, Type::Array { .. }) => {
                    let inner = (**inner).clone();
                    Ok(HirExpr {
                        kind: HirExprKind::Unary {
                            op,
                            operand: Box::new(h),
                        },
                        ty: Some(inner),
                        pos,
                    })
                }
                _ => Err(self.err(
                    format!("cannot dereference {}", self.type_name(&ty)),
                    pos,
                )),
            },
        }
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: Pos,
        scope: ScopeId,
    ) -> Result<HirExpr, CoreError> {
        let lhs = self.check_expr(lhs, scope)?;
        let rhs = self.check_expr(rhs, scope)?;

        if op.is_logical() {
            // Two constants: the operator selects one operand by its
            // truth value, whatever its type.
            if lhs.is_literal() && rhs.is_literal() {
                let take_lhs = match op {
                    BinOp::And => !truthy(&lhs),
                    _ => truthy(&lhs),
                };
                return Ok(if take_lhs { lhs } else { rhs });
            }
            for side in [&lhs, &rhs] {
                let ty = self.value_ty(side)?;
                if ty != Type::Bool && side.const_int().is_none() {
                    return Err(self.err(
                        format!(
                            "operands of '{}' must be bool, found {}",
                            op.symbol(),
                            self.type_name(&ty)
                        ),
                        side.pos,
                    ));
                }
            }
            let lhs = self.coerce(lhs, &Type::Bool, false)?;
            let rhs = self.coerce(rhs, &Type::Bool, false)?;
            return Ok(HirExpr {
                kind: HirExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty: Some(Type::Bool),
                pos,
            });
        }

        let (lhs, rhs, ty) = self.unify_operands(op, lhs, rhs, pos)?;

        if op.is_comparison() {
            match &ty {
                Type::Int(_) | Type::Enum(_) => {}
                Type::Bool | Type::Ptr(_) | Type::CStr if matches!(op, BinOp::Eq | BinOp::Ne) => {}
                _ => {
                    return Err(self.err(
                        format!("cannot compare {} with '{}'", self.type_name(&ty), op.symbol()),
                        pos,
                    ));
                }
            }
            if let (Some(l), Some(r)) = (lhs.const_int(), rhs.const_int()) {
                let signed = ty.int_kind().map(|k| k.is_signed()).unwrap_or(true);
                return Ok(HirExpr {
                    kind: HirExprKind::Bool(fold_compare(op, l, r, signed)),
                    ty: Some(Type::Bool),
                    pos,
                });
            }
            return Ok(HirExpr {
                kind: HirExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty: Some(Type::Bool),
                pos,
            });
        }

        let Some(kind) = ty.int_kind() else {
            return Err(self.err(
                format!(
                    "operator '{}' needs integer operands, found {}",
                    op.symbol(),
                    self.type_name(&ty)
                ),
                pos,
            ));
        };
        // Arithmetic on enum values yields plain integers.
        let result_ty = match ty {
            Type::Enum(_) => Type::INT,
            other => other,
        };
        if let (Some(l), Some(r)) = (lhs.const_int(), rhs.const_int()) {
            if matches!(op, BinOp::Div | BinOp::Rem) && r == 0 {
                return Err(self.err("division by zero in constant expression", pos));
            }
            let value = fold_arith(op, l, r, kind);
            return Ok(HirExpr::int(kind.truncate(value), result_ty, pos));
        }
        Ok(HirExpr {
            kind: HirExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty: Some(result_ty),
            pos,
        })
    }

    /// Bring both operands to a common type. A constant operand adopts
    /// the other side's integer kind; two differently-typed runtime
    /// operands are an error.
    fn unify_operands(
        &mut self,
        op: BinOp,
        lhs: HirExpr,
        rhs: HirExpr,
        pos: Pos,
    ) -> Result<(HirExpr, HirExpr, Type), CoreError> {
        let lt = self.value_ty(&lhs)?;
        let rt = self.value_ty(&rhs)?;
        if lt == rt {
            return Ok((lhs, rhs, lt));
        }
        if lt.is_integral() && rt.is_integral() {
            if lhs.const_int().is_some() && rhs.const_int().is_none() {
                let lhs = self.coerce(lhs, &rt, false)?;
                return Ok((lhs, rhs, rt));
            }
            if rhs.const_int().is_some() {
                let rhs = self.coerce(rhs, &lt, false)?;
                return Ok((lhs, rhs, lt));
            }
        }
        Err(self.err(
            format!(
                "operands of '{}' have different types ({} and {})",
                op.symbol(),
                self.type_name(&lt),
                self.type_name(&rt)
            ),
            pos,
        ))
    }

    fn check_index(
        &mut self,
        base: &Expr,
        index: &Expr,
        pos: Pos,
        scope: ScopeId,
    ) -> Result<HirExpr, CoreError> {
        let base = self.check_expr(base, scope)?;
        let base_ty = self.value_ty(&base)?;
        let index = self.check_expr(index, scope)?;
        let index = self.coerce(index, &Type::INT, false)?;

        let (item_ty, len) = match &base_ty {
            Type::Str => (Type::Str, None),
            Type::Array { item, len } => ((**item).clone(), *len),
            Type::Ptr(inner) => match &**inner {
                Type::Array { item, len } => ((**item).clone(), *len),
                _ => {
                    return Err(self.err(
                        format!("cannot index {}", self.type_name(&base_ty)),
                        pos,
                    ));
                }
            },
            _ => {
                return Err(self.err(
                    format!("cannot index {}", self.type_name(&base_ty)),
                    pos,
                ));
            }
        };
        if let Some(i) = index.const_int() {
            if i < 0 || len.is_some_and(|n| i >= n as i64) {
                return Err(self.err(format!("index {i} is out of range"), index.pos));
            }
            // A constant subscript of a constant array folds to the
            // selected element.
            if let HirExprKind::ArrayLit(items) = &base.kind {
                if items.iter().all(HirExpr::is_literal) {
                    return Ok(items[i as usize].clone());
                }
            }
        }
        Ok(HirExpr {
            kind: HirExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
            ty: Some(item_ty),
            pos,
        })
    }

    fn check_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        pos: Pos,
        scope: ScopeId,
    ) -> Result<HirExpr, CoreError> {
        let callee = self.check_expr(callee, scope)?;
        let callee_ty = self.value_ty(&callee)?;
        let Type::Fn { params, ret } = callee_ty else {
            return Err(self.err(
                format!("cannot call {}", self.type_name(&callee_ty)),
                pos,
            ));
        };
        if args.len() != params.len() {
            return Err(self.err(
                format!("expected {} arguments, found {}", params.len(), args.len()),
                pos,
            ));
        }
        let mut out = Vec::new();
        for (arg, ty) in args.iter().zip(&params) {
            let h = self.check_expr(arg, scope)?;
            out.push(self.coerce(h, ty, false)?);
        }
        Ok(HirExpr {
            kind: HirExprKind::Call {
                callee: Box::new(callee),
                args: out,
            },
            ty: ret.map(|b| *b),
            pos,
        })
    }

    fn check_member(
        &mut self,
        base: &Expr,
        name: Symbol,
        name_pos: Pos,
        pos: Pos,
        scope: ScopeId,
    ) -> Result<HirExpr, CoreError> {
        // `E.Item` where `E` names an enum is a constant, not a member
        // access.
        if let ExprKind::Ident(sym) = base.kind {
            if let Some(found) = self.ctx.lookup(scope, sym) {
                let d = self.ctx.resolve_origin(found);
                if let DeclKind::Enum { items } = &self.ctx.decl(d).kind {
                    let Some(item) = items.iter().find(|i| i.name == name) else {
                        return Err(self.err(
                            format!(
                                "enum '{}' has no item '{}'",
                                self.text(sym),
                                self.text(name)
                            ),
                            name_pos,
                        ));
                    };
                    return Ok(HirExpr::int(item.value, Type::Enum(d), pos));
                }
            }
        }

        let mut base = self.check_expr(base, scope)?;
        let mut base_ty = self.value_ty(&base)?;
        if let Type::Ptr(inner) = &base_ty {
            if matches!(**inner, Type::Struct(_) | Type::Union(_)) {
                let inner = (**inner).clone();
                base = HirExpr {
                    kind: HirExprKind::Unary {
                        op: UnaryOp::Deref,
                        operand: Box::new(base),
                    },
                    ty: Some(inner.clone()),
                    pos,
                };
                base_ty = inner;
            }
        }
        let (Type::Struct(d) | Type::Union(d)) = base_ty else {
            return Err(self.err(
                format!("{} has no members", self.type_name(&base_ty)),
                name_pos,
            ));
        };
        let members = match &self.ctx.decl(d).kind {
            DeclKind::Record { members, .. } => members.clone(),
            _ => Vec::new(),
        };
        let Some(field) = members
            .iter()
            .copied()
            .find(|&m| self.ctx.decl(m).name == name)
        else {
            return Err(self.err(
                format!(
                    "'{}' has no member '{}'",
                    self.text(self.ctx.decl(d).name),
                    self.text(name)
                ),
                name_pos,
            ));
        };
        let ty = self.ctx.decl(field).ty.clone();
        Ok(HirExpr {
            kind: HirExprKind::Member {
                base: Box::new(base),
                field,
            },
            ty: Some(ty),
            pos,
        })
    }

    fn check_length(&mut self, base: &Expr, pos: Pos, scope: ScopeId) -> Result<HirExpr, CoreError> {
        let base = self.check_expr(base, scope)?;
        let base_ty = self.value_ty(&base)?;
        let fixed = match &base_ty {
            Type::Array { len, .. } => *len,
            Type::Ptr(inner) => match &**inner {
                Type::Array { len, .. } => *len,
                _ => {
                    return Err(self.err(
                        format!("'length' is not available for {}", self.type_name(&base_ty)),
                        pos,
                    ));
                }
            },
            Type::Str => None,
            _ => {
                return Err(self.err(
                    format!("'length' is not available for {}", self.type_name(&base_ty)),
                    pos,
                ));
            }
        };
        if let Some(n) = fixed {
            return Ok(HirExpr::int(n as i64, Type::INT, pos));
        }
        Ok(HirExpr {
            kind: HirExprKind::Length {
                base: Box::new(base),
            },
            ty: Some(Type::INT),
            pos,
        })
    }

    fn check_new(&mut self, ty: &TypeExpr, pos: Pos, scope: ScopeId) -> Result<HirExpr, CoreError> {
        if let TypeExprKind::Array { len, item } = &ty.kind {
            let item_ty = self.resolve_type(item, scope)?;
            self.ensure_sized(&item_ty, ty.pos)?;
            let ArrayLen::Expr(len) = len else {
                return Err(self.err("'new' needs an array length", ty.pos));
            };
            let len = self.check_expr(len, scope)?;
            let len = self.coerce(len, &Type::INT, false)?;
            return Ok(HirExpr {
                kind: HirExprKind::New {
                    len: Some(Box::new(len)),
                },
                ty: Some(Type::ptr(Type::array(item_ty, None))),
                pos,
            });
        }
        let inner = self.resolve_type(ty, scope)?;
        self.ensure_sized(&inner, ty.pos)?;
        Ok(HirExpr {
            kind: HirExprKind::New { len: None },
            ty: Some(Type::ptr(inner)),
            pos,
        })
    }

    // ---------------------------------------------------------------
    // Conversions
    // ---------------------------------------------------------------

    /// Convert `expr` to `target`. Implicit conversions cover integral
    /// kinds, pointer decay to dynamic arrays, and element-wise fixed
    /// array conversion; everything else needs an explicit `as`.
    fn coerce(
        &mut self,
        expr: HirExpr,
        target: &Type,
        explicit: bool,
    ) -> Result<HirExpr, CoreError> {
        let src = self.value_ty(&expr)?;
        if src == *target {
            return Ok(expr);
        }
        let pos = expr.pos;

        if src.is_integral() && target.is_integral() {
            if let Some(v) = expr.const_int() {
                return Ok(match target {
                    Type::Bool => HirExpr {
                        kind: HirExprKind::Bool(v != 0),
                        ty: Some(Type::Bool),
                        pos,
                    },
                    _ => {
                        let kind = target.int_kind().unwrap_or(IntKind::I64);
                        HirExpr::int(kind.truncate(v), target.clone(), pos)
                    }
                });
            }
            return Ok(cast(expr, target, pos));
        }

        if src == Type::Str && *target == Type::CStr {
            if !explicit {
                return Err(self.conversion_err(&src, target, explicit, pos));
            }
            if let HirExprKind::Str(text) = &expr.kind {
                return Ok(HirExpr {
                    kind: HirExprKind::CStr(text.clone()),
                    ty: Some(Type::CStr),
                    pos,
                });
            }
            return Ok(cast(expr, target, pos));
        }

        if let (
            Type::Array {
                item: src_item,
                len: Some(n),
            },
            Type::Array {
                item: target_item,
                len: Some(m),
            },
        ) = (&src, target)
        {
            if n != m {
                return Err(self.err(
                    format!("expected an array of length {m}, found length {n}"),
                    pos,
                ));
            }
            let target_item = (**target_item).clone();
            let src_item = (**src_item).clone();
            let items = match expr.kind {
                HirExprKind::ArrayLit(items) => items,
                _ => (0..*n)
                    .map(|i| HirExpr {
                        kind: HirExprKind::Index {
                            base: Box::new(expr.clone()),
                            index: Box::new(HirExpr::int(i as i64, Type::INT, pos)),
                        },
                        ty: Some(src_item.clone()),
                        pos,
                    })
                    .collect(),
            };
            let items = items
                .into_iter()
                .map(|item| self.coerce(item, &target_item, explicit))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(HirExpr {
                kind: HirExprKind::ArrayLit(items),
                ty: Some(target.clone()),
                pos,
            });
        }

        if let (Type::Ptr(s), Type::Ptr(t)) = (&src, target) {
            // Fixed arrays decay to dynamic ones implicitly.
            if let (
                Type::Array {
                    item: si,
                    len: Some(_),
                },
                Type::Array {
                    item: ti,
                    len: None,
                },
            ) = (&**s, &**t)
            {
                if si == ti {
                    return Ok(cast(expr, target, pos));
                }
            }
            if explicit && !src.is_dyn_array_ptr() && !target.is_dyn_array_ptr() {
                return Ok(cast(expr, target, pos));
            }
        }

        if explicit {
            let src_raw = matches!(src, Type::Ptr(_) | Type::CStr) && !src.is_dyn_array_ptr();
            let target_raw =
                matches!(target, Type::Ptr(_) | Type::CStr) && !target.is_dyn_array_ptr();
            if (src_raw && (target_raw || target.is_integral()))
                || (src.is_integral() && target_raw)
            {
                return Ok(cast(expr, target, pos));
            }
        }

        Err(self.conversion_err(&src, target, explicit, pos))
    }

    fn conversion_err(&self, src: &Type, target: &Type, explicit: bool, pos: Pos) -> CoreError {
        if explicit {
            self.err(
                format!(
                    "cannot cast {} to {}",
                    self.type_name(src),
                    self.type_name(target)
                ),
                pos,
            )
        } else {
            self.err(
                format!(
                    "expected {}, found {}",
                    self.type_name(target),
                    self.type_name(src)
                ),
                pos,
            )
        }
    }

    fn value_ty(&self, expr: &HirExpr) -> Result<Type, CoreError> {
        expr.ty
            .clone()
            .ok_or_else(|| self.err("expression has no value", expr.pos))
    }

    fn is_lvalue(&self, expr: &HirExpr) -> bool {
        match &expr.kind {
            HirExprKind::Var(d) => self.ctx.decl(*d).is_var(),
            HirExprKind::Unary {
                op: UnaryOp::Deref, ..
            } => true,
            HirExprKind::Index { base, .. } => match &base.ty {
                Some(Type::Str) => false,
                Some(Type::Ptr(_)) => true,
                _ => self.is_lvalue(base),
            },
            HirExprKind::Member { base, .. } => self.is_lvalue(base),
            _ => false,
        }
    }
}

fn cast(expr: HirExpr, target: &Type, pos: Pos) -> HirExpr {
    HirExpr {
        kind: HirExprKind::Cast {
            value: Box::new(expr),
        },
        ty: Some(target.clone()),
        pos,
    }
}

fn truthy(expr: &HirExpr) -> bool {
    match &expr.kind {
        HirExprKind::Int(v) => *v != 0,
        HirExprKind::Bool(b) => *b,
        HirExprKind::Str(s) | HirExprKind::CStr(s) => !s.is_empty(),
        _ => false,
    }
}

fn fold_arith(op: BinOp, l: i64, r: i64, kind: IntKind) -> i64 {
    if kind.is_signed() {
        match op {
            BinOp::Add => l.wrapping_add(r),
            BinOp::Sub => l.wrapping_sub(r),
            BinOp::Mul => l.wrapping_mul(r),
            BinOp::Div => l.wrapping_div(r),
            BinOp::Rem => l.wrapping_rem(r),
            BinOp::BitAnd => l & r,
            BinOp::BitOr => l | r,
            BinOp::BitXor => l ^ r,
            _ => 0,
        }
    } else {
        let (l, r) = (l as u64, r as u64);
        (match op {
            BinOp::Add => l.wrapping_add(r),
            BinOp::Sub => l.wrapping_sub(r),
            BinOp::Mul => l.wrapping_mul(r),
            BinOp::Div => l / r,
            BinOp::Rem => l % r,
            BinOp::BitAnd => l & r,
            BinOp::BitOr => l | r,
            BinOp::BitXor => l ^ r,
            _ => 0,
        }) as i64
    }
}

fn fold_compare(op: BinOp, l: i64, r: i64, signed: bool) -> bool {
    if signed {
        match op {
            BinOp::Eq => l == r,
            BinOp::Ne => l != r,
            BinOp::Lt => l < r,
            BinOp::Gt => l > r,
            BinOp::Le => l <= r,
            BinOp::Ge => l >= r,
            _ => false,
        }
    } else {
        let (l, r) = (l as u64, r as u64);
        match op {
            BinOp::Eq => l == r,
            BinOp::Ne => l != r,
            BinOp::Lt => l < r,
            BinOp::Gt => l > r,
            BinOp::Le => l <= r,
            BinOp::Ge => l >= r,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyze_source(source: &str) -> Result<(Ctx, HirUnit), CoreError> {
        let mut ctx = Ctx::new();
        let unit = ctx.add_unit("main".into(), source.to_string(), true);
        let lexed = lex(source, &mut ctx.interner)?;
        let module = parse(&lexed.tokens, source, &mut ctx.interner)?;
        let hir = analyze(&module, unit, &mut ctx, &HashMap::new())?;
        Ok((ctx, hir))
    }

    fn first_init(hir: &HirUnit) -> &HirExpr {
        for stmt in &hir.body {
            if let HirStmtKind::VarInit {
                init: Some(init), ..
            } = &stmt.kind
            {
                return init;
            }
        }
        panic!("no initialized variable");
    }

    fn semantic_message(err: CoreError) -> String {
        match err {
            CoreError::Semantic(d) => d.message,
            other => panic!("expected semantic error, got {other}"),
        }
    }

    #[test]
    fn folds_constant_arithmetic() {
        let (_, hir) = analyze_source("var x: int = 2 + 3 * 4;").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(14)));
    }

    #[test]
    fn folding_wraps_on_overflow() {
        let (_, hir) =
            analyze_source("var x: int = 9223372036854775807 + 1;").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(i64::MIN)));
    }

    #[test]
    fn constant_division_by_zero_is_fatal() {
        let err = analyze_source("var x: int = 1 // 0;").unwrap_err();
        assert!(semantic_message(err).contains("division by zero"));
    }

    #[test]
    fn runtime_division_by_constant_zero_is_deferred() {
        // Not a constant expression; left for the target to trap on.
        analyze_source("var x: int = 1; var y: int = x // 0;").expect("analyze");
    }

    #[test]
    fn narrowing_initializer_truncates() {
        let (_, hir) = analyze_source("var x: int8 = 300;").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(44)));
    }

    #[test]
    fn unsigned_kinds_zero_extend() {
        let (_, hir) = analyze_source("var x: uint8 = 0 - 1;").expect("analyze");
        // -1 truncated to u8 then re-widened.
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(255)));
    }

    #[test]
    fn logical_operators_select_operands() {
        let (_, hir) = analyze_source("var x: int = 0 || 5;").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(5)));

        let (_, hir) = analyze_source("var s: string = \"\" && \"b\";").expect("analyze");
        let HirExprKind::Str(text) = &first_init(&hir).kind else {
            panic!("expected string");
        };
        assert_eq!(text, "");
    }

    #[test]
    fn array_literal_items_convert_elementwise() {
        let (_, hir) = analyze_source("var a: [3]int8 = [1, 2, 300];").expect("analyze");
        let HirExprKind::ArrayLit(items) = &first_init(&hir).kind else {
            panic!("expected array literal");
        };
        assert_eq!(items.len(), 3);
        for item in items {
            assert_eq!(item.ty, Some(Type::Int(IntKind::I8)));
        }
        assert!(matches!(items[2].kind, HirExprKind::Int(44)));
    }

    #[test]
    fn non_literal_array_conversion_indexes_elements() {
        let source = "var a: [2]int = [1, 2]; var b: [2]int8 = a as [2]int8;";
        let (_, hir) = analyze_source(source).expect("analyze");
        let HirStmtKind::VarInit {
            init: Some(init), ..
        } = &hir.body[1].kind
        else {
            panic!("expected var");
        };
        let HirExprKind::ArrayLit(items) = &init.kind else {
            panic!("expected synthesized array literal");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0].kind, HirExprKind::Cast { .. }));
    }

    #[test]
    fn empty_array_literal_is_rejected() {
        let err = analyze_source("var a: []int = [];").unwrap_err();
        assert!(semantic_message(err).contains("empty array literal"));
    }

    #[test]
    fn declared_length_completes_from_initializer() {
        let (ctx, hir) = analyze_source("var a: []int = [1, 2, 3];").expect("analyze");
        let HirStmtKind::VarInit { decl, .. } = &hir.body[0].kind else {
            panic!("expected var");
        };
        assert_eq!(ctx.decl(*decl).ty, Type::array(Type::INT, Some(3)));
    }

    #[test]
    fn constant_subscripts_of_constant_arrays_fold() {
        let (_, hir) = analyze_source("var x: int = [4, 5][1];").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(5)));
        // The folded element is usable where a constant is required.
        analyze_source("var a: [[1, 2][0]]int;").expect("folded length is constant");
    }

    #[test]
    fn constant_index_out_of_range() {
        let err = analyze_source("var a: [2]int = [1, 2]; var x: int = a[2];").unwrap_err();
        assert!(semantic_message(err).contains("out of range"));
    }

    #[test]
    fn variable_use_before_declaration_is_rejected() {
        let err = analyze_source("var x: int = y; var y: int = 1;").unwrap_err();
        assert!(semantic_message(err).contains("declared later"));
    }

    #[test]
    fn forward_function_calls_resolve() {
        let source = "function f(): int { return g(); } function g(): int { return 1; }";
        analyze_source(source).expect("forward call should resolve");
    }

    #[test]
    fn redeclaration_is_rejected() {
        let err = analyze_source("var x: int; var x: int;").unwrap_err();
        assert!(semantic_message(err).contains("redeclared"));
    }

    #[test]
    fn shadowing_in_inner_scope_is_allowed() {
        let source = "var x: int = 1; if true { var x: int = 2; }";
        analyze_source(source).expect("shadowing should be allowed");
    }

    #[test]
    fn outer_references_become_dependencies() {
        let source = "var g: int = 1; \
                      function outer() { \
                          var x: int = 2; \
                          function inner(): int { return x + g; } \
                      }";
        let (ctx, hir) = analyze_source(source).expect("analyze");
        let inner = hir
            .funcs
            .iter()
            .find(|f| ctx.interner.resolve(ctx.decl(f.decl).name) == "inner")
            .expect("inner function");
        let DeclKind::Func { deps, .. } = &ctx.decl(inner.decl).kind else {
            panic!("expected function");
        };
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = analyze_source("break;").unwrap_err();
        assert!(semantic_message(err).contains("'break'"));
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let err = analyze_source("return 1;").unwrap_err();
        assert!(semantic_message(err).contains("'return'"));
    }

    #[test]
    fn enum_items_count_up_from_previous() {
        let (_, hir) =
            analyze_source("enum E { A, B = 5, C } var x: int = E.C;").expect("analyze");
        assert!(matches!(first_init(&hir).kind, HirExprKind::Int(6)));
    }

    #[test]
    fn empty_structure_is_rejected() {
        let err = analyze_source("struct S { }").unwrap_err();
        assert!(semantic_message(err).contains("empty structure"));
    }

    #[test]
    fn export_marks_reachable_types() {
        let source = "struct P { x: int; } export function f(p: P): int { return p.x; }";
        let (ctx, hir) = analyze_source(source).expect("analyze");
        assert_eq!(hir.records.len(), 1);
        assert!(ctx.decl(hir.records[0]).exported);
    }

    #[test]
    fn void_call_has_no_value() {
        let err = analyze_source("function f() { } var x: int = f();").unwrap_err();
        assert!(semantic_message(err).contains("no value"));
    }

    #[test]
    fn string_subscript_and_length_are_typed() {
        let source = "var s: string = \"abc\"; var c: string = s[1]; var n: int = s.length;";
        let (ctx, hir) = analyze_source(source).expect("analyze");
        let HirStmtKind::VarInit { decl, .. } = &hir.body[1].kind else {
            panic!("expected var");
        };
        assert_eq!(ctx.decl(*decl).ty, Type::Str);
    }

    #[test]
    fn fixed_length_folds_to_constant() {
        let (_, hir) =
            analyze_source("var a: [4]int = [1, 2, 3, 4]; var n: int = a.length;").expect("analyze");
        let HirStmtKind::VarInit {
            init: Some(init), ..
        } = &hir.body[1].kind
        else {
            panic!("expected var");
        };
        assert!(matches!(init.kind, HirExprKind::Int(4)));
    }

    #[test]
    fn runtime_logical_operands_must_be_bool() {
        let err = analyze_source("var a: int = 1; var b: bool = a && true;").unwrap_err();
        assert!(semantic_message(err).contains("must be bool"));
    }
}
