//! Dependency resolution for functions.
//!
//! The checker records which outer variables and functions each
//! function body touches. This pass closes those lists transitively:
//! calling a function means depending on everything it depends on,
//! except values that live inside the caller itself. The closed lists
//! drive two things: closure lowering in code generation (captured
//! locals become pointer parameters) and the use-site ordering check,
//! which rejects calling a function before a variable it reads has
//! been declared.

use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::hir::{HirExpr, HirExprKind, HirStmt, HirStmtKind, HirUnit};
use crate::scope::{Ctx, DeclId, DeclKind, UnitId};

/// Close every function's dependency list and run the ordering check
/// over all analyzed units.
pub fn resolve(ctx: &mut Ctx, units: &[HirUnit]) -> Result<(), CoreError> {
    let funcs: Vec<DeclId> = units
        .iter()
        .flat_map(|u| u.funcs.iter().map(|f| f.decl))
        .collect();

    loop {
        let mut changed = false;
        for &f in &funcs {
            let deps = match &ctx.decl(f).kind {
                DeclKind::Func { deps, .. } => deps.clone(),
                _ => continue,
            };
            let mut added = Vec::new();
            for &dep in &deps {
                if !ctx.decl(dep).is_func() {
                    continue;
                }
                let inner = match &ctx.decl(dep).kind {
                    DeclKind::Func { deps, .. } => deps.clone(),
                    _ => continue,
                };
                for v in inner {
                    if v == f || deps.contains(&v) || added.contains(&v) {
                        continue;
                    }
                    // Values living inside the caller are satisfied by
                    // the caller itself and do not propagate outward.
                    if funchost_of(ctx, v) == Some(f) {
                        continue;
                    }
                    added.push(v);
                }
            }
            if !added.is_empty() {
                if let DeclKind::Func { deps, .. } = &mut ctx.decl_mut(f).kind {
                    deps.extend(added);
                }
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    for &f in &funcs {
        ctx.decl_mut(f).deps_scanned = true;
    }

    for unit in units {
        check_unit(ctx, unit)?;
    }
    Ok(())
}

/// The function whose body declares `decl`, if any.
pub fn funchost_of(ctx: &Ctx, decl: DeclId) -> Option<DeclId> {
    ctx.scope(ctx.decl(decl).scope).funchost
}

/// The captured locals a function needs passed in as pointers, in a
/// stable order.
pub fn captured_locals(ctx: &Ctx, func: DeclId) -> Vec<DeclId> {
    let DeclKind::Func { deps, .. } = &ctx.decl(func).kind else {
        return Vec::new();
    };
    deps.iter()
        .copied()
        .filter(|&d| ctx.decl(d).is_var() && funchost_of(ctx, d).is_some())
        .collect()
}

fn check_unit(ctx: &Ctx, unit: &HirUnit) -> Result<(), CoreError> {
    let walker = Walker {
        ctx,
        unit: unit.unit,
    };
    walker.stmts(&unit.body, None)?;
    for func in &unit.funcs {
        walker.stmts(&func.body, Some(func.decl))?;
    }
    Ok(())
}

struct Walker<'a> {
    ctx: &'a Ctx,
    unit: UnitId,
}

impl Walker<'_> {
    fn err(&self, message: String, pos: crate::span::Pos) -> CoreError {
        let source = &self.ctx.unit(self.unit).source;
        CoreError::Semantic(Diagnostic::new(message, pos, source))
    }

    fn stmts(&self, stmts: &[HirStmt], func: Option<DeclId>) -> Result<(), CoreError> {
        for stmt in stmts {
            match &stmt.kind {
                HirStmtKind::Print(args) => {
                    for arg in args {
                        self.expr(arg, func)?;
                    }
                }
                HirStmtKind::VarInit { init, .. } => {
                    if let Some(init) = init {
                        self.expr(init, func)?;
                    }
                }
                HirStmtKind::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    self.expr(cond, func)?;
                    self.stmts(then_body, func)?;
                    if let Some(else_body) = else_body {
                        self.stmts(else_body, func)?;
                    }
                }
                HirStmtKind::While { cond, body } => {
                    self.expr(cond, func)?;
                    self.stmts(body, func)?;
                }
                HirStmtKind::ForRange {
                    start, end, body, ..
                } => {
                    self.expr(start, func)?;
                    self.expr(end, func)?;
                    self.stmts(body, func)?;
                }
                HirStmtKind::ForEach { seq, body, .. } => {
                    self.expr(seq, func)?;
                    self.stmts(body, func)?;
                }
                HirStmtKind::Assign { target, value } => {
                    self.expr(target, func)?;
                    self.expr(value, func)?;
                }
                HirStmtKind::Call(expr) | HirStmtKind::Delete(expr) => self.expr(expr, func)?,
                HirStmtKind::Return(value) => {
                    if let Some(value) = value {
                        self.expr(value, func)?;
                    }
                }
                HirStmtKind::Break | HirStmtKind::Continue | HirStmtKind::ImportInit { .. } => {}
            }
        }
        Ok(())
    }

    fn expr(&self, expr: &HirExpr, func: Option<DeclId>) -> Result<(), CoreError> {
        match &expr.kind {
            HirExprKind::Var(d) => {
                if self.ctx.decl(*d).is_func() {
                    self.check_use(*d, expr, func)?;
                }
            }
            HirExprKind::Unary { operand, .. } | HirExprKind::Cast { value: operand } => {
                self.expr(operand, func)?;
            }
            HirExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs, func)?;
                self.expr(rhs, func)?;
            }
            HirExprKind::Index { base, index } => {
                self.expr(base, func)?;
                self.expr(index, func)?;
            }
            HirExprKind::Call { callee, args } => {
                self.expr(callee, func)?;
                for arg in args {
                    self.expr(arg, func)?;
                }
            }
            HirExprKind::Member { base, .. } | HirExprKind::Length { base } => {
                self.expr(base, func)?;
            }
            HirExprKind::ArrayLit(items) => {
                for item in items {
                    self.expr(item, func)?;
                }
            }
            HirExprKind::New { len } => {
                if let Some(len) = len {
                    self.expr(len, func)?;
                }
            }
            HirExprKind::Int(_)
            | HirExprKind::Bool(_)
            | HirExprKind::Str(_)
            | HirExprKind::CStr(_) => {}
        }
        Ok(())
    }

    /// A function reference is valid only if every variable it depends
    /// on, transitively, is already declared at this point.
    fn check_use(
        &self,
        callee: DeclId,
        site: &HirExpr,
        func: Option<DeclId>,
    ) -> Result<(), CoreError> {
        let DeclKind::Func { deps, .. } = &self.ctx.decl(callee).kind else {
            return Ok(());
        };
        for &dep in deps {
            let decl = self.ctx.decl(dep);
            if !decl.is_var() || decl.unit != self.unit {
                continue;
            }
            if funchost_of(self.ctx, dep) != func {
                continue;
            }
            if decl.pos.offset > site.pos.offset {
                let fname = self.ctx.interner.resolve(self.ctx.decl(callee).name);
                let vname = self.ctx.interner.resolve(decl.name);
                return Err(self.err(
                    format!("function '{fname}' uses '{vname}' which is declared later"),
                    site.pos,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::sema::analyze;
    use std::collections::HashMap;

    fn run(source: &str) -> Result<(Ctx, HirUnit), CoreError> {
        let mut ctx = Ctx::new();
        let unit = ctx.add_unit("main".into(), source.to_string(), true);
        let lexed = lex(source, &mut ctx.interner)?;
        let module = parse(&lexed.tokens, source, &mut ctx.interner)?;
        let hir = analyze(&module, unit, &mut ctx, &HashMap::new())?;
        resolve(&mut ctx, std::slice::from_ref(&hir))?;
        Ok((ctx, hir))
    }

    fn message(err: CoreError) -> String {
        match err {
            CoreError::Semantic(d) => d.message,
            other => panic!("expected semantic error, got {other}"),
        }
    }

    #[test]
    fn calling_before_a_used_global_is_rejected() {
        let source = "f(); var g: int = 1; function f(): int { return g; }";
        let err = run(source).unwrap_err();
        assert!(message(err).contains("declared later"));
    }

    #[test]
    fn calling_after_the_used_global_is_fine() {
        let source = "var g: int = 1; f(); function f(): int { return g; }";
        run(source).expect("ordering is satisfied");
    }

    #[test]
    fn ordering_violations_propagate_through_calls() {
        let source = "f(); var g: int = 1; \
                      function f(): int { return h(); } \
                      function h(): int { return g; }";
        let err = run(source).unwrap_err();
        assert!(message(err).contains("'f'"));
    }

    #[test]
    fn captures_propagate_to_callers() {
        let source = "function outer(): int { \
                          var x: int = 1; \
                          function a(): int { return b(); } \
                          function b(): int { return x; } \
                          return a(); \
                      }";
        let (ctx, hir) = run(source).expect("analyze");
        let a = hir
            .funcs
            .iter()
            .find(|f| ctx.interner.resolve(ctx.decl(f.decl).name) == "a")
            .expect("function a");
        let captured = captured_locals(&ctx, a.decl);
        assert_eq!(captured.len(), 1);
        assert_eq!(ctx.interner.resolve(ctx.decl(captured[0]).name), "x");
    }

    #[test]
    fn nested_capture_before_declaration_is_rejected() {
        let source = "function outer() { \
                          g(); \
                          var x: int = 1; \
                          function g(): int { return x; } \
                      }";
        let err = run(source).unwrap_err();
        assert!(message(err).contains("declared later"));
    }

    #[test]
    fn locals_of_the_caller_do_not_propagate_outward() {
        let source = "function outer(): int { \
                          var x: int = 1; \
                          function g(): int { return x; } \
                          return g(); \
                      } \
                      outer();";
        let (ctx, hir) = run(source).expect("analyze");
        let outer = hir
            .funcs
            .iter()
            .find(|f| ctx.interner.resolve(ctx.decl(f.decl).name) == "outer")
            .expect("outer");
        assert!(captured_locals(&ctx, outer.decl).is_empty());
    }
}
