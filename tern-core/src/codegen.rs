//! C code generation.
//!
//! Each analyzed unit lowers to a header and a body translation unit;
//! the main unit additionally gets an entry file defining `main`.
//! Strings lower to a length + bytes record, dynamic arrays to a
//! length + items record, and nested functions are lifted to the top
//! level with their captured locals passed as pointer parameters. A
//! unit's top-level statements become a one-shot initializer function
//! that importing units call at the lexical position of the import.

use std::collections::HashSet;
use std::fmt::Write;

use crate::ast::{BinOp, UnaryOp};
use crate::deps::{captured_locals, funchost_of};
use crate::hir::{HirExpr, HirExprKind, HirFunc, HirStmt, HirStmtKind, HirUnit};
use crate::scope::{Ctx, DeclId, DeclKind};
use crate::types::{IntKind, Type};

/// The generated C texts for one unit.
#[derive(Debug)]
pub struct CUnit {
    pub name: String,
    pub header: String,
    pub body: String,
    /// `main` definition; present for the main unit only.
    pub entry: Option<String>,
}

pub fn generate(ctx: &Ctx, hir: &HirUnit) -> CUnit {
    let name = ctx.unit(hir.unit).name.clone();
    let mut cg = Gen {
        ctx,
        hir,
        unit_name: name.clone(),
        out: String::new(),
        indent: 0,
        tmp: 0,
        current: None,
        captures: Vec::new(),
    };
    let header = cg.header();
    let body = cg.body();
    let entry = if ctx.unit(hir.unit).is_main {
        Some(cg.entry_file())
    } else {
        None
    };
    CUnit {
        name,
        header,
        body,
        entry,
    }
}

struct Gen<'a> {
    ctx: &'a Ctx,
    hir: &'a HirUnit,
    unit_name: String,
    out: String,
    indent: usize,
    tmp: u32,
    /// Function whose body is being emitted; `None` in the entry.
    current: Option<DeclId>,
    /// Captured locals of `current`, available as pointer parameters.
    captures: Vec<DeclId>,
}

impl<'a> Gen<'a> {
    // ---------------------------------------------------------------
    // Output plumbing
    // ---------------------------------------------------------------

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn fresh(&mut self, stem: &str) -> String {
        self.tmp += 1;
        format!("tn_{}{}", stem, self.tmp)
    }

    // ---------------------------------------------------------------
    // Names and types
    // ---------------------------------------------------------------

    fn cname(&self, d: DeclId) -> &str {
        let decl = self.ctx.decl(d);
        if decl.foreign || !decl.exported {
            &decl.local_name
        } else {
            &decl.public_name
        }
    }

    fn field_name(&self, d: DeclId) -> &str {
        self.ctx.interner.resolve(self.ctx.decl(d).name)
    }

    fn init_fn(&self, unit: crate::scope::UnitId) -> String {
        format!("tn_init_{}", self.ctx.unit(unit).name)
    }

    fn ret_record(&self, d: DeclId) -> String {
        format!("{}_ret", self.cname(d))
    }

    /// Build a C declaration of `ty` around the declarator `inner`
    /// (empty for an abstract type).
    fn c_decl(&self, ty: &Type, inner: &str) -> String {
        fn join(base: &str, inner: &str) -> String {
            if inner.is_empty() {
                base.to_string()
            } else {
                format!("{base} {inner}")
            }
        }
        match ty {
            Type::Int(kind) => join(kind.c_name(), inner),
            Type::Bool => join("bool", inner),
            Type::Str => join("tn_string", inner),
            Type::CStr => join("char", &format!("*{inner}")),
            Type::Ptr(pointee) => match &**pointee {
                Type::Array { len: None, .. } => join("tn_dynarray", inner),
                // Pointers to fixed arrays are element pointers.
                Type::Array {
                    len: Some(_),
                    item,
                } => self.c_decl(item, &format!("*{inner}")),
                other => self.c_decl(other, &format!("*{inner}")),
            },
            Type::Array { item, len } => {
                let inner = if inner.starts_with('*') {
                    format!("({inner})")
                } else {
                    inner.to_string()
                };
                let n = len.map(|n| n.to_string()).unwrap_or_default();
                self.c_decl(item, &format!("{inner}[{n}]"))
            }
            Type::Fn { params, ret } => {
                let params = if params.is_empty() {
                    "void".to_string()
                } else {
                    params
                        .iter()
                        .map(|p| self.c_type(p))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let inner = format!("(*{inner})({params})");
                match ret {
                    Some(ret) => self.c_decl(ret, &inner),
                    None => join("void", &inner),
                }
            }
            Type::Struct(d) | Type::Union(d) => join(&self.cname(*d).to_string(), inner),
            Type::Enum(_) => join("int64_t", inner),
        }
    }

    fn c_type(&self, ty: &Type) -> String {
        self.c_decl(ty, "")
    }

    fn zero_value(&self, ty: &Type) -> &'static str {
        match ty {
            Type::Int(_) | Type::Enum(_) => "0",
            Type::Bool => "false",
            Type::CStr => "NULL",
            Type::Ptr(pointee) => match &**pointee {
                Type::Array { len: None, .. } => "{0}",
                _ => "NULL",
            },
            Type::Fn { .. } => "NULL",
            _ => "{0}",
        }
    }

    // ---------------------------------------------------------------
    // File assembly
    // ---------------------------------------------------------------

    fn header(&mut self) -> String {
        let guard = format!("TERN_{}_H", self.unit_name.to_uppercase());
        self.out.clear();
        self.indent = 0;
        self.line(&format!("#ifndef {guard}"));
        self.line(&format!("#define {guard}"));
        self.blank();
        // Exported signatures and members may name imported types.
        for &import in &self.hir.imports {
            self.line(&format!("#include \"{}.h\"", self.ctx.unit(import).name));
        }
        self.runtime_typedefs();
        self.blank();
        let records = self.sorted_records(true);
        self.record_defs(&records);
        for f in &self.hir.funcs {
            let decl = self.ctx.decl(f.decl);
            if decl.exported {
                self.ret_record_def(f.decl);
            }
        }
        for &g in &self.hir.globals {
            let decl = self.ctx.decl(g);
            if decl.exported {
                let text = self.c_decl(&decl.ty, self.cname(g));
                self.line(&format!("extern {text};"));
            }
        }
        for f in &self.hir.funcs {
            if self.ctx.decl(f.decl).exported {
                let sig = self.signature(f.decl);
                self.line(&format!("{sig};"));
            }
        }
        self.line(&format!("void {}(void);", self.init_fn(self.hir.unit)));
        self.blank();
        self.line(&format!("#endif /* {guard} */"));
        std::mem::take(&mut self.out)
    }

    fn runtime_typedefs(&mut self) {
        self.line("#ifndef TERN_RT_DEFINED");
        self.line("#define TERN_RT_DEFINED");
        self.line("#include <stdint.h>");
        self.line("#include <stdbool.h>");
        self.line("#include <stddef.h>");
        self.line("typedef struct { int64_t len; uint8_t *bytes; } tn_string;");
        self.line("typedef struct { int64_t len; void *items; } tn_dynarray;");
        self.line("#endif");
    }

    fn body(&mut self) -> String {
        self.out.clear();
        self.indent = 0;
        self.line(&format!("#include \"{}.h\"", self.unit_name));
        for &import in &self.hir.imports {
            self.line(&format!("#include \"{}.h\"", self.ctx.unit(import).name));
        }
        self.line("#include <stdio.h>");
        self.line("#include <stdlib.h>");
        self.line("#include <string.h>");
        self.line("#include <inttypes.h>");
        self.blank();
        self.line("extern int tn_rt_argc;");
        self.line("extern char **tn_rt_argv;");
        self.blank();
        self.line("static char *tn_cstr(tn_string s) {");
        self.line("    char *p = malloc((size_t)s.len + 1);");
        self.line("    memcpy(p, s.bytes, (size_t)s.len);");
        self.line("    p[s.len] = 0;");
        self.line("    return p;");
        self.line("}");
        self.blank();
        self.line("static tn_dynarray tn_alloc(int64_t n, size_t size) {");
        self.line("    tn_dynarray a = { n, calloc((size_t)n, size) };");
        self.line("    return a;");
        self.line("}");
        self.blank();
        self.line("static void tn_print_string(tn_string s) {");
        self.line("    fwrite(s.bytes, 1, (size_t)s.len, stdout);");
        self.line("}");
        self.blank();

        let records = self.sorted_records(false);
        self.record_defs(&records);

        self.print_helpers();

        for &d in &self.hir.foreigns {
            let decl = self.ctx.decl(d);
            if decl.is_func() {
                let sig = self.foreign_signature(d);
                self.line(&format!("extern {sig};"));
            } else {
                let text = self.c_decl(&decl.ty, self.cname(d));
                self.line(&format!("extern {text};"));
            }
        }
        if !self.hir.foreigns.is_empty() {
            self.blank();
        }

        for &g in &self.hir.globals {
            let decl = self.ctx.decl(g);
            let text = self.c_decl(&decl.ty, self.cname(g));
            if decl.exported {
                self.line(&format!("{text};"));
            } else {
                self.line(&format!("static {text};"));
            }
        }
        {
            let decl = self.ctx.decl(self.hir.args);
            let text = self.c_decl(&decl.ty, self.cname(self.hir.args));
            self.line(&format!("static {text};"));
        }
        self.blank();

        for f in &self.hir.funcs {
            if !self.ctx.decl(f.decl).exported {
                self.ret_record_def(f.decl);
            }
        }
        for f in &self.hir.funcs {
            let sig = self.signature(f.decl);
            self.line(&format!("{sig};"));
        }
        self.blank();

        // Bodies are queued innermost-last; emit in declaration order.
        let mut funcs: Vec<&HirFunc> = self.hir.funcs.iter().collect();
        funcs.sort_by_key(|f| self.ctx.decl(f.decl).pos.offset);
        for f in funcs {
            self.function_def(f);
            self.blank();
        }

        self.entry_def();
        std::mem::take(&mut self.out)
    }

    fn entry_file(&mut self) -> String {
        self.out.clear();
        self.indent = 0;
        self.line(&format!("#include \"{}.h\"", self.unit_name));
        self.blank();
        self.line("int tn_rt_argc;");
        self.line("char **tn_rt_argv;");
        self.blank();
        self.line("int main(int argc, char **argv) {");
        self.line("    tn_rt_argc = argc;");
        self.line("    tn_rt_argv = argv;");
        self.line(&format!("    {}();", self.init_fn(self.hir.unit)));
        self.line("    return 0;");
        self.line("}");
        std::mem::take(&mut self.out)
    }

    // ---------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------

    /// Records of this unit in by-value dependency order, filtered by
    /// export status.
    fn sorted_records(&self, exported: bool) -> Vec<DeclId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for &d in &self.hir.records {
            self.record_order(d, &mut order, &mut seen);
        }
        order
            .into_iter()
            .filter(|&d| {
                self.ctx.decl(d).exported == exported && self.hir.records.contains(&d)
            })
            .collect()
    }

    fn record_order(&self, d: DeclId, order: &mut Vec<DeclId>, seen: &mut HashSet<DeclId>) {
        if !seen.insert(d) {
            return;
        }
        if let DeclKind::Record { members, .. } = &self.ctx.decl(d).kind {
            for &m in members {
                for dep in value_records(&self.ctx.decl(m).ty) {
                    self.record_order(dep, order, seen);
                }
            }
        }
        order.push(d);
    }

    fn record_defs(&mut self, records: &[DeclId]) {
        for &d in records {
            let kw = match &self.ctx.decl(d).kind {
                DeclKind::Record { is_union: true, .. } => "union",
                _ => "struct",
            };
            let name = self.cname(d).to_string();
            self.line(&format!("typedef {kw} {name} {name};"));
        }
        for &d in records {
            let (members, kw) = match &self.ctx.decl(d).kind {
                DeclKind::Record { members, is_union } => {
                    (members.clone(), if *is_union { "union" } else { "struct" })
                }
                _ => continue,
            };
            let name = self.cname(d).to_string();
            self.line(&format!("{kw} {name} {{"));
            for m in members {
                let text = self.c_decl(&self.ctx.decl(m).ty, self.field_name(m));
                self.line(&format!("    {text};"));
            }
            self.line("};");
            self.blank();
        }
    }

    // ---------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------

    fn param_list(&self, d: DeclId) -> String {
        let DeclKind::Func { params, .. } = &self.ctx.decl(d).kind else {
            return "void".to_string();
        };
        let mut out = Vec::new();
        for &p in params {
            let decl = self.ctx.decl(p);
            out.push(self.c_decl(&decl.ty, &decl.local_name));
        }
        for v in captured_locals(self.ctx, d) {
            let decl = self.ctx.decl(v);
            out.push(self.c_decl(&decl.ty, &format!("*c_{}", decl.local_name)));
        }
        if out.is_empty() {
            "void".to_string()
        } else {
            out.join(", ")
        }
    }

    fn return_type(&self, d: DeclId) -> String {
        match &self.ctx.decl(d).ty {
            Type::Fn {
                ret: Some(ret), ..
            } => match &**ret {
                Type::Array { len: Some(_), .. } => self.ret_record(d),
                other => self.c_type(other),
            },
            _ => "void".to_string(),
        }
    }

    fn signature(&self, d: DeclId) -> String {
        let prefix = if self.ctx.decl(d).exported { "" } else { "static " };
        format!(
            "{}{} {}({})",
            prefix,
            self.return_type(d),
            self.cname(d),
            self.param_list(d)
        )
    }

    /// Foreign prototypes are spelled from the declared type alone;
    /// they never get parameter declarations of their own.
    fn foreign_signature(&self, d: DeclId) -> String {
        let params = match &self.ctx.decl(d).ty {
            Type::Fn { params, .. } if !params.is_empty() => params
                .iter()
                .map(|p| self.c_type(p))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "void".to_string(),
        };
        format!("{} {}({})", self.return_type(d), self.cname(d), params)
    }

    /// Wrapper record for a fixed-array return value.
    fn ret_record_def(&mut self, d: DeclId) {
        if let Type::Fn {
            ret: Some(ret), ..
        } = &self.ctx.decl(d).ty
        {
            if matches!(**ret, Type::Array { len: Some(_), .. }) {
                let field = self.c_decl(ret, "v");
                let name = self.ret_record(d);
                self.line(&format!("typedef struct {{ {field}; }} {name};"));
            }
        }
    }

    fn function_def(&mut self, f: &HirFunc) {
        self.current = Some(f.decl);
        self.captures = captured_locals(self.ctx, f.decl);
        let sig = self.signature(f.decl);
        self.line(&format!("{sig} {{"));
        self.indent += 1;
        self.stmts(&f.body);
        self.indent -= 1;
        self.line("}");
        self.current = None;
        self.captures = Vec::new();
    }

    fn entry_def(&mut self) {
        self.current = None;
        self.captures = Vec::new();
        let name = self.init_fn(self.hir.unit);
        self.line(&format!("void {name}(void) {{"));
        self.indent += 1;
        self.line("static bool tn_done = false;");
        self.line("if (tn_done) {");
        self.line("    return;");
        self.line("}");
        self.line("tn_done = true;");
        let args = self.cname(self.hir.args).to_string();
        self.line("{");
        self.indent += 1;
        self.line("tn_string *items = calloc((size_t)tn_rt_argc, sizeof(tn_string));");
        self.line("for (int i = 0; i < tn_rt_argc; i++) {");
        self.line("    items[i].len = (int64_t)strlen(tn_rt_argv[i]);");
        self.line("    items[i].bytes = (uint8_t *)tn_rt_argv[i];");
        self.line("}");
        self.line(&format!("{args}.len = tn_rt_argc;"));
        self.line(&format!("{args}.items = items;"));
        self.indent -= 1;
        self.line("}");
        self.stmts(&self.hir.body);
        self.indent -= 1;
        self.line("}");
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn stmts(&mut self, stmts: &[HirStmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &HirStmt) {
        match &stmt.kind {
            HirStmtKind::Print(args) => self.print_stmt(args),
            HirStmtKind::VarInit { decl, init } => self.var_init(*decl, init.as_ref()),
            HirStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr(cond);
                self.line(&format!("if ({cond}) {{"));
                self.indent += 1;
                self.stmts(then_body);
                self.indent -= 1;
                match else_body {
                    Some(else_body) => {
                        self.line("} else {");
                        self.indent += 1;
                        self.stmts(else_body);
                        self.indent -= 1;
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            HirStmtKind::While { cond, body } => {
                let cond = self.expr(cond);
                self.line(&format!("while ({cond}) {{"));
                self.indent += 1;
                self.stmts(body);
                self.indent -= 1;
                self.line("}");
            }
            HirStmtKind::ForRange {
                var,
                start,
                end,
                body,
            } => {
                let name = self.ctx.decl(*var).local_name.clone();
                let start = self.expr(start);
                let end_expr = self.expr(end);
                let end_tmp = self.fresh("end");
                self.line("{");
                self.indent += 1;
                self.line(&format!("int64_t {name} = {start};"));
                self.line(&format!("int64_t {end_tmp} = {end_expr};"));
                self.line(&format!("for (; {name} < {end_tmp}; {name}++) {{"));
                self.indent += 1;
                self.stmts(body);
                self.indent -= 1;
                self.line("}");
                self.indent -= 1;
                self.line("}");
            }
            HirStmtKind::ForEach { var, seq, body } => self.for_each(*var, seq, body),
            HirStmtKind::Assign { target, value } => {
                let target_str = self.expr(target);
                let ty = target.ty.clone().unwrap_or(Type::INT);
                self.assign(&target_str, &ty, value);
            }
            HirStmtKind::Call(expr) => {
                let text = self.expr(expr);
                self.line(&format!("{text};"));
            }
            HirStmtKind::Return(value) => self.return_stmt(value.as_ref()),
            HirStmtKind::Break => self.line("break;"),
            HirStmtKind::Continue => self.line("continue;"),
            HirStmtKind::Delete(expr) => {
                let ty = expr.ty.clone();
                let text = self.expr(expr);
                match ty {
                    Some(ty) if ty.is_dyn_array_ptr() => {
                        self.line(&format!("free(({text}).items);"))
                    }
                    _ => self.line(&format!("free((void *){text});")),
                }
            }
            HirStmtKind::ImportInit { unit } => {
                let call = self.init_fn(*unit);
                self.line(&format!("{call}();"));
            }
        }
    }

    fn var_init(&mut self, decl: DeclId, init: Option<&HirExpr>) {
        let d = self.ctx.decl(decl);
        let ty = d.ty.clone();
        let name = self.cname(decl).to_string();
        let is_global = self.ctx.scope(d.scope).funchost.is_none() && self.current.is_none()
            && self.hir.globals.contains(&decl);
        if is_global {
            // Storage is emitted at file scope; run the initializer.
            if let Some(init) = init {
                self.assign(&name, &ty, init);
            }
            return;
        }
        let text = self.c_decl(&ty, &name);
        match init {
            Some(init) if matches!(init.kind, HirExprKind::ArrayLit(_)) => {
                let items = self.initializer(init);
                self.line(&format!("{text} = {items};"));
            }
            Some(init) => {
                if matches!(ty, Type::Array { len: Some(_), .. }) {
                    let value = self.expr(init);
                    self.line(&format!("{text};"));
                    self.line(&format!("memcpy({name}, {value}, sizeof({name}));"));
                } else {
                    let value = self.expr(init);
                    self.line(&format!("{text} = {value};"));
                }
            }
            None => {
                let zero = self.zero_value(&ty);
                self.line(&format!("{text} = {zero};"));
            }
        }
    }

    /// Braced initializer for array literals in declaration position.
    fn initializer(&mut self, expr: &HirExpr) -> String {
        match &expr.kind {
            HirExprKind::ArrayLit(items) => {
                let items: Vec<String> = items.iter().map(|i| self.initializer(i)).collect();
                format!("{{ {} }}", items.join(", "))
            }
            _ => self.expr(expr),
        }
    }

    fn assign(&mut self, target: &str, ty: &Type, value: &HirExpr) {
        if let Type::Array {
            len: Some(_),
            item,
        } = ty
        {
            if let HirExprKind::ArrayLit(items) = &value.kind {
                for (i, item_expr) in items.iter().enumerate() {
                    self.assign(&format!("{target}[{i}]"), item, item_expr);
                }
                return;
            }
            let value = self.expr(value);
            self.line(&format!("memcpy({target}, {value}, sizeof({target}));"));
            return;
        }
        let value = self.expr(value);
        self.line(&format!("{target} = {value};"));
    }

    fn return_stmt(&mut self, value: Option<&HirExpr>) {
        let Some(value) = value else {
            self.line("return;");
            return;
        };
        if let Some(Type::Array { len: Some(_), .. }) = &value.ty {
            let record = self
                .current
                .map(|d| self.ret_record(d))
                .unwrap_or_default();
            let tmp = self.fresh("ret");
            let text = self.expr(value);
            self.line("{");
            self.indent += 1;
            self.line(&format!("{record} {tmp};"));
            self.line(&format!("memcpy({tmp}.v, {text}, sizeof({tmp}.v));"));
            self.line(&format!("return {tmp};"));
            self.indent -= 1;
            self.line("}");
            return;
        }
        let text = self.expr(value);
        self.line(&format!("return {text};"));
    }

    fn for_each(&mut self, var: DeclId, seq: &HirExpr, body: &[HirStmt]) {
        let item_ty = self.ctx.decl(var).ty.clone();
        let name = self.ctx.decl(var).local_name.clone();
        let seq_ty = seq.ty.clone().unwrap_or(Type::Str);
        let seq_text = self.expr(seq);
        let idx = self.fresh("i");
        self.line("{");
        self.indent += 1;
        match &seq_ty {
            Type::Str => {
                let s = self.fresh("seq");
                self.line(&format!("tn_string {s} = {seq_text};"));
                self.line(&format!(
                    "for (int64_t {idx} = 0; {idx} < {s}.len; {idx}++) {{"
                ));
                self.indent += 1;
                self.line(&format!(
                    "tn_string {name} = {{ 1, {s}.bytes + {idx} }};"
                ));
            }
            Type::Ptr(inner) => match &**inner {
                Type::Array { len: None, .. } => {
                    let s = self.fresh("seq");
                    let item_ptr = self.c_decl(&item_ty, "*");
                    self.line(&format!("tn_dynarray {s} = {seq_text};"));
                    self.line(&format!(
                        "for (int64_t {idx} = 0; {idx} < {s}.len; {idx}++) {{"
                    ));
                    self.indent += 1;
                    self.item_binding(&name, &item_ty, &format!("(({item_ptr}){s}.items)[{idx}]"));
                }
                Type::Array { len: Some(n), .. } => {
                    let s = self.fresh("seq");
                    let decl = self.c_decl(&Type::ptr(item_ty.clone()), &s);
                    self.line(&format!("{decl} = {seq_text};"));
                    self.line(&format!(
                        "for (int64_t {idx} = 0; {idx} < {n}; {idx}++) {{"
                    ));
                    self.indent += 1;
                    self.item_binding(&name, &item_ty, &format!("{s}[{idx}]"));
                }
                _ => {
                    self.line("/* tern codegen */");
                    self.indent -= 1;
                    self.line("}");
                    return;
                }
            },
            Type::Array { len, .. } => {
                let n = len.unwrap_or(0);
                let s = self.fresh("seq");
                let decl = self.c_decl(&seq_ty, &s);
                self.line(&format!("{decl};"));
                self.line(&format!("memcpy({s}, {seq_text}, sizeof({s}));"));
                self.line(&format!(
                    "for (int64_t {idx} = 0; {idx} < {n}; {idx}++) {{"
                ));
                self.indent += 1;
                self.item_binding(&name, &item_ty, &format!("{s}[{idx}]"));
            }
            _ => {
                self.line("/* tern codegen */");
                self.indent -= 1;
                self.line("}");
                return;
            }
        }
        self.stmts(body);
        self.indent -= 1;
        self.line("}");
        self.indent -= 1;
        self.line("}");
    }

    fn item_binding(&mut self, name: &str, ty: &Type, value: &str) {
        let decl = self.c_decl(ty, name);
        if matches!(ty, Type::Array { len: Some(_), .. }) {
            self.line(&format!("{decl};"));
            self.line(&format!("memcpy({name}, {value}, sizeof({name}));"));
        } else {
            self.line(&format!("{decl} = {value};"));
        }
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn expr(&mut self, expr: &HirExpr) -> String {
        match &expr.kind {
            HirExprKind::Int(v) => self.int_literal(*v, expr.ty.as_ref()),
            HirExprKind::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            HirExprKind::Str(s) => {
                format!(
                    "(tn_string){{ {}, (uint8_t *)\"{}\" }}",
                    s.len(),
                    escape_c(s)
                )
            }
            HirExprKind::CStr(s) => format!("\"{}\"", escape_c(s)),
            HirExprKind::Var(d) => self.var_ref(*d),
            HirExprKind::Unary { op, operand } => self.unary(*op, operand),
            HirExprKind::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                format!("({l} {} {r})", c_binop(*op))
            }
            HirExprKind::Cast { value } => self.cast_expr(value, expr.ty.as_ref()),
            HirExprKind::Index { base, index } => self.index(base, index),
            HirExprKind::Call { callee, args } => self.call(callee, args),
            HirExprKind::Member { base, field } => {
                let base = self.expr(base);
                format!("{base}.{}", self.field_name(*field))
            }
            HirExprKind::Length { base } => {
                let text = self.expr(base);
                format!("({text}).len")
            }
            HirExprKind::ArrayLit(items) => {
                let ty = expr.ty.clone().unwrap_or(Type::INT);
                let abstract_ty = self.c_type(&ty);
                let items: Vec<String> = items.iter().map(|i| self.initializer(i)).collect();
                format!("({abstract_ty}){{ {} }}", items.join(", "))
            }
            HirExprKind::New { len } => self.new_expr(len.as_deref(), expr.ty.as_ref()),
        }
    }

    fn int_literal(&self, v: i64, ty: Option<&Type>) -> String {
        match ty {
            Some(Type::Int(IntKind::U64)) => format!("{}ULL", v as u64),
            Some(Type::Int(IntKind::I64)) | Some(Type::Enum(_)) => {
                if v == i64::MIN {
                    "INT64_MIN".to_string()
                } else {
                    // `long` may be 32 bits; spell the full width.
                    format!("{v}LL")
                }
            }
            _ => format!("{v}"),
        }
    }

    fn var_ref(&self, d: DeclId) -> String {
        let decl = self.ctx.decl(d);
        if decl.is_var() {
            if let Some(host) = funchost_of(self.ctx, d) {
                if self.current != Some(host) {
                    // A captured local, reached through its pointer
                    // parameter.
                    return format!("(*c_{})", decl.local_name);
                }
                return decl.local_name.clone();
            }
        }
        self.cname(d).to_string()
    }

    fn unary(&mut self, op: UnaryOp, operand: &HirExpr) -> String {
        let ty = operand.ty.clone();
        let text = self.expr(operand);
        match op {
            UnaryOp::Neg => format!("(-{text})"),
            UnaryOp::Compl => format!("(~{text})"),
            UnaryOp::Deref => format!("(*{text})"),
            UnaryOp::AddrOf => match ty {
                // Arrays decay to element pointers on their own.
                Some(Type::Array { .. }) => text,
                _ => format!("(&{text})"),
            },
        }
    }

    fn cast_expr(&mut self, value: &HirExpr, target: Option<&Type>) -> String {
        let src_ty = value.ty.clone();
        let text = self.expr(value);
        match target {
            Some(Type::Bool) => format!("(({text}) != 0)"),
            Some(Type::Int(kind)) => format!("(({})({text}))", kind.c_name()),
            Some(Type::Enum(_)) => format!("((int64_t)({text}))"),
            Some(Type::CStr) if src_ty == Some(Type::Str) => format!("tn_cstr({text})"),
            Some(target @ Type::Ptr(pointee)) => {
                if let Type::Array { len: None, .. } = &**pointee {
                    // Decay from a fixed array pointer.
                    let n = match src_ty {
                        Some(Type::Ptr(inner)) => match &*inner {
                            Type::Array { len: Some(n), .. } => *n,
                            _ => 0,
                        },
                        _ => 0,
                    };
                    return format!("((tn_dynarray){{ {n}, (void *)({text}) }})");
                }
                format!("(({})({text}))", self.c_type(target))
            }
            Some(other) => format!("(({})({text}))", self.c_type(other)),
            None => text,
        }
    }

    fn index(&mut self, base: &HirExpr, index: &HirExpr) -> String {
        let base_ty = base.ty.clone();
        let base_text = self.expr(base);
        let index_text = self.expr(index);
        match base_ty {
            Some(Type::Str) => {
                format!("((tn_string){{ 1, ({base_text}).bytes + ({index_text}) }})")
            }
            Some(Type::Ptr(inner)) => match &*inner {
                Type::Array {
                    len: None,
                    item,
                } => {
                    let item_ptr = self.c_decl(item, "*");
                    format!("(({item_ptr})({base_text}).items)[{index_text}]")
                }
                _ => format!("{base_text}[{index_text}]"),
            },
            _ => format!("{base_text}[{index_text}]"),
        }
    }

    fn call(&mut self, callee: &HirExpr, args: &[HirExpr]) -> String {
        let mut parts: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
        let mut ret_fixed = false;
        let callee_text = match &callee.kind {
            HirExprKind::Var(d) if self.ctx.decl(*d).is_func() => {
                for v in captured_locals(self.ctx, *d) {
                    let decl = self.ctx.decl(v);
                    if funchost_of(self.ctx, v) == self.current {
                        parts.push(format!("&{}", decl.local_name));
                    } else {
                        parts.push(format!("c_{}", decl.local_name));
                    }
                }
                if let Type::Fn {
                    ret: Some(ret), ..
                } = &self.ctx.decl(*d).ty
                {
                    ret_fixed = matches!(**ret, Type::Array { len: Some(_), .. });
                }
                self.cname(*d).to_string()
            }
            _ => self.expr(callee),
        };
        let call = format!("{callee_text}({})", parts.join(", "));
        if ret_fixed {
            format!("{call}.v")
        } else {
            call
        }
    }

    fn new_expr(&mut self, len: Option<&HirExpr>, ty: Option<&Type>) -> String {
        match (len, ty) {
            (Some(len), Some(Type::Ptr(inner))) => {
                let item = match &**inner {
                    Type::Array { item, .. } => (**item).clone(),
                    other => other.clone(),
                };
                let len = self.expr(len);
                format!("tn_alloc({len}, sizeof({}))", self.c_type(&item))
            }
            (None, Some(Type::Ptr(inner))) => {
                let text = self.c_type(inner);
                format!("(({text} *)calloc(1, sizeof({text})))")
            }
            _ => "NULL".to_string(),
        }
    }

    // ---------------------------------------------------------------
    // Print
    // ---------------------------------------------------------------

    fn print_stmt(&mut self, args: &[HirExpr]) {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.line("fputc(' ', stdout);");
            }
            let ty = arg.ty.clone().unwrap_or(Type::INT);
            let text = self.expr(arg);
            self.print_value(&text, &ty, false);
        }
        self.line("fputc('\\n', stdout);");
    }

    /// Emit statements printing `value` of type `ty`. Strings are
    /// quoted when nested inside an aggregate rendering.
    fn print_value(&mut self, value: &str, ty: &Type, nested: bool) {
        match ty {
            Type::Int(kind) => {
                let spec = if kind.is_signed() { "PRId" } else { "PRIu" };
                self.line(&format!(
                    "printf(\"%\" {spec}{}, {value});",
                    kind.bits()
                ));
            }
            Type::Enum(_) => self.line(&format!("printf(\"%\" PRId64, {value});")),
            Type::Bool => self.line(&format!(
                "fputs(({value}) ? \"true\" : \"false\", stdout);"
            )),
            Type::Str => {
                if nested {
                    self.line("fputc('\"', stdout);");
                    self.line(&format!("tn_print_string({value});"));
                    self.line("fputc('\"', stdout);");
                } else {
                    self.line(&format!("tn_print_string({value});"));
                }
            }
            Type::CStr => {
                if nested {
                    self.line("fputc('\"', stdout);");
                    self.line(&format!("fputs({value}, stdout);"));
                    self.line("fputc('\"', stdout);");
                } else {
                    self.line(&format!("fputs({value}, stdout);"));
                }
            }
            Type::Struct(d) => {
                self.line(&format!("tn_print_{}({value});", self.cname(*d)));
            }
            Type::Ptr(pointee) => match &**pointee {
                Type::Array { len: None, item } => {
                    let item = (**item).clone();
                    let item_ptr = self.c_decl(&item, "*");
                    let idx = self.fresh("i");
                    self.line("fputc('[', stdout);");
                    self.line(&format!(
                        "for (int64_t {idx} = 0; {idx} < ({value}).len; {idx}++) {{"
                    ));
                    self.indent += 1;
                    self.line(&format!("if ({idx}) fputs(\", \", stdout);"));
                    self.print_value(
                        &format!("(({item_ptr})({value}).items)[{idx}]"),
                        &item,
                        true,
                    );
                    self.indent -= 1;
                    self.line("}");
                    self.line("fputc(']', stdout);");
                }
                Type::Array {
                    len: Some(n),
                    item,
                } => {
                    let item = (**item).clone();
                    let idx = self.fresh("i");
                    self.line("fputc('[', stdout);");
                    self.line(&format!(
                        "for (int64_t {idx} = 0; {idx} < {n}; {idx}++) {{"
                    ));
                    self.indent += 1;
                    self.line(&format!("if ({idx}) fputs(\", \", stdout);"));
                    self.print_value(&format!("({value})[{idx}]"), &item, true);
                    self.indent -= 1;
                    self.line("}");
                    self.line("fputc(']', stdout);");
                }
                other => {
                    let other = other.clone();
                    self.line(&format!("if ({value}) {{"));
                    self.indent += 1;
                    self.print_value(&format!("(*({value}))"), &other, true);
                    self.indent -= 1;
                    self.line("} else {");
                    self.line("    fputs(\"null\", stdout);");
                    self.line("}");
                }
            },
            Type::Array { len, item } => {
                let n = len.unwrap_or(0);
                let item = (**item).clone();
                let idx = self.fresh("i");
                self.line("fputc('[', stdout);");
                self.line(&format!(
                    "for (int64_t {idx} = 0; {idx} < {n}; {idx}++) {{"
                ));
                self.indent += 1;
                self.line(&format!("if ({idx}) fputs(\", \", stdout);"));
                self.print_value(&format!("({value})[{idx}]"), &item, true);
                self.indent -= 1;
                self.line("}");
                self.line("fputc(']', stdout);");
            }
            Type::Union(_) | Type::Fn { .. } => {
                self.line("/* tern codegen */");
            }
        }
    }

    /// Structs rendered by `print` get a helper each, so pointer
    /// cycles can recurse at runtime.
    fn print_helpers(&mut self) {
        let mut needed = Vec::new();
        let mut seen = HashSet::new();
        let mut body_stmts: Vec<&HirStmt> = self.hir.body.iter().collect();
        for f in &self.hir.funcs {
            body_stmts.extend(f.body.iter());
        }
        let mut queue: Vec<&HirStmt> = body_stmts;
        while let Some(stmt) = queue.pop() {
            match &stmt.kind {
                HirStmtKind::Print(args) => {
                    for arg in args {
                        if let Some(ty) = &arg.ty {
                            collect_print_structs(self.ctx, ty, &mut needed, &mut seen);
                        }
                    }
                }
                HirStmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    queue.extend(then_body.iter());
                    if let Some(else_body) = else_body {
                        queue.extend(else_body.iter());
                    }
                }
                HirStmtKind::While { body, .. }
                | HirStmtKind::ForRange { body, .. }
                | HirStmtKind::ForEach { body, .. } => queue.extend(body.iter()),
                _ => {}
            }
        }
        if needed.is_empty() {
            return;
        }
        for &d in &needed {
            let name = self.cname(d).to_string();
            self.line(&format!("static void tn_print_{name}({name} v);"));
        }
        self.blank();
        for &d in &needed {
            let name = self.cname(d).to_string();
            let members = match &self.ctx.decl(d).kind {
                DeclKind::Record { members, .. } => members.clone(),
                _ => continue,
            };
            self.line(&format!("static void tn_print_{name}({name} v) {{"));
            self.indent += 1;
            self.line("fputs(\"{ \", stdout);");
            for (i, m) in members.iter().enumerate() {
                if i > 0 {
                    self.line("fputs(\", \", stdout);");
                }
                let field = self.field_name(*m).to_string();
                let ty = self.ctx.decl(*m).ty.clone();
                self.line(&format!("fputs(\"{field}: \", stdout);"));
                self.print_value(&format!("v.{field}"), &ty, true);
            }
            self.line("fputs(\" }\", stdout);");
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
    }
}

/// Struct types a rendering of `ty` can reach.
fn collect_print_structs(ctx: &Ctx, ty: &Type, out: &mut Vec<DeclId>, seen: &mut HashSet<DeclId>) {
    match ty {
        Type::Struct(d) => {
            if seen.insert(*d) {
                out.push(*d);
                if let DeclKind::Record { members, .. } = &ctx.decl(*d).kind {
                    for &m in members {
                        collect_print_structs(ctx, &ctx.decl(m).ty.clone(), out, seen);
                    }
                }
            }
        }
        Type::Ptr(inner) => collect_print_structs(ctx, inner, out, seen),
        Type::Array { item, .. } => collect_print_structs(ctx, item, out, seen),
        _ => {}
    }
}

/// Record types `ty` embeds by value; these must be defined first.
fn value_records(ty: &Type) -> Vec<DeclId> {
    match ty {
        Type::Struct(d) | Type::Union(d) => vec![*d],
        Type::Array { item, .. } => value_records(item),
        _ => Vec::new(),
    }
}

fn c_binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Div => "/",
        other => other.symbol(),
    }
}

fn escape_c(s: &str) -> String {
    let mut out = String::new();
    for &b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            other => {
                let _ = write!(out, "\\{other:03o}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::sema::analyze;
    use std::collections::HashMap;

    fn compile(source: &str) -> CUnit {
        let mut ctx = Ctx::new();
        let unit = ctx.add_unit("main".into(), source.to_string(), true);
        let lexed = lex(source, &mut ctx.interner).expect("lex");
        let module = parse(&lexed.tokens, source, &mut ctx.interner).expect("parse");
        let hir = analyze(&module, unit, &mut ctx, &HashMap::new()).expect("analyze");
        crate::deps::resolve(&mut ctx, std::slice::from_ref(&hir)).expect("deps");
        generate(&ctx, &hir)
    }

    #[test]
    fn int_literals_carry_a_width_suffix() {
        let unit = compile("var x: int = 3; var u: uint = 5000000000;");
        // Full-width suffixes; plain L/UL may be 32 bits.
        assert!(unit.body.contains("= 3LL;"));
        assert!(unit.body.contains("= 5000000000ULL;"));
    }

    #[test]
    fn entry_function_runs_once() {
        let unit = compile("print 1;");
        assert!(unit.body.contains("void tn_init_main(void)"));
        assert!(unit.body.contains("static bool tn_done"));
    }

    #[test]
    fn main_unit_gets_an_entry_file() {
        let unit = compile("print 1;");
        let entry = unit.entry.expect("entry file");
        assert!(entry.contains("int main(int argc, char **argv)"));
        assert!(entry.contains("tn_init_main();"));
    }

    #[test]
    fn exported_functions_land_in_the_header() {
        let unit = compile("export function f(a: int): int { return a; }");
        assert!(unit.header.contains("int64_t main_f(int64_t"));
        assert!(unit.body.contains("int64_t main_f(int64_t"));
        assert!(!unit.header.contains("static"));
    }

    #[test]
    fn local_functions_are_static() {
        let unit = compile("function f(): int { return 1; }");
        assert!(unit.body.contains("static int64_t f_"));
        assert!(!unit.header.contains("f_"));
    }

    #[test]
    fn exported_structs_land_in_the_header() {
        let unit = compile("export struct Point { x: int; y: int; }");
        assert!(unit.header.contains("struct main_Point {"));
        assert!(unit.header.contains("int64_t x;"));
    }

    #[test]
    fn captured_locals_become_pointer_parameters() {
        let source = "function outer(): int { \
                          var x: int = 1; \
                          function inner(): int { return x; } \
                          return inner(); \
                      }";
        let unit = compile(source);
        assert!(unit.body.contains("*c_x_"));
        assert!(unit.body.contains("(*c_x_"));
        assert!(unit.body.contains("(&x_"));
    }

    #[test]
    fn string_literals_lower_to_length_and_bytes() {
        let unit = compile("var s: string = \"hi\";");
        assert!(unit.body.contains("(tn_string){ 2, (uint8_t *)\"hi\" }"));
    }

    #[test]
    fn print_emits_width_aware_format_specifiers() {
        let unit = compile("var x: int32 = 1; print x;");
        assert!(unit.body.contains("PRId32"));
        assert!(unit.body.contains("fputc('\\n', stdout);"));
    }

    #[test]
    fn printed_structs_get_a_helper() {
        let source = "struct P { x: int; s: string; } var p: P; print p;";
        let unit = compile(source);
        assert!(unit.body.contains("static void tn_print_P_"));
        assert!(unit.body.contains("fputs(\"x: \", stdout);"));
    }

    #[test]
    fn fixed_array_returns_use_a_wrapper_record() {
        let source = "function f(): [2]int { return [1, 2]; } var a: [2]int = f();";
        let unit = compile(source);
        assert!(unit.body.contains("_ret;"));
        assert!(unit.body.contains(".v"));
    }

    #[test]
    fn dynamic_allocation_uses_the_alloc_helper() {
        let source = "var n: int = 3; var a: ptr []int = new [n]int;";
        let unit = compile(source);
        assert!(unit.body.contains("tn_alloc("));
        assert!(unit.body.contains("sizeof(int64_t)"));
    }

    #[test]
    fn globals_are_initialized_inside_the_entry() {
        let unit = compile("var x: int = 41;");
        assert!(unit.body.contains("static int64_t x_"));
        assert!(unit.body.contains("x_1 = 41LL;") || unit.body.contains("= 41LL;"));
    }
}
