//! Declarations, scopes and the shared compilation context.
//!
//! All declarations and scopes of every unit live in `Ctx` arenas and
//! are addressed by small ids. The scope tree is strictly nested: one
//! root per unit, children pushed on entering blocks, function bodies
//! and struct bodies. Cross-unit imports create binding declarations
//! that reference the original declaration through `origin` instead of
//! copying it field by field.

use crate::intern::{Interner, Symbol};
use crate::span::Pos;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u32);

/// One enum item: name plus its resolved constant value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub name: Symbol,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Var {
        is_param: bool,
    },
    /// A struct or union member.
    Field,
    Func {
        params: Vec<DeclId>,
        /// Outer-scope variables the function body reads. Drives
        /// closure lowering and the use-site ordering check.
        deps: Vec<DeclId>,
    },
    Record {
        members: Vec<DeclId>,
        is_union: bool,
    },
    Enum {
        items: Vec<EnumItem>,
    },
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: Symbol,
    pub kind: DeclKind,
    pub pos: Pos,
    pub scope: ScopeId,
    pub unit: UnitId,
    pub ty: Type,
    /// Compiler-private mangled name, unique per declaration.
    pub local_name: String,
    /// Externally-visible mangled name (unit-qualified).
    pub public_name: String,
    pub imported: bool,
    pub exported: bool,
    pub builtin: bool,
    /// Prototype only, no body (foreign functions).
    pub prototype: bool,
    pub foreign: bool,
    /// Dependency list finalized.
    pub deps_scanned: bool,
    /// For import bindings: the declaration this binding refers to.
    pub origin: Option<DeclId>,
}

impl Decl {
    pub fn is_var(&self) -> bool {
        matches!(self.kind, DeclKind::Var { .. })
    }

    pub fn is_func(&self) -> bool {
        matches!(self.kind, DeclKind::Func { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// Nearest enclosing function (inherited from the parent unless
    /// this scope begins a new function body).
    pub funchost: Option<DeclId>,
    /// The struct/union whose body this scope is. Not inherited.
    pub structhost: Option<DeclId>,
    /// Whether a loop body encloses this scope (inherited).
    pub in_loop: bool,
    pub unit: UnitId,
    /// Declarations in insertion order; flat lookup returns at most
    /// one match per name.
    pub decls: Vec<DeclId>,
}

#[derive(Debug)]
pub struct UnitMeta {
    /// Identifier derived from the unit's path (sanitized stem).
    pub name: String,
    pub source: String,
    pub root_scope: ScopeId,
    pub is_main: bool,
}

/// Shared compilation context: the interner plus the declaration,
/// scope and unit arenas. Single-writer during analysis of one unit,
/// read-only during code generation.
#[derive(Debug, Default)]
pub struct Ctx {
    pub interner: Interner,
    decls: Vec<Decl>,
    scopes: Vec<Scope>,
    units: Vec<UnitMeta>,
}

impl Ctx {
    pub fn new() -> Ctx {
        Ctx::default()
    }

    pub fn add_unit(&mut self, name: String, source: String, is_main: bool) -> UnitId {
        let unit = UnitId(self.units.len() as u32);
        let root_scope = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: None,
            funchost: None,
            structhost: None,
            in_loop: false,
            unit,
            decls: Vec::new(),
        });
        self.units.push(UnitMeta {
            name,
            source,
            root_scope,
            is_main,
        });
        unit
    }

    pub fn unit(&self, id: UnitId) -> &UnitMeta {
        &self.units[id.0 as usize]
    }

    pub fn units_len(&self) -> usize {
        self.units.len()
    }

    /// Push a child scope, inheriting funchost and loop context.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let template = &self.scopes[parent.0 as usize];
        let scope = Scope {
            parent: Some(parent),
            funchost: template.funchost,
            structhost: None,
            in_loop: template.in_loop,
            unit: template.unit,
            decls: Vec::new(),
        };
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0 as usize]
    }

    /// Create a declaration and install it into `scope`. The caller
    /// is responsible for the flat-uniqueness check.
    pub fn add_decl(&mut self, mut decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        let text = self.interner.resolve(decl.name).to_string();
        if decl.foreign {
            // Foreign symbols link under their source-level name.
            decl.local_name = text.clone();
            decl.public_name = text;
        } else {
            decl.local_name = format!("{}_{}", text, id.0);
            decl.public_name = format!("{}_{}", self.unit(decl.unit).name, text);
        }
        let scope = decl.scope;
        self.decls.push(decl);
        self.scopes[scope.0 as usize].decls.push(id);
        id
    }

    /// Flat lookup in one scope only.
    pub fn lookup_flat(&self, scope: ScopeId, name: Symbol) -> Option<DeclId> {
        self.scope(scope)
            .decls
            .iter()
            .copied()
            .find(|&d| self.decl(d).name == name)
    }

    /// Lookup walking outward through enclosing scopes.
    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<DeclId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(d) = self.lookup_flat(s, name) {
                return Some(d);
            }
            current = self.scope(s).parent;
        }
        None
    }

    /// True if `ancestor` is a strict ancestor of `scope`.
    pub fn is_strict_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut current = self.scope(scope).parent;
        while let Some(s) = current {
            if s == ancestor {
                return true;
            }
            current = self.scope(s).parent;
        }
        false
    }

    /// Follow an import binding back to the declaration it refers to.
    pub fn resolve_origin(&self, id: DeclId) -> DeclId {
        let mut current = id;
        while let Some(origin) = self.decl(current).origin {
            current = origin;
        }
        current
    }

    /// Clone a declaration from another scope into `scope` as an
    /// import binding: semantic data by reference, flags overridden.
    pub fn bind_import(&mut self, original: DeclId, scope: ScopeId) -> DeclId {
        let unit = self.scope(scope).unit;
        let source = self.decl(original).clone();
        self.add_decl(Decl {
            name: source.name,
            kind: source.kind,
            pos: Pos::builtin(),
            scope,
            unit,
            ty: source.ty,
            local_name: String::new(),
            public_name: String::new(),
            imported: true,
            exported: false,
            builtin: source.builtin,
            prototype: true,
            foreign: source.foreign,
            deps_scanned: true,
            origin: Some(original),
        })
    }

    /// Human-readable type name for diagnostics.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Int(kind) => kind.name().to_string(),
            Type::Bool => "bool".to_string(),
            Type::Str => "string".to_string(),
            Type::CStr => "cstring".to_string(),
            Type::Ptr(inner) => format!("ptr {}", self.type_name(inner)),
            Type::Array { item, len } => match len {
                Some(n) => format!("[{}]{}", n, self.type_name(item)),
                None => format!("[]{}", self.type_name(item)),
            },
            Type::Fn { params, ret } => {
                let params: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                match ret {
                    Some(ret) => format!("function({}): {}", params.join(", "), self.type_name(ret)),
                    None => format!("function({})", params.join(", ")),
                }
            }
            Type::Struct(d) | Type::Union(d) | Type::Enum(d) => {
                self.interner.resolve(self.decl(*d).name).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntKind;

    fn var_decl(ctx: &Ctx, name: Symbol, scope: ScopeId, unit: UnitId, offset: u32) -> Decl {
        let _ = ctx;
        Decl {
            name,
            kind: DeclKind::Var { is_param: false },
            pos: Pos::new(1, 0, offset, 1),
            scope,
            unit,
            ty: Type::Int(IntKind::I64),
            local_name: String::new(),
            public_name: String::new(),
            imported: false,
            exported: false,
            builtin: false,
            prototype: false,
            foreign: false,
            deps_scanned: false,
            origin: None,
        }
    }

    #[test]
    fn lookup_walks_outward_and_shadows() {
        let mut ctx = Ctx::new();
        let unit = ctx.add_unit("main".into(), String::new(), true);
        let root = ctx.unit(unit).root_scope;
        let inner = ctx.push_scope(root);

        let name = ctx.interner.intern("x");
        let outer_decl = var_decl(&ctx, name, root, unit, 0);
        let outer_id = ctx.add_decl(outer_decl);
        let inner_decl = var_decl(&ctx, name, inner, unit, 10);
        let inner_id = ctx.add_decl(inner_decl);

        assert_eq!(ctx.lookup(inner, name), Some(inner_id));
        assert_eq!(ctx.lookup(root, name), Some(outer_id));
    }

    #[test]
    fn strict_ancestry() {
        let mut ctx = Ctx::new();
        let unit = ctx.add_unit("main".into(), String::new(), true);
        let root = ctx.unit(unit).root_scope;
        let child = ctx.push_scope(root);
        let grandchild = ctx.push_scope(child);

        assert!(ctx.is_strict_ancestor(root, grandchild));
        assert!(ctx.is_strict_ancestor(child, grandchild));
        assert!(!ctx.is_strict_ancestor(grandchild, root));
        assert!(!ctx.is_strict_ancestor(root, root));
    }

    #[test]
    fn import_bindings_reference_their_origin() {
        let mut ctx = Ctx::new();
        let lib = ctx.add_unit("lib".into(), String::new(), false);
        let lib_root = ctx.unit(lib).root_scope;
        let main = ctx.add_unit("main".into(), String::new(), true);
        let main_root = ctx.unit(main).root_scope;

        let name = ctx.interner.intern("helper");
        let mut original = var_decl(&ctx, name, lib_root, lib, 0);
        original.exported = true;
        let original_id = ctx.add_decl(original);

        let binding = ctx.bind_import(original_id, main_root);
        let bound = ctx.decl(binding);
        assert!(bound.imported);
        assert!(!bound.exported);
        assert_eq!(ctx.resolve_origin(binding), original_id);
    }
}
