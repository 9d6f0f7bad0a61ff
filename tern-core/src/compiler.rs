//! Compilation driver.
//!
//! Walks the import graph depth-first from the main unit, running the
//! full pipeline (lex, parse, analyze) on each unit exactly once, then
//! closes function dependencies across all units and generates the C
//! texts. Sources come through the `SourceLoader` seam so the driver
//! stays independent of the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::StmtKind;
use crate::codegen::{self, CUnit};
use crate::deps;
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::hir::HirUnit;
use crate::lexer;
use crate::parser;
use crate::scope::{Ctx, UnitId};
use crate::sema;

/// Resolves a unit path, as written in an import statement, to its
/// source text.
pub trait SourceLoader {
    fn load(&self, path: &str) -> Result<String, CoreError>;
}

/// Loads `<root>/<path>.tn`.
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> FsLoader {
        FsLoader { root: root.into() }
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, path: &str) -> Result<String, CoreError> {
        let file = self.root.join(format!("{path}.tn"));
        if !file.is_file() {
            return Err(CoreError::MissingUnit(file));
        }
        Ok(std::fs::read_to_string(&file)?)
    }
}

/// Result of a successful compilation: the generated C texts plus any
/// recoverable diagnostics collected along the way.
#[derive(Debug)]
pub struct Compilation {
    /// Generated units in dependency-first order.
    pub units: Vec<CUnit>,
    /// Unrecognized bytes that were skipped during lexing; compilation
    /// continued past them.
    pub warnings: Vec<Diagnostic>,
}

/// Compile the unit at `main` and everything it imports.
pub fn compile(loader: &dyn SourceLoader, main: &str) -> Result<Compilation, CoreError> {
    compile_units(loader, main, true)
}

/// Compile `root` as a library: same pipeline, but no unit is the main
/// unit, so no entry file is produced.
pub fn compile_lib(loader: &dyn SourceLoader, root: &str) -> Result<Compilation, CoreError> {
    compile_units(loader, root, false)
}

fn compile_units(
    loader: &dyn SourceLoader,
    root: &str,
    is_main: bool,
) -> Result<Compilation, CoreError> {
    let mut driver = Driver {
        ctx: Ctx::new(),
        loader,
        units: HashMap::new(),
        stack: Vec::new(),
        hirs: Vec::new(),
        warnings: Vec::new(),
    };
    driver.compile_unit(root, is_main)?;
    deps::resolve(&mut driver.ctx, &driver.hirs)?;
    let units = driver
        .hirs
        .iter()
        .map(|hir| codegen::generate(&driver.ctx, hir))
        .collect();
    Ok(Compilation {
        units,
        warnings: driver.warnings,
    })
}

struct Driver<'a> {
    ctx: Ctx,
    loader: &'a dyn SourceLoader,
    /// Units already compiled, by import path.
    units: HashMap<String, UnitId>,
    /// Units currently being compiled, for cycle detection.
    stack: Vec<String>,
    hirs: Vec<HirUnit>,
    warnings: Vec<Diagnostic>,
}

impl Driver<'_> {
    fn compile_unit(&mut self, path: &str, is_main: bool) -> Result<UnitId, CoreError> {
        if let Some(&id) = self.units.get(path) {
            return Ok(id);
        }
        if self.stack.iter().any(|p| p == path) {
            return Err(CoreError::ImportCycle(PathBuf::from(path)));
        }
        self.stack.push(path.to_string());

        let source = self.loader.load(path)?;
        let lexed = lexer::lex(&source, &mut self.ctx.interner)?;
        // Unrecognized bytes were already skipped; keep compiling.
        self.warnings.extend(lexed.diagnostics);
        let module = parser::parse(&lexed.tokens, &source, &mut self.ctx.interner)?;

        // Imports are compiled before their importer so their exports
        // are available during analysis.
        let mut imports = HashMap::new();
        for stmt in &module.stmts {
            if let StmtKind::Import { path: target, .. } = &stmt.kind {
                let id = self.compile_unit(target, false)?;
                imports.insert(target.clone(), id);
            }
        }

        let unit = self.ctx.add_unit(unit_name(path), source, is_main);
        let hir = sema::analyze(&module, unit, &mut self.ctx, &imports)?;
        self.hirs.push(hir);
        self.stack.pop();
        self.units.insert(path.to_string(), unit);
        Ok(unit)
    }
}

/// Derive a C-identifier-safe unit name from an import path.
pub fn unit_name(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'u');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    struct MapLoader(HashMap<String, String>);

    impl MapLoader {
        fn new(units: &[(&str, &str)]) -> MapLoader {
            MapLoader(
                units
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    impl SourceLoader for MapLoader {
        fn load(&self, path: &str) -> Result<String, CoreError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| CoreError::MissingUnit(PathBuf::from(path)))
        }
    }

    #[test]
    fn compiles_across_units() {
        let loader = MapLoader::new(&[
            (
                "lib",
                "export function add(a: int, b: int): int { return a + b; }",
            ),
            ("main", "import add from \"lib\"; print add(1, 2);"),
        ]);
        let units = compile(&loader, "main").expect("compile").units;
        assert_eq!(units.len(), 2);
        let lib = &units[0];
        let main = &units[1];
        assert_eq!(lib.name, "lib");
        assert!(lib.header.contains("int64_t lib_add(int64_t"));
        assert!(lib.entry.is_none());
        assert!(main.body.contains("lib_add(1LL, 2LL)"));
        assert!(main.body.contains("#include \"lib.h\""));
        assert!(main.body.contains("tn_init_lib();"));
        assert!(main.entry.is_some());
    }

    #[test]
    fn bare_imports_bind_every_export() {
        let loader = MapLoader::new(&[
            (
                "lib",
                "export var shared: int = 7; export function get(): int { return shared; }",
            ),
            ("main", "import \"lib\"; print get(), shared;"),
        ]);
        let units = compile(&loader, "main").expect("compile").units;
        assert!(units[1].body.contains("lib_get()"));
        assert!(units[1].body.contains("lib_shared"));
    }

    #[test]
    fn constant_folding_survives_to_the_output() {
        let loader = MapLoader::new(&[("main", "var x: int = 1 + 2; print x;")]);
        let units = compile(&loader, "main").expect("compile").units;
        assert!(units[0].body.contains("= 3LL;"));
    }

    #[test]
    fn unrecognized_bytes_warn_without_aborting() {
        let loader = MapLoader::new(&[("main", "var x: int = 1; ?\nprint x;")]);
        let out = compile(&loader, "main").expect("compile");
        assert_eq!(out.units.len(), 1);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].message.contains("unrecognized"));
    }

    #[test]
    fn imported_types_pull_in_their_header() {
        let loader = MapLoader::new(&[
            ("shapes", "export struct Point { x: int; y: int; }"),
            (
                "main",
                "import Point from \"shapes\"; \
                 export function origin(): Point { var p: Point; return p; }",
            ),
        ]);
        let units = compile(&loader, "main").expect("compile").units;
        let main = &units[1];
        assert!(main.header.contains("#include \"shapes.h\""));
        assert!(main.header.contains("shapes_Point"));
    }

    #[test]
    fn missing_units_are_reported() {
        let loader = MapLoader::new(&[("main", "import \"nowhere\";")]);
        let err = compile(&loader, "main").unwrap_err();
        assert!(matches!(err, CoreError::MissingUnit(_)));
    }

    #[test]
    fn import_cycles_are_reported() {
        let loader = MapLoader::new(&[
            ("a", "import \"b\";"),
            ("b", "import \"a\";"),
            ("main", "import \"a\";"),
        ]);
        let err = compile(&loader, "main").unwrap_err();
        assert!(matches!(err, CoreError::ImportCycle(_)));
    }

    #[test]
    fn unexported_symbols_cannot_be_imported() {
        let loader = MapLoader::new(&[
            ("lib", "function hidden() { }"),
            ("main", "import hidden from \"lib\";"),
        ]);
        let err = compile(&loader, "main").unwrap_err();
        let CoreError::Semantic(d) = err else {
            panic!("expected semantic error");
        };
        assert!(d.message.contains("no exported symbol"));
    }

    #[test]
    fn repeated_imports_of_a_unit_are_rejected() {
        let loader = MapLoader::new(&[
            ("lib", "export var x: int = 1;"),
            ("main", "import \"lib\"; import \"lib\";"),
        ]);
        let err = compile(&loader, "main").unwrap_err();
        let CoreError::Semantic(d) = err else {
            panic!("expected semantic error");
        };
        assert!(d.message.contains("already imported"));
    }

    #[test]
    fn diamond_imports_compile_once() {
        let loader = MapLoader::new(&[
            ("d", "export var base: int = 1;"),
            ("b", "import \"d\"; export function fb(): int { return base; }"),
            ("c", "import \"d\"; export function fc(): int { return base; }"),
            ("main", "import \"b\"; import \"c\"; print fb() + fc();"),
        ]);
        let units = compile(&loader, "main").expect("compile").units;
        assert_eq!(units.len(), 4);
        assert_eq!(units.iter().filter(|u| u.name == "d").count(), 1);
    }

    #[test]
    fn filesystem_loader_reads_tn_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut file = std::fs::File::create(dir.path().join("hello.tn")).expect("create");
        writeln!(file, "print \"hello\";").expect("write");
        let loader = FsLoader::new(dir.path());
        let units = compile(&loader, "hello").expect("compile").units;
        assert_eq!(units[0].name, "hello");
        assert!(units[0].entry.is_some());
    }

    #[test]
    fn library_builds_have_no_entry_file() {
        let loader = MapLoader::new(&[("lib", "export var x: int = 1;")]);
        let units = compile_lib(&loader, "lib").expect("compile").units;
        assert!(units[0].entry.is_none());
        assert!(units[0].header.contains("void tn_init_lib(void);"));
    }

    #[test]
    fn unit_names_are_identifier_safe() {
        assert_eq!(unit_name("lib/math-utils"), "math_utils");
        assert_eq!(unit_name("3d"), "u3d");
    }
}
