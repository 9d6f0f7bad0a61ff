//! Core of the Tern compiler: lexing, parsing, semantic analysis,
//! dependency resolution and C code generation.

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod deps;
pub mod diagnostic;
pub mod error;
pub mod hir;
pub mod intern;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod sema;
pub mod span;
pub mod types;

pub use codegen::CUnit;
pub use compiler::{compile, compile_lib, Compilation, FsLoader, SourceLoader};
pub use diagnostic::Diagnostic;
pub use error::CoreError;
