use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// Errors produced by the compiler core.
///
/// Lexical, syntactic and semantic errors all carry a `Diagnostic`
/// with the source-line excerpt; the remaining variants are raised by
/// the unit loader and import resolution.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("{0}")]
    Lex(Diagnostic),
    #[error("{0}")]
    Syntax(Diagnostic),
    #[error("{0}")]
    Semantic(Diagnostic),
    #[error("unit not found: {0}")]
    MissingUnit(PathBuf),
    #[error("import cycle through {0}")]
    ImportCycle(PathBuf),
}
