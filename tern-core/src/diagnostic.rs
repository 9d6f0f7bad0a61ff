//! Diagnostics with source-line excerpts.
//!
//! A `Diagnostic` captures everything needed to print the standard
//! `error: <message>` report followed by the offending source line and
//! a caret under the offending column. The excerpt is captured at
//! construction time so the diagnostic stays printable after the
//! source text has gone out of scope.

use std::fmt;

use crate::span::Pos;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub pos: Pos,
    /// The full source line containing `pos`, without its newline.
    pub line_text: String,
}

impl Diagnostic {
    /// Build a diagnostic, excerpting the offending line from `source`.
    pub fn new(message: impl Into<String>, pos: Pos, source: &str) -> Diagnostic {
        let start = pos.line_start as usize;
        let line_text = source
            .get(start..)
            .map(|rest| rest.lines().next().unwrap_or("").to_string())
            .unwrap_or_default();
        Diagnostic {
            message: message.into(),
            pos,
            line_text,
        }
    }

    /// Diagnostic without source context, for errors that precede
    /// lexing (e.g. unreadable files).
    pub fn bare(message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            message: message.into(),
            pos: Pos::default(),
            line_text: String::new(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}", self.message)?;
        if !self.line_text.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {} | {}", self.pos.line, self.line_text)?;
            // Caret under the offending column, past the gutter.
            let gutter = self.pos.line.to_string().len() + 5;
            let pad = gutter + self.pos.column() as usize;
            write!(f, "{}^", " ".repeat(pad))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpts_the_offending_line() {
        let source = "var x: int = 1;\nvar y int = 2;\n";
        let pos = Pos::new(2, 16, 22, 3);
        let diag = Diagnostic::new("expected ':'", pos, source);
        assert_eq!(diag.line_text, "var y int = 2;");
        let rendered = diag.to_string();
        assert!(rendered.starts_with("error: expected ':'"));
        assert!(rendered.contains("var y int = 2;"));
        assert!(rendered.ends_with('^'));
    }

    #[test]
    fn bare_diagnostics_render_without_excerpt() {
        let diag = Diagnostic::bare("unit not found");
        assert_eq!(diag.to_string(), "error: unit not found");
    }
}
