//! Source positions for tokens, AST nodes and diagnostics.

/// Position of a token or node inside one unit's source text.
///
/// `line_start` and `offset` are byte offsets into the original
/// source string, so that diagnostics can excerpt the offending line
/// without re-scanning the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    /// 1-based line number.
    pub line: u32,
    /// Byte offset of the first byte of `line`.
    pub line_start: u32,
    /// Byte offset of the token itself.
    pub offset: u32,
    /// Byte length of the token.
    pub len: u32,
}

impl Pos {
    pub fn new(line: u32, line_start: u32, offset: u32, len: u32) -> Pos {
        Pos {
            line,
            line_start,
            offset,
            len,
        }
    }

    /// 0-based column of the token within its line.
    pub fn column(&self) -> u32 {
        self.offset.saturating_sub(self.line_start)
    }

    /// Synthetic position for builtin declarations. Sorts before any
    /// real source position, so builtins always pass ordering checks.
    pub fn builtin() -> Pos {
        Pos::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_is_relative_to_line_start() {
        let pos = Pos::new(3, 40, 47, 2);
        assert_eq!(pos.column(), 7);
    }

    #[test]
    fn builtin_position_precedes_everything() {
        let builtin = Pos::builtin();
        let real = Pos::new(1, 0, 5, 1);
        assert!(builtin.offset < real.offset);
    }
}
