//! Lexer for Tern source text.
//!
//! The lexer is intentionally simple: it recognizes keywords, interned
//! identifiers, integer and string literals and punctuators, and
//! attaches no semantic meaning beyond that. Unrecognized bytes are
//! the only recoverable error in the whole pipeline: they are reported
//! as diagnostics and skipped. Unterminated strings and block comments
//! are fatal.

use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::intern::{Interner, Symbol};
use crate::span::Pos;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    /// Identifier, canonicalized through the interner.
    Ident(Symbol),
    /// Integer literal, accumulated with 64-bit wraparound.
    Int(i64),
    /// String literal body, taken verbatim (no escape processing).
    Str(String),
    Keyword(Keyword),
    Punct(Punct),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    As,
    Bool,
    Break,
    Continue,
    Cstring,
    Delete,
    Else,
    Enum,
    Export,
    False,
    For,
    Foreign,
    From,
    Function,
    If,
    Import,
    In,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    New,
    Print,
    Ptr,
    String,
    Struct,
    Return,
    True,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Union,
    Var,
    While,
}

impl Keyword {
    fn from_text(text: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match text {
            "as" => As,
            "bool" => Bool,
            "break" => Break,
            "continue" => Continue,
            "cstring" => Cstring,
            "delete" => Delete,
            "else" => Else,
            "enum" => Enum,
            "export" => Export,
            "false" => False,
            "for" => For,
            "foreign" => Foreign,
            "from" => From,
            "function" => Function,
            "if" => If,
            "import" => Import,
            "in" => In,
            "int" => Int,
            "int8" => Int8,
            "int16" => Int16,
            "int32" => Int32,
            "int64" => Int64,
            "new" => New,
            "print" => Print,
            "ptr" => Ptr,
            "string" => String,
            "struct" => Struct,
            "return" => Return,
            "true" => True,
            "uint" => Uint,
            "uint8" => Uint8,
            "uint16" => Uint16,
            "uint32" => Uint32,
            "uint64" => Uint64,
            "union" => Union,
            "var" => Var,
            "while" => While,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    DotDot,     // ..
    AndAnd,     // &&
    OrOr,       // ||
    EqEq,       // ==
    NotEq,      // !=
    LtEq,       // <=
    GtEq,       // >=
    SlashSlash, // // (integer division)
    LBrace,     // {
    RBrace,     // }
    Lt,         // <
    Gt,         // >
    LBracket,   // [
    RBracket,   // ]
    LParen,     // (
    RParen,     // )
    Eq,         // =
    Dot,        // .
    Colon,      // :
    Semi,       // ;
    Comma,      // ,
    Plus,       // +
    Minus,      // -
    Star,       // *
    Percent,    // %
    Amp,        // &
    Pipe,       // |
    Caret,      // ^
    Tilde,      // ~
}

/// Punctuator table in longest-match order: all two-byte punctuators
/// precede every single-byte one.
const PUNCTS: &[(&str, Punct)] = &[
    ("..", Punct::DotDot),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("==", Punct::EqEq),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("//", Punct::SlashSlash),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("=", Punct::Eq),
    (".", Punct::Dot),
    (":", Punct::Colon),
    (";", Punct::Semi),
    (",", Punct::Comma),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("%", Punct::Percent),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
    ("~", Punct::Tilde),
];

/// A single token with its kind and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

/// Result of lexing one unit's source.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    /// Recoverable errors (unrecognized bytes), in source order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a source string into a token sequence terminated by exactly
/// one EOF token.
pub fn lex(source: &str, interner: &mut Interner) -> Result<LexResult, CoreError> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        len: source.len(),
        index: 0,
        line: 1,
        line_start: 0,
        interner,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src, 'i> {
    source: &'src str,
    bytes: &'src [u8],
    len: usize,
    index: usize,
    line: u32,
    line_start: usize,
    interner: &'i mut Interner,
    diagnostics: Vec<Diagnostic>,
}

impl<'src, 'i> Lexer<'src, 'i> {
    fn run(&mut self) -> Result<LexResult, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                self.bump();
                self.line += 1;
                self.line_start = self.index;
                continue;
            }
            if matches!(ch, b' ' | b'\t' | b'\r') {
                self.bump();
                continue;
            }
            if ch == b'#' {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'*') {
                self.skip_block_comment()?;
                continue;
            }

            let start = self.pos_here(0);
            if is_ident_start(ch) {
                tokens.push(self.lex_ident_or_keyword());
                continue;
            }
            if ch.is_ascii_digit() {
                tokens.push(self.lex_int());
                continue;
            }
            if ch == b'"' {
                tokens.push(self.lex_string()?);
                continue;
            }
            if let Some(token) = self.lex_punct() {
                tokens.push(token);
                continue;
            }

            // Unrecognized byte: report, skip, keep lexing.
            self.bump();
            self.diagnostics.push(Diagnostic::new(
                format!("unrecognized character '{}'", ch as char),
                Pos { len: 1, ..start },
                self.source,
            ));
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            pos: self.pos_here(0),
        });

        Ok(LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    fn skip_block_comment(&mut self) -> Result<(), CoreError> {
        let start = self.pos_here(2);
        self.bump(); // '/'
        self.bump(); // '*'
        while let Some(ch) = self.peek() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                self.bump();
                self.bump();
                return Ok(());
            }
            if ch == b'\n' {
                self.line += 1;
                self.bump();
                self.line_start = self.index;
            } else {
                self.bump();
            }
        }
        Err(CoreError::Lex(Diagnostic::new(
            "unterminated block comment",
            start,
            self.source,
        )))
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.index;
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.index];
        let pos = self.pos_from(start);
        let kind = match Keyword::from_text(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(self.interner.intern(text)),
        };
        Token { kind, pos }
    }

    fn lex_int(&mut self) -> Token {
        let start = self.index;
        let mut value: u64 = 0;
        if self.peek() == Some(b'0') && matches!(self.peek_next(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            while let Some(ch) = self.peek() {
                match ch {
                    b'0'..=b'9' => {
                        value = value.wrapping_mul(16).wrapping_add((ch - b'0') as u64);
                        self.bump();
                    }
                    b'a'..=b'f' => {
                        value = value.wrapping_mul(16).wrapping_add((ch - b'a' + 10) as u64);
                        self.bump();
                    }
                    b'A'..=b'F' => {
                        value = value.wrapping_mul(16).wrapping_add((ch - b'A' + 10) as u64);
                        self.bump();
                    }
                    b'_' => self.bump(),
                    _ => break,
                }
            }
        } else {
            while let Some(ch) = self.peek() {
                match ch {
                    b'0'..=b'9' => {
                        value = value.wrapping_mul(10).wrapping_add((ch - b'0') as u64);
                        self.bump();
                    }
                    b'_' => self.bump(),
                    _ => break,
                }
            }
        }
        Token {
            kind: TokenKind::Int(value as i64),
            pos: self.pos_from(start),
        }
    }

    fn lex_string(&mut self) -> Result<Token, CoreError> {
        let open = self.pos_here(1);
        let start = self.index;
        self.bump(); // opening quote
        let body_start = self.index;
        while let Some(ch) = self.peek() {
            if ch == b'"' {
                let body = self.source[body_start..self.index].to_string();
                self.bump(); // closing quote
                return Ok(Token {
                    kind: TokenKind::Str(body),
                    pos: self.pos_from(start),
                });
            }
            if ch == b'\n' {
                self.line += 1;
                self.bump();
                self.line_start = self.index;
            } else {
                self.bump();
            }
        }
        Err(CoreError::Lex(Diagnostic::new(
            "unterminated string literal",
            open,
            self.source,
        )))
    }

    fn lex_punct(&mut self) -> Option<Token> {
        // Byte-wise match: the cursor may sit inside a multi-byte
        // sequence after skipping an unrecognized byte.
        let rest = &self.bytes[self.index..];
        for (text, punct) in PUNCTS {
            if rest.starts_with(text.as_bytes()) {
                let start = self.index;
                self.index += text.len();
                return Some(Token {
                    kind: TokenKind::Punct(*punct),
                    pos: self.pos_from(start),
                });
            }
        }
        None
    }

    fn pos_here(&self, len: u32) -> Pos {
        Pos::new(self.line, self.line_start as u32, self.index as u32, len)
    }

    fn pos_from(&self, start: usize) -> Pos {
        Pos::new(
            self.line,
            self.line_start as u32,
            start as u32,
            (self.index - start) as u32,
        )
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn bump(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> LexResult {
        let mut interner = Interner::new();
        lex(source, &mut interner).expect("lex")
    }

    #[test]
    fn every_sequence_ends_in_exactly_one_eof() {
        for source in ["", "   ", "var x: int = 1;", "# just a comment\n", "~~~"] {
            let result = lex_ok(source);
            let eofs = result
                .tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Eof)
                .count();
            assert_eq!(eofs, 1, "source {source:?}");
            assert_eq!(result.tokens.last().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn identical_identifiers_share_one_symbol() {
        let mut interner = Interner::new();
        let result = lex("alpha beta alpha", &mut interner).expect("lex");
        let symbols: Vec<Symbol> = result
            .tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Ident(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols[0], symbols[2]);
        assert_ne!(symbols[0], symbols[1]);
    }

    #[test]
    fn keywords_are_reclassified() {
        let result = lex_ok("while whilex");
        assert_eq!(result.tokens[0].kind, TokenKind::Keyword(Keyword::While));
        assert!(matches!(result.tokens[1].kind, TokenKind::Ident(_)));
    }

    #[test]
    fn integer_literals_support_separators_and_hex() {
        let result = lex_ok("1_000 0xff 0x_10");
        let values: Vec<i64> = result
            .tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Int(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1000, 255, 16]);
    }

    #[test]
    fn integer_literals_wrap_at_64_bits() {
        // 2^64 accumulates to 0 under wraparound.
        let result = lex_ok("18446744073709551616");
        assert_eq!(result.tokens[0].kind, TokenKind::Int(0));
    }

    #[test]
    fn string_literals_are_verbatim() {
        let result = lex_ok(r#""a\nb""#);
        // No escape processing: the backslash and 'n' are two bytes.
        assert_eq!(result.tokens[0].kind, TokenKind::Str("a\\nb".to_string()));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let mut interner = Interner::new();
        let err = lex("\"abc", &mut interner).unwrap_err();
        assert!(matches!(err, CoreError::Lex(_)));
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        let mut interner = Interner::new();
        let err = lex("/* never closed", &mut interner).unwrap_err();
        assert!(matches!(err, CoreError::Lex(_)));
    }

    #[test]
    fn punctuators_use_longest_match() {
        let result = lex_ok(".. . <= < // ==");
        let puncts: Vec<Punct> = result
            .tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Punct(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            puncts,
            vec![
                Punct::DotDot,
                Punct::Dot,
                Punct::LtEq,
                Punct::Lt,
                Punct::SlashSlash,
                Punct::EqEq,
            ]
        );
    }

    #[test]
    fn unrecognized_bytes_are_skipped_with_a_diagnostic() {
        let result = lex_ok("var ? x");
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("unrecognized"));
        // Lexing continued past the bad byte.
        assert_eq!(result.tokens[0].kind, TokenKind::Keyword(Keyword::Var));
        assert!(matches!(result.tokens[1].kind, TokenKind::Ident(_)));
    }

    #[test]
    fn comments_and_lines_are_tracked() {
        let result = lex_ok("# comment\n/* block\ncomment */ x");
        let ident = &result.tokens[0];
        assert!(matches!(ident.kind, TokenKind::Ident(_)));
        assert_eq!(ident.pos.line, 3);
    }
}
