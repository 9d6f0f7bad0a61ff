//! Recursive-descent parser.
//!
//! Single-token lookahead over the lexer's token sequence, with the
//! cursor held in an explicit `Parser` value rather than ambient
//! state. Statement alternatives are decided by their first token
//! (LL(1) over statement keywords); expression parsing is precedence
//! climbing. The parser is purely syntactic: name resolution, type
//! checking and folding happen in the checker.

use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::intern::{Interner, Symbol};
use crate::lexer::{Keyword, Punct, Token, TokenKind};
use crate::span::Pos;

/// Parse a unit's token sequence into a surface module.
pub fn parse(
    tokens: &[Token],
    source: &str,
    interner: &mut Interner,
) -> Result<Module, CoreError> {
    let length_sym = interner.intern("length");
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        length_sym,
    };
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        stmts.push(parser.parse_stmt(true)?);
    }
    Ok(Module { stmts })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
    /// Pre-interned `length`, for the `.length` pseudo-member.
    length_sym: Symbol,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn err(&self, message: impl Into<String>) -> CoreError {
        CoreError::Syntax(Diagnostic::new(message, self.peek().pos, self.source))
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.peek().is_punct(punct) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek().is_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct, what: &str) -> Result<Pos, CoreError> {
        if self.peek().is_punct(punct) {
            Ok(self.bump().pos)
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(Symbol, Pos), CoreError> {
        match self.peek().kind {
            TokenKind::Ident(sym) => {
                let pos = self.bump().pos;
                Ok((sym, pos))
            }
            _ => Err(self.err(format!("expected {what}"))),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, CoreError> {
        match &self.peek().kind {
            TokenKind::Str(text) => {
                let text = text.clone();
                self.bump();
                Ok(text)
            }
            _ => Err(self.err(format!("expected {what}"))),
        }
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_stmt(&mut self, top_level: bool) -> Result<Stmt, CoreError> {
        let pos = self.peek().pos;
        let kind = match &self.peek().kind {
            TokenKind::Keyword(kw) => match kw {
                Keyword::Export => {
                    if !top_level {
                        return Err(self.err("'export' is only allowed at top level"));
                    }
                    self.bump();
                    return self.parse_exported(pos);
                }
                Keyword::Var => self.parse_var(false)?,
                Keyword::Function => self.parse_func(false)?,
                Keyword::Struct => self.parse_record(false, false)?,
                Keyword::Union => self.parse_record(true, false)?,
                Keyword::Enum => self.parse_enum(false)?,
                Keyword::If => self.parse_if()?,
                Keyword::While => self.parse_while()?,
                Keyword::For => self.parse_for()?,
                Keyword::Return => self.parse_return()?,
                Keyword::Break => {
                    self.bump();
                    self.expect_punct(Punct::Semi, "';'")?;
                    StmtKind::Break
                }
                Keyword::Continue => {
                    self.bump();
                    self.expect_punct(Punct::Semi, "';'")?;
                    StmtKind::Continue
                }
                Keyword::Delete => {
                    self.bump();
                    let value = self.parse_expr()?;
                    self.expect_punct(Punct::Semi, "';'")?;
                    StmtKind::Delete(value)
                }
                Keyword::Print => self.parse_print()?,
                Keyword::Import => {
                    if !top_level {
                        return Err(self.err("'import' is only allowed at top level"));
                    }
                    self.parse_import()?
                }
                Keyword::Foreign => {
                    if !top_level {
                        return Err(self.err("'foreign' is only allowed at top level"));
                    }
                    self.parse_foreign()?
                }
                _ => self.parse_expr_stmt()?,
            },
            _ => self.parse_expr_stmt()?,
        };
        Ok(Stmt { kind, pos })
    }

    fn parse_exported(&mut self, pos: Pos) -> Result<Stmt, CoreError> {
        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Var) => self.parse_var(true)?,
            TokenKind::Keyword(Keyword::Function) => self.parse_func(true)?,
            TokenKind::Keyword(Keyword::Struct) => self.parse_record(false, true)?,
            TokenKind::Keyword(Keyword::Union) => self.parse_record(true, true)?,
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(true)?,
            _ => return Err(self.err("expected a declaration after 'export'")),
        };
        Ok(Stmt { kind, pos })
    }

    fn parse_var(&mut self, exported: bool) -> Result<StmtKind, CoreError> {
        self.bump(); // var
        let (name, _) = self.expect_ident("variable name")?;
        self.expect_punct(Punct::Colon, "':'")?;
        let ty = self.parse_type()?;
        let init = if self.eat_punct(Punct::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_punct(Punct::Semi, "';'")?;
        Ok(StmtKind::Var {
            name,
            ty,
            init,
            exported,
        })
    }

    fn parse_func(&mut self, exported: bool) -> Result<StmtKind, CoreError> {
        self.bump(); // function
        let (name, _) = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let ret = if self.eat_punct(Punct::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(StmtKind::Func {
            name,
            params,
            ret,
            body,
            exported,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, CoreError> {
        self.expect_punct(Punct::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.peek().is_punct(Punct::RParen) {
            loop {
                let (name, pos) = self.expect_ident("parameter name")?;
                self.expect_punct(Punct::Colon, "':'")?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty, pos });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "')'")?;
        Ok(params)
    }

    fn parse_record(&mut self, is_union: bool, exported: bool) -> Result<StmtKind, CoreError> {
        self.bump(); // struct | union
        let (name, _) = self.expect_ident("type name")?;
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.peek().is_punct(Punct::RBrace) {
            let (field, pos) = self.expect_ident("member name")?;
            self.expect_punct(Punct::Colon, "':'")?;
            let ty = self.parse_type()?;
            self.expect_punct(Punct::Semi, "';'")?;
            members.push(Field {
                name: field,
                ty,
                pos,
            });
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(StmtKind::Record {
            name,
            is_union,
            members,
            exported,
        })
    }

    fn parse_enum(&mut self, exported: bool) -> Result<StmtKind, CoreError> {
        self.bump(); // enum
        let (name, _) = self.expect_ident("enum name")?;
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut items = Vec::new();
        while !self.peek().is_punct(Punct::RBrace) {
            let (item, pos) = self.expect_ident("enum item")?;
            let value = if self.eat_punct(Punct::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            items.push(EnumItemAst {
                name: item,
                value,
                pos,
            });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(StmtKind::Enum {
            name,
            items,
            exported,
        })
    }

    fn parse_if(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // if
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.eat_keyword(Keyword::Else) {
            if self.peek().is_keyword(Keyword::If) {
                // else-if chains nest as a single-statement else block.
                let pos = self.peek().pos;
                let kind = self.parse_if()?;
                Some(vec![Stmt { kind, pos }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // while
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // for
        let (var, var_pos) = self.expect_ident("loop variable")?;
        if !self.eat_keyword(Keyword::In) {
            return Err(self.err("expected 'in'"));
        }
        let first = self.parse_expr()?;
        if self.eat_punct(Punct::DotDot) {
            let end = self.parse_expr()?;
            let body = self.parse_block()?;
            Ok(StmtKind::ForRange {
                var,
                var_pos,
                start: first,
                end,
                body,
            })
        } else {
            let body = self.parse_block()?;
            Ok(StmtKind::ForEach {
                var,
                var_pos,
                seq: first,
                body,
            })
        }
    }

    fn parse_return(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // return
        if self.eat_punct(Punct::Semi) {
            return Ok(StmtKind::Return(None));
        }
        let value = self.parse_expr()?;
        self.expect_punct(Punct::Semi, "';'")?;
        Ok(StmtKind::Return(Some(value)))
    }

    fn parse_print(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // print
        let mut args = vec![self.parse_expr()?];
        while self.eat_punct(Punct::Comma) {
            args.push(self.parse_expr()?);
        }
        self.expect_punct(Punct::Semi, "';'")?;
        Ok(StmtKind::Print(args))
    }

    fn parse_import(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // import
        if let TokenKind::Str(_) = self.peek().kind {
            let path = self.expect_string("unit path")?;
            self.expect_punct(Punct::Semi, "';'")?;
            return Ok(StmtKind::Import { names: None, path });
        }
        let mut names = Vec::new();
        loop {
            let (name, pos) = self.expect_ident("imported name")?;
            names.push((name, pos));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        if !self.eat_keyword(Keyword::From) {
            return Err(self.err("expected 'from'"));
        }
        let path = self.expect_string("unit path")?;
        self.expect_punct(Punct::Semi, "';'")?;
        Ok(StmtKind::Import {
            names: Some(names),
            path,
        })
    }

    fn parse_foreign(&mut self) -> Result<StmtKind, CoreError> {
        self.bump(); // foreign
        let lib = self.expect_string("library name")?;
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut items = Vec::new();
        while !self.peek().is_punct(Punct::RBrace) {
            if self.peek().is_keyword(Keyword::Function) {
                self.bump();
                let (name, pos) = self.expect_ident("function name")?;
                let params = self.parse_params()?;
                let ret = if self.eat_punct(Punct::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect_punct(Punct::Semi, "';'")?;
                items.push(ForeignItem::Func {
                    name,
                    params,
                    ret,
                    pos,
                });
            } else if self.peek().is_keyword(Keyword::Var) {
                self.bump();
                let (name, pos) = self.expect_ident("variable name")?;
                self.expect_punct(Punct::Colon, "':'")?;
                let ty = self.parse_type()?;
                self.expect_punct(Punct::Semi, "';'")?;
                items.push(ForeignItem::Var { name, ty, pos });
            } else {
                return Err(self.err("expected 'function' or 'var' in foreign block"));
            }
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(StmtKind::Foreign { lib, items })
    }

    fn parse_expr_stmt(&mut self) -> Result<StmtKind, CoreError> {
        let expr = self.parse_expr()?;
        if self.eat_punct(Punct::Eq) {
            let value = self.parse_expr()?;
            self.expect_punct(Punct::Semi, "';'")?;
            return Ok(StmtKind::Assign {
                target: expr,
                value,
            });
        }
        if !matches!(expr.kind, ExprKind::Call { .. }) {
            return Err(self.err("expected statement"));
        }
        self.expect_punct(Punct::Semi, "';'")?;
        Ok(StmtKind::Call(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CoreError> {
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.peek().is_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.err("unexpected end of input in block"));
            }
            stmts.push(self.parse_stmt(false)?);
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(stmts)
    }

    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    fn parse_type(&mut self) -> Result<TypeExpr, CoreError> {
        use crate::types::IntKind;
        let pos = self.peek().pos;
        let kind = match &self.peek().kind {
            TokenKind::Keyword(kw) => {
                let prim = match kw {
                    Keyword::Int | Keyword::Int64 => Some(TypeExprKind::Int(IntKind::I64)),
                    Keyword::Int8 => Some(TypeExprKind::Int(IntKind::I8)),
                    Keyword::Int16 => Some(TypeExprKind::Int(IntKind::I16)),
                    Keyword::Int32 => Some(TypeExprKind::Int(IntKind::I32)),
                    Keyword::Uint | Keyword::Uint64 => Some(TypeExprKind::Int(IntKind::U64)),
                    Keyword::Uint8 => Some(TypeExprKind::Int(IntKind::U8)),
                    Keyword::Uint16 => Some(TypeExprKind::Int(IntKind::U16)),
                    Keyword::Uint32 => Some(TypeExprKind::Int(IntKind::U32)),
                    Keyword::Bool => Some(TypeExprKind::Bool),
                    Keyword::String => Some(TypeExprKind::Str),
                    Keyword::Cstring => Some(TypeExprKind::CStr),
                    _ => None,
                };
                match prim {
                    Some(prim) => {
                        self.bump();
                        prim
                    }
                    None if *kw == Keyword::Ptr => {
                        self.bump();
                        TypeExprKind::Ptr(Box::new(self.parse_type()?))
                    }
                    None => return Err(self.err("expected a type")),
                }
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.bump();
                let len = if self.eat_punct(Punct::RBracket) {
                    ArrayLen::Dynamic
                } else {
                    let len = self.parse_expr()?;
                    self.expect_punct(Punct::RBracket, "']'")?;
                    ArrayLen::Expr(Box::new(len))
                };
                let item = Box::new(self.parse_type()?);
                TypeExprKind::Array { len, item }
            }
            TokenKind::Ident(sym) => {
                let sym = *sym;
                self.bump();
                TypeExprKind::Named(sym)
            }
            _ => return Err(self.err("expected a type")),
        };
        Ok(TypeExpr { kind, pos })
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, CoreError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CoreError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek_binop() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            let pos = lhs.pos;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            };
        }
        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        let punct = match self.peek().kind {
            TokenKind::Punct(p) => p,
            _ => return None,
        };
        Some(match punct {
            Punct::OrOr => BinOp::Or,
            Punct::AndAnd => BinOp::And,
            Punct::EqEq => BinOp::Eq,
            Punct::NotEq => BinOp::Ne,
            Punct::Lt => BinOp::Lt,
            Punct::Gt => BinOp::Gt,
            Punct::LtEq => BinOp::Le,
            Punct::GtEq => BinOp::Ge,
            Punct::Plus => BinOp::Add,
            Punct::Minus => BinOp::Sub,
            Punct::Pipe => BinOp::BitOr,
            Punct::Caret => BinOp::BitXor,
            Punct::Star => BinOp::Mul,
            Punct::SlashSlash => BinOp::Div,
            Punct::Percent => BinOp::Rem,
            Punct::Amp => BinOp::BitAnd,
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, CoreError> {
        let pos = self.peek().pos;
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Tilde) => Some(UnaryOp::Compl),
            TokenKind::Punct(Punct::Amp) => Some(UnaryOp::AddrOf),
            TokenKind::Punct(Punct::Star) => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr {
                kind: ExprKind::Unary { op, operand },
                pos,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CoreError> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = expr.pos;
            match self.peek().kind {
                TokenKind::Punct(Punct::LParen) => {
                    self.bump();
                    let mut args = Vec::new();
                    if !self.peek().is_punct(Punct::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat_punct(Punct::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_punct(Punct::RParen, "')'")?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    };
                }
                TokenKind::Punct(Punct::LBracket) => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect_punct(Punct::RBracket, "']'")?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    };
                }
                TokenKind::Punct(Punct::Dot) => {
                    self.bump();
                    let (name, name_pos) = self.expect_ident("member name")?;
                    expr = if name == self.length_sym {
                        Expr {
                            kind: ExprKind::Length {
                                base: Box::new(expr),
                            },
                            pos,
                        }
                    } else {
                        Expr {
                            kind: ExprKind::Member {
                                base: Box::new(expr),
                                name,
                                name_pos,
                            },
                            pos,
                        }
                    };
                }
                TokenKind::Keyword(Keyword::As) => {
                    self.bump();
                    let ty = self.parse_type()?;
                    expr = Expr {
                        kind: ExprKind::Cast {
                            value: Box::new(expr),
                            ty,
                        },
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, CoreError> {
        let pos = self.peek().pos;
        let kind = match &self.peek().kind {
            TokenKind::Int(value) => {
                let value = *value;
                self.bump();
                ExprKind::Int(value)
            }
            TokenKind::Str(_) => {
                let text = self.expect_string("string literal")?;
                ExprKind::Str(text)
            }
            TokenKind::Ident(sym) => {
                let sym = *sym;
                self.bump();
                ExprKind::Ident(sym)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                ExprKind::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                ExprKind::Bool(false)
            }
            TokenKind::Keyword(Keyword::New) => {
                self.bump();
                let ty = self.parse_type()?;
                ExprKind::New { ty }
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.bump();
                let mut items = Vec::new();
                if !self.peek().is_punct(Punct::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RBracket, "']'")?;
                ExprKind::ArrayLit(items)
            }
            _ => return Err(self.err("expected an expression")),
        };
        Ok(Expr { kind, pos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> Result<Module, CoreError> {
        let mut interner = Interner::new();
        let result = lex(source, &mut interner)?;
        parse(&result.tokens, source, &mut interner)
    }

    #[test]
    fn parses_variable_declaration() {
        let module = parse_source("var x: int = 1 + 2;").expect("parse");
        assert_eq!(module.stmts.len(), 1);
        assert!(matches!(
            module.stmts[0].kind,
            StmtKind::Var { init: Some(_), .. }
        ));
    }

    #[test]
    fn binary_precedence_nests_correctly() {
        let module = parse_source("var x: int = 1 + 2 * 3;").expect("parse");
        let StmtKind::Var { init: Some(init), .. } = &module.stmts[0].kind else {
            panic!("expected var");
        };
        let ExprKind::Binary { op, rhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn parses_function_with_params_and_calls() {
        let source = "function add(a: int, b: int): int { return a + b; } add(1, 2);";
        let module = parse_source(source).expect("parse");
        assert!(matches!(module.stmts[0].kind, StmtKind::Func { .. }));
        assert!(matches!(module.stmts[1].kind, StmtKind::Call(_)));
    }

    #[test]
    fn parses_types() {
        let source = "var a: ptr int; var b: [3]int8; var c: ptr []string; var d: Node;";
        let module = parse_source(source).expect("parse");
        assert_eq!(module.stmts.len(), 4);
    }

    #[test]
    fn length_member_is_recognized() {
        let module = parse_source("var n: int = xs.length;").expect("parse");
        let StmtKind::Var { init: Some(init), .. } = &module.stmts[0].kind else {
            panic!("expected var");
        };
        assert!(matches!(init.kind, ExprKind::Length { .. }));
    }

    #[test]
    fn parses_if_else_chain() {
        let source = "if a { } else if b { } else { }";
        let module = parse_source(source).expect("parse");
        let StmtKind::If { else_body, .. } = &module.stmts[0].kind else {
            panic!("expected if");
        };
        let inner = else_body.as_ref().expect("else");
        assert!(matches!(inner[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn parses_both_for_forms() {
        let source = "for i in 0 .. 10 { } for x in xs { }";
        let module = parse_source(source).expect("parse");
        assert!(matches!(module.stmts[0].kind, StmtKind::ForRange { .. }));
        assert!(matches!(module.stmts[1].kind, StmtKind::ForEach { .. }));
    }

    #[test]
    fn parses_imports() {
        let source = "import \"lib/util\"; import min, max from \"lib/math\";";
        let module = parse_source(source).expect("parse");
        assert!(matches!(
            module.stmts[0].kind,
            StmtKind::Import { names: None, .. }
        ));
        let StmtKind::Import {
            names: Some(names), ..
        } = &module.stmts[1].kind
        else {
            panic!("expected explicit import");
        };
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn parses_foreign_block() {
        let source = "foreign \"c\" { function puts(s: cstring): int32; var errno: int32; }";
        let module = parse_source(source).expect("parse");
        let StmtKind::Foreign { lib, items } = &module.stmts[0].kind else {
            panic!("expected foreign");
        };
        assert_eq!(lib, "c");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn import_inside_block_is_rejected() {
        let err = parse_source("function f() { import \"x\"; }").unwrap_err();
        assert!(matches!(err, CoreError::Syntax(_)));
    }

    #[test]
    fn bare_expression_statement_is_rejected() {
        let err = parse_source("1 + 2;").unwrap_err();
        assert!(matches!(err, CoreError::Syntax(_)));
    }

    #[test]
    fn cast_binds_tighter_than_binary() {
        let module = parse_source("var x: int = y as int + 1;").expect("parse");
        let StmtKind::Var { init: Some(init), .. } = &module.stmts[0].kind else {
            panic!("expected var");
        };
        assert!(matches!(
            init.kind,
            ExprKind::Binary { op: BinOp::Add, .. }
        ));
    }
}
