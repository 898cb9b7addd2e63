//! Recursive-descent parser: tokens to AST.
//!
//! The statement dispatcher looks at the first one or two tokens; expression
//! parsing follows the precedence ladder `or` < `and` < `not` < comparisons
//! (non-associative) < `+ -` < `* /` < unary `-` < primary. Parsing does not
//! recover: the first error aborts.

use crate::{
    ast::{BinaryOp, Block, Expr, ExprKind, Literal, Param, Program, Stmt, StmtKind, TypeMarker, UnaryOp},
    lex::{LexError, Token, TokenKind, tokenize},
};

/// A parse error with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            line: err.line,
            message: err.message,
        }
    }
}

/// Lexes and parses a whole source file.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    parse_tokens(tokens)
}

/// Parses an already-lexed token stream.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    /// Looks one token past the current one (`Eof` is sticky).
    fn peek2_kind(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn line(&self) -> u32 {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                self.line(),
                format!("expected {what}, found {}", self.peek_kind().describe()),
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek_kind() {
            TokenKind::Ident(_) => {
                let TokenKind::Ident(name) = self.advance().kind else {
                    unreachable!()
                };
                Ok(name)
            }
            other => Err(ParseError::new(
                self.line(),
                format!("expected {what}, found {}", other.describe()),
            )),
        }
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        while self.peek_kind() != &TokenKind::Eof {
            stmts.push(self.statement()?);
        }
        Ok(Program { stmts })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let kind = match self.peek_kind() {
            TokenKind::Ident(_) => self.ident_statement()?,
            TokenKind::If => self.if_statement()?,
            TokenKind::While => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => {
                self.advance();
                let var = self.expect_ident("a loop variable")?;
                self.expect(&TokenKind::In, "'in'")?;
                let iterable = self.expression()?;
                let body = self.block()?;
                StmtKind::For { var, iterable, body }
            }
            TokenKind::Stop => {
                self.advance();
                StmtKind::Stop
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Func => self.func_statement()?,
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                    None
                } else {
                    Some(self.expression()?)
                };
                StmtKind::Return { value }
            }
            TokenKind::Match => self.match_statement()?,
            TokenKind::Import => {
                self.advance();
                match self.peek_kind() {
                    TokenKind::Str(_) => {
                        let TokenKind::Str(path) = self.advance().kind else {
                            unreachable!()
                        };
                        StmtKind::Import { path }
                    }
                    other => {
                        return Err(ParseError::new(
                            self.line(),
                            format!("expected a module path string, found {}", other.describe()),
                        ));
                    }
                }
            }
            TokenKind::Export => {
                self.advance();
                let name = self.expect_ident("a name to export")?;
                StmtKind::Export { name }
            }
            TokenKind::Set => {
                self.advance();
                let name = self.expect_ident("a list or dict name")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let index = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.expect(&TokenKind::To, "'to'")?;
                let value = self.expression()?;
                StmtKind::SetIndex { name, index, value }
            }
            TokenKind::Add => {
                self.advance();
                let name = self.expect_ident("a list name")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let value = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                StmtKind::ListAdd { name, value }
            }
            TokenKind::Insert => {
                self.advance();
                let name = self.expect_ident("a list name")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let index = self.expression()?;
                self.expect(&TokenKind::Comma, "','")?;
                let value = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                StmtKind::ListInsert { name, index, value }
            }
            TokenKind::Remove => {
                self.advance();
                let name = self.expect_ident("a list or dict name")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let index = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                StmtKind::Remove { name, index }
            }
            TokenKind::Call => {
                let expr = self.index_call()?;
                StmtKind::Expr(expr)
            }
            TokenKind::Trace => {
                self.advance();
                let on = match self.peek_kind() {
                    TokenKind::On => true,
                    TokenKind::Off => false,
                    other => {
                        return Err(ParseError::new(
                            self.line(),
                            format!("expected 'on' or 'off' after 'trace', found {}", other.describe()),
                        ));
                    }
                };
                self.advance();
                StmtKind::TraceToggle { on }
            }
            other => {
                return Err(ParseError::new(
                    line,
                    format!("expected a statement, found {}", other.describe()),
                ));
            }
        };
        Ok(Stmt { kind, line })
    }

    /// An identifier starts either a typed assignment or a call statement.
    fn ident_statement(&mut self) -> Result<StmtKind, ParseError> {
        match self.peek2_kind() {
            TokenKind::Marker(_) => {
                let name = self.expect_ident("a variable name")?;
                let TokenKind::Marker(marker) = self.advance().kind else {
                    unreachable!()
                };
                let value = self.expression()?;
                Ok(StmtKind::VarAssign { name, marker, value })
            }
            TokenKind::LParen => {
                let line = self.line();
                let name = self.expect_ident("a function name")?;
                let args = self.call_args()?;
                Ok(StmtKind::Expr(Expr {
                    kind: ExprKind::Call { name, args },
                    line,
                }))
            }
            other => Err(ParseError::new(
                self.line(),
                format!("expected a type marker or '(' after identifier, found {}", other.describe()),
            )),
        }
    }

    fn if_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.expression()?;
        let body = self.block()?;
        branches.push((cond, body));
        let mut else_block = None;
        loop {
            if self.eat(&TokenKind::Elif) {
                let cond = self.expression()?;
                let body = self.block()?;
                branches.push((cond, body));
            } else if self.eat(&TokenKind::Else) {
                else_block = Some(self.block()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, else_block })
    }

    fn func_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let name = self.expect_ident("a function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let pname = self.expect_ident("a parameter name")?;
                let marker = match self.peek_kind() {
                    TokenKind::Marker(_) => {
                        let TokenKind::Marker(marker) = self.advance().kind else {
                            unreachable!()
                        };
                        marker
                    }
                    other => {
                        return Err(ParseError::new(
                            self.line(),
                            format!("expected a type marker for parameter '{pname}', found {}", other.describe()),
                        ));
                    }
                };
                params.push(Param { name: pname, marker });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }
        let body = self.block()?;
        Ok(StmtKind::FuncDef { name, params, body })
    }

    fn match_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let scrutinee = self.expression()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut else_block = None;
        loop {
            match self.peek_kind() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Else => {
                    self.advance();
                    else_block = Some(self.block()?);
                    self.expect(&TokenKind::RBrace, "'}'")?;
                    break;
                }
                _ => {
                    let head = self.case_literal()?;
                    let body = self.block()?;
                    cases.push((head, body));
                }
            }
        }
        Ok(StmtKind::Match {
            scrutinee,
            cases,
            else_block,
        })
    }

    /// Case heads are literals only: int, float, bool, string, optionally
    /// negated numbers.
    fn case_literal(&mut self) -> Result<Literal, ParseError> {
        let negative = self.eat(&TokenKind::Minus);
        let line = self.line();
        let literal = match self.peek_kind() {
            TokenKind::Int(_) => {
                let TokenKind::Int(v) = self.advance().kind else {
                    unreachable!()
                };
                Literal::Int(if negative { -v } else { v })
            }
            TokenKind::Float(_) => {
                let TokenKind::Float(v) = self.advance().kind else {
                    unreachable!()
                };
                Literal::Float(if negative { -v } else { v })
            }
            TokenKind::Str(_) if !negative => {
                let TokenKind::Str(v) = self.advance().kind else {
                    unreachable!()
                };
                Literal::Str(v)
            }
            TokenKind::Bool(_) if !negative => {
                let TokenKind::Bool(v) = self.advance().kind else {
                    unreachable!()
                };
                Literal::Bool(v)
            }
            other => {
                return Err(ParseError::new(
                    line,
                    format!("match case head must be a literal, found {}", other.describe()),
                ));
            }
        };
        Ok(literal)
    }

    // ----- expressions -----

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.peek_kind() == &TokenKind::Or {
            let line = self.line();
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                line,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while self.peek_kind() == &TokenKind::And {
            let line = self.line();
            self.advance();
            let rhs = self.not_expr()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                line,
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == &TokenKind::Not {
            let line = self.line();
            self.advance();
            let operand = self.not_expr()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let op = match self.peek_kind() {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::LtEq => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::GtEq => Some(BinaryOp::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        let line = self.line();
        self.advance();
        let rhs = self.additive()?;
        // Comparisons are non-associative: `a < b < c` is a parse error.
        if matches!(
            self.peek_kind(),
            TokenKind::EqEq | TokenKind::NotEq | TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq
        ) {
            return Err(ParseError::new(self.line(), "comparison operators cannot be chained"));
        }
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            line,
        })
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                line,
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                line,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kind() == &TokenKind::Minus {
            let line = self.line();
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let kind = match self.peek_kind() {
            TokenKind::Int(_) => {
                let TokenKind::Int(v) = self.advance().kind else {
                    unreachable!()
                };
                ExprKind::Literal(Literal::Int(v))
            }
            TokenKind::Float(_) => {
                let TokenKind::Float(v) = self.advance().kind else {
                    unreachable!()
                };
                ExprKind::Literal(Literal::Float(v))
            }
            TokenKind::Str(_) => {
                let TokenKind::Str(v) = self.advance().kind else {
                    unreachable!()
                };
                ExprKind::Literal(Literal::Str(v))
            }
            TokenKind::Bool(_) => {
                let TokenKind::Bool(v) = self.advance().kind else {
                    unreachable!()
                };
                ExprKind::Literal(Literal::Bool(v))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        elems.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "']'")?;
                }
                ExprKind::ListLit(elems)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(&TokenKind::Colon, "':'")?;
                        let value = self.expression()?;
                        pairs.push((key, value));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBrace, "'}'")?;
                }
                ExprKind::DictLit(pairs)
            }
            TokenKind::Call => return self.index_call(),
            TokenKind::Ident(_) => {
                let TokenKind::Ident(name) = self.advance().kind else {
                    unreachable!()
                };
                if self.peek_kind() == &TokenKind::LParen {
                    let args = self.call_args()?;
                    ExprKind::Call { name, args }
                } else {
                    ExprKind::Var(name)
                }
            }
            other => {
                return Err(ParseError::new(
                    line,
                    format!("expected an expression, found {}", other.describe()),
                ));
            }
        };
        Ok(Expr { kind, line })
    }

    /// `call name(index)` — valid both as an expression and a statement.
    fn index_call(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        self.expect(&TokenKind::Call, "'call'")?;
        let name = self.expect_ident("a container name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let index = self.expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Expr {
            kind: ExprKind::Index {
                name,
                index: Box::new(index),
            },
            line,
        })
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_one(source: &str) -> Stmt {
        let mut program = parse(source).unwrap();
        assert_eq!(program.stmts.len(), 1, "expected one statement");
        program.stmts.remove(0)
    }

    #[test]
    fn typed_assignment() {
        let stmt = parse_one("x =i 1 + 2");
        let StmtKind::VarAssign { name, marker, value } = stmt.kind else {
            panic!("expected assignment, got {stmt:?}");
        };
        assert_eq!(name, "x");
        assert_eq!(marker, TypeMarker::Int);
        assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let stmt = parse_one("x =i 2 + 3 * 4");
        let StmtKind::VarAssign { value, .. } = stmt.kind else {
            panic!()
        };
        let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = value.kind else {
            panic!("expected + at the top, got {value:?}");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        let stmt = parse_one("x =b not 1 == 2");
        let StmtKind::VarAssign { value, .. } = stmt.kind else {
            panic!()
        };
        let ExprKind::Unary { op: UnaryOp::Not, operand } = value.kind else {
            panic!("expected 'not' at the top, got {value:?}");
        };
        assert!(matches!(operand.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn chained_comparisons_are_rejected() {
        let err = parse("x =b 1 < 2 < 3").unwrap_err();
        assert_eq!(err.message, "comparison operators cannot be chained");
    }

    #[test]
    fn if_elif_else_shape() {
        let stmt = parse_one("if a { } elif b { } elif c { } else { stop }");
        let StmtKind::If { branches, else_block } = stmt.kind else {
            panic!()
        };
        assert_eq!(branches.len(), 3);
        assert!(else_block.is_some());
    }

    #[test]
    fn func_params_require_markers() {
        let stmt = parse_one("func f(a =i, b =s) { return a }");
        let StmtKind::FuncDef { name, params, .. } = stmt.kind else {
            panic!()
        };
        assert_eq!(name, "f");
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].marker, TypeMarker::Str);

        let err = parse("func f(a) { }").unwrap_err();
        assert!(err.message.contains("type marker"));
    }

    #[test]
    fn match_heads_are_literals() {
        let stmt = parse_one("match x { 1 { } \"two\" { } else { } }");
        let StmtKind::Match { cases, else_block, .. } = stmt.kind else {
            panic!()
        };
        assert_eq!(cases[0].0, Literal::Int(1));
        assert_eq!(cases[1].0, Literal::Str("two".to_owned()));
        assert!(else_block.is_some());

        let err = parse("match x { y { } }").unwrap_err();
        assert!(err.message.contains("literal"));
    }

    #[test]
    fn container_statements() {
        let program = parse("set d(\"k\") to 1\nadd xs(2)\ninsert xs(0, 3)\nremove xs(1)\ncall xs(0)").unwrap();
        assert!(matches!(program.stmts[0].kind, StmtKind::SetIndex { .. }));
        assert!(matches!(program.stmts[1].kind, StmtKind::ListAdd { .. }));
        assert!(matches!(program.stmts[2].kind, StmtKind::ListInsert { .. }));
        assert!(matches!(program.stmts[3].kind, StmtKind::Remove { .. }));
        let StmtKind::Expr(ref expr) = program.stmts[4].kind else {
            panic!()
        };
        assert!(matches!(expr.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn errors_carry_lines() {
        let err = parse("x =i 1\n)").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn trace_toggle() {
        assert!(matches!(
            parse_one("trace on").kind,
            StmtKind::TraceToggle { on: true }
        ));
        assert!(matches!(
            parse_one("trace off").kind,
            StmtKind::TraceToggle { on: false }
        ));
    }
}
