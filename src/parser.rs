//! Recursive-descent parser for the Lua chunk grammar.
//!
//! Produces the statement-list root the link engine works on. Expression
//! parsing is precedence climbing with the binding powers from `ast::BinOp`.

use anyhow::{Result, anyhow, bail};

use crate::ast::{
    BinOp, Block, Expr, FuncBody, FuncName, IfArm, Stmt, TableField, UNARY_PRECEDENCE, UnOp,
};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parse a chunk into its top-level statement list.
pub fn parse(src: &str) -> Result<Block> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let block = parser.parse_block()?;
    parser.expect(TokenKind::Eof, "end of input")?;
    Ok(block)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos];
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.peek_kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.error_here(&format!("expected {}", what)))
        }
    }

    fn error_here(&self, message: &str) -> anyhow::Error {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "<eof>".to_string()
        } else {
            format!("'{}'", token.text(self.src))
        };
        anyhow!("parse error at line {}: {}, found {}", token.line, message, found)
    }

    fn expect_name(&mut self) -> Result<String> {
        let token = self.expect(TokenKind::Name, "a name")?;
        Ok(token.text(self.src).to_string())
    }

    fn block_ends(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    fn parse_block(&mut self) -> Result<Block> {
        let mut stmts = Vec::new();
        loop {
            while self.accept(TokenKind::Semi) {}
            if self.block_ends() {
                return Ok(stmts);
            }
            if self.peek_kind() == TokenKind::Return {
                self.bump();
                let mut exprs = Vec::new();
                if !self.block_ends() && self.peek_kind() != TokenKind::Semi {
                    exprs = self.parse_expr_list()?;
                }
                self.accept(TokenKind::Semi);
                stmts.push(Stmt::Return(exprs));
                if !self.block_ends() {
                    return Err(self.error_here("'return' must end the block"));
                }
                return Ok(stmts);
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek_kind() {
            TokenKind::Local => self.parse_local(),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::For => self.parse_for(),
            TokenKind::Do => {
                self.bump();
                let body = self.parse_block()?;
                self.expect(TokenKind::End, "'end' to close 'do'")?;
                Ok(Stmt::Do(body))
            }
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break)
            }
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_local(&mut self) -> Result<Stmt> {
        self.bump();
        if self.accept(TokenKind::Function) {
            let name = self.expect_name()?;
            let body = self.parse_func_body()?;
            return Ok(Stmt::LocalFunction { name, body });
        }
        let mut names = vec![self.expect_name()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        let exprs = if self.accept(TokenKind::Assign) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Local { names, exprs })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt> {
        self.bump();
        let base = self.expect_name()?;
        let mut path = Vec::new();
        while self.accept(TokenKind::Dot) {
            path.push(self.expect_name()?);
        }
        let method = if self.accept(TokenKind::Colon) {
            Some(self.expect_name()?)
        } else {
            None
        };
        let is_method = method.is_some();
        let mut body = self.parse_func_body()?;
        if is_method {
            // `function t:m()` carries an implicit self parameter.
            body.params.insert(0, "self".to_string());
        }
        Ok(Stmt::Function {
            name: FuncName { base, path, method },
            body,
        })
    }

    fn parse_func_body(&mut self) -> Result<FuncBody> {
        self.expect(TokenKind::LParen, "'(' to open the parameter list")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if self.peek_kind() != TokenKind::RParen {
            loop {
                if self.accept(TokenKind::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close the parameter list")?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End, "'end' to close the function")?;
        Ok(FuncBody {
            params,
            is_vararg,
            body,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.bump();
        let mut arms = Vec::new();
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Then, "'then'")?;
        arms.push(IfArm {
            cond,
            body: self.parse_block()?,
        });
        let mut else_body = None;
        loop {
            match self.peek_kind() {
                TokenKind::Elseif => {
                    self.bump();
                    let cond = self.parse_expr(0)?;
                    self.expect(TokenKind::Then, "'then'")?;
                    arms.push(IfArm {
                        cond,
                        body: self.parse_block()?,
                    });
                }
                TokenKind::Else => {
                    self.bump();
                    else_body = Some(self.parse_block()?);
                    self.expect(TokenKind::End, "'end' to close 'if'")?;
                    break;
                }
                TokenKind::End => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error_here("expected 'elseif', 'else' or 'end'")),
            }
        }
        Ok(Stmt::If { arms, else_body })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.bump();
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End, "'end' to close 'while'")?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_repeat(&mut self) -> Result<Stmt> {
        self.bump();
        let body = self.parse_block()?;
        self.expect(TokenKind::Until, "'until'")?;
        let cond = self.parse_expr(0)?;
        Ok(Stmt::Repeat { body, cond })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.bump();
        let first = self.expect_name()?;
        if self.accept(TokenKind::Assign) {
            let start = self.parse_expr(0)?;
            self.expect(TokenKind::Comma, "',' in numeric for")?;
            let stop = self.parse_expr(0)?;
            let step = if self.accept(TokenKind::Comma) {
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            self.expect(TokenKind::Do, "'do'")?;
            let body = self.parse_block()?;
            self.expect(TokenKind::End, "'end' to close 'for'")?;
            return Ok(Stmt::NumericFor {
                var: first,
                start,
                stop,
                step,
                body,
            });
        }
        let mut vars = vec![first];
        while self.accept(TokenKind::Comma) {
            vars.push(self.expect_name()?);
        }
        self.expect(TokenKind::In, "'in'")?;
        let exprs = self.parse_expr_list()?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End, "'end' to close 'for'")?;
        Ok(Stmt::GenericFor { vars, exprs, body })
    }

    /// Either a call statement or an assignment; both start with a prefix
    /// expression.
    fn parse_expr_statement(&mut self) -> Result<Stmt> {
        let line = self.peek().line;
        let first = self.parse_prefix_expr()?;
        if self.peek_kind() != TokenKind::Assign && self.peek_kind() != TokenKind::Comma {
            return match first {
                Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Stmt::Expr(first)),
                _ => Err(anyhow!("parse error at line {}: unexpected expression statement", line)),
            };
        }
        let mut targets = vec![first];
        while self.accept(TokenKind::Comma) {
            targets.push(self.parse_prefix_expr()?);
        }
        for target in &targets {
            if !matches!(target, Expr::Name(_) | Expr::Member { .. } | Expr::Index { .. }) {
                bail!("parse error at line {}: cannot assign to this expression", line);
            }
        }
        self.expect(TokenKind::Assign, "'=' in assignment")?;
        let values = self.parse_expr_list()?;
        Ok(Stmt::Assign { targets, values })
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr(0)?];
        while self.accept(TokenKind::Comma) {
            exprs.push(self.parse_expr(0)?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = match self.peek_kind() {
            TokenKind::Not => {
                self.bump();
                let operand = self.parse_expr(UNARY_PRECEDENCE)?;
                Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                }
            }
            TokenKind::Minus => {
                self.bump();
                let operand = self.parse_expr(UNARY_PRECEDENCE)?;
                Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                }
            }
            TokenKind::Hash => {
                self.bump();
                let operand = self.parse_expr(UNARY_PRECEDENCE)?;
                Expr::Unary {
                    op: UnOp::Len,
                    operand: Box::new(operand),
                }
            }
            _ => self.parse_simple_expr()?,
        };

        while let Some(op) = self.peek_binop() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let next_min = if op.is_right_assoc() { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        let op = match self.peek_kind() {
            TokenKind::Or => BinOp::Or,
            TokenKind::And => BinOp::And,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Concat => BinOp::Concat,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Caret => BinOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr> {
        match self.peek_kind() {
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::Nil)
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::True)
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::False)
            }
            TokenKind::Ellipsis => {
                self.bump();
                Ok(Expr::Vararg)
            }
            TokenKind::Number => {
                let token = self.bump();
                Ok(Expr::Number(token.text(self.src).to_string()))
            }
            TokenKind::Str => {
                let token = self.bump();
                Ok(Expr::Str(token.text(self.src).to_string()))
            }
            TokenKind::Function => {
                self.bump();
                Ok(Expr::Function(self.parse_func_body()?))
            }
            TokenKind::LBrace => self.parse_table(),
            _ => self.parse_prefix_expr(),
        }
    }

    /// `Name`, `(expr)` and any chain of `.name`, `[expr]`, `:m(args)`,
    /// `(args)`, string-call and table-call suffixes.
    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        let mut expr = match self.peek_kind() {
            TokenKind::Name => Expr::Name(self.expect_name()?),
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                Expr::Paren(Box::new(inner))
            }
            _ => return Err(self.error_here("expected an expression")),
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let name = self.expect_name()?;
                    expr = Expr::Member {
                        base: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr(0)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Colon => {
                    self.bump();
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        base: Box::new(expr),
                        method,
                        args,
                    };
                }
                TokenKind::LParen | TokenKind::Str | TokenKind::LBrace => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        match self.peek_kind() {
            TokenKind::LParen => {
                self.bump();
                let args = if self.peek_kind() == TokenKind::RParen {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(TokenKind::RParen, "')' to close the call")?;
                Ok(args)
            }
            TokenKind::Str => {
                let token = self.bump();
                Ok(vec![Expr::Str(token.text(self.src).to_string())])
            }
            TokenKind::LBrace => Ok(vec![self.parse_table()?]),
            _ => Err(self.error_here("expected call arguments")),
        }
    }

    fn parse_table(&mut self) -> Result<Expr> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RBrace => break,
                TokenKind::LBracket => {
                    self.bump();
                    let key = self.parse_expr(0)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    self.expect(TokenKind::Assign, "'=' after table key")?;
                    let value = self.parse_expr(0)?;
                    fields.push(TableField::Keyed { key, value });
                }
                TokenKind::Name if self.peek_kind_at(1) == TokenKind::Assign => {
                    let name = self.expect_name()?;
                    self.bump();
                    let value = self.parse_expr(0)?;
                    fields.push(TableField::Named { name, value });
                }
                _ => {
                    fields.push(TableField::Item(self.parse_expr(0)?));
                }
            }
            if !self.accept(TokenKind::Comma) && !self.accept(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close the table")?;
        Ok(Expr::Table(fields))
    }
}
