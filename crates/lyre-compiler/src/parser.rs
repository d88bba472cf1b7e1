//! Recursive-descent parser.
//!
//! Statements are newline-terminated; the parser skips runs of separators
//! between statements and inside bracketed literals.

use crate::ast::{AssignOp, BinOp, Expr, ExprKind, Param, Stmt, StmtKind};
use crate::lexer::{LexError, Lexer};
use crate::token::{SpannedToken, Token};
use std::fmt;

/// Parser error.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Syntax error] At line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            line: e.line,
        }
    }
}

/// A parsed program: top-level statements plus the options consumed from
/// the file header.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    /// Set by `option debug`; controls whether `debug` blocks are compiled.
    pub debug: bool,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(source),
        }
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        self.skip_separators()?;
        let mut debug = false;
        while self.accept(Token::Option)? {
            debug = self.parse_option()?;
            self.skip_separators()?;
        }
        while !self.check(&Token::Eot)? {
            stmts.push(self.parse_statement()?);
            self.skip_separators()?;
        }
        Ok(Program { stmts, debug })
    }

    // ---- token plumbing ----

    fn peek(&self) -> Result<&SpannedToken, ParseError> {
        match self.lexer.current() {
            Ok(tok) => Ok(tok),
            Err(e) => Err(e.clone().into()),
        }
    }

    fn line(&self) -> u32 {
        match self.lexer.current() {
            Ok(tok) => tok.span.line,
            Err(e) => e.line,
        }
    }

    fn advance(&mut self) -> Result<SpannedToken, ParseError> {
        Ok(self.lexer.advance()?)
    }

    fn check(&self, t: &Token) -> Result<bool, ParseError> {
        Ok(&self.peek()?.token == t)
    }

    fn accept(&mut self, t: Token) -> Result<bool, ParseError> {
        if self.check(&t)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, t: Token, hint: &str) -> Result<(), ParseError> {
        if self.accept(t.clone())? {
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected '{}' {}, got '{}'",
                t,
                hint,
                self.peek()?.token
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line(),
        }
    }

    fn skip_separators(&mut self) -> Result<(), ParseError> {
        while self.peek()?.token.is_separator() && !self.check(&Token::Eot)? {
            self.advance()?;
        }
        Ok(())
    }

    fn skip_empty_lines(&mut self) -> Result<(), ParseError> {
        while self.accept(Token::Eol)? {}
        Ok(())
    }

    fn expect_separator(&mut self) -> Result<(), ParseError> {
        if self.check(&Token::Eot)? {
            return Ok(());
        }
        if self.peek()?.token.is_separator() {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error("Expected a new line or a semicolon"))
        }
    }

    fn parse_identifier(&mut self, hint: &str) -> Result<String, ParseError> {
        match &self.peek()?.token {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(self.error(format!("Expected an identifier {hint}, got '{other}'"))),
        }
    }

    // ---- options ----

    fn parse_option(&mut self) -> Result<bool, ParseError> {
        if !self.accept(Token::Debug)? {
            return Err(self.error("Invalid option: expected \"debug\""));
        }
        let mut value = true;
        if self.accept(Token::OpAssign)? {
            if self.accept(Token::True)? {
                // default
            } else if self.accept(Token::False)? {
                value = false;
            } else {
                return Err(
                    self.error("Option value should be \"true\" (default) or \"false\"")
                );
            }
        }
        self.skip_empty_lines()?;
        Ok(value)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        if self.accept(Token::Print)? {
            return self.parse_print_statement(line);
        }
        if self.accept(Token::Local)? {
            self.skip_empty_lines()?;
            if self.accept(Token::Function)? {
                return self.parse_function_declaration(line, true);
            }
            return self.parse_declaration(line);
        }
        if self.accept(Token::If)? {
            return self.parse_if_statement(line);
        }
        if self.accept(Token::While)? {
            return self.parse_while_statement(line);
        }
        if self.accept(Token::For)? {
            return self.parse_for_statement(line);
        }
        if self.accept(Token::Foreach)? {
            return self.parse_foreach_statement(line);
        }
        if self.accept(Token::Function)? {
            return self.parse_function_declaration(line, false);
        }
        if self.accept(Token::Return)? {
            let value = if self.peek()?.token.is_separator() {
                None
            } else {
                Some(self.parse_expression()?)
            };
            return Ok(Stmt::new(line, StmtKind::Return(value)));
        }
        if self.accept(Token::Repeat)? {
            return self.parse_repeat_statement(line);
        }
        if self.accept(Token::Break)? {
            return Ok(Stmt::new(line, StmtKind::Break));
        }
        if self.accept(Token::Continue)? {
            return Ok(Stmt::new(line, StmtKind::Continue));
        }
        if self.accept(Token::Assert)? {
            let cond = self.parse_expression()?;
            let msg = if self.accept(Token::Comma)? {
                Some(self.parse_expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(line, StmtKind::Assert { cond, msg }));
        }
        if self.accept(Token::Do)? {
            let block = self.parse_block(&[Token::End])?.0;
            return Ok(Stmt::new(line, StmtKind::Do(block)));
        }
        if self.accept(Token::Debug)? {
            let body = if self.accept(Token::Eol)? {
                self.parse_block(&[Token::End])?.0
            } else {
                vec![self.parse_statement()?]
            };
            return Ok(Stmt::new(line, StmtKind::Debug(body)));
        }
        if self.accept(Token::Throw)? {
            let e = self.parse_expression()?;
            return Ok(Stmt::new(line, StmtKind::Throw(e)));
        }
        if self.accept(Token::Pass)? {
            return Ok(Stmt::new(line, StmtKind::Pass));
        }
        self.parse_expression_statement(line)
    }

    /// Parse statements until one of `enders`; the ender is consumed only
    /// when it is `end`.
    fn parse_block(&mut self, enders: &[Token]) -> Result<(Vec<Stmt>, Token), ParseError> {
        let mut block = Vec::new();
        self.skip_separators()?;
        loop {
            for ender in enders {
                if self.check(ender)? {
                    if *ender == Token::End {
                        self.advance()?;
                    }
                    return Ok((block, ender.clone()));
                }
            }
            if self.check(&Token::Eot)? {
                return Err(self.error("Unexpected end of file in block"));
            }
            block.push(self.parse_statement()?);
            self.skip_separators()?;
        }
    }

    /// Body of an `if` branch: stops at `end`, `elsif` or `else`.
    fn parse_if_block(&mut self) -> Result<(Vec<Stmt>, Token), ParseError> {
        let (block, ender) =
            self.parse_block(&[Token::End, Token::Elsif, Token::Else])?;
        if ender != Token::End {
            // leave elsif/else for the caller but step over else
            if ender == Token::Else {
                self.advance()?;
            }
        }
        Ok((block, ender))
    }

    fn parse_print_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let mut args = vec![self.parse_expression()?];
        let mut newline = true;
        while self.accept(Token::Comma)? {
            // a trailing comma suppresses the newline
            if self.peek()?.token.is_separator() {
                newline = false;
                break;
            }
            args.push(self.parse_expression()?);
        }
        Ok(Stmt::new(line, StmtKind::Print { args, newline }))
    }

    fn parse_declaration(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let mut names = vec![self.parse_identifier("in variable declaration")?];
        while self.accept(Token::Comma)? {
            names.push(self.parse_identifier("in variable declaration")?);
        }
        let mut values = Vec::new();
        if self.accept(Token::OpAssign)? {
            values.push(self.parse_expression()?);
            while self.accept(Token::Comma)? {
                values.push(self.parse_expression()?);
            }
        }
        if !values.is_empty() && names.len() != values.len() {
            return Err(self.error(
                "Invalid declaration: the number of elements on the left hand side \
                 and right hand side doesn't match",
            ));
        }
        self.expect_separator()?;
        Ok(Stmt::new(line, StmtKind::Local { names, values }))
    }

    fn parse_if_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let mut branches = Vec::new();
        let cond = self.parse_expression()?;
        self.expect(Token::Then, "in \"if\" statement")?;
        let (block, mut ender) = self.parse_if_block()?;
        branches.push((cond, block));
        let mut else_block = None;
        loop {
            match ender {
                Token::Elsif => {
                    self.advance()?;
                    let cond = self.parse_expression()?;
                    self.expect(Token::Then, "in \"elsif\" condition")?;
                    let (block, next) = self.parse_if_block()?;
                    branches.push((cond, block));
                    ender = next;
                }
                Token::Else => {
                    let (block, _) = self.parse_block(&[Token::End])?;
                    else_block = Some(block);
                    break;
                }
                _ => break,
            }
        }
        Ok(Stmt::new(
            line,
            StmtKind::If {
                branches,
                else_block,
            },
        ))
    }

    fn parse_while_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let cond = self.parse_expression()?;
        self.expect(Token::Do, "in while statement")?;
        let (body, _) = self.parse_block(&[Token::End])?;
        Ok(Stmt::new(line, StmtKind::While { cond, body }))
    }

    fn parse_repeat_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let mut body = Vec::new();
        self.skip_separators()?;
        while !self.accept(Token::Until)? {
            if self.check(&Token::Eot)? {
                return Err(self.error("Unexpected end of file in \"repeat\" statement"));
            }
            body.push(self.parse_statement()?);
            self.skip_separators()?;
        }
        // the condition shares the body's scope
        let cond = self.parse_expression()?;
        Ok(Stmt::new(line, StmtKind::Repeat { body, cond }))
    }

    fn parse_for_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let hint = "in for loop";
        let var = self.parse_identifier(hint)?;
        self.expect(Token::OpAssign, hint)?;
        let start = self.parse_expression()?;
        let down = if self.accept(Token::To)? {
            false
        } else if self.accept(Token::Downto)? {
            true
        } else {
            return Err(self.error("Expected \"to\" or \"downto\" in for loop"));
        };
        let end = self.parse_expression()?;
        let step = if self.accept(Token::Step)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Token::Do, hint)?;
        let (body, _) = self.parse_block(&[Token::End])?;
        Ok(Stmt::new(
            line,
            StmtKind::For {
                var,
                start,
                end,
                step,
                down,
                body,
            },
        ))
    }

    fn parse_foreach_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let hint = "in foreach loop";
        let first_ref = self.accept(Token::Ref)?;
        let first = self.parse_identifier(hint)?;
        let (key, value, by_ref) = if self.accept(Token::Comma)? {
            if first_ref {
                return Err(
                    self.error("Key in \"foreach\" loop cannot be grabbed by reference")
                );
            }
            let val_ref = self.accept(Token::Ref)?;
            let val = self.parse_identifier(hint)?;
            (Some(first), val, val_ref)
        } else {
            (None, first, first_ref)
        };
        self.expect(Token::In, hint)?;
        let coll = self.parse_expression()?;
        // the iterator grabs the collection by reference
        let coll = match coll.kind {
            ExprKind::Ref(_) => coll,
            _ => {
                let l = coll.line;
                Expr::new(l, ExprKind::Ref(Box::new(coll)))
            }
        };
        self.expect(Token::Do, hint)?;
        let (body, _) = self.parse_block(&[Token::End])?;
        Ok(Stmt::new(
            line,
            StmtKind::Foreach {
                key,
                value,
                by_ref,
                coll,
                body,
            },
        ))
    }

    fn parse_function_declaration(
        &mut self,
        line: u32,
        local: bool,
    ) -> Result<Stmt, ParseError> {
        let hint = "in function declaration";
        let name = self.parse_identifier(hint)?;
        self.expect(Token::LParen, hint)?;
        let params = self.parse_parameters()?;
        let (body, _) = self.parse_block(&[Token::End])?;
        Ok(Stmt::new(
            line,
            StmtKind::Function {
                local,
                name,
                params,
                body,
            },
        ))
    }

    fn parse_parameters(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if self.accept(Token::RParen)? {
            return Ok(params);
        }
        params.push(self.parse_parameter()?);
        while self.accept(Token::Comma)? {
            params.push(self.parse_parameter()?);
        }
        self.expect(Token::RParen, "in parameter list")?;
        Ok(params)
    }

    fn parse_parameter(&mut self) -> Result<Param, ParseError> {
        let by_ref = self.accept(Token::Ref)?;
        let name = self.parse_identifier("in parameter list")?;
        let ty = if self.accept(Token::As)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Param { name, ty, by_ref })
    }

    fn parse_expression_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let e = self.parse_expression()?;
        if self.accept(Token::OpAssign)? {
            let rhs = self.parse_expression()?;
            return Ok(Stmt::new(
                line,
                StmtKind::Assign {
                    lhs: e,
                    rhs,
                    op: None,
                },
            ));
        }
        let op = match self.peek()?.token {
            Token::OpAssignPlus => Some(AssignOp::Add),
            Token::OpAssignMinus => Some(AssignOp::Sub),
            Token::OpAssignStar => Some(AssignOp::Mul),
            Token::OpAssignSlash => Some(AssignOp::Div),
            Token::OpAssignMod => Some(AssignOp::Mod),
            Token::OpAssignPower => Some(AssignOp::Pow),
            Token::OpAssignConcat => Some(AssignOp::Concat),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let rhs = self.parse_expression()?;
            return Ok(Stmt::new(
                line,
                StmtKind::Assign {
                    lhs: e,
                    rhs,
                    op: Some(op),
                },
            ));
        }
        Ok(Stmt::new(line, StmtKind::Expression(e)))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_conditional_expression()
    }

    fn parse_conditional_expression(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_or_expression()?;
        if self.accept(Token::If)? {
            let line = e.line;
            let cond = self.parse_expression()?;
            self.expect(Token::Else, "in conditional expression")?;
            let else_val = self.parse_expression()?;
            return Ok(Expr::new(
                line,
                ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_val: Box::new(e),
                    else_val: Box::new(else_val),
                },
            ));
        }
        Ok(e)
    }

    fn parse_or_expression(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_and_expression()?;
        if self.accept(Token::Or)? {
            let line = e.line;
            let rhs = self.parse_or_expression()?;
            return Ok(Expr::new(
                line,
                ExprKind::Or {
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            ));
        }
        Ok(e)
    }

    fn parse_and_expression(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_not_expression()?;
        if self.accept(Token::And)? {
            let line = e.line;
            let rhs = self.parse_and_expression()?;
            return Ok(Expr::new(
                line,
                ExprKind::And {
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            ));
        }
        Ok(e)
    }

    fn parse_not_expression(&mut self) -> Result<Expr, ParseError> {
        if self.accept(Token::Not)? {
            let line = self.line();
            let e = self.parse_comp_expression()?;
            return Ok(Expr::new(line, ExprKind::Not(Box::new(e))));
        }
        self.parse_comp_expression()
    }

    fn parse_comp_expression(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_additive_expression()?;
        let op = match self.peek()?.token {
            Token::OpEqual => Some(BinOp::Eq),
            Token::OpNotEqual => Some(BinOp::Ne),
            Token::OpLess => Some(BinOp::Lt),
            Token::OpLessEqual => Some(BinOp::Le),
            Token::OpGreater => Some(BinOp::Gt),
            Token::OpGreaterEqual => Some(BinOp::Ge),
            Token::OpCompare => Some(BinOp::Compare),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let line = e.line;
            let rhs = self.parse_additive_expression()?;
            return Ok(Expr::new(
                line,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            ));
        }
        Ok(e)
    }

    fn parse_additive_expression(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_multiplicative_expression()?;
        if self.accept(Token::OpConcat)? {
            return self.parse_concat_expression(e);
        }
        loop {
            let op = match self.peek()?.token {
                Token::OpPlus => BinOp::Add,
                Token::OpMinus => BinOp::Sub,
                _ => break,
            };
            self.advance()?;
            let line = e.line;
            let rhs = self.parse_multiplicative_expression()?;
            e = Expr::new(
                line,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(e)
    }

    fn parse_concat_expression(&mut self, first: Expr) -> Result<Expr, ParseError> {
        let line = first.line;
        let mut parts = vec![first, self.parse_multiplicative_expression()?];
        while self.accept(Token::OpConcat)? {
            self.skip_empty_lines()?;
            parts.push(self.parse_multiplicative_expression()?);
        }
        Ok(Expr::new(line, ExprKind::Concat(parts)))
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_signed_expression()?;
        loop {
            let op = match self.peek()?.token {
                Token::OpStar => BinOp::Mul,
                Token::OpSlash => BinOp::Div,
                Token::OpMod => BinOp::Mod,
                _ => break,
            };
            self.advance()?;
            let line = e.line;
            let rhs = self.parse_signed_expression()?;
            e = Expr::new(
                line,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(e)
    }

    fn parse_signed_expression(&mut self) -> Result<Expr, ParseError> {
        if self.accept(Token::OpMinus)? {
            let line = self.line();
            let e = self.parse_exponential_expression()?;
            return Ok(Expr::new(line, ExprKind::Neg(Box::new(e))));
        }
        self.parse_exponential_expression()
    }

    fn parse_exponential_expression(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_call_expression()?;
        while self.accept(Token::OpPower)? {
            let line = e.line;
            let rhs = self.parse_call_expression()?;
            e = Expr::new(
                line,
                ExprKind::Binary {
                    op: BinOp::Pow,
                    lhs: Box::new(e),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(e)
    }

    fn parse_call_expression(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_ref_expression()?;
        loop {
            if self.accept(Token::Dot)? {
                let line = e.line;
                let name = self.parse_identifier("in dot expression")?;
                e = Expr::new(
                    line,
                    ExprKind::Field {
                        target: Box::new(e),
                        name,
                    },
                );
            } else if self.accept(Token::LBracket)? {
                let line = e.line;
                let mut indexes = vec![self.parse_expression()?];
                while self.accept(Token::Comma)? {
                    indexes.push(self.parse_expression()?);
                }
                self.expect(Token::RBracket, "in index")?;
                e = Expr::new(
                    line,
                    ExprKind::Index {
                        target: Box::new(e),
                        indexes,
                    },
                );
            } else if self.accept(Token::LParen)? {
                let line = e.line;
                let args = self.parse_arguments()?;
                e = Expr::new(
                    line,
                    ExprKind::Call {
                        callee: Box::new(e),
                        args,
                    },
                );
            } else {
                return Ok(e);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.accept(Token::RParen)? {
            return Ok(args);
        }
        args.push(self.parse_expression()?);
        while self.accept(Token::Comma)? {
            args.push(self.parse_expression()?);
        }
        self.expect(Token::RParen, "in argument list")?;
        Ok(args)
    }

    fn parse_ref_expression(&mut self) -> Result<Expr, ParseError> {
        if self.accept(Token::Ref)? {
            let line = self.line();
            let e = self.parse_expression()?;
            return Ok(Expr::new(line, ExprKind::Ref(Box::new(e))));
        }
        if self.accept(Token::Function)? {
            return self.parse_function_expression();
        }
        self.parse_primary_expression()
    }

    fn parse_function_expression(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        self.expect(Token::LParen, "in function expression")?;
        let params = self.parse_parameters()?;
        let (body, _) = self.parse_block(&[Token::End])?;
        Ok(Expr::new(line, ExprKind::Closure { params, body }))
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let tok = self.peek()?.token.clone();
        match tok {
            Token::Ident(name) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Ident(name)))
            }
            Token::Str(s) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Str(s)))
            }
            Token::Integer(i) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Integer(i)))
            }
            Token::Float(x) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Float(x)))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Null))
            }
            Token::True => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::True))
            }
            Token::False => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::False))
            }
            Token::Nan => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Nan))
            }
            Token::LBracket => {
                self.advance()?;
                self.parse_list_literal(line)
            }
            Token::OpAt => {
                self.advance()?;
                self.expect(Token::LBracket, "in array literal")?;
                self.parse_array_literal(line)
            }
            Token::LBrace => {
                self.advance()?;
                self.parse_table_literal(line)
            }
            Token::LParen => {
                self.advance()?;
                let e = self.parse_expression()?;
                self.expect(Token::RParen, "in parenthesized expression")?;
                Ok(e)
            }
            other => Err(self.error(format!("Invalid primary expression near '{other}'"))),
        }
    }

    fn parse_list_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.skip_empty_lines()?;
        if self.accept(Token::RBracket)? {
            return Ok(Expr::new(line, ExprKind::List(Vec::new())));
        }
        let mut items = vec![self.parse_expression()?];
        self.skip_empty_lines()?;
        while self.accept(Token::Comma)? {
            self.skip_empty_lines()?;
            items.push(self.parse_expression()?);
            self.skip_empty_lines()?;
        }
        self.expect(Token::RBracket, "at the end of list literal")?;
        Ok(Expr::new(line, ExprKind::List(items)))
    }

    fn parse_array_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.skip_empty_lines()?;
        if self.accept(Token::RBracket)? {
            return Ok(Expr::new(
                line,
                ExprKind::Array {
                    items: Vec::new(),
                    nrow: 0,
                    ncol: 0,
                },
            ));
        }
        let mut items = vec![self.parse_expression()?];
        self.skip_empty_lines()?;
        let mut prev_ncol: Option<usize> = None;
        let mut ncol = 1usize;
        let mut nrow = 1usize;
        loop {
            if self.accept(Token::Semi)? {
                if prev_ncol.is_some_and(|p| p != ncol) {
                    return Err(
                        self.error("Inconsistent number of columns in array literal")
                    );
                }
                nrow += 1;
                prev_ncol = Some(ncol);
                ncol = 0;
            } else if !self.accept(Token::Comma)? {
                break;
            }
            self.skip_empty_lines()?;
            items.push(self.parse_expression()?);
            ncol += 1;
            self.skip_empty_lines()?;
        }
        if prev_ncol.is_some_and(|p| p != ncol) {
            return Err(self.error("Inconsistent number of columns in array literal"));
        }
        self.expect(Token::RBracket, "in array literal")?;
        Ok(Expr::new(line, ExprKind::Array { items, nrow, ncol }))
    }

    fn parse_table_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        let hint = "in table literal";
        self.skip_empty_lines()?;
        if self.accept(Token::RBrace)? {
            return Ok(Expr::new(line, ExprKind::Table(Vec::new())));
        }
        let first = self.parse_expression()?;
        if self.accept(Token::Colon)? {
            let mut pairs = vec![(first, self.parse_expression()?)];
            while self.accept(Token::Comma)? {
                self.skip_empty_lines()?;
                let key = self.parse_expression()?;
                self.expect(Token::Colon, hint)?;
                pairs.push((key, self.parse_expression()?));
            }
            self.skip_empty_lines()?;
            self.expect(Token::RBrace, hint)?;
            Ok(Expr::new(line, ExprKind::Table(pairs)))
        } else {
            let mut items = vec![first];
            while self.accept(Token::Comma)? {
                self.skip_empty_lines()?;
                items.push(self.parse_expression()?);
            }
            self.skip_empty_lines()?;
            self.expect(Token::RBrace, "in set literal")?;
            Ok(Expr::new(line, ExprKind::Set(items)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src).parse().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        Parser::new(src).parse().unwrap_err()
    }

    #[test]
    fn test_local_declaration() {
        let prog = parse("local x, y = 1, 2\n");
        assert_eq!(prog.stmts.len(), 1);
        match &prog.stmts[0].kind {
            StmtKind::Local { names, values } => {
                assert_eq!(names, &["x", "y"]);
                assert_eq!(values.len(), 2);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_declaration_arity_mismatch() {
        let err = parse_err("local x, y = 1\n");
        assert!(err.message.contains("declaration"));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let prog = parse("x = 1 + 2 * 3\n");
        match &prog.stmts[0].kind {
            StmtKind::Assign { rhs, .. } => match &rhs.kind {
                ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                    assert!(matches!(
                        rhs.kind,
                        ExprKind::Binary { op: BinOp::Mul, .. }
                    ));
                }
                other => panic!("unexpected rhs: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_concat_chain_is_flattened() {
        let prog = parse("x = a & b & c\n");
        match &prog.stmts[0].kind {
            StmtKind::Assign { rhs, .. } => match &rhs.kind {
                ExprKind::Concat(parts) => assert_eq!(parts.len(), 3),
                other => panic!("unexpected rhs: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_compound_assignment() {
        let prog = parse("x += 1\n");
        assert!(matches!(
            prog.stmts[0].kind,
            StmtKind::Assign {
                op: Some(AssignOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn test_if_elsif_else() {
        let prog = parse("if a then\npass\nelsif b then\npass\nelse\npass\nend\n");
        match &prog.stmts[0].kind {
            StmtKind::If {
                branches,
                else_block,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(else_block.is_some());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_for_loop() {
        let prog = parse("for i = 1 to 10 step 2 do\npass\nend\n");
        match &prog.stmts[0].kind {
            StmtKind::For { var, step, down, .. } => {
                assert_eq!(var, "i");
                assert!(step.is_some());
                assert!(!down);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        let prog = parse("for i = 10 downto 1 do\npass\nend\n");
        assert!(matches!(
            prog.stmts[0].kind,
            StmtKind::For { down: true, .. }
        ));
    }

    #[test]
    fn test_foreach_forms() {
        let prog = parse("foreach v in lst do\npass\nend\n");
        match &prog.stmts[0].kind {
            StmtKind::Foreach { key, value, coll, .. } => {
                assert!(key.is_none());
                assert_eq!(value, "v");
                assert!(matches!(coll.kind, ExprKind::Ref(_)));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        let prog = parse("foreach k, ref v in tab do\npass\nend\n");
        assert!(matches!(
            prog.stmts[0].kind,
            StmtKind::Foreach {
                key: Some(_),
                by_ref: true,
                ..
            }
        ));
    }

    #[test]
    fn test_foreach_ref_key_rejected() {
        let err = parse_err("foreach ref k, v in tab do\npass\nend\n");
        assert!(err.message.contains("reference"));
    }

    #[test]
    fn test_function_declaration() {
        let prog = parse("function add(x as Integer, ref y)\nreturn x\nend\n");
        match &prog.stmts[0].kind {
            StmtKind::Function { local, name, params, .. } => {
                assert!(!local);
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(params[0].ty.is_some());
                assert!(params[1].by_ref);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_conditional_expression() {
        let prog = parse("x = 1 if flag else 2\n");
        assert!(matches!(
            prog.stmts[0].kind,
            StmtKind::Assign { ref rhs, .. }
                if matches!(rhs.kind, ExprKind::Conditional { .. })
        ));
    }

    #[test]
    fn test_print_trailing_comma() {
        let prog = parse("print x, y,\n");
        match &prog.stmts[0].kind {
            StmtKind::Print { args, newline } => {
                assert_eq!(args.len(), 2);
                assert!(!newline);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_table_and_set_literals() {
        let prog = parse("x = {\"a\": 1, \"b\": 2}\ny = {1, 2, 3}\nz = {}\n");
        assert!(matches!(
            prog.stmts[0].kind,
            StmtKind::Assign { ref rhs, .. } if matches!(rhs.kind, ExprKind::Table(_))
        ));
        assert!(matches!(
            prog.stmts[1].kind,
            StmtKind::Assign { ref rhs, .. } if matches!(rhs.kind, ExprKind::Set(_))
        ));
        assert!(matches!(
            prog.stmts[2].kind,
            StmtKind::Assign { ref rhs, .. }
                if matches!(rhs.kind, ExprKind::Table(ref p) if p.is_empty())
        ));
    }

    #[test]
    fn test_array_literal() {
        let prog = parse("m = @[1, 2; 3, 4]\n");
        match &prog.stmts[0].kind {
            StmtKind::Assign { rhs, .. } => match &rhs.kind {
                ExprKind::Array { items, nrow, ncol } => {
                    assert_eq!(items.len(), 4);
                    assert_eq!((*nrow, *ncol), (2, 2));
                }
                other => panic!("unexpected rhs: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_array_literal_ragged_rows() {
        let err = parse_err("m = @[1, 2; 3]\n");
        assert!(err.message.contains("columns"));
    }

    #[test]
    fn test_option_debug() {
        let prog = parse("option debug\npass\n");
        assert!(prog.debug);
        let prog = parse("option debug = false\npass\n");
        assert!(!prog.debug);
    }

    #[test]
    fn test_method_call_chain() {
        let prog = parse("s.append(\"x\").trim()\n");
        match &prog.stmts[0].kind {
            StmtKind::Expression(e) => {
                assert!(matches!(e.kind, ExprKind::Call { .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_repeat_until() {
        let prog = parse("repeat\nx += 1\nuntil x > 3\n");
        assert!(matches!(prog.stmts[0].kind, StmtKind::Repeat { .. }));
    }
}
