//! Parser for the reference dialect
//!
//! Recursive descent over the token stream, producing a tree walked
//! directly by the interpreter.

use super::{STACK_RED_ZONE, STACK_SEGMENT};
use super::lexer::{Spanned, Token, tokenize};
use crate::error::ScriptError;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    Undefined,
    Ident(Rc<str>),
    This,
    Member(Box<Expr>, Rc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Function(Rc<FunctionDecl>),
    Object(Vec<(Rc<str>, Expr)>),
    Array(Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let(Rc<str>, Option<Expr>),
    Expr(Expr),
    Throw(Expr),
    Return(Option<Expr>),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    While(Expr, Vec<Stmt>),
    Try {
        body: Vec<Stmt>,
        param: Option<Rc<str>>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
}

/// A function literal
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Stmt>,
    pub source_url: Rc<str>,
    pub line: u32,
}

/// A parsed script
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub source_url: Rc<str>,
}

pub fn parse(source: &str, source_url: &str, line: u32) -> Result<Program, ScriptError> {
    let tokens = tokenize(source, line).map_err(|e| e.at(source_url, line))?;
    let url: Rc<str> = Rc::from(source_url);
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        source_url: url.clone(),
    };
    let mut body = Vec::new();
    while !parser.check(&Token::Eof) {
        body.push(parser.statement().map_err(|e| e.at(source_url, 0))?);
    }
    Ok(Program { body, source_url: url })
}

/// Deepest statement or expression nesting accepted
pub const MAX_NESTING: usize = 1024;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Current nesting, counting left-folded operands
    depth: usize,
    source_url: Rc<str>,
}

impl Parser {
    /// Account for one more level of nesting
    fn deepen(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a recursive production one level deeper
    fn nested<T>(&mut self, production: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        self.deepen()?;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || production(self));
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == expected
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ScriptError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}, found {:?}", expected, self.peek())))
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::syntax(message).with_line(self.line())
    }

    fn ident(&mut self) -> Result<Rc<str>, ScriptError> {
        match self.advance() {
            Token::Ident(name) => Ok(Rc::from(name.as_str())),
            other => Err(self.error(&format!("expected identifier, found {:?}", other))),
        }
    }

    // Statements

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::statement_kind)
    }

    fn statement_kind(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let kind = match self.peek() {
            Token::Let => {
                self.advance();
                let name = self.ident()?;
                let init = if self.eat(&Token::Eq) {
                    Some(self.expression()?)
                } else {
                    None
                };
                StmtKind::Let(name, init)
            }
            Token::Function if matches!(self.tokens.get(self.pos + 1).map(|t| &t.token), Some(Token::Ident(_))) => {
                let decl = self.function()?;
                let name = decl.name.clone().unwrap_or_else(|| Rc::from(""));
                StmtKind::Let(name, Some(Expr::Function(decl)))
            }
            Token::Throw => {
                self.advance();
                StmtKind::Throw(self.expression()?)
            }
            Token::Return => {
                self.advance();
                if matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::Eof) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expression()?))
                }
            }
            Token::If => {
                self.advance();
                self.expect(Token::LParen)?;
                let test = self.expression()?;
                self.expect(Token::RParen)?;
                let consequent = self.body()?;
                let alternate = if self.eat(&Token::Else) {
                    if self.check(&Token::If) {
                        vec![self.statement()?]
                    } else {
                        self.body()?
                    }
                } else {
                    Vec::new()
                };
                StmtKind::If(test, consequent, alternate)
            }
            Token::While => {
                self.advance();
                self.expect(Token::LParen)?;
                let test = self.expression()?;
                self.expect(Token::RParen)?;
                StmtKind::While(test, self.body()?)
            }
            Token::Try => {
                self.advance();
                let body = self.block()?;
                let mut param = None;
                let mut handler = None;
                if self.eat(&Token::Catch) {
                    if self.eat(&Token::LParen) {
                        param = Some(self.ident()?);
                        self.expect(Token::RParen)?;
                    }
                    handler = Some(self.block()?);
                }
                let finalizer = if self.eat(&Token::Finally) {
                    Some(self.block()?)
                } else {
                    None
                };
                if handler.is_none() && finalizer.is_none() {
                    return Err(self.error("missing catch or finally after try"));
                }
                StmtKind::Try {
                    body,
                    param,
                    handler,
                    finalizer,
                }
            }
            Token::LBrace => StmtKind::Block(self.block()?),
            _ => StmtKind::Expr(self.expression()?),
        };
        self.eat(&Token::Semicolon);
        Ok(Stmt { kind, line })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.error("unterminated block"));
            }
            stmts.push(self.statement()?);
        }
        self.advance();
        Ok(stmts)
    }

    /// A braced block or a single statement
    fn body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if self.check(&Token::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn function(&mut self) -> Result<Rc<FunctionDecl>, ScriptError> {
        let line = self.line();
        self.expect(Token::Function)?;
        let name = match self.peek() {
            Token::Ident(_) => Some(self.ident()?),
            _ => None,
        };
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.ident()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body,
            source_url: self.source_url.clone(),
            line,
        }))
    }

    // Expressions

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        let target = self.logical_or()?;
        if !self.check(&Token::Eq) {
            return Ok(target);
        }
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.expression()?;
        Ok(Expr::Assign(Box::new(target), Box::new(value)))
    }

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.logical_and()?;
        while self.eat(&Token::PipePipe) {
            self.deepen()?;
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.equality()?;
        while self.eat(&Token::AmpAmp) {
            self.deepen()?;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEqEq => BinOp::StrictEq,
                Token::BangEqEq => BinOp::StrictNe,
                Token::EqEq => BinOp::LooseEq,
                Token::BangEq => BinOp::LooseNe,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::LtEq => BinOp::LtEq,
                Token::Gt => BinOp::Gt,
                Token::GtEq => BinOp::GtEq,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            self.deepen()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::TypeOf => UnaryOp::TypeOf,
            _ => return self.postfix(),
        };
        self.advance();
        Ok(Expr::Unary(op, Box::new(self.nested(Self::unary)?)))
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mark = self.depth;
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.deepen()?;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    // Keywords are valid property names
                    let name = match self.advance() {
                        Token::Ident(name) => Rc::from(name.as_str()),
                        Token::Catch => Rc::from("catch"),
                        Token::Finally => Rc::from("finally"),
                        other => return Err(self.error(&format!("expected property name, found {:?}", other))),
                    };
                    expr = Expr::Member(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    self.advance();
                    let args = self.list(Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => {
                    self.depth = mark;
                    return Ok(expr);
                }
            }
        }
    }

    /// Comma separated expressions up to `close`, trailing comma allowed
    fn list(&mut self, close: Token) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Str(Rc::from(s.as_str())))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Undefined => {
                self.advance();
                Ok(Expr::Undefined)
            }
            Token::This => {
                self.advance();
                Ok(Expr::This)
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(Rc::from(name.as_str())))
            }
            Token::Function => Ok(Expr::Function(self.function()?)),
            Token::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                Ok(Expr::Array(self.list(Token::RBracket)?))
            }
            Token::LBrace => {
                self.advance();
                let mut props = Vec::new();
                while !self.check(&Token::RBrace) {
                    let key: Rc<str> = match self.advance() {
                        Token::Ident(name) | Token::String(name) => Rc::from(name.as_str()),
                        Token::Number(n) => Rc::from(crate::value::format_number(n).as_str()),
                        other => return Err(self.error(&format!("expected property key, found {:?}", other))),
                    };
                    self.expect(Token::Colon)?;
                    props.push((key, self.expression()?));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Object(props))
            }
            other => Err(self.error(&format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        parse(source, "test.js", 1).unwrap().body
    }

    #[test]
    fn test_optional_semicolons() {
        let body = parse_ok("let a = 1\nlet b = 2;\na = b");
        assert_eq!(body.len(), 3);
        assert_eq!(body[2].line, 3);
    }

    #[test]
    fn test_precedence() {
        let body = parse_ok("1 + 2 === 3");
        let StmtKind::Expr(Expr::Binary(BinOp::StrictEq, left, _)) = &body[0].kind else {
            panic!("unexpected {:?}", body[0]);
        };
        assert!(matches!(**left, Expr::Binary(BinOp::Add, _, _)));
    }

    #[test]
    fn test_function_declaration() {
        let body = parse_ok("function add(a, b) { return a + b }");
        let StmtKind::Let(name, Some(Expr::Function(decl))) = &body[0].kind else {
            panic!("unexpected {:?}", body[0]);
        };
        assert_eq!(&**name, "add");
        assert_eq!(decl.params.len(), 2);
    }

    #[test]
    fn test_promise_catch_member() {
        let body = parse_ok("p.then(function (v) { }).catch(function (e) { })");
        assert!(matches!(body[0].kind, StmtKind::Expr(Expr::Call(..))));
    }

    #[test]
    fn test_try_catch() {
        let body = parse_ok("try { throw 1 } catch (e) { e } finally { 2 }");
        assert!(matches!(
            &body[0].kind,
            StmtKind::Try { param: Some(_), handler: Some(_), finalizer: Some(_), .. }
        ));
    }

    #[test]
    fn test_syntax_error_has_location() {
        let err = parse("let = 4", "bad.js", 7).unwrap_err();
        assert_eq!(err.name, "SyntaxError");
        assert_eq!(err.source_url, "bad.js");
        assert_eq!(err.line, 7);
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 = 2", "t.js", 1).is_err());
    }

    #[test]
    fn test_deep_parentheses_are_a_syntax_error() {
        let source = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&source, "deep.js", 1).unwrap_err();
        assert_eq!(err.name, "SyntaxError");
        assert!(err.message.contains("nesting too deep"));
    }

    #[test]
    fn test_deep_blocks_and_unary_chains_are_rejected() {
        let blocks = format!("{}{}", "{".repeat(100_000), "}".repeat(100_000));
        assert_eq!(parse(&blocks, "t.js", 1).unwrap_err().name, "SyntaxError");
        let unary = format!("{}1", "!".repeat(100_000));
        assert_eq!(parse(&unary, "t.js", 1).unwrap_err().name, "SyntaxError");
    }

    #[test]
    fn test_long_operator_chain_is_bounded() {
        let long = vec!["1"; 100_000].join(" + ");
        assert_eq!(parse(&long, "t.js", 1).unwrap_err().name, "SyntaxError");
        let calls = format!("f{}", "()".repeat(100_000));
        assert_eq!(parse(&calls, "t.js", 1).unwrap_err().name, "SyntaxError");
    }

    #[test]
    fn test_nesting_within_limit_parses() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        parse_ok(&source);
        let chain = vec!["1"; 500].join(" + ");
        parse_ok(&chain);
    }
}
