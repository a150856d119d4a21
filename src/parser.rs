//! Recursive-descent parser producing the program AST.
//!
//! Statements and declarations are handled by plain recursive descent with
//! one to three tokens of lookahead; expressions use precedence climbing so
//! the whole operator table lives in two small functions. The parser never
//! backtracks except for the fixed-pattern peek that separates definitions
//! from assignments.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
  LogicalAnd,
  LogicalOr,
}

/// A source-level type exactly as written: a name plus an optional `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
  pub name: String,
  pub pointer: bool,
}

/// A type/name pair: function signatures, parameters and definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
  pub ty: Type,
  pub name: String,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
  Number(i64),
  Str(String),
  Char(String),
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Value(Value),
  Ident(String),
  Call {
    name: String,
    args: Vec<Expr>,
  },
}

impl Expr {
  pub fn number(value: i64) -> Self {
    Self::Value(Value::Number(value))
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
  Definition { decl: Declaration, expr: Expr },
  Assign { name: String, expr: Expr },
  Expr(Expr),
  If { cond: Expr, body: Vec<Statement> },
  While { cond: Expr, body: Vec<Statement> },
  Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub decl: Declaration,
  pub params: Vec<Declaration>,
  pub body: Vec<Statement>,
}

/// Functions in declaration order; emission preserves this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  pub funcs: Vec<Function>,
}

/// Parse the token stream into a program, consuming every token.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let mut funcs = Vec::new();

  while !stream.is_eof() {
    funcs.push(parse_function(&mut stream)?);
  }

  Ok(Program { funcs })
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<Function> {
  let decl = parse_declaration(stream)?;

  stream.expect(TokenKind::LParen)?;
  let mut params = Vec::new();
  if !stream.check(TokenKind::RParen) {
    loop {
      params.push(parse_declaration(stream)?);
      if !stream.check(TokenKind::Comma) {
        break;
      }
    }
    stream.expect(TokenKind::RParen)?;
  }

  stream.expect(TokenKind::LBrace)?;
  let body = parse_statements(stream)?;
  stream.expect(TokenKind::RBrace)?;

  Ok(Function { decl, params, body })
}

fn parse_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let name = stream.expect(TokenKind::Ident)?.value.unwrap_or_default();
  let pointer = stream.check(TokenKind::Star);
  Ok(Type { name, pointer })
}

fn parse_declaration(stream: &mut TokenStream) -> CompileResult<Declaration> {
  let ty = parse_type(stream)?;
  let name = stream.expect(TokenKind::Ident)?.value.unwrap_or_default();
  Ok(Declaration { ty, name })
}

/// Parse statements until a token that cannot start one; the caller owns the
/// surrounding braces.
fn parse_statements(stream: &mut TokenStream) -> CompileResult<Vec<Statement>> {
  let mut stmts = Vec::new();

  loop {
    if stream.keyword("if") {
      let cond = parse_expr(stream, 0)?;
      stream.expect(TokenKind::LBrace)?;
      let body = parse_statements(stream)?;
      stream.expect(TokenKind::RBrace)?;
      stmts.push(Statement::If { cond, body });
    } else if stream.keyword("while") {
      let cond = parse_expr(stream, 0)?;
      stream.expect(TokenKind::LBrace)?;
      let body = parse_statements(stream)?;
      stream.expect(TokenKind::RBrace)?;
      stmts.push(Statement::While { cond, body });
    } else if stream.keyword("return") {
      let expr = if stream.check(TokenKind::Semicolon) {
        None
      } else {
        let expr = parse_expr(stream, 0)?;
        stream.expect(TokenKind::Semicolon)?;
        Some(expr)
      };
      stmts.push(Statement::Return(expr));
    } else if stream.lookahead(&[TokenKind::Ident, TokenKind::Ident])
      || stream.lookahead(&[TokenKind::Ident, TokenKind::Star, TokenKind::Ident])
    {
      let decl = parse_declaration(stream)?;
      stream.expect(TokenKind::Equal)?;
      let expr = parse_expr(stream, 0)?;
      stream.expect(TokenKind::Semicolon)?;
      stmts.push(Statement::Definition { decl, expr });
    } else if stream.lookahead(&[TokenKind::Ident, TokenKind::Equal]) {
      let name = stream.expect(TokenKind::Ident)?.value.unwrap_or_default();
      stream.expect(TokenKind::Equal)?;
      let expr = parse_expr(stream, 0)?;
      stream.expect(TokenKind::Semicolon)?;
      stmts.push(Statement::Assign { name, expr });
    } else if stream.peek().is_some_and(|t| starts_expr(t.kind)) {
      let expr = parse_expr(stream, 0)?;
      stream.expect(TokenKind::Semicolon)?;
      stmts.push(Statement::Expr(expr));
    } else {
      break;
    }
  }

  Ok(stmts)
}

fn starts_expr(kind: TokenKind) -> bool {
  matches!(
    kind,
    TokenKind::Number
      | TokenKind::Str
      | TokenKind::CharLit
      | TokenKind::LParen
      | TokenKind::Ident
  )
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
  match kind {
    TokenKind::Plus => Some(BinaryOp::Add),
    TokenKind::Minus => Some(BinaryOp::Sub),
    TokenKind::Star => Some(BinaryOp::Mul),
    TokenKind::Slash => Some(BinaryOp::Div),
    TokenKind::Lt => Some(BinaryOp::Lt),
    TokenKind::Le => Some(BinaryOp::Le),
    TokenKind::Gt => Some(BinaryOp::Gt),
    TokenKind::Ge => Some(BinaryOp::Ge),
    TokenKind::Equality => Some(BinaryOp::Eq),
    TokenKind::NotEquality => Some(BinaryOp::Ne),
    TokenKind::LogicalAnd => Some(BinaryOp::LogicalAnd),
    TokenKind::LogicalOr => Some(BinaryOp::LogicalOr),
    _ => None,
  }
}

fn precedence(op: BinaryOp) -> u8 {
  match op {
    BinaryOp::LogicalOr => 2,
    BinaryOp::LogicalAnd => 3,
    BinaryOp::Eq | BinaryOp::Ne => 4,
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 8,
    BinaryOp::Add | BinaryOp::Sub => 9,
    BinaryOp::Mul | BinaryOp::Div => 10,
  }
}

/// Precedence climbing. Operators at the current binding power are folded in
/// a loop rather than by recursing, so equal precedence associates left.
fn parse_expr(stream: &mut TokenStream, min_bp: u8) -> CompileResult<Expr> {
  let mut node = parse_prefix(stream)?;

  while let Some(op) = stream.peek().and_then(|t| binary_op(t.kind)) {
    let bp = precedence(op);
    if bp <= min_bp {
      break;
    }
    stream.advance();

    let rhs = parse_expr(stream, bp)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_prefix(stream: &mut TokenStream) -> CompileResult<Expr> {
  let token = stream.next()?;

  match token.kind {
    TokenKind::Number => {
      let text = token.value.unwrap_or_default();
      let value = text.parse::<i64>().map_err(|_| CompileError::UnexpectedToken {
        token: text,
        line: token.line,
      })?;
      Ok(Expr::number(value))
    }
    TokenKind::Str => Ok(Expr::Value(Value::Str(token.value.unwrap_or_default()))),
    TokenKind::CharLit => Ok(Expr::Value(Value::Char(token.value.unwrap_or_default()))),
    TokenKind::LParen => {
      let node = parse_expr(stream, 0)?;
      stream.expect(TokenKind::RParen)?;
      Ok(node)
    }
    TokenKind::Ident => {
      let name = token.value.unwrap_or_default();
      if stream.check(TokenKind::LParen) {
        let mut args = Vec::new();
        if !stream.check(TokenKind::RParen) {
          loop {
            args.push(parse_expr(stream, 0)?);
            if !stream.check(TokenKind::Comma) {
              break;
            }
          }
          stream.expect(TokenKind::RParen)?;
        }
        Ok(Expr::Call { name, args })
      } else {
        Ok(Expr::Ident(name))
      }
    }
    _ => Err(unexpected(&token)),
  }
}

fn unexpected(token: &Token) -> CompileError {
  CompileError::UnexpectedToken {
    token: token.describe(),
    line: token.line,
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  /// Take the current token; running into the end of input is an error.
  fn next(&mut self) -> CompileResult<Token> {
    match self.tokens.get(self.pos) {
      None => Err(CompileError::UnexpectedEof),
      Some(token) if token.kind == TokenKind::Eof => Err(CompileError::UnexpectedEof),
      Some(token) => {
        let token = token.clone();
        self.pos += 1;
        Ok(token)
      }
    }
  }

  /// Consume the current token if it has the wanted kind.
  fn check(&mut self, kind: TokenKind) -> bool {
    if self.peek().is_some_and(|t| t.kind == kind) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
    match self.tokens.get(self.pos) {
      Some(token) if token.kind == kind => {
        let token = token.clone();
        self.pos += 1;
        Ok(token)
      }
      Some(token) if token.kind == TokenKind::Eof => Err(CompileError::UnexpectedEof),
      Some(token) => Err(unexpected(token)),
      None => Err(CompileError::UnexpectedEof),
    }
  }

  /// Consume the current token if it is the given keyword.
  fn keyword(&mut self, word: &str) -> bool {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Keyword
      && token.value.as_deref() == Some(word)
    {
      self.pos += 1;
      return true;
    }
    false
  }

  /// Peek a fixed pattern of token kinds without consuming anything.
  fn lookahead(&self, kinds: &[TokenKind]) -> bool {
    kinds
      .iter()
      .enumerate()
      .all(|(n, kind)| self.tokens.get(self.pos + n).is_some_and(|t| t.kind == *kind))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|t| t.kind), Some(TokenKind::Eof) | None)
  }
}
