//! Shared error types used across the compilation pipeline.
//!
//! Every error is fatal: the stage that detects a violation returns it
//! immediately and the driver terminates the process. Nothing here is
//! recoverable or accumulated, so the variants map one-to-one onto the
//! points of detection.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CompileError {
  /// A character with no meaning in the language.
  #[snafu(display("{line}: unexpected symbol: {symbol}"))]
  UnexpectedSymbol { symbol: char, line: usize },

  #[snafu(display("{line}: unterminated string literal"))]
  UnterminatedString { line: usize },

  #[snafu(display("{line}: unterminated character literal"))]
  UnterminatedChar { line: usize },

  /// A `!`, `&`, or `|` that is not the start of `!=`, `&&`, or `||`.
  #[snafu(display("{line}: malformed operator: {symbol}"))]
  MalformedOperator { symbol: char, line: usize },

  #[snafu(display("{line}: unexpected token: {token}"))]
  UnexpectedToken { token: String, line: usize },

  #[snafu(display("unexpected eof"))]
  UnexpectedEof,

  #[snafu(display("unknown type: {name}"))]
  UnknownType { name: String },

  #[snafu(display("function argument redefined: {name}"))]
  ParameterRedefined { name: String },

  #[snafu(display("variable redefined: {name}"))]
  VariableRedefined { name: String },

  #[snafu(display("attempt to assign undeclared variable: {name}"))]
  UndeclaredAssign { name: String },

  #[snafu(display("{name} used before declaration"))]
  UndeclaredIdent { name: String },

  #[snafu(display("cannot load value of type void"))]
  VoidLoad,

  #[snafu(display("type mismatch: {name}"))]
  TypeMismatch { name: String },

  #[snafu(display("unexpected return expression, function type is void"))]
  VoidReturnValue,

  #[snafu(display("missing return expression, function type is not void"))]
  MissingReturnValue,
}
