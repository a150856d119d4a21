//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `ty` resolves source-level type names to storage widths and suffixes.
//! - `symbols` maps names to storage slots within the current function.
//! - `codegen` lowers the program into stack-machine assembly text.
//! - `error` centralises the error types shared by the other modules.

pub mod error;
pub mod parser;
pub mod symbols;
pub mod tokenizer;
pub mod ty;

mod codegen;

pub use error::{CompileError, CompileResult};

/// Compile a source string into stack-machine assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens)?;
  codegen::generate(&program)
}
