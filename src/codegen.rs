//! Code generation: lower the parsed AST into stack-machine assembly text.
//!
//! Every expression leaves exactly one value on the operand stack and every
//! semantic action emits one instruction. Locals live in numbered stack
//! slots allocated per function; jump labels and string-data names are
//! numbered monotonically for the whole run so they never collide.

use crate::error::{CompileError, CompileResult};
use crate::parser::{BinaryOp, Declaration, Expr, Function, Program, Statement, Value};
use crate::symbols::{Symbol, SymbolTable};
use crate::ty::{self, TypeInfo};

/// Typing context threaded through expression lowering.
///
/// With a type established, every sub-expression is emitted with that
/// type's suffix and disagreeing identifiers are a type mismatch. With the
/// capture flag set instead, the first identifier resolved inside the
/// expression decides the type for its siblings.
#[derive(Debug, Clone, Copy)]
struct ExprContext {
  ty: Option<TypeInfo>,
  capture: bool,
}

impl ExprContext {
  fn typed(ty: TypeInfo) -> Self {
    Self {
      ty: Some(ty),
      capture: false,
    }
  }

  fn capturing() -> Self {
    Self {
      ty: None,
      capture: true,
    }
  }

  fn opext(&self) -> &'static str {
    self.ty.map_or("", |ty| ty.opext)
  }
}

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut generator = Codegen::new();
  generator.emit_program(program)?;
  Ok(generator.asm)
}

/// All mutable generation state for one run. The symbol table and the slot
/// counter reset at each function; labels and string names never do.
struct Codegen {
  symbols: SymbolTable,
  locals: u32,
  labels: u32,
  strings: u32,
  asm: String,
}

impl Codegen {
  fn new() -> Self {
    Self {
      symbols: SymbolTable::new(),
      locals: 0,
      labels: 0,
      strings: 0,
      asm: String::new(),
    }
  }

  fn next_label(&mut self) -> u32 {
    let label = self.labels;
    self.labels += 1;
    label
  }

  fn emit_program(&mut self, program: &Program) -> CompileResult<()> {
    self.asm.push_str(".entry main\n\n");

    for func in &program.funcs {
      self.emit_function(func)?;
      self.asm.push('\n');
    }

    Ok(())
  }

  fn emit_function(&mut self, func: &Function) -> CompileResult<()> {
    let fntype = ty::resolve(&func.decl.ty)?;

    self.symbols.reset();
    self.locals = 0;
    for param in &func.params {
      let ty = ty::resolve(&param.ty)?;
      let slot = self.locals;
      self.locals += ty.slots;

      if self.symbols.lookup(&param.name).is_some() {
        return Err(CompileError::ParameterRedefined {
          name: param.name.clone(),
        });
      }
      self.symbols.insert(Symbol {
        name: param.name.clone(),
        slot,
        ty,
      });
    }

    self.asm.push_str(&format!("{}:\n", func.decl.name));
    for stmt in &func.body {
      self.emit_statement(&fntype, stmt)?;
    }

    Ok(())
  }

  fn emit_statement(&mut self, fntype: &TypeInfo, stmt: &Statement) -> CompileResult<()> {
    match stmt {
      Statement::Definition { decl, expr } => self.emit_definition(decl, expr),
      Statement::Assign { name, expr } => self.emit_assign(name, expr),
      Statement::Expr(expr) => self.emit_expr_statement(expr),
      Statement::If { cond, body } => self.emit_if(fntype, cond, body),
      Statement::While { cond, body } => self.emit_while(fntype, cond, body),
      Statement::Return(expr) => self.emit_return(fntype, expr.as_ref()),
    }
  }

  fn emit_definition(&mut self, decl: &Declaration, expr: &Expr) -> CompileResult<()> {
    let ty = ty::resolve(&decl.ty)?;
    let slot = self.locals;
    self.locals += ty.slots;

    if self.symbols.lookup(&decl.name).is_some() {
      return Err(CompileError::VariableRedefined {
        name: decl.name.clone(),
      });
    }
    self.symbols.insert(Symbol {
      name: decl.name.clone(),
      slot,
      ty,
    });

    let mut ctx = ExprContext::typed(ty);
    self.emit_expr(&mut ctx, expr)?;
    self.asm.push_str(&format!("store{} {}\n", ty.opext, slot));

    Ok(())
  }

  fn emit_assign(&mut self, name: &str, expr: &Expr) -> CompileResult<()> {
    let Some(symbol) = self.symbols.lookup(name) else {
      return Err(CompileError::UndeclaredAssign {
        name: name.to_string(),
      });
    };
    let (slot, ty) = (symbol.slot, symbol.ty);

    let mut ctx = ExprContext::typed(ty);
    self.emit_expr(&mut ctx, expr)?;
    self.asm.push_str(&format!("store{} {}\n", ty.opext, slot));

    Ok(())
  }

  fn emit_expr_statement(&mut self, expr: &Expr) -> CompileResult<()> {
    let mut ctx = ExprContext::capturing();
    self.emit_expr(&mut ctx, expr)
  }

  fn emit_if(&mut self, fntype: &TypeInfo, cond: &Expr, body: &[Statement]) -> CompileResult<()> {
    let mut ctx = ExprContext::capturing();
    self.emit_expr(&mut ctx, cond)?;
    let opext = ctx.opext();

    let done = self.next_label();
    self.asm.push_str(&format!("push{opext} 0\n"));
    self.asm.push_str(&format!("cmp{opext}\n"));
    self.asm.push_str(&format!("jmp.eq l{done}\n"));
    for stmt in body {
      self.emit_statement(fntype, stmt)?;
    }
    self.asm.push_str(&format!("l{done}:\n"));

    Ok(())
  }

  fn emit_while(&mut self, fntype: &TypeInfo, cond: &Expr, body: &[Statement]) -> CompileResult<()> {
    let start = self.next_label();
    self.asm.push_str(&format!("l{start}:\n"));

    let mut ctx = ExprContext::capturing();
    self.emit_expr(&mut ctx, cond)?;
    let opext = ctx.opext();

    let done = self.next_label();
    self.asm.push_str(&format!("push{opext} 0\n"));
    self.asm.push_str(&format!("cmp{opext}\n"));
    self.asm.push_str(&format!("jmp.eq l{done}\n"));
    for stmt in body {
      self.emit_statement(fntype, stmt)?;
    }
    self.asm.push_str(&format!("jmp l{start}\n"));
    self.asm.push_str(&format!("l{done}:\n"));

    Ok(())
  }

  fn emit_return(&mut self, fntype: &TypeInfo, expr: Option<&Expr>) -> CompileResult<()> {
    if fntype.is_void() && expr.is_some() {
      return Err(CompileError::VoidReturnValue);
    }
    if !fntype.is_void() && expr.is_none() {
      return Err(CompileError::MissingReturnValue);
    }

    if let Some(expr) = expr {
      let mut ctx = ExprContext::typed(*fntype);
      self.emit_expr(&mut ctx, expr)?;
    }
    self.asm.push_str(&format!("ret{}\n", fntype.retext));

    Ok(())
  }

  fn emit_expr(&mut self, ctx: &mut ExprContext, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Value(value) => {
        self.emit_value(ctx, value);
        Ok(())
      }
      Expr::Binary { op, lhs, rhs } => self.emit_binary(ctx, *op, lhs, rhs),
      Expr::Ident(name) => self.emit_ident(ctx, name),
      Expr::Call { name, args } => self.emit_call(name, args),
    }
  }

  fn emit_value(&mut self, ctx: &ExprContext, value: &Value) {
    let opext = ctx.opext();

    match value {
      Value::Number(n) => {
        self.asm.push_str(&format!("push{opext} {n}\n"));
      }
      Value::Str(text) => {
        let name = self.strings;
        self.strings += 1;
        self
          .asm
          .push_str(&format!(".data s{name} .string \"{text}\"\n"));
        self.asm.push_str(&format!("dataptr s{name}\n"));
      }
      Value::Char(text) => {
        self.asm.push_str(&format!("push{opext} '{text}'\n"));
      }
    }
  }

  fn emit_binary(
    &mut self,
    ctx: &mut ExprContext,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
  ) -> CompileResult<()> {
    self.emit_expr(ctx, lhs)?;
    self.emit_expr(ctx, rhs)?;

    self.emit_op(ctx.opext(), op);
    Ok(())
  }

  fn emit_ident(&mut self, ctx: &mut ExprContext, name: &str) -> CompileResult<()> {
    let Some(symbol) = self.symbols.lookup(name) else {
      return Err(CompileError::UndeclaredIdent {
        name: name.to_string(),
      });
    };
    let (slot, ty) = (symbol.slot, symbol.ty);

    if ty.is_void() {
      return Err(CompileError::VoidLoad);
    }

    if let Some(expected) = ctx.ty
      && expected.kind != ty.kind
    {
      return Err(CompileError::TypeMismatch {
        name: name.to_string(),
      });
    }

    if ctx.capture {
      ctx.ty = Some(ty);
      ctx.capture = false;
    }

    self.asm.push_str(&format!("load{} {}\n", ty.opext, slot));
    Ok(())
  }

  fn emit_call(&mut self, name: &str, args: &[Expr]) -> CompileResult<()> {
    // Arguments never inherit the surrounding type context, and they are
    // not checked against the callee's parameters: functions are not
    // tracked as symbols.
    for arg in args {
      let mut ctx = ExprContext::capturing();
      self.emit_expr(&mut ctx, arg)?;
    }

    self.asm.push_str(&format!("call {name}\n"));
    Ok(())
  }

  fn emit_op(&mut self, opext: &str, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.asm.push_str(&format!("add{opext}\n")),
      BinaryOp::Sub => self.asm.push_str(&format!("sub{opext}\n")),
      BinaryOp::Mul => self.asm.push_str(&format!("mul{opext}\n")),
      BinaryOp::Div => self.asm.push_str(&format!("div{opext}\n")),
      BinaryOp::Lt => self.emit_cmp(opext, "lt"),
      BinaryOp::Le => self.emit_cmp(opext, "le"),
      BinaryOp::Gt => self.emit_cmp(opext, "gt"),
      BinaryOp::Ge => self.emit_cmp(opext, "ge"),
      BinaryOp::Eq => self.emit_cmp(opext, "eq"),
      BinaryOp::Ne => self.emit_cmp(opext, "ne"),
      BinaryOp::LogicalAnd => self.emit_logical(opext, 2),
      BinaryOp::LogicalOr => self.emit_logical(opext, 1),
    }
  }

  /// Compare the two pushed operands and leave 1 or 0 on the stack.
  fn emit_cmp(&mut self, opext: &str, cc: &str) {
    let iftrue = self.next_label();
    let cont = self.next_label();

    self.asm.push_str(&format!("cmp{opext}\n"));
    self.asm.push_str(&format!("jmp.{cc} l{iftrue}\n"));
    self.asm.push_str(&format!("push{opext} 0\n"));
    self.asm.push_str(&format!("jmp l{cont}\n"));
    self.asm.push_str(&format!("l{iftrue}:\n"));
    self.asm.push_str(&format!("push{opext} 1\n"));
    self.asm.push_str(&format!("l{cont}:\n"));
  }

  /// Logical and/or over two pushed 0/1 values, by summing them and
  /// comparing against a threshold: 2 means both were true, 1 means at
  /// least one was. Both operands have already been evaluated — this
  /// encoding does not short-circuit.
  fn emit_logical(&mut self, opext: &str, threshold: u32) {
    let iftrue = self.next_label();
    let cont = self.next_label();

    self.asm.push_str("add\n");
    self.asm.push_str(&format!("push{opext} {threshold}\n"));
    self.asm.push_str(&format!("cmp{opext}\n"));
    self.asm.push_str(&format!("jmp.ge l{iftrue}\n"));
    self.asm.push_str(&format!("push{opext} 0\n"));
    self.asm.push_str(&format!("jmp l{cont}\n"));
    self.asm.push_str(&format!("l{iftrue}:\n"));
    self.asm.push_str(&format!("push{opext} 1\n"));
    self.asm.push_str(&format!("l{cont}:\n"));
  }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn compile(src: &str) -> String {
    generate(&parse(tokenize(src).unwrap()).unwrap()).unwrap()
  }

  fn compile_err(src: &str) -> CompileError {
    generate(&parse(tokenize(src).unwrap()).unwrap()).unwrap_err()
  }

  #[test]
  fn definition_and_return() {
    let asm = compile("int main() { int x = 1; return x; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       main:\n\
       push.w 1\n\
       store.w 0\n\
       load.w 0\n\
       ret.w\n\n"
    );
  }

  #[test]
  fn parameters_take_the_first_slots() {
    let asm = compile("int f(int a, int b) { return a + b; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.w 0\n\
       load.w 1\n\
       add.w\n\
       ret.w\n\n"
    );
  }

  #[test]
  fn wide_parameters_advance_the_slot_counter_by_width() {
    let asm = compile("long f(long a, long b) { return b; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.d 2\n\
       ret.d\n\n"
    );
  }

  #[test]
  fn if_lowering_and_comparison_branches() {
    let asm = compile("void f() { if (1 < 2) { } }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       push 1\n\
       push 2\n\
       cmp\n\
       jmp.lt l0\n\
       push 0\n\
       jmp l1\n\
       l0:\n\
       push 1\n\
       l1:\n\
       push 0\n\
       cmp\n\
       jmp.eq l2\n\
       l2:\n\n"
    );
  }

  #[test]
  fn while_loops_jump_back_to_their_start() {
    let asm = compile("int f(int a) { while a { a = a - 1; } return a; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       l0:\n\
       load.w 0\n\
       push.w 0\n\
       cmp.w\n\
       jmp.eq l1\n\
       load.w 0\n\
       push.w 1\n\
       sub.w\n\
       store.w 0\n\
       jmp l0\n\
       l1:\n\n"
    );
  }

  #[test]
  fn labels_are_unique_across_the_whole_run() {
    let asm = compile("void f(int a) { if a { } if a { } } void g(int a) { if a { } }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.w 0\n\
       push.w 0\n\
       cmp.w\n\
       jmp.eq l0\n\
       l0:\n\
       load.w 0\n\
       push.w 0\n\
       cmp.w\n\
       jmp.eq l1\n\
       l1:\n\n\
       g:\n\
       load.w 0\n\
       push.w 0\n\
       cmp.w\n\
       jmp.eq l2\n\
       l2:\n\n"
    );
  }

  #[test]
  fn sibling_functions_may_reuse_local_names() {
    let asm = compile("void f() { int x = 1; } void g() { long x = 2; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       push.w 1\n\
       store.w 0\n\n\
       g:\n\
       push.d 2\n\
       store.d 0\n\n"
    );
  }

  #[test]
  fn capture_context_adopts_the_first_identifier_type() {
    let asm = compile("void f(long a) { a + 1; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.d 0\n\
       push.d 1\n\
       add.d\n\n"
    );
  }

  #[test]
  fn call_arguments_each_get_a_fresh_context() {
    let asm = compile("void f(long a) { g(a, 1); }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.d 0\n\
       push 1\n\
       call g\n\n"
    );
  }

  #[test]
  fn logical_operators_evaluate_both_sides() {
    let asm = compile("void f(int a, int b) { if a && b { } }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.w 0\n\
       load.w 1\n\
       add\n\
       push.w 2\n\
       cmp.w\n\
       jmp.ge l0\n\
       push.w 0\n\
       jmp l1\n\
       l0:\n\
       push.w 1\n\
       l1:\n\
       push.w 0\n\
       cmp.w\n\
       jmp.eq l2\n\
       l2:\n\n"
    );
  }

  #[test]
  fn logical_or_uses_threshold_one() {
    let asm = compile("void f(int a, int b) { a || b; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.w 0\n\
       load.w 1\n\
       add\n\
       push.w 1\n\
       cmp.w\n\
       jmp.ge l0\n\
       push.w 0\n\
       jmp l1\n\
       l0:\n\
       push.w 1\n\
       l1:\n\n"
    );
  }

  #[test]
  fn string_literals_emit_data_and_a_pointer_push() {
    let asm = compile("void f() { g(\"hi\"); g(\"there\"); }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       .data s0 .string \"hi\"\n\
       dataptr s0\n\
       call g\n\
       .data s1 .string \"there\"\n\
       dataptr s1\n\
       call g\n\n"
    );
  }

  #[test]
  fn char_literals_push_with_the_context_suffix() {
    let asm = compile("int f() { int c = 'a'; return c; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       push.w 'a'\n\
       store.w 0\n\
       load.w 0\n\
       ret.w\n\n"
    );
  }

  #[test]
  fn byte_symbols_load_subword_but_return_word() {
    let asm = compile("byte f(byte a) { return a; }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.b 0\n\
       ret.w\n\n"
    );
  }

  #[test]
  fn pointer_parameters_are_long_words() {
    let asm = compile("void f(char* s) { g(s); }");
    assert_eq!(
      asm,
      ".entry main\n\n\
       f:\n\
       load.d 0\n\
       call g\n\n"
    );
  }

  #[test]
  fn void_returns() {
    let asm = compile("void f() { return; }");
    assert_eq!(asm, ".entry main\n\nf:\nret\n\n");
  }

  #[test]
  fn parameter_redefinition_is_fatal() {
    assert_eq!(
      compile_err("int f(int a, int a) { return a; }"),
      CompileError::ParameterRedefined { name: "a".into() }
    );
  }

  #[test]
  fn local_redefinition_is_fatal() {
    assert_eq!(
      compile_err("void f() { int x = 1; int x = 2; }"),
      CompileError::VariableRedefined { name: "x".into() }
    );
    assert_eq!(
      compile_err("void f(int a) { int a = 1; }"),
      CompileError::VariableRedefined { name: "a".into() }
    );
  }

  #[test]
  fn undeclared_names_are_fatal() {
    assert_eq!(
      compile_err("void f() { x = 1; }"),
      CompileError::UndeclaredAssign { name: "x".into() }
    );
    assert_eq!(
      compile_err("int f() { return x; }"),
      CompileError::UndeclaredIdent { name: "x".into() }
    );
  }

  #[test]
  fn context_type_disagreement_is_fatal() {
    assert_eq!(
      compile_err("int f(int a, long b) { return a + b; }"),
      CompileError::TypeMismatch { name: "b".into() }
    );
  }

  #[test]
  fn void_values_cannot_be_loaded() {
    assert_eq!(compile_err("int f(void v) { return v; }"), CompileError::VoidLoad);
  }

  #[test]
  fn return_arity_must_match_the_function_type() {
    assert_eq!(
      compile_err("void f() { return 1; }"),
      CompileError::VoidReturnValue
    );
    assert_eq!(
      compile_err("int f() { return; }"),
      CompileError::MissingReturnValue
    );
  }

  #[test]
  fn unknown_types_are_fatal() {
    assert_eq!(
      compile_err("float f() { return; }"),
      CompileError::UnknownType { name: "float".into() }
    );
  }
}
