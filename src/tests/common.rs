//! Shared fixtures: universe builders that attach both the basic-block
//! program (for the virtual-call scan) and the decompiled tree (for
//! lowering) to every compiled method.

use crate::backend::WasmBackend;
use crate::controller::TargetController;
use crate::model::ast::{Expr, MethodBody, Stmt};
use crate::model::program::{Instruction, Program};
use crate::model::{ClassUniverse, Method, MethodSignature, ValueType};
use crate::runtime;

/// Derive the basic-block program from the decompiled tree so both views
/// of a fixture method stay in sync.
fn derive_program(statements: &[Stmt]) -> Program {
    let mut instructions = Vec::new();
    collect_statements(statements, &mut instructions);
    instructions.push(Instruction::Return);
    Program::of_instructions(instructions)
}

fn collect_statements(statements: &[Stmt], out: &mut Vec<Instruction>) {
    for statement in statements {
        match statement {
            Stmt::Block(inner) => collect_statements(inner, out),
            Stmt::Expr(expr) => collect_expr(expr, out),
            Stmt::Assign { value, .. } => collect_expr(value, out),
            Stmt::FieldSet {
                receiver, value, ..
            } => {
                if let Some(receiver) = receiver {
                    collect_expr(receiver, out);
                }
                collect_expr(value, out);
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                collect_expr(condition, out);
                collect_statements(then_body, out);
                collect_statements(else_body, out);
            }
            Stmt::While { condition, body } => {
                collect_expr(condition, out);
                collect_statements(body, out);
            }
            Stmt::Return(Some(expr)) => collect_expr(expr, out),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

fn collect_expr(expr: &Expr, out: &mut Vec<Instruction>) {
    match expr {
        Expr::Invoke { kind, method, args } => {
            for arg in args {
                collect_expr(arg, out);
            }
            out.push(Instruction::Invoke {
                method: method.clone(),
                kind: *kind,
            });
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, out);
            collect_expr(rhs, out);
        }
        Expr::Unary { operand, .. } => collect_expr(operand, out),
        Expr::FieldGet { receiver, .. } => {
            if let Some(receiver) = receiver {
                collect_expr(receiver, out);
            }
        }
        Expr::New { class } => out.push(Instruction::Construct {
            class: class.clone(),
        }),
        Expr::Const(_) | Expr::Var(_) => {}
    }
}

pub fn compiled(
    owner: &str,
    signature: MethodSignature,
    locals: Vec<ValueType>,
    statements: Vec<Stmt>,
) -> Method {
    let mut method = Method::new(owner, signature);
    method.program = Some(derive_program(&statements));
    method.body = Some(MethodBody::new(locals, statements));
    method
}

/// Static `name()V` method.
pub fn static_method(owner: &str, name: &str, statements: Vec<Stmt>) -> Method {
    let mut method = compiled(
        owner,
        MethodSignature::new(name, Vec::new(), ValueType::Void),
        Vec::new(),
        statements,
    );
    method.modifiers.is_static = true;
    method
}

/// Instance `name()V` method; local 0 is the receiver.
pub fn instance_method(owner: &str, name: &str, statements: Vec<Stmt>) -> Method {
    compiled(
        owner,
        MethodSignature::new(name, Vec::new(), ValueType::Void),
        vec![ValueType::object(owner)],
        statements,
    )
}

/// Class initializer with a compiled body.
pub fn clinit(owner: &str, statements: Vec<Stmt>) -> Method {
    let mut method = compiled(owner, runtime::clinit_signature(), Vec::new(), statements);
    method.modifiers.is_static = true;
    method
}

pub fn emit_ok<C: TargetController>(universe: &ClassUniverse, controller: &C) -> String {
    let backend = WasmBackend::new(controller);
    let mut out = Vec::new();
    backend.emit(universe, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

/// Body text of one rendered function, from its header to its closing
/// paren.
pub fn function_section(text: &str, symbol: &str) -> String {
    let header = format!("(func ${symbol}");
    let start = text
        .find(&header)
        .unwrap_or_else(|| panic!("function `{symbol}` not rendered:\n{text}"));
    let rest = &text[start..];
    let end = rest.find("\n  )\n").map_or(rest.len(), |pos| pos + 4);
    rest[..end].to_string()
}
