//! Per-method lowering of decompiled statement trees into WebAssembly
//! function bodies.
//!
//! The generator dispatches exhaustively over the tagged tree. Invocations
//! fork four ways: intrinsics inline, Import-annotated natives become
//! imports plus direct calls, virtual calls go through the receiver's
//! dispatch region via `call_indirect`, everything else is a direct call.

pub mod classes;
mod context;
mod types;

pub use classes::{ClassLayoutGenerator, TableSlot};
pub use context::{GenerationContext, ImportedMethod};
pub(crate) use types::{map_return_type, map_type, memory_kind};

use crate::error::{Error, Result};
use crate::mangling::mangle_method;
use crate::model::ast::{BinaryOp, Const, Expr, MethodBody, NumericKind, Stmt, UnaryOp};
use crate::model::program::InvocationKind;
use crate::model::{ClassUniverse, FieldReference, Method, MethodReference, ValueType};
use crate::runtime::{RECORD_TABLE_OFFSET, allocator_allocate};
use crate::vtable::VirtualTableProvider;
use crate::wasm::{
    BlockLabel, WasmBinaryOp, WasmExpression, WasmFunction, WasmFunctionType, WasmType,
    WasmUnaryOp,
};

pub struct WasmGenerator<'ctx, 'u> {
    universe: &'u ClassUniverse,
    context: &'ctx mut GenerationContext<'u>,
    classes: &'ctx ClassLayoutGenerator<'u>,
    vtables: &'u VirtualTableProvider,
}

impl<'ctx, 'u> WasmGenerator<'ctx, 'u> {
    pub fn new(
        universe: &'u ClassUniverse,
        context: &'ctx mut GenerationContext<'u>,
        classes: &'ctx ClassLayoutGenerator<'u>,
        vtables: &'u VirtualTableProvider,
    ) -> Self {
        Self {
            universe,
            context,
            classes,
            vtables,
        }
    }

    /// Whether the reference resolves to a registered intrinsic.
    pub fn is_intrinsic(&self, reference: &MethodReference) -> bool {
        self.context.intrinsic(reference).is_some()
    }

    /// Import descriptor of the reference, when it carries the Import
    /// annotation. Does not declare the import.
    pub fn imported_method(&self, reference: &MethodReference) -> Option<ImportedMethod> {
        self.context.imported_method(reference)
    }

    /// Lower one method into a module function.
    pub fn generate(&mut self, method: &Method) -> Result<WasmFunction> {
        let reference = method.reference();
        let body = method.body.as_ref().ok_or_else(|| {
            Error::internal(format!("generator invoked on bodiless method `{reference}`"))
        })?;
        let param_count =
            method.signature.params.len() + usize::from(!method.modifiers.is_static);
        if body.locals.len() < param_count {
            return Err(Error::codegen(format!(
                "decompiled body of `{reference}` declares fewer locals than parameters"
            )));
        }

        let mut function = WasmFunction::new(mangle_method(&reference));
        function.params = body.locals[..param_count].iter().map(map_type).collect();
        function.result = map_return_type(&method.signature.ret);

        let mut emitter = FunctionEmitter {
            universe: self.universe,
            context: &mut *self.context,
            classes: self.classes,
            vtables: self.vtables,
            body,
            locals: body.locals.iter().map(map_type).collect(),
            extra: Vec::new(),
            labels: 0,
            loops: Vec::new(),
        };
        let mut lowered = Vec::new();
        emitter.emit_statements(&body.statements, &mut lowered)?;
        let extra = emitter.extra;

        function.locals = body.locals[param_count..].iter().map(map_type).collect();
        function.locals.extend(extra);
        function.body = lowered;
        Ok(function)
    }
}

struct LoopFrame {
    break_label: BlockLabel,
    continue_label: BlockLabel,
}

struct FunctionEmitter<'e, 'u> {
    universe: &'u ClassUniverse,
    context: &'e mut GenerationContext<'u>,
    classes: &'e ClassLayoutGenerator<'u>,
    vtables: &'u VirtualTableProvider,
    body: &'e MethodBody,
    locals: Vec<WasmType>,
    extra: Vec<WasmType>,
    labels: u32,
    loops: Vec<LoopFrame>,
}

impl FunctionEmitter<'_, '_> {
    fn emit_statements(&mut self, stmts: &[Stmt], out: &mut Vec<WasmExpression>) -> Result<()> {
        for stmt in stmts {
            self.emit_statement(stmt, out)?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, stmt: &Stmt, out: &mut Vec<WasmExpression>) -> Result<()> {
        match stmt {
            Stmt::Block(stmts) => {
                let mut body = Vec::new();
                self.emit_statements(stmts, &mut body)?;
                out.push(WasmExpression::Block {
                    label: None,
                    is_loop: false,
                    body,
                });
            }
            Stmt::Expr(expr) => {
                let lowered = self.emit_expr(expr)?;
                if expr_has_value(expr) {
                    out.push(WasmExpression::Drop(Box::new(lowered)));
                } else {
                    out.push(lowered);
                }
            }
            Stmt::Assign { var, value } => {
                let index = self.local_index(*var)?;
                let value = self.emit_expr(value)?;
                out.push(WasmExpression::set_local(index, value));
            }
            Stmt::FieldSet {
                receiver,
                field,
                value,
            } => {
                let kind = memory_kind(&self.field_type(field)?);
                let value = Box::new(self.emit_expr(value)?);
                let (offset, address) = match receiver {
                    Some(receiver) => {
                        (self.classes.field_offset(field)?, self.emit_expr(receiver)?)
                    }
                    None => {
                        let address = self.classes.static_field_address(field)?;
                        (0, WasmExpression::i32(to_i32(address)?))
                    }
                };
                out.push(WasmExpression::Store {
                    kind,
                    offset,
                    address: Box::new(address),
                    value,
                });
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = Box::new(self.emit_expr(condition)?);
                let mut lowered_then = Vec::new();
                self.emit_statements(then_body, &mut lowered_then)?;
                let mut lowered_else = Vec::new();
                self.emit_statements(else_body, &mut lowered_else)?;
                out.push(WasmExpression::If {
                    condition,
                    then_body: lowered_then,
                    else_body: lowered_else,
                });
            }
            Stmt::While { condition, body } => {
                let break_label = self.fresh_label();
                let continue_label = self.fresh_label();
                let guard = WasmExpression::BrIf {
                    condition: Box::new(WasmExpression::Unary {
                        ty: WasmType::I32,
                        op: WasmUnaryOp::Eqz,
                        operand: Box::new(self.emit_expr(condition)?),
                    }),
                    label: break_label,
                };
                self.loops.push(LoopFrame {
                    break_label,
                    continue_label,
                });
                let mut loop_body = vec![guard];
                let lowered = self.emit_statements(body, &mut loop_body);
                self.loops.pop();
                lowered?;
                loop_body.push(WasmExpression::Br {
                    label: continue_label,
                });
                out.push(WasmExpression::Block {
                    label: Some(break_label),
                    is_loop: false,
                    body: vec![WasmExpression::Block {
                        label: Some(continue_label),
                        is_loop: true,
                        body: loop_body,
                    }],
                });
            }
            Stmt::Break => {
                let frame = self.loops.last().ok_or_else(|| {
                    Error::internal("decompiled tree breaks outside of any loop")
                })?;
                out.push(WasmExpression::Br {
                    label: frame.break_label,
                });
            }
            Stmt::Continue => {
                let frame = self.loops.last().ok_or_else(|| {
                    Error::internal("decompiled tree continues outside of any loop")
                })?;
                out.push(WasmExpression::Br {
                    label: frame.continue_label,
                });
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => Some(Box::new(self.emit_expr(expr)?)),
                    None => None,
                };
                out.push(WasmExpression::Return { value });
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr) -> Result<WasmExpression> {
        match expr {
            Expr::Const(value) => Ok(lower_const(*value)),
            Expr::Var(index) => Ok(WasmExpression::GetLocal(self.local_index(*index)?)),
            Expr::Binary { kind, op, lhs, rhs } => {
                let lhs = self.emit_expr(lhs)?;
                let rhs = self.emit_expr(rhs)?;
                lower_binary(*kind, *op, lhs, rhs)
            }
            Expr::Unary { kind, op, operand } => {
                let operand = self.emit_expr(operand)?;
                lower_unary(*kind, *op, operand)
            }
            Expr::FieldGet { receiver, field } => {
                let kind = memory_kind(&self.field_type(field)?);
                let (offset, address) = match receiver {
                    Some(receiver) => {
                        (self.classes.field_offset(field)?, self.emit_expr(receiver)?)
                    }
                    None => {
                        let address = self.classes.static_field_address(field)?;
                        (0, WasmExpression::i32(to_i32(address)?))
                    }
                };
                Ok(WasmExpression::Load {
                    kind,
                    offset,
                    address: Box::new(address),
                })
            }
            Expr::Invoke { kind, method, args } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.emit_expr(arg)?);
                }
                if let Some(intrinsic) = self.context.intrinsic(method) {
                    return intrinsic.emit(method, lowered);
                }
                match kind {
                    InvocationKind::Virtual => self.emit_virtual_call(method, lowered),
                    InvocationKind::Special | InvocationKind::Static => {
                        // Declares the import on first reference; a plain
                        // method resolves to its compiled function.
                        let _ = self.context.reference_import(method);
                        Ok(WasmExpression::Call {
                            function: mangle_method(method),
                            args: lowered,
                        })
                    }
                }
            }
            Expr::New { class } => {
                let pointer = self.classes.class_pointer(class)?;
                Ok(WasmExpression::Call {
                    function: mangle_method(&allocator_allocate()),
                    args: vec![WasmExpression::i32(to_i32(pointer)?)],
                })
            }
        }
    }

    /// Indirect call through the receiver's dispatch region: the class
    /// record address sits in the object header, the region base in the
    /// record's table word.
    fn emit_virtual_call(
        &mut self,
        method: &MethodReference,
        mut args: Vec<WasmExpression>,
    ) -> Result<WasmExpression> {
        let table = self.vtables.lookup(&method.class).ok_or_else(|| {
            Error::internal(format!(
                "virtual call target `{method}` has no dispatch table"
            ))
        })?;
        let slot = table
            .slot(&method.signature)
            .ok_or_else(|| Error::missing_dispatch_slot(method))?;
        if args.is_empty() {
            return Err(Error::internal(format!(
                "virtual call to `{method}` is missing its receiver"
            )));
        }

        let scratch = self.claim_scratch_local();
        let receiver = args.remove(0);
        args.insert(
            0,
            WasmExpression::TeeLocal {
                index: scratch,
                value: Box::new(receiver),
            },
        );
        let slot = i32::try_from(slot)
            .map_err(|_| Error::internal("dispatch slot index exceeds the i32 range"))?;
        let selector = WasmExpression::binary(
            WasmType::I32,
            WasmBinaryOp::Add,
            WasmExpression::load_i32(
                RECORD_TABLE_OFFSET,
                WasmExpression::load_i32(0, WasmExpression::GetLocal(scratch)),
            ),
            WasmExpression::i32(slot),
        );

        let mut params = vec![WasmType::I32];
        params.extend(method.signature.params.iter().map(map_type));
        Ok(WasmExpression::CallIndirect {
            ty: WasmFunctionType::new(params, map_return_type(&method.signature.ret)),
            selector: Box::new(selector),
            args,
        })
    }

    /// Fresh scratch local for caching a receiver. One per call site, so
    /// nested dispatches cannot clobber each other.
    fn claim_scratch_local(&mut self) -> u32 {
        let index = (self.locals.len() + self.extra.len()) as u32;
        self.extra.push(WasmType::I32);
        index
    }

    fn fresh_label(&mut self) -> BlockLabel {
        let label = BlockLabel(self.labels);
        self.labels += 1;
        label
    }

    fn local_index(&self, index: usize) -> Result<u32> {
        if index >= self.body.locals.len() {
            return Err(Error::codegen(format!(
                "decompiled tree references local {index} beyond the declared {}",
                self.body.locals.len()
            )));
        }
        u32::try_from(index)
            .map_err(|_| Error::internal("local index exceeds the u32 range"))
    }

    /// Declared type of a field, resolved against its declaring class.
    fn field_type(&self, field: &FieldReference) -> Result<ValueType> {
        self.universe
            .get(&field.class)
            .and_then(|class| class.field(&field.name))
            .map(|declared| declared.ty.clone())
            .ok_or_else(|| Error::internal(format!("reference to unknown field `{field}`")))
    }
}

fn expr_has_value(expr: &Expr) -> bool {
    match expr {
        Expr::Invoke { method, .. } => !method.signature.ret.is_void(),
        _ => true,
    }
}

fn lower_const(value: Const) -> WasmExpression {
    match value {
        Const::Null => WasmExpression::I32Const(0),
        Const::Int(value) => WasmExpression::I32Const(value),
        Const::Long(value) => WasmExpression::I64Const(value),
        Const::Float(value) => WasmExpression::F32Const(value),
        Const::Double(value) => WasmExpression::F64Const(value),
    }
}

fn numeric_type(kind: NumericKind) -> WasmType {
    match kind {
        NumericKind::Int => WasmType::I32,
        NumericKind::Long => WasmType::I64,
        NumericKind::Float => WasmType::F32,
        NumericKind::Double => WasmType::F64,
    }
}

fn lower_binary(
    kind: NumericKind,
    op: BinaryOp,
    lhs: WasmExpression,
    rhs: WasmExpression,
) -> Result<WasmExpression> {
    let ty = numeric_type(kind);
    let floating = matches!(kind, NumericKind::Float | NumericKind::Double);
    if floating && op == BinaryOp::Rem {
        return Ok(float_remainder(ty, lhs, rhs));
    }
    let mapped = match op {
        BinaryOp::Add => WasmBinaryOp::Add,
        BinaryOp::Sub => WasmBinaryOp::Sub,
        BinaryOp::Mul => WasmBinaryOp::Mul,
        BinaryOp::Div => WasmBinaryOp::Div,
        BinaryOp::Rem => WasmBinaryOp::Rem,
        BinaryOp::And => WasmBinaryOp::And,
        BinaryOp::Or => WasmBinaryOp::Or,
        BinaryOp::Xor => WasmBinaryOp::Xor,
        BinaryOp::Shl => WasmBinaryOp::Shl,
        BinaryOp::Shr => WasmBinaryOp::Shr,
        BinaryOp::Ushr => WasmBinaryOp::Ushr,
        BinaryOp::Eq => WasmBinaryOp::Eq,
        BinaryOp::Ne => WasmBinaryOp::Ne,
        BinaryOp::Lt => WasmBinaryOp::Lt,
        BinaryOp::Le => WasmBinaryOp::Le,
        BinaryOp::Gt => WasmBinaryOp::Gt,
        BinaryOp::Ge => WasmBinaryOp::Ge,
    };
    if floating
        && matches!(
            mapped,
            WasmBinaryOp::And
                | WasmBinaryOp::Or
                | WasmBinaryOp::Xor
                | WasmBinaryOp::Shl
                | WasmBinaryOp::Shr
                | WasmBinaryOp::Ushr
        )
    {
        return Err(Error::codegen(format!(
            "bitwise operation {op:?} is not defined for floating operands"
        )));
    }
    Ok(WasmExpression::binary(ty, mapped, lhs, rhs))
}

fn lower_unary(kind: NumericKind, op: UnaryOp, operand: WasmExpression) -> Result<WasmExpression> {
    let ty = numeric_type(kind);
    match op {
        UnaryOp::Neg => match kind {
            NumericKind::Int => Ok(WasmExpression::binary(
                ty,
                WasmBinaryOp::Sub,
                WasmExpression::I32Const(0),
                operand,
            )),
            NumericKind::Long => Ok(WasmExpression::binary(
                ty,
                WasmBinaryOp::Sub,
                WasmExpression::I64Const(0),
                operand,
            )),
            NumericKind::Float | NumericKind::Double => Ok(WasmExpression::Unary {
                ty,
                op: WasmUnaryOp::Neg,
                operand: Box::new(operand),
            }),
        },
        UnaryOp::Not => {
            if matches!(kind, NumericKind::Float | NumericKind::Double) {
                return Err(Error::codegen(
                    "logical negation is not defined for floating operands",
                ));
            }
            Ok(WasmExpression::Unary {
                ty,
                op: WasmUnaryOp::Eqz,
                operand: Box::new(operand),
            })
        }
    }
}

/// `x - trunc(x / y) * y`, the target idiom for floating remainders.
fn float_remainder(ty: WasmType, lhs: WasmExpression, rhs: WasmExpression) -> WasmExpression {
    WasmExpression::binary(
        ty,
        WasmBinaryOp::Sub,
        lhs.clone(),
        WasmExpression::binary(
            ty,
            WasmBinaryOp::Mul,
            WasmExpression::Unary {
                ty,
                op: WasmUnaryOp::Trunc,
                operand: Box::new(WasmExpression::binary(ty, WasmBinaryOp::Div, lhs, rhs.clone())),
            },
            rhs,
        ),
    )
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::internal("address exceeds the i32 range"))
}
