//! Textual (WAT) serialization of an assembled module.
//!
//! Rendering runs a prepass that collects the function type of every
//! `call_indirect` site so the type section can be emitted first; the body
//! writer then folds expressions into s-expressions, keeping leaf-only
//! nodes on a single line.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mangling::mangle_signature;

use super::expr::{MemoryKind, WasmBinaryOp, WasmExpression, WasmUnaryOp};
use super::{WasmFunctionType, WasmModule, WasmType};

const INDENT: usize = 2;

pub struct WasmRenderer;

impl WasmRenderer {
    pub fn render(module: &WasmModule) -> Result<String> {
        let signatures = SignatureTable::collect(module);
        let mut out = String::new();
        out.push_str("(module\n");

        for ty in &signatures.order {
            let mut line = format!("(type ${} (func", signatures.name(ty));
            if !ty.params.is_empty() {
                line.push_str(" (param");
                for param in &ty.params {
                    line.push(' ');
                    line.push_str(param.name());
                }
                line.push(')');
            }
            if let Some(result) = ty.result {
                line.push_str(" (result ");
                line.push_str(result.name());
                line.push(')');
            }
            line.push_str("))");
            push_line(&mut out, INDENT, &line);
        }

        for function in module.functions() {
            let Some(import) = &function.import_from else {
                continue;
            };
            let mut line = format!(
                "(import \"{}\" \"{}\" (func ${}",
                import.module, import.name, function.name
            );
            push_param_result(&mut line, &function.params, function.result);
            line.push_str("))");
            push_line(&mut out, INDENT, &line);
        }

        push_line(
            &mut out,
            INDENT,
            &format!("(memory (;0;) {})", module.memory_pages),
        );

        if !module.function_table.is_empty() {
            push_line(
                &mut out,
                INDENT,
                &format!("(table (;0;) {} funcref)", module.function_table.len()),
            );
        }

        for function in module.functions() {
            if function.is_import() {
                continue;
            }
            let mut header = format!("(func ${}", function.name);
            push_param_result(&mut header, &function.params, function.result);
            if !function.locals.is_empty() {
                header.push_str(" (local");
                for local in &function.locals {
                    header.push(' ');
                    header.push_str(local.name());
                }
                header.push(')');
            }
            push_line(&mut out, INDENT, &header);
            for expr in &function.body {
                render_expr(&mut out, expr, INDENT * 2, &signatures)?;
            }
            push_line(&mut out, INDENT, ")");
            out.push('\n');
        }

        if !module.function_table.is_empty() {
            let mut line = String::from("(elem (i32.const 0) func");
            for entry in &module.function_table {
                line.push_str(" $");
                line.push_str(entry);
            }
            line.push(')');
            push_line(&mut out, INDENT, &line);
        }

        let mut exports: Vec<_> = module
            .functions()
            .iter()
            .filter_map(|function| {
                function
                    .export_name
                    .as_deref()
                    .map(|public| (public, function.name.as_str()))
            })
            .collect();
        exports.sort_by(|a, b| a.0.cmp(b.0));
        for (public, name) in exports {
            push_line(
                &mut out,
                INDENT,
                &format!("(export \"{public}\" (func ${name}))"),
            );
        }

        if let Some(start) = &module.start {
            push_line(&mut out, INDENT, &format!("(start ${start})"));
        }

        out.push_str(")\n");
        Ok(out)
    }
}

struct SignatureTable {
    order: Vec<WasmFunctionType>,
    names: HashMap<WasmFunctionType, String>,
}

impl SignatureTable {
    fn collect(module: &WasmModule) -> Self {
        let mut table = Self {
            order: Vec::new(),
            names: HashMap::new(),
        };
        for function in module.functions() {
            for root in &function.body {
                root.walk(&mut |expr| {
                    if let WasmExpression::CallIndirect { ty, .. } = expr
                        && !table.names.contains_key(ty)
                    {
                        table.names.insert(ty.clone(), mangle_signature(ty));
                        table.order.push(ty.clone());
                    }
                });
            }
        }
        table
    }

    fn name(&self, ty: &WasmFunctionType) -> &str {
        self.names
            .get(ty)
            .map_or("sig_unknown", |name| name.as_str())
    }
}

fn push_param_result(line: &mut String, params: &[WasmType], result: Option<WasmType>) {
    if !params.is_empty() {
        line.push_str(" (param");
        for param in params {
            line.push(' ');
            line.push_str(param.name());
        }
        line.push(')');
    }
    if let Some(result) = result {
        line.push_str(" (result ");
        line.push_str(result.name());
        line.push(')');
    }
}

fn push_line(buf: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        buf.push(' ');
    }
    buf.push_str(line);
    buf.push('\n');
}

fn render_expr(
    out: &mut String,
    expr: &WasmExpression,
    indent: usize,
    signatures: &SignatureTable,
) -> Result<()> {
    if let Some(line) = inline_form(expr, signatures)? {
        push_line(out, indent, &line);
        return Ok(());
    }
    match expr {
        WasmExpression::Block {
            label,
            is_loop,
            body,
        } => {
            let keyword = if *is_loop { "loop" } else { "block" };
            let header = match label {
                Some(label) => format!("({keyword} $l{}", label.0),
                None => format!("({keyword}"),
            };
            push_line(out, indent, &header);
            for child in body {
                render_expr(out, child, indent + INDENT, signatures)?;
            }
            push_line(out, indent, ")");
        }
        WasmExpression::If {
            condition,
            then_body,
            else_body,
        } => {
            push_line(out, indent, "(if");
            render_expr(out, condition, indent + INDENT, signatures)?;
            push_line(out, indent + INDENT, "(then");
            for child in then_body {
                render_expr(out, child, indent + 2 * INDENT, signatures)?;
            }
            push_line(out, indent + INDENT, ")");
            if !else_body.is_empty() {
                push_line(out, indent + INDENT, "(else");
                for child in else_body {
                    render_expr(out, child, indent + 2 * INDENT, signatures)?;
                }
                push_line(out, indent + INDENT, ")");
            }
            push_line(out, indent, ")");
        }
        other => {
            let (head, children) = expression_parts(other, signatures)?;
            push_line(out, indent, &format!("({head}"));
            for child in children {
                render_expr(out, child, indent + INDENT, signatures)?;
            }
            push_line(out, indent, ")");
        }
    }
    Ok(())
}

/// Single-line form for leaves and for nodes whose children are all leaves.
fn inline_form(expr: &WasmExpression, signatures: &SignatureTable) -> Result<Option<String>> {
    if let Some(leaf) = leaf_form(expr) {
        return Ok(Some(leaf));
    }
    if matches!(
        expr,
        WasmExpression::Block { .. } | WasmExpression::If { .. }
    ) {
        return Ok(None);
    }
    let (head, children) = expression_parts(expr, signatures)?;
    let mut line = format!("({head}");
    for child in &children {
        let Some(leaf) = leaf_form(child) else {
            return Ok(None);
        };
        line.push(' ');
        line.push_str(&leaf);
    }
    line.push(')');
    Ok(Some(line))
}

fn leaf_form(expr: &WasmExpression) -> Option<String> {
    let text = match expr {
        WasmExpression::I32Const(value) => format!("(i32.const {value})"),
        WasmExpression::I64Const(value) => format!("(i64.const {value})"),
        WasmExpression::F32Const(value) => format!("(f32.const {value:?})"),
        WasmExpression::F64Const(value) => format!("(f64.const {value:?})"),
        WasmExpression::GetLocal(index) => format!("(local.get {index})"),
        WasmExpression::Br { label } => format!("(br $l{})", label.0),
        WasmExpression::Unreachable => "(unreachable)".into(),
        _ => return None,
    };
    Some(text)
}

/// Head text and child list of every non-structural expression.
fn expression_parts<'e>(
    expr: &'e WasmExpression,
    signatures: &SignatureTable,
) -> Result<(String, Vec<&'e WasmExpression>)> {
    let parts = match expr {
        WasmExpression::SetLocal { index, value } => {
            (format!("local.set {index}"), vec![value.as_ref()])
        }
        WasmExpression::TeeLocal { index, value } => {
            (format!("local.tee {index}"), vec![value.as_ref()])
        }
        WasmExpression::Binary { ty, op, lhs, rhs } => (
            format!("{}.{}", ty.name(), binary_mnemonic(*ty, *op)?),
            vec![lhs.as_ref(), rhs.as_ref()],
        ),
        WasmExpression::Unary { ty, op, operand } => {
            (unary_mnemonic(*ty, *op)?, vec![operand.as_ref()])
        }
        WasmExpression::BrIf { condition, label } => {
            (format!("br_if $l{}", label.0), vec![condition.as_ref()])
        }
        WasmExpression::Return { value } => (
            "return".to_string(),
            value.as_deref().into_iter().collect(),
        ),
        WasmExpression::Call { function, args } => {
            (format!("call ${function}"), args.iter().collect())
        }
        WasmExpression::CallIndirect { ty, selector, args } => {
            let mut children: Vec<&WasmExpression> = args.iter().collect();
            children.push(selector.as_ref());
            (
                format!("call_indirect (type ${})", signatures.name(ty)),
                children,
            )
        }
        WasmExpression::Load {
            kind,
            offset,
            address,
        } => (
            format!("{} offset={offset}", load_mnemonic(*kind)),
            vec![address.as_ref()],
        ),
        WasmExpression::Store {
            kind,
            offset,
            address,
            value,
        } => (
            format!("{} offset={offset}", store_mnemonic(*kind)),
            vec![address.as_ref(), value.as_ref()],
        ),
        WasmExpression::Drop(value) => ("drop".to_string(), vec![value.as_ref()]),
        other => {
            return Err(Error::internal(format!(
                "expression {other:?} has no operand form"
            )));
        }
    };
    Ok(parts)
}

fn binary_mnemonic(ty: WasmType, op: WasmBinaryOp) -> Result<&'static str> {
    let integer = matches!(ty, WasmType::I32 | WasmType::I64);
    let name = match op {
        WasmBinaryOp::Add => "add",
        WasmBinaryOp::Sub => "sub",
        WasmBinaryOp::Mul => "mul",
        WasmBinaryOp::Div => {
            if integer {
                "div_s"
            } else {
                "div"
            }
        }
        WasmBinaryOp::Eq => "eq",
        WasmBinaryOp::Ne => "ne",
        WasmBinaryOp::Lt => {
            if integer {
                "lt_s"
            } else {
                "lt"
            }
        }
        WasmBinaryOp::Le => {
            if integer {
                "le_s"
            } else {
                "le"
            }
        }
        WasmBinaryOp::Gt => {
            if integer {
                "gt_s"
            } else {
                "gt"
            }
        }
        WasmBinaryOp::Ge => {
            if integer {
                "ge_s"
            } else {
                "ge"
            }
        }
        WasmBinaryOp::Rem
        | WasmBinaryOp::And
        | WasmBinaryOp::Or
        | WasmBinaryOp::Xor
        | WasmBinaryOp::Shl
        | WasmBinaryOp::Shr
        | WasmBinaryOp::Ushr => {
            if !integer {
                return Err(Error::internal(format!(
                    "operation {op:?} has no {} form",
                    ty.name()
                )));
            }
            match op {
                WasmBinaryOp::Rem => "rem_s",
                WasmBinaryOp::And => "and",
                WasmBinaryOp::Or => "or",
                WasmBinaryOp::Xor => "xor",
                WasmBinaryOp::Shl => "shl",
                WasmBinaryOp::Shr => "shr_s",
                WasmBinaryOp::Ushr => "shr_u",
                _ => unreachable!(),
            }
        }
    };
    Ok(name)
}

fn unary_mnemonic(ty: WasmType, op: WasmUnaryOp) -> Result<String> {
    let name = match op {
        WasmUnaryOp::Eqz => {
            if !matches!(ty, WasmType::I32 | WasmType::I64) {
                return Err(Error::internal("eqz applies to integer operands only"));
            }
            "eqz"
        }
        WasmUnaryOp::Neg => {
            if !matches!(ty, WasmType::F32 | WasmType::F64) {
                return Err(Error::internal("neg applies to floating operands only"));
            }
            "neg"
        }
        WasmUnaryOp::Trunc => {
            if !matches!(ty, WasmType::F32 | WasmType::F64) {
                return Err(Error::internal("trunc applies to floating operands only"));
            }
            "trunc"
        }
    };
    Ok(format!("{}.{name}", ty.name()))
}

fn load_mnemonic(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::I8 => "i32.load8_s",
        MemoryKind::U8 => "i32.load8_u",
        MemoryKind::I16 => "i32.load16_s",
        MemoryKind::U16 => "i32.load16_u",
        MemoryKind::I32 => "i32.load",
        MemoryKind::I64 => "i64.load",
        MemoryKind::F32 => "f32.load",
        MemoryKind::F64 => "f64.load",
    }
}

fn store_mnemonic(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::I8 | MemoryKind::U8 => "i32.store8",
        MemoryKind::I16 | MemoryKind::U16 => "i32.store16",
        MemoryKind::I32 => "i32.store",
        MemoryKind::I64 => "i64.store",
        MemoryKind::F32 => "f32.store",
        MemoryKind::F64 => "f64.store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::{WasmFunction, WasmImport};
    use expect_test::expect;

    #[test]
    fn leaf_only_nodes_render_inline() {
        let module = {
            let mut module = WasmModule::new(1);
            let mut function = WasmFunction::new("sum");
            function.params = vec![WasmType::I32, WasmType::I32];
            function.result = Some(WasmType::I32);
            function.body.push(WasmExpression::Return {
                value: Some(Box::new(WasmExpression::binary(
                    WasmType::I32,
                    WasmBinaryOp::Add,
                    WasmExpression::get_local(0),
                    WasmExpression::get_local(1),
                ))),
            });
            module.add(function).unwrap();
            module
        };
        let text = WasmRenderer::render(&module).unwrap();
        expect![[r#"
            (module
              (memory (;0;) 1)
              (func $sum (param i32 i32) (result i32)
                (return
                  (i32.add (local.get 0) (local.get 1))
                )
              )

            )
        "#]]
        .assert_eq(&text);
    }

    #[test]
    fn indirect_call_types_are_collected_into_the_type_section() {
        let mut module = WasmModule::new(1);
        let mut function = WasmFunction::new("dispatch");
        function.params = vec![WasmType::I32];
        function.body.push(WasmExpression::CallIndirect {
            ty: WasmFunctionType::new(vec![WasmType::I32], Some(WasmType::I32)),
            selector: Box::new(WasmExpression::get_local(0)),
            args: vec![WasmExpression::get_local(0)],
        });
        module.add(function).unwrap();
        let text = WasmRenderer::render(&module).unwrap();
        assert!(text.contains("(type $sig_ii (func (param i32) (result i32)))"));
        assert!(text.contains("call_indirect (type $sig_ii)"));
    }

    #[test]
    fn imports_exports_and_start_render_as_sections() {
        let mut module = WasmModule::new(64);
        let mut import = WasmFunction::new("meth_print");
        import.params = vec![WasmType::I32];
        import.import_from = Some(WasmImport {
            module: "env".into(),
            name: "print".into(),
        });
        module.add(import).unwrap();
        let mut main = WasmFunction::new("meth_main");
        main.export_name = Some("main".into());
        module.add(main).unwrap();
        module.start = Some("meth_main".into());
        let text = WasmRenderer::render(&module).unwrap();
        assert!(text.contains("(import \"env\" \"print\" (func $meth_print (param i32)))"));
        assert!(text.contains("(export \"main\" (func $meth_main))"));
        assert!(text.contains("(start $meth_main)"));
    }

    #[test]
    fn float_remainder_shapes_are_rejected() {
        let err = binary_mnemonic(WasmType::F64, WasmBinaryOp::Rem).unwrap_err();
        assert!(err.to_string().contains("no f64 form"));
    }
}
