//! The wasm-runtime intrinsic group: three-way comparison, floating
//! remainder and raw linear-memory access on `runtime.WasmRuntime`.

use crate::error::{Error, Result};
use crate::model::{MethodReference, PrimitiveType};
use crate::runtime;
use crate::wasm::{MemoryKind, WasmBinaryOp, WasmExpression, WasmType, WasmUnaryOp};

pub struct WasmRuntimeIntrinsic {
    recognized: Vec<MethodReference>,
}

impl WasmRuntimeIntrinsic {
    pub fn new() -> Self {
        let mut recognized = Vec::new();
        for kind in [
            PrimitiveType::Int,
            PrimitiveType::Long,
            PrimitiveType::Float,
            PrimitiveType::Double,
        ] {
            recognized.push(runtime::wasm_runtime_compare(kind));
        }
        for kind in [PrimitiveType::Float, PrimitiveType::Double] {
            recognized.push(runtime::wasm_runtime_remainder(kind));
        }
        recognized.push(runtime::wasm_runtime_load_int());
        recognized.push(runtime::wasm_runtime_store_int());
        Self { recognized }
    }
}

impl Default for WasmRuntimeIntrinsic {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Intrinsic for WasmRuntimeIntrinsic {
    fn applies_to(&self, reference: &MethodReference) -> bool {
        self.recognized.contains(reference)
    }

    fn emit(
        &self,
        reference: &MethodReference,
        args: Vec<WasmExpression>,
    ) -> Result<WasmExpression> {
        match reference.name() {
            "compare" => {
                let ty = operand_type(reference)?;
                let [lhs, rhs] = two_args(reference, args)?;
                // (x > y) - (x < y): each comparison already yields i32.
                Ok(WasmExpression::binary(
                    WasmType::I32,
                    WasmBinaryOp::Sub,
                    WasmExpression::binary(ty, WasmBinaryOp::Gt, lhs.clone(), rhs.clone()),
                    WasmExpression::binary(ty, WasmBinaryOp::Lt, lhs, rhs),
                ))
            }
            "remainder" => {
                let ty = operand_type(reference)?;
                let [lhs, rhs] = two_args(reference, args)?;
                // x - trunc(x / y) * y
                Ok(WasmExpression::binary(
                    ty,
                    WasmBinaryOp::Sub,
                    lhs.clone(),
                    WasmExpression::binary(
                        ty,
                        WasmBinaryOp::Mul,
                        WasmExpression::Unary {
                            ty,
                            op: WasmUnaryOp::Trunc,
                            operand: Box::new(WasmExpression::binary(
                                ty,
                                WasmBinaryOp::Div,
                                lhs,
                                rhs.clone(),
                            )),
                        },
                        rhs,
                    ),
                ))
            }
            "loadInt" => {
                let [address] = one_arg(reference, args)?;
                Ok(WasmExpression::Load {
                    kind: MemoryKind::I32,
                    offset: 0,
                    address: Box::new(address),
                })
            }
            "storeInt" => {
                let [address, value] = two_args(reference, args)?;
                Ok(WasmExpression::Store {
                    kind: MemoryKind::I32,
                    offset: 0,
                    address: Box::new(address),
                    value: Box::new(value),
                })
            }
            other => Err(Error::internal(format!(
                "wasm-runtime intrinsic has no emitter for `{other}`"
            ))),
        }
    }
}

fn operand_type(reference: &MethodReference) -> Result<WasmType> {
    let param = reference.signature.params.first().ok_or_else(|| {
        Error::internal(format!("intrinsic `{reference}` lacks an operand type"))
    })?;
    Ok(crate::generate::map_type(param))
}

fn one_arg(reference: &MethodReference, args: Vec<WasmExpression>) -> Result<[WasmExpression; 1]> {
    <[WasmExpression; 1]>::try_from(args)
        .map_err(|_| Error::internal(format!("intrinsic `{reference}` expects one argument")))
}

fn two_args(reference: &MethodReference, args: Vec<WasmExpression>) -> Result<[WasmExpression; 2]> {
    <[WasmExpression; 2]>::try_from(args)
        .map_err(|_| Error::internal(format!("intrinsic `{reference}` expects two arguments")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::Intrinsic;

    #[test]
    fn compare_lowers_to_greater_minus_less() {
        let intrinsic = WasmRuntimeIntrinsic::new();
        let reference = runtime::wasm_runtime_compare(PrimitiveType::Long);
        let lowered = intrinsic
            .emit(
                &reference,
                vec![WasmExpression::get_local(0), WasmExpression::get_local(1)],
            )
            .unwrap();
        let WasmExpression::Binary { ty, op, lhs, rhs } = lowered else {
            panic!("expected a binary lowering");
        };
        assert_eq!((ty, op), (WasmType::I32, WasmBinaryOp::Sub));
        assert!(matches!(
            *lhs,
            WasmExpression::Binary {
                ty: WasmType::I64,
                op: WasmBinaryOp::Gt,
                ..
            }
        ));
        assert!(matches!(
            *rhs,
            WasmExpression::Binary {
                ty: WasmType::I64,
                op: WasmBinaryOp::Lt,
                ..
            }
        ));
    }

    #[test]
    fn remainder_lowers_through_truncated_division() {
        let intrinsic = WasmRuntimeIntrinsic::new();
        let reference = runtime::wasm_runtime_remainder(PrimitiveType::Double);
        let lowered = intrinsic
            .emit(
                &reference,
                vec![WasmExpression::get_local(0), WasmExpression::get_local(1)],
            )
            .unwrap();
        let WasmExpression::Binary { ty, op, rhs, .. } = lowered else {
            panic!("expected a binary lowering");
        };
        assert_eq!((ty, op), (WasmType::F64, WasmBinaryOp::Sub));
        assert!(matches!(
            *rhs,
            WasmExpression::Binary {
                op: WasmBinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn raw_memory_ops_lower_to_loads_and_stores() {
        let intrinsic = WasmRuntimeIntrinsic::new();
        let load = intrinsic
            .emit(
                &runtime::wasm_runtime_load_int(),
                vec![WasmExpression::get_local(0)],
            )
            .unwrap();
        assert!(matches!(load, WasmExpression::Load { .. }));
        let store = intrinsic
            .emit(
                &runtime::wasm_runtime_store_int(),
                vec![WasmExpression::get_local(0), WasmExpression::i32(7)],
            )
            .unwrap();
        assert!(matches!(store, WasmExpression::Store { .. }));
    }
}
