//! Inline expansion of selected runtime methods.
//!
//! An intrinsic replaces an invocation with a target expression instead of
//! a call; the registry is additive and resolves references by exact match.

mod wasm_runtime;

pub use wasm_runtime::WasmRuntimeIntrinsic;

use crate::error::Result;
use crate::model::MethodReference;
use crate::wasm::WasmExpression;

pub trait Intrinsic {
    fn applies_to(&self, reference: &MethodReference) -> bool;

    /// Produce the replacement expression for an invocation whose argument
    /// expressions are already lowered.
    fn emit(&self, reference: &MethodReference, args: Vec<WasmExpression>)
    -> Result<WasmExpression>;
}

#[derive(Default)]
pub struct IntrinsicRegistry {
    entries: Vec<Box<dyn Intrinsic>>,
}

impl IntrinsicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, intrinsic: Box<dyn Intrinsic>) {
        self.entries.push(intrinsic);
    }

    pub fn find(&self, reference: &MethodReference) -> Option<&dyn Intrinsic> {
        self.entries
            .iter()
            .map(AsRef::as_ref)
            .find(|intrinsic| intrinsic.applies_to(reference))
    }
}
