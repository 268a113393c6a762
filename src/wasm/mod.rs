//! Output model: the WebAssembly module assembled by the back end and the
//! renderer that serializes it to text.

pub mod expr;
pub mod render;

use std::collections::HashMap;

use crate::error::{Error, Result};

pub use expr::{
    BlockLabel, MemoryKind, WasmBinaryOp, WasmExpression, WasmUnaryOp,
};
pub use render::WasmRenderer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
}

impl WasmType {
    pub fn name(self) -> &'static str {
        match self {
            WasmType::I32 => "i32",
            WasmType::I64 => "i64",
            WasmType::F32 => "f32",
            WasmType::F64 => "f64",
        }
    }

    /// Single-letter code used in signature symbols.
    pub fn code(self) -> char {
        match self {
            WasmType::I32 => 'i',
            WasmType::I64 => 'l',
            WasmType::F32 => 'f',
            WasmType::F64 => 'd',
        }
    }
}

/// Shape of a function, the key of the indirect-call type table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WasmFunctionType {
    pub params: Vec<WasmType>,
    pub result: Option<WasmType>,
}

impl WasmFunctionType {
    pub fn new(params: Vec<WasmType>, result: Option<WasmType>) -> Self {
        Self { params, result }
    }
}

/// Source of an imported function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WasmImport {
    pub module: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct WasmFunction {
    pub name: String,
    pub params: Vec<WasmType>,
    pub result: Option<WasmType>,
    /// Declared locals beyond the parameters.
    pub locals: Vec<WasmType>,
    pub body: Vec<WasmExpression>,
    pub export_name: Option<String>,
    pub import_from: Option<WasmImport>,
}

impl WasmFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            result: None,
            locals: Vec::new(),
            body: Vec::new(),
            export_name: None,
            import_from: None,
        }
    }

    pub fn ty(&self) -> WasmFunctionType {
        WasmFunctionType::new(self.params.clone(), self.result)
    }

    pub fn is_import(&self) -> bool {
        self.import_from.is_some()
    }
}

/// The assembled module. Functions keep insertion order; names are unique
/// (a duplicate means the mangler collided, which is a bug).
#[derive(Debug, Default)]
pub struct WasmModule {
    functions: Vec<WasmFunction>,
    index: HashMap<String, usize>,
    pub memory_pages: u32,
    pub start: Option<String>,
    /// Virtual-dispatch targets, addressed by per-class slot bases.
    pub function_table: Vec<String>,
}

impl WasmModule {
    pub fn new(memory_pages: u32) -> Self {
        Self {
            memory_pages,
            ..Self::default()
        }
    }

    pub fn add(&mut self, function: WasmFunction) -> Result<()> {
        if self.index.contains_key(&function.name) {
            return Err(Error::mangling_collision(&function.name));
        }
        self.index.insert(function.name.clone(), self.functions.len());
        self.functions.push(function);
        Ok(())
    }

    pub fn functions(&self) -> &[WasmFunction] {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&WasmFunction> {
        self.index.get(name).map(|&slot| &self.functions[slot])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut WasmFunction> {
        let slot = *self.index.get(name)?;
        Some(&mut self.functions[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Check that every direct call target, table entry and the start
    /// designator resolve to a function of this module.
    pub fn validate(&self) -> Result<()> {
        let mut dangling: Option<String> = None;
        for function in &self.functions {
            for root in &function.body {
                root.walk(&mut |expr| {
                    if dangling.is_none()
                        && let WasmExpression::Call { function: target, .. } = expr
                        && !self.contains(target)
                    {
                        dangling = Some(target.clone());
                    }
                });
            }
            if let Some(target) = dangling.take() {
                return Err(Error::internal(format!(
                    "call target `{target}` in `{}` resolves to no function or import",
                    function.name
                )));
            }
        }
        for entry in &self.function_table {
            if !self.contains(entry) {
                return Err(Error::internal(format!(
                    "function table entry `{entry}` resolves to no function"
                )));
            }
        }
        if let Some(start) = &self.start
            && !self.contains(start)
        {
            return Err(Error::internal(format!(
                "start function `{start}` is not part of the module"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut module = WasmModule::new(1);
        module.add(WasmFunction::new("only")).unwrap();
        let err = module.add(WasmFunction::new("only")).unwrap_err();
        assert!(err.to_string().contains("`only` already names another function"));
    }

    #[test]
    fn validate_reports_dangling_call_targets() {
        let mut module = WasmModule::new(1);
        let mut caller = WasmFunction::new("caller");
        caller.body.push(WasmExpression::call("missing", Vec::new()));
        module.add(caller).unwrap();
        let err = module.validate().unwrap_err();
        assert!(err.to_string().contains("`missing`"));
    }

    #[test]
    fn validate_accepts_calls_to_imports() {
        let mut module = WasmModule::new(1);
        let mut import = WasmFunction::new("logged");
        import.import_from = Some(WasmImport {
            module: "env".into(),
            name: "log".into(),
        });
        module.add(import).unwrap();
        let mut caller = WasmFunction::new("caller");
        caller.body.push(WasmExpression::call("logged", Vec::new()));
        module.add(caller).unwrap();
        module.validate().unwrap();
    }
}
