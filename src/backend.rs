//! The module assembler.
//!
//! One `emit` invocation drives the whole pipeline: dispatch analysis,
//! class layout, per-method lowering, allocator bootstrap, guarded class
//! initializer wrappers, the start function, entry-point exports, and the
//! final textual serialization. Cancellation is polled cooperatively at
//! every phase boundary and inside the per-class and per-method loops; an
//! observed cancellation returns cleanly before any byte reaches the sink.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;

use crate::controller::{DependencySink, TargetController};
use crate::diagnostics::{CallLocation, DiagnosticArg};
use crate::error::Result;
use crate::generate::{
    ClassLayoutGenerator, GenerationContext, WasmGenerator, map_return_type, map_type,
};
use crate::intrinsics::WasmRuntimeIntrinsic;
use crate::mangling::{mangle_initializer, mangle_method, mangle_trap_stub};
use crate::model::ClassUniverse;
use crate::runtime::{
    self, CLASS_RECORD_BASE, HEAP_ALIGNMENT, IMPORT_ANNOTATION, INITIALIZED,
    LINEAR_MEMORY_MIN_PAGES, RECORD_FLAGS_OFFSET, STATIC_INIT_ANNOTATION,
};
use crate::vtable::VirtualTableProvider;
use crate::wasm::{
    BlockLabel, WasmBinaryOp, WasmExpression, WasmFunction, WasmFunctionType, WasmImport,
    WasmModule, WasmRenderer, WasmType,
};

pub(crate) fn emit_trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("JAVELIN_EMIT_TRACE").is_some())
}

pub(crate) fn trace_log(args: fmt::Arguments<'_>) {
    if emit_trace_enabled() {
        eprintln!("[emit::trace] {args}");
    }
}

macro_rules! emit_trace {
    ($($arg:tt)*) => {
        $crate::backend::trace_log(format_args!($($arg)*));
    };
}

/// Name of the designated start function.
pub const START_FUNCTION: &str = "__start__";

/// The WebAssembly build target. Owns nothing across builds; every emit
/// call constructs and discards its own pipeline state.
pub struct WasmBackend<'c, C: TargetController> {
    controller: &'c C,
}

impl<'c, C: TargetController> WasmBackend<'c, C> {
    pub fn new(controller: &'c C) -> Self {
        Self { controller }
    }

    /// Announce the runtime helpers that must stay reachable. Idempotent;
    /// this is the sole contract with the dependency engine.
    pub fn contribute_dependencies(&self, sink: &mut dyn DependencySink) {
        use crate::model::PrimitiveType::{Double, Float, Int, Long};
        for kind in [Int, Long, Float, Double] {
            sink.link_method(&runtime::wasm_runtime_compare(kind));
        }
        for kind in [Float, Double] {
            sink.link_method(&runtime::wasm_runtime_remainder(kind));
        }
        sink.link_method(&runtime::allocator_allocate());
        sink.link_method(&runtime::allocator_clinit());
    }

    /// Lower the universe into one textual module and write it to the
    /// sink. A cancellation observed at any checkpoint returns `Ok` with
    /// nothing written.
    pub fn emit(&self, universe: &ClassUniverse, output: &mut dyn Write) -> Result<()> {
        let diagnostics = self.controller.diagnostics();

        tracing::debug!(target: "javelin::emit", classes = universe.len(), "dispatch analysis");
        let vtables = VirtualTableProvider::build(universe, diagnostics);

        let mut classes = ClassLayoutGenerator::new(universe, &vtables, CLASS_RECORD_BASE);
        for name in universe.class_names() {
            classes.add_class(name)?;
            if self.controller.was_cancelled() {
                return Ok(());
            }
        }
        emit_trace!(
            "layout pass complete, next free address {}",
            classes.address()
        );

        let mut context = GenerationContext::new(universe);
        context.add_intrinsic(Box::new(WasmRuntimeIntrinsic::new()));
        let mut module = WasmModule::new(LINEAR_MEMORY_MIN_PAGES);

        tracing::debug!(target: "javelin::emit", "function pass");
        let allocator_initialize = runtime::allocator_initialize();
        {
            let mut generator = WasmGenerator::new(universe, &mut context, &classes, &vtables);
            for class in universe.classes() {
                for method in &class.methods {
                    let reference = method.reference();
                    if reference == allocator_initialize {
                        continue;
                    }
                    if generator.is_intrinsic(&reference) {
                        continue;
                    }
                    if method.modifiers.is_native {
                        if runtime::is_sentinel_class(&method.owner) {
                            continue;
                        }
                        if generator.imported_method(&reference).is_none() {
                            diagnostics.error(
                                Some(&CallLocation::new(reference.clone())),
                                "Method {{m0}} is native but has no {{c1}} annotation on it",
                                &[
                                    DiagnosticArg::Method(reference.clone()),
                                    DiagnosticArg::Class(IMPORT_ANNOTATION.to_string()),
                                ],
                            );
                        }
                        continue;
                    }
                    if !method.has_code() {
                        continue;
                    }
                    emit_trace!("lowering {reference}");
                    module.add(generator.generate(method)?)?;
                    if self.controller.was_cancelled() {
                        return Ok(());
                    }
                }
            }
        }

        self.render_allocator_init(&mut module, classes.address())?;
        self.render_imports(universe, &context, &mut module)?;
        self.render_class_initializers(universe, &classes, &mut module)?;
        if self.controller.was_cancelled() {
            return Ok(());
        }

        let mut start = WasmFunction::new(START_FUNCTION);
        classes.contribute_to_initializer(&mut start.body)?;
        for name in universe.class_names() {
            let Some(class) = universe.get(name) else {
                continue;
            };
            if class.annotation(STATIC_INIT_ANNOTATION).is_none() {
                continue;
            }
            if classes.is_structure(name)
                || class.method(&runtime::clinit_signature()).is_none()
            {
                continue;
            }
            start
                .body
                .push(WasmExpression::call(mangle_initializer(name), Vec::new()));
        }
        module.add(start)?;
        module.start = Some(START_FUNCTION.to_string());

        for (public_name, reference) in self.controller.entry_points() {
            // A pruned entry point is simply absent; that is not an error.
            if let Some(function) = module.get_mut(&mangle_method(reference)) {
                function.export_name = Some(public_name.clone());
            }
        }
        if self.controller.was_cancelled() {
            return Ok(());
        }

        self.render_function_table(&classes, &mut module)?;

        module.validate()?;
        let text = WasmRenderer::render(&module)?;
        output.write_all(text.as_bytes())?;
        output.flush()?;
        tracing::debug!(target: "javelin::emit", bytes = text.len(), "module serialized");
        Ok(())
    }

    /// Synthesize `Allocator.initialize`: a single return of the heap
    /// origin, the next 4096-aligned address past the class records.
    fn render_allocator_init(&self, module: &mut WasmModule, address: u32) -> Result<()> {
        let origin = ((address - 1) / HEAP_ALIGNMENT + 1) * HEAP_ALIGNMENT;
        let mut function = WasmFunction::new(mangle_method(&runtime::allocator_initialize()));
        function.result = Some(WasmType::I32);
        function.body.push(WasmExpression::Return {
            value: Some(Box::new(WasmExpression::i32(to_i32(origin)?))),
        });
        module.add(function)
    }

    /// Materialize one import declaration per Import-annotated reference
    /// recorded during the function pass.
    fn render_imports(
        &self,
        universe: &ClassUniverse,
        context: &GenerationContext<'_>,
        module: &mut WasmModule,
    ) -> Result<()> {
        for (reference, imported) in context.imports() {
            let mut function = WasmFunction::new(mangle_method(reference));
            let is_static = universe
                .method(reference)
                .is_some_and(|method| method.modifiers.is_static);
            if !is_static {
                function.params.push(WasmType::I32);
            }
            function
                .params
                .extend(reference.signature.params.iter().map(map_type));
            function.result = map_return_type(&reference.signature.ret);
            function.import_from = Some(WasmImport {
                module: imported.module.clone(),
                name: imported.name.clone(),
            });
            module.add(function)?;
        }
        Ok(())
    }

    /// Synthesize the guarded initializer wrapper of every non-structure
    /// class declaring `<clinit>`. The wrapper is one labeled block whose
    /// exit edge is the guard: branch out when the flag is already set,
    /// otherwise set it and only then call the original initializer.
    fn render_class_initializers(
        &self,
        universe: &ClassUniverse,
        classes: &ClassLayoutGenerator<'_>,
        module: &mut WasmModule,
    ) -> Result<()> {
        for name in universe.class_names() {
            if classes.is_structure(name) {
                continue;
            }
            let Some(class) = universe.get(name) else {
                continue;
            };
            let Some(clinit) = class.method(&runtime::clinit_signature()) else {
                continue;
            };

            let record = to_i32(classes.class_pointer(name)?)?;
            let label = BlockLabel(0);
            let guard = WasmExpression::BrIf {
                condition: Box::new(WasmExpression::binary(
                    WasmType::I32,
                    WasmBinaryOp::And,
                    WasmExpression::load_i32(RECORD_FLAGS_OFFSET, WasmExpression::i32(record)),
                    WasmExpression::i32(INITIALIZED),
                )),
                label,
            };
            let set_flag = WasmExpression::store_i32(
                RECORD_FLAGS_OFFSET,
                WasmExpression::i32(record),
                WasmExpression::binary(
                    WasmType::I32,
                    WasmBinaryOp::Or,
                    WasmExpression::load_i32(RECORD_FLAGS_OFFSET, WasmExpression::i32(record)),
                    WasmExpression::i32(INITIALIZED),
                ),
            );
            let call = WasmExpression::call(mangle_method(&clinit.reference()), Vec::new());

            let mut wrapper = WasmFunction::new(mangle_initializer(name));
            wrapper.body.push(WasmExpression::Block {
                label: Some(label),
                is_loop: false,
                body: vec![guard, set_flag, call],
            });
            module.add(wrapper)?;
            if self.controller.was_cancelled() {
                break;
            }
        }
        Ok(())
    }

    /// Fill the module function table from the per-class dispatch regions;
    /// targetless slots point at per-signature trap stubs.
    fn render_function_table(
        &self,
        classes: &ClassLayoutGenerator<'_>,
        module: &mut WasmModule,
    ) -> Result<()> {
        let mut table = Vec::with_capacity(classes.function_table().len());
        for slot in classes.function_table() {
            // A slot whose target never made it into the module (omitted
            // native, unreferenced import) traps like a targetless one.
            let compiled = slot
                .target
                .as_ref()
                .map(mangle_method)
                .filter(|name| module.contains(name));
            match compiled {
                Some(name) => table.push(name),
                None => {
                    let mut params = vec![WasmType::I32];
                    params.extend(slot.signature.params.iter().map(map_type));
                    let ty =
                        WasmFunctionType::new(params, map_return_type(&slot.signature.ret));
                    let name = mangle_trap_stub(&ty);
                    if !module.contains(&name) {
                        let mut stub = WasmFunction::new(name.clone());
                        stub.params = ty.params.clone();
                        stub.result = ty.result;
                        stub.body.push(WasmExpression::Unreachable);
                        module.add(stub)?;
                    }
                    table.push(name);
                }
            }
        }
        module.function_table = table;
        Ok(())
    }
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| crate::error::Error::internal("address exceeds the i32 range"))
}
