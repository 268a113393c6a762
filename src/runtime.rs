//! Well-known names and layout constants of the target runtime support
//! classes. The back end synthesizes calls into these; their sources live in
//! the runtime support library linked into every program.

use crate::model::{MethodReference, MethodSignature, PrimitiveType, ValueType};

/// Sentinel class whose instances are inline value aggregates.
pub const STRUCTURE_CLASS: &str = "interop.Structure";
/// Sentinel class representing a raw linear-memory pointer.
pub const ADDRESS_CLASS: &str = "interop.Address";
/// Annotation marking a native method as a module import.
pub const IMPORT_ANNOTATION: &str = "interop.Import";
/// Annotation requesting eager static initialization at module start.
pub const STATIC_INIT_ANNOTATION: &str = "interop.StaticInit";

pub const ALLOCATOR_CLASS: &str = "runtime.Allocator";
pub const RUNTIME_CLASS: &str = "runtime.RuntimeClass";
pub const WASM_RUNTIME_CLASS: &str = "runtime.WasmRuntime";

/// Bit set in the record flag word once the class initializer has run.
pub const INITIALIZED: i32 = 1;

/// Linear-memory address of the first class record.
pub const CLASS_RECORD_BASE: u32 = 256;
/// The heap origin is rounded up to this boundary after the last record.
pub const HEAP_ALIGNMENT: u32 = 4096;
/// Declared initial size of the module's linear memory, in 64 KiB pages.
pub const LINEAR_MEMORY_MIN_PAGES: u32 = 64;

/// Class record layout: instance size word.
pub const RECORD_SIZE_OFFSET: u32 = 0;
/// Class record layout: initialization flag word.
pub const RECORD_FLAGS_OFFSET: u32 = 4;
/// Class record layout: dispatch-table pointer.
pub const RECORD_TABLE_OFFSET: u32 = 8;
/// Class record layout: superclass record pointer, 0 when none.
pub const RECORD_PARENT_OFFSET: u32 = 12;
pub const RECORD_HEADER_SIZE: u32 = 16;

/// Object instances lead with the class-record address.
pub const OBJECT_HEADER_SIZE: u32 = 4;

/// Name of every class initializer method.
pub const CLINIT_NAME: &str = "<clinit>";

pub fn is_sentinel_class(name: &str) -> bool {
    name == STRUCTURE_CLASS || name == ADDRESS_CLASS
}

pub fn clinit_signature() -> MethodSignature {
    MethodSignature::new(CLINIT_NAME, Vec::new(), ValueType::Void)
}

pub fn class_initializer(class: &str) -> MethodReference {
    MethodReference::new(class, clinit_signature())
}

/// `Allocator.initialize() -> Address`, synthesized by the assembler to
/// return the heap origin.
pub fn allocator_initialize() -> MethodReference {
    MethodReference::new(
        ALLOCATOR_CLASS,
        MethodSignature::new("initialize", Vec::new(), ValueType::object(ADDRESS_CLASS)),
    )
}

/// `Allocator.allocate(RuntimeClass) -> Address`, the heap allocation entry.
pub fn allocator_allocate() -> MethodReference {
    MethodReference::new(
        ALLOCATOR_CLASS,
        MethodSignature::new(
            "allocate",
            vec![ValueType::object(RUNTIME_CLASS)],
            ValueType::object(ADDRESS_CLASS),
        ),
    )
}

pub fn allocator_clinit() -> MethodReference {
    class_initializer(ALLOCATOR_CLASS)
}

/// `WasmRuntime.compare(T, T) -> int` three-way comparison helpers.
pub fn wasm_runtime_compare(kind: PrimitiveType) -> MethodReference {
    MethodReference::new(
        WASM_RUNTIME_CLASS,
        MethodSignature::new(
            "compare",
            vec![ValueType::Primitive(kind), ValueType::Primitive(kind)],
            ValueType::Primitive(PrimitiveType::Int),
        ),
    )
}

/// `WasmRuntime.remainder(T, T) -> T` floating remainder helpers.
pub fn wasm_runtime_remainder(kind: PrimitiveType) -> MethodReference {
    MethodReference::new(
        WASM_RUNTIME_CLASS,
        MethodSignature::new(
            "remainder",
            vec![ValueType::Primitive(kind), ValueType::Primitive(kind)],
            ValueType::Primitive(kind),
        ),
    )
}

/// `WasmRuntime.loadInt(Address) -> int` raw memory read.
pub fn wasm_runtime_load_int() -> MethodReference {
    MethodReference::new(
        WASM_RUNTIME_CLASS,
        MethodSignature::new(
            "loadInt",
            vec![ValueType::object(ADDRESS_CLASS)],
            ValueType::Primitive(PrimitiveType::Int),
        ),
    )
}

/// `WasmRuntime.storeInt(Address, int)` raw memory write.
pub fn wasm_runtime_store_int() -> MethodReference {
    MethodReference::new(
        WASM_RUNTIME_CLASS,
        MethodSignature::new(
            "storeInt",
            vec![
                ValueType::object(ADDRESS_CLASS),
                ValueType::Primitive(PrimitiveType::Int),
            ],
            ValueType::Void,
        ),
    )
}
