use crate::model::{PrimitiveType, ValueType};
use crate::wasm::{MemoryKind, WasmType};

/// Stack representation of a source-level value on wasm32. References and
/// aggregates travel as linear-memory addresses.
pub(crate) fn map_type(ty: &ValueType) -> WasmType {
    match ty {
        ValueType::Void | ValueType::Object(_) | ValueType::Array(_) => WasmType::I32,
        ValueType::Primitive(kind) => match kind {
            PrimitiveType::Boolean
            | PrimitiveType::Byte
            | PrimitiveType::Short
            | PrimitiveType::Char
            | PrimitiveType::Int => WasmType::I32,
            PrimitiveType::Long => WasmType::I64,
            PrimitiveType::Float => WasmType::F32,
            PrimitiveType::Double => WasmType::F64,
        },
    }
}

pub(crate) fn map_return_type(ty: &ValueType) -> Option<WasmType> {
    if ty.is_void() { None } else { Some(map_type(ty)) }
}

/// Memory access shape of a field of the given type.
pub(crate) fn memory_kind(ty: &ValueType) -> MemoryKind {
    match ty {
        ValueType::Void | ValueType::Object(_) | ValueType::Array(_) => MemoryKind::I32,
        ValueType::Primitive(kind) => match kind {
            PrimitiveType::Boolean => MemoryKind::U8,
            PrimitiveType::Byte => MemoryKind::I8,
            PrimitiveType::Short => MemoryKind::I16,
            PrimitiveType::Char => MemoryKind::U16,
            PrimitiveType::Int => MemoryKind::I32,
            PrimitiveType::Long => MemoryKind::I64,
            PrimitiveType::Float => MemoryKind::F32,
            PrimitiveType::Double => MemoryKind::F64,
        },
    }
}

/// Storage footprint of a field in linear memory.
pub(crate) fn field_size(ty: &ValueType) -> u32 {
    match ty {
        ValueType::Void => 0,
        ValueType::Object(_) | ValueType::Array(_) => 4,
        ValueType::Primitive(kind) => kind.byte_size(),
    }
}
