//! Deterministic, injective encoding of source-level references into target
//! symbol names. Three disjoint namespaces: compiled methods, synthesized
//! class initializer wrappers, and indirect-call type entries.

use crate::model::MethodReference;
use crate::wasm::WasmFunctionType;

/// Symbol of a compiled or imported method. Class, simple name and
/// signature descriptor are sanitized separately and joined with `__`,
/// which sanitized text can never contain, so the encoding stays injective
/// across part boundaries.
pub fn mangle_method(reference: &MethodReference) -> String {
    format!(
        "meth_{}__{}__{}",
        sanitize(&reference.class),
        sanitize(&reference.signature.name),
        sanitize(&reference.signature.descriptor())
    )
}

/// Symbol of the guarded initializer wrapper of a class.
pub fn mangle_initializer(class: &str) -> String {
    format!("initclass_{}", sanitize(class))
}

/// Symbol of an indirect-call type entry.
pub fn mangle_signature(ty: &WasmFunctionType) -> String {
    let mut out = String::from("sig_");
    out.push(ty.result.map_or('v', |result| result.code()));
    for param in &ty.params {
        out.push(param.code());
    }
    out
}

/// Symbol of the trap stub standing in for an unresolvable dispatch slot of
/// the given shape.
pub fn mangle_trap_stub(ty: &WasmFunctionType) -> String {
    format!("trap_{}", mangle_signature(ty))
}

/// Escape everything outside `[A-Za-z0-9]` as `_` plus two hex digits. The
/// escape character itself is escaped, so the mapping is injective and
/// every `_` in the output is followed by two hex digits (hence no `__`).
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push('_');
            out.push(hex_digit(byte >> 4));
            out.push(hex_digit(byte & 0xF));
        }
    }
    out
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16).unwrap_or('0')
}
