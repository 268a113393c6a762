#![deny(warnings)]
#![deny(clippy::all, clippy::perf, clippy::suspicious)]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Whole-program ahead-of-time back end lowering a linked class-file
//! universe into a textual WebAssembly module.
//!
//! The pipeline is single-shot: [`backend::WasmBackend::emit`] consumes a
//! read-only [`model::ClassUniverse`] plus the decompiled bodies attached
//! to its methods and writes one module to the output sink. Everything the
//! build needs — dispatch tables, class records, the intrinsic registry,
//! the import declarations — is created inside that call and dropped at
//! its end.

pub mod backend;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod generate;
pub mod intrinsics;
pub mod logging;
pub mod mangling;
pub mod model;
pub mod runtime;
pub mod vtable;
pub mod wasm;

pub use backend::{START_FUNCTION, WasmBackend};
pub use controller::{BuildController, DependencySink, TargetController};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
