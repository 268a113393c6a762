//! Seams toward the driver and the reachability engine.

use std::cell::Cell;
use std::collections::BTreeMap;

use crate::diagnostics::Diagnostics;
use crate::model::MethodReference;

/// Host services the assembler consumes: diagnostics reporting, cooperative
/// cancellation and the configured entry points.
pub trait TargetController {
    fn diagnostics(&self) -> &Diagnostics;

    /// Polled at every phase boundary and inside the per-class and
    /// per-method loops; `true` aborts the emit cleanly with no output.
    fn was_cancelled(&self) -> bool;

    /// Public export name to method reference, in export-name order.
    fn entry_points(&self) -> &BTreeMap<String, MethodReference>;
}

/// Receiver of reachability announcements; implemented by the dependency
/// engine of the surrounding toolchain.
pub trait DependencySink {
    fn link_method(&mut self, method: &MethodReference);
}

impl DependencySink for Vec<MethodReference> {
    fn link_method(&mut self, method: &MethodReference) {
        self.push(method.clone());
    }
}

/// Plain controller used by drivers and tests.
#[derive(Debug, Default)]
pub struct BuildController {
    diagnostics: Diagnostics,
    cancelled: Cell<bool>,
    entry_points: BTreeMap<String, MethodReference>,
}

impl BuildController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry_point(&mut self, public_name: impl Into<String>, method: MethodReference) {
        self.entry_points.insert(public_name.into(), method);
    }

    pub fn remove_entry_point(&mut self, public_name: &str) {
        self.entry_points.remove(public_name);
    }

    /// Request cancellation; the next poll observes it.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }
}

impl TargetController for BuildController {
    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn was_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    fn entry_points(&self) -> &BTreeMap<String, MethodReference> {
        &self.entry_points
    }
}
