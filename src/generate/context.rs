//! Per-emit generation context: the intrinsic registry and the import
//! declarations accumulated while lowering call sites. One context lives
//! for the duration of a single emit invocation.

use std::collections::HashMap;

use crate::intrinsics::{Intrinsic, IntrinsicRegistry};
use crate::model::{ClassUniverse, MethodReference};
use crate::runtime::IMPORT_ANNOTATION;

/// Module/name pair of an Import-annotated native method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedMethod {
    pub module: String,
    pub name: String,
}

pub struct GenerationContext<'u> {
    universe: &'u ClassUniverse,
    intrinsics: IntrinsicRegistry,
    imports: Vec<(MethodReference, ImportedMethod)>,
    import_index: HashMap<MethodReference, usize>,
}

impl<'u> GenerationContext<'u> {
    pub fn new(universe: &'u ClassUniverse) -> Self {
        Self {
            universe,
            intrinsics: IntrinsicRegistry::new(),
            imports: Vec::new(),
            import_index: HashMap::new(),
        }
    }

    pub fn add_intrinsic(&mut self, intrinsic: Box<dyn Intrinsic>) {
        self.intrinsics.add(intrinsic);
    }

    pub fn intrinsic(&self, reference: &MethodReference) -> Option<&dyn Intrinsic> {
        self.intrinsics.find(reference)
    }

    /// Import descriptor of the referenced method, read from its Import
    /// annotation. Absent values default to module `env` and the method's
    /// simple name.
    pub fn imported_method(&self, reference: &MethodReference) -> Option<ImportedMethod> {
        let method = self.universe.method(reference)?;
        let annotation = method.annotation(IMPORT_ANNOTATION)?;
        Some(ImportedMethod {
            module: annotation
                .string_value("module")
                .unwrap_or("env")
                .to_string(),
            name: annotation
                .string_value("name")
                .unwrap_or(reference.name())
                .to_string(),
        })
    }

    /// Record a call-site reference to an Import-annotated method. The
    /// declaration is created on first reference and reused afterwards.
    pub fn reference_import(&mut self, reference: &MethodReference) -> Option<&ImportedMethod> {
        if let Some(&slot) = self.import_index.get(reference) {
            return Some(&self.imports[slot].1);
        }
        let imported = self.imported_method(reference)?;
        self.import_index
            .insert(reference.clone(), self.imports.len());
        self.imports.push((reference.clone(), imported));
        self.imports.last().map(|(_, imported)| imported)
    }

    /// Declared imports in first-reference order.
    pub fn imports(&self) -> &[(MethodReference, ImportedMethod)] {
        &self.imports
    }
}
