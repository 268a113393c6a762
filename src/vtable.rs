//! Virtual-dispatch analysis.
//!
//! A single scan over every basic-block program collects the method
//! references that are invoked virtually anywhere in the program; only
//! those signatures earn dispatch slots (the tables are tree-shaken).
//! Tables are then built root-down: a class inherits its parent's slots,
//! re-points the ones it overrides and appends the signatures it
//! introduces, so a slot index agrees across the whole hierarchy.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{CallLocation, DiagnosticArg, Diagnostics};
use crate::model::program::{Instruction, InvocationKind};
use crate::model::{ClassUniverse, MethodReference, MethodSignature};

#[derive(Clone, Debug)]
pub struct VirtualTableEntry {
    pub signature: MethodSignature,
    /// Concrete implementation bound to the slot; `None` lowers to a trap
    /// stub (abstract or undeclared target).
    pub implementor: Option<MethodReference>,
}

#[derive(Clone, Debug)]
pub struct VirtualTable {
    pub class: String,
    pub entries: Vec<VirtualTableEntry>,
}

impl VirtualTable {
    pub fn slot(&self, signature: &MethodSignature) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.signature == *signature)
    }
}

#[derive(Debug, Default)]
pub struct VirtualTableProvider {
    tables: HashMap<String, VirtualTable>,
}

impl VirtualTableProvider {
    /// Scan the universe and build every class's dispatch table. Input
    /// problems are reported through `diagnostics`; the provider itself
    /// never fails.
    pub fn build(universe: &ClassUniverse, diagnostics: &Diagnostics) -> Self {
        let scan = scan_virtual_sites(universe);

        let mut introduced: HashMap<String, Vec<MethodSignature>> = HashMap::new();
        let mut unresolved: HashMap<String, Vec<MethodSignature>> = HashMap::new();
        for site in &scan {
            match find_declaration(universe, &site.target) {
                Some(declaring) => {
                    let slots = introduced.entry(declaring).or_default();
                    if !slots.contains(&site.target.signature) {
                        slots.push(site.target.signature.clone());
                    }
                }
                None => {
                    diagnostics.error(
                        Some(&CallLocation::new(site.caller.clone())),
                        "Virtual call target {{m0}} is not declared by {{c1}} or any of its \
                         superclasses",
                        &[
                            DiagnosticArg::Method(site.target.clone()),
                            DiagnosticArg::Class(site.target.class.clone()),
                        ],
                    );
                    if universe.contains(&site.target.class) {
                        let slots = unresolved.entry(site.target.class.clone()).or_default();
                        if !slots.contains(&site.target.signature) {
                            slots.push(site.target.signature.clone());
                        }
                    }
                }
            }
        }

        let mut provider = Self::default();
        for name in universe.class_names() {
            provider.build_table(universe, name, &introduced, &unresolved);
        }
        provider
    }

    pub fn lookup(&self, class: &str) -> Option<&VirtualTable> {
        self.tables.get(class)
    }

    fn build_table(
        &mut self,
        universe: &ClassUniverse,
        name: &str,
        introduced: &HashMap<String, Vec<MethodSignature>>,
        unresolved: &HashMap<String, Vec<MethodSignature>>,
    ) {
        if self.tables.contains_key(name) {
            return;
        }
        let Some(class) = universe.get(name) else {
            return;
        };
        if class.flags.is_interface {
            return;
        }

        let mut entries = Vec::new();
        if let Some(parent) = class.superclass.as_deref() {
            self.build_table(universe, parent, introduced, unresolved);
            if let Some(parent_table) = self.tables.get(parent) {
                entries = parent_table.entries.clone();
            }
        }

        for method in &class.methods {
            if method.modifiers.is_static || method.signature.name.starts_with('<') {
                continue;
            }
            let implementor = if method.modifiers.is_abstract {
                None
            } else {
                Some(method.reference())
            };
            if let Some(slot) = entries
                .iter()
                .position(|entry: &VirtualTableEntry| entry.signature == method.signature)
            {
                entries[slot].implementor = implementor;
            } else if introduced
                .get(name)
                .is_some_and(|slots| slots.contains(&method.signature))
            {
                entries.push(VirtualTableEntry {
                    signature: method.signature.clone(),
                    implementor,
                });
            }
        }

        if let Some(slots) = unresolved.get(name) {
            for signature in slots {
                if entries.iter().all(|entry| entry.signature != *signature) {
                    entries.push(VirtualTableEntry {
                        signature: signature.clone(),
                        implementor: None,
                    });
                }
            }
        }

        self.tables.insert(
            name.to_string(),
            VirtualTable {
                class: name.to_string(),
                entries,
            },
        );
    }
}

struct VirtualSite {
    caller: MethodReference,
    target: MethodReference,
}

/// Every distinct virtually-invoked reference, in first-encounter order,
/// with the method containing its first call site.
fn scan_virtual_sites(universe: &ClassUniverse) -> Vec<VirtualSite> {
    let mut seen = HashSet::new();
    let mut sites = Vec::new();
    for class in universe.classes() {
        for method in &class.methods {
            let Some(program) = &method.program else {
                continue;
            };
            for instruction in program.instructions() {
                if let Instruction::Invoke {
                    method: target,
                    kind: InvocationKind::Virtual,
                } = instruction
                    && seen.insert(target.clone())
                {
                    sites.push(VirtualSite {
                        caller: method.reference(),
                        target: target.clone(),
                    });
                }
            }
        }
    }
    sites
}

/// Walk the superclass chain of the referenced class up to the class that
/// declares the signature as an instance method.
fn find_declaration(universe: &ClassUniverse, target: &MethodReference) -> Option<String> {
    let mut current = Some(target.class.as_str());
    while let Some(name) = current {
        let class = universe.get(name)?;
        if class
            .method(&target.signature)
            .is_some_and(|method| !method.modifiers.is_static)
        {
            return Some(name.to_string());
        }
        current = class.superclass.as_deref();
    }
    None
}
