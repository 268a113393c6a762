//! Class layout: runtime-descriptor addresses, instance field offsets and
//! the dispatch regions of the module function table.
//!
//! Classes are laid out strictly in universe order; record addresses grow
//! monotonically from the record base and stay 4-byte aligned, which makes
//! two runs over the same universe byte-identical.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{ClassUniverse, FieldReference, MethodReference, MethodSignature};
use crate::runtime::{
    OBJECT_HEADER_SIZE, RECORD_FLAGS_OFFSET, RECORD_HEADER_SIZE, RECORD_PARENT_OFFSET,
    RECORD_SIZE_OFFSET, RECORD_TABLE_OFFSET, is_sentinel_class,
};
use crate::vtable::VirtualTableProvider;
use crate::wasm::WasmExpression;

use super::types::field_size;

/// One slot of the module function table, claimed by a class dispatch
/// region. Targetless slots lower to trap stubs.
#[derive(Clone, Debug)]
pub struct TableSlot {
    pub signature: MethodSignature,
    pub target: Option<MethodReference>,
}

#[derive(Clone, Debug)]
struct ClassRecord {
    address: u32,
    instance_size: u32,
    table_base: u32,
    superclass: Option<String>,
}

pub struct ClassLayoutGenerator<'a> {
    universe: &'a ClassUniverse,
    vtables: &'a VirtualTableProvider,
    address: u32,
    records: Vec<ClassRecord>,
    record_index: HashMap<String, usize>,
    structures: HashMap<String, bool>,
    instance_offsets: HashMap<FieldReference, u32>,
    instance_sizes: HashMap<String, u32>,
    static_addresses: HashMap<FieldReference, u32>,
    function_table: Vec<TableSlot>,
}

impl<'a> ClassLayoutGenerator<'a> {
    pub fn new(
        universe: &'a ClassUniverse,
        vtables: &'a VirtualTableProvider,
        base_address: u32,
    ) -> Self {
        Self {
            universe,
            vtables,
            address: base_address,
            records: Vec::new(),
            record_index: HashMap::new(),
            structures: HashMap::new(),
            instance_offsets: HashMap::new(),
            instance_sizes: HashMap::new(),
            static_addresses: HashMap::new(),
            function_table: Vec::new(),
        }
    }

    /// Lay out one class. Must be called once per class, in universe order.
    pub fn add_class(&mut self, name: &str) -> Result<()> {
        let class = self
            .universe
            .get(name)
            .ok_or_else(|| Error::internal(format!("layout requested for unknown class `{name}`")))?;

        let structure = self.compute_structure(name);
        self.structures.insert(name.to_string(), structure);
        self.ensure_instance_layout(name)?;
        if structure {
            return Ok(());
        }

        let address = align_to(self.address, 4);
        let table_base = u32::try_from(self.function_table.len())
            .map_err(|_| Error::internal("function table exceeds addressable size"))?;
        if let Some(table) = self.vtables.lookup(name) {
            for entry in &table.entries {
                self.function_table.push(TableSlot {
                    signature: entry.signature.clone(),
                    target: entry.implementor.clone(),
                });
            }
        }

        let mut offset = RECORD_HEADER_SIZE;
        for field in &class.fields {
            if !field.is_static {
                continue;
            }
            let size = field_size(&field.ty);
            offset = align_to(offset, size.max(1));
            self.static_addresses
                .insert(FieldReference::new(name, field.name.clone()), address + offset);
            offset += size;
        }
        let record_size = align_to(offset, 4);

        self.record_index.insert(name.to_string(), self.records.len());
        self.records.push(ClassRecord {
            address,
            instance_size: self.instance_size(name)?,
            table_base,
            superclass: class.superclass.clone(),
        });
        self.address = address + record_size;
        Ok(())
    }

    /// Next free linear-memory address after every laid-out record.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Runtime-descriptor address of a class. Asking for a structure or an
    /// unknown class is an invariant violation.
    pub fn class_pointer(&self, name: &str) -> Result<u32> {
        self.record_index
            .get(name)
            .map(|&slot| self.records[slot].address)
            .ok_or_else(|| Error::unknown_class_pointer(name))
    }

    pub fn is_structure(&self, name: &str) -> bool {
        self.structures
            .get(name)
            .copied()
            .unwrap_or_else(|| self.compute_structure(name))
    }

    pub fn field_offset(&self, field: &FieldReference) -> Result<u32> {
        self.instance_offsets.get(field).copied().ok_or_else(|| {
            Error::internal(format!("no layout recorded for instance field `{field}`"))
        })
    }

    pub fn static_field_address(&self, field: &FieldReference) -> Result<u32> {
        self.static_addresses.get(field).copied().ok_or_else(|| {
            Error::internal(format!("no address recorded for static field `{field}`"))
        })
    }

    pub fn instance_size(&self, name: &str) -> Result<u32> {
        self.instance_sizes.get(name).copied().ok_or_else(|| {
            Error::internal(format!("no instance layout recorded for class `{name}`"))
        })
    }

    /// Base index of the class's dispatch region in the function table.
    pub fn table_base(&self, name: &str) -> Result<u32> {
        self.record_index
            .get(name)
            .map(|&slot| self.records[slot].table_base)
            .ok_or_else(|| {
                Error::internal(format!("dispatch table base requested for `{name}`"))
            })
    }

    pub fn function_table(&self) -> &[TableSlot] {
        &self.function_table
    }

    /// Append the store expressions that write every class record header
    /// into linear memory. Runs at module start, ahead of all `<clinit>`
    /// calls.
    pub fn contribute_to_initializer(&self, body: &mut Vec<WasmExpression>) -> Result<()> {
        for record in &self.records {
            let address = to_i32(record.address)?;
            body.push(WasmExpression::store_i32(
                RECORD_SIZE_OFFSET,
                WasmExpression::i32(address),
                WasmExpression::i32(to_i32(record.instance_size)?),
            ));
            body.push(WasmExpression::store_i32(
                RECORD_FLAGS_OFFSET,
                WasmExpression::i32(address),
                WasmExpression::i32(0),
            ));
            body.push(WasmExpression::store_i32(
                RECORD_TABLE_OFFSET,
                WasmExpression::i32(address),
                WasmExpression::i32(to_i32(record.table_base)?),
            ));
            body.push(WasmExpression::store_i32(
                RECORD_PARENT_OFFSET,
                WasmExpression::i32(address),
                WasmExpression::i32(to_i32(self.superclass_pointer(record)?)?),
            ));
        }
        Ok(())
    }

    /// Record address of the nearest laid-out ancestor, 0 when none.
    fn superclass_pointer(&self, record: &ClassRecord) -> Result<u32> {
        let mut current = record.superclass.clone();
        while let Some(name) = current {
            if let Some(&slot) = self.record_index.get(&name) {
                return Ok(self.records[slot].address);
            }
            current = self
                .universe
                .get(&name)
                .and_then(|class| class.superclass.clone());
        }
        Ok(0)
    }

    fn compute_structure(&self, name: &str) -> bool {
        if is_sentinel_class(name) {
            return true;
        }
        let Some(class) = self.universe.get(name) else {
            return false;
        };
        if class.flags.is_structure {
            return true;
        }
        class
            .superclass
            .as_deref()
            .is_some_and(|parent| self.compute_structure(parent))
    }

    /// Compute instance offsets and total size, parents first. Structures
    /// start at offset 0; heap classes reserve the object header.
    fn ensure_instance_layout(&mut self, name: &str) -> Result<u32> {
        if let Some(&size) = self.instance_sizes.get(name) {
            return Ok(size);
        }
        let class = self.universe.get(name).ok_or_else(|| {
            Error::internal(format!("instance layout requested for unknown class `{name}`"))
        })?;

        let base = if let Some(parent) = class.superclass.as_deref()
            && self.universe.contains(parent)
        {
            self.ensure_instance_layout(parent)?
        } else if self.compute_structure(name) {
            0
        } else {
            OBJECT_HEADER_SIZE
        };

        let mut offset = base;
        for field in &class.fields {
            if field.is_static {
                continue;
            }
            let size = field_size(&field.ty);
            offset = align_to(offset, size.max(1));
            self.instance_offsets
                .insert(FieldReference::new(name, field.name.clone()), offset);
            offset += size;
        }
        let size = align_to(offset, 4);
        self.instance_sizes.insert(name.to_string(), size);
        Ok(size)
    }
}

pub(crate) fn align_to(offset: u32, align: u32) -> u32 {
    if align <= 1 {
        return offset;
    }
    let mask = align - 1;
    (offset + mask) & !mask
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::internal("linear-memory address exceeds the i32 range"))
}
