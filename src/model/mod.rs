//! Input model consumed by the back end: a fully linked class universe with
//! decompiled method bodies attached.
//!
//! The front end, register allocator and decompiler live elsewhere; this
//! module is the shape of their combined output. Everything here is
//! read-only during an emit invocation.

pub mod ast;
pub mod program;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Primitive value kinds of the source bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Char => 'C',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    /// Storage footprint of the primitive in linear memory, in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            PrimitiveType::Boolean | PrimitiveType::Byte => 1,
            PrimitiveType::Short | PrimitiveType::Char => 2,
            PrimitiveType::Int | PrimitiveType::Float => 4,
            PrimitiveType::Long | PrimitiveType::Double => 8,
        }
    }
}

/// A field or method value type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Primitive(PrimitiveType),
    Object(String),
    Array(Box<ValueType>),
}

impl ValueType {
    pub fn object(name: impl Into<String>) -> Self {
        ValueType::Object(name.into())
    }

    pub fn array(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ValueType::Void)
    }

    /// Compact descriptor string, injective over distinct types.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            ValueType::Void => out.push('V'),
            ValueType::Primitive(kind) => out.push(kind.descriptor()),
            ValueType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            ValueType::Array(element) => {
                out.push('[');
                element.write_descriptor(out);
            }
        }
    }
}

/// Signature of a method: name plus parameter and return types. Dispatch
/// slots are keyed by this triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, ret: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.params {
            out.push_str(&param.descriptor());
        }
        out.push(')');
        out.push_str(&self.ret.descriptor());
        out
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor())
    }
}

/// Fully qualified reference to a method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodReference {
    pub class: String,
    pub signature: MethodSignature,
}

impl MethodReference {
    pub fn new(class: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            class: class.into(),
            signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.signature)
    }
}

/// Fully qualified reference to a field, naming its declaring class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldReference {
    pub class: String,
    pub name: String,
}

impl FieldReference {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

/// Modifier flags of a method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MethodModifiers {
    pub is_native: bool,
    pub is_static: bool,
    pub is_abstract: bool,
}

/// A single annotation value.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    Str(String),
    Int(i32),
    Bool(bool),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

/// An annotation instance keyed by member name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    pub values: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn string_value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(AnnotationValue::as_str)
    }
}

/// A declared field.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub ty: ValueType,
    pub is_static: bool,
}

impl Field {
    pub fn instance(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
        }
    }

    pub fn stat(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: true,
        }
    }
}

/// A declared method with its optional decompiled body.
#[derive(Clone, Debug)]
pub struct Method {
    pub owner: String,
    pub signature: MethodSignature,
    pub modifiers: MethodModifiers,
    pub annotations: BTreeMap<String, Annotation>,
    /// Basic-block program, present for every method that reached the
    /// back end with code. Only the virtual-call scan reads it.
    pub program: Option<program::Program>,
    /// Structured tree reconstructed by the decompiler.
    pub body: Option<ast::MethodBody>,
}

impl Method {
    pub fn new(owner: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            owner: owner.into(),
            signature,
            modifiers: MethodModifiers::default(),
            annotations: BTreeMap::new(),
            program: None,
            body: None,
        }
    }

    pub fn reference(&self) -> MethodReference {
        MethodReference::new(self.owner.clone(), self.signature.clone())
    }

    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.get(name)
    }

    pub fn has_code(&self) -> bool {
        self.body.is_some()
            && self
                .program
                .as_ref()
                .is_some_and(|program| !program.blocks.is_empty())
    }
}

/// Class-level flags surfaced by the front end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassFlags {
    pub is_interface: bool,
    pub is_structure: bool,
}

/// One class of the linked universe.
#[derive(Clone, Debug)]
pub struct ClassDescriptor {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub annotations: BTreeMap<String, Annotation>,
    pub flags: ClassFlags,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: BTreeMap::new(),
            flags: ClassFlags::default(),
        }
    }

    pub fn add_method(&mut self, mut method: Method) {
        method.owner = self.name.clone();
        self.methods.push(method);
    }

    pub fn method(&self, signature: &MethodSignature) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.signature == *signature)
    }

    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Ordered collection of all linked classes. Iteration order is insertion
/// order; the whole pipeline's determinism rests on it.
#[derive(Clone, Debug, Default)]
pub struct ClassUniverse {
    classes: Vec<ClassDescriptor>,
    index: HashMap<String, usize>,
}

impl ClassUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. Re-adding a name replaces the earlier descriptor
    /// while keeping its position.
    pub fn add(&mut self, class: ClassDescriptor) {
        if let Some(&slot) = self.index.get(&class.name) {
            self.classes[slot] = class;
        } else {
            self.index.insert(class.name.clone(), self.classes.len());
            self.classes.push(class);
        }
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|class| class.name.as_str())
    }

    pub fn classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    pub fn get(&self, name: &str) -> Option<&ClassDescriptor> {
        self.index.get(name).map(|&slot| &self.classes[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn method(&self, reference: &MethodReference) -> Option<&Method> {
        self.get(&reference.class)?.method(&reference.signature)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
