//! Assembler scenarios: native handling, imports, entry points,
//! allocation and cooperative cancellation.

use std::cell::Cell;
use std::collections::BTreeMap;

use super::common::{compiled, emit_ok, static_method};
use crate::backend::WasmBackend;
use crate::controller::{BuildController, TargetController};
use crate::diagnostics::Diagnostics;
use crate::mangling::mangle_method;
use crate::model::ast::{Expr, Stmt};
use crate::model::program::InvocationKind;
use crate::model::{
    Annotation, AnnotationValue, ClassDescriptor, ClassUniverse, Method, MethodReference,
    MethodSignature, PrimitiveType, ValueType,
};
use crate::runtime::{self, ADDRESS_CLASS, IMPORT_ANNOTATION};

#[test]
fn native_without_import_is_diagnosed_and_omitted() {
    let mut universe = ClassUniverse::new();
    let mut class = ClassDescriptor::new("app.X");
    let mut foo = Method::new(
        "app.X",
        MethodSignature::new("foo", Vec::new(), ValueType::Void),
    );
    foo.modifiers.is_native = true;
    class.add_method(foo);
    class.add_method(static_method("app.X", "bar", vec![Stmt::Return(None)]));
    universe.add(class);

    let controller = BuildController::new();
    let text = emit_ok(&universe, &controller);

    assert_eq!(controller.diagnostics().error_count(), 1);
    let diagnostic = &controller.diagnostics().snapshot()[0];
    assert!(diagnostic.message.contains("app.X.foo()V"));
    assert!(diagnostic.message.contains(IMPORT_ANNOTATION));

    let foo_symbol = mangle_method(&MethodReference::new(
        "app.X",
        MethodSignature::new("foo", Vec::new(), ValueType::Void),
    ));
    assert!(!text.contains(&foo_symbol), "the offending function is omitted");
    let bar_symbol = mangle_method(&MethodReference::new(
        "app.X",
        MethodSignature::new("bar", Vec::new(), ValueType::Void),
    ));
    assert!(text.contains(&bar_symbol), "compilation of other methods proceeds");
}

#[test]
fn native_on_a_sentinel_class_is_silently_skipped() {
    let mut universe = ClassUniverse::new();
    let mut address = ClassDescriptor::new(ADDRESS_CLASS);
    let mut to_long = Method::new(
        ADDRESS_CLASS,
        MethodSignature::new(
            "toLong",
            Vec::new(),
            ValueType::Primitive(PrimitiveType::Long),
        ),
    );
    to_long.modifiers.is_native = true;
    address.add_method(to_long);
    universe.add(address);

    let controller = BuildController::new();
    let text = emit_ok(&universe, &controller);
    assert_eq!(controller.diagnostics().snapshot().len(), 0);
    assert!(!text.contains("toLong"));
}

#[test]
fn import_annotated_native_becomes_an_import_on_first_reference() {
    let mut universe = ClassUniverse::new();

    let mut host = ClassDescriptor::new("app.Host");
    let mut print = Method::new(
        "app.Host",
        MethodSignature::new(
            "print",
            vec![ValueType::Primitive(PrimitiveType::Int)],
            ValueType::Void,
        ),
    );
    print.modifiers.is_native = true;
    print.modifiers.is_static = true;
    print.annotations.insert(
        IMPORT_ANNOTATION.into(),
        Annotation::new()
            .with_value("module", AnnotationValue::Str("console".into()))
            .with_value("name", AnnotationValue::Str("log".into())),
    );
    host.add_method(print);
    universe.add(host);

    let print_reference = MethodReference::new(
        "app.Host",
        MethodSignature::new(
            "print",
            vec![ValueType::Primitive(PrimitiveType::Int)],
            ValueType::Void,
        ),
    );
    let mut main = ClassDescriptor::new("app.Main");
    main.add_method(static_method(
        "app.Main",
        "main",
        vec![
            Stmt::Expr(Expr::Invoke {
                kind: InvocationKind::Static,
                method: print_reference.clone(),
                args: vec![Expr::int(42)],
            }),
            Stmt::Return(None),
        ],
    ));
    universe.add(main);

    let controller = BuildController::new();
    let text = emit_ok(&universe, &controller);
    let symbol = mangle_method(&print_reference);
    assert!(text.contains(&format!(
        "(import \"console\" \"log\" (func ${symbol} (param i32)))"
    )));
    assert!(text.contains(&format!("(call ${symbol}")));
    assert_eq!(controller.diagnostics().snapshot().len(), 0);
}

#[test]
fn allocation_calls_the_runtime_with_the_record_pointer() {
    let mut universe = ClassUniverse::new();

    let mut allocator = ClassDescriptor::new(runtime::ALLOCATOR_CLASS);
    let mut allocate = compiled(
        runtime::ALLOCATOR_CLASS,
        runtime::allocator_allocate().signature,
        vec![ValueType::object(runtime::RUNTIME_CLASS)],
        vec![Stmt::Return(Some(Expr::int(0)))],
    );
    allocate.modifiers.is_static = true;
    allocator.add_method(allocate);
    universe.add(allocator);

    let mut point = ClassDescriptor::new("app.Point");
    point.fields.push(crate::model::Field::instance(
        "x",
        ValueType::Primitive(PrimitiveType::Int),
    ));
    universe.add(point);

    let mut main = ClassDescriptor::new("app.Main");
    main.add_method(static_method(
        "app.Main",
        "main",
        vec![
            Stmt::Expr(Expr::New {
                class: "app.Point".into(),
            }),
            Stmt::Return(None),
        ],
    ));
    universe.add(main);

    let controller = BuildController::new();
    let text = emit_ok(&universe, &controller);
    let allocate_symbol = mangle_method(&runtime::allocator_allocate());
    let point_record = 256 + 16; // Allocator's record precedes Point's.
    assert!(
        text.contains(&format!(
            "(call ${allocate_symbol} (i32.const {point_record}))"
        )),
        "allocation passes the class record pointer:\n{text}"
    );
}

#[test]
fn entry_point_exports_use_the_public_name() {
    let mut universe = ClassUniverse::new();
    let mut app = ClassDescriptor::new("app.Main");
    app.add_method(static_method("app.Main", "main", vec![Stmt::Return(None)]));
    universe.add(app);

    let main_reference = MethodReference::new(
        "app.Main",
        MethodSignature::new("main", Vec::new(), ValueType::Void),
    );
    let mut controller = BuildController::new();
    controller.add_entry_point("main", main_reference.clone());
    let text = emit_ok(&universe, &controller);
    assert!(text.contains(&format!(
        "(export \"main\" (func ${}))",
        mangle_method(&main_reference)
    )));
}

#[test]
fn pruned_entry_points_are_silently_tolerated() {
    let mut universe = ClassUniverse::new();
    universe.add(ClassDescriptor::new("app.Main"));

    let mut controller = BuildController::new();
    controller.add_entry_point(
        "main",
        MethodReference::new(
            "app.Main",
            MethodSignature::new("main", Vec::new(), ValueType::Void),
        ),
    );
    let text = emit_ok(&universe, &controller);
    assert!(!text.contains("(export"));
    assert_eq!(controller.diagnostics().snapshot().len(), 0);
}

/// Flips to cancelled after a fixed number of polls.
struct CountdownController {
    diagnostics: Diagnostics,
    entry_points: BTreeMap<String, MethodReference>,
    polls_left: Cell<u32>,
}

impl CountdownController {
    fn new(polls_left: u32) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            entry_points: BTreeMap::new(),
            polls_left: Cell::new(polls_left),
        }
    }
}

impl TargetController for CountdownController {
    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn was_cancelled(&self) -> bool {
        let left = self.polls_left.get();
        if left == 0 {
            return true;
        }
        self.polls_left.set(left - 1);
        false
    }

    fn entry_points(&self) -> &BTreeMap<String, MethodReference> {
        &self.entry_points
    }
}

#[test]
fn cancellation_at_any_checkpoint_writes_nothing() {
    let mut universe = ClassUniverse::new();
    for name in ["app.A", "app.B", "app.C"] {
        let mut class = ClassDescriptor::new(name);
        class.add_method(static_method(name, "run", vec![Stmt::Return(None)]));
        universe.add(class);
    }

    for checkpoint in 0..8 {
        let controller = CountdownController::new(checkpoint);
        let backend = WasmBackend::new(&controller);
        let mut out = Vec::new();
        backend.emit(&universe, &mut out).unwrap();
        if controller.polls_left.get() == 0 {
            assert!(
                out.is_empty(),
                "cancellation at checkpoint {checkpoint} must suppress all output"
            );
        }
    }

    // A generous poll allowance lets the build finish.
    let controller = CountdownController::new(1000);
    let backend = WasmBackend::new(&controller);
    let mut out = Vec::new();
    backend.emit(&universe, &mut out).unwrap();
    assert!(!out.is_empty());
}

#[test]
fn dependency_contribution_announces_the_runtime_helpers() {
    let controller = BuildController::new();
    let backend = WasmBackend::new(&controller);
    let mut linked: Vec<MethodReference> = Vec::new();
    backend.contribute_dependencies(&mut linked);
    assert_eq!(linked.len(), 8);
    assert!(linked.contains(&runtime::allocator_allocate()));
    assert!(linked.contains(&runtime::allocator_clinit()));
    assert!(linked.contains(&runtime::wasm_runtime_compare(PrimitiveType::Long)));
    assert!(linked.contains(&runtime::wasm_runtime_remainder(PrimitiveType::Float)));

    // Announcing twice is harmless; the contract is idempotent.
    backend.contribute_dependencies(&mut linked);
    assert_eq!(linked.len(), 16);
}

#[test]
fn intrinsic_invocations_inline_instead_of_calling() {
    let mut universe = ClassUniverse::new();
    let compare = runtime::wasm_runtime_compare(PrimitiveType::Int);
    let mut main = ClassDescriptor::new("app.Main");
    let mut pick = compiled(
        "app.Main",
        MethodSignature::new(
            "pick",
            vec![
                ValueType::Primitive(PrimitiveType::Int),
                ValueType::Primitive(PrimitiveType::Int),
            ],
            ValueType::Primitive(PrimitiveType::Int),
        ),
        vec![
            ValueType::Primitive(PrimitiveType::Int),
            ValueType::Primitive(PrimitiveType::Int),
        ],
        vec![Stmt::Return(Some(Expr::Invoke {
            kind: InvocationKind::Static,
            method: compare.clone(),
            args: vec![Expr::var(0), Expr::var(1)],
        }))],
    );
    pick.modifiers.is_static = true;
    main.add_method(pick);
    universe.add(main);

    let controller = BuildController::new();
    let text = emit_ok(&universe, &controller);
    assert!(
        !text.contains(&mangle_method(&compare)),
        "compare expands inline; no function and no call is emitted"
    );
    assert!(text.contains("i32.gt_s") && text.contains("i32.lt_s"));
}
