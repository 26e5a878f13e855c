//! Forward-reference tests: by-name references that point at objects which
//! do not exist yet when the reference is written.

use lattice_common::{Node, NodeKind, Scalar, Span, ValueNode};
use lattice_runtime::{
    NameResolver, ObjectRuntime, ObjId, Provided, Runtime, RuntimeError, Value,
};
use lattice_schema::{Directive, Schema};
use lattice_writer::{ObjectWriter, WriteErrorKind};

// ── Helpers ────────────────────────────────────────────────────────────

fn demo_schema() -> Schema {
    let mut b = Schema::builder();
    let string_conv = b.add_converter("string");
    let string = b.add_type("std", "String");
    b.set_type_converter(string, string_conv);

    let object = b.add_type("demo", "Object");
    let control = b.add_type("demo", "Control");
    b.set_base(control, object);

    let button = b.add_type("demo", "Button");
    b.set_base(button, control);
    b.add_member(button, "Text", string);
    b.add_member(button, "Background", object);

    let border = b.add_type("demo", "Border");
    b.set_base(border, control);
    b.add_member(border, "Child", object);

    let list = b.add_type("demo", "List");
    b.mark_collection(list, object);
    let panel = b.add_type("demo", "Panel");
    b.set_base(panel, control);
    b.add_member(panel, "Children", list);

    let reference = b.add_type("demo", "Reference");
    b.set_base(reference, object);
    b.mark_markup_extension(reference);
    b.set_ctor_params(reference, vec![("Name", string)]);

    b.finish()
}

fn runtime(schema: &Schema) -> ObjectRuntime<'_> {
    let mut rt = ObjectRuntime::new(schema);
    let reference = schema.resolve_type("demo", "Reference").unwrap();
    rt.bind_reference_extension(reference);
    rt
}

fn n(kind: NodeKind, at: u32) -> Node {
    Node::new(kind, Span::point(at))
}

fn text(s: &str) -> NodeKind {
    NodeKind::Value(ValueNode::Scalar(Scalar::from(s)))
}

/// `StartObject(Reference)` with one positional name argument, closed.
fn reference_nodes(schema: &Schema, name: &str, at: u32) -> Vec<Node> {
    let reference = schema.resolve_type("demo", "Reference").unwrap();
    let positional = schema.directive(Directive::PositionalParameters);
    vec![
        n(NodeKind::StartObject(reference), at),
        n(NodeKind::StartMember(positional), at + 1),
        n(text(name), at + 2),
        n(NodeKind::EndMember, at + 3),
        n(NodeKind::EndObject, at + 4),
    ]
}

// ── Tests ──────────────────────────────────────────────────────────────

/// A Border whose Child is a Button that paints itself with a reference to
/// its own name. The reference resolves the moment the name registers,
/// while the Button is still open.
#[test]
fn background_reference_to_own_name_resolves() {
    let schema = demo_schema();
    let border = schema.resolve_type("demo", "Border").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let child = schema.resolve_member(border, "Child").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();
    let name = schema.directive(Directive::Name);

    let mut nodes = vec![
        n(NodeKind::StartObject(border), 0),
        n(NodeKind::StartMember(child), 1),
        n(NodeKind::StartObject(button), 2),
        n(NodeKind::StartMember(name), 3),
        n(text("b1"), 4),
        n(NodeKind::EndMember, 5),
        n(NodeKind::StartMember(background), 6),
    ];
    nodes.extend(reference_nodes(&schema, "b1", 7));
    nodes.extend([
        n(NodeKind::EndMember, 12),
        n(NodeKind::EndObject, 13),
        n(NodeKind::EndMember, 14),
        n(NodeKind::EndObject, 15),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let root = writer.close().unwrap();
    let rt = writer.into_runtime();

    let border_obj = root.as_object().unwrap();
    let button_val = rt.instance(border_obj).get(child).unwrap().clone();
    let button_obj = button_val.as_object().unwrap();
    // The Button's Background is the Button itself.
    assert_eq!(
        rt.instance(button_obj).get(background),
        Some(&Value::Object(button_obj))
    );
    assert!(rt.instance(button_obj).is_ready());
}

/// Forward reference across siblings: the first Button references the
/// second by name before the second exists.
#[test]
fn forward_reference_to_later_sibling() {
    let schema = demo_schema();
    let panel = schema.resolve_type("demo", "Panel").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let children = schema.resolve_member(panel, "Children").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();
    let name = schema.directive(Directive::Name);
    let items = schema.directive(Directive::Items);

    let mut nodes = vec![
        n(NodeKind::StartObject(panel), 0),
        n(NodeKind::StartMember(children), 1),
        n(NodeKind::GetObject, 2),
        n(NodeKind::StartMember(items), 3),
        // First button: Background = {Reference second}.
        n(NodeKind::StartObject(button), 4),
        n(NodeKind::StartMember(background), 5),
    ];
    nodes.extend(reference_nodes(&schema, "second", 6));
    nodes.extend([
        n(NodeKind::EndMember, 11),
        n(NodeKind::EndObject, 12),
        // Second button, carrying the name.
        n(NodeKind::StartObject(button), 13),
        n(NodeKind::StartMember(name), 14),
        n(text("second"), 15),
        n(NodeKind::EndMember, 16),
        n(NodeKind::EndObject, 17),
        n(NodeKind::EndMember, 18),
        n(NodeKind::EndObject, 19),
        n(NodeKind::EndMember, 20),
        n(NodeKind::EndObject, 21),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let root = writer.close().unwrap();
    let rt = writer.into_runtime();

    let panel_obj = root.as_object().unwrap();
    let list_obj = rt
        .instance(panel_obj)
        .get(children)
        .and_then(Value::as_object)
        .unwrap();
    let items = rt.instance(list_obj).items();
    assert_eq!(items.len(), 2);
    let first = items[0].as_object().unwrap();
    let second = items[1].as_object().unwrap();
    // The first button's background was patched to the second button.
    assert_eq!(
        rt.instance(first).get(background),
        Some(&Value::Object(second))
    );
    // Both were fully initialized despite the parking.
    assert!(rt.instance(first).is_ready());
    assert!(rt.instance(second).is_ready());
    assert!(rt.instance(panel_obj).is_ready());
}

/// Two parked objects whose references resolve off the same late name
/// finish in the order their references were parked.
#[test]
fn chained_unresolved_objects_resolve_in_registration_order() {
    let schema = demo_schema();
    let panel = schema.resolve_type("demo", "Panel").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let children = schema.resolve_member(panel, "Children").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();
    let name = schema.directive(Directive::Name);
    let items = schema.directive(Directive::Items);

    // Three buttons: a -> waits on c, b -> waits on c, c carries the name.
    let mut nodes = vec![
        n(NodeKind::StartObject(panel), 0),
        n(NodeKind::StartMember(children), 1),
        n(NodeKind::GetObject, 2),
        n(NodeKind::StartMember(items), 3),
    ];
    for (i, who) in ["a", "b"].iter().enumerate() {
        let at = 4 + i as u32 * 8;
        nodes.extend([
            n(NodeKind::StartObject(button), at),
            n(NodeKind::StartMember(name), at + 1),
            n(text(who), at + 2),
            n(NodeKind::EndMember, at + 3),
            n(NodeKind::StartMember(background), at + 4),
        ]);
        nodes.extend(reference_nodes(&schema, "c", at + 5));
        nodes.extend([n(NodeKind::EndMember, at + 6), n(NodeKind::EndObject, at + 7)]);
    }
    nodes.extend([
        n(NodeKind::StartObject(button), 30),
        n(NodeKind::StartMember(name), 31),
        n(text("c"), 32),
        n(NodeKind::EndMember, 33),
        n(NodeKind::EndObject, 34),
        n(NodeKind::EndMember, 35),
        n(NodeKind::EndObject, 36),
        n(NodeKind::EndMember, 37),
        n(NodeKind::EndObject, 38),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let root = writer.close().unwrap();
    let rt = writer.into_runtime();

    let panel_obj = root.as_object().unwrap();
    let list_obj = rt
        .instance(panel_obj)
        .get(children)
        .and_then(Value::as_object)
        .unwrap();
    let buttons = rt.instance(list_obj).items();
    // All three land in markup order despite a and b parking first.
    assert_eq!(buttons.len(), 3);
    let c = buttons[2].as_object().unwrap();
    for parked in &buttons[..2] {
        let parked = parked.as_object().unwrap();
        assert_eq!(rt.instance(parked).get(background), Some(&Value::Object(c)));
        assert!(rt.instance(parked).is_ready());
    }
}

/// A custom extension that needs two names at once: it stays parked until
/// both register, then provide-value is re-run from scratch.
#[test]
fn extension_waiting_on_two_names_reruns_when_both_exist() {
    fn pair_provider(
        rt: &ObjectRuntime,
        ext: ObjId,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError> {
        let inst = rt.instance(ext);
        let arg = inst.ctor_args().first().and_then(Value::as_text).unwrap_or("");
        let mut missing = Vec::new();
        let mut last = None;
        for name in arg.split_whitespace() {
            match resolver.resolve_name(name) {
                Some(value) => last = Some(value),
                None => missing.push(name.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(Provided::Value(last.unwrap_or(Value::Scalar(Scalar::Null))))
        } else {
            Ok(Provided::Pending { names: missing, assign_direct: false })
        }
    }

    let schema = demo_schema();
    let border = schema.resolve_type("demo", "Border").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let panel = schema.resolve_type("demo", "Panel").unwrap();
    let reference = schema.resolve_type("demo", "Reference").unwrap();
    let child = schema.resolve_member(border, "Child").unwrap();
    let children = schema.resolve_member(panel, "Children").unwrap();
    let name = schema.directive(Directive::Name);
    let items = schema.directive(Directive::Items);

    let mut rt = ObjectRuntime::new(&schema);
    rt.bind_extension(reference, pair_provider);

    // Border.Child = {PairReference "x y"}; the names register afterwards
    // inside a sibling-less panel stream, so resolution happens at close.
    let mut nodes = vec![
        n(NodeKind::StartObject(panel), 0),
        n(NodeKind::StartMember(children), 1),
        n(NodeKind::GetObject, 2),
        n(NodeKind::StartMember(items), 3),
        n(NodeKind::StartObject(border), 4),
        n(NodeKind::StartMember(child), 5),
    ];
    nodes.extend(reference_nodes(&schema, "x y", 6));
    nodes.extend([
        n(NodeKind::EndMember, 11),
        n(NodeKind::EndObject, 12),
        n(NodeKind::StartObject(button), 13),
        n(NodeKind::StartMember(name), 14),
        n(text("x"), 15),
        n(NodeKind::EndMember, 16),
        n(NodeKind::EndObject, 17),
        n(NodeKind::StartObject(button), 18),
        n(NodeKind::StartMember(name), 19),
        n(text("y"), 20),
        n(NodeKind::EndMember, 21),
        n(NodeKind::EndObject, 22),
        n(NodeKind::EndMember, 23),
        n(NodeKind::EndObject, 24),
        n(NodeKind::EndMember, 25),
        n(NodeKind::EndObject, 26),
    ]);

    let mut writer = ObjectWriter::new(&schema, rt);
    writer.write_all(nodes).unwrap();
    let root = writer.close().unwrap();
    let rt = writer.into_runtime();

    let panel_obj = root.as_object().unwrap();
    let list_obj = rt
        .instance(panel_obj)
        .get(children)
        .and_then(Value::as_object)
        .unwrap();
    let contents = rt.instance(list_obj).items();
    assert_eq!(contents.len(), 3);
    let border_obj = contents[0].as_object().unwrap();
    let y_obj = contents[2].as_object().unwrap();
    // The provider returned the last resolved name's value: y.
    assert_eq!(
        rt.instance(border_obj).get(child),
        Some(&Value::Object(y_obj))
    );
}

/// An item parked on a name that registers while the container is still
/// unconstructed: the resolved value waits in the token's cell and must be
/// claimed when the container's buffered items replay.
#[test]
fn item_resolved_before_its_container_constructs_still_lands() {
    let schema = demo_schema();
    let list = schema.resolve_type("demo", "List").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();
    let name = schema.directive(Directive::Name);
    let items = schema.directive(Directive::Items);

    // Item 0 parks on "c"; item 1 carries the name. Both finish before the
    // root List itself is constructed at its EndObject.
    let mut nodes = vec![
        n(NodeKind::StartObject(list), 0),
        n(NodeKind::StartMember(items), 1),
        n(NodeKind::StartObject(button), 2),
        n(NodeKind::StartMember(background), 3),
    ];
    nodes.extend(reference_nodes(&schema, "c", 4));
    nodes.extend([
        n(NodeKind::EndMember, 9),
        n(NodeKind::EndObject, 10),
        n(NodeKind::StartObject(button), 11),
        n(NodeKind::StartMember(name), 12),
        n(text("c"), 13),
        n(NodeKind::EndMember, 14),
        n(NodeKind::EndObject, 15),
        n(NodeKind::EndMember, 16),
        n(NodeKind::EndObject, 17),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let root = writer.close().unwrap();
    let rt = writer.into_runtime();

    let list_obj = root.as_object().unwrap();
    let contents = rt.instance(list_obj).items();
    assert_eq!(contents.len(), 2);
    let first = contents[0].as_object().unwrap();
    let c = contents[1].as_object().unwrap();
    assert_eq!(rt.instance(first).get(background), Some(&Value::Object(c)));
    assert!(rt.instance(first).is_ready());
    assert!(rt.instance(list_obj).is_ready());
}

/// Even when whole containers park on a dangling reference, the aggregate
/// error still names it; the aggregate is never empty.
#[test]
fn parked_containers_still_report_the_dangling_name() {
    let schema = demo_schema();
    let list = schema.resolve_type("demo", "List").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();
    let items = schema.directive(Directive::Items);

    let mut nodes = vec![
        n(NodeKind::StartObject(list), 0),
        n(NodeKind::StartMember(items), 1),
        n(NodeKind::StartObject(button), 2),
        n(NodeKind::StartMember(background), 3),
    ];
    nodes.extend(reference_nodes(&schema, "ghost", 4));
    nodes.extend([
        n(NodeKind::EndMember, 9),
        n(NodeKind::EndObject, 10),
        n(NodeKind::EndMember, 11),
        n(NodeKind::EndObject, 12),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let err = writer.close().unwrap_err();
    let WriteErrorKind::UnresolvedReferences { refs } = &err.kind else {
        panic!("expected aggregate unresolved-references error, got {err:?}");
    };
    assert!(!refs.is_empty());
    assert_eq!(refs[0].names, vec!["ghost".to_string()]);
    // The error points at the dangling reference, not a made-up position.
    assert_eq!(err.span, refs[0].span);
    assert_ne!(err.span, Span::point(0));
}

/// References to names that never register surface as one aggregate error
/// at close, one entry per dangling reference.
#[test]
fn unresolved_names_aggregate_at_close() {
    let schema = demo_schema();
    let border = schema.resolve_type("demo", "Border").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let child = schema.resolve_member(border, "Child").unwrap();
    let background = schema.resolve_member(button, "Background").unwrap();

    let mut nodes = vec![
        n(NodeKind::StartObject(border), 0),
        n(NodeKind::StartMember(child), 1),
        n(NodeKind::StartObject(button), 2),
        n(NodeKind::StartMember(background), 3),
    ];
    nodes.extend(reference_nodes(&schema, "ghost", 4));
    nodes.extend([
        n(NodeKind::EndMember, 9),
        n(NodeKind::EndObject, 10),
        n(NodeKind::EndMember, 11),
        n(NodeKind::EndObject, 12),
    ]);

    let mut writer = ObjectWriter::new(&schema, runtime(&schema));
    writer.write_all(nodes).unwrap();
    let err = writer.close().unwrap_err();
    let WriteErrorKind::UnresolvedReferences { refs } = &err.kind else {
        panic!("expected aggregate unresolved-references error, got {err:?}");
    };
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].names, vec!["ghost".to_string()]);
}
