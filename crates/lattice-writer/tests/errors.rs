//! Error-path tests: fatal write errors and their diagnostic rendering.

use lattice_common::{Node, NodeKind, Scalar, Span, ValueNode};
use lattice_runtime::ObjectRuntime;
use lattice_schema::{Directive, Schema};
use lattice_writer::diagnostics::{error_code, render_diagnostic};
use lattice_writer::{ObjectWriter, WriteError, WriteErrorKind};

// ── Helpers ────────────────────────────────────────────────────────────

fn demo_schema() -> Schema {
    let mut b = Schema::builder();
    let string_conv = b.add_converter("string");
    let int_conv = b.add_converter("int");
    let string = b.add_type("std", "String");
    b.set_type_converter(string, string_conv);
    let int = b.add_type("std", "Int");
    b.set_type_converter(int, int_conv);

    let object = b.add_type("demo", "Object");
    let button = b.add_type("demo", "Button");
    b.set_base(button, object);
    b.add_member(button, "Width", int);

    let host = b.add_type("demo", "Host");
    b.set_base(host, object);
    b.add_member(host, "Child", object);

    let abstract_ty = b.add_type("demo", "Abstract");
    b.set_constructible(abstract_ty, false);

    let slider = b.add_type("demo", "Slider");
    b.set_base(slider, object);
    b.add_member(slider, "Minimum", int);

    let clicked = b.add_member(button, "Clicked", object);
    b.mark_event(clicked);

    let int_map = b.add_type("demo", "IntMap");
    b.mark_dictionary(int_map, int, object);

    b.finish()
}

fn n(kind: NodeKind, at: u32) -> Node {
    Node::new(kind, Span::point(at))
}

fn text(s: &str) -> NodeKind {
    NodeKind::Value(ValueNode::Scalar(Scalar::from(s)))
}

fn write_until_error(schema: &Schema, nodes: Vec<Node>) -> WriteError {
    let mut writer = ObjectWriter::new(schema, ObjectRuntime::new(schema));
    for node in nodes {
        if let Err(err) = writer.write(node) {
            return err;
        }
    }
    writer.close().expect_err("stream should not close cleanly")
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn conversion_failure_carries_the_offending_text() {
    let schema = demo_schema();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let width = schema.resolve_member(button, "Width").unwrap();
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(button), 0),
            n(NodeKind::StartMember(width), 1),
            n(text("not-a-number"), 2),
            n(NodeKind::EndMember, 3),
        ],
    );
    let WriteErrorKind::Conversion { detail } = &err.kind else {
        panic!("expected conversion error, got {err:?}");
    };
    assert!(detail.contains("not-a-number"));
}

#[test]
fn non_constructible_type_reports_no_constructor() {
    let schema = demo_schema();
    let abstract_ty = schema.resolve_type("demo", "Abstract").unwrap();
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(abstract_ty), 0),
            n(NodeKind::EndObject, 1),
        ],
    );
    assert!(matches!(err.kind, WriteErrorKind::NoConstructor { .. }));
}

#[test]
fn member_of_unrelated_type_is_unsettable() {
    let schema = demo_schema();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let slider = schema.resolve_type("demo", "Slider").unwrap();
    let minimum = schema.resolve_member(slider, "Minimum").unwrap();
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(button), 0),
            n(NodeKind::StartMember(minimum), 1),
        ],
    );
    let WriteErrorKind::UnsettableMember { ty, member } = &err.kind else {
        panic!("expected unsettable-member error, got {err:?}");
    };
    assert_eq!(ty, "demo:Button");
    assert_eq!(member, "Minimum");
}

#[test]
fn duplicate_name_in_one_scope_is_fatal() {
    let schema = demo_schema();
    let host = schema.resolve_type("demo", "Host").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let child = schema.resolve_member(host, "Child").unwrap();
    let name = schema.directive(Directive::Name);
    // The child claims "n" first (it finishes first), then the root tries
    // to register the same name.
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(host), 0),
            n(NodeKind::StartMember(name), 1),
            n(text("n"), 2),
            n(NodeKind::EndMember, 3),
            n(NodeKind::StartMember(child), 4),
            n(NodeKind::StartObject(button), 5),
            n(NodeKind::StartMember(name), 6),
            n(text("n"), 7),
            n(NodeKind::EndMember, 8),
            n(NodeKind::EndObject, 9),
            n(NodeKind::EndMember, 10),
            n(NodeKind::EndObject, 11),
        ],
    );
    let WriteErrorKind::DuplicateName { name } = &err.kind else {
        panic!("expected duplicate-name error, got {err:?}");
    };
    assert_eq!(name, "n");
}

#[test]
fn initialization_text_with_members_is_misuse() {
    let schema = demo_schema();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let width = schema.resolve_member(button, "Width").unwrap();
    let init = schema.directive(Directive::Initialization);
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(button), 0),
            n(NodeKind::StartMember(init), 1),
            n(text("raw"), 2),
            n(NodeKind::EndMember, 3),
            n(NodeKind::StartMember(width), 4),
            n(text("3"), 5),
            n(NodeKind::EndMember, 6),
            n(NodeKind::EndObject, 7),
        ],
    );
    assert!(matches!(
        err.kind,
        WriteErrorKind::DirectiveMisuse { directive: "Initialization", .. }
    ));
}

#[test]
fn class_below_the_root_is_misuse() {
    let schema = demo_schema();
    let host = schema.resolve_type("demo", "Host").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let child = schema.resolve_member(host, "Child").unwrap();
    let class = schema.directive(Directive::Class);
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(host), 0),
            n(NodeKind::StartMember(child), 1),
            n(NodeKind::StartObject(button), 2),
            n(NodeKind::StartMember(class), 3),
            n(text("Nope"), 4),
            n(NodeKind::EndMember, 5),
        ],
    );
    assert!(matches!(
        err.kind,
        WriteErrorKind::DirectiveMisuse { directive: "Class", .. }
    ));
}

#[test]
fn event_member_is_not_settable() {
    let schema = demo_schema();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let clicked = schema.resolve_member(button, "Clicked").unwrap();
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(button), 0),
            n(NodeKind::StartMember(clicked), 1),
        ],
    );
    let WriteErrorKind::UnsettableMember { member, .. } = &err.kind else {
        panic!("expected unsettable-member error, got {err:?}");
    };
    assert_eq!(member, "Clicked");
}

#[test]
fn dictionary_key_diagnostic_points_at_the_key() {
    let schema = demo_schema();
    let int_map = schema.resolve_type("demo", "IntMap").unwrap();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let items = schema.directive(Directive::Items);
    let key = schema.directive(Directive::Key);
    let key_span = Span::new(40, 43);
    let err = write_until_error(
        &schema,
        vec![
            n(NodeKind::StartObject(int_map), 0),
            n(NodeKind::StartMember(items), 1),
            n(NodeKind::StartObject(button), 2),
            n(NodeKind::StartMember(key), 3),
            Node::new(text("zzz"), key_span),
            n(NodeKind::EndMember, 5),
            n(NodeKind::EndObject, 6),
            n(NodeKind::EndMember, 7),
            n(NodeKind::EndObject, 8),
        ],
    );
    assert!(matches!(err.kind, WriteErrorKind::Conversion { .. }));
    // The failure is the key's, so the span is the key value's span, not
    // the entry's.
    assert_eq!(err.span, key_span);
}

#[test]
fn every_error_kind_has_a_distinct_code() {
    use lattice_writer::UnresolvedRef;
    let kinds = vec![
        WriteErrorKind::UnexpectedNode { node: "EndObject", context: "at the root" },
        WriteErrorKind::DuplicateMember { ty: "t".into(), member: "m".into() },
        WriteErrorKind::DuplicateName { name: "n".into() },
        WriteErrorKind::NoConstructor { ty: "t".into(), reason: "r".into() },
        WriteErrorKind::DirectiveMisuse { directive: "Name", reason: "r".into() },
        WriteErrorKind::UnsettableMember { ty: "t".into(), member: "m".into() },
        WriteErrorKind::Conversion { detail: "d".into() },
        WriteErrorKind::Runtime { detail: "d".into() },
        WriteErrorKind::UnresolvedReferences {
            refs: vec![UnresolvedRef { names: vec!["n".into()], span: Span::new(0, 1) }],
        },
    ];
    let mut codes: Vec<_> = kinds.iter().map(error_code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}

#[test]
fn display_forms_are_stable() {
    use lattice_writer::UnresolvedRef;
    insta::assert_snapshot!(
        WriteErrorKind::UnsettableMember { ty: "demo:Button".into(), member: "Minimum".into() }
            .to_string(),
        @"member `Minimum` cannot be set on `demo:Button`"
    );
    insta::assert_snapshot!(
        WriteErrorKind::UnresolvedReferences {
            refs: vec![
                UnresolvedRef { names: vec!["left".into()], span: Span::new(0, 4) },
                UnresolvedRef { names: vec!["up".into(), "down".into()], span: Span::new(5, 9) },
            ],
        }
        .to_string(),
        @"2 unresolved forward reference(s): `left`, `up`, `down`"
    );
}

#[test]
fn diagnostics_render_code_and_position() {
    let schema = demo_schema();
    let button = schema.resolve_type("demo", "Button").unwrap();
    let width = schema.resolve_member(button, "Width").unwrap();
    let source = "start Button\nmember Width\nvalue \"oops\"\n";
    let err = write_until_error(
        &schema,
        vec![
            Node::new(NodeKind::StartObject(button), Span::new(0, 12)),
            Node::new(NodeKind::StartMember(width), Span::new(13, 25)),
            Node::new(NodeKind::Value(ValueNode::Scalar(Scalar::from("oops"))), Span::new(26, 38)),
            Node::new(NodeKind::EndMember, Span::new(26, 38)),
        ],
    );
    let rendered = render_diagnostic(&err, source, "doc.ltn");
    assert!(rendered.contains("E0107"));
    assert!(rendered.contains("oops"));
}
