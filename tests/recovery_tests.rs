//! Error recovery on files that are mid-edit.

use pretty_assertions::assert_eq;
use protoschema::parser::ast::{MessageItem, TopLevel};
use protoschema::parser::parse;
use protoschema::schema::{build, MemoryLoader};
use protoschema::{DiagnosticKind, ParseError};

fn message_items(source: &str) -> (Vec<&'static str>, usize) {
    let out = parse(source);
    let TopLevel::Message(m) = &out.proto.statements[0] else {
        panic!("expected message, got {:?}", out.proto.statements);
    };
    let items = m
        .body
        .iter()
        .map(|item| match item {
            MessageItem::Field(_) => "field",
            MessageItem::Malformed(_) => "malformed",
            MessageItem::Message(_) => "message",
            MessageItem::Enum(_) => "enum",
            MessageItem::Oneof(_) => "oneof",
            _ => "other",
        })
        .collect();
    (items, out.errors.len())
}

#[test]
fn test_each_bad_field_recovers_independently() {
    let (items, errors) = message_items(
        "message M {\n  int32 a = 1;\n  string b\n  int32 c = 3;\n  bool = 4;\n}",
    );
    assert_eq!(items, vec!["field", "malformed", "field", "malformed"]);
    assert_eq!(errors, 2);
}

#[test]
fn test_half_typed_field_before_nested_declarations() {
    let (items, errors) = message_items(
        "message M {\n  repeated\n  enum E { A = 0; }\n  Foo\n  oneof o { int32 x = 1; }\n}",
    );
    assert_eq!(items, vec!["malformed", "enum", "malformed", "oneof"]);
    assert_eq!(errors, 2);
}

#[test]
fn test_missing_semicolon_hint() {
    let out = parse("message M { int32 a = 1 }");
    let TopLevel::Message(m) = &out.proto.statements[0] else {
        panic!("expected message");
    };
    match &m.body[0] {
        MessageItem::Malformed(f) => {
            assert_eq!(f.number.as_ref().and_then(|n| n.value()), Some(1));
            assert!(f.terminator.is_none());
        }
        other => panic!("expected malformed field, got {:?}", other),
    }
    match &out.errors[0] {
        ParseError::Syntax(e) => assert_eq!(e.hint.as_deref(), Some("statements end with ';'")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_malformed_field_span_excludes_following_statement() {
    let source = "message M {\n  foo bar\n  message N {}\n}";
    let out = parse(source);
    let TopLevel::Message(m) = &out.proto.statements[0] else {
        panic!("expected message");
    };
    let span = m.body[0].span();
    assert_eq!(&source[span.start..span.end], "foo bar");
}

#[tokio::test]
async fn test_broken_file_still_registers_types() {
    let loader = MemoryLoader::with_files([
        ("main.proto", "import \"dep.proto\";\nmessage Main { Dep d = 1; Dep\n}"),
        ("dep.proto", "message Dep {}\nmessage Later { int32 x : 1; }\nmessage Lost {}"),
    ]);
    let schema = build(&loader, &["main.proto"]).await;

    assert!(schema.get_type("Main").is_some());
    assert!(schema.get_type("Dep").is_some());
    // A field inside a message recovers; the rest of dep.proto is still parsed.
    assert!(schema.get_type("Later").is_some());
    assert!(schema.get_type("Lost").is_some());

    let kinds: Vec<(&str, DiagnosticKind)> = schema
        .diagnostics
        .iter()
        .map(|d| (d.path.as_str(), d.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("main.proto", DiagnosticKind::SyntaxError),
            ("dep.proto", DiagnosticKind::SyntaxError),
        ]
    );
    assert!(schema.diagnostics[1].message.contains("numbers are assigned with '='"));
}

#[tokio::test]
async fn test_fatal_error_keeps_earlier_types() {
    let loader = MemoryLoader::with_files([(
        "a.proto",
        "message Before {}\nservice S { rpc Call; }\nmessage After {}",
    )]);
    let schema = build(&loader, &["a.proto"]).await;
    assert!(schema.get_type("Before").is_some());
    assert!(schema.get_type("After").is_none());
    assert_eq!(schema.diagnostics.len(), 1);

    let rendered = schema.render_diagnostic(&schema.diagnostics[0]);
    assert!(rendered.starts_with("a.proto:2:"), "{}", rendered);
    assert!(rendered.contains("syntax-error"));
    assert!(rendered.contains("2 | service S { rpc Call; }"));
}

#[tokio::test]
async fn test_bad_enum_value_keeps_the_rest() {
    let loader = MemoryLoader::with_files([(
        "a.proto",
        "enum E { A = ; B = 1; }\nmessage After { E e = 1; }",
    )]);
    let schema = build(&loader, &["a.proto"]).await;

    let e = schema.get_type("E").unwrap().as_enum().unwrap();
    let names: Vec<&str> = e.values.values().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["B"]);
    assert!(schema.get_type("After").is_some());
    assert_eq!(schema.diagnostics.len(), 1);
}

#[test]
fn test_half_typed_block_keeps_nested_and_later_statements() {
    let out = parse("message M {\n  foo {\n  message N {}\n}\nmessage After {}\n");
    assert_eq!(out.errors.len(), 1);
    let names: Vec<&str> = out
        .proto
        .statements
        .iter()
        .filter_map(|s| match s {
            TopLevel::Message(m) => Some(m.name.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["M", "After"]);

    let (items, errors) = message_items("message M { group g = 1; int32 ok = 2; }");
    assert_eq!(items, vec!["malformed", "field"]);
    assert_eq!(errors, 1);
}
