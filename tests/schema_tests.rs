//! Cross-file building and resolution.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use protoschema::schema::{
    build, build_with, BuildOptions, ChainLoader, FsLoader, LoadedFile, Loader, MemoryLoader,
};
use protoschema::types::{FieldTypeRef, ScalarType};
use protoschema::{DiagnosticKind, LoadError, Schema};

fn resolved<'s>(schema: &'s Schema, message: &str, field: &str) -> Option<&'s str> {
    let message = schema.get_type(message)?.as_message()?;
    let field = message.field_by_name(field)?;
    field.ty.refs().last()?.resolved.as_deref()
}

fn kinds(schema: &Schema) -> Vec<(String, DiagnosticKind)> {
    schema
        .diagnostics
        .iter()
        .map(|d| (d.path.clone(), d.kind))
        .collect()
}

#[tokio::test]
async fn test_innermost_scope_wins() {
    let loader = MemoryLoader::with_files([
        (
            "a.proto",
            r#"
            package a.b;
            import "bar.proto";
            message Foo {}
            message Outer {
              message Foo {}
              message Inner {
                Foo f1 = 1;
                b.Foo f2 = 2;
                .a.b.Foo f3 = 3;
                Bar f4 = 4;
              }
            }
            "#,
        ),
        ("bar.proto", "message Bar {}"),
    ]);
    let schema = build(&loader, &["a.proto"]).await;
    assert!(schema.diagnostics.is_empty(), "{:?}", schema.diagnostics);

    let inner = ".a.b.Outer.Inner";
    assert_eq!(resolved(&schema, inner, "f1"), Some(".a.b.Outer.Foo"));
    assert_eq!(resolved(&schema, inner, "f2"), Some(".a.b.Foo"));
    assert_eq!(resolved(&schema, inner, "f3"), Some(".a.b.Foo"));
    assert_eq!(resolved(&schema, inner, "f4"), Some(".Bar"));
}

#[tokio::test]
async fn test_unresolved_references_are_reported_in_order() {
    let source = "message A {\n  Missing m = 1;\n  map<string, Gone> g = 2;\n  int32 ok = 3;\n}";
    let loader = MemoryLoader::with_files([("a.proto", source)]);
    let schema = build(&loader, &["a.proto"]).await;

    let messages: Vec<&str> = schema.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "unresolved type reference 'Missing'",
            "unresolved type reference 'Gone'",
        ]
    );
    let span = schema.diagnostics[0].span.unwrap();
    assert_eq!(&source[span.start..span.end], "Missing");

    let a = schema.get_type("A").unwrap().as_message().unwrap();
    assert_eq!(a.fields[&3].ty, FieldTypeRef::Scalar(ScalarType::Int32));
    assert!(matches!(&a.fields[&2].ty, FieldTypeRef::Map { key, .. }
        if **key == FieldTypeRef::Scalar(ScalarType::String)));
}

#[tokio::test]
async fn test_duplicate_type_first_definition_wins() {
    let loader = MemoryLoader::with_files([
        ("a.proto", "package p; message Dup {}"),
        ("b.proto", "package p; message Dup { int32 x = 1; }"),
    ]);
    let schema = build(&loader, &["a.proto", "b.proto"]).await;

    assert_eq!(
        kinds(&schema),
        vec![("b.proto".to_string(), DiagnosticKind::DuplicateType)]
    );
    assert_eq!(
        schema.diagnostics[0].message,
        "'.p.Dup' is already defined in 'a.proto'"
    );
    let dup = schema.get_type("p.Dup").unwrap();
    assert_eq!(dup.file(), "a.proto");
    assert!(dup.as_message().unwrap().fields.is_empty());
}

#[tokio::test]
async fn test_services_and_extends() {
    let loader = MemoryLoader::with_files([(
        "svc.proto",
        r#"
        syntax = "proto2";
        package svc;
        message Req { extensions 100 to 199; }
        message Resp {}
        extend Req { optional Resp resp_ext = 100; }
        service Api {
          rpc Call(Req) returns (stream Resp);
        }
        "#,
    )]);
    let schema = build(&loader, &["svc.proto"]).await;
    assert!(schema.diagnostics.is_empty(), "{:?}", schema.diagnostics);

    let api = schema.get_service("svc.Api").unwrap();
    let call = &api.rpcs[0];
    assert_eq!(call.request.resolved.as_deref(), Some(".svc.Req"));
    assert_eq!(call.response.resolved.as_deref(), Some(".svc.Resp"));
    assert!(!call.client_streaming);
    assert!(call.server_streaming);

    let extends = &schema.extends[".svc.Req"];
    assert_eq!(extends.len(), 1);
    let field = &extends[0].fields[0];
    assert_eq!(field.number, 100);
    assert_eq!(field.ty.refs()[0].resolved.as_deref(), Some(".svc.Resp"));
}

#[tokio::test]
async fn test_enum_values_and_aliases() {
    let loader = MemoryLoader::with_files([(
        "e.proto",
        "enum Status { option allow_alias = true; UNKNOWN = 0; OK = 1; FINE = 1; FAILED = -1; }",
    )]);
    let schema = build(&loader, &["e.proto"]).await;
    let status = schema.get_type("Status").unwrap().as_enum().unwrap();
    let values: Vec<(i64, &str)> = status
        .values
        .values()
        .map(|v| (v.number, v.name.as_str()))
        .collect();
    assert_eq!(values, vec![(-1, "FAILED"), (0, "UNKNOWN"), (1, "OK")]);
}

#[tokio::test]
async fn test_cyclic_imports_are_loaded_once() {
    let loader = MemoryLoader::with_files([
        ("a.proto", "import \"b.proto\"; message A { B b = 1; }"),
        ("b.proto", "import \"c.proto\"; message B { C c = 1; }"),
        ("c.proto", "import \"a.proto\"; message C { A a = 1; }"),
    ]);
    let schema = build(&loader, &["a.proto"]).await;
    assert_eq!(schema.file_order, vec!["a.proto", "b.proto", "c.proto"]);
    assert!(schema.diagnostics.is_empty());
    assert_eq!(resolved(&schema, "C", "a"), Some(".A"));

    let options = BuildOptions {
        report_import_cycles: true,
        ..BuildOptions::default()
    };
    let reported = build_with(&loader, &["a.proto"], &options).await;
    assert_eq!(
        kinds(&reported),
        vec![("c.proto".to_string(), DiagnosticKind::ImportCycle)]
    );
    assert_eq!(
        reported.diagnostics[0].message,
        "import cycle: a.proto -> b.proto -> c.proto -> a.proto"
    );
}

#[tokio::test]
async fn test_builds_are_deterministic() {
    let files = [
        ("root.proto", "import \"x.proto\"; import \"y.proto\"; message Root { X x = 1; Y y = 2; Z z = 3; }"),
        ("x.proto", "import \"shared.proto\"; message X { Shared s = 1; }"),
        ("y.proto", "import \"shared.proto\"; import \"missing.proto\"; message Y {}"),
        ("shared.proto", "message Shared {} message X {}"),
    ];
    let options = BuildOptions {
        max_concurrent_loads: 1,
        ..BuildOptions::default()
    };
    let serial = build_with(&MemoryLoader::with_files(files), &["root.proto"], &options).await;
    let concurrent = build(&MemoryLoader::with_files(files), &["root.proto"]).await;

    assert_eq!(serial.file_order, concurrent.file_order);
    assert_eq!(serial.diagnostics, concurrent.diagnostics);
    assert_eq!(serial.types, concurrent.types);
    assert_eq!(
        kinds(&concurrent),
        vec![
            ("root.proto".to_string(), DiagnosticKind::UnresolvedTypeReference),
            ("y.proto".to_string(), DiagnosticKind::ImportNotFound),
            ("shared.proto".to_string(), DiagnosticKind::DuplicateType),
        ]
    );
}

struct BrokenLoader;

#[async_trait]
impl Loader for BrokenLoader {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        if path == "bad.proto" {
            return Err(LoadError::InvalidUtf8 {
                path: path.to_string(),
            });
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_load_failure_becomes_import_diagnostic() {
    let loader = ChainLoader::new()
        .with(MemoryLoader::with_files([("a.proto", "import \"bad.proto\";")]))
        .with(BrokenLoader);
    let schema = build(&loader, &["a.proto"]).await;
    assert_eq!(
        kinds(&schema),
        vec![("a.proto".to_string(), DiagnosticKind::ImportNotFound)]
    );
    assert_eq!(
        schema.diagnostics[0].message,
        "failed to load 'bad.proto': 'bad.proto' is not valid utf-8"
    );
    assert!(schema.load_failures.contains_key("bad.proto"));
}

#[tokio::test]
async fn test_fs_loader_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(
        dir.path().join("main.proto"),
        "syntax = \"proto3\";\nimport \"sub/dep.proto\";\nmessage Main { dep.Dep d = 1; }\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("sub/dep.proto"),
        "syntax = \"proto3\";\npackage dep;\nmessage Dep {}\n",
    )
    .unwrap();

    let loader = FsLoader::new([dir.path()]);
    let schema = build(&loader, &["main.proto"]).await;
    assert!(schema.diagnostics.is_empty(), "{:?}", schema.diagnostics);
    assert_eq!(resolved(&schema, "Main", "d"), Some(".dep.Dep"));

    let dep = schema.get_file("sub/dep.proto").unwrap();
    assert!(dep.absolute_path.ends_with("dep.proto"));
    assert_eq!(dep.package, "dep");
    assert_eq!(schema.types_in_file("sub/dep.proto").len(), 1);
}
