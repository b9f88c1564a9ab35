//! Incremental revalidation and live schema updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use protoschema::schema::{
    build, revalidate, BuildOptions, LoadedFile, Loader, MemoryLoader, SharedSchema,
};
use protoschema::{DiagnosticKind, LoadError, Schema};
use tokio::sync::Semaphore;

fn kinds(schema: &Schema) -> Vec<(String, DiagnosticKind)> {
    schema
        .diagnostics
        .iter()
        .map(|d| (d.path.clone(), d.kind))
        .collect()
}

fn field_target<'s>(schema: &'s Schema, message: &str, field: &str) -> Option<&'s str> {
    let message = schema.get_type(message)?.as_message()?;
    message.field_by_name(field)?.ty.refs()[0].resolved.as_deref()
}

fn two_files() -> MemoryLoader {
    MemoryLoader::with_files([
        ("a.proto", "import \"b.proto\";\nmessage A { B b = 1; }"),
        ("b.proto", "message B {}"),
    ])
}

#[tokio::test]
async fn test_unchanged_revalidation_matches_fresh_build() {
    let loader = two_files();
    let old = build(&loader, &["a.proto"]).await;
    let new = revalidate(&loader, &old, &["a.proto", "b.proto"], &BuildOptions::default()).await;

    assert_eq!(new.file_order, old.file_order);
    assert_eq!(new.types, old.types);
    assert_eq!(new.diagnostics, old.diagnostics);
    assert_eq!(new.entries, old.entries);
}

#[tokio::test]
async fn test_changed_file_replaces_its_types() {
    let loader = two_files();
    let old = build(&loader, &["a.proto"]).await;

    loader.insert("b.proto", "message B { string name = 1; }\nmessage Extra {}");
    let new = revalidate(&loader, &old, &["b.proto"], &BuildOptions::default()).await;

    assert!(new.get_type("Extra").is_some());
    let b = new.get_type("B").unwrap().as_message().unwrap();
    assert_eq!(b.fields.len(), 1);
    // Unchanged file keeps its parse and its resolutions.
    assert!(Arc::ptr_eq(&old.files["a.proto"], &new.files["a.proto"]));
    assert_eq!(field_target(&new, "A", "b"), Some(".B"));
    // The old schema is untouched.
    assert!(old.get_type("Extra").is_none());
}

#[tokio::test]
async fn test_reparsed_file_resolves_against_merged_registry() {
    let loader = two_files();
    let old = build(&loader, &["a.proto"]).await;

    loader.insert("b.proto", "message Renamed {}");
    let partial = revalidate(&loader, &old, &["b.proto"], &BuildOptions::default()).await;
    // a.proto was not re-parsed, so it still points at the old name.
    assert_eq!(field_target(&partial, "A", "b"), Some(".B"));

    let full = revalidate(&loader, &partial, &["a.proto"], &BuildOptions::default()).await;
    assert_eq!(field_target(&full, "A", "b"), None);
    assert_eq!(
        kinds(&full),
        vec![("a.proto".to_string(), DiagnosticKind::UnresolvedTypeReference)]
    );
}

#[tokio::test]
async fn test_new_import_is_loaded_and_deleted_file_dropped() {
    let loader = two_files();
    loader.insert("c.proto", "message C {}");
    let old = build(&loader, &["a.proto"]).await;
    assert_eq!(old.file_order, vec!["a.proto", "b.proto"]);

    loader.insert("a.proto", "import \"c.proto\";\nmessage A { C c = 1; }");
    let added = revalidate(&loader, &old, &["a.proto"], &BuildOptions::default()).await;
    assert_eq!(added.file_order, vec!["a.proto", "b.proto", "c.proto"]);
    assert_eq!(field_target(&added, "A", "c"), Some(".C"));

    loader.remove("c.proto");
    let removed = revalidate(&loader, &added, &["c.proto"], &BuildOptions::default()).await;
    assert_eq!(removed.file_order, vec!["a.proto", "b.proto"]);
    assert!(removed.get_type("C").is_none());
    assert_eq!(
        kinds(&removed),
        vec![("a.proto".to_string(), DiagnosticKind::ImportNotFound)]
    );
}

#[tokio::test]
async fn test_unchanged_file_keeps_its_diagnostics_and_definitions() {
    let loader = MemoryLoader::with_files([
        ("a.proto", "import \"b.proto\";\nmessage Shared {}\nmessage A { int32 x = ; }"),
        ("b.proto", "message B {}"),
    ]);
    let old = build(&loader, &["a.proto"]).await;
    assert_eq!(
        kinds(&old),
        vec![("a.proto".to_string(), DiagnosticKind::SyntaxError)]
    );

    loader.insert("b.proto", "message B {}\nmessage Shared { int32 y = 1; }");
    let new = revalidate(&loader, &old, &["b.proto"], &BuildOptions::default()).await;
    assert_eq!(
        kinds(&new),
        vec![
            ("a.proto".to_string(), DiagnosticKind::SyntaxError),
            ("b.proto".to_string(), DiagnosticKind::DuplicateType),
        ]
    );
    assert_eq!(new.get_type("Shared").unwrap().file(), "a.proto");
}

/// Holds back the first load of `slow.proto` until a permit is released.
struct GatedLoader {
    files: MemoryLoader,
    gate: Semaphore,
    armed: AtomicBool,
}

#[async_trait]
impl Loader for GatedLoader {
    async fn load(&self, path: &str) -> Result<Option<LoadedFile>, LoadError> {
        if path == "slow.proto" && self.armed.swap(false, Ordering::SeqCst) {
            let _permit = self.gate.acquire().await.unwrap();
        }
        self.files.load(path).await
    }
}

#[tokio::test]
async fn test_superseded_update_is_discarded() {
    let loader = Arc::new(GatedLoader {
        files: MemoryLoader::with_files([
            ("slow.proto", "message SlowV1 {}"),
            ("fast.proto", "message FastV1 {}"),
        ]),
        gate: Semaphore::new(0),
        armed: AtomicBool::new(false),
    });
    let shared = Arc::new(SharedSchema::default());
    let options = BuildOptions::default();
    shared
        .rebuild(&*loader, &["slow.proto", "fast.proto"], &options)
        .await
        .unwrap();
    assert_eq!(shared.generation(), 1);

    loader.files.insert("slow.proto", "message SlowV2 {}");
    loader.armed.store(true, Ordering::SeqCst);
    let slow = tokio::spawn({
        let shared = shared.clone();
        let loader = loader.clone();
        async move {
            shared
                .revalidate(&*loader, &["slow.proto"], &BuildOptions::default())
                .await
        }
    });
    while shared.generation() < 2 {
        tokio::task::yield_now().await;
    }

    // The newer update also picks up the still-pending slow.proto edit.
    loader.files.insert("fast.proto", "message FastV2 {}");
    let published = shared
        .revalidate(&*loader, &["fast.proto"], &options)
        .await
        .unwrap();
    assert!(published.get_type("SlowV2").is_some());
    assert!(published.get_type("FastV2").is_some());

    loader.gate.add_permits(1);
    assert!(slow.await.unwrap().is_none());

    let live = shared.load();
    assert!(Arc::ptr_eq(&live, &published));
    assert!(live.get_type("SlowV1").is_none());
    assert!(live.get_type("FastV1").is_none());
}
