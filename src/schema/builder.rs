use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{Diagnostic, DiagnosticKind, LoadError};
use crate::parser::ast::*;
use crate::parser::lexer::LineIndex;
use crate::parser::{self, ParseOptions};
use crate::types::{
    EnumType, EnumValueInfo, ExtendInfo, FieldInfo, FieldTypeRef, File, ImportInfo, MessageType,
    RpcInfo, ScalarType, Schema, ServiceInfo, Type, TypeRef,
};

use super::loader::{LoadedFile, Loader};
use super::resolve;

/// Settings for [`build_with`] and [`revalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Upper bound on loads in flight at once.
    pub max_concurrent_loads: usize,
    /// Emit `import-cycle` diagnostics. Cycles are always loaded safely.
    pub report_import_cycles: bool,
    pub parse: ParseOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            max_concurrent_loads: 16,
            report_import_cycles: false,
            parse: ParseOptions::default(),
        }
    }
}

/// Build a schema from `entries` and everything they transitively import.
pub async fn build<L, P>(loader: &L, entries: &[P]) -> Schema
where
    L: Loader + ?Sized,
    P: AsRef<str>,
{
    build_with(loader, entries, &BuildOptions::default()).await
}

pub async fn build_with<L, P>(loader: &L, entries: &[P], options: &BuildOptions) -> Schema
where
    L: Loader + ?Sized,
    P: AsRef<str>,
{
    let entries: Vec<String> = entries.iter().map(|e| e.as_ref().to_string()).collect();
    tracing::info!(entries = entries.len(), "building schema");
    let mut partial = load_closure(loader, &entries, &HashSet::new(), options).await;
    partial.entries = entries;
    let schema = merge(&Schema::default(), &partial, &[]);
    tracing::info!(
        files = schema.files.len(),
        types = schema.types.len(),
        diagnostics = schema.diagnostics.len(),
        "schema built"
    );
    schema
}

/// Reload `changed` (plus any imports they introduce that `old` does not
/// have) and merge the result into a new schema.
pub async fn revalidate<L, P>(loader: &L, old: &Schema, changed: &[P], options: &BuildOptions) -> Schema
where
    L: Loader + ?Sized,
    P: AsRef<str>,
{
    let changed: Vec<String> = changed.iter().map(|c| c.as_ref().to_string()).collect();
    let known: HashSet<String> = old
        .files
        .keys()
        .filter(|p| !changed.contains(p))
        .cloned()
        .collect();
    tracing::debug!(changed = ?changed, "revalidating");
    let partial = load_closure(loader, &changed, &known, options).await;
    merge(old, &partial, &changed)
}

/// Combine `old` with freshly loaded files.
///
/// Only `partial.files`, `partial.file_order`, `partial.entries`,
/// `partial.load_failures` and `partial.report_import_cycles` are read;
/// the registry of every file in `partial` is rebuilt here. Files listed
/// in `changed` or present in `partial` replace their entries in `old`
/// wholesale; a changed path missing from `partial` is dropped. Other files
/// keep their registrations and resolutions. References in the replaced
/// files are resolved against the merged registry.
pub fn merge(old: &Schema, partial: &Schema, changed: &[String]) -> Schema {
    let replaced: HashSet<&str> = changed
        .iter()
        .map(String::as_str)
        .chain(partial.file_order.iter().map(String::as_str))
        .collect();

    let mut schema = Schema {
        report_import_cycles: partial.report_import_cycles,
        ..Schema::default()
    };

    for path in &old.file_order {
        if replaced.contains(path.as_str()) && !partial.files.contains_key(path) {
            continue;
        }
        schema.file_order.push(path.clone());
    }
    for path in &partial.file_order {
        if !schema.file_order.contains(path) {
            schema.file_order.push(path.clone());
        }
    }
    for (path, file) in &old.files {
        if !replaced.contains(path.as_str()) {
            schema.files.insert(path.clone(), file.clone());
        }
    }
    for (path, file) in &partial.files {
        schema.files.insert(path.clone(), file.clone());
    }

    schema.entries = old.entries.clone();
    for entry in &partial.entries {
        if !schema.entries.contains(entry) {
            schema.entries.push(entry.clone());
        }
    }
    schema.load_failures = old
        .load_failures
        .iter()
        .filter(|(path, _)| !replaced.contains(path.as_str()))
        .map(|(p, e)| (p.clone(), e.clone()))
        .chain(partial.load_failures.iter().map(|(p, e)| (p.clone(), e.clone())))
        .filter(|(path, _)| !schema.files.contains_key(path))
        .collect();

    // Unchanged files keep their registrations.
    schema.types = old
        .types
        .iter()
        .filter(|(_, t)| !replaced.contains(t.file()))
        .map(|(k, t)| (k.clone(), t.clone()))
        .collect();
    schema.services = old
        .services
        .iter()
        .filter(|(_, s)| !replaced.contains(s.file.as_str()))
        .map(|(k, s)| (k.clone(), s.clone()))
        .collect();
    for (key, extends) in &old.extends {
        let kept: Vec<ExtendInfo> = extends
            .iter()
            .filter(|x| !replaced.contains(x.file.as_str()))
            .cloned()
            .collect();
        if !kept.is_empty() {
            schema.extends.insert(key.clone(), kept);
        }
    }
    let mut diagnostics: Vec<Diagnostic> = old
        .diagnostics
        .iter()
        .filter(|d| !replaced.contains(d.path.as_str()))
        .filter(|d| !matches!(d.kind, DiagnosticKind::ImportNotFound | DiagnosticKind::ImportCycle))
        .cloned()
        .collect();

    // Register replaced files in discovery order, then resolve them.
    let mut pending_extends = Vec::new();
    for path in &partial.file_order {
        if let Some(file) = partial.files.get(path) {
            let mut registrar = Registrar {
                schema: &mut schema,
                file,
                extends: &mut pending_extends,
                diagnostics: &mut diagnostics,
            };
            registrar.register();
        }
    }
    resolve_references(&mut schema, &replaced, pending_extends, &mut diagnostics);

    diagnostics.extend(import_diagnostics(&schema));
    if schema.report_import_cycles {
        diagnostics.extend(import_cycles(&schema));
    }
    sort_diagnostics(&schema.file_order, &mut diagnostics);
    schema.diagnostics = diagnostics;
    schema
}

/// Load and parse `seeds` and their transitive imports, skipping `known`.
///
/// Loads are issued wave by wave: every path discovered while handling one
/// wave forms the next. Within a wave loads run concurrently, but results are
/// consumed in request order, so discovery order is deterministic.
async fn load_closure<L>(
    loader: &L,
    seeds: &[String],
    known: &HashSet<String>,
    options: &BuildOptions,
) -> Schema
where
    L: Loader + ?Sized,
{
    let mut partial = Schema {
        report_import_cycles: options.report_import_cycles,
        ..Schema::default()
    };
    let mut seen: HashSet<String> = known.clone();
    let mut wave: Vec<String> = Vec::new();
    for seed in seeds {
        if seen.insert(seed.clone()) {
            wave.push(seed.clone());
        }
    }

    let limit = options.max_concurrent_loads.max(1);
    while !wave.is_empty() {
        tracing::debug!(files = wave.len(), "loading wave");
        let results: Vec<(String, Result<Option<LoadedFile>, LoadError>)> =
            stream::iter(wave.into_iter().map(|path| async move {
                let result = loader.load(&path).await;
                (path, result)
            }))
            .buffered(limit)
            .collect()
            .await;

        let mut next = Vec::new();
        for (path, result) in results {
            match result {
                Ok(Some(loaded)) => {
                    let file = parse_file(&path, loaded, &options.parse);
                    for import in &file.imports {
                        if seen.insert(import.path.clone()) {
                            next.push(import.path.clone());
                        }
                    }
                    partial.file_order.push(path.clone());
                    partial.files.insert(path, Arc::new(file));
                }
                Ok(None) => {
                    tracing::debug!(path = %path, "file not found");
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to load file");
                    partial.load_failures.insert(path, e.to_string());
                }
            }
        }
        wave = next;
    }
    partial
}

fn parse_file(path: &str, loaded: LoadedFile, options: &ParseOptions) -> File {
    let parse = parser::parse_with(&loaded.content, options);
    if parse.has_errors() {
        tracing::debug!(path, errors = parse.errors.len(), "parsed with errors");
    }
    let package = parse.proto.package();
    let imports = parse
        .proto
        .imports()
        .map(|i| ImportInfo {
            path: i.path.value_lossy(),
            modifier: i.modifier.as_ref().map(|m| m.text.clone()),
            span: i.path.span,
        })
        .collect();
    File {
        path: path.to_string(),
        absolute_path: loaded.absolute_path,
        lines: LineIndex::new(&loaded.content),
        source: loaded.content,
        package,
        imports,
        parse,
    }
}

/// Flattens one file's declarations into the registry.
struct Registrar<'a> {
    schema: &'a mut Schema,
    file: &'a File,
    extends: &'a mut Vec<ExtendInfo>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Registrar<'_> {
    fn register(&mut self) {
        let path = self.file.path.clone();
        for err in &self.file.parse.errors {
            self.diagnostics.push(Diagnostic::from_parse_error(&path, err));
        }
        let scope = self.file.package_scope();
        let file = self.file;
        for statement in &file.parse.proto.statements {
            match statement {
                TopLevel::Message(m) => self.message(&scope, &m.name, m.span, &m.body, false),
                TopLevel::Enum(e) => self.enum_type(&scope, e),
                TopLevel::Extend(x) => self.extend(&scope, x),
                TopLevel::Service(s) => self.service(&scope, s),
                _ => {}
            }
        }
    }

    /// Insert unless the path is taken; the first definition wins.
    fn claim(&mut self, path: &str, span: Span) -> bool {
        let existing = self
            .schema
            .types
            .get(path)
            .map(|t| t.file().to_string())
            .or_else(|| self.schema.services.get(path).map(|s| s.file.clone()));
        match existing {
            None => true,
            Some(first) => {
                tracing::debug!(path, file = %self.file.path, "duplicate type");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateType,
                    &self.file.path,
                    Some(span),
                    format!("'{}' is already defined in '{}'", path, first),
                ));
                false
            }
        }
    }

    fn message(&mut self, scope: &str, name: &Token, span: Span, body: &[MessageItem], is_group: bool) {
        let path = format!("{}.{}", scope, name.text);
        if !self.claim(&path, name.span) {
            return;
        }
        let mut ty = MessageType {
            path: path.clone(),
            name: name.text.clone(),
            file: self.file.path.clone(),
            span,
            fields: BTreeMap::new(),
            oneofs: Vec::new(),
            is_group,
        };
        for item in body {
            match item {
                MessageItem::Field(f) => add_field(&mut ty.fields, self.field(f, None)),
                MessageItem::MapField(f) => add_field(&mut ty.fields, self.map_field(f)),
                MessageItem::Group(g) => add_field(&mut ty.fields, self.group_field(&path, g, None)),
                MessageItem::Oneof(o) => {
                    ty.oneofs.push(o.name.text.clone());
                    for item in &o.body {
                        let info = match item {
                            OneofItem::Field(f) => self.field(f, Some(&o.name.text)),
                            OneofItem::Group(g) => self.group_field(&path, g, Some(&o.name.text)),
                            _ => None,
                        };
                        add_field(&mut ty.fields, info);
                    }
                }
                _ => {}
            }
        }
        self.schema.types.insert(path.clone(), Type::Message(ty));

        for item in body {
            match item {
                MessageItem::Message(m) => self.message(&path, &m.name, m.span, &m.body, false),
                MessageItem::Enum(e) => self.enum_type(&path, e),
                MessageItem::Extend(x) => self.extend(&path, x),
                MessageItem::Group(g) => self.message(&path, &g.name, g.span, &g.body, true),
                MessageItem::Oneof(o) => {
                    for item in &o.body {
                        if let OneofItem::Group(g) = item {
                            self.message(&path, &g.name, g.span, &g.body, true);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn field(&self, field: &Field, oneof: Option<&str>) -> Option<FieldInfo> {
        Some(FieldInfo {
            name: field.name.text.clone(),
            number: field_number(&field.number)?,
            label: field.label.as_ref().map(|l| l.text.clone()),
            ty: field_type(&field.ty),
            oneof: oneof.map(str::to_string),
            span: field.span,
            file: self.file.path.clone(),
        })
    }

    fn map_field(&self, field: &MapField) -> Option<FieldInfo> {
        let key = match ScalarType::from_name(&field.key_type.text) {
            Some(scalar) => FieldTypeRef::Scalar(scalar),
            None => FieldTypeRef::Named(TypeRef {
                written: field.key_type.text.clone(),
                span: field.key_type.span,
                resolved: None,
            }),
        };
        Some(FieldInfo {
            name: field.name.text.clone(),
            number: field_number(&field.number)?,
            label: None,
            ty: FieldTypeRef::Map {
                key: Box::new(key),
                value: Box::new(field_type(&field.value_type)),
            },
            oneof: None,
            span: field.span,
            file: self.file.path.clone(),
        })
    }

    /// The field half of a group; the message half is registered separately.
    fn group_field(&self, scope: &str, group: &Group, oneof: Option<&str>) -> Option<FieldInfo> {
        Some(FieldInfo {
            name: group.name.text.to_lowercase(),
            number: field_number(&group.number)?,
            label: group.label.as_ref().map(|l| l.text.clone()),
            ty: FieldTypeRef::Named(TypeRef {
                written: group.name.text.clone(),
                span: group.name.span,
                resolved: Some(format!("{}.{}", scope, group.name.text)),
            }),
            oneof: oneof.map(str::to_string),
            span: group.span,
            file: self.file.path.clone(),
        })
    }

    fn enum_type(&mut self, scope: &str, node: &Enum) {
        let path = format!("{}.{}", scope, node.name.text);
        if !self.claim(&path, node.name.span) {
            return;
        }
        let mut values = BTreeMap::new();
        for item in &node.body {
            if let EnumItem::Value(v) = item {
                let Some(number) = field_number(&v.number) else {
                    continue;
                };
                values.entry(number).or_insert_with(|| EnumValueInfo {
                    name: v.name.text.clone(),
                    number,
                    span: v.span,
                });
            }
        }
        self.schema.types.insert(
            path.clone(),
            Type::Enum(EnumType {
                path,
                name: node.name.text.clone(),
                file: self.file.path.clone(),
                span: node.span,
                values,
            }),
        );
    }

    fn extend(&mut self, scope: &str, node: &Extend) {
        let mut fields = Vec::new();
        for item in &node.body {
            match item {
                ExtendItem::Field(f) => fields.extend(self.field(f, None)),
                ExtendItem::Group(g) => {
                    fields.extend(self.group_field(scope, g, None));
                    self.message(scope, &g.name, g.span, &g.body, true);
                }
                _ => {}
            }
        }
        self.extends.push(ExtendInfo {
            extendee: TypeRef {
                written: node.extendee.text(),
                span: node.extendee.span,
                resolved: None,
            },
            scope: scope.to_string(),
            file: self.file.path.clone(),
            span: node.span,
            fields,
        });
    }

    fn service(&mut self, scope: &str, node: &Service) {
        let path = format!("{}.{}", scope, node.name.text);
        if !self.claim(&path, node.name.span) {
            return;
        }
        let rpc_ref = |ty: &RpcType| TypeRef {
            written: ty.ty.text(),
            span: ty.ty.span,
            resolved: None,
        };
        let rpcs = node
            .body
            .iter()
            .filter_map(|item| match item {
                ServiceItem::Rpc(rpc) => Some(RpcInfo {
                    name: rpc.name.text.clone(),
                    request: rpc_ref(&rpc.request),
                    response: rpc_ref(&rpc.response),
                    client_streaming: rpc.request.stream.is_some(),
                    server_streaming: rpc.response.stream.is_some(),
                    span: rpc.span,
                }),
                _ => None,
            })
            .collect();
        self.schema.services.insert(
            path.clone(),
            ServiceInfo {
                path,
                name: node.name.text.clone(),
                file: self.file.path.clone(),
                span: node.span,
                rpcs,
            },
        );
    }
}

fn add_field(fields: &mut BTreeMap<i64, FieldInfo>, info: Option<FieldInfo>) {
    if let Some(info) = info {
        fields.entry(info.number).or_insert(info);
    }
}

fn field_number(lit: &IntLit) -> Option<i64> {
    lit.value().and_then(|v| i64::try_from(v).ok())
}

fn field_type(ident: &FullIdent) -> FieldTypeRef {
    if !ident.absolute && ident.parts.len() == 1 {
        if let Some(scalar) = ScalarType::from_name(&ident.parts[0].text) {
            return FieldTypeRef::Scalar(scalar);
        }
    }
    FieldTypeRef::Named(TypeRef {
        written: ident.text(),
        span: ident.span,
        resolved: None,
    })
}

/// Resolve every reference declared in `files`, then file the pending
/// extend blocks under their extendee.
fn resolve_references(
    schema: &mut Schema,
    files: &HashSet<&str>,
    pending_extends: Vec<ExtendInfo>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let known: HashSet<String> = schema.types.keys().cloned().collect();
    let mut resolver = |r: &mut TypeRef, scope: &str, file: &str| {
        if r.resolved.is_some() {
            return;
        }
        r.resolved = resolve::resolve_with(&r.written, scope, |c| known.contains(c));
        if r.resolved.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnresolvedTypeReference,
                file,
                Some(r.span),
                format!("unresolved type reference '{}'", r.written),
            ));
        }
    };

    for ty in schema.types.values_mut() {
        let Type::Message(message) = ty else {
            continue;
        };
        if !files.contains(message.file.as_str()) {
            continue;
        }
        for field in message.fields.values_mut() {
            for r in field.ty.refs_mut() {
                resolver(r, &message.path, &field.file);
            }
        }
    }

    for service in schema.services.values_mut() {
        if !files.contains(service.file.as_str()) {
            continue;
        }
        let scope = service
            .path
            .rfind('.')
            .map_or("", |pos| &service.path[..pos])
            .to_string();
        for rpc in &mut service.rpcs {
            resolver(&mut rpc.request, &scope, &service.file);
            resolver(&mut rpc.response, &scope, &service.file);
        }
    }

    for mut extend in pending_extends {
        resolver(&mut extend.extendee, &extend.scope, &extend.file);
        for field in &mut extend.fields {
            for r in field.ty.refs_mut() {
                resolver(r, &extend.scope, &field.file);
            }
        }
        let key = extend
            .extendee
            .resolved
            .clone()
            .unwrap_or_else(|| extend.extendee.written.clone());
        schema.extends.entry(key).or_default().push(extend);
    }
}

fn import_diagnostics(schema: &Schema) -> Vec<Diagnostic> {
    let missing = |path: &str| match schema.load_failures.get(path) {
        Some(reason) => format!("failed to load '{}': {}", path, reason),
        None => format!("'{}' not found", path),
    };
    let mut out = Vec::new();
    for file in schema.files() {
        for import in &file.imports {
            if !schema.files.contains_key(&import.path) {
                out.push(Diagnostic::new(
                    DiagnosticKind::ImportNotFound,
                    &file.path,
                    Some(import.span),
                    missing(&import.path),
                ));
            }
        }
    }
    for entry in &schema.entries {
        if !schema.files.contains_key(entry) {
            out.push(Diagnostic::new(
                DiagnosticKind::ImportNotFound,
                entry,
                None,
                missing(entry),
            ));
        }
    }
    out
}

/// One diagnostic per import that closes a cycle, on the importing file.
fn import_cycles(schema: &Schema) -> Vec<Diagnostic> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'s>(
        schema: &'s Schema,
        path: &'s str,
        marks: &mut HashMap<&'s str, Mark>,
        stack: &mut Vec<&'s str>,
        out: &mut Vec<Diagnostic>,
    ) {
        let Some(file) = schema.files.get(path) else {
            return;
        };
        marks.insert(path, Mark::Visiting);
        stack.push(path);
        for import in &file.imports {
            let target = import.path.as_str();
            match marks.get(target) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|p| *p == target).unwrap_or(0);
                    let mut cycle: Vec<&str> = stack[start..].to_vec();
                    cycle.push(target);
                    out.push(Diagnostic::new(
                        DiagnosticKind::ImportCycle,
                        path,
                        Some(import.span),
                        format!("import cycle: {}", cycle.join(" -> ")),
                    ));
                }
                None => visit(schema, target, marks, stack, out),
            }
        }
        stack.pop();
        marks.insert(path, Mark::Done);
    }

    let mut marks = HashMap::new();
    let mut out = Vec::new();
    for path in &schema.file_order {
        if !marks.contains_key(path.as_str()) {
            visit(schema, path, &mut marks, &mut Vec::new(), &mut out);
        }
    }
    out
}

/// File discovery order, then position. Diagnostics without a known file go
/// last.
fn sort_diagnostics(file_order: &[String], diagnostics: &mut [Diagnostic]) {
    let index: HashMap<&str, usize> = file_order
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();
    diagnostics.sort_by_key(|d| {
        (
            index.get(d.path.as_str()).copied().unwrap_or(usize::MAX),
            d.span.map_or(0, |s| s.start),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn kinds(schema: &Schema) -> Vec<(String, DiagnosticKind)> {
        schema
            .diagnostics
            .iter()
            .map(|d| (d.path.clone(), d.kind))
            .collect()
    }

    #[tokio::test]
    async fn test_nested_types_flattened() {
        let loader = MemoryLoader::with_files([(
            "a.proto",
            "package p; message Outer { message Inner { enum Kind { A = 0; } } Inner inner = 1; }",
        )]);
        let schema = build(&loader, &["a.proto"]).await;
        assert!(schema.diagnostics.is_empty(), "{:?}", schema.diagnostics);
        let mut paths: Vec<&String> = schema.types.keys().collect();
        paths.sort();
        assert_eq!(paths, vec![".p.Outer", ".p.Outer.Inner", ".p.Outer.Inner.Kind"]);
        let outer = schema.get_type("p.Outer").unwrap().as_message().unwrap();
        let inner = outer.field_by_name("inner").unwrap();
        assert_eq!(inner.ty.refs()[0].resolved.as_deref(), Some(".p.Outer.Inner"));
    }

    #[tokio::test]
    async fn test_group_registers_type_and_field() {
        let loader = MemoryLoader::with_files([(
            "g.proto",
            "message M { optional group Result = 1 { optional string url = 2; } }",
        )]);
        let schema = build(&loader, &["g.proto"]).await;
        let group = schema.get_type(".M.Result").unwrap().as_message().unwrap();
        assert!(group.is_group);
        let m = schema.get_type(".M").unwrap().as_message().unwrap();
        let field = &m.fields[&1];
        assert_eq!(field.name, "result");
        assert_eq!(field.ty.refs()[0].resolved.as_deref(), Some(".M.Result"));
    }

    #[tokio::test]
    async fn test_diamond_imports_load_once() {
        let loader = MemoryLoader::with_files([
            ("top.proto", "import \"left.proto\"; import \"right.proto\";"),
            ("left.proto", "import \"base.proto\";"),
            ("right.proto", "import \"base.proto\";"),
            ("base.proto", "message Base {}"),
        ]);
        let schema = build(&loader, &["top.proto"]).await;
        assert_eq!(
            schema.file_order,
            vec!["top.proto", "left.proto", "right.proto", "base.proto"]
        );
        assert!(schema.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_import_cycle_policy() {
        let loader = MemoryLoader::with_files([
            ("a.proto", "import \"b.proto\"; message A {}"),
            ("b.proto", "import \"a.proto\"; message B {}"),
        ]);
        let silent = build(&loader, &["a.proto"]).await;
        assert!(silent.diagnostics.is_empty());
        assert!(silent.get_type("B").is_some());

        let options = BuildOptions {
            report_import_cycles: true,
            ..BuildOptions::default()
        };
        let reported = build_with(&loader, &["a.proto"], &options).await;
        assert_eq!(
            kinds(&reported),
            vec![("b.proto".to_string(), DiagnosticKind::ImportCycle)]
        );
        assert_eq!(
            reported.diagnostics[0].message,
            "import cycle: a.proto -> b.proto -> a.proto"
        );
    }

    #[tokio::test]
    async fn test_missing_entry_and_import() {
        let loader = MemoryLoader::with_files([("a.proto", "import \"gone.proto\";")]);
        let schema = build(&loader, &["a.proto", "nope.proto"]).await;
        assert_eq!(
            kinds(&schema),
            vec![
                ("a.proto".to_string(), DiagnosticKind::ImportNotFound),
                ("nope.proto".to_string(), DiagnosticKind::ImportNotFound),
            ]
        );
        assert!(schema.diagnostics[0].span.is_some());
        assert_eq!(schema.diagnostics[1].span, None);
    }

    #[test]
    fn test_field_type_scalars() {
        let out = crate::parser::parse("message M { int32 a = 1; .int32 b = 2; foo.int32 c = 3; }");
        let TopLevel::Message(m) = &out.proto.statements[0] else {
            panic!("expected message");
        };
        let types: Vec<FieldTypeRef> = m
            .body
            .iter()
            .filter_map(|i| match i {
                MessageItem::Field(f) => Some(field_type(&f.ty)),
                _ => None,
            })
            .collect();
        assert_eq!(types[0], FieldTypeRef::Scalar(ScalarType::Int32));
        assert!(matches!(&types[1], FieldTypeRef::Named(r) if r.written == ".int32"));
        assert!(matches!(&types[2], FieldTypeRef::Named(r) if r.written == "foo.int32"));
    }
}
