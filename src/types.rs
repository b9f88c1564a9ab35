use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::Diagnostic;
use crate::parser::ast::{Proto, Span};
use crate::parser::lexer::LineIndex;
use crate::parser::ParseOutput;

/// The fifteen built-in field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<ScalarType> {
        Some(match name {
            "double" => ScalarType::Double,
            "float" => ScalarType::Float,
            "int32" => ScalarType::Int32,
            "int64" => ScalarType::Int64,
            "uint32" => ScalarType::Uint32,
            "uint64" => ScalarType::Uint64,
            "sint32" => ScalarType::Sint32,
            "sint64" => ScalarType::Sint64,
            "fixed32" => ScalarType::Fixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed32" => ScalarType::Sfixed32,
            "sfixed64" => ScalarType::Sfixed64,
            "bool" => ScalarType::Bool,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a message or enum as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TypeRef {
    /// The name as written, e.g. `Inner` or `.pkg.Outer.Inner`.
    pub written: String,
    pub span: Span,
    /// Fully qualified path (`.pkg.Outer.Inner`) once resolved.
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FieldTypeRef {
    Scalar(ScalarType),
    Named(TypeRef),
    Map {
        key: Box<FieldTypeRef>,
        value: Box<FieldTypeRef>,
    },
}

impl FieldTypeRef {
    /// Named references inside this type, map key first.
    pub fn refs(&self) -> Vec<&TypeRef> {
        match self {
            FieldTypeRef::Scalar(_) => Vec::new(),
            FieldTypeRef::Named(r) => vec![r],
            FieldTypeRef::Map { key, value } => {
                let mut refs = key.refs();
                refs.extend(value.refs());
                refs
            }
        }
    }

    pub(crate) fn refs_mut(&mut self) -> Vec<&mut TypeRef> {
        match self {
            FieldTypeRef::Scalar(_) => Vec::new(),
            FieldTypeRef::Named(r) => vec![r],
            FieldTypeRef::Map { key, value } => {
                let mut refs = key.refs_mut();
                refs.extend(value.refs_mut());
                refs
            }
        }
    }
}

/// A field of a message, group or extend block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldInfo {
    pub name: String,
    pub number: i64,
    /// `optional`, `required` or `repeated`, if written.
    pub label: Option<String>,
    pub ty: FieldTypeRef,
    /// Name of the enclosing oneof.
    pub oneof: Option<String>,
    pub span: Span,
    /// Logical path of the file the field is declared in.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MessageType {
    /// Fully qualified path, e.g. `.pkg.Outer.Inner`.
    pub path: String,
    pub name: String,
    pub file: String,
    pub span: Span,
    /// Fields keyed by number; the first declaration of a number wins.
    pub fields: BTreeMap<i64, FieldInfo>,
    pub oneofs: Vec<String>,
    /// Declared with the legacy `group` syntax.
    pub is_group: bool,
}

impl MessageType {
    pub fn field_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.values().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EnumValueInfo {
    pub name: String,
    pub number: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EnumType {
    pub path: String,
    pub name: String,
    pub file: String,
    pub span: Span,
    /// Values keyed by number; with aliases the first name wins.
    pub values: BTreeMap<i64, EnumValueInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum Type {
    Message(MessageType),
    Enum(EnumType),
}

impl Type {
    pub fn path(&self) -> &str {
        match self {
            Type::Message(m) => &m.path,
            Type::Enum(e) => &e.path,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            Type::Message(m) => &m.file,
            Type::Enum(e) => &e.file,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Type::Message(m) => m.span,
            Type::Enum(e) => e.span,
        }
    }

    pub fn as_message(&self) -> Option<&MessageType> {
        match self {
            Type::Message(m) => Some(m),
            Type::Enum(_) => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            Type::Enum(e) => Some(e),
            Type::Message(_) => None,
        }
    }
}

/// One `extend` block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtendInfo {
    pub extendee: TypeRef,
    /// Scope the block is declared in: the package path or enclosing message.
    pub scope: String,
    pub file: String,
    pub span: Span,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RpcInfo {
    pub name: String,
    pub request: TypeRef,
    pub response: TypeRef,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceInfo {
    pub path: String,
    pub name: String,
    pub file: String,
    pub span: Span,
    pub rpcs: Vec<RpcInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    pub path: String,
    /// `weak` or `public`.
    pub modifier: Option<String>,
    pub span: Span,
}

/// One loaded and parsed source file.
#[derive(Debug, Clone)]
pub struct File {
    /// Logical path as imported, e.g. `google/protobuf/empty.proto`.
    pub path: String,
    /// Where the loader found it.
    pub absolute_path: String,
    pub source: String,
    /// Dotted package name, or empty.
    pub package: String,
    pub imports: Vec<ImportInfo>,
    pub parse: ParseOutput,
    pub lines: LineIndex,
}

impl File {
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        self.lines.line_col(&self.source, offset)
    }

    /// Leading-dot package scope, e.g. `.pkg.sub`, or `` for no package.
    pub fn package_scope(&self) -> String {
        if self.package.is_empty() {
            String::new()
        } else {
            format!(".{}", self.package)
        }
    }
}

/// A linked type registry built from a set of files.
///
/// Schemas are never mutated once built; updates produce a new schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub files: HashMap<String, Arc<File>>,
    /// Logical file paths in discovery order.
    pub file_order: Vec<String>,
    /// Messages and enums keyed by fully qualified path.
    pub types: HashMap<String, Type>,
    /// Extend blocks keyed by the extendee's resolved path, or its written
    /// name when unresolved.
    pub extends: HashMap<String, Vec<ExtendInfo>>,
    pub services: HashMap<String, ServiceInfo>,
    pub diagnostics: Vec<Diagnostic>,
    /// Paths the schema was built from.
    pub entries: Vec<String>,
    /// Paths that exist but could not be read, with the reason.
    pub load_failures: HashMap<String, String>,
    pub report_import_cycles: bool,
}

impl Schema {
    /// Look up a message or enum. The leading dot is optional.
    pub fn get_type(&self, path: &str) -> Option<&Type> {
        if path.starts_with('.') {
            self.types.get(path)
        } else {
            self.types.get(&format!(".{}", path))
        }
    }

    pub fn get_service(&self, path: &str) -> Option<&ServiceInfo> {
        if path.starts_with('.') {
            self.services.get(path)
        } else {
            self.services.get(&format!(".{}", path))
        }
    }

    pub fn get_file(&self, path: &str) -> Option<&File> {
        self.files.get(path).map(|f| f.as_ref())
    }

    pub fn file_ast(&self, path: &str) -> Option<&Proto> {
        self.get_file(path).map(|f| &f.parse.proto)
    }

    /// Files in discovery order.
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.file_order
            .iter()
            .filter_map(|p| self.files.get(p).map(|f| f.as_ref()))
    }

    pub fn diagnostics_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.path == path)
    }

    /// Types declared in one file, sorted by path.
    pub fn types_in_file(&self, path: &str) -> Vec<&Type> {
        let mut types: Vec<&Type> = self.types.values().filter(|t| t.file() == path).collect();
        types.sort_by(|a, b| a.path().cmp(b.path()));
        types
    }

    /// Render a diagnostic with its position and the surrounding source lines.
    pub fn render_diagnostic(&self, diagnostic: &Diagnostic) -> String {
        let file = self.get_file(&diagnostic.path);
        match (file, diagnostic.span) {
            (Some(file), Some(span)) => {
                let (line, column) = file.line_col(span.start);
                format!(
                    "{}:{}:{}: {}: {}\n{}",
                    diagnostic.path,
                    line,
                    column,
                    diagnostic.kind,
                    diagnostic.message,
                    file.lines.context(&file.source, span.start, 2),
                )
            }
            _ => format!("{}\n", diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar_names() {
        for name in ["double", "sfixed64", "bytes", "bool"] {
            assert_eq!(ScalarType::from_name(name).unwrap().as_str(), name);
        }
        assert_eq!(ScalarType::from_name("Int32"), None);
        assert_eq!(ScalarType::from_name("group"), None);
    }

    #[test]
    fn test_map_references() {
        let named = |name: &str| {
            FieldTypeRef::Named(TypeRef {
                written: name.to_string(),
                span: Span::new(0, name.len()),
                resolved: None,
            })
        };
        let ty = FieldTypeRef::Map {
            key: Box::new(FieldTypeRef::Scalar(ScalarType::String)),
            value: Box::new(named("Foo")),
        };
        let refs: Vec<&str> = ty.refs().iter().map(|r| r.written.as_str()).collect();
        assert_eq!(refs, vec!["Foo"]);
        assert!(FieldTypeRef::Scalar(ScalarType::Bool).refs().is_empty());
    }
}
