//! protoschema: an error-tolerant `.proto` parser and cross-file schema
//! resolver for editor tooling.
//!
//! Parsing never gives up on a whole file because of one bad field: malformed
//! fields become [`MalformedField`](parser::ast::MalformedField) nodes and the
//! rest of the file is still parsed. Every node keeps its source span and
//! attached comments.
//!
//! # Quick Start
//!
//! ```rust
//! use protoschema::schema::{build, MemoryLoader};
//!
//! # tokio_test_block(async {
//! let loader = MemoryLoader::with_files([
//!     ("a.proto", "syntax = \"proto3\"; package a; import \"b.proto\"; message A { b.B b = 1; }"),
//!     ("b.proto", "syntax = \"proto3\"; package b; message B {}"),
//! ]);
//! let schema = build(&loader, &["a.proto"]).await;
//! assert!(schema.diagnostics.is_empty());
//!
//! let a = schema.get_type("a.A").unwrap().as_message().unwrap();
//! let b = a.field_by_name("b").unwrap();
//! assert_eq!(b.ty.refs()[0].resolved.as_deref(), Some(".b.B"));
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod error;
pub mod parser;
pub mod schema;
pub mod types;

pub use error::{Diagnostic, DiagnosticKind, LoadError, ParseError, SyntaxError};
pub use parser::{parse, parse_with, ParseOptions, ParseOutput};
pub use schema::{build, build_with, revalidate, BuildOptions, Loader, SharedSchema};
pub use types::{File, Schema, Type};
