pub mod lexer;
pub mod ast;
pub mod grammar;
pub mod literal;
pub mod visitor;
pub mod printer;
pub mod highlight;

use crate::error::ParseError;
use ast::{Comment, Proto};

/// Tuning knobs for the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// How many times grammar loops may revisit one offset before the parse
    /// is abandoned with [`ParseError::LoopGuard`].
    pub loop_guard_limit: usize,
    /// Deepest nesting of messages, groups and aggregate values accepted
    /// before the file is rejected with a syntax error.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            loop_guard_limit: 1000,
            max_depth: 64,
        }
    }
}

/// Everything produced by parsing one file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseOutput {
    /// Always present; partial when `errors` is non-empty.
    pub proto: Proto,
    /// Every comment in the file, attached or not, in source order.
    pub comments: Vec<Comment>,
    pub errors: Vec<ParseError>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parse a `.proto` source text with default options.
///
/// ```rust
/// let out = protoschema::parser::parse("syntax = \"proto3\";\nmessage Foo { int32 id = 1; }");
/// assert!(out.errors.is_empty());
/// assert_eq!(out.proto.statements.len(), 2);
/// ```
pub fn parse(source: &str) -> ParseOutput {
    parse_with(source, &ParseOptions::default())
}

pub fn parse_with(source: &str, options: &ParseOptions) -> ParseOutput {
    grammar::parse_proto(source, options)
}
