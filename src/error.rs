use std::fmt;

use crate::parser::lexer::Span;

/// A grammar mismatch at a specific offset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at line {line}, column {column}: {}", self.message())]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SyntaxError {
    pub offset: usize,
    /// 1-based line of `offset`.
    pub line: usize,
    /// 1-based column (in chars) of `offset`.
    pub column: usize,
    /// Every pattern that would have been accepted here.
    pub expected: Vec<String>,
    /// The text found at `offset`, or `end of input`.
    pub found: String,
    /// Extra guidance when the input matches a known mistake.
    pub hint: Option<String>,
    /// Rendered source lines around `offset` with a caret marker.
    pub context: String,
}

impl SyntaxError {
    pub fn span(&self) -> Span {
        Span::new(self.offset, self.offset)
    }

    /// The one-line message without position information.
    pub fn message(&self) -> String {
        let expected = match self.expected.as_slice() {
            [] => "something else".to_string(),
            [one] => one.clone(),
            many => format!("one of {}", many.join(", ")),
        };
        match &self.hint {
            Some(hint) => format!("expected {}, found {} ({})", expected, self.found, hint),
            None => format!("expected {}, found {}", expected, self.found),
        }
    }
}

/// Errors from the `.proto` parser.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ParseError {
    #[error("{0}")]
    Syntax(Box<SyntaxError>),

    /// The grammar stopped making progress. Always a parser bug.
    #[error("internal parser error: no progress at line {line}, column {column} after {visits} visits")]
    LoopGuard {
        offset: usize,
        line: usize,
        column: usize,
        visits: usize,
    },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            ParseError::Syntax(e) => e.offset,
            ParseError::LoopGuard { offset, .. } => *offset,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ParseError::LoopGuard { .. })
    }
}

impl From<SyntaxError> for ParseError {
    fn from(e: SyntaxError) -> Self {
        ParseError::Syntax(Box::new(e))
    }
}

/// Errors from a [`Loader`](crate::schema::Loader).
///
/// A missing file is not an error; loaders return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("'{path}' is not valid utf-8")]
    InvalidUtf8 { path: String },
}

/// Machine-distinguishable diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DiagnosticKind {
    SyntaxError,
    ImportNotFound,
    DuplicateType,
    UnresolvedTypeReference,
    ImportCycle,
    InternalError,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::SyntaxError => "syntax-error",
            DiagnosticKind::ImportNotFound => "import-not-found",
            DiagnosticKind::DuplicateType => "duplicate-type",
            DiagnosticKind::UnresolvedTypeReference => "unresolved-type-reference",
            DiagnosticKind::ImportCycle => "import-cycle",
            DiagnosticKind::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A positioned problem found while parsing or resolving a file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Logical path of the file the diagnostic belongs to.
    pub path: String,
    /// `None` when the problem has no location (e.g. a missing entry file).
    pub span: Option<Span>,
    pub message: String,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        path: impl Into<String>,
        span: Option<Span>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            path: path.into(),
            span,
            message: message.into(),
            kind,
        }
    }

    pub fn from_parse_error(path: &str, err: &ParseError) -> Self {
        match err {
            ParseError::Syntax(e) => Diagnostic::new(
                DiagnosticKind::SyntaxError,
                path,
                Some(e.span()),
                e.message(),
            ),
            ParseError::LoopGuard { offset, .. } => Diagnostic::new(
                DiagnosticKind::InternalError,
                path,
                Some(Span::new(*offset, *offset)),
                err.to_string(),
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_syntax_error_display() {
        let out = crate::parser::parse("message M {\n  int32 x : 1;\n}");
        let err = out.errors[0].clone();
        assert_eq!(
            err.to_string(),
            "syntax error at line 2, column 11: expected '=', found ':' (numbers are assigned with '=')"
        );

        let diagnostic = Diagnostic::from_parse_error("m.proto", &err);
        assert_eq!(diagnostic.kind, DiagnosticKind::SyntaxError);
        assert_eq!(
            diagnostic.to_string(),
            "m.proto: syntax-error: expected '=', found ':' (numbers are assigned with '=')"
        );
    }
}
