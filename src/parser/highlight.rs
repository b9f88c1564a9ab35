//! Semantic token classification for editor highlighting.

use super::ast::{Span, Token};
use super::visitor::{TokenRole, Visitor};
use super::ParseOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SemanticToken {
    pub span: Span,
    pub role: TokenRole,
}

/// Classify every significant token and every comment of a parsed file,
/// sorted by position. Terminators are not reported.
pub fn semantic_tokens(output: &ParseOutput) -> Vec<SemanticToken> {
    let mut collector = Collector::default();
    collector.visit_proto(&output.proto);
    let mut tokens = collector.tokens;
    // Unattached comments are only in the file-wide list, so take all
    // comments from there instead of from the tree.
    tokens.extend(output.comments.iter().map(|c| SemanticToken {
        span: c.token.span,
        role: TokenRole::Comment,
    }));
    tokens.sort_by_key(|t| (t.span.start, t.span.end));
    tokens
}

#[derive(Default)]
struct Collector {
    tokens: Vec<SemanticToken>,
}

impl<'ast> Visitor<'ast> for Collector {
    fn visit_token(&mut self, token: &'ast Token, role: TokenRole) {
        if matches!(role, TokenRole::Comment | TokenRole::Punctuation) {
            return;
        }
        self.tokens.push(SemanticToken {
            span: token.span,
            role,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classifies_in_source_order() {
        let source = "package p; // c\nmessage M { repeated Foo f = 1; }";
        let out = parse(source);
        let roles: Vec<(&str, TokenRole)> = semantic_tokens(&out)
            .iter()
            .map(|t| (&source[t.span.start..t.span.end], t.role))
            .collect();
        assert_eq!(
            roles,
            vec![
                ("package", TokenRole::Keyword),
                ("p", TokenRole::Namespace),
                ("// c", TokenRole::Comment),
                ("message", TokenRole::Keyword),
                ("M", TokenRole::Declaration),
                ("repeated", TokenRole::Keyword),
                ("Foo", TokenRole::Type),
                ("f", TokenRole::Declaration),
                ("1", TokenRole::Number),
            ]
        );
    }

    #[test]
    fn test_unattached_comment_reported_once() {
        let out = parse("message M {}\n\n// dangling at end\n");
        let comments: Vec<_> = semantic_tokens(&out)
            .into_iter()
            .filter(|t| t.role == TokenRole::Comment)
            .collect();
        assert_eq!(comments.len(), 1);
    }
}
