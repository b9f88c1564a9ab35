use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ParseError, SyntaxError};

/// A half-open `[start, end)` byte range into one file's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Span { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Like `contains`, but also true at `end` (a cursor right after the node).
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A span plus the exact source text it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Token {
    pub span: Span,
    pub text: String,
}

impl Token {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Token {
            span,
            text: text.into(),
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Comment {
    pub kind: CommentKind,
    pub token: Token,
}

/// Trivia seen since the last significant token.
#[derive(Debug, Clone, PartialEq)]
enum Trivia {
    Comment(Comment),
    BlankLine,
}

fn ident_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap());
    &RE
}

fn int_re() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(?:0[xX][0-9A-Fa-f]+|0[0-7]*|[1-9][0-9]*)").unwrap());
    &RE
}

fn float_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:[0-9]+\.[0-9]*(?:[eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+|\.[0-9]+(?:[eE][+-]?[0-9]+)?)",
        )
        .unwrap()
    });
    &RE
}

fn string_re() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"^(?:"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')"#).unwrap());
    &RE
}

/// Something the cursor can match at its offset.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Exact text. Literals ending in an identifier character only match on a
    /// word boundary, so `message` does not match `messages`.
    Literal(&'static str),
    /// An anchored regular expression with a human-readable name.
    Regex(&'static str, fn() -> &'static Regex),
}

impl Pattern {
    pub const IDENT: Pattern = Pattern::Regex("identifier", ident_re);
    pub const INT: Pattern = Pattern::Regex("integer", int_re);
    pub const FLOAT: Pattern = Pattern::Regex("float", float_re);
    pub const STRING: Pattern = Pattern::Regex("string", string_re);

    /// Length of the match at `offset`, if any.
    fn match_len(&self, source: &str, offset: usize) -> Option<usize> {
        let rest = &source[offset..];
        match self {
            Pattern::Literal(lit) => {
                if !rest.starts_with(lit) {
                    return None;
                }
                let word = lit.chars().last().is_some_and(is_ident_char);
                if word && rest[lit.len()..].chars().next().is_some_and(is_ident_char) {
                    return None;
                }
                Some(lit.len())
            }
            Pattern::Regex(_, re) => re()
                .find(rest)
                .filter(|m| m.start() == 0 && m.end() > 0)
                .map(|m| m.end()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Pattern::Literal(lit) => format!("'{}'", lit),
            Pattern::Regex(name, _) => name.to_string(),
        }
    }
}

/// A pattern tried only to explain a failure better.
#[derive(Debug, Clone, Copy)]
pub struct Mistake {
    pub pattern: Pattern,
    pub hint: &'static str,
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Saved cursor state for backtracking.
#[derive(Debug, Clone)]
pub struct Snapshot {
    offset: usize,
    pending: Vec<Trivia>,
}

impl Snapshot {
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Byte offset ↔ line/column conversion for one source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { line_starts }
    }

    /// 1-based line and column of `offset`. Columns count chars.
    pub fn line_col(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = source
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        (line + 1, column + 1)
    }

    /// Byte offset of a 1-based line/column, clamped to the end of that line.
    pub fn offset(&self, source: &str, line: usize, column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map_or(source.len(), |next| next - 1);
        let text = &source[start..end];
        let col = column.saturating_sub(1);
        Some(
            text.char_indices()
                .nth(col)
                .map_or(end, |(i, _)| start + i),
        )
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Render `radius` lines either side of `offset`, with a caret under it.
    pub fn context(&self, source: &str, offset: usize, radius: usize) -> String {
        let (line, column) = self.line_col(source, offset);
        let first = line.saturating_sub(radius).max(1);
        let last = (line + radius).min(self.line_count());
        let width = last.to_string().len();
        let mut out = String::new();
        for n in first..=last {
            let start = self.line_starts[n - 1];
            let end = self
                .line_starts
                .get(n)
                .map_or(source.len(), |next| next - 1);
            let text = source[start..end].trim_end_matches('\r');
            out.push_str(&format!("{:>width$} | {}\n", n, text, width = width));
            if n == line {
                out.push_str(&format!(
                    "{:>width$} | {}^\n",
                    "",
                    " ".repeat(column - 1),
                    width = width
                ));
            }
        }
        out
    }
}

/// Source text plus a mutable offset.
///
/// The cursor never skips whitespace on its own: grammar code calls
/// [`Cursor::skip_trivia`] between tokens, which also records comments and
/// blank lines for attachment to statements.
pub struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    lines: LineIndex,
    comments: Vec<Comment>,
    /// Furthest offset whose comments are already recorded.
    scanned_to: usize,
    pending: Vec<Trivia>,
    guard_offset: usize,
    guard_visits: usize,
    guard_limit: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_guard_limit(source, crate::parser::ParseOptions::default().loop_guard_limit)
    }

    pub fn with_guard_limit(source: &'a str, guard_limit: usize) -> Self {
        Cursor {
            source,
            offset: 0,
            lines: LineIndex::new(source),
            comments: Vec::new(),
            scanned_to: 0,
            pending: Vec::new(),
            guard_offset: usize::MAX,
            guard_visits: 0,
            guard_limit,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.source.len()
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            offset: self.offset,
            pending: self.pending.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.offset = snapshot.offset;
        self.pending = snapshot.pending;
    }

    /// Match `pattern` here without moving.
    pub fn peek(&self, pattern: &Pattern) -> Option<Token> {
        let len = pattern.match_len(self.source, self.offset)?;
        let span = Span::new(self.offset, self.offset + len);
        Some(Token::new(span, &self.source[span.start..span.end]))
    }

    /// Match `pattern` and advance past it.
    pub fn accept(&mut self, pattern: &Pattern) -> Option<Token> {
        let token = self.peek(pattern)?;
        self.offset = token.span.end;
        self.pending.clear();
        Some(token)
    }

    pub fn expect(&mut self, pattern: &Pattern) -> Result<Token, ParseError> {
        self.expect_one_of(std::slice::from_ref(pattern), &[])
    }

    /// Accept the first matching alternative, or fail listing all of them.
    pub fn expect_one_of(
        &mut self,
        alternatives: &[Pattern],
        mistakes: &[Mistake],
    ) -> Result<Token, ParseError> {
        for pattern in alternatives {
            if let Some(token) = self.accept(pattern) {
                return Ok(token);
            }
        }
        Err(self.error(alternatives.iter().map(Pattern::describe).collect(), mistakes))
    }

    /// Build a syntax error at the current offset.
    pub fn error(&self, expected: Vec<String>, mistakes: &[Mistake]) -> ParseError {
        let (line, column) = self.lines.line_col(self.source, self.offset);
        let hint = mistakes
            .iter()
            .find(|m| m.pattern.match_len(self.source, self.offset).is_some())
            .map(|m| m.hint.to_string());
        SyntaxError {
            offset: self.offset,
            line,
            column,
            expected,
            found: self.describe_here(),
            hint,
            context: self.lines.context(self.source, self.offset, 2),
        }
        .into()
    }

    fn describe_here(&self) -> String {
        if self.is_eof() {
            return "end of input".to_string();
        }
        for pattern in [Pattern::IDENT, Pattern::FLOAT, Pattern::INT, Pattern::STRING] {
            if let Some(token) = self.peek(&pattern) {
                return format!("'{}'", token.text);
            }
        }
        let c = self.source[self.offset..].chars().next().unwrap_or(' ');
        format!("'{}'", c)
    }

    /// Abort with an internal error when the grammar keeps revisiting one offset.
    pub fn guard(&mut self) -> Result<(), ParseError> {
        if self.offset == self.guard_offset {
            self.guard_visits += 1;
            if self.guard_visits > self.guard_limit {
                let (line, column) = self.lines.line_col(self.source, self.offset);
                return Err(ParseError::LoopGuard {
                    offset: self.offset,
                    line,
                    column,
                    visits: self.guard_visits,
                });
            }
        } else {
            self.guard_offset = self.offset;
            self.guard_visits = 1;
        }
        Ok(())
    }

    /// Skip whitespace and comments, recording comments and blank lines.
    pub fn skip_trivia(&mut self) {
        let mut newlines = 0;
        loop {
            let rest = &self.source[self.offset..];
            match rest.chars().next() {
                Some('\n') => {
                    self.offset += 1;
                    newlines += 1;
                    if newlines == 2 {
                        self.pending.push(Trivia::BlankLine);
                    }
                }
                Some(c) if c.is_whitespace() => self.offset += c.len_utf8(),
                Some('/') if rest.starts_with("//") || rest.starts_with("/*") => {
                    let comment = self.read_comment();
                    self.pending.push(Trivia::Comment(comment));
                    newlines = 0;
                }
                _ => break,
            }
        }
    }

    fn read_comment(&mut self) -> Comment {
        let start = self.offset;
        let rest = &self.source[start..];
        let (kind, len) = if rest.starts_with("//") {
            (CommentKind::Line, rest.find('\n').unwrap_or(rest.len()))
        } else {
            // An unterminated block comment runs to end of input.
            (CommentKind::Block, rest.find("*/").map_or(rest.len(), |i| i + 2))
        };
        self.offset = start + len;
        let comment = Comment {
            kind,
            token: Token::new(Span::new(start, self.offset), &rest[..len]),
        };
        if start >= self.scanned_to {
            self.comments.push(comment.clone());
            self.scanned_to = self.offset;
        }
        comment
    }

    /// Split pending trivia at the first blank line into
    /// `(leading_detached, leading)`.
    pub fn take_leading(&mut self) -> (Vec<Comment>, Vec<Comment>) {
        let mut detached = Vec::new();
        let mut leading = Vec::new();
        let mut split = false;
        for trivia in self.pending.drain(..) {
            match trivia {
                Trivia::BlankLine if !split => {
                    split = true;
                    detached = std::mem::take(&mut leading);
                }
                Trivia::BlankLine => {}
                Trivia::Comment(c) => leading.push(c),
            }
        }
        (detached, leading)
    }

    /// Consume comments that follow on the same line as the previous token.
    pub fn take_trailing(&mut self) -> Vec<Comment> {
        let mut trailing = Vec::new();
        loop {
            let rest = &self.source[self.offset..];
            let spaces = rest.len() - rest.trim_start_matches([' ', '\t', '\r']).len();
            let after = &rest[spaces..];
            if !(after.starts_with("//") || after.starts_with("/*")) {
                break;
            }
            self.offset += spaces;
            let comment = self.read_comment();
            let is_line = comment.kind == CommentKind::Line;
            trailing.push(comment);
            if is_line {
                break;
            }
        }
        trailing
    }

    /// Consume one raw token of any kind. Used when resynchronizing.
    pub fn skip_token(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        for pattern in [Pattern::IDENT, Pattern::FLOAT, Pattern::INT, Pattern::STRING] {
            if let Some(token) = self.accept(&pattern) {
                return Some(token);
            }
        }
        let c = self.source[self.offset..].chars().next()?;
        let span = Span::new(self.offset, self.offset + c.len_utf8());
        self.offset = span.end;
        self.pending.clear();
        Some(Token::new(span, c.to_string()))
    }

    /// Every comment consumed so far, in source order.
    pub fn into_comments(self) -> Vec<Comment> {
        self.comments
    }
}
