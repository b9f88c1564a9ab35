use once_cell::sync::Lazy;
use regex::Regex;

use super::ast::*;
use super::lexer::{Cursor, Mistake, Pattern};
use super::{ParseOptions, ParseOutput};
use crate::error::ParseError;

type PResult<T> = Result<T, ParseError>;

/// A production that yields `Ok(None)` without consuming input when the
/// statement does not start here.
type Production<'a, T> = fn(&mut Parser<'a>) -> PResult<Option<T>>;

const SEMI: Pattern = Pattern::Literal(";");
const EQUALS: Pattern = Pattern::Literal("=");
const LBRACE: Pattern = Pattern::Literal("{");
const RBRACE: Pattern = Pattern::Literal("}");
const LPAREN: Pattern = Pattern::Literal("(");
const RPAREN: Pattern = Pattern::Literal(")");
const LBRACKET: Pattern = Pattern::Literal("[");
const RBRACKET: Pattern = Pattern::Literal("]");
const LANGLE: Pattern = Pattern::Literal("<");
const RANGLE: Pattern = Pattern::Literal(">");
const COMMA: Pattern = Pattern::Literal(",");
const DOT: Pattern = Pattern::Literal(".");
const COLON: Pattern = Pattern::Literal(":");
const MINUS: Pattern = Pattern::Literal("-");
const PLUS: Pattern = Pattern::Literal("+");

const SYNTAX: Pattern = Pattern::Literal("syntax");
const EDITION: Pattern = Pattern::Literal("edition");
const IMPORT: Pattern = Pattern::Literal("import");
const WEAK: Pattern = Pattern::Literal("weak");
const PUBLIC: Pattern = Pattern::Literal("public");
const PACKAGE: Pattern = Pattern::Literal("package");
const OPTION: Pattern = Pattern::Literal("option");
const MESSAGE: Pattern = Pattern::Literal("message");
const ENUM: Pattern = Pattern::Literal("enum");
const EXTEND: Pattern = Pattern::Literal("extend");
const SERVICE: Pattern = Pattern::Literal("service");
const RPC: Pattern = Pattern::Literal("rpc");
const RETURNS: Pattern = Pattern::Literal("returns");
const STREAM: Pattern = Pattern::Literal("stream");
const ONEOF: Pattern = Pattern::Literal("oneof");
const MAP: Pattern = Pattern::Literal("map");
const GROUP: Pattern = Pattern::Literal("group");
const RESERVED: Pattern = Pattern::Literal("reserved");
const EXTENSIONS: Pattern = Pattern::Literal("extensions");
const TO: Pattern = Pattern::Literal("to");
const MAX: Pattern = Pattern::Literal("max");
const TRUE: Pattern = Pattern::Literal("true");
const FALSE: Pattern = Pattern::Literal("false");
const INF: Pattern = Pattern::Literal("inf");
const NAN: Pattern = Pattern::Literal("nan");
const LABELS: [Pattern; 3] = [
    Pattern::Literal("optional"),
    Pattern::Literal("required"),
    Pattern::Literal("repeated"),
];

fn extension_name_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./]+").unwrap());
    &RE
}

const EXTENSION_NAME: Pattern = Pattern::Regex("extension name", extension_name_re);

const MISSING_SEMI: Mistake = Mistake {
    pattern: RBRACE,
    hint: "statements end with ';'",
};
const COLON_FOR_EQUALS: Mistake = Mistake {
    pattern: COLON,
    hint: "numbers are assigned with '='",
};

const TOP_LEVEL_EXPECTED: &[&str] = &[
    "'syntax'",
    "'edition'",
    "'import'",
    "'package'",
    "'option'",
    "'message'",
    "'enum'",
    "'extend'",
    "'service'",
    "';'",
];
const MESSAGE_BODY_EXPECTED: &[&str] = &[
    "field",
    "'message'",
    "'enum'",
    "'extend'",
    "'option'",
    "'oneof'",
    "'map'",
    "'reserved'",
    "'extensions'",
    "'group'",
    "';'",
    "'}'",
];
const ONEOF_BODY_EXPECTED: &[&str] = &["field", "'option'", "'group'", "';'", "'}'"];
const EXTEND_BODY_EXPECTED: &[&str] = &["field", "'group'", "';'", "'}'"];
const ENUM_BODY_EXPECTED: &[&str] = &["enum value", "'option'", "'reserved'", "';'", "'}'"];
const SERVICE_BODY_EXPECTED: &[&str] = &["'rpc'", "'option'", "';'", "'}'"];
const RPC_BODY_EXPECTED: &[&str] = &["'option'", "';'", "'}'"];

/// Parse a `.proto` source text.
///
/// Always returns a tree. A syntax error outside a field statement stops the
/// parse; the statements completed before it are kept.
pub fn parse_proto(source: &str, options: &ParseOptions) -> ParseOutput {
    let mut parser = Parser {
        cursor: Cursor::with_guard_limit(source, options.loop_guard_limit),
        errors: Vec::new(),
        depth: 0,
        max_depth: options.max_depth,
    };
    let mut statements = Vec::new();
    if let Err(err) = parser.top_level(&mut statements) {
        parser.errors.push(err);
    }
    let Parser { cursor, errors, .. } = parser;
    ParseOutput {
        proto: Proto {
            span: Span::new(0, source.len()),
            statements,
        },
        comments: cursor.into_comments(),
        errors,
    }
}

/// The part of a group statement up to and including its `{`.
struct GroupHead {
    comments: Comments,
    label: Option<Token>,
    keyword: Token,
    name: Token,
    number: IntLit,
    options: Option<FieldOptions>,
}

pub(crate) struct Parser<'a> {
    cursor: Cursor<'a>,
    /// Errors recovered from locally, plus the fatal one if any.
    errors: Vec<ParseError>,
    /// Open messages, groups and aggregates around the cursor.
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token helpers. Each skips trivia first.
    // ------------------------------------------------------------------

    fn ws(&mut self) {
        self.cursor.skip_trivia();
    }

    fn peek(&mut self, pattern: &Pattern) -> Option<Token> {
        self.ws();
        self.cursor.peek(pattern)
    }

    fn accept(&mut self, pattern: &Pattern) -> Option<Token> {
        self.ws();
        self.cursor.accept(pattern)
    }

    fn accept_any(&mut self, patterns: &[Pattern]) -> Option<Token> {
        self.ws();
        patterns.iter().find_map(|p| self.cursor.accept(p))
    }

    fn expect(&mut self, pattern: &Pattern) -> PResult<Token> {
        self.ws();
        self.cursor.expect(pattern)
    }

    fn expect_one_of(&mut self, patterns: &[Pattern], mistakes: &[Mistake]) -> PResult<Token> {
        self.ws();
        self.cursor.expect_one_of(patterns, mistakes)
    }

    fn expected(&mut self, what: &[&str]) -> ParseError {
        self.ws();
        self.cursor
            .error(what.iter().map(|s| s.to_string()).collect(), &[])
    }

    /// Run `f` and rewind, keeping only its answer.
    fn lookahead(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let snapshot = self.cursor.snapshot();
        let result = f(self);
        self.cursor.restore(snapshot);
        result
    }

    /// Run `f`; on a syntax error rewind and return `None`.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<Option<T>> {
        let snapshot = self.cursor.snapshot();
        match f(self) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_internal() => Err(e),
            Err(_) => {
                self.cursor.restore(snapshot);
                Ok(None)
            }
        }
    }

    /// Run `f` one nesting level deeper, failing instead once `max_depth`
    /// levels are open.
    fn nested<T>(&mut self, close: &Pattern, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= self.max_depth {
            self.ws();
            let mut err = self.cursor.error(vec![close.describe()], &[]);
            if let ParseError::Syntax(e) = &mut err {
                e.hint = Some(format!("nesting is limited to {} levels", self.max_depth));
            }
            return Err(err);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn leading(&mut self) -> Comments {
        self.ws();
        let (leading_detached, leading) = self.cursor.take_leading();
        Comments {
            leading_detached,
            leading,
            trailing: Vec::new(),
        }
    }

    fn trailing(&mut self, mut comments: Comments) -> Comments {
        comments.trailing = self.cursor.take_trailing();
        comments
    }

    // ------------------------------------------------------------------
    // Combinators
    // ------------------------------------------------------------------

    /// Zero or more `item`s until it yields `None`.
    fn many<T>(&mut self, mut item: impl FnMut(&mut Self) -> PResult<Option<T>>) -> PResult<Vec<T>> {
        let mut out = Vec::new();
        loop {
            self.cursor.guard()?;
            match item(self)? {
                Some(v) => out.push(v),
                None => return Ok(out),
            }
        }
    }

    /// The first alternative that starts here, in order.
    fn choice<T>(&mut self, alternatives: &[Production<'a, T>]) -> PResult<Option<T>> {
        for alternative in alternatives {
            if let Some(v) = alternative(self)? {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    /// `item (separator item)*`
    fn flip_flop<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> PResult<T>,
        separator: &Pattern,
    ) -> PResult<Vec<T>> {
        let mut out = vec![item(self)?];
        while self.accept(separator).is_some() {
            self.cursor.guard()?;
            out.push(item(self)?);
        }
        Ok(out)
    }

    /// Statements up to and including the closing `}`.
    fn body<T>(
        &mut self,
        alternatives: &[Production<'a, T>],
        expected: &[&str],
    ) -> PResult<(Vec<T>, Token)> {
        let items = self.many(|p| {
            if p.peek(&RBRACE).is_some() {
                return Ok(None);
            }
            match p.choice(alternatives)? {
                Some(item) => Ok(Some(item)),
                None => Err(p.expected(expected)),
            }
        })?;
        let close = self.expect(&RBRACE)?;
        Ok((items, close))
    }

    // ------------------------------------------------------------------
    // File level
    // ------------------------------------------------------------------

    fn top_level(&mut self, out: &mut Vec<TopLevel>) -> PResult<()> {
        let alternatives: [Production<'a, TopLevel>; 9] = [
            Self::top_syntax,
            Self::top_import,
            Self::top_package,
            Self::top_option,
            Self::top_message,
            Self::top_enum,
            Self::top_extend,
            Self::top_service,
            Self::top_empty,
        ];
        loop {
            self.ws();
            if self.cursor.is_eof() {
                return Ok(());
            }
            self.cursor.guard()?;
            match self.choice(&alternatives)? {
                Some(statement) => out.push(statement),
                None => return Err(self.expected(TOP_LEVEL_EXPECTED)),
            }
        }
    }

    fn top_syntax(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.syntax()?.map(TopLevel::Syntax))
    }

    fn top_import(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.import()?.map(TopLevel::Import))
    }

    fn top_package(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.package()?.map(TopLevel::Package))
    }

    fn top_option(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.option_decl()?.map(TopLevel::Option))
    }

    fn top_message(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.message()?.map(TopLevel::Message))
    }

    fn top_enum(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.enum_decl()?.map(TopLevel::Enum))
    }

    fn top_extend(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.extend()?.map(TopLevel::Extend))
    }

    fn top_service(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.service()?.map(TopLevel::Service))
    }

    fn top_empty(&mut self) -> PResult<Option<TopLevel>> {
        Ok(self.empty()?.map(TopLevel::Empty))
    }

    fn syntax(&mut self) -> PResult<Option<Syntax>> {
        if self.peek(&SYNTAX).is_none() && self.peek(&EDITION).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect_one_of(&[SYNTAX, EDITION], &[])?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let value = self.str_lit_required()?;
        let terminator = self.expect(&SEMI)?;
        Ok(Some(Syntax {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            value,
            terminator,
        }))
    }

    fn import(&mut self) -> PResult<Option<Import>> {
        if self.peek(&IMPORT).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&IMPORT)?;
        let modifier = self.accept_any(&[WEAK, PUBLIC]);
        let path = self.str_lit_required()?;
        let terminator = self.expect(&SEMI)?;
        Ok(Some(Import {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            modifier,
            path,
            terminator,
        }))
    }

    fn package(&mut self) -> PResult<Option<Package>> {
        if self.peek(&PACKAGE).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&PACKAGE)?;
        let name = self.full_ident()?;
        let terminator = self.expect(&SEMI)?;
        Ok(Some(Package {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            terminator,
        }))
    }

    fn option_decl(&mut self) -> PResult<Option<OptionDecl>> {
        let starts = self.lookahead(|p| {
            p.accept(&OPTION).is_some()
                && (p.peek(&Pattern::IDENT).is_some() || p.peek(&LPAREN).is_some())
        });
        if !starts {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&OPTION)?;
        let name = self.option_name()?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let value = self.constant()?;
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        Ok(Some(OptionDecl {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            value,
            terminator,
        }))
    }

    fn empty(&mut self) -> PResult<Option<Empty>> {
        if self.peek(&SEMI).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        let terminator = self.expect(&SEMI)?;
        Ok(Some(Empty {
            span: terminator.span,
            comments: self.trailing(comments),
            terminator,
        }))
    }

    // ------------------------------------------------------------------
    // Names and constants
    // ------------------------------------------------------------------

    fn full_ident(&mut self) -> PResult<FullIdent> {
        self.ws();
        let leading_dot = self.accept(&DOT);
        let parts = self.flip_flop(|p| p.expect(&Pattern::IDENT), &DOT)?;
        let first = leading_dot
            .as_ref()
            .map_or(parts[0].span, |dot| dot.span);
        let last = parts[parts.len() - 1].span;
        Ok(FullIdent {
            span: first.join(last),
            absolute: leading_dot.is_some(),
            parts,
        })
    }

    fn option_name(&mut self) -> PResult<OptionName> {
        let parts = self.flip_flop(Self::option_name_part, &DOT)?;
        let first = option_name_part_span(&parts[0]);
        let span = first.join(option_name_part_span(&parts[parts.len() - 1]));
        Ok(OptionName { span, parts })
    }

    fn option_name_part(&mut self) -> PResult<OptionNamePart> {
        if let Some(open) = self.accept(&LPAREN) {
            let name = self.full_ident()?;
            let close = self.expect(&RPAREN)?;
            return Ok(OptionNamePart::Extension {
                span: open.span.join(close.span),
                name,
            });
        }
        let token = self.expect_one_of(&[Pattern::IDENT, LPAREN], &[])?;
        Ok(OptionNamePart::Simple(token))
    }

    /// `[name = value, ...]`, if present.
    fn field_options(&mut self) -> PResult<Option<FieldOptions>> {
        let open = match self.accept(&LBRACKET) {
            Some(open) => open,
            None => return Ok(None),
        };
        let options = self.flip_flop(Self::field_option, &COMMA)?;
        let close = self.expect(&RBRACKET)?;
        Ok(Some(FieldOptions {
            span: open.span.join(close.span),
            options,
        }))
    }

    fn field_option(&mut self) -> PResult<FieldOption> {
        let name = self.option_name()?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let value = self.constant()?;
        Ok(FieldOption {
            span: name.span.join(value.span()),
            name,
            value,
        })
    }

    fn str_lit(&mut self) -> PResult<Option<StrLit>> {
        let parts = self.many(|p| Ok(p.accept(&Pattern::STRING)))?;
        if parts.is_empty() {
            return Ok(None);
        }
        let span = parts[0].span.join(parts[parts.len() - 1].span);
        Ok(Some(StrLit { span, parts }))
    }

    fn str_lit_required(&mut self) -> PResult<StrLit> {
        match self.str_lit()? {
            Some(lit) => Ok(lit),
            None => Err(self.expected(&["string"])),
        }
    }

    /// `-? INT`
    fn int_lit(&mut self) -> PResult<IntLit> {
        self.ws();
        let sign = self.accept_any(&[MINUS, PLUS]);
        let value = self.expect(&Pattern::INT)?;
        let span = sign.as_ref().map_or(value.span, |s| s.span.join(value.span));
        Ok(IntLit { span, sign, value })
    }

    fn constant(&mut self) -> PResult<Constant> {
        if let Some(lit) = self.str_lit()? {
            return Ok(Constant::Str(lit));
        }
        if self.peek(&LBRACE).is_some() || self.peek(&LANGLE).is_some() {
            return Ok(Constant::Aggregate(self.aggregate()?));
        }
        let sign = self.accept_any(&[MINUS, PLUS]);
        if let Some(value) = self.accept_any(&[Pattern::FLOAT, INF, NAN]) {
            let span = sign.as_ref().map_or(value.span, |s| s.span.join(value.span));
            return Ok(Constant::Float(FloatLit { span, sign, value }));
        }
        if let Some(value) = self.accept(&Pattern::INT) {
            let span = sign.as_ref().map_or(value.span, |s| s.span.join(value.span));
            return Ok(Constant::Int(IntLit { span, sign, value }));
        }
        if sign.is_some() {
            return Err(self.expected(&["integer", "float", "'inf'", "'nan'"]));
        }
        if let Some(token) = self.accept_any(&[TRUE, FALSE]) {
            return Ok(Constant::Bool(BoolLit { token }));
        }
        if self.peek(&Pattern::IDENT).is_some() || self.peek(&DOT).is_some() {
            return Ok(Constant::Ident(self.full_ident()?));
        }
        Err(self.expected(&[
            "string", "integer", "float", "'true'", "'false'", "identifier", "'{'",
        ]))
    }

    /// Text-format message literal between `{}` or `<>`.
    fn aggregate(&mut self) -> PResult<Aggregate> {
        self.nested(&RBRACE, |p| {
            let open = p.expect_one_of(&[LBRACE, LANGLE], &[])?;
            let close_pattern = if open.is("{") { RBRACE } else { RANGLE };
            let fields = p.many(|p| {
                if p.peek(&close_pattern).is_some() {
                    return Ok(None);
                }
                let field = p.aggregate_field()?;
                p.accept_any(&[COMMA, SEMI]);
                Ok(Some(field))
            })?;
            let close = p.expect(&close_pattern)?;
            Ok(Aggregate {
                span: open.span.join(close.span),
                fields,
            })
        })
    }

    fn aggregate_field(&mut self) -> PResult<AggregateField> {
        let name = if let Some(open) = self.accept(&LBRACKET) {
            let name = self.expect(&EXTENSION_NAME)?;
            let close = self.expect(&RBRACKET)?;
            AggregateName::Extension {
                span: open.span.join(close.span),
                name,
            }
        } else {
            AggregateName::Field(self.expect_one_of(&[Pattern::IDENT, LBRACKET], &[])?)
        };
        // The colon is optional before a nested message.
        let has_colon = self.accept(&COLON).is_some();
        if !has_colon && self.peek(&LBRACE).is_none() && self.peek(&LANGLE).is_none() {
            return Err(self.expected(&["':'", "'{'", "'<'"]));
        }
        let value = self.aggregate_value()?;
        let start = match &name {
            AggregateName::Field(t) => t.span,
            AggregateName::Extension { span, .. } => *span,
        };
        Ok(AggregateField {
            span: start.join(value.span()),
            name,
            value,
        })
    }

    fn aggregate_value(&mut self) -> PResult<AggregateValue> {
        let open = match self.accept(&LBRACKET) {
            Some(open) => open,
            None => return Ok(AggregateValue::Constant(self.constant()?)),
        };
        let items = if self.peek(&RBRACKET).is_some() {
            Vec::new()
        } else {
            self.nested(&RBRACKET, |p| p.flip_flop(Self::aggregate_value, &COMMA))?
        };
        let close = self.expect(&RBRACKET)?;
        Ok(AggregateValue::List {
            span: open.span.join(close.span),
            items,
        })
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    fn message(&mut self) -> PResult<Option<Message>> {
        if !self.lookahead(|p| p.accept(&MESSAGE).is_some() && p.accept(&Pattern::IDENT).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&MESSAGE)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect(&LBRACE)?;
        let (body, terminator) = self.nested(&RBRACE, Self::message_body)?;
        Ok(Some(Message {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            body,
            terminator,
        }))
    }

    fn message_body(&mut self) -> PResult<(Vec<MessageItem>, Token)> {
        let alternatives: [Production<'a, MessageItem>; 11] = [
            Self::msg_empty,
            Self::msg_option,
            Self::msg_message,
            Self::msg_enum,
            Self::msg_extend,
            Self::msg_oneof,
            Self::msg_map_field,
            Self::msg_reserved,
            Self::msg_extensions,
            Self::msg_group,
            Self::msg_field,
        ];
        self.body(&alternatives, MESSAGE_BODY_EXPECTED)
    }

    fn msg_empty(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.empty()?.map(MessageItem::Empty))
    }

    fn msg_option(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.option_decl()?.map(MessageItem::Option))
    }

    fn msg_message(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.message()?.map(MessageItem::Message))
    }

    fn msg_enum(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.enum_decl()?.map(MessageItem::Enum))
    }

    fn msg_extend(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.extend()?.map(MessageItem::Extend))
    }

    fn msg_oneof(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.oneof()?.map(MessageItem::Oneof))
    }

    fn msg_reserved(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.reserved()?.map(MessageItem::Reserved))
    }

    fn msg_extensions(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.extensions()?.map(MessageItem::Extensions))
    }

    fn msg_group(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.group()?.map(|r| match r {
            Ok(group) => MessageItem::Group(group),
            Err(malformed) => MessageItem::Malformed(malformed),
        }))
    }

    fn msg_map_field(&mut self) -> PResult<Option<MessageItem>> {
        if !self.lookahead(|p| p.accept(&MAP).is_some() && p.accept(&LANGLE).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        Ok(Some(match self.recovering(comments, Self::map_field)? {
            Ok(field) => MessageItem::MapField(field),
            Err(malformed) => MessageItem::Malformed(malformed),
        }))
    }

    fn msg_field(&mut self) -> PResult<Option<MessageItem>> {
        Ok(self.field_or_malformed()?.map(|r| match r {
            Ok(field) => MessageItem::Field(field),
            Err(malformed) => MessageItem::Malformed(malformed),
        }))
    }

    /// Any statement not claimed by a keyword production is parsed as a
    /// field, falling back to a `MalformedField`.
    fn field_or_malformed(&mut self) -> PResult<Option<Result<Field, MalformedField>>> {
        self.ws();
        if self.cursor.is_eof() || self.peek(&RBRACE).is_some() {
            return Ok(None);
        }
        let comments = self.leading();
        Ok(Some(self.recovering(comments, Self::field)?))
    }

    fn field(&mut self, comments: Comments) -> PResult<Field> {
        self.ws();
        let label = self.accept_any(&LABELS);
        let ty = self.full_ident()?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let number = self.int_lit()?;
        let options = self.field_options()?;
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        let start = label.as_ref().map_or(ty.span, |l| l.span);
        Ok(Field {
            span: start.join(terminator.span),
            comments: self.trailing(comments),
            label,
            ty,
            name,
            number,
            options,
            terminator,
        })
    }

    fn map_field(&mut self, comments: Comments) -> PResult<MapField> {
        let keyword = self.expect(&MAP)?;
        self.expect(&LANGLE)?;
        let key_type = self.expect(&Pattern::IDENT)?;
        self.expect(&COMMA)?;
        let value_type = self.full_ident()?;
        self.expect(&RANGLE)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let number = self.int_lit()?;
        let options = self.field_options()?;
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        Ok(MapField {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            key_type,
            value_type,
            name,
            number,
            options,
            terminator,
        })
    }

    /// A group whose header fails to parse becomes a `MalformedField`, like
    /// any other field. Errors inside its body are not recovered.
    fn group(&mut self) -> PResult<Option<Result<Group, MalformedField>>> {
        let starts = self.lookahead(|p| {
            p.accept_any(&LABELS);
            p.accept(&GROUP).is_some() && p.accept(&Pattern::IDENT).is_some()
        });
        if !starts {
            return Ok(None);
        }
        let comments = self.leading();
        let head = match self.recovering(comments, Self::group_head)? {
            Ok(head) => head,
            Err(malformed) => return Ok(Some(Err(malformed))),
        };
        let (body, terminator) = self.nested(&RBRACE, Self::message_body)?;
        let start = head.label.as_ref().map_or(head.keyword.span, |l| l.span);
        Ok(Some(Ok(Group {
            span: start.join(terminator.span),
            comments: self.trailing(head.comments),
            label: head.label,
            keyword: head.keyword,
            name: head.name,
            number: head.number,
            options: head.options,
            body,
            terminator,
        })))
    }

    fn group_head(&mut self, comments: Comments) -> PResult<GroupHead> {
        let label = self.accept_any(&LABELS);
        let keyword = self.expect(&GROUP)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let number = self.int_lit()?;
        let options = self.field_options()?;
        self.expect(&LBRACE)?;
        Ok(GroupHead {
            comments,
            label,
            keyword,
            name,
            number,
            options,
        })
    }

    fn oneof(&mut self) -> PResult<Option<Oneof>> {
        if !self.lookahead(|p| p.accept(&ONEOF).is_some() && p.accept(&Pattern::IDENT).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&ONEOF)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect(&LBRACE)?;
        let alternatives: [Production<'a, OneofItem>; 4] = [
            Self::oneof_empty,
            Self::oneof_option,
            Self::oneof_group,
            Self::oneof_field,
        ];
        let (body, terminator) = self.body(&alternatives, ONEOF_BODY_EXPECTED)?;
        Ok(Some(Oneof {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            body,
            terminator,
        }))
    }

    fn oneof_empty(&mut self) -> PResult<Option<OneofItem>> {
        Ok(self.empty()?.map(OneofItem::Empty))
    }

    fn oneof_option(&mut self) -> PResult<Option<OneofItem>> {
        Ok(self.option_decl()?.map(OneofItem::Option))
    }

    fn oneof_group(&mut self) -> PResult<Option<OneofItem>> {
        Ok(self.group()?.map(|r| match r {
            Ok(group) => OneofItem::Group(group),
            Err(malformed) => OneofItem::Malformed(malformed),
        }))
    }

    fn oneof_field(&mut self) -> PResult<Option<OneofItem>> {
        Ok(self.field_or_malformed()?.map(|r| match r {
            Ok(field) => OneofItem::Field(field),
            Err(malformed) => OneofItem::Malformed(malformed),
        }))
    }

    fn extend(&mut self) -> PResult<Option<Extend>> {
        let starts = self.lookahead(|p| {
            p.accept(&EXTEND).is_some()
                && (p.peek(&Pattern::IDENT).is_some() || p.peek(&DOT).is_some())
        });
        if !starts {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&EXTEND)?;
        let extendee = self.full_ident()?;
        self.expect(&LBRACE)?;
        let alternatives: [Production<'a, ExtendItem>; 3] = [
            Self::extend_empty,
            Self::extend_group,
            Self::extend_field,
        ];
        let (body, terminator) = self.body(&alternatives, EXTEND_BODY_EXPECTED)?;
        Ok(Some(Extend {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            extendee,
            body,
            terminator,
        }))
    }

    fn extend_empty(&mut self) -> PResult<Option<ExtendItem>> {
        Ok(self.empty()?.map(ExtendItem::Empty))
    }

    fn extend_group(&mut self) -> PResult<Option<ExtendItem>> {
        Ok(self.group()?.map(|r| match r {
            Ok(group) => ExtendItem::Group(group),
            Err(malformed) => ExtendItem::Malformed(malformed),
        }))
    }

    fn extend_field(&mut self) -> PResult<Option<ExtendItem>> {
        Ok(self.field_or_malformed()?.map(|r| match r {
            Ok(field) => ExtendItem::Field(field),
            Err(malformed) => ExtendItem::Malformed(malformed),
        }))
    }

    fn range(&mut self) -> PResult<Range> {
        let start = self.int_lit()?;
        if self.accept(&TO).is_none() {
            return Ok(Range {
                span: start.span,
                start,
                end: None,
            });
        }
        let end = match self.accept(&MAX) {
            Some(max) => RangeEnd::Max(max),
            None => RangeEnd::Int(self.int_lit()?),
        };
        let end_span = match &end {
            RangeEnd::Max(t) => t.span,
            RangeEnd::Int(i) => i.span,
        };
        Ok(Range {
            span: start.span.join(end_span),
            start,
            end: Some(end),
        })
    }

    fn reserved(&mut self) -> PResult<Option<Reserved>> {
        let starts = self.lookahead(|p| {
            if p.accept(&RESERVED).is_none() {
                return false;
            }
            if p.peek(&Pattern::INT).is_some()
                || p.peek(&Pattern::STRING).is_some()
                || p.peek(&MINUS).is_some()
            {
                return true;
            }
            p.accept(&Pattern::IDENT).is_some()
                && (p.peek(&COMMA).is_some() || p.peek(&SEMI).is_some())
        });
        if !starts {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&RESERVED)?;
        let body = if self.peek(&Pattern::STRING).is_some() || self.peek(&Pattern::IDENT).is_some() {
            ReservedBody::Names(self.flip_flop(Self::reserved_name, &COMMA)?)
        } else {
            ReservedBody::Ranges(self.flip_flop(Self::range, &COMMA)?)
        };
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        Ok(Some(Reserved {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            body,
            terminator,
        }))
    }

    fn reserved_name(&mut self) -> PResult<ReservedName> {
        if let Some(lit) = self.str_lit()? {
            return Ok(ReservedName::Str(lit));
        }
        Ok(ReservedName::Ident(self.expect_one_of(&[Pattern::STRING, Pattern::IDENT], &[])?))
    }

    fn extensions(&mut self) -> PResult<Option<Extensions>> {
        if !self.lookahead(|p| p.accept(&EXTENSIONS).is_some() && p.peek(&Pattern::INT).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&EXTENSIONS)?;
        let ranges = self.flip_flop(Self::range, &COMMA)?;
        let options = self.field_options()?;
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        Ok(Some(Extensions {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            ranges,
            options,
            terminator,
        }))
    }

    // ------------------------------------------------------------------
    // Field recovery
    // ------------------------------------------------------------------

    /// Run a field-like production; on a syntax error rewind and rebuild the
    /// statement as a `MalformedField` instead of failing the enclosing body.
    fn recovering<T>(
        &mut self,
        comments: Comments,
        strict: fn(&mut Self, Comments) -> PResult<T>,
    ) -> PResult<Result<T, MalformedField>> {
        let start = self.cursor.snapshot();
        match strict(self, comments.clone()) {
            Ok(node) => Ok(Ok(node)),
            Err(err) if err.is_internal() => Err(err),
            Err(err) => {
                tracing::debug!(offset = err.offset(), "recovering malformed field");
                self.errors.push(err);
                self.cursor.restore(start);
                Ok(Err(self.malformed_field(comments)?))
            }
        }
    }

    /// Greedily take whatever prefix of a field parses, then skip to the
    /// next statement.
    fn malformed_field(&mut self, comments: Comments) -> PResult<MalformedField> {
        self.ws();
        let start = self.cursor.offset();
        let mut end = start;

        let label = self.accept_any(&LABELS);
        if label.is_some() {
            end = self.cursor.offset();
        }
        let ty = if label.is_some() && self.at_statement_start() {
            None
        } else {
            self.attempt(Self::full_ident)?
        };
        if ty.is_some() {
            end = self.cursor.offset();
        }
        let name = if ty.is_some() && !self.at_statement_start() {
            self.accept(&Pattern::IDENT)
        } else {
            None
        };
        if name.is_some() {
            end = self.cursor.offset();
        }
        let equals = self.accept(&EQUALS);
        if equals.is_some() {
            end = self.cursor.offset();
        }
        let number = if equals.is_some() {
            self.attempt(Self::int_lit)?
        } else {
            None
        };
        if number.is_some() {
            end = self.cursor.offset();
        }
        let options = self.attempt(Self::field_options)?.flatten();
        if options.is_some() {
            end = self.cursor.offset();
        }
        let mut terminator = self.accept(&SEMI);

        let mut skipped = Vec::new();
        if terminator.is_none() {
            loop {
                self.cursor.guard()?;
                self.ws();
                if self.cursor.is_eof() || self.peek(&RBRACE).is_some() {
                    break;
                }
                if end > start && self.at_statement_start() {
                    break;
                }
                if let Some(semi) = self.accept(&SEMI) {
                    terminator = Some(semi);
                    break;
                }
                self.skip_balanced(&mut skipped);
                if let Some(last) = skipped.last() {
                    end = last.span.end;
                }
            }
        }
        if let Some(semi) = &terminator {
            end = semi.span.end;
        }
        let comments = if terminator.is_some() {
            self.trailing(comments)
        } else {
            comments
        };
        Ok(MalformedField {
            span: Span::new(start, end),
            comments,
            label,
            ty,
            name,
            equals,
            number,
            options,
            terminator,
            skipped,
        })
    }

    /// Skip one token, or a `{ ... }` block. Inside the block, stops in front
    /// of anything that starts a statement so nested declarations are still
    /// parsed. A block still open at end of input skips only its `{`.
    fn skip_balanced(&mut self, skipped: &mut Vec<Token>) {
        let mut depth = 0usize;
        let mut after_open = None;
        loop {
            self.ws();
            if depth > 0 && self.at_statement_start() {
                return;
            }
            let token = match self.cursor.skip_token() {
                Some(token) => token,
                None => {
                    if let Some((snapshot, kept)) = after_open {
                        self.cursor.restore(snapshot);
                        skipped.truncate(kept);
                    }
                    return;
                }
            };
            if token.is("{") {
                depth += 1;
            } else if token.is("}") {
                depth = depth.saturating_sub(1);
            }
            skipped.push(token);
            if depth == 0 {
                return;
            }
            if after_open.is_none() {
                after_open = Some((self.cursor.snapshot(), skipped.len()));
            }
        }
    }

    /// Whether a new statement plausibly begins here: a statement keyword in
    /// its expected context, or `label? type name =`.
    fn at_statement_start(&mut self) -> bool {
        self.lookahead(Self::keyword_statement) || self.lookahead(Self::plausible_field)
    }

    fn keyword_statement(&mut self) -> bool {
        let ident = Pattern::IDENT;
        for kw in [MESSAGE, ENUM, ONEOF, SERVICE, RPC, GROUP] {
            if self.accept(&kw).is_some() {
                return self.accept(&ident).is_some();
            }
        }
        if self.accept(&EXTEND).is_some() {
            return self.peek(&ident).is_some() || self.peek(&DOT).is_some();
        }
        if self.accept(&OPTION).is_some() {
            return self.peek(&ident).is_some() || self.peek(&LPAREN).is_some();
        }
        if self.accept(&MAP).is_some() {
            return self.peek(&LANGLE).is_some();
        }
        if self.accept(&RESERVED).is_some() {
            return self.peek(&Pattern::INT).is_some() || self.peek(&Pattern::STRING).is_some();
        }
        if self.accept(&EXTENSIONS).is_some() {
            return self.peek(&Pattern::INT).is_some();
        }
        if self.accept_any(&[SYNTAX, EDITION]).is_some() {
            return self.peek(&EQUALS).is_some();
        }
        if self.accept(&IMPORT).is_some() {
            return [Pattern::STRING, WEAK, PUBLIC]
                .iter()
                .any(|p| self.peek(p).is_some());
        }
        if self.accept(&PACKAGE).is_some() {
            return self.peek(&ident).is_some();
        }
        false
    }

    fn plausible_field(&mut self) -> bool {
        self.accept_any(&LABELS);
        self.accept(&DOT);
        if self.accept(&Pattern::IDENT).is_none() {
            return false;
        }
        while self.accept(&DOT).is_some() {
            if self.accept(&Pattern::IDENT).is_none() {
                return false;
            }
        }
        self.accept(&Pattern::IDENT).is_some() && self.peek(&EQUALS).is_some()
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    fn enum_decl(&mut self) -> PResult<Option<Enum>> {
        if !self.lookahead(|p| p.accept(&ENUM).is_some() && p.accept(&Pattern::IDENT).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&ENUM)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect(&LBRACE)?;
        let alternatives: [Production<'a, EnumItem>; 4] = [
            Self::enum_empty,
            Self::enum_option,
            Self::enum_reserved,
            Self::enum_value_item,
        ];
        let (body, terminator) = self.body(&alternatives, ENUM_BODY_EXPECTED)?;
        Ok(Some(Enum {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            body,
            terminator,
        }))
    }

    fn enum_empty(&mut self) -> PResult<Option<EnumItem>> {
        Ok(self.empty()?.map(EnumItem::Empty))
    }

    fn enum_option(&mut self) -> PResult<Option<EnumItem>> {
        Ok(self.option_decl()?.map(EnumItem::Option))
    }

    fn enum_reserved(&mut self) -> PResult<Option<EnumItem>> {
        Ok(self.reserved()?.map(EnumItem::Reserved))
    }

    fn enum_value_item(&mut self) -> PResult<Option<EnumItem>> {
        if self.peek(&Pattern::IDENT).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        Ok(Some(match self.recovering(comments, Self::enum_value)? {
            Ok(value) => EnumItem::Value(value),
            Err(malformed) => EnumItem::Malformed(malformed),
        }))
    }

    fn enum_value(&mut self, comments: Comments) -> PResult<EnumValue> {
        let name = self.expect(&Pattern::IDENT)?;
        self.expect_one_of(&[EQUALS], &[COLON_FOR_EQUALS])?;
        let number = self.int_lit()?;
        let options = self.field_options()?;
        let terminator = self.expect_one_of(&[SEMI], &[MISSING_SEMI])?;
        Ok(EnumValue {
            span: name.span.join(terminator.span),
            comments: self.trailing(comments),
            name,
            number,
            options,
            terminator,
        })
    }

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    fn service(&mut self) -> PResult<Option<Service>> {
        if !self.lookahead(|p| p.accept(&SERVICE).is_some() && p.accept(&Pattern::IDENT).is_some()) {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&SERVICE)?;
        let name = self.expect(&Pattern::IDENT)?;
        self.expect(&LBRACE)?;
        let alternatives: [Production<'a, ServiceItem>; 3] = [
            Self::service_empty,
            Self::service_option,
            Self::service_rpc,
        ];
        let (body, terminator) = self.body(&alternatives, SERVICE_BODY_EXPECTED)?;
        Ok(Some(Service {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            body,
            terminator,
        }))
    }

    fn service_empty(&mut self) -> PResult<Option<ServiceItem>> {
        Ok(self.empty()?.map(ServiceItem::Empty))
    }

    fn service_option(&mut self) -> PResult<Option<ServiceItem>> {
        Ok(self.option_decl()?.map(ServiceItem::Option))
    }

    fn service_rpc(&mut self) -> PResult<Option<ServiceItem>> {
        if self.peek(&RPC).is_none() {
            return Ok(None);
        }
        let comments = self.leading();
        let keyword = self.expect(&RPC)?;
        let name = self.expect(&Pattern::IDENT)?;
        let request = self.rpc_type()?;
        let returns = self.expect(&RETURNS)?;
        let response = self.rpc_type()?;
        let (body, terminator) = if self.accept(&LBRACE).is_some() {
            let alternatives: [Production<'a, RpcItem>; 2] = [Self::rpc_empty, Self::rpc_option];
            let (items, close) = self.body(&alternatives, RPC_BODY_EXPECTED)?;
            (Some(items), close)
        } else {
            (None, self.expect_one_of(&[SEMI, LBRACE], &[MISSING_SEMI])?)
        };
        Ok(Some(ServiceItem::Rpc(Rpc {
            span: keyword.span.join(terminator.span),
            comments: self.trailing(comments),
            keyword,
            name,
            request,
            returns,
            response,
            body,
            terminator,
        })))
    }

    fn rpc_type(&mut self) -> PResult<RpcType> {
        let open = self.expect(&LPAREN)?;
        let stream = self.attempt(|p| {
            let stream = p.expect(&STREAM)?;
            if p.peek(&Pattern::IDENT).is_none() && p.peek(&DOT).is_none() {
                return Err(p.expected(&["identifier"]));
            }
            Ok(stream)
        })?;
        let ty = self.full_ident()?;
        let close = self.expect(&RPAREN)?;
        Ok(RpcType {
            span: open.span.join(close.span),
            stream,
            ty,
        })
    }

    fn rpc_empty(&mut self) -> PResult<Option<RpcItem>> {
        Ok(self.empty()?.map(RpcItem::Empty))
    }

    fn rpc_option(&mut self) -> PResult<Option<RpcItem>> {
        Ok(self.option_decl()?.map(RpcItem::Option))
    }
}

fn option_name_part_span(part: &OptionNamePart) -> Span {
    match part {
        OptionNamePart::Simple(t) => t.span,
        OptionNamePart::Extension { span, .. } => *span,
    }
}
