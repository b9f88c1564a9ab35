//! Syntax tree for parsed `.proto` files.
//!
//! Every node carries the [`Span`] of the source it was parsed from.
//! Statement-level nodes also carry their attached [`Comments`] and the
//! token that terminated them (`;` or `}`). Nodes never point at their
//! parents; scope is reconstructed by whoever walks the tree.

pub use super::lexer::{Comment, CommentKind, Span, Token};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Comment groups attached to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Comments {
    /// Comments before the statement, separated from it by a blank line.
    pub leading_detached: Vec<Comment>,
    /// Comments directly above the statement.
    pub leading: Vec<Comment>,
    /// Comments on the same line after the statement's terminator.
    pub trailing: Vec<Comment>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.leading_detached.is_empty() && self.leading.is_empty() && self.trailing.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.leading_detached
            .iter()
            .chain(&self.leading)
            .chain(&self.trailing)
    }
}

/// Root of one file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Proto {
    /// Covers the whole source text.
    pub span: Span,
    pub statements: Vec<TopLevel>,
}

impl Proto {
    /// Dotted package name, or empty when the file has none.
    pub fn package(&self) -> String {
        self.statements
            .iter()
            .find_map(|s| match s {
                TopLevel::Package(p) => Some(p.name.text()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.statements.iter().filter_map(|s| match s {
            TopLevel::Import(i) => Some(i),
            _ => None,
        })
    }

    pub fn syntax(&self) -> Option<&Syntax> {
        self.statements.iter().find_map(|s| match s {
            TopLevel::Syntax(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TopLevel {
    Syntax(Syntax),
    Import(Import),
    Package(Package),
    Option(OptionDecl),
    Message(Message),
    Enum(Enum),
    Extend(Extend),
    Service(Service),
    Empty(Empty),
}

impl TopLevel {
    pub fn span(&self) -> Span {
        match self {
            TopLevel::Syntax(n) => n.span,
            TopLevel::Import(n) => n.span,
            TopLevel::Package(n) => n.span,
            TopLevel::Option(n) => n.span,
            TopLevel::Message(n) => n.span,
            TopLevel::Enum(n) => n.span,
            TopLevel::Extend(n) => n.span,
            TopLevel::Service(n) => n.span,
            TopLevel::Empty(n) => n.span,
        }
    }
}

/// `syntax = "proto3";` or `edition = "2023";`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Syntax {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub value: StrLit,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Import {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    /// `weak` or `public`.
    pub modifier: Option<Token>,
    pub path: StrLit,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Package {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: FullIdent,
    pub terminator: Token,
}

/// `option name = value;`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OptionDecl {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: OptionName,
    pub value: Constant,
    pub terminator: Token,
}

/// A stray `;`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Empty {
    pub span: Span,
    pub comments: Comments,
    pub terminator: Token,
}

/// A possibly dotted identifier, e.g. `foo.Bar` or `.pkg.Bar`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FullIdent {
    pub span: Span,
    /// Written with a leading dot.
    pub absolute: bool,
    pub parts: Vec<Token>,
}

impl FullIdent {
    /// The identifier as written, without interior whitespace.
    pub fn text(&self) -> String {
        let joined = self
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if self.absolute {
            format!(".{}", joined)
        } else {
            joined
        }
    }
}

/// Option name such as `deprecated` or `(my.ext).field`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OptionName {
    pub span: Span,
    pub parts: Vec<OptionNamePart>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum OptionNamePart {
    Simple(Token),
    /// Parenthesized extension name; the span includes the parentheses.
    Extension { span: Span, name: FullIdent },
}

impl OptionName {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                OptionNamePart::Simple(t) => t.text.clone(),
                OptionNamePart::Extension { name, .. } => format!("({})", name.text()),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// `[deprecated = true, (my.opt) = 1]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FieldOptions {
    pub span: Span,
    pub options: Vec<FieldOption>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FieldOption {
    pub span: Span,
    pub name: OptionName,
    pub value: Constant,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Constant {
    Ident(FullIdent),
    Int(IntLit),
    Float(FloatLit),
    Str(StrLit),
    Bool(BoolLit),
    Aggregate(Aggregate),
}

impl Constant {
    pub fn span(&self) -> Span {
        match self {
            Constant::Ident(n) => n.span,
            Constant::Int(n) => n.span,
            Constant::Float(n) => n.span,
            Constant::Str(n) => n.span,
            Constant::Bool(n) => n.token.span,
            Constant::Aggregate(n) => n.span,
        }
    }
}

/// An integer literal with an optional separate sign token.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct IntLit {
    pub span: Span,
    pub sign: Option<Token>,
    pub value: Token,
}

/// A float literal (including `inf` and `nan`) with an optional sign.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FloatLit {
    pub span: Span,
    pub sign: Option<Token>,
    pub value: Token,
}

/// One or more adjacent quoted string tokens forming a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StrLit {
    pub span: Span,
    pub parts: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BoolLit {
    pub token: Token,
}

/// A message literal used as an option value: `{ a: 1 b { c: "x" } }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Aggregate {
    pub span: Span,
    pub fields: Vec<AggregateField>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AggregateField {
    pub span: Span,
    pub name: AggregateName,
    pub value: AggregateValue,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum AggregateName {
    Field(Token),
    /// `[pkg.ext]` or `[type.googleapis.com/pkg.Msg]`; `name` is the text
    /// between the brackets.
    Extension { span: Span, name: Token },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum AggregateValue {
    Constant(Constant),
    List { span: Span, items: Vec<AggregateValue> },
}

impl AggregateValue {
    pub fn span(&self) -> Span {
        match self {
            AggregateValue::Constant(c) => c.span(),
            AggregateValue::List { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Message {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: Token,
    pub body: Vec<MessageItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum MessageItem {
    Field(Field),
    MapField(MapField),
    Group(Group),
    Oneof(Oneof),
    Message(Message),
    Enum(Enum),
    Extend(Extend),
    Option(OptionDecl),
    Extensions(Extensions),
    Reserved(Reserved),
    Empty(Empty),
    Malformed(MalformedField),
}

impl MessageItem {
    pub fn span(&self) -> Span {
        match self {
            MessageItem::Field(n) => n.span,
            MessageItem::MapField(n) => n.span,
            MessageItem::Group(n) => n.span,
            MessageItem::Oneof(n) => n.span,
            MessageItem::Message(n) => n.span,
            MessageItem::Enum(n) => n.span,
            MessageItem::Extend(n) => n.span,
            MessageItem::Option(n) => n.span,
            MessageItem::Extensions(n) => n.span,
            MessageItem::Reserved(n) => n.span,
            MessageItem::Empty(n) => n.span,
            MessageItem::Malformed(n) => n.span,
        }
    }
}

/// `repeated foo.Bar name = 1 [opts];`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Field {
    pub span: Span,
    pub comments: Comments,
    /// `optional`, `required` or `repeated`.
    pub label: Option<Token>,
    pub ty: FullIdent,
    pub name: Token,
    pub number: IntLit,
    pub options: Option<FieldOptions>,
    pub terminator: Token,
}

/// `map<string, Foo> name = 1;`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MapField {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub key_type: Token,
    pub value_type: FullIdent,
    pub name: Token,
    pub number: IntLit,
    pub options: Option<FieldOptions>,
    pub terminator: Token,
}

/// Legacy `optional group Name = 1 { ... }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Group {
    pub span: Span,
    pub comments: Comments,
    pub label: Option<Token>,
    pub keyword: Token,
    pub name: Token,
    pub number: IntLit,
    pub options: Option<FieldOptions>,
    pub body: Vec<MessageItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Oneof {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: Token,
    pub body: Vec<OneofItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum OneofItem {
    Field(Field),
    Group(Group),
    Option(OptionDecl),
    Empty(Empty),
    Malformed(MalformedField),
}

impl OneofItem {
    pub fn span(&self) -> Span {
        match self {
            OneofItem::Field(n) => n.span,
            OneofItem::Group(n) => n.span,
            OneofItem::Option(n) => n.span,
            OneofItem::Empty(n) => n.span,
            OneofItem::Malformed(n) => n.span,
        }
    }
}

/// Best-effort remains of a field statement that failed to parse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MalformedField {
    pub span: Span,
    pub comments: Comments,
    pub label: Option<Token>,
    pub ty: Option<FullIdent>,
    pub name: Option<Token>,
    pub equals: Option<Token>,
    pub number: Option<IntLit>,
    pub options: Option<FieldOptions>,
    pub terminator: Option<Token>,
    /// Tokens discarded while resynchronizing.
    pub skipped: Vec<Token>,
}

/// `extensions 100 to max;`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Extensions {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub ranges: Vec<Range>,
    pub options: Option<FieldOptions>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Reserved {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub body: ReservedBody,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ReservedBody {
    Ranges(Vec<Range>),
    Names(Vec<ReservedName>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ReservedName {
    Str(StrLit),
    /// Bare identifiers, as allowed by editions.
    Ident(Token),
}

/// `1`, `2 to 5`, `10 to max`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Range {
    pub span: Span,
    pub start: IntLit,
    pub end: Option<RangeEnd>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RangeEnd {
    Int(IntLit),
    Max(Token),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Enum {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: Token,
    pub body: Vec<EnumItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EnumItem {
    Value(EnumValue),
    Option(OptionDecl),
    Reserved(Reserved),
    Empty(Empty),
    /// An enum value that failed to parse, kept in the field shape.
    Malformed(MalformedField),
}

impl EnumItem {
    pub fn span(&self) -> Span {
        match self {
            EnumItem::Value(n) => n.span,
            EnumItem::Option(n) => n.span,
            EnumItem::Reserved(n) => n.span,
            EnumItem::Empty(n) => n.span,
            EnumItem::Malformed(n) => n.span,
        }
    }
}

/// `NAME = -1 [opts];`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EnumValue {
    pub span: Span,
    pub comments: Comments,
    pub name: Token,
    pub number: IntLit,
    pub options: Option<FieldOptions>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Extend {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub extendee: FullIdent,
    pub body: Vec<ExtendItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ExtendItem {
    Field(Field),
    Group(Group),
    Empty(Empty),
    Malformed(MalformedField),
}

impl ExtendItem {
    pub fn span(&self) -> Span {
        match self {
            ExtendItem::Field(n) => n.span,
            ExtendItem::Group(n) => n.span,
            ExtendItem::Empty(n) => n.span,
            ExtendItem::Malformed(n) => n.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Service {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: Token,
    pub body: Vec<ServiceItem>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ServiceItem {
    Rpc(Rpc),
    Option(OptionDecl),
    Empty(Empty),
}

impl ServiceItem {
    pub fn span(&self) -> Span {
        match self {
            ServiceItem::Rpc(n) => n.span,
            ServiceItem::Option(n) => n.span,
            ServiceItem::Empty(n) => n.span,
        }
    }
}

/// `rpc Name(stream Req) returns (Resp);` or with an option body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Rpc {
    pub span: Span,
    pub comments: Comments,
    pub keyword: Token,
    pub name: Token,
    pub request: RpcType,
    pub returns: Token,
    pub response: RpcType,
    /// `None` when terminated by `;`.
    pub body: Option<Vec<RpcItem>>,
    pub terminator: Token,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RpcType {
    /// Includes the parentheses.
    pub span: Span,
    pub stream: Option<Token>,
    pub ty: FullIdent,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RpcItem {
    Option(OptionDecl),
    Empty(Empty),
}
