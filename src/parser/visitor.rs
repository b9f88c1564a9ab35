//! Structural walk over the syntax tree.
//!
//! Every `visit_*` method defaults to the matching `walk_*` function, which
//! visits the node's children in declaration order. Implementors override the
//! methods they care about and call the `walk_*` function to keep descending.
//! Leaf tokens arrive at [`Visitor::visit_token`] tagged with a [`TokenRole`].

use super::ast::*;

/// Syntactic role of a leaf token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TokenRole {
    Keyword,
    /// The name a statement declares: message, field, enum value, rpc...
    Declaration,
    /// A type reference, scalar or named.
    Type,
    /// Package name parts.
    Namespace,
    /// Option names, including extension option names.
    OptionName,
    /// Identifiers used as values, and aggregate field names.
    Identifier,
    Number,
    String,
    Comment,
    /// `;` and `}` terminators.
    Punctuation,
}

pub trait Visitor<'ast> {
    fn visit_proto(&mut self, node: &'ast Proto) {
        walk_proto(self, node)
    }

    fn visit_top_level(&mut self, node: &'ast TopLevel) {
        walk_top_level(self, node)
    }

    fn visit_syntax(&mut self, node: &'ast Syntax) {
        walk_syntax(self, node)
    }

    fn visit_import(&mut self, node: &'ast Import) {
        walk_import(self, node)
    }

    fn visit_package(&mut self, node: &'ast Package) {
        walk_package(self, node)
    }

    fn visit_option(&mut self, node: &'ast OptionDecl) {
        walk_option(self, node)
    }

    fn visit_empty(&mut self, node: &'ast Empty) {
        walk_empty(self, node)
    }

    fn visit_message(&mut self, node: &'ast Message) {
        walk_message(self, node)
    }

    fn visit_message_item(&mut self, node: &'ast MessageItem) {
        walk_message_item(self, node)
    }

    fn visit_field(&mut self, node: &'ast Field) {
        walk_field(self, node)
    }

    fn visit_map_field(&mut self, node: &'ast MapField) {
        walk_map_field(self, node)
    }

    fn visit_group(&mut self, node: &'ast Group) {
        walk_group(self, node)
    }

    fn visit_oneof(&mut self, node: &'ast Oneof) {
        walk_oneof(self, node)
    }

    fn visit_malformed_field(&mut self, node: &'ast MalformedField) {
        walk_malformed_field(self, node)
    }

    fn visit_extensions(&mut self, node: &'ast Extensions) {
        walk_extensions(self, node)
    }

    fn visit_reserved(&mut self, node: &'ast Reserved) {
        walk_reserved(self, node)
    }

    fn visit_range(&mut self, node: &'ast Range) {
        walk_range(self, node)
    }

    fn visit_enum(&mut self, node: &'ast Enum) {
        walk_enum(self, node)
    }

    fn visit_enum_value(&mut self, node: &'ast EnumValue) {
        walk_enum_value(self, node)
    }

    fn visit_extend(&mut self, node: &'ast Extend) {
        walk_extend(self, node)
    }

    fn visit_service(&mut self, node: &'ast Service) {
        walk_service(self, node)
    }

    fn visit_rpc(&mut self, node: &'ast Rpc) {
        walk_rpc(self, node)
    }

    fn visit_rpc_type(&mut self, node: &'ast RpcType) {
        walk_rpc_type(self, node)
    }

    /// A type written where a message or enum is expected.
    fn visit_type_ref(&mut self, node: &'ast FullIdent) {
        walk_full_ident(self, node, TokenRole::Type)
    }

    fn visit_full_ident(&mut self, node: &'ast FullIdent, role: TokenRole) {
        walk_full_ident(self, node, role)
    }

    fn visit_option_name(&mut self, node: &'ast OptionName) {
        walk_option_name(self, node)
    }

    fn visit_field_options(&mut self, node: &'ast FieldOptions) {
        walk_field_options(self, node)
    }

    fn visit_constant(&mut self, node: &'ast Constant) {
        walk_constant(self, node)
    }

    fn visit_int_lit(&mut self, node: &'ast IntLit) {
        walk_int_lit(self, node)
    }

    fn visit_str_lit(&mut self, node: &'ast StrLit) {
        walk_str_lit(self, node)
    }

    fn visit_aggregate(&mut self, node: &'ast Aggregate) {
        walk_aggregate(self, node)
    }

    /// Comments and terminator shared by every statement.
    fn visit_statement_base(&mut self, comments: &'ast Comments, terminator: Option<&'ast Token>) {
        walk_statement_base(self, comments, terminator)
    }

    fn visit_comment(&mut self, node: &'ast Comment) {
        self.visit_token(&node.token, TokenRole::Comment)
    }

    fn visit_token(&mut self, _token: &'ast Token, _role: TokenRole) {}
}

pub fn walk_proto<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Proto) {
    for statement in &node.statements {
        v.visit_top_level(statement);
    }
}

pub fn walk_top_level<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast TopLevel) {
    match node {
        TopLevel::Syntax(n) => v.visit_syntax(n),
        TopLevel::Import(n) => v.visit_import(n),
        TopLevel::Package(n) => v.visit_package(n),
        TopLevel::Option(n) => v.visit_option(n),
        TopLevel::Message(n) => v.visit_message(n),
        TopLevel::Enum(n) => v.visit_enum(n),
        TopLevel::Extend(n) => v.visit_extend(n),
        TopLevel::Service(n) => v.visit_service(n),
        TopLevel::Empty(n) => v.visit_empty(n),
    }
}

pub fn walk_syntax<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Syntax) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_str_lit(&node.value);
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_import<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Import) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    if let Some(modifier) = &node.modifier {
        v.visit_token(modifier, TokenRole::Keyword);
    }
    v.visit_str_lit(&node.path);
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_package<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Package) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_full_ident(&node.name, TokenRole::Namespace);
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_option<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast OptionDecl) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_option_name(&node.name);
    v.visit_constant(&node.value);
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_empty<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Empty) {
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_message<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Message) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    for item in &node.body {
        v.visit_message_item(item);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_message_item<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast MessageItem) {
    match node {
        MessageItem::Field(n) => v.visit_field(n),
        MessageItem::MapField(n) => v.visit_map_field(n),
        MessageItem::Group(n) => v.visit_group(n),
        MessageItem::Oneof(n) => v.visit_oneof(n),
        MessageItem::Message(n) => v.visit_message(n),
        MessageItem::Enum(n) => v.visit_enum(n),
        MessageItem::Extend(n) => v.visit_extend(n),
        MessageItem::Option(n) => v.visit_option(n),
        MessageItem::Extensions(n) => v.visit_extensions(n),
        MessageItem::Reserved(n) => v.visit_reserved(n),
        MessageItem::Empty(n) => v.visit_empty(n),
        MessageItem::Malformed(n) => v.visit_malformed_field(n),
    }
}

pub fn walk_field<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Field) {
    if let Some(label) = &node.label {
        v.visit_token(label, TokenRole::Keyword);
    }
    v.visit_type_ref(&node.ty);
    v.visit_token(&node.name, TokenRole::Declaration);
    v.visit_int_lit(&node.number);
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_map_field<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast MapField) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.key_type, TokenRole::Type);
    v.visit_type_ref(&node.value_type);
    v.visit_token(&node.name, TokenRole::Declaration);
    v.visit_int_lit(&node.number);
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_group<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Group) {
    if let Some(label) = &node.label {
        v.visit_token(label, TokenRole::Keyword);
    }
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    v.visit_int_lit(&node.number);
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    for item in &node.body {
        v.visit_message_item(item);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_oneof<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Oneof) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    for item in &node.body {
        match item {
            OneofItem::Field(n) => v.visit_field(n),
            OneofItem::Group(n) => v.visit_group(n),
            OneofItem::Option(n) => v.visit_option(n),
            OneofItem::Empty(n) => v.visit_empty(n),
            OneofItem::Malformed(n) => v.visit_malformed_field(n),
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_malformed_field<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast MalformedField) {
    if let Some(label) = &node.label {
        v.visit_token(label, TokenRole::Keyword);
    }
    if let Some(ty) = &node.ty {
        v.visit_type_ref(ty);
    }
    if let Some(name) = &node.name {
        v.visit_token(name, TokenRole::Declaration);
    }
    if let Some(number) = &node.number {
        v.visit_int_lit(number);
    }
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    v.visit_statement_base(&node.comments, node.terminator.as_ref());
}

pub fn walk_extensions<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Extensions) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    for range in &node.ranges {
        v.visit_range(range);
    }
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_reserved<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Reserved) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    match &node.body {
        ReservedBody::Ranges(ranges) => {
            for range in ranges {
                v.visit_range(range);
            }
        }
        ReservedBody::Names(names) => {
            for name in names {
                match name {
                    ReservedName::Str(lit) => v.visit_str_lit(lit),
                    ReservedName::Ident(token) => v.visit_token(token, TokenRole::Identifier),
                }
            }
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_range<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Range) {
    v.visit_int_lit(&node.start);
    match &node.end {
        Some(RangeEnd::Int(end)) => v.visit_int_lit(end),
        Some(RangeEnd::Max(max)) => v.visit_token(max, TokenRole::Keyword),
        None => {}
    }
}

pub fn walk_enum<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Enum) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    for item in &node.body {
        match item {
            EnumItem::Value(n) => v.visit_enum_value(n),
            EnumItem::Option(n) => v.visit_option(n),
            EnumItem::Reserved(n) => v.visit_reserved(n),
            EnumItem::Empty(n) => v.visit_empty(n),
            EnumItem::Malformed(n) => v.visit_malformed_field(n),
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_enum_value<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast EnumValue) {
    v.visit_token(&node.name, TokenRole::Declaration);
    v.visit_int_lit(&node.number);
    if let Some(options) = &node.options {
        v.visit_field_options(options);
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_extend<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Extend) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_type_ref(&node.extendee);
    for item in &node.body {
        match item {
            ExtendItem::Field(n) => v.visit_field(n),
            ExtendItem::Group(n) => v.visit_group(n),
            ExtendItem::Empty(n) => v.visit_empty(n),
            ExtendItem::Malformed(n) => v.visit_malformed_field(n),
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_service<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Service) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    for item in &node.body {
        match item {
            ServiceItem::Rpc(n) => v.visit_rpc(n),
            ServiceItem::Option(n) => v.visit_option(n),
            ServiceItem::Empty(n) => v.visit_empty(n),
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_rpc<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Rpc) {
    v.visit_token(&node.keyword, TokenRole::Keyword);
    v.visit_token(&node.name, TokenRole::Declaration);
    v.visit_rpc_type(&node.request);
    v.visit_token(&node.returns, TokenRole::Keyword);
    v.visit_rpc_type(&node.response);
    for item in node.body.iter().flatten() {
        match item {
            RpcItem::Option(n) => v.visit_option(n),
            RpcItem::Empty(n) => v.visit_empty(n),
        }
    }
    v.visit_statement_base(&node.comments, Some(&node.terminator));
}

pub fn walk_rpc_type<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast RpcType) {
    if let Some(stream) = &node.stream {
        v.visit_token(stream, TokenRole::Keyword);
    }
    v.visit_type_ref(&node.ty);
}

pub fn walk_full_ident<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast FullIdent, role: TokenRole) {
    for part in &node.parts {
        v.visit_token(part, role);
    }
}

pub fn walk_option_name<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast OptionName) {
    for part in &node.parts {
        match part {
            OptionNamePart::Simple(token) => v.visit_token(token, TokenRole::OptionName),
            OptionNamePart::Extension { name, .. } => v.visit_full_ident(name, TokenRole::OptionName),
        }
    }
}

pub fn walk_field_options<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast FieldOptions) {
    for option in &node.options {
        v.visit_option_name(&option.name);
        v.visit_constant(&option.value);
    }
}

pub fn walk_constant<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Constant) {
    match node {
        Constant::Ident(ident) => v.visit_full_ident(ident, TokenRole::Identifier),
        Constant::Int(lit) => v.visit_int_lit(lit),
        Constant::Float(lit) => {
            if let Some(sign) = &lit.sign {
                v.visit_token(sign, TokenRole::Number);
            }
            v.visit_token(&lit.value, TokenRole::Number);
        }
        Constant::Str(lit) => v.visit_str_lit(lit),
        Constant::Bool(lit) => v.visit_token(&lit.token, TokenRole::Keyword),
        Constant::Aggregate(aggregate) => v.visit_aggregate(aggregate),
    }
}

pub fn walk_int_lit<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast IntLit) {
    if let Some(sign) = &node.sign {
        v.visit_token(sign, TokenRole::Number);
    }
    v.visit_token(&node.value, TokenRole::Number);
}

pub fn walk_str_lit<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast StrLit) {
    for part in &node.parts {
        v.visit_token(part, TokenRole::String);
    }
}

pub fn walk_aggregate<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast Aggregate) {
    for field in &node.fields {
        match &field.name {
            AggregateName::Field(token) => v.visit_token(token, TokenRole::Identifier),
            AggregateName::Extension { name, .. } => v.visit_token(name, TokenRole::OptionName),
        }
        walk_aggregate_value(v, &field.value);
    }
}

fn walk_aggregate_value<'ast, V: Visitor<'ast> + ?Sized>(v: &mut V, node: &'ast AggregateValue) {
    match node {
        AggregateValue::Constant(c) => v.visit_constant(c),
        AggregateValue::List { items, .. } => {
            for item in items {
                walk_aggregate_value(v, item);
            }
        }
    }
}

pub fn walk_statement_base<'ast, V: Visitor<'ast> + ?Sized>(
    v: &mut V,
    comments: &'ast Comments,
    terminator: Option<&'ast Token>,
) {
    for comment in comments.iter() {
        v.visit_comment(comment);
    }
    if let Some(terminator) = terminator {
        v.visit_token(terminator, TokenRole::Punctuation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Collect {
        tokens: Vec<(String, TokenRole)>,
    }

    impl<'ast> Visitor<'ast> for Collect {
        fn visit_token(&mut self, token: &'ast Token, role: TokenRole) {
            self.tokens.push((token.text.clone(), role));
        }
    }

    fn collect(source: &str, role: TokenRole) -> Vec<String> {
        let out = parse(source);
        let mut v = Collect::default();
        v.visit_proto(&out.proto);
        v.tokens
            .into_iter()
            .filter(|(_, r)| *r == role)
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_declarations_in_order() {
        let names = collect(
            "message A { int32 x = 1; message B { oneof o { string y = 2; } } }\nenum E { V = 0; }\nservice S { rpc R(A) returns (A); }",
            TokenRole::Declaration,
        );
        assert_eq!(names, vec!["A", "x", "B", "o", "y", "E", "V", "S", "R"]);
    }

    #[test]
    fn test_type_references() {
        let types = collect(
            "message A { map<string, B> m = 1; .pkg.C c = 2; }\nextend A { D d = 3; }",
            TokenRole::Type,
        );
        assert_eq!(types, vec!["string", "B", "pkg", "C", "A", "D"]);
    }

    #[test]
    fn test_statement_base_reports_comments_and_terminators() {
        let out = parse("// lead\nsyntax = \"proto3\"; // trail\n");
        let mut v = Collect::default();
        v.visit_proto(&out.proto);
        assert_eq!(
            v.tokens,
            vec![
                ("syntax".to_string(), TokenRole::Keyword),
                ("\"proto3\"".to_string(), TokenRole::String),
                ("// lead".to_string(), TokenRole::Comment),
                ("// trail".to_string(), TokenRole::Comment),
                (";".to_string(), TokenRole::Punctuation),
            ]
        );
    }
}
