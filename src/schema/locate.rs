//! Position queries: which node sits at an offset, and in which scope.

use crate::parser::ast::*;
use crate::parser::visitor::{self, Visitor};
use crate::types::{Schema, Type};

use super::resolve;

/// A borrowed AST node returned by [`Schema::locate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Syntax(&'a Syntax),
    Import(&'a Import),
    Package(&'a Package),
    Option(&'a OptionDecl),
    Message(&'a Message),
    Field(&'a Field),
    MapField(&'a MapField),
    Group(&'a Group),
    Oneof(&'a Oneof),
    MalformedField(&'a MalformedField),
    Extensions(&'a Extensions),
    Reserved(&'a Reserved),
    Enum(&'a Enum),
    EnumValue(&'a EnumValue),
    Extend(&'a Extend),
    Service(&'a Service),
    Rpc(&'a Rpc),
    /// A type name in a field, map value, rpc or extend target.
    TypeRef(&'a FullIdent),
}

impl Node<'_> {
    pub fn span(&self) -> Span {
        match self {
            Node::Syntax(n) => n.span,
            Node::Import(n) => n.span,
            Node::Package(n) => n.span,
            Node::Option(n) => n.span,
            Node::Message(n) => n.span,
            Node::Field(n) => n.span,
            Node::MapField(n) => n.span,
            Node::Group(n) => n.span,
            Node::Oneof(n) => n.span,
            Node::MalformedField(n) => n.span,
            Node::Extensions(n) => n.span,
            Node::Reserved(n) => n.span,
            Node::Enum(n) => n.span,
            Node::EnumValue(n) => n.span,
            Node::Extend(n) => n.span,
            Node::Service(n) => n.span,
            Node::Rpc(n) => n.span,
            Node::TypeRef(n) => n.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Located<'a> {
    pub node: Node<'a>,
    /// Fully qualified scope names are resolved in at this node, e.g.
    /// `.pkg.Outer` for a field of `Outer`, `.pkg` at top level.
    pub scope: String,
}

impl Schema {
    /// The innermost node whose span touches `offset` in file `path`.
    pub fn locate(&self, path: &str, offset: usize) -> Option<Located<'_>> {
        let file = self.get_file(path)?;
        let mut locator = Locator {
            offset,
            scopes: vec![file.package_scope()],
            found: None,
        };
        locator.visit_proto(&file.parse.proto);
        locator.found
    }

    /// [`locate`](Self::locate) with a 1-based line and column.
    pub fn locate_position(&self, path: &str, line: usize, column: usize) -> Option<Located<'_>> {
        let file = self.get_file(path)?;
        let offset = file.lines.offset(&file.source, line, column)?;
        self.locate(path, offset)
    }

    /// The message or enum a type reference at `offset` points to.
    pub fn definition_at(&self, path: &str, offset: usize) -> Option<&Type> {
        let located = self.locate(path, offset)?;
        let Node::TypeRef(ident) = located.node else {
            return None;
        };
        let resolved = resolve::resolve(&ident.text(), &located.scope, &self.types)?;
        self.types.get(&resolved)
    }
}

struct Locator<'a> {
    offset: usize,
    scopes: Vec<String>,
    found: Option<Located<'a>>,
}

impl<'a> Locator<'a> {
    /// Record `node` if it covers the offset. Returns whether to descend.
    fn hit(&mut self, node: Node<'a>) -> bool {
        if !node.span().touches(self.offset) {
            return false;
        }
        self.found = Some(Located {
            node,
            scope: self.scopes.last().cloned().unwrap_or_default(),
        });
        true
    }

    fn scoped(&mut self, name: &str, walk: impl FnOnce(&mut Self)) {
        let scope = format!("{}.{}", self.scopes.last().map_or("", String::as_str), name);
        self.scopes.push(scope);
        walk(self);
        self.scopes.pop();
    }
}

impl<'a> Visitor<'a> for Locator<'a> {
    fn visit_syntax(&mut self, node: &'a Syntax) {
        self.hit(Node::Syntax(node));
    }

    fn visit_import(&mut self, node: &'a Import) {
        self.hit(Node::Import(node));
    }

    fn visit_package(&mut self, node: &'a Package) {
        self.hit(Node::Package(node));
    }

    fn visit_option(&mut self, node: &'a OptionDecl) {
        self.hit(Node::Option(node));
    }

    fn visit_message(&mut self, node: &'a Message) {
        if self.hit(Node::Message(node)) {
            self.scoped(&node.name.text, |v| visitor::walk_message(v, node));
        }
    }

    fn visit_field(&mut self, node: &'a Field) {
        if self.hit(Node::Field(node)) {
            visitor::walk_field(self, node);
        }
    }

    fn visit_map_field(&mut self, node: &'a MapField) {
        if self.hit(Node::MapField(node)) {
            visitor::walk_map_field(self, node);
        }
    }

    fn visit_group(&mut self, node: &'a Group) {
        if self.hit(Node::Group(node)) {
            self.scoped(&node.name.text, |v| visitor::walk_group(v, node));
        }
    }

    fn visit_oneof(&mut self, node: &'a Oneof) {
        if self.hit(Node::Oneof(node)) {
            visitor::walk_oneof(self, node);
        }
    }

    fn visit_malformed_field(&mut self, node: &'a MalformedField) {
        if self.hit(Node::MalformedField(node)) {
            visitor::walk_malformed_field(self, node);
        }
    }

    fn visit_extensions(&mut self, node: &'a Extensions) {
        self.hit(Node::Extensions(node));
    }

    fn visit_reserved(&mut self, node: &'a Reserved) {
        self.hit(Node::Reserved(node));
    }

    fn visit_enum(&mut self, node: &'a Enum) {
        if self.hit(Node::Enum(node)) {
            visitor::walk_enum(self, node);
        }
    }

    fn visit_enum_value(&mut self, node: &'a EnumValue) {
        self.hit(Node::EnumValue(node));
    }

    fn visit_extend(&mut self, node: &'a Extend) {
        if self.hit(Node::Extend(node)) {
            visitor::walk_extend(self, node);
        }
    }

    fn visit_service(&mut self, node: &'a Service) {
        if self.hit(Node::Service(node)) {
            visitor::walk_service(self, node);
        }
    }

    fn visit_rpc(&mut self, node: &'a Rpc) {
        if self.hit(Node::Rpc(node)) {
            visitor::walk_rpc(self, node);
        }
    }

    fn visit_type_ref(&mut self, node: &'a FullIdent) {
        self.hit(Node::TypeRef(node));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build, MemoryLoader};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "package p;\nmessage Outer {\n  message Inner {}\n  Inner a = 1;\n}\nservice S { rpc Get(Outer) returns (Outer.Inner); }\n";

    async fn schema() -> Schema {
        build(&MemoryLoader::with_files([("a.proto", SOURCE)]), &["a.proto"]).await
    }

    fn offset_of(needle: &str) -> usize {
        SOURCE.find(needle).unwrap()
    }

    #[tokio::test]
    async fn test_locate_innermost() {
        let schema = schema().await;

        let at_field = schema.locate("a.proto", offset_of("a = 1")).unwrap();
        assert!(matches!(at_field.node, Node::Field(f) if f.name.text == "a"));
        assert_eq!(at_field.scope, ".p.Outer");

        let at_inner = schema.locate("a.proto", offset_of("Inner {}")).unwrap();
        assert!(matches!(at_inner.node, Node::Message(m) if m.name.text == "Inner"));
        assert_eq!(at_inner.scope, ".p.Outer");

        let at_type = schema.locate_position("a.proto", 4, 3).unwrap();
        assert!(matches!(at_type.node, Node::TypeRef(t) if t.text() == "Inner"));

        assert_eq!(schema.locate("missing.proto", 0), None);
    }

    #[tokio::test]
    async fn test_definition_at() {
        let schema = schema().await;
        let def = schema.definition_at("a.proto", offset_of("Inner a")).unwrap();
        assert_eq!(def.path(), ".p.Outer.Inner");
        let def = schema.definition_at("a.proto", offset_of("Outer.Inner)")).unwrap();
        assert_eq!(def.path(), ".p.Outer.Inner");
        assert!(schema.definition_at("a.proto", offset_of("package")).is_none());
    }
}
