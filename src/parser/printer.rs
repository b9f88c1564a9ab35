//! Canonical re-stringification of a syntax tree.
//!
//! One statement per line, two-space indentation, attached comments kept.
//! Printing a parsed file and parsing the result again yields the same
//! output on the next print.

use super::ast::*;
use super::visitor::{self, Visitor};

/// Render `proto` as canonical `.proto` text.
pub fn print(proto: &Proto) -> String {
    let mut printer = Printer::default();
    printer.visit_proto(proto);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn leading(&mut self, comments: &Comments) {
        for comment in &comments.leading_detached {
            self.line(&comment.token.text);
        }
        if !comments.leading_detached.is_empty() {
            self.out.push('\n');
        }
        for comment in &comments.leading {
            self.line(&comment.token.text);
        }
    }

    /// A single-line statement with its comments.
    fn statement(&mut self, comments: &Comments, text: String) {
        self.leading(comments);
        self.line(&with_trailing(text, comments));
    }

    /// `head {`, the body, then `}` with trailing comments.
    fn block(&mut self, comments: &Comments, head: String, body: impl FnOnce(&mut Self), empty: bool) {
        self.leading(comments);
        if empty {
            self.line(&with_trailing(format!("{} {{}}", head), comments));
            return;
        }
        self.line(&format!("{} {{", head));
        self.indent += 1;
        body(self);
        self.indent -= 1;
        self.line(&with_trailing("}".to_string(), comments));
    }
}

fn with_trailing(mut text: String, comments: &Comments) -> String {
    for comment in &comments.trailing {
        text.push(' ');
        text.push_str(&comment.token.text);
    }
    text
}

impl<'ast> Visitor<'ast> for Printer {
    fn visit_syntax(&mut self, node: &'ast Syntax) {
        let text = format!("{} = {};", node.keyword.text, str_lit(&node.value));
        self.statement(&node.comments, text);
    }

    fn visit_import(&mut self, node: &'ast Import) {
        let modifier = node
            .modifier
            .as_ref()
            .map(|m| format!("{} ", m.text))
            .unwrap_or_default();
        let text = format!("import {}{};", modifier, str_lit(&node.path));
        self.statement(&node.comments, text);
    }

    fn visit_package(&mut self, node: &'ast Package) {
        self.statement(&node.comments, format!("package {};", node.name.text()));
    }

    fn visit_option(&mut self, node: &'ast OptionDecl) {
        let text = format!("option {} = {};", node.name.text(), constant(&node.value));
        self.statement(&node.comments, text);
    }

    fn visit_empty(&mut self, node: &'ast Empty) {
        self.statement(&node.comments, ";".to_string());
    }

    fn visit_message(&mut self, node: &'ast Message) {
        let head = format!("message {}", node.name.text);
        self.block(
            &node.comments,
            head,
            |p| node.body.iter().for_each(|item| p.visit_message_item(item)),
            node.body.is_empty(),
        );
    }

    fn visit_field(&mut self, node: &'ast Field) {
        let label = node
            .label
            .as_ref()
            .map(|l| format!("{} ", l.text))
            .unwrap_or_default();
        let text = format!(
            "{}{} {} = {}{};",
            label,
            node.ty.text(),
            node.name.text,
            int_lit(&node.number),
            field_options(node.options.as_ref()),
        );
        self.statement(&node.comments, text);
    }

    fn visit_map_field(&mut self, node: &'ast MapField) {
        let text = format!(
            "map<{}, {}> {} = {}{};",
            node.key_type.text,
            node.value_type.text(),
            node.name.text,
            int_lit(&node.number),
            field_options(node.options.as_ref()),
        );
        self.statement(&node.comments, text);
    }

    fn visit_group(&mut self, node: &'ast Group) {
        let label = node
            .label
            .as_ref()
            .map(|l| format!("{} ", l.text))
            .unwrap_or_default();
        let head = format!(
            "{}group {} = {}{}",
            label,
            node.name.text,
            int_lit(&node.number),
            field_options(node.options.as_ref()),
        );
        self.block(
            &node.comments,
            head,
            |p| node.body.iter().for_each(|item| p.visit_message_item(item)),
            node.body.is_empty(),
        );
    }

    fn visit_oneof(&mut self, node: &'ast Oneof) {
        let head = format!("oneof {}", node.name.text);
        self.block(
            &node.comments,
            head,
            |p| visitor::walk_oneof(&mut Body(p), node),
            node.body.is_empty(),
        );
    }

    fn visit_malformed_field(&mut self, node: &'ast MalformedField) {
        let mut parts = Vec::new();
        if let Some(label) = &node.label {
            parts.push(label.text.clone());
        }
        if let Some(ty) = &node.ty {
            parts.push(ty.text());
        }
        if let Some(name) = &node.name {
            parts.push(name.text.clone());
        }
        if node.equals.is_some() {
            parts.push("=".to_string());
        }
        if let Some(number) = &node.number {
            parts.push(int_lit(number));
        }
        parts.extend(node.skipped.iter().map(|t| t.text.clone()));
        let mut text = parts.join(" ");
        text.push_str(&field_options(node.options.as_ref()));
        if node.terminator.is_some() {
            text.push(';');
        }
        self.statement(&node.comments, text);
    }

    fn visit_extensions(&mut self, node: &'ast Extensions) {
        let ranges: Vec<String> = node.ranges.iter().map(range).collect();
        let text = format!(
            "extensions {}{};",
            ranges.join(", "),
            field_options(node.options.as_ref()),
        );
        self.statement(&node.comments, text);
    }

    fn visit_reserved(&mut self, node: &'ast Reserved) {
        let items: Vec<String> = match &node.body {
            ReservedBody::Ranges(ranges) => ranges.iter().map(range).collect(),
            ReservedBody::Names(names) => names
                .iter()
                .map(|n| match n {
                    ReservedName::Str(lit) => str_lit(lit),
                    ReservedName::Ident(token) => token.text.clone(),
                })
                .collect(),
        };
        self.statement(&node.comments, format!("reserved {};", items.join(", ")));
    }

    fn visit_enum(&mut self, node: &'ast Enum) {
        let head = format!("enum {}", node.name.text);
        self.block(
            &node.comments,
            head,
            |p| visitor::walk_enum(&mut Body(p), node),
            node.body.is_empty(),
        );
    }

    fn visit_enum_value(&mut self, node: &'ast EnumValue) {
        let text = format!(
            "{} = {}{};",
            node.name.text,
            int_lit(&node.number),
            field_options(node.options.as_ref()),
        );
        self.statement(&node.comments, text);
    }

    fn visit_extend(&mut self, node: &'ast Extend) {
        let head = format!("extend {}", node.extendee.text());
        self.block(
            &node.comments,
            head,
            |p| visitor::walk_extend(&mut Body(p), node),
            node.body.is_empty(),
        );
    }

    fn visit_service(&mut self, node: &'ast Service) {
        let head = format!("service {}", node.name.text);
        self.block(
            &node.comments,
            head,
            |p| visitor::walk_service(&mut Body(p), node),
            node.body.is_empty(),
        );
    }

    fn visit_rpc(&mut self, node: &'ast Rpc) {
        let head = format!(
            "rpc {}({}) returns ({})",
            node.name.text,
            rpc_type(&node.request),
            rpc_type(&node.response),
        );
        match &node.body {
            None => self.statement(&node.comments, format!("{};", head)),
            Some(items) => self.block(
                &node.comments,
                head,
                |p| visitor::walk_rpc(&mut Body(p), node),
                items.is_empty(),
            ),
        }
    }
}

/// Forwards only the child statements of a container to the printer, so the
/// container's own `walk_*` function can drive the body.
struct Body<'p>(&'p mut Printer);

impl<'ast> Visitor<'ast> for Body<'_> {
    fn visit_field(&mut self, node: &'ast Field) {
        self.0.visit_field(node)
    }

    fn visit_group(&mut self, node: &'ast Group) {
        self.0.visit_group(node)
    }

    fn visit_option(&mut self, node: &'ast OptionDecl) {
        self.0.visit_option(node)
    }

    fn visit_empty(&mut self, node: &'ast Empty) {
        self.0.visit_empty(node)
    }

    fn visit_malformed_field(&mut self, node: &'ast MalformedField) {
        self.0.visit_malformed_field(node)
    }

    fn visit_enum_value(&mut self, node: &'ast EnumValue) {
        self.0.visit_enum_value(node)
    }

    fn visit_reserved(&mut self, node: &'ast Reserved) {
        self.0.visit_reserved(node)
    }

    fn visit_rpc(&mut self, node: &'ast Rpc) {
        self.0.visit_rpc(node)
    }
}

fn str_lit(lit: &StrLit) -> String {
    lit.parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn signed(sign: Option<&Token>, value: &Token) -> String {
    match sign {
        Some(sign) => format!("{}{}", sign.text, value.text),
        None => value.text.clone(),
    }
}

fn int_lit(lit: &IntLit) -> String {
    signed(lit.sign.as_ref(), &lit.value)
}

fn range(range: &Range) -> String {
    match &range.end {
        None => int_lit(&range.start),
        Some(RangeEnd::Int(end)) => format!("{} to {}", int_lit(&range.start), int_lit(end)),
        Some(RangeEnd::Max(_)) => format!("{} to max", int_lit(&range.start)),
    }
}

fn rpc_type(ty: &RpcType) -> String {
    match &ty.stream {
        Some(_) => format!("stream {}", ty.ty.text()),
        None => ty.ty.text(),
    }
}

fn field_options(options: Option<&FieldOptions>) -> String {
    let Some(options) = options else {
        return String::new();
    };
    let items: Vec<String> = options
        .options
        .iter()
        .map(|o| format!("{} = {}", o.name.text(), constant(&o.value)))
        .collect();
    format!(" [{}]", items.join(", "))
}

fn constant(value: &Constant) -> String {
    match value {
        Constant::Ident(ident) => ident.text(),
        Constant::Int(lit) => int_lit(lit),
        Constant::Float(lit) => signed(lit.sign.as_ref(), &lit.value),
        Constant::Str(lit) => str_lit(lit),
        Constant::Bool(lit) => lit.token.text.clone(),
        Constant::Aggregate(aggregate) => self::aggregate(aggregate),
    }
}

fn aggregate(aggregate: &Aggregate) -> String {
    if aggregate.fields.is_empty() {
        return "{}".to_string();
    }
    let fields: Vec<String> = aggregate
        .fields
        .iter()
        .map(|f| {
            let name = match &f.name {
                AggregateName::Field(token) => token.text.clone(),
                AggregateName::Extension { name, .. } => format!("[{}]", name.text),
            };
            format!("{}: {}", name, aggregate_value(&f.value))
        })
        .collect();
    format!("{{ {} }}", fields.join(" "))
}

fn aggregate_value(value: &AggregateValue) -> String {
    match value {
        AggregateValue::Constant(c) => constant(c),
        AggregateValue::List { items, .. } => {
            let items: Vec<String> = items.iter().map(aggregate_value).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_canonical() {
        let out = parse(
            "syntax='proto3';package a.b;\n// Doc\nmessage M{repeated int32 xs=1[packed=true];map<string,M>m=2;oneof k{string s=3;}\nenum E{A=0;B=-1;}}\nservice S{rpc R(stream M)returns(M);rpc Q(M)returns(M){option deprecated=true;}}",
        );
        assert!(out.errors.is_empty());
        let expected = "\
syntax = 'proto3';
package a.b;
// Doc
message M {
  repeated int32 xs = 1 [packed = true];
  map<string, M> m = 2;
  oneof k {
    string s = 3;
  }
  enum E {
    A = 0;
    B = -1;
  }
}
service S {
  rpc R(stream M) returns (M);
  rpc Q(M) returns (M) {
    option deprecated = true;
  }
}
";
        assert_eq!(print(&out.proto), expected);
    }

    #[test]
    fn test_print_is_stable() {
        let source = r#"
            // detached

            // leading
            message Outer {
              optional group G = 1 { optional int32 x = 1; } // trailing
              reserved 2 to 4, 9 to max;
              reserved "a", "b";
              extensions 100 to 200;
              option (custom).value = { name: "x" items: [1, 2] nested { flag: true } };
            }
            extend Outer { optional string ext = 100; }
        "#;
        let once = print(&parse(source).proto);
        let twice = print(&parse(&once).proto);
        assert_eq!(once, twice);
    }
}
