//! Tree-sitter Python front end shared by the model, rule and test readers.

use crate::error::{SourceLocation, TranslateError};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tree_sitter::{Node, Parser, Tree};

/// Names bound to literal values (module constants, test-local variables).
pub(crate) type Bindings = HashMap<String, Value>;

/// Parse Python source, failing at the first syntax error.
pub(crate) fn parse_tree(source: &str, file: &str) -> Result<Tree, TranslateError> {
    let mut parser = Parser::new();
    parser
        .set_language(&arborium_python::language().into())
        .map_err(|err| TranslateError::parse(SourceLocation::new(file, 1, 1), err.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| TranslateError::parse(SourceLocation::new(file, 1, 1), "failed to parse"))?;

    let root = tree.root_node();
    if root.has_error() {
        let ctx = SourceContext::new(source, file);
        let node = first_error(root).unwrap_or(root);
        let message = if node.is_missing() {
            format!("syntax error: expected `{}`", node.kind())
        } else {
            let text = ctx.node_text(node);
            let snippet: String = text.chars().take(40).collect();
            format!("syntax error near `{}`", snippet.trim())
        };
        return Err(TranslateError::parse(ctx.location(node), message));
    }

    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

/// One argument of a call expression.
#[derive(Debug, Clone)]
pub(crate) enum Argument<'t> {
    Positional(Node<'t>),
    Keyword(String, Node<'t>),
    DictSplat(Node<'t>),
    ListSplat(Node<'t>),
}

/// Source text plus file name, for reading nodes and locating them.
#[derive(Clone, Copy)]
pub(crate) struct SourceContext<'a> {
    source: &'a str,
    file: &'a str,
}

impl<'a> SourceContext<'a> {
    pub(crate) fn new(source: &'a str, file: &'a str) -> Self {
        Self { source, file }
    }

    pub(crate) fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    pub(crate) fn location(&self, node: Node) -> SourceLocation {
        let pos = node.start_position();
        SourceLocation::new(self.file, pos.row + 1, pos.column + 1)
    }

    pub(crate) fn error(&self, node: Node, message: impl Into<String>) -> TranslateError {
        TranslateError::parse(self.location(node), message)
    }

    /// Named children without comments.
    pub(crate) fn children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect()
    }

    /// Statements of a `block` or `module`, with expression statements unwrapped.
    pub(crate) fn statements<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        self.children(node)
            .into_iter()
            .map(|stmt| {
                if stmt.kind() == "expression_statement" {
                    stmt.named_child(0).unwrap_or(stmt)
                } else {
                    stmt
                }
            })
            .collect()
    }

    /// Decorators and the definition they wrap.
    pub(crate) fn undecorate<'t>(&self, node: Node<'t>) -> (Vec<Node<'t>>, Node<'t>) {
        if node.kind() != "decorated_definition" {
            return (Vec::new(), node);
        }
        let decorators = self
            .children(node)
            .into_iter()
            .filter(|child| child.kind() == "decorator")
            .filter_map(|child| child.named_child(0))
            .collect();
        let definition = node.child_by_field_name("definition").unwrap_or(node);
        (decorators, definition)
    }

    /// Text of the docstring at the head of a block, if any.
    pub(crate) fn docstring(&self, body: Node) -> Option<String> {
        let first = self.statements(body).into_iter().next()?;
        if !matches!(first.kind(), "string" | "concatenated_string") {
            return None;
        }
        match self.eval_literal(first, &Bindings::new()) {
            Some(Value::String(text)) => Some(text.trim().to_string()),
            _ => None,
        }
    }

    /// `a`, `a.b.c`; `None` for anything else.
    pub(crate) fn dotted_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.node_text(node).to_string()),
            "attribute" => {
                let object = self.dotted_name(node.child_by_field_name("object")?)?;
                let attribute = node.child_by_field_name("attribute")?;
                Some(format!("{}.{}", object, self.node_text(attribute)))
            }
            "type" | "parenthesized_expression" => self.dotted_name(node.named_child(0)?),
            _ => None,
        }
    }

    /// Last segment of a dotted name (`typing.List` -> `List`).
    pub(crate) fn simple_name(&self, node: Node) -> Option<String> {
        let dotted = self.dotted_name(node)?;
        Some(dotted.rsplit('.').next().unwrap_or(&dotted).to_string())
    }

    /// Callee and arguments of a `call` node.
    pub(crate) fn call_parts<'t>(&self, node: Node<'t>) -> Option<(Node<'t>, Vec<Argument<'t>>)> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let arguments = node.child_by_field_name("arguments")?;
        if arguments.kind() != "argument_list" {
            return Some((function, vec![Argument::Positional(arguments)]));
        }
        let args = self
            .children(arguments)
            .into_iter()
            .map(|arg| match arg.kind() {
                "keyword_argument" => {
                    match (
                        arg.child_by_field_name("name"),
                        arg.child_by_field_name("value"),
                    ) {
                        (Some(name), Some(value)) => {
                            Argument::Keyword(self.node_text(name).to_string(), value)
                        }
                        _ => Argument::Positional(arg),
                    }
                }
                "dictionary_splat" => Argument::DictSplat(arg.named_child(0).unwrap_or(arg)),
                "list_splat" => Argument::ListSplat(arg.named_child(0).unwrap_or(arg)),
                _ => Argument::Positional(arg),
            })
            .collect();
        Some((function, args))
    }

    /// Strip `type` wrappers and parentheses.
    pub(crate) fn unwrap_expr<'t>(&self, node: Node<'t>) -> Node<'t> {
        match node.kind() {
            "type" | "parenthesized_expression" => match node.named_child(0) {
                Some(inner) if inner.kind() != "comment" => self.unwrap_expr(inner),
                _ => node,
            },
            _ => node,
        }
    }

    /// Evaluate a literal expression. Identifiers resolve through `bindings`.
    pub(crate) fn eval_literal(&self, node: Node, bindings: &Bindings) -> Option<Value> {
        let node = self.unwrap_expr(node);
        match node.kind() {
            "string" => parse_string_literal(self.node_text(node)).map(Value::String),
            "concatenated_string" => {
                let mut text = String::new();
                for part in self.children(node) {
                    text.push_str(&parse_string_literal(self.node_text(part))?);
                }
                Some(Value::String(text))
            }
            "integer" => parse_integer(self.node_text(node), false).map(Value::Number),
            "float" => parse_float(self.node_text(node), false).map(Value::Number),
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "none" => Some(Value::Null),
            "unary_operator" => {
                let operator = node.child_by_field_name("operator")?;
                let argument = self.unwrap_expr(node.child_by_field_name("argument")?);
                let negative = match self.node_text(operator) {
                    "-" => true,
                    "+" => false,
                    _ => return None,
                };
                match argument.kind() {
                    "integer" => parse_integer(self.node_text(argument), negative),
                    "float" => parse_float(self.node_text(argument), negative),
                    _ => None,
                }
                .map(Value::Number)
            }
            "list" | "tuple" | "set" => self
                .children(node)
                .into_iter()
                .map(|item| self.eval_literal(item, bindings))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            "dictionary" => {
                let mut map = Map::new();
                for entry in self.children(node) {
                    match entry.kind() {
                        "pair" => {
                            let key = self.eval_literal(entry.child_by_field_name("key")?, bindings)?;
                            let value =
                                self.eval_literal(entry.child_by_field_name("value")?, bindings)?;
                            map.insert(object_key(key)?, value);
                        }
                        "dictionary_splat" => {
                            let Value::Object(inner) =
                                self.eval_literal(entry.named_child(0)?, bindings)?
                            else {
                                return None;
                            };
                            map.extend(inner);
                        }
                        _ => return None,
                    }
                }
                Some(Value::Object(map))
            }
            "identifier" => bindings.get(self.node_text(node)).cloned(),
            "attribute" => bindings.get(&self.dotted_name(node)?).cloned(),
            _ => None,
        }
    }
}

fn object_key(key: Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if b { "True" } else { "False" }.to_string()),
        _ => None,
    }
}

/// Decode a Python string literal, prefix and quotes included.
/// Formatted and byte strings are not literals.
pub(crate) fn parse_string_literal(text: &str) -> Option<String> {
    let quote_start = text.find(['"', '\''])?;
    let prefix = text[..quote_start].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') || prefix.contains('t') {
        return None;
    }
    let raw = prefix.contains('r');
    let rest = &text[quote_start..];
    let quote = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
        &rest[..3]
    } else {
        &rest[..1]
    };
    if rest.len() < quote.len() * 2 || !rest.ends_with(quote) {
        return None;
    }
    let body = &rest[quote.len()..rest.len() - quote.len()];
    if raw {
        Some(body.to_string())
    } else {
        Some(unescape(body))
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next_if(char::is_ascii_hexdigit)).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&digits);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = String::from(next);
                while digits.len() < 3 {
                    match chars.next_if(|d| ('0'..='7').contains(d)) {
                        Some(d) => digits.push(d),
                        None => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn parse_integer(text: &str, negative: bool) -> Option<Number> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };
    if digits.ends_with('j') || digits.ends_with('l') {
        return None;
    }
    let value = i128::from_str_radix(digits, radix).ok()?;
    let value = i64::try_from(if negative { -value } else { value }).ok()?;
    Some(Number::from(value))
}

fn parse_float(text: &str, negative: bool) -> Option<Number> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if cleaned.ends_with(['j', 'J']) {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    Number::from_f64(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> Option<Value> {
        let source = format!("x = {expr}\n");
        let tree = parse_tree(&source, "t.py").unwrap();
        let ctx = SourceContext::new(&source, "t.py");
        let stmt = ctx.statements(tree.root_node())[0];
        let right = stmt.child_by_field_name("right").unwrap();
        ctx.eval_literal(right, &Bindings::new())
    }

    #[test]
    fn literals() {
        assert_eq!(eval("'abc'"), Some(json!("abc")));
        assert_eq!(eval(r#""a\tb\x41""#), Some(json!("a\tbA")));
        assert_eq!(eval(r#"r"^\d+$""#), Some(json!(r"^\d+$")));
        assert_eq!(eval("'a' 'b'"), Some(json!("ab")));
        assert_eq!(eval("1_000"), Some(json!(1000)));
        assert_eq!(eval("0x10"), Some(json!(16)));
        assert_eq!(eval("-5"), Some(json!(-5)));
        assert_eq!(eval("-2.5"), Some(json!(-2.5)));
        assert_eq!(eval("True"), Some(json!(true)));
        assert_eq!(eval("None"), Some(Value::Null));
        assert_eq!(eval("[1, 'a', None]"), Some(json!([1, "a", null])));
        assert_eq!(eval("(1, 2)"), Some(json!([1, 2])));
        assert_eq!(eval("{'a': {'b': 1}, 2: 3}"), Some(json!({"a": {"b": 1}, "2": 3})));
    }

    #[test]
    fn non_literals() {
        assert_eq!(eval("f'{y}'"), None);
        assert_eq!(eval("y"), None);
        assert_eq!(eval("foo()"), None);
        assert_eq!(eval("1 + 2"), None);
    }

    #[test]
    fn integers_are_bounded_by_i64() {
        assert_eq!(eval("-9223372036854775808"), Some(json!(i64::MIN)));
        assert_eq!(eval("9223372036854775807"), Some(json!(i64::MAX)));
        assert_eq!(eval("9223372036854775808"), None);
        assert_eq!(eval("18446744073709551615"), None);
    }

    #[test]
    fn syntax_error_is_located() {
        let err = parse_tree("class A(BaseModel):\n    x: int =\n", "m.py").unwrap_err();
        assert_eq!(err.location().file, "m.py");
        assert_eq!(err.location().line, 2);
    }
}
