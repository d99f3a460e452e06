//! Test case reader: pytest files to [`TestCase`]s.
//!
//! A case is a model construction (`Model(**{...})`, `Model(a=1)`,
//! `Model.parse_obj({...})`, `Model.model_validate({...})`) found in a test
//! function. Constructions inside `with pytest.raises(...)` are rejections;
//! the `match=` argument, split on `|`, supplies the expected violation ids.

use super::python::{Argument, Bindings, SourceContext, parse_tree};
use crate::error::TranslateError;
use crate::ir::{Expectation, TestCase};
use serde_json::{Map, Value};
use tree_sitter::Node;

const PARSE_METHODS: &[&str] = &["parse_obj", "model_validate", "validate"];

/// Read every case from a test file, in source order.
pub fn parse_test_cases(source: &str, file: &str) -> Result<Vec<TestCase>, TranslateError> {
    let tree = parse_tree(source, file)?;
    let ctx = SourceContext::new(source, file);
    let root = tree.root_node();

    let mut reader = CaseReader {
        ctx,
        module: Bindings::new(),
        cases: Vec::new(),
    };

    for stmt in ctx.statements(root) {
        let (_, definition) = ctx.undecorate(stmt);
        match definition.kind() {
            "assignment" => reader.bind(definition, &mut Bindings::new(), true),
            "function_definition" => reader.read_test_function(definition, None)?,
            "class_definition" => {
                let name = definition
                    .child_by_field_name("name")
                    .map(|n| ctx.node_text(n))
                    .unwrap_or_default();
                if !name.starts_with("Test") {
                    continue;
                }
                let Some(body) = definition.child_by_field_name("body") else {
                    continue;
                };
                for member in ctx.statements(body) {
                    let (_, method) = ctx.undecorate(member);
                    if method.kind() == "function_definition" {
                        reader.read_test_function(method, Some(name))?;
                    }
                }
            }
            _ => {}
        }
    }

    tracing::debug!(file, cases = reader.cases.len(), "parsed test file");
    Ok(reader.cases)
}

struct CaseReader<'a> {
    ctx: SourceContext<'a>,
    module: Bindings,
    cases: Vec<TestCase>,
}

impl<'a> CaseReader<'a> {
    /// Record `name = literal`, in module scope or the current test.
    fn bind(&mut self, node: Node, locals: &mut Bindings, module_scope: bool) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = self.ctx.node_text(left).to_string();
        let value = {
            let scope = self.scope(locals);
            self.ctx.eval_literal(right, &scope)
        };
        match (value, module_scope) {
            (Some(value), true) => {
                self.module.insert(name, value);
            }
            (Some(value), false) => {
                locals.insert(name, value);
            }
            (None, _) => {
                locals.remove(&name);
            }
        }
    }

    fn scope(&self, locals: &Bindings) -> Bindings {
        let mut scope = self.module.clone();
        scope.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        scope
    }

    fn read_test_function(&mut self, node: Node, class: Option<&str>) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let Some(name) = node.child_by_field_name("name").map(|n| ctx.node_text(n)) else {
            return Ok(());
        };
        if !name.starts_with("test") {
            return Ok(());
        }
        let Some(body) = node.child_by_field_name("body") else {
            return Ok(());
        };
        let test = match class {
            Some(class) => format!("{class}.{name}"),
            None => name.to_string(),
        };
        let mut locals = Bindings::new();
        self.read_block(body, &test, &mut locals, None)
    }

    fn read_block(
        &mut self,
        block: Node,
        test: &str,
        locals: &mut Bindings,
        reject: Option<&[String]>,
    ) -> Result<(), TranslateError> {
        for stmt in self.ctx.statements(block) {
            self.read_statement(stmt, test, locals, reject)?;
        }
        Ok(())
    }

    fn read_statement(
        &mut self,
        stmt: Node,
        test: &str,
        locals: &mut Bindings,
        reject: Option<&[String]>,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        match stmt.kind() {
            "call" => self.read_call(stmt, test, locals, reject),
            "assignment" => {
                if let Some(right) = stmt.child_by_field_name("right") {
                    let right = ctx.unwrap_expr(right);
                    if right.kind() == "call" {
                        self.read_call(right, test, locals, reject)?;
                    }
                }
                self.bind(stmt, locals, false);
                Ok(())
            }
            "with_statement" => {
                let hints = self.raises_hints(stmt);
                let Some(body) = stmt.child_by_field_name("body") else {
                    return Ok(());
                };
                match hints {
                    Some(hints) => self.read_block(body, test, locals, Some(hints.as_slice())),
                    None => self.read_block(body, test, locals, reject),
                }
            }
            "if_statement" | "for_statement" | "while_statement" | "try_statement"
            | "else_clause" | "elif_clause" | "except_clause" | "finally_clause" | "block" => {
                for child in ctx.children(stmt) {
                    if matches!(
                        child.kind(),
                        "block" | "else_clause" | "elif_clause" | "except_clause" | "finally_clause"
                    ) {
                        self.read_statement(child, test, locals, reject)?;
                    }
                }
                if stmt.kind() == "block" {
                    self.read_block(stmt, test, locals, reject)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `match=` tokens when the with statement is a `raises(...)` context.
    fn raises_hints(&self, stmt: Node) -> Option<Vec<String>> {
        let ctx = self.ctx;
        let mut found = None;
        for clause in ctx.children(stmt) {
            if clause.kind() != "with_clause" {
                continue;
            }
            for item in ctx.children(clause) {
                let Some(mut value) = item.child_by_field_name("value") else {
                    continue;
                };
                if value.kind() == "as_pattern" {
                    match value.named_child(0) {
                        Some(inner) => value = inner,
                        None => continue,
                    }
                }
                let Some((function, args)) = ctx.call_parts(ctx.unwrap_expr(value)) else {
                    continue;
                };
                if ctx.simple_name(function).as_deref() != Some("raises") {
                    continue;
                }
                let mut hints = Vec::new();
                for arg in args {
                    if let Argument::Keyword(keyword, pattern) = arg {
                        if keyword != "match" {
                            continue;
                        }
                        if let Some(Value::String(pattern)) =
                            ctx.eval_literal(pattern, &self.module)
                        {
                            hints.extend(
                                pattern
                                    .split('|')
                                    .map(str::trim)
                                    .filter(|t| !t.is_empty())
                                    .map(str::to_string),
                            );
                        }
                    }
                }
                found = Some(hints);
            }
        }
        found
    }

    fn read_call(
        &mut self,
        call: Node,
        test: &str,
        locals: &Bindings,
        reject: Option<&[String]>,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let Some((function, args)) = ctx.call_parts(call) else {
            return Ok(());
        };

        let (model, payload) = match function.kind() {
            "identifier" => {
                let model = ctx.node_text(function);
                if !starts_uppercase(model) {
                    return Ok(());
                }
                if args.iter().any(|a| matches!(a, Argument::Positional(_) | Argument::ListSplat(_))) {
                    tracing::debug!(test, model, "skipping call with positional arguments");
                    return Ok(());
                }
                (model.to_string(), self.constructor_payload(&args, locals)?)
            }
            "attribute" => {
                let (Some(object), Some(method)) = (
                    function.child_by_field_name("object"),
                    function.child_by_field_name("attribute"),
                ) else {
                    return Ok(());
                };
                let model = ctx.node_text(object);
                if object.kind() != "identifier"
                    || !starts_uppercase(model)
                    || !PARSE_METHODS.contains(&ctx.node_text(method))
                {
                    return Ok(());
                }
                let [Argument::Positional(arg)] = args.as_slice() else {
                    return Err(ctx.error(
                        call,
                        format!("`{}` takes a single payload argument", ctx.node_text(function)),
                    ));
                };
                match self.payload_value(*arg, locals)? {
                    Value::Object(map) => (model.to_string(), map),
                    _ => {
                        return Err(ctx.error(*arg, "payload must be a dictionary"));
                    }
                }
            }
            _ => return Ok(()),
        };

        let expectation = match reject {
            Some(hints) => Expectation::Reject {
                hints: hints.to_vec(),
            },
            None => Expectation::Accept,
        };
        self.cases.push(TestCase {
            model,
            test: test.to_string(),
            payload,
            expectation,
            location: ctx.location(call),
        });
        Ok(())
    }

    fn constructor_payload(
        &self,
        args: &[Argument],
        locals: &Bindings,
    ) -> Result<Map<String, Value>, TranslateError> {
        let mut payload = Map::new();
        for arg in args {
            match arg {
                Argument::Keyword(key, value) => {
                    payload.insert(key.clone(), self.payload_value(*value, locals)?);
                }
                Argument::DictSplat(value) => match self.payload_value(*value, locals)? {
                    Value::Object(map) => payload.extend(map),
                    _ => return Err(self.ctx.error(*value, "`**` payload must be a dictionary")),
                },
                Argument::Positional(n) | Argument::ListSplat(n) => {
                    return Err(self.ctx.error(*n, "unexpected positional argument in payload"));
                }
            }
        }
        Ok(payload)
    }

    /// A literal, a bound name, or a nested model construction.
    fn payload_value(&self, node: Node, locals: &Bindings) -> Result<Value, TranslateError> {
        let ctx = self.ctx;
        let node = ctx.unwrap_expr(node);
        if let Some(value) = ctx.eval_literal(node, &self.scope(locals)) {
            return Ok(value);
        }
        match node.kind() {
            "call" => {
                if let Some((function, args)) = ctx.call_parts(node) {
                    if function.kind() == "identifier" && starts_uppercase(ctx.node_text(function)) {
                        return self.constructor_payload(&args, locals).map(Value::Object);
                    }
                }
            }
            "list" | "tuple" | "set" => {
                return ctx
                    .children(node)
                    .into_iter()
                    .map(|item| self.payload_value(item, locals))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array);
            }
            "dictionary" => {
                let mut map = Map::new();
                for pair in ctx.children(node) {
                    let (Some(key), Some(value)) = (
                        pair.child_by_field_name("key"),
                        pair.child_by_field_name("value"),
                    ) else {
                        return Err(ctx.error(pair, "unsupported dictionary entry in payload"));
                    };
                    let Some(Value::String(key)) = ctx.eval_literal(key, &self.scope(locals)) else {
                        return Err(ctx.error(key, "payload keys must be string literals"));
                    };
                    map.insert(key, self.payload_value(value, locals)?);
                }
                return Ok(Value::Object(map));
            }
            _ => {}
        }
        Err(ctx.error(
            node,
            format!("payload value `{}` is not a literal", ctx.node_text(node)),
        ))
    }
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TESTS: &str = r#"
import pytest
from pydantic import ValidationError
from models import User

VALID = {"name": "ann", "age": 3}

def test_user_ok():
    User(**VALID)
    user = User(name="bob", age=40, address=Address(zip="12345"))
    assert user.name == "bob"

def test_user_bad():
    payload = {"name": "", "age": -1}
    with pytest.raises(ValidationError, match="ge|nonempty"):
        User(**payload)
    with pytest.raises(ValueError):
        User.parse_obj({"age": 1})

def helper():
    User(name="x")

class TestUser:
    def test_validate(self):
        User.model_validate({"name": "c", "age": 1})
        d = Decimal("1.0")
        make_user(name="z")
"#;

    #[test]
    fn reads_accept_and_reject_cases() {
        let cases = parse_test_cases(TESTS, "test_models.py").unwrap();
        assert_eq!(cases.len(), 5);

        assert_eq!(cases[0].test, "test_user_ok");
        assert_eq!(cases[0].expectation, Expectation::Accept);
        assert_eq!(Value::Object(cases[0].payload.clone()), json!({"name": "ann", "age": 3}));

        assert_eq!(
            Value::Object(cases[1].payload.clone()),
            json!({"name": "bob", "age": 40, "address": {"zip": "12345"}})
        );

        assert_eq!(
            cases[2].expectation,
            Expectation::Reject {
                hints: vec!["ge".into(), "nonempty".into()]
            }
        );
        assert_eq!(Value::Object(cases[2].payload.clone()), json!({"name": "", "age": -1}));
        assert_eq!(cases[3].expectation, Expectation::Reject { hints: vec![] });

        assert_eq!(cases[4].test, "TestUser.test_validate");
        assert_eq!(cases[4].location.line, 25);
    }

    #[test]
    fn non_literal_payload_is_an_error() {
        let source = "def test_x():\n    User(name=make_name())\n";
        assert!(parse_test_cases(source, "test_x.py").is_err());
    }
}
