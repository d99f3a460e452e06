//! Model parser: Pydantic model definitions to a [`SchemaGraph`].
//!
//! Understands typed attributes, literal defaults, `Field(...)` metadata,
//! constrained types (`constr`, `conint`, ...), `Annotated[...]`, decorator
//! validator hooks and the `Config` / `model_config` extra policy. Everything
//! else in the module is ignored; nothing is executed.

use super::python::{Argument, Bindings, SourceContext, parse_tree};
use crate::error::{SourceLocation, TranslateError};
use crate::ir::*;
use serde_json::{Number, Value};
use std::collections::HashSet;
use tree_sitter::Node;

/// Options for [`parse_models`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Base classes that make a class a model.
    pub root_bases: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            root_bases: vec!["BaseModel".to_string()],
        }
    }
}

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum"];

/// Keywords of `Field(...)` that carry no validation semantics.
const IGNORED_FIELD_KEYWORDS: &[&str] = &[
    "title",
    "description",
    "example",
    "examples",
    "const",
    "deprecated",
    "repr",
    "json_schema_extra",
    "frozen",
    "allow_mutation",
];

/// Parse one model-definition file.
pub fn parse_models(
    source: &str,
    file: &str,
    options: &ParseOptions,
) -> Result<SchemaGraph, TranslateError> {
    let tree = parse_tree(source, file)?;
    let ctx = SourceContext::new(source, file);
    let root = tree.root_node();

    let mut reader = ModelReader {
        ctx,
        options,
        constants: Bindings::new(),
        functions: HashSet::new(),
        graph: SchemaGraph::new(file),
    };
    reader.collect_module_scope(root);

    for stmt in ctx.statements(root) {
        let (_, definition) = ctx.undecorate(stmt);
        if definition.kind() == "class_definition" {
            reader.read_class(definition)?;
        }
    }

    tracing::debug!(
        file,
        models = reader.graph.models.len(),
        enums = reader.graph.enums.len(),
        "parsed model file"
    );
    Ok(reader.graph)
}

/// Parse a constraint keyword argument. `Ok(None)` when the keyword is not a
/// constraint keyword.
pub(crate) fn constraint_from_keyword(
    ctx: &SourceContext,
    keyword: &str,
    value: Node,
    bindings: &Bindings,
) -> Result<Option<ConstraintKind>, TranslateError> {
    let literal = || {
        ctx.eval_literal(value, bindings).ok_or_else(|| {
            let message = if is_integer_literal(ctx, value) {
                format!(
                    "`{keyword}` value `{}` is out of range for a 64-bit integer",
                    ctx.node_text(value)
                )
            } else {
                format!(
                    "`{keyword}` needs a literal value, got `{}`",
                    ctx.node_text(value)
                )
            };
            ctx.error(value, message)
        })
    };
    let count = || -> Result<u64, TranslateError> {
        literal()?
            .as_u64()
            .ok_or_else(|| ctx.error(value, format!("`{keyword}` needs a non-negative integer")))
    };
    let number = || -> Result<Number, TranslateError> {
        match literal()? {
            Value::Number(n) => Ok(n),
            _ => Err(ctx.error(value, format!("`{keyword}` needs a number"))),
        }
    };
    let text = || -> Result<String, TranslateError> {
        match literal()? {
            Value::String(s) => Ok(s),
            _ => Err(ctx.error(value, format!("`{keyword}` needs a string"))),
        }
    };

    let kind = match keyword {
        "min_length" => ConstraintKind::MinLength(count()?),
        "max_length" => ConstraintKind::MaxLength(count()?),
        "min_items" => ConstraintKind::MinItems(count()?),
        "max_items" => ConstraintKind::MaxItems(count()?),
        "ge" => ConstraintKind::Ge(number()?),
        "gt" => ConstraintKind::Gt(number()?),
        "le" => ConstraintKind::Le(number()?),
        "lt" => ConstraintKind::Lt(number()?),
        "multiple_of" => ConstraintKind::MultipleOf(number()?),
        "regex" => ConstraintKind::Pattern {
            regex: text()?,
            anchored: true,
        },
        "pattern" => ConstraintKind::Pattern {
            regex: text()?,
            anchored: false,
        },
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

/// An integer literal, possibly negated. Such a literal only fails to
/// evaluate when it does not fit in an `i64`.
fn is_integer_literal(ctx: &SourceContext, node: Node) -> bool {
    let node = ctx.unwrap_expr(node);
    match node.kind() {
        "integer" => true,
        "unary_operator" => {
            let sign = node
                .child_by_field_name("operator")
                .is_some_and(|op| matches!(ctx.node_text(op), "-" | "+"));
            sign && node
                .child_by_field_name("argument")
                .is_some_and(|arg| ctx.unwrap_expr(arg).kind() == "integer")
        }
        _ => false,
    }
}

struct ModelReader<'a> {
    ctx: SourceContext<'a>,
    options: &'a ParseOptions,
    constants: Bindings,
    functions: HashSet<String>,
    graph: SchemaGraph,
}

/// A parsed annotation, with whatever constraints it carries at the top.
#[derive(Default)]
struct Annotation {
    ty: Option<TypeExpr>,
    constraints: Vec<Constraint>,
    strict: bool,
    alias: Option<String>,
    default: Option<DefaultSpec>,
}

/// Parsed `Field(...)` call.
#[derive(Default)]
struct FieldCall {
    default: Option<DefaultSpec>,
    alias: Option<String>,
    strict: bool,
    constraints: Vec<Constraint>,
}

/// Constraint from a validator, applied once all fields are known.
struct PendingConstraint {
    validator: String,
    fields: Vec<String>,
    constraint: Constraint,
    location: SourceLocation,
}

enum ValidatorDecorator {
    Field { fields: Vec<String>, each_item: bool },
    Model,
}

impl<'a> ModelReader<'a> {
    fn collect_module_scope(&mut self, root: Node) {
        for stmt in self.ctx.statements(root) {
            let (_, definition) = self.ctx.undecorate(stmt);
            match definition.kind() {
                "function_definition" => {
                    if let Some(name) = definition.child_by_field_name("name") {
                        self.functions.insert(self.ctx.node_text(name).to_string());
                    }
                }
                "assignment" => {
                    let (Some(left), Some(right)) = (
                        definition.child_by_field_name("left"),
                        definition.child_by_field_name("right"),
                    ) else {
                        continue;
                    };
                    if left.kind() != "identifier" {
                        continue;
                    }
                    if let Some(value) = self.ctx.eval_literal(right, &self.constants) {
                        self.constants
                            .insert(self.ctx.node_text(left).to_string(), value);
                    }
                }
                _ => {}
            }
        }
    }

    fn is_model_base(&self, base: &str) -> bool {
        self.options.root_bases.iter().any(|b| b == base) || self.graph.model(base).is_some()
    }

    fn read_class(&mut self, node: Node) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let name_node = node
            .child_by_field_name("name")
            .ok_or_else(|| ctx.error(node, "class_definition has no name"))?;
        let name = ctx.node_text(name_node).to_string();
        let body = node
            .child_by_field_name("body")
            .ok_or_else(|| ctx.error(node, format!("class `{name}` has no body")))?;

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            for arg in ctx.children(superclasses) {
                if arg.kind() == "keyword_argument" {
                    continue;
                }
                let base = ctx.simple_name(arg).ok_or_else(|| {
                    ctx.error(arg, format!("unsupported base `{}`", ctx.node_text(arg)))
                })?;
                bases.push(base);
            }
        }

        if bases.iter().any(|b| ENUM_BASES.contains(&b.as_str())) {
            let definition = self.read_enum(&name, node, body)?;
            for member in &definition.members {
                self.constants
                    .insert(format!("{name}.{}", member.name), member.value.clone());
            }
            self.graph.enums.push(definition);
            return Ok(());
        }

        if !bases.iter().any(|b| self.is_model_base(b)) {
            tracing::debug!(class = %name, ?bases, "skipping class that is not a model");
            return Ok(());
        }
        if let Some(unknown) = bases.iter().find(|b| !self.is_model_base(b)) {
            return Err(ctx.error(
                node,
                format!("model `{name}` derives from `{unknown}`, which is neither a root base nor a model of this file"),
            ));
        }

        let model = self.read_model(name, bases, node, body)?;
        self.graph.models.push(model);
        Ok(())
    }

    fn read_enum(
        &self,
        name: &str,
        node: Node,
        body: Node,
    ) -> Result<EnumDefinition, TranslateError> {
        let ctx = self.ctx;
        let mut members = Vec::new();
        for stmt in ctx.statements(body) {
            if stmt.kind() != "assignment" {
                continue;
            }
            let (Some(left), Some(right)) = (
                stmt.child_by_field_name("left"),
                stmt.child_by_field_name("right"),
            ) else {
                continue;
            };
            let member = ctx.node_text(left);
            if left.kind() != "identifier" || member.starts_with('_') {
                continue;
            }
            let value = ctx.eval_literal(right, &self.constants).ok_or_else(|| {
                ctx.error(
                    right,
                    format!(
                        "enum member `{name}.{member}` must have a literal value, got `{}`",
                        ctx.node_text(right)
                    ),
                )
            })?;
            members.push(EnumMember {
                name: member.to_string(),
                value,
            });
        }
        Ok(EnumDefinition {
            name: name.to_string(),
            members,
            location: ctx.location(node),
        })
    }

    fn read_model(
        &self,
        name: String,
        bases: Vec<String>,
        node: Node,
        body: Node,
    ) -> Result<ModelDefinition, TranslateError> {
        let ctx = self.ctx;
        let mut model = ModelDefinition {
            name,
            bases: bases.clone(),
            docs: ctx.docstring(body),
            fields: Vec::new(),
            validators: Vec::new(),
            forbid_extra: false,
            location: ctx.location(node),
        };

        for base in &bases {
            if let Some(parent) = self.graph.model(base) {
                for field in &parent.fields {
                    match model.fields.iter_mut().find(|f| f.name == field.name) {
                        Some(existing) => *existing = field.clone(),
                        None => model.fields.push(field.clone()),
                    }
                }
                model.validators.extend(parent.validators.iter().cloned());
                model.forbid_extra |= parent.forbid_extra;
            }
        }

        let mut pending = Vec::new();
        for stmt in ctx.statements(body) {
            let (decorators, definition) = ctx.undecorate(stmt);
            match definition.kind() {
                "assignment" => self.read_body_assignment(&mut model, &mut pending, definition)?,
                "function_definition" => {
                    self.read_method(&mut model, &mut pending, &decorators, definition)?
                }
                "class_definition" => {
                    let is_config = definition
                        .child_by_field_name("name")
                        .is_some_and(|n| ctx.node_text(n) == "Config");
                    if is_config {
                        if let Some(config_body) = definition.child_by_field_name("body") {
                            self.read_config_class(&mut model, config_body)?;
                        }
                    }
                }
                _ => {}
            }
        }

        for PendingConstraint {
            validator,
            fields,
            constraint,
            location,
        } in pending
        {
            let targets: Vec<String> = if fields.iter().any(|f| f == "*") {
                model.fields.iter().map(|f| f.name.clone()).collect()
            } else {
                fields
            };
            for target in targets {
                let field = model
                    .fields
                    .iter_mut()
                    .find(|f| f.name == target)
                    .ok_or_else(|| {
                        TranslateError::parse(
                            location.clone(),
                            format!(
                                "validator `{validator}` names field `{target}`, which model `{}` does not define",
                                model.name
                            ),
                        )
                    })?;
                field.constraints.push(constraint.clone());
            }
        }

        Ok(model)
    }

    fn read_body_assignment(
        &self,
        model: &mut ModelDefinition,
        pending: &mut Vec<PendingConstraint>,
        node: Node,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let Some(left) = node.child_by_field_name("left") else {
            return Ok(());
        };
        if left.kind() != "identifier" {
            return Ok(());
        }
        let name = ctx.node_text(left);
        let right = node.child_by_field_name("right");

        if let Some(type_node) = node.child_by_field_name("type") {
            if name.starts_with('_') || self.is_class_var(type_node) {
                return Ok(());
            }
            let field = self.read_field(&model.name, name, node, type_node, right)?;
            match model.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field,
                None => model.fields.push(field),
            }
            return Ok(());
        }

        let Some(right) = right else {
            return Ok(());
        };
        if name == "model_config" {
            return self.read_model_config(model, right);
        }
        if let Some(reuse) = self.read_reuse_validator(right)? {
            pending.push(reuse);
        }
        Ok(())
    }

    fn is_class_var(&self, type_node: Node) -> bool {
        let node = self.ctx.unwrap_expr(type_node);
        let head = match node.kind() {
            "generic_type" => node.named_child(0),
            "subscript" => node.child_by_field_name("value"),
            _ => Some(node),
        };
        head.and_then(|h| self.ctx.simple_name(h))
            .is_some_and(|n| n == "ClassVar")
    }

    fn read_field(
        &self,
        model: &str,
        name: &str,
        node: Node,
        type_node: Node,
        value: Option<Node>,
    ) -> Result<Field, TranslateError> {
        let ctx = self.ctx;
        let annotation = self.read_annotation(model, name, type_node, true)?;
        let ty = annotation
            .ty
            .ok_or_else(|| ctx.error(type_node, format!("field `{model}.{name}` has no type")))?;
        let mut constraints = annotation.constraints;
        let mut strict = annotation.strict;
        let mut alias = annotation.alias;
        let mut default = annotation.default.unwrap_or(DefaultSpec::Missing);

        if let Some(value) = value {
            let value = ctx.unwrap_expr(value);
            match self.field_call_name(value).as_deref() {
                Some("Field") => {
                    let call = self.read_field_call(model, name, value)?;
                    if let Some(d) = call.default {
                        default = d;
                    }
                    alias = call.alias.or(alias);
                    strict |= call.strict;
                    constraints.extend(call.constraints);
                }
                _ => default = self.read_default(model, name, value)?,
            }
        }

        Ok(Field {
            name: name.to_string(),
            alias,
            ty,
            strict,
            default,
            constraints,
            location: ctx.location(node),
        })
    }

    fn field_call_name(&self, node: Node) -> Option<String> {
        let (function, _) = self.ctx.call_parts(node)?;
        self.ctx.simple_name(function)
    }

    fn read_default(
        &self,
        model: &str,
        field: &str,
        node: Node,
    ) -> Result<DefaultSpec, TranslateError> {
        let ctx = self.ctx;
        let node = ctx.unwrap_expr(node);
        if node.kind() == "ellipsis" {
            return Ok(DefaultSpec::Required);
        }
        match ctx.eval_literal(node, &self.constants) {
            Some(value) => Ok(DefaultSpec::Value(value)),
            None => Err(TranslateError::UnsupportedDefault {
                location: ctx.location(node),
                model: model.to_string(),
                field: field.to_string(),
                expression: ctx.node_text(node).to_string(),
                reason: "default is not a literal".into(),
            }),
        }
    }

    fn read_field_call(
        &self,
        model: &str,
        field: &str,
        node: Node,
    ) -> Result<FieldCall, TranslateError> {
        let ctx = self.ctx;
        let Some((_, args)) = ctx.call_parts(node) else {
            return Ok(FieldCall::default());
        };
        let mut call = FieldCall::default();
        let mut positional = 0;
        for arg in args {
            match arg {
                Argument::Positional(value) => {
                    if positional > 0 {
                        return Err(ctx.error(value, "Field takes at most one positional argument"));
                    }
                    positional += 1;
                    call.default = Some(self.read_default(model, field, value)?);
                }
                Argument::Keyword(keyword, value) => match keyword.as_str() {
                    "default" => call.default = Some(self.read_default(model, field, value)?),
                    "default_factory" => {
                        return Err(TranslateError::UnsupportedDefault {
                            location: ctx.location(value),
                            model: model.to_string(),
                            field: field.to_string(),
                            expression: ctx.node_text(value).to_string(),
                            reason: "default factories are not evaluated".into(),
                        });
                    }
                    "alias" | "validation_alias" => match ctx.eval_literal(value, &self.constants) {
                        Some(Value::String(alias)) => call.alias = Some(alias),
                        _ => return Err(ctx.error(value, "`alias` needs a string literal")),
                    },
                    "strict" => call.strict = self.read_bool(value, "strict")?,
                    kw if IGNORED_FIELD_KEYWORDS.contains(&kw) => {}
                    kw => match constraint_from_keyword(&ctx, kw, value, &self.constants)? {
                        Some(kind) => call.constraints.push(Constraint::Inline(InlineConstraint {
                            kind,
                            location: ctx.location(value),
                        })),
                        None => {
                            return Err(ctx.error(
                                value,
                                format!("unsupported keyword `{kw}` in Field for `{model}.{field}`"),
                            ));
                        }
                    },
                },
                Argument::DictSplat(n) | Argument::ListSplat(n) => {
                    return Err(ctx.error(n, "splat arguments are not supported in Field"));
                }
            }
        }
        Ok(call)
    }

    fn read_bool(&self, node: Node, keyword: &str) -> Result<bool, TranslateError> {
        match self.ctx.eval_literal(node, &self.constants) {
            Some(Value::Bool(b)) => Ok(b),
            _ => Err(self.ctx.error(node, format!("`{keyword}` needs True or False"))),
        }
    }

    /// Parse a type annotation. With `hoist`, constraints found at the top
    /// (and under `Optional`) are returned for the field; otherwise they stay
    /// attached to the type.
    fn read_annotation(
        &self,
        model: &str,
        field: &str,
        node: Node,
        hoist: bool,
    ) -> Result<Annotation, TranslateError> {
        let ctx = self.ctx;
        let node = ctx.unwrap_expr(node);
        let mut annotation = match node.kind() {
            "identifier" | "attribute" | "member_type" => Annotation {
                ty: Some(TypeExpr::Name(self.type_name(node))),
                ..Annotation::default()
            },
            "none" => Annotation {
                ty: Some(TypeExpr::None),
                ..Annotation::default()
            },
            "ellipsis" => Annotation {
                ty: Some(TypeExpr::Ellipsis),
                ..Annotation::default()
            },
            "string" => match ctx.eval_literal(node, &Bindings::new()) {
                Some(Value::String(forward)) => Annotation {
                    ty: Some(TypeExpr::Name(forward.trim().to_string())),
                    ..Annotation::default()
                },
                _ => return Err(ctx.error(node, "unsupported string annotation")),
            },
            "binary_operator" | "union_type" => {
                let mut members = Vec::new();
                self.collect_union(node, &mut members);
                self.read_union(model, field, &members, hoist)?
            }
            "generic_type" | "subscript" => self.read_generic(model, field, node, hoist)?,
            "call" => self.read_constrained_call(model, field, node)?,
            _ => {
                return Err(ctx.error(
                    node,
                    format!("unsupported annotation `{}`", ctx.node_text(node)),
                ));
            }
        };

        if !hoist && !annotation.constraints.is_empty() {
            let inner = annotation.ty.take().unwrap_or(TypeExpr::None);
            annotation.ty = Some(TypeExpr::Constrained {
                inner: Box::new(inner),
                constraints: std::mem::take(&mut annotation.constraints),
            });
        }
        Ok(annotation)
    }

    fn type_name(&self, node: Node) -> String {
        self.ctx.simple_name(node).unwrap_or_else(|| {
            let text = self.ctx.node_text(node);
            text.rsplit('.').next().unwrap_or(text).trim().to_string()
        })
    }

    fn collect_union<'t>(&self, node: Node<'t>, out: &mut Vec<Node<'t>>) {
        let node = self.ctx.unwrap_expr(node);
        match node.kind() {
            "binary_operator" => {
                let is_pipe = node
                    .child_by_field_name("operator")
                    .is_some_and(|op| self.ctx.node_text(op) == "|");
                if let (true, Some(left), Some(right)) = (
                    is_pipe,
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) {
                    self.collect_union(left, out);
                    self.collect_union(right, out);
                } else {
                    out.push(node);
                }
            }
            "union_type" => {
                for child in self.ctx.children(node) {
                    self.collect_union(child, out);
                }
            }
            _ => out.push(node),
        }
    }

    /// Members of a union; constraints hoist through `X | None`.
    fn read_union(
        &self,
        model: &str,
        field: &str,
        members: &[Node],
        hoist: bool,
    ) -> Result<Annotation, TranslateError> {
        let non_none = members
            .iter()
            .filter(|m| self.ctx.unwrap_expr(**m).kind() != "none")
            .count();
        let mut result = Annotation::default();
        let mut types = Vec::new();
        for member in members {
            let inner = self.read_annotation(model, field, *member, hoist && non_none == 1)?;
            result.constraints.extend(inner.constraints);
            result.strict |= inner.strict;
            result.alias = result.alias.or(inner.alias);
            types.extend(inner.ty);
        }
        result.ty = Some(TypeExpr::Union(types));
        Ok(result)
    }

    fn generic_parts<'t>(&self, node: Node<'t>) -> (Option<Node<'t>>, Vec<Node<'t>>) {
        let ctx = self.ctx;
        if node.kind() == "subscript" {
            let mut cursor = node.walk();
            let args = node
                .children_by_field_name("subscript", &mut cursor)
                .collect();
            return (node.child_by_field_name("value"), args);
        }
        let mut head = None;
        let mut args = Vec::new();
        for child in ctx.children(node) {
            if child.kind() == "type_parameter" {
                args.extend(ctx.children(child));
            } else if head.is_none() {
                head = Some(child);
            }
        }
        (head, args)
    }

    fn read_generic(
        &self,
        model: &str,
        field: &str,
        node: Node,
        hoist: bool,
    ) -> Result<Annotation, TranslateError> {
        let ctx = self.ctx;
        let (head, args) = self.generic_parts(node);
        let head = head.ok_or_else(|| ctx.error(node, "generic type without a name"))?;
        let name = self.type_name(head);

        match name.clone().as_str() {
            "Optional" => {
                let [inner] = args.as_slice() else {
                    return Err(ctx.error(node, "Optional takes exactly one argument"));
                };
                let mut annotation = self.read_annotation(model, field, *inner, hoist)?;
                annotation.ty = annotation.ty.map(|ty| TypeExpr::Generic {
                    name,
                    args: vec![ty],
                });
                Ok(annotation)
            }
            "Union" => self.read_union(model, field, &args, hoist),
            "Literal" => {
                let values = args
                    .iter()
                    .map(|arg| {
                        ctx.eval_literal(*arg, &self.constants).ok_or_else(|| {
                            ctx.error(*arg, format!("Literal member `{}` is not a literal", ctx.node_text(*arg)))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Annotation {
                    ty: Some(TypeExpr::Literal(values)),
                    ..Annotation::default()
                })
            }
            "Annotated" => {
                let Some((first, metadata)) = args.split_first() else {
                    return Err(ctx.error(node, "Annotated needs a type argument"));
                };
                let mut annotation = self.read_annotation(model, field, *first, true)?;
                for meta in metadata {
                    self.read_annotated_metadata(model, field, *meta, &mut annotation)?;
                }
                Ok(annotation)
            }
            _ => {
                let args = args
                    .iter()
                    .map(|arg| {
                        self.read_annotation(model, field, *arg, false)
                            .map(|a| a.ty.unwrap_or(TypeExpr::None))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Annotation {
                    ty: Some(TypeExpr::Generic { name, args }),
                    ..Annotation::default()
                })
            }
        }
    }

    fn read_annotated_metadata(
        &self,
        model: &str,
        field: &str,
        node: Node,
        annotation: &mut Annotation,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let node = ctx.unwrap_expr(node);
        match node.kind() {
            "identifier" | "attribute" => {
                let name = self.type_name(node);
                annotation.constraints.push(Constraint::Rule(RuleReference {
                    name,
                    location: ctx.location(node),
                }));
                Ok(())
            }
            "call" => {
                let callee = self.field_call_name(node).unwrap_or_default();
                match callee.as_str() {
                    "Field" => {
                        let call = self.read_field_call(model, field, node)?;
                        annotation.default = call.default.or(annotation.default.take());
                        annotation.alias = call.alias.or(annotation.alias.take());
                        annotation.strict |= call.strict;
                        annotation.constraints.extend(call.constraints);
                        Ok(())
                    }
                    "Strict" => {
                        annotation.strict = true;
                        Ok(())
                    }
                    "AfterValidator" => {
                        let Some((_, args)) = ctx.call_parts(node) else {
                            return Ok(());
                        };
                        let Some(Argument::Positional(target)) = args.into_iter().next() else {
                            return Err(ctx.error(node, "AfterValidator needs a function"));
                        };
                        annotation.constraints.push(self.hook_or_rule(target, false)?);
                        Ok(())
                    }
                    "BeforeValidator" | "WrapValidator" | "PlainValidator" => Err(ctx.error(
                        node,
                        format!("`{callee}` runs before coercion and cannot be translated"),
                    )),
                    _ => Err(ctx.error(
                        node,
                        format!("unsupported Annotated metadata `{}`", ctx.node_text(node)),
                    )),
                }
            }
            _ => Err(ctx.error(
                node,
                format!("unsupported Annotated metadata `{}`", ctx.node_text(node)),
            )),
        }
    }

    /// A module function of this file is a local hook; any other name refers
    /// to a common rule.
    fn hook_or_rule(&self, target: Node, each_item: bool) -> Result<Constraint, TranslateError> {
        let ctx = self.ctx;
        let name = ctx.simple_name(target).ok_or_else(|| {
            ctx.error(target, format!("validator target `{}` is not a name", ctx.node_text(target)))
        })?;
        let location = ctx.location(target);
        if ctx.dotted_name(target).as_deref() == Some(name.as_str()) && self.functions.contains(&name) {
            Ok(Constraint::Inline(InlineConstraint {
                kind: ConstraintKind::Hook(Hook {
                    key: name.clone(),
                    name,
                    each_item,
                }),
                location,
            }))
        } else {
            Ok(Constraint::Rule(RuleReference { name, location }))
        }
    }

    fn read_constrained_call(
        &self,
        model: &str,
        field: &str,
        node: Node,
    ) -> Result<Annotation, TranslateError> {
        let ctx = self.ctx;
        let (function, args) = ctx
            .call_parts(node)
            .ok_or_else(|| ctx.error(node, "malformed call in annotation"))?;
        let callee = ctx.simple_name(function).unwrap_or_default();
        let base = match callee.as_str() {
            "constr" => Some("str"),
            "conint" => Some("int"),
            "confloat" => Some("float"),
            "conbytes" | "condecimal" | "condate" => None,
            "conlist" | "conset" | "confrozenset" => None,
            _ => {
                return Err(ctx.error(
                    node,
                    format!("unsupported annotation `{}`", ctx.node_text(node)),
                ));
            }
        };

        let mut annotation = Annotation::default();
        let mut item = None;
        for arg in args {
            match arg {
                Argument::Positional(value) if item.is_none() && base.is_none() => {
                    item = Some(self.read_annotation(model, field, value, false)?);
                }
                Argument::Keyword(keyword, value) => match keyword.as_str() {
                    "strict" => annotation.strict = self.read_bool(value, "strict")?,
                    "item_type" if base.is_none() => {
                        item = Some(self.read_annotation(model, field, value, false)?)
                    }
                    kw => match constraint_from_keyword(&ctx, kw, value, &self.constants)? {
                        Some(kind) => annotation.constraints.push(Constraint::Inline(
                            InlineConstraint {
                                kind,
                                location: ctx.location(value),
                            },
                        )),
                        None => {
                            return Err(ctx.error(
                                value,
                                format!("unsupported keyword `{kw}` in `{callee}` for `{model}.{field}`"),
                            ));
                        }
                    },
                },
                Argument::Positional(n) | Argument::DictSplat(n) | Argument::ListSplat(n) => {
                    return Err(ctx.error(n, format!("unsupported argument to `{callee}`")));
                }
            }
        }

        annotation.ty = Some(match (base, callee.as_str()) {
            (Some(base), _) => TypeExpr::Name(base.to_string()),
            (None, "conlist" | "conset" | "confrozenset") => {
                let item = item
                    .and_then(|i| i.ty)
                    .ok_or_else(|| ctx.error(node, format!("`{callee}` needs an item type")))?;
                let name = if callee == "conlist" { "List" } else { "Set" };
                TypeExpr::Generic {
                    name: name.to_string(),
                    args: vec![item],
                }
            }
            _ => TypeExpr::Name(callee.clone()),
        });
        Ok(annotation)
    }

    fn read_method(
        &self,
        model: &mut ModelDefinition,
        pending: &mut Vec<PendingConstraint>,
        decorators: &[Node],
        node: Node,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let Some(name) = node.child_by_field_name("name").map(|n| ctx.node_text(n)) else {
            return Ok(());
        };
        for decorator in decorators {
            match self.read_validator_decorator(*decorator)? {
                Some(ValidatorDecorator::Field { fields, each_item }) => {
                    let location = ctx.location(*decorator);
                    pending.push(PendingConstraint {
                        validator: name.to_string(),
                        fields,
                        constraint: Constraint::Inline(InlineConstraint {
                            kind: ConstraintKind::Hook(Hook {
                                name: name.to_string(),
                                key: format!("{}.{}", model.name, name),
                                each_item,
                            }),
                            location: location.clone(),
                        }),
                        location,
                    });
                }
                Some(ValidatorDecorator::Model) => model.validators.push(ModelValidator {
                    name: name.to_string(),
                    location: ctx.location(*decorator),
                }),
                None => {}
            }
        }
        Ok(())
    }

    fn read_validator_decorator(
        &self,
        node: Node,
    ) -> Result<Option<ValidatorDecorator>, TranslateError> {
        let ctx = self.ctx;
        let (callee, args) = match ctx.call_parts(node) {
            Some((function, args)) => (ctx.simple_name(function), args),
            None => (ctx.simple_name(node), Vec::new()),
        };
        let Some(callee) = callee else {
            return Ok(None);
        };

        match callee.as_str() {
            "validator" | "field_validator" => {
                let (fields, each_item) = self.read_validator_args(&callee, node, &args)?;
                Ok(Some(ValidatorDecorator::Field { fields, each_item }))
            }
            "root_validator" | "model_validator" => {
                for arg in &args {
                    if let Argument::Keyword(keyword, value) = arg {
                        self.reject_pre_coercion(&callee, keyword, *value)?;
                    }
                }
                Ok(Some(ValidatorDecorator::Model))
            }
            _ => Ok(None),
        }
    }

    fn reject_pre_coercion(
        &self,
        callee: &str,
        keyword: &str,
        value: Node,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let literal = ctx.eval_literal(value, &self.constants);
        let pre = match (keyword, &literal) {
            ("pre", Some(Value::Bool(true))) => true,
            ("mode", Some(Value::String(mode))) => mode != "after",
            _ => false,
        };
        if pre {
            return Err(ctx.error(
                value,
                format!(
                    "`{callee}` with `{keyword}={}` runs before coercion and cannot be translated",
                    ctx.node_text(value)
                ),
            ));
        }
        Ok(())
    }

    fn read_validator_args(
        &self,
        callee: &str,
        node: Node,
        args: &[Argument],
    ) -> Result<(Vec<String>, bool), TranslateError> {
        let ctx = self.ctx;
        let mut fields = Vec::new();
        let mut each_item = false;
        for arg in args {
            match arg {
                Argument::Positional(value) => match ctx.eval_literal(*value, &self.constants) {
                    Some(Value::String(field)) => fields.push(field),
                    _ => return Err(ctx.error(*value, format!("`{callee}` field names must be string literals"))),
                },
                Argument::Keyword(keyword, value) => {
                    self.reject_pre_coercion(callee, keyword, *value)?;
                    if keyword == "each_item" {
                        each_item = self.read_bool(*value, "each_item")?;
                    }
                }
                Argument::DictSplat(n) | Argument::ListSplat(n) => {
                    return Err(ctx.error(*n, format!("splat arguments are not supported in `{callee}`")));
                }
            }
        }
        if fields.is_empty() {
            return Err(ctx.error(node, format!("`{callee}` names no fields")));
        }
        Ok((fields, each_item))
    }

    /// `_x = validator("a", allow_reuse=True)(f)`.
    fn read_reuse_validator(
        &self,
        node: Node,
    ) -> Result<Option<PendingConstraint>, TranslateError> {
        let ctx = self.ctx;
        let Some((inner, outer_args)) = ctx.call_parts(ctx.unwrap_expr(node)) else {
            return Ok(None);
        };
        let Some((function, args)) = ctx.call_parts(inner) else {
            return Ok(None);
        };
        let callee = ctx.simple_name(function).unwrap_or_default();
        if !matches!(callee.as_str(), "validator" | "field_validator") {
            return Ok(None);
        }
        let (fields, each_item) = self.read_validator_args(&callee, inner, &args)?;
        let Some(Argument::Positional(target)) = outer_args.into_iter().next() else {
            return Err(ctx.error(node, format!("`{callee}(...)` must be applied to a function")));
        };
        Ok(Some(PendingConstraint {
            validator: ctx.node_text(target).to_string(),
            fields,
            constraint: self.hook_or_rule(target, each_item)?,
            location: ctx.location(node),
        }))
    }

    fn read_config_class(
        &self,
        model: &mut ModelDefinition,
        body: Node,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        for stmt in ctx.statements(body) {
            if stmt.kind() != "assignment" {
                continue;
            }
            let (Some(left), Some(right)) = (
                stmt.child_by_field_name("left"),
                stmt.child_by_field_name("right"),
            ) else {
                continue;
            };
            if ctx.node_text(left) == "extra" {
                model.forbid_extra = self.read_extra_policy(right)?;
            }
        }
        Ok(())
    }

    fn read_model_config(
        &self,
        model: &mut ModelDefinition,
        node: Node,
    ) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let node = ctx.unwrap_expr(node);
        if let Some((_, args)) = ctx.call_parts(node) {
            for arg in args {
                if let Argument::Keyword(keyword, value) = arg {
                    if keyword == "extra" {
                        model.forbid_extra = self.read_extra_policy(value)?;
                    }
                }
            }
            return Ok(());
        }
        if node.kind() == "dictionary" {
            for pair in ctx.children(node) {
                let (Some(key), Some(value)) = (
                    pair.child_by_field_name("key"),
                    pair.child_by_field_name("value"),
                ) else {
                    continue;
                };
                if ctx.eval_literal(key, &self.constants) == Some(Value::String("extra".into())) {
                    model.forbid_extra = self.read_extra_policy(value)?;
                }
            }
        }
        Ok(())
    }

    /// `"forbid"` or `Extra.forbid`.
    fn read_extra_policy(&self, node: Node) -> Result<bool, TranslateError> {
        let ctx = self.ctx;
        let policy = match ctx.eval_literal(node, &self.constants) {
            Some(Value::String(policy)) => policy,
            _ => self.type_name(ctx.unwrap_expr(node)),
        };
        match policy.as_str() {
            "forbid" => Ok(true),
            "allow" | "ignore" => Ok(false),
            other => Err(ctx.error(node, format!("unknown extra policy `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn parse(source: &str) -> SchemaGraph {
        parse_models(source, "models.py", &ParseOptions::default()).unwrap()
    }

    fn parse_err(source: &str) -> TranslateError {
        parse_models(source, "models.py", &ParseOptions::default()).unwrap_err()
    }

    fn kinds(field: &Field) -> Vec<String> {
        field
            .constraints
            .iter()
            .map(|c| match c {
                Constraint::Inline(i) => i.kind.to_string(),
                Constraint::Rule(r) => format!("rule {}", r.name),
            })
            .collect()
    }

    #[test]
    fn reads_fields_defaults_and_constraints() {
        let graph = parse(
            r#"
from pydantic import BaseModel, Field, constr

MAX_NAME = 32

class User(BaseModel):
    """A registered user."""
    id: int
    age: int = Field(..., ge=0, le=150)
    name: constr(min_length=1, max_length=MAX_NAME)
    nick: Optional[str] = None
    tags: List[str] = []
    role: str = "member"
"#,
        );
        let user = graph.model("User").unwrap();
        assert_eq!(user.docs.as_deref(), Some("A registered user."));
        let names: Vec<_> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "age", "name", "nick", "tags", "role"]);

        let age = user.field("age").unwrap();
        assert_eq!(age.default, DefaultSpec::Required);
        assert_eq!(kinds(age), ["ge=0", "le=150"]);

        let name = user.field("name").unwrap();
        assert_eq!(name.ty, TypeExpr::Name("str".into()));
        assert_eq!(kinds(name), ["min_length=1", "max_length=32"]);

        assert_eq!(user.field("id").unwrap().default, DefaultSpec::Missing);
        assert_eq!(user.field("nick").unwrap().default, DefaultSpec::Value(Value::Null));
        assert_eq!(user.field("tags").unwrap().default, DefaultSpec::Value(json!([])));
        assert_eq!(user.field("role").unwrap().default, DefaultSpec::Value(json!("member")));
    }

    #[test]
    fn decorator_hooks_attach_to_fields() {
        let graph = parse(
            r#"
class Order(BaseModel):
    sku: str
    lines: List[str]

    @validator("sku")
    def sku_upper(cls, v):
        return v

    @validator("lines", each_item=True)
    def line_ok(cls, v):
        return v

    @root_validator
    def totals(cls, values):
        return values
"#,
        );
        let order = graph.model("Order").unwrap();
        assert_eq!(kinds(order.field("sku").unwrap()), ["hook Order.sku_upper"]);
        let lines = order.field("lines").unwrap();
        let Constraint::Inline(InlineConstraint {
            kind: ConstraintKind::Hook(hook),
            ..
        }) = &lines.constraints[0]
        else {
            panic!("expected hook");
        };
        assert!(hook.each_item);
        assert_eq!(order.validators[0].name, "totals");
    }

    #[test]
    fn reuse_validator_is_rule_reference_unless_local() {
        let graph = parse(
            r#"
from common import check_email

def local_check(cls, v):
    return v

class Contact(BaseModel):
    email: str
    phone: str
    _email = validator("email", allow_reuse=True)(check_email)
    _phone = validator("phone", allow_reuse=True)(local_check)
"#,
        );
        let contact = graph.model("Contact").unwrap();
        assert_eq!(kinds(contact.field("email").unwrap()), ["rule check_email"]);
        assert_eq!(kinds(contact.field("phone").unwrap()), ["hook local_check"]);
    }

    #[test]
    fn annotated_metadata_and_config() {
        let graph = parse(
            r#"
class Item(BaseModel):
    model_config = ConfigDict(extra="forbid")
    name: Annotated[str, Field(min_length=1), nonempty]
    qty: Annotated[int, Field(gt=0, alias="quantity")] = 1

class Legacy(BaseModel):
    x: int

    class Config:
        extra = Extra.forbid
"#,
        );
        let item = graph.model("Item").unwrap();
        assert!(item.forbid_extra);
        assert_eq!(kinds(item.field("name").unwrap()), ["min_length=1", "rule nonempty"]);
        let qty = item.field("qty").unwrap();
        assert_eq!(qty.json_name(), "quantity");
        assert_eq!(qty.default, DefaultSpec::Value(json!(1)));
        assert!(graph.model("Legacy").unwrap().forbid_extra);
    }

    #[test]
    fn inheritance_and_enums() {
        let graph = parse(
            r#"
class Color(str, Enum):
    RED = "red"
    BLUE = "blue"

class Base(BaseModel):
    id: int

class Child(Base):
    color: Color

class Helper:
    pass
"#,
        );
        assert_eq!(graph.enums[0].members.len(), 2);
        let child = graph.model("Child").unwrap();
        let names: Vec<_> = child.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "color"]);
        assert!(graph.model("Helper").is_none());
    }

    #[test]
    fn nested_constraints_stay_on_type() {
        let graph = parse("class A(BaseModel):\n    xs: List[constr(min_length=1)]\n");
        let xs = graph.model("A").unwrap().field("xs").unwrap();
        assert!(xs.constraints.is_empty());
        let TypeExpr::Generic { args, .. } = &xs.ty else {
            panic!("expected generic");
        };
        assert!(matches!(args[0], TypeExpr::Constrained { .. }));
    }

    #[test]
    fn optional_hoists_constraints() {
        let graph = parse("class A(BaseModel):\n    x: Optional[conint(ge=1)] = None\n");
        let x = graph.model("A").unwrap().field("x").unwrap();
        assert_eq!(kinds(x), ["ge=1"]);
    }

    #[test]
    fn rejections() {
        assert_eq!(
            parse_err("class A(BaseModel):\n    x: int = foo()\n").kind(),
            ErrorKind::UnsupportedDefault
        );
        assert_eq!(
            parse_err("class A(BaseModel):\n    x: List[int] = Field(default_factory=list)\n").kind(),
            ErrorKind::UnsupportedDefault
        );
        assert_eq!(
            parse_err("class A(BaseModel):\n    x: int\n    @validator('x', pre=True)\n    def f(cls, v):\n        return v\n").kind(),
            ErrorKind::ParseError
        );
        assert_eq!(
            parse_err("class A(BaseModel):\n    x: int\n    @validator('y')\n    def f(cls, v):\n        return v\n").kind(),
            ErrorKind::ParseError
        );
        assert_eq!(
            parse_err("class E(Enum):\n    A = auto()\n").kind(),
            ErrorKind::ParseError
        );
        assert_eq!(
            parse_err("class A(BaseModel, Mixin):\n    x: int\n").kind(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn enum_members_are_literal_defaults() {
        let graph = parse("class Level(IntEnum):\n    LOW = 1\n    HIGH = 2\n\nclass A(BaseModel):\n    level: Level = Level.HIGH\n");
        let field = graph.model("A").unwrap().field("level").unwrap();
        assert_eq!(field.default, DefaultSpec::Value(json!(2)));
    }

    #[test]
    fn oversized_integer_bounds_are_out_of_range() {
        for source in [
            "class A(BaseModel):\n    x: int = Field(le=18446744073709551615)\n",
            "class A(BaseModel):\n    x: int = Field(ge=-9223372036854775809)\n",
            "class A(BaseModel):\n    x: str = Field(max_length=99999999999999999999)\n",
        ] {
            let err = parse_err(source);
            assert_eq!(err.kind(), ErrorKind::ParseError);
            assert!(err.to_string().contains("out of range"), "{err}");
        }
        let err = parse_err("class A(BaseModel):\n    x: int = Field(le=limit())\n");
        assert!(err.to_string().contains("needs a literal value"), "{err}");
    }

    #[test]
    fn parsing_is_deterministic() {
        let source = "class A(BaseModel):\n    x: int = Field(ge=1)\n    y: str\n";
        assert_eq!(parse(source), parse(source));
    }
}
