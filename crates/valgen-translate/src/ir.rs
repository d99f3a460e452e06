//! Schema graph produced by the input readers.
//!
//! The model parser builds a [`SchemaGraph`] per source file; the rule reader
//! builds [`RuleDefinition`]s; the test reader builds [`TestCase`]s. Nothing
//! here is mutated after parsing.

use crate::error::SourceLocation;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;

/// All declarations of one model-definition file, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaGraph {
    pub file: String,
    pub models: Vec<ModelDefinition>,
    pub enums: Vec<EnumDefinition>,
}

impl SchemaGraph {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            models: Vec::new(),
            enums: Vec::new(),
        }
    }

    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDefinition> {
        self.enums.iter().find(|e| e.name == name)
    }
}

/// A model class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDefinition {
    pub name: String,
    pub bases: Vec<String>,
    pub docs: Option<String>,
    pub fields: Vec<Field>,
    pub validators: Vec<ModelValidator>,
    /// Unknown input keys are violations (`extra = "forbid"`).
    pub forbid_extra: bool,
    pub location: SourceLocation,
}

impl ModelDefinition {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A typed attribute of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    pub ty: TypeExpr,
    /// `strict=True` or a `Strict*` annotation.
    pub strict: bool,
    pub default: DefaultSpec,
    pub constraints: Vec<Constraint>,
    pub location: SourceLocation,
}

impl Field {
    /// Key under which the field appears in payloads.
    pub fn json_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// What the source says about a field's default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DefaultSpec {
    /// Bare annotation (`x: int`).
    Missing,
    /// Explicitly required (`...` or `Field(...)`).
    Required,
    /// A literal default.
    Value(Value),
}

/// A model-level validator hook, run after every field check passed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelValidator {
    pub name: String,
    pub location: SourceLocation,
}

/// An enumeration class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDefinition {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Value,
}

/// A check attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constraint {
    /// Declared at the field site (or by a hook local to the model file).
    Inline(InlineConstraint),
    /// Named rule from the common rules module.
    Rule(RuleReference),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineConstraint {
    pub kind: ConstraintKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReference {
    pub name: String,
    pub location: SourceLocation,
}

/// Shared rule from the common rules module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub identifier: String,
    pub kinds: Vec<ConstraintKind>,
    pub location: SourceLocation,
}

impl RuleDefinition {
    pub fn describe(&self) -> String {
        self.kinds
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The logic of a single constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstraintKind {
    MinLength(u64),
    MaxLength(u64),
    MinItems(u64),
    MaxItems(u64),
    Ge(Number),
    Gt(Number),
    Le(Number),
    Lt(Number),
    MultipleOf(Number),
    /// `regex=` matches at the start of the value, `pattern=` anywhere.
    Pattern { regex: String, anchored: bool },
    Format { format: StringFormat, each_item: bool },
    Hook(Hook),
}

impl ConstraintKind {
    /// Identifier reported in violations of this constraint.
    pub fn identifier(&self) -> &str {
        match self {
            ConstraintKind::MinLength(_) => "min_length",
            ConstraintKind::MaxLength(_) => "max_length",
            ConstraintKind::MinItems(_) => "min_items",
            ConstraintKind::MaxItems(_) => "max_items",
            ConstraintKind::Ge(_) => "ge",
            ConstraintKind::Gt(_) => "gt",
            ConstraintKind::Le(_) => "le",
            ConstraintKind::Lt(_) => "lt",
            ConstraintKind::MultipleOf(_) => "multiple_of",
            ConstraintKind::Pattern { anchored: true, .. } => "regex",
            ConstraintKind::Pattern { anchored: false, .. } => "pattern",
            ConstraintKind::Format { format, .. } => format.identifier(),
            ConstraintKind::Hook(hook) => &hook.name,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::MinLength(n)
            | ConstraintKind::MaxLength(n)
            | ConstraintKind::MinItems(n)
            | ConstraintKind::MaxItems(n) => write!(f, "{}={}", self.identifier(), n),
            ConstraintKind::Ge(n)
            | ConstraintKind::Gt(n)
            | ConstraintKind::Le(n)
            | ConstraintKind::Lt(n)
            | ConstraintKind::MultipleOf(n) => write!(f, "{}={}", self.identifier(), n),
            ConstraintKind::Pattern { regex, .. } => write!(f, "{}={:?}", self.identifier(), regex),
            ConstraintKind::Format {
                format,
                each_item: false,
            } => f.write_str(format.identifier()),
            ConstraintKind::Format {
                format,
                each_item: true,
            } => write!(f, "each item {}", format.identifier()),
            ConstraintKind::Hook(hook) => write!(f, "hook {}", hook.key),
        }
    }
}

/// A validator hook whose body lives outside the generated code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hook {
    /// Identifier reported in violations.
    pub name: String,
    /// Registration key in the generated runtime.
    pub key: String,
    pub each_item: bool,
}

/// String formats with a dedicated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StringFormat {
    Email,
    Uuid,
    Ip,
    Ipv4,
    Ipv6,
    Cidr,
    Url,
    DateTime,
    Date,
}

impl StringFormat {
    pub fn identifier(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Uuid => "uuid",
            StringFormat::Ip => "ip",
            StringFormat::Ipv4 => "ipv4",
            StringFormat::Ipv6 => "ipv6",
            StringFormat::Cidr => "cidr",
            StringFormat::Url => "url",
            StringFormat::DateTime => "datetime",
            StringFormat::Date => "date",
        }
    }
}

/// A type annotation as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeExpr {
    /// `int`, `User`, `typing.Any` (dotted names keep the last segment).
    Name(String),
    /// `List[int]`, `Optional[User]`, `Dict[str, int]`.
    Generic { name: String, args: Vec<TypeExpr> },
    /// `A | B`.
    Union(Vec<TypeExpr>),
    /// `Literal["a", "b"]`.
    Literal(Vec<Value>),
    None,
    /// The `...` in `Tuple[int, ...]`.
    Ellipsis,
    /// A type carrying its own constraints (`constr(...)`, `Annotated[...]`)
    /// in a position where they cannot be hoisted onto the field.
    Constrained {
        inner: Box<TypeExpr>,
        constraints: Vec<Constraint>,
    },
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Name(name) => f.write_str(name),
            TypeExpr::Generic { name, args } => {
                write!(f, "{name}[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str("]")
            }
            TypeExpr::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
            TypeExpr::Literal(values) => {
                f.write_str("Literal[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            TypeExpr::None => f.write_str("None"),
            TypeExpr::Ellipsis => f.write_str("..."),
            TypeExpr::Constrained { inner, .. } => write!(f, "constrained {inner}"),
        }
    }
}

/// Result of the type mapper: a shape with a defined Go rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeDescriptor {
    Primitive { kind: Primitive, strict: bool },
    Optional(Box<TypeDescriptor>),
    Sequence(Box<TypeDescriptor>),
    Mapping {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    /// Another model of the same file, by source name.
    Reference(String),
    Enum(EnumDescriptor),
}

impl TypeDescriptor {
    pub fn primitive(kind: Primitive) -> Self {
        TypeDescriptor::Primitive {
            kind,
            strict: false,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeDescriptor::Optional(_))
    }

    /// The type without its outer `Optional`.
    pub fn strip_optional(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Optional(inner) => inner.strip_optional(),
            other => other,
        }
    }

    /// Models referenced anywhere inside this type.
    pub fn referenced_models<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeDescriptor::Reference(name) => out.push(name),
            TypeDescriptor::Optional(inner) | TypeDescriptor::Sequence(inner) => {
                inner.referenced_models(out)
            }
            TypeDescriptor::Mapping { value, .. } => value.referenced_models(out),
            TypeDescriptor::Primitive { .. } | TypeDescriptor::Enum(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Primitive {
    String(Option<StringFormat>),
    Integer,
    Float,
    Boolean,
}

/// A closed set of permitted values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDescriptor {
    /// Enum class name; `None` for `Literal[...]`.
    pub name: Option<String>,
    pub kind: EnumKind,
    pub variants: Vec<EnumMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnumKind {
    String,
    Integer,
}

/// One test input taken from the existing test suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub model: String,
    /// Name of the test function the case came from.
    pub test: String,
    pub payload: Map<String, Value>,
    pub expectation: Expectation,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expectation {
    Accept,
    /// `hints` are the `match=` tokens; those naming a constraint identifier
    /// become asserted violations.
    Reject { hints: Vec<String> },
}
