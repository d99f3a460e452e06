//! Type mapper: source annotations to [`TypeDescriptor`]s.

use crate::error::{SourceLocation, TranslateError};
use crate::ir::*;

/// The field a type is mapped for, used in error reports.
#[derive(Debug, Clone, Copy)]
pub struct TypeSite<'a> {
    pub model: &'a str,
    pub field: &'a str,
    pub location: &'a SourceLocation,
}

impl TypeSite<'_> {
    fn unsupported(&self, ty: &TypeExpr, reason: impl Into<String>) -> TranslateError {
        TranslateError::UnsupportedType {
            location: self.location.clone(),
            model: self.model.to_string(),
            field: self.field.to_string(),
            ty: ty.to_string(),
            reason: reason.into(),
        }
    }
}

/// Map a field annotation. `strict` applies to the primitive at the top,
/// looking through `Optional`.
pub fn map_type(
    expr: &TypeExpr,
    graph: &SchemaGraph,
    site: &TypeSite,
    strict: bool,
) -> Result<TypeDescriptor, TranslateError> {
    match expr {
        TypeExpr::Name(name) => map_name(expr, name, graph, site, strict),
        TypeExpr::Generic { name, args } => map_generic(expr, name, args, graph, site, strict),
        TypeExpr::Union(members) => map_union(expr, members, graph, site, strict),
        TypeExpr::Literal(values) => {
            let variants = values
                .iter()
                .map(|value| EnumMember {
                    name: value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string()),
                    value: value.clone(),
                })
                .collect::<Vec<_>>();
            let kind = enum_kind(&variants)
                .ok_or_else(|| site.unsupported(expr, "Literal members must be all strings or all integers"))?;
            Ok(TypeDescriptor::Enum(EnumDescriptor {
                name: None,
                kind,
                variants,
            }))
        }
        TypeExpr::None => Err(site.unsupported(expr, "`None` is only allowed inside Optional")),
        TypeExpr::Ellipsis => Err(site.unsupported(expr, "`...` is only allowed in Tuple[T, ...]")),
        TypeExpr::Constrained { .. } => Err(site.unsupported(
            expr,
            "constraints on nested type arguments cannot be expressed",
        )),
    }
}

fn enum_kind(variants: &[EnumMember]) -> Option<EnumKind> {
    if variants.iter().all(|v| v.value.is_string()) {
        Some(EnumKind::String)
    } else if variants.iter().all(|v| v.value.is_i64()) {
        Some(EnumKind::Integer)
    } else {
        None
    }
}

fn map_name(
    expr: &TypeExpr,
    name: &str,
    graph: &SchemaGraph,
    site: &TypeSite,
    strict: bool,
) -> Result<TypeDescriptor, TranslateError> {
    let primitive = |kind, strict| Ok(TypeDescriptor::Primitive { kind, strict });
    let format = |format| primitive(Primitive::String(Some(format)), false);
    match name {
        "str" => primitive(Primitive::String(None), strict),
        "StrictStr" => primitive(Primitive::String(None), true),
        "int" => primitive(Primitive::Integer, strict),
        "StrictInt" => primitive(Primitive::Integer, true),
        "float" => primitive(Primitive::Float, strict),
        "StrictFloat" => primitive(Primitive::Float, true),
        "bool" => primitive(Primitive::Boolean, strict),
        "StrictBool" => primitive(Primitive::Boolean, true),
        "EmailStr" | "NameEmail" => format(StringFormat::Email),
        "UUID" | "UUID1" | "UUID3" | "UUID4" | "UUID5" => format(StringFormat::Uuid),
        "IPvAnyAddress" => format(StringFormat::Ip),
        "IPv4Address" => format(StringFormat::Ipv4),
        "IPv6Address" => format(StringFormat::Ipv6),
        "IPvAnyNetwork" | "IPv4Network" | "IPv6Network" => format(StringFormat::Cidr),
        "AnyUrl" | "AnyHttpUrl" | "HttpUrl" => format(StringFormat::Url),
        "datetime" => format(StringFormat::DateTime),
        "date" => format(StringFormat::Date),
        "dict" | "Dict" => Ok(TypeDescriptor::Mapping {
            key: Box::new(TypeDescriptor::primitive(Primitive::String(None))),
            value: Box::new(TypeDescriptor::primitive(Primitive::String(None))),
        }),
        "Any" => Err(site.unsupported(expr, "`Any` has no typed rendering")),
        _ => {
            if graph.model(name).is_some() {
                return Ok(TypeDescriptor::Reference(name.to_string()));
            }
            if let Some(definition) = graph.enumeration(name) {
                if definition.members.is_empty() {
                    return Err(TranslateError::EmptyEnum {
                        location: site.location.clone(),
                        name: name.to_string(),
                        model: site.model.to_string(),
                        field: site.field.to_string(),
                    });
                }
                let kind = enum_kind(&definition.members).ok_or_else(|| {
                    site.unsupported(expr, "enum values must be all strings or all integers")
                })?;
                return Ok(TypeDescriptor::Enum(EnumDescriptor {
                    name: Some(name.to_string()),
                    kind,
                    variants: definition.members.clone(),
                }));
            }
            Err(site.unsupported(expr, format!("`{name}` is not a known type or a model of this file")))
        }
    }
}

fn map_generic(
    expr: &TypeExpr,
    name: &str,
    args: &[TypeExpr],
    graph: &SchemaGraph,
    site: &TypeSite,
    strict: bool,
) -> Result<TypeDescriptor, TranslateError> {
    match (name, args) {
        ("Optional", [inner]) => {
            let inner = map_type(inner, graph, site, strict)?;
            Ok(optional(inner))
        }
        ("Union", members) => map_union(expr, members, graph, site, strict),
        (
            "List" | "list" | "Set" | "set" | "FrozenSet" | "frozenset" | "Sequence" | "Iterable",
            [item],
        ) => Ok(TypeDescriptor::Sequence(Box::new(map_type(
            item, graph, site, false,
        )?))),
        ("Tuple" | "tuple", [item, TypeExpr::Ellipsis]) => Ok(TypeDescriptor::Sequence(Box::new(
            map_type(item, graph, site, false)?,
        ))),
        ("Tuple" | "tuple", _) => Err(site.unsupported(
            expr,
            "only homogeneous tuples (Tuple[T, ...]) are supported",
        )),
        ("Dict" | "dict" | "Mapping", [key, value]) => {
            let key = map_type(key, graph, site, false)?;
            if !matches!(
                key,
                TypeDescriptor::Primitive {
                    kind: Primitive::String(None),
                    ..
                }
            ) {
                return Err(site.unsupported(expr, "mapping keys must be `str`"));
            }
            Ok(TypeDescriptor::Mapping {
                key: Box::new(key),
                value: Box::new(map_type(value, graph, site, false)?),
            })
        }
        _ => Err(site.unsupported(
            expr,
            format!("`{name}` with {} argument(s) has no typed rendering", args.len()),
        )),
    }
}

fn map_union(
    expr: &TypeExpr,
    members: &[TypeExpr],
    graph: &SchemaGraph,
    site: &TypeSite,
    strict: bool,
) -> Result<TypeDescriptor, TranslateError> {
    let has_none = members.iter().any(|m| *m == TypeExpr::None);
    let rest: Vec<_> = members.iter().filter(|m| **m != TypeExpr::None).collect();
    let [only] = rest.as_slice() else {
        return Err(site.unsupported(expr, "unions of several non-None types are not supported"));
    };
    let inner = map_type(only, graph, site, strict)?;
    Ok(if has_none { optional(inner) } else { inner })
}

fn optional(inner: TypeDescriptor) -> TypeDescriptor {
    if inner.is_optional() {
        inner
    } else {
        TypeDescriptor::Optional(Box::new(inner))
    }
}

/// Fail with `UnsupportedType` when a constraint cannot apply to a field of
/// type `ty`.
pub fn check_applicable(
    kind: &ConstraintKind,
    ty: &TypeDescriptor,
    site: &TypeSite,
    source: &TypeExpr,
) -> Result<(), TranslateError> {
    let base = ty.strip_optional();
    let is_string = matches!(base, TypeDescriptor::Primitive { kind: Primitive::String(_), .. });
    let is_number = matches!(
        base,
        TypeDescriptor::Primitive {
            kind: Primitive::Integer | Primitive::Float,
            ..
        }
    );
    let is_sequence = matches!(base, TypeDescriptor::Sequence(_));
    let is_mapping = matches!(base, TypeDescriptor::Mapping { .. });

    let applicable = match kind {
        ConstraintKind::MinLength(_) | ConstraintKind::MaxLength(_) => {
            is_string || is_sequence || is_mapping
        }
        ConstraintKind::MinItems(_) | ConstraintKind::MaxItems(_) => is_sequence,
        ConstraintKind::Ge(_) | ConstraintKind::Gt(_) | ConstraintKind::Le(_) | ConstraintKind::Lt(_) => {
            is_number
        }
        ConstraintKind::MultipleOf(n) => {
            if n.as_f64() == Some(0.0) {
                return Err(site.unsupported(source, "`multiple_of` must not be zero"));
            }
            is_number
        }
        ConstraintKind::Pattern { regex, .. } => {
            if let Err(err) = regex::Regex::new(regex) {
                return Err(site.unsupported(
                    source,
                    format!("pattern {regex:?} is not supported by the target regex engine: {err}"),
                ));
            }
            is_string
        }
        ConstraintKind::Format {
            each_item: false, ..
        } => is_string,
        ConstraintKind::Format {
            each_item: true, ..
        } => matches!(
            base,
            TypeDescriptor::Sequence(item)
                if matches!(**item, TypeDescriptor::Primitive { kind: Primitive::String(_), .. })
        ),
        ConstraintKind::Hook(hook) => !hook.each_item || is_sequence || is_mapping,
    };

    if applicable {
        Ok(())
    } else {
        Err(site.unsupported(
            source,
            format!("constraint `{kind}` does not apply to this type"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn graph() -> SchemaGraph {
        let location = SourceLocation::new("models.py", 1, 1);
        let mut graph = SchemaGraph::new("models.py");
        graph.models.push(ModelDefinition {
            name: "Address".into(),
            bases: vec!["BaseModel".into()],
            docs: None,
            fields: vec![],
            validators: vec![],
            forbid_extra: false,
            location: location.clone(),
        });
        graph.enums.push(EnumDefinition {
            name: "Color".into(),
            members: vec![EnumMember {
                name: "RED".into(),
                value: json!("red"),
            }],
            location: location.clone(),
        });
        graph.enums.push(EnumDefinition {
            name: "Nothing".into(),
            members: vec![],
            location,
        });
        graph
    }

    fn name(n: &str) -> TypeExpr {
        TypeExpr::Name(n.into())
    }

    fn generic(n: &str, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::Generic {
            name: n.into(),
            args,
        }
    }

    fn map(expr: &TypeExpr) -> Result<TypeDescriptor, TranslateError> {
        let location = SourceLocation::new("models.py", 2, 5);
        let site = TypeSite {
            model: "User",
            field: "x",
            location: &location,
        };
        map_type(expr, &graph(), &site, false)
    }

    #[test]
    fn maps_primitives_and_containers() {
        assert_eq!(
            map(&name("StrictInt")).unwrap(),
            TypeDescriptor::Primitive {
                kind: Primitive::Integer,
                strict: true
            }
        );
        assert_eq!(
            map(&name("EmailStr")).unwrap(),
            TypeDescriptor::primitive(Primitive::String(Some(StringFormat::Email)))
        );
        assert_eq!(
            map(&generic("Optional", vec![generic("List", vec![name("Address")])])).unwrap(),
            TypeDescriptor::Optional(Box::new(TypeDescriptor::Sequence(Box::new(
                TypeDescriptor::Reference("Address".into())
            ))))
        );
        assert_eq!(
            map(&TypeExpr::Union(vec![name("int"), TypeExpr::None])).unwrap(),
            TypeDescriptor::Optional(Box::new(TypeDescriptor::primitive(Primitive::Integer)))
        );
        assert!(matches!(
            map(&generic("Tuple", vec![name("int"), TypeExpr::Ellipsis])).unwrap(),
            TypeDescriptor::Sequence(_)
        ));
        assert!(matches!(map(&name("Color")).unwrap(), TypeDescriptor::Enum(_)));
    }

    #[test]
    fn strict_string_keys_map() {
        let dict = generic("Dict", vec![name("StrictStr"), name("int")]);
        assert_eq!(
            map(&dict).unwrap(),
            TypeDescriptor::Mapping {
                key: Box::new(TypeDescriptor::Primitive {
                    kind: Primitive::String(None),
                    strict: true
                }),
                value: Box::new(TypeDescriptor::primitive(Primitive::Integer)),
            }
        );
        let formatted = generic("Dict", vec![name("EmailStr"), name("int")]);
        assert_eq!(map(&formatted).unwrap_err().kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn rejects_unsupported_shapes() {
        for expr in [
            TypeExpr::Union(vec![name("int"), name("str")]),
            generic("Dict", vec![name("int"), name("str")]),
            name("Any"),
            name("Unknown"),
            generic("Tuple", vec![name("int"), name("str")]),
        ] {
            assert_eq!(map(&expr).unwrap_err().kind(), ErrorKind::UnsupportedType, "{expr}");
        }
        assert_eq!(map(&name("Nothing")).unwrap_err().kind(), ErrorKind::EmptyEnum);
    }

    #[test]
    fn applicability() {
        let location = SourceLocation::new("models.py", 2, 5);
        let site = TypeSite {
            model: "User",
            field: "x",
            location: &location,
        };
        let list = TypeDescriptor::Sequence(Box::new(TypeDescriptor::primitive(Primitive::Integer)));
        let source = name("list");
        let ge = ConstraintKind::Ge(0.into());
        assert!(check_applicable(&ge, &list, &site, &source).is_err());
        assert!(check_applicable(&ConstraintKind::MinItems(1), &list, &site, &source).is_ok());
        let text = TypeDescriptor::primitive(Primitive::String(None));
        let lookahead = ConstraintKind::Pattern {
            regex: "(?=a)".into(),
            anchored: true,
        };
        assert!(check_applicable(&lookahead, &text, &site, &source).is_err());
    }
}
