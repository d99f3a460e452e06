//! Literal coercion, mirroring the converters of the generated runtime.
//!
//! Used to type-check defaults and to compute the struct value an accepted
//! test payload must produce.

use crate::ir::{EnumKind, Primitive, TypeDescriptor};
use crate::resolve::ResolvedModel;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Why a value does not fit a type, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

pub struct Coercer<'a> {
    models: &'a [ResolvedModel],
}

impl<'a> Coercer<'a> {
    pub fn new(models: &'a [ResolvedModel]) -> Self {
        Self { models }
    }

    /// A coercer for contexts where model values are not allowed (defaults).
    pub fn without_models() -> Self {
        Self { models: &[] }
    }

    pub fn coerce(&self, value: &Value, ty: &TypeDescriptor) -> Result<Value, Mismatch> {
        self.coerce_at(value, ty, "")
    }

    /// Coerce a payload object to a model. Every field of the result is set,
    /// defaults applied; keys are JSON names.
    pub fn coerce_model(
        &self,
        payload: &Map<String, Value>,
        model: &str,
    ) -> Result<Map<String, Value>, Mismatch> {
        self.model_at(payload, model, "")
    }

    fn model_at(
        &self,
        payload: &Map<String, Value>,
        model: &str,
        path: &str,
    ) -> Result<Map<String, Value>, Mismatch> {
        let Some(model) = self.models.iter().find(|m| m.name == model) else {
            return Err(mismatch(path, format!("model `{model}` is not available here")));
        };
        let mut out = Map::new();
        for field in &model.fields {
            let at = join(path, &field.json_name);
            let value = match payload.get(&field.json_name) {
                Some(Value::Null) if !field.ty.is_optional() => {
                    return Err(mismatch(&at, "null for a non-optional field"));
                }
                Some(value) => self.coerce_at(value, &field.ty, &at)?,
                None if field.required => return Err(mismatch(&at, "required field is missing")),
                None => field.default.clone().unwrap_or(Value::Null),
            };
            out.insert(field.json_name.clone(), value);
        }
        if model.forbid_extra {
            if let Some(extra) = payload
                .keys()
                .find(|k| !model.fields.iter().any(|f| &f.json_name == *k))
            {
                return Err(mismatch(&join(path, extra), "extra field is forbidden"));
            }
        }
        Ok(out)
    }

    fn coerce_at(&self, value: &Value, ty: &TypeDescriptor, path: &str) -> Result<Value, Mismatch> {
        match ty {
            TypeDescriptor::Optional(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => self.coerce_at(other, inner, path),
            },
            TypeDescriptor::Primitive { kind, strict } => primitive(value, *kind, *strict, path),
            TypeDescriptor::Sequence(item) => match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.coerce_at(v, item, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(mismatch(path, "expected a list")),
            },
            TypeDescriptor::Mapping { value: item, .. } => match value {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| {
                        self.coerce_at(v, item, &format!("{path}[{k:?}]"))
                            .map(|v| (k.clone(), v))
                    })
                    .collect::<Result<Map<_, _>, _>>()
                    .map(Value::Object),
                _ => Err(mismatch(path, "expected a mapping")),
            },
            TypeDescriptor::Reference(model) => match value {
                Value::Object(map) => self.model_at(map, model, path).map(Value::Object),
                _ => Err(mismatch(path, format!("expected an object for `{model}`"))),
            },
            TypeDescriptor::Enum(descriptor) => {
                let candidate = match (descriptor.kind, value) {
                    (EnumKind::String, Value::String(_)) => Some(value.clone()),
                    (EnumKind::Integer, Value::Number(n)) => integral(n).map(Value::from),
                    _ => None,
                };
                match candidate {
                    Some(v) if descriptor.variants.iter().any(|m| m.value == v) => Ok(v),
                    _ => Err(mismatch(path, format!("{value} is not a permitted value"))),
                }
            }
        }
    }
}

fn primitive(value: &Value, kind: Primitive, strict: bool, path: &str) -> Result<Value, Mismatch> {
    match (kind, value) {
        (Primitive::String(_), Value::String(_)) => Ok(value.clone()),
        (Primitive::Integer, Value::Number(n)) => integral(n)
            .map(Value::from)
            .ok_or_else(|| mismatch(path, format!("{n} is not an integer"))),
        (Primitive::Integer, Value::String(s)) if !strict => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch(path, format!("{s:?} is not an integer"))),
        (Primitive::Float, Value::Number(n)) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch(path, format!("{n} is not a float"))),
        (Primitive::Float, Value::String(s)) if !strict => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch(path, format!("{s:?} is not a number"))),
        (Primitive::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (Primitive::Boolean, Value::Number(n)) if !strict => match integral(n) {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(mismatch(path, format!("{n} is not a boolean"))),
        },
        (Primitive::Boolean, Value::String(s)) if !strict => {
            match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "y" | "t" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" | "n" | "f" => Ok(Value::Bool(false)),
                _ => Err(mismatch(path, format!("{s:?} is not a boolean"))),
            }
        }
        (kind, value) => Err(mismatch(
            path,
            format!("{value} does not fit {}", describe(kind, strict)),
        )),
    }
}

/// Integral value of a number, accepting floats without a fraction.
fn integral(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn describe(kind: Primitive, strict: bool) -> String {
    let name = match kind {
        Primitive::String(_) => "a string",
        Primitive::Integer => "an integer",
        Primitive::Float => "a float",
        Primitive::Boolean => "a boolean",
    };
    if strict {
        format!("strict {}", &name[name.find(' ').map_or(0, |i| i + 1)..])
    } else {
        name.to_string()
    }
}

fn mismatch(path: &str, reason: impl Into<String>) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn int(strict: bool) -> TypeDescriptor {
        TypeDescriptor::Primitive {
            kind: Primitive::Integer,
            strict,
        }
    }

    #[test]
    fn lax_and_strict_integers() {
        let c = Coercer::without_models();
        assert_eq!(c.coerce(&json!("42"), &int(false)).unwrap(), json!(42));
        assert_eq!(c.coerce(&json!(3.0), &int(false)).unwrap(), json!(3));
        assert!(c.coerce(&json!("42"), &int(true)).is_err());
        assert!(c.coerce(&json!(3.5), &int(false)).is_err());
        assert!(c.coerce(&json!(true), &int(false)).is_err());
    }

    #[test]
    fn nested_paths_in_mismatches() {
        let c = Coercer::without_models();
        let ty = TypeDescriptor::Sequence(Box::new(int(false)));
        let err = c.coerce(&json!([1, "x"]), &ty).unwrap_err();
        assert_eq!(err.path, "[1]");
    }

    #[test]
    fn model_values_need_models() {
        let c = Coercer::without_models();
        let err = c
            .coerce(&json!({"a": 1}), &TypeDescriptor::Reference("A".into()))
            .unwrap_err();
        assert!(err.reason.contains("not available"));
    }
}
