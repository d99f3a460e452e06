//! Resolution: a parsed [`SchemaGraph`] plus the shared tables to the
//! [`ResolvedSchema`] the emitters consume.
//!
//! Every field gets its [`TypeDescriptor`], its coerced default and its
//! ordered checks (inline constraints first, then rule references, each group
//! in source order). Model references must be acyclic.

use crate::error::{SourceLocation, TranslateError};
use crate::input::RuleTable;
use crate::ir::*;
use crate::names::{NameTable, enum_constant, to_go_identifier};
use crate::types::{TypeSite, check_applicable, map_type};
use crate::values::Coercer;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One unit, ready for emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSchema {
    pub unit: String,
    pub file: String,
    pub models: Vec<ResolvedModel>,
    pub enums: Vec<ResolvedEnum>,
}

impl ResolvedSchema {
    pub fn model(&self, name: &str) -> Option<&ResolvedModel> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&ResolvedEnum> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Every violation identifier a model (nested models included) can report.
    pub fn identifiers(&self, model: &str) -> Vec<String> {
        let mut out: Vec<String> = ["missing", "type", "enum", "extra_forbidden"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut seen = HashSet::new();
        self.collect_identifiers(model, &mut seen, &mut out);
        out
    }

    fn collect_identifiers(&self, model: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if !seen.insert(model.to_string()) {
            return;
        }
        let Some(model) = self.model(model) else {
            return;
        };
        for field in &model.fields {
            for check in &field.checks {
                if !out.contains(&check.identifier) {
                    out.push(check.identifier.clone());
                }
            }
            let mut nested = Vec::new();
            field.ty.referenced_models(&mut nested);
            for name in nested {
                self.collect_identifiers(name, seen, out);
            }
        }
        for hook in &model.hooks {
            if !out.contains(&hook.name) {
                out.push(hook.name.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModel {
    pub name: String,
    pub go_name: String,
    pub docs: Option<String>,
    pub fields: Vec<ResolvedField>,
    /// Model-level hooks, run once every field check passed.
    pub hooks: Vec<ResolvedHook>,
    pub forbid_extra: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub name: String,
    pub json_name: String,
    pub go_name: String,
    pub ty: TypeDescriptor,
    /// Absent fields take this value (already coerced to `ty`).
    pub default: Option<Value>,
    /// Absent fields are a `missing` violation.
    pub required: bool,
    pub checks: Vec<Check>,
    pub location: SourceLocation,
}

/// One reported constraint: an inline constraint, or a whole rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub identifier: String,
    pub origin: CheckOrigin,
    pub kinds: Vec<ConstraintKind>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckOrigin {
    Inline,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHook {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEnum {
    pub name: String,
    pub go_name: String,
    pub kind: EnumKind,
    pub members: Vec<ResolvedEnumMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEnumMember {
    pub name: String,
    pub go_name: String,
    pub value: Value,
}

/// Resolve one unit against the shared rule and name tables.
pub fn resolve(
    graph: &SchemaGraph,
    unit: &str,
    rules: &RuleTable,
    names: &NameTable,
) -> Result<ResolvedSchema, TranslateError> {
    check_cycles(graph)?;

    let go_name = |declared: &str| {
        names
            .type_name(unit, declared)
            .map(str::to_string)
            .unwrap_or_else(|| to_go_identifier(declared))
    };

    let mut models = Vec::with_capacity(graph.models.len());
    for model in &graph.models {
        let mut fields = Vec::with_capacity(model.fields.len());
        let mut used = HashSet::new();
        for field in &model.fields {
            let resolved = resolve_field(graph, unit, rules, model, field)?;
            let mut go_field = to_go_identifier(&field.name);
            let base = go_field.clone();
            let mut n = 2;
            while !used.insert(go_field.clone()) {
                go_field = format!("{base}{n}");
                n += 1;
            }
            fields.push(ResolvedField {
                go_name: go_field,
                ..resolved
            });
        }
        models.push(ResolvedModel {
            name: model.name.clone(),
            go_name: go_name(&model.name),
            docs: model.docs.clone(),
            fields,
            hooks: model
                .validators
                .iter()
                .map(|v| ResolvedHook {
                    name: v.name.clone(),
                    key: format!("{unit}.{}.{}", model.name, v.name),
                })
                .collect(),
            forbid_extra: model.forbid_extra,
            location: model.location.clone(),
        });
    }

    let mut enums = Vec::new();
    for definition in &graph.enums {
        if definition.members.is_empty() {
            tracing::debug!(unit, name = %definition.name, "skipping enum without members");
            continue;
        }
        let kind = if definition.members.iter().all(|m| m.value.is_i64()) {
            EnumKind::Integer
        } else if definition.members.iter().all(|m| m.value.is_string()) {
            EnumKind::String
        } else {
            tracing::debug!(unit, name = %definition.name, "skipping enum with mixed member types");
            continue;
        };
        let go = go_name(&definition.name);
        enums.push(ResolvedEnum {
            name: definition.name.clone(),
            members: definition
                .members
                .iter()
                .map(|m| ResolvedEnumMember {
                    name: m.name.clone(),
                    go_name: enum_constant(&go, &m.name),
                    value: m.value.clone(),
                })
                .collect(),
            go_name: go,
            kind,
        });
    }

    tracing::debug!(unit, models = models.len(), enums = enums.len(), "resolved unit");
    Ok(ResolvedSchema {
        unit: unit.to_string(),
        file: graph.file.clone(),
        models,
        enums,
    })
}

fn resolve_field(
    graph: &SchemaGraph,
    unit: &str,
    rules: &RuleTable,
    model: &ModelDefinition,
    field: &Field,
) -> Result<ResolvedField, TranslateError> {
    let site = TypeSite {
        model: &model.name,
        field: &field.name,
        location: &field.location,
    };
    let mut ty = map_type(&field.ty, graph, &site, field.strict)?;

    let (default, required) = match &field.default {
        DefaultSpec::Missing if ty.is_optional() => (Some(Value::Null), false),
        DefaultSpec::Missing | DefaultSpec::Required => (None, true),
        DefaultSpec::Value(Value::Null) => {
            if !ty.is_optional() {
                ty = TypeDescriptor::Optional(Box::new(ty));
            }
            (Some(Value::Null), false)
        }
        DefaultSpec::Value(value) => {
            let coerced = Coercer::without_models()
                .coerce(value, &ty)
                .map_err(|mismatch| TranslateError::UnsupportedDefault {
                    location: field.location.clone(),
                    model: model.name.clone(),
                    field: field.name.clone(),
                    expression: value.to_string(),
                    reason: mismatch.to_string(),
                })?;
            (Some(coerced), false)
        }
    };

    let referenced_by = format!("{}.{}", model.name, field.name);
    let mut inline = Vec::new();
    let mut shared = Vec::new();
    for constraint in &field.constraints {
        match constraint {
            Constraint::Inline(InlineConstraint { kind, location }) => {
                check_applicable(kind, &ty, &site, &field.ty)?;
                let kind = match kind {
                    ConstraintKind::Hook(hook) => ConstraintKind::Hook(Hook {
                        key: format!("{unit}.{}", hook.key),
                        ..hook.clone()
                    }),
                    other => other.clone(),
                };
                inline.push(Check {
                    identifier: kind.identifier().to_string(),
                    origin: CheckOrigin::Inline,
                    kinds: vec![kind],
                    location: location.clone(),
                });
            }
            Constraint::Rule(reference) => {
                let rule = rules.lookup(&reference.name, &referenced_by, &reference.location)?;
                for kind in &rule.kinds {
                    check_applicable(kind, &ty, &site, &field.ty)?;
                }
                shared.push(Check {
                    identifier: rule.identifier.clone(),
                    origin: CheckOrigin::Rule,
                    kinds: rule.kinds.clone(),
                    location: reference.location.clone(),
                });
            }
        }
    }
    inline.extend(shared);

    Ok(ResolvedField {
        name: field.name.clone(),
        json_name: field.json_name().to_string(),
        go_name: String::new(),
        ty,
        default,
        required,
        checks: inline,
        location: field.location.clone(),
    })
}

/// Fail on the first reference cycle between models, in declaration order.
fn check_cycles(graph: &SchemaGraph) -> Result<(), TranslateError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn edges(model: &ModelDefinition, graph: &SchemaGraph) -> Vec<String> {
        let mut out = Vec::new();
        for field in &model.fields {
            collect_names(&field.ty, &mut out);
        }
        out.retain(|name| graph.model(name).is_some());
        out
    }

    fn collect_names(ty: &TypeExpr, out: &mut Vec<String>) {
        match ty {
            TypeExpr::Name(name) => out.push(name.clone()),
            TypeExpr::Generic { args, .. } | TypeExpr::Union(args) => {
                for arg in args {
                    collect_names(arg, out);
                }
            }
            TypeExpr::Constrained { inner, .. } => collect_names(inner, out),
            TypeExpr::Literal(_) | TypeExpr::None | TypeExpr::Ellipsis => {}
        }
    }

    fn visit(
        name: &str,
        graph: &SchemaGraph,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
    ) -> Result<(), TranslateError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                let location = graph
                    .model(&cycle[0])
                    .map(|m| m.location.clone())
                    .unwrap_or_else(|| SourceLocation::new(graph.file.clone(), 1, 1));
                return Err(TranslateError::CyclicModelReference { location, cycle });
            }
            None => {}
        }
        let Some(model) = graph.model(name) else {
            return Ok(());
        };
        marks.insert(name.to_string(), Mark::Visiting);
        stack.push(name.to_string());
        for next in edges(model, graph) {
            visit(&next, graph, marks, stack)?;
        }
        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for model in &graph.models {
        visit(&model.name, graph, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::input::{ParseOptions, parse_models};

    fn resolve_source(source: &str, rules: &RuleTable) -> Result<ResolvedSchema, TranslateError> {
        let graph = parse_models(source, "models.py", &ParseOptions::default())?;
        let names = NameTable::build([("models", &graph)]);
        resolve(&graph, "models", rules, &names)
    }

    fn common() -> RuleTable {
        RuleTable::parse(
            "nonempty = Rule(min_length=1)\n\ndef check_email(cls, v):\n    return v\n",
            "common.py",
        )
        .unwrap()
    }

    #[test]
    fn inline_checks_precede_rule_references() {
        let schema = resolve_source(
            "class User(BaseModel):\n    name: Annotated[str, nonempty, Field(max_length=5)]\n",
            &common(),
        )
        .unwrap();
        let ids: Vec<_> = schema.models[0].fields[0]
            .checks
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(ids, ["max_length", "nonempty"]);
    }

    #[test]
    fn defaults_and_requiredness() {
        let schema = resolve_source(
            "class A(BaseModel):\n    a: int\n    b: Optional[int]\n    c: int = None\n    d: float = 1\n    e: Optional[str] = ...\n",
            &RuleTable::new(),
        )
        .unwrap();
        let f = &schema.models[0].fields;
        assert!(f[0].required && f[0].default.is_none());
        assert!(!f[1].required && f[1].default == Some(Value::Null));
        assert!(f[2].ty.is_optional());
        assert_eq!(f[3].default, Some(serde_json::json!(1.0)));
        assert!(f[4].required && f[4].ty.is_optional());
    }

    #[test]
    fn bad_default_is_reported() {
        let err = resolve_source("class A(BaseModel):\n    a: int = 'x'\n", &RuleTable::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDefault);
    }

    #[test]
    fn unknown_rule_reference_fails() {
        let err = resolve_source(
            "class A(BaseModel):\n    a: Annotated[str, missing_rule]\n",
            &common(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownRule);
        assert!(err.to_string().contains("A.a"));
    }

    #[test]
    fn cycles_are_rejected() {
        let err = resolve_source(
            "class A(BaseModel):\n    b: Optional['B'] = None\n\nclass B(BaseModel):\n    a: List[A]\n",
            &RuleTable::new(),
        )
        .unwrap_err();
        let TranslateError::CyclicModelReference { cycle, .. } = err else {
            panic!("expected a cycle, got {err:?}");
        };
        assert_eq!(cycle, ["A", "B", "A"]);
    }

    #[test]
    fn identifiers_include_nested_models() {
        let schema = resolve_source(
            "class Address(BaseModel):\n    zip: str = Field(regex=r'^\\d{5}$')\n\nclass User(BaseModel):\n    address: Address\n    email: Annotated[str, check_email]\n",
            &common(),
        )
        .unwrap();
        let ids = schema.identifiers("User");
        assert!(ids.contains(&"regex".to_string()));
        assert!(ids.contains(&"check_email".to_string()));
        assert!(ids.contains(&"missing".to_string()));
    }
}
