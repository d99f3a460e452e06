//! Common-rule resolver: the shared rules module to a [`RuleTable`].

use super::models::constraint_from_keyword;
use super::python::{Argument, Bindings, SourceContext, parse_tree};
use crate::error::{SourceLocation, TranslateError};
use crate::ir::{ConstraintKind, Hook, RuleDefinition, StringFormat};
use std::collections::HashMap;
use tree_sitter::Node;

/// Callees accepted for declarative rules (`nonempty = Rule(min_length=1)`).
const DECLARATIVE_CALLEES: &[&str] = &[
    "Rule", "rule", "Field", "constr", "conint", "confloat", "conlist",
];

/// Built-in check functions with a format equivalent. Plural forms apply to
/// every item of a list.
fn builtin_format(name: &str) -> Option<(StringFormat, bool)> {
    let format = match name {
        "check_email" => (StringFormat::Email, false),
        "check_uuid" => (StringFormat::Uuid, false),
        "check_uuids" => (StringFormat::Uuid, true),
        "check_ip" => (StringFormat::Ip, false),
        "check_ips" => (StringFormat::Ip, true),
        "check_ipv4" => (StringFormat::Ipv4, false),
        "check_ipv6" => (StringFormat::Ipv6, false),
        "check_ipv6s" => (StringFormat::Ipv6, true),
        "check_cidr" => (StringFormat::Cidr, false),
        "check_cidrs" => (StringFormat::Cidr, true),
        _ => return None,
    };
    Some(format)
}

/// Shared rules, built once per invocation and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<RuleDefinition>,
    index: HashMap<String, usize>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the common rules module.
    pub fn parse(source: &str, file: &str) -> Result<Self, TranslateError> {
        let tree = parse_tree(source, file)?;
        let ctx = SourceContext::new(source, file);
        let root = tree.root_node();

        let mut constants = Bindings::new();
        let mut table = RuleTable::new();
        for stmt in ctx.statements(root) {
            let (_, definition) = ctx.undecorate(stmt);
            match definition.kind() {
                "function_definition" => {
                    let Some(name) = definition.child_by_field_name("name") else {
                        continue;
                    };
                    let name = ctx.node_text(name);
                    if name.starts_with('_') {
                        continue;
                    }
                    table.insert(function_rule(name, ctx.location(definition)))?;
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
                    let name = ctx.node_text(left);
                    if let Some(value) = ctx.eval_literal(right, &constants) {
                        constants.insert(name.to_string(), value);
                        continue;
                    }
                    if let Some(kinds) = declarative_rule(&ctx, right, &constants)? {
                        table.insert(RuleDefinition {
                            identifier: name.to_string(),
                            kinds,
                            location: ctx.location(definition),
                        })?;
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(file, rules = table.len(), "parsed common rules");
        Ok(table)
    }

    fn insert(&mut self, rule: RuleDefinition) -> Result<(), TranslateError> {
        if let Some(&existing) = self.index.get(&rule.identifier) {
            return Err(TranslateError::DuplicateRule {
                location: rule.location,
                rule: rule.identifier,
                first: self.rules[existing].location.clone(),
            });
        }
        self.index.insert(rule.identifier.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Find a rule, or fail with `UnknownRule` naming the referencing site.
    pub fn lookup(
        &self,
        identifier: &str,
        referenced_by: &str,
        location: &SourceLocation,
    ) -> Result<&RuleDefinition, TranslateError> {
        self.get(identifier)
            .ok_or_else(|| TranslateError::UnknownRule {
                location: location.clone(),
                rule: identifier.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }

    pub fn get(&self, identifier: &str) -> Option<&RuleDefinition> {
        self.index.get(identifier).map(|&i| &self.rules[i])
    }

    /// Rules in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn function_rule(name: &str, location: SourceLocation) -> RuleDefinition {
    let kind = match builtin_format(name) {
        Some((format, each_item)) => ConstraintKind::Format { format, each_item },
        None => ConstraintKind::Hook(Hook {
            name: name.to_string(),
            key: name.to_string(),
            each_item: false,
        }),
    };
    RuleDefinition {
        identifier: name.to_string(),
        kinds: vec![kind],
        location,
    }
}

/// `Rule(min_length=1, ...)`: every argument must be a constraint keyword.
fn declarative_rule(
    ctx: &SourceContext,
    node: Node,
    constants: &Bindings,
) -> Result<Option<Vec<ConstraintKind>>, TranslateError> {
    let Some((function, args)) = ctx.call_parts(ctx.unwrap_expr(node)) else {
        return Ok(None);
    };
    let callee = ctx.simple_name(function).unwrap_or_default();
    if !DECLARATIVE_CALLEES.contains(&callee.as_str()) || args.is_empty() {
        return Ok(None);
    }

    let mut kinds = Vec::new();
    for arg in args {
        let Argument::Keyword(keyword, value) = arg else {
            tracing::debug!(%callee, "skipping assignment with positional arguments");
            return Ok(None);
        };
        match constraint_from_keyword(ctx, &keyword, value, constants)? {
            Some(kind) => kinds.push(kind),
            None => {
                tracing::debug!(%callee, %keyword, "skipping assignment with non-constraint keyword");
                return Ok(None);
            }
        }
    }
    Ok(Some(kinds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const COMMON: &str = r#"
import re

MIN = 1

def check_email(cls, v):
    return v

def check_uuids(cls, v):
    return v

def slug(cls, v):
    return v

def _private(v):
    return v

nonempty = Rule(min_length=MIN)
percent = Rule(ge=0, le=100)
pattern = re.compile("x")
"#;

    #[test]
    fn reads_functions_and_declarative_rules() {
        let table = RuleTable::parse(COMMON, "common.py").unwrap();
        let ids: Vec<_> = table.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["check_email", "check_uuids", "slug", "nonempty", "percent"]);

        assert_eq!(
            table.get("check_uuids").unwrap().kinds,
            [ConstraintKind::Format {
                format: StringFormat::Uuid,
                each_item: true
            }]
        );
        assert!(matches!(table.get("slug").unwrap().kinds[0], ConstraintKind::Hook(_)));
        assert_eq!(table.get("nonempty").unwrap().describe(), "min_length=1");
        assert_eq!(table.get("percent").unwrap().describe(), "ge=0, le=100");
    }

    #[test]
    fn lookup_reports_unknown_rule() {
        let table = RuleTable::parse(COMMON, "common.py").unwrap();
        let site = SourceLocation::new("models.py", 3, 5);
        let err = table.lookup("nope", "User.name", &site).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownRule);
        assert_eq!(err.location(), &site);
        assert!(table.lookup("nonempty", "User.name", &site).is_ok());
    }

    #[test]
    fn duplicate_rule_names_both_sites() {
        let source = "nonempty = Rule(min_length=1)\n\ndef nonempty(cls, v):\n    return v\n";
        let err = RuleTable::parse(source, "common.py").unwrap_err();
        let TranslateError::DuplicateRule { location, first, rule } = err else {
            panic!("expected DuplicateRule, got {err:?}");
        };
        assert_eq!(rule, "nonempty");
        assert_eq!(first.line, 1);
        assert_eq!(location.line, 3);
    }

    #[test]
    fn empty_table_is_valid() {
        let table = RuleTable::parse("", "common.py").unwrap();
        assert!(table.is_empty());
    }
}
