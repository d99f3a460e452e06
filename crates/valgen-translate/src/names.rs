//! Go identifier assignment shared by every unit of one package.

use crate::ir::SchemaGraph;
use std::collections::{HashMap, HashSet};

/// Exported identifiers of the common unit.
const RUNTIME_NAMES: &[&str] = &[
    "Violation",
    "Violations",
    "SharedRules",
    "FieldHook",
    "ModelHook",
    "RegisterFieldHook",
    "RegisterModelHook",
];

/// `user_name` -> `UserName`. Leading digits get an `X` prefix.
pub fn to_go_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split(|c: char| !c.is_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    match out.chars().next() {
        None => "X".to_string(),
        Some(c) if c.is_ascii_digit() => format!("X{out}"),
        Some(_) => out,
    }
}

/// Enum member names: `DARK_RED` -> `DarkRed`, `darkRed` -> `DarkRed`.
pub fn to_go_member(name: &str) -> String {
    if name.chars().any(|c| c.is_lowercase()) {
        to_go_identifier(name)
    } else {
        to_go_identifier(&name.to_lowercase())
    }
}

/// Constant of an enum member: `Color` + `DARK_RED` -> `ColorDarkRed`.
pub fn enum_constant(enum_go_name: &str, member: &str) -> String {
    format!("{enum_go_name}{}", to_go_member(member))
}

/// Go type names of every declaration across all units.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<(String, String), String>,
}

impl NameTable {
    /// Assign names for `units` in the given order. A declaration keeps its
    /// own name unless an earlier one took it; then it is qualified with the
    /// unit name, and numbered if that is taken too. Enum member constants
    /// share the namespace: the constants of every enum under its own name
    /// are reserved up front, and a renamed enum's constants must be free.
    pub fn build<'a>(units: impl IntoIterator<Item = (&'a str, &'a SchemaGraph)>) -> Self {
        let units: Vec<(&str, &SchemaGraph)> = units.into_iter().collect();
        let mut taken: HashSet<String> = RUNTIME_NAMES.iter().map(|n| n.to_string()).collect();
        for (_, graph) in &units {
            for definition in &graph.enums {
                let plain = to_go_identifier(&definition.name);
                taken.extend(definition.members.iter().map(|m| enum_constant(&plain, &m.name)));
            }
        }

        let mut names = HashMap::new();
        for (unit, graph) in units {
            let declared = graph
                .models
                .iter()
                .map(|m| (m.name.as_str(), Vec::new()))
                .chain(graph.enums.iter().map(|e| {
                    let members: Vec<&str> = e.members.iter().map(|m| m.name.as_str()).collect();
                    (e.name.as_str(), members)
                }));
            for (declared, members) in declared {
                let plain = to_go_identifier(declared);
                let free = |candidate: &str, taken: &HashSet<String>| {
                    !taken.contains(candidate)
                        && (candidate == plain
                            || members
                                .iter()
                                .all(|m| !taken.contains(&enum_constant(candidate, m))))
                };
                let name = if free(&plain, &taken) {
                    plain.clone()
                } else {
                    let qualified = format!("{}{}", to_go_identifier(unit), plain);
                    let mut candidate = qualified.clone();
                    let mut n = 2;
                    while !free(&candidate, &taken) {
                        candidate = format!("{qualified}{n}");
                        n += 1;
                    }
                    tracing::debug!(unit, declared, go_name = %candidate, "renamed colliding declaration");
                    candidate
                };
                taken.extend(members.iter().map(|m| enum_constant(&name, m)));
                taken.insert(name.clone());
                names.insert((unit.to_string(), declared.to_string()), name);
            }
        }
        Self { names }
    }

    pub fn type_name(&self, unit: &str, declared: &str) -> Option<&str> {
        self.names
            .get(&(unit.to_string(), declared.to_string()))
            .map(String::as_str)
    }
}
