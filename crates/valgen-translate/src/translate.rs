//! Per-unit translation: the stages a pipeline runs for one model file.

use crate::error::TranslateError;
use crate::input::{ParseOptions, RuleTable, parse_models, parse_test_cases};
use crate::ir::{SchemaGraph, TestCase};
use crate::names::NameTable;
use crate::resolve::{ResolvedSchema, resolve};
use crate::traits::Backend;

/// One source file, as read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

/// A model file and the test files paired with it.
#[derive(Debug, Clone)]
pub struct UnitInput {
    pub unit: String,
    pub models: SourceFile,
    pub tests: Vec<SourceFile>,
}

/// A unit after parsing, before resolution.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub unit: String,
    pub graph: SchemaGraph,
    pub cases: Vec<TestCase>,
}

/// Generated sources of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutput {
    pub unit: String,
    pub schema: ResolvedSchema,
    pub validators: String,
    pub tests: String,
}

/// Parse the model file and every paired test file of a unit.
pub fn parse_unit(input: &UnitInput, options: &ParseOptions) -> Result<ParsedUnit, TranslateError> {
    let graph = parse_models(&input.models.text, &input.models.path, options)?;
    let mut cases = Vec::new();
    for test in &input.tests {
        cases.extend(parse_test_cases(&test.text, &test.path)?);
    }
    tracing::debug!(
        unit = %input.unit,
        models = graph.models.len(),
        cases = cases.len(),
        "parsed unit"
    );
    Ok(ParsedUnit {
        unit: input.unit.clone(),
        graph,
        cases,
    })
}

/// Resolve a parsed unit and emit its validators and tests.
pub fn translate_unit(
    parsed: &ParsedUnit,
    rules: &RuleTable,
    names: &NameTable,
    backend: &dyn Backend,
) -> Result<UnitOutput, TranslateError> {
    let schema = resolve(&parsed.graph, &parsed.unit, rules, names)?;
    let validators = backend.emit_validators(&schema);
    let tests = backend.emit_tests(&schema, &parsed.cases)?;
    Ok(UnitOutput {
        unit: parsed.unit.clone(),
        schema,
        validators,
        tests,
    })
}

/// Build the shared name table from every parsed unit, in the given order.
pub fn name_table(units: &[ParsedUnit]) -> NameTable {
    NameTable::build(units.iter().map(|u| (u.unit.as_str(), &u.graph)))
}
