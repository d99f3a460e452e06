//! The convert pipeline.
//!
//! Phases: shared rules (sequential), model parsing (parallel), name table
//! (sequential), then per-unit resolution and emission (parallel). A unit's
//! files are written only once every stage of that unit succeeded.

use crate::config::ValgenConfig;
use crate::discover::{discover, read_source};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::Path;
use valgen_translate::{
    Backend, GoBackend, GoOptions, ParsedUnit, RuleTable, TranslateError, UnitOutput, name_table,
    parse_unit, translate_unit,
};

/// A unit that did not translate, and why.
#[derive(Debug)]
pub struct Failure {
    pub unit: String,
    pub error: TranslateError,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct Summary {
    pub written: Vec<String>,
    pub failures: Vec<Failure>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load the shared rule table, or an empty one when no module is configured.
pub fn load_rules(path: Option<&Path>) -> Result<RuleTable> {
    let Some(path) = path else {
        return Ok(RuleTable::new());
    };
    let source = read_source(path)?;
    let rules = RuleTable::parse(&source.text, &source.path)
        .with_context(|| format!("loading shared rules from {}", path.display()))?;
    tracing::info!(rules = rules.len(), path = %path.display(), "loaded shared rules");
    Ok(rules)
}

pub fn run(config: &ValgenConfig) -> Result<Summary> {
    let rules = load_rules(config.input.common.as_deref())?;
    let discovery = discover(config)?;
    let options = config.parse_options();
    let backend = GoBackend::new(GoOptions {
        package: config.output.package.clone(),
    });

    let mut summary = Summary::default();
    for orphan in discovery.orphans {
        let unit = match &orphan {
            TranslateError::OrphanTestCase { unit, .. } => unit.clone(),
            _ => String::new(),
        };
        summary.failures.push(Failure {
            unit,
            error: orphan,
        });
    }

    let parsed: Vec<Result<ParsedUnit, Failure>> = discovery
        .units
        .par_iter()
        .map(|input| {
            parse_unit(input, &options).map_err(|error| Failure {
                unit: input.unit.clone(),
                error,
            })
        })
        .collect();
    let mut units = Vec::with_capacity(parsed.len());
    for result in parsed {
        match result {
            Ok(unit) => units.push(unit),
            Err(failure) => summary.failures.push(failure),
        }
    }

    let names = name_table(&units);

    let outputs: Vec<Result<UnitOutput, Failure>> = units
        .par_iter()
        .map(|unit| {
            translate_unit(unit, &rules, &names, &backend).map_err(|error| Failure {
                unit: unit.unit.clone(),
                error,
            })
        })
        .collect();

    let dest = &config.output.dest;
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    for result in outputs {
        match result {
            Ok(output) => {
                write_unit(dest, &backend, &output)?;
                summary.written.push(output.unit);
            }
            Err(failure) => summary.failures.push(failure),
        }
    }
    write_file(dest, "common.go", &backend.emit_common(&rules))?;
    write_file(dest, "common_test.go", &backend.emit_common_tests(&rules))?;

    tracing::info!(
        written = summary.written.len(),
        failed = summary.failures.len(),
        dest = %dest.display(),
        "conversion finished"
    );
    Ok(summary)
}

fn write_unit(dest: &Path, backend: &dyn Backend, output: &UnitOutput) -> Result<()> {
    let ext = backend.extension();
    write_file(dest, &format!("{}.{ext}", output.unit), &output.validators)?;
    write_file(dest, &format!("{}_test.{ext}", output.unit), &output.tests)?;
    Ok(())
}

fn write_file(dest: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dest.join(name);
    std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn failed_units_leave_no_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("good.py"), "class A(BaseModel):\n    x: int\n").unwrap();
        std::fs::write(root.join("bad.py"), "class B(BaseModel):\n    x: Any\n").unwrap();

        let mut config = ValgenConfig::default();
        config.input.path = root;
        config.output.dest = dir.path().join("out");
        let summary = run(&config).unwrap();

        assert_eq!(summary.written, ["good"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].unit, "bad");
        let out = dir.path().join("out");
        assert!(out.join("good.go").is_file());
        assert!(out.join("good_test.go").is_file());
        assert!(!out.join("bad.go").exists());
        assert!(out.join("common.go").is_file());
        assert!(out.join("common_test.go").is_file());
    }

    #[test]
    fn broken_rules_module_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let common = dir.path().join("common.py");
        std::fs::write(&common, "a = Rule(min_length=1)\na = Rule(min_length=2)\n").unwrap();
        let err = load_rules(Some(&common)).unwrap_err();
        assert!(format!("{err:#}").contains("DuplicateRule"));
    }
}
