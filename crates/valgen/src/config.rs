//! Configuration for valgen.
//!
//! Loaded from `valgen.toml` in the working directory, or from the file given
//! with `--config`. Command-line flags override file values.
//!
//! Example valgen.toml:
//! ```toml
//! [input]
//! path = "schemas"
//! file = "models.py"
//! common = "schemas/common.py"
//! tests = "tests"
//!
//! [output]
//! dest = "go/validator"
//! package = "validator"
//!
//! [models]
//! root_bases = ["BaseModel", "Schema"]
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use valgen_translate::ParseOptions;

pub const DEFAULT_CONFIG_FILE: &str = "valgen.toml";

/// Where sources are read from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Root directory scanned for model files.
    pub path: PathBuf,
    /// Model file name that makes its directory a unit.
    pub file: String,
    /// Shared rules module.
    pub common: Option<PathBuf>,
    /// Directory scanned for `test_<unit>.py`; defaults to `path`.
    pub tests: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            file: "models.py".to_string(),
            common: None,
            tests: None,
        }
    }
}

/// Where generated Go is written.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dest: PathBuf,
    pub package: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("generated"),
            package: "validator".to_string(),
        }
    }
}

/// Model recognition.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base classes that make a class a model.
    pub root_bases: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            root_bases: ParseOptions::default().root_bases,
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ValgenConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub models: ModelsConfig,
}

impl ValgenConfig {
    /// Load an explicit config file, or `valgen.toml` when present.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::load_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            root_bases: self.models.root_bases.clone(),
        }
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !is_go_identifier(&self.output.package) {
            bail!("`{}` is not a valid Go package name", self.output.package);
        }
        if self.input.file.is_empty() {
            bail!("input file name must not be empty");
        }
        if self.models.root_bases.is_empty() {
            bail!("at least one model root base is required");
        }
        Ok(())
    }

    /// Test directory, falling back to the model root.
    pub fn tests_dir(&self) -> &Path {
        self.input.tests.as_deref().unwrap_or(&self.input.path)
    }
}

fn is_go_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ValgenConfig::default();
        assert_eq!(config.input.file, "models.py");
        assert_eq!(config.output.package, "validator");
        assert_eq!(config.models.root_bases, ["BaseModel"]);
        assert_eq!(config.tests_dir(), Path::new("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("valgen.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[output]\npackage = \"checks\"\n\n[input]\ntests = \"t\"").unwrap();

        let config = ValgenConfig::load(Some(&path)).unwrap();
        assert_eq!(config.output.package, "checks");
        assert_eq!(config.output.dest, PathBuf::from("generated"));
        assert_eq!(config.tests_dir(), Path::new("t"));
        assert_eq!(config.input.file, "models.py");
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        assert!(ValgenConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_invalid_package_is_rejected() {
        let mut config = ValgenConfig::default();
        config.output.package = "my-pkg".to_string();
        assert!(config.validate().is_err());
    }
}
