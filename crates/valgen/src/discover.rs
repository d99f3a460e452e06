//! Unit discovery: model files under the input root, paired with their tests.

use crate::config::ValgenConfig;
use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use valgen_translate::{SourceFile, SourceLocation, TranslateError, UnitInput};
use walkdir::WalkDir;

/// Go `GOOS` values; a `_<goos>` file name suffix is a build constraint.
const GOOS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Go `GOARCH` values; a `_<goarch>` file name suffix is a build constraint.
const GOARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// Units in path order, and test files that pair with none of them.
#[derive(Debug, Default)]
pub struct Discovery {
    pub units: Vec<UnitInput>,
    pub orphans: Vec<TranslateError>,
}

pub fn discover(config: &ValgenConfig) -> Result<Discovery> {
    let root = &config.input.path;
    if !root.is_dir() {
        bail!("input path {} is not a directory", root.display());
    }
    let common = config
        .input
        .common
        .as_deref()
        .and_then(|p| p.canonicalize().ok());

    let mut discovery = Discovery::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    for path in python_files(root)? {
        let name = file_name(&path);
        if is_test_file(&name) || name.starts_with('_') || name == "conftest.py" {
            continue;
        }
        if common.is_some() && path.canonicalize().ok() == common {
            continue;
        }
        let unit = unit_name(root, &path, &config.input.file);
        check_unit_name(&unit).with_context(|| format!("{} cannot be a unit", path.display()))?;
        if let Some(&existing) = index.get(&unit) {
            bail!(
                "{} and {} both map to unit `{unit}`",
                discovery.units[existing].models.path,
                path.display()
            );
        }
        index.insert(unit.clone(), discovery.units.len());
        discovery.units.push(UnitInput {
            unit,
            models: read_source(&path)?,
            tests: Vec::new(),
        });
    }

    let tests_root = config.tests_dir();
    if tests_root.is_dir() {
        for path in python_files(tests_root)? {
            let name = file_name(&path);
            if !is_test_file(&name) {
                continue;
            }
            let unit = name
                .trim_start_matches("test_")
                .trim_end_matches(".py")
                .to_string();
            match index.get(&unit) {
                Some(&i) => discovery.units[i].tests.push(read_source(&path)?),
                None => {
                    tracing::debug!(path = %path.display(), %unit, "test file without a unit");
                    discovery.orphans.push(TranslateError::OrphanTestCase {
                        location: SourceLocation::new(path.display().to_string(), 1, 1),
                        test: name,
                        model: unit.clone(),
                        unit,
                    });
                }
            }
        }
    } else if config.input.tests.is_some() {
        bail!("tests path {} is not a directory", tests_root.display());
    }

    tracing::info!(
        units = discovery.units.len(),
        orphans = discovery.orphans.len(),
        "discovered units"
    );
    Ok(discovery)
}

/// The directory name for a `file` found below the root, else the file stem.
fn unit_name(root: &Path, path: &Path, file: &str) -> String {
    let parent = path.parent().filter(|p| *p != root);
    match parent.and_then(|p| p.file_name()) {
        Some(dir) if file_name(path) == file => dir.to_string_lossy().into_owned(),
        _ => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Reject unit names whose `<unit>.go` the Go toolchain would not build as a
/// plain source file, or that clash with the common unit.
fn check_unit_name(unit: &str) -> Result<()> {
    if unit.is_empty() {
        bail!("unit name is empty");
    }
    if unit == "common" {
        bail!("unit `common` would overwrite the generated common.go; rename the file or directory");
    }
    if unit.starts_with(['_', '.']) {
        bail!("unit `{unit}` starts with `_` or `.`, so Go would ignore {unit}.go");
    }
    if unit.ends_with("_test") {
        bail!("unit `{unit}` ends with `_test`, so Go would treat {unit}.go as a test file");
    }
    if let Some(constraint) = build_constraint(unit) {
        bail!("unit `{unit}` ends with `_{constraint}`, which Go reads as a build constraint");
    }
    Ok(())
}

/// The `GOOS`, `GOARCH` or `GOOS_GOARCH` suffix that would restrict
/// `<unit>.go` to one platform. A name that is only a platform (`linux`) is
/// not constrained.
fn build_constraint(unit: &str) -> Option<String> {
    let parts: Vec<&str> = unit.split('_').collect();
    let n = parts.len();
    if n >= 3 && GOOS.contains(&parts[n - 2]) && GOARCH.contains(&parts[n - 1]) {
        return Some(format!("{}_{}", parts[n - 2], parts[n - 1]));
    }
    if n >= 2 && (GOOS.contains(&parts[n - 1]) || GOARCH.contains(&parts[n - 1])) {
        return Some(parts[n - 1].to_string());
    }
    None
}

fn is_test_file(name: &str) -> bool {
    name.starts_with("test_") && name.ends_with(".py")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn python_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "py") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

pub fn read_source(path: &Path) -> Result<SourceFile> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(SourceFile {
        path: path.display().to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn config(root: &Path) -> ValgenConfig {
        let mut config = ValgenConfig::default();
        config.input.path = root.to_path_buf();
        config
    }

    #[test]
    fn units_are_named_by_directory_or_stem() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "billing/models.py", "");
        write(dir.path(), "orders.py", "");
        write(dir.path(), "models.py", "");
        write(dir.path(), "__init__.py", "");

        let found = discover(&config(dir.path())).unwrap();
        let names: Vec<_> = found.units.iter().map(|u| u.unit.as_str()).collect();
        assert_eq!(names, ["billing", "models", "orders"]);
    }

    #[test]
    fn tests_pair_with_units_and_orphans_are_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "user/models.py", "");
        write(dir.path(), "common.py", "");
        write(dir.path(), "tests/test_user.py", "");
        write(dir.path(), "tests/test_ghost.py", "");

        let mut cfg = config(dir.path());
        cfg.input.common = Some(dir.path().join("common.py"));
        let found = discover(&cfg).unwrap();
        assert_eq!(found.units.len(), 1);
        assert_eq!(found.units[0].unit, "user");
        assert_eq!(found.units[0].tests.len(), 1);
        assert_eq!(found.orphans.len(), 1);
        assert!(found.orphans[0].to_string().contains("test_ghost.py"));
    }

    fn rejection(rel: &str) -> String {
        let dir = TempDir::new().unwrap();
        write(dir.path(), rel, "");
        format!("{:#}", discover(&config(dir.path())).unwrap_err())
    }

    #[test]
    fn common_unit_is_rejected() {
        let err = rejection("common/models.py");
        assert!(err.contains("unit `common` would overwrite the generated common.go"), "{err}");
        let err = rejection("common.py");
        assert!(err.contains("unit `common`"), "{err}");
    }

    #[test]
    fn test_suffixed_units_are_rejected() {
        let err = rejection("order_test/models.py");
        assert!(err.contains("ends with `_test`"), "{err}");
    }

    #[test]
    fn build_constraint_suffixes_are_rejected() {
        for (rel, suffix) in [
            ("order_linux.py", "linux"),
            ("order_amd64/models.py", "amd64"),
            ("order_windows_arm64.py", "windows_arm64"),
        ] {
            let err = rejection(rel);
            assert!(err.contains(&format!("ends with `_{suffix}`")), "{rel}: {err}");
        }
    }

    #[test]
    fn hidden_units_are_rejected() {
        let err = rejection(".cache/models.py");
        assert!(err.contains("starts with `_` or `.`"), "{err}");
        let err = rejection("_private/models.py");
        assert!(err.contains("starts with `_` or `.`"), "{err}");
    }

    #[test]
    fn bare_platform_names_are_units() {
        assert_eq!(build_constraint("linux"), None);
        assert_eq!(build_constraint("arm64"), None);
        assert_eq!(build_constraint("order"), None);
        assert_eq!(build_constraint("linux_amd64"), Some("amd64".to_string()));
        assert_eq!(build_constraint("order_linux_amd64"), Some("linux_amd64".to_string()));

        let dir = TempDir::new().unwrap();
        write(dir.path(), "linux/models.py", "");
        let found = discover(&config(dir.path())).unwrap();
        assert_eq!(found.units[0].unit, "linux");
    }

    #[test]
    fn colliding_units_fail() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/user/models.py", "");
        write(dir.path(), "b/user/models.py", "");
        assert!(discover(&config(dir.path())).is_err());
    }
}
