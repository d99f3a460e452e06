use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const COMMON: &str = "nonempty = Rule(min_length=1)\n\ndef check_email(cls, v):\n    return v\n";

const MODELS: &str = r#"
from pydantic import BaseModel, Field
from typing import Annotated, List, Optional

from common import nonempty, check_email


class Address(BaseModel):
    zip: str = Field(regex=r"^\d{5}$")


class User(BaseModel):
    """A registered user."""

    age: int = Field(ge=0)
    name: Annotated[str, nonempty]
    email: Annotated[str, check_email]
    address: Optional[Address] = None
    tags: List[str] = []
"#;

const TESTS: &str = r#"
import pytest
from pydantic import ValidationError

from user.models import User


def test_valid_user():
    User(age=30, name="ada", email="ada@example.com", address={"zip": "12345"})


def test_invalid_user():
    with pytest.raises(ValidationError, match="ge|nonempty"):
        User(age=-1, name="", email="ada@example.com")
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("schemas/user")).unwrap();
    fs::create_dir_all(root.join("tests")).unwrap();
    fs::write(root.join("schemas/common.py"), COMMON).unwrap();
    fs::write(root.join("schemas/user/models.py"), MODELS).unwrap();
    fs::write(root.join("tests/test_user.py"), TESTS).unwrap();
    dir
}

fn valgen(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("valgen").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn convert_writes_the_go_package() {
    let dir = project();
    valgen(dir.path())
        .args([
            "convert",
            "--path",
            "schemas",
            "--common",
            "schemas/common.py",
            "--tests",
            "tests",
            "--dest",
            "out",
        ])
        .assert()
        .success();

    let out = dir.path().join("out");
    let validators = fs::read_to_string(out.join("user.go")).unwrap();
    assert!(validators.starts_with("// Code generated by valgen from schemas/user/models.py. DO NOT EDIT.\n\npackage validator\n"));
    assert!(validators.contains("// A registered user.\ntype User struct {"));
    assert!(validators.contains("report(errs, path, \"check_email\""));

    let tests = fs::read_to_string(out.join("user_test.go")).unwrap();
    assert!(tests.contains("func TestUserCase1(t *testing.T) {"));
    assert!(tests.contains("func TestUserCase2(t *testing.T) {"));
    assert!(tests.contains("errs.InOrder(\"ge\", \"nonempty\")"));

    let common = fs::read_to_string(out.join("common.go")).unwrap();
    assert!(common.contains("\"nonempty\":    \"min_length=1\","));
    assert!(out.join("common_test.go").is_file());
}

#[test]
fn config_file_supplies_defaults() {
    let dir = project();
    fs::write(
        dir.path().join("valgen.toml"),
        "[input]\npath = \"schemas\"\ncommon = \"schemas/common.py\"\ntests = \"tests\"\n\n[output]\ndest = \"gen\"\npackage = \"checks\"\n",
    )
    .unwrap();
    valgen(dir.path()).arg("convert").assert().success();

    let validators = fs::read_to_string(dir.path().join("gen/user.go")).unwrap();
    assert!(validators.contains("\npackage checks\n"));
}

#[test]
fn failing_unit_exits_non_zero_and_writes_nothing_for_it() {
    let dir = project();
    fs::create_dir_all(dir.path().join("schemas/broken")).unwrap();
    fs::write(
        dir.path().join("schemas/broken/models.py"),
        "class Broken(BaseModel):\n    name: Annotated[str, nonblank]\n",
    )
    .unwrap();

    let output = valgen(dir.path())
        .args([
            "convert",
            "--path",
            "schemas",
            "--common",
            "schemas/common.py",
            "--tests",
            "tests",
            "--dest",
            "out",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("UnknownRule"), "{stderr}");
    assert!(!dir.path().join("out/broken.go").exists());
    assert!(dir.path().join("out/user.go").is_file());
}

#[test]
fn orphan_test_file_fails_the_run() {
    let dir = project();
    fs::write(dir.path().join("tests/test_ghost.py"), "def test_x():\n    pass\n").unwrap();
    let output = valgen(dir.path())
        .args(["convert", "--path", "schemas", "--common", "schemas/common.py", "--tests", "tests"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OrphanTestCase"));
}

#[test]
fn schema_prints_resolved_json() {
    let dir = project();
    let output = valgen(dir.path())
        .args(["schema", "schemas/user/models.py", "--common", "schemas/common.py"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["models"][1]["go_name"], "User");
    assert_eq!(json["models"][1]["fields"][1]["checks"][0]["identifier"], "nonempty");
}
