use valgen_translate::{
    ErrorKind, GoBackend, ParseOptions, RuleTable, SourceFile, TranslateError, UnitInput,
    UnitOutput, name_table, parse_unit, translate_unit,
};

const COMMON: &str = r#"
nonempty = Rule(min_length=1)
percent = Rule(ge=0, le=100)

def check_email(cls, v):
    return v
"#;

fn unit(name: &str, models: &str, tests: &str) -> UnitInput {
    UnitInput {
        unit: name.to_string(),
        models: SourceFile {
            path: format!("{name}.py"),
            text: models.to_string(),
        },
        tests: vec![SourceFile {
            path: format!("test_{name}.py"),
            text: tests.to_string(),
        }],
    }
}

fn translate_all(inputs: &[UnitInput]) -> Vec<Result<UnitOutput, TranslateError>> {
    let rules = RuleTable::parse(COMMON, "common.py").unwrap();
    let parsed: Vec<_> = inputs
        .iter()
        .map(|u| parse_unit(u, &ParseOptions::default()).unwrap())
        .collect();
    let names = name_table(&parsed);
    let backend = GoBackend::default();
    parsed
        .iter()
        .map(|p| translate_unit(p, &rules, &names, &backend))
        .collect()
}

fn translate_one(models: &str, tests: &str) -> Result<UnitOutput, TranslateError> {
    translate_all(&[unit("user", models, tests)]).remove(0)
}

#[test]
fn checks_follow_field_order() {
    let out = translate_one(
        "class User(BaseModel):\n    age: int = Field(ge=0)\n    name: Annotated[str, nonempty]\n",
        "",
    )
    .unwrap();
    let ge = out.validators.find("report(errs, path, \"ge\"").unwrap();
    let nonempty = out.validators.find("report(errs, path, \"nonempty\"").unwrap();
    assert!(ge < nonempty);
    assert!(out.validators.contains("if !(runeLen(v) >= 1) {"));
}

#[test]
fn reject_case_lists_violations_in_field_order() {
    let out = translate_one(
        "class User(BaseModel):\n    age: int = Field(ge=0)\n    name: Annotated[str, nonempty]\n",
        r#"
import pytest

class TestUser:
    def test_invalid(self):
        with pytest.raises(ValidationError, match="ge|nonempty"):
            User(age=-1, name="")

    def test_valid(self):
        user = User(age=30, name="ada")
"#,
    )
    .unwrap();
    assert!(out.tests.contains("// TestUser.test_invalid (test_user.py:7)"));
    assert!(out.tests.contains("func TestUserCase1(t *testing.T) {"));
    assert!(out.tests.contains("assert.True(t, errs.InOrder(\"ge\", \"nonempty\"), errs.Error())"));
    assert!(out.tests.contains("assert.Equal(t, &User{Age: 30, Name: \"ada\"}, got)"));
    assert!(out.tests.contains("func TestUserRejectsEmptyPayload(t *testing.T) {"));
}

#[test]
fn nested_violations_use_nested_paths() {
    let out = translate_one(
        r#"
class Address(BaseModel):
    zip: str = Field(regex=r'^\d{5}$')

class User(BaseModel):
    address: Address
    previous: List[Address] = []
    labels: Dict[str, Address] = {}
"#,
        "",
    )
    .unwrap();
    assert!(out.validators.contains("path := joinPath(prefix, \"zip\")"));
    assert!(out.validators.contains("modelOf(validateAddress)(raw, path, errs)"));
    assert!(out.validators.contains("listOf(modelOf(validateAddress))(raw, path, errs)"));
    assert!(out.validators.contains("mapOf(modelOf(validateAddress))(raw, path, errs)"));
}

#[test]
fn unknown_rule_reference_fails() {
    let err = translate_one("class User(BaseModel):\n    name: Annotated[str, nonblank]\n", "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRule);
    assert!(err.to_string().contains("nonblank"));
}

#[test]
fn duplicate_rules_fail() {
    let err = RuleTable::parse(
        "nonempty = Rule(min_length=1)\nnonempty = Rule(min_length=2)\n",
        "common.py",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateRule);
    assert_eq!(err.location().line, 2);
}

#[test]
fn cyclic_models_fail() {
    let err = translate_one(
        "class A(BaseModel):\n    b: 'B'\n\nclass B(BaseModel):\n    a: Optional[A] = None\n",
        "",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicModelReference);
    assert!(err.to_string().contains("A -> B -> A"));
}

#[test]
fn empty_enum_fails() {
    let err = translate_one(
        "class Kind(str, Enum):\n    pass\n\nclass A(BaseModel):\n    kind: Kind\n",
        "",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyEnum);
}

#[test]
fn case_for_unknown_model_is_orphan() {
    let err = translate_one(
        "class User(BaseModel):\n    name: str\n",
        "def test_order():\n    Order(id=1)\n",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OrphanTestCase);
}

#[test]
fn colliding_names_are_qualified_by_unit() {
    let outputs = translate_all(&[
        unit("billing", "class Address(BaseModel):\n    street: str\n", ""),
        unit("shipping", "class Address(BaseModel):\n    zip: str\n", ""),
    ]);
    let billing = outputs[0].as_ref().unwrap();
    let shipping = outputs[1].as_ref().unwrap();
    assert!(billing.validators.contains("type Address struct {"));
    assert!(shipping.validators.contains("type ShippingAddress struct {"));
    assert!(shipping.tests.contains("func TestShippingAddressRejectsEmptyPayload"));
}

#[test]
fn translation_is_deterministic() {
    let models = "class User(BaseModel):\n    age: int = Field(ge=0)\n    tags: Dict[str, int] = {}\n";
    let tests = "def test_ok():\n    User(age=1, tags={'b': 2, 'a': 1})\n";
    let first = translate_one(models, tests).unwrap();
    let second = translate_one(models, tests).unwrap();
    assert_eq!(first, second);
}
