//! Go validator emitter.
//!
//! For every resolved model the unit gets a struct with JSON tags, an exported
//! `ValidateX(input map[string]any) (*X, Violations)` and an internal
//! `validateX` that converts and checks fields in declaration order. All
//! helpers live in the common unit, so generated units import nothing.

use crate::error::TranslateError;
use crate::input::RuleTable;
use crate::ir::*;
use crate::resolve::{Check, ResolvedEnum, ResolvedField, ResolvedModel, ResolvedSchema};
use crate::traits::Backend;
use serde_json::{Number, Value};

/// Options for Go generation.
#[derive(Debug, Clone)]
pub struct GoOptions {
    /// Package clause of every generated file.
    pub package: String,
}

impl Default for GoOptions {
    fn default() -> Self {
        Self {
            package: "validator".to_string(),
        }
    }
}

/// Go backend.
#[derive(Debug, Clone, Default)]
pub struct GoBackend {
    pub options: GoOptions,
}

impl GoBackend {
    pub fn new(options: GoOptions) -> Self {
        Self { options }
    }
}

impl Backend for GoBackend {
    fn name(&self) -> &'static str {
        "go"
    }

    fn language(&self) -> &'static str {
        "go"
    }

    fn extension(&self) -> &'static str {
        "go"
    }

    fn emit_validators(&self, schema: &ResolvedSchema) -> String {
        generate_go_validators(schema, &self.options)
    }

    fn emit_tests(
        &self,
        schema: &ResolvedSchema,
        cases: &[TestCase],
    ) -> Result<String, TranslateError> {
        super::go_tests::generate_go_tests(schema, cases, &self.options)
    }

    fn emit_common(&self, rules: &RuleTable) -> String {
        super::go_runtime::emit_common(&self.options.package, rules)
    }

    fn emit_common_tests(&self, rules: &RuleTable) -> String {
        super::go_runtime::emit_common_tests(&self.options.package, rules)
    }
}

/// Line-oriented Go source builder, indenting with tabs.
pub(crate) struct GoWriter {
    output: String,
    indent: usize,
}

impl GoWriter {
    pub(crate) fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push('\t');
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.output.push('\n');
    }

    /// Write `text` and indent what follows.
    pub(crate) fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    /// Dedent and write `text`.
    pub(crate) fn close(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    /// Append pre-formatted text at column zero.
    pub(crate) fn raw(&mut self, text: &str) {
        self.output.push_str(text);
        if !text.ends_with('\n') {
            self.output.push('\n');
        }
    }

    pub(crate) fn finish(self) -> String {
        self.output
    }
}

/// Interpreted Go string literal.
pub(crate) fn go_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Raw string literal when the text allows it (regular expressions read
/// better without doubled backslashes).
pub(crate) fn go_raw_string(s: &str) -> String {
    if s.contains('`') || s.contains('\r') || s.contains('\n') {
        go_string(s)
    } else {
        format!("`{s}`")
    }
}

/// Go float literal that stays a float constant.
pub(crate) fn go_float(n: &Number) -> String {
    let text = match n.as_f64() {
        Some(f) => format!("{f}"),
        None => n.to_string(),
    };
    if text.contains(['.', 'e', 'E']) || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{text}.0")
    }
}

fn go_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        n.to_string()
    } else {
        go_float(n)
    }
}

/// Go type of a descriptor, as a struct field type.
pub(crate) fn go_type(ty: &TypeDescriptor, schema: &ResolvedSchema) -> String {
    match ty {
        TypeDescriptor::Primitive { kind, .. } => match kind {
            Primitive::String(_) => "string".into(),
            Primitive::Integer => "int64".into(),
            Primitive::Float => "float64".into(),
            Primitive::Boolean => "bool".into(),
        },
        TypeDescriptor::Optional(inner) if is_nilable(inner) => go_type(inner, schema),
        TypeDescriptor::Optional(inner) => format!("*{}", go_type(inner, schema)),
        TypeDescriptor::Sequence(item) => format!("[]{}", go_type(item, schema)),
        TypeDescriptor::Mapping { value, .. } => format!("map[string]{}", go_type(value, schema)),
        TypeDescriptor::Reference(model) => model_go_name(schema, model),
        TypeDescriptor::Enum(descriptor) => match (&descriptor.name, descriptor.kind) {
            (Some(name), _) => enum_go_name(schema, name),
            (None, EnumKind::String) => "string".into(),
            (None, EnumKind::Integer) => "int64".into(),
        },
    }
}

/// Slices and maps already have a nil value.
pub(crate) fn is_nilable(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Sequence(_) | TypeDescriptor::Mapping { .. })
}

pub(crate) fn model_go_name(schema: &ResolvedSchema, model: &str) -> String {
    schema
        .model(model)
        .map(|m| m.go_name.clone())
        .unwrap_or_else(|| crate::names::to_go_identifier(model))
}

pub(crate) fn enum_go_name(schema: &ResolvedSchema, name: &str) -> String {
    schema
        .enumeration(name)
        .map(|e| e.go_name.clone())
        .unwrap_or_else(|| crate::names::to_go_identifier(name))
}

/// Go literal of an enum value: the named constant when there is one.
pub(crate) fn enum_value(schema: &ResolvedSchema, descriptor: &EnumDescriptor, value: &Value) -> String {
    if let Some(name) = &descriptor.name {
        if let Some(member) = schema
            .enumeration(name)
            .and_then(|e| e.members.iter().find(|m| &m.value == value))
        {
            return member.go_name.clone();
        }
    }
    match value {
        Value::String(s) => go_string(s),
        Value::Number(n) => go_number(n),
        other => other.to_string(),
    }
}

fn format_predicate(format: StringFormat) -> &'static str {
    match format {
        StringFormat::Email => "isEmail",
        StringFormat::Uuid => "isUUID",
        StringFormat::Ip => "isIP",
        StringFormat::Ipv4 => "isIPv4",
        StringFormat::Ipv6 => "isIPv6",
        StringFormat::Cidr => "isCIDR",
        StringFormat::Url => "isURL",
        StringFormat::DateTime => "isDateTime",
        StringFormat::Date => "isDate",
    }
}

fn format_message(format: StringFormat) -> &'static str {
    match format {
        StringFormat::Email => "value is not a valid email address",
        StringFormat::Uuid => "value is not a valid uuid",
        StringFormat::Ip => "value is not a valid IPv4 or IPv6 address",
        StringFormat::Ipv4 => "value is not a valid IPv4 address",
        StringFormat::Ipv6 => "value is not a valid IPv6 address",
        StringFormat::Cidr => "value is not a valid IPv4 or IPv6 network",
        StringFormat::Url => "invalid or missing URL scheme",
        StringFormat::DateTime => "invalid datetime format",
        StringFormat::Date => "invalid date format",
    }
}

/// Converter expression for a descriptor.
fn converter(ty: &TypeDescriptor, schema: &ResolvedSchema) -> String {
    match ty {
        TypeDescriptor::Primitive { kind, strict } => match (kind, strict) {
            (Primitive::String(None), _) => "convertString".into(),
            (Primitive::String(Some(format)), _) => format!(
                "formatted({}, {}, {})",
                go_string(format.identifier()),
                go_string(format_message(*format)),
                format_predicate(*format)
            ),
            (Primitive::Integer, false) => "convertInt".into(),
            (Primitive::Integer, true) => "convertStrictInt".into(),
            (Primitive::Float, false) => "convertFloat".into(),
            (Primitive::Float, true) => "convertStrictFloat".into(),
            (Primitive::Boolean, false) => "convertBool".into(),
            (Primitive::Boolean, true) => "convertStrictBool".into(),
        },
        TypeDescriptor::Optional(inner) if is_nilable(inner) => {
            format!("nullable({})", converter(inner, schema))
        }
        TypeDescriptor::Optional(inner) => format!("optionalOf({})", converter(inner, schema)),
        TypeDescriptor::Sequence(item) => format!("listOf({})", converter(item, schema)),
        TypeDescriptor::Mapping { value, .. } => format!("mapOf({})", converter(value, schema)),
        TypeDescriptor::Reference(model) => {
            format!("modelOf(validate{})", model_go_name(schema, model))
        }
        TypeDescriptor::Enum(descriptor) => {
            let values: Vec<String> = descriptor
                .variants
                .iter()
                .map(|v| enum_value(schema, descriptor, &v.value))
                .collect();
            let (function, base) = match descriptor.kind {
                EnumKind::String => ("stringEnum", "string"),
                EnumKind::Integer => ("intEnum", "int64"),
            };
            match &descriptor.name {
                Some(_) => format!("{function}({})", values.join(", ")),
                None => format!("{function}[{base}]({})", values.join(", ")),
            }
        }
    }
}

/// Generate the validator unit for one resolved schema.
pub fn generate_go_validators(schema: &ResolvedSchema, options: &GoOptions) -> String {
    let mut w = GoWriter::new();
    w.line(&format!(
        "// Code generated by valgen from {}. DO NOT EDIT.",
        schema.file
    ));
    w.blank();
    w.line(&format!("package {}", options.package));

    for definition in &schema.enums {
        w.blank();
        write_enum(&mut w, definition);
    }
    for model in &schema.models {
        w.blank();
        write_struct(&mut w, model, schema);
        w.blank();
        write_validate(&mut w, model);
        w.blank();
        write_validate_internal(&mut w, model, schema);
    }
    w.finish()
}

fn write_enum(w: &mut GoWriter, definition: &ResolvedEnum) {
    let base = match definition.kind {
        EnumKind::String => "string",
        EnumKind::Integer => "int64",
    };
    w.line(&format!(
        "// {} enumerates the permitted values of {}.",
        definition.go_name, definition.name
    ));
    w.line(&format!("type {} {base}", definition.go_name));
    w.blank();
    w.open("const (");
    let width = definition
        .members
        .iter()
        .map(|m| m.go_name.len())
        .max()
        .unwrap_or(0);
    for member in &definition.members {
        let value = match &member.value {
            Value::String(s) => go_string(s),
            other => other.to_string(),
        };
        w.line(&format!(
            "{:<width$} {} = {value}",
            member.go_name, definition.go_name
        ));
    }
    w.close(")");
}

fn write_struct(w: &mut GoWriter, model: &ResolvedModel, schema: &ResolvedSchema) {
    match &model.docs {
        Some(docs) => {
            for line in docs.trim().lines() {
                let line = line.trim();
                if line.is_empty() {
                    w.line("//");
                } else {
                    w.line(&format!("// {line}"));
                }
            }
        }
        None => w.line(&format!(
            "// {} is generated from {}.",
            model.go_name, model.location
        )),
    }
    if model.fields.is_empty() {
        w.line(&format!("type {} struct{{}}", model.go_name));
        return;
    }
    w.open(&format!("type {} struct {{", model.go_name));
    let rows: Vec<(String, String, String)> = model
        .fields
        .iter()
        .map(|f| {
            let tag = if f.ty.is_optional() {
                format!("`json:\"{},omitempty\"`", f.json_name)
            } else {
                format!("`json:\"{}\"`", f.json_name)
            };
            (f.go_name.clone(), go_type(&f.ty, schema), tag)
        })
        .collect();
    let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
    let type_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);
    for (name, ty, tag) in rows {
        w.line(&format!("{name:<name_width$} {ty:<type_width$} {tag}"));
    }
    w.close("}");
}

fn write_validate(w: &mut GoWriter, model: &ResolvedModel) {
    let name = &model.go_name;
    w.line(&format!(
        "// Validate{name} converts input into a {name}, or returns every violation found."
    ));
    w.open(&format!(
        "func Validate{name}(input map[string]any) (*{name}, Violations) {{"
    ));
    w.line("var errs Violations");
    w.line(&format!("out, ok := validate{name}(input, \"\", &errs)"));
    w.open("if !ok {");
    w.line("return nil, errs");
    w.close("}");
    w.line("return &out, nil");
    w.close("}");
}

fn write_validate_internal(w: &mut GoWriter, model: &ResolvedModel, schema: &ResolvedSchema) {
    let name = &model.go_name;
    w.open(&format!(
        "func validate{name}(input map[string]any, prefix string, errs *Violations) ({name}, bool) {{"
    ));
    w.line(&format!("var out {name}"));
    w.line("start := len(*errs)");
    for field in &model.fields {
        write_field(w, field, schema);
    }
    if model.forbid_extra {
        write_extra_check(w, model);
    }
    if !model.hooks.is_empty() {
        w.open("if len(*errs) == start {");
        for hook in &model.hooks {
            w.open(&format!("if err := modelHook({}, &out); err != nil {{", go_string(&hook.key)));
            w.line(&format!(
                "report(errs, rootPath(prefix), {}, err.Error())",
                go_string(&hook.name)
            ));
            w.close("}");
        }
        w.close("}");
    }
    w.line("return out, len(*errs) == start");
    w.close("}");
}

fn write_field(w: &mut GoWriter, field: &ResolvedField, schema: &ResolvedSchema) {
    let key = go_string(&field.json_name);
    let target = format!("out.{}", field.go_name);
    let optional = field.ty.is_optional();
    let inner = field.ty.strip_optional();
    let assign = if optional && !is_nilable(inner) {
        format!("{target} = &v")
    } else {
        format!("{target} = v")
    };

    let on_missing: Option<String> = if field.required {
        Some("report(errs, path, \"missing\", \"field required\")".into())
    } else {
        match &field.default {
            Some(Value::Null) | None => None,
            Some(value) => Some(format!("{target} = {}", go_value(value, &field.ty, schema))),
        }
    };

    w.open("{");
    w.line(&format!("path := joinPath(prefix, {key})"));
    match (&on_missing, optional) {
        (None, true) => {
            w.open(&format!("if raw, present := input[{key}]; present && raw != nil {{"));
        }
        (None, false) => {
            w.open(&format!("if raw, present := input[{key}]; present {{"));
        }
        (Some(missing), _) => {
            w.line(&format!("raw, present := input[{key}]"));
            w.line("switch {");
            w.line("case !present:");
            w.indent += 1;
            w.line(missing);
            w.indent -= 1;
            if optional {
                w.line("case raw == nil:");
            }
            w.line("default:");
            w.indent += 1;
        }
    }

    w.open(&format!(
        "if v, ok := {}(raw, path, errs); ok {{",
        converter(inner, schema)
    ));
    w.line(&assign);
    for check in &field.checks {
        write_check(w, check, inner);
    }
    w.close("}");
    // Closes either the presence `if` or the `default:` arm of the switch.
    w.close("}");
    w.close("}");
}

/// Condition under which a constraint holds for `v`.
fn condition(kind: &ConstraintKind, ty: &TypeDescriptor) -> Option<String> {
    let is_string = matches!(ty, TypeDescriptor::Primitive { kind: Primitive::String(_), .. });
    let is_integer = matches!(ty, TypeDescriptor::Primitive { kind: Primitive::Integer, .. });
    let length = if is_string { "runeLen(v)" } else { "len(v)" };
    let bound = |n: &Number| {
        if is_integer && !(n.is_i64() || n.is_u64()) {
            ("float64(v)", go_float(n))
        } else {
            ("v", go_number(n))
        }
    };
    let cond = match kind {
        ConstraintKind::MinLength(n) | ConstraintKind::MinItems(n) => format!("{length} >= {n}"),
        ConstraintKind::MaxLength(n) | ConstraintKind::MaxItems(n) => format!("{length} <= {n}"),
        ConstraintKind::Ge(n) => {
            let (v, n) = bound(n);
            format!("{v} >= {n}")
        }
        ConstraintKind::Gt(n) => {
            let (v, n) = bound(n);
            format!("{v} > {n}")
        }
        ConstraintKind::Le(n) => {
            let (v, n) = bound(n);
            format!("{v} <= {n}")
        }
        ConstraintKind::Lt(n) => {
            let (v, n) = bound(n);
            format!("{v} < {n}")
        }
        ConstraintKind::MultipleOf(n) => {
            if is_integer && (n.is_i64() || n.is_u64()) {
                format!("v%{n} == 0")
            } else if is_integer {
                format!("isMultipleOf(float64(v), {})", go_float(n))
            } else {
                format!("isMultipleOf(v, {})", go_float(n))
            }
        }
        ConstraintKind::Pattern { regex, anchored } => {
            let pattern = if *anchored {
                format!("^(?:{regex})")
            } else {
                regex.clone()
            };
            format!("matchPattern({}, v)", go_raw_string(&pattern))
        }
        ConstraintKind::Format {
            format,
            each_item: false,
        } => format!("{}(v)", format_predicate(*format)),
        ConstraintKind::Format {
            format,
            each_item: true,
        } => format!("every(v, {})", format_predicate(*format)),
        ConstraintKind::Hook(_) => return None,
    };
    Some(cond)
}

fn message(kind: &ConstraintKind, ty: &TypeDescriptor) -> String {
    let is_string = matches!(ty, TypeDescriptor::Primitive { kind: Primitive::String(_), .. });
    let unit = if is_string { "characters" } else { "items" };
    match kind {
        ConstraintKind::MinLength(n) => format!("ensure this value has at least {n} {unit}"),
        ConstraintKind::MaxLength(n) => format!("ensure this value has at most {n} {unit}"),
        ConstraintKind::MinItems(n) => format!("ensure this value has at least {n} items"),
        ConstraintKind::MaxItems(n) => format!("ensure this value has at most {n} items"),
        ConstraintKind::Ge(n) => format!("ensure this value is greater than or equal to {n}"),
        ConstraintKind::Gt(n) => format!("ensure this value is greater than {n}"),
        ConstraintKind::Le(n) => format!("ensure this value is less than or equal to {n}"),
        ConstraintKind::Lt(n) => format!("ensure this value is less than {n}"),
        ConstraintKind::MultipleOf(n) => format!("ensure this value is a multiple of {n}"),
        ConstraintKind::Pattern { regex, .. } => format!("string does not match regex \"{regex}\""),
        ConstraintKind::Format {
            format,
            each_item: false,
        } => format_message(*format).to_string(),
        ConstraintKind::Format {
            format,
            each_item: true,
        } => format!("every item must satisfy {}", format.identifier()),
        ConstraintKind::Hook(hook) => format!("validator {} failed", hook.name),
    }
}

fn write_check(w: &mut GoWriter, check: &Check, ty: &TypeDescriptor) {
    let id = go_string(&check.identifier);
    let conditions: Vec<(String, &ConstraintKind)> = check
        .kinds
        .iter()
        .filter_map(|k| condition(k, ty).map(|c| (c, k)))
        .collect();

    if !conditions.is_empty() {
        let msg = match conditions.as_slice() {
            [(_, kind)] => message(kind, ty),
            _ => format!(
                "value does not satisfy {} ({})",
                check.identifier,
                check
                    .kinds
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let joined = match conditions.as_slice() {
            [(c, _)] => c.clone(),
            many => many
                .iter()
                .map(|(c, _)| c.as_str())
                .collect::<Vec<_>>()
                .join(" && "),
        };
        w.open(&format!("if !({joined}) {{"));
        w.line(&format!("report(errs, path, {id}, {})", go_string(&msg)));
        w.close("}");
    }

    for kind in &check.kinds {
        let ConstraintKind::Hook(hook) = kind else {
            continue;
        };
        let key = go_string(&hook.key);
        if hook.each_item {
            let (range, item_path, item) = match ty {
                TypeDescriptor::Mapping { .. } => ("_, k := range sortedKeys(v)", "keyPath(path, k)", "v[k]"),
                _ => ("i, item := range v", "indexPath(path, i)", "item"),
            };
            w.open(&format!("for {range} {{"));
            w.open(&format!("if err := fieldHook({key}, {item}); err != nil {{"));
            w.line(&format!("report(errs, {item_path}, {id}, err.Error())"));
            w.close("}");
            w.close("}");
        } else {
            w.open(&format!("if err := fieldHook({key}, v); err != nil {{"));
            w.line(&format!("report(errs, path, {id}, err.Error())"));
            w.close("}");
        }
    }
}

fn write_extra_check(w: &mut GoWriter, model: &ResolvedModel) {
    w.open("for _, key := range sortedKeys(input) {");
    w.line("switch key {");
    if !model.fields.is_empty() {
        let known: Vec<String> = model.fields.iter().map(|f| go_string(&f.json_name)).collect();
        w.line(&format!("case {}:", known.join(", ")));
    }
    w.line("default:");
    w.indent += 1;
    w.line("report(errs, joinPath(prefix, key), \"extra_forbidden\", \"extra fields not permitted\")");
    w.close("}");
    w.close("}");
}

/// Go expression for a coerced value of type `ty`.
pub(crate) fn go_value(value: &Value, ty: &TypeDescriptor, schema: &ResolvedSchema) -> String {
    match ty {
        TypeDescriptor::Optional(inner) => {
            if value.is_null() {
                return "nil".into();
            }
            if is_nilable(inner) {
                return go_value(value, inner, schema);
            }
            match &**inner {
                TypeDescriptor::Reference(_) => format!("&{}", go_value(value, inner, schema)),
                _ => format!("ptr[{}]({})", go_type(inner, schema), go_value(value, inner, schema)),
            }
        }
        TypeDescriptor::Primitive { kind, .. } => match (kind, value) {
            (Primitive::String(_), Value::String(s)) => go_string(s),
            (Primitive::Float, Value::Number(n)) => go_float(n),
            (_, Value::Number(n)) => go_number(n),
            (_, Value::Bool(b)) => b.to_string(),
            (_, other) => other.to_string(),
        },
        TypeDescriptor::Sequence(item) => {
            let items: Vec<String> = value
                .as_array()
                .map(|items| items.iter().map(|v| go_value(v, item, schema)).collect())
                .unwrap_or_default();
            format!("{}{{{}}}", go_type(ty, schema), items.join(", "))
        }
        TypeDescriptor::Mapping { value: item, .. } => {
            let entries: Vec<String> = value
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| format!("{}: {}", go_string(k), go_value(v, item, schema)))
                        .collect()
                })
                .unwrap_or_default();
            format!("{}{{{}}}", go_type(ty, schema), entries.join(", "))
        }
        TypeDescriptor::Reference(model) => {
            let go_name = model_go_name(schema, model);
            let Some(resolved) = schema.model(model) else {
                return format!("{go_name}{{}}");
            };
            let fields: Vec<String> = resolved
                .fields
                .iter()
                .filter_map(|f| {
                    let v = value.get(&f.json_name)?;
                    (!v.is_null()).then(|| format!("{}: {}", f.go_name, go_value(v, &f.ty, schema)))
                })
                .collect();
            format!("{go_name}{{{}}}", fields.join(", "))
        }
        TypeDescriptor::Enum(descriptor) => enum_value(schema, descriptor, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ParseOptions, parse_models};
    use crate::names::NameTable;
    use crate::resolve::resolve;

    fn generate(source: &str, rules: &RuleTable) -> String {
        let graph = parse_models(source, "models.py", &ParseOptions::default()).unwrap();
        let names = NameTable::build([("models", &graph)]);
        let schema = resolve(&graph, "models", rules, &names).unwrap();
        generate_go_validators(&schema, &GoOptions::default())
    }

    #[test]
    fn struct_is_aligned_and_tagged() {
        let out = generate(
            "class User(BaseModel):\n    age: int\n    nick_name: Optional[str] = None\n",
            &RuleTable::new(),
        );
        assert!(out.contains("type User struct {\n\tAge      int64   `json:\"age\"`\n\tNickName *string `json:\"nick_name,omitempty\"`\n}\n"));
        assert!(out.contains("func ValidateUser(input map[string]any) (*User, Violations) {"));
        assert!(!out.contains("import"));
    }

    #[test]
    fn required_field_with_check() {
        let out = generate("class User(BaseModel):\n    age: int = Field(..., ge=0)\n", &RuleTable::new());
        let expected = "\t{\n\
\t\tpath := joinPath(prefix, \"age\")\n\
\t\traw, present := input[\"age\"]\n\
\t\tswitch {\n\
\t\tcase !present:\n\
\t\t\treport(errs, path, \"missing\", \"field required\")\n\
\t\tdefault:\n\
\t\t\tif v, ok := convertInt(raw, path, errs); ok {\n\
\t\t\t\tout.Age = v\n\
\t\t\t\tif !(v >= 0) {\n\
\t\t\t\t\treport(errs, path, \"ge\", \"ensure this value is greater than or equal to 0\")\n\
\t\t\t\t}\n\
\t\t\t}\n\
\t\t}\n\
\t}\n";
        assert!(out.contains(expected), "{out}");
    }

    #[test]
    fn optional_field_without_default() {
        let out = generate("class A(BaseModel):\n    n: Optional[int]\n", &RuleTable::new());
        assert!(out.contains("if raw, present := input[\"n\"]; present && raw != nil {"));
        assert!(out.contains("out.N = &v"));
    }

    #[test]
    fn defaults_and_enums() {
        let out = generate(
            "class Color(str, Enum):\n    DARK_RED = 'dark-red'\n    BLUE = 'blue'\n\nclass A(BaseModel):\n    color: Color = Color.BLUE\n    tags: List[str] = ['x']\n    ratio: float = 0.5\n",
            &RuleTable::new(),
        );
        assert!(out.contains("type Color string\n"));
        assert!(out.contains("\tColorDarkRed Color = \"dark-red\"\n"));
        assert!(out.contains("stringEnum(ColorDarkRed, ColorBlue)"));
        assert!(out.contains("out.Tags = []string{\"x\"}"));
        assert!(out.contains("out.Ratio = 0.5"));
    }

    #[test]
    fn rule_and_hook_checks() {
        let rules = RuleTable::parse(
            "nonempty = Rule(min_length=1)\npercent = Rule(ge=0, le=100)\n\ndef slug(cls, v):\n    return v\n",
            "common.py",
        )
        .unwrap();
        let out = generate(
            "class A(BaseModel):\n    name: Annotated[str, nonempty, slug]\n    p: Annotated[float, percent]\n    tags: List[str]\n\n    @validator('tags', each_item=True)\n    def tag_ok(cls, v):\n        return v\n",
            &rules,
        );
        assert!(out.contains("if !(runeLen(v) >= 1) {"));
        assert!(out.contains("report(errs, path, \"nonempty\", \"ensure this value has at least 1 characters\")"));
        assert!(out.contains("if err := fieldHook(\"slug\", v); err != nil {"));
        assert!(out.contains("if !(v >= 0 && v <= 100) {"));
        assert!(out.contains("report(errs, path, \"percent\", \"value does not satisfy percent (ge=0, le=100)\")"));
        assert!(out.contains("for i, item := range v {"));
        assert!(out.contains("fieldHook(\"models.A.tag_ok\", item)"));
    }

    #[test]
    fn nested_models_and_extra_policy() {
        let out = generate(
            "class Address(BaseModel):\n    zip: str\n\nclass User(BaseModel):\n    model_config = ConfigDict(extra='forbid')\n    address: Address\n    items: List[Address] = []\n\n    @model_validator(mode='after')\n    def check(self):\n        return self\n",
            &RuleTable::new(),
        );
        assert!(out.contains("modelOf(validateAddress)(raw, path, errs)"));
        assert!(out.contains("listOf(modelOf(validateAddress))"));
        assert!(out.contains("case \"address\", \"items\":"));
        assert!(out.contains("\"extra_forbidden\""));
        assert!(out.contains("if err := modelHook(\"models.User.check\", &out); err != nil {"));
        assert!(out.contains("out.Items = []Address{}"));
    }

    #[test]
    fn patterns_are_anchored_for_regex() {
        let out = generate(
            "class A(BaseModel):\n    zip: str = Field(regex=r'\\d{5}')\n    code: str = Field(pattern=r'[A-Z]+')\n",
            &RuleTable::new(),
        );
        assert!(out.contains("matchPattern(`^(?:\\d{5})`, v)"));
        assert!(out.contains("matchPattern(`[A-Z]+`, v)"));
    }
}
