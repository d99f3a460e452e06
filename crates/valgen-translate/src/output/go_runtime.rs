//! The common Go unit: runtime helpers every generated validator calls, and
//! the catalogue of shared rules.

use super::go::{GoWriter, go_string};
use crate::input::RuleTable;

const RUNTIME: &str = r#"import (
	"encoding/json"
	"fmt"
	"math"
	"net"
	"net/mail"
	"net/url"
	"regexp"
	"sort"
	"strconv"
	"strings"
	"sync"
	"time"
	"unicode/utf8"
)

// Violation is one failed check.
type Violation struct {
	Path    string `json:"path"`
	Rule    string `json:"rule"`
	Message string `json:"message"`
}

// Violations lists every failed check of one validation, in check order.
type Violations []Violation

func (v Violations) Error() string {
	parts := make([]string, 0, len(v))
	for _, violation := range v {
		parts = append(parts, fmt.Sprintf("%s: %s (%s)", violation.Path, violation.Message, violation.Rule))
	}
	return strings.Join(parts, "; ")
}

// Has reports whether any violation carries the rule identifier.
func (v Violations) Has(rule string) bool {
	for _, violation := range v {
		if violation.Rule == rule {
			return true
		}
	}
	return false
}

// At returns the violations recorded for path.
func (v Violations) At(path string) Violations {
	var out Violations
	for _, violation := range v {
		if violation.Path == path {
			out = append(out, violation)
		}
	}
	return out
}

// Rules returns the rule identifiers in order of occurrence.
func (v Violations) Rules() []string {
	out := make([]string, 0, len(v))
	for _, violation := range v {
		out = append(out, violation.Rule)
	}
	return out
}

// InOrder reports whether the first occurrences of rules appear in the given order.
func (v Violations) InOrder(rules ...string) bool {
	last := -1
	for _, rule := range rules {
		index := -1
		for i, violation := range v {
			if violation.Rule == rule {
				index = i
				break
			}
		}
		if index <= last {
			return false
		}
		last = index
	}
	return true
}

// FieldHook checks a converted field value.
type FieldHook func(value any) error

// ModelHook checks a fully converted model.
type ModelHook func(model any) error

var (
	hooksMu    sync.RWMutex
	fieldHooks = map[string]FieldHook{}
	modelHooks = map[string]ModelHook{}
)

// RegisterFieldHook installs the body of a field validator. Unregistered hooks pass.
func RegisterFieldHook(key string, hook FieldHook) {
	hooksMu.Lock()
	defer hooksMu.Unlock()
	fieldHooks[key] = hook
}

// RegisterModelHook installs the body of a model validator. Unregistered hooks pass.
// Model hooks are keyed per concrete model type: a model validator inherited
// by a subclass runs under the subclass key, so register it once for each
// model ("unit.Child.func" as well as "unit.Parent.func").
func RegisterModelHook(key string, hook ModelHook) {
	hooksMu.Lock()
	defer hooksMu.Unlock()
	modelHooks[key] = hook
}

func fieldHook(key string, value any) error {
	hooksMu.RLock()
	hook, ok := fieldHooks[key]
	hooksMu.RUnlock()
	if !ok {
		return nil
	}
	return hook(value)
}

func modelHook(key string, model any) error {
	hooksMu.RLock()
	hook, ok := modelHooks[key]
	hooksMu.RUnlock()
	if !ok {
		return nil
	}
	return hook(model)
}

func report(errs *Violations, path, rule, message string) {
	*errs = append(*errs, Violation{Path: path, Rule: rule, Message: message})
}

func joinPath(prefix, name string) string {
	if prefix == "" {
		return name
	}
	return prefix + "." + name
}

func indexPath(prefix string, i int) string {
	return prefix + "[" + strconv.Itoa(i) + "]"
}

func keyPath(prefix, key string) string {
	return prefix + "[" + strconv.Quote(key) + "]"
}

func rootPath(prefix string) string {
	if prefix == "" {
		return "__root__"
	}
	return prefix
}

func sortedKeys[V any](m map[string]V) []string {
	keys := make([]string, 0, len(m))
	for key := range m {
		keys = append(keys, key)
	}
	sort.Strings(keys)
	return keys
}

func ptr[T any](v T) *T {
	return &v
}

func typeError(errs *Violations, path string, value any, message string) {
	if value == nil {
		message = "none is not an allowed value"
	}
	report(errs, path, "type", message)
}

func integral(value any) (int64, bool) {
	switch v := value.(type) {
	case int:
		return int64(v), true
	case int8:
		return int64(v), true
	case int16:
		return int64(v), true
	case int32:
		return int64(v), true
	case int64:
		return v, true
	case uint:
		return int64(v), uint64(v) <= math.MaxInt64
	case uint8:
		return int64(v), true
	case uint16:
		return int64(v), true
	case uint32:
		return int64(v), true
	case uint64:
		return int64(v), v <= math.MaxInt64
	case float32:
		return integral(float64(v))
	case float64:
		if v != math.Trunc(v) || v < math.MinInt64 || v >= math.MaxInt64 {
			return 0, false
		}
		return int64(v), true
	case json.Number:
		if i, err := v.Int64(); err == nil {
			return i, true
		}
		if f, err := v.Float64(); err == nil {
			return integral(f)
		}
	}
	return 0, false
}

func numeric(value any) (float64, bool) {
	switch v := value.(type) {
	case float64:
		return v, true
	case float32:
		return float64(v), true
	case json.Number:
		f, err := v.Float64()
		return f, err == nil
	case bool:
		return 0, false
	}
	if i, ok := integral(value); ok {
		return float64(i), true
	}
	return 0, false
}

func convertString(value any, path string, errs *Violations) (string, bool) {
	if s, ok := value.(string); ok {
		return s, true
	}
	typeError(errs, path, value, "str type expected")
	return "", false
}

func convertInt(value any, path string, errs *Violations) (int64, bool) {
	if s, ok := value.(string); ok {
		if i, err := strconv.ParseInt(strings.TrimSpace(s), 10, 64); err == nil {
			return i, true
		}
	}
	return convertStrictInt(value, path, errs)
}

func convertStrictInt(value any, path string, errs *Violations) (int64, bool) {
	if i, ok := integral(value); ok {
		return i, true
	}
	typeError(errs, path, value, "value is not a valid integer")
	return 0, false
}

func convertFloat(value any, path string, errs *Violations) (float64, bool) {
	if s, ok := value.(string); ok {
		if f, err := strconv.ParseFloat(strings.TrimSpace(s), 64); err == nil {
			return f, true
		}
	}
	return convertStrictFloat(value, path, errs)
}

func convertStrictFloat(value any, path string, errs *Violations) (float64, bool) {
	if f, ok := numeric(value); ok {
		return f, true
	}
	typeError(errs, path, value, "value is not a valid float")
	return 0, false
}

func convertBool(value any, path string, errs *Violations) (bool, bool) {
	switch v := value.(type) {
	case bool:
		return v, true
	case string:
		switch strings.ToLower(strings.TrimSpace(v)) {
		case "true", "1", "yes", "on", "y", "t":
			return true, true
		case "false", "0", "no", "off", "n", "f":
			return false, true
		}
	default:
		if i, ok := integral(value); ok && (i == 0 || i == 1) {
			return i == 1, true
		}
	}
	typeError(errs, path, value, "value could not be parsed to a boolean")
	return false, false
}

func convertStrictBool(value any, path string, errs *Violations) (bool, bool) {
	if b, ok := value.(bool); ok {
		return b, true
	}
	typeError(errs, path, value, "value is not a valid boolean")
	return false, false
}

func listOf[T any](item func(any, string, *Violations) (T, bool)) func(any, string, *Violations) ([]T, bool) {
	return func(value any, path string, errs *Violations) ([]T, bool) {
		items, ok := value.([]any)
		if !ok {
			typeError(errs, path, value, "value is not a valid list")
			return nil, false
		}
		out := make([]T, 0, len(items))
		valid := true
		for i, raw := range items {
			v, ok := item(raw, indexPath(path, i), errs)
			valid = valid && ok
			out = append(out, v)
		}
		return out, valid
	}
}

func mapOf[T any](item func(any, string, *Violations) (T, bool)) func(any, string, *Violations) (map[string]T, bool) {
	return func(value any, path string, errs *Violations) (map[string]T, bool) {
		entries, ok := value.(map[string]any)
		if !ok {
			typeError(errs, path, value, "value is not a valid dict")
			return nil, false
		}
		out := make(map[string]T, len(entries))
		valid := true
		for _, key := range sortedKeys(entries) {
			v, ok := item(entries[key], keyPath(path, key), errs)
			valid = valid && ok
			out[key] = v
		}
		return out, valid
	}
}

func optionalOf[T any](inner func(any, string, *Violations) (T, bool)) func(any, string, *Violations) (*T, bool) {
	return func(value any, path string, errs *Violations) (*T, bool) {
		if value == nil {
			return nil, true
		}
		v, ok := inner(value, path, errs)
		if !ok {
			return nil, false
		}
		return &v, true
	}
}

func nullable[T any](inner func(any, string, *Violations) (T, bool)) func(any, string, *Violations) (T, bool) {
	return func(value any, path string, errs *Violations) (T, bool) {
		if value == nil {
			var zero T
			return zero, true
		}
		return inner(value, path, errs)
	}
}

func modelOf[T any](validate func(map[string]any, string, *Violations) (T, bool)) func(any, string, *Violations) (T, bool) {
	return func(value any, path string, errs *Violations) (T, bool) {
		fields, ok := value.(map[string]any)
		if !ok {
			var zero T
			typeError(errs, path, value, "value is not a valid dict")
			return zero, false
		}
		return validate(fields, path, errs)
	}
}

func permitted[T any](allowed []T) string {
	parts := make([]string, 0, len(allowed))
	for _, a := range allowed {
		parts = append(parts, fmt.Sprintf("%#v", a))
	}
	return "value is not a valid enumeration member; permitted: " + strings.Join(parts, ", ")
}

func stringEnum[T ~string](allowed ...T) func(any, string, *Violations) (T, bool) {
	return func(value any, path string, errs *Violations) (T, bool) {
		if s, ok := value.(string); ok {
			for _, a := range allowed {
				if T(s) == a {
					return a, true
				}
			}
		}
		report(errs, path, "enum", permitted(allowed))
		var zero T
		return zero, false
	}
}

func intEnum[T ~int64](allowed ...T) func(any, string, *Violations) (T, bool) {
	return func(value any, path string, errs *Violations) (T, bool) {
		if i, ok := integral(value); ok {
			for _, a := range allowed {
				if T(i) == a {
					return a, true
				}
			}
		}
		report(errs, path, "enum", permitted(allowed))
		var zero T
		return zero, false
	}
}

func formatted(rule, message string, check func(string) bool) func(any, string, *Violations) (string, bool) {
	return func(value any, path string, errs *Violations) (string, bool) {
		s, ok := convertString(value, path, errs)
		if !ok {
			return "", false
		}
		if !check(s) {
			report(errs, path, rule, message)
			return "", false
		}
		return s, true
	}
}

func every[T any](items []T, check func(T) bool) bool {
	for _, item := range items {
		if !check(item) {
			return false
		}
	}
	return true
}

func runeLen(s string) int {
	return utf8.RuneCountInString(s)
}

func isMultipleOf(value, step float64) bool {
	remainder := math.Abs(math.Mod(value, step))
	return remainder < 1e-9 || math.Abs(remainder-math.Abs(step)) < 1e-9
}

var patterns sync.Map

func matchPattern(pattern, s string) bool {
	if cached, ok := patterns.Load(pattern); ok {
		return cached.(*regexp.Regexp).MatchString(s)
	}
	re, err := regexp.Compile(pattern)
	if err != nil {
		return false
	}
	patterns.Store(pattern, re)
	return re.MatchString(s)
}

func isEmail(s string) bool {
	addr, err := mail.ParseAddress(s)
	return err == nil && addr.Address == s
}

func isUUID(s string) bool {
	return matchPattern(`^[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12}$`, s)
}

func isIP(s string) bool {
	return net.ParseIP(s) != nil
}

func isIPv4(s string) bool {
	return net.ParseIP(s) != nil && !strings.Contains(s, ":")
}

func isIPv6(s string) bool {
	return net.ParseIP(s) != nil && strings.Contains(s, ":")
}

func isCIDR(s string) bool {
	_, _, err := net.ParseCIDR(s)
	return err == nil
}

func isURL(s string) bool {
	u, err := url.Parse(s)
	return err == nil && u.Scheme != "" && u.Host != ""
}

func isDateTime(s string) bool {
	for _, layout := range []string{time.RFC3339Nano, "2006-01-02T15:04:05", "2006-01-02 15:04:05", "2006-01-02T15:04"} {
		if _, err := time.Parse(layout, s); err == nil {
			return true
		}
	}
	return false
}

func isDate(s string) bool {
	_, err := time.Parse("2006-01-02", s)
	return err == nil
}
"#;

const RUNTIME_TESTS: &str = r#"func TestViolationsHelpers(t *testing.T) {
	var errs Violations
	report(&errs, "age", "ge", "ensure this value is greater than or equal to 0")
	report(&errs, "name", "nonempty", "ensure this value has at least 1 characters")
	assert.True(t, errs.Has("ge"))
	assert.False(t, errs.Has("le"))
	assert.Len(t, errs.At("name"), 1)
	assert.Equal(t, []string{"ge", "nonempty"}, errs.Rules())
	assert.True(t, errs.InOrder("ge", "nonempty"))
	assert.False(t, errs.InOrder("nonempty", "ge"))
	assert.Contains(t, errs.Error(), "age: ensure this value is greater than or equal to 0 (ge)")
}

func TestPaths(t *testing.T) {
	assert.Equal(t, "address.zip", joinPath("address", "zip"))
	assert.Equal(t, "zip", joinPath("", "zip"))
	assert.Equal(t, "items[2]", indexPath("items", 2))
	assert.Equal(t, `labels["k"]`, keyPath("labels", "k"))
	assert.Equal(t, "__root__", rootPath(""))
}

func TestConverters(t *testing.T) {
	var errs Violations
	i, ok := convertInt("42", "n", &errs)
	assert.True(t, ok)
	assert.Equal(t, int64(42), i)
	_, ok = convertStrictInt("42", "n", &errs)
	assert.False(t, ok)
	_, ok = convertInt(3.5, "n", &errs)
	assert.False(t, ok)
	b, ok := convertBool("yes", "b", &errs)
	assert.True(t, ok)
	assert.True(t, b)
	_, ok = convertString(nil, "s", &errs)
	assert.False(t, ok)
	assert.Equal(t, "none is not an allowed value", errs[len(errs)-1].Message)

	errs = nil
	items, ok := listOf(convertInt)([]any{1, "x", 3}, "xs", &errs)
	assert.False(t, ok)
	assert.Len(t, items, 3)
	assert.Equal(t, "xs[1]", errs[0].Path)

	errs = nil
	p, ok := optionalOf(convertInt)(nil, "p", &errs)
	assert.True(t, ok)
	assert.Nil(t, p)
	assert.Empty(t, errs)
}

func TestFormatsAndPatterns(t *testing.T) {
	assert.True(t, isEmail("ann@example.com"))
	assert.False(t, isEmail("Ann <ann@example.com>"))
	assert.True(t, isUUID("123e4567-e89b-12d3-a456-426614174000"))
	assert.True(t, isIPv4("10.0.0.1"))
	assert.False(t, isIPv4("::1"))
	assert.True(t, isIPv6("::1"))
	assert.True(t, isCIDR("10.0.0.0/8"))
	assert.True(t, isURL("https://example.com/x"))
	assert.True(t, isDate("2024-02-29"))
	assert.True(t, isDateTime("2024-02-29T10:00:00Z"))
	assert.True(t, matchPattern(`^\d+$`, "123"))
	assert.True(t, isMultipleOf(0.3, 0.1))
	assert.True(t, every([]string{"a", "b"}, func(s string) bool { return s != "" }))
}

func TestHooks(t *testing.T) {
	assert.NoError(t, fieldHook("unregistered", 1))
	RegisterFieldHook("test.positive", func(value any) error {
		if value.(int64) <= 0 {
			return fmt.Errorf("must be positive")
		}
		return nil
	})
	assert.Error(t, fieldHook("test.positive", int64(0)))
	assert.NoError(t, fieldHook("test.positive", int64(1)))
}
"#;

fn header(package: &str) -> GoWriter {
    let mut w = GoWriter::new();
    w.line("// Code generated by valgen. DO NOT EDIT.");
    w.blank();
    w.line(&format!("package {package}"));
    w.blank();
    w
}

/// `common.go`: runtime plus the shared rule catalogue.
pub fn emit_common(package: &str, rules: &RuleTable) -> String {
    let mut w = header(package);
    w.raw(RUNTIME);
    w.blank();
    w.line("// SharedRules maps each shared rule identifier to its definition.");
    if rules.is_empty() {
        w.line("var SharedRules = map[string]string{}");
        return w.finish();
    }
    w.open("var SharedRules = map[string]string{");
    let width = rules
        .iter()
        .map(|r| go_string(&r.identifier).len())
        .max()
        .unwrap_or(0);
    for rule in rules.iter() {
        let key = format!("{}:", go_string(&rule.identifier));
        w.line(&format!(
            "{key:<width$} {},",
            go_string(&rule.describe()),
            width = width + 1
        ));
    }
    w.close("}");
    w.finish()
}

/// `common_test.go`: runtime checks plus one assertion per shared rule.
pub fn emit_common_tests(package: &str, rules: &RuleTable) -> String {
    let mut w = header(package);
    w.line("import (");
    w.line("\t\"fmt\"");
    w.line("\t\"testing\"");
    w.blank();
    w.line("\t\"github.com/stretchr/testify/assert\"");
    w.line(")");
    w.blank();
    w.raw(RUNTIME_TESTS);
    w.blank();
    w.open("func TestSharedRulesCatalogue(t *testing.T) {");
    w.line(&format!("assert.Len(t, SharedRules, {})", rules.len()));
    for rule in rules.iter() {
        w.line(&format!(
            "assert.Equal(t, {}, SharedRules[{}])",
            go_string(&rule.describe()),
            go_string(&rule.identifier)
        ));
    }
    w.close("}");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_lists_every_rule() {
        let rules = RuleTable::parse(
            "nonempty = Rule(min_length=1)\n\ndef check_email(cls, v):\n    return v\n",
            "common.py",
        )
        .unwrap();
        let common = emit_common("validator", &rules);
        assert!(common.starts_with("// Code generated by valgen. DO NOT EDIT.\n\npackage validator\n"));
        assert!(common.contains("\t\"nonempty\":    \"min_length=1\",\n"));
        assert!(common.contains("\t\"check_email\": \"email\",\n"));

        let tests = emit_common_tests("validator", &rules);
        assert!(tests.contains("assert.Len(t, SharedRules, 2)"));
        assert!(tests.contains("assert.Equal(t, \"email\", SharedRules[\"check_email\"])"));
    }

    #[test]
    fn model_hook_keys_are_documented_per_model() {
        let common = emit_common("validator", &RuleTable::new());
        assert!(common.contains("// Model hooks are keyed per concrete model type"));
        assert!(common.contains("(\"unit.Child.func\" as well as \"unit.Parent.func\")"));
    }

    #[test]
    fn empty_catalogue() {
        let common = emit_common("validator", &RuleTable::new());
        assert!(common.contains("var SharedRules = map[string]string{}\n"));
    }
}
