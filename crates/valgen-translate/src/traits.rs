//! Traits for validator generation backends.

use crate::error::TranslateError;
use crate::input::RuleTable;
use crate::ir::TestCase;
use crate::resolve::ResolvedSchema;

/// A validator generation backend.
///
/// A backend turns each resolved unit into a validator file and a test file,
/// and the shared rule table into the common runtime pair.
///
/// ```ignore
/// use valgen_translate::{Backend, GoBackend};
///
/// let backend = GoBackend::default();
/// let validators = backend.emit_validators(&schema);
/// let tests = backend.emit_tests(&schema, &cases)?;
/// ```
pub trait Backend: Send + Sync {
    /// Unique backend identifier (e.g., "go").
    fn name(&self) -> &'static str;

    /// Target language.
    fn language(&self) -> &'static str;

    /// File extension for generated code, without the dot.
    fn extension(&self) -> &'static str;

    /// Validators for one unit.
    fn emit_validators(&self, schema: &ResolvedSchema) -> String;

    /// Tests for one unit. Fails when a case names a model the unit lacks or
    /// an accepted payload does not fit its model.
    fn emit_tests(
        &self,
        schema: &ResolvedSchema,
        cases: &[TestCase],
    ) -> Result<String, TranslateError>;

    /// Runtime helpers plus the shared rule catalogue.
    fn emit_common(&self, rules: &RuleTable) -> String;

    /// Tests for the common unit.
    fn emit_common_tests(&self, rules: &RuleTable) -> String;
}
