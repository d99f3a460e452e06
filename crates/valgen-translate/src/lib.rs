//! Translation of Pydantic-style models into Go validators and tests.
//!
//! `valgen-translate` reads Python model definitions, a shared-rules module and
//! pytest suites, and emits Go validator code, Go tests, and a common runtime.
//!
//! # Architecture
//!
//! ```text
//! Python sources            IR                    Resolution         Go output
//! ──────────────      ─────────────────      ─────────────────    ─────────────────
//! models.py   ──────> SchemaGraph ──┐
//! common.py   ──────> RuleTable ────┼──> ResolvedSchema ──┬───> <unit>.go
//!                     NameTable ────┘    (types.rs,       ├───> <unit>_test.go
//! test_*.py   ──────> TestCase ───────────resolve.rs) ────┘
//!                                                               common.go
//!                     RuleTable ──────────────────────────────> common_test.go
//! ```
//!
//! # Example
//!
//! ```
//! use valgen_translate::{Backend, GoBackend, NameTable, ParseOptions, RuleTable};
//! use valgen_translate::{parse_models, resolve};
//!
//! let rules = RuleTable::parse("nonempty = Rule(min_length=1)\n", "common.py").unwrap();
//! let graph = parse_models(
//!     "class User(BaseModel):\n    name: Annotated[str, nonempty]\n",
//!     "user.py",
//!     &ParseOptions::default(),
//! )
//! .unwrap();
//! let names = NameTable::build([("user", &graph)]);
//! let schema = resolve(&graph, "user", &rules, &names).unwrap();
//!
//! let go = GoBackend::default().emit_validators(&schema);
//! assert!(go.contains("func ValidateUser(input map[string]any) (*User, Violations)"));
//! ```
//!
//! # Feature Flags
//!
//! - `backend-go` (default) - Go validators, tests and runtime

pub mod error;
pub mod input;
pub mod ir;
pub mod names;
pub mod output;
pub mod resolve;
pub mod traits;
pub mod translate;
pub mod types;
pub mod values;

pub use error::{ErrorKind, SourceLocation, TranslateError};
pub use input::{ParseOptions, RuleTable, parse_models, parse_test_cases};
pub use names::NameTable;
pub use resolve::{ResolvedSchema, resolve};
pub use traits::Backend;
pub use translate::{
    ParsedUnit, SourceFile, UnitInput, UnitOutput, name_table, parse_unit, translate_unit,
};

#[cfg(feature = "backend-go")]
pub use output::{GoBackend, GoOptions};
