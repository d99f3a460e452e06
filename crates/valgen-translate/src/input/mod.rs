//! Python source readers.
//!
//! Each reader parses one kind of file with tree-sitter and produces IR:
//! model definitions, the shared rule table, or extracted test cases.

mod cases;
mod models;
pub(crate) mod python;
mod rules;

pub use cases::parse_test_cases;
pub use models::{ParseOptions, parse_models};
pub use rules::RuleTable;
