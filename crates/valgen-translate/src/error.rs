//! Error taxonomy shared by every translation stage.

use serde::Serialize;
use std::fmt;

/// Position of a construct in an input file (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Discriminant of [`TranslateError`], for callers that only need the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ParseError,
    UnsupportedDefault,
    UnsupportedType,
    EmptyEnum,
    UnknownRule,
    DuplicateRule,
    OrphanTestCase,
    CyclicModelReference,
    PayloadMismatch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::UnsupportedDefault => "UnsupportedDefault",
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::EmptyEnum => "EmptyEnum",
            ErrorKind::UnknownRule => "UnknownRule",
            ErrorKind::DuplicateRule => "DuplicateRule",
            ErrorKind::OrphanTestCase => "OrphanTestCase",
            ErrorKind::CyclicModelReference => "CyclicModelReference",
            ErrorKind::PayloadMismatch => "PayloadMismatch",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed translation stage.
///
/// Every variant carries the location of the offending construct and the name
/// of the model, field, rule or test involved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("{location}: ParseError: {message}")]
    Parse {
        location: SourceLocation,
        message: String,
    },

    #[error(
        "{location}: UnsupportedDefault: field `{model}.{field}` has default `{expression}`: {reason}"
    )]
    UnsupportedDefault {
        location: SourceLocation,
        model: String,
        field: String,
        expression: String,
        reason: String,
    },

    #[error("{location}: UnsupportedType: field `{model}.{field}` has type `{ty}`: {reason}")]
    UnsupportedType {
        location: SourceLocation,
        model: String,
        field: String,
        ty: String,
        reason: String,
    },

    #[error("{location}: EmptyEnum: enumeration `{name}` used by `{model}.{field}` has no members")]
    EmptyEnum {
        location: SourceLocation,
        name: String,
        model: String,
        field: String,
    },

    #[error(
        "{location}: UnknownRule: `{referenced_by}` references rule `{rule}`, which the common rules do not define"
    )]
    UnknownRule {
        location: SourceLocation,
        rule: String,
        referenced_by: String,
    },

    #[error("{location}: DuplicateRule: rule `{rule}` is already defined at {first}")]
    DuplicateRule {
        location: SourceLocation,
        rule: String,
        first: SourceLocation,
    },

    #[error(
        "{location}: OrphanTestCase: test `{test}` exercises model `{model}`, which unit `{unit}` does not define"
    )]
    OrphanTestCase {
        location: SourceLocation,
        test: String,
        model: String,
        unit: String,
    },

    #[error("{location}: CyclicModelReference: {}", .cycle.join(" -> "))]
    CyclicModelReference {
        location: SourceLocation,
        cycle: Vec<String>,
    },

    #[error(
        "{location}: PayloadMismatch: test `{test}` passes `{model}` a payload that does not fit at `{path}`: {reason}"
    )]
    PayloadMismatch {
        location: SourceLocation,
        test: String,
        model: String,
        path: String,
        reason: String,
    },
}

impl TranslateError {
    pub fn parse(location: SourceLocation, message: impl Into<String>) -> Self {
        TranslateError::Parse {
            location,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::Parse { .. } => ErrorKind::ParseError,
            TranslateError::UnsupportedDefault { .. } => ErrorKind::UnsupportedDefault,
            TranslateError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            TranslateError::EmptyEnum { .. } => ErrorKind::EmptyEnum,
            TranslateError::UnknownRule { .. } => ErrorKind::UnknownRule,
            TranslateError::DuplicateRule { .. } => ErrorKind::DuplicateRule,
            TranslateError::OrphanTestCase { .. } => ErrorKind::OrphanTestCase,
            TranslateError::CyclicModelReference { .. } => ErrorKind::CyclicModelReference,
            TranslateError::PayloadMismatch { .. } => ErrorKind::PayloadMismatch,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            TranslateError::Parse { location, .. }
            | TranslateError::UnsupportedDefault { location, .. }
            | TranslateError::UnsupportedType { location, .. }
            | TranslateError::EmptyEnum { location, .. }
            | TranslateError::UnknownRule { location, .. }
            | TranslateError::DuplicateRule { location, .. }
            | TranslateError::OrphanTestCase { location, .. }
            | TranslateError::CyclicModelReference { location, .. }
            | TranslateError::PayloadMismatch { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_file_and_kind() {
        let err = TranslateError::UnknownRule {
            location: SourceLocation::new("models.py", 4, 5),
            rule: "nonempty".into(),
            referenced_by: "User.name".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("models.py:4:5: UnknownRule"));
        assert!(text.contains("`nonempty`"));
        assert!(text.contains("User.name"));
        assert_eq!(err.kind(), ErrorKind::UnknownRule);
    }

    #[test]
    fn cycle_is_rendered_as_chain() {
        let err = TranslateError::CyclicModelReference {
            location: SourceLocation::new("models.py", 1, 1),
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert!(err.to_string().ends_with("A -> B -> A"));
    }
}
