use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed, versioned taxonomy of diagnostic codes.
///
/// Codes are stable wire names; hosts key quick fixes and telemetry off
/// them, so variants are only ever added, never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Lexical
    IllegalCharacter,
    UnterminatedString,
    // Grammar
    EmptyStatement,
    UnknownStatement,
    UnexpectedToken,
    UnexpectedEof,
    NoBranchMatch,
    NoMatchingRule,
    SyntaxError,
    // Structural (GraphQL)
    UnbalancedDelimiter,
    UnclosedDelimiter,
    MissingSelectionSet,
    EmptySelectionSet,
    // Reference
    DatabaseNotFound,
    BundleNotFound,
    FieldNotFound,
    NoDatabaseContext,
    UnknownField,
    // Migration
    MigrationDependencyNotFound,
    MigrationCircularDependency,
    // Semantic
    ContextStale,
    DuplicateDatabase,
    DuplicateBundle,
    DestructiveOperation,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::IllegalCharacter => "ILLEGAL_CHARACTER",
            DiagnosticCode::UnterminatedString => "UNTERMINATED_STRING",
            DiagnosticCode::EmptyStatement => "EMPTY_STATEMENT",
            DiagnosticCode::UnknownStatement => "UNKNOWN_STATEMENT",
            DiagnosticCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            DiagnosticCode::UnexpectedEof => "UNEXPECTED_EOF",
            DiagnosticCode::NoBranchMatch => "NO_BRANCH_MATCH",
            DiagnosticCode::NoMatchingRule => "NO_MATCHING_RULE",
            DiagnosticCode::SyntaxError => "SYNTAX_ERROR",
            DiagnosticCode::UnbalancedDelimiter => "UNBALANCED_DELIMITER",
            DiagnosticCode::UnclosedDelimiter => "UNCLOSED_DELIMITER",
            DiagnosticCode::MissingSelectionSet => "MISSING_SELECTION_SET",
            DiagnosticCode::EmptySelectionSet => "EMPTY_SELECTION_SET",
            DiagnosticCode::DatabaseNotFound => "DATABASE_NOT_FOUND",
            DiagnosticCode::BundleNotFound => "BUNDLE_NOT_FOUND",
            DiagnosticCode::FieldNotFound => "FIELD_NOT_FOUND",
            DiagnosticCode::NoDatabaseContext => "NO_DATABASE_CONTEXT",
            DiagnosticCode::UnknownField => "UNKNOWN_FIELD",
            DiagnosticCode::MigrationDependencyNotFound => "MIGRATION_DEPENDENCY_NOT_FOUND",
            DiagnosticCode::MigrationCircularDependency => "MIGRATION_CIRCULAR_DEPENDENCY",
            DiagnosticCode::ContextStale => "CONTEXT_STALE",
            DiagnosticCode::DuplicateDatabase => "DUPLICATE_DATABASE",
            DiagnosticCode::DuplicateBundle => "DUPLICATE_BUNDLE",
            DiagnosticCode::DestructiveOperation => "DESTRUCTIVE_OPERATION",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding with source offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub severity: Severity,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Diagnostic {
    pub fn error(
        code: DiagnosticCode,
        message: impl Into<String>,
        span: (usize, usize),
    ) -> Diagnostic {
        Diagnostic {
            code,
            message: message.into(),
            severity: Severity::Error,
            start_offset: span.0,
            end_offset: span.1,
            suggestion: None,
            category: None,
        }
    }

    pub fn warning(
        code: DiagnosticCode,
        message: impl Into<String>,
        span: (usize, usize),
    ) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code, message, span)
        }
    }

    pub fn info(
        code: DiagnosticCode,
        message: impl Into<String>,
        span: (usize, usize),
    ) -> Diagnostic {
        Diagnostic {
            severity: Severity::Info,
            ..Diagnostic::error(code, message, span)
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Diagnostic {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Diagnostic {
        self.category = Some(category.into());
        self
    }
}

/// Aggregated validation outcome for one document or statement.
///
/// `valid` is true exactly when `errors` is empty; warnings and info
/// entries never fail a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub info: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn new() -> ValidationResult {
        ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                self.errors.push(diagnostic);
                self.valid = false;
            }
            Severity::Warning => self.warnings.push(diagnostic),
            Severity::Info => self.info.push(diagnostic),
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.info.extend(other.info);
        self.valid = self.errors.is_empty();
    }

    /// All diagnostics in severity order.
    pub fn all(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.info.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tracks_errors_only() {
        let mut result = ValidationResult::new();
        result.push(Diagnostic::warning(
            DiagnosticCode::ContextStale,
            "schema context may be out of date",
            (0, 0),
        ));
        assert!(result.valid);
        result.push(Diagnostic::error(
            DiagnosticCode::UnexpectedToken,
            "unexpected token `;`",
            (15, 16),
        ));
        assert!(!result.valid);
        assert_eq!(result.all().count(), 2);
    }

    #[test]
    fn codes_have_stable_wire_names() {
        assert_eq!(
            DiagnosticCode::MigrationCircularDependency.as_str(),
            "MIGRATION_CIRCULAR_DEPENDENCY"
        );
        assert_eq!(DiagnosticCode::UnexpectedEof.as_str(), "UNEXPECTED_EOF");
    }
}
