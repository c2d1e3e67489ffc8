use plume_context::SchemaContext;
use plume_grammar::GrammarSet;
use plume_syntax::docql::{Keyword, Operator, TokenKind};
use plume_syntax::{Diagnostic, DiagnosticCode, Statement, Token, ValidationResult};
use std::collections::HashSet;
use std::time::Duration;

/// A schema reference extracted from a statement's tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reference {
    Database { name: String, span: (usize, usize), creating: bool },
    Bundle { name: String, span: (usize, usize), creating: bool },
    Field { name: String, bundle: Option<String>, span: (usize, usize) },
    Migration { name: String, span: (usize, usize) },
    User { name: String, span: (usize, usize) },
}

/// Validates one DocQL statement: grammar first, then cross-statement
/// reference checks against the schema context.
pub fn validate_statement(
    grammars: &GrammarSet,
    statement: &Statement<TokenKind>,
    context: &SchemaContext,
    staleness_threshold: Duration,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    for token in &statement.tokens {
        if *token.kind() == TokenKind::Illegal {
            let code = if token.text().starts_with('"') || token.text().starts_with('\'') {
                DiagnosticCode::UnterminatedString
            } else {
                DiagnosticCode::IllegalCharacter
            };
            result.push(Diagnostic::error(
                code,
                format!("illegal token `{}`", token.text()),
                token.span(),
            ));
        }
    }

    result.merge(plume_grammar::validate_statement(
        grammars,
        &statement.tokens,
    ));

    cross_validate(statement, context, &mut result);

    if context.is_stale(staleness_threshold) {
        result.push(Diagnostic::warning(
            DiagnosticCode::ContextStale,
            "schema context may be out of date",
            (statement.offset_start, statement.offset_start),
        ));
    }

    result
}

/// Reference checks: databases, bundles, fields, migrations, plus the
/// duplicate/destructive advisories on CREATE and DROP.
fn cross_validate(
    statement: &Statement<TokenKind>,
    context: &SchemaContext,
    result: &mut ValidationResult,
) {
    let significant: Vec<&Token<TokenKind>> = statement
        .tokens
        .iter()
        .filter(|t| t.kind().is_significant())
        .collect();

    if significant.is_empty() {
        return;
    }

    if let Some(drop_token) = significant
        .iter()
        .find(|t| *t.kind() == TokenKind::Keyword(Keyword::Drop))
    {
        result.push(Diagnostic::warning(
            DiagnosticCode::DestructiveOperation,
            "this operation permanently removes data",
            drop_token.span(),
        ));
    }

    for reference in extract_references(&significant) {
        check_reference(&reference, context, result);
    }
}

/// Walks the token stream extracting schema references:
/// after `DATABASE`/`BUNDLE`/`USER`/`MIGRATION` a named reference of that
/// kind; after `FROM`/`TO`/`INTO`/`UPDATE` in DML a bundle reference bound
/// to the current database (`TO`/`FROM` name principals in DOL statements
/// instead); inside `WHERE`/`SET` clauses, identifiers followed by a
/// comparison or assignment operator are field references.
pub(crate) fn extract_references(tokens: &[&Token<TokenKind>]) -> Vec<Reference> {
    let mut references = Vec::new();
    let verb = match tokens.first().map(|t| t.kind()) {
        Some(TokenKind::Keyword(keyword)) => Some(*keyword),
        _ => None,
    };
    let is_dml = matches!(
        verb,
        Some(Keyword::Select | Keyword::Insert | Keyword::Update | Keyword::Delete)
    );
    let creating = verb == Some(Keyword::Create);

    let mut current_bundle: Option<String> = None;
    let mut in_field_clause = false;

    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        match token.kind() {
            TokenKind::Keyword(Keyword::Where | Keyword::Set) => in_field_clause = true,
            TokenKind::Keyword(
                Keyword::Order | Keyword::Group | Keyword::Limit | Keyword::Offset,
            )
            | TokenKind::Operator(Operator::Semicolon) => in_field_clause = false,
            TokenKind::Keyword(Keyword::Database) => {
                if let Some((name, span)) = named_after(tokens, index) {
                    references.push(Reference::Database { name, span, creating });
                    index += 1;
                }
            }
            TokenKind::Keyword(Keyword::Bundle) => {
                if let Some((name, span)) = named_after(tokens, index) {
                    references.push(Reference::Bundle { name, span, creating });
                    index += 1;
                }
            }
            TokenKind::Keyword(Keyword::User) => {
                if let Some((name, span)) = named_after(tokens, index) {
                    references.push(Reference::User { name, span });
                    index += 1;
                }
            }
            TokenKind::Keyword(Keyword::Migration) => {
                if let Some((name, span)) = named_after(tokens, index) {
                    references.push(Reference::Migration { name, span });
                    index += 1;
                }
            }
            TokenKind::Keyword(Keyword::From | Keyword::To | Keyword::Into | Keyword::Update) => {
                if let Some((name, span)) = named_after(tokens, index) {
                    if is_dml {
                        current_bundle = Some(name.clone());
                        references.push(Reference::Bundle {
                            name,
                            span,
                            creating: false,
                        });
                    } else {
                        references.push(Reference::User { name, span });
                    }
                    index += 1;
                }
            }
            TokenKind::Identifier | TokenKind::String if in_field_clause => {
                let next_is_comparison = matches!(
                    tokens.get(index + 1).map(|t| t.kind()),
                    Some(TokenKind::Operator(op)) if op.is_comparison()
                );
                if next_is_comparison {
                    references.push(Reference::Field {
                        name: reference_name(token),
                        bundle: current_bundle.clone(),
                        span: token.span(),
                    });
                }
            }
            _ => {}
        }
        index += 1;
    }
    references
}

/// The identifier or string immediately following `tokens[index]`, if any.
fn named_after(tokens: &[&Token<TokenKind>], index: usize) -> Option<(String, (usize, usize))> {
    let token = tokens.get(index + 1)?;
    match token.kind() {
        TokenKind::Identifier | TokenKind::String => {
            Some((reference_name(token), token.span()))
        }
        _ => None,
    }
}

/// String tokens name entities by their decoded value, identifiers by text.
fn reference_name(token: &Token<TokenKind>) -> String {
    match token.literal() {
        Some(plume_syntax::Literal::Str(value)) => value.clone(),
        _ => token.text().to_string(),
    }
}

fn check_reference(reference: &Reference, context: &SchemaContext, result: &mut ValidationResult) {
    match reference {
        Reference::Database { name, span, creating } => {
            if *creating {
                if context.has_database(name) {
                    result.push(Diagnostic::warning(
                        DiagnosticCode::DuplicateDatabase,
                        format!("database `{name}` already exists"),
                        *span,
                    ));
                }
            } else if !context.has_database(name) {
                result.push(Diagnostic::error(
                    DiagnosticCode::DatabaseNotFound,
                    format!("database `{name}` does not exist"),
                    *span,
                ));
            }
        }
        Reference::Bundle { name, span, creating } => {
            let Some(database) = context.current_database() else {
                result.push(Diagnostic::warning(
                    DiagnosticCode::NoDatabaseContext,
                    format!("no database selected; cannot resolve bundle `{name}`"),
                    *span,
                ));
                return;
            };
            if *creating {
                if context.has_bundle(database, name) {
                    result.push(Diagnostic::warning(
                        DiagnosticCode::DuplicateBundle,
                        format!("bundle `{name}` already exists in `{database}`"),
                        *span,
                    ));
                }
            } else if !context.has_bundle(database, name) {
                result.push(Diagnostic::error(
                    DiagnosticCode::BundleNotFound,
                    format!("bundle `{name}` does not exist in `{database}`"),
                    *span,
                ));
            }
        }
        Reference::Field { name, bundle, span } => {
            let Some(database) = context.current_database() else {
                return;
            };
            let Some(bundle) = bundle else {
                return;
            };
            // Only check fields when the owning bundle is known; a missing
            // bundle already produced its own diagnostic.
            if context.has_bundle(database, bundle) && !context.has_field(database, bundle, name) {
                result.push(Diagnostic::error(
                    DiagnosticCode::FieldNotFound,
                    format!("field `{name}` does not exist in bundle `{bundle}`"),
                    *span,
                ));
            }
        }
        Reference::Migration { name, span } => {
            if !context.has_migration(name) {
                // A migration definition statement introduces the name; only
                // its dependencies are checked below.
                return;
            }
            let check = context.validate_migration_dependencies(name);
            for missing in &check.missing {
                result.push(Diagnostic::error(
                    DiagnosticCode::MigrationDependencyNotFound,
                    format!("migration `{name}` depends on unknown migration `{missing}`"),
                    *span,
                ));
            }
            if context.has_circular_dependency(name, &mut HashSet::new()) {
                result.push(Diagnostic::error(
                    DiagnosticCode::MigrationCircularDependency,
                    format!("migration `{name}` has a circular dependency"),
                    *span,
                ));
            }
        }
        // No existence rule is defined for principals.
        Reference::User { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_context::{Bundle, Database, Field, FieldConstraints, FieldType, Migration};
    use plume_syntax::docql;
    use pretty_assertions::assert_eq;

    fn test_context() -> SchemaContext {
        let mut context = SchemaContext::new();
        let mut users = Bundle {
            name: "users".to_string(),
            database: "testdb".to_string(),
            fields: Default::default(),
            relationships: Default::default(),
            indexes: vec![],
        };
        users.fields.insert(
            "email".to_string(),
            Field {
                name: "email".to_string(),
                field_type: FieldType::Text,
                constraints: FieldConstraints::default(),
            },
        );
        let mut database = Database {
            name: "testdb".to_string(),
            bundles: Default::default(),
        };
        database.bundles.insert("users".to_string(), users);
        context.update_database(database);
        context.set_current_database(Some("testdb".to_string()));
        context
    }

    fn validate(source: &str, context: &SchemaContext) -> ValidationResult {
        let grammars = GrammarSet::embedded().unwrap();
        let tokens = docql::lex(source);
        let statements = plume_syntax::split_docql(source, &tokens);
        validate_statement(
            &grammars,
            &statements[0],
            context,
            Duration::from_secs(300),
        )
    }

    fn codes(result: &ValidationResult) -> Vec<DiagnosticCode> {
        result.all().map(|d| d.code).collect()
    }

    #[test]
    fn unknown_bundle_is_reported_with_its_span() {
        let context = test_context();
        let source = "SELECT * FROM nonexistent;";
        let result = validate(source, &context);
        let error = result
            .errors
            .iter()
            .find(|d| d.code == DiagnosticCode::BundleNotFound)
            .expect("expected BUNDLE_NOT_FOUND");
        assert_eq!(
            &source[error.start_offset..error.end_offset],
            "nonexistent"
        );
    }

    #[test]
    fn known_bundle_and_field_pass() {
        let context = test_context();
        let result = validate("SELECT * FROM \"users\" WHERE \"email\" == \"x\";", &context);
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn unknown_field_in_known_bundle() {
        let context = test_context();
        let result = validate("SELECT * FROM \"users\" WHERE zip == 1;", &context);
        assert!(codes(&result).contains(&DiagnosticCode::FieldNotFound));
    }

    #[test]
    fn field_check_skipped_when_bundle_unknown() {
        let context = test_context();
        let result = validate("SELECT * FROM ghost WHERE zip == 1;", &context);
        let found = codes(&result);
        assert!(found.contains(&DiagnosticCode::BundleNotFound));
        assert!(!found.contains(&DiagnosticCode::FieldNotFound));
    }

    #[test]
    fn bundle_without_database_context_warns() {
        let mut context = test_context();
        context.set_current_database(None);
        let result = validate("SELECT * FROM \"users\";", &context);
        assert!(result.valid);
        assert!(codes(&result).contains(&DiagnosticCode::NoDatabaseContext));
    }

    #[test]
    fn duplicate_database_on_create() {
        let context = test_context();
        let result = validate("CREATE DATABASE testdb;", &context);
        assert!(codes(&result).contains(&DiagnosticCode::DuplicateDatabase));
        // Advisory only.
        assert!(result.valid);
    }

    #[test]
    fn duplicate_bundle_on_create() {
        let context = test_context();
        let result = validate("CREATE BUNDLE \"users\";", &context);
        assert!(codes(&result).contains(&DiagnosticCode::DuplicateBundle));
    }

    #[test]
    fn drop_is_destructive() {
        let context = test_context();
        let result = validate("DROP BUNDLE \"users\";", &context);
        assert!(codes(&result).contains(&DiagnosticCode::DestructiveOperation));
    }

    #[test]
    fn stale_context_warns() {
        let context = SchemaContext::new();
        let result = validate("USE testdb;", &context);
        assert!(codes(&result).contains(&DiagnosticCode::ContextStale));
    }

    #[test]
    fn missing_migration_dependency() {
        let mut context = test_context();
        let migrations = vec![Migration {
            name: "add_orders".to_string(),
            statements: vec![],
            dependencies: vec!["add_users".to_string()],
            applied: false,
            timestamp: None,
        }];
        for migration in migrations {
            context.add_migration(migration);
        }
        let result = validate("APPLY MIGRATION add_orders;", &context);
        assert!(codes(&result).contains(&DiagnosticCode::MigrationDependencyNotFound));
    }

    #[test]
    fn circular_migration_dependency() {
        let mut context = test_context();
        context.add_migration(Migration {
            name: "a".to_string(),
            statements: vec![],
            dependencies: vec!["b".to_string()],
            applied: false,
            timestamp: None,
        });
        context.add_migration(Migration {
            name: "b".to_string(),
            statements: vec![],
            dependencies: vec!["a".to_string()],
            applied: false,
            timestamp: None,
        });
        let result = validate("VALIDATE MIGRATION a;", &context);
        assert!(codes(&result).contains(&DiagnosticCode::MigrationCircularDependency));
    }

    #[test]
    fn grant_principal_is_not_a_bundle() {
        let context = test_context();
        let result = validate("GRANT read ON BUNDLE \"users\" TO alice;", &context);
        // `alice` must not be resolved as a bundle.
        assert!(!codes(&result).contains(&DiagnosticCode::BundleNotFound));
        assert_eq!(result.errors, vec![]);
    }
}
