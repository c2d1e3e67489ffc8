use crate::loader::{Grammar, GrammarSet, StatementFamily};
use crate::symbol::{describe, is_contextual, Matcher, Production, Symbol, CONTEXT_LITERAL};
use plume_syntax::docql::{Keyword, TokenKind};
use plume_syntax::{Diagnostic, DiagnosticCode, Token, ValidationResult};

/// Guard against runaway recursion through cyclic grammars; any legitimate
/// production nests far shallower than this.
const MAX_DEPTH: usize = 64;

pub(crate) struct MatchFailure {
    /// Tokens consumed before the failing symbol.
    pub consumed: usize,
    pub errors: Vec<Diagnostic>,
}

pub(crate) type MatchResult = Result<usize, MatchFailure>;

/// Validates one statement's significant tokens against `grammar`.
///
/// Each alternative production of the root rule is tried in order; a
/// production passes only when it matches and consumes every token. A match
/// with surplus tokens reports `UNEXPECTED_TOKEN` at the first leftover and
/// the next alternative is tried. When all alternatives fail, the
/// furthest-advancing alternative's errors are returned.
pub fn validate_tokens(grammar: &Grammar, tokens: &[Token<TokenKind>]) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut best: Option<MatchFailure> = None;

    for production in grammar.root() {
        match match_production(grammar, production, tokens, 0, 0) {
            Ok(consumed) if consumed == tokens.len() => return result,
            Ok(consumed) => {
                let surplus = &tokens[consumed];
                record_best(
                    &mut best,
                    MatchFailure {
                        consumed,
                        errors: vec![Diagnostic::error(
                            DiagnosticCode::UnexpectedToken,
                            format!("unexpected token `{}`", surplus.text()),
                            surplus.span(),
                        )],
                    },
                );
            }
            Err(failure) => record_best(&mut best, failure),
        }
    }

    match best {
        Some(failure) => result.extend(failure.errors),
        None => {
            let span = tokens.first().map(Token::span).unwrap_or((0, 0));
            result.push(Diagnostic::error(
                DiagnosticCode::NoMatchingRule,
                "no grammar rule matches this statement",
                span,
            ));
        }
    }
    result
}

fn record_best(best: &mut Option<MatchFailure>, candidate: MatchFailure) {
    let replace = match best {
        Some(current) => candidate.consumed > current.consumed,
        None => true,
    };
    if replace {
        *best = Some(candidate);
    }
}

/// Walks `production` consuming from `tokens[index..]`.
///
/// Optional symbols are skipped on mismatch; repeatable symbols are
/// re-applied while they match and consume at least one token.
pub(crate) fn match_production(
    grammar: &Grammar,
    production: &Production,
    tokens: &[Token<TokenKind>],
    start: usize,
    depth: usize,
) -> MatchResult {
    if depth > MAX_DEPTH {
        return Err(MatchFailure {
            consumed: start,
            errors: vec![Diagnostic::error(
                DiagnosticCode::SyntaxError,
                "grammar recursion limit exceeded",
                eof_span(tokens),
            )],
        });
    }

    let mut index = start;
    for symbol in production {
        let mut matched_once = false;
        loop {
            match match_symbol(grammar, symbol, tokens, index, depth) {
                Ok(next) => {
                    let consumed_here = next - index;
                    index = next;
                    matched_once = true;
                    // Zero-consume matches stop repetition to guarantee
                    // termination.
                    if !symbol.repeatable || consumed_here == 0 {
                        break;
                    }
                }
                Err(failure) => {
                    // A repeatable symbol that has matched at least once
                    // simply stops repeating when it no longer matches.
                    if symbol.optional || matched_once {
                        break;
                    }
                    return Err(MatchFailure {
                        consumed: index,
                        errors: failure.errors,
                    });
                }
            }
        }
    }
    Ok(index)
}

fn match_symbol(
    grammar: &Grammar,
    symbol: &Symbol,
    tokens: &[Token<TokenKind>],
    index: usize,
    depth: usize,
) -> MatchResult {
    let Some(token) = tokens.get(index) else {
        return Err(MatchFailure {
            consumed: index,
            errors: vec![Diagnostic::error(
                DiagnosticCode::UnexpectedEof,
                format!("expected {}, found end of input", describe(&symbol.matcher)),
                eof_span(tokens),
            )],
        });
    };

    match &symbol.matcher {
        Matcher::Token { name } => {
            if token_matches(name, token) {
                Ok(index + 1)
            } else {
                Err(mismatch(&symbol.matcher, token, index))
            }
        }
        Matcher::Literal { text } => {
            if token.text().eq_ignore_ascii_case(text) {
                Ok(index + 1)
            } else {
                Err(mismatch(&symbol.matcher, token, index))
            }
        }
        Matcher::Reference { rule } => {
            let Some(productions) = grammar.rule(rule) else {
                return Err(MatchFailure {
                    consumed: index,
                    errors: vec![Diagnostic::error(
                        DiagnosticCode::NoMatchingRule,
                        format!("grammar references unknown rule `{rule}`"),
                        token.span(),
                    )],
                });
            };
            let Some(first) = productions.first() else {
                return Err(mismatch(&symbol.matcher, token, index));
            };
            let next = match_production(grammar, first, tokens, index, depth + 1)?;
            if next == index {
                // A zero-consume recursion can never terminate a cycle;
                // treat it as a failure.
                return Err(mismatch(&symbol.matcher, token, index));
            }
            Ok(next)
        }
        Matcher::Branches { alternatives } => {
            let mut longest: Option<usize> = None;
            let mut furthest: Option<MatchFailure> = None;
            for alternative in alternatives {
                match match_production(grammar, alternative, tokens, index, depth + 1) {
                    // Ties pick the first alternative.
                    Ok(next) if Some(next) > longest => longest = Some(next),
                    Ok(_) => {}
                    Err(failure) => record_best(&mut furthest, failure),
                }
            }
            match longest {
                Some(next) => Ok(next),
                None => {
                    let mut errors = vec![Diagnostic::error(
                        DiagnosticCode::NoBranchMatch,
                        format!(
                            "expected {}, found `{}`",
                            describe(&symbol.matcher),
                            token.text()
                        ),
                        token.span(),
                    )];
                    if let Some(failure) = furthest {
                        errors.extend(failure.errors);
                    }
                    Err(MatchFailure {
                        consumed: index,
                        errors,
                    })
                }
            }
        }
    }
}

/// Token-kind matching: upper-case names match the kind exactly; lower-case
/// names are contextual references accepting identifiers and strings, plus
/// numbers and booleans for `literal`.
pub(crate) fn token_matches(name: &str, token: &Token<TokenKind>) -> bool {
    if is_contextual(name) {
        let contextual = matches!(token.kind(), TokenKind::Identifier | TokenKind::String);
        if name == CONTEXT_LITERAL {
            return contextual
                || matches!(
                    token.kind(),
                    TokenKind::Number | TokenKind::Keyword(Keyword::True | Keyword::False)
                );
        }
        contextual
    } else {
        token.kind().grammar_name() == name
    }
}

fn mismatch(matcher: &Matcher, token: &Token<TokenKind>, index: usize) -> MatchFailure {
    MatchFailure {
        consumed: index,
        errors: vec![Diagnostic::error(
            DiagnosticCode::UnexpectedToken,
            format!("expected {}, found `{}`", describe(matcher), token.text()),
            token.span(),
        )],
    }
}

fn eof_span(tokens: &[Token<TokenKind>]) -> (usize, usize) {
    tokens
        .last()
        .map(|t| (t.end_offset(), t.end_offset()))
        .unwrap_or((0, 0))
}

/// Grammar-validates a DocQL statement: family dispatch by first token,
/// then the full match against that family's grammar.
pub fn validate_statement(
    set: &GrammarSet,
    tokens: &[Token<TokenKind>],
) -> ValidationResult {
    let significant: Vec<Token<TokenKind>> = tokens
        .iter()
        .filter(|t| t.kind().is_significant())
        .cloned()
        .collect();

    let mut result = ValidationResult::new();

    let only_semicolon = significant
        .iter()
        .all(|t| *t.kind() == TokenKind::Operator(plume_syntax::docql::Operator::Semicolon));
    if significant.is_empty() || only_semicolon {
        let span = significant.first().map(Token::span).unwrap_or((0, 0));
        result.push(Diagnostic::error(
            DiagnosticCode::EmptyStatement,
            "statement is empty",
            span,
        ));
        return result;
    }

    let Some(family) = StatementFamily::dispatch(&significant[0]) else {
        result.push(Diagnostic::error(
            DiagnosticCode::UnknownStatement,
            format!("`{}` does not begin a statement", significant[0].text()),
            significant[0].span(),
        ));
        return result;
    };

    validate_tokens(set.grammar(family), &significant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::GrammarSet;
    use plume_syntax::docql;
    use pretty_assertions::assert_eq;

    fn validate(source: &str) -> ValidationResult {
        let set = GrammarSet::embedded().unwrap();
        let tokens = docql::lex(source);
        validate_statement(&set, &tokens)
    }

    #[test]
    fn select_with_limit_is_valid() {
        let result = validate("SELECT * from \"orders\" LIMIT 10;");
        assert_eq!(result.errors, vec![]);
        assert!(result.valid);
    }

    #[test]
    fn create_database_without_name() {
        let source = "CREATE DATABASE;";
        let result = validate(source);
        assert!(!result.valid);
        let error = &result.errors[0];
        assert!(matches!(
            error.code,
            DiagnosticCode::UnexpectedToken | DiagnosticCode::UnexpectedEof
        ));
        // The error points at the `;`.
        assert_eq!(error.start_offset, source.len() - 1);
    }

    #[test]
    fn unknown_statement() {
        let result = validate("frobnicate the database;");
        assert_eq!(result.errors[0].code, DiagnosticCode::UnknownStatement);
    }

    #[test]
    fn empty_statement() {
        let result = validate(";");
        assert_eq!(result.errors[0].code, DiagnosticCode::EmptyStatement);
    }

    #[test]
    fn missing_semicolon_is_unexpected_eof() {
        let result = validate("USE testdb");
        assert_eq!(result.errors[0].code, DiagnosticCode::UnexpectedEof);
    }

    #[test]
    fn where_clause_chains_conditions() {
        let result = validate("SELECT * FROM \"orders\" WHERE total >= 10 AND open == true;");
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn update_with_assignments() {
        let result = validate("UPDATE \"users\" SET name = \"ada\", age = 37 WHERE id == 1;");
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn insert_with_and_without_field_list() {
        assert!(validate("INSERT INTO \"users\" (name, age) VALUES (\"ada\", 37);").valid);
        assert!(validate("INSERT INTO \"users\" VALUES (\"ada\", 37);").valid);
    }

    #[test]
    fn create_bundle_with_field_definitions() {
        let result = validate(
            "CREATE BUNDLE \"users\" (id NUMBER PRIMARY, email TEXT UNIQUE, bio TEXT NULLABLE);",
        );
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn ddl_alternatives() {
        assert!(validate("DROP BUNDLE \"users\";").valid);
        assert!(validate("ALTER BUNDLE \"users\" ADD FIELD age NUMBER;").valid);
        assert!(validate("CREATE INDEX idx_email ON \"users\" (email);").valid);
    }

    #[test]
    fn dol_statements() {
        assert!(validate("USE testdb;").valid);
        assert!(validate("GRANT read, write ON BUNDLE \"users\" TO alice;").valid);
        assert!(validate("REVOKE admin ON DATABASE testdb FROM bob;").valid);
        assert!(validate("SHOW DATABASES;").valid);
    }

    #[test]
    fn migration_statements() {
        assert!(validate("MIGRATION add_users;").valid);
        assert!(validate("MIGRATION add_orders DEPENDS ON add_users;").valid);
        assert!(validate("APPLY MIGRATION add_users;").valid);
        assert!(validate("VALIDATE MIGRATION add_users;").valid);
        assert!(validate("ROLLBACK MIGRATION add_users;").valid);
    }

    #[test]
    fn surplus_tokens_are_reported() {
        let result = validate("USE testdb testdb2;");
        assert!(!result.valid);
        assert_eq!(result.errors[0].code, DiagnosticCode::UnexpectedToken);
    }

    #[test]
    fn delete_statement() {
        assert!(validate("DELETE FROM \"orders\" WHERE shipped == false;").valid);
    }
}
