use crate::token::Token;
use crate::{docql, graphql};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single statement sliced out of a document: the cache key and the unit
/// of validation.
///
/// `text` is always the original source slice between statement boundaries
/// (trimmed), never a re-join of token texts, so whitespace inside the
/// statement is preserved with full fidelity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement<K> {
    pub text: String,
    /// Content-addressed hash of `text`, stable across runs.
    pub hash: String,
    pub tokens: Vec<Token<K>>,
    pub line_start: u32,
    pub line_end: u32,
    pub offset_start: usize,
    pub offset_end: usize,
}

impl<K: Clone> Statement<K> {
    /// Byte length of the statement text, used by the cache byte budget.
    pub fn byte_size(&self) -> usize {
        self.text.len()
    }
}

/// Content-addressed statement hash: the first 16 hex characters of the
/// SHA-256 of the statement text.
pub fn statement_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Splits a DocQL document into statements at semicolons outside string
/// literals.
///
/// Comments, whitespace and newlines are skipped for boundary detection but
/// preserved in the statement's text slice. A trailing statement without a
/// terminating semicolon is still emitted.
pub fn split_docql(
    source: &str,
    tokens: &[Token<docql::TokenKind>],
) -> Vec<Statement<docql::TokenKind>> {
    let mut statements = Vec::new();
    let mut pending: Vec<Token<docql::TokenKind>> = Vec::new();

    for token in tokens {
        if *token.kind() == docql::TokenKind::Eof {
            break;
        }
        pending.push(token.clone());
        if *token.kind() == docql::TokenKind::Operator(docql::Operator::Semicolon) {
            if let Some(statement) = build_statement(source, &pending, docql_significant) {
                statements.push(statement);
            }
            pending.clear();
        }
    }

    if let Some(statement) = build_statement(source, &pending, docql_significant) {
        statements.push(statement);
    }

    statements
}

fn docql_significant(kind: &docql::TokenKind) -> bool {
    kind.is_significant()
}

/// Splits a GraphQL document into top-level operations and fragments.
///
/// A statement starts at a top-level `query`/`mutation`/`subscription`/
/// `fragment` keyword or a bare `{`, and ends at the matching `}` of its
/// root selection set. Insignificant tokens are filtered before brace
/// counting; an unclosed operation runs to the end of input.
pub fn split_graphql(
    source: &str,
    tokens: &[Token<graphql::TokenKind>],
) -> Vec<Statement<graphql::TokenKind>> {
    use graphql::TokenKind;

    let mut statements = Vec::new();
    let mut pending: Vec<Token<TokenKind>> = Vec::new();
    let mut depth: i32 = 0;
    let mut in_statement = false;

    for token in tokens {
        if *token.kind() == TokenKind::Eof {
            break;
        }
        if !in_statement {
            let starts = matches!(
                token.kind(),
                TokenKind::Keyword(
                    graphql::Keyword::Query
                        | graphql::Keyword::Mutation
                        | graphql::Keyword::Subscription
                        | graphql::Keyword::Fragment
                ) | TokenKind::LCurly
            );
            if !starts {
                // Trivia between statements, or a stray top-level token that
                // is carried into the next statement for the validator to
                // report rather than being dropped.
                pending.push(token.clone());
                continue;
            }
            in_statement = true;
            depth = 0;
        }

        pending.push(token.clone());
        match token.kind() {
            TokenKind::LCurly => depth += 1,
            TokenKind::RCurly => {
                depth -= 1;
                if depth <= 0 {
                    if let Some(statement) = build_statement(source, &pending, gql_significant) {
                        statements.push(statement);
                    }
                    pending.clear();
                    in_statement = false;
                }
            }
            _ => {}
        }
    }

    if let Some(statement) = build_statement(source, &pending, gql_significant) {
        statements.push(statement);
    }

    statements
}

fn gql_significant(kind: &graphql::TokenKind) -> bool {
    kind.is_significant()
}

/// Builds a statement from the pending token run, trimming leading and
/// trailing trivia so `text` matches the trimmed source slice. Runs that
/// contain no significant tokens produce nothing.
fn build_statement<K: Clone>(
    source: &str,
    pending: &[Token<K>],
    significant: impl Fn(&K) -> bool,
) -> Option<Statement<K>> {
    let first = pending.iter().position(|t| significant(t.kind()))?;
    let last = pending.iter().rposition(|t| significant(t.kind()))?;
    let tokens: Vec<Token<K>> = pending[first..=last].to_vec();

    let offset_start = tokens[0].start_offset();
    let offset_end = tokens[tokens.len() - 1].end_offset();
    let text = source[offset_start..offset_end].to_string();
    let line_start = tokens[0].line();
    let line_end = tokens[tokens.len() - 1].line();

    Some(Statement {
        hash: statement_hash(&text),
        text,
        tokens,
        line_start,
        line_end,
        offset_start,
        offset_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn docql_statements(source: &str) -> Vec<Statement<docql::TokenKind>> {
        let tokens = docql::lex(source);
        split_docql(source, &tokens)
    }

    fn graphql_statements(source: &str) -> Vec<Statement<graphql::TokenKind>> {
        let tokens = graphql::lex(source);
        split_graphql(source, &tokens)
    }

    #[test]
    fn splits_on_semicolons() {
        let statements = docql_statements("USE testdb;\nSELECT * FROM \"orders\";");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].text, "USE testdb;");
        assert_eq!(statements[1].text, "SELECT * FROM \"orders\";");
        assert_eq!(statements[1].line_start, 2);
    }

    #[test]
    fn semicolon_inside_string_is_not_a_boundary() {
        let statements = docql_statements("INSERT INTO \"a;b\" VALUES (\"x;y\");");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn trailing_statement_without_semicolon() {
        let statements = docql_statements("USE testdb; SELECT *");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].text, "SELECT *");
    }

    #[test]
    fn statement_text_preserves_interior_whitespace() {
        let source = "SELECT   *\n  FROM \"orders\";";
        let statements = docql_statements(source);
        assert_eq!(statements[0].text, source);
    }

    #[test]
    fn hashes_are_deterministic() {
        let a = docql_statements("SELECT * FROM x;");
        let b = docql_statements("SELECT * FROM x;");
        assert_eq!(a[0].hash, b[0].hash);
        assert_eq!(a[0].hash.len(), 16);
    }

    #[test]
    fn identical_text_shares_a_hash_across_positions() {
        let statements = docql_statements("USE a;\nUSE a;");
        assert_eq!(statements[0].hash, statements[1].hash);
        assert_ne!(statements[0].offset_start, statements[1].offset_start);
    }

    #[test]
    fn comment_only_runs_are_skipped() {
        let statements = docql_statements("-- nothing here\n");
        assert!(statements.is_empty());
    }

    #[test]
    fn graphql_operations_are_brace_balanced() {
        let source = "query A { user { id } }\nmutation B { add }";
        let statements = graphql_statements(source);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].text, "query A { user { id } }");
        assert_eq!(statements[1].text, "mutation B { add }");
    }

    #[test]
    fn graphql_shorthand_query() {
        let statements = graphql_statements("{ users { name } }");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text, "{ users { name } }");
    }

    #[test]
    fn graphql_fragment_statement() {
        let statements = graphql_statements("fragment F on User { id }");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn graphql_unclosed_operation_runs_to_eof() {
        let statements = graphql_statements("query { users {");
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text, "query { users {");
    }

    #[test]
    fn joined_statement_texts_keep_every_boundary_semicolon() {
        let source = "USE a; -- note ;;; in a comment\nSELECT * FROM \"x;y\" WHERE n == \"q;\";";
        let statements = docql_statements(source);
        let joined = statements
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let boundary_semicolons = |text: &str| {
            let tokens = docql::lex(text);
            tokens
                .iter()
                .filter(|t| {
                    *t.kind() == docql::TokenKind::Operator(docql::Operator::Semicolon)
                })
                .count()
        };
        assert_eq!(boundary_semicolons(&joined), boundary_semicolons(source));
    }

    #[test]
    fn reparsing_yields_identical_hashes() {
        let source = "USE a; SELECT * FROM b;";
        let first: Vec<String> = docql_statements(source).into_iter().map(|s| s.hash).collect();
        let second: Vec<String> = docql_statements(source).into_iter().map(|s| s.hash).collect();
        assert_eq!(first, second);
    }
}
