use plume_context::{RootOperation, SchemaContext};
use plume_syntax::graphql::{Keyword, TokenKind};
use plume_syntax::{Diagnostic, DiagnosticCode, Statement, Token, ValidationResult};

/// Validates one GraphQL operation or fragment: lexical errors, delimiter
/// balance, top-level and operation structure, selection sets, and — when a
/// schema context is attached — depth-1 root field names.
pub fn validate_statement(
    statement: &Statement<TokenKind>,
    context: Option<&SchemaContext>,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    let significant: Vec<&Token<TokenKind>> = statement
        .tokens
        .iter()
        .filter(|t| t.kind().is_significant())
        .collect();

    check_illegal(&significant, &mut result);
    check_balance(&significant, &mut result);
    check_structure(&significant, context, &mut result);

    result
}

fn check_illegal(tokens: &[&Token<TokenKind>], result: &mut ValidationResult) {
    for token in tokens {
        if *token.kind() == TokenKind::Illegal {
            let code = if token.text().starts_with('"') {
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
}

/// Stack-based balance check across `{}`, `()` and `[]`.
fn check_balance(tokens: &[&Token<TokenKind>], result: &mut ValidationResult) {
    let mut stack: Vec<(&Token<TokenKind>, TokenKind)> = Vec::new();
    for &token in tokens {
        match token.kind() {
            TokenKind::LCurly => stack.push((token, TokenKind::RCurly)),
            TokenKind::LParen => stack.push((token, TokenKind::RParen)),
            TokenKind::LBracket => stack.push((token, TokenKind::RBracket)),
            kind @ (TokenKind::RCurly | TokenKind::RParen | TokenKind::RBracket) => {
                // A mismatched close leaves the open on the stack so a later
                // correct close can still pair with it.
                if stack.last().is_some_and(|(_, expected)| expected == kind) {
                    stack.pop();
                } else {
                    result.push(Diagnostic::error(
                        DiagnosticCode::UnbalancedDelimiter,
                        format!("unmatched `{}`", token.text()),
                        token.span(),
                    ));
                }
            }
            _ => {}
        }
    }
    for (open, _) in stack {
        result.push(Diagnostic::error(
            DiagnosticCode::UnclosedDelimiter,
            format!("`{}` is never closed", open.text()),
            open.span(),
        ));
    }
}

fn check_structure(
    tokens: &[&Token<TokenKind>],
    context: Option<&SchemaContext>,
    result: &mut ValidationResult,
) {
    let Some(first) = tokens.first() else {
        return;
    };

    match first.kind() {
        TokenKind::Keyword(Keyword::Query) => {
            check_operation(tokens, RootOperation::Query, context, result)
        }
        TokenKind::Keyword(Keyword::Mutation) => {
            check_operation(tokens, RootOperation::Mutation, context, result)
        }
        TokenKind::Keyword(Keyword::Subscription) => {
            check_operation(tokens, RootOperation::Subscription, context, result)
        }
        TokenKind::Keyword(Keyword::Fragment) => check_fragment(tokens, result),
        TokenKind::LCurly => {
            // Shorthand query.
            check_selection_set(tokens, 0, Some(RootOperation::Query), context, result);
        }
        _ => {
            result.push(Diagnostic::error(
                DiagnosticCode::UnexpectedToken,
                format!("unexpected token `{}` at top level", first.text()),
                first.span(),
            ));
            // Recover at the first plausible statement start.
            if let Some(next) = tokens.iter().position(|t| {
                matches!(
                    t.kind(),
                    TokenKind::Keyword(
                        Keyword::Query
                            | Keyword::Mutation
                            | Keyword::Subscription
                            | Keyword::Fragment
                    ) | TokenKind::LCurly
                )
            }) {
                check_structure(&tokens[next..], context, result);
            }
        }
    }
}

/// `keyword [Name] [( variable definitions )] [@directive (args)?]* { … }`
fn check_operation(
    tokens: &[&Token<TokenKind>],
    operation: RootOperation,
    context: Option<&SchemaContext>,
    result: &mut ValidationResult,
) {
    let mut index = 1;

    if matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::Name)) {
        index += 1;
    }
    if matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::LParen)) {
        index = skip_group(tokens, index, TokenKind::LParen, TokenKind::RParen);
    }
    while matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::At)) {
        index += 1;
        if matches!(
            tokens.get(index).map(|t| t.kind()),
            Some(TokenKind::Name | TokenKind::Keyword(_))
        ) {
            index += 1;
        }
        if matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::LParen)) {
            index = skip_group(tokens, index, TokenKind::LParen, TokenKind::RParen);
        }
    }

    match tokens.get(index).map(|t| t.kind()) {
        Some(TokenKind::LCurly) => {
            check_selection_set(tokens, index, Some(operation), context, result)
        }
        _ => {
            let span = tokens
                .get(index)
                .or_else(|| tokens.last())
                .map(|t| t.span())
                .unwrap_or((0, 0));
            result.push(Diagnostic::error(
                DiagnosticCode::MissingSelectionSet,
                "operation has no selection set",
                span,
            ));
        }
    }
}

/// `fragment Name on Name { … }`
fn check_fragment(tokens: &[&Token<TokenKind>], result: &mut ValidationResult) {
    let mut index = 1;
    if matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::Name)) {
        index += 1;
    }
    if matches!(
        tokens.get(index).map(|t| t.kind()),
        Some(TokenKind::Keyword(Keyword::On))
    ) {
        index += 1;
        if matches!(tokens.get(index).map(|t| t.kind()), Some(TokenKind::Name)) {
            index += 1;
        }
    }
    match tokens.get(index).map(|t| t.kind()) {
        Some(TokenKind::LCurly) => {
            // Fragment fields are typed against the fragment's condition,
            // which the context does not model; no root field check here.
            check_selection_set(tokens, index, None, None, result);
        }
        _ => {
            let span = tokens.last().map(|t| t.span()).unwrap_or((0, 0));
            result.push(Diagnostic::error(
                DiagnosticCode::MissingSelectionSet,
                "fragment has no selection set",
                span,
            ));
        }
    }
}

/// Skips a delimited group, returning the index one past its close. Stops at
/// end of input for unterminated groups (reported by the balance check).
fn skip_group(
    tokens: &[&Token<TokenKind>],
    open_index: usize,
    open: TokenKind,
    close: TokenKind,
) -> usize {
    let mut depth = 0;
    let mut index = open_index;
    while let Some(token) = tokens.get(index) {
        if *token.kind() == open {
            depth += 1;
        } else if *token.kind() == close {
            depth -= 1;
            if depth == 0 {
                return index + 1;
            }
        }
        index += 1;
    }
    index
}

/// Checks the root selection set starting at the `{` at `open_index`:
/// `EMPTY_SELECTION_SET` for `{ }`, and depth-1 field names against the
/// operation's known root fields when a schema context is attached.
fn check_selection_set(
    tokens: &[&Token<TokenKind>],
    open_index: usize,
    operation: Option<RootOperation>,
    context: Option<&SchemaContext>,
    result: &mut ValidationResult,
) {
    let close_index = skip_group(tokens, open_index, TokenKind::LCurly, TokenKind::RCurly);
    let inner = &tokens[open_index + 1..close_index.saturating_sub(1).max(open_index + 1)];

    if inner.is_empty() {
        let open = tokens[open_index];
        let end = tokens
            .get(close_index.saturating_sub(1))
            .map(|t| t.end_offset())
            .unwrap_or_else(|| open.end_offset());
        result.push(Diagnostic::error(
            DiagnosticCode::EmptySelectionSet,
            "selection set must select at least one field",
            (open.start_offset(), end),
        ));
        return;
    }

    let (Some(operation), Some(context)) = (operation, context) else {
        return;
    };
    let known = context.root_fields(operation);
    if known.is_empty() {
        return;
    }

    for field in depth_one_fields(inner) {
        if !known.iter().any(|root| root == field.text()) {
            result.push(Diagnostic::warning(
                DiagnosticCode::UnknownField,
                format!("`{}` is not a known root field", field.text()),
                field.span(),
            ));
        }
    }
}

/// Field names selected at depth 1 of a selection set body: names outside
/// argument lists, excluding directive names, fragment spread targets,
/// type conditions and aliases.
fn depth_one_fields<'t>(inner: &[&'t Token<TokenKind>]) -> Vec<&'t Token<TokenKind>> {
    let mut fields = Vec::new();
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    for (index, token) in inner.iter().enumerate() {
        match token.kind() {
            TokenKind::LCurly => brace_depth += 1,
            TokenKind::RCurly => brace_depth = brace_depth.saturating_sub(1),
            TokenKind::LParen => paren_depth += 1,
            TokenKind::RParen => paren_depth = paren_depth.saturating_sub(1),
            TokenKind::Name if brace_depth == 0 && paren_depth == 0 => {
                let previous = index.checked_sub(1).map(|i| inner[i].kind());
                let skipped = matches!(
                    previous,
                    Some(TokenKind::At | TokenKind::Spread | TokenKind::Keyword(Keyword::On))
                );
                // An alias is the name before a colon; the field follows it.
                let is_alias = matches!(
                    inner.get(index + 1).map(|t| t.kind()),
                    Some(TokenKind::Colon)
                );
                if !skipped && !is_alias {
                    fields.push(*token);
                }
            }
            _ => {}
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_syntax::graphql;
    use pretty_assertions::assert_eq;

    fn validate(source: &str, context: Option<&SchemaContext>) -> ValidationResult {
        let tokens = graphql::lex(source);
        let statements = plume_syntax::split_graphql(source, &tokens);
        assert_eq!(statements.len(), 1, "expected one statement in {source:?}");
        validate_statement(&statements[0], context)
    }

    fn schema_with_query_roots(roots: &[&str]) -> SchemaContext {
        let mut context = SchemaContext::new();
        context.set_root_fields(
            RootOperation::Query,
            roots.iter().map(|r| r.to_string()).collect(),
        );
        context
    }

    #[test]
    fn empty_selection_set() {
        let result = validate("query { }", None);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, DiagnosticCode::EmptySelectionSet);
    }

    #[test]
    fn unknown_root_field_is_a_warning() {
        let context = schema_with_query_roots(&["users"]);
        let source = "{ posts { id } }";
        let result = validate(source, Some(&context));
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.code, DiagnosticCode::UnknownField);
        assert_eq!(&source[warning.start_offset..warning.end_offset], "posts");
    }

    #[test]
    fn known_root_fields_pass() {
        let context = schema_with_query_roots(&["users", "orders"]);
        let result = validate("{ users { id } orders { id } }", Some(&context));
        assert_eq!(result.warnings, vec![]);
    }

    #[test]
    fn nested_fields_are_not_root_checked() {
        let context = schema_with_query_roots(&["users"]);
        let result = validate("{ users { posts { id } } }", Some(&context));
        assert_eq!(result.warnings, vec![]);
    }

    #[test]
    fn missing_selection_set() {
        let result = validate("query GetUsers", None);
        assert!(codes(&result).contains(&DiagnosticCode::MissingSelectionSet));
    }

    #[test]
    fn unbalanced_close() {
        let result = validate("query { users ) }", None);
        assert!(codes(&result).contains(&DiagnosticCode::UnbalancedDelimiter));
    }

    #[test]
    fn unclosed_open() {
        let result = validate("query { users {", None);
        assert!(codes(&result).contains(&DiagnosticCode::UnclosedDelimiter));
    }

    #[test]
    fn operation_with_variables_and_directives() {
        let result = validate(
            "query GetUser($id: ID!) @cached(ttl: 60) { user(id: $id) { name } }",
            None,
        );
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn fragment_structure() {
        let result = validate("fragment UserBits on User { id name }", None);
        assert_eq!(result.errors, vec![]);
    }

    #[test]
    fn arguments_and_aliases_are_not_fields() {
        let context = schema_with_query_roots(&["users"]);
        let result = validate(
            "{ team: users(role: \"admin\") { id } }",
            Some(&context),
        );
        assert_eq!(result.warnings, vec![]);
    }

    #[test]
    fn illegal_token_reported() {
        let result = validate("query { users § }", None);
        assert!(codes(&result).contains(&DiagnosticCode::IllegalCharacter));
    }

    fn codes(result: &ValidationResult) -> Vec<DiagnosticCode> {
        result.all().map(|d| d.code).collect()
    }
}
