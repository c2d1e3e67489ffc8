use serde::{Deserialize, Serialize};

/// One grammar symbol: a matcher plus the `optional`/`repeatable` flags.
///
/// Symbols are deserialized once from the grammar JSON into this closed set;
/// after loading, matching is a closed-world switch over [`Matcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(flatten)]
    pub matcher: Matcher,
    /// Skipped on mismatch instead of failing the production.
    #[serde(default)]
    pub optional: bool,
    /// Re-applied greedily while it matches and consumes at least one token.
    #[serde(default)]
    pub repeatable: bool,
}

/// The polymorphic symbol shapes of the grammar JSON, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Matcher {
    /// Upper-case `name` matches a token kind; lower-case `name` is a
    /// contextual reference resolved against the schema at completion time.
    Token { name: String },
    /// Matches a token whose text equals `text` case-insensitively.
    Literal { text: String },
    /// Recurses into another rule's first production.
    Reference { rule: String },
    /// First-match-wins alternatives, selected by longest successful match.
    Branches { alternatives: Vec<Production> },
}

/// An ordered list of symbols; a rule is a list of alternative productions.
pub type Production = Vec<Symbol>;

/// Contextual reference names the suggestion engine resolves against the
/// schema context.
pub const CONTEXT_DATABASE: &str = "database_reference";
pub const CONTEXT_BUNDLE: &str = "bundle_reference";
pub const CONTEXT_FIELD: &str = "field_reference";
pub const CONTEXT_USER: &str = "user_reference";
pub const CONTEXT_MIGRATION: &str = "migration_reference";
pub const CONTEXT_INDEX: &str = "index_reference";
pub const CONTEXT_LITERAL: &str = "literal";

/// A `token(...)` name is contextual when it starts lower-case.
pub fn is_contextual(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}

/// Human-readable description of what a matcher accepts, used in
/// `expected ..., found ...` messages.
pub(crate) fn describe(matcher: &Matcher) -> String {
    match matcher {
        Matcher::Token { name } if is_contextual(name) => name.replace('_', " "),
        Matcher::Token { name } => name.clone(),
        Matcher::Literal { text } => format!("`{text}`"),
        Matcher::Reference { rule } => rule.replace('_', " "),
        Matcher::Branches { alternatives } => {
            let firsts: Vec<String> = alternatives
                .iter()
                .filter_map(|production| production.first())
                .map(|symbol| describe(&symbol.matcher))
                .collect();
            firsts.join(" or ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_polymorphic_shapes() {
        let json = r#"[
            {"kind": "literal", "text": "SELECT"},
            {"kind": "token", "name": "bundle_reference"},
            {"kind": "reference", "rule": "where_clause", "optional": true},
            {"kind": "branches", "alternatives": [[{"kind": "token", "name": "STAR"}]], "repeatable": true}
        ]"#;
        let symbols: Vec<Symbol> = serde_json::from_str(json).unwrap();
        assert_eq!(
            symbols[0].matcher,
            Matcher::Literal {
                text: "SELECT".to_string()
            }
        );
        assert!(!symbols[0].optional);
        assert!(symbols[2].optional);
        assert!(symbols[3].repeatable);
        match &symbols[3].matcher {
            Matcher::Branches { alternatives } => assert_eq!(alternatives.len(), 1),
            other => panic!("expected branches, got {other:?}"),
        }
    }

    #[test]
    fn contextual_names_are_lower_case() {
        assert!(is_contextual("bundle_reference"));
        assert!(is_contextual("literal"));
        assert!(!is_contextual("SEMICOLON"));
        assert!(!is_contextual("NUMBER"));
    }
}
