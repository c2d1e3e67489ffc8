use crate::loader::{Grammar, GrammarSet, StatementFamily};
use crate::symbol::{is_contextual, Matcher, Production, Symbol, CONTEXT_LITERAL};
use indexmap::IndexSet;
use plume_syntax::docql::TokenKind;
use plume_syntax::Token;
use std::collections::HashSet;

const MAX_DEPTH: usize = 64;

/// One entry of the expected-next set produced by the suggestion-mode walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expected {
    /// Upper-case token kind name, e.g. `SEMICOLON`, `STAR`, `NUMBER`.
    Token(String),
    /// A `literal(...)` symbol's spelling, e.g. `SELECT` or `DATABASES`.
    Keyword(String),
    /// A contextual reference to resolve against the schema, e.g.
    /// `bundle_reference`.
    Context(String),
}

/// The deduplicated expected-next set at a cursor position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectations {
    items: IndexSet<Expected>,
}

impl Expectations {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expected> {
        self.items.iter()
    }

    /// True when the grammar expects nothing but a user-typed value, which
    /// suppresses all completions.
    pub fn literal_only(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|e| matches!(e, Expected::Context(name) if name == CONTEXT_LITERAL))
    }

    fn insert(&mut self, expected: Expected) {
        self.items.insert(expected);
    }
}

/// Computes the expected-next set after `tokens`, the complete significant
/// tokens strictly before the cursor.
///
/// This re-executes the same grammar walk as validation, collecting the
/// first symbols of the first unmatched position instead of reporting
/// errors. With no tokens at all, every family's root contributes its first
/// symbols — the statement-start expectation set.
pub fn suggest_at(set: &GrammarSet, tokens: &[Token<TokenKind>]) -> Expectations {
    let significant: Vec<Token<TokenKind>> = tokens
        .iter()
        .filter(|t| t.kind().is_significant())
        .cloned()
        .collect();

    let mut out = Expectations::default();

    if significant.is_empty() {
        for family in StatementFamily::ALL {
            collect_family(set.grammar(family), &significant, &mut out);
        }
        return out;
    }

    let Some(family) = StatementFamily::dispatch(&significant[0]) else {
        return out;
    };
    collect_family(set.grammar(family), &significant, &mut out);
    out
}

fn collect_family(grammar: &Grammar, tokens: &[Token<TokenKind>], out: &mut Expectations) {
    let mut visited = HashSet::new();
    for production in grammar.root() {
        advance_production(grammar, production, tokens, 0, 0, &mut visited, out);
    }
}

/// Outcome of advancing one symbol or production during the suggestion walk.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Advance {
    /// Fully matched before the cursor; the walk continues after it.
    Matched(usize),
    /// Ran out of tokens while matching; `consumed` counts the tokens the
    /// symbol consumed before the cursor. A symbol that consumed anything is
    /// committed: the walk must not skip past it even if it is optional.
    NeedMore { consumed: usize },
    Failed,
}

fn advance_production(
    grammar: &Grammar,
    production: &Production,
    tokens: &[Token<TokenKind>],
    start: usize,
    depth: usize,
    visited: &mut HashSet<String>,
    out: &mut Expectations,
) -> Advance {
    if depth > MAX_DEPTH {
        return Advance::Failed;
    }

    let mut index = start;
    for symbol in production {
        let mut matched_once = false;
        loop {
            match advance_symbol(grammar, symbol, tokens, index, depth, visited, out) {
                Advance::Matched(next) => {
                    let consumed_here = next - index;
                    index = next;
                    matched_once = true;
                    if !symbol.repeatable || consumed_here == 0 {
                        break;
                    }
                }
                Advance::NeedMore { consumed } => {
                    if consumed == 0 && (symbol.optional || matched_once) {
                        // The cursor sits exactly at an optional symbol's
                        // start: its first symbols are now collected, and
                        // the walk continues past it so what follows is
                        // offered too.
                        break;
                    }
                    return Advance::NeedMore {
                        consumed: (index - start) + consumed,
                    };
                }
                Advance::Failed => {
                    if symbol.optional || matched_once {
                        break;
                    }
                    return Advance::Failed;
                }
            }
        }
    }
    Advance::Matched(index)
}

fn advance_symbol(
    grammar: &Grammar,
    symbol: &Symbol,
    tokens: &[Token<TokenKind>],
    index: usize,
    depth: usize,
    visited: &mut HashSet<String>,
    out: &mut Expectations,
) -> Advance {
    let at_cursor = index >= tokens.len();

    match &symbol.matcher {
        Matcher::Token { name } => {
            if at_cursor {
                if is_contextual(name) {
                    out.insert(Expected::Context(name.clone()));
                } else {
                    out.insert(Expected::Token(name.clone()));
                }
                Advance::NeedMore { consumed: 0 }
            } else if crate::engine::token_matches(name, &tokens[index]) {
                Advance::Matched(index + 1)
            } else {
                Advance::Failed
            }
        }
        Matcher::Literal { text } => {
            if at_cursor {
                out.insert(Expected::Keyword(text.clone()));
                Advance::NeedMore { consumed: 0 }
            } else if tokens[index].text().eq_ignore_ascii_case(text) {
                Advance::Matched(index + 1)
            } else {
                Advance::Failed
            }
        }
        Matcher::Reference { rule } => {
            if at_cursor && !visited.insert(rule.clone()) {
                // Already expanded at the cursor; a second visit cannot
                // contribute new first symbols.
                return Advance::NeedMore { consumed: 0 };
            }
            let Some(first) = grammar.rule(rule).and_then(|p| p.first()) else {
                return Advance::Failed;
            };
            advance_production(grammar, first, tokens, index, depth + 1, visited, out)
        }
        Matcher::Branches { alternatives } => {
            let mut longest: Option<usize> = None;
            let mut pending: Option<usize> = None;
            for alternative in alternatives {
                match advance_production(grammar, alternative, tokens, index, depth + 1, visited, out)
                {
                    Advance::Matched(next) if Some(next) > longest => longest = Some(next),
                    Advance::Matched(_) => {}
                    Advance::NeedMore { consumed } if Some(consumed) > pending => {
                        pending = Some(consumed)
                    }
                    Advance::NeedMore { .. } | Advance::Failed => {}
                }
            }
            if let Some(next) = longest {
                Advance::Matched(next)
            } else if let Some(consumed) = pending {
                Advance::NeedMore { consumed }
            } else {
                Advance::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::GrammarSet;
    use plume_syntax::docql;
    use pretty_assertions::assert_eq;

    fn expectations(source: &str) -> Expectations {
        let set = GrammarSet::embedded().unwrap();
        let tokens = docql::lex(source);
        let complete: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind().is_significant())
            .cloned()
            .collect();
        suggest_at(&set, &complete)
    }

    #[test]
    fn statement_start_offers_every_family_verb() {
        let expected = expectations("");
        let keywords: Vec<&Expected> = expected
            .iter()
            .filter(|e| matches!(e, Expected::Keyword(_)))
            .collect();
        for verb in ["CREATE", "SELECT", "GRANT", "USE", "APPLY", "MIGRATION"] {
            assert!(
                keywords.contains(&&Expected::Keyword(verb.to_string())),
                "missing {verb} in {keywords:?}"
            );
        }
    }

    #[test]
    fn after_from_expects_a_bundle() {
        let expected = expectations("SELECT * FROM ");
        let items: Vec<&Expected> = expected.iter().collect();
        assert_eq!(
            items,
            vec![&Expected::Context("bundle_reference".to_string())]
        );
    }

    #[test]
    fn after_comparison_expects_only_a_literal() {
        let expected = expectations("SELECT * FROM \"users\" WHERE \"email\" == ");
        assert!(expected.literal_only(), "got {expected:?}");
    }

    #[test]
    fn after_bundle_offers_clauses_and_terminator() {
        let expected = expectations("SELECT * FROM \"orders\" ");
        let has = |e: Expected| expected.iter().any(|x| *x == e);
        assert!(has(Expected::Keyword("WHERE".to_string())));
        assert!(has(Expected::Keyword("ORDER".to_string())));
        assert!(has(Expected::Keyword("LIMIT".to_string())));
        assert!(has(Expected::Token("SEMICOLON".to_string())));
    }

    #[test]
    fn after_select_offers_star_and_fields() {
        let expected = expectations("SELECT ");
        let has = |e: Expected| expected.iter().any(|x| *x == e);
        assert!(has(Expected::Token("STAR".to_string())));
        assert!(has(Expected::Context("field_reference".to_string())));
    }

    #[test]
    fn after_create_offers_object_kinds() {
        let expected = expectations("CREATE ");
        let has = |e: Expected| expected.iter().any(|x| *x == e);
        assert!(has(Expected::Keyword("DATABASE".to_string())));
        assert!(has(Expected::Keyword("BUNDLE".to_string())));
        assert!(has(Expected::Keyword("INDEX".to_string())));
        assert!(has(Expected::Keyword("USER".to_string())));
    }

    #[test]
    fn unknown_first_token_yields_nothing() {
        let expected = expectations("frobnicate ");
        assert!(expected.is_empty());
    }

    #[test]
    fn mid_keyword_partial_is_not_expected_here() {
        // The caller excludes a token straddling the cursor; given complete
        // tokens `SELECT * FROM "a" WHERE`, a field is expected next.
        let expected = expectations("SELECT * FROM \"a\" WHERE ");
        assert!(expected
            .iter()
            .any(|e| *e == Expected::Context("field_reference".to_string())));
    }
}
