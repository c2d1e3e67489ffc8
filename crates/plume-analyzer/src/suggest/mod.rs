mod fuzzy;
mod memo;
mod usage;

pub use fuzzy::fuzzy_score;
pub use usage::UsageTracker;

use memo::Memoizer;
use parking_lot::Mutex;
use plume_context::{ContextExpander, RootOperation, SchemaContext};
use plume_grammar::{Expectations, Expected, GrammarEngine};
use plume_syntax::docql;
use plume_syntax::graphql;
use plume_syntax::Token;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Keyword,
    Database,
    Bundle,
    Field,
    User,
    Function,
    Operator,
    Value,
    Snippet,
    Relationship,
    Permission,
}

/// One completion item, ready for the host's completion widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub kind: SuggestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub insert_text: String,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
}

impl Suggestion {
    fn new(label: impl Into<String>, kind: SuggestionKind, priority: i32) -> Suggestion {
        let label = label.into();
        Suggestion {
            insert_text: label.clone(),
            label,
            kind,
            detail: None,
            documentation: None,
            priority,
            sort_text: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Suggestion {
        self.detail = Some(detail.into());
        self
    }

    fn with_insert_text(mut self, insert_text: impl Into<String>) -> Suggestion {
        self.insert_text = insert_text.into();
        self
    }
}

const PRIORITY_CONTEXT: i32 = 70;
const PRIORITY_KEYWORD: i32 = 50;
const PRIORITY_OPERATOR: i32 = 40;
const PRIORITY_SNIPPET: i32 = 30;

/// Composes grammar expectations with contextual entity resolution, fuzzy
/// filtering, usage-weighted ranking and result memoization.
pub struct SuggestionEngine {
    memo: Memoizer,
    usage: Mutex<UsageTracker>,
}

impl SuggestionEngine {
    pub fn new(memo_capacity: usize, memo_ttl: Duration) -> SuggestionEngine {
        SuggestionEngine {
            memo: Memoizer::new(memo_capacity, memo_ttl),
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    /// Records that the user accepted a suggestion, boosting its rank in
    /// later requests.
    pub fn record_usage(&self, label: &str) {
        self.usage.lock().record(label);
    }

    /// DocQL completions at `cursor`.
    pub async fn docql_suggestions(
        &self,
        grammar: &GrammarEngine,
        context: &SchemaContext,
        expander: Option<&Arc<ContextExpander>>,
        text: &str,
        cursor: usize,
    ) -> Vec<Suggestion> {
        let cursor = cursor.min(text.len());
        let partial = partial_word(text, cursor);
        let boundary = cursor - partial.len();

        let tokens = docql::lex(text);
        let complete: Vec<Token<docql::TokenKind>> = tokens
            .into_iter()
            .filter(|t| t.kind().is_significant() && t.end_offset() <= boundary)
            .collect();

        let key = memo_key("docql", &complete, cursor, partial);
        if let Some(cached) = self.memo.get(&key) {
            return cached;
        }

        let expectations = grammar.suggest_at(&complete);
        if expectations.literal_only() {
            // The grammar wants a user-typed value here; offering
            // completions would only get in the way.
            self.memo.put(key, Vec::new());
            return Vec::new();
        }

        let mut candidates = self
            .expand_expectations(&expectations, context, expander, &complete)
            .await;
        if complete.is_empty() {
            candidates.extend(docql_snippets());
        }

        let suggestions = self.finalize(candidates, partial);
        tracing::debug!(
            count = suggestions.len(),
            partial,
            "docql suggestions computed"
        );
        self.memo.put(key, suggestions.clone());
        suggestions
    }

    /// GraphQL completions at `cursor`: operation keywords and snippets at
    /// the top level, known root fields at depth one, directives after `@`
    /// and the type-condition keyword after `...`.
    pub fn graphql_suggestions(
        &self,
        context: &SchemaContext,
        text: &str,
        cursor: usize,
    ) -> Vec<Suggestion> {
        let cursor = cursor.min(text.len());
        let partial = partial_word(text, cursor);
        let boundary = cursor - partial.len();

        let tokens = graphql::lex(text);
        let complete: Vec<Token<graphql::TokenKind>> = tokens
            .into_iter()
            .filter(|t| t.kind().is_significant() && t.end_offset() <= boundary)
            .collect();

        let key = memo_key("graphql", &complete, cursor, partial);
        if let Some(cached) = self.memo.get(&key) {
            return cached;
        }

        let mut candidates = Vec::new();

        if complete.is_empty() {
            for keyword in ["query", "mutation", "subscription", "fragment"] {
                candidates.push(Suggestion::new(
                    keyword,
                    SuggestionKind::Keyword,
                    PRIORITY_KEYWORD,
                ));
            }
            candidates.extend(graphql_snippets());
        } else {
            let depth = complete
                .iter()
                .fold(0i32, |depth, token| match token.kind() {
                    graphql::TokenKind::LCurly => depth + 1,
                    graphql::TokenKind::RCurly => depth - 1,
                    _ => depth,
                });
            match complete.last().map(|t| t.kind()) {
                Some(graphql::TokenKind::At) => {
                    for directive in ["include", "skip", "deprecated"] {
                        candidates.push(Suggestion::new(
                            directive,
                            SuggestionKind::Function,
                            PRIORITY_CONTEXT,
                        ));
                    }
                }
                Some(graphql::TokenKind::Spread) => {
                    candidates.push(Suggestion::new(
                        "on",
                        SuggestionKind::Keyword,
                        PRIORITY_KEYWORD,
                    ));
                }
                _ if depth == 1 => {
                    let operation = match complete.first().map(|t| t.kind()) {
                        Some(graphql::TokenKind::Keyword(graphql::Keyword::Mutation)) => {
                            RootOperation::Mutation
                        }
                        Some(graphql::TokenKind::Keyword(graphql::Keyword::Subscription)) => {
                            RootOperation::Subscription
                        }
                        _ => RootOperation::Query,
                    };
                    for field in context.root_fields(operation) {
                        candidates.push(
                            Suggestion::new(field, SuggestionKind::Field, PRIORITY_CONTEXT)
                                .with_detail("root field"),
                        );
                    }
                }
                _ => {}
            }
        }

        let suggestions = self.finalize(candidates, partial);
        self.memo.put(key, suggestions.clone());
        suggestions
    }

    async fn expand_expectations(
        &self,
        expectations: &Expectations,
        context: &SchemaContext,
        expander: Option<&Arc<ContextExpander>>,
        complete: &[Token<docql::TokenKind>],
    ) -> Vec<Suggestion> {
        let mut candidates = Vec::new();
        for expected in expectations.iter() {
            match expected {
                Expected::Keyword(spelling) => {
                    candidates.push(Suggestion::new(
                        spelling.clone(),
                        SuggestionKind::Keyword,
                        PRIORITY_KEYWORD,
                    ));
                }
                Expected::Token(name) => {
                    if let Some(operator) = docql::Operator::from_grammar_name(name) {
                        candidates.push(Suggestion::new(
                            operator.symbol(),
                            SuggestionKind::Operator,
                            PRIORITY_OPERATOR,
                        ));
                    }
                    // Plain value kinds (NUMBER, STRING) are user-typed.
                }
                Expected::Context(name) => {
                    self.resolve_context(name, context, expander, complete, &mut candidates)
                        .await;
                }
            }
        }
        candidates
    }

    async fn resolve_context(
        &self,
        name: &str,
        context: &SchemaContext,
        expander: Option<&Arc<ContextExpander>>,
        complete: &[Token<docql::TokenKind>],
        candidates: &mut Vec<Suggestion>,
    ) {
        match name {
            plume_grammar::CONTEXT_DATABASE => {
                for database in context.all_databases() {
                    candidates.push(
                        Suggestion::new(&database.name, SuggestionKind::Database, PRIORITY_CONTEXT)
                            .with_detail(format!("{} bundles", database.bundles.len())),
                    );
                }
            }
            plume_grammar::CONTEXT_BUNDLE => match context.current_database() {
                Some(database) => {
                    for bundle in context.all_bundles(database) {
                        candidates.push(
                            Suggestion::new(&bundle.name, SuggestionKind::Bundle, PRIORITY_CONTEXT)
                                .with_detail(format!("bundle in {database}")),
                        );
                    }
                }
                None => {
                    for database in context.all_databases() {
                        for bundle in database.bundles.values() {
                            candidates.push(
                                Suggestion::new(
                                    &bundle.name,
                                    SuggestionKind::Bundle,
                                    PRIORITY_CONTEXT,
                                )
                                .with_detail(format!("bundle in {}", database.name)),
                            );
                        }
                    }
                }
            },
            plume_grammar::CONTEXT_FIELD => {
                let Some(database) = context.current_database().map(str::to_string) else {
                    return;
                };
                let Some(bundle) = target_bundle(complete) else {
                    return;
                };
                let fields = match expander {
                    Some(expander) => expander.expand_fields(&database, &bundle).await,
                    None => context
                        .get_bundle(&database, &bundle)
                        .map(|b| b.fields.values().cloned().collect())
                        .unwrap_or_default(),
                };
                for field in fields {
                    candidates.push(
                        Suggestion::new(&field.name, SuggestionKind::Field, PRIORITY_CONTEXT)
                            .with_detail(format!("{:?}", field.field_type).to_lowercase()),
                    );
                }
            }
            plume_grammar::CONTEXT_USER => {
                let mut seen = Vec::new();
                for permission in context.all_permissions() {
                    if !seen.contains(&permission.principal) {
                        seen.push(permission.principal.clone());
                        candidates.push(Suggestion::new(
                            &permission.principal,
                            SuggestionKind::User,
                            PRIORITY_CONTEXT,
                        ));
                    }
                }
            }
            plume_grammar::CONTEXT_MIGRATION => {
                for migration in context.all_migrations() {
                    let detail = if migration.applied { "applied" } else { "pending" };
                    candidates.push(
                        Suggestion::new(
                            &migration.name,
                            SuggestionKind::Function,
                            PRIORITY_CONTEXT,
                        )
                        .with_detail(detail),
                    );
                }
            }
            // Index references and free-form literals have no entity list
            // to offer.
            _ => {}
        }
    }

    /// Dedup, rank, and fuzzy-filter the candidate list.
    fn finalize(&self, candidates: Vec<Suggestion>, partial: &str) -> Vec<Suggestion> {
        let mut deduped: Vec<Suggestion> = Vec::new();
        for candidate in candidates {
            match deduped
                .iter_mut()
                .find(|s| s.label == candidate.label && s.kind == candidate.kind)
            {
                Some(existing) => {
                    if candidate.priority > existing.priority {
                        *existing = candidate;
                    }
                }
                None => deduped.push(candidate),
            }
        }

        let usage = self.usage.lock();
        let mut ranked: Vec<(i32, Suggestion)> = deduped
            .into_iter()
            .map(|suggestion| {
                let final_priority = suggestion.priority + usage.boost(&suggestion.label);
                (final_priority, suggestion)
            })
            .collect();
        drop(usage);

        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.label.cmp(&b.1.label)));

        ranked
            .into_iter()
            .filter(|(_, suggestion)| fuzzy_score(&suggestion.label, partial).is_some())
            .map(|(final_priority, mut suggestion)| {
                suggestion.sort_text =
                    Some(format!("{:04}_{}", 1000 - final_priority, suggestion.label));
                suggestion
            })
            .collect()
    }
}

/// The bundle a field reference resolves against: named by the nearest
/// preceding `FROM`/`INTO`/`UPDATE` token.
fn target_bundle(complete: &[Token<docql::TokenKind>]) -> Option<String> {
    let mut bundle = None;
    let mut iter = complete.iter().peekable();
    while let Some(token) = iter.next() {
        if matches!(
            token.kind(),
            docql::TokenKind::Keyword(
                docql::Keyword::From | docql::Keyword::Into | docql::Keyword::Update
            )
        ) {
            if let Some(next) = iter.peek() {
                match next.kind() {
                    docql::TokenKind::Identifier | docql::TokenKind::String => {
                        bundle = Some(match next.literal() {
                            Some(plume_syntax::Literal::Str(value)) => value.clone(),
                            _ => next.text().to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }
    bundle
}

/// The longest `[A-Za-z0-9_]*` tail of the text ending at the cursor.
fn partial_word(text: &str, cursor: usize) -> &str {
    let head = &text[..cursor];
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map(|(index, _)| index)
        .unwrap_or(cursor);
    &head[start..]
}

fn memo_key<K>(language: &str, complete: &[Token<K>], cursor: usize, partial: &str) -> String {
    let mut key = String::with_capacity(complete.len() * 8 + 24);
    key.push_str(language);
    for token in complete {
        key.push('\u{1}');
        key.push_str(token.text());
    }
    key.push('\u{2}');
    key.push_str(&cursor.to_string());
    key.push('\u{2}');
    key.push_str(partial);
    key
}

fn docql_snippets() -> Vec<Suggestion> {
    vec![
        Suggestion::new("SELECT * FROM", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("SELECT * FROM \"\";")
            .with_detail("query a bundle"),
        Suggestion::new("INSERT INTO", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("INSERT INTO \"\" VALUES ();")
            .with_detail("insert a document"),
        Suggestion::new("CREATE DATABASE", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("CREATE DATABASE ;")
            .with_detail("create a database"),
        Suggestion::new("CREATE BUNDLE", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("CREATE BUNDLE \"\" ();")
            .with_detail("create a bundle"),
        Suggestion::new("USE", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("USE ;")
            .with_detail("select the active database"),
    ]
}

fn graphql_snippets() -> Vec<Suggestion> {
    vec![
        Suggestion::new("query { }", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("query {\n  \n}")
            .with_detail("query operation"),
        Suggestion::new("mutation { }", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("mutation {\n  \n}")
            .with_detail("mutation operation"),
        Suggestion::new("fragment on", SuggestionKind::Snippet, PRIORITY_SNIPPET)
            .with_insert_text("fragment  on  {\n  \n}")
            .with_detail("fragment definition"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_context::{Bundle, Database, Field, FieldConstraints, FieldType};
    use pretty_assertions::assert_eq;

    fn engine() -> SuggestionEngine {
        SuggestionEngine::new(100, Duration::from_secs(60))
    }

    fn test_context() -> SchemaContext {
        let mut context = SchemaContext::new();
        let mut users = Bundle {
            name: "users".to_string(),
            database: "testdb".to_string(),
            fields: Default::default(),
            relationships: Default::default(),
            indexes: vec![],
        };
        for name in ["email", "name", "created_at"] {
            users.fields.insert(
                name.to_string(),
                Field {
                    name: name.to_string(),
                    field_type: FieldType::Text,
                    constraints: FieldConstraints::default(),
                },
            );
        }
        let mut database = Database {
            name: "testdb".to_string(),
            bundles: Default::default(),
        };
        database.bundles.insert("users".to_string(), users);
        context.update_database(database);
        context.set_current_database(Some("testdb".to_string()));
        context
    }

    async fn docql(text: &str) -> Vec<Suggestion> {
        let context = test_context();
        engine()
            .docql_suggestions(GrammarEngine::global(), &context, None, text, text.len())
            .await
    }

    #[tokio::test]
    async fn literal_position_suppresses_everything() {
        let suggestions = docql("SELECT * FROM \"users\" WHERE \"email\" == ").await;
        assert_eq!(suggestions, vec![]);
    }

    #[tokio::test]
    async fn bundles_rank_above_keywords() {
        let suggestions = docql("SELECT * FROM ").await;
        let bundle = suggestions
            .iter()
            .find(|s| s.kind == SuggestionKind::Bundle)
            .expect("expected a bundle suggestion");
        assert_eq!(bundle.label, "users");
        for keyword in suggestions.iter().filter(|s| s.kind == SuggestionKind::Keyword) {
            assert!(bundle.priority > keyword.priority);
        }
    }

    #[tokio::test]
    async fn statement_start_includes_snippets() {
        let suggestions = docql("").await;
        assert!(suggestions.iter().any(|s| s.kind == SuggestionKind::Snippet));
        assert!(suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::Keyword && s.label == "SELECT"));
    }

    #[tokio::test]
    async fn partial_word_filters_candidates() {
        let context = test_context();
        let text = "SELECT * FROM us";
        let suggestions = engine()
            .docql_suggestions(GrammarEngine::global(), &context, None, text, text.len())
            .await;
        assert!(suggestions.iter().any(|s| s.label == "users"));
        // Every surviving label passes the fuzzy filter.
        for suggestion in &suggestions {
            assert!(fuzzy_score(&suggestion.label, "us").is_some());
        }
    }

    #[tokio::test]
    async fn fields_resolve_against_the_from_bundle() {
        let suggestions = docql("SELECT * FROM \"users\" WHERE ").await;
        let labels: Vec<&str> = suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::Field)
            .map(|s| s.label.as_str())
            .collect();
        assert!(labels.contains(&"email"), "got {labels:?}");
        assert!(labels.contains(&"created_at"));
    }

    #[tokio::test]
    async fn usage_boost_reorders_equal_priorities() {
        let engine = engine();
        let context = test_context();
        engine.record_usage("INSERT INTO");
        engine.record_usage("INSERT INTO");
        let suggestions = engine
            .docql_suggestions(GrammarEngine::global(), &context, None, "", 0)
            .await;
        let insert_index = suggestions
            .iter()
            .position(|s| s.label == "INSERT INTO")
            .unwrap();
        let other_snippet_index = suggestions
            .iter()
            .position(|s| s.label == "CREATE DATABASE")
            .unwrap();
        assert!(insert_index < other_snippet_index);
    }

    #[tokio::test]
    async fn results_are_memoized() {
        let engine = engine();
        let context = test_context();
        let first = engine
            .docql_suggestions(GrammarEngine::global(), &context, None, "SELECT ", 7)
            .await;
        let second = engine
            .docql_suggestions(GrammarEngine::global(), &context, None, "SELECT ", 7)
            .await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sort_text_orders_lexicographically() {
        let suggestions = docql("SELECT * FROM ").await;
        let mut sorted = suggestions.clone();
        sorted.sort_by(|a, b| a.sort_text.cmp(&b.sort_text));
        assert_eq!(suggestions, sorted);
    }

    #[test]
    fn graphql_top_level_keywords() {
        let engine = engine();
        let context = SchemaContext::new();
        let suggestions = engine.graphql_suggestions(&context, "", 0);
        assert!(suggestions.iter().any(|s| s.label == "query"));
        assert!(suggestions.iter().any(|s| s.kind == SuggestionKind::Snippet));
    }

    #[test]
    fn graphql_root_fields_at_depth_one() {
        let engine = engine();
        let mut context = SchemaContext::new();
        context.set_root_fields(
            RootOperation::Query,
            vec!["users".to_string(), "orders".to_string()],
        );
        let text = "query { ";
        let suggestions = engine.graphql_suggestions(&context, text, text.len());
        let labels: Vec<&str> = suggestions.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["orders", "users"]);
    }

    #[test]
    fn graphql_directives_after_at() {
        let engine = engine();
        let context = SchemaContext::new();
        let text = "query Q @";
        let suggestions = engine.graphql_suggestions(&context, text, text.len());
        assert!(suggestions.iter().any(|s| s.label == "include"));
    }

    #[test]
    fn partial_word_extraction() {
        assert_eq!(partial_word("SELECT fro", 10), "fro");
        assert_eq!(partial_word("SELECT ", 7), "");
        assert_eq!(partial_word("a_b2", 4), "a_b2");
        assert_eq!(partial_word("x.y", 3), "y");
    }
}
