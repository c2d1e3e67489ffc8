use crate::cache::StatementCache;
use crate::config::ServiceConfig;
use crate::persist::{load_document, save_document, CacheStorage};
use async_trait::async_trait;
use parking_lot::Mutex;
use plume_analyzer::{fuzzy_score, Suggestion, SuggestionEngine};
use plume_context::{
    ContextExpander, DatabaseDefinition, SchemaServer, SharedContext,
};
use plume_grammar::GrammarEngine;
use plume_syntax::{docql, graphql, RenderLine, Statement, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Statement metadata returned by `parse_statements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub text: String,
    pub hash: String,
    pub line_start: u32,
    pub line_end: u32,
    pub offset_start: usize,
    pub offset_end: usize,
}

impl<K> From<&Statement<K>> for ParsedStatement {
    fn from(statement: &Statement<K>) -> ParsedStatement {
        ParsedStatement {
            text: statement.text.clone(),
            hash: statement.hash.clone(),
            line_start: statement.line_start,
            line_end: statement.line_end,
            offset_start: statement.offset_start,
            offset_end: statement.offset_end,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("the language service has been disposed")]
    Disposed,
}

/// The pluggable language service contract the editor shell consumes.
///
/// One instance owns one document. Concurrent `validate`/`get_suggestions`
/// calls against the same instance are serialized by the document's own
/// lock; separate instances are fully independent.
#[async_trait]
pub trait LanguageService: Send + Sync {
    async fn initialize(&self) -> Result<(), ServiceError>;
    fn dispose(&self);
    /// Re-tokenizes the document and schedules debounced validation.
    fn update_document(&self, text: &str);
    fn parse_statements(&self, text: &str, source: Option<&str>) -> Vec<ParsedStatement>;
    async fn validate(&self, text: &str, uri: Option<&str>) -> ValidationResult;
    async fn get_suggestions(
        &self,
        text: &str,
        cursor: usize,
        filter: Option<&str>,
    ) -> Vec<Suggestion>;
    fn record_suggestion_usage(&self, label: &str);
    fn set_database_context(&self, name: Option<String>);
    fn update_context_data(&self, databases: Vec<DatabaseDefinition>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    Active,
    Disposed,
}

struct DocumentSnapshot<K> {
    text: String,
    tokens: Vec<plume_syntax::Token<K>>,
    statements: Vec<Statement<K>>,
}

struct ServiceCore<K> {
    document_id: String,
    config: ServiceConfig,
    lifecycle: Mutex<Lifecycle>,
    document: Mutex<DocumentSnapshot<K>>,
    cache: Mutex<StatementCache<K>>,
    context: SharedContext,
    server: Option<Arc<dyn SchemaServer>>,
    expander: Option<Arc<ContextExpander>>,
    storage: Option<Arc<dyn CacheStorage>>,
    suggestions: SuggestionEngine,
    /// Bumped on every text change; a debounce task only runs its
    /// validation pass if its captured generation is still current.
    debounce_generation: AtomicU64,
    request_lock: tokio::sync::Mutex<()>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: Clone> ServiceCore<K> {
    fn new(document_id: String, config: ServiceConfig, context: SharedContext) -> ServiceCore<K> {
        ServiceCore {
            document_id,
            cache: Mutex::new(StatementCache::new(
                config.statement_cache_buffer_size,
                config.access_weight_factor,
            )),
            suggestions: SuggestionEngine::new(
                config.suggestion_memo_capacity,
                config.suggestion_memo_ttl,
            ),
            config,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            document: Mutex::new(DocumentSnapshot {
                text: String::new(),
                tokens: Vec::new(),
                statements: Vec::new(),
            }),
            context,
            server: None,
            expander: None,
            storage: None,
            debounce_generation: AtomicU64::new(0),
            request_lock: tokio::sync::Mutex::new(()),
            background: Mutex::new(Vec::new()),
        }
    }

    fn is_disposed(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Disposed
    }

    /// Applies a fresh parse to the cache: changed statements go in dirty,
    /// vanished statements are marked dirty, unchanged ones keep their
    /// validation state.
    fn reconcile_cache(&self, statements: &[Statement<K>], previous_hashes: &[String]) {
        let mut cache = self.cache.lock();
        for statement in statements {
            if cache.peek(&self.document_id, &statement.hash).is_none() {
                cache.put(&self.document_id, statement.clone());
            }
        }
        let current: Vec<&str> = statements.iter().map(|s| s.hash.as_str()).collect();
        for previous in previous_hashes {
            if !current.contains(&previous.as_str()) {
                cache.mark_dirty(&self.document_id, previous);
            }
        }
    }

    fn shutdown_background(&self) {
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        if let Some(expander) = &self.expander {
            expander.shutdown();
        }
    }

    /// Refreshes the schema context off a cloned working copy so the shared
    /// lock is never held across server I/O.
    async fn refresh_context(&self) {
        let Some(server) = &self.server else {
            return;
        };
        let mut working = self.context.read().clone();
        match tokio::time::timeout(
            self.config.server_timeout,
            working.refresh_from_server(server.as_ref()),
        )
        .await
        {
            // Committed on failure too: the error state is what lets
            // validation surface CONTEXT_STALE.
            Ok(_) => *self.context.write() = working,
            Err(_) => warn!(document_id = %self.document_id, "schema refresh timed out"),
        }
    }
}

/// Builds the DocQL flavor of the service facade.
pub struct DocqlLanguageService {
    core: Arc<ServiceCore<docql::TokenKind>>,
}

/// Builds the GraphQL flavor of the service facade.
pub struct GraphqlLanguageService {
    core: Arc<ServiceCore<graphql::TokenKind>>,
}

macro_rules! builder_methods {
    () => {
        /// Attaches a schema server; enables context refresh and the
        /// prefetching expander.
        pub fn with_server(mut self, server: Arc<dyn SchemaServer>) -> Self {
            let core = Arc::get_mut(&mut self.core)
                .expect("with_server must be called before the service is shared");
            core.expander = Some(Arc::new(ContextExpander::new(
                Arc::clone(&core.context),
                Arc::clone(&server),
                core.config.expander_config(),
            )));
            core.server = Some(server);
            self
        }

        /// Attaches cache persistence storage.
        pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
            let core = Arc::get_mut(&mut self.core)
                .expect("with_storage must be called before the service is shared");
            core.storage = Some(storage);
            self
        }

        /// The shared schema context handle, for wiring into host UI.
        pub fn context(&self) -> SharedContext {
            Arc::clone(&self.core.context)
        }

        /// Current cache metrics for the status surface.
        pub fn cache_metrics(&self) -> crate::cache::CacheMetrics {
            self.core.cache.lock().metrics()
        }

        /// The text of the last `update_document` call.
        pub fn document_text(&self) -> String {
            self.core.document.lock().text.clone()
        }

        /// Statements awaiting validation.
        pub fn dirty_statement_count(&self) -> usize {
            self.core
                .cache
                .lock()
                .dirty_statements(&self.core.document_id)
                .len()
        }
    };
}

impl DocqlLanguageService {
    pub fn new(document_id: impl Into<String>, config: ServiceConfig) -> DocqlLanguageService {
        let context = plume_context::shared_context();
        DocqlLanguageService {
            core: Arc::new(ServiceCore::new(document_id.into(), config, context)),
        }
    }

    builder_methods!();

    /// Per-line rendering descriptors for the current document, with error
    /// markers from the latest validation results.
    pub fn rendered_lines(&self) -> Vec<RenderLine> {
        let document = self.core.document.lock();
        let cache = self.core.cache.lock();
        let error_spans: Vec<(usize, usize)> = document
            .statements
            .iter()
            .filter_map(|statement| cache.peek(&self.core.document_id, &statement.hash))
            .flat_map(|entry| entry.errors.iter())
            .map(|diagnostic| (diagnostic.start_offset, diagnostic.end_offset))
            .collect();
        plume_syntax::render_lines(&document.tokens, &error_spans)
    }

    /// Validates every dirty statement of the current document and writes
    /// the outcomes back to the cache. Bypasses the debounce timer.
    pub async fn force_validation(&self) -> ValidationResult {
        run_docql_validation(&self.core).await
    }
}

impl GraphqlLanguageService {
    pub fn new(document_id: impl Into<String>, config: ServiceConfig) -> GraphqlLanguageService {
        let context = plume_context::shared_context();
        GraphqlLanguageService {
            core: Arc::new(ServiceCore::new(document_id.into(), config, context)),
        }
    }

    builder_methods!();

    pub fn rendered_lines(&self) -> Vec<RenderLine> {
        let document = self.core.document.lock();
        let cache = self.core.cache.lock();
        let error_spans: Vec<(usize, usize)> = document
            .statements
            .iter()
            .filter_map(|statement| cache.peek(&self.core.document_id, &statement.hash))
            .flat_map(|entry| entry.errors.iter())
            .map(|diagnostic| (diagnostic.start_offset, diagnostic.end_offset))
            .collect();
        plume_syntax::render_lines(&document.tokens, &error_spans)
    }

    pub async fn force_validation(&self) -> ValidationResult {
        run_graphql_validation(&self.core).await
    }
}

/// One debounced validation pass for a DocQL document.
///
/// The whole dirty set is drained — including entries whose statement no
/// longer appears in the document, which would otherwise stay dirty
/// forever — but only current statements contribute to the returned
/// result. Everything is validated against one consistent context
/// snapshot.
async fn run_docql_validation(core: &Arc<ServiceCore<docql::TokenKind>>) -> ValidationResult {
    let _guard = core.request_lock.lock().await;

    let current: Vec<Statement<docql::TokenKind>> = {
        let document = core.document.lock();
        document.statements.clone()
    };
    let current_hashes: HashSet<&str> = current.iter().map(|s| s.hash.as_str()).collect();
    let dirty = core.cache.lock().dirty_statements(&core.document_id);

    let context = core.context.read().clone();
    let grammars = GrammarEngine::global().snapshot();

    let mut merged = ValidationResult::new();
    let mut reported: HashSet<String> = HashSet::new();
    for statement in &dirty {
        let result = plume_analyzer::docql::validate_statement(
            &grammars,
            statement,
            &context,
            core.config.schema_staleness_threshold,
        );
        core.cache.lock().mark_clean(
            &core.document_id,
            &statement.hash,
            result.valid,
            result.errors.clone(),
        );
        if current_hashes.contains(statement.hash.as_str()) && reported.insert(statement.hash.clone())
        {
            merged.merge(result);
        }
    }
    for statement in &current {
        // Unchanged statements: serve the stored outcome.
        if reported.insert(statement.hash.clone()) {
            let cached = core
                .cache
                .lock()
                .get(&core.document_id, &statement.hash)
                .map(|entry| entry.errors.clone());
            if let Some(errors) = cached {
                merged.extend(errors);
            }
        }
    }
    debug!(document_id = %core.document_id, valid = merged.valid, "validation pass finished");
    merged
}

async fn run_graphql_validation(core: &Arc<ServiceCore<graphql::TokenKind>>) -> ValidationResult {
    let _guard = core.request_lock.lock().await;

    let current: Vec<Statement<graphql::TokenKind>> = {
        let document = core.document.lock();
        document.statements.clone()
    };
    let current_hashes: HashSet<&str> = current.iter().map(|s| s.hash.as_str()).collect();
    let dirty = core.cache.lock().dirty_statements(&core.document_id);

    let context = core.context.read().clone();

    let mut merged = ValidationResult::new();
    let mut reported: HashSet<String> = HashSet::new();
    for statement in &dirty {
        let result = plume_analyzer::graphql::validate_statement(statement, Some(&context));
        core.cache.lock().mark_clean(
            &core.document_id,
            &statement.hash,
            result.valid,
            result.errors.clone(),
        );
        if current_hashes.contains(statement.hash.as_str()) && reported.insert(statement.hash.clone())
        {
            merged.merge(result);
        }
    }
    for statement in &current {
        if reported.insert(statement.hash.clone()) {
            let cached = core
                .cache
                .lock()
                .get(&core.document_id, &statement.hash)
                .map(|entry| entry.errors.clone());
            if let Some(errors) = cached {
                merged.extend(errors);
            }
        }
    }
    merged
}

/// Arms the debounce timer; the task self-cancels if a newer edit arrives
/// before it fires.
fn arm_debounce<K, F, Fut>(core: &Arc<ServiceCore<K>>, run: F)
where
    K: Clone + Send + Sync + 'static,
    F: FnOnce(Arc<ServiceCore<K>>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let generation = core.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
    let core = Arc::clone(core);
    tokio::spawn(async move {
        tokio::time::sleep(core.config.validation_debounce_delay).await;
        if core.debounce_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if core.is_disposed() {
            return;
        }
        run(core).await;
    });
}

/// Warms the expander's field cache for the bundle the user is querying, so
/// the next completion request resolves without a server round trip.
fn prefetch_from_bundle(core: &Arc<ServiceCore<docql::TokenKind>>, text: &str) {
    if !core.config.suggestion_prefetch {
        return;
    }
    let Some(expander) = core.expander.clone() else {
        return;
    };
    let Some(database) = core.context.read().current_database().map(str::to_string) else {
        return;
    };
    let bundle = {
        let tokens: Vec<_> = docql::lex(text)
            .into_iter()
            .filter(|t| t.kind().is_significant())
            .collect();
        let mut bundle = None;
        for window in tokens.windows(2) {
            let is_source_keyword = matches!(
                window[0].kind(),
                docql::TokenKind::Keyword(
                    docql::Keyword::From | docql::Keyword::Into | docql::Keyword::Update
                )
            );
            let named = matches!(
                window[1].kind(),
                docql::TokenKind::Identifier | docql::TokenKind::String
            );
            if is_source_keyword && named {
                bundle = Some(match window[1].literal() {
                    Some(plume_syntax::Literal::Str(value)) => value.clone(),
                    _ => window[1].text().to_string(),
                });
            }
        }
        bundle
    };
    let Some(bundle) = bundle else {
        return;
    };
    let delay = core.config.suggestion_prefetch_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        expander.expand_fields(&database, &bundle).await;
    });
}

fn start_persistence_timer<K>(core: &Arc<ServiceCore<K>>)
where
    K: Clone + Serialize + Send + Sync + 'static,
{
    let Some(storage) = core.storage.clone() else {
        return;
    };
    let timer_core = Arc::clone(core);
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(timer_core.config.cache_persistence_interval).await;
            if timer_core.is_disposed() {
                return;
            }
            save_document(storage.as_ref(), &timer_core.cache, &timer_core.document_id).await;
        }
    });
    core.background.lock().push(handle);
}

#[async_trait]
impl LanguageService for DocqlLanguageService {
    async fn initialize(&self) -> Result<(), ServiceError> {
        if self.core.is_disposed() {
            return Err(ServiceError::Disposed);
        }
        if let Some(storage) = &self.core.storage {
            load_document(storage.as_ref(), &self.core.cache, &self.core.document_id).await;
        }
        self.core.refresh_context().await;
        start_persistence_timer(&self.core);
        *self.core.lifecycle.lock() = Lifecycle::Initialized;
        Ok(())
    }

    fn dispose(&self) {
        *self.core.lifecycle.lock() = Lifecycle::Disposed;
        // Invalidate any pending debounce task.
        self.core.debounce_generation.fetch_add(1, Ordering::SeqCst);
        self.core.shutdown_background();
        if let Some(storage) = self.core.storage.clone() {
            let core = Arc::clone(&self.core);
            tokio::spawn(async move {
                save_document(storage.as_ref(), &core.cache, &core.document_id).await;
            });
        }
    }

    fn update_document(&self, text: &str) {
        if self.core.is_disposed() {
            return;
        }
        let tokens = docql::lex(text);
        let statements = plume_syntax::split_docql(text, &tokens);

        let previous_hashes: Vec<String> = {
            let mut document = self.core.document.lock();
            let previous = document
                .statements
                .iter()
                .map(|s| s.hash.clone())
                .collect();
            document.text = text.to_string();
            document.tokens = tokens;
            document.statements = statements.clone();
            previous
        };
        self.core.reconcile_cache(&statements, &previous_hashes);
        *self.core.lifecycle.lock() = Lifecycle::Active;

        arm_debounce(&self.core, |core| async move {
            run_docql_validation(&core).await;
        });
    }

    fn parse_statements(&self, text: &str, _source: Option<&str>) -> Vec<ParsedStatement> {
        let tokens = docql::lex(text);
        plume_syntax::split_docql(text, &tokens)
            .iter()
            .map(ParsedStatement::from)
            .collect()
    }

    async fn validate(&self, text: &str, _uri: Option<&str>) -> ValidationResult {
        if self.core.is_disposed() {
            return ValidationResult::new();
        }
        self.update_document(text);
        run_docql_validation(&self.core).await
    }

    async fn get_suggestions(
        &self,
        text: &str,
        cursor: usize,
        filter: Option<&str>,
    ) -> Vec<Suggestion> {
        if self.core.is_disposed() {
            return Vec::new();
        }
        let _guard = self.core.request_lock.lock().await;
        let context = self.core.context.read().clone();
        let mut suggestions = self
            .core
            .suggestions
            .docql_suggestions(
                GrammarEngine::global(),
                &context,
                self.core.expander.as_ref(),
                text,
                cursor,
            )
            .await;
        if let Some(filter) = filter {
            suggestions.retain(|s| fuzzy_score(&s.label, filter).is_some());
        }
        prefetch_from_bundle(&self.core, text);
        suggestions
    }

    fn record_suggestion_usage(&self, label: &str) {
        self.core.suggestions.record_usage(label);
    }

    fn set_database_context(&self, name: Option<String>) {
        self.core.context.write().set_current_database(name);
    }

    fn update_context_data(&self, databases: Vec<DatabaseDefinition>) {
        self.core
            .context
            .write()
            .replace_databases(databases.into_iter().map(DatabaseDefinition::into_database));
    }
}

#[async_trait]
impl LanguageService for GraphqlLanguageService {
    async fn initialize(&self) -> Result<(), ServiceError> {
        if self.core.is_disposed() {
            return Err(ServiceError::Disposed);
        }
        if let Some(storage) = &self.core.storage {
            load_document(storage.as_ref(), &self.core.cache, &self.core.document_id).await;
        }
        self.core.refresh_context().await;
        start_persistence_timer(&self.core);
        *self.core.lifecycle.lock() = Lifecycle::Initialized;
        Ok(())
    }

    fn dispose(&self) {
        *self.core.lifecycle.lock() = Lifecycle::Disposed;
        self.core.debounce_generation.fetch_add(1, Ordering::SeqCst);
        self.core.shutdown_background();
        if let Some(storage) = self.core.storage.clone() {
            let core = Arc::clone(&self.core);
            tokio::spawn(async move {
                save_document(storage.as_ref(), &core.cache, &core.document_id).await;
            });
        }
    }

    fn update_document(&self, text: &str) {
        if self.core.is_disposed() {
            return;
        }
        let tokens = graphql::lex(text);
        let statements = plume_syntax::split_graphql(text, &tokens);

        let previous_hashes: Vec<String> = {
            let mut document = self.core.document.lock();
            let previous = document
                .statements
                .iter()
                .map(|s| s.hash.clone())
                .collect();
            document.text = text.to_string();
            document.tokens = tokens;
            document.statements = statements.clone();
            previous
        };
        self.core.reconcile_cache(&statements, &previous_hashes);
        *self.core.lifecycle.lock() = Lifecycle::Active;

        arm_debounce(&self.core, |core| async move {
            run_graphql_validation(&core).await;
        });
    }

    fn parse_statements(&self, text: &str, _source: Option<&str>) -> Vec<ParsedStatement> {
        let tokens = graphql::lex(text);
        plume_syntax::split_graphql(text, &tokens)
            .iter()
            .map(ParsedStatement::from)
            .collect()
    }

    async fn validate(&self, text: &str, _uri: Option<&str>) -> ValidationResult {
        if self.core.is_disposed() {
            return ValidationResult::new();
        }
        self.update_document(text);
        run_graphql_validation(&self.core).await
    }

    async fn get_suggestions(
        &self,
        text: &str,
        cursor: usize,
        filter: Option<&str>,
    ) -> Vec<Suggestion> {
        if self.core.is_disposed() {
            return Vec::new();
        }
        let _guard = self.core.request_lock.lock().await;
        let context = self.core.context.read().clone();
        let mut suggestions = self
            .core
            .suggestions
            .graphql_suggestions(&context, text, cursor);
        if let Some(filter) = filter {
            suggestions.retain(|s| fuzzy_score(&s.label, filter).is_some());
        }
        suggestions
    }

    fn record_suggestion_usage(&self, label: &str) {
        self.core.suggestions.record_usage(label);
    }

    fn set_database_context(&self, name: Option<String>) {
        self.core.context.write().set_current_database(name);
    }

    fn update_context_data(&self, databases: Vec<DatabaseDefinition>) {
        self.core
            .context
            .write()
            .replace_databases(databases.into_iter().map(DatabaseDefinition::into_database));
    }
}
