//! The service layer of the Plume language service: the stateful,
//! per-document facade that wires the lexers, grammar engine, statement
//! cache, schema context and suggestion engine together behind the
//! pluggable [`LanguageService`] contract.
//!
//! Data flow for a keystroke: the editor calls
//! [`LanguageService::update_document`] → the lexer produces tokens → the
//! statement splitter diffs by content hash against the per-document cache
//! → changed statements are marked dirty → the debounce timer fires → the
//! grammar engine and cross-statement validator produce diagnostics → the
//! outcomes are written back to the cache for the renderer and host to
//! read.
//!
//! ## Example
//! ```rust
//! use plume_service::{DocqlLanguageService, LanguageService, ServiceConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let service = DocqlLanguageService::new("scratch.docql", ServiceConfig::default());
//! service.initialize().await.unwrap();
//!
//! let result = service.validate("SELECT * FROM \"orders\" LIMIT 10;", None).await;
//! assert!(result.valid);
//!
//! service.dispose();
//! # }
//! ```

mod cache;
mod config;
mod facade;
mod persist;

pub use cache::{CacheEntry, CacheMetrics, StatementCache};
pub use config::ServiceConfig;
pub use facade::{
    DocqlLanguageService, GraphqlLanguageService, LanguageService, ParsedStatement, ServiceError,
};
pub use persist::{document_filename, CacheStorage, FsCacheStorage, CACHE_FORMAT_VERSION};

pub use plume_analyzer::{Suggestion, SuggestionKind};
pub use plume_context::{
    DatabaseDefinition, PrefetchStrategy, SchemaServer, ServerError, SharedContext,
};
pub use plume_syntax::{Diagnostic, DiagnosticCode, Severity, ValidationResult};
