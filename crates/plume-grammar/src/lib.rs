//! The grammar engine of the Plume language service.
//!
//! One JSON-driven recursive matcher is the single source of truth for both
//! syntactic validation and completion-time "what comes next" queries: the
//! same walk that reports `UNEXPECTED_TOKEN` during validation collects the
//! expected-next set when it is re-run against the tokens before the cursor.
//!
//! Grammars are partitioned by statement family (DDL, DML, DOL, Migration)
//! and embedded in the crate; [`GrammarEngine::global`] exposes a
//! process-wide engine whose grammar map can be swapped atomically at
//! runtime, letting in-flight matches finish against the old grammars.
//!
//! ## Example
//! ```rust
//! use plume_grammar::GrammarEngine;
//! use plume_syntax::docql;
//!
//! let engine = GrammarEngine::global();
//! let tokens = docql::lex("SELECT * FROM \"orders\" LIMIT 10;");
//!
//! let result = engine.validate(&tokens);
//! assert!(result.valid);
//! ```

mod engine;
mod loader;
mod suggest;
mod symbol;

pub use loader::{Grammar, GrammarLoadError, GrammarSet, StatementFamily};
pub use suggest::{suggest_at, Expectations, Expected};
pub use symbol::{
    is_contextual, Matcher, Production, Symbol, CONTEXT_BUNDLE, CONTEXT_DATABASE, CONTEXT_FIELD,
    CONTEXT_INDEX, CONTEXT_LITERAL, CONTEXT_MIGRATION, CONTEXT_USER,
};

use arc_swap::ArcSwap;
use plume_syntax::docql::TokenKind;
use plume_syntax::{Token, ValidationResult};
use std::sync::{Arc, OnceLock};

pub use engine::{validate_statement, validate_tokens};

/// The process-wide grammar engine: a lazily initialized grammar map with
/// atomic reload.
pub struct GrammarEngine {
    grammars: ArcSwap<GrammarSet>,
}

static GLOBAL: OnceLock<GrammarEngine> = OnceLock::new();

impl GrammarEngine {
    pub fn new(set: GrammarSet) -> GrammarEngine {
        GrammarEngine {
            grammars: ArcSwap::from_pointee(set),
        }
    }

    /// The shared engine over the embedded grammars. Initialization is
    /// idempotent; the embedded grammars are validated by this crate's test
    /// suite, so a parse failure here is a build defect.
    pub fn global() -> &'static GrammarEngine {
        GLOBAL.get_or_init(|| {
            let set = GrammarSet::embedded().expect("embedded grammars are valid");
            GrammarEngine::new(set)
        })
    }

    /// Atomically replaces the grammar map. Matches already running keep
    /// the snapshot they started with.
    pub fn reload(&self, set: GrammarSet) {
        self.grammars.store(Arc::new(set));
    }

    /// A consistent snapshot for the duration of one request.
    pub fn snapshot(&self) -> Arc<GrammarSet> {
        self.grammars.load_full()
    }

    /// Grammar-validates one statement's tokens.
    pub fn validate(&self, tokens: &[Token<TokenKind>]) -> ValidationResult {
        engine::validate_statement(&self.snapshot(), tokens)
    }

    /// Expected-next set for the complete tokens before the cursor.
    pub fn suggest_at(&self, tokens: &[Token<TokenKind>]) -> Expectations {
        suggest::suggest_at(&self.snapshot(), tokens)
    }
}
