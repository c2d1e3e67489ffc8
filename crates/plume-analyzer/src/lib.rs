//! Validation and completion layer of the Plume language service.
//!
//! The DocQL validator composes the grammar engine's syntactic pass with
//! cross-statement reference checks against the schema context; the GraphQL
//! validator performs structural checks over significant tokens plus a
//! schema-aware root field check. The suggestion engine turns the grammar's
//! expected-next sets into ranked, fuzzy-filtered completion lists, with
//! contextual entities resolved through the schema context and the context
//! expander.

pub mod docql;
pub mod graphql;
mod suggest;

pub use suggest::{fuzzy_score, Suggestion, SuggestionEngine, SuggestionKind, UsageTracker};
