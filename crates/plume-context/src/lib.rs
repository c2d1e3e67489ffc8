//! Schema context layer of the Plume language service.
//!
//! The [`SchemaContext`] is the server-authoritative model of databases,
//! bundles, fields, relationships, permissions and migrations, with a
//! freshness state machine (`stale → refreshing → fresh → stale`) and a
//! serializable snapshot for warm starts. The [`ContextExpander`] sits
//! between the suggestion engine and the [`SchemaServer`] interface,
//! lazily loading bundle metadata through a TTL'd LRU and prefetching
//! related entries in bounded background batches.
//!
//! Server failures are always recoverable here: they are logged, the state
//! machine records them, and callers receive `None`/empty rather than
//! errors — a broken connection must never take completions down with it.

mod context;
mod expander;
mod schema;
mod server;

pub use context::{ContextState, DependencyCheck, RootOperation, SchemaContext};
pub use expander::{ContextExpander, ExpanderConfig, ExpanderStats, PrefetchStrategy};
pub use schema::{
    Bundle, BundleDefinition, Cardinality, Database, DatabaseDefinition, Field, FieldConstraints,
    FieldType, Grant, Migration, Permission, Relationship, ResourceKind,
};
pub use server::{SchemaServer, ServerError};

use parking_lot::RwLock;
use std::sync::Arc;

/// The shared handle through which the facade, validators and expander see
/// one consistent schema context.
pub type SharedContext = Arc<RwLock<SchemaContext>>;

/// Convenience constructor for the shared handle.
pub fn shared_context() -> SharedContext {
    Arc::new(RwLock::new(SchemaContext::new()))
}
