use crate::schema::{
    BundleDefinition, DatabaseDefinition, Field, Migration, Permission, Relationship,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a schema server implementation.
///
/// Every variant is recoverable from the language service's point of view:
/// callers log and fall back to empty results, and the schema context's
/// state machine transitions to `Error`.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("schema server transport failure: {0}")]
    Transport(String),
    #[error("schema server call timed out")]
    Timeout,
    #[error("{kind} `{name}` does not exist on the server")]
    NotFound { kind: &'static str, name: String },
}

/// The schema-server interface consumed by the context and the expander.
///
/// Implementations wrap whatever transport the host provides; the language
/// service core only ever talks to this trait. Calls should honor
/// cancellation by returning promptly once their transport is torn down.
#[async_trait]
pub trait SchemaServer: Send + Sync {
    async fn get_databases(&self) -> Result<Vec<DatabaseDefinition>, ServerError>;

    async fn get_bundles(&self, database: &str) -> Result<Vec<BundleDefinition>, ServerError>;

    async fn get_bundle(
        &self,
        database: &str,
        bundle: &str,
    ) -> Result<BundleDefinition, ServerError>;

    async fn get_fields(&self, database: &str, bundle: &str) -> Result<Vec<Field>, ServerError>;

    async fn get_relationships(
        &self,
        database: &str,
        bundle: &str,
    ) -> Result<Vec<Relationship>, ServerError>;

    async fn get_permissions(&self) -> Result<Vec<Permission>, ServerError>;

    async fn get_migrations(&self) -> Result<Vec<Migration>, ServerError>;
}
