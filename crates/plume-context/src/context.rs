use crate::schema::{Bundle, Database, Field, Migration, Permission, Relationship};
use crate::server::{SchemaServer, ServerError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Freshness state machine: `Stale → Refreshing → Fresh → Stale → …`, with
/// `Error` entered when a refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Fresh,
    Stale,
    Refreshing,
    Error,
}

/// Root operation kinds whose top-level fields the schema context knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOperation {
    Query,
    Mutation,
    Subscription,
}

/// Outcome of a migration dependency check.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyCheck {
    pub valid: bool,
    pub missing: Vec<String>,
}

/// The server-authoritative schema model used for cross-statement
/// validation and contextual suggestions.
///
/// The context is editable locally (`update_database`, `update_bundle`),
/// but local edits force the state back to [`ContextState::Stale`] so the
/// next refresh reconciles with the server.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    databases: IndexMap<String, Database>,
    permissions: Vec<Permission>,
    migrations: IndexMap<String, Migration>,
    current_database: Option<String>,
    query_roots: Vec<String>,
    mutation_roots: Vec<String>,
    subscription_roots: Vec<String>,
    state: ContextState,
    last_refresh: Option<Instant>,
}

/// Serialized form of the context for the local snapshot cache.
#[derive(Debug, Serialize, Deserialize)]
struct SchemaSnapshot {
    databases: IndexMap<String, Database>,
    permissions: Vec<Permission>,
    migrations: IndexMap<String, Migration>,
    current_database: Option<String>,
    #[serde(default)]
    query_roots: Vec<String>,
    #[serde(default)]
    mutation_roots: Vec<String>,
    #[serde(default)]
    subscription_roots: Vec<String>,
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaContext {
    pub fn new() -> SchemaContext {
        SchemaContext {
            databases: IndexMap::new(),
            permissions: Vec::new(),
            migrations: IndexMap::new(),
            current_database: None,
            query_roots: Vec::new(),
            mutation_roots: Vec::new(),
            subscription_roots: Vec::new(),
            state: ContextState::Stale,
            last_refresh: None,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Stale when the state machine says so, or when the last successful
    /// refresh is older than `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        match self.state {
            ContextState::Stale | ContextState::Error => true,
            ContextState::Fresh | ContextState::Refreshing => self
                .last_refresh
                .map_or(true, |refreshed| refreshed.elapsed() > threshold),
        }
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn set_current_database(&mut self, name: Option<String>) {
        self.current_database = name;
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    pub fn get_database(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    pub fn all_databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    pub fn has_bundle(&self, database: &str, bundle: &str) -> bool {
        self.get_bundle(database, bundle).is_some()
    }

    pub fn get_bundle(&self, database: &str, bundle: &str) -> Option<&Bundle> {
        self.databases.get(database)?.bundles.get(bundle)
    }

    pub fn all_bundles(&self, database: &str) -> impl Iterator<Item = &Bundle> {
        self.databases
            .get(database)
            .into_iter()
            .flat_map(|db| db.bundles.values())
    }

    pub fn has_field(&self, database: &str, bundle: &str, field: &str) -> bool {
        self.get_field(database, bundle, field).is_some()
    }

    pub fn get_field(&self, database: &str, bundle: &str, field: &str) -> Option<&Field> {
        self.get_bundle(database, bundle)?.fields.get(field)
    }

    pub fn get_relationships(&self, database: &str, bundle: &str) -> Vec<&Relationship> {
        self.get_bundle(database, bundle)
            .map(|b| b.relationships.values().collect())
            .unwrap_or_default()
    }

    pub fn all_permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn permissions_for(&self, principal: &str) -> Vec<&Permission> {
        self.permissions
            .iter()
            .filter(|p| p.principal == principal)
            .collect()
    }

    pub fn has_migration(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    pub fn get_migration(&self, name: &str) -> Option<&Migration> {
        self.migrations.get(name)
    }

    pub fn all_migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn root_fields(&self, operation: RootOperation) -> &[String] {
        match operation {
            RootOperation::Query => &self.query_roots,
            RootOperation::Mutation => &self.mutation_roots,
            RootOperation::Subscription => &self.subscription_roots,
        }
    }

    pub fn set_root_fields(&mut self, operation: RootOperation, fields: Vec<String>) {
        match operation {
            RootOperation::Query => self.query_roots = fields,
            RootOperation::Mutation => self.mutation_roots = fields,
            RootOperation::Subscription => self.subscription_roots = fields,
        }
    }

    /// Local edit; forces the state back to stale so the next refresh
    /// reconciles with the server.
    pub fn update_database(&mut self, database: Database) {
        self.databases.insert(database.name.clone(), database);
        self.state = ContextState::Stale;
    }

    /// Local edit; forces the state back to stale.
    pub fn update_bundle(&mut self, database: &str, bundle: Bundle) {
        let entry = self
            .databases
            .entry(database.to_string())
            .or_insert_with(|| Database {
                name: database.to_string(),
                bundles: IndexMap::new(),
            });
        entry.bundles.insert(bundle.name.clone(), bundle);
        self.state = ContextState::Stale;
    }

    /// Local edit; forces the state back to stale.
    pub fn add_migration(&mut self, migration: Migration) {
        self.migrations.insert(migration.name.clone(), migration);
        self.state = ContextState::Stale;
    }

    /// Local edit; forces the state back to stale.
    pub fn add_permission(&mut self, permission: Permission) {
        self.permissions.push(permission);
        self.state = ContextState::Stale;
    }

    /// Write-back of server-loaded data (used by the context expander).
    /// Unlike a local edit this does not change the freshness state.
    pub fn absorb_bundle(&mut self, database: &str, bundle: Bundle) {
        let entry = self
            .databases
            .entry(database.to_string())
            .or_insert_with(|| Database {
                name: database.to_string(),
                bundles: IndexMap::new(),
            });
        entry.bundles.insert(bundle.name.clone(), bundle);
    }

    /// Bulk replacement of the database map from host-supplied definitions,
    /// used by `update_context_data`. Leaves the state stale.
    pub fn replace_databases(&mut self, databases: impl IntoIterator<Item = Database>) {
        self.databases = databases
            .into_iter()
            .map(|db| (db.name.clone(), db))
            .collect();
        self.state = ContextState::Stale;
    }

    /// DFS over migration dependencies; true iff a cycle is reachable from
    /// `name`. `visited` carries the on-stack set across recursion.
    pub fn has_circular_dependency(&self, name: &str, visited: &mut HashSet<String>) -> bool {
        if visited.contains(name) {
            return true;
        }
        visited.insert(name.to_string());
        if let Some(migration) = self.migrations.get(name) {
            for dependency in &migration.dependencies {
                if self.has_circular_dependency(dependency, visited) {
                    return true;
                }
            }
        }
        visited.remove(name);
        false
    }

    /// Checks that every dependency of `name` exists in the context.
    pub fn validate_migration_dependencies(&self, name: &str) -> DependencyCheck {
        let missing: Vec<String> = self
            .migrations
            .get(name)
            .map(|migration| {
                migration
                    .dependencies
                    .iter()
                    .filter(|dep| !self.migrations.contains_key(*dep))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        DependencyCheck {
            valid: missing.is_empty(),
            missing,
        }
    }

    /// Pulls the full schema from the server: databases, then bundles, then
    /// fields and relationships, then permissions, then migrations.
    ///
    /// On success the state becomes fresh; on any failure it becomes
    /// [`ContextState::Error`] and the error is returned for logging. The
    /// context is only modified on success.
    pub async fn refresh_from_server(&mut self, server: &dyn SchemaServer) -> Result<(), ServerError> {
        self.state = ContextState::Refreshing;
        match pull_all(server).await {
            Ok((databases, permissions, migrations)) => {
                self.databases = databases;
                self.permissions = permissions;
                self.migrations = migrations;
                self.state = ContextState::Fresh;
                self.last_refresh = Some(Instant::now());
                debug!(databases = self.databases.len(), "schema context refreshed");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "schema refresh failed");
                self.state = ContextState::Error;
                Err(error)
            }
        }
    }

    /// Restores the context from a local snapshot. The restored context is
    /// stale by definition: it reflects the server as of some earlier run.
    pub fn load_from_cache(&mut self, blob: &str) -> Result<(), serde_json::Error> {
        let snapshot: SchemaSnapshot = serde_json::from_str(blob)?;
        self.databases = snapshot.databases;
        self.permissions = snapshot.permissions;
        self.migrations = snapshot.migrations;
        self.current_database = snapshot.current_database;
        self.query_roots = snapshot.query_roots;
        self.mutation_roots = snapshot.mutation_roots;
        self.subscription_roots = snapshot.subscription_roots;
        self.state = ContextState::Stale;
        self.last_refresh = None;
        Ok(())
    }

    /// Serializes all schema maps for the local snapshot cache.
    pub fn to_cache(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SchemaSnapshot {
            databases: self.databases.clone(),
            permissions: self.permissions.clone(),
            migrations: self.migrations.clone(),
            current_database: self.current_database.clone(),
            query_roots: self.query_roots.clone(),
            mutation_roots: self.mutation_roots.clone(),
            subscription_roots: self.subscription_roots.clone(),
        })
    }
}

async fn pull_all(
    server: &dyn SchemaServer,
) -> Result<
    (
        IndexMap<String, Database>,
        Vec<Permission>,
        IndexMap<String, Migration>,
    ),
    ServerError,
> {
    let mut databases = IndexMap::new();
    for definition in server.get_databases().await? {
        let name = definition.name.clone();
        let mut database = Database {
            name: name.clone(),
            bundles: IndexMap::new(),
        };
        for bundle_def in server.get_bundles(&name).await? {
            let bundle_name = bundle_def.name.clone();
            let mut bundle = bundle_def.into_bundle(&name);
            if bundle.fields.is_empty() {
                for field in server.get_fields(&name, &bundle_name).await? {
                    bundle.fields.insert(field.name.clone(), field);
                }
            }
            if bundle.relationships.is_empty() {
                for relationship in server.get_relationships(&name, &bundle_name).await? {
                    bundle
                        .relationships
                        .insert(relationship.name.clone(), relationship);
                }
            }
            database.bundles.insert(bundle_name, bundle);
        }
        databases.insert(name, database);
    }
    let permissions = server.get_permissions().await?;
    let migrations = server
        .get_migrations()
        .await?
        .into_iter()
        .map(|migration| (migration.name.clone(), migration))
        .collect();
    Ok((databases, permissions, migrations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BundleDefinition, DatabaseDefinition, Field, FieldConstraints, FieldType};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct StaticServer {
        fail: bool,
    }

    #[async_trait]
    impl SchemaServer for StaticServer {
        async fn get_databases(&self) -> Result<Vec<DatabaseDefinition>, ServerError> {
            if self.fail {
                return Err(ServerError::Transport("connection refused".to_string()));
            }
            Ok(vec![DatabaseDefinition {
                name: "testdb".to_string(),
                bundles: vec![],
            }])
        }

        async fn get_bundles(&self, _database: &str) -> Result<Vec<BundleDefinition>, ServerError> {
            Ok(vec![BundleDefinition {
                name: "users".to_string(),
                ..BundleDefinition::default()
            }])
        }

        async fn get_bundle(
            &self,
            _database: &str,
            bundle: &str,
        ) -> Result<BundleDefinition, ServerError> {
            Ok(BundleDefinition {
                name: bundle.to_string(),
                ..BundleDefinition::default()
            })
        }

        async fn get_fields(
            &self,
            _database: &str,
            _bundle: &str,
        ) -> Result<Vec<Field>, ServerError> {
            Ok(vec![Field {
                name: "email".to_string(),
                field_type: FieldType::Text,
                constraints: FieldConstraints::default(),
            }])
        }

        async fn get_relationships(
            &self,
            _database: &str,
            _bundle: &str,
        ) -> Result<Vec<Relationship>, ServerError> {
            Ok(vec![])
        }

        async fn get_permissions(&self) -> Result<Vec<Permission>, ServerError> {
            Ok(vec![])
        }

        async fn get_migrations(&self) -> Result<Vec<Migration>, ServerError> {
            Ok(vec![])
        }
    }

    fn migration(name: &str, dependencies: &[&str]) -> Migration {
        Migration {
            name: name.to_string(),
            statements: vec![],
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            applied: false,
            timestamp: None,
        }
    }

    fn context_with_migrations(migrations: Vec<Migration>) -> SchemaContext {
        let mut context = SchemaContext::new();
        context.migrations = migrations
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
        context
    }

    #[tokio::test]
    async fn refresh_pulls_everything_and_goes_fresh() {
        let mut context = SchemaContext::new();
        context
            .refresh_from_server(&StaticServer { fail: false })
            .await
            .unwrap();
        assert_eq!(context.state(), ContextState::Fresh);
        assert!(context.has_bundle("testdb", "users"));
        assert!(context.has_field("testdb", "users", "email"));
        assert!(!context.is_stale(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn failed_refresh_enters_error_state() {
        let mut context = SchemaContext::new();
        let result = context.refresh_from_server(&StaticServer { fail: true }).await;
        assert!(result.is_err());
        assert_eq!(context.state(), ContextState::Error);
        assert!(context.is_stale(Duration::from_secs(300)));
    }

    #[test]
    fn cache_round_trip_preserves_all_maps() {
        let mut context = SchemaContext::new();
        context.update_database(Database {
            name: "shop".to_string(),
            bundles: IndexMap::new(),
        });
        context.set_current_database(Some("shop".to_string()));
        context.set_root_fields(RootOperation::Query, vec!["users".to_string()]);

        let blob = context.to_cache().unwrap();
        let mut restored = SchemaContext::new();
        restored.load_from_cache(&blob).unwrap();

        assert_eq!(restored.state(), ContextState::Stale);
        assert!(restored.has_database("shop"));
        assert_eq!(restored.current_database(), Some("shop"));
        assert_eq!(
            restored.root_fields(RootOperation::Query),
            &["users".to_string()]
        );
    }

    #[test]
    fn local_edits_force_stale() {
        let mut context = SchemaContext::new();
        context.state = ContextState::Fresh;
        context.update_bundle(
            "shop",
            Bundle {
                name: "orders".to_string(),
                database: "shop".to_string(),
                fields: IndexMap::new(),
                relationships: IndexMap::new(),
                indexes: vec![],
            },
        );
        assert_eq!(context.state(), ContextState::Stale);
    }

    #[test]
    fn detects_direct_and_transitive_cycles() {
        let context = context_with_migrations(vec![
            migration("a", &["b"]),
            migration("b", &["c"]),
            migration("c", &["a"]),
        ]);
        assert!(context.has_circular_dependency("a", &mut HashSet::new()));

        let context = context_with_migrations(vec![migration("self", &["self"])]);
        assert!(context.has_circular_dependency("self", &mut HashSet::new()));
    }

    #[test]
    fn diamond_dependencies_are_not_cycles() {
        let context = context_with_migrations(vec![
            migration("base", &[]),
            migration("left", &["base"]),
            migration("right", &["base"]),
            migration("top", &["left", "right"]),
        ]);
        assert!(!context.has_circular_dependency("top", &mut HashSet::new()));
    }

    #[test]
    fn missing_dependencies_are_reported() {
        let context = context_with_migrations(vec![migration("a", &["ghost", "a0"])]);
        let check = context.validate_migration_dependencies("a");
        assert!(!check.valid);
        assert_eq!(check.missing, vec!["ghost".to_string(), "a0".to_string()]);
    }
}
