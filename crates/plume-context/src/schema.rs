use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Field value types supported by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
    Json,
}

/// Declarative constraints attached to a field definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub constraints: FieldConstraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:N")]
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub from_bundle: String,
    pub to_bundle: String,
    pub from_field: String,
    pub to_field: String,
    pub cardinality: Cardinality,
}

/// A bundle: the collection/table analogue, a named set of documents
/// sharing a field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    pub database: String,
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
    #[serde(default)]
    pub relationships: IndexMap<String, Relationship>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub bundles: IndexMap<String, Bundle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grant {
    Read,
    Write,
    Execute,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Database,
    Bundle,
    Field,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub principal: String,
    pub resource: String,
    pub resource_kind: ResourceKind,
    pub grants: BTreeSet<Grant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub name: String,
    #[serde(default)]
    pub statements: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Wire shape returned by the schema server for a database listing.
/// Bundles arrive shallow and are filled in by later calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    pub name: String,
    #[serde(default)]
    pub bundles: Vec<BundleDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl BundleDefinition {
    /// Materializes the wire shape into the context's keyed model.
    pub fn into_bundle(self, database: &str) -> Bundle {
        Bundle {
            name: self.name,
            database: database.to_string(),
            fields: self
                .fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
            relationships: self
                .relationships
                .into_iter()
                .map(|rel| (rel.name.clone(), rel))
                .collect(),
            indexes: self.indexes,
        }
    }
}

impl DatabaseDefinition {
    pub fn into_database(self) -> Database {
        let name = self.name;
        let bundles = self
            .bundles
            .into_iter()
            .map(|bundle| (bundle.name.clone(), bundle.into_bundle(&name)))
            .collect();
        Database { name, bundles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cardinality_uses_compact_wire_names() {
        let json = serde_json::to_string(&Cardinality::OneToMany).unwrap();
        assert_eq!(json, "\"1:N\"");
        let back: Cardinality = serde_json::from_str("\"N:N\"").unwrap();
        assert_eq!(back, Cardinality::ManyToMany);
    }

    #[test]
    fn definitions_materialize_into_keyed_maps() {
        let definition = DatabaseDefinition {
            name: "shop".to_string(),
            bundles: vec![BundleDefinition {
                name: "orders".to_string(),
                fields: vec![Field {
                    name: "total".to_string(),
                    field_type: FieldType::Number,
                    constraints: FieldConstraints::default(),
                }],
                relationships: vec![],
                indexes: vec!["idx_total".to_string()],
            }],
        };
        let database = definition.into_database();
        let bundle = &database.bundles["orders"];
        assert_eq!(bundle.database, "shop");
        assert_eq!(bundle.fields["total"].field_type, FieldType::Number);
    }
}
