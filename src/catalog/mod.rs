//! Schema capability interface.
//!
//! The core never touches a concrete ORM or database client. Everything it
//! needs to know about an entity type — its relationship edges, its columns
//! and their semantic types, its table name — comes through the
//! [`SchemaCatalog`] trait, and individual records travel as [`EntityHandle`]
//! values that own a materialized attribute row.

pub mod memory;

pub use memory::MemoryCatalog;

use ahash::AHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Primary key value of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Int(i64),
    Text(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(n) => write!(f, "{}", n),
            Identity::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Identity {
    fn from(n: i64) -> Self {
        Identity::Int(n)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity::Text(s.to_string())
    }
}

/// Raw attribute value as supplied by a catalog adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    List(Vec<AttrValue>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Lossy display form, used by template producers and diagnostics.
    pub fn as_display_string(&self) -> String {
        match self {
            AttrValue::Null => String::new(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Float(x) => x.to_string(),
            AttrValue::Text(s) => s.clone(),
            AttrValue::Json(v) => v.to_string(),
            AttrValue::List(items) => items
                .iter()
                .map(|v| v.as_display_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Relationship macro kind, as declared by the schema adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Single target, foreign key stored on the source row.
    BelongsTo,
    /// Single target, foreign key stored on the target row.
    HasOne,
    /// Plural target, foreign key stored on the target rows.
    HasMany,
    /// Plural target, linked through a join table.
    ManyToMany,
}

impl EdgeKind {
    /// Whether this edge resolves to at most one record.
    pub fn is_singular(self) -> bool {
        matches!(self, EdgeKind::BelongsTo | EdgeKind::HasOne)
    }
}

/// A typed link from one entity type to another.
#[derive(Debug, Clone)]
pub struct RelationshipEdge {
    /// Relationship name (unique per source type).
    pub name: String,
    pub kind: EdgeKind,
    /// Declared target type. `None` for polymorphic edges, where the
    /// concrete type is only known per record at resolution time.
    pub target_type: Option<String>,
    pub polymorphic: bool,
    pub self_referential: bool,
}

impl RelationshipEdge {
    pub fn new(name: &str, kind: EdgeKind, target_type: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            target_type: Some(target_type.to_string()),
            polymorphic: false,
            self_referential: false,
        }
    }

    pub fn polymorphic(name: &str, kind: EdgeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            target_type: None,
            polymorphic: true,
            self_referential: false,
        }
    }

    pub fn self_referential(mut self) -> Self {
        self.self_referential = true;
        self
    }
}

/// Semantic classification of a column, driving literal encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    Integer,
    Decimal,
    Boolean,
    /// Enumerated column; literals use the underlying raw representation.
    Enum,
    /// JSON / JSONB document column.
    Json,
    Uuid,
    DateTime,
    Text,
}

impl SemanticType {
    /// Classify a SQL type name. Follows Postgres naming, with the usual
    /// aliases tolerated.
    pub fn from_sql_type(type_str: &str) -> Self {
        let lower = type_str.to_lowercase();
        let base = lower
            .trim_end_matches("[]")
            .split('(')
            .next()
            .unwrap_or(&lower)
            .trim();

        match base {
            "int" | "integer" | "smallint" | "bigint" | "int2" | "int4" | "int8" | "serial"
            | "bigserial" => SemanticType::Integer,
            "decimal" | "numeric" | "real" | "double precision" | "float4" | "float8"
            | "money" => SemanticType::Decimal,
            "bool" | "boolean" => SemanticType::Boolean,
            "json" | "jsonb" => SemanticType::Json,
            "uuid" => SemanticType::Uuid,
            "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "interval" => {
                SemanticType::DateTime
            }
            _ => SemanticType::Text,
        }
    }
}

/// Column metadata supplied by the catalog, in declared table order.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub semantic: SemanticType,
    /// Raw SQL type name, e.g. `text`, `jsonb`, `integer`, `text[]`.
    pub sql_type: String,
    pub is_array: bool,
}

impl ColumnInfo {
    pub fn new(name: &str, sql_type: &str) -> Self {
        let is_array = sql_type.ends_with("[]");
        Self {
            name: name.to_string(),
            semantic: SemanticType::from_sql_type(sql_type),
            sql_type: sql_type.to_string(),
            is_array,
        }
    }

    /// Element type of an array column (`text[]` -> `text`).
    pub fn element_type(&self) -> &str {
        self.sql_type.trim_end_matches("[]")
    }
}

/// Opaque reference to one record.
///
/// Equality and hashing are by `(entity_type, identity)` only; the attribute
/// row is payload. Handles are created lazily during collection and dropped
/// when the run ends.
#[derive(Debug, Clone)]
pub struct EntityHandle {
    entity_type: String,
    identity: Identity,
    attributes: AHashMap<String, AttrValue>,
}

impl EntityHandle {
    pub fn new(
        entity_type: impl Into<String>,
        identity: Identity,
        attributes: AHashMap<String, AttrValue>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            identity,
            attributes,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: &str, value: AttrValue) {
        self.attributes.insert(name.to_string(), value);
    }

    /// `Type#identity` tag used in diagnostics and error context.
    pub fn tag(&self) -> String {
        format!("{}#{}", self.entity_type, self.identity)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.identity == other.identity
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.identity.hash(state);
    }
}

/// Result of resolving one relationship for one record.
#[derive(Debug)]
pub enum Resolved {
    None,
    One(EntityHandle),
    Many(Vec<EntityHandle>),
}

impl Resolved {
    pub fn into_handles(self) -> Vec<EntityHandle> {
        match self {
            Resolved::None => Vec::new(),
            Resolved::One(h) => vec![h],
            Resolved::Many(hs) => hs,
        }
    }
}

/// Narrow interface over the host schema/ORM metadata layer.
///
/// Relationship and column iteration order must be stable: collection
/// determinism relies on it.
pub trait SchemaCatalog {
    /// Relationship edges of an entity type, in declared order.
    fn relationships_of(&self, entity_type: &str) -> &[RelationshipEdge];

    /// Columns of an entity type, in declared order.
    fn columns_of(&self, entity_type: &str) -> &[ColumnInfo];

    /// Backing table name for an entity type.
    fn table_name_of<'a>(&'a self, entity_type: &'a str) -> &'a str;

    /// Name of the identity (conflict-target) column.
    fn identity_column_of(&self, _entity_type: &str) -> &str {
        "id"
    }

    /// Resolve one relationship for one record. A not-found fault is
    /// expected to surface as `Err` and is treated as non-fatal by the
    /// collector.
    fn resolve(&self, handle: &EntityHandle, relationship: &str) -> anyhow::Result<Resolved>;
}
