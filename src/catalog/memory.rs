//! In-memory [`SchemaCatalog`] adapter.
//!
//! The reference adapter: types, rows, and relationship links are built by
//! hand. Used throughout the test suite and handy for wiring small demo
//! schemas without a live database.

use super::{
    AttrValue, ColumnInfo, EntityHandle, Identity, RelationshipEdge, Resolved, SchemaCatalog,
};
use ahash::AHashMap;
use anyhow::bail;

#[derive(Debug, Default)]
struct Row {
    attributes: AHashMap<String, AttrValue>,
    /// Edge name -> linked (type, identity) pairs, in link order.
    links: AHashMap<String, Vec<(String, Identity)>>,
}

#[derive(Debug)]
struct TypeDef {
    table: String,
    identity_column: String,
    columns: Vec<ColumnInfo>,
    edges: Vec<RelationshipEdge>,
    rows: AHashMap<Identity, Row>,
}

/// Hand-built catalog over in-memory rows.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    types: AHashMap<String, TypeDef>,
    empty_edges: Vec<RelationshipEdge>,
    empty_columns: Vec<ColumnInfo>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type with its backing table, columns, and edges.
    pub fn define_type(
        &mut self,
        entity_type: &str,
        table: &str,
        columns: Vec<ColumnInfo>,
        edges: Vec<RelationshipEdge>,
    ) -> &mut Self {
        self.types.insert(
            entity_type.to_string(),
            TypeDef {
                table: table.to_string(),
                identity_column: "id".to_string(),
                columns,
                edges,
                rows: AHashMap::new(),
            },
        );
        self
    }

    /// Override the identity column for a type (defaults to `id`).
    pub fn set_identity_column(&mut self, entity_type: &str, column: &str) -> &mut Self {
        let def = self
            .types
            .get_mut(entity_type)
            .expect("set_identity_column: type not defined");
        def.identity_column = column.to_string();
        self
    }

    /// Add a row. The identity is taken from `identity`, not the attribute
    /// list; put the identity column in the attributes too so it serializes.
    pub fn insert_row(
        &mut self,
        entity_type: &str,
        identity: Identity,
        attributes: Vec<(&str, AttrValue)>,
    ) -> &mut Self {
        let def = self
            .types
            .get_mut(entity_type)
            .expect("insert_row: type not defined");
        let row = def.rows.entry(identity).or_default();
        for (name, value) in attributes {
            row.attributes.insert(name.to_string(), value);
        }
        self
    }

    /// Link `source` to `target` through `edge`. Targets accumulate in call
    /// order, which fixes to-many resolution order.
    pub fn link(
        &mut self,
        source_type: &str,
        source_id: Identity,
        edge: &str,
        target_type: &str,
        target_id: Identity,
    ) -> &mut Self {
        let def = self
            .types
            .get_mut(source_type)
            .expect("link: source type not defined");
        let row = def.rows.entry(source_id).or_default();
        row.links
            .entry(edge.to_string())
            .or_default()
            .push((target_type.to_string(), target_id));
        self
    }

    /// Materialize a handle for a stored row.
    pub fn handle(&self, entity_type: &str, identity: Identity) -> Option<EntityHandle> {
        let def = self.types.get(entity_type)?;
        let row = def.rows.get(&identity)?;
        Some(EntityHandle::new(
            entity_type,
            identity,
            row.attributes.clone(),
        ))
    }
}

impl SchemaCatalog for MemoryCatalog {
    fn relationships_of(&self, entity_type: &str) -> &[RelationshipEdge] {
        self.types
            .get(entity_type)
            .map(|d| d.edges.as_slice())
            .unwrap_or(&self.empty_edges)
    }

    fn columns_of(&self, entity_type: &str) -> &[ColumnInfo] {
        self.types
            .get(entity_type)
            .map(|d| d.columns.as_slice())
            .unwrap_or(&self.empty_columns)
    }

    fn table_name_of<'a>(&'a self, entity_type: &'a str) -> &'a str {
        self.types
            .get(entity_type)
            .map(|d| d.table.as_str())
            .unwrap_or(entity_type)
    }

    fn identity_column_of(&self, entity_type: &str) -> &str {
        self.types
            .get(entity_type)
            .map(|d| d.identity_column.as_str())
            .unwrap_or("id")
    }

    fn resolve(&self, handle: &EntityHandle, relationship: &str) -> anyhow::Result<Resolved> {
        let def = match self.types.get(handle.entity_type()) {
            Some(d) => d,
            None => bail!("unknown entity type: {}", handle.entity_type()),
        };
        let edge = match def.edges.iter().find(|e| e.name == relationship) {
            Some(e) => e,
            None => bail!(
                "unknown relationship {} on {}",
                relationship,
                handle.entity_type()
            ),
        };
        let row = match def.rows.get(handle.identity()) {
            Some(r) => r,
            None => bail!("record not found: {}", handle.tag()),
        };

        let refs = row.links.get(relationship).cloned().unwrap_or_default();
        let mut handles = Vec::with_capacity(refs.len());
        for (target_type, target_id) in refs {
            match self.handle(&target_type, target_id.clone()) {
                Some(h) => handles.push(h),
                None => bail!(
                    "dangling reference from {} via {}: {}#{} not found",
                    handle.tag(),
                    relationship,
                    target_type,
                    target_id
                ),
            }
        }

        if edge.kind.is_singular() {
            Ok(match handles.into_iter().next() {
                Some(h) => Resolved::One(h),
                None => Resolved::None,
            })
        } else {
            Ok(Resolved::Many(handles))
        }
    }
}
