//! Dependency-ordered statement serialization.
//!
//! Collected records are grouped by entity type, the types are sorted by a
//! topological pass over their foreign-key dependencies, and every record is
//! rendered as an idempotent `INSERT ... ON CONFLICT DO NOTHING` statement.
//!
//! The dependency graph covers only the types present in the collected set,
//! and only foreign-key-bearing (`BelongsTo`) non-polymorphic edges induce
//! graph edges. Join associations never participate; join rows order through
//! their own `BelongsTo` edges when modeled as a type. Self-edges,
//! reciprocal-blocked paths, and explicitly exempted cycles are excluded so
//! legitimate self-references do not read as circular dependencies.

pub mod encoder;

pub use encoder::{encode, quote};

use crate::catalog::{AttrValue, EdgeKind, EntityHandle, SchemaCatalog};
use crate::error::{Error, Result};
use crate::policy::CollectionPolicy;
use ahash::AHashMap;

/// Renders a collected record set as dump text.
pub struct StatementSerializer<'a, C: SchemaCatalog + ?Sized> {
    catalog: &'a C,
    policy: &'a CollectionPolicy,
}

impl<'a, C: SchemaCatalog + ?Sized> StatementSerializer<'a, C> {
    pub fn new(catalog: &'a C, policy: &'a CollectionPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Serialize records into insert statements in dependency-safe order.
    pub fn serialize(&self, records: &[EntityHandle]) -> Result<String> {
        let groups = group_by_type(records);
        let order = self.sort_types(&groups)?;

        let mut out = String::new();
        for entity_type in &order {
            let group = groups
                .iter()
                .find(|(t, _)| t == entity_type)
                .map(|(_, rs)| rs.as_slice())
                .unwrap_or(&[]);
            for record in group {
                out.push_str(&self.render_insert(record)?);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Topologically sort the present types, dependencies first.
    fn sort_types(&self, groups: &[(String, Vec<&EntityHandle>)]) -> Result<Vec<String>> {
        let present: AHashMap<&str, ()> =
            groups.iter().map(|(t, _)| (t.as_str(), ())).collect();

        // Type -> its dependency types, in edge declaration order.
        let mut deps: AHashMap<String, Vec<String>> = AHashMap::new();
        for (entity_type, _) in groups {
            let mut type_deps: Vec<String> = Vec::new();
            for edge in self.catalog.relationships_of(entity_type) {
                if edge.kind != EdgeKind::BelongsTo || edge.polymorphic {
                    continue;
                }
                let Some(target) = edge.target_type.as_deref() else {
                    continue;
                };
                if target == entity_type || !present.contains_key(target) {
                    continue;
                }
                if self.policy.reciprocal_blocked(entity_type, &edge.name)
                    || self.policy.cycle_exempted(entity_type, &edge.name)
                {
                    continue;
                }
                if !type_deps.iter().any(|d| d == target) {
                    type_deps.push(target.to_string());
                }
            }
            deps.insert(entity_type.clone(), type_deps);
        }

        topo_sort(groups.iter().map(|(t, _)| t.clone()).collect(), &deps)
    }

    fn render_insert(&self, record: &EntityHandle) -> Result<String> {
        let entity_type = record.entity_type();
        let table = self.catalog.table_name_of(entity_type);
        let columns = self.catalog.columns_of(entity_type);
        let identity_column = self.catalog.identity_column_of(entity_type);

        let mut names = Vec::with_capacity(columns.len());
        let mut literals = Vec::with_capacity(columns.len());
        for column in columns {
            let value = record.attribute(&column.name).unwrap_or(&AttrValue::Null);
            names.push(column.name.as_str());
            literals.push(encoder::encode(column, value)?);
        }

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING;",
            table,
            names.join(", "),
            literals.join(", "),
            identity_column
        ))
    }
}

/// Group records by entity type, preserving discovery order both across
/// groups (first occurrence) and within each group.
fn group_by_type(records: &[EntityHandle]) -> Vec<(String, Vec<&EntityHandle>)> {
    let mut index: AHashMap<&str, usize> = AHashMap::new();
    let mut groups: Vec<(String, Vec<&EntityHandle>)> = Vec::new();
    for record in records {
        match index.get(record.entity_type()) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(record.entity_type(), groups.len());
                groups.push((record.entity_type().to_string(), vec![record]));
            }
        }
    }
    groups
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Iterative three-color depth-first topological sort. An in-progress node
/// reached during descent is an unexempted cycle and fails with the path.
fn topo_sort(roots: Vec<String>, deps: &AHashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut marks: AHashMap<String, Mark> = roots
        .iter()
        .map(|t| (t.clone(), Mark::Unvisited))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(roots.len());
    static EMPTY: Vec<String> = Vec::new();

    for root in &roots {
        if marks.get(root) != Some(&Mark::Unvisited) {
            continue;
        }
        marks.insert(root.clone(), Mark::InProgress);
        let mut stack: Vec<(String, usize)> = vec![(root.clone(), 0)];

        while let Some((node, next)) = stack.last().cloned() {
            let node_deps = deps.get(&node).unwrap_or(&EMPTY);
            if next < node_deps.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let dep = &node_deps[next];
                match marks.get(dep.as_str()).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Unvisited => {
                        marks.insert(dep.clone(), Mark::InProgress);
                        stack.push((dep.clone(), 0));
                    }
                    Mark::InProgress => {
                        let start = stack
                            .iter()
                            .position(|(n, _)| n == dep)
                            .unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|(n, _)| n.clone()).collect();
                        path.push(dep.clone());
                        return Err(Error::CircularDependency { path });
                    }
                    Mark::Done => {}
                }
            } else {
                marks.insert(node.clone(), Mark::Done);
                order.push(node);
                stack.pop();
            }
        }
    }

    Ok(order)
}
