//! Graph collection: walk the relationship graph from a seed record and
//! build the referentially-complete set of records a fixture needs.
//!
//! Traversal is depth-first over [`SchemaCatalog`] edges under the active
//! [`CollectionPolicy`]: identity dedup, per-(record, relationship)
//! idempotent visiting, reciprocal guards, per-path self-reference bounds,
//! per-path record limits, and a global depth bound. Broken relationships
//! are non-fatal; they land in the stats warnings and the branch is skipped.

use crate::catalog::{EntityHandle, Identity, RelationshipEdge, SchemaCatalog};
use crate::policy::CollectionPolicy;
use ahash::{AHashMap, AHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Per-entity-type collection counters. Diagnostic only.
#[derive(Debug, Default, Clone)]
pub struct TypeStats {
    /// Records of this type in the collected set.
    pub count: usize,
    /// Per-relationship count of related records discovered, whether or not
    /// they were ultimately included.
    pub relationships: BTreeMap<String, usize>,
    /// Concrete target types observed through polymorphic to-one edges.
    pub polymorphic_targets: BTreeMap<String, BTreeSet<String>>,
}

/// Counters and warnings from one collection run.
#[derive(Debug, Default, Clone)]
pub struct CollectionStats {
    types: BTreeMap<String, TypeStats>,
    /// Non-fatal traversal faults (dangling references etc.).
    pub warnings: Vec<String>,
}

impl CollectionStats {
    pub fn for_type(&self, entity_type: &str) -> Option<&TypeStats> {
        self.types.get(entity_type)
    }

    pub fn total_records(&self) -> usize {
        self.types.values().map(|t| t.count).sum()
    }

    fn type_mut(&mut self, entity_type: &str) -> &mut TypeStats {
        self.types.entry(entity_type.to_string()).or_default()
    }

    /// Human-readable summary, one section per type.
    pub fn report(&self) -> String {
        let mut out = String::from("=== Collection Statistics ===\n");
        for (entity_type, stats) in &self.types {
            let _ = writeln!(out, "\n{}:", entity_type);
            let _ = writeln!(out, "  Total records: {}", stats.count);
            if !stats.relationships.is_empty() {
                out.push_str("  Relationships:\n");
                for (name, count) in &stats.relationships {
                    let _ = writeln!(out, "    {}: {} records", name, count);
                }
            }
            if !stats.polymorphic_targets.is_empty() {
                out.push_str("  Polymorphic types:\n");
                for (name, targets) in &stats.polymorphic_targets {
                    let types: Vec<&str> = targets.iter().map(String::as_str).collect();
                    let _ = writeln!(out, "    {}: {}", name, types.join(", "));
                }
            }
        }
        let _ = writeln!(out, "\nTotal unique records collected: {}", self.total_records());
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {}", warning);
        }
        out
    }
}

/// State owned by a single `collect` run. Never shared across runs, so
/// concurrent collections with separate collectors are independent.
#[derive(Default)]
struct RunState {
    ordered: Vec<EntityHandle>,
    collected: AHashSet<(String, Identity)>,
    /// `(type, identity, relationship)` triples already processed.
    processed: AHashSet<(String, Identity, String)>,
    /// Reciprocal-blocked `"Type.edge"` paths taken once already.
    reciprocal_taken: AHashSet<String>,
    /// Self-referential `"Type.edge"` counts along the current path.
    path_counts: AHashMap<String, usize>,
    stats: CollectionStats,
}

/// Depth-first record collector over a schema catalog.
pub struct GraphCollector<'a, C: SchemaCatalog + ?Sized> {
    catalog: &'a C,
    policy: &'a CollectionPolicy,
}

impl<'a, C: SchemaCatalog + ?Sized> GraphCollector<'a, C> {
    pub fn new(catalog: &'a C, policy: &'a CollectionPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Collect the seed and everything reachable under the policy.
    ///
    /// The returned sequence is discovery order; dependency-safe insert
    /// order is the serializer's job. Deterministic for a fixed seed,
    /// policy, and data snapshot because edge iteration order comes from
    /// the catalog.
    pub fn collect(&self, seed: &EntityHandle) -> (Vec<EntityHandle>, CollectionStats) {
        let mut run = RunState::default();
        self.collect_record(seed.clone(), 0, &mut run);
        (run.ordered, run.stats)
    }

    fn collect_record(&self, handle: EntityHandle, depth: usize, run: &mut RunState) {
        if depth > self.policy.max_depth() {
            return;
        }
        let key = (handle.entity_type().to_string(), handle.identity().clone());
        if run.collected.contains(&key) {
            return;
        }
        run.collected.insert(key);
        run.stats.type_mut(handle.entity_type()).count += 1;
        run.ordered.push(handle.clone());

        let edges: Vec<RelationshipEdge> = self
            .catalog
            .relationships_of(handle.entity_type())
            .to_vec();
        for edge in &edges {
            self.process_edge(&handle, edge, depth, run);
        }
    }

    fn process_edge(
        &self,
        handle: &EntityHandle,
        edge: &RelationshipEdge,
        depth: usize,
        run: &mut RunState,
    ) {
        let entity_type = handle.entity_type();
        let path = format!("{}.{}", entity_type, edge.name);

        // Idempotent visiting: one pass per (record, relationship).
        let processed_key = (
            entity_type.to_string(),
            handle.identity().clone(),
            edge.name.clone(),
        );
        if run.processed.contains(&processed_key) {
            return;
        }
        run.processed.insert(processed_key);

        // Reciprocal guard: a blocked edge may be taken once per type.
        if self.policy.reciprocal_blocked(entity_type, &edge.name) {
            if run.reciprocal_taken.contains(&path) {
                return;
            }
            run.reciprocal_taken.insert(path.clone());
        }

        if !self.policy.admits(entity_type, &edge.name) {
            return;
        }

        if edge.self_referential {
            let taken = run.path_counts.get(&path).copied().unwrap_or(0);
            if taken >= self.policy.max_self_ref_depth() {
                return;
            }
        }

        let resolved = match self.catalog.resolve(handle, &edge.name) {
            Ok(r) => r,
            Err(e) => {
                run.stats
                    .warnings
                    .push(format!("failed to resolve {} on {}: {}", edge.name, handle.tag(), e));
                return;
            }
        };

        let mut related = resolved.into_handles();
        if !edge.kind.is_singular() {
            if let Some(limit) = self.policy.limit_for(entity_type, &edge.name) {
                related.truncate(limit);
            }
        }

        // Discovered counts are recorded even when depth/dedup later skips
        // the records themselves.
        *run.stats
            .type_mut(entity_type)
            .relationships
            .entry(edge.name.clone())
            .or_insert(0) += related.len();

        if edge.polymorphic && edge.kind.is_singular() {
            for target in &related {
                run.stats
                    .type_mut(entity_type)
                    .polymorphic_targets
                    .entry(edge.name.clone())
                    .or_default()
                    .insert(target.entity_type().to_string());
            }
        }

        if edge.self_referential {
            *run.path_counts.entry(path.clone()).or_insert(0) += 1;
        }
        for target in related {
            self.collect_record(target, depth + 1, run);
        }
        if edge.self_referential {
            if let Some(count) = run.path_counts.get_mut(&path) {
                *count -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttrValue, ColumnInfo, EdgeKind, MemoryCatalog};

    fn id_col() -> ColumnInfo {
        ColumnInfo::new("id", "integer")
    }

    /// A -> B -> C chain through singular owned edges.
    fn chain_catalog() -> MemoryCatalog {
        let mut cat = MemoryCatalog::new();
        cat.define_type("A", "a_records", vec![id_col()], vec![RelationshipEdge::new("b", EdgeKind::BelongsTo, "B")]);
        cat.define_type("B", "b_records", vec![id_col()], vec![RelationshipEdge::new("c", EdgeKind::BelongsTo, "C")]);
        cat.define_type("C", "c_records", vec![id_col()], vec![]);
        for (t, id) in [("A", 1), ("B", 2), ("C", 3)] {
            cat.insert_row(t, Identity::Int(id), vec![("id", AttrValue::Int(id))]);
        }
        cat.link("A", Identity::Int(1), "b", "B", Identity::Int(2));
        cat.link("B", Identity::Int(2), "c", "C", Identity::Int(3));
        cat
    }

    fn tags(records: &[EntityHandle]) -> Vec<String> {
        records.iter().map(|h| h.tag()).collect()
    }

    #[test]
    fn collects_the_full_reachable_set() {
        let cat = chain_catalog();
        let policy = CollectionPolicy::new();
        let seed = cat.handle("A", Identity::Int(1)).unwrap();
        let (records, stats) = GraphCollector::new(&cat, &policy).collect(&seed);
        assert_eq!(tags(&records), vec!["A#1", "B#2", "C#3"]);
        assert_eq!(stats.total_records(), 3);
        assert_eq!(stats.for_type("A").unwrap().relationships.get("b"), Some(&1));
    }

    #[test]
    fn discovery_order_is_deterministic() {
        let cat = chain_catalog();
        let policy = CollectionPolicy::new();
        let seed = cat.handle("A", Identity::Int(1)).unwrap();
        let collector = GraphCollector::new(&cat, &policy);
        let (first, _) = collector.collect(&seed);
        for _ in 0..5 {
            let (again, _) = collector.collect(&seed);
            assert_eq!(tags(&first), tags(&again));
        }
    }

    #[test]
    fn depth_bound_excludes_distant_records() {
        let cat = chain_catalog();
        let mut policy = CollectionPolicy::new();
        policy.set_max_depth(1);
        let seed = cat.handle("A", Identity::Int(1)).unwrap();
        let (records, _) = GraphCollector::new(&cat, &policy).collect(&seed);
        assert_eq!(tags(&records), vec!["A#1", "B#2"]);
    }

    #[test]
    fn self_referential_chain_is_bounded_per_path() {
        let mut cat = MemoryCatalog::new();
        cat.define_type(
            "Node",
            "nodes",
            vec![id_col()],
            vec![RelationshipEdge::new("next", EdgeKind::BelongsTo, "Node").self_referential()],
        );
        for id in 1..=4 {
            cat.insert_row("Node", Identity::Int(id), vec![("id", AttrValue::Int(id))]);
        }
        for id in 1..=3 {
            cat.link("Node", Identity::Int(id), "next", "Node", Identity::Int(id + 1));
        }

        let policy = CollectionPolicy::new(); // max_self_ref_depth = 2
        let seed = cat.handle("Node", Identity::Int(1)).unwrap();
        let (records, _) = GraphCollector::new(&cat, &policy).collect(&seed);
        // Root plus two hops, never the full chain.
        assert_eq!(tags(&records), vec!["Node#1", "Node#2", "Node#3"]);
    }

    #[test]
    fn to_many_limits_apply_at_the_source() {
        let mut cat = MemoryCatalog::new();
        cat.define_type(
            "Patient",
            "patients",
            vec![id_col()],
            vec![RelationshipEdge::new("visits", EdgeKind::HasMany, "Visit")],
        );
        cat.define_type("Visit", "visits", vec![id_col()], vec![]);
        cat.insert_row("Patient", Identity::Int(1), vec![("id", AttrValue::Int(1))]);
        for id in 1..=5 {
            cat.insert_row("Visit", Identity::Int(id), vec![("id", AttrValue::Int(id))]);
            cat.link("Patient", Identity::Int(1), "visits", "Visit", Identity::Int(id));
        }

        let mut policy = CollectionPolicy::new();
        policy.limit("Patient.visits", 2);
        let seed = cat.handle("Patient", Identity::Int(1)).unwrap();
        let (records, stats) = GraphCollector::new(&cat, &policy).collect(&seed);

        assert_eq!(tags(&records), vec!["Patient#1", "Visit#1", "Visit#2"]);
        assert_eq!(
            stats.for_type("Patient").unwrap().relationships.get("visits"),
            Some(&2)
        );
    }

    #[test]
    fn reciprocal_block_stops_the_second_traversal() {
        let mut cat = MemoryCatalog::new();
        cat.define_type(
            "NoteType",
            "note_types",
            vec![id_col()],
            vec![RelationshipEdge::new("notes", EdgeKind::HasMany, "Note")],
        );
        cat.define_type(
            "Note",
            "notes",
            vec![id_col()],
            vec![RelationshipEdge::new("note_type", EdgeKind::BelongsTo, "NoteType")],
        );
        for id in [1, 2] {
            cat.insert_row("NoteType", Identity::Int(id), vec![("id", AttrValue::Int(id))]);
        }
        for id in [10, 20] {
            cat.insert_row("Note", Identity::Int(id), vec![("id", AttrValue::Int(id))]);
        }
        // Note#10 -> NoteType#1 -> notes -> Note#20 -> NoteType#2 -> notes...
        cat.link("Note", Identity::Int(10), "note_type", "NoteType", Identity::Int(1));
        cat.link("NoteType", Identity::Int(1), "notes", "Note", Identity::Int(10));
        cat.link("NoteType", Identity::Int(1), "notes", "Note", Identity::Int(20));
        cat.link("Note", Identity::Int(20), "note_type", "NoteType", Identity::Int(2));
        cat.link("NoteType", Identity::Int(2), "notes", "Note", Identity::Int(20));

        let mut policy = CollectionPolicy::new();
        policy.prevent_reciprocal("NoteType.notes");
        let seed = cat.handle("Note", Identity::Int(10)).unwrap();
        let (records, _) = GraphCollector::new(&cat, &policy).collect(&seed);
        // NoteType#1's notes edge is taken (once); NoteType#2's is blocked.
        assert_eq!(tags(&records), vec!["Note#10", "NoteType#1", "Note#20", "NoteType#2"]);
    }

    #[test]
    fn whitelist_filter_prunes_branches() {
        let cat = chain_catalog();
        let mut policy = CollectionPolicy::new();
        policy.include_relationships(["b"]).unwrap();
        let seed = cat.handle("A", Identity::Int(1)).unwrap();
        let (records, _) = GraphCollector::new(&cat, &policy).collect(&seed);
        // "c" is not whitelisted, so C is never reached.
        assert_eq!(tags(&records), vec!["A#1", "B#2"]);
    }

    #[test]
    fn polymorphic_targets_recorded_in_stats() {
        let mut cat = MemoryCatalog::new();
        cat.define_type(
            "Comment",
            "comments",
            vec![id_col()],
            vec![RelationshipEdge::polymorphic("commentable", EdgeKind::BelongsTo)],
        );
        cat.define_type("Post", "posts", vec![id_col()], vec![]);
        cat.insert_row("Comment", Identity::Int(1), vec![("id", AttrValue::Int(1))]);
        cat.insert_row("Post", Identity::Int(5), vec![("id", AttrValue::Int(5))]);
        cat.link("Comment", Identity::Int(1), "commentable", "Post", Identity::Int(5));

        let policy = CollectionPolicy::new();
        let seed = cat.handle("Comment", Identity::Int(1)).unwrap();
        let (records, stats) = GraphCollector::new(&cat, &policy).collect(&seed);

        assert_eq!(tags(&records), vec!["Comment#1", "Post#5"]);
        let observed = &stats.for_type("Comment").unwrap().polymorphic_targets;
        assert!(observed.get("commentable").unwrap().contains("Post"));
    }

    #[test]
    fn broken_resolution_warns_and_continues() {
        let mut cat = chain_catalog();
        // Dangling reference: B points at a C row that does not exist.
        cat.link("B", Identity::Int(2), "c", "C", Identity::Int(999));
        let policy = CollectionPolicy::new();
        let seed = cat.handle("A", Identity::Int(1)).unwrap();
        let (records, stats) = GraphCollector::new(&cat, &policy).collect(&seed);

        // The broken branch is skipped, the rest of the set survives.
        assert_eq!(tags(&records), vec!["A#1", "B#2"]);
        assert_eq!(stats.warnings.len(), 1);
        assert!(stats.warnings[0].contains("B#2"));
    }

    #[test]
    fn seed_is_collected_once_through_cycles() {
        let mut cat = MemoryCatalog::new();
        cat.define_type(
            "Patient",
            "patients",
            vec![id_col()],
            vec![RelationshipEdge::new("provider", EdgeKind::BelongsTo, "Provider")],
        );
        cat.define_type(
            "Provider",
            "providers",
            vec![id_col()],
            vec![RelationshipEdge::new("patients", EdgeKind::HasMany, "Patient")],
        );
        cat.insert_row("Patient", Identity::Int(1), vec![("id", AttrValue::Int(1))]);
        cat.insert_row("Provider", Identity::Int(2), vec![("id", AttrValue::Int(2))]);
        cat.link("Patient", Identity::Int(1), "provider", "Provider", Identity::Int(2));
        cat.link("Provider", Identity::Int(2), "patients", "Patient", Identity::Int(1));

        let policy = CollectionPolicy::new();
        let seed = cat.handle("Patient", Identity::Int(1)).unwrap();
        let (records, stats) = GraphCollector::new(&cat, &policy).collect(&seed);
        assert_eq!(tags(&records), vec!["Patient#1", "Provider#2"]);
        assert_eq!(stats.for_type("Patient").unwrap().count, 1);
    }
}
