//! End-to-end fixture pipeline: collect, anonymize, serialize, write, replay.
//!
//! `FixtureBuilder` is the top-level entry point most callers want. It wires
//! the collector, anonymizer, and serializer together for dump creation, and
//! the parser and replayer together for loading a dump back into a database.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::anonymizer::Anonymizer;
use crate::catalog::{EntityHandle, SchemaCatalog};
use crate::collector::{CollectionStats, GraphCollector};
use crate::error::{Error, Result};
use crate::parser;
use crate::policy::CollectionPolicy;
use crate::replayer::{self, SqlExecutor};
use crate::serializer::StatementSerializer;

/// Result of building one dump file.
#[derive(Debug)]
pub struct DumpOutcome {
    pub path: PathBuf,
    pub stats: CollectionStats,
    /// Non-fatal warnings from collection and anonymization.
    pub warnings: Vec<String>,
}

pub struct FixtureBuilder<'a, C: SchemaCatalog + ?Sized> {
    catalog: &'a C,
    dump_dir: PathBuf,
}

impl<'a, C: SchemaCatalog + ?Sized> FixtureBuilder<'a, C> {
    pub fn new(catalog: &'a C, dump_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            dump_dir: dump_dir.into(),
        }
    }

    pub fn dump_path(&self, name: &str) -> PathBuf {
        self.dump_dir.join(format!("{name}.sql"))
    }

    /// Collect the subgraph reachable from `seed` under `policy` and write
    /// it as an idempotent SQL dump.
    ///
    /// The file lands at `<dump_dir>/<name>.sql`; when `name` is `None` a
    /// slug is derived from the seed. The write goes through a temp file in
    /// the same directory, so a dump is never observable half-written.
    pub fn build_dump(
        &self,
        policy: &CollectionPolicy,
        seed: &EntityHandle,
        name: Option<&str>,
    ) -> Result<DumpOutcome> {
        let collector = GraphCollector::new(self.catalog, policy);
        let (mut records, stats) = collector.collect(seed);
        let mut warnings = stats.warnings.clone();

        if policy.has_anonymization_rules() {
            let anonymizer = Anonymizer::new(&policy.anonymization, policy.on_anonymize_error);
            warnings.extend(anonymizer.apply(&mut records)?);
        }

        let serializer = StatementSerializer::new(self.catalog, policy);
        let sql = serializer.serialize(&records)?;

        let name = match name {
            Some(n) => n.to_string(),
            None => seed_slug(seed),
        };
        let path = self.dump_path(&name);
        self.write_atomic(&path, &sql)?;

        Ok(DumpOutcome {
            path,
            stats,
            warnings,
        })
    }

    /// Parse a previously written dump and replay it through `executor`.
    pub fn load_dump(&self, name: &str, executor: &mut dyn SqlExecutor) -> Result<()> {
        let path = self.dump_path(name);
        let text = fs::read_to_string(&path).map_err(|err| Error::DumpFile {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let blocks = parser::parse(&text);
        replayer::replay(&blocks, executor)
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let to_fault = |err: &dyn std::fmt::Display| Error::DumpFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        fs::create_dir_all(&self.dump_dir).map_err(|e| to_fault(&e))?;
        let mut tmp = NamedTempFile::new_in(&self.dump_dir).map_err(|e| to_fault(&e))?;
        tmp.write_all(contents.as_bytes()).map_err(|e| to_fault(&e))?;
        tmp.persist(path).map_err(|e| to_fault(&e))?;
        Ok(())
    }
}

/// Filesystem-safe default dump name: `Visit#42` becomes `visit_42`.
fn seed_slug(seed: &EntityHandle) -> String {
    let raw = format!("{}_{}", seed.entity_type(), seed.identity());
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalog;
    use crate::catalog::{AttrValue, ColumnInfo, EdgeKind, Identity, RelationshipEdge};

    fn sample_catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.define_type(
            "Parent",
            "parents",
            vec![
                ColumnInfo::new("id", "integer"),
                ColumnInfo::new("name", "character varying"),
            ],
            vec![],
        );
        catalog.define_type(
            "Child",
            "children",
            vec![
                ColumnInfo::new("id", "integer"),
                ColumnInfo::new("parent_id", "integer"),
            ],
            vec![RelationshipEdge::new("parent", EdgeKind::BelongsTo, "Parent")],
        );
        catalog.insert_row(
            "Parent",
            Identity::Int(1),
            vec![("id", AttrValue::Int(1)), ("name", AttrValue::from("p"))],
        );
        catalog.insert_row(
            "Child",
            Identity::Int(7),
            vec![("id", AttrValue::Int(7)), ("parent_id", AttrValue::Int(1))],
        );
        catalog.link("Child", Identity::Int(7), "parent", "Parent", Identity::Int(1));
        catalog
    }

    #[test]
    fn build_dump_writes_ordered_idempotent_sql() {
        let catalog = sample_catalog();
        let dir = tempfile::tempdir().unwrap();
        let builder = FixtureBuilder::new(&catalog, dir.path());
        let policy = CollectionPolicy::new();
        let seed = catalog.handle("Child", Identity::Int(7)).unwrap();

        let outcome = builder.build_dump(&policy, &seed, Some("child_case")).unwrap();
        assert_eq!(outcome.path, dir.path().join("child_case.sql"));
        assert_eq!(outcome.stats.total_records(), 2);

        let sql = fs::read_to_string(&outcome.path).unwrap();
        let parents = sql.find("INSERT INTO parents").unwrap();
        let children = sql.find("INSERT INTO children").unwrap();
        assert!(parents < children);
        assert!(sql.contains("ON CONFLICT (id) DO NOTHING;"));
    }

    #[test]
    fn default_name_is_a_slug_of_the_seed() {
        assert_eq!(
            seed_slug(&EntityHandle::new("VisitNote", 42.into(), Default::default())),
            "visitnote_42"
        );
        assert_eq!(
            seed_slug(&EntityHandle::new("User", "ab-3f".into(), Default::default())),
            "user_ab_3f"
        );
    }

    #[test]
    fn load_dump_missing_file_is_a_dump_file_fault() {
        let catalog = sample_catalog();
        let dir = tempfile::tempdir().unwrap();
        let builder = FixtureBuilder::new(&catalog, dir.path());

        struct Panicking;
        impl SqlExecutor for Panicking {
            fn execute(&mut self, _sql: &str) -> anyhow::Result<()> {
                panic!("must not execute anything");
            }
        }

        let err = builder.load_dump("nope", &mut Panicking).unwrap_err();
        match err {
            Error::DumpFile { path, .. } => {
                assert!(path.ends_with("nope.sql"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
