use crate::parser::{self, BlockKind};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

pub fn run(file: PathBuf) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("input file does not exist: {}", file.display());
    }

    let file_size = std::fs::metadata(&file)?.len();
    let file_size_kb = file_size as f64 / 1024.0;

    println!("Inspecting dump: {} ({:.1} KB)", file.display(), file_size_kb);
    println!();

    let start_time = Instant::now();
    let text = std::fs::read_to_string(&file)?;
    let blocks = parser::parse(&text);
    let elapsed = start_time.elapsed();

    let mut inserts = 0usize;
    let mut copies = 0usize;
    let mut others = 0usize;
    let mut per_table: BTreeMap<String, usize> = BTreeMap::new();

    for block in &blocks {
        match block.kind {
            BlockKind::Insert => {
                inserts += 1;
                if let Some(table) = &block.table {
                    *per_table.entry(table.clone()).or_default() += 1;
                }
            }
            BlockKind::Copy => copies += 1,
            BlockKind::Other => others += 1,
        }
    }

    println!("✓ Parsed {} blocks in {:.3?}\n", blocks.len(), elapsed);
    println!("  Inserts: {inserts}");
    println!("  Copy blocks: {copies}");
    println!("  Other statements: {others}");

    if !per_table.is_empty() {
        println!();
        println!("Rows per table:");
        for (table, count) in &per_table {
            println!("  {table}: {count}");
        }
    }

    Ok(())
}
