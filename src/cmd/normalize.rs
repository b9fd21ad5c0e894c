use crate::parser::{self, BlockKind};
use std::io::Write;
use std::path::PathBuf;

/// Re-tokenize a dump and rewrite it in canonical form: one insert per
/// line, comments and blank lines dropped, copy blocks untouched.
pub fn run(file: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("input file does not exist: {}", file.display());
    }

    let text = std::fs::read_to_string(&file)?;
    let blocks = parser::parse(&text);

    let mut out = String::new();
    for block in &blocks {
        out.push_str(&block.text);
        out.push('\n');
    }

    match output {
        Some(path) => {
            std::fs::write(&path, out)?;
            let inserts = blocks.iter().filter(|b| b.kind == BlockKind::Insert).count();
            eprintln!(
                "Wrote {} blocks ({} inserts) to {}",
                blocks.len(),
                inserts,
                path.display()
            );
        }
        None => {
            std::io::stdout().write_all(out.as_bytes())?;
        }
    }

    Ok(())
}
