//! Transactional replay of parsed dump blocks against a live connection.
//!
//! The executor is a trait seam so replay logic stays testable without a
//! database: production code wires in a real connection, tests record the
//! statements they receive. Referential-integrity enforcement is relaxed for
//! the duration of the transaction (`session_replication_role = replica`) so
//! block order only has to satisfy the dependency ordering the serializer
//! already produced, not every trigger and deferred constraint.

use crate::error::{Error, Result};
use crate::parser::DumpBlock;

/// Connection seam for replaying statements.
pub trait SqlExecutor {
    fn execute(&mut self, sql: &str) -> anyhow::Result<()>;
}

/// Replay blocks inside one transaction.
///
/// On any statement failure the transaction is rolled back and the failing
/// statement is reported. The replication-role reset runs inside the
/// transaction either way, so the session never leaks replica mode.
pub fn replay(blocks: &[DumpBlock], executor: &mut dyn SqlExecutor) -> Result<()> {
    run(executor, "BEGIN;")?;

    let outcome = replay_inner(blocks, executor);

    match outcome {
        Ok(()) => run(executor, "COMMIT;"),
        Err(err) => {
            // Rollback failures are secondary to the original fault.
            let _ = executor.execute("ROLLBACK;");
            Err(err)
        }
    }
}

fn replay_inner(blocks: &[DumpBlock], executor: &mut dyn SqlExecutor) -> Result<()> {
    run(executor, "SET session_replication_role = replica;")?;

    let mut result = Ok(());
    for block in blocks {
        if let Err(err) = run(executor, &block.text) {
            result = Err(err);
            break;
        }
    }

    // Restore the role even when a block failed, before rollback/commit.
    let restore = run(executor, "SET session_replication_role = DEFAULT;");
    result.and(restore)
}

fn run(executor: &mut dyn SqlExecutor, sql: &str) -> Result<()> {
    executor.execute(sql).map_err(|err| Error::Statement {
        statement: sql.to_string(),
        reason: format!("{err:#}"),
    })
}
