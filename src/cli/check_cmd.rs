//! `ctester-peer check FILE`: validate a transaction script file.

use std::path::Path;

use crate::peer::{ChunkRole, TransactionSet};

/// Parse and validate a TOML script, printing a summary to stdout.
///
/// Returns 0 if the script is valid, 1 otherwise.
pub fn run_check(path: &Path) -> i32 {
    match TransactionSet::from_toml_file(path) {
        Ok(set) => {
            print!("{}", summary(&set));
            0
        }
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            1
        }
    }
}

fn summary(set: &TransactionSet) -> String {
    let mut out = format!(
        "transactions={} chunks={}\n",
        set.transactions.len(),
        set.chunk_count()
    );
    for (t, transaction) in set.transactions.iter().enumerate() {
        let (sent, expected) = transaction
            .chunks
            .iter()
            .fold((0usize, 0usize), |(s, e), c| match c.role {
                ChunkRole::Send => (s + c.len(), e),
                ChunkRole::Expect => (s, e + c.len()),
            });
        out.push_str(&format!(
            "transaction {}: chunks={} send_bytes={} expect_bytes={}\n",
            t,
            transaction.chunks.len(),
            sent,
            expected
        ));
    }
    out
}
