//! Read-only roster aggregation: every class a teacher is linked to, with its
//! groups, students, ledgers, catalog and task state, in one denormalized graph.

mod assemble;
mod fetch;
mod index;
mod ledger;

pub use assemble::ClassData;

use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("missing caller identity")]
    Unauthenticated,
    #[error("roster read failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

/// Rebuilt from scratch on every call; nothing is cached here.
pub fn load_roster(db_file: &Path, teacher_id: &str) -> Result<Vec<ClassData>, RosterError> {
    if teacher_id.trim().is_empty() {
        return Err(RosterError::Unauthenticated);
    }
    let started = Instant::now();
    let rows = fetch::fetch_all(db_file, teacher_id)?;
    let classes = assemble::assemble(&rows);
    tracing::info!(
        teacher_id,
        classes = classes.len(),
        students = rows.students.len(),
        points = rows.points.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "roster assembled"
    );
    Ok(classes)
}

/// SHA-256 over the serialized roster, hex encoded.
pub fn fingerprint(serialized: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    format!("{:x}", hasher.finalize())
}
