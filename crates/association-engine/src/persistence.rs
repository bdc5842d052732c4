use crate::snapshot::{ArenaGraph, SnapshotSummary, SnapshotWriter};
use crate::store::GraphStore;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Writes `store` to `path`. The snapshot goes to a sibling temp file that
/// replaces `path` only once it is complete.
pub fn save_snapshot(store: &GraphStore, path: &Path) -> Result<SnapshotSummary> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }

    let tmp = path.with_extension("tmp");
    let file = File::create(&tmp).with_context(|| format!("Failed to create {:?}", tmp))?;
    let summary = SnapshotWriter::for_store(store)
        .write_store(store, BufWriter::new(file))
        .with_context(|| format!("Failed to write snapshot {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to move snapshot into {:?}", path))?;

    info!(path = %path.display(), nodes = summary.nodes, "graph saved");
    Ok(summary)
}

pub fn load_snapshot(path: &Path) -> Result<ArenaGraph> {
    let file = File::open(path).with_context(|| format!("Failed to open snapshot {:?}", path))?;
    let graph = ArenaGraph::load(BufReader::new(file))
        .with_context(|| format!("Failed to load snapshot {:?}", path))?;

    info!(path = %path.display(), "graph loaded");
    Ok(graph)
}
