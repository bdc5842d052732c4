use crate::store::GraphStore;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

pub mod extractor;

use extractor::{Association, CsvExtractor, Extractor};

/// Feeds association files into a shared [`GraphStore`].
#[derive(Clone)]
pub struct IngestionEngine {
    store: Arc<GraphStore>,
    symmetric: bool,
}

impl IngestionEngine {
    /// Trains both directions of every association by default.
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            symmetric: true,
        }
    }

    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Trains a batch in parallel; returns how many associations were applied.
    pub fn train_all(&self, associations: &[Association]) -> usize {
        associations.par_iter().for_each(|a| {
            if self.symmetric {
                self.store.train_symmetric(&a.source, &a.target, a.weight);
            } else {
                self.store.train(&a.source, &a.target, a.weight);
            }
        });
        associations.len()
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let extractor = match extension {
            "csv" => CsvExtractor::new(),
            "tsv" => CsvExtractor::tab_separated(),
            _ => anyhow::bail!("Unsupported file type: {}", extension),
        };

        let engine = self.clone();
        let added = tokio::task::spawn_blocking(move || -> Result<usize> {
            let result = extractor.extract(&content)?;
            Ok(engine.train_all(&result.associations))
        })
        .await??;

        info!(path = %path.display(), associations = added, "ingested association file");
        Ok(added)
    }

    /// Ingests several files concurrently. Fails on the first bad file.
    pub async fn ingest_files(&self, paths: Vec<PathBuf>) -> Result<usize> {
        let mut tasks = JoinSet::new();
        for path in paths {
            let engine = self.clone();
            tasks.spawn(async move { engine.ingest_file(&path).await });
        }

        let mut total = 0;
        while let Some(joined) = tasks.join_next().await {
            total += joined??;
        }
        Ok(total)
    }
}
