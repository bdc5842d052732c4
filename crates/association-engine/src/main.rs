use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use synapse_assoc::ingest::IngestionEngine;
use synapse_assoc::persistence::{load_snapshot, save_snapshot};
use synapse_assoc::{ActivationQueryEngine, GraphStore, Query, QueryTunables, Scope, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  synapse-assoc train <snapshot> <file.csv|file.tsv>...
  synapse-assoc query <snapshot> <name=category:term[@weight][,...]>...";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.split_first() {
        Some((cmd, rest)) if cmd == "train" => train(rest).await,
        Some((cmd, rest)) if cmd == "query" => query(rest).await,
        _ => bail!("{}", USAGE),
    }
}

async fn train(args: &[String]) -> Result<()> {
    let [snapshot, inputs @ ..] = args else {
        bail!("{}", USAGE);
    };
    if inputs.is_empty() {
        bail!("{}", USAGE);
    }

    let config = StoreConfig::from_env();
    info!(?config, "training association graph");
    let store = Arc::new(GraphStore::new(config));
    let engine = IngestionEngine::new(store.clone());
    let trained = engine
        .ingest_files(inputs.iter().map(PathBuf::from).collect())
        .await?;
    info!(associations = trained, nodes = store.count(), "training finished");

    let path = PathBuf::from(snapshot);
    let summary = tokio::task::spawn_blocking(move || save_snapshot(&store, &path)).await??;
    println!("{}", serde_json::json!({
        "associations": trained,
        "nodes": summary.nodes,
        "edges": summary.edges,
        "bytes": summary.bytes,
    }));
    Ok(())
}

async fn query(args: &[String]) -> Result<()> {
    let [snapshot, specs @ ..] = args else {
        bail!("{}", USAGE);
    };
    let scopes = specs
        .iter()
        .map(|spec| spec.parse::<Scope>().with_context(|| format!("bad scope {:?}", spec)))
        .collect::<Result<Vec<_>>>()?;
    let query = Query::new(scopes, QueryTunables::from_env())?;

    let path = PathBuf::from(snapshot);
    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let graph = load_snapshot(&path)?;
        Ok(ActivationQueryEngine::new(&graph).execute(&query))
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
