//! Simdex CLI binary.

use std::collections::HashMap;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use simdex::{
    BackendKind, DistanceMetric, HnswParams, IndexConfiguration, IndexManager, IvfParams,
    LshParams, Result, SimdexError,
};

#[derive(Parser)]
#[command(name = "simdex", version, about = "Manage vector similarity index bundles")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty index bundle.
    Init {
        /// Bundle path prefix.
        #[arg(long)]
        bundle: String,
        /// Vector dimension.
        #[arg(long)]
        dimension: usize,
        /// Distance metric (inner_product, euclidean).
        #[arg(long, default_value = "inner_product")]
        metric: String,
        /// Backend kind (flat, ivf, ivf_quantized, hnsw, lsh).
        #[arg(long, default_value = "flat")]
        backend: String,
    },
    /// Add one vector to a bundle.
    Add {
        #[arg(long)]
        bundle: String,
        /// External identifier, unique within the index.
        #[arg(long)]
        id: String,
        /// Comma-separated vector components.
        #[arg(long)]
        vector: String,
        /// Metadata entries as key=value, repeatable.
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
    /// Search a bundle for the most similar vectors.
    Search {
        #[arg(long)]
        bundle: String,
        /// Comma-separated query vector components.
        #[arg(long)]
        vector: String,
        /// Number of results.
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// Remove a vector from a bundle.
    Remove {
        #[arg(long)]
        bundle: String,
        #[arg(long)]
        id: String,
    },
    /// Rebuild the backend, reclaiming removed vectors.
    Rebuild {
        #[arg(long)]
        bundle: String,
    },
    /// Check bundle consistency, optionally repairing it.
    Validate {
        #[arg(long)]
        bundle: String,
        /// Apply repairs instead of only reporting issues.
        #[arg(long)]
        repair: bool,
    },
    /// Print index statistics.
    Stats {
        #[arg(long)]
        bundle: String,
    },
}

fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| SimdexError::invalid_config(format!("bad vector component: {e}")))
        })
        .collect()
}

fn parse_metadata(entries: &[String]) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    for entry in entries {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            SimdexError::invalid_config(format!("metadata entry '{entry}' is not key=value"))
        })?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

fn parse_backend(name: &str) -> Result<BackendKind> {
    match name {
        "flat" => Ok(BackendKind::Flat),
        "ivf" => Ok(BackendKind::Ivf(IvfParams::default())),
        "ivf_quantized" => Ok(BackendKind::IvfQuantized(IvfParams::default())),
        "hnsw" => Ok(BackendKind::Hnsw(HnswParams::default())),
        "lsh" => Ok(BackendKind::Lsh(LshParams::default())),
        other => Err(SimdexError::invalid_config(format!(
            "unknown backend kind: {other}"
        ))),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init {
            bundle,
            dimension,
            metric,
            backend,
        } => {
            let config = IndexConfiguration::new(
                DistanceMetric::parse_str(&metric)?,
                parse_backend(&backend)?,
                dimension,
            );
            let manager = IndexManager::new(config)?;
            manager.save(&bundle)?;
            println!("initialized empty {backend} index at {bundle}");
        }
        Command::Add {
            bundle,
            id,
            vector,
            metadata,
        } => {
            let manager = IndexManager::load(&bundle)?;
            manager.add(&id, &parse_vector(&vector)?, parse_metadata(&metadata)?)?;
            manager.save(&bundle)?;
            println!("added '{id}' ({} vectors live)", manager.len());
        }
        Command::Search { bundle, vector, k } => {
            let manager = IndexManager::load(&bundle)?;
            let results = manager.search(&parse_vector(&vector)?, k)?;
            if results.is_empty() {
                println!("no results");
            }
            for (rank, hit) in results.hits.iter().enumerate() {
                println!("{:>3}. {} score={:.6}", rank + 1, hit.id, hit.score);
            }
        }
        Command::Remove { bundle, id } => {
            let manager = IndexManager::load(&bundle)?;
            manager.remove(&id)?;
            manager.save(&bundle)?;
            println!("removed '{id}' ({} vectors live)", manager.len());
        }
        Command::Rebuild { bundle } => {
            let manager = IndexManager::load(&bundle)?;
            manager.rebuild()?;
            manager.save(&bundle)?;
            println!("rebuilt index ({} vectors live)", manager.len());
        }
        Command::Validate { bundle, repair } => {
            let manager = IndexManager::load(&bundle)?;
            let report = manager.validate();
            if report.is_consistent() {
                println!("index is consistent");
            } else {
                for issue in &report.issues {
                    println!("issue: {issue}");
                }
                if repair {
                    for action in manager.repair() {
                        println!("repair: {action}");
                    }
                    manager.save(&bundle)?;
                }
            }
        }
        Command::Stats { bundle } => {
            let manager = IndexManager::load(&bundle)?;
            let stats = manager.stats();
            println!("backend:            {}", stats.backend_kind);
            println!("live vectors:       {}", stats.live_count);
            println!("tombstones:         {}", stats.tombstone_count);
            println!("pending mutations:  {}", stats.pending_mutations);
            println!("search breadth:     {}", stats.search_breadth);
            println!("total adds:         {}", stats.metrics.total_adds);
            println!("total searches:     {}", stats.metrics.total_searches);
            println!("total errors:       {}", stats.metrics.total_errors);
            println!("avg add latency:    {:.3} ms", stats.metrics.avg_add_latency_ms);
            println!(
                "avg search latency: {:.3} ms",
                stats.metrics.avg_search_latency_ms
            );
            println!(
                "cache hit ratio:    {:.2}",
                stats.metrics.cache_hit_ratio()
            );
            println!(
                "estimated memory:   {} bytes",
                stats.metrics.estimated_memory_bytes
            );
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
