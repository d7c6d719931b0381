//! Cognitive Weaver CLI - annotate Markdown vaults with inferred relationships

mod fs_events;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weaver_core::config::Config;
use weaver_core::oracle;
use weaver_core::pipeline::{BatchReport, ConceptStats, Pipeline, WatchScheduler};
use weaver_core::storage::GraphStore;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(author, version, about = "Discover and annotate relationships between Markdown notes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the rule-based oracle, no network calls
    #[arg(long, global = true)]
    offline: bool,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a vault and annotate links as notes change
    Start {
        /// Vault directory
        vault: PathBuf,
        /// Process the whole vault before watching
        #[arg(long)]
        batch: bool,
        /// Exit after the batch pass instead of watching
        #[arg(long, requires = "batch")]
        no_watch: bool,
    },

    /// Annotate every link in a folder
    ProcessFolder {
        /// Folder to process
        path: PathBuf,
    },

    /// Annotate every link in the folders listed under scan.folders_to_scan
    ProcessConfigFolders,

    /// Link keywords repeated across a folder
    ProcessKeywords {
        /// Folder to process
        path: PathBuf,
    },

    /// Rebuild the knowledge graph from markers already in a vault
    RebuildGraph {
        /// Vault directory
        vault: PathBuf,
    },

    /// Put a document's last backup back in place
    Restore {
        /// Annotated document
        file: PathBuf,
    },

    /// Inspect the knowledge graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum GraphAction {
    /// Show node and edge counts
    Show { vault: PathBuf },
    /// Print the graph as JSON, or write it to a file
    Export {
        vault: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove every node and edge
    Clear { vault: PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init,
    /// Show all configuration values
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.quiet { "weaver=warn" } else { "weaver=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing documents in progress");
            ctrl_c.cancel();
        }
    });

    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, cli.config.as_deref(), out),
        Commands::Version => {
            println!("weaver {}", weaver_core::VERSION);
            Ok(())
        }
        command => {
            let mut config = Config::load(cli.config.as_deref())?;
            if cli.offline {
                config.llm.offline = true;
            }
            config.validate()?;
            run(command, &config, &cancel, out).await
        }
    }
}

async fn run(command: Commands, config: &Config, cancel: &CancellationToken, out: Output) -> anyhow::Result<()> {
    match command {
        Commands::Start {
            vault,
            batch,
            no_watch,
        } => cmd_start(config, &vault, batch, no_watch, cancel, out).await,

        Commands::ProcessFolder { path } => {
            let pipeline = build_pipeline(config, &path, cancel).await?;
            let report = pipeline.process_folder(&path, cancel).await?;
            out.batch(&report, None)
        }

        Commands::ProcessConfigFolders => {
            if config.scan.folders_to_scan.is_empty() {
                return Err(anyhow::anyhow!(
                    "No folders configured. Set them with `weaver config set scan.folders_to_scan <a>,<b>`."
                ));
            }
            let root = std::env::current_dir()?;
            let pipeline = build_pipeline(config, &root, cancel).await?;
            let report = pipeline
                .process_folders(&config.scan.folders_to_scan, cancel)
                .await?;
            out.batch(&report, None)
        }

        Commands::ProcessKeywords { path } => {
            let pipeline = build_pipeline(config, &path, cancel).await?;
            let (report, stats) = pipeline.process_keywords(&path, cancel).await?;
            out.batch(&report, Some(stats))
        }

        Commands::RebuildGraph { vault } => {
            let pipeline = build_pipeline(config, &vault, cancel).await?;
            let report = pipeline.rebuild_graph(&vault, cancel).await?;
            out.batch(&report, None)
        }

        Commands::Restore { file } => {
            let annotator = weaver_core::annotate::Annotator::from_config(config);
            annotator.restore(&file).await?;
            if !out.quiet {
                println!("Restored {}", file.display());
            }
            Ok(())
        }

        Commands::Graph { action } => cmd_graph(action, config, out).await,

        Commands::Config { .. } | Commands::Version => Ok(()),
    }
}

async fn build_pipeline(config: &Config, root: &Path, cancel: &CancellationToken) -> anyhow::Result<Pipeline> {
    let oracle = oracle::from_config(config, Some(cancel.clone()))?;
    let graph = GraphStore::open(config.graph.resolve_path(root)).await?;
    Ok(Pipeline::new(config, oracle, graph))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_start(
    config: &Config,
    vault: &Path,
    batch: bool,
    no_watch: bool,
    cancel: &CancellationToken,
    out: Output,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, vault, cancel).await?;

    if batch {
        let report = pipeline.process_folder(vault, cancel).await?;
        out.batch(&report, None)?;
        if no_watch || cancel.is_cancelled() {
            return Ok(());
        }
    }

    // Fail on a bad vault before starting the watcher
    pipeline.scan(vault).await?;

    let (tx, rx) = WatchScheduler::channel(config.pipeline.event_queue_capacity);
    let _watcher = fs_events::watch(vault, tx)?;
    if !out.quiet && out.format == OutputFormat::Text {
        println!("Watching {} (Ctrl-C to stop)", vault.display());
    }
    info!(vault = %vault.display(), "Watcher started");

    let scheduler = WatchScheduler::new(pipeline, config.pipeline.debounce());
    let report = scheduler.run(rx, cancel.clone()).await;
    out.batch(&report, None)
}

async fn cmd_graph(action: GraphAction, config: &Config, out: Output) -> anyhow::Result<()> {
    match action {
        GraphAction::Show { vault } => {
            let store = GraphStore::open(config.graph.resolve_path(&vault)).await?;
            let stats = store.stats().await;
            match out.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("Knowledge graph: {}", config.graph.resolve_path(&vault).display());
                    println!("  Nodes: {}", stats.node_count);
                    println!("  Edges: {}", stats.edge_count);
                    for (label, count) in stats.by_relationship.iter().filter(|(_, c)| **c > 0) {
                        println!("    {}: {}", label, count);
                    }
                }
            }
        }
        GraphAction::Export { vault, output } => {
            let store = GraphStore::open(config.graph.resolve_path(&vault)).await?;
            let json = store.to_json().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, format!("{}\n", json))?;
                    if !out.quiet {
                        println!("Exported graph to {}", path.display());
                    }
                }
                None => println!("{}", json),
            }
        }
        GraphAction::Clear { vault } => {
            let store = GraphStore::open(config.graph.resolve_path(&vault)).await?;
            store.clear().await;
            store.checkpoint().await?;
            if !out.quiet {
                println!("Knowledge graph cleared.");
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, path: Option<&Path>, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let target = match path {
                Some(path) => path.to_path_buf(),
                None => Config::config_path()?,
            };
            if Config::write_default(&target)? {
                if !out.quiet {
                    println!("Created {}", target.display());
                }
            } else if !out.quiet {
                println!("Config already exists at {}", target.display());
            }
        }
        ConfigAction::Show => {
            let config = Config::load(path)?;
            let items = config.list()?;
            match out.format {
                OutputFormat::Json => {
                    let map: serde_json::Map<String, serde_json::Value> = items
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
                OutputFormat::Text => {
                    for (key, value) in items {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load(path)?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(&key, &value)?;
            let saved = config.save(path)?;
            if !out.quiet {
                println!("Set {} = {} ({})", key, value, saved.display());
            }
        }
        ConfigAction::Path => {
            let target = match path {
                Some(path) => path.to_path_buf(),
                None => Config::config_path()?,
            };
            println!("{}", target.display());
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn batch(&self, report: &BatchReport, concepts: Option<ConceptStats>) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            let value = serde_json::json!({
                "report": report,
                "concepts": concepts,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        for failure in report.failures() {
            if let Some(error) = &failure.error {
                eprintln!("[{}] {}: {}", error.code, failure.path.display(), error.message);
            }
        }
        if let Some(error) = &report.graph_error {
            eprintln!("[{}] {}", error.code, error.message);
        }
        if self.quiet {
            return Ok(());
        }

        println!("Processed {} documents", report.files_processed());
        println!("  Written: {}", report.files_written());
        println!("  Markers added: {}", report.markers_added());
        if report.keywords_linked() > 0 || concepts.is_some() {
            println!("  Keywords linked: {}", report.keywords_linked());
        }
        if let Some(stats) = concepts {
            println!(
                "  Concept groups: {} ({} confirmed)",
                stats.groups, stats.confirmed
            );
        }
        println!("  Graph edges added: {}", report.edges_added());
        if report.fallbacks() > 0 {
            println!("  Fallback verdicts: {}", report.fallbacks());
        }
        if report.files_failed() > 0 {
            println!("  Failed: {}", report.files_failed());
        }
        if report.cancelled {
            println!("  Stopped early (cancelled)");
        }
        Ok(())
    }
}
