use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use repolens_indexer::{IngestStats, Passage, RagConfig, RepoService};
use repolens_vector_store::EmbeddingMode;
use serde::Serialize;
use std::path::PathBuf;

/// Store location used when neither the config nor `--store-dir` names one
const DEFAULT_STORE_DIR: &str = ".repolens";

#[derive(Parser)]
#[command(name = "repolens")]
#[command(about = "Semantic passage retrieval over a source repository", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./repolens.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted index
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Model directory (overrides REPOLENS_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a repository directory, replacing any previous index
    Ingest(IngestArgs),

    /// Retrieve the passages most relevant to a question
    Ask(AskArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Repository root to index
    path: PathBuf,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AskArgs {
    /// Natural-language question
    question: String,

    /// Number of passages to return (defaults to `top_k` from config)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EmbedMode {
    Onnx,
    Stub,
}

impl From<EmbedMode> for EmbeddingMode {
    fn from(mode: EmbedMode) -> Self {
        match mode {
            EmbedMode::Onnx => Self::Onnx,
            EmbedMode::Stub => Self::Stub,
        }
    }
}

#[derive(Serialize)]
struct IngestOutput<'a> {
    path: String,
    store_dir: Option<String>,
    #[serde(flatten)]
    stats: &'a IngestStats,
}

#[derive(Serialize)]
struct AskOutput<'a> {
    question: &'a str,
    passages: &'a [Passage],
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Ingest(args) => args.json,
        Commands::Ask(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT is extremely noisy
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, config).await?,
        Commands::Ask(args) => run_ask(args, config).await?,
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = RagConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    if let Some(dir) = &cli.store_dir {
        config.store_dir = Some(dir.clone());
    }
    if config.store_dir.is_none() {
        config.store_dir = Some(PathBuf::from(DEFAULT_STORE_DIR));
    }
    if let Some(mode) = cli.embed_mode {
        config.embedding.mode = mode.into();
    }
    if let Some(model) = &cli.embed_model {
        config.embedding.model_id.clone_from(model);
    }
    if let Some(dir) = &cli.model_dir {
        config.embedding.model_dir = Some(dir.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_ingest(args: IngestArgs, config: RagConfig) -> Result<()> {
    let store_dir = config.store_dir.clone();
    let service = RepoService::from_config(config).context("Failed to initialise pipeline")?;

    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("Repository path {} is not accessible", args.path.display()))?;
    let stats = service
        .ingest(&root)
        .await
        .with_context(|| format!("Failed to ingest {}", root.display()))?;

    if args.json {
        let output = IngestOutput {
            path: root.display().to_string(),
            store_dir: store_dir.map(|dir| dir.display().to_string()),
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Ingested {}: {} files, {} chunks ({} skipped) in {} ms",
            root.display(),
            stats.files_loaded,
            stats.chunks_created,
            stats.files_skipped,
            stats.time_ms
        );
    }

    Ok(())
}

async fn run_ask(args: AskArgs, config: RagConfig) -> Result<()> {
    let service = RepoService::from_config(config).context("Failed to initialise pipeline")?;
    service
        .restore()
        .await
        .context("Failed to load the persisted index")?;

    let passages = service.ask(&args.question, args.top_k).await?;

    if args.json {
        let output = AskOutput {
            question: &args.question,
            passages: &passages,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if passages.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    for (rank, passage) in passages.iter().enumerate() {
        println!("[{}] {}", rank + 1, passage.file_path);
        println!("{}", passage.content);
        println!();
    }

    Ok(())
}
