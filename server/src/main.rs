use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faqbot_matcher::{EmbeddingProviderType, MatchEngine, MatcherConfig};
use faqbot_server::chat::run_chat;
use faqbot_server::http::{AppState, serve, shutdown_on};
use faqbot_server::reply_text;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Answer questions from an FAQ catalog by semantic similarity.
#[derive(Parser)]
#[command(name = "faqbot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Answer questions from an FAQ catalog by semantic similarity", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the FAQ JSON file
    #[arg(long = "faq", global = true)]
    catalog: Option<PathBuf>,

    /// Similarity threshold in [-1, 1]
    #[arg(long, global = true, allow_negative_numbers = true)]
    threshold: Option<f32>,

    /// Embedding provider: local, openai or hashing
    #[arg(long, global = true)]
    provider: Option<EmbeddingProviderType>,

    /// Embedding model name (a Hugging Face id or model directory for local)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Show matched questions and similarity scores
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat interactively on the terminal (default)
    Chat,

    /// Serve answers over HTTP
    Serve {
        /// Address to listen on (defaults to 0.0.0.0:$PORT or the config value)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Answer a single question and exit
    Ask {
        /// The question
        #[arg(required = true)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&cli).await?;

    let started = Instant::now();
    let engine = MatchEngine::from_config(&config)
        .await
        .with_context(|| {
            format!(
                "failed to build the FAQ index from {}",
                config.catalog_path.display()
            )
        })?;
    info!(
        "Index ready with {} FAQs in {:.2}s",
        engine.len(),
        started.elapsed().as_secs_f32()
    );

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let stdin = BufReader::new(tokio::io::stdin());
            run_chat(&engine, config.verbose, stdin, tokio::io::stdout()).await?;
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            let state = AppState::new(Arc::new(engine))
                .with_verbose(config.verbose)
                .with_request_timeout(Duration::from_secs(config.server.request_timeout_secs));
            serve(listener, state, shutdown_on(tokio::signal::ctrl_c())).await?;
        }
        Command::Ask { question } => {
            let result = engine.answer(&question.join(" ")).await?;
            if config.verbose {
                eprintln!(
                    "matched #{} '{}' ({:.4})",
                    result.matched_index, result.matched_question, result.similarity
                );
            }
            println!("{}", reply_text(&result));
        }
    }

    Ok(())
}

/// Layer the config file, `PORT`, and command-line flags, in that order.
async fn resolve_config(cli: &Cli) -> Result<MatcherConfig> {
    let mut config = match &cli.config {
        Some(path) => MatcherConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MatcherConfig::default(),
    };

    if let Ok(port) = std::env::var("PORT") {
        config.server.bind = format!("0.0.0.0:{port}");
    }
    if let Some(path) = &cli.catalog {
        config.catalog_path = path.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(provider) = cli.provider {
        config.embedding.provider = provider;
    }
    if let Some(model) = &cli.model {
        config.embedding.model = Some(model.clone());
    }
    config.verbose |= cli.debug;

    config.validate()?;
    Ok(config)
}
