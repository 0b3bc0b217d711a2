//! CLI that runs the research step chain once for an interview
//!
//! Reads an interview as JSON (a file path, or `-` for stdin), runs
//! plan → gather → summarize → optimize → script, and prints the script.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use research::ai::OpenAiGenerator;
use research::{GatherPolicy, Interview, NoCheckpoint, StepChain, TavilyWebSearcher};
use server_core::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "run_interview")]
#[command(about = "Research and script a blog post from an interview file")]
struct Cli {
    /// Interview JSON file, or `-` for stdin
    interview: PathBuf,

    /// Print every intermediate product as JSON instead of the script
    #[arg(long)]
    json: bool,

    /// Keep going when individual searches fail
    #[arg(long)]
    best_effort: bool,

    /// Override OPENAI_MODEL
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,research=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let interview = read_interview(&cli.interview)?;

    let Some(openai_key) = config.openai_api_key.clone() else {
        bail!("OPENAI_API_KEY must be set");
    };
    let Some(tavily_key) = config.tavily_api_key.clone() else {
        bail!("TAVILY_API_KEY must be set");
    };

    let mut chain_config = config.chain_config();
    if cli.best_effort {
        chain_config.gather_policy = GatherPolicy::BestEffort;
    }
    let model = cli.model.unwrap_or_else(|| config.openai_model.clone());

    let chain = StepChain::new(
        Arc::new(TavilyWebSearcher::new(tavily_key)),
        Arc::new(OpenAiGenerator::new(openai_key).with_model(model)),
        &config.limiters()?,
    )?
    .with_config(chain_config);

    let output = chain
        .run(&interview, &NoCheckpoint)
        .await
        .context("Step chain failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.script.body);
        if !output.script.sources.is_empty() {
            println!("\nSources:");
            for (i, source) in output.script.sources.iter().enumerate() {
                println!("[{}] {}", i + 1, source);
            }
        }
    }

    Ok(())
}

fn read_interview(path: &PathBuf) -> Result<Interview> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read interview from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    serde_json::from_str(&raw).context("Interview is not valid JSON")
}
