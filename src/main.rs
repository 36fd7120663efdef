use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use tracing_subscriber::EnvFilter;

use cverag::config::Settings;
use cverag::embedder;
use cverag::generator::HttpGenerator;
use cverag::pipeline::build_from_corpus;
use cverag::retrieval::Retriever;

#[derive(Parser)]
#[command(name = "cverag")]
#[command(version = "0.1")]
#[command(about = "Retrieval-augmented answers over CVE reports", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk and embed the corpus, then write the index and metadata files
    Build,
    /// Print the closest chunks for a query as JSON
    Search {
        /// Query text; read from stdin when omitted
        query: Option<String>,
        #[arg(short)]
        k: Option<usize>,
    },
    /// Retrieve context and ask the generation service
    Ask {
        /// Question text; read from stdin when omitted
        query: Option<String>,
        #[arg(short)]
        k: Option<usize>,
    },
    Config,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn read_query(query: Option<String>) -> Result<String> {
    let query = match query {
        Some(query) => query,
        None => {
            let mut input = String::new();
            io::stdin().lock().read_line(&mut input)?;
            input
        }
    };
    let query = query.trim().to_string();
    if query.is_empty() {
        anyhow::bail!("Query cannot be empty");
    }
    Ok(query)
}

fn loaded_retriever(settings: &Settings) -> Result<Retriever> {
    let mut retriever = Retriever::from_settings(settings)?;
    retriever
        .load(&settings.index_path, &settings.metadata_path)
        .context("Failed to load index; run `cverag build` first")?;
    Ok(retriever)
}

fn build_command(settings: &Settings) -> Result<()> {
    let embedder = embedder::from_settings(settings)?;
    let summary = build_from_corpus(settings, embedder.as_ref())
        .with_context(|| format!("Failed to build index from '{}'", settings.corpus_path.display()))?;

    println!(
        "Indexed {} chunks from {} records ({} lines skipped), dimension {}",
        summary.chunks, summary.records, summary.rejected_lines, summary.dimension
    );
    println!("Index saved to {}", settings.index_path.display());
    println!("Metadata saved to {}", settings.metadata_path.display());
    Ok(())
}

fn search_command(settings: &Settings, query: Option<String>, k: Option<usize>) -> Result<()> {
    let query = read_query(query)?;
    let k = k.unwrap_or(settings.top_k);
    let retriever = loaded_retriever(settings)?;
    let results = retriever.retrieve(&query, k)?;

    let output = serde_json::json!({
        "query": query,
        "results": results,
        "actual_results_count": results.len(),
        "requested_results_count": k
    });

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn ask_command(settings: &Settings, query: Option<String>, k: Option<usize>) -> Result<()> {
    let query = read_query(query)?;
    let k = k.unwrap_or(settings.top_k);
    let retriever = loaded_retriever(settings)?;
    let generator = HttpGenerator::from_settings(settings)?;

    let answer = retriever.answer(&query, k, &generator)?;

    println!("Answer:");
    println!("{}", answer.text);
    println!("Sources used:");
    for source in &answer.sources {
        println!("• {}", source);
    }
    Ok(())
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);
    let settings = Settings::load()?;

    match args.command {
        Commands::Build => build_command(&settings)?,
        Commands::Search { query, k } => search_command(&settings, query, k)?,
        Commands::Ask { query, k } => ask_command(&settings, query, k)?,
        Commands::Config => config_command(&settings)?,
    }
    Ok(())
}
