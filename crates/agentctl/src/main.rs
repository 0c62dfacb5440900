//! Agent Control - CLI for the guarded query agent
//!
//! One-shot mode answers a single query; without a query it starts an
//! interactive loop. Routing happens before any model call, so plain
//! arithmetic works even with no Ollama or SerpAPI available.

mod output;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use agent_common::{Agent, AgentConfig};

#[derive(Parser)]
#[command(name = "agentctl")]
#[command(about = "Guarded query agent - deterministic routing before any LLM call", long_about = None)]
#[command(version)]
struct Cli {
    /// Question to answer; omit to start the interactive loop
    query: Option<String>,

    /// Path to the TOML config file
    #[arg(long, default_value = "agent.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AgentConfig::load(&cli.config)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    // The environment wins over the config file for the API key, so the
    // key never has to be written to disk.
    if let Ok(key) = std::env::var("SERPAPI_API_KEY") {
        if !key.is_empty() {
            config.search.serpapi_key = key;
        }
    }
    if !config.search_enabled() {
        eprintln!(
            "{}",
            "warning: no SerpAPI key configured; search-backed queries will fail".yellow()
        );
    }

    let agent = Agent::new(&config);

    match cli.query {
        Some(query) => {
            if !answer_one(&agent, &query).await {
                std::process::exit(1);
            }
            Ok(())
        }
        None => repl(&agent).await,
    }
}

async fn answer_one(agent: &Agent, query: &str) -> bool {
    match agent.run(query).await {
        Ok(answer) => {
            output::display_answer(&answer);
            true
        }
        Err(e) => {
            output::display_error(&e);
            false
        }
    }
}

async fn repl(agent: &Agent) -> Result<()> {
    println!(
        "{}",
        "agentctl interactive mode (type 'exit' or 'quit' to leave)".cyan()
    );
    let stdin = io::stdin();
    loop {
        print!("{} ", ">".bright_green());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        answer_one(agent, line).await;
    }
    Ok(())
}
