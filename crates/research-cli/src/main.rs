//! Company research CLI
//!
//! # Usage
//!
//! ```bash
//! export SEC_USER_AGENT="Your Name your.email@example.com"
//! export GOOGLE_API_KEY="..."
//! export TAVILY_API_KEY="..."   # optional, DuckDuckGo is used without it
//!
//! # Resolve interactively
//! research "Apple"
//!
//! # Skip identity resolution
//! research "Apple" --ticker AAPL --cik 320193
//!
//! # Answer the selection prompt up front
//! research "Apple" --select 1 --output-dir reports
//! ```

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::Parser;
use research_agent::{HumanResolver, ResearchConfig, ResearchPipeline, Services};
use research_core::{CompanyMatch, ResearchState};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Research a public company from SEC filings, the web and social sentiment", long_about = None)]
struct Args {
    /// Company name to research
    company: String,

    /// Ticker of an already known registrant (requires --cik)
    #[arg(long, requires = "cik")]
    ticker: Option<String>,

    /// CIK of an already known registrant (requires --ticker)
    #[arg(long, requires = "ticker")]
    cik: Option<String>,

    /// Registrant title when pre-resolving; defaults to the company name
    #[arg(long)]
    title: Option<String>,

    /// Candidate number to pick, or "none", instead of prompting
    #[arg(long)]
    select: Option<String>,

    /// Directory for the Markdown and JSON reports
    #[arg(long, env = "REPORTS_DIR")]
    output_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Prompts on the terminal for a candidate number
struct StdinResolver;

#[async_trait]
impl HumanResolver for StdinResolver {
    async fn select(&self, prompt: &str, _options: &[CompanyMatch]) -> Option<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            println!("\n{prompt}");
            print!("> ");
            io::stdout().flush().ok()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let answer = line.trim().to_string();
            (!answer.is_empty()).then_some(answer)
        })
        .await
        .ok()
        .flatten()
    }
}

fn initial_state(args: &Args) -> anyhow::Result<ResearchState> {
    if args.company.trim().is_empty() {
        bail!("company name must not be empty");
    }

    let state = match (&args.ticker, &args.cik) {
        (Some(ticker), Some(cik)) => {
            let title = args.title.clone().unwrap_or_else(|| args.company.clone());
            ResearchState::with_selected_company(CompanyMatch::new(title, ticker, cik))
                .with_context(|| format!("--cik must be numeric, got '{cik}'"))?
        }
        _ => ResearchState::new(args.company.trim()),
    };

    Ok(match &args.select {
        Some(answer) => state.with_human_response(answer.clone()),
        None => state,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.json_logs {
        research_utils::init_tracing_json();
    } else {
        research_utils::init_tracing();
    }

    let mut config = ResearchConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = &args.output_dir {
        config.reports_dir.clone_from(dir);
    }

    let services = Services::live(config)?.with_resolver(Arc::new(StdinResolver));
    let pipeline = ResearchPipeline::new(Arc::new(services))?;
    let state = initial_state(&args)?;

    info!("Starting research for '{}'", state.company_name);

    match pipeline.run(state).await {
        Ok(outcome) => {
            let state = outcome.state;
            println!("\n{}", state.progress_summary());
            match state.found() {
                Some(found) => println!("Company: {found}"),
                None => println!("No company was resolved; nothing to report."),
            }
            if let Some(path) = &state.report_path {
                println!("Markdown report: {path}");
            }
            if let Some(path) = &state.json_report_path {
                println!("JSON report: {path}");
            }
            if let Some(error) = &state.error_message {
                println!("Warning: {error}");
            }
            if let Some(seconds) = state.duration() {
                println!("Finished in {seconds:.1}s");
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("\nStatus: {}", failure.state.status);
            eprintln!("Failed at: {}", failure.state.current_node);
            if let Some(error) = &failure.state.error_message {
                eprintln!("Error: {error}");
            }
            Err(anyhow::Error::new(failure.error).context("research run failed"))
        }
    }
}
