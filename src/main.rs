//! Command-line entry point.
//!
//! Thin shell over the library: parse arguments, assemble the runtime
//! configuration, drive one analysis to completion, print the memo to
//! stdout. Failures print a structured descriptor to stderr and exit
//! non-zero.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use dealdesk::{AnalysisRequest, Coordinator, HttpReasoner, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "dealdesk",
    version,
    about = "Generate a first-pass investment memo for a startup or idea"
)]
struct Cli {
    /// Official name of the startup.
    #[arg(long)]
    name: Option<String>,

    /// Official website URL of the startup.
    #[arg(long)]
    website: Option<String>,

    /// Free-text idea description (use when no named company exists yet).
    #[arg(long)]
    idea: Option<String>,

    /// Known competitor, repeatable.
    #[arg(long = "competitor", value_name = "NAME")]
    competitors: Vec<String>,

    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key for the reasoning-model endpoint.
    #[arg(long, env = "DEALDESK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match RuntimeConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{:#}", e);
                return ExitCode::FAILURE;
            }
        },
        None => RuntimeConfig::default(),
    };
    if cli.api_key.is_some() {
        config.api_key = cli.api_key.clone();
    }

    let mut request = AnalysisRequest {
        subject_name: cli.name,
        subject_website: cli.website,
        raw_idea: cli.idea,
        competitor_hints: cli.competitors,
    };
    // Normalize blank flags to absent so validation reports them cleanly.
    request.subject_name = request.subject_name.filter(|s| !s.trim().is_empty());
    request.raw_idea = request.raw_idea.filter(|s| !s.trim().is_empty());

    let reasoner = HttpReasoner::new(
        config.api_endpoint.clone(),
        config.model.clone(),
        config.api_key.clone(),
    );
    let coordinator = Coordinator::new(config, Arc::new(reasoner));

    match coordinator.run_to_completion(request).await {
        Ok(report) => {
            println!("{}", report.body);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            let descriptor = serde_json::to_string_pretty(&failure)
                .unwrap_or_else(|_| format!("{:?}", failure));
            eprintln!("analysis failed:\n{}", descriptor);
            ExitCode::FAILURE
        }
    }
}
