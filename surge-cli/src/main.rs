//! `surge` command line runner
//!
//! Loads a run description from a JSON file (or uses the built-in reference profile), runs it,
//! and prints the report. Exits non-zero only on fatal setup errors; check failures are reported
//! but never change the exit code.
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use surge::{RunConfig, RunController, RunSpec};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "surge=info";

#[derive(Parser, Debug)]
#[command(version, about)]
struct SurgeCli {
    /// Path to a JSON run description.
    #[arg(required_unless_present = "reference")]
    config: Option<PathBuf>,

    /// Run the built-in reference profile instead of a file.
    #[arg(long, conflicts_with = "config")]
    reference: bool,

    /// Override the target url from the run description.
    #[arg(short = 'u', long)]
    target_url: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = SurgeCli::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: SurgeCli) -> anyhow::Result<()> {
    let mut spec = load_spec(&args)?;
    if let Some(url) = args.target_url {
        spec.target_url = url;
    }

    let config = RunConfig::try_from(spec)?;
    let controller = RunController::new(config)?;

    let abort = controller.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping virtual users");
            abort.abort();
        }
    });

    let report = controller.run().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn load_spec(args: &SurgeCli) -> anyhow::Result<RunSpec> {
    match &args.config {
        Some(path) if !args.reference => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        _ => Ok(RunSpec::reference()),
    }
}
