//! Docflow CLI - resolve and produce deliverable documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docflow_catalog::{Catalog, ManifestDir, ToolCatalog};
use docflow_core::StepStatus;
use docflow_execution::{
    AdmissionQueue, DeliverableRequest, DocflowConfig, RequestOutcome, RequestProcessor,
    RequestStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Resolve tool dependencies and produce deliverables", long_about = None)]
struct Cli {
    /// Catalog of tools, templates and variables
    #[arg(long, global = true, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of `<code>.json` manifests overriding the catalog's
    #[arg(long, global = true)]
    manifest_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the execution route for deliverables
    Plan {
        /// Deliverable template codes
        #[arg(required = true)]
        deliverables: Vec<String>,
    },
    /// Produce deliverables
    Run {
        /// Deliverable template codes
        #[arg(required = true)]
        deliverables: Vec<String>,
        /// Submit each deliverable as its own concurrent request
        #[arg(long)]
        each: bool,
    },
    /// List catalog tools and templates
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => DocflowConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DocflowConfig::default(),
    };

    let catalog = Arc::new(
        Catalog::load(&cli.catalog)
            .await
            .with_context(|| format!("loading catalog {}", cli.catalog.display()))?,
    );

    let admission = Arc::new(AdmissionQueue::new(config.admission));
    let mut processor = RequestProcessor::from_config(catalog.clone(), admission, &config);
    if let Some(dir) = &cli.manifest_dir {
        processor = processor.with_manifests(Arc::new(ManifestDir::new(dir)));
    }
    let processor = Arc::new(processor);

    match cli.command {
        Commands::Plan { deliverables } => {
            let resolution = processor.plan(&DeliverableRequest::new(deliverables))?;

            println!("Route ({} steps, depth {})", resolution.route.len(), resolution.depth);
            for (i, step) in resolution.route.iter().enumerate() {
                let mode = if step.is_exclusive() { "exclusive" } else { "shared" };
                println!("  {:>2}. {} [{:?}, {}]", i + 1, step.code, step.kind, mode);
            }

            if resolution.prep_variables.is_empty() {
                println!("No preparation variables");
            } else {
                println!("Preparation variables:");
                for id in &resolution.prep_variables {
                    println!("  {}", id);
                }
            }
        }
        Commands::Run { deliverables, each } => {
            let requests: Vec<DeliverableRequest> = if each {
                deliverables
                    .into_iter()
                    .map(|d| DeliverableRequest::new([d]))
                    .collect()
            } else {
                vec![DeliverableRequest::new(deliverables)]
            };

            let handles: Vec<_> = requests
                .into_iter()
                .map(|request| processor.spawn(request))
                .collect();

            let mut failed = 0;
            for handle in handles {
                let outcome = handle.await?;
                if outcome.status == RequestStatus::Error {
                    failed += 1;
                }
                print_outcome(&outcome);
            }

            if failed > 0 {
                anyhow::bail!("{} request(s) failed", failed);
            }
            info!("All requests done");
        }
        Commands::Tools => {
            let tools = catalog.tools();
            println!("Tools ({})", tools.len());
            for tool in tools {
                let mode = if tool.is_exclusive() { "exclusive" } else { "shared" };
                println!(
                    "  {} | {:?} | {} | {} manifest entries",
                    tool.code,
                    tool.kind,
                    mode,
                    tool.manifest.len()
                );
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &RequestOutcome) {
    println!("Request {}: {}", outcome.request, format_request_status(outcome.status));
    for step in &outcome.report.steps {
        print!(
            "  {} | {} | {:.1}s",
            step.code,
            format_step_status(step.status),
            step.elapsed.as_secs_f64()
        );
        match &step.detail {
            Some(detail) => println!(" | {}", detail),
            None => println!(),
        }
    }
    if let Some(error) = &outcome.error {
        println!("  Error: {}", error);
    }
}

fn format_request_status(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Done => "DONE",
        RequestStatus::Error => "ERROR",
    }
}

fn format_step_status(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "PENDING",
        StepStatus::Queued => "QUEUED",
        StepStatus::Running => "RUNNING",
        StepStatus::Done => "DONE",
        StepStatus::Failed => "FAILED",
    }
}
