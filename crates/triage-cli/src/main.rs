//! Backlog Triage CLI
//!
//! The `triage` command runs the full triage pipeline against a GitHub
//! repository and prints (or writes) the resulting report.
//!
//! ## Commands
//!
//! - `run`: Fetch, cluster, label, prioritize, plan, and report on a
//!   repository's open backlog, optionally generating patches for the top
//!   prioritized items

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use triage_core::{
    ContextCache, Orchestrator, OrchestratorConfig, PatchOutcome, Ports, RepoRef, SessionId,
    TriageRequest,
};
use triage_github::GithubClient;
use triage_llm::NimClient;

#[derive(Parser)]
#[command(name = "triage")]
#[command(author = "Backlog Triage Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LLM-driven repository backlog triage", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage a repository's open backlog
    Run {
        /// Repository to triage, as owner/name
        #[arg(short, long)]
        repo: String,

        /// Maximum number of items to fetch
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip pull requests
        #[arg(long)]
        no_prs: bool,

        /// Skip issues
        #[arg(long)]
        no_issues: bool,

        /// Generate code patches for the top prioritized items
        #[arg(long)]
        patches: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full structured report as JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    triage_core::telemetry::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Run {
            repo,
            limit,
            no_prs,
            no_issues,
            patches,
            output,
            json,
        } => {
            cmd_run(&repo, limit, no_prs, no_issues, patches, output.as_deref(), json).await
        }
    }
}

async fn cmd_run(
    repo: &str,
    limit: Option<usize>,
    no_prs: bool,
    no_issues: bool,
    patches: bool,
    output: Option<&std::path::Path>,
    json: bool,
) -> Result<()> {
    if no_prs && no_issues {
        bail!("--no-prs and --no-issues together leave nothing to triage");
    }
    let repo = RepoRef::parse(repo)?;

    let cache = Arc::new(ContextCache::default());
    let github = Arc::new(
        GithubClient::from_env(Arc::clone(&cache)).context("Failed to set up GitHub client")?,
    );
    let reasoning =
        Arc::new(NimClient::from_env().context("Failed to set up reasoning client")?);
    let orchestrator = Orchestrator::new(
        Ports {
            reasoning,
            repository: Arc::clone(&github) as Arc<dyn triage_core::RepositoryDataPort>,
            context: github,
        },
        OrchestratorConfig::default(),
    );

    let request = TriageRequest {
        repo: repo.clone(),
        limit,
        include_issues: !no_issues,
        include_prs: !no_prs,
    };
    let id = orchestrator.start_triage(request).await?;
    tail_progress(&orchestrator, &id).await?;

    if patches {
        generate_patches(&orchestrator, &id).await?;
    }
    let report = orchestrator.report(&id).await?;

    let rendered = if json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.report_markdown.clone()
    };
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{rendered}"),
    }

    info!(
        items = report.metadata.items_fetched,
        clusters = report.metadata.cluster_count,
        elapsed_ms = report.metadata.elapsed_ms,
        "triage complete"
    );
    Ok(())
}

/// Poll the session, logging each stage transition, until it terminates.
async fn tail_progress(orchestrator: &Orchestrator, id: &SessionId) -> Result<()> {
    let mut last_stage = None;
    loop {
        let snapshot = orchestrator.progress(id).await?;
        if last_stage != Some(snapshot.stage) {
            info!(stage = %snapshot.stage, elapsed_ms = snapshot.elapsed_ms, "pipeline stage");
            last_stage = Some(snapshot.stage);
        }
        if snapshot.stage.is_terminal() {
            if let Some(error) = snapshot.error {
                bail!("triage failed: {error}");
            }
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Request a patch for every top-prioritized item, logging rejections.
async fn generate_patches(orchestrator: &Orchestrator, id: &SessionId) -> Result<()> {
    let numbers: Vec<u64> = orchestrator
        .report(id)
        .await?
        .top_issues
        .iter()
        .map(|entry| entry.number)
        .collect();

    for number in numbers {
        match orchestrator.generate_patch(id, number).await {
            Ok(PatchOutcome::Generated(patch)) => {
                info!(
                    number,
                    file = %patch.file_path,
                    confidence = patch.confidence,
                    "patch generated"
                );
            }
            Ok(PatchOutcome::Rejected {
                confidence, reason, ..
            }) => {
                warn!(number, confidence, %reason, "patch rejected");
            }
            Err(error) => {
                warn!(number, %error, "patch generation failed");
            }
        }
    }
    Ok(())
}
