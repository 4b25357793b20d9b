//! Session orchestration: the pipeline driver and its public surface.
//!
//! One `Orchestrator` owns the collaborator ports and a registry of
//! sessions. `start_triage` admits a session (bounded by a semaphore),
//! spawns a task that drives the stages in order, and returns immediately;
//! callers observe the run through `progress`, `wait`, and `report`, and may
//! `cancel` it or request patches with `generate_patch` once it is done.
//!
//! Failure policy: fetching, clustering, and prioritizing are required and
//! fail the session. Labeling and planning degrade with a warning. Editing
//! cannot fail. Sessions stay queryable after they finish; nothing is
//! persisted across process restarts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{FixPlan, PatchOutcome, PriorityEntry, RepoRef, TriageReport};
use crate::error::{Result, TriageError};
use crate::ports::{ContextFetcherPort, ReasoningPort, RepositoryDataPort};
use crate::session::{PipelineStage, ProgressSnapshot, SessionId, SessionState};
use crate::stages;
use crate::stages::edit::ReportInputs;

/// Default cap on simultaneously running sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default (and hard) cap on items fetched per session.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// The collaborator ports a pipeline run consumes.
#[derive(Clone)]
pub struct Ports {
    pub reasoning: Arc<dyn ReasoningPort>,
    pub repository: Arc<dyn RepositoryDataPort>,
    pub context: Arc<dyn ContextFetcherPort>,
}

/// Orchestrator-level tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_sessions: usize,
    pub max_items: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_SESSIONS,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

/// What a caller asks to triage.
#[derive(Debug, Clone)]
pub struct TriageRequest {
    pub repo: RepoRef,
    /// Item cap for this run; clamped to the orchestrator's `max_items`.
    pub limit: Option<usize>,
    pub include_issues: bool,
    pub include_prs: bool,
}

impl TriageRequest {
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            limit: None,
            include_issues: true,
            include_prs: true,
        }
    }
}

/// Shared record for one session: state, cancellation, and the stage
/// broadcast observers wait on.
struct SessionHandle {
    cancel: CancellationToken,
    state: Mutex<SessionState>,
    stage_tx: watch::Sender<PipelineStage>,
}

/// Entry point for running and observing triage sessions.
pub struct Orchestrator {
    ports: Ports,
    config: OrchestratorConfig,
    permits: Arc<Semaphore>,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl Orchestrator {
    pub fn new(ports: Ports, config: OrchestratorConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_sessions)),
            ports,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Admit and start a session. Returns immediately with the session id,
    /// or `RateLimited` when the process is already at capacity.
    pub async fn start_triage(&self, request: TriageRequest) -> Result<SessionId> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| TriageError::RateLimited {
                retry_after_secs: None,
            })?;

        let id = SessionId::new();
        let (stage_tx, _) = watch::channel(PipelineStage::Fetching);
        let handle = Arc::new(SessionHandle {
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::new(id.clone(), request.repo.clone())),
            stage_tx,
        });
        self.sessions
            .lock()
            .await
            .insert(id.to_string(), Arc::clone(&handle));

        info!(session = %id, repo = %request.repo, "session started");
        let ports = self.ports.clone();
        let max_items = self.config.max_items;
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(error) = drive(&ports, &request, &handle, max_items).await {
                warn!(%error, repo = %request.repo, "session failed");
                handle.state.lock().await.fail(error);
                handle.stage_tx.send_replace(PipelineStage::Failed);
            }
        });
        Ok(id)
    }

    /// Snapshot of where a session currently is.
    pub async fn progress(&self, session: &SessionId) -> Result<ProgressSnapshot> {
        let handle = self.handle(session).await?;
        let state = handle.state.lock().await;
        Ok(state.snapshot())
    }

    /// The final report of a completed session. Errors while the session is
    /// still running, and replays the stored failure for a failed one.
    pub async fn report(&self, session: &SessionId) -> Result<TriageReport> {
        let handle = self.handle(session).await?;
        let state = handle.state.lock().await;
        match state.stage {
            PipelineStage::Done => state.report.clone().ok_or_else(|| {
                TriageError::InvalidRequest("completed session has no report".to_string())
            }),
            PipelineStage::Failed => Err(state
                .error
                .as_ref()
                .map(TriageError::replicate)
                .unwrap_or_else(|| TriageError::Transient("session failed".to_string()))),
            stage => Err(TriageError::InvalidRequest(format!(
                "session still running (stage: {stage})"
            ))),
        }
    }

    /// Block until the session reaches a terminal stage, then return its
    /// report (or replay its failure).
    pub async fn wait(&self, session: &SessionId) -> Result<TriageReport> {
        let handle = self.handle(session).await?;
        let mut stage_rx = handle.stage_tx.subscribe();
        loop {
            if stage_rx.borrow_and_update().is_terminal() {
                break;
            }
            if stage_rx.changed().await.is_err() {
                break;
            }
        }
        self.report(session).await
    }

    /// Request cancellation. The pipeline stops at its next suspension
    /// point; already-terminal sessions are unaffected.
    pub async fn cancel(&self, session: &SessionId) -> Result<()> {
        let handle = self.handle(session).await?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Generate a patch for one of a session's prioritized items.
    ///
    /// Valid once the session has priorities (so usually after `Done`, but
    /// also while the later stages still run), any number of times. A
    /// generated patch is appended to the session's report; a rejection
    /// leaves the session untouched.
    pub async fn generate_patch(&self, session: &SessionId, number: u64) -> Result<PatchOutcome> {
        let handle = self.handle(session).await?;
        let (priority, plan, item): (PriorityEntry, Option<FixPlan>, _) = {
            let state = handle.state.lock().await;
            if state.stage == PipelineStage::Failed || state.priorities.is_empty() {
                return Err(TriageError::InvalidRequest(format!(
                    "patch generation needs prioritized items (stage: {})",
                    state.stage
                )));
            }
            let priority = state
                .priorities
                .iter()
                .find(|p| p.number == number)
                .cloned()
                .ok_or_else(|| {
                    TriageError::InvalidRequest(format!(
                        "item #{number} is not in the prioritized set"
                    ))
                })?;
            let item = state
                .items
                .iter()
                .find(|i| i.number == number)
                .cloned()
                .ok_or_else(|| TriageError::NotFound(format!("item #{number}")))?;
            let plan = state.plans.iter().find(|p| p.number == number).cloned();
            (priority, plan, item)
        };

        let outcome =
            stages::codegen::generate(self.ports.reasoning.as_ref(), &priority, plan.as_ref(), &item)
                .await?;

        if let PatchOutcome::Generated(patch) = &outcome {
            let mut state = handle.state.lock().await;
            state.patches.push(patch.clone());
            if let Some(report) = state.report.as_mut() {
                report.patches.push(patch.clone());
            }
        }
        Ok(outcome)
    }

    async fn handle(&self, session: &SessionId) -> Result<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .await
            .get(session.as_str())
            .cloned()
            .ok_or_else(|| TriageError::SessionNotFound(session.to_string()))
    }
}

/// Run the stages in order against one session. Errors returned here fail
/// the session; the spawn wrapper records them.
async fn drive(
    ports: &Ports,
    request: &TriageRequest,
    handle: &SessionHandle,
    max_items: usize,
) -> Result<()> {
    let cancel = &handle.cancel;
    let repo = &request.repo;
    let limit = request.limit.map_or(max_items, |l| l.min(max_items));

    let items = ports
        .repository
        .fetch_items(repo, limit, request.include_issues, request.include_prs)
        .await?;
    ensure_active(cancel)?;

    if items.is_empty() {
        info!(repo = %repo, "backlog is empty, finishing without reasoning calls");
        let mut state = handle.state.lock().await;
        state.finish(format!(
            "# Triage Report: {repo}\n\nNo open items matched the request.\n"
        ));
        drop(state);
        handle.stage_tx.send_replace(PipelineStage::Done);
        return Ok(());
    }

    {
        let mut state = handle.state.lock().await;
        state.items = items.clone();
        state.advance(PipelineStage::Clustering);
    }
    handle.stage_tx.send_replace(PipelineStage::Clustering);

    let clusters = stages::cluster::run(
        ports.reasoning.as_ref(),
        ports.context.as_ref(),
        repo,
        &items,
        cancel,
    )
    .await?;
    {
        let mut state = handle.state.lock().await;
        state.clusters = clusters.clone();
        state.advance(PipelineStage::Labeling);
    }
    handle.stage_tx.send_replace(PipelineStage::Labeling);

    let clusters = match stages::label::run(
        ports.reasoning.as_ref(),
        ports.context.as_ref(),
        repo,
        clusters.clone(),
        &items,
        cancel,
    )
    .await
    {
        Ok(labeled) => labeled,
        Err(TriageError::Cancelled) => return Err(TriageError::Cancelled),
        Err(error) => {
            warn!(%error, "label stage failed, continuing with unlabeled clusters");
            clusters
        }
    };
    ensure_active(cancel)?;
    {
        let mut state = handle.state.lock().await;
        state.clusters = clusters.clone();
        state.advance(PipelineStage::Prioritizing);
    }
    handle.stage_tx.send_replace(PipelineStage::Prioritizing);

    let priorities = stages::prioritize::run(ports.reasoning.as_ref(), &items, &clusters).await?;
    ensure_active(cancel)?;
    {
        let mut state = handle.state.lock().await;
        state.priorities = priorities.clone();
        state.advance(PipelineStage::Planning);
    }
    handle.stage_tx.send_replace(PipelineStage::Planning);

    let plans = match stages::plan::run(ports.reasoning.as_ref(), &priorities, &items).await {
        Ok(plans) => plans,
        Err(TriageError::Cancelled) => return Err(TriageError::Cancelled),
        Err(error) => {
            warn!(%error, "fix-plan stage failed, continuing without plans");
            vec![]
        }
    };
    ensure_active(cancel)?;
    {
        let mut state = handle.state.lock().await;
        state.plans = plans.clone();
        state.advance(PipelineStage::Editing);
    }
    handle.stage_tx.send_replace(PipelineStage::Editing);

    let repo_name = repo.to_string();
    let report_markdown = stages::edit::run(
        ports.reasoning.as_ref(),
        &ReportInputs {
            repo: &repo_name,
            clusters: &clusters,
            priorities: &priorities,
            plans: &plans,
            patches: &[],
        },
    )
    .await;
    ensure_active(cancel)?;

    {
        let mut state = handle.state.lock().await;
        state.finish(report_markdown);
    }
    handle.stage_tx.send_replace(PipelineStage::Done);
    info!(repo = %repo, "session complete");
    Ok(())
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(TriageError::Cancelled)
    } else {
        Ok(())
    }
}
