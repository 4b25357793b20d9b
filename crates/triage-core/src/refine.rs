//! Bounded propose/gather refinement loop.
//!
//! The single reusable mechanism behind every uncertainty-bearing stage:
//! propose a result, and while its self-reported uncertainty stays above the
//! stage threshold, gather more context for the flagged items and re-propose,
//! up to a fixed number of extra rounds. Running out of rounds is not an
//! error; the latest result is returned best-effort.

use std::future::Future;

use tracing::{debug, warn};

use crate::domain::ContextDelta;
use crate::error::Result;

/// Extra propose rounds allowed after the initial one.
pub const MAX_REFINEMENT_ROUNDS: u32 = 2;

/// Uncertainty threshold for the cluster stage.
pub const CLUSTER_UNCERTAINTY_THRESHOLD: f64 = 0.4;

/// Uncertainty threshold for the label stage.
pub const LABEL_UNCERTAINTY_THRESHOLD: f64 = 0.35;

/// One proposal from a stage: a candidate result, its uncertainty, and the
/// item numbers the stage wants more context for.
#[derive(Debug, Clone)]
pub struct Proposal<T> {
    pub value: T,
    /// Self-reported uncertainty; clamped into [0.0, 1.0] by the controller.
    pub uncertainty: f64,
    pub needs_context: Vec<u64>,
}

/// Final result of a refinement run.
#[derive(Debug, Clone)]
pub struct Refined<T> {
    pub value: T,
    pub uncertainty: f64,
    /// Extra rounds actually taken (0..=max_rounds).
    pub rounds: u32,
}

/// Run the bounded refinement loop.
///
/// `propose` receives the full context accumulated so far and returns a
/// [`Proposal`]; `gather` resolves flagged item numbers into a
/// [`ContextDelta`] (delegating to the cache-backed Context Fetcher Port).
///
/// Propose errors propagate (an unreachable reasoning service fails the
/// stage). Gather errors end refinement early with the latest proposal, as
/// does a proposal that flags nothing to gather.
pub async fn refine<T, P, PF, G, GF>(
    threshold: f64,
    max_rounds: u32,
    mut propose: P,
    mut gather: G,
) -> Result<Refined<T>>
where
    P: FnMut(ContextDelta) -> PF,
    PF: Future<Output = Result<Proposal<T>>>,
    G: FnMut(Vec<u64>) -> GF,
    GF: Future<Output = Result<ContextDelta>>,
{
    let mut accumulated = ContextDelta::default();
    let mut proposal = propose(accumulated.clone()).await?;
    let mut uncertainty = proposal.uncertainty.clamp(0.0, 1.0);
    let mut rounds = 0u32;

    while uncertainty > threshold && rounds < max_rounds {
        if proposal.needs_context.is_empty() {
            debug!(uncertainty, "uncertain proposal flagged no items, stopping refinement");
            break;
        }

        let wanted = proposal.needs_context.clone();
        debug!(round = rounds + 1, items = wanted.len(), "gathering refinement context");
        match gather(wanted).await {
            Ok(delta) => accumulated.merge(delta),
            Err(error) => {
                warn!(%error, "context gather failed, keeping current proposal");
                break;
            }
        }

        proposal = propose(accumulated.clone()).await?;
        uncertainty = proposal.uncertainty.clamp(0.0, 1.0);
        rounds += 1;
    }

    if uncertainty > threshold {
        warn!(uncertainty, threshold, rounds, "refinement ended above threshold");
    }

    Ok(Refined {
        value: proposal.value,
        uncertainty,
        rounds,
    })
}
