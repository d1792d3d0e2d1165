// Generic batch-with-fallback protocol shared by the filter and
// translation agents.
//
// Items are processed in fixed-size chunks. Each chunk goes to the model
// as one request with chunk-local positional ids; a response that drops an
// id degrades softly (that item gets the agent's conservative default),
// while a request that fails outright degrades hard (every item retried
// individually, each falling back on its own). Whatever happens, N items
// in means N outcomes out, in order.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::core::config::AgentConfig;
use crate::core::errors::AgentError;

#[async_trait]
pub trait BatchAgent: Send + Sync {
    type Item: Sync;
    type Outcome: Send;

    fn agent_name(&self) -> &'static str;

    /// Conservative outcome for an item the model failed to answer for.
    fn fallback_outcome(&self, item: &Self::Item, note: &str) -> Self::Outcome;

    /// One request covering a whole chunk. Ids are chunk-local positions;
    /// the returned pairs may be sparse or out of order.
    async fn submit_batch(
        &self,
        items: &[(usize, &Self::Item)],
    ) -> Result<Vec<(usize, Self::Outcome)>, AgentError>;

    /// Single-item retry used when a whole chunk request fails.
    async fn submit_single(&self, item: &Self::Item) -> Result<Self::Outcome, AgentError>;
}

/// One delivered outcome, flagged when it is the agent's conservative
/// default rather than a real model answer. Callers that cache outcomes
/// must not cache degraded ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<T> {
    pub outcome: T,
    pub degraded: bool,
}

impl<T> Delivery<T> {
    fn answered(outcome: T) -> Self {
        Self {
            outcome,
            degraded: false,
        }
    }

    fn degraded(outcome: T) -> Self {
        Self {
            outcome,
            degraded: true,
        }
    }
}

/// Drive an agent over `items`. Infallible: every failure mode collapses
/// to per-item fallback outcomes rather than an error.
pub async fn run_with_fallback<A: BatchAgent>(
    agent: &A,
    items: &[A::Item],
    config: &AgentConfig,
) -> Vec<Delivery<A::Outcome>> {
    let mut outcomes = Vec::with_capacity(items.len());
    let chunk_size = config.chunk_size.max(1);
    let total_chunks = items.len().div_ceil(chunk_size);

    for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
        if chunk_index > 0 && !config.chunk_pause.is_zero() {
            tokio::time::sleep(config.chunk_pause).await;
        }
        debug!(
            agent = agent.agent_name(),
            chunk = chunk_index + 1,
            of = total_chunks,
            items = chunk.len(),
            "submitting chunk"
        );
        outcomes.extend(process_chunk(agent, chunk).await);
    }

    debug_assert_eq!(outcomes.len(), items.len());
    info!(
        agent = agent.agent_name(),
        items = items.len(),
        "batch run complete"
    );
    outcomes
}

async fn process_chunk<A: BatchAgent>(agent: &A, chunk: &[A::Item]) -> Vec<Delivery<A::Outcome>> {
    let indexed: Vec<(usize, &A::Item)> = chunk.iter().enumerate().collect();

    match agent.submit_batch(&indexed).await {
        Ok(answers) => {
            let mut slots: Vec<Option<A::Outcome>> =
                chunk.iter().map(|_| None).collect();
            for (id, outcome) in answers {
                match slots.get_mut(id) {
                    Some(slot) => *slot = Some(outcome),
                    None => {
                        warn!(
                            agent = agent.agent_name(),
                            id, "response id out of range, discarding"
                        );
                    }
                }
            }
            slots
                .into_iter()
                .enumerate()
                .map(|(i, slot)| match slot {
                    Some(outcome) => Delivery::answered(outcome),
                    None => {
                        warn!(
                            agent = agent.agent_name(),
                            id = i,
                            "item missing from batch response, using fallback"
                        );
                        Delivery::degraded(
                            agent.fallback_outcome(&chunk[i], "missing from batch response"),
                        )
                    }
                })
                .collect()
        }
        Err(e) => {
            warn!(
                agent = agent.agent_name(),
                error = %e,
                "chunk request failed, degrading to per-item requests"
            );
            let singles = chunk.iter().map(|item| async move {
                match agent.submit_single(item).await {
                    Ok(outcome) => Delivery::answered(outcome),
                    Err(e) => {
                        warn!(
                            agent = agent.agent_name(),
                            error = %e,
                            "single-item request failed, using fallback"
                        );
                        Delivery::degraded(
                            agent.fallback_outcome(item, "individual request failed"),
                        )
                    }
                }
            });
            join_all(singles).await
        }
    }
}
