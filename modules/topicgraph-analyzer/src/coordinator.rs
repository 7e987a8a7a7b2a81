//! Delivery coordinator: consume -> process -> settle, with bounded
//! concurrency and per-message failure isolation.
//!
//! Each delivery becomes one spawned unit of work holding a semaphore permit.
//! The permit is taken *before* the next delivery is pulled, so at most
//! `prefetch` messages are in flight and a backlog of slow extractions stays
//! in the broker instead of in memory.
//!
//! Settlement policy:
//!
//! | outcome             | broker action                                        |
//! |---------------------|------------------------------------------------------|
//! | success             | ack                                                  |
//! | malformed message   | ack (discard, redelivery cannot help)                |
//! | extraction failed   | requeue until `max_deliveries`, then dead-letter     |
//! | graph write failed  | requeue after `requeue_delay`                        |
//! | anything else       | dead-letter                                          |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{error, info, warn};

use topicgraph_common::config::{
    DEFAULT_MAX_DELIVERIES, DEFAULT_REQUEUE_DELAY_MS, DEFAULT_SHUTDOWN_GRACE_SECS,
};
use topicgraph_common::{Config, IngestError};

use crate::pipeline::{PostPipeline, ProcessedPost, Stage};
use crate::traits::MessageAcker;

/// One delivery from the broker, not yet settled.
pub struct InboundMessage {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    /// Broker flag: this message was delivered before.
    pub redelivered: bool,
    /// Prior delivery attempts, when the broker reports them
    /// (`x-delivery-count` on quorum queues).
    pub delivery_count: Option<u32>,
    pub acker: Box<dyn MessageAcker>,
}

/// How a processed message is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    DeadLetter,
}

/// Terminal result of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Fully processed and acknowledged.
    Acknowledged,
    /// Malformed; acknowledged without processing.
    Discarded,
    /// Rejected back onto the queue for another attempt.
    Requeued,
    /// Rejected without requeue.
    DeadLettered,
    /// The broker call settling the message failed.
    SettleFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Total attempts allowed for a message whose extraction keeps failing.
    pub max_deliveries: u32,
    /// Pause before requeueing after a graph write failure.
    pub requeue_delay: Duration,
    /// How long shutdown waits for in-flight messages.
    pub shutdown_grace: Duration,
}

impl DeliveryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_deliveries: config.max_deliveries,
            requeue_delay: config.requeue_delay,
            shutdown_grace: config.shutdown_grace,
        }
    }

    /// Map a pipeline result to a broker action.
    pub fn disposition(
        &self,
        result: &Result<ProcessedPost, IngestError>,
        redelivered: bool,
        delivery_count: Option<u32>,
    ) -> Disposition {
        match result {
            Ok(_) | Err(IngestError::MalformedMessage(_)) => Disposition::Ack,
            Err(IngestError::ExtractionFailed(_)) => {
                if self.may_retry(redelivered, delivery_count) {
                    Disposition::Requeue
                } else {
                    Disposition::DeadLetter
                }
            }
            Err(IngestError::GraphWriteFailed(_)) => Disposition::Requeue,
            Err(IngestError::Config(_)) | Err(IngestError::Anyhow(_)) => Disposition::DeadLetter,
        }
    }

    /// Whether another attempt fits under `max_deliveries`. Without a delivery
    /// count only a first delivery may be retried, since the `redelivered`
    /// flag alone cannot bound the loop.
    fn may_retry(&self, redelivered: bool, delivery_count: Option<u32>) -> bool {
        match delivery_count {
            Some(prior) => prior.saturating_add(1) < self.max_deliveries,
            None => !redelivered && self.max_deliveries > 1,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            requeue_delay: Duration::from_millis(DEFAULT_REQUEUE_DELAY_MS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

/// Counters from one coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub acknowledged: u32,
    pub discarded: u32,
    pub requeued: u32,
    pub dead_lettered: u32,
    pub settle_failed: u32,
    /// Units of work that died without producing an outcome.
    pub crashed: u32,
    /// In-flight units dropped unsettled at shutdown.
    pub abandoned: u32,
    pub stream_errors: u32,
}

impl RunStats {
    fn record(&mut self, joined: Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Acknowledged) => self.acknowledged += 1,
            Ok(Outcome::Discarded) => self.discarded += 1,
            Ok(Outcome::Requeued) => self.requeued += 1,
            Ok(Outcome::DeadLettered) => self.dead_lettered += 1,
            Ok(Outcome::SettleFailed) => self.settle_failed += 1,
            Err(e) if e.is_cancelled() => self.abandoned += 1,
            Err(e) => {
                error!(error = %e, "Unit of work crashed");
                self.crashed += 1;
            }
        }
    }

    /// Messages that reached a terminal outcome.
    pub fn settled(&self) -> u32 {
        self.acknowledged + self.discarded + self.requeued + self.dead_lettered
    }
}

/// Runs the consume -> process -> settle loop.
pub struct DeliveryCoordinator {
    pipeline: Arc<PostPipeline>,
    limiter: Arc<Semaphore>,
    policy: DeliveryPolicy,
}

impl DeliveryCoordinator {
    pub fn new(pipeline: PostPipeline, concurrency: usize, policy: DeliveryPolicy) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
            policy,
        }
    }

    /// Process deliveries until the stream ends or `shutdown` resolves, then
    /// give in-flight messages `shutdown_grace` to finish. Anything still
    /// running after that is aborted unsettled, leaving it to the broker to
    /// redeliver.
    pub async fn run<D, F>(&self, deliveries: D, shutdown: F) -> RunStats
    where
        D: Stream<Item = anyhow::Result<InboundMessage>>,
        F: Future<Output = ()>,
    {
        let mut deliveries = std::pin::pin!(deliveries);
        let mut shutdown = std::pin::pin!(shutdown);
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        let mut stats = RunStats::default();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                stats.record(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting deliveries");
                    break;
                }
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting deliveries");
                    break;
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    let pipeline = self.pipeline.clone();
                    let policy = self.policy;
                    in_flight.spawn(async move {
                        let outcome = handle(pipeline, policy, message).await;
                        drop(permit);
                        outcome
                    });
                }
                Some(Err(e)) => {
                    error!(error = %format!("{e:#}"), "Delivery stream error");
                    stats.stream_errors += 1;
                }
                None => {
                    info!("Delivery stream ended");
                    break;
                }
            }
        }

        self.drain(in_flight, &mut stats).await;
        info!(
            acknowledged = stats.acknowledged,
            discarded = stats.discarded,
            requeued = stats.requeued,
            dead_lettered = stats.dead_lettered,
            abandoned = stats.abandoned,
            "Coordinator stopped"
        );
        stats
    }

    async fn drain(&self, mut in_flight: JoinSet<Outcome>, stats: &mut RunStats) {
        if in_flight.is_empty() {
            return;
        }
        info!(in_flight = in_flight.len(), "Waiting for in-flight messages");

        let deadline = tokio::time::sleep(self.policy.shutdown_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(joined) => stats.record(joined),
                    None => return,
                },
                _ = &mut deadline => {
                    warn!(
                        abandoned = in_flight.len(),
                        "Shutdown grace elapsed, abandoning unacknowledged messages"
                    );
                    in_flight.abort_all();
                    while let Some(joined) = in_flight.join_next().await {
                        stats.record(joined);
                    }
                    return;
                }
            }
        }
    }
}

/// Aborts the pipeline task when its unit of work is abandoned at shutdown.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One unit of work. Never returns an error: every failure is settled and
/// reported as an [`Outcome`].
async fn handle(
    pipeline: Arc<PostPipeline>,
    policy: DeliveryPolicy,
    message: InboundMessage,
) -> Outcome {
    let InboundMessage {
        delivery_tag,
        body,
        redelivered,
        delivery_count,
        acker,
    } = message;

    tracing::debug!(delivery_tag, redelivered, stage = %Stage::Received, "Delivery received");

    // Run the pipeline in its own task so a panic is contained to this message.
    let task = tokio::spawn(async move { pipeline.process(&body).await });
    let _abort = AbortOnDrop(task.abort_handle());
    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(IngestError::Anyhow(anyhow!("pipeline task failed: {e}"))),
    };

    let disposition = policy.disposition(&result, redelivered, delivery_count);

    match &result {
        Ok(processed) => info!(
            delivery_tag,
            post_id = processed.post_id.as_deref().unwrap_or(""),
            author_id = processed.author_id.as_str(),
            relationship = %processed.relationship,
            topics = processed.topics,
            stage = %Stage::Acknowledged,
            "Post ingested"
        ),
        Err(e @ IngestError::MalformedMessage(_)) => warn!(
            delivery_tag,
            error = %e,
            "Discarding malformed message"
        ),
        Err(e) => error!(
            delivery_tag,
            redelivered,
            delivery_count,
            kind = e.kind(),
            error = %e,
            action = ?disposition,
            stage = %Stage::Failed,
            "Message processing failed"
        ),
    }

    if disposition == Disposition::Requeue
        && matches!(result, Err(IngestError::GraphWriteFailed(_)))
        && !policy.requeue_delay.is_zero()
    {
        tokio::time::sleep(policy.requeue_delay).await;
    }

    let settled = match disposition {
        Disposition::Ack => acker.ack().await,
        Disposition::Requeue => acker.reject(true).await,
        Disposition::DeadLetter => acker.reject(false).await,
    };

    if let Err(e) = settled {
        error!(delivery_tag, error = %format!("{e:#}"), action = ?disposition, "Failed to settle message");
        return Outcome::SettleFailed;
    }

    match (disposition, &result) {
        (Disposition::Ack, Ok(_)) => Outcome::Acknowledged,
        (Disposition::Ack, Err(_)) => Outcome::Discarded,
        (Disposition::Requeue, _) => Outcome::Requeued,
        (Disposition::DeadLetter, _) => Outcome::DeadLettered,
    }
}
