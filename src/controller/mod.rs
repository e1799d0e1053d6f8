//! Work-queue driver: decides when reconciliations run.
//!
//! - at most one reconciliation per key at a time; triggers arriving while a
//!   key is running mark it dirty and it runs again once the current pass ends
//! - distinct keys run in parallel, bounded and rate limited
//! - failed keys are re-enqueued after a per-key exponential backoff; a key
//!   has at most one retry timer pending no matter how often it is triggered

mod backoff;
mod resync;

pub use resync::{enqueue_all, enqueue_dependents, run_resync};

use backoff::RetryTracker;
use dbprov_api::ObjectKey;
use futures::stream::StreamExt;
use governor::{Quota, RateLimiter};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::{
    collections::{HashMap, HashSet},
    num::NonZeroU32,
    sync::Arc,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, ProvisionError};
use crate::reconcile::{ReconcileOutcome, Reconciler};

#[derive(Debug)]
pub enum ControllerMessage {
    /// Something about this intent (or what it depends on) may have changed.
    Enqueue(ObjectKey),

    // Internal messages (sent by the worker pipeline)
    /// A reconciliation finished.
    Completed {
        key: ObjectKey,
        result: Result<ReconcileOutcome, ProvisionError>,
    },

    /// A backoff timer fired. Stale timers (`seq` no longer current) are ignored.
    RetryDue { key: ObjectKey, seq: u64 },

    /// Inspect the queue state.
    Snapshot(RpcReplyPort<QueueSnapshot>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub in_flight: Vec<ObjectKey>,
    pub dirty: Vec<ObjectKey>,
    /// Keys whose last reconciliation failed and that are waiting for a retry.
    pub backing_off: Vec<ObjectKey>,
    /// Keys with a retry timer currently armed.
    pub retry_scheduled: Vec<ObjectKey>,
}

/// Handle for interacting with the controller actor.
#[derive(Clone)]
pub struct ControllerHandle {
    actor: ActorRef<ControllerMessage>,
}

impl ControllerHandle {
    pub fn enqueue(&self, key: ObjectKey) -> Result<(), ControllerError> {
        ractor::cast!(self.actor, ControllerMessage::Enqueue(key))
            .map_err(|e| ControllerError::Ractor(format!("Enqueue cast failed: {e}")))
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, ControllerError> {
        ractor::call!(self.actor, ControllerMessage::Snapshot)
            .map_err(|e| ControllerError::Ractor(format!("Snapshot RPC failed: {e}")))
    }

    pub fn stop(&self) {
        self.actor.stop(Some("shutdown".to_string()));
    }

    fn send_completed(
        &self,
        key: ObjectKey,
        result: Result<ReconcileOutcome, ProvisionError>,
    ) -> Result<(), ControllerError> {
        ractor::cast!(self.actor, ControllerMessage::Completed { key, result })
            .map_err(|e| ControllerError::Ractor(format!("Completed cast failed: {e}")))
    }
}

struct ControllerState {
    job_tx: mpsc::Sender<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    retries: RetryTracker,
    /// Armed retry timers, keyed to the sequence number they will report back.
    pending_retry: HashMap<ObjectKey, u64>,
    retry_seq: u64,
}

impl ControllerState {
    async fn dispatch(&mut self, key: ObjectKey) -> Result<(), ActorProcessingErr> {
        if self.in_flight.contains(&key) {
            debug!(intent = %key, "reconciliation already running; marking dirty");
            self.dirty.insert(key);
            return Ok(());
        }
        self.in_flight.insert(key.clone());
        self.job_tx
            .send(key)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("reconcile pipeline closed: {e}")))
    }

    /// Arms a retry timer for `key` unless one is already pending.
    fn schedule_retry(
        &mut self,
        myself: &ActorRef<ControllerMessage>,
        key: &ObjectKey,
        err: &ProvisionError,
    ) {
        if self.pending_retry.contains_key(key) {
            debug!(intent = %key, kind = err.kind(), "reconciliation failed; retry already scheduled");
            return;
        }

        let delay = self.retries.next_delay(key);
        self.retry_seq += 1;
        let seq = self.retry_seq;
        self.pending_retry.insert(key.clone(), seq);
        warn!(
            intent = %key,
            kind = err.kind(),
            error = %err,
            retry_in = ?delay,
            "reconciliation failed; scheduling retry"
        );

        let actor = myself.clone();
        let key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = ractor::cast!(actor, ControllerMessage::RetryDue { key, seq });
        });
    }
}

struct ControllerActor;

#[ractor::async_trait]
impl Actor for ControllerActor {
    type Msg = ControllerMessage;
    type State = ControllerState;
    type Arguments = (Arc<Reconciler>, ControllerConfig);

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        (reconciler, cfg): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let rate = NonZeroU32::new(cfg.reconciles_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));
        let max_concurrent = cfg.max_concurrent_reconciles.max(1);

        let (job_tx, job_rx) = mpsc::channel::<ObjectKey>(1024);
        let handle = ControllerHandle {
            actor: myself.clone(),
        };

        tokio::spawn(async move {
            info!(
                "Reconcile pipeline started: BufferUnordered={}, RateLimit={}/s",
                max_concurrent, rate
            );

            let mut pipeline = ReceiverStream::new(job_rx)
                .map(|key| {
                    let lim = limiter.clone();
                    let reconciler = reconciler.clone();
                    async move {
                        lim.until_ready().await;
                        let result = reconciler.reconcile(&key).await;
                        (key, result)
                    }
                })
                .buffer_unordered(max_concurrent);

            while let Some((key, result)) = pipeline.next().await {
                if let Err(e) = handle.send_completed(key, result) {
                    warn!("Controller unreachable (channel closed), pipeline stopping: {}", e);
                    break;
                }
            }
        });

        Ok(ControllerState {
            job_tx,
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            retries: RetryTracker::new(&cfg),
            pending_retry: HashMap::new(),
            retry_seq: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ControllerMessage::Enqueue(key) => {
                state.dispatch(key).await?;
            }
            ControllerMessage::Completed { key, result } => {
                state.in_flight.remove(&key);
                match result {
                    Ok(outcome) => {
                        state.retries.reset(&key);
                        // Any armed timer for this key is now stale.
                        state.pending_retry.remove(&key);
                        debug!(intent = %key, ?outcome, "reconciliation succeeded");
                    }
                    Err(err) => state.schedule_retry(&myself, &key, &err),
                }
                if state.dirty.remove(&key) {
                    state.dispatch(key).await?;
                }
            }
            ControllerMessage::RetryDue { key, seq } => {
                if state.pending_retry.get(&key) == Some(&seq) {
                    state.pending_retry.remove(&key);
                    state.dispatch(key).await?;
                } else {
                    debug!(intent = %key, "dropping stale retry timer");
                }
            }
            ControllerMessage::Snapshot(reply) => {
                let mut in_flight: Vec<ObjectKey> = state.in_flight.iter().cloned().collect();
                let mut dirty: Vec<ObjectKey> = state.dirty.iter().cloned().collect();
                in_flight.sort();
                dirty.sort();
                let mut retry_scheduled: Vec<ObjectKey> =
                    state.pending_retry.keys().cloned().collect();
                retry_scheduled.sort();
                let _ = reply.send(QueueSnapshot {
                    in_flight,
                    dirty,
                    backing_off: state.retries.backing_off(),
                    retry_scheduled,
                });
            }
        }
        Ok(())
    }
}

/// Spawn the controller actor and its worker pipeline.
pub async fn spawn(
    reconciler: Arc<Reconciler>,
    cfg: ControllerConfig,
) -> Result<ControllerHandle, ControllerError> {
    let (actor, _jh) = Actor::spawn(None, ControllerActor, (reconciler, cfg))
        .await
        .map_err(|e| ControllerError::Ractor(format!("ControllerActor spawn failed: {e}")))?;
    Ok(ControllerHandle { actor })
}
