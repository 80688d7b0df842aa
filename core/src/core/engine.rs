use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{FutureExt, Stream};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::attack::{AttackContext, AttackResult, AttackVector, CancelSignal, ErrorKind};
use crate::core::playbook::{AttackPlaybook, VectorCatalog};
use crate::error::ScanError;
use crate::EngineConfig;

/// Attack orchestrator.
///
/// The engine:
/// 1. Selects vectors from the playbook through its filters
/// 2. Schedules them on a bounded worker pool
/// 3. Bounds every probe by a timeout and the scan's cancellation signal
/// 4. Converts faults, timeouts and panics into `error` results
/// 5. Emits exactly one result per selected vector on a completion channel
pub struct ScanEngine {
    config: EngineConfig,
}

#[derive(Debug, Clone, Copy)]
struct ProbeLimits {
    timeout: Duration,
    grace: Duration,
}

impl ScanEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts the scan and returns its result stream.
    ///
    /// Must be called inside a Tokio runtime. Scheduling happens in the
    /// background; the stream ends once every selected vector has produced
    /// its result.
    pub fn run(
        &self,
        playbook: &AttackPlaybook,
        ctx: Arc<AttackContext>,
    ) -> Result<ScanStream, ScanError> {
        let vectors = playbook.select();
        if vectors.is_empty() && self.config.require_vectors {
            return Err(ScanError::EmptyPlaybook(playbook.name().to_string()));
        }

        let catalog = playbook.catalog();
        let planned = vectors.len();
        let cancel = ctx.cancel().child();
        let (result_tx, result_rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let deadline_task = self.config.scan_deadline().map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        info!("scan deadline of {:?} reached, cancelling", deadline);
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let limits = ProbeLimits {
            timeout: self.config.probe_timeout(),
            grace: self.config.grace_period(),
        };

        info!(
            "playbook '{}': {} vector(s) selected, concurrency {}",
            playbook.name(),
            planned,
            self.config.concurrency
        );

        tokio::spawn(schedule(
            vectors,
            ctx,
            cancel.clone(),
            limits,
            self.config.concurrency,
            result_tx,
            deadline_task,
        ));

        Ok(ScanStream {
            receiver: result_rx,
            planned,
            catalog,
            cancel,
        })
    }
}

/// Feeds vectors to the worker pool until all are started or the scan is
/// cancelled, in which case the rest are reported as skipped.
async fn schedule(
    vectors: Vec<Arc<dyn AttackVector>>,
    ctx: Arc<AttackContext>,
    cancel: CancelSignal,
    limits: ProbeLimits,
    concurrency: usize,
    result_tx: mpsc::Sender<AttackResult>,
    deadline_task: Option<JoinHandle<()>>,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = Vec::with_capacity(vectors.len());
    let mut pending = vectors.into_iter();

    while let Some(vector) = pending.next() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };

        let permit = match permit {
            Some(p) if !cancel.is_cancelled() => p,
            _ => {
                let skipped: Vec<_> = std::iter::once(vector).chain(pending.by_ref()).collect();
                debug!("scan cancelled, skipping {} unstarted vector(s)", skipped.len());
                for v in skipped {
                    let result = AttackResult::skipped(v.id(), "Scan cancelled before this attack started");
                    if result_tx.send(result).await.is_err() {
                        debug!("result consumer dropped");
                    }
                }
                break;
            }
        };

        let ctx = Arc::clone(&ctx);
        let cancel = cancel.clone();
        let tx = result_tx.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let result = execute_vector(vector, &ctx, &cancel, limits).await;
            if tx.send(result).await.is_err() {
                debug!("result consumer dropped");
            }
        }));
    }

    drop(result_tx);

    for task in tasks {
        if let Err(e) = task.await {
            warn!("attack worker failed to join: {}", e);
        }
    }

    if let Some(task) = deadline_task {
        task.abort();
    }
}

enum Outcome {
    Finished(Result<AttackResult, Box<dyn Any + Send>>),
    TimedOut,
    Abandoned,
}

/// Runs one probe under its timeout and the cancellation grace period.
/// Never panics and never returns a non-terminal status.
async fn execute_vector(
    vector: Arc<dyn AttackVector>,
    ctx: &AttackContext,
    cancel: &CancelSignal,
    limits: ProbeLimits,
) -> AttackResult {
    let id = vector.id().to_string();
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + limits.timeout;

    debug!("attack '{}' started", id);

    let probe = AssertUnwindSafe(vector.execute(ctx, cancel)).catch_unwind();
    tokio::pin!(probe);

    let outcome = tokio::select! {
        biased;
        res = &mut probe => Outcome::Finished(res),
        _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
        _ = cancel.cancelled() => {
            let grace_end = (tokio::time::Instant::now() + limits.grace).min(deadline);
            match tokio::time::timeout_at(grace_end, &mut probe).await {
                Ok(res) => Outcome::Finished(res),
                Err(_) if grace_end >= deadline => Outcome::TimedOut,
                Err(_) => Outcome::Abandoned,
            }
        }
    };

    let elapsed = start.elapsed();
    let result = match outcome {
        Outcome::Finished(Ok(result)) => normalize(&id, result),
        Outcome::Finished(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!("attack '{}' panicked: {}", id, message);
            AttackResult::error(&id, ErrorKind::Panic, format!("Attack panicked: {}", message))
        }
        Outcome::TimedOut => {
            warn!("attack '{}' timed out after {:?}", id, limits.timeout);
            AttackResult::error(
                &id,
                ErrorKind::Timeout,
                format!("Attack timed out after {}ms", limits.timeout.as_millis()),
            )
        }
        Outcome::Abandoned => AttackResult::error(
            &id,
            ErrorKind::Cancelled,
            format!(
                "Scan cancelled and attack did not finish within the {}ms grace period",
                limits.grace.as_millis()
            ),
        ),
    };

    stamp(result, elapsed)
}

/// Binds a probe's result to its vector and forces a terminal status.
fn normalize(id: &str, mut result: AttackResult) -> AttackResult {
    if result.attack_id != id {
        warn!(
            "attack '{}' returned a result labelled '{}', relabelling",
            id, result.attack_id
        );
        result.attack_id = id.to_string();
    }

    if !result.status.is_terminal() && !result.breached {
        warn!("attack '{}' returned non-terminal status '{}'", id, result.status);
        let status = result.status;
        let mut replaced = AttackResult::error(
            id,
            ErrorKind::InvalidResult,
            format!("Attack returned non-terminal status '{}'", status),
        );
        replaced.details.request = result.details.request.take();
        replaced.details.response = result.details.response.take();
        replaced.evidence = result.evidence.take();
        return replaced;
    }

    result
}

fn stamp(mut result: AttackResult, elapsed: Duration) -> AttackResult {
    result.timestamp = Utc::now();
    result.duration_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Lazy, single-use sequence of results from one scan.
pub struct ScanStream {
    receiver: mpsc::Receiver<AttackResult>,
    planned: usize,
    catalog: VectorCatalog,
    cancel: CancelSignal,
}

impl ScanStream {
    /// Number of results this stream will yield.
    pub fn planned(&self) -> usize {
        self.planned
    }

    pub fn catalog(&self) -> &VectorCatalog {
        &self.catalog
    }

    /// Scan-level signal. Cancelling it stops this scan only.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub async fn next_result(&mut self) -> Option<AttackResult> {
        self.receiver.recv().await
    }
}

impl Stream for ScanStream {
    type Item = AttackResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.planned))
    }
}
