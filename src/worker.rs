//! Generation Worker Pool. Each worker is a `tokio::task`
//! looping claim → heartbeat → execute-with-panic-recovery → route outcome,
//! grounded on the poll-loop idiom used throughout the job-queue reference
//! material. Panic recovery uses `tokio::spawn` + `JoinError::is_panic`
//! rather than `catch_unwind` directly: the executed unit is async, and a
//! spawned task is tokio's own panic boundary.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::generator;
use crate::models::{GenerationJob, JobErrorType};
use crate::retry::ErrorClass;
use crate::storage::Storage;

pub struct GenerationWorkerPool {
    storage: Arc<dyn Storage>,
    coordinator: Arc<Coordinator>,
    clock: SharedClock,
    config: EngineConfig,
}

impl GenerationWorkerPool {
    pub fn new(storage: Arc<dyn Storage>, coordinator: Arc<Coordinator>, clock: SharedClock, config: EngineConfig) -> Self {
        Self { storage, coordinator, clock, config }
    }

    /// Spawns `config.worker_count` tasks and returns their handles. The
    /// caller awaits or aborts them as part of shutdown.
    pub fn spawn(self: &Arc<Self>, shutdown: tokio::sync::watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|index| {
                let pool = Arc::clone(self);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(format!("worker-{index}"), &mut shutdown).await })
            })
            .collect()
    }

    async fn run_worker(self: Arc<Self>, worker_id: String, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.coordinator.claim_next(&worker_id, self.config.lease_ttl).await {
                Ok(Some(job)) => self.run_job(&worker_id, job).await,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => return,
                    }
                }
                Err(err) => {
                    tracing::warn!(worker_id, error = %err, "worker: failed to claim next job");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn run_job(&self, worker_id: &str, job: GenerationJob) {
        let (stop_heartbeat_tx, mut stop_heartbeat_rx) = tokio::sync::watch::channel(false);
        let heartbeat = {
            let coordinator = Arc::clone(&self.coordinator);
            let worker_id = worker_id.to_string();
            let job_id = job.id;
            let interval = self.config.heartbeat_interval;
            let lease_ttl = self.config.lease_ttl;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // first tick fires immediately; skip it
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(err) = coordinator.extend(job_id, &worker_id, lease_ttl).await {
                                tracing::debug!(job_id = %job_id, error = %err, "worker: heartbeat extend failed");
                                return;
                            }
                        }
                        _ = stop_heartbeat_rx.changed() => return,
                    }
                }
            })
        };

        let storage = Arc::clone(&self.storage);
        let clock = Arc::clone(&self.clock);
        let config = self.config.clone();
        let job_for_exec = job.clone();
        let exec_handle = tokio::spawn(async move { execute(&storage, &clock, &config, &job_for_exec).await });
        let result = exec_handle.await;

        let _ = stop_heartbeat_tx.send(true);
        let _ = heartbeat.await;

        match result {
            Ok(Ok(())) => {
                if let Err(err) = self.coordinator.complete(job.id, worker_id).await {
                    self.log_terminal_write_error(job.id, err);
                }
            }
            Ok(Err(err)) => self.route_failure(worker_id, &job, err).await,
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                if let Err(err) = self
                    .coordinator
                    .move_to_dead_letter(job.id, worker_id, JobErrorType::Panic, &message, None)
                    .await
                {
                    self.log_terminal_write_error(job.id, err);
                }
            }
            Err(join_err) => {
                tracing::warn!(job_id = %job.id, error = %join_err, "worker: execution task was cancelled");
            }
        }
    }

    async fn route_failure(&self, worker_id: &str, job: &GenerationJob, err: CoreError) {
        match classify(&err) {
            ErrorClass::Transient => {
                if let Err(write_err) = self
                    .coordinator
                    .fail(job.id, worker_id, &err.to_string(), &self.config.retry)
                    .await
                {
                    self.log_terminal_write_error(job.id, write_err);
                }
            }
            ErrorClass::Permanent => {
                if let Err(write_err) = self
                    .coordinator
                    .move_to_dead_letter(job.id, worker_id, JobErrorType::Permanent, &err.to_string(), None)
                    .await
                {
                    self.log_terminal_write_error(job.id, write_err);
                }
            }
            ErrorClass::Panic | ErrorClass::Cancelled => {
                // Panics are routed from the `JoinError::is_panic` branch
                // above; cooperative cancellation stops without a terminal
                // write — the job stays `running` and its lease expires, so
                // another worker can reclaim it, or a `cancel` call already
                // marked it for cancellation and there is nothing further to
                // record.
                tracing::info!(job_id = %job.id, "worker: job execution stopped ({:?})", classify(&err));
            }
        }
    }

    fn log_terminal_write_error(&self, job_id: Uuid, err: CoreError) {
        if matches!(err, CoreError::OwnershipLost) {
            tracing::info!(job_id = %job_id, "worker: lost ownership before terminal write, another worker is authoritative");
        } else {
            tracing::warn!(job_id = %job_id, error = %err, "worker: terminal write failed");
        }
    }
}

/// Processes `[job.generate_from, job.generate_until)` in
/// `batch_days`-sized chunks, checking cancellation and checkpointing
/// `generated_through` after each one (progressive checkpoint: partial
/// progress survives a crash mid-job).
async fn execute(
    storage: &Arc<dyn Storage>,
    clock: &SharedClock,
    config: &EngineConfig,
    job: &GenerationJob,
) -> Result<(), CoreError> {
    let template = storage
        .get_template_by_id(job.template_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("template {} not found", job.template_id)))?;

    let mut cursor = job.generate_from;
    while cursor < job.generate_until {
        if storage.is_cancel_requested(job.id).await? {
            return Err(CoreError::Transient("cancelled".to_string()));
        }

        let batch_end = std::cmp::min(cursor + chrono::Duration::days(config.batch_days), job.generate_until);
        let exceptions = storage.list_exceptions(job.template_id, cursor, batch_end).await?;
        let items = generator::generate(&template, cursor, batch_end, &exceptions)?;

        let now = clock.now();
        storage.insert_generation_batch(job.template_id, items, batch_end, now).await?;

        cursor = batch_end;
    }
    Ok(())
}

fn classify(err: &CoreError) -> ErrorClass {
    match err {
        CoreError::Database(_) | CoreError::Io(_) | CoreError::Migration(_) => ErrorClass::Transient,
        CoreError::Transient(msg) if msg == "cancelled" => ErrorClass::Cancelled,
        CoreError::Transient(_) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "generation worker panicked with a non-string payload".to_string()
    }
}
