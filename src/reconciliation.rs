//! Reconciliation Worker and on-demand top-up. Both paths share
//! `reconcile_template`: fetch exceptions, generate the next batch, batch
//! insert with conflict suppression, advance `generated_through`.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::{Clock, SharedClock};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::generator;
use crate::models::RecurringTemplate;
use crate::storage::Storage;

/// Advances `template` by one batch toward its generation horizon. A no-op
/// if `generated_through` has already reached the horizon.
pub async fn reconcile_template(
    storage: &dyn Storage,
    clock: &dyn Clock,
    template: &RecurringTemplate,
    batch_days: i64,
) -> Result<(), CoreError> {
    let now = clock.now();
    let horizon_end = now + Duration::days(template.generation_horizon_days);
    if template.generated_through >= horizon_end {
        return Ok(());
    }

    let batch_end = std::cmp::min(
        template.generated_through + Duration::days(batch_days),
        horizon_end,
    );

    let exceptions = storage
        .list_exceptions(template.id, template.generated_through, batch_end)
        .await?;
    let items = generator::generate(template, template.generated_through, batch_end, &exceptions)?;

    storage
        .insert_generation_batch(template.id, items, batch_end, now)
        .await?;
    Ok(())
}

/// Same algorithm as the reconciliation cycle, invoked inline from
/// `ItemService::list`: if any active template in `list_id` lags behind
/// "now", fill the gap before the caller reads. Failures are logged, never
/// propagated — a list read must never fail because generation hiccuped.
pub async fn top_up_list(storage: &dyn Storage, clock: &dyn Clock, list_id: Uuid, config: &EngineConfig) {
    let templates = match storage.list_templates(list_id, true).await {
        Ok(templates) => templates,
        Err(err) => {
            tracing::warn!(list_id = %list_id, error = %err, "on-demand top-up: failed to list templates");
            return;
        }
    };

    let now = clock.now();
    for template in templates {
        if template.generated_through >= now {
            continue;
        }
        if let Err(err) = reconcile_template(storage, clock, &template, config.batch_days).await {
            tracing::warn!(
                template_id = %template.id,
                error = %err,
                "on-demand top-up: reconciliation batch failed"
            );
        }
    }
}

/// The single-instance background loop. Acquires the `"reconciliation"`
/// cron lease before doing anything, so only one running instance scans at
/// a time; every other instance's `run` call simply finds the lease held
/// and waits for the next tick.
pub struct ReconciliationWorker {
    storage: Arc<dyn Storage>,
    clock: SharedClock,
    config: EngineConfig,
    worker_id: String,
}

impl ReconciliationWorker {
    pub fn new(storage: Arc<dyn Storage>, clock: SharedClock, config: EngineConfig, worker_id: String) -> Self {
        Self { storage, clock, config, worker_id }
    }

    /// Runs until `shutdown` reports `true`. Bounded random jitter at
    /// startup avoids a thundering herd when several processes boot at once.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let jitter = fastrand::u64(0..=self.config.reconciliation_startup_jitter.as_millis() as u64);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(jitter)) => {}
            _ = shutdown.changed() => return,
        }

        let mut ticker = tokio::time::interval(self.config.reconciliation_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }
            self.run_cycle(&mut shutdown).await;
        }
    }

    async fn run_cycle(&self, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
        let now = self.clock.now();
        let acquired = match self
            .storage
            .try_acquire_exclusive("reconciliation", &self.worker_id, self.config.lease_ttl, now)
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                tracing::warn!(error = %err, "reconciliation: failed to acquire lease");
                return;
            }
        };
        if !acquired {
            return;
        }

        let grace_cutoff = now - chrono::Duration::from_std(self.config.template_grace_period).unwrap_or_default();
        let templates = match self
            .storage
            .list_templates_needing_reconciliation(now, grace_cutoff, self.config.reconciliation_batch_size as i64)
            .await
        {
            Ok(templates) => templates,
            Err(err) => {
                tracing::warn!(error = %err, "reconciliation: failed to list templates");
                let _ = self.storage.release_exclusive("reconciliation", &self.worker_id).await;
                return;
            }
        };

        for template in &templates {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) =
                reconcile_template(self.storage.as_ref(), self.clock.as_ref(), template, self.config.batch_days).await
            {
                tracing::warn!(template_id = %template.id, error = %err, "reconciliation: batch failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconciliation_rate_limit_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        if let Err(err) = self.storage.release_exclusive("reconciliation", &self.worker_id).await {
            tracing::warn!(error = %err, "reconciliation: failed to release lease");
        }
    }
}
