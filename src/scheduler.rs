//! Scheduler: a periodic loop enqueuing a generation job for
//! any active template whose `generated_through` lags, idempotent against
//! an already-active job for that template. Shares its template-selection
//! query with the reconciliation worker; the two loops differ only in the
//! action taken (enqueue a job here vs. inline materialization there) — see
//! DESIGN.md for how their overlap is resolved.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::coordinator::Coordinator;
use crate::models::NewGenerationJob;
use crate::storage::Storage;

pub struct Scheduler {
    storage: Arc<dyn Storage>,
    coordinator: Arc<Coordinator>,
    clock: SharedClock,
    config: EngineConfig,
}

impl Scheduler {
    pub fn new(storage: Arc<dyn Storage>, coordinator: Arc<Coordinator>, clock: SharedClock, config: EngineConfig) -> Self {
        Self { storage, coordinator, clock, config }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.reconciliation_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }
            self.run_cycle().await;
        }
    }

    async fn run_cycle(&self) {
        let now = self.clock.now();
        let grace_cutoff = now - chrono::Duration::from_std(self.config.template_grace_period).unwrap_or_default();
        let templates = match self
            .storage
            .list_templates_needing_reconciliation(now, grace_cutoff, self.config.reconciliation_batch_size as i64)
            .await
        {
            Ok(templates) => templates,
            Err(err) => {
                tracing::warn!(error = %err, "scheduler: failed to list templates");
                return;
            }
        };

        for template in templates {
            match self.coordinator.has_active_job_for_template(template.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(template_id = %template.id, error = %err, "scheduler: active-job check failed");
                    continue;
                }
            }

            let generate_until = now + Duration::days(template.generation_horizon_days);
            if template.generated_through >= generate_until {
                continue;
            }

            let job = NewGenerationJob {
                template_id: template.id,
                generate_from: template.generated_through,
                generate_until,
                scheduled_for: now,
            };
            if let Err(err) = self.coordinator.enqueue(job).await {
                tracing::warn!(template_id = %template.id, error = %err, "scheduler: failed to enqueue job");
            }
        }
    }
}
