//! Sale lifecycle: scheduler-driven state transitions.
//!
//! `scheduled → active → ended`, with `scheduled → cancelled` as the only
//! other transition; nothing is reversible. Transitions are derived from
//! timestamps already persisted, never from scheduler-local memory, so a
//! crashed scheduler simply catches up on its next tick with no data loss.

use crate::engine::AllocationEngine;
use crate::error::EngineResult;
use std::time::Duration;

impl AllocationEngine {
    /// Promote every scheduled sale whose start time has passed.
    ///
    /// Idempotent: a tick that finds nothing due is a no-op. For each
    /// promoted sale, interested buyers are notified fire-and-forget; a
    /// dispatch failure is the dispatcher's problem, never a reason to roll
    /// back or delay the activation. Returns the number of sales promoted.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self))]
    pub async fn promote_scheduled_sales(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let promoted = self.repository.promote_due_sales(now).await?;
        if promoted.is_empty() {
            return Ok(0);
        }

        metrics::counter!("flash_sale_promoted_total").increment(promoted.len() as u64);
        for sale in &promoted {
            tracing::info!(sale_id = %sale.id, title = %sale.title, "sale activated");

            let allocations = self.repository.allocations_by_sale(sale.id).await?;
            let allocation_ids = allocations.into_iter().map(|a| a.id).collect();
            let notifier = self.notifier.clone();
            let title = sale.title.clone();
            let message = format!("{title} is live now, limited stock!");
            tokio::spawn(async move {
                notifier
                    .notify_interested_buyers(allocation_ids, title, message)
                    .await;
            });
        }

        self.cache.invalidate().await;
        Ok(promoted.len())
    }

    /// End every active sale whose end time has passed. No further
    /// reservations succeed against an ended sale regardless of remaining
    /// stock. Idempotent; returns the number of sales closed.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self))]
    pub async fn close_expired_sales(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let ended = self.repository.close_expired_sales(now).await?;
        if ended.is_empty() {
            return Ok(0);
        }

        metrics::counter!("flash_sale_ended_total").increment(ended.len() as u64);
        for sale in &ended {
            tracing::info!(sale_id = %sale.id, title = %sale.title, "sale ended");
        }

        self.cache.invalidate().await;
        Ok(ended.len())
    }
}

/// Periodic background task that drives lifecycle transitions.
///
/// A plain `tokio` interval: every tick runs the two idempotent transition
/// functions. Tick errors are logged and the loop keeps going; state lives
/// in the repository, so a failed tick is retried for free by the next one.
#[derive(Debug, Clone)]
pub struct LifecycleScheduler {
    engine: AllocationEngine,
    tick: Duration,
}

impl LifecycleScheduler {
    /// Create a scheduler ticking at the given interval (typically one
    /// minute).
    #[must_use]
    pub const fn new(engine: AllocationEngine, tick: Duration) -> Self {
        Self { engine, tick }
    }

    /// Run one tick: promote due sales, then close expired ones.
    pub async fn tick(&self) {
        match self.engine.promote_scheduled_sales().await {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "scheduler promoted sales"),
            Err(err) => tracing::error!(error = %err, "scheduler promotion tick failed"),
        }
        match self.engine.close_expired_sales().await {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "scheduler closed sales"),
            Err(err) => tracing::error!(error = %err, "scheduler close tick failed"),
        }
        metrics::counter!("flash_sale_scheduler_ticks_total").increment(1);
    }

    /// Tick forever. Spawn this on the runtime; drop the task to stop.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
