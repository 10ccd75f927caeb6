use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::context::GateContext;
use crate::config::SchedulerConfig;
use crate::models::MarketSnapshot;
use crate::trigger::{GateDecision, TriggerSignal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub snapshots: usize,
    pub symbols: usize,
    pub admitted: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub ticks: u64,
    pub snapshots: usize,
    pub admitted: usize,
    pub blocked: usize,
}

/// Periodic driver: drains snapshots, evaluates them per symbol on a bounded
/// worker pool and forwards admitted signals.
pub struct Scheduler {
    context: Arc<GateContext>,
    config: SchedulerConfig,
    snapshots: mpsc::Receiver<MarketSnapshot>,
    signals: mpsc::Sender<TriggerSignal>,
    workers: Arc<Semaphore>,
    validation: Option<JoinHandle<()>>,
    ticks: u64,
    input_closed: bool,
}

impl Scheduler {
    pub fn new(
        context: Arc<GateContext>,
        snapshots: mpsc::Receiver<MarketSnapshot>,
        signals: mpsc::Sender<TriggerSignal>,
    ) -> Self {
        let config = context.config().scheduler.clone();
        let workers = Arc::new(Semaphore::new(config.worker_count));
        Self {
            context,
            config,
            snapshots,
            signals,
            workers,
            validation: None,
            ticks: 0,
            input_closed: false,
        }
    }

    /// Run until `shutdown` resolves or the snapshot channel closes and is drained
    pub async fn run<F>(mut self, shutdown: F) -> SchedulerSummary
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut summary = SchedulerSummary::default();
        tracing::info!(
            "⏱️  Scheduler started: tick {}ms, {} workers",
            self.config.tick_interval_ms,
            self.config.worker_count
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    summary.ticks += 1;
                    summary.snapshots += report.snapshots;
                    summary.admitted += report.admitted;
                    summary.blocked += report.blocked;

                    if self.input_closed {
                        tracing::info!("Snapshot feed closed, scheduler stopping");
                        break;
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, scheduler stopping");
                    break;
                }
            }
        }

        if let Some(handle) = self.validation.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Monte Carlo refresh task failed: {}", e);
            }
        }

        tracing::info!(
            "Scheduler finished: {} ticks, {} snapshots, {} admitted, {} blocked",
            summary.ticks,
            summary.snapshots,
            summary.admitted,
            summary.blocked
        );
        summary
    }

    /// One evaluation round. Completes before the next tick starts.
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;

        let context = self.context.clone();
        match tokio::task::spawn_blocking(move || context.roll_windows(Utc::now())).await {
            Ok(Ok(rolled)) if !rolled.is_empty() => tracing::info!("Rolled budget windows: {:?}", rolled),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Budget roll-over skipped: {}", e),
            Err(e) => tracing::error!("Budget roll-over task panicked: {}", e),
        }

        let batch = self.drain();
        let groups = group_by_symbol(batch);
        let mut report = TickReport {
            snapshots: groups.iter().map(|(_, g)| g.len()).sum(),
            symbols: groups.len(),
            ..Default::default()
        };

        let mut jobs = JoinSet::new();
        for (symbol, group) in groups {
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Worker pool closed, dropping {} snapshots for {}", group.len(), symbol);
                    continue;
                }
            };
            let context = self.context.clone();

            jobs.spawn(async move {
                let _permit = permit;
                group
                    .iter()
                    .map(|snapshot| context.evaluate(snapshot))
                    .collect::<Vec<_>>()
            });
        }

        while let Some(result) = jobs.join_next().await {
            let decisions = match result {
                Ok(decisions) => decisions,
                Err(e) => {
                    tracing::error!("Evaluation job failed: {}", e);
                    continue;
                }
            };

            for decision in decisions {
                match decision {
                    GateDecision::Admitted(signal) => {
                        report.admitted += 1;
                        if self.signals.send(signal).await.is_err() {
                            tracing::warn!("Signal receiver dropped");
                        }
                    }
                    GateDecision::Blocked { .. } => report.blocked += 1,
                    GateDecision::NoSignal => {}
                }
            }
        }

        if self.config.validation_every_ticks > 0
            && self.ticks % self.config.validation_every_ticks == 0
        {
            self.spawn_validation();
        }

        report
    }

    /// Start a background Monte Carlo refresh unless one is still running.
    ///
    /// Snapshotting the history and the simulation both run on the blocking
    /// pool. Returns false when a previous refresh is still in flight.
    pub fn spawn_validation(&mut self) -> bool {
        if self.validation.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let context = self.context.clone();
        self.validation = Some(tokio::spawn(async move {
            let worker = context.clone();
            let refreshed = tokio::task::spawn_blocking(move || {
                let Some(job) = worker.validation_job()? else {
                    return Ok(None);
                };
                let report = job.run()?;
                Ok::<_, crate::error::Error>(Some((job.generation, report)))
            })
            .await;

            match refreshed {
                Ok(Ok(Some((generation, report)))) => {
                    if context.store_validation(generation, report) {
                        tracing::info!("🎲 Monte Carlo refresh stored (generation {})", generation);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!("Monte Carlo refresh skipped: {}", e),
                Err(e) => tracing::error!("Monte Carlo worker panicked: {}", e),
            }
        }));
        true
    }

    fn drain(&mut self) -> Vec<MarketSnapshot> {
        let mut batch = Vec::new();
        loop {
            match self.snapshots.try_recv() {
                Ok(snapshot) => batch.push(snapshot),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.input_closed = true;
                    break;
                }
            }
        }
        batch
    }
}

/// Group by symbol keeping arrival order within each group and first-seen order across groups
fn group_by_symbol(batch: Vec<MarketSnapshot>) -> Vec<(String, Vec<MarketSnapshot>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<MarketSnapshot>)> = Vec::new();

    for snapshot in batch {
        match index.get(&snapshot.symbol) {
            Some(&i) => groups[i].1.push(snapshot),
            None => {
                index.insert(snapshot.symbol.clone(), groups.len());
                groups.push((snapshot.symbol.clone(), vec![snapshot]));
            }
        }
    }

    groups
}
