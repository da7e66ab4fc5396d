use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, EngineError, ErrorKind, Relocation};

/// What one recovery pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub relocated: usize,
    /// No free window within the horizon; retried next pass.
    pub deferred: usize,
    /// Finished or cancelled between the scan and the move.
    pub skipped: usize,
    /// Storage or collaborator faults. The task stays where it was.
    pub failed: usize,
    pub reminded: usize,
}

/// One pass: move every overrunning task, then send almost-due reminders.
pub async fn sweep_once(engine: &Engine) -> SweepReport {
    let mut report = SweepReport::default();
    let now = engine.now();

    for task_id in engine.overdue_tasks(now).await {
        match engine.relocate_task(task_id).await {
            Ok(Relocation::Moved { .. }) => report.relocated += 1,
            Ok(Relocation::Skipped) => report.skipped += 1,
            Err(EngineError::BaysUnavailable { .. }) => {
                metrics::counter!(crate::observability::RELOCATIONS_DEFERRED_TOTAL).increment(1);
                warn!(task = %task_id, "no free bay window for overrunning task, retrying next sweep");
                report.deferred += 1;
            }
            Err(e) if e.kind() == ErrorKind::Internal => {
                metrics::counter!(crate::observability::RELOCATIONS_FAILED_TOTAL).increment(1);
                error!(task = %task_id, code = e.code(), "relocation failed: {e}");
                report.failed += 1;
            }
            Err(e) => {
                // Gone or no longer movable.
                debug!(task = %task_id, "relocation skipped: {e}");
                report.skipped += 1;
            }
        }
    }

    report.reminded = engine.remind_almost_due(engine.now()).await;
    report
}

/// Background recovery loop. Runs until `shutdown` is cancelled.
pub async fn run_recovery(engine: Arc<Engine>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let report = sweep_once(&engine).await;
        if report != SweepReport::default() {
            info!(
                relocated = report.relocated,
                deferred = report.deferred,
                skipped = report.skipped,
                failed = report.failed,
                reminded = report.reminded,
                "recovery sweep"
            );
        }
    }
    debug!("recovery loop stopped");
}

/// Compact the WAL whenever enough appends have piled up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "WAL compacted"),
            Err(e) => error!("WAL compaction failed: {e}"),
        }
    }
    debug!("compactor stopped");
}
