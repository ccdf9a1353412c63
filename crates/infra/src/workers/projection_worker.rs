use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use labstock_events::{EventBus, EventEnvelope, Subscription};

use crate::projections::StockProjections;

const TICK: Duration = Duration::from_millis(50);

/// Envelopes the worker has processed so far.
#[derive(Debug, Default)]
pub struct WorkerStats {
    applied: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Stop the worker once everything already queued has been applied.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!(worker = self.name, "projection worker panicked");
            }
        }
        debug!(
            worker = self.name,
            applied = self.stats.applied(),
            failed = self.stats.failed(),
            "projection worker stopped"
        );
    }
}

/// Keeps the stock read models in step with the bus.
///
/// A failed envelope is logged and skipped; the read models recover on the
/// next startup rebuild. Redelivery is harmless because every projection
/// tracks its per-stream cursor.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// The subscription is taken before the thread starts, so nothing
    /// published after `spawn` returns is missed.
    pub fn spawn<B>(name: &'static str, bus: &B, projections: Arc<StockProjections>) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();
        let stats = Arc::new(WorkerStats::default());

        let join = {
            let stats = stats.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || run(name, &sub, &shutdown_rx, &projections, &stats))?
        };

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn run(
    name: &'static str,
    sub: &Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: &mpsc::Receiver<()>,
    projections: &StockProjections,
    stats: &WorkerStats,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            for envelope in sub.drain() {
                apply(name, projections, stats, &envelope);
            }
            return;
        }

        match sub.recv_timeout(TICK) {
            Ok(envelope) => apply(name, projections, stats, &envelope),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn apply(name: &'static str, projections: &StockProjections, stats: &WorkerStats, envelope: &EventEnvelope<JsonValue>) {
    match projections.apply_envelope(envelope) {
        Ok(()) => {
            stats.applied.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker = name,
                error = %err,
                stream = envelope.aggregate_type(),
                aggregate_id = %envelope.aggregate_id(),
                sequence = envelope.sequence_number(),
                "projection failed to apply event"
            );
        }
    }
}
