use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use labstock_core::AggregateId;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {stream} event: {message}")]
    Deserialize { stream: &'static str, message: String },

    #[error("event does not belong to stream {0}")]
    StreamMismatch(AggregateId),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-stream cursors so projections stay idempotent under at-least-once delivery.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` for the event at `seq` of stream `aggregate_id`, holding
    /// the cursor lock so concurrent deliveries serialize.
    ///
    /// Replays at or below the cursor are skipped. After the first event a
    /// stream must advance by exactly one.
    pub fn advance<F>(&self, aggregate_id: AggregateId, seq: u64, apply: F) -> Result<(), ProjectionError>
    where
        F: FnOnce() -> Result<(), ProjectionError>,
    {
        let Ok(mut cursors) = self.inner.write() else {
            return Ok(());
        };
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        apply()?;
        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    pub fn position(&self, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&aggregate_id).copied())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        let mut applied = 0;

        cursors.advance(id, 1, || { applied += 1; Ok(()) }).unwrap();
        cursors.advance(id, 1, || { applied += 1; Ok(()) }).unwrap();
        assert_eq!(applied, 1);

        let err = cursors.advance(id, 3, || Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
        assert_eq!(cursors.position(id), 1);
    }

    #[test]
    fn failed_apply_does_not_move_the_cursor() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        let _ = cursors.advance(id, 1, || Err(ProjectionError::StreamMismatch(id)));
        assert_eq!(cursors.position(id), 0);
    }
}
