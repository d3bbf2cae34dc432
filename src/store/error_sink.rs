use crate::store::Database;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default queue depth for pending error records
pub const DEFAULT_CAPACITY: usize = 64;

/// Error record queued for persistence
#[derive(Clone, Debug)]
pub struct ErrorRecord {
    pub service: String,
    pub error_type: String,
    pub message: String,
}

/// Best-effort side channel for persisting errors.
///
/// `report` never blocks and never fails: when the queue is full or the writer has
/// stopped, the record is dropped with a log line. The writer task only logs its
/// own failures, so a broken database cannot feed errors back into the queue.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<ErrorRecord>,
}

impl ErrorSink {
    /// Spawn the writer task draining into `db`.
    pub fn spawn(db: Arc<Database>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ErrorRecord>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = db.save_error(&record.service, &record.error_type, &record.message) {
                    warn!(
                        service = %record.service,
                        error_type = %record.error_type,
                        error = %e,
                        "Failed to persist error record"
                    );
                } else {
                    debug!(service = %record.service, error_type = %record.error_type, "Saved error");
                }
            }
            debug!("Error sink closed");
        });

        (Self { tx }, handle)
    }

    /// Sink with no writer; every report is dropped. Used where persistence is off.
    pub fn disabled() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }

    /// Queue an error for persistence. Never blocks.
    pub fn report(&self, service: &str, error_type: &str, message: impl Into<String>) {
        let record = ErrorRecord {
            service: service.to_string(),
            error_type: error_type.to_string(),
            message: message.into(),
        };

        if let Err(e) = self.tx.try_send(record) {
            match e {
                mpsc::error::TrySendError::Full(r) => {
                    warn!(service = %r.service, error_type = %r.error_type, "Error queue full, dropping record");
                }
                mpsc::error::TrySendError::Closed(r) => {
                    debug!(service = %r.service, error_type = %r.error_type, "Error sink closed, dropping record");
                }
            }
        }
    }
}
