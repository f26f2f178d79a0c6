//! SessionWriter - ordered background writes of a session's records
//!
//! Callers enqueue a snapshot while holding the session lock, so records reach
//! the store in mutation order, and release the lock before the I/O happens.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::error::{SessionError, SessionResult};
use super::log::ConversationLog;
use super::persistence::SessionPersistence;
use crate::domain::StructuredPlan;

const QUEUE_CAPACITY: usize = 256;

/// A record write to perform
#[derive(Debug)]
pub enum WriteOp {
    SaveLog(ConversationLog),
    SavePlan(Option<StructuredPlan>),
    /// Remove both records, then store the given log
    Reset(ConversationLog),
    /// No-op, used to wait for everything queued before it
    Flush,
}

struct WriteCommand {
    op: WriteOp,
    reply: Option<oneshot::Sender<SessionResult<()>>>,
}

/// Result of a queued write
pub struct PendingWrite(oneshot::Receiver<SessionResult<()>>);

impl PendingWrite {
    pub async fn wait(self) -> SessionResult<()> {
        self.0.await.map_err(|_| SessionError::WriterClosed)?
    }
}

/// Handle to the writer task of one session
#[derive(Clone)]
pub struct SessionWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl SessionWriter {
    /// Spawn the writer task; it exits once every handle is dropped
    pub fn spawn(persistence: SessionPersistence) -> Self {
        debug!(session_id = %persistence.session_id(), "SessionWriter::spawn: called");
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(writer_loop(persistence, rx));
        Self { tx }
    }

    /// Enqueue a write without waiting for it; failures are logged by the task
    pub async fn submit(&self, op: WriteOp) {
        if self.tx.send(WriteCommand { op, reply: None }).await.is_err() {
            warn!("Session writer is gone, dropping write");
        }
    }

    /// Enqueue a write and return a handle to its result
    ///
    /// The write's place in the queue is fixed once this returns, so the
    /// caller may release its locks before waiting on the handle.
    pub async fn enqueue(&self, op: WriteOp) -> SessionResult<PendingWrite> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WriteCommand {
                op,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SessionError::WriterClosed)?;
        Ok(PendingWrite(reply_rx))
    }

    /// Enqueue a write and wait for its result
    pub async fn write(&self, op: WriteOp) -> SessionResult<()> {
        self.enqueue(op).await?.wait().await
    }

    /// Wait until every write queued so far has been performed
    pub async fn flush(&self) {
        if let Err(e) = self.write(WriteOp::Flush).await {
            warn!(error = %e, "Failed to flush session writes");
        }
    }
}

async fn writer_loop(persistence: SessionPersistence, mut rx: mpsc::Receiver<WriteCommand>) {
    debug!("writer_loop: called");
    while let Some(WriteCommand { op, reply }) = rx.recv().await {
        let result = match op {
            WriteOp::SaveLog(log) => persistence.save_log(&log).await,
            WriteOp::SavePlan(plan) => persistence.save_plan(plan.as_ref()).await,
            WriteOp::Reset(log) => match persistence.clear().await {
                Ok(()) => persistence.save_log(&log).await,
                Err(e) => Err(e),
            },
            WriteOp::Flush => Ok(()),
        };

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to persist session record");
                }
            }
        }
    }
    debug!("writer_loop: all handles dropped, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Turn;
    use sessionstore::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn writer() -> (Arc<MemoryStore>, SessionWriter) {
        let store = Arc::new(MemoryStore::new());
        let persistence = SessionPersistence::new(store.clone(), "shed").unwrap();
        (store, SessionWriter::spawn(persistence))
    }

    #[tokio::test]
    async fn test_submitted_writes_land_in_order() {
        let (store, writer) = writer();
        let first = ConversationLog::from_turns(vec![Turn::assistant("Hello")]);
        let second = ConversationLog::from_turns(vec![Turn::assistant("Hello"), Turn::user("A shed")]);

        writer.submit(WriteOp::SaveLog(first)).await;
        writer.submit(WriteOp::SaveLog(second.clone())).await;
        writer.flush().await;

        let raw = store.get("shed/chat_history").await.unwrap().unwrap();
        let stored: ConversationLog = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_reset_write_replaces_both_records() {
        let (store, writer) = writer();
        writer
            .write(WriteOp::SavePlan(Some(StructuredPlan::default())))
            .await
            .unwrap();

        let log = ConversationLog::from_turns(vec![Turn::assistant("Hello")]);
        writer.write(WriteOp::Reset(log)).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["shed/chat_history".to_string()]);
    }
}
