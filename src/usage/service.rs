use super::{StorageError, UsageGuard, UsageRecord, UsageSnapshot};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

enum Command {
    IsAllowed(oneshot::Sender<Result<bool, StorageError>>),
    Record(oneshot::Sender<Result<UsageRecord, StorageError>>),
    Snapshot(oneshot::Sender<Result<UsageSnapshot, StorageError>>),
}

/// Handle to the thread that owns the [`UsageGuard`].
///
/// Every command is handled to completion before the next one is read,
/// so concurrent `record_usage` calls never lose an increment.
#[derive(Clone)]
pub struct UsageService {
    tx: mpsc::Sender<Command>,
    limit: u32,
}

impl UsageService {
    pub fn spawn(guard: UsageGuard) -> std::io::Result<Self> {
        let limit = guard.limit();
        let (tx, mut rx) = mpsc::channel::<Command>(64);
        std::thread::Builder::new()
            .name("usage-guard".into())
            .spawn(move || {
                while let Some(cmd) = rx.blocking_recv() {
                    // A dropped receiver only means the caller went away.
                    match cmd {
                        Command::IsAllowed(reply) => {
                            let _ = reply.send(guard.is_allowed());
                        }
                        Command::Record(reply) => {
                            let _ = reply.send(guard.record_usage());
                        }
                        Command::Snapshot(reply) => {
                            let _ = reply.send(guard.snapshot());
                        }
                    }
                }
                debug!("usage guard thread exiting");
            })?;
        Ok(Self { tx, limit })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, StorageError>>) -> Command,
    ) -> Result<T, StorageError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(make(reply_tx)).await.is_err() {
            warn!("usage guard thread is gone");
            return Err(StorageError::Unavailable);
        }
        reply_rx.await.map_err(|_| StorageError::Unavailable)?
    }

    pub async fn is_allowed(&self) -> Result<bool, StorageError> {
        self.request(Command::IsAllowed).await
    }

    pub async fn record_usage(&self) -> Result<UsageRecord, StorageError> {
        self.request(Command::Record).await
    }

    pub async fn snapshot(&self) -> Result<UsageSnapshot, StorageError> {
        self.request(Command::Snapshot).await
    }
}
