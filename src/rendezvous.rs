//! Offload + rendezvous (spec.md §5, §9): each offloaded job (encode,
//! peer-RPC, hole-fill) completes via a single-shot status channel the
//! originating task awaits, rather than blocking its own execution
//! context. Grounded in the teacher's `tokio::sync::{mpsc, oneshot}`
//! usage in `src/spdk/destage_manager.rs`.

use tokio::sync::oneshot;
use tokio::task::JoinError;

use crate::error::{Error, Result};

/// A single-shot completion handle for an offloaded job.
pub struct Rendezvous<T> {
    rx: oneshot::Receiver<Result<T>>,
}

/// The sending half, held by the helper execution context running the job.
pub struct RendezvousHandle<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> RendezvousHandle<T> {
    pub fn complete(self, result: Result<T>) {
        // A dropped receiver means the awaiting task was cancelled; the
        // job's result is simply discarded.
        let _ = self.tx.send(result);
    }
}

/// Create a rendezvous pair.
pub fn rendezvous<T>() -> (RendezvousHandle<T>, Rendezvous<T>) {
    let (tx, rx) = oneshot::channel();
    (RendezvousHandle { tx }, Rendezvous { rx })
}

impl<T> Rendezvous<T> {
    /// Suspend until the helper context sets a result.
    pub async fn wait(self) -> Result<T> {
        self.rx
            .await
            .map_err(|_| Error::Codec("offloaded job dropped its rendezvous handle".into()))?
    }
}

/// Run `f` (CPU-heavy, e.g. Reed-Solomon encode) on a blocking-capable
/// helper context and await its result through a rendezvous, matching
/// the "offload CPU-heavy work, suspend on a one-shot handle" model.
pub async fn offload_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (handle, wait) = rendezvous::<T>();
    tokio::task::spawn_blocking(move || {
        handle.complete(f());
    });
    match wait.wait().await {
        Ok(v) => Ok(v),
        Err(e) => Err(e),
    }
}

/// Helper to convert a `JoinError` from a spawned task into the crate's
/// error type, for use by callers that spawn directly instead of going
/// through `offload_blocking`.
pub fn join_error(e: JoinError) -> Error {
    Error::Codec(format!("offloaded task panicked or was cancelled: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offload_blocking_returns_computed_value() {
        let result = offload_blocking(|| Ok::<_, Error>(2 + 2)).await.unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn offload_blocking_propagates_error() {
        let result: Result<i32> = offload_blocking(|| Err(Error::Codec("boom".into()))).await;
        assert!(result.is_err());
    }
}
