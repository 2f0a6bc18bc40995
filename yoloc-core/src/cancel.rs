//! Cooperative cancellation shared by every remote call of a run.

use std::future::Future;

use tokio::sync::watch;

use crate::error::{Result, YolocError};

/// Cancels every [`CancelToken`] cloned from its pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation of a run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        cancel_pair().1
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Return `Err(Cancelled)` if cancellation has been signalled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(YolocError::Cancelled);
        }
        Ok(())
    }

    /// Resolve once cancellation is signalled; pending forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` to completion unless the run is cancelled first.
    ///
    /// Cancellation is reported as [`YolocError::Cancelled`] converted into
    /// the future's error type.
    pub async fn guard<T, E, F>(&self, fut: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<YolocError>,
    {
        if self.is_cancelled() {
            return Err(YolocError::Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(YolocError::Cancelled.into()),
            outcome = fut => outcome,
        }
    }
}

/// Cancels its token when dropped, e.g. when a request future is abandoned.
#[derive(Debug)]
pub struct CancelOnDrop(CancelHandle);

impl CancelOnDrop {
    /// Wrap a handle.
    pub fn new(handle: CancelHandle) -> Self {
        Self(handle)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
