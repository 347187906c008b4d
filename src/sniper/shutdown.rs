use std::future::Future;

use tokio::sync::broadcast;

use super::SniperError;

/// Listens for the process-wide shutdown broadcast.
///
/// Once a signal (or a closed channel) has been observed the receiver stays
/// shut down, so later checks return immediately.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Self {
        Self {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Wait for shutdown. Cancel safe.
    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }

        // Closed and Lagged both mean a sender has fired or gone away.
        let _ = self.notify.recv().await;

        self.is_shutdown = true;
    }

    /// Run a database call, abandoning it with [`SniperError::Cancelled`] if
    /// shutdown fires first (or already has).
    pub async fn guard<T, F>(&mut self, fut: F) -> Result<T, SniperError>
    where
        F: Future<Output = Result<T, SniperError>>,
    {
        if self.is_shutdown {
            return Err(SniperError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.recv() => Err(SniperError::Cancelled),
            res = fut => res,
        }
    }
}
