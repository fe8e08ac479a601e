use std::sync::Arc;

use tokio::sync::watch;

/// Broadcasts a cancellation request to every wait in progress.
///
/// The CLI triggers this on Ctrl-C. Waits observe it through a [CancelListener] and return early so
/// that the caller can release any live fault before exiting.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        // send_replace never fails, even when no listener is subscribed yet.
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> CancelListener {
        CancelListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelListener {
    receiver: watch::Receiver<bool>,
}

impl CancelListener {
    /// Point in time check for a pending cancellation.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation has been requested. Safe to race against other futures.
    pub async fn cancelled(&mut self) {
        // An error means the handle was dropped, which can never cancel us, so wait forever.
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
