//! Caller-side stop requests for a poll loop

use tokio::sync::watch;

/// Sending half; call `stop` to end every loop holding a matching StopSignal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Receiving half, cloned into each poll loop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx: Some(rx) })
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_stopped(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once a stop has been requested. Never resolves if the handle
    /// is dropped without stopping.
    pub async fn stopped(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|stopped| *stopped).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::never()
    }
}
