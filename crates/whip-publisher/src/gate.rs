//! One-shot start gate

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// A signal that opens once and stays open.
///
/// The lifecycle monitor fires it when the transport reports "connected";
/// the pacer waits on it before releasing its first sample. Firing again is
/// a no-op.
#[derive(Debug, Clone, Default)]
pub struct StartGate {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl StartGate {
    /// Create a closed gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Returns `true` only for the call that actually opened it.
    pub fn fire(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if first {
            self.token.cancel();
        }
        first
    }

    /// Whether the gate has been opened
    pub fn is_open(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the gate is opened
    pub async fn opened(&self) {
        self.token.cancelled().await
    }
}
