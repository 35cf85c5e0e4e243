//! Graceful shutdown coordination.
//!
//! A [`ShutdownSignal`] is created once per server run and cloned into every
//! component that must stop with it. Triggering is idempotent; the first
//! reason wins.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::signal;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Why shutdown was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Explicit stop request from code.
    Requested,
    /// A listener failed to start under an all-or-nothing startup policy.
    StartupFailure,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Terminate => "SIGTERM",
            ShutdownReason::Requested => "requested",
            ShutdownReason::StartupFailure => "startup failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast shutdown. Returns `true` only for the call that actually
    /// triggered it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        if first {
            tracing::info!(reason = %reason, "Shutdown signal triggered");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Owned variant of [`triggered`](Self::triggered) for `'static` consumers
    /// such as server graceful-shutdown hooks.
    pub fn triggered_owned(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// If a handler cannot be installed the failure is logged and that source
/// never fires, so explicit triggering keeps working.
pub async fn wait_for_os_signal() -> ShutdownReason {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                ShutdownReason::Terminate
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownReason>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_trigger_wins() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        assert_eq!(signal.reason(), None);

        assert!(signal.trigger(ShutdownReason::Terminate));
        assert!(!signal.trigger(ShutdownReason::Requested));

        assert!(signal.is_triggered());
        assert_eq!(signal.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn clones_observe_the_same_event() {
        let signal = ShutdownSignal::new();
        let a = signal.clone();
        let b = signal.clone();

        let waiters = tokio::spawn(async move {
            tokio::join!(a.triggered(), b.triggered_owned());
        });

        signal.trigger(ShutdownReason::Requested);
        tokio::time::timeout(Duration::from_secs(1), waiters)
            .await
            .expect("waiters should be released")
            .unwrap();
    }

    #[test]
    fn reason_display() {
        assert_eq!(ShutdownReason::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownReason::StartupFailure.to_string(), "startup failure");
    }
}
