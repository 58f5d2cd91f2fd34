//! Shutdown coordination for the bridge.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Wraps the root cancellation token. Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when shutdown is triggered, and cancellable on its
    /// own without affecting anything else.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the shutdown signal.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_children() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        let clone = shutdown.clone();

        assert!(!shutdown.is_triggered());
        clone.trigger();

        child.cancelled().await;
        shutdown.wait().await;
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn child_cancel_does_not_propagate_up() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        child.cancel();
        assert!(!shutdown.is_triggered());
    }
}
