//! Process-wide shutdown coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared handle that any component can use to ask the host to shut down.
///
/// Clones share state. The first non-zero exit code requested wins.
#[derive(Debug, Clone, Default)]
pub struct ApplicationLifetime {
    stopping: CancellationToken,
    exit_code: Arc<AtomicI32>,
}

impl ApplicationLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown, recording `code` as the process exit status.
    pub fn stop_application(&self, code: i32) {
        if code != 0 {
            let _ = self
                .exit_code
                .compare_exchange(0, code, Ordering::SeqCst, Ordering::SeqCst);
        }
        self.stopping.cancel();
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stopping.is_cancelled()
    }

    /// Resolves when shutdown has been requested.
    pub fn stopping(&self) -> WaitForCancellationFuture<'_> {
        self.stopping.cancelled()
    }

    /// Returns a token cancelled when shutdown is requested.
    pub fn token(&self) -> CancellationToken {
        self.stopping.child_token()
    }

    /// The exit status to report; 0 unless a request carried one.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_zero_code_wins() {
        let lifetime = ApplicationLifetime::new();
        let other = lifetime.clone();

        assert!(!lifetime.is_stopping());
        other.stop_application(0);
        other.stop_application(70);
        lifetime.stop_application(2);

        assert!(lifetime.is_stopping());
        assert_eq!(lifetime.exit_code(), 70);
    }

    #[test]
    fn child_tokens_follow_the_lifetime() {
        let lifetime = ApplicationLifetime::new();
        let token = lifetime.token();
        assert!(!token.is_cancelled());
        lifetime.stop_application(0);
        assert!(token.is_cancelled());
        assert_eq!(lifetime.exit_code(), 0);
    }

    #[tokio::test]
    async fn stopping_resolves_after_request() {
        let lifetime = ApplicationLifetime::new();
        let remote = lifetime.clone();
        tokio::spawn(async move { remote.stop_application(1) });
        lifetime.stopping().await;
        assert_eq!(lifetime.exit_code(), 1);
    }
}
