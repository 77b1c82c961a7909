//! Log-only notification dispatcher.
//!
//! Delivery transports (SMTP, SMS) are out of scope for the engine; this
//! adapter records every alert through `tracing` so operators can see what
//! would have been sent.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domains::{DispatchError, NotificationDispatcher};
use tracing::info;

#[derive(Default)]
pub struct LogNotifier {
    sent: AtomicU64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        if to.trim().is_empty() {
            return Err(DispatchError("recipient address is empty".into()));
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(to, subject, body_len = body.len(), "notification dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok, block_on};

    #[test]
    fn counts_and_rejects_blank_recipients() {
        let notifier = LogNotifier::new();
        assert_ok!(block_on(notifier.send("a@example.org", "s", "b")));
        assert_err!(block_on(notifier.send("  ", "s", "b")));
        assert_eq!(notifier.sent(), 1);
    }
}
