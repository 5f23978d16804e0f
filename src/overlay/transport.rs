// Overlay Transport - send-only collaborator for the broadcast network
//
// The two failure classes must stay distinguishable: transient failures are
// retried by the supervisor, rejections are terminal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Outcome classes of a broadcast attempt
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Network trouble, node overload, timeouts: worth retrying
    #[error("Transient transport failure: {0}")]
    Transient(String),

    /// The overlay node refused the payload itself: retrying cannot help
    #[error("Payload rejected by overlay: {0}")]
    Rejected(String),
}

/// Receipt returned by a successful broadcast
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    tx_hash: String,
}

impl BroadcastReceipt {
    pub fn new(tx_hash: &str) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
        }
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }
}

/// Trait for overlay network transports
#[async_trait]
pub trait OverlayTransport: Send + Sync {
    /// Broadcast a payload under a topic
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<BroadcastReceipt, TransportError>;
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Outcome the mock produces once its configured failures are exhausted
enum MockOutcome {
    Success,
    Transient(String),
    Rejected(String),
}

/// Mock implementation of OverlayTransport for testing
pub struct MockOverlayTransport {
    outcome: MockOutcome,
    delay_ms: u64,
    transient_failures_before_success: AtomicUsize,
    call_count: AtomicUsize,
}

impl MockOverlayTransport {
    /// Create a new mock (defaults to transient failure)
    pub fn new() -> Self {
        Self {
            outcome: MockOutcome::Transient("mock failure".to_string()),
            delay_ms: 0,
            transient_failures_before_success: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Always succeed
    pub fn with_success(mut self) -> Self {
        self.outcome = MockOutcome::Success;
        self
    }

    /// Always fail transiently with a message
    pub fn with_transient_failure(mut self, message: &str) -> Self {
        self.outcome = MockOutcome::Transient(message.to_string());
        self
    }

    /// Always reject the payload with a message
    pub fn with_rejection(mut self, message: &str) -> Self {
        self.outcome = MockOutcome::Rejected(message.to_string());
        self
    }

    /// Add a delay before responding
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Fail transiently N times, then succeed
    pub fn with_transient_failures_then_success(mut self, failures: usize) -> Self {
        self.outcome = MockOutcome::Success;
        self.transient_failures_before_success = AtomicUsize::new(failures);
        self
    }

    /// How many times send() has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockOverlayTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OverlayTransport for MockOverlayTransport {
    async fn send(&self, _topic: &str, _payload: &[u8]) -> Result<BroadcastReceipt, TransportError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        let failures = self.transient_failures_before_success.load(Ordering::SeqCst);

        if failures > 0 && call_num < failures {
            return Err(TransportError::Transient("mock failure".to_string()));
        }

        match &self.outcome {
            MockOutcome::Success => Ok(BroadcastReceipt::new(&format!("tx-mock-{}", call_num))),
            MockOutcome::Transient(msg) => Err(TransportError::Transient(msg.clone())),
            MockOutcome::Rejected(msg) => Err(TransportError::Rejected(msg.clone())),
        }
    }
}
