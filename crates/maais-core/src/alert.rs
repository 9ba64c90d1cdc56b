//! Alert sinks.
//!
//! The webhook dispatcher is an external collaborator. The gateway only
//! hands it alerts through a bounded channel, so a slow or dead dispatcher
//! can never stall a decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use tracing::warn;

use maais_contracts::alert::Alert;

use crate::traits::AlertSink;

/// Discards every alert. The gateway default when no dispatcher is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _alert: Alert) {}
}

/// Writes each alert to the log at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: Alert) {
        warn!(
            action_id = %alert.action_id,
            agent_id = %alert.agent_id,
            tenant_id = %alert.tenant_id,
            verdict = %alert.verdict,
            rule_id = alert.rule_id.as_deref().unwrap_or("-"),
            sequence = alert.sequence,
            reason = %alert.reason,
            "gate alert"
        );
    }
}

/// Forwards alerts over a bounded channel to a dispatcher thread.
///
/// `notify` uses `try_send`: when the queue is full or the receiver is gone
/// the alert is dropped and counted.
#[derive(Debug)]
pub struct ChannelAlertSink {
    sender: SyncSender<Alert>,
    dropped: AtomicU64,
}

impl ChannelAlertSink {
    /// Create a sink with room for `capacity` undelivered alerts, and the
    /// receiving end for the dispatcher.
    pub fn bounded(capacity: usize) -> (Self, Receiver<Alert>) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let sink = Self {
            sender,
            dropped: AtomicU64::new(0),
        };
        (sink, receiver)
    }

    /// Number of alerts dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, alert: Alert) {
        let reason = match self.sender.try_send(alert) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "alert queue full",
            Err(TrySendError::Disconnected(_)) => "alert dispatcher disconnected",
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(reason, "alert dropped");
    }
}
