//! Delayed follow-up scheduling
//!
//! Payment outcomes are settled a fixed delay after their order is placed.
//! Each pending payment gets a one-shot timer keyed by its correlation ID;
//! when the timer fires the payment is handed back to the owning loop through
//! [`FollowUpScheduler::next_due`], so settlement runs on the loop and never
//! concurrently with other simulation steps. Outstanding timers can be
//! cancelled individually or all at once on shutdown.

use crate::simulator::PendingPayment;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One-shot timers for pending payments.
pub struct FollowUpScheduler {
    tx: mpsc::UnboundedSender<PendingPayment>,
    rx: mpsc::UnboundedReceiver<PendingPayment>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl std::fmt::Debug for FollowUpScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowUpScheduler")
            .field("pending", &self.timers.len())
            .finish()
    }
}

impl FollowUpScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            timers: HashMap::new(),
        }
    }

    /// Schedule `pending` to become due after `delay`.
    ///
    /// Rescheduling an ID that is already pending replaces its timer.
    pub fn schedule(&mut self, pending: PendingPayment, delay: Duration) {
        let key = pending.order_id.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(pending);
        });

        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Wait for the next due payment.
    ///
    /// Pends forever while nothing is scheduled, which makes it safe to use
    /// as a `tokio::select!` branch.
    pub async fn next_due(&mut self) -> Option<PendingPayment> {
        loop {
            let pending = self.rx.recv().await?;
            // A cancelled timer may have fired before it was aborted.
            if self.timers.remove(&pending.order_id).is_some() {
                return Some(pending);
            }
        }
    }

    /// Cancel the timer for one correlation ID.
    pub fn cancel(&mut self, correlation_id: &str) -> bool {
        match self.timers.remove(correlation_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer, returning how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        count
    }

    /// Number of outstanding timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for FollowUpScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FollowUpScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str) -> PendingPayment {
        PendingPayment {
            order_id: id.to_string(),
            customer_id: "c101".to_string(),
            amount: 10.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay_in_order() {
        let mut scheduler = FollowUpScheduler::new();
        scheduler.schedule(pending("ord-2"), Duration::from_secs(2));
        scheduler.schedule(pending("ord-1"), Duration::from_secs(1));
        assert_eq!(scheduler.len(), 2);

        let first = scheduler.next_due().await.unwrap();
        assert_eq!(first.order_id, "ord-1");
        let second = scheduler.next_due().await.unwrap();
        assert_eq!(second.order_id, "ord-2");
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_due_before_delay() {
        let mut scheduler = FollowUpScheduler::new();
        scheduler.schedule(pending("ord-1"), Duration::from_secs(2));

        let early = tokio::time::timeout(Duration::from_millis(1999), scheduler.next_due()).await;
        assert!(early.is_err());

        let due = tokio::time::timeout(Duration::from_millis(10), scheduler.next_due()).await;
        assert_eq!(due.unwrap().unwrap().order_id, "ord-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let mut scheduler = FollowUpScheduler::new();
        scheduler.schedule(pending("ord-1"), Duration::from_secs(1));
        scheduler.schedule(pending("ord-2"), Duration::from_secs(2));

        assert!(scheduler.cancel("ord-1"));
        assert!(!scheduler.cancel("ord-1"));

        let due = scheduler.next_due().await.unwrap();
        assert_eq!(due.order_id, "ord-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let mut scheduler = FollowUpScheduler::new();
        scheduler.schedule(pending("ord-1"), Duration::from_secs(1));
        scheduler.schedule(pending("ord-2"), Duration::from_secs(1));

        assert_eq!(scheduler.cancel_all(), 2);
        assert!(scheduler.is_empty());

        let due = tokio::time::timeout(Duration::from_secs(5), scheduler.next_due()).await;
        assert!(due.is_err());
    }
}
