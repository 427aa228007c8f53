//! Live notification of newly stored mail
//!
//! Subscribers receive a [`MailSummary`] for every stored mail. Delivery is
//! best effort: a subscriber whose buffer is full, or whose receiving side is
//! gone, is dropped instead of stalling the broadcaster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use crate::mail::MailItem;

/// Envelope data of a stored mail, without body or attachment contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailSummary {
    pub id: u64,
    pub date_sent: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub subject: String,
    pub xmailer: String,
    pub attachment_count: usize,
}

impl From<&MailItem> for MailSummary {
    fn from(item: &MailItem) -> Self {
        Self {
            id: item.id.unwrap_or_default(),
            date_sent: item.date_sent.clone(),
            from_address: item.from_address.clone(),
            to_addresses: item.to_addresses.clone(),
            subject: item.subject.clone(),
            xmailer: item.xmailer.clone(),
            attachment_count: item.attachment_count(),
        }
    }
}

impl MailSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug)]
struct Inner {
    subscribers: Mutex<HashMap<u64, SyncSender<MailSummary>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, SyncSender<MailSummary>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of live subscribers, cheap to clone
#[derive(Debug, Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster {
    /// `buffer` is the number of summaries held for a subscriber that is
    /// not reading
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer,
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::sync_channel(self.inner.buffer);
        self.inner.subscribers().insert(id, sender);
        debug!(subscriber = id, "Subscriber registered");

        Subscription {
            id,
            receiver,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Sends `summary` to every subscriber and returns how many got it
    pub fn broadcast(&self, summary: &MailSummary) -> usize {
        let mut subscribers = self.inner.subscribers();
        let mut delivered = 0;

        subscribers.retain(|id, sender| match sender.try_send(summary.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = id, "Subscriber is not keeping up, dropping it");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });

        trace!(mail = summary.id, delivered, "Broadcast mail summary");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

/// Receiving end of a subscription. Unregisters itself when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: Receiver<MailSummary>,
    broadcaster: std::sync::Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<MailSummary, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<MailSummary, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocks until the next summary, or until the subscription was dropped
    /// by the broadcaster
    pub fn recv(&self) -> Option<MailSummary> {
        self.receiver.recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.subscribers().remove(&self.id);
        }
    }
}
