//! Change notifications for accounts
//!
//! Events are published after a commit or delete completes and are delivered
//! on a dedicated dispatcher task, never under a store lock:
//! - Per account, delivery order matches commit order
//! - Across accounts, no order is promised

use crate::contract::AccountId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What happened to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First successful commit
    Created,
    /// Later commit
    Updated,
    /// Removed from the store
    Deleted,
}

/// Account change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub kind: EventKind,
    pub account_id: AccountId,
    /// Settings keys written or removed since the previous commit, in any scope
    pub changed_keys: Vec<String>,
    /// Services whose settings or enabled flag changed
    pub changed_services: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AccountEvent {
    pub fn created(
        account_id: AccountId,
        changed_keys: Vec<String>,
        changed_services: Vec<String>,
    ) -> Self {
        Self {
            kind: EventKind::Created,
            account_id,
            changed_keys,
            changed_services,
            timestamp: Utc::now(),
        }
    }

    pub fn updated(
        account_id: AccountId,
        changed_keys: Vec<String>,
        changed_services: Vec<String>,
    ) -> Self {
        Self {
            kind: EventKind::Updated,
            ..Self::created(account_id, changed_keys, changed_services)
        }
    }

    pub fn deleted(account_id: AccountId) -> Self {
        Self {
            kind: EventKind::Deleted,
            ..Self::created(account_id, Vec::new(), Vec::new())
        }
    }
}

/// Narrows which events a subscriber receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Only events for this account
    pub account_id: Option<AccountId>,
    /// Only events touching a key with this prefix; deletions always pass
    pub key_prefix: Option<String>,
}

impl SubscriptionFilter {
    pub fn account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, event: &AccountEvent) -> bool {
        if self.account_id.is_some_and(|id| id != event.account_id) {
            return false;
        }
        match &self.key_prefix {
            Some(prefix) if event.kind != EventKind::Deleted => event
                .changed_keys
                .iter()
                .any(|key| key.starts_with(prefix.as_str())),
            _ => true,
        }
    }
}

pub type EventCallback = Arc<dyn Fn(&AccountEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    filter: SubscriptionFilter,
    callback: EventCallback,
}

type Subscribers = RwLock<Vec<Subscriber>>;

/// Subscription handle; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().retain(|s| s.id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Fan-out of account events to subscribers over an unbounded channel
pub(crate) struct Notifier {
    sender: Mutex<Option<mpsc::UnboundedSender<AccountEvent>>>,
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    /// Spawn the dispatcher task; must be called inside a Tokio runtime
    pub(crate) fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscribers: Arc<Subscribers> = Arc::new(RwLock::new(Vec::new()));
        let dispatcher = tokio::spawn(dispatch(rx, Arc::clone(&subscribers)));

        Self {
            sender: Mutex::new(Some(tx)),
            subscribers,
            next_id: AtomicU64::new(1),
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    pub(crate) fn subscribe(
        &self,
        filter: SubscriptionFilter,
        callback: EventCallback,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber {
            id,
            filter,
            callback,
        });
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub(crate) fn publish(&self, event: AccountEvent) {
        match self.sender.lock().as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::warn!("Notification dispatcher stopped; event dropped");
                }
            }
            None => {
                tracing::debug!(
                    account_id = event.account_id,
                    "Store shut down; event dropped"
                );
            }
        }
    }

    /// Stop accepting events and wait until queued ones are delivered
    pub(crate) async fn close(&self) {
        drop(self.sender.lock().take());
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::warn!("Notification dispatcher ended abnormally: {}", e);
            }
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<AccountEvent>, subscribers: Arc<Subscribers>) {
    while let Some(event) = rx.recv().await {
        let targets: Vec<EventCallback> = subscribers
            .read()
            .iter()
            .filter(|s| s.filter.matches(&event))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        tracing::debug!(
            account_id = event.account_id,
            kind = ?event.kind,
            subscribers = targets.len(),
            "Delivering account event"
        );
        for callback in targets {
            callback(&event);
        }
    }
}
