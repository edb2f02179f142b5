use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DEFAULT_CAPACITY;
use crate::domain::notification::{NotificationKind, NotificationRecord};

const CHANGE_FEED_CAPACITY: usize = 256;

pub const TEST_TITLE: &str = "Test Notification";
pub const TEST_MESSAGE: &str = "This is a test notification from the notification center.";

/// Ledger mutations, in the order they were applied.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Added(NotificationRecord),
    Read(Uuid),
    AllRead,
    Removed(Uuid),
    Evicted(Uuid),
    Cleared,
}

/// Bounded, most-recent-first ledger of notifications with an incrementally
/// maintained unread count. Cloning yields another handle to the same ledger.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<Mutex<Ledger>>,
    changes: broadcast::Sender<LedgerEvent>,
}

struct Ledger {
    records: VecDeque<NotificationRecord>,
    unread: usize,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Ledger {
                records: VecDeque::with_capacity(capacity),
                unread: 0,
                capacity,
            })),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.changes.subscribe()
    }

    pub fn add(&self, record: NotificationRecord) {
        let mut ledger = self.lock();

        if let Some(pos) = ledger.records.iter().position(|r| r.id == record.id) {
            if let Some(replaced) = ledger.records.remove(pos) {
                if !replaced.is_read {
                    ledger.unread = ledger.unread.saturating_sub(1);
                }
            }
        }

        if !record.is_read {
            ledger.unread += 1;
        }
        ledger.records.push_front(record.clone());
        self.publish(LedgerEvent::Added(record));

        while ledger.records.len() > ledger.capacity {
            let Some(evicted) = ledger.records.pop_back() else {
                break;
            };
            if !evicted.is_read {
                ledger.unread = ledger.unread.saturating_sub(1);
            }
            self.publish(LedgerEvent::Evicted(evicted.id));
        }
    }

    /// Returns whether the record went from unread to read.
    pub fn mark_as_read(&self, id: Uuid) -> bool {
        let mut ledger = self.lock();
        let Some(record) = ledger.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if record.is_read {
            return false;
        }
        record.is_read = true;
        ledger.unread = ledger.unread.saturating_sub(1);
        self.publish(LedgerEvent::Read(id));
        true
    }

    pub fn mark_all_as_read(&self) {
        let mut ledger = self.lock();
        for record in ledger.records.iter_mut() {
            record.is_read = true;
        }
        ledger.unread = 0;
        self.publish(LedgerEvent::AllRead);
    }

    pub fn remove(&self, id: Uuid) -> Option<NotificationRecord> {
        let mut ledger = self.lock();
        let pos = ledger.records.iter().position(|r| r.id == id)?;
        let removed = ledger.records.remove(pos)?;
        if !removed.is_read {
            ledger.unread = ledger.unread.saturating_sub(1);
        }
        self.publish(LedgerEvent::Removed(id));
        Some(removed)
    }

    pub fn clear(&self) {
        let mut ledger = self.lock();
        ledger.records.clear();
        ledger.unread = 0;
        self.publish(LedgerEvent::Cleared);
    }

    /// Most recent first.
    pub fn list(&self) -> Vec<NotificationRecord> {
        self.lock().records.iter().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<NotificationRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().unread
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn add_test_notification(&self) -> NotificationRecord {
        let record = NotificationRecord::new(TEST_TITLE, TEST_MESSAGE, NotificationKind::Info);
        self.add(record.clone());
        record
    }

    // Called with the ledger lock held so subscribers see mutation order.
    fn publish(&self, event: LedgerEvent) {
        let _ = self.changes.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
