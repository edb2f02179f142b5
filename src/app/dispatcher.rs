use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

pub type Handler = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// Token returned by `on`, used to unregister that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Named-event registry. Handlers run synchronously, in registration order.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.lock();
        handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns whether a handler was removed.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Invokes every handler for `event`. A failing or panicking handler is
    /// logged and does not stop the rest. Returns the number of handlers run.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        // Snapshot so handlers may call on/off without deadlocking.
        let snapshot: Vec<(HandlerId, Handler)> = match self.lock().get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for (id, handler) in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = ?err, event = event, handler = id.0, "event handler failed");
                }
                Err(_) => {
                    error!(event = event, handler = id.0, "event handler panicked");
                }
            }
        }
        snapshot.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().get(event).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(HandlerId, Handler)>>> {
        // Handlers never run under this lock.
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
