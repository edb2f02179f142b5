use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::connection::ConnectionManager;
use crate::app::dispatcher::{EventDispatcher, HandlerId};
use crate::app::notifications::NotificationStore;
use crate::domain::events::{record_for_event, CONNECTED, DISCONNECTED, INBOUND_EVENTS};
use crate::infra::presenter::{Permission, Presenter};
use crate::jobs::status_poller::{self, publish_status};

/// Binds the notification connection to the signed-in user.
///
/// While a user is present the gate keeps the connection requested, feeds
/// inbound events into the store and publishes connection status. Signing out
/// (or dropping the gate) unregisters everything and disconnects.
#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    connection: ConnectionManager,
    dispatcher: EventDispatcher,
    store: NotificationStore,
    presenter: Arc<dyn Presenter>,
    poll_interval: Duration,
    status: Arc<watch::Sender<bool>>,
    permission: Arc<Mutex<Permission>>,
    permission_requested: AtomicBool,
    permission_task: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<GateState>,
}

enum GateState {
    Inactive,
    Active(ActiveSession),
}

struct ActiveSession {
    user_id: String,
    subscriptions: Vec<(&'static str, HandlerId)>,
    poller: JoinHandle<()>,
}

impl SessionGate {
    pub fn new(
        connection: ConnectionManager,
        dispatcher: EventDispatcher,
        store: NotificationStore,
        presenter: Arc<dyn Presenter>,
        poll_interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            inner: Arc::new(GateInner {
                connection,
                dispatcher,
                store,
                presenter,
                poll_interval,
                status: Arc::new(status),
                permission: Arc::new(Mutex::new(Permission::Default)),
                permission_requested: AtomicBool::new(false),
                permission_task: Mutex::new(None),
                state: Mutex::new(GateState::Inactive),
            }),
        }
    }

    /// Applies an auth state change: `Some` activates, `None` deactivates.
    pub fn on_auth_change(&self, user_id: Option<&str>) {
        match user_id {
            Some(user_id) => self.activate(user_id),
            None => self.deactivate(),
        }
    }

    /// Idempotent for the same user. Must be called inside a tokio runtime.
    pub fn activate(&self, user_id: &str) {
        self.inner.request_permission_once();

        let current = match &*self.inner.lock() {
            GateState::Active(active) => Some(active.user_id.clone()),
            GateState::Inactive => None,
        };
        match current {
            Some(current) if current == user_id => {
                debug!(user_id = user_id, "session already active");
                return;
            }
            Some(_) => self.deactivate(),
            None => {}
        }

        let mut state = self.inner.lock();
        if matches!(&*state, GateState::Active(_)) {
            return;
        }
        *state = GateState::Active(self.inner.start(user_id));
        info!(user_id = user_id, "notification session activated");
    }

    pub fn deactivate(&self) {
        let previous = std::mem::replace(&mut *self.inner.lock(), GateState::Inactive);
        if let GateState::Active(session) = previous {
            info!(user_id = %session.user_id, "notification session deactivated");
            self.inner.teardown(session);
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(&*self.inner.lock(), GateState::Active(_))
    }

    pub fn current_user(&self) -> Option<String> {
        match &*self.inner.lock() {
            GateState::Active(active) => Some(active.user_id.clone()),
            GateState::Inactive => None,
        }
    }

    /// Connection status for display; starts `false`.
    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.inner.status.subscribe()
    }

    pub fn permission(&self) -> Permission {
        *lock_permission(&self.inner.permission)
    }
}

impl GateInner {
    fn start(&self, user_id: &str) -> ActiveSession {
        let mut subscriptions = Vec::with_capacity(INBOUND_EVENTS.len() + 2);

        for event in INBOUND_EVENTS {
            let store = self.store.clone();
            let presenter = self.presenter.clone();
            let permission = self.permission.clone();
            let id = self.dispatcher.on(event, move |data| {
                let Some(record) = record_for_event(event, data) else {
                    return Ok(());
                };
                store.add(record.clone());
                if *lock_permission(&permission) == Permission::Granted {
                    if let Err(err) = presenter.present(&record) {
                        debug!(error = ?err, "local notification not shown");
                    }
                }
                Ok(())
            });
            subscriptions.push((event, id));
        }

        let status = self.status.clone();
        let id = self.dispatcher.on(CONNECTED, move |_| {
            publish_status(&status, true);
            Ok(())
        });
        subscriptions.push((CONNECTED, id));

        let status = self.status.clone();
        let id = self.dispatcher.on(DISCONNECTED, move |_| {
            publish_status(&status, false);
            Ok(())
        });
        subscriptions.push((DISCONNECTED, id));

        self.connection.connect(user_id);
        publish_status(&self.status, self.connection.is_connected());
        let poller = tokio::spawn(status_poller::run(
            self.connection.clone(),
            self.status.clone(),
            self.poll_interval,
        ));

        ActiveSession {
            user_id: user_id.to_string(),
            subscriptions,
            poller,
        }
    }

    fn teardown(&self, session: ActiveSession) {
        for (event, id) in session.subscriptions {
            self.dispatcher.off(event, id);
        }
        session.poller.abort();
        self.connection.disconnect();
        publish_status(&self.status, false);
    }

    fn request_permission_once(&self) {
        if self.permission_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let request = self.presenter.request_permission();
        let slot = self.permission.clone();
        let task = tokio::spawn(async move {
            let result = request.await;
            debug!(permission = ?result, "notification permission resolved");
            *lock_permission(&slot) = result;
        });
        *self
            .permission_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for GateInner {
    fn drop(&mut self) {
        if let Some(task) = self
            .permission_task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
        let state = std::mem::replace(
            self.state
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            GateState::Inactive,
        );
        if let GateState::Active(session) = state {
            self.teardown(session);
        }
    }
}

fn lock_permission(slot: &Mutex<Permission>) -> MutexGuard<'_, Permission> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
