use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::app::dispatcher::{EventDispatcher, HandlerId};
use crate::config::reconnect::ReconnectPolicy;
use crate::config::RealtimeConfig;
use crate::domain::events::{
    BookingUpdateEcho, Envelope, WellnessUpdateEcho, BOOKING_UPDATE, CONNECTED, CONNECT_ERROR,
    DISCONNECTED, INBOUND_EVENTS, JOIN, RECONNECT_ERROR, WELLNESS_UPDATE,
};
use crate::infra::socket::{Connector, TransportError, TransportErrorKind, TransportLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the single connection to the notification server.
///
/// `connect` starts a background driver that dials, retries with backoff and
/// routes inbound frames to the dispatcher. A dropped link is only reported
/// as `disconnected` once the grace window passes without a reconnect, and
/// `is_connected` follows that reported status. Call `disconnect` to stop all
/// background work.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    endpoint: Url,
    policy: ReconnectPolicy,
    grace: Duration,
    session: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    // Bumped by every connect/disconnect; stale tasks compare and bail out.
    generation: u64,
    user_id: Option<String>,
    driver: Option<JoinHandle<()>>,
    link: Option<LiveLink>,
    online: bool,
    offline_epoch: u64,
    pending_offline: Option<JoinHandle<()>>,
}

struct LiveLink {
    connection_id: String,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl ConnectionManager {
    pub fn new(config: &RealtimeConfig, connector: Arc<dyn Connector>, dispatcher: EventDispatcher) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                dispatcher,
                endpoint: config.endpoint.clone(),
                policy: config.reconnect,
                grace: config.disconnect_grace,
                session: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Starts a session for `user_id`. A no-op when a session for the same
    /// user already exists; a different user replaces the current session.
    pub fn connect(&self, user_id: &str) {
        let mut session = self.lock();
        if session.driver.is_some() {
            if session.user_id.as_deref() == Some(user_id) {
                debug!(user_id = user_id, "already connected, reusing session");
                return;
            }
            info!(user_id = user_id, "switching notification session to new user");
            Self::reset(&mut session);
        }

        session.generation += 1;
        session.user_id = Some(user_id.to_string());
        let generation = session.generation;
        let manager = self.clone();
        let user = user_id.to_string();
        session.driver = Some(tokio::spawn(async move {
            manager.drive(generation, user).await;
        }));
        info!(user_id = user_id, endpoint = %self.inner.endpoint, "notification connection requested");
    }

    /// Tears the session down immediately. Pending reconnects and grace
    /// timers are cancelled.
    pub fn disconnect(&self) {
        let was_online = {
            let mut session = self.lock();
            if session.driver.is_none() && session.link.is_none() {
                return;
            }
            let was_online = session.online;
            Self::reset(&mut session);
            was_online
        };

        info!("notification connection closed by client");
        if was_online {
            self.inner
                .dispatcher
                .emit(DISCONNECTED, &json!({ "reason": "client disconnect" }));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().online
    }

    pub fn state(&self) -> ConnectionState {
        let session = self.lock();
        if session.online {
            ConnectionState::Connected
        } else if session.driver.is_some() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn connection_id(&self) -> Option<String> {
        self.lock()
            .link
            .as_ref()
            .map(|link| link.connection_id.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock().user_id.clone()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, handler)
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.inner.dispatcher.off(event, id)
    }

    /// Best-effort outbound send. Returns `false` when there is no live link.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        let session = self.lock();
        match session.link.as_ref() {
            Some(link) => link.outbound.send(Envelope::new(event, payload)).is_ok(),
            None => {
                debug!(event = event, "not connected, dropping outbound message");
                false
            }
        }
    }

    pub fn send_booking_update(&self, user_id: &str, message: &str) -> bool {
        self.emit_json(
            BOOKING_UPDATE,
            &BookingUpdateEcho {
                user_id: user_id.to_string(),
                message: message.to_string(),
                timestamp: OffsetDateTime::now_utc(),
            },
        )
    }

    pub fn send_wellness_update(&self, practitioner_id: &str, patient_name: &str) -> bool {
        self.emit_json(
            WELLNESS_UPDATE,
            &WellnessUpdateEcho {
                practitioner_id: practitioner_id.to_string(),
                patient_name: patient_name.to_string(),
                timestamp: OffsetDateTime::now_utc(),
            },
        )
    }

    fn emit_json<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(event, value),
            Err(err) => {
                warn!(error = ?err, event = event, "failed to encode outbound payload");
                false
            }
        }
    }

    async fn drive(self, generation: u64, user_id: String) {
        let policy = self.inner.policy;
        let mut attempt: u32 = 0;
        let mut had_link = false;

        loop {
            let dial = self.inner.connector.connect(&self.inner.endpoint);
            let (kind, failure) = match tokio::time::timeout(policy.connect_timeout, dial).await {
                Ok(Ok(link)) => {
                    let TransportLink { outbound, mut inbound } = link;
                    let Some(connection_id) = self.link_up(generation, &user_id, outbound) else {
                        return;
                    };
                    had_link = true;

                    while let Some(envelope) = inbound.recv().await {
                        if !self.is_current(generation) {
                            return;
                        }
                        self.route(envelope);
                    }

                    if !self.link_down(generation, &connection_id) {
                        return;
                    }
                    tokio::time::sleep(policy.delay_for(0)).await;
                    attempt = 1;
                    continue;
                }
                Ok(Err(err)) => (
                    err.downcast_ref::<TransportError>().map(TransportError::kind),
                    err.to_string(),
                ),
                Err(_) => (
                    Some(TransportErrorKind::Timeout),
                    TransportError::timeout(format!(
                        "no response from {} within {:?}",
                        self.inner.endpoint, policy.connect_timeout
                    ))
                    .to_string(),
                ),
            };

            if !self.report_failure(generation, had_link, attempt, kind, &failure) {
                return;
            }
            let delay = policy.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }

    fn link_up(
        &self,
        generation: u64,
        user_id: &str,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) -> Option<String> {
        let connection_id = Uuid::new_v4().to_string();
        let announce = {
            let mut session = self.lock();
            if session.generation != generation {
                return None;
            }

            if outbound
                .send(Envelope::new(JOIN, Value::String(user_id.to_string())))
                .is_err()
            {
                warn!(user_id = user_id, "link closed before join could be sent");
            }
            session.link = Some(LiveLink {
                connection_id: connection_id.clone(),
                outbound,
            });
            session.offline_epoch += 1;
            if let Some(pending) = session.pending_offline.take() {
                pending.abort();
            }
            let announce = !session.online;
            session.online = true;
            announce
        };

        info!(user_id = user_id, connection_id = %connection_id, "notification connection established");
        if announce {
            self.inner.dispatcher.emit(
                CONNECTED,
                &json!({ "connectionId": connection_id, "userId": user_id }),
            );
        }
        Some(connection_id)
    }

    fn link_down(&self, generation: u64, connection_id: &str) -> bool {
        let mut session = self.lock();
        if session.generation != generation {
            return false;
        }

        session.link = None;
        session.offline_epoch += 1;
        if let Some(pending) = session.pending_offline.take() {
            pending.abort();
        }
        if session.online {
            let epoch = session.offline_epoch;
            let grace = self.inner.grace;
            let manager = self.clone();
            session.pending_offline = Some(tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                manager.surface_offline(generation, epoch);
            }));
        }

        warn!(connection_id = connection_id, "notification link dropped, reconnecting");
        true
    }

    fn surface_offline(&self, generation: u64, epoch: u64) {
        {
            let mut session = self.lock();
            if session.generation != generation
                || session.offline_epoch != epoch
                || session.link.is_some()
                || !session.online
            {
                return;
            }
            session.online = false;
            session.pending_offline = None;
        }

        warn!("notification connection offline");
        self.inner
            .dispatcher
            .emit(DISCONNECTED, &json!({ "reason": "transport close" }));
    }

    fn report_failure(
        &self,
        generation: u64,
        had_link: bool,
        attempt: u32,
        kind: Option<TransportErrorKind>,
        message: &str,
    ) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let event = if had_link { RECONNECT_ERROR } else { CONNECT_ERROR };
        warn!(
            error = message,
            kind = ?kind,
            attempt = attempt,
            event = event,
            "notification connection attempt failed"
        );
        self.inner
            .dispatcher
            .emit(event, &json!({ "message": message, "attempt": attempt }));
        true
    }

    fn route(&self, envelope: Envelope) {
        if INBOUND_EVENTS.contains(&envelope.event.as_str()) {
            self.inner.dispatcher.emit(&envelope.event, &envelope.data);
        } else {
            debug!(event = %envelope.event, "ignoring unhandled server event");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn reset(session: &mut SessionState) {
        session.generation += 1;
        if let Some(driver) = session.driver.take() {
            driver.abort();
        }
        if let Some(pending) = session.pending_offline.take() {
            pending.abort();
        }
        session.link = None;
        session.online = false;
        session.user_id = None;
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
