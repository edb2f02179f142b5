pub mod app;
pub mod config;
pub mod domain;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::app::{
    connection::ConnectionManager, dispatcher::EventDispatcher, notifications::NotificationStore,
    session::SessionGate,
};
use crate::config::RealtimeConfig;
use crate::infra::presenter::{LogPresenter, Presenter};
use crate::infra::socket::{Connector, WsConnector};

/// Composition root: one of each component, wired together. Handles are cheap
/// to clone and can be passed to UI surfaces.
#[derive(Clone)]
pub struct RealtimeCore {
    pub config: RealtimeConfig,
    pub dispatcher: EventDispatcher,
    pub connection: ConnectionManager,
    pub store: NotificationStore,
    pub session: SessionGate,
}

impl RealtimeCore {
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let connection = ConnectionManager::new(&config, connector, dispatcher.clone());
        let store = NotificationStore::new(config.notification_capacity);
        let session = SessionGate::new(
            connection.clone(),
            dispatcher.clone(),
            store.clone(),
            presenter,
            config.status_poll_interval,
        );

        Self {
            config,
            dispatcher,
            connection,
            store,
            session,
        }
    }

    pub fn with_websocket(config: RealtimeConfig) -> Self {
        Self::new(config, Arc::new(WsConnector), Arc::new(LogPresenter))
    }
}
