pub mod connection;
pub mod dispatcher;
pub mod notifications;
pub mod session;
