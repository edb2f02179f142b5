use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::notification::{
    timestamp_or_now, NotificationKind, NotificationRecord, DEFAULT_TITLE,
};

// Inbound server events
pub const NOTIFICATION: &str = "notification";
pub const BOOKING_UPDATE: &str = "booking_update";
pub const WELLNESS_UPDATE: &str = "wellness_update";

pub const INBOUND_EVENTS: [&str; 3] = [NOTIFICATION, BOOKING_UPDATE, WELLNESS_UPDATE];

// Outbound
pub const JOIN: &str = "join";

// Local lifecycle events published by the connection manager
pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";
pub const CONNECT_ERROR: &str = "connect_error";
pub const RECONNECT_ERROR: &str = "reconnect_error";

pub const BOOKING_TITLE: &str = "Booking Update";
pub const WELLNESS_TITLE: &str = "Wellness Update";
pub const WELLNESS_MESSAGE: &str = "New wellness data available";

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Builds a generic record. Fields of the wrong type fall back to their
/// defaults so a sloppy payload still lands in the ledger.
pub fn notification_record(data: &Value) -> NotificationRecord {
    let title = string_field(data, "title")
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let message = string_field(data, "message").unwrap_or_default();
    let kind = string_field(data, "type")
        .map(NotificationKind::from)
        .unwrap_or(NotificationKind::Info);
    let payload = match data.get("data") {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(payload) => payload.clone(),
    };

    NotificationRecord::new(title, message, kind)
        .with_timestamp(timestamp_or_now(string_field(data, "timestamp").as_deref()))
        .with_payload(payload)
}

/// Builds a booking record; the whole event body is kept as payload.
pub fn booking_record(data: &Value) -> NotificationRecord {
    let message = string_field(data, "message").unwrap_or_default();
    NotificationRecord::new(BOOKING_TITLE, message, NotificationKind::Booking)
        .with_timestamp(timestamp_or_now(string_field(data, "timestamp").as_deref()))
        .with_payload(data.clone())
}

pub fn wellness_record(data: &Value) -> NotificationRecord {
    let message = string_field(data, "message")
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| WELLNESS_MESSAGE.to_string());
    NotificationRecord::new(WELLNESS_TITLE, message, NotificationKind::Wellness)
        .with_timestamp(timestamp_or_now(string_field(data, "timestamp").as_deref()))
        .with_payload(data.clone())
}

/// Converts any of the three inbound categories into a record. Returns `None`
/// for other event names.
pub fn record_for_event(event: &str, data: &Value) -> Option<NotificationRecord> {
    match event {
        NOTIFICATION => Some(notification_record(data)),
        BOOKING_UPDATE => Some(booking_record(data)),
        WELLNESS_UPDATE => Some(wellness_record(data)),
        _ => None,
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdateEcho {
    pub user_id: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessUpdateEcho {
    pub practitioner_id: String,
    pub patient_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
