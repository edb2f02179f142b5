use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Notification";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Booking,
    Wellness,
    System,
    Error,
    Success,
    Info,
    /// Server-supplied category this client does not know; kept verbatim.
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Booking => "booking",
            NotificationKind::Wellness => "wellness",
            NotificationKind::System => "system",
            NotificationKind::Error => "error",
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
            NotificationKind::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NotificationKind::Other(_))
    }

    /// Presentation label; unknown categories fall back to the generic one.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Booking => "Booking",
            NotificationKind::Wellness => "Wellness",
            NotificationKind::System => "System",
            NotificationKind::Error => "Error",
            NotificationKind::Success => "Success",
            NotificationKind::Info => "Info",
            NotificationKind::Other(_) => DEFAULT_TITLE,
        }
    }
}

impl From<&str> for NotificationKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "booking" => NotificationKind::Booking,
            "wellness" => NotificationKind::Wellness,
            "system" => NotificationKind::System,
            "error" => NotificationKind::Error,
            "success" => NotificationKind::Success,
            "info" => NotificationKind::Info,
            _ => NotificationKind::Other(value.to_string()),
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        NotificationKind::from(value.as_str())
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_read: bool,
    pub payload: Value,
}

impl NotificationRecord {
    /// Fresh unread record with a new id, stamped now.
    pub fn new(title: impl Into<String>, message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind,
            timestamp: OffsetDateTime::now_utc(),
            is_read: false,
            payload: Value::Object(Default::default()),
        }
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Parses a server timestamp, falling back to the current time when it is
/// missing or not RFC 3339.
pub fn timestamp_or_now(raw: Option<&str>) -> OffsetDateTime {
    match raw {
        Some(raw) => match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(error = %err, timestamp = raw, "unparseable timestamp, using now");
                OffsetDateTime::now_utc()
            }
        },
        None => OffsetDateTime::now_utc(),
    }
}
