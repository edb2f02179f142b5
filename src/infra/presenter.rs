use anyhow::Result;
use futures::future::BoxFuture;
use tracing::info;

use crate::domain::notification::NotificationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not requested yet, or the request has not resolved.
    Default,
    Granted,
    Denied,
}

/// OS-level notification surface, outside the in-app ledger.
pub trait Presenter: Send + Sync + 'static {
    fn request_permission(&self) -> BoxFuture<'static, Permission>;

    fn present(&self, record: &NotificationRecord) -> Result<()>;
}

/// Writes each notification to the log. Used by the headless binary.
#[derive(Debug, Clone, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn request_permission(&self) -> BoxFuture<'static, Permission> {
        Box::pin(async { Permission::Granted })
    }

    fn present(&self, record: &NotificationRecord) -> Result<()> {
        info!(
            id = %record.id,
            kind = record.kind.as_str(),
            title = %record.title,
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Surface with no OS notifications available; permission is always denied.
#[derive(Debug, Clone, Default)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn request_permission(&self) -> BoxFuture<'static, Permission> {
        Box::pin(async { Permission::Denied })
    }

    fn present(&self, _record: &NotificationRecord) -> Result<()> {
        Ok(())
    }
}
