//! User-facing notices via the `Notifier` trait.
//!
//! Components that want to tell the user something (a custom term was
//! recorded, the vocabulary was reloaded) take a notifier at construction:
//! - hosts with a UI implement `Notifier` and forward to their toast/status bar
//! - the CLI uses `TracingNotifier`
//! - tests and headless callers use `NoopNotifier`

use std::sync::Arc;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// Sink for user-facing notices. Fire-and-forget: implementations must not
/// fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Notifier that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _level: NoticeLevel, _message: &str) {}
}

/// Notifier that forwards to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = message),
            NoticeLevel::Warning => tracing::warn!(notice = message),
            NoticeLevel::Error => tracing::error!(notice = message),
        }
    }
}

pub fn noop() -> Arc<dyn Notifier> {
    Arc::new(NoopNotifier)
}
