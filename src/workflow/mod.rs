// Status workflow: the confirm path and its post-commit notifications.

pub mod engine;
pub mod notify;

pub use engine::{ConfirmRequest, WorkflowEngine, MAX_NOTES_LEN};
pub use notify::{LogNotifier, NotificationDispatcher, Notifier, TransitionNotice};

#[cfg(feature = "testing")]
pub use notify::MockNotifier;
