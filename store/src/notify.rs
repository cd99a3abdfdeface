//! Post-commit notifications.
//!
//! The engine hands a [`FormEvent`] to its [`Notifier`] only after the
//! transaction that produced it has committed. A failing notifier is logged
//! and otherwise ignored; it can never undo or fail the operation.

use std::fmt;

use thiserror::Error;

use taxform_types::{AdminId, DocumentId, FilingId, FormId, FormStatus};

/// A committed state change collaborators may want to hear about
/// (email dispatch, document workflow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    FormSubmitted {
        form_id: FormId,
        filing_id: FilingId,
    },
    FormReviewed {
        form_id: FormId,
        admin_id: AdminId,
        status: FormStatus,
    },
    DocumentApproved {
        document_id: DocumentId,
        admin_id: AdminId,
    },
    DocumentRejected {
        document_id: DocumentId,
        admin_id: AdminId,
        reason: String,
    },
}

impl FormEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FormSubmitted { .. } => "form_submitted",
            Self::FormReviewed { .. } => "form_reviewed",
            Self::DocumentApproved { .. } => "document_approved",
            Self::DocumentRejected { .. } => "document_rejected",
        }
    }
}

impl fmt::Display for FormEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormSubmitted { form_id, filing_id } => {
                write!(f, "form {form_id} for filing {filing_id} submitted")
            }
            Self::FormReviewed {
                form_id,
                admin_id,
                status,
            } => write!(f, "form {form_id} moved to {status} by {admin_id}"),
            Self::DocumentApproved {
                document_id,
                admin_id,
            } => write!(f, "document {document_id} approved by {admin_id}"),
            Self::DocumentRejected {
                document_id,
                admin_id,
                reason,
            } => write!(f, "document {document_id} rejected by {admin_id}: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Receiver for committed events. Implementations must not block for long;
/// anything slow belongs on the implementation's own queue.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &FormEvent) -> Result<(), NotifyError>;
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &FormEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Emits each event as a tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &FormEvent) -> Result<(), NotifyError> {
        tracing::info!(event = event.name(), "{event}");
        Ok(())
    }
}

pub(crate) fn dispatch(notifier: &dyn Notifier, event: &FormEvent) {
    if let Err(err) = notifier.notify(event) {
        tracing::warn!(event = event.name(), error = %err, "Notifier failed; operation already committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _event: &FormEvent) -> Result<(), NotifyError> {
            Err(NotifyError("smtp down".into()))
        }
    }

    #[test]
    fn dispatch_swallows_notifier_failures() {
        let event = FormEvent::FormSubmitted {
            form_id: FormId::generate(),
            filing_id: FilingId::new("F1").unwrap(),
        };
        dispatch(&Failing, &event);
        dispatch(&LogNotifier, &event);
        dispatch(&NoopNotifier, &event);
    }

    #[test]
    fn display_describes_event() {
        let event = FormEvent::FormReviewed {
            form_id: FormId::generate(),
            admin_id: AdminId::new("admin1").unwrap(),
            status: FormStatus::Approved,
        };
        assert!(event.to_string().contains("approved by admin1"));
        assert_eq!(event.name(), "form_reviewed");
    }
}
