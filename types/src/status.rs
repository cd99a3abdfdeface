//! Form lifecycle states and the legal edges between them.
//!
//! ```text
//! draft ──submit──▶ submitted ──review──▶ under_review ◀──▶ approved
//!                        │                     ▲  │           ▲
//!                        └──────review─────────┼──┴──▶ rejected
//! ```
//!
//! `draft` is the only unlocked state and nothing returns to it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
}

const STATUS_PARSE_VALUES: &[&str] = &[
    "draft",
    "submitted",
    "under_review",
    "approved",
    "rejected",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} value '{raw}'; expected one of: {expected:?}")]
pub struct EnumParseError {
    kind: &'static str,
    raw: String,
    expected: &'static [&'static str],
}

impl EnumParseError {
    #[must_use]
    pub fn new(kind: &'static str, raw: impl Into<String>, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            raw: raw.into(),
            expected,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Why a requested status change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot submit a form in status {from}; only draft forms can be submitted")]
    NotDraft { from: FormStatus },
    #[error("cannot review a form in status {from}; it has not been submitted")]
    NotSubmitted { from: FormStatus },
    #[error("invalid review transition from {from} to {to}")]
    InvalidReviewTarget { from: FormStatus, to: FormStatus },
}

impl FormStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [FormStatus] {
        &[
            Self::Draft,
            Self::Submitted,
            Self::UnderReview,
            Self::Approved,
            Self::Rejected,
        ]
    }

    /// Lock state implied by this status (`draft` is the only editable one).
    #[must_use]
    pub const fn is_locked(self) -> bool {
        !matches!(self, Self::Draft)
    }

    /// Statuses an administrator may set through review.
    #[must_use]
    pub const fn is_review_target(self) -> bool {
        matches!(self, Self::UnderReview | Self::Approved | Self::Rejected)
    }

    /// `draft → submitted`. Any other source state is refused, including a
    /// form that is already submitted, so duplicate submits are observable.
    pub fn submit(self) -> Result<FormStatus, TransitionError> {
        match self {
            Self::Draft => Ok(Self::Submitted),
            from => Err(TransitionError::NotDraft { from }),
        }
    }

    /// Administrative move between locked states.
    ///
    /// Every locked state can reach `under_review`, `approved` and `rejected`
    /// (re-review after rejection included). `draft` and `submitted` are never
    /// targets, and a draft form cannot be reviewed at all.
    pub fn review(self, to: FormStatus) -> Result<FormStatus, TransitionError> {
        if !self.is_locked() {
            return Err(TransitionError::NotSubmitted { from: self });
        }
        if !to.is_review_target() {
            return Err(TransitionError::InvalidReviewTarget { from: self, to });
        }
        Ok(to)
    }
}

impl FromStr for FormStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| EnumParseError::new("form status", s.trim(), STATUS_PARSE_VALUES))
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_draft_is_unlocked() {
        for status in FormStatus::all() {
            assert_eq!(status.is_locked(), *status != FormStatus::Draft);
        }
    }

    #[test]
    fn submit_only_from_draft() {
        assert_eq!(FormStatus::Draft.submit(), Ok(FormStatus::Submitted));
        for status in &FormStatus::all()[1..] {
            assert_eq!(
                status.submit(),
                Err(TransitionError::NotDraft { from: *status })
            );
        }
    }

    #[test]
    fn review_targets_reachable_from_every_locked_state() {
        let locked = [
            FormStatus::Submitted,
            FormStatus::UnderReview,
            FormStatus::Approved,
            FormStatus::Rejected,
        ];
        let targets = [
            FormStatus::UnderReview,
            FormStatus::Approved,
            FormStatus::Rejected,
        ];
        for from in locked {
            for to in targets {
                assert_eq!(from.review(to), Ok(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn review_never_reopens_or_resubmits() {
        assert_eq!(
            FormStatus::Rejected.review(FormStatus::Draft),
            Err(TransitionError::InvalidReviewTarget {
                from: FormStatus::Rejected,
                to: FormStatus::Draft,
            })
        );
        assert!(FormStatus::UnderReview.review(FormStatus::Submitted).is_err());
    }

    #[test]
    fn review_requires_locked_form() {
        let err = FormStatus::Draft.review(FormStatus::Approved).unwrap_err();
        assert_eq!(err, TransitionError::NotSubmitted { from: FormStatus::Draft });
    }

    #[test]
    fn parse_accepts_wire_names() {
        assert_eq!("under_review".parse::<FormStatus>(), Ok(FormStatus::UnderReview));
        assert_eq!(" Approved ".parse::<FormStatus>(), Ok(FormStatus::Approved));
        assert_eq!("under-review".parse::<FormStatus>(), Ok(FormStatus::UnderReview));
        let err = "archived".parse::<FormStatus>().unwrap_err();
        assert_eq!(err.raw(), "archived");
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&FormStatus::UnderReview).unwrap(),
            "\"under_review\""
        );
    }
}
