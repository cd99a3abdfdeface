use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} exceeds {MAX_ID_LEN} bytes")]
    TooLong { kind: &'static str },
    #[error("invalid {kind} '{raw}': expected a UUID")]
    NotUuid { kind: &'static str, raw: String },
}

pub const MAX_ID_LEN: usize = 255;

/// Opaque identifiers handed to us by collaborators (filing service, identity
/// provider, form-definition taxonomy). Any non-empty string up to
/// [`MAX_ID_LEN`] bytes is accepted as is.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(IdError::Empty { kind: $kind });
                }
                if value.len() > MAX_ID_LEN {
                    return Err(IdError::TooLong { kind: $kind });
                }
                Ok(Self(value))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// The filing a form belongs to. Exactly one form exists per filing.
    FilingId,
    "filing id"
);
opaque_id!(
    /// Authenticated end user, as supplied by the identity provider.
    UserId,
    "user id"
);
opaque_id!(
    /// Authenticated administrator, as supplied by the identity provider.
    AdminId,
    "admin id"
);
opaque_id!(StepId, "step id");
opaque_id!(SectionId, "section id");

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty { kind: $kind });
                }
                Uuid::parse_str(trimmed)
                    .map(Self)
                    .map_err(|_err| IdError::NotUuid {
                        kind: $kind,
                        raw: trimmed.to_owned(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Primary key of a form.
    FormId,
    "form id"
);
uuid_id!(
    /// Primary key of a document binding.
    DocumentId,
    "document id"
);
