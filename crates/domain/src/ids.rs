//! Validated string identifiers used throughout the turn-coordination engine.
//!
//! Scene and item ids are human-authored slugs (not generated), so unlike a
//! UUID-backed id they need validation at construction time rather than at
//! parse time only. `define_slug_id!` is the `String` analogue of a `Uuid`
//! newtype macro: it gives each id its own type so a `SceneId` can never be
//! handed where an `ItemId` is expected, and the regex check runs exactly
//! once, at the boundary where the string enters the system.

use std::fmt;

use crate::error::DomainError;

fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

macro_rules! define_slug_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate and construct. Fails if `value` doesn't match
            /// `^[a-z0-9_-]+$`.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if is_valid_slug(&value) {
                    Ok(Self(value))
                } else {
                    Err(DomainError::invalid_id(format!(
                        "{} {:?} must match ^[a-z0-9_-]+$",
                        $label, value
                    )))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

define_slug_id!(SceneId, "scene id");
define_slug_id!(ItemId, "item id");
define_slug_id!(ContributorId, "contributor id");
