//! Tagged payloads for action dispatch.
//!
//! Actions carry their data as a closed tagged union instead of an opaque
//! downcast, so a mismatched invocation is a reportable condition rather
//! than undefined behavior at the call site.

use serde::Serialize;
use std::fmt;

/// Data handed to an action callback.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ActionPayload {
    /// No data; the payload of [`crate::StateMachine::invoke_action`].
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ActionPayload {
    /// The discriminant used to match invocations against registrations.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::None => PayloadKind::None,
            Self::Bool(_) => PayloadKind::Bool,
            Self::Int(_) => PayloadKind::Int,
            Self::Float(_) => PayloadKind::Float,
            Self::Text(_) => PayloadKind::Text,
        }
    }
}

impl From<bool> for ActionPayload {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ActionPayload {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ActionPayload {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ActionPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ActionPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Payload shape an action callback was registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    None,
    Bool,
    Int,
    Float,
    Text,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ActionPayload::None.kind(), PayloadKind::None);
        assert_eq!(ActionPayload::Bool(true).kind(), PayloadKind::Bool);
        assert_eq!(ActionPayload::Int(3).kind(), PayloadKind::Int);
        assert_eq!(ActionPayload::Float(0.5).kind(), PayloadKind::Float);
        assert_eq!(ActionPayload::Text("hi".into()).kind(), PayloadKind::Text);
    }

    #[test]
    fn conversions_pick_the_matching_variant() {
        assert_eq!(ActionPayload::from(true), ActionPayload::Bool(true));
        assert_eq!(ActionPayload::from(7i64), ActionPayload::Int(7));
        assert_eq!(ActionPayload::from(1.5f64), ActionPayload::Float(1.5));
        assert_eq!(ActionPayload::from("go"), ActionPayload::Text("go".into()));
    }

    #[test]
    fn kind_display_is_lowercase() {
        assert_eq!(PayloadKind::Float.to_string(), "float");
        assert_eq!(PayloadKind::None.to_string(), "none");
    }
}
