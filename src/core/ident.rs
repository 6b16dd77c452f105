//! Interned identifiers for states, triggers, and actions.
//!
//! Every state, trigger, and action is addressed by a small `Copy` symbol
//! derived once from a human-readable name. Interning guarantees that the
//! same name always maps to the same symbol and that distinct names can
//! never collide, so identity comparisons are integer comparisons while
//! diagnostics stay readable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

struct SymbolTable {
    by_name: HashMap<&'static str, u32>,
    names: Vec<&'static str>,
}

fn table() -> &'static RwLock<SymbolTable> {
    static TABLE: OnceLock<RwLock<SymbolTable>> = OnceLock::new();
    TABLE.get_or_init(|| {
        RwLock::new(SymbolTable {
            by_name: HashMap::new(),
            names: Vec::new(),
        })
    })
}

fn intern(name: &str) -> u32 {
    {
        let read = table().read().unwrap_or_else(PoisonError::into_inner);
        if let Some(&symbol) = read.by_name.get(name) {
            return symbol;
        }
    }

    let mut write = table().write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have interned the name between the two locks.
    if let Some(&symbol) = write.by_name.get(name) {
        return symbol;
    }
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let symbol = write.names.len() as u32;
    write.names.push(leaked);
    write.by_name.insert(leaked, symbol);
    symbol
}

fn resolve(symbol: u32) -> &'static str {
    let read = table().read().unwrap_or_else(PoisonError::into_inner);
    read.names.get(symbol as usize).copied().unwrap_or("<unknown>")
}

macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Intern `name` and return its identifier. Calling this twice
            /// with the same name yields the same identifier.
            pub fn of(name: &str) -> Self {
                Self(intern(name))
            }

            /// The human-readable name this identifier was interned from.
            pub fn name(self) -> &'static str {
                resolve(self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::of(name)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self::of(&name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.name())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                Ok(Self::of(&name))
            }
        }
    };
}

interned_id! {
    /// Identity of a state within a machine.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stateflow::StateId;
    ///
    /// let idle = StateId::of("Idle");
    /// assert_eq!(idle, StateId::of("Idle"));
    /// assert_eq!(idle.name(), "Idle");
    /// assert_ne!(idle, StateId::of("Run"));
    /// ```
    StateId
}

interned_id! {
    /// Identity of a trigger event.
    TriggerId
}

interned_id! {
    /// Identity of an action dispatched to the active state.
    ActionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_yields_same_id() {
        assert_eq!(StateId::of("Idle"), StateId::of("Idle"));
        assert_eq!(TriggerId::of("hit"), TriggerId::of("hit"));
    }

    #[test]
    fn distinct_names_yield_distinct_ids() {
        assert_ne!(StateId::of("Idle"), StateId::of("Run"));
        assert_ne!(StateId::of("a"), StateId::of("A"));
    }

    #[test]
    fn name_round_trips() {
        assert_eq!(StateId::of("Patrol").name(), "Patrol");
        assert_eq!(ActionId::of("reset").name(), "reset");
    }

    #[test]
    fn empty_name_is_a_valid_identifier() {
        let empty = StateId::of("");
        assert_eq!(empty.name(), "");
        assert_eq!(empty, StateId::of(""));
    }

    #[test]
    fn display_renders_the_name() {
        assert_eq!(StateId::of("Chase").to_string(), "Chase");
        assert_eq!(format!("{:?}", TriggerId::of("alarm")), "TriggerId(alarm)");
    }

    #[test]
    fn conversion_from_str_interns() {
        let id: StateId = "Jump".into();
        assert_eq!(id, StateId::of("Jump"));
        let id: StateId = String::from("Jump").into();
        assert_eq!(id, StateId::of("Jump"));
    }

    #[test]
    fn ids_serialize_as_names() {
        let json = serde_json::to_string(&StateId::of("Dash")).unwrap();
        assert_eq!(json, "\"Dash\"");

        let back: StateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StateId::of("Dash"));
    }
}
