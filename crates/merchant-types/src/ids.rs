//! Type-safe identifiers.
//!
//! Ledger records are keyed by UUID v7 (time-ordered) wrappers. Reference
//! data is keyed by its natural name: items, cities and players are looked
//! up by the string a human types, so those keys are string newtypes rather
//! than positional indices.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around a [`String`] natural key.
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a market trade.
    TransactionId
}

define_id! {
    /// Unique identifier for a player-to-player transfer (gift or rob).
    PlayerTransactionId
}

define_id! {
    /// Unique identifier for a loan.
    LoanId
}

define_id! {
    /// Unique identifier for a loan payback.
    LoanPaybackId
}

define_id! {
    /// Unique identifier for an end-of-game item liquidation.
    LiquidationId
}

define_name! {
    /// Name of a commodity, e.g. `mercury`.
    ItemName
}

define_name! {
    /// Name of a trading city, e.g. `Budapest`.
    CityName
}

define_name! {
    /// A player's code. Codes are case-insensitive and stored upper case.
    PlayerCode
}

impl ItemName {
    /// Build an item name from any string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl CityName {
    /// Build a city name from any string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl PlayerCode {
    /// Normalise a raw code: surrounding whitespace is dropped and the code
    /// is upper-cased.
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_code_is_normalised() {
        assert_eq!(PlayerCode::new(" ab12cd ").as_str(), "AB12CD");
        assert_eq!(PlayerCode::new("AB12CD"), PlayerCode::new("ab12cd"));
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = LoanId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ItemName::new("ore")).unwrap_or_default();
        assert_eq!(json, "\"ore\"");
    }

    #[test]
    fn names_work_as_json_map_keys() {
        let mut items = std::collections::BTreeMap::new();
        items.insert(ItemName::new("gem"), 3_i64);
        let json = serde_json::to_string(&items).unwrap_or_default();
        assert_eq!(json, r#"{"gem":3}"#);
        let back: std::collections::BTreeMap<ItemName, i64> =
            serde_json::from_str(&json).unwrap_or_default();
        assert_eq!(back.get("gem"), Some(&3));
    }
}
