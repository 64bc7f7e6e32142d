//! Parameter value types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Encoding of a parameter value in the live store.
///
/// Serializes to the live store's own names (`String`, `StringList`,
/// `SecureString`) so versions written by older tools remain readable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum ValueType {
    /// Plain text.
    #[default]
    String,
    /// Comma-separated list of plain text values.
    StringList,
    /// Text the live store encrypts at rest.
    SecureString,
}

impl ValueType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether values of this type should be masked in human-facing output.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::SecureString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_wire_names() {
        for value_type in ValueType::iter() {
            assert_eq!(ValueType::from_str(value_type.as_str()).unwrap(), value_type);
        }
        assert_eq!(ValueType::SecureString.to_string(), "SecureString");
        assert!(ValueType::from_str("Binary").is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ValueType::StringList).unwrap();
        assert_eq!(json, "\"StringList\"");
    }
}
