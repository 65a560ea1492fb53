//! Container name validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{KeelError, KeelResult};

/// A validated container name.
///
/// Names must:
/// - Be 1-253 characters long
/// - Contain only alphanumeric characters, underscores, periods and hyphens
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Maximum length of a container name.
    pub const MAX_LENGTH: usize = 253;

    /// Create a new container name, validating the format.
    pub fn new(name: impl Into<String>) -> KeelResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> KeelResult<()> {
        let invalid = || {
            KeelError::syntax(
                "name",
                format!("{name:?} must match [a-zA-Z0-9][a-zA-Z0-9_.-]*"),
            )
        };

        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return Err(invalid());
        };
        if name.len() > Self::MAX_LENGTH || !first.is_ascii_alphanumeric() {
            return Err(invalid());
        }
        if chars.any(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-')) {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerName {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = KeelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(ContainerName::new("web").is_ok());
        assert!(ContainerName::new("my-container").is_ok());
        assert!(ContainerName::new("db_1.primary").is_ok());
        assert!(ContainerName::new("0abc").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(ContainerName::new("").is_err());
        assert!(ContainerName::new("-web").is_err());
        assert!(ContainerName::new(".hidden").is_err());
        assert!(ContainerName::new("web/1").is_err());
        assert!(ContainerName::new("a".repeat(254)).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: ContainerName = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(ok.as_str(), "web");
        assert!(serde_json::from_str::<ContainerName>("\"-bad\"").is_err());
    }
}
