//! Identifier types shared across the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one execution attempt.
///
/// Callers may supply their own id at submission (any non-empty string); the
/// scheduler otherwise generates a v4 UUID. Uniqueness is enforced against
/// all records that retention has not yet evicted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ExecutionId::generate();
        let b = ExecutionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_round_trip() {
        let id = ExecutionId::from("exec-42");
        assert_eq!(id.to_string(), "exec-42");
        assert_eq!(id.as_str(), "exec-42");
    }
}
