use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::{DomainError, Result};

/// Stable device identifier taken from the WS-Discovery endpoint reference
///
/// `urn:uuid:` addresses are normalized to the lowercase hyphenated UUID so
/// that the same camera is recognized regardless of how it spells the URN.
/// Devices advertising a non-UUID address keep the trimmed raw value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidDeviceId(raw.to_string()));
        }

        let candidate = trimmed
            .strip_prefix("urn:uuid:")
            .or_else(|| trimmed.strip_prefix("uuid:"))
            .unwrap_or(trimmed);

        match Uuid::parse_str(candidate) {
            Ok(uuid) => Ok(Self(uuid.hyphenated().to_string())),
            Err(_) if trimmed.chars().any(char::is_whitespace) => {
                Err(DomainError::InvalidDeviceId(raw.to_string()))
            }
            Err(_) => Ok(Self(trimmed.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for DeviceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
