//! Workspace identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum accepted workspace identifier length in bytes.
pub const MAX_WORKSPACE_ID_LEN: usize = 512;

/// Opaque identifier of an isolated workspace.
///
/// Every store and index is scoped to exactly one workspace. The identifier
/// is usually an absolute project path, but it is never interpreted as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Creates a validated workspace identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the id is blank, too long, or
    /// contains a NUL byte.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "workspace id must not be empty".to_string(),
            ));
        }
        if id.len() > MAX_WORKSPACE_ID_LEN {
            return Err(Error::InvalidInput(format!(
                "workspace id exceeds {MAX_WORKSPACE_ID_LEN} bytes"
            )));
        }
        if id.contains('\0') {
            return Err(Error::InvalidInput(
                "workspace id must not contain NUL".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a filesystem-safe directory name for this workspace.
    ///
    /// The name is the first 16 hex characters of the SHA-256 of the id, so
    /// two distinct ids never share a directory in practice and the raw id
    /// never reaches the filesystem.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut key = hex::encode(digest);
        key.truncate(16);
        key
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for WorkspaceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<WorkspaceId> for String {
    fn from(id: WorkspaceId) -> Self {
        id.0
    }
}

impl std::str::FromStr for WorkspaceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_ids() {
        assert!(WorkspaceId::new("").is_err());
        assert!(WorkspaceId::new("   ").is_err());
        assert!(WorkspaceId::new("a\0b").is_err());
        assert!(WorkspaceId::new("x".repeat(MAX_WORKSPACE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_storage_key_is_stable_and_short() {
        let ws = WorkspaceId::new("/home/dev/project").unwrap();
        let key = ws.storage_key();
        assert_eq!(key.len(), 16);
        assert_eq!(key, ws.storage_key());
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        let other = WorkspaceId::new("/home/dev/other").unwrap();
        assert_ne!(key, other.storage_key());
    }

    #[test]
    fn test_serde_validates() {
        let ok: WorkspaceId = serde_json::from_str("\"ws-1\"").unwrap();
        assert_eq!(ok.as_str(), "ws-1");
        assert!(serde_json::from_str::<WorkspaceId>("\"\"").is_err());
    }
}
