//! Commit ids.

use git2::Oid as Git2Oid;
use std::fmt;
use std::str::FromStr;

/// Abbreviated length used in logs and temporary branch names.
pub const SHORT_LEN: usize = 7;

/// A commit (or tree) id. Ordered so ids can key sorted maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid(Git2Oid);

impl GitOid {
    /// Wrap a git2 id.
    pub fn from_git2(oid: Git2Oid) -> Self {
        Self(oid)
    }

    /// The git2 id, for calls into git2.
    pub fn as_git2(&self) -> Git2Oid {
        self.0
    }

    /// Parse a full 40-character SHA.
    pub fn from_hex(hex: &str) -> Result<Self, GitOidError> {
        if hex.len() != 40 {
            return Err(GitOidError::InvalidHex(hex.to_string()));
        }
        Git2Oid::from_str(hex)
            .map(Self)
            .map_err(|_| GitOidError::InvalidHex(hex.to_string()))
    }

    /// Full SHA.
    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }

    /// First [`SHORT_LEN`] characters of the SHA.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_LEN);
        hex
    }
}

impl From<Git2Oid> for GitOid {
    fn from(oid: Git2Oid) -> Self {
        Self(oid)
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GitOid").field(&self.short()).finish()
    }
}

impl FromStr for GitOid {
    type Err = GitOidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A string that is not a full SHA.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GitOidError {
    #[error("not a full commit SHA: {0}")]
    InvalidHex(String),
}
