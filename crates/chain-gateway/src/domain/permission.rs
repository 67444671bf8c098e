//! Caller permissions.
//!
//! Permission levels are ordered: each level implies every weaker one. The
//! verification service grants a single level, which is expanded into the
//! full set before it is attached to a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Sign,
    Admin,
}

impl Permission {
    /// All levels, weakest first.
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Sign,
        Permission::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Sign => "sign",
            Permission::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown permission name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "sign" => Ok(Permission::Sign),
            "admin" => Ok(Permission::Admin),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

/// Permissions held by a caller, attached to requests as an extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    /// No permissions at all.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Everything; granted to loopback callers.
    pub fn all() -> Self {
        Self(Permission::ALL.to_vec())
    }

    /// Permissions of an unauthenticated remote caller.
    pub fn anonymous() -> Self {
        Self(vec![Permission::Read])
    }

    /// Expand a granted level into itself plus every weaker level.
    pub fn from_level(level: Permission) -> Self {
        Self(
            Permission::ALL
                .into_iter()
                .filter(|p| *p <= level)
                .collect(),
        )
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

/// Map a permission string issued by the verification service onto the
/// expanded set. Unknown strings grant nothing.
pub fn adapt_old_strategy(perm: &str) -> Permissions {
    perm.parse::<Permission>()
        .map(Permissions::from_level)
        .unwrap_or_default()
}
