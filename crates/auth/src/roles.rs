use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Project role used for RBAC.
///
/// The hierarchy is flat and per project: exactly one `Owner` (created with
/// the project and never changed afterwards), any number of editors and
/// viewers. Roles are persisted as their lowercase names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::Editor, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Role::Owner)
    }

    /// Roles that may be granted through assign/update.
    ///
    /// Ownership is only ever created by bootstrapping a project.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Role::Editor | Role::Viewer)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
