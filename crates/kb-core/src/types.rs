//! Shared identifiers and tenant-context types used across every crate in the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_newtype!(OrgId);
id_newtype!(WorkspaceId);
id_newtype!(UserId);
id_newtype!(KbId);
id_newtype!(SourceId);
id_newtype!(DraftId);
id_newtype!(DocumentId);
id_newtype!(ChunkId);
id_newtype!(RunId);

/// A principal's role within a workspace, least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Whether this role satisfies at least `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The tenant context every entity in the system is evaluated against. A caller already
/// supplies this — resolving it from a request is out of scope for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub org_id: OrgId,
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: Role,
}

impl TenantContext {
    pub fn new(org_id: OrgId, workspace_id: WorkspaceId, user_id: UserId, role: Role) -> Self {
        Self {
            org_id,
            workspace_id,
            user_id,
            role,
        }
    }

    /// Whether the context's role satisfies the required role for an operation.
    pub fn authorize(&self, required: Role) -> bool {
        self.role.satisfies(required)
    }

    /// A cache-key prefix scoped to this workspace, e.g. `draft:{workspace_id}:`.
    pub fn scoped_key(&self, namespace: &str, id: impl std::fmt::Display) -> String {
        format!("{namespace}:{}:{}", self.workspace_id, id)
    }
}

/// Arbitrary structured metadata carried by several durable entities.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A timestamp pair present on most durable records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness() {
        let a = KbId::new();
        let b = KbId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_roundtrip_display_parse() {
        use std::str::FromStr;
        let id = WorkspaceId::new();
        let parsed = WorkspaceId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Editor);
        assert!(Role::Editor > Role::Viewer);
    }

    #[test]
    fn test_role_satisfies() {
        assert!(Role::Owner.satisfies(Role::Admin));
        assert!(!Role::Viewer.satisfies(Role::Editor));
        assert!(Role::Editor.satisfies(Role::Editor));
    }

    #[test]
    fn test_tenant_context_authorize() {
        let ctx = TenantContext::new(OrgId::new(), WorkspaceId::new(), UserId::new(), Role::Editor);
        assert!(ctx.authorize(Role::Viewer));
        assert!(!ctx.authorize(Role::Admin));
    }

    #[test]
    fn test_scoped_key() {
        let ws = WorkspaceId::new();
        let ctx = TenantContext::new(OrgId::new(), ws, UserId::new(), Role::Owner);
        let key = ctx.scoped_key("draft", "abc");
        assert_eq!(key, format!("draft:{}:abc", ws));
    }
}
