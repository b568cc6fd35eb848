//! Group membership lookup used by group fan-out.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_core::RecipientId;
use parking_lot::RwLock;
use thiserror::Error;

/// Errors from a [`GroupMembership`] backend.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// No group with this id.
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    /// Backend failure.
    #[error("membership backend error: {0}")]
    Backend(String),
}

/// Resolves a group id to its member recipients.
#[async_trait]
pub trait GroupMembership: Send + Sync {
    /// Members of `group_id`.
    async fn list_members(&self, group_id: &str) -> Result<Vec<RecipientId>, MembershipError>;
}

/// In-memory membership table, seeded from settings and editable at runtime.
#[derive(Default)]
pub struct StaticGroups {
    groups: RwLock<HashMap<String, Vec<RecipientId>>>,
}

impl StaticGroups {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a `group id -> member ids` map.
    pub fn from_map(groups: &HashMap<String, Vec<String>>) -> Self {
        let groups = groups
            .iter()
            .map(|(id, members)| {
                let members = members.iter().map(|m| RecipientId::from(m.as_str())).collect();
                (id.clone(), members)
            })
            .collect();
        Self {
            groups: RwLock::new(groups),
        }
    }

    /// Replace the members of a group, creating it if needed.
    pub fn set_members(&self, group_id: &str, members: Vec<RecipientId>) {
        let _ = self.groups.write().insert(group_id.to_string(), members);
    }

    /// Add one member. Adding an existing member is a no-op.
    pub fn add_member(&self, group_id: &str, member: RecipientId) {
        let mut groups = self.groups.write();
        let members = groups.entry(group_id.to_string()).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
    }

    /// Remove one member. Returns whether it was present.
    pub fn remove_member(&self, group_id: &str, member: &RecipientId) -> bool {
        let mut groups = self.groups.write();
        let Some(members) = groups.get_mut(group_id) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m != member);
        members.len() != before
    }

    /// Number of known groups.
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Whether no groups are known.
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

#[async_trait]
impl GroupMembership for StaticGroups {
    async fn list_members(&self, group_id: &str) -> Result<Vec<RecipientId>, MembershipError> {
        self.groups
            .read()
            .get(group_id)
            .cloned()
            .ok_or_else(|| MembershipError::UnknownGroup(group_id.to_string()))
    }
}
