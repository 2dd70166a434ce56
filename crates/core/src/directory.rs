//! User directory collaborator.
//!
//! Recipient resolution needs two lookups the engine does not own: user
//! records by id, and the set of the system's own inbound addresses (used to
//! keep `article_last_sender` from answering an auto-responder).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// A user as seen by the engine: id plus notification address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: DbId,
    pub email: String,
}

/// User/address lookup capability, provided by the host.
pub trait Directory {
    fn lookup_user(&self, id: DbId) -> Option<UserRef>;

    /// Whether an address belongs to one of the system's own inbound
    /// channels. Comparison is case-insensitive.
    fn is_system_address(&self, address: &str) -> bool;
}

/// In-memory directory for tests and small embeddings.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: HashMap<DbId, UserRef>,
    system_addresses: HashSet<String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, id: DbId, email: impl Into<String>) {
        self.users.insert(
            id,
            UserRef {
                id,
                email: email.into(),
            },
        );
    }

    pub fn add_system_address(&mut self, address: &str) {
        self.system_addresses.insert(address.to_lowercase());
    }
}

impl Directory for InMemoryDirectory {
    fn lookup_user(&self, id: DbId) -> Option<UserRef> {
        self.users.get(&id).cloned()
    }

    fn is_system_address(&self, address: &str) -> bool {
        self.system_addresses.contains(&address.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_user() {
        let mut directory = InMemoryDirectory::new();
        directory.add_user(3, "agent@example.com");

        let user = directory.lookup_user(3).unwrap();
        assert_eq!(user.email, "agent@example.com");
        assert!(directory.lookup_user(4).is_none());
    }

    #[test]
    fn system_address_check_is_case_insensitive() {
        let mut directory = InMemoryDirectory::new();
        directory.add_system_address("Support@Example.com");

        assert!(directory.is_system_address("support@example.com"));
        assert!(directory.is_system_address("SUPPORT@EXAMPLE.COM"));
        assert!(!directory.is_system_address("other@example.com"));
    }
}
