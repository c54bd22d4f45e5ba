use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct IdentityError(pub String);

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity lookup failed: {}", self.0)
    }
}

impl std::error::Error for IdentityError {}

/// Lookup against the user directory that owns profiles and roles. The
/// reward ledger never writes through this trait; it only asks whether a
/// profile has materialized and whether a caller holds the admin role.
#[async_trait]
pub trait IdentityDirectory: Send + Sync + 'static {
    async fn profile_exists(&self, user_id: &str) -> Result<bool, IdentityError>;
    async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError>;
}

/// Directory backed by configuration. With no `known_users` allowlist every
/// non-empty id is treated as an existing profile, which fits deployments
/// where the upstream gateway already authenticated the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    pub known_users: Option<HashSet<String>>,
    pub admins: HashSet<String>,
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn profile_exists(&self, user_id: &str) -> Result<bool, IdentityError> {
        if user_id.trim().is_empty() {
            return Ok(false);
        }
        match &self.known_users {
            Some(known) => Ok(known.contains(user_id)),
            None => Ok(true),
        }
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError> {
        Ok(self.admins.contains(user_id))
    }
}

/// In-memory directory for tests. Fields are public so tests mutate the
/// world directly between requests.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    pub profiles: Mutex<HashSet<String>>,
    pub admins: Mutex<HashSet<String>>,
}

impl FakeDirectory {
    pub async fn add_profile(&self, user_id: &str) {
        self.profiles.lock().await.insert(user_id.to_string());
    }

    pub async fn add_admin(&self, user_id: &str) {
        self.profiles.lock().await.insert(user_id.to_string());
        self.admins.lock().await.insert(user_id.to_string());
    }
}

#[async_trait]
impl IdentityDirectory for FakeDirectory {
    async fn profile_exists(&self, user_id: &str) -> Result<bool, IdentityError> {
        Ok(self.profiles.lock().await.contains(user_id))
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, IdentityError> {
        Ok(self.admins.lock().await.contains(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_without_allowlist_accepts_any_nonempty_id() {
        let dir = StaticDirectory::default();
        assert!(dir.profile_exists("u1").await.unwrap());
        assert!(!dir.profile_exists("").await.unwrap());
        assert!(!dir.is_admin("u1").await.unwrap());
    }

    #[tokio::test]
    async fn static_directory_allowlist_is_exact() {
        let dir = StaticDirectory {
            known_users: Some(["alice".to_string()].into_iter().collect()),
            admins: ["root".to_string()].into_iter().collect(),
        };
        assert!(dir.profile_exists("alice").await.unwrap());
        assert!(!dir.profile_exists("bob").await.unwrap());
        assert!(dir.is_admin("root").await.unwrap());
    }

    #[tokio::test]
    async fn fake_directory_add_admin_also_creates_the_profile() {
        let dir = FakeDirectory::default();
        dir.add_admin("ops").await;
        assert!(dir.profile_exists("ops").await.unwrap());
        assert!(dir.is_admin("ops").await.unwrap());
    }
}
