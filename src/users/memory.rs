use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::users::{
    repo::UserStore,
    repo_types::{NewUser, StoreError, UniqueField, User, UserChanges},
};

/// In-memory implementation of `UserStore` for development and testing.
///
/// Enforces the same username/email uniqueness as the database schema.
/// Data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn taken(
        &self,
        except: Option<i64>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Option<UniqueField> {
        let others = self.users.values().filter(|u| Some(u.id) != except);
        for user in others {
            if username == Some(user.username.as_str()) {
                return Some(UniqueField::Username);
            }
            if email == Some(user.email.as_str()) {
                return Some(UniqueField::Email);
            }
        }
        None
    }
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let taken = inner.taken(None, Some(user.username.as_str()), Some(user.email.as_str()));
        if let Some(field) = taken {
            return Err(StoreError::Duplicate(field));
        }

        inner.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: inner.last_id,
            name: user.name,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(created.id, created.clone());
        debug!(user_id = created.id, "user stored in memory");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(field) =
            inner.taken(Some(id), changes.username.as_deref(), changes.email.as_deref())
        {
            return Err(StoreError::Duplicate(field));
        }

        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.users.remove(&id).is_some())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().any(|u| u.email == email))
    }
}
