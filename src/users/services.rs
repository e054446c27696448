use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::{
    auth::password::CredentialHasher,
    error::AppError,
    users::{
        dto::{CreateUserRequest, PublicUser, UpdateUserRequest},
        repo::UserStore,
        repo_types::{NewUser, StoreError, UniqueField, User, UserChanges},
    },
};

const CREATE_FAILED: &str = "failed to create user";
const UPDATE_FAILED: &str = "failed to update user";
const DELETE_FAILED: &str = "failed to delete user";

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => conflict(field),
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

fn conflict(field: UniqueField) -> AppError {
    AppError::Conflict(format!("{field} already exists"))
}

fn not_found() -> AppError {
    AppError::NotFound("user not found".into())
}

/// Strips the password hash; every record leaving the service goes through here.
pub fn sanitize(user: User) -> PublicUser {
    PublicUser::from(user)
}

/// Account operations: uniqueness rules, password hashing and sanitized output.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: CredentialHasher,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: CredentialHasher) -> Self {
        Self { store, hasher }
    }

    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create(&self, input: CreateUserRequest) -> Result<PublicUser, AppError> {
        input.validate()?;
        let user = self.try_create(input).await.map_err(|e| e.or_generic(CREATE_FAILED))?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    async fn try_create(&self, input: CreateUserRequest) -> Result<PublicUser, AppError> {
        if self.store.username_exists(&input.username).await? {
            warn!("username already taken");
            return Err(conflict(UniqueField::Username));
        }
        if self.store.email_exists(&input.email).await? {
            warn!("email already taken");
            return Err(conflict(UniqueField::Email));
        }

        let password_hash = self.hasher.hash_async(input.password).await?;
        let user = self
            .store
            .create(NewUser {
                name: input.name,
                username: input.username,
                email: input.email,
                password_hash,
            })
            .await?;
        Ok(sanitize(user))
    }

    pub async fn find_all(&self) -> Result<Vec<PublicUser>, AppError> {
        let users = self.store.find_all().await?;
        Ok(users.into_iter().map(sanitize).collect())
    }

    pub async fn find_one(&self, id: i64) -> Result<PublicUser, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .map(sanitize)
            .ok_or_else(not_found)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<PublicUser, AppError> {
        self.store
            .find_by_username(username)
            .await?
            .map(sanitize)
            .ok_or_else(not_found)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<PublicUser, AppError> {
        self.store
            .find_by_email(email)
            .await?
            .map(sanitize)
            .ok_or_else(not_found)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: i64, input: UpdateUserRequest) -> Result<PublicUser, AppError> {
        input.validate()?;
        let user = self.try_update(id, input).await.map_err(|e| e.or_generic(UPDATE_FAILED))?;
        info!(user_id = id, "user updated");
        Ok(user)
    }

    async fn try_update(&self, id: i64, input: UpdateUserRequest) -> Result<PublicUser, AppError> {
        let existing = self.store.find_by_id(id).await?.ok_or_else(not_found)?;

        // Keeping one's own username or email is not a conflict.
        if let Some(username) = input.username.as_deref() {
            if username != existing.username && self.store.username_exists(username).await? {
                warn!(user_id = id, "username already taken");
                return Err(conflict(UniqueField::Username));
            }
        }
        if let Some(email) = input.email.as_deref() {
            if email != existing.email && self.store.email_exists(email).await? {
                warn!(user_id = id, "email already taken");
                return Err(conflict(UniqueField::Email));
            }
        }

        let password_hash = match input.password {
            Some(plain) => Some(self.hasher.hash_async(plain).await?),
            None => None,
        };

        let changes = UserChanges {
            name: input.name,
            username: input.username,
            email: input.email,
            password_hash,
        };
        let updated = self.store.update(id, changes).await?.ok_or_else(not_found)?;
        Ok(sanitize(updated))
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> Result<(), AppError> {
        if self.store.find_by_id(id).await?.is_none() {
            return Err(not_found());
        }
        let deleted = self.store.delete(id).await.map_err(|e| {
            error!(error = %e, user_id = id, "delete failed");
            AppError::BadRequest(DELETE_FAILED.into())
        })?;
        if !deleted {
            warn!(user_id = id, "delete reported no affected rows");
            return Err(AppError::BadRequest(DELETE_FAILED.into()));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// `Ok(None)` for an unknown username and for a wrong password alike.
    #[instrument(skip(self, password))]
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<PublicUser>, AppError> {
        let Some(user) = self.store.find_by_username(username).await? else {
            self.hasher.verify_missing_async(password.to_owned()).await?;
            return Ok(None);
        };
        let ok = self
            .hasher
            .verify_async(password.to_owned(), user.password_hash.clone())
            .await?;
        if !ok {
            return Ok(None);
        }
        Ok(Some(sanitize(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::fast_hasher;
    use crate::users::memory::InMemoryUserStore;
    use async_trait::async_trait;

    fn service() -> UserService {
        UserService::new(Arc::new(InMemoryUserStore::new()), fast_hasher())
    }

    fn ana() -> CreateUserRequest {
        CreateUserRequest {
            name: "Ana".into(),
            username: "ana1".into(),
            email: "ana@x.com".into(),
            password: "secret123".into(),
        }
    }

    fn bob() -> CreateUserRequest {
        CreateUserRequest {
            name: "Bob".into(),
            username: "bob1".into(),
            email: "bob@x.com".into(),
            password: "hunter22".into(),
        }
    }

    #[tokio::test]
    async fn create_then_lookup_returns_sanitized_view() {
        let svc = service();
        let created = svc.create(ana()).await.unwrap();
        assert_eq!(created.id, 1);

        let found = svc.find_by_username("ana1").await.unwrap();
        assert_eq!(found, created);
        let json = serde_json::to_string(&found).unwrap();
        assert!(!json.contains("secret123"));
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn stored_password_is_a_hash() {
        let store = Arc::new(InMemoryUserStore::new());
        let svc = UserService::new(store.clone(), fast_hasher());
        svc.create(ana()).await.unwrap();
        let row = store.find_by_username("ana1").await.unwrap().unwrap();
        assert_ne!(row.password_hash, "secret123");
        assert!(row.password_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let svc = service();
        svc.create(ana()).await.unwrap();

        let same_username = CreateUserRequest {
            username: "ana1".into(),
            email: "other@x.com".into(),
            ..bob()
        };
        assert!(matches!(
            svc.create(same_username).await,
            Err(AppError::Conflict(msg)) if msg == "username already exists"
        ));

        let same_email = CreateUserRequest {
            email: "ana@x.com".into(),
            ..bob()
        };
        assert!(matches!(
            svc.create(same_email).await,
            Err(AppError::Conflict(msg)) if msg == "email already exists"
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_reported_as_is() {
        let svc = service();
        let err = svc
            .create(CreateUserRequest {
                email: "nope".into(),
                ..ana()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "invalid email"));
    }

    #[tokio::test]
    async fn lookups_of_missing_accounts_are_not_found() {
        let svc = service();
        assert!(matches!(svc.find_one(99).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            svc.find_by_username("ghost").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.find_by_email("g@x.com").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn find_all_lists_every_account() {
        let svc = service();
        svc.create(ana()).await.unwrap();
        svc.create(bob()).await.unwrap();
        let all = svc.find_all().await.unwrap();
        let names: Vec<_> = all.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["ana1", "bob1"]);
    }

    #[tokio::test]
    async fn update_to_other_accounts_username_conflicts() {
        let svc = service();
        let a = svc.create(ana()).await.unwrap();
        svc.create(bob()).await.unwrap();

        let req = UpdateUserRequest {
            username: Some("bob1".into()),
            ..Default::default()
        };
        assert!(matches!(svc.update(a.id, req).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_to_own_username_is_not_a_conflict() {
        let svc = service();
        let a = svc.create(ana()).await.unwrap();
        let req = UpdateUserRequest {
            username: Some("ana1".into()),
            email: Some("ana@x.com".into()),
            name: Some("Ana Maria".into()),
            ..Default::default()
        };
        let updated = svc.update(a.id, req).await.unwrap();
        assert_eq!(updated.name, "Ana Maria");
        assert_eq!(updated.username, "ana1");
    }

    #[tokio::test]
    async fn update_rehashes_password() {
        let svc = service();
        let a = svc.create(ana()).await.unwrap();
        let req = UpdateUserRequest {
            password: Some("new-secret".into()),
            ..Default::default()
        };
        svc.update(a.id, req).await.unwrap();

        assert!(svc.validate_credentials("ana1", "secret123").await.unwrap().is_none());
        assert!(svc.validate_credentials("ana1", "new-secret").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_missing_account_is_not_found() {
        let svc = service();
        let req = UpdateUserRequest {
            name: Some("X".into()),
            ..Default::default()
        };
        assert!(matches!(svc.update(5, req).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_then_find_is_not_found() {
        let svc = service();
        let a = svc.create(ana()).await.unwrap();
        svc.remove(a.id).await.unwrap();
        assert!(matches!(svc.find_one(a.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.remove(a.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn validate_credentials_hides_the_cause() {
        let svc = service();
        let a = svc.create(ana()).await.unwrap();

        let ok = svc.validate_credentials("ana1", "secret123").await.unwrap();
        assert_eq!(ok, Some(a));
        assert_eq!(svc.validate_credentials("ana1", "wrong").await.unwrap(), None);
        assert_eq!(svc.validate_credentials("nobody", "secret123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_username_costs_a_verification_like_a_wrong_password() {
        let hasher = fast_hasher();
        let svc = UserService::new(Arc::new(InMemoryUserStore::new()), hasher.clone());
        svc.create(ana()).await.unwrap();

        let before = hasher.verifications();
        assert_eq!(svc.validate_credentials("ana1", "wrong").await.unwrap(), None);
        assert_eq!(hasher.verifications() - before, 1);

        let before = hasher.verifications();
        assert_eq!(svc.validate_credentials("nobody", "wrong").await.unwrap(), None);
        assert_eq!(hasher.verifications() - before, 1);
    }

    /// Store whose existence checks always say "free" but whose writes fail,
    /// standing in for a lost race or a broken connection.
    struct FlakyStore {
        duplicate_on_write: Option<UniqueField>,
    }

    #[async_trait]
    impl UserStore for FlakyStore {
        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            match self.duplicate_on_write {
                Some(field) => Err(StoreError::Duplicate(field)),
                None => Err(StoreError::Database(sqlx::Error::PoolTimedOut)),
            }
        }
        async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn find_by_username(&self, _u: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn find_by_email(&self, _e: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_all(&self) -> Result<Vec<User>, StoreError> {
            Ok(Vec::new())
        }
        async fn update(&self, _id: i64, _c: UserChanges) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _id: i64) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn username_exists(&self, _u: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn email_exists(&self, _e: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Store that still finds account 1 but loses it before the update lands.
    struct VanishingStore;

    fn stored_row() -> User {
        let now = time::OffsetDateTime::now_utc();
        User {
            id: 1,
            name: "Ana".into(),
            username: "ana1".into(),
            email: "ana@x.com".into(),
            password_hash: "$argon2id$unused".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl UserStore for VanishingStore {
        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            Ok(stored_row())
        }
        async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Ok(Some(stored_row()))
        }
        async fn find_by_username(&self, _u: &str) -> Result<Option<User>, StoreError> {
            Ok(Some(stored_row()))
        }
        async fn find_by_email(&self, _e: &str) -> Result<Option<User>, StoreError> {
            Ok(Some(stored_row()))
        }
        async fn find_all(&self) -> Result<Vec<User>, StoreError> {
            Ok(vec![stored_row()])
        }
        async fn update(&self, _id: i64, _c: UserChanges) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _id: i64) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn username_exists(&self, _u: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn email_exists(&self, _e: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn account_removed_mid_update_is_not_found() {
        let svc = UserService::new(Arc::new(VanishingStore), fast_hasher());
        let req = UpdateUserRequest {
            name: Some("Ana Maria".into()),
            email: Some("new@x.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update(1, req).await,
            Err(AppError::NotFound(msg)) if msg == "user not found"
        ));
    }

    #[tokio::test]
    async fn account_removed_mid_delete_is_a_generic_failure() {
        let svc = UserService::new(Arc::new(VanishingStore), fast_hasher());
        assert!(matches!(
            svc.remove(1).await,
            Err(AppError::BadRequest(msg)) if msg == DELETE_FAILED
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_race_is_a_conflict() {
        let store = FlakyStore {
            duplicate_on_write: Some(UniqueField::Email),
        };
        let svc = UserService::new(Arc::new(store), fast_hasher());
        assert!(matches!(
            svc.create(ana()).await,
            Err(AppError::Conflict(msg)) if msg == "email already exists"
        ));
    }

    #[tokio::test]
    async fn unexpected_store_failure_is_generic() {
        let store = FlakyStore {
            duplicate_on_write: None,
        };
        let svc = UserService::new(Arc::new(store), fast_hasher());
        assert!(matches!(
            svc.create(ana()).await,
            Err(AppError::BadRequest(msg)) if msg == CREATE_FAILED
        ));
        let req = UpdateUserRequest {
            name: Some("X".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update(1, req).await,
            Err(AppError::BadRequest(msg)) if msg == UPDATE_FAILED
        ));
    }

    #[tokio::test]
    async fn lookup_failure_during_login_check_is_an_error_not_a_mismatch() {
        let store = FlakyStore {
            duplicate_on_write: None,
        };
        let svc = UserService::new(Arc::new(store), fast_hasher());
        assert!(svc.validate_credentials("ana1", "secret123").await.is_err());
    }
}
