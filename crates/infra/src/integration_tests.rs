//! Integration tests for the full credential pipeline.
//!
//! Tests: Manager → Facade → InMemoryCredentialStore
//!
//! Verifies:
//! - Registration, login and credential changes round-trip through the store
//! - Refresh tokens are single-use and expire exactly once
//! - Concurrent project creation yields exactly one owner
//! - Role mutation is owner-gated and never touches an owner row

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use keystone_auth::{
        AuthConfig, AuthError, AuthService, DeliveryError, HashingParams, JwtSecret, NewUser, PasswordDelivery,
        PermissionStore, ProjectMember, ProjectPermission, RefreshToken, RefreshTokenStore, Role, StoreResult,
        TokenPair, User, UserStore,
    };
    use keystone_core::{ErrorKind, ProjectId, UserId};

    use crate::store::InMemoryCredentialStore;
    use crate::workers::TokenSweeper;

    type Service = AuthService<InMemoryCredentialStore>;

    /// Captures generated passwords instead of sending them anywhere.
    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingDelivery {
        fn last_password(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, _, pw)| pw.clone())
        }
    }

    #[async_trait::async_trait]
    impl PasswordDelivery for RecordingDelivery {
        async fn deliver(&self, email: &str, username: &str, password: &str) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), username.to_string(), password.to_string()));
            Ok(())
        }
    }

    struct FailingDelivery;

    #[async_trait::async_trait]
    impl PasswordDelivery for FailingDelivery {
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
            Err(DeliveryError("smtp down".to_string()))
        }
    }

    /// Store whose lookups never see existing users, so only the unique
    /// constraints of `insert_user` can catch a duplicate.
    struct BlindLookupStore {
        inner: InMemoryCredentialStore,
    }

    #[async_trait::async_trait]
    impl UserStore for BlindLookupStore {
        async fn get_user_by_username(&self, _: &str) -> StoreResult<Option<User>> {
            Ok(None)
        }

        async fn get_user_by_email(&self, _: &str) -> StoreResult<Option<User>> {
            Ok(None)
        }

        async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
            self.inner.insert_user(user).await
        }

        async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
            self.inner.user_exists(user_id).await
        }

        async fn update_username(&self, user_id: UserId, username: &str) -> StoreResult<()> {
            self.inner.update_username(user_id, username).await
        }

        async fn update_email(&self, user_id: UserId, email: &str) -> StoreResult<()> {
            self.inner.update_email(user_id, email).await
        }

        async fn update_password(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
            self.inner.update_password(user_id, password_hash).await
        }
    }

    #[async_trait::async_trait]
    impl PermissionStore for BlindLookupStore {
        async fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool> {
            self.inner.project_exists(project_id).await
        }

        async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<Option<Role>> {
            self.inner.get_role(user_id, project_id).await
        }

        async fn insert_owner_if_absent(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<bool> {
            self.inner.insert_owner_if_absent(user_id, project_id).await
        }

        async fn insert_permission(&self, permission: ProjectPermission) -> StoreResult<()> {
            self.inner.insert_permission(permission).await
        }

        async fn update_permission(&self, user_id: UserId, project_id: ProjectId, role: Role) -> StoreResult<()> {
            self.inner.update_permission(user_id, project_id, role).await
        }

        async fn delete_permission(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<()> {
            self.inner.delete_permission(user_id, project_id).await
        }

        async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<ProjectId>> {
            self.inner.list_user_projects(user_id).await
        }

        async fn list_project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>> {
            self.inner.list_project_members(project_id).await
        }
    }

    #[async_trait::async_trait]
    impl RefreshTokenStore for BlindLookupStore {
        async fn upsert_refresh_token(
            &self,
            user_id: UserId,
            token: &str,
            expires_at: DateTime<Utc>,
        ) -> StoreResult<()> {
            self.inner.upsert_refresh_token(user_id, token, expires_at).await
        }

        async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
            self.inner.take_refresh_token(token).await
        }

        async fn delete_refresh_token(&self, token: &str) -> StoreResult<()> {
            self.inner.delete_refresh_token(token).await
        }

        async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
            self.inner.delete_expired_refresh_tokens(now).await
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::new(JwtSecret::new("integration-secret")).with_hashing(HashingParams::insecure_fast())
    }

    fn setup() -> (Arc<InMemoryCredentialStore>, Service, Arc<RecordingDelivery>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let delivery = Arc::new(RecordingDelivery::default());
        let service = AuthService::new(store.clone(), config(), delivery.clone()).unwrap();
        (store, service, delivery)
    }

    async fn register(service: &Service, name: &str) -> TokenPair {
        service
            .credentials()
            .register(name, &format!("{name}@x.com"), "Secret1!")
            .await
            .unwrap()
    }

    // ── credentials ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn register_then_login_by_username_and_by_email() {
        let (_, service, _) = setup();
        let registered = register(&service, "alice").await;

        let by_name = service.credentials().login("alice", "Secret1!").await.unwrap();
        let by_email = service.credentials().login("alice@x.com", "Secret1!").await.unwrap();

        let tokens = service.tokens();
        assert_eq!(tokens.validate_access_token(&registered.access_token).unwrap(), registered.user_id);
        assert_eq!(tokens.validate_access_token(&by_name.access_token).unwrap(), registered.user_id);
        assert_eq!(tokens.validate_access_token(&by_email.access_token).unwrap(), registered.user_id);
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_conflicts() {
        let (_, service, _) = setup();
        service
            .credentials()
            .register("alice", "alice@x.com", "Secret1!")
            .await
            .unwrap();

        let err = service
            .credentials()
            .register("alice", "other@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameExists));

        let err = service
            .credentials()
            .register("alicia", "alice@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn register_rejects_empty_fields() {
        let (_, service, _) = setup();
        let err = service.credentials().register("", "a@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::EmptyField("username")));

        let err = service.credentials().register("a", "a@x.com", "").await.unwrap_err();
        assert!(matches!(err, AuthError::EmptyField("password")));
    }

    #[tokio::test]
    async fn unique_constraints_catch_duplicates_the_lookups_missed() {
        let inner = InMemoryCredentialStore::new();
        inner
            .insert_user(NewUser {
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                password_hash: "unused".to_string(),
            })
            .await
            .unwrap();
        let store = Arc::new(BlindLookupStore { inner });
        let service = AuthService::new(store, config(), Arc::new(RecordingDelivery::default())).unwrap();

        let err = service
            .credentials()
            .register("alice", "other@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameExists));

        let err = service
            .credentials()
            .register("alicia", "alice@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn identifiers_are_routable_by_at_sign() {
        let (_, service, _) = setup();
        let creds = service.credentials();

        let err = creds.register("a@b", "a@x.com", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameContainsAt));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = creds.register("carl", "carl-mail", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailMissingAt));
        assert_eq!(err.kind(), ErrorKind::Validation);

        register(&service, "carl").await;

        let err = creds.change_username("carl", "x@y", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameContainsAt));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = creds.change_email("carl@x.com", "nomail", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailMissingAt));
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(creds.login("carl", "Secret1!").await.is_ok());
        assert!(creds.login("carl@x.com", "Secret1!").await.is_ok());
    }

    #[tokio::test]
    async fn credential_changes_for_unknown_accounts() {
        let (_, service, _) = setup();
        register(&service, "alice").await;
        let creds = service.credentials();

        let err = creds.change_username("nobody", "nobody2", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = creds
            .change_email("nobody@x.com", "nobody@y.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = creds
            .change_password("nobody", "alice@x.com", "Secret1!", "New1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = creds
            .change_password("alice", "nobody@x.com", "Secret1!", "New1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        assert!(creds.login("alice", "Secret1!").await.is_ok());
    }

    #[tokio::test]
    async fn login_failures_are_distinguished() {
        let (_, service, _) = setup();
        register(&service, "alice").await;

        let err = service.credentials().login("nobody", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = service.credentials().login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));
    }

    #[tokio::test]
    async fn change_username_requires_password_and_free_name() {
        let (_, service, _) = setup();
        register(&service, "alice").await;
        register(&service, "bob").await;
        let creds = service.credentials();

        let err = creds.change_username("alice", "alice2", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));

        let err = creds.change_username("alice", "bob", "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameExists));

        creds.change_username("alice", "alice2", "Secret1!").await.unwrap();
        assert!(creds.login("alice2", "Secret1!").await.is_ok());
        assert!(matches!(
            creds.login("alice", "Secret1!").await.unwrap_err(),
            AuthError::UserNotFound
        ));
    }

    #[tokio::test]
    async fn change_email_moves_login_identifier() {
        let (_, service, _) = setup();
        register(&service, "alice").await;
        register(&service, "bob").await;
        let creds = service.credentials();

        let err = creds
            .change_email("alice@x.com", "bob@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));

        let err = creds
            .change_email("alice@x.com", "alice@y.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));
        assert!(creds.login("alice@x.com", "Secret1!").await.is_ok());

        creds
            .change_email("alice@x.com", "alice@y.com", "Secret1!")
            .await
            .unwrap();
        assert!(creds.login("alice@y.com", "Secret1!").await.is_ok());
    }

    #[tokio::test]
    async fn change_password_cross_checks_identifiers() {
        let (_, service, _) = setup();
        register(&service, "alice").await;
        register(&service, "bob").await;
        let creds = service.credentials();

        let err = creds
            .change_password("alice", "bob@x.com", "Secret1!", "New1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordConflict));

        let err = creds
            .change_password("alice", "alice@x.com", "wrong", "New1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IncorrectPassword));

        creds
            .change_password("alice", "alice@x.com", "Secret1!", "New1!")
            .await
            .unwrap();
        assert!(creds.login("alice", "New1!").await.is_ok());
        assert!(matches!(
            creds.login("alice", "Secret1!").await.unwrap_err(),
            AuthError::IncorrectPassword
        ));
    }

    #[tokio::test]
    async fn forgot_password_replaces_the_old_one() {
        let (_, service, delivery) = setup();
        register(&service, "alice").await;
        let creds = service.credentials();

        creds.forgot_password("alice@x.com").await.unwrap();
        let delivered = delivery.last_password().unwrap();

        assert_eq!(delivered.len(), AuthConfig::DEFAULT_GENERATED_PASSWORD_LENGTH);
        assert!(matches!(
            creds.login("alice", "Secret1!").await.unwrap_err(),
            AuthError::IncorrectPassword
        ));
        assert!(creds.login("alice@x.com", &delivered).await.is_ok());

        let err = creds.forgot_password("nobody@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn delivery_failure_is_internal() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = AuthService::new(store, config(), Arc::new(FailingDelivery)).unwrap();
        register(&service, "alice").await;

        let err = service.credentials().forgot_password("alice@x.com").await.unwrap_err();
        assert_eq!(err.kind(), keystone_core::ErrorKind::Internal);
    }

    // ── tokens ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn refresh_consumes_the_token() {
        let (_, service, _) = setup();
        let pair = register(&service, "alice").await;

        let rotated = service.tokens().refresh_token_pair(&pair.refresh_token).await.unwrap();
        assert_eq!(rotated.user_id, pair.user_id);
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let err = service
            .tokens()
            .refresh_token_pair(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert!(service.tokens().refresh_token_pair(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn expired_refresh_token_fails_exactly_once() {
        let (store, service, _) = setup();
        let pair = register(&service, "alice").await;
        let past = Utc::now() - chrono::Duration::seconds(5);
        assert!(store.set_refresh_token_expiry(&pair.refresh_token, past).unwrap());

        let err = service
            .tokens()
            .refresh_token_pair(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken { expired_at, .. } if expired_at == past));

        let err = service
            .tokens()
            .refresh_token_pair(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn new_pair_invalidates_previous_refresh_token() {
        let (_, service, _) = setup();
        let first = register(&service, "alice").await;
        let second = service.credentials().login("alice", "Secret1!").await.unwrap();

        let err = service
            .tokens()
            .refresh_token_pair(&first.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert!(service.tokens().refresh_token_pair(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (store, service, _) = setup();
        let pair = register(&service, "alice").await;

        service.tokens().logout(&pair.refresh_token).await.unwrap();
        service.tokens().logout(&pair.refresh_token).await.unwrap();
        service.tokens().logout("never-issued").await.unwrap();

        assert_eq!(store.refresh_token_count().unwrap(), 0);
        assert!(matches!(
            service.tokens().refresh_token_pair(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_tokens() {
        let (store, service, _) = setup();
        let alice = register(&service, "alice").await;
        register(&service, "bob").await;
        store
            .set_refresh_token_expiry(&alice.refresh_token, Utc::now() - chrono::Duration::minutes(1))
            .unwrap();

        assert_eq!(service.tokens().delete_expired_refresh_tokens().await.unwrap(), 1);
        assert_eq!(store.refresh_token_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn sweeper_worker_runs_until_shutdown() {
        let (store, service, _) = setup();
        let alice = register(&service, "alice").await;
        store
            .set_refresh_token_expiry(&alice.refresh_token, Utc::now() - chrono::Duration::minutes(1))
            .unwrap();

        let handle = TokenSweeper::new(Duration::from_millis(10)).spawn(service.tokens().clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(store.refresh_token_count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_has_a_single_winner() {
        let (_, service, _) = setup();
        let pair = register(&service, "alice").await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let token = pair.refresh_token.clone();
            tasks.push(tokio::spawn(async move {
                service.tokens().refresh_token_pair(&token).await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(err) => assert!(matches!(err, AuthError::InvalidToken)),
            }
        }
        assert_eq!(wins, 1);
    }

    // ── permissions ─────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_create_project_yields_one_owner() {
        let (_, service, _) = setup();
        let mut creators = Vec::new();
        for i in 0..8 {
            creators.push(register(&service, &format!("user{i}")).await.user_id);
        }
        let project = ProjectId::new(42);

        let mut tasks = Vec::new();
        for creator in creators {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                service.permissions().create_project(creator, project).await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => wins += 1,
                Err(err) => assert!(matches!(err, AuthError::ProjectExists)),
            }
        }
        assert_eq!(wins, 1);

        let members = service.permissions().get_project_user_roles(project).await.unwrap();
        assert_eq!(members.iter().filter(|m| m.role == Role::Owner).count(), 1);
    }

    #[tokio::test]
    async fn create_project_for_unknown_user_fails() {
        let (_, service, _) = setup();
        let err = service
            .permissions()
            .create_project(UserId::new(77), ProjectId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn owner_assigns_and_cannot_be_demoted() {
        let (_, service, _) = setup();
        let bob = register(&service, "bob").await.user_id;
        let carol = register(&service, "carol").await.user_id;
        let project = ProjectId::new(42);
        let perms = service.permissions();

        perms.create_project(bob, project).await.unwrap();
        perms.assign_role(bob, "carol", project, "editor").await.unwrap();
        assert_eq!(perms.get_role(carol, project).await.unwrap(), Role::Editor);

        let err = perms.update_role(bob, "bob", project, "viewer").await.unwrap_err();
        assert!(matches!(err, AuthError::OwnerRoleChanging));
        let err = perms.delete_role(bob, "bob", project).await.unwrap_err();
        assert!(matches!(err, AuthError::OwnerRoleChanging));
        assert_eq!(perms.get_role(bob, project).await.unwrap(), Role::Owner);

        perms.update_role(bob, "carol", project, Role::Viewer).await.unwrap();
        assert_eq!(perms.get_role(carol, project).await.unwrap(), Role::Viewer);

        perms.delete_role(bob, "carol", project).await.unwrap();
        assert!(matches!(
            perms.get_role(carol, project).await.unwrap_err(),
            AuthError::PermissionNotFound
        ));
    }

    #[tokio::test]
    async fn non_owner_can_never_mutate_roles() {
        let (_, service, _) = setup();
        let bob = register(&service, "bob").await.user_id;
        let carol = register(&service, "carol").await.user_id;
        register(&service, "dave").await;
        let project = ProjectId::new(7);
        let perms = service.permissions();

        perms.create_project(bob, project).await.unwrap();
        perms.assign_role(bob, "carol", project, "editor").await.unwrap();

        for target in ["bob", "carol", "dave", "nobody"] {
            for role in [Role::Editor, Role::Viewer] {
                let err = perms.assign_role(carol, target, project, role).await.unwrap_err();
                assert!(matches!(err, AuthError::AssignerIsNotOwner), "assign {target} {role}");

                let err = perms.update_role(carol, target, project, role).await.unwrap_err();
                assert!(matches!(err, AuthError::AssignerIsNotOwner), "update {target} {role}");
            }
            let err = perms.delete_role(carol, target, project).await.unwrap_err();
            assert!(matches!(err, AuthError::AssignerIsNotOwner), "delete {target}");
        }
    }

    #[tokio::test]
    async fn assign_role_preconditions() {
        let (_, service, _) = setup();
        let bob = register(&service, "bob").await.user_id;
        let dave = register(&service, "dave").await.user_id;
        register(&service, "carol").await;
        let project = ProjectId::new(9);
        let perms = service.permissions();
        perms.create_project(bob, project).await.unwrap();

        let err = perms.assign_role(bob, "carol", project, "owner").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRole(_)));

        let err = perms.assign_role(bob, "carol", project, "admin").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRole(_)));

        let err = perms
            .assign_role(bob, "carol", ProjectId::new(1000), "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProjectNotFound));

        let err = perms.assign_role(dave, "carol", project, "editor").await.unwrap_err();
        assert!(matches!(err, AuthError::AssignerRoleNotFound));

        let err = perms.assign_role(bob, "nobody", project, "editor").await.unwrap_err();
        assert!(matches!(err, AuthError::AssignableNotFound));

        let err = perms.assign_role(bob, "bob", project, "viewer").await.unwrap_err();
        assert!(matches!(err, AuthError::OwnerRoleChanging));

        perms.assign_role(bob, "carol", project, "viewer").await.unwrap();
        let err = perms.assign_role(bob, "carol", project, "editor").await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionExists));

        let err = perms.update_role(bob, "dave", project, "editor").await.unwrap_err();
        assert!(matches!(err, AuthError::AssignableRoleNotFound));
        let err = perms.delete_role(bob, "dave", project).await.unwrap_err();
        assert!(matches!(err, AuthError::AssignableRoleNotFound));
    }

    #[tokio::test]
    async fn get_role_checks_user_then_project() {
        let (_, service, _) = setup();
        let bob = register(&service, "bob").await.user_id;
        let carol = register(&service, "carol").await.user_id;
        let project = ProjectId::new(5);
        let perms = service.permissions();
        perms.create_project(bob, project).await.unwrap();

        assert!(matches!(
            perms.get_role(UserId::new(999), project).await.unwrap_err(),
            AuthError::UserNotFound
        ));
        assert!(matches!(
            perms.get_role(bob, ProjectId::new(6)).await.unwrap_err(),
            AuthError::ProjectNotFound
        ));
        assert!(matches!(
            perms.get_role(carol, project).await.unwrap_err(),
            AuthError::PermissionNotFound
        ));
    }

    #[tokio::test]
    async fn projections_list_projects_and_members() {
        let (_, service, _) = setup();
        let bob = register(&service, "bob").await.user_id;
        let carol = register(&service, "carol").await.user_id;
        let perms = service.permissions();

        perms.create_project(bob, ProjectId::new(2)).await.unwrap();
        perms.create_project(bob, ProjectId::new(1)).await.unwrap();
        perms.assign_role(bob, "carol", ProjectId::new(2), "viewer").await.unwrap();

        assert_eq!(
            perms.get_user_projects(bob).await.unwrap(),
            vec![ProjectId::new(1), ProjectId::new(2)]
        );
        assert_eq!(perms.get_user_projects(carol).await.unwrap(), vec![ProjectId::new(2)]);
        assert!(matches!(
            perms.get_user_projects(UserId::new(404)).await.unwrap_err(),
            AuthError::UserNotFound
        ));

        let members = perms.get_project_user_roles(ProjectId::new(2)).await.unwrap();
        assert_eq!(
            members,
            vec![
                ProjectMember {
                    username: "bob".to_string(),
                    role: Role::Owner
                },
                ProjectMember {
                    username: "carol".to_string(),
                    role: Role::Viewer
                },
            ]
        );
        assert!(perms.get_project_user_roles(ProjectId::new(3)).await.unwrap().is_empty());
    }
}
