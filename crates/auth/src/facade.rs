//! Aggregation point over the credential store.
//!
//! The managers depend on this facade, never on a concrete store. Each call
//! is bounded by the configured store timeout and runs inside a `store` span.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::Instrument;

use keystone_core::{ProjectId, UserId};

use crate::model::{NewUser, ProjectMember, ProjectPermission, RefreshToken, User};
use crate::store::{CredentialStore, StoreError, StoreResult};
use crate::Role;

pub struct Facade<S: ?Sized> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: ?Sized> Clone for Facade<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: ?Sized> Facade<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let span = tracing::debug_span!("store", op);
        match tokio::time::timeout(self.timeout, fut).instrument(span).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }
}

impl<S> Facade<S>
where
    S: CredentialStore + ?Sized,
{
    // ── users ───────────────────────────────────────────────────────────────

    pub async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.call("get_user_by_username", self.store.get_user_by_username(username))
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.call("get_user_by_email", self.store.get_user_by_email(email))
            .await
    }

    pub async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
        self.call("insert_user", self.store.insert_user(user)).await
    }

    pub async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        self.call("user_exists", self.store.user_exists(user_id)).await
    }

    pub async fn update_username(&self, user_id: UserId, username: &str) -> StoreResult<()> {
        self.call("update_username", self.store.update_username(user_id, username))
            .await
    }

    pub async fn update_email(&self, user_id: UserId, email: &str) -> StoreResult<()> {
        self.call("update_email", self.store.update_email(user_id, email))
            .await
    }

    pub async fn update_password(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
        self.call("update_password", self.store.update_password(user_id, password_hash))
            .await
    }

    // ── permissions ─────────────────────────────────────────────────────────

    pub async fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool> {
        self.call("project_exists", self.store.project_exists(project_id))
            .await
    }

    pub async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<Option<Role>> {
        self.call("get_role", self.store.get_role(user_id, project_id))
            .await
    }

    pub async fn insert_owner_if_absent(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<bool> {
        self.call(
            "insert_owner_if_absent",
            self.store.insert_owner_if_absent(user_id, project_id),
        )
        .await
    }

    pub async fn insert_permission(&self, permission: ProjectPermission) -> StoreResult<()> {
        self.call("insert_permission", self.store.insert_permission(permission))
            .await
    }

    pub async fn update_permission(&self, user_id: UserId, project_id: ProjectId, role: Role) -> StoreResult<()> {
        self.call(
            "update_permission",
            self.store.update_permission(user_id, project_id, role),
        )
        .await
    }

    pub async fn delete_permission(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<()> {
        self.call("delete_permission", self.store.delete_permission(user_id, project_id))
            .await
    }

    pub async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<ProjectId>> {
        self.call("list_user_projects", self.store.list_user_projects(user_id))
            .await
    }

    pub async fn list_project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>> {
        self.call("list_project_members", self.store.list_project_members(project_id))
            .await
    }

    // ── refresh tokens ──────────────────────────────────────────────────────

    pub async fn upsert_refresh_token(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.call(
            "upsert_refresh_token",
            self.store.upsert_refresh_token(user_id, token, expires_at),
        )
        .await
    }

    pub async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        self.call("take_refresh_token", self.store.take_refresh_token(token))
            .await
    }

    pub async fn delete_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.call("delete_refresh_token", self.store.delete_refresh_token(token))
            .await
    }

    pub async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.call(
            "delete_expired_refresh_tokens",
            self.store.delete_expired_refresh_tokens(now),
        )
        .await
    }
}
