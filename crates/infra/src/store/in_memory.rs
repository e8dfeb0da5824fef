use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use keystone_auth::{
    Constraint, NewUser, PermissionStore, ProjectMember, ProjectPermission, RefreshToken, RefreshTokenStore, Role,
    StoreError, StoreResult, UniqueKey, User, UserStore,
};
use keystone_core::{ProjectId, RefreshTokenId, UserId};

#[derive(Debug, Default)]
struct State {
    next_user_id: i64,
    next_token_id: i64,
    users: HashMap<UserId, User>,
    permissions: HashMap<(UserId, ProjectId), Role>,
    /// Keyed by token string; at most one row per user.
    refresh_tokens: HashMap<String, RefreshToken>,
}

impl State {
    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn user_mut(&mut self, user_id: UserId) -> StoreResult<&mut User> {
        self.users.get_mut(&user_id).ok_or(StoreError::NotFound)
    }
}

/// In-memory credential store.
///
/// Intended for tests/dev. Every write runs under one write lock, which gives
/// the same atomicity the Postgres adapter gets from single statements.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    state: RwLock<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    /// Move the expiry of a stored refresh token. Returns `false` if the token
    /// is unknown.
    pub fn set_refresh_token_expiry(&self, token: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.write()?;
        Ok(match state.refresh_tokens.get_mut(token) {
            Some(row) => {
                row.expires_at = expires_at;
                true
            }
            None => false,
        })
    }

    pub fn refresh_token_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.refresh_tokens.len())
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryCredentialStore {
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
        let mut state = self.write()?;
        if state.username_taken(&user.username, None) {
            return Err(StoreError::unique(UniqueKey::Username));
        }
        if state.email_taken(&user.email, None) {
            return Err(StoreError::unique(UniqueKey::Email));
        }

        state.next_user_id += 1;
        let id = UserId::new(state.next_user_id);
        state.users.insert(
            id,
            User {
                id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
            },
        );
        Ok(id)
    }

    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        Ok(self.read()?.users.contains_key(&user_id))
    }

    async fn update_username(&self, user_id: UserId, username: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.username_taken(username, Some(user_id)) {
            return Err(StoreError::unique(UniqueKey::Username));
        }
        state.user_mut(user_id)?.username = username.to_owned();
        Ok(())
    }

    async fn update_email(&self, user_id: UserId, email: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.email_taken(email, Some(user_id)) {
            return Err(StoreError::unique(UniqueKey::Email));
        }
        state.user_mut(user_id)?.email = email.to_owned();
        Ok(())
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
        self.write()?.user_mut(user_id)?.password_hash = password_hash.to_owned();
        Ok(())
    }
}

#[async_trait::async_trait]
impl PermissionStore for InMemoryCredentialStore {
    async fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool> {
        Ok(self
            .read()?
            .permissions
            .keys()
            .any(|(_, project)| *project == project_id))
    }

    async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.permissions.get(&(user_id, project_id)).copied())
    }

    async fn insert_owner_if_absent(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<bool> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user_id) {
            return Err(Constraint::ForeignKey.into());
        }

        let has_owner = state
            .permissions
            .iter()
            .any(|((_, project), role)| *project == project_id && role.is_owner());
        if has_owner {
            return Ok(false);
        }
        if state.permissions.contains_key(&(user_id, project_id)) {
            return Err(StoreError::unique(UniqueKey::Permission));
        }

        state.permissions.insert((user_id, project_id), Role::Owner);
        Ok(true)
    }

    async fn insert_permission(&self, permission: ProjectPermission) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&permission.user_id) {
            return Err(Constraint::ForeignKey.into());
        }

        let key = (permission.user_id, permission.project_id);
        if state.permissions.contains_key(&key) {
            return Err(StoreError::unique(UniqueKey::Permission));
        }
        if permission.role.is_owner()
            && state
                .permissions
                .iter()
                .any(|((_, project), role)| *project == permission.project_id && role.is_owner())
        {
            return Err(StoreError::unique(UniqueKey::ProjectOwner));
        }

        state.permissions.insert(key, permission.role);
        Ok(())
    }

    async fn update_permission(&self, user_id: UserId, project_id: ProjectId, role: Role) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.permissions.get_mut(&(user_id, project_id)) {
            Some(current) if !current.is_owner() => {
                *current = role;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn delete_permission(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<()> {
        let mut state = self.write()?;
        let key = (user_id, project_id);
        match state.permissions.get(&key) {
            Some(role) if !role.is_owner() => {
                state.permissions.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<ProjectId>> {
        let mut projects: Vec<ProjectId> = self
            .read()?
            .permissions
            .keys()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, project)| *project)
            .collect();
        projects.sort();
        Ok(projects)
    }

    async fn list_project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>> {
        let state = self.read()?;
        let mut members = Vec::new();
        for ((user_id, project), role) in &state.permissions {
            if *project != project_id {
                continue;
            }
            let user = state
                .users
                .get(user_id)
                .ok_or_else(|| StoreError::Corrupt(format!("permission references missing user {user_id}")))?;
            members.push(ProjectMember {
                username: user.username.clone(),
                role: *role,
            });
        }
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for InMemoryCredentialStore {
    async fn upsert_refresh_token(&self, user_id: UserId, token: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user_id) {
            return Err(Constraint::ForeignKey.into());
        }
        if state
            .refresh_tokens
            .get(token)
            .is_some_and(|row| row.user_id != user_id)
        {
            return Err(StoreError::unique(UniqueKey::RefreshToken));
        }

        state.refresh_tokens.retain(|_, row| row.user_id != user_id);
        state.next_token_id += 1;
        let id = RefreshTokenId::new(state.next_token_id);
        state.refresh_tokens.insert(
            token.to_owned(),
            RefreshToken {
                id,
                user_id,
                token: token.to_owned(),
                expires_at,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.write()?.refresh_tokens.remove(token))
    }

    async fn delete_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.write()?.refresh_tokens.remove(token);
        Ok(())
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.write()?;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, row| row.expires_at >= now);
        Ok((before - state.refresh_tokens.len()) as u64)
    }
}
