//! Per-project role map.
//!
//! Per `(user, project)` the only transitions are
//! absent -> editor/viewer <-> editor/viewer, and absent -> owner through
//! [`PermissionEngine::create_project`]. An owner row is never updated or
//! removed.

use tracing::{info, instrument, warn};

use keystone_core::{ProjectId, UserId};

use crate::error::{AuthError, AuthResult};
use crate::facade::Facade;
use crate::model::{ProjectMember, ProjectPermission, User};
use crate::roles::Role;
use crate::store::{Constraint, CredentialStore, StoreError, UniqueKey};

/// Anything that names a role: a parsed [`Role`] or its wire string.
pub trait IntoRole {
    fn into_role(self) -> AuthResult<Role>;
}

impl IntoRole for Role {
    fn into_role(self) -> AuthResult<Role> {
        Ok(self)
    }
}

impl IntoRole for &str {
    fn into_role(self) -> AuthResult<Role> {
        self.parse().map_err(|_| AuthError::InvalidRole(self.to_owned()))
    }
}

pub struct PermissionEngine<S: ?Sized> {
    facade: Facade<S>,
}

impl<S: ?Sized> Clone for PermissionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            facade: self.facade.clone(),
        }
    }
}

/// Resolved participants of a role mutation.
struct Mutation {
    target: User,
    target_role: Option<Role>,
}

impl<S> PermissionEngine<S>
where
    S: CredentialStore + ?Sized,
{
    pub fn new(facade: Facade<S>) -> Self {
        Self { facade }
    }

    /// Bootstrap `project_id` with `creator` as its owner.
    ///
    /// The owner insert is conditional in the store, so among concurrent
    /// creators of the same project exactly one wins.
    #[instrument(skip(self), fields(creator = %creator, project_id = %project_id), err)]
    pub async fn create_project(&self, creator: UserId, project_id: ProjectId) -> AuthResult<()> {
        self.ensure_user(creator).await?;

        let inserted = self
            .facade
            .insert_owner_if_absent(creator, project_id)
            .await
            .map_err(|e| match e {
                StoreError::Constraint(Constraint::ForeignKey) => AuthError::UserNotFound,
                StoreError::Constraint(Constraint::Unique(UniqueKey::ProjectOwner)) => AuthError::ProjectExists,
                StoreError::Constraint(Constraint::Unique(UniqueKey::Permission)) => AuthError::PermissionExists,
                e => AuthError::store("failed to add owner permission", e),
            })?;

        if !inserted {
            return Err(AuthError::ProjectExists);
        }

        info!(role = %Role::Owner, "project created");
        Ok(())
    }

    pub async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> AuthResult<Role> {
        self.ensure_user(user_id).await?;
        self.ensure_project(project_id).await?;

        self.role_of(user_id, project_id)
            .await?
            .ok_or(AuthError::PermissionNotFound)
    }

    /// Grant `role` to `target_username`. Only the project owner may assign,
    /// and only editor/viewer can be granted.
    #[instrument(skip(self, role), fields(assigner = %assigner, project_id = %project_id), err)]
    pub async fn assign_role(
        &self,
        assigner: UserId,
        target_username: &str,
        project_id: ProjectId,
        role: impl IntoRole,
    ) -> AuthResult<()> {
        let role = assignable(role)?;
        let Mutation { target, target_role } = self.authorize(assigner, target_username, project_id).await?;

        match target_role {
            Some(Role::Owner) => return Err(AuthError::OwnerRoleChanging),
            Some(_) => return Err(AuthError::PermissionExists),
            None => {}
        }

        self.facade
            .insert_permission(ProjectPermission::new(target.id, project_id, role))
            .await
            .map_err(|e| match e {
                e if e.is_unique_violation_on(&UniqueKey::Permission) => AuthError::PermissionExists,
                StoreError::Constraint(Constraint::ForeignKey) => AuthError::AssignableNotFound,
                e => AuthError::store("failed to add permission", e),
            })?;

        info!(target = %target.id, role = %role, "role assigned");
        Ok(())
    }

    #[instrument(skip(self, role), fields(assigner = %assigner, project_id = %project_id), err)]
    pub async fn update_role(
        &self,
        assigner: UserId,
        target_username: &str,
        project_id: ProjectId,
        role: impl IntoRole,
    ) -> AuthResult<()> {
        let role = assignable(role)?;
        let Mutation { target, target_role } = self.authorize(assigner, target_username, project_id).await?;
        ensure_mutable(target_role)?;

        self.facade
            .update_permission(target.id, project_id, role)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::AssignableRoleNotFound,
                e => AuthError::store("failed to update permission", e),
            })?;

        info!(target = %target.id, role = %role, "role updated");
        Ok(())
    }

    #[instrument(skip(self), fields(assigner = %assigner, project_id = %project_id), err)]
    pub async fn delete_role(&self, assigner: UserId, target_username: &str, project_id: ProjectId) -> AuthResult<()> {
        let Mutation { target, target_role } = self.authorize(assigner, target_username, project_id).await?;
        ensure_mutable(target_role)?;

        self.facade
            .delete_permission(target.id, project_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::AssignableRoleNotFound,
                e => AuthError::store("failed to delete permission", e),
            })?;

        info!(target = %target.id, "role removed");
        Ok(())
    }

    pub async fn get_user_projects(&self, user_id: UserId) -> AuthResult<Vec<ProjectId>> {
        self.ensure_user(user_id).await?;

        self.facade
            .list_user_projects(user_id)
            .await
            .map_err(|e| AuthError::store("failed to list user projects", e))
    }

    /// Members of `project_id`. An unknown project simply has none.
    pub async fn get_project_user_roles(&self, project_id: ProjectId) -> AuthResult<Vec<ProjectMember>> {
        self.facade
            .list_project_members(project_id)
            .await
            .map_err(|e| AuthError::store("failed to list project members", e))
    }

    /// Shared preconditions of assign/update/delete: the assigner exists and
    /// owns the project, and the target username resolves to an account.
    async fn authorize(&self, assigner: UserId, target_username: &str, project_id: ProjectId) -> AuthResult<Mutation> {
        self.ensure_user(assigner).await?;
        self.ensure_project(project_id).await?;

        match self.role_of(assigner, project_id).await? {
            None => return Err(AuthError::AssignerRoleNotFound),
            Some(role) if !role.is_owner() => {
                warn!(assigner = %assigner, project_id = %project_id, role = %role, "role mutation by non-owner");
                return Err(AuthError::AssignerIsNotOwner);
            }
            Some(_) => {}
        }

        let target = self
            .facade
            .get_user_by_username(target_username)
            .await
            .map_err(|e| AuthError::store("failed to get user by username", e))?
            .ok_or(AuthError::AssignableNotFound)?;

        let target_role = self.role_of(target.id, project_id).await?;
        Ok(Mutation { target, target_role })
    }

    async fn role_of(&self, user_id: UserId, project_id: ProjectId) -> AuthResult<Option<Role>> {
        self.facade
            .get_role(user_id, project_id)
            .await
            .map_err(|e| AuthError::store("failed to get role", e))
    }

    async fn ensure_user(&self, user_id: UserId) -> AuthResult<()> {
        let exists = self
            .facade
            .user_exists(user_id)
            .await
            .map_err(|e| AuthError::store("failed to check user", e))?;
        if exists { Ok(()) } else { Err(AuthError::UserNotFound) }
    }

    async fn ensure_project(&self, project_id: ProjectId) -> AuthResult<()> {
        let exists = self
            .facade
            .project_exists(project_id)
            .await
            .map_err(|e| AuthError::store("failed to check project", e))?;
        if exists { Ok(()) } else { Err(AuthError::ProjectNotFound) }
    }
}

fn assignable(role: impl IntoRole) -> AuthResult<Role> {
    let role = role.into_role()?;
    if role.is_assignable() {
        Ok(role)
    } else {
        Err(AuthError::InvalidRole(role.to_string()))
    }
}

fn ensure_mutable(target_role: Option<Role>) -> AuthResult<()> {
    match target_role {
        Some(Role::Owner) => Err(AuthError::OwnerRoleChanging),
        Some(_) => Ok(()),
        None => Err(AuthError::AssignableRoleNotFound),
    }
}
