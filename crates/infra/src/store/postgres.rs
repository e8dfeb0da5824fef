//! Postgres-backed credential store.
//!
//! Every trait method is a single SQL statement, so each atomicity guarantee
//! the managers rely on is enforced by the database itself.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|-----------------------|------------|
//! | Database (unique violation) | `23505` | `Constraint(Unique(key))`, key taken from the constraint name |
//! | Database (foreign key violation) | `23503` | `Constraint(ForeignKey)` |
//! | Database (other) | any other | `Unavailable` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use keystone_auth::{
    Constraint, NewUser, PermissionStore, ProjectMember, ProjectPermission, RefreshToken, RefreshTokenStore, Role,
    StoreError, StoreResult, UniqueKey, User, UserStore,
};
use keystone_core::{ProjectId, RefreshTokenId, UserId};

/// Reference schema, applied by [`PostgresCredentialStore::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresCredentialStore {
    #[instrument(skip(self, username), err)]
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, email, password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, email), err)]
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, email, password_hash FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, user), err)]
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(UserId::new(id))
    }

    #[instrument(skip(self), err)]
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_exists", e))
    }

    #[instrument(skip(self, username), err)]
    async fn update_username(&self, user_id: UserId, username: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET username = $2 WHERE id = $1")
            .bind(user_id.get())
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_username", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self, email), err)]
    async fn update_email(&self, user_id: UserId, email: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(user_id.get())
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_email", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self, password_hash), err)]
    async fn update_password(&self, user_id: UserId, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id.get())
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_password", e))?;
        expect_one_row(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl PermissionStore for PostgresCredentialStore {
    #[instrument(skip(self), err)]
    async fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM project_permissions WHERE project_id = $1)")
            .bind(project_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("project_exists", e))
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<Option<Role>> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM project_permissions WHERE user_id = $1 AND project_id = $2")
                .bind(user_id.get())
                .bind(project_id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_role", e))?;
        role.as_deref().map(parse_role).transpose()
    }

    #[instrument(skip(self), err)]
    async fn insert_owner_if_absent(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO project_permissions (user_id, project_id, role)
            VALUES ($1, $2, 'owner')
            ON CONFLICT (project_id) WHERE role = 'owner' DO NOTHING
            "#,
        )
        .bind(user_id.get())
        .bind(project_id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_owner_if_absent", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn insert_permission(&self, permission: ProjectPermission) -> StoreResult<()> {
        sqlx::query("INSERT INTO project_permissions (user_id, project_id, role) VALUES ($1, $2, $3)")
            .bind(permission.user_id.get())
            .bind(permission.project_id.get())
            .bind(permission.role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn update_permission(&self, user_id: UserId, project_id: ProjectId, role: Role) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE project_permissions SET role = $3
            WHERE user_id = $1 AND project_id = $2 AND role <> 'owner'
            "#,
        )
        .bind(user_id.get())
        .bind(project_id.get())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_permission", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn delete_permission(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM project_permissions WHERE user_id = $1 AND project_id = $2 AND role <> 'owner'",
        )
        .bind(user_id.get())
        .bind(project_id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_permission", e))?;
        expect_one_row(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<ProjectId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT project_id FROM project_permissions WHERE user_id = $1 ORDER BY project_id")
                .bind(user_id.get())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list_user_projects", e))?;
        Ok(ids.into_iter().map(ProjectId::new).collect())
    }

    #[instrument(skip(self), err)]
    async fn list_project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>> {
        let rows = sqlx::query(
            r#"
            SELECT u.username, p.role
            FROM project_permissions p
            JOIN users u ON u.id = p.user_id
            WHERE p.project_id = $1
            ORDER BY u.username
            "#,
        )
        .bind(project_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_project_members", e))?;

        rows.iter()
            .map(|row| {
                let role: String = row.try_get("role").map_err(corrupt)?;
                Ok(ProjectMember {
                    username: row.try_get("username").map_err(corrupt)?,
                    role: parse_role(&role)?,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for PostgresCredentialStore {
    #[instrument(skip(self, token), err)]
    async fn upsert_refresh_token(&self, user_id: UserId, token: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at, created_at = now()
            "#,
        )
        .bind(user_id.get())
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_refresh_token", e))?;
        Ok(())
    }

    #[instrument(skip(self, token), err)]
    async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let row = sqlx::query(
            "DELETE FROM refresh_tokens WHERE token = $1 RETURNING id, user_id, token, expires_at, created_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("take_refresh_token", e))?;
        row.as_ref().map(refresh_token_from_row).transpose()
    }

    #[instrument(skip(self, token), err)]
    async fn delete_refresh_token(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_refresh_token", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_expired_refresh_tokens", e))?;
        Ok(result.rows_affected())
    }
}

// SQLx row helpers

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: UserId::new(row.try_get("id").map_err(corrupt)?),
        username: row.try_get("username").map_err(corrupt)?,
        email: row.try_get("email").map_err(corrupt)?,
        password_hash: row.try_get("password_hash").map_err(corrupt)?,
    })
}

fn refresh_token_from_row(row: &PgRow) -> StoreResult<RefreshToken> {
    Ok(RefreshToken {
        id: RefreshTokenId::new(row.try_get("id").map_err(corrupt)?),
        user_id: UserId::new(row.try_get("user_id").map_err(corrupt)?),
        token: row.try_get("token").map_err(corrupt)?,
        expires_at: row.try_get("expires_at").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
    })
}

fn parse_role(raw: &str) -> StoreResult<Role> {
    raw.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn expect_one_row(rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

/// Map a unique-constraint name from the schema to its key.
fn unique_key(constraint: Option<&str>) -> UniqueKey {
    match constraint {
        Some("users_username_key") => UniqueKey::Username,
        Some("users_email_key") => UniqueKey::Email,
        Some("project_permissions_user_project_key") => UniqueKey::Permission,
        Some("project_permissions_single_owner") => UniqueKey::ProjectOwner,
        Some("refresh_tokens_token_key") | Some("refresh_tokens_user_id_key") => UniqueKey::RefreshToken,
        other => UniqueKey::Other(other.unwrap_or_default().to_string()),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::unique(unique_key(db_err.constraint())),
            Some("23503") => Constraint::ForeignKey.into(),
            _ => StoreError::Unavailable(format!("database error in {operation}: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
