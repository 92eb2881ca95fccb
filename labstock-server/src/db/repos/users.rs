//! User repository.
//!
//! Users log in with either username or email; both are unique. Roles are a
//! flat many-to-many set, seeded at migration time.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};

use super::DbError;

/// User record from the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub timezone: String,
    pub status: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// A user with their resolved role names.
#[derive(Debug, Clone)]
pub struct UserWithRoles {
    pub user: User,
    pub roles: Vec<String>,
}

impl UserWithRoles {
    /// Non-hierarchical role check; admins pass everything.
    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        if self.user.is_admin || self.roles.iter().any(|r| r == "admin") {
            return true;
        }
        self.roles.iter().any(|r| allowed.contains(&r.as_str()))
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, timezone, status, is_admin, \
                            created_at, last_login_at";

pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a user and attach the given roles.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        is_admin: bool,
        roles: &[String],
    ) -> Result<User, DbError> {
        let mut tx = self.pool.begin().await?;

        let user: User = sqlx::query_as(&format!(
            "INSERT INTO users (username, email, password_hash, is_admin) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(is_admin)
        .fetch_one(&mut *tx)
        .await?;

        for role in roles {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, id FROM roles WHERE name = $2 \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user.id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    /// Load a user by id.
    pub async fn get(&self, id: i64) -> Result<User, DbError> {
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Load a user by username or email, case-insensitively.
    ///
    /// Email is checked first, matching the original login behavior.
    pub async fn find_by_name_or_email(&self, name_or_email: &str) -> Result<Option<User>, DbError> {
        let user: Option<User> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE LOWER(email) = LOWER($1) OR LOWER(username) = LOWER($1) \
             ORDER BY (LOWER(email) = LOWER($1)) DESC \
             LIMIT 1"
        ))
        .bind(name_or_email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Role names of a user.
    pub async fn roles(&self, user_id: i64) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query(
            "SELECT r.name FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 \
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("name")).collect())
    }

    /// Load a user together with their roles.
    pub async fn get_with_roles(&self, id: i64) -> Result<UserWithRoles, DbError> {
        let user = self.get(id).await?;
        let roles = self.roles(user.id).await?;
        Ok(UserWithRoles { user, roles })
    }

    /// Store a new password hash.
    pub async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    /// Record a successful login.
    pub async fn touch_last_login(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Number of users; used for first-run admin bootstrap.
    pub async fn count(&self) -> Result<i64, DbError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(status: &str, is_admin: bool) -> User {
        User {
            id: 1,
            username: "jdoe".into(),
            email: "jdoe@lab.example".into(),
            password_hash: String::new(),
            timezone: "UTC".into(),
            status: status.into(),
            is_admin,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn active_flag() {
        assert!(user("active", false).is_active());
        assert!(!user("inactive", false).is_active());
    }

    #[test]
    fn role_check_admin_bypass() {
        let admin = UserWithRoles {
            user: user("active", true),
            roles: vec![],
        };
        assert!(admin.has_any_role(&["editor"]));

        let editor = UserWithRoles {
            user: user("active", false),
            roles: vec!["editor".into()],
        };
        assert!(editor.has_any_role(&["editor", "viewer"]));
        assert!(!editor.has_any_role(&["user-editor"]));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_username_conflicts() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let repo = UserRepo::new(&pool);
        repo.create("dup", "dup@lab.example", "h", false, &[])
            .await
            .expect("first insert");
        let err = repo
            .create("dup", "dup2@lab.example", "h", false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }
}
