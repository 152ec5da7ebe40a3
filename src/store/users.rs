use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::user::{hash_password, NewUser, User, UserPatch};
use crate::error::{is_unique_violation, AppError};

// ============================================================================
// User Store
// ============================================================================

const COLUMNS: &str = "id, username, email, password_hash, salt, is_manager";

#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewUser) -> Result<User, AppError> {
        let salt = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&new.password, &salt);

        let inserted = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, salt, is_manager) \
             VALUES ($1, $2, $3, $4, $5, FALSE) \
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&password_hash)
        .bind(&salt)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "user registered");
                Ok(user)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(AppError::Conflict("username already taken".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    /// Self-service profile update. A password change re-salts.
    pub async fn update(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError> {
        let (password_hash, salt) = match &patch.password {
            Some(password) => {
                let salt = Uuid::new_v4().simple().to_string();
                (Some(hash_password(password, &salt)), Some(salt))
            }
            None => (None, None),
        };

        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                 email = COALESCE($2, email), \
                 password_hash = COALESCE($3, password_hash), \
                 salt = COALESCE($4, salt) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.email)
        .bind(&password_hash)
        .bind(&salt)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
    }
}
