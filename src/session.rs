use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// Session Store - opaque tokens in Redis
// ============================================================================
//
// Login issues a random UUID token mapped to the user id with a TTL; every
// authenticated request resolves the token back to the user. Logout deletes
// the key. The mapping is the only session state the service keeps.
//
// ============================================================================

#[derive(Clone)]
pub struct SessionStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl SessionStore {
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl_seconds })
    }

    pub async fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&token, user_id.to_string(), self.ttl_seconds)
            .await?;
        Ok(token)
    }

    /// The user id behind a token, or None for an unknown/expired token.
    pub async fn resolve(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(token).await?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    /// Returns whether a session was actually revoked.
    pub async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(token).await?;
        Ok(removed > 0)
    }
}
