use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// Users and Credentials
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    /// Managers (technologists) review formed orders and maintain the
    /// catalog.
    pub is_manager: bool,
}

impl User {
    pub fn verify_password(&self, candidate: &str) -> bool {
        hash_password(candidate, &self.salt) == self.password_hash
    }
}

/// Salted SHA-256 digest, hex-encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// What other callers are allowed to see of a user.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_manager: bool,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_manager: user.is_manager,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::validation("username must not be empty"));
        }
        if self.username.chars().count() > 150 {
            return Err(AppError::validation("username is too long"));
        }
        if self.email.chars().count() > 255 {
            return Err(AppError::validation("email is too long"));
        }
        if self.password.is_empty() {
            return Err(AppError::validation("password must not be empty"));
        }
        Ok(())
    }
}

/// Self-service profile update; either field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if matches!(&self.email, Some(e) if e.chars().count() > 255) {
            return Err(AppError::validation("email is too long"));
        }
        if matches!(&self.password, Some(p) if p.is_empty()) {
            return Err(AppError::validation("password must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_password(password: &str) -> User {
        let salt = Uuid::new_v4().simple().to_string();
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: hash_password(password, &salt),
            salt,
            is_manager: false,
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let user = user_with_password("s3cret");
        assert!(user.verify_password("s3cret"));
        assert!(!user.verify_password("S3cret"));
        assert!(!user.verify_password(""));
    }

    #[test]
    fn test_same_password_different_salt_differs() {
        let a = user_with_password("shared");
        let b = user_with_password("shared");
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_new_user_validation() {
        let ok = NewUser {
            username: "bob".to_string(),
            email: String::new(),
            password: "pw".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty_name = NewUser {
            username: "  ".to_string(),
            email: String::new(),
            password: "pw".to_string(),
        };
        assert!(empty_name.validate().is_err());

        let empty_password = NewUser {
            username: "bob".to_string(),
            email: String::new(),
            password: String::new(),
        };
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn test_email_length_bounded_by_column() {
        // email lands in a VARCHAR(255); 256 characters must fail validation
        let at_limit = NewUser {
            username: "bob".to_string(),
            email: "e".repeat(255),
            password: "pw".to_string(),
        };
        assert!(at_limit.validate().is_ok());

        let over_limit = NewUser {
            username: "bob".to_string(),
            email: "e".repeat(256),
            password: "pw".to_string(),
        };
        assert!(over_limit.validate().is_err());

        let patch = UserPatch {
            email: Some("e".repeat(256)),
            password: None,
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_public_view_hides_credentials() {
        let user = user_with_password("pw");
        let public = PublicUser::from(user.clone());
        assert_eq!(public.id, user.id);
        assert_eq!(public.username, "alice");
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("salt"));
    }
}
