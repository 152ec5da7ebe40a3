use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// Chemical Element - Catalog Entry
// ============================================================================

pub const TITLE_MAX: usize = 30;
pub const UNIT_MAX: usize = 10;
pub const SHORT_DESCRIPTION_MAX: usize = 255;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChemicalElement {
    pub id: Uuid,
    pub title: String,
    /// Public URL of the element image in object storage, if one was
    /// uploaded.
    pub img_path: Option<String>,
    pub volume: i32,
    pub unit: String,
    /// Price with two implied fraction digits.
    pub price_cents: i64,
    pub short_description: String,
    pub description: String,
}

/// Payload for creating a catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewElement {
    pub title: String,
    pub volume: i32,
    pub unit: String,
    pub price_cents: i64,
    pub short_description: String,
    pub description: String,
}

impl NewElement {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title must not be empty"));
        }
        if self.title.chars().count() > TITLE_MAX {
            return Err(AppError::validation(format!(
                "title must be at most {TITLE_MAX} characters"
            )));
        }
        if self.unit.trim().is_empty() || self.unit.chars().count() > UNIT_MAX {
            return Err(AppError::validation(format!(
                "unit must be 1..={UNIT_MAX} characters"
            )));
        }
        if self.short_description.chars().count() > SHORT_DESCRIPTION_MAX {
            return Err(AppError::validation(format!(
                "short description must be at most {SHORT_DESCRIPTION_MAX} characters"
            )));
        }
        if self.volume <= 0 {
            return Err(AppError::validation("volume must be positive"));
        }
        if self.price_cents < 0 {
            return Err(AppError::validation("price must not be negative"));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementPatch {
    pub title: Option<String>,
    pub volume: Option<i32>,
    pub unit: Option<String>,
    pub price_cents: Option<i64>,
    pub short_description: Option<String>,
    pub description: Option<String>,
}

impl ElementPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() || title.chars().count() > TITLE_MAX {
                return Err(AppError::validation(format!(
                    "title must be 1..={TITLE_MAX} characters"
                )));
            }
        }
        if let Some(unit) = &self.unit {
            if unit.trim().is_empty() || unit.chars().count() > UNIT_MAX {
                return Err(AppError::validation(format!(
                    "unit must be 1..={UNIT_MAX} characters"
                )));
            }
        }
        if let Some(short) = &self.short_description {
            if short.chars().count() > SHORT_DESCRIPTION_MAX {
                return Err(AppError::validation(format!(
                    "short description must be at most {SHORT_DESCRIPTION_MAX} characters"
                )));
            }
        }
        if matches!(self.volume, Some(v) if v <= 0) {
            return Err(AppError::validation("volume must be positive"));
        }
        if matches!(self.price_cents, Some(p) if p < 0) {
            return Err(AppError::validation("price must not be negative"));
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

    fn valid_new() -> NewElement {
        NewElement {
            title: "Glycerin".to_string(),
            volume: 100,
            unit: "ml".to_string(),
            price_cents: 1250,
            short_description: "Humectant".to_string(),
            description: "Standard cosmetic-grade glycerin.".to_string(),
        }
    }

    #[test]
    fn test_valid_element_passes() {
        assert!(valid_new().validate().is_ok());
    }

    #[test]
    fn test_title_limits() {
        let mut e = valid_new();
        e.title = "".to_string();
        assert!(e.validate().is_err());

        e.title = "x".repeat(TITLE_MAX + 1);
        assert!(e.validate().is_err());

        e.title = "x".repeat(TITLE_MAX);
        assert!(e.validate().is_ok());
    }

    #[test]
    fn test_numeric_limits() {
        let mut e = valid_new();
        e.volume = 0;
        assert!(e.validate().is_err());

        let mut e = valid_new();
        e.price_cents = -1;
        assert!(e.validate().is_err());
    }

    #[test]
    fn test_empty_patch_is_valid() {
        assert!(ElementPatch::default().validate().is_ok());
    }

    #[test]
    fn test_patch_respects_limits() {
        let patch = ElementPatch {
            unit: Some("millilitres!".to_string()), // 12 chars
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = ElementPatch {
            title: Some("Panthenol".to_string()),
            price_cents: Some(980),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
    }
}
