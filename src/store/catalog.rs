use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::element::{ChemicalElement, ElementPatch, NewElement};
use crate::error::AppError;

// ============================================================================
// Catalog Store - chemical element records
// ============================================================================
//
// Read-heavy: key lookup and case-insensitive title prefix search with
// LIMIT/OFFSET pagination. Writes are manager-only and go through the HTTP
// layer's role checks.
//
// ============================================================================

const COLUMNS: &str =
    "id, title, img_path, volume, unit, price_cents, short_description, description";

/// Escape LIKE metacharacters so a search for "100%" matches the literal
/// title instead of everything.
fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Page of elements whose title starts with `title_prefix` (case
    /// insensitive), plus the total match count for pagination.
    pub async fn list(
        &self,
        title_prefix: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<ChemicalElement>, i64), AppError> {
        let offset = (page - 1) * page_size;
        let prefix = escape_like(title_prefix);

        let elements = sqlx::query_as::<_, ChemicalElement>(&format!(
            "SELECT {COLUMNS} FROM chemical_element \
             WHERE title ILIKE $1 || '%' \
             ORDER BY title \
             LIMIT $2 OFFSET $3"
        ))
        .bind(&prefix)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chemical_element WHERE title ILIKE $1 || '%'",
        )
        .bind(&prefix)
        .fetch_one(&self.pool)
        .await?;

        Ok((elements, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<ChemicalElement, AppError> {
        sqlx::query_as::<_, ChemicalElement>(&format!(
            "SELECT {COLUMNS} FROM chemical_element WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("chemical element not found"))
    }

    pub async fn insert(&self, new: &NewElement) -> Result<ChemicalElement, AppError> {
        let element = sqlx::query_as::<_, ChemicalElement>(&format!(
            "INSERT INTO chemical_element \
                 (id, title, volume, unit, price_cents, short_description, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(new.volume)
        .bind(&new.unit)
        .bind(new.price_cents)
        .bind(&new.short_description)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(element_id = %element.id, title = %element.title, "catalog element created");
        Ok(element)
    }

    /// Partial update; unset patch fields keep their current value.
    pub async fn update(
        &self,
        id: Uuid,
        patch: &ElementPatch,
    ) -> Result<ChemicalElement, AppError> {
        sqlx::query_as::<_, ChemicalElement>(&format!(
            "UPDATE chemical_element SET \
                 title = COALESCE($2, title), \
                 volume = COALESCE($3, volume), \
                 unit = COALESCE($4, unit), \
                 price_cents = COALESCE($5, price_cents), \
                 short_description = COALESCE($6, short_description), \
                 description = COALESCE($7, description) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.title)
        .bind(patch.volume)
        .bind(&patch.unit)
        .bind(patch.price_cents)
        .bind(&patch.short_description)
        .bind(&patch.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("chemical element not found"))
    }

    /// Removes the element; line items referencing it are cascaded away by
    /// the schema.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM chemical_element WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("chemical element not found"));
        }
        tracing::info!(element_id = %id, "catalog element deleted");
        Ok(())
    }

    pub async fn set_img_path(&self, id: Uuid, img_path: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE chemical_element SET img_path = $2 WHERE id = $1")
            .bind(id)
            .bind(img_path)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("chemical element not found"));
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

    #[test]
    fn test_escape_like_passes_plain_prefixes_through() {
        assert_eq!(escape_like(""), "");
        assert_eq!(escape_like("Glycerin"), "Glycerin");
    }

    #[test]
    fn test_escape_like_neutralizes_wildcards() {
        // a bare "%" must not match the whole catalog
        assert_eq!(escape_like("%"), "\\%");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }
}
