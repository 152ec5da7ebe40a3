use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::element::{ChemicalElement, ElementPatch, NewElement};
use crate::error::AppError;
use crate::http::auth::{Identity, MaybeIdentity};
use crate::storage::ObjectStorage;
use crate::store::{CatalogStore, OrderStore};

// ============================================================================
// Catalog Handlers
// ============================================================================

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub title: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Summary of the caller's draft, shown alongside the catalog page.
#[derive(Debug, Serialize)]
struct DraftSummary {
    formulation_id: Option<Uuid>,
    items_in_cart: i64,
}

#[derive(Debug, Serialize)]
struct CatalogPage {
    elements: Vec<ChemicalElement>,
    total: i64,
    page: i64,
    page_size: i64,
    draft: DraftSummary,
}

/// GET /components — public; an authenticated caller also gets their draft
/// summary.
pub async fn list_components(
    query: web::Query<CatalogQuery>,
    identity: MaybeIdentity,
    catalog: web::Data<CatalogStore>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (elements, total) = catalog.list(&query.title, page, page_size).await?;

    let draft = match &identity.0 {
        Some(user) => match orders.find_draft(user.id).await? {
            Some(draft) => DraftSummary {
                items_in_cart: orders.component_count(draft.id).await?,
                formulation_id: Some(draft.id),
            },
            None => DraftSummary {
                formulation_id: None,
                items_in_cart: 0,
            },
        },
        None => DraftSummary {
            formulation_id: None,
            items_in_cart: 0,
        },
    };

    Ok(HttpResponse::Ok().json(CatalogPage {
        elements,
        total,
        page,
        page_size,
        draft,
    }))
}

/// GET /components/{id} — public.
pub async fn get_component(
    path: web::Path<Uuid>,
    catalog: web::Data<CatalogStore>,
) -> Result<HttpResponse, AppError> {
    let element = catalog.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(element))
}

/// POST /components — manager only.
pub async fn create_component(
    identity: Identity,
    body: web::Json<NewElement>,
    catalog: web::Data<CatalogStore>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    body.validate()?;
    let element = catalog.insert(&body).await?;
    Ok(HttpResponse::Created().json(element))
}

/// PUT /components/{id} — manager only, partial update.
pub async fn update_component(
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ElementPatch>,
    catalog: web::Data<CatalogStore>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    body.validate()?;
    let element = catalog.update(path.into_inner(), &body).await?;
    Ok(HttpResponse::Ok().json(element))
}

/// DELETE /components/{id} — manager only. The stored image is removed
/// first; a storage failure aborts the whole deletion.
pub async fn delete_component(
    identity: Identity,
    path: web::Path<Uuid>,
    catalog: web::Data<CatalogStore>,
    storage: web::Data<ObjectStorage>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    let id = path.into_inner();
    let element = catalog.get(id).await?;

    if let Some(img_path) = &element.img_path {
        storage.delete_element_image(img_path).await?;
    }
    catalog.delete(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /components/{id}/image — manager only. Raw image bytes in the body;
/// replaces any existing image object in place.
pub async fn upload_image(
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Bytes,
    req: HttpRequest,
    catalog: web::Data<CatalogStore>,
    storage: web::Data<ObjectStorage>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    let id = path.into_inner();
    // existence check before touching object storage
    catalog.get(id).await?;

    if body.is_empty() {
        return Err(AppError::validation("image body must not be empty"));
    }

    let content_type = req
        .headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();

    let img_path = storage
        .upload_element_image(id, body.to_vec(), &content_type)
        .await?;
    catalog.set_img_path(id, Some(&img_path)).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "img_path": img_path })))
}

/// POST /components/{id}/add — add the element to the caller's draft,
/// creating the draft on first use. Re-adding is a no-op on the existing
/// line item.
pub async fn add_to_formulation(
    identity: Identity,
    path: web::Path<Uuid>,
    catalog: web::Data<CatalogStore>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let element = catalog.get(path.into_inner()).await?;
    let draft = orders.get_or_create_draft(identity.0.id).await?;
    orders.add_component(draft.id, element.id).await?;

    tracing::debug!(
        order_id = %draft.id,
        element_id = %element.id,
        chemist_id = %identity.0.id,
        "element added to draft"
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "formulation_id": draft.id })))
}
