use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{FormulationOrder, OrderStatus, Resolution};
use crate::domain::user::User;
use crate::error::AppError;
use crate::http::auth::Identity;
use crate::metrics::Metrics;
use crate::notify::{NotificationClient, ResolutionNotice};
use crate::store::{ComponentDetail, OrderFilter, OrderStore};

// ============================================================================
// Order Lifecycle Handlers
// ============================================================================
//
// Handlers load the order, run the pure lifecycle engine, then persist the
// computed fields through status-guarded updates. Resolution additionally
// blocks on the downstream callback before anything is written.
//
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<i16>,
    pub formation_start: Option<DateTime<Utc>>,
    pub formation_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct OrderDetail {
    #[serde(flatten)]
    order: FormulationOrder,
    components: Vec<ComponentDetail>,
}

#[derive(Debug, Deserialize)]
pub struct DraftMetaBody {
    pub name: Option<String>,
    pub category: Option<String>,
}

impl DraftMetaBody {
    /// Both columns are VARCHAR(50); overlong values must be a 400, not a
    /// database error.
    fn validate(&self) -> Result<(), AppError> {
        if matches!(&self.name, Some(n) if n.chars().count() > 50) {
            return Err(AppError::validation("name must be at most 50 characters"));
        }
        if matches!(&self.category, Some(c) if c.chars().count() > 50) {
            return Err(AppError::validation(
                "category must be at most 50 characters",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    /// Requested terminal status code: 4 (completed) or 5 (rejected).
    pub status: i16,
}

#[derive(Debug, Deserialize)]
pub struct DosageBody {
    pub dosage: f64,
}

#[derive(Debug, Deserialize)]
pub struct AdverseEffectsBody {
    pub count: i32,
}

/// Draft mutations are for the owning chemist; managers may also intervene.
fn ensure_can_touch(order: &FormulationOrder, user: &User) -> Result<(), AppError> {
    if order.chemist_id == user.id || user.is_manager {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

/// GET /orders — non-draft, non-deleted orders with optional filters.
pub async fn list_orders(
    identity: Identity,
    query: web::Query<OrderListQuery>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let status = match query.status {
        Some(code) => Some(OrderStatus::from_code(code).ok_or_else(|| {
            AppError::validation(format!("unknown order status code: {code}"))
        })?),
        None => None,
    };

    let filter = OrderFilter {
        status,
        formation_start: query.formation_start,
        formation_end: query.formation_end,
    };
    let list = orders.list(&filter, &identity.0).await?;
    Ok(HttpResponse::Ok().json(list))
}

/// GET /orders/{id} — full detail with line items.
pub async fn get_order(
    identity: Identity,
    path: web::Path<Uuid>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let order = orders.get(path.into_inner()).await?;
    ensure_can_touch(&order, &identity.0)?;
    let components = orders.component_details(order.id).await?;
    Ok(HttpResponse::Ok().json(OrderDetail { order, components }))
}

/// PUT /orders/{id} — draft name/category.
pub async fn update_order(
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<DraftMetaBody>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let order = orders.get(path.into_inner()).await?;
    ensure_can_touch(&order, &identity.0)?;
    order.ensure_draft()?;

    let updated = orders
        .update_draft_meta(order.id, body.name.as_deref(), body.category.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// PUT /orders/{id}/form — submit transition (Draft → Formed).
pub async fn form_order(
    identity: Identity,
    path: web::Path<Uuid>,
    orders: web::Data<OrderStore>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, AppError> {
    let order = orders.get(path.into_inner()).await?;
    ensure_can_touch(&order, &identity.0)?;

    let components = orders.components(order.id).await?;
    let formation = order.form(&components, Utc::now())?;
    let formed = orders.persist_formation(order.id, &formation).await?;

    metrics.orders_formed.inc();
    tracing::info!(order_id = %formed.id, chemist_id = %formed.chemist_id, "order formed");
    Ok(HttpResponse::Ok().json(formed))
}

/// PUT /orders/{id}/resolve — reviewer transition (Formed → Completed |
/// Rejected). The downstream callback runs before anything is persisted; if
/// it fails the order stays Formed and the caller sees DEPENDENCY_FAILURE.
pub async fn resolve_order(
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ResolveBody>,
    orders: web::Data<OrderStore>,
    notifier: web::Data<NotificationClient>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    let target = Resolution::from_code(body.status)?;

    let order = orders.get(path.into_inner()).await?;
    let outcome = order.resolve(target, identity.0.id, Utc::now())?;

    let notice = ResolutionNotice {
        order_id: order.id,
        status: outcome.status,
        resolved_by: outcome.technologist_id,
        resolved_at: outcome.date_completion,
    };
    if let Err(err) = notifier.notify_resolved(&notice).await {
        metrics.notification_failures.inc();
        return Err(err);
    }

    let resolved = orders.persist_resolution(order.id, &outcome).await?;

    let outcome_label = match target {
        Resolution::Completed => "completed",
        Resolution::Rejected => "rejected",
    };
    metrics.record_resolution(outcome_label);
    tracing::info!(
        order_id = %resolved.id,
        technologist_id = %identity.0.id,
        outcome = outcome_label,
        "order resolved"
    );
    Ok(HttpResponse::Ok().json(resolved))
}

/// DELETE /orders/{id} — discard transition (Draft → Deleted).
pub async fn discard_order(
    identity: Identity,
    path: web::Path<Uuid>,
    orders: web::Data<OrderStore>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, AppError> {
    let order = orders.get(path.into_inner()).await?;
    ensure_can_touch(&order, &identity.0)?;
    order.discard()?;
    orders.persist_discard(order.id).await?;

    metrics.orders_discarded.inc();
    Ok(HttpResponse::Ok().finish())
}

/// PUT /orders/{id}/adverse_effects — post-resolution metric, recorded by a
/// manager. A rejected order is pinned at zero whatever the input.
pub async fn set_adverse_effects(
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<AdverseEffectsBody>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    identity.require_manager()?;
    if body.count < 0 {
        return Err(AppError::validation("adverse effects count must not be negative"));
    }

    let order = orders.get(path.into_inner()).await?;
    let value = order.adverse_effects_value(body.count);
    orders.set_adverse_effects(order.id, value).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "adverse_effects_count": value })))
}

/// PUT /orders/{order_id}/components/{element_id} — set a line item dosage.
/// Dosage validity is gated at form time, matching the submit contract.
pub async fn update_component_dosage(
    identity: Identity,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<DosageBody>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let (order_id, element_id) = path.into_inner();
    let order = orders.get(order_id).await?;
    ensure_can_touch(&order, &identity.0)?;
    order.ensure_draft()?;

    if !body.dosage.is_finite() {
        return Err(AppError::validation("dosage must be a finite number"));
    }

    let component = orders
        .set_component_dosage(order.id, element_id, body.dosage)
        .await?;
    Ok(HttpResponse::Ok().json(component))
}

/// DELETE /orders/{order_id}/components/{element_id} — remove a line item.
pub async fn remove_component(
    identity: Identity,
    path: web::Path<(Uuid, Uuid)>,
    orders: web::Data<OrderStore>,
) -> Result<HttpResponse, AppError> {
    let (order_id, element_id) = path.into_inner();
    let order = orders.get(order_id).await?;
    ensure_can_touch(&order, &identity.0)?;
    order.ensure_draft()?;

    orders.remove_component(order.id, element_id).await?;
    Ok(HttpResponse::Ok().finish())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_meta_accepts_values_at_the_column_limit() {
        let body = DraftMetaBody {
            name: Some("x".repeat(50)),
            category: Some("y".repeat(50)),
        };
        assert!(body.validate().is_ok());

        let empty = DraftMetaBody {
            name: None,
            category: None,
        };
        assert!(empty.validate().is_ok());
    }

    #[test]
    fn test_draft_meta_rejects_overlong_name_and_category() {
        let long_name = DraftMetaBody {
            name: Some("x".repeat(51)),
            category: None,
        };
        assert!(matches!(
            long_name.validate(),
            Err(AppError::Validation(_))
        ));

        // category shares the VARCHAR(50) limit with name
        let long_category = DraftMetaBody {
            name: None,
            category: Some("y".repeat(51)),
        };
        assert!(matches!(
            long_category.validate(),
            Err(AppError::Validation(_))
        ));
    }
}
