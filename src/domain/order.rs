use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Formulation Order - Lifecycle Engine
// ============================================================================
//
// The order state machine:
//
//     Draft ──form──> Formed ──resolve──> Completed | Rejected
//       │
//       └──discard──> Deleted
//
// Transitions are pure: each guard method validates the source state and
// returns the fields to persist. The stores apply them with a status guard
// in the WHERE clause, so a concurrent transition loses cleanly.
//
// ============================================================================

/// Persisted status codes: 1=Draft, 2=Formed, 3=Deleted, 4=Completed,
/// 5=Rejected. This numbering is canonical; it is pinned by `code()` and the
/// serde impls below and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i16)]
pub enum OrderStatus {
    Draft = 1,
    Formed = 2,
    Deleted = 3,
    Completed = 4,
    Rejected = 5,
}

impl OrderStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Draft),
            2 => Some(Self::Formed),
            3 => Some(Self::Deleted),
            4 => Some(Self::Completed),
            5 => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i16::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown order status code: {code}")))
    }
}

/// Terminal outcome a reviewer may request for a formed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Rejected,
}

impl Resolution {
    pub fn from_code(code: i16) -> Result<Self, OrderError> {
        match OrderStatus::from_code(code) {
            Some(OrderStatus::Completed) => Ok(Self::Completed),
            Some(OrderStatus::Rejected) => Ok(Self::Rejected),
            _ => Err(OrderError::InvalidResolutionTarget(code)),
        }
    }

    pub fn status(self) -> OrderStatus {
        match self {
            Self::Completed => OrderStatus::Completed,
            Self::Rejected => OrderStatus::Rejected,
        }
    }
}

// ============================================================================
// Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order is not a draft (status: {0:?})")]
    NotDraft(OrderStatus),

    #[error("order has not been formed (status: {0:?})")]
    NotFormed(OrderStatus),

    #[error("order name must be filled in before forming")]
    MissingName,

    #[error("invalid component dosage: {0}")]
    InvalidDosage(f64),

    #[error("invalid resolution status code: {0}")]
    InvalidResolutionTarget(i16),
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FormulationOrder {
    pub id: Uuid,
    /// Owning user; the chemist assembling the formulation.
    pub chemist_id: Uuid,
    pub status: OrderStatus,
    pub date_created: DateTime<Utc>,
    pub name: Option<String>,
    pub category: Option<String>,
    /// Reviewer who resolved the order, set at resolution.
    pub technologist_id: Option<Uuid>,
    pub date_formation: Option<DateTime<Utc>>,
    pub date_completion: Option<DateTime<Utc>>,
    pub adverse_effects_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderComponent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub element_id: Uuid,
    pub dosage: f64,
}

/// Fields persisted by the form (submit) transition.
#[derive(Debug, Clone, Copy)]
pub struct Formation {
    pub date_formation: DateTime<Utc>,
}

/// Fields persisted by the resolve transition, computed before any store
/// write so the transition can be applied atomically after the downstream
/// callback succeeds.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionOutcome {
    pub status: OrderStatus,
    pub technologist_id: Uuid,
    pub date_completion: DateTime<Utc>,
    /// Rejection zeroes the adverse-effects metric; completion leaves it
    /// untouched for later recording.
    pub adverse_effects_count: Option<i32>,
}

// ============================================================================
// Lifecycle Engine
// ============================================================================

impl FormulationOrder {
    pub fn ensure_draft(&self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Draft => Ok(()),
            other => Err(OrderError::NotDraft(other)),
        }
    }

    /// Submit gate: Draft → Formed. The name must be filled in and every
    /// component dosage strictly positive.
    pub fn form(
        &self,
        components: &[OrderComponent],
        now: DateTime<Utc>,
    ) -> Result<Formation, OrderError> {
        self.ensure_draft()?;

        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(OrderError::MissingName);
        }

        if !are_valid_dosages(components) {
            let bad = components
                .iter()
                .map(|c| c.dosage)
                .find(|d| !(*d > 0.0))
                .unwrap_or_default();
            return Err(OrderError::InvalidDosage(bad));
        }

        Ok(Formation {
            date_formation: now,
        })
    }

    /// Reviewer gate: Formed → Completed | Rejected. Role checks live in the
    /// HTTP layer; the engine only cares about the state machine.
    pub fn resolve(
        &self,
        target: Resolution,
        reviewer: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolutionOutcome, OrderError> {
        match self.status {
            OrderStatus::Formed => {}
            other => return Err(OrderError::NotFormed(other)),
        }

        Ok(ResolutionOutcome {
            status: target.status(),
            technologist_id: reviewer,
            date_completion: now,
            adverse_effects_count: match target {
                Resolution::Rejected => Some(0),
                Resolution::Completed => None,
            },
        })
    }

    /// Draft → Deleted. Orders are never physically removed.
    pub fn discard(&self) -> Result<OrderStatus, OrderError> {
        self.ensure_draft()?;
        Ok(OrderStatus::Deleted)
    }

    /// Value to store for the adverse-effects metric: a rejected order is
    /// pinned at zero regardless of the requested value.
    pub fn adverse_effects_value(&self, requested: i32) -> i32 {
        match self.status {
            OrderStatus::Rejected => 0,
            _ => requested,
        }
    }
}

/// True iff every component dosage is strictly positive. An order with no
/// components passes; the gate is about the dosages present.
pub fn are_valid_dosages(components: &[OrderComponent]) -> bool {
    components.iter().all(|c| c.dosage > 0.0)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: Option<&str>) -> FormulationOrder {
        FormulationOrder {
            id: Uuid::new_v4(),
            chemist_id: Uuid::new_v4(),
            status: OrderStatus::Draft,
            date_created: Utc::now(),
            name: name.map(str::to_string),
            category: None,
            technologist_id: None,
            date_formation: None,
            date_completion: None,
            adverse_effects_count: None,
        }
    }

    fn component(order_id: Uuid, dosage: f64) -> OrderComponent {
        OrderComponent {
            id: Uuid::new_v4(),
            order_id,
            element_id: Uuid::new_v4(),
            dosage,
        }
    }

    #[test]
    fn test_status_codes_are_canonical() {
        assert_eq!(OrderStatus::Draft.code(), 1);
        assert_eq!(OrderStatus::Formed.code(), 2);
        assert_eq!(OrderStatus::Deleted.code(), 3);
        assert_eq!(OrderStatus::Completed.code(), 4);
        assert_eq!(OrderStatus::Rejected.code(), 5);

        for code in 1..=5 {
            assert_eq!(OrderStatus::from_code(code).unwrap().code(), code);
        }
        assert!(OrderStatus::from_code(0).is_none());
        assert!(OrderStatus::from_code(6).is_none());
    }

    #[test]
    fn test_status_serializes_as_code() {
        let json = serde_json::to_string(&OrderStatus::Completed).unwrap();
        assert_eq!(json, "4");
        let back: OrderStatus = serde_json::from_str("2").unwrap();
        assert_eq!(back, OrderStatus::Formed);
        assert!(serde_json::from_str::<OrderStatus>("9").is_err());
    }

    #[test]
    fn test_form_requires_name() {
        let order = draft(None);
        let err = order.form(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::MissingName));

        let order = draft(Some("   "));
        let err = order.form(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::MissingName));
    }

    #[test]
    fn test_form_rejects_non_positive_dosage() {
        let order = draft(Some("Night cream"));
        let components = vec![
            component(order.id, 2.5),
            component(order.id, 0.0), // unset dosage defaults to 0
        ];
        let err = order.form(&components, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvalidDosage(d) if d == 0.0));

        let components = vec![component(order.id, -1.0)];
        assert!(order.form(&components, Utc::now()).is_err());
    }

    #[test]
    fn test_form_sets_formation_timestamp() {
        let order = draft(Some("Night cream"));
        let now = Utc::now();
        let formation = order
            .form(&[component(order.id, 1.0)], now)
            .expect("valid draft should form");
        assert_eq!(formation.date_formation, now);
    }

    #[test]
    fn test_form_requires_draft_status() {
        let mut order = draft(Some("Night cream"));
        order.status = OrderStatus::Formed;
        let err = order.form(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::NotDraft(OrderStatus::Formed)));
    }

    #[test]
    fn test_resolve_requires_formed_status() {
        let order = draft(Some("Night cream"));
        let err = order
            .resolve(Resolution::Completed, Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFormed(OrderStatus::Draft)));
    }

    #[test]
    fn test_resolve_to_rejected_zeroes_adverse_effects() {
        let mut order = draft(Some("Night cream"));
        order.status = OrderStatus::Formed;
        let outcome = order
            .resolve(Resolution::Rejected, Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Rejected);
        assert_eq!(outcome.adverse_effects_count, Some(0));
    }

    #[test]
    fn test_resolve_to_completed_records_reviewer() {
        let mut order = draft(Some("Night cream"));
        order.status = OrderStatus::Formed;
        let reviewer = Uuid::new_v4();
        let now = Utc::now();
        let outcome = order.resolve(Resolution::Completed, reviewer, now).unwrap();
        assert_eq!(outcome.status, OrderStatus::Completed);
        assert_eq!(outcome.technologist_id, reviewer);
        assert_eq!(outcome.date_completion, now);
        assert_eq!(outcome.adverse_effects_count, None);
    }

    #[test]
    fn test_resolution_target_codes() {
        assert_eq!(Resolution::from_code(4).unwrap(), Resolution::Completed);
        assert_eq!(Resolution::from_code(5).unwrap(), Resolution::Rejected);
        // Draft, Formed and Deleted are not legal resolution targets
        for code in [1, 2, 3, 0, 42] {
            assert!(Resolution::from_code(code).is_err());
        }
    }

    #[test]
    fn test_discard_only_from_draft() {
        let order = draft(None);
        assert_eq!(order.discard().unwrap(), OrderStatus::Deleted);

        let mut formed = draft(Some("x"));
        formed.status = OrderStatus::Formed;
        assert!(formed.discard().is_err());
    }

    #[test]
    fn test_adverse_effects_pinned_to_zero_on_rejected() {
        let mut order = draft(Some("x"));
        order.status = OrderStatus::Rejected;
        assert_eq!(order.adverse_effects_value(7), 0);

        order.status = OrderStatus::Completed;
        assert_eq!(order.adverse_effects_value(7), 7);
    }

    #[test]
    fn test_are_valid_dosages() {
        let order_id = Uuid::new_v4();
        assert!(are_valid_dosages(&[]));
        assert!(are_valid_dosages(&[component(order_id, 0.1)]));
        assert!(!are_valid_dosages(&[
            component(order_id, 1.0),
            component(order_id, 0.0),
        ]));
    }

    /// Full walk of the happy path: an unset dosage blocks forming, fixing
    /// it lets the order form, and a reviewer completes it.
    #[test]
    fn test_lifecycle_scenario() {
        let mut order = draft(Some("Alice's serum"));
        let e1 = component(order.id, 0.0); // dosage never set
        let e2 = component(order.id, 5.0);

        let err = order.form(&[e1.clone(), e2.clone()], Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvalidDosage(_)));
        assert_eq!(order.status, OrderStatus::Draft);

        let mut e1 = e1;
        e1.dosage = 2.0;
        let formation = order.form(&[e1, e2], Utc::now()).unwrap();
        order.status = OrderStatus::Formed;
        order.date_formation = Some(formation.date_formation);

        let reviewer = Uuid::new_v4();
        let outcome = order
            .resolve(Resolution::Completed, reviewer, Utc::now())
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Completed);
        assert_eq!(outcome.technologist_id, reviewer);
    }
}
