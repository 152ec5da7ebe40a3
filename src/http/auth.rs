use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::domain::user::User;
use crate::error::AppError;
use crate::session::SessionStore;
use crate::store::UserStore;

// ============================================================================
// Session Authentication Extractors
// ============================================================================
//
// Actor identity is threaded into every handler as an extractor argument,
// never read from ambient state. `Identity` rejects requests without a live
// session; `MaybeIdentity` degrades to anonymous (used by the public catalog
// listing, which still wants the caller's draft summary when logged in).
//
// ============================================================================

pub const SESSION_COOKIE: &str = "session_id";

pub struct Identity(pub User);

impl Identity {
    /// Reviewer/manager gate for catalog writes and order resolution.
    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.0.is_manager {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

pub struct MaybeIdentity(pub Option<User>);

async fn resolve_identity(req: &HttpRequest) -> Result<Option<User>, AppError> {
    let sessions = req
        .app_data::<web::Data<SessionStore>>()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session store not configured")))?;
    let users = req
        .app_data::<web::Data<UserStore>>()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user store not configured")))?;

    let Some(cookie) = req.cookie(SESSION_COOKIE) else {
        return Ok(None);
    };
    let Some(user_id) = sessions.resolve(cookie.value()).await? else {
        return Ok(None);
    };
    users.find_by_id(user_id).await
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            resolve_identity(&req)
                .await?
                .map(Identity)
                .ok_or(AppError::Unauthorized)
        })
    }
}

impl FromRequest for MaybeIdentity {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { Ok(MaybeIdentity(resolve_identity(&req).await?)) })
    }
}
