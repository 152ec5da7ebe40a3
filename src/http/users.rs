use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::domain::user::{NewUser, PublicUser, UserPatch};
use crate::error::AppError;
use crate::http::auth::{Identity, SESSION_COOKIE};
use crate::session::SessionStore;
use crate::store::UserStore;

// ============================================================================
// Identity Handlers - registration, login, logout, profile
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// POST /users — open registration.
pub async fn register(
    body: web::Json<NewUser>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let user = users.create(&body).await?;
    Ok(HttpResponse::Created().json(PublicUser::from(user)))
}

/// POST /session — verify credentials, issue an opaque session token and
/// hand it back both as a cookie and in the body.
pub async fn login(
    body: web::Json<Credentials>,
    users: web::Data<UserStore>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let user = users
        .find_by_username(&body.username)
        .await?
        .filter(|u| u.verify_password(&body.password))
        .ok_or_else(|| AppError::validation("invalid credentials"))?;

    let token = sessions.issue(user.id).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "session issued");

    let cookie = Cookie::build(SESSION_COOKIE, token.clone())
        .path("/")
        .same_site(SameSite::Lax)
        .http_only(true)
        .finish();

    Ok(HttpResponse::Created()
        .cookie(cookie)
        .json(serde_json::json!({ "token": token, "user": PublicUser::from(user) })))
}

/// DELETE /session — revoke the caller's token. Reports 403 when there is
/// nothing to revoke.
pub async fn logout(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, AppError> {
    let Some(cookie) = req.cookie(SESSION_COOKIE) else {
        return Err(AppError::PermissionDenied);
    };

    if sessions.revoke(cookie.value()).await? {
        let mut expired = Cookie::new(SESSION_COOKIE, "");
        expired.set_path("/");
        expired.make_removal();
        Ok(HttpResponse::NoContent().cookie(expired).finish())
    } else {
        Err(AppError::PermissionDenied)
    }
}

/// PUT /users/me — update the caller's email and/or password.
pub async fn update_me(
    identity: Identity,
    body: web::Json<UserPatch>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    let updated = users.update(identity.0.id, &body).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(updated)))
}
