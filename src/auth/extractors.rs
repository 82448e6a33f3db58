use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::jwt::TokenError;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::{Role, User};

/// The user behind a verified bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))
}

/// Verifies the bearer token and loads its subject.
pub async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer_token(headers)?;

    let user_id = state.keys.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        match e {
            TokenError::Expired => AppError::Unauthorized("Token expired".into()),
            TokenError::Invalid => AppError::Unauthorized("Invalid token".into()),
        }
    })?;

    match state.users.find_by_id(user_id).await? {
        Some(user) => Ok(user),
        None => {
            warn!(%user_id, "token subject no longer exists");
            Err(AppError::Unauthorized("User not found".into()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // already resolved by `protect`
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }
        let user = resolve_user(state, &parts.headers).await?;
        Ok(CurrentUser(user))
    }
}

/// Route layer: rejects unauthenticated requests and attaches [`CurrentUser`].
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_user(&state, req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Set of roles allowed through [`authorize`].
#[derive(Debug, Clone, Copy)]
pub struct RoleGuard(pub &'static [Role]);

impl RoleGuard {
    pub fn check(&self, user: &User) -> Result<(), AppError> {
        if self.0.contains(&user.role) {
            Ok(())
        } else {
            warn!(user_id = %user.id, role = %user.role, "role not permitted");
            Err(AppError::Forbidden(format!(
                "Role {} is not authorized to access this route",
                user.role
            )))
        }
    }
}

/// Route layer that must run after [`protect`].
pub async fn authorize(
    State(guard): State<RoleGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
    guard.check(&current.0)?;
    Ok(next.run(req).await)
}
