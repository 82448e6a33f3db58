use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::MessageResponse,
        extractors::CurrentUser,
        policy::ensure_can_modify,
        services::{canonical_phone, require_non_empty},
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
    users::{
        dto::{UpdateUserRequest, UserProfile},
        repo_types::{ProfileUpdate, Role},
    },
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/role/:role", get(list_users_by_role))
}

pub fn member_routes() -> Router<AppState> {
    Router::new().route(
        "/users/:id",
        get(get_user).put(update_user).delete(delete_user),
    )
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>, AppError> {
    let users = state.users.list(None).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

#[instrument(skip(state))]
pub async fn list_users_by_role(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    let role: Role = role.parse().map_err(AppError::Validation)?;
    let users = state.users.list(Some(role)).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserProfile::from(&user)))
}

#[instrument(skip(state, actor, payload), fields(actor_id = %actor.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let CurrentUser(actor) = actor;
    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    ensure_can_modify(&actor, target.id, "user")?;

    if payload.role.is_some_and(|r| r != target.role) && actor.role != Role::Admin {
        warn!(actor_id = %actor.id, target_id = %target.id, "non-admin role change");
        return Err(AppError::Forbidden("Only admins can change roles".into()));
    }

    let update = ProfileUpdate {
        name: payload
            .name
            .as_deref()
            .map(|v| require_non_empty("name", v))
            .transpose()?,
        phone: payload.phone.as_deref().map(canonical_phone).transpose()?,
        location: payload
            .location
            .as_deref()
            .map(|v| require_non_empty("location", v))
            .transpose()?,
        preferred_language: payload.preferred_language,
        role: payload.role,
    };

    let updated = state
        .users
        .update_profile(target.id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(user_id = %updated.id, "user updated");
    Ok(Json(UserProfile::from(&updated)))
}

#[instrument(skip(state, actor), fields(actor_id = %actor.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let CurrentUser(actor) = actor;
    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    ensure_can_modify(&actor, target.id, "user")?;

    if !state.users.delete(target.id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %target.id, actor_id = %actor.id, "user removed");
    Ok(Json(MessageResponse::new("User removed")))
}
