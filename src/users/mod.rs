use crate::auth::extractors::{authorize, protect, RoleGuard};
use crate::state::AppState;
use crate::users::repo_types::Role;
use axum::{middleware::from_fn_with_state, Router};

pub mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;

const ADMIN_ONLY: RoleGuard = RoleGuard(&[Role::Admin]);

/// Every route here sits behind `protect`; listings additionally require an admin.
pub fn router(state: AppState) -> Router<AppState> {
    let admin = handlers::admin_routes().route_layer(from_fn_with_state(ADMIN_ONLY, authorize));

    Router::new()
        .merge(admin)
        .merge(handlers::member_routes())
        .route_layer(from_fn_with_state(state, protect))
}
