use uuid::Uuid;

use crate::error::AppError;
use crate::users::repo_types::{Role, User};

/// Owners may mutate their own resources; admins may mutate anything.
pub fn can_modify(actor: &User, owner_id: Uuid) -> bool {
    actor.id == owner_id || actor.role == Role::Admin
}

pub fn ensure_can_modify(actor: &User, owner_id: Uuid, what: &str) -> Result<(), AppError> {
    if can_modify(actor, owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Not authorized to modify this {what}")))
    }
}
