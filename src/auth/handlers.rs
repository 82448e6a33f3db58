use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPinRequest, ForgotPinResponse, LoginRequest, MessageResponse,
            RegisterRequest, ResetPinRequest,
        },
        extractors::CurrentUser,
        notify::Delivery,
        services,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
    users::dto::UserProfile,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-pin", post(forgot_pin))
        .route("/auth/reset-pin", post(reset_pin))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let session = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new(session.user, session.token)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = services::login(&state, &payload.phone, &payload.pin).await?;
    Ok(Json(AuthResponse::new(session.user, session.token)))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn get_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = services::me(&state, current.0.id).await?;
    Ok(Json(UserProfile::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn forgot_pin(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPinRequest>,
) -> Result<Json<ForgotPinResponse>, AppError> {
    let issued = services::forgot_pin(&state, &payload.phone).await?;
    let (message, otp) = match issued.delivery {
        Delivery::Loopback(code) => ("OTP generated".to_string(), Some(code)),
        Delivery::Dispatched => ("OTP sent to your phone".to_string(), None),
    };
    Ok(Json(ForgotPinResponse {
        message,
        otp,
        expires_at: issued.expires_at,
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_pin(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPinRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    services::reset_pin(&state, &payload.phone, &payload.otp, &payload.new_pin).await?;
    Ok(Json(MessageResponse::new("PIN reset successful")))
}
