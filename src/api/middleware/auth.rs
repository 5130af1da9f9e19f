use crate::AppState;
use crate::api::error::AppError;
use crate::utils::auth::{Identity, validate_jwt};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Rejects requests without a valid bearer token and attaches the caller's
/// [`Identity`] and claims for handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Couldn't find JWT".to_string()))?;

    let claims = validate_jwt(token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Couldn't validate JWT".to_string()))?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Token subject is not a user id".to_string()))?;

    req.extensions_mut().insert(Identity(user_id));
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
