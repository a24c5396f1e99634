use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::typed_header::TypedHeaderRejection;
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Claims of an access token. `sub` is the user id every ownership check
/// compares against.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn verify_token(token: &str, secret: &str, leeway: u64) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = leeway;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| AppError::Unauthenticated(format!("invalid token: {e}")))?;

    if token_data.claims.sub.trim().is_empty() {
        return Err(AppError::Unauthenticated("token has no subject".into()));
    }
    Ok(token_data.claims)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| AppError::Unauthenticated("missing bearer token".into()))?;

    let claims = verify_token(bearer.token(), &state.auth.secret, state.auth.leeway)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
