//! # Bearer Authentication
//!
//! Extractor that turns an `Authorization: Bearer <token>` header into a
//! verified [`Subject`]. Rejections are a single 401 body regardless of
//! whether the credential was forged or merely expired; the distinction
//! lives in the logs only.

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use toll_core::{Subject, TokenRejection};
use tracing::debug;

/// The authenticated caller, available to any handler that lists it.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Subject);

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Unauthorized", 401)),
    )
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

        match state.tokens.verify(token) {
            Ok(subject) => Ok(AuthUser(subject)),
            Err(rejection) => {
                match rejection {
                    TokenRejection::Expired => debug!("rejected expired credential"),
                    TokenRejection::InvalidSignature => debug!("rejected forged credential"),
                }
                Err(unauthorized())
            }
        }
    }
}
