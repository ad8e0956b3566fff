//! Access middleware: runs the access guard for a route group and hands
//! the resolved principal to handlers.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use staffsec_core::auth::guard::{AccessGuard, AuthorizationRequirement};

use crate::error::AppError;

/// Guard plus the requirement of the routes it protects.
#[derive(Clone)]
pub struct RouteGuard {
    pub guard: AccessGuard,
    pub requirement: AuthorizationRequirement,
}

impl RouteGuard {
    pub fn new(guard: AccessGuard, requirement: AuthorizationRequirement) -> Self {
        Self { guard, requirement }
    }
}

/// Axum middleware: authorizes `Authorization: Bearer <token>` against the
/// route requirement and injects the `Principal` into request extensions.
pub async fn require_access(
    State(route): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let principal = route
        .guard
        .authorize(header, &route.requirement)
        .await
        .map_err(AppError::from_guard)?;

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
