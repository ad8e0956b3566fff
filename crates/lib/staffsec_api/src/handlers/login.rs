//! Login, password change, session and refresh handlers.
//!
//! Login and password change answer with `{message}` bodies and keep the
//! status codes the web frontend already relies on, including 200 for
//! some failures.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use staffsec_core::auth::AuthError;
use staffsec_core::auth::guard::{Principal, bearer_token};
use staffsec_core::models::auth::Credential;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{LoginRequest, LoginResponse, LogoutRequest, PasswordChangeRequest};

/// `POST /login`: exchange username and password for a token pair.
pub async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    match state.authenticator.login(&body.username, &body.password).await {
        Ok(tokens) => Ok((StatusCode::OK, Json(LoginResponse::authenticated(tokens))).into_response()),
        Err(AuthError::Expired) => Ok((
            StatusCode::OK,
            Json(LoginResponse::message(LoginResponse::EXPIRED)),
        )
            .into_response()),
        Err(AuthError::Denied) => Ok((
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::message(LoginResponse::DENIED)),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// `PATCH /login`: change the password after re-entering the current one.
pub async fn change_password_handler(
    State(state): State<AppState>,
    body: Result<Json<PasswordChangeRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    match state
        .authenticator
        .change_password(&body.username, &body.password, &body.new_pswd)
        .await
    {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(LoginResponse::message(LoginResponse::AUTHENTICATED)),
        )
            .into_response()),
        Err(AuthError::Denied) => Ok((
            StatusCode::OK,
            Json(LoginResponse::message(LoginResponse::DENIED)),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// `GET /login`: the caller's own account.
pub async fn current_user_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Credential>> {
    let credential = state
        .authenticator
        .current(principal.id)
        .await
        .map_err(AppError::from_guard)?;
    Ok(Json(credential))
}

/// `DELETE /login`: revoke the presented access token, and the refresh
/// token named in an optional `{refresh}` body.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> AppResult<StatusCode> {
    let request: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };

    if let Some(refresh) = request.refresh.as_deref() {
        state
            .authenticator
            .revoke_refresh(refresh, principal.id)
            .await
            .map_err(AppError::from_guard)?;
    }
    state
        .authenticator
        .logout(&principal.token, principal.expires)
        .await?;
    Ok(StatusCode::OK)
}

/// `POST /refresh`: mint a new access token from the bearer token.
pub async fn refresh_handler(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let result = match bearer_token(header) {
        Ok(token) => state.authenticator.refresh(token).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(access) => Ok((StatusCode::OK, Json(access)).into_response()),
        Err(e @ (AuthError::Store(_) | AuthError::Cache(_) | AuthError::Internal(_))) => {
            Err(e.into())
        }
        Err(_) => Ok((
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::message(LoginResponse::UNAUTHORIZED)),
        )
            .into_response()),
    }
}
