//! Administrative handlers. Every route here sits behind the admin
//! requirement.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use staffsec_core::auth::guard::Principal;
use staffsec_core::models::auth::Credential;
use staffsec_core::store::Membership;

use crate::AppState;
use crate::error::AppResult;
use crate::models::UserRequest;
use crate::services::users::{self, UserAction};

/// `GET /users`
pub async fn list_users_handler(State(state): State<AppState>) -> AppResult<Json<Vec<Credential>>> {
    Ok(Json(users::list(state.store.as_ref()).await?))
}

/// `POST /user`
pub async fn create_user_handler(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Credential>)> {
    let Json(body) = body?;
    let created = users::create(state.store.as_ref(), body, &state.config.default_password).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PATCH /user`
pub async fn update_user_handler(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Credential>)> {
    let Json(body) = body?;
    let updated = users::update(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(updated)))
}

/// `DELETE /user/{id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    users::delete(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /user/{action}/{id}`: `block` or `drop`.
pub async fn user_action_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((action, id)): Path<(String, i64)>,
) -> AppResult<Json<Credential>> {
    let action: UserAction = action.parse()?;
    let updated = users::apply_action(
        state.store.as_ref(),
        principal.id,
        action,
        id,
        &state.config.default_password,
    )
    .await?;
    Ok(Json(updated))
}

/// `GET /role/{value}/{user_id}`
pub async fn grant_role_handler(
    State(state): State<AppState>,
    Path((value, user_id)): Path<(String, i64)>,
) -> AppResult<Json<Credential>> {
    let updated = users::grant(state.store.as_ref(), Membership::Role, &value, user_id).await?;
    Ok(Json(updated))
}

/// `DELETE /role/{value}/{user_id}`
pub async fn revoke_role_handler(
    State(state): State<AppState>,
    Path((value, user_id)): Path<(String, i64)>,
) -> AppResult<Json<Credential>> {
    let updated = users::revoke(state.store.as_ref(), Membership::Role, &value, user_id).await?;
    Ok(Json(updated))
}

/// `GET /group/{value}/{user_id}`
pub async fn grant_group_handler(
    State(state): State<AppState>,
    Path((value, user_id)): Path<(String, i64)>,
) -> AppResult<Json<Credential>> {
    let updated = users::grant(state.store.as_ref(), Membership::Group, &value, user_id).await?;
    Ok(Json(updated))
}

/// `DELETE /group/{value}/{user_id}`
pub async fn revoke_group_handler(
    State(state): State<AppState>,
    Path((value, user_id)): Path<(String, i64)>,
) -> AppResult<Json<Credential>> {
    let updated = users::revoke(state.store.as_ref(), Membership::Group, &value, user_id).await?;
    Ok(Json(updated))
}
