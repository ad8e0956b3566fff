//! # staffsec_api
//!
//! HTTP API library for StaffSec.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use staffsec_core::auth::authenticator::Authenticator;
use staffsec_core::auth::guard::{AccessGuard, AuthorizationRequirement};
use staffsec_core::revocation::RevocationCache;
use staffsec_core::store::CredentialStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, login};
use crate::middleware::auth::{RouteGuard, require_access};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Account storage.
    pub store: Arc<dyn CredentialStore>,
    pub authenticator: Authenticator,
    pub guard: AccessGuard,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the authenticator and access guard over shared store and cache
    /// handles.
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn RevocationCache>,
    ) -> Self {
        let codec = config.token_codec();
        let authenticator = Authenticator::new(
            store.clone(),
            cache.clone(),
            codec.clone(),
            config.auth_policy(),
        );
        let guard = AccessGuard::new(codec, cache);
        Self {
            store,
            authenticator,
            guard,
            config,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(
            "/login",
            post(login::login_handler).patch(login::change_password_handler),
        )
        .route("/refresh", post(login::refresh_handler));

    // Any valid access token
    let session = Router::new()
        .route(
            "/login",
            get(login::current_user_handler).delete(login::logout_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            RouteGuard::new(state.guard.clone(), AuthorizationRequirement::any()),
            require_access,
        ));

    // Role `admin` and group `admins`
    let admin = Router::new()
        .route("/users", get(admin::list_users_handler))
        .route(
            "/user",
            post(admin::create_user_handler).patch(admin::update_user_handler),
        )
        .route(
            "/user/{id}",
            axum::routing::delete(admin::delete_user_handler),
        )
        .route("/user/{action}/{id}", get(admin::user_action_handler))
        .route(
            "/role/{value}/{user_id}",
            get(admin::grant_role_handler).delete(admin::revoke_role_handler),
        )
        .route(
            "/group/{value}/{user_id}",
            get(admin::grant_group_handler).delete(admin::revoke_group_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            RouteGuard::new(state.guard.clone(), AuthorizationRequirement::admin()),
            require_access,
        ));

    Router::new()
        .merge(public)
        .merge(session)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
