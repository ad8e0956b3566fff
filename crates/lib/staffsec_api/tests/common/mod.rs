//! Shared fixtures: a router backed by the in-memory store and cache.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use chrono::Utc;
use staffsec_api::config::ApiConfig;
use staffsec_api::{AppState, router};
use staffsec_core::models::auth::Credential;
use staffsec_core::revocation::memory::MemoryRevocationCache;
use staffsec_core::store::memory::MemoryCredentialStore;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryCredentialStore>,
    pub cache: Arc<MemoryRevocationCache>,
    pub config: ApiConfig,
}

pub fn test_config() -> ApiConfig {
    ApiConfig::from_lookup(|name| match name {
        "JWT_SECRET_KEY" => Some("test-access-secret".into()),
        "JWT_REFRESH_KEY" => Some("test-refresh-secret".into()),
        "DEFAULT_PASSWORD" => Some("changeme".into()),
        _ => None,
    })
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryCredentialStore::new());
    let cache = Arc::new(MemoryRevocationCache::new());
    let config = test_config();
    let state = AppState::new(config.clone(), store.clone(), cache.clone());
    TestApp {
        app: router(state),
        store,
        cache,
        config,
    }
}

/// An active account with a fresh password. Low bcrypt cost keeps tests fast.
pub fn account(user_name: &str, password: &str, roles: &[&str], groups: &[&str]) -> Credential {
    let now = Utc::now();
    Credential {
        id: 0,
        full_name: format!("{user_name} full"),
        user_name: user_name.into(),
        email: format!("{user_name}@example.com"),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        created_at: now,
        updated_at: Some(now),
        last_login: None,
        password_changed_at: now,
        blocked: false,
        attempt: 0,
        deleted: false,
        roles: roles.iter().map(|s| s.to_string()).collect(),
        groups: groups.iter().map(|s| s.to_string()).collect(),
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = self.app.clone().oneshot(req).await.expect("request");
        read(resp).await
    }

    /// Send `body` verbatim as `application/json`.
    pub async fn send_raw(&self, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = self.app.clone().oneshot(req).await.expect("request");
        read(resp).await
    }

    /// Log in and return `(access, refresh)`.
    pub async fn login(&self, username: &str, password: &str) -> (String, String) {
        let (status, json) = self
            .send(
                Method::POST,
                "/login",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {json}");
        (
            json["tokens"]["access"].as_str().unwrap().to_string(),
            json["tokens"]["refresh"].as_str().unwrap().to_string(),
        )
    }
}

async fn read(resp: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}
