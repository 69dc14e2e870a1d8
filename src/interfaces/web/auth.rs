use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::AppState;
use super::error::GatewayError;

pub const SESSION_COOKIE: &str = "mevchat_session";

/// The authenticated caller, inserted as a request extension by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Resolve the caller from the request headers.
///
/// Handlers that must validate their input before identifying the caller use this directly;
/// every other route goes through [`require_auth`].
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthUser, GatewayError> {
    let Some(raw_token) = extract_token(headers) else {
        warn!("Unauthorized request: no session token");
        return Err(GatewayError::Unauthorized);
    };

    match state.store.resolve_api_token(&raw_token).await? {
        Some(user_id) => Ok(AuthUser { user_id }),
        None => {
            warn!("Unauthorized request: unknown session token");
            Err(GatewayError::Unauthorized)
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Bearer header first, then the session cookie. Empty values count as absent.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::web::test_support::{FakeBackend, test_state};
    use axum::{Extension, Router, http::StatusCode, middleware, routing::get};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn protected_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/whoami",
                get(|Extension(user): Extension<AuthUser>| async move { user.user_id }),
            )
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    async fn request(app: Router, headers: Vec<(&str, String)>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/api/whoami");
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[test]
    fn extract_token_prefers_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "a=1; mevchat_session=cookie-tok".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-tok"));

        headers.insert(header::AUTHORIZATION, "Bearer bearer-tok".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("bearer-tok"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, "mevchat_session=".parse().unwrap());
        assert_eq!(extract_token(&empty), None);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (state, _) = test_state(Arc::new(FakeBackend::default())).await;
        let (status, body) = request(protected_app(state), vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("\"error\""));
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let (state, _) = test_state(Arc::new(FakeBackend::default())).await;
        let (status, _) = request(
            protected_app(state),
            vec![("authorization", "Bearer mvc_nope".to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_bearer_and_cookie_resolve_user() {
        let (state, token) = test_state(Arc::new(FakeBackend::default())).await;
        let (status, body) = request(
            protected_app(state.clone()),
            vec![("authorization", format!("Bearer {}", token))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");

        let (status, body) = request(
            protected_app(state),
            vec![("cookie", format!("{}={}", SESSION_COOKIE, token))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }
}
