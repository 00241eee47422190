//! Axum integration: server-side enforcement of the permission table.
//!
//! [`AuthorizeLayer`] checks every request's method and URL against the
//! table with the same first-match policy as [`Evaluator::authorize_url`]. The
//! caller's [`Claims`] must already be in the request extensions, typically
//! inserted by `jwt::JwtAuthLayer` (feature `axum-jwt`).

use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::evaluator::{Decision, Evaluator};
use crate::identity::Claims;
use crate::types::HttpMethod;

use ::axum::body::Body;
use ::axum::http::{Request, StatusCode};
use ::axum::response::{IntoResponse, Response};
use ::tower::{Layer, Service};

/// Middleware layer that authorizes requests using an [`Evaluator`].
#[derive(Debug, Clone)]
pub struct AuthorizeLayer {
    evaluator: Evaluator,
}

impl AuthorizeLayer {
    /// Creates a new authorization layer.
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }
}

impl<Inner> Layer<Inner> for AuthorizeLayer {
    type Service = AuthorizeService<Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        AuthorizeService {
            inner,
            evaluator: self.evaluator.clone(),
        }
    }
}

/// Middleware service that enforces permission checks.
#[derive(Debug, Clone)]
pub struct AuthorizeService<Inner> {
    inner: Inner,
    evaluator: Evaluator,
}

/// Outcome of checking one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pass,
    Unauthenticated,
    Forbidden,
}

fn verdict(
    evaluator: &Evaluator,
    method: &http::Method,
    path: &str,
    claims: Option<&Claims>,
) -> Verdict {
    // Methods outside the table (HEAD, OPTIONS, ...) cannot carry a permission.
    let Ok(method) = method.as_str().parse::<HttpMethod>() else {
        return Verdict::Pass;
    };
    let protected = evaluator
        .table()
        .find_url(path, method)
        .is_some_and(|permission| !permission.is_public());
    if !protected {
        return Verdict::Pass;
    }
    let Some(claims) = claims else {
        return Verdict::Unauthenticated;
    };
    let Some(role) = claims.role() else {
        return Verdict::Forbidden;
    };
    match evaluator.authorize_url(&role, path, method) {
        Decision::Allow => Verdict::Pass,
        Decision::Deny => Verdict::Forbidden,
    }
}

impl<Inner> Service<Request<Body>> for AuthorizeService<Inner>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let verdict = verdict(
            &self.evaluator,
            req.method(),
            req.uri().path(),
            req.extensions().get::<Claims>(),
        );

        Box::pin(async move {
            match verdict {
                Verdict::Pass => {
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                }
                Verdict::Unauthenticated => {
                    Ok((StatusCode::UNAUTHORIZED, "missing identity").into_response())
                }
                Verdict::Forbidden => Ok((StatusCode::FORBIDDEN, "forbidden").into_response()),
            }
        })
    }
}

#[cfg(feature = "axum-jwt")]
pub mod jwt {
    use std::fmt;
    use std::future::poll_fn;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use jsonwebtoken::{DecodingKey, Validation, decode};
    use thiserror::Error;

    use crate::identity::Claims;

    use ::axum::body::Body;
    use ::axum::extract::FromRequestParts;
    use ::axum::http::header::AUTHORIZATION;
    use ::axum::http::request::Parts;
    use ::axum::http::{HeaderMap, Request, StatusCode};
    use ::axum::response::{IntoResponse, Response};
    use ::tower::{Layer, Service};

    /// Errors returned by JWT auth helpers.
    #[derive(Debug, Error)]
    pub enum AuthError {
        /// Authorization header is missing.
        #[error("missing authorization header")]
        MissingAuthorization,
        /// Authorization header format is invalid.
        #[error("invalid authorization header")]
        InvalidAuthorization,
        /// JWT validation error.
        #[error("invalid token")]
        InvalidToken,
    }

    /// Rejection type for axum extractors.
    #[derive(Debug)]
    pub struct AuthRejection {
        status: StatusCode,
        message: String,
    }

    impl From<AuthError> for AuthRejection {
        fn from(err: AuthError) -> Self {
            Self {
                status: StatusCode::UNAUTHORIZED,
                message: err.to_string(),
            }
        }
    }

    impl IntoResponse for AuthRejection {
        fn into_response(self) -> Response {
            (self.status, self.message).into_response()
        }
    }

    /// Verifying decoder for bearer tokens.
    #[derive(Clone)]
    pub struct JwtAuthState {
        decoding_key: Arc<DecodingKey>,
        validation: Validation,
    }

    impl fmt::Debug for JwtAuthState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("JwtAuthState")
                .field("decoding_key", &"<redacted>")
                .field("validation", &self.validation)
                .finish()
        }
    }

    impl JwtAuthState {
        /// Creates a new JWT auth state.
        pub fn new(decoding_key: DecodingKey, validation: Validation) -> Self {
            Self {
                decoding_key: Arc::new(decoding_key),
                validation,
            }
        }

        fn decode_from_headers(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
            let token = bearer_token(headers)?;
            decode::<Claims>(&token, &self.decoding_key, &self.validation)
                .map(|data| data.claims)
                .map_err(|_| AuthError::InvalidToken)
        }
    }

    /// Provides access to [`JwtAuthState`] for extractors.
    pub trait JwtAuthProvider {
        /// Returns the JWT auth state for decoding.
        fn jwt_auth(&self) -> &JwtAuthState;
    }

    /// Extractor yielding verified claims.
    #[derive(Debug, Clone)]
    pub struct JwtAuth(pub Claims);

    impl<S> FromRequestParts<S> for JwtAuth
    where
        S: Send + Sync + JwtAuthProvider,
    {
        type Rejection = AuthRejection;

        async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
            if let Some(existing) = parts.extensions.get::<Claims>() {
                return Ok(Self(existing.clone()));
            }
            let claims = state.jwt_auth().decode_from_headers(&parts.headers)?;
            parts.extensions.insert(claims.clone());
            Ok(Self(claims))
        }
    }

    /// Middleware layer that verifies a bearer JWT and inserts [`Claims`]
    /// into request extensions.
    #[derive(Debug, Clone)]
    pub struct JwtAuthLayer {
        state: Arc<JwtAuthState>,
    }

    impl JwtAuthLayer {
        /// Creates a new JWT auth layer.
        pub fn new(state: JwtAuthState) -> Self {
            Self {
                state: Arc::new(state),
            }
        }
    }

    impl<S> Layer<S> for JwtAuthLayer {
        type Service = JwtAuthService<S>;

        fn layer(&self, inner: S) -> Self::Service {
            JwtAuthService {
                inner,
                state: self.state.clone(),
            }
        }
    }

    /// Middleware service that verifies JWTs and attaches [`Claims`].
    #[derive(Debug, Clone)]
    pub struct JwtAuthService<S> {
        inner: S,
        state: Arc<JwtAuthState>,
    }

    impl<S> Service<Request<Body>> for JwtAuthService<S>
    where
        S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        type Response = Response;
        type Error = S::Error;
        type Future =
            Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, mut req: Request<Body>) -> Self::Future {
            let state = self.state.clone();
            let mut inner = self.inner.clone();

            Box::pin(async move {
                match state.decode_from_headers(req.headers()) {
                    Ok(claims) => {
                        req.extensions_mut().insert(claims);
                        poll_fn(|cx| inner.poll_ready(cx)).await?;
                        inner.call(req).await
                    }
                    Err(err) => Ok(AuthRejection::from(err).into_response()),
                }
            })
        }
    }

    fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidAuthorization)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthorization)?;
        if token.is_empty() {
            return Err(AuthError::InvalidAuthorization);
        }
        Ok(token.to_string())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::axum::AuthorizeLayer;
        use crate::evaluator::Evaluator;
        use crate::table::{PermissionTable, RoutePermission};
        use crate::types::{HttpMethod, Role};
        use futures::executor::block_on;
        use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
        use serde_json::json;
        use std::convert::Infallible;
        use tower::ServiceExt;

        #[test]
        fn bearer_token_requires_prefix() {
            let mut headers = HeaderMap::new();
            assert!(matches!(
                bearer_token(&headers),
                Err(AuthError::MissingAuthorization)
            ));
            headers.insert(AUTHORIZATION, "Token abc".parse().unwrap());
            assert!(matches!(
                bearer_token(&headers),
                Err(AuthError::InvalidAuthorization)
            ));
            headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
            assert_eq!(bearer_token(&headers).unwrap(), "abc");
        }

        const SECRET: &[u8] = b"route-rbac-test-secret";
        const EXPIRES: u64 = 4_000_000_000;

        fn state() -> JwtAuthState {
            JwtAuthState::new(
                DecodingKey::from_secret(SECRET),
                Validation::new(Algorithm::HS256),
            )
        }

        fn sign(secret: &[u8], payload: serde_json::Value) -> String {
            encode(
                &Header::new(Algorithm::HS256),
                &payload,
                &EncodingKey::from_secret(secret),
            )
            .unwrap()
        }

        fn signed(role: &str) -> String {
            sign(SECRET, json!({ "sub": "7", "role": role, "exp": EXPIRES }))
        }

        fn evaluator() -> Evaluator {
            let table = PermissionTable::new(vec![RoutePermission {
                path: "/users/{id}".to_string(),
                method: HttpMethod::Delete,
                operation_id: Some("deleteUser".to_string()),
                roles: vec![Role::new("admin").unwrap()],
                tags: Vec::new(),
            }])
            .unwrap();
            Evaluator::new(Arc::new(table))
        }

        fn delete_user(token: Option<&str>) -> Response {
            let inner = tower::service_fn(|req: Request<Body>| async move {
                let role = req
                    .extensions()
                    .get::<Claims>()
                    .and_then(|claims| claims.role.clone())
                    .unwrap_or_default();
                Ok::<_, Infallible>(([("x-role", role)], StatusCode::OK).into_response())
            });
            let authorize = AuthorizeLayer::new(evaluator()).layer(inner);
            let service = JwtAuthLayer::new(state()).layer(authorize);
            let mut builder = Request::builder().method("DELETE").uri("/users/42");
            if let Some(token) = token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            block_on(service.oneshot(builder.body(Body::empty()).unwrap())).unwrap()
        }

        #[test]
        fn signed_admin_token_reaches_handler() {
            let response = delete_user(Some(&signed("admin")));
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-role"], "admin");
        }

        #[test]
        fn signed_token_without_role_membership_is_forbidden() {
            let response = delete_user(Some(&signed("user")));
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        #[test]
        fn bad_or_missing_token_is_unauthorized() {
            let forged = sign(b"another-secret", json!({ "role": "admin", "exp": EXPIRES }));
            assert_eq!(delete_user(Some(&forged)).status(), StatusCode::UNAUTHORIZED);
            assert_eq!(delete_user(None).status(), StatusCode::UNAUTHORIZED);

            let expired = sign(SECRET, json!({ "role": "admin", "exp": 1 }));
            assert_eq!(delete_user(Some(&expired)).status(), StatusCode::UNAUTHORIZED);
        }

        #[test]
        fn loosely_typed_claims_still_authenticate() {
            let token = sign(
                SECRET,
                json!({
                    "sub": "7",
                    "user_id": 7,
                    "role": "admin",
                    "iat": 1_700_000_000.5,
                    "exp": EXPIRES,
                }),
            );
            let response = delete_user(Some(&token));
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-role"], "admin");
        }

        struct AppState {
            jwt: JwtAuthState,
        }

        impl JwtAuthProvider for AppState {
            fn jwt_auth(&self) -> &JwtAuthState {
                &self.jwt
            }
        }

        #[test]
        fn extractor_decodes_and_caches_claims() {
            let app = AppState { jwt: state() };
            let request = Request::builder()
                .header(AUTHORIZATION, format!("Bearer {}", signed("admin")))
                .body(())
                .unwrap();
            let (mut parts, ()) = request.into_parts();

            let JwtAuth(claims) = block_on(JwtAuth::from_request_parts(&mut parts, &app)).unwrap();
            assert_eq!(claims.subject(), Some("7"));
            assert_eq!(claims.role().unwrap().as_str(), "admin");
            assert!(parts.extensions.get::<Claims>().is_some());

            let (mut bare, ()) = Request::builder().body(()).unwrap().into_parts();
            let rejection = block_on(JwtAuth::from_request_parts(&mut bare, &app)).unwrap_err();
            assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{PermissionTable, RoutePermission};
    use crate::types::Role;
    use futures::executor::block_on;
    use std::convert::Infallible;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn evaluator() -> Evaluator {
        let table = PermissionTable::new(vec![
            RoutePermission {
                path: "/users/{id}".to_string(),
                method: HttpMethod::Delete,
                operation_id: Some("deleteUser".to_string()),
                roles: vec![Role::new("admin").unwrap()],
                tags: Vec::new(),
            },
            RoutePermission {
                path: "/health".to_string(),
                method: HttpMethod::Get,
                operation_id: None,
                roles: Vec::new(),
                tags: Vec::new(),
            },
        ])
        .unwrap();
        Evaluator::new(Arc::new(table))
    }

    fn call(method: &str, uri: &str, role: Option<&str>) -> StatusCode {
        let inner = tower::service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(StatusCode::OK.into_response())
        });
        let service = AuthorizeLayer::new(evaluator()).layer(inner);
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(role) = role {
            request.extensions_mut().insert(Claims {
                role: Some(role.to_string()),
                ..Claims::default()
            });
        }
        block_on(service.oneshot(request)).unwrap().status()
    }

    #[test]
    fn protected_route_requires_identity() {
        assert_eq!(call("DELETE", "/users/1", None), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn protected_route_checks_role() {
        assert_eq!(call("DELETE", "/users/1", Some("user")), StatusCode::FORBIDDEN);
        assert_eq!(call("DELETE", "/users/1", Some("admin")), StatusCode::OK);
    }

    #[test]
    fn public_and_undefined_routes_pass() {
        assert_eq!(call("GET", "/health", None), StatusCode::OK);
        assert_eq!(call("GET", "/users/1", None), StatusCode::OK);
        assert_eq!(call("OPTIONS", "/users/1", None), StatusCode::OK);
    }
}
