//! Pre-navigation route guard.
//!
//! A guard turns a frontend navigation into an [`GuardOutcome`]: the router
//! either proceeds or performs the returned redirect. Route protection here is
//! advisory; server-side enforcement lives elsewhere.

use crate::document::OrderedMap;
use crate::error::{Error, Result};
use crate::evaluator::{Decision, Evaluator};
use crate::identity::{Claims, decode_token};
use crate::path::match_route_pattern;
use crate::types::HttpMethod;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Navigation about to happen, as seen by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Target route path, e.g. `/dashboard/users/12`.
    pub pathname: String,
    /// Query parameters of the target, in order.
    pub search: Vec<(String, String)>,
    /// Raw identity token held by the session, if any.
    pub token: Option<String>,
}

impl Navigation {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_search(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.search.push((key.into(), value.into()));
        self
    }
}

/// Why a guard redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// No token in the session.
    Unauthenticated,
    /// Token present but its payload could not be decoded.
    InvalidToken,
    /// Claims expired and expiry enforcement is on.
    Expired,
    /// Token present on the entry route.
    AlreadyAuthenticated,
    /// Claims carry no role.
    MissingRole,
    /// The role may not call the resolved endpoint.
    Forbidden,
}

/// Redirect to be realized by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub query: Vec<(String, String)>,
    pub reason: RedirectReason,
}

/// Result of running a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect(Redirect),
}

impl GuardOutcome {
    pub fn is_allow(&self) -> bool {
        matches!(self, GuardOutcome::Allow)
    }

    /// The redirect, if any.
    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            GuardOutcome::Allow => None,
            GuardOutcome::Redirect(redirect) => Some(redirect),
        }
    }

    fn redirect_to(
        to: impl Into<String>,
        query: Vec<(String, String)>,
        reason: RedirectReason,
    ) -> Self {
        GuardOutcome::Redirect(Redirect {
            to: to.into(),
            query,
            reason,
        })
    }
}

/// Pre-navigation hook.
pub trait Middleware: Send + Sync {
    fn check(&self, navigation: &Navigation) -> GuardOutcome;
}

impl<F> Middleware for F
where
    F: Fn(&Navigation) -> GuardOutcome + Send + Sync,
{
    fn check(&self, navigation: &Navigation) -> GuardOutcome {
        self(navigation)
    }
}

/// Runs middlewares in order; the first redirect wins.
pub fn compose(middlewares: Vec<Box<dyn Middleware>>) -> impl Middleware {
    move |navigation: &Navigation| {
        middlewares
            .iter()
            .map(|middleware| middleware.check(navigation))
            .find(|outcome| !outcome.is_allow())
            .unwrap_or(GuardOutcome::Allow)
    }
}

/// Runs `middleware` only when `condition` holds.
pub fn when<M: Middleware>(condition: bool, middleware: M) -> impl Middleware {
    move |navigation: &Navigation| {
        if condition {
            middleware.check(navigation)
        } else {
            GuardOutcome::Allow
        }
    }
}

/// Runs `middleware` unless `condition` holds.
pub fn skip<M: Middleware>(condition: bool, middleware: M) -> impl Middleware {
    when(!condition, middleware)
}

/// Backend endpoint a frontend route maps to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }
}

/// Static frontend route -> backend endpoint map.
///
/// Keys are route paths where parameter segments start with `$`
/// (`/dashboard/users/$id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OrderedMap<Endpoint>")]
pub struct EndpointMap {
    entries: Vec<(String, Endpoint)>,
}

impl From<OrderedMap<Endpoint>> for EndpointMap {
    fn from(map: OrderedMap<Endpoint>) -> Self {
        Self {
            entries: map
                .iter()
                .map(|(route, endpoint)| (route.to_string(), endpoint.clone()))
                .collect(),
        }
    }
}

impl EndpointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mapping.
    pub fn with(mut self, route: impl Into<String>, endpoint: Endpoint) -> Self {
        let route = route.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == route) {
            Some((_, slot)) => *slot = endpoint,
            None => self.entries.push((route, endpoint)),
        }
        self
    }

    /// Reads a map from YAML or JSON (by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&source)?)
        } else {
            Ok(serde_yaml::from_str(&source)?)
        }
    }

    /// Endpoint for a route: exact key first, then `$param` patterns in
    /// insertion order.
    pub fn resolve(&self, route: &str) -> Option<&Endpoint> {
        self.entries
            .iter()
            .find(|(key, _)| key == route)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(pattern, _)| match_route_pattern(route, pattern))
            })
            .map(|(_, endpoint)| endpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-call-site options of [`RouteGuard::middleware`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardOptions {
    /// API endpoint template to check, e.g. `/users/{id}`.
    pub endpoint: Option<String>,
    pub method: Option<HttpMethod>,
    /// Overrides the configured unauthorized route.
    pub redirect_to: Option<String>,
    /// Skips every check (public routes).
    pub skip_auth: bool,
}

impl GuardOptions {
    pub fn endpoint(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            method: Some(method),
            ..Self::default()
        }
    }

    pub fn public() -> Self {
        Self {
            skip_auth: true,
            ..Self::default()
        }
    }

    pub fn redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = Some(redirect_to.into());
        self
    }
}

#[derive(Debug, Clone)]
struct GuardConfig {
    entry_route: String,
    home_route: String,
    unauthorized_route: String,
    redirect_param: String,
    enforce_expiry: bool,
}

/// Builder for [`RouteGuard`].
#[derive(Debug, Clone)]
pub struct RouteGuardBuilder {
    evaluator: Evaluator,
    endpoints: EndpointMap,
    config: GuardConfig,
}

impl RouteGuardBuilder {
    /// Creates a builder with default routes: entry `/`, home `/dashboard`,
    /// unauthorized `/unauthorized`, redirect query parameter `redirect`.
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            endpoints: EndpointMap::default(),
            config: GuardConfig {
                entry_route: "/".to_string(),
                home_route: "/dashboard".to_string(),
                unauthorized_route: "/unauthorized".to_string(),
                redirect_param: "redirect".to_string(),
                enforce_expiry: false,
            },
        }
    }

    /// Public entry (login) route.
    pub fn entry_route(mut self, route: impl Into<String>) -> Self {
        self.config.entry_route = route.into();
        self
    }

    /// Route an authenticated visitor of the entry route is sent to.
    pub fn home_route(mut self, route: impl Into<String>) -> Self {
        self.config.home_route = route.into();
        self
    }

    /// Default destination on authorization failure.
    pub fn unauthorized_route(mut self, route: impl Into<String>) -> Self {
        self.config.unauthorized_route = route.into();
        self
    }

    /// Query parameter carrying the original destination.
    pub fn redirect_param(mut self, name: impl Into<String>) -> Self {
        self.config.redirect_param = name.into();
        self
    }

    /// Treats expired claims as no identity.
    pub fn enforce_expiry(mut self, on: bool) -> Self {
        self.config.enforce_expiry = on;
        self
    }

    /// Sets the route -> endpoint map.
    pub fn endpoints(mut self, endpoints: EndpointMap) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn build(self) -> RouteGuard {
        RouteGuard {
            inner: Arc::new(GuardInner {
                evaluator: self.evaluator,
                endpoints: self.endpoints,
                config: self.config,
            }),
        }
    }
}

#[derive(Debug)]
struct GuardInner {
    evaluator: Evaluator,
    endpoints: EndpointMap,
    config: GuardConfig,
}

/// Route guard factory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    inner: Arc<GuardInner>,
}

impl RouteGuard {
    pub fn builder(evaluator: Evaluator) -> RouteGuardBuilder {
        RouteGuardBuilder::new(evaluator)
    }

    /// RBAC middleware for one call site.
    pub fn middleware(&self, options: GuardOptions) -> impl Middleware + Clone + 'static {
        let inner = self.inner.clone();
        move |navigation: &Navigation| inner.check_rbac(&options, navigation)
    }

    /// Entry-point redirector: unauthenticated visitors go to the entry route,
    /// authenticated visitors of the entry route go home.
    pub fn auth_middleware(&self) -> impl Middleware + Clone + 'static {
        let inner = self.inner.clone();
        move |navigation: &Navigation| inner.check_auth(navigation)
    }

    /// Authentication then RBAC.
    pub fn protected_route(&self, options: GuardOptions) -> impl Middleware {
        let auth: Box<dyn Middleware> = Box::new(self.auth_middleware());
        let rbac: Box<dyn Middleware> = Box::new(self.middleware(options));
        compose(vec![auth, rbac])
    }

    /// No checks at all.
    pub fn public_route(&self) -> impl Middleware {
        self.middleware(GuardOptions::public())
    }

    /// Authentication only.
    pub fn auth_only(&self) -> impl Middleware {
        let auth: Box<dyn Middleware> = Box::new(self.auth_middleware());
        compose(vec![auth])
    }

    /// RBAC check of a fixed endpoint.
    pub fn endpoint_guard(&self, endpoint: impl Into<String>, method: HttpMethod) -> impl Middleware {
        self.middleware(GuardOptions::endpoint(endpoint, method))
    }

    /// RBAC with a custom failure destination.
    pub fn with_redirect(
        &self,
        redirect_to: impl Into<String>,
        options: GuardOptions,
    ) -> impl Middleware {
        self.middleware(options.redirect_to(redirect_to))
    }
}

impl GuardInner {
    fn check_auth(&self, navigation: &Navigation) -> GuardOutcome {
        let on_entry = navigation.pathname == self.config.entry_route;
        match (&navigation.token, on_entry) {
            (None, false) => GuardOutcome::redirect_to(
                &self.config.entry_route,
                navigation.search.clone(),
                RedirectReason::Unauthenticated,
            ),
            (Some(_), true) => GuardOutcome::redirect_to(
                &self.config.home_route,
                navigation.search.clone(),
                RedirectReason::AlreadyAuthenticated,
            ),
            _ => GuardOutcome::Allow,
        }
    }

    fn check_rbac(&self, options: &GuardOptions, navigation: &Navigation) -> GuardOutcome {
        if options.skip_auth {
            return GuardOutcome::Allow;
        }

        let Some(token) = navigation.token.as_deref() else {
            if navigation.pathname == self.config.entry_route {
                return GuardOutcome::Allow;
            }
            return self.to_entry(navigation, RedirectReason::Unauthenticated);
        };
        let Some(claims) = decode_token(token) else {
            return self.to_entry(navigation, RedirectReason::InvalidToken);
        };
        if self.config.enforce_expiry && claims.is_expired_at(unix_now()) {
            return self.to_entry(navigation, RedirectReason::Expired);
        }

        let Some((endpoint, method)) = self.resolve(options, &navigation.pathname) else {
            debug!(route = %navigation.pathname, "no endpoint mapped; allowing navigation");
            return GuardOutcome::Allow;
        };

        let failure = options
            .redirect_to
            .as_deref()
            .unwrap_or(&self.config.unauthorized_route);
        self.authorize(&claims, &endpoint, method, failure)
    }

    fn authorize(
        &self,
        claims: &Claims,
        endpoint: &str,
        method: HttpMethod,
        failure: &str,
    ) -> GuardOutcome {
        let Some(role) = claims.role() else {
            debug!(%endpoint, %method, "claims carry no role");
            return GuardOutcome::redirect_to(failure, Vec::new(), RedirectReason::MissingRole);
        };
        match self.evaluator.authorize_route(&role, endpoint, method) {
            Decision::Allow => GuardOutcome::Allow,
            Decision::Deny => {
                debug!(%role, %endpoint, %method, "route access denied");
                GuardOutcome::redirect_to(failure, Vec::new(), RedirectReason::Forbidden)
            }
        }
    }

    /// Explicit endpoint and method win when both are given. Otherwise a mapped
    /// endpoint overrides, explicit values fill the gaps and GET is the
    /// fallback method.
    fn resolve(&self, options: &GuardOptions, route: &str) -> Option<(String, HttpMethod)> {
        if let (Some(endpoint), Some(method)) = (&options.endpoint, options.method) {
            return Some((endpoint.clone(), method));
        }
        let mapped = self.endpoints.resolve(route);
        let endpoint = mapped
            .map(|endpoint| endpoint.path.clone())
            .or_else(|| options.endpoint.clone())?;
        let method = mapped
            .map(|endpoint| endpoint.method)
            .or(options.method)
            .unwrap_or_default();
        Some((endpoint, method))
    }

    fn to_entry(&self, navigation: &Navigation, reason: RedirectReason) -> GuardOutcome {
        GuardOutcome::redirect_to(
            &self.config.entry_route,
            vec![(
                self.config.redirect_param.clone(),
                navigation.pathname.clone(),
            )],
            reason,
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
