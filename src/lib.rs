//! Role-based access control compiled from API security annotations.
//!
//! The [`compiler`] turns an OpenAPI-style document into an immutable
//! [`PermissionTable`]. An [`Evaluator`] answers route, operation and URL
//! questions against that table (undefined routes are allowed), a
//! [`NavigationFilter`] hides menu entries (undefined routes are denied) and a
//! [`RouteGuard`] decides frontend redirects.
//!
//! # Examples
//!
//! ```no_run
//! use route_rbac::{compile_str, DocumentFormat, Evaluator, HttpMethod, Role};
//! use std::sync::Arc;
//!
//! let table = compile_str(
//!     "paths:\n  /users:\n    get:\n      security:\n        - bearer: [admin]\n",
//!     DocumentFormat::Yaml,
//! )
//! .unwrap();
//! let evaluator = Evaluator::new(Arc::new(table));
//! let admin = Role::try_from("admin").unwrap();
//! assert!(evaluator.can_access_route(&admin, "/users", HttpMethod::Get));
//! ```
//!
//! Guarding a frontend navigation:
//! ```no_run
//! # use route_rbac::{Evaluator, PermissionTable};
//! # use std::sync::Arc;
//! use route_rbac::{GuardOptions, Middleware, Navigation, RouteGuard};
//! # let evaluator = Evaluator::new(Arc::new(PermissionTable::new(Vec::new()).unwrap()));
//! let guard = RouteGuard::builder(evaluator).unauthorized_route("/403").build();
//! let check = guard.protected_route(GuardOptions::default());
//! let _outcome = check.check(&Navigation::new("/dashboard"));
//! ```
#![forbid(unsafe_code)]

pub mod codegen;
pub mod compiler;
mod document;
mod error;
mod evaluator;
mod guard;
mod identity;
mod navigation;
mod path;
mod table;
mod types;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::codegen::{ArtifactFormat, write_artifact};
pub use crate::compiler::{compile, compile_file, compile_str};
pub use crate::document::{ApiDocument, DocumentFormat, Operation, OrderedMap, PathItem};
pub use crate::error::{Error, Result};
pub use crate::evaluator::{Decision, Evaluator, PermissionSummary, has_role};
pub use crate::guard::{
    Endpoint, EndpointMap, GuardOptions, GuardOutcome, Middleware, Navigation, Redirect,
    RedirectReason, RouteGuard, RouteGuardBuilder, compose, skip, when,
};
pub use crate::identity::{Claims, decode_token};
pub use crate::navigation::{
    Icon, NavigationFilter, NavigationItem, NavigationLink, NavigationStats, load_navigation,
};
pub use crate::path::{PathPattern, match_path, match_route_pattern};
pub use crate::table::{Artifact, PermissionTable, RoutePermission};
pub use crate::types::{HttpMethod, Role, RoleDomain};
