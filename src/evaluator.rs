use crate::table::{PermissionTable, RoutePermission};
use crate::types::{HttpMethod, Role};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed { Decision::Allow } else { Decision::Deny }
    }
}

/// Returns true when `required` is empty (public) or contains `role`.
pub fn has_role(role: &Role, required: &[Role]) -> bool {
    required.is_empty() || required.contains(role)
}

/// Pure permission queries over an injected [`PermissionTable`].
///
/// Lookups that find no row are allowed: a route absent from the API
/// document is treated as public. Callers that need default-deny must check
/// that a row exists first, as [`crate::NavigationFilter`] does.
#[derive(Debug, Clone)]
pub struct Evaluator {
    table: Arc<PermissionTable>,
}

impl Evaluator {
    /// Creates an evaluator over a shared table.
    pub fn new(table: Arc<PermissionTable>) -> Self {
        Self { table }
    }

    /// Underlying table.
    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    /// Checks an exact path template and method.
    pub fn authorize_route(&self, role: &Role, path: &str, method: HttpMethod) -> Decision {
        decide(role, self.table.find(path, method))
    }

    /// Checks an operation by id.
    pub fn authorize_operation(&self, role: &Role, operation_id: &str) -> Decision {
        decide(role, self.table.operation(operation_id))
    }

    /// Checks a concrete URL against the path templates.
    ///
    /// The first row in table order that matches wins, so an earlier literal
    /// route shadows a later overlapping template.
    pub fn authorize_url(&self, role: &Role, url: &str, method: HttpMethod) -> Decision {
        decide(role, self.table.find_url(url, method))
    }

    /// Allows when any method on the exact path is accessible, or when the
    /// path has no rows at all.
    pub fn authorize_resource(&self, role: &Role, path: &str) -> Decision {
        let mut permissions = self.table.path_permissions(path).peekable();
        if permissions.peek().is_none() {
            return Decision::Allow;
        }
        Decision::from_bool(permissions.any(|permission| has_role(role, &permission.roles)))
    }

    pub fn can_access_route(&self, role: &Role, path: &str, method: HttpMethod) -> bool {
        self.authorize_route(role, path, method).is_allow()
    }

    pub fn can_access_operation(&self, role: &Role, operation_id: &str) -> bool {
        self.authorize_operation(role, operation_id).is_allow()
    }

    pub fn can_access_url(&self, role: &Role, url: &str, method: HttpMethod) -> bool {
        self.authorize_url(role, url, method).is_allow()
    }

    pub fn can_access_resource(&self, role: &Role, path: &str) -> bool {
        self.authorize_resource(role, path).is_allow()
    }

    /// Methods on the exact path that `role` may call, in table order.
    pub fn allowed_methods(&self, role: &Role, path: &str) -> Vec<HttpMethod> {
        self.table
            .path_permissions(path)
            .filter(|permission| has_role(role, &permission.roles))
            .map(|permission| permission.method)
            .collect()
    }

    /// Rows declared for the exact path.
    pub fn path_permissions(&self, path: &str) -> Vec<&RoutePermission> {
        self.table.path_permissions(path).collect()
    }

    /// Rows whose template matches the URL.
    pub fn url_permissions(&self, url: &str) -> Vec<&RoutePermission> {
        self.table.url_permissions(url).collect()
    }

    /// Row declared with `operation_id`.
    pub fn operation(&self, operation_id: &str) -> Option<&RoutePermission> {
        self.table.operation(operation_id)
    }

    /// Every row `role` may call.
    pub fn accessible_routes(&self, role: &Role) -> Vec<&RoutePermission> {
        self.table
            .permissions()
            .iter()
            .filter(|permission| has_role(role, &permission.roles))
            .collect()
    }

    /// Summary of the routes accessible to `role`.
    pub fn permission_summary(&self, role: &Role) -> PermissionSummary {
        let accessible = self.accessible_routes(role);
        let mut by_method = BTreeMap::new();
        for permission in &accessible {
            *by_method.entry(permission.method).or_insert(0) += 1;
        }
        PermissionSummary {
            role: role.clone(),
            total: accessible.len(),
            by_method,
            routes: accessible
                .into_iter()
                .map(|permission| (permission.method, permission.path.clone()))
                .collect(),
        }
    }
}

fn decide(role: &Role, permission: Option<&RoutePermission>) -> Decision {
    match permission {
        None => Decision::Allow,
        Some(permission) => Decision::from_bool(has_role(role, &permission.roles)),
    }
}

/// Accessible routes of one role, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSummary {
    pub role: Role,
    pub total: usize,
    pub by_method: BTreeMap<HttpMethod, usize>,
    pub routes: Vec<(HttpMethod, String)>,
}

impl fmt::Display for PermissionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Permissions for role: {} ===", self.role)?;
        writeln!(f, "Total accessible routes: {}", self.total)?;
        let counts: Vec<String> = self
            .by_method
            .iter()
            .map(|(method, count)| format!("{method}: {count}"))
            .collect();
        writeln!(f, "By method: {}", counts.join(", "))?;
        writeln!(f, "Routes:")?;
        for (method, path) in &self.routes {
            writeln!(f, "  {:<6} {path}", method.as_str())?;
        }
        Ok(())
    }
}
