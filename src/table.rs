use crate::error::{Error, Result};
use crate::path::PathPattern;
use crate::types::{HttpMethod, Role, RoleDomain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Authorization requirement for one (path template, method) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePermission {
    /// Path template, e.g. `/users/{id}`.
    pub path: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Required roles; empty means public.
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RoutePermission {
    /// Returns true when no role is required.
    pub fn is_public(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Immutable compiled permission table with its derived indexes.
///
/// Built once (by the compiler or from an artifact) and shared read-only,
/// typically behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    roles: RoleDomain,
    permissions: Vec<RoutePermission>,
    patterns: Vec<PathPattern>,
    by_tag: BTreeMap<String, Vec<usize>>,
    by_operation_id: HashMap<String, usize>,
}

impl PermissionTable {
    /// Builds a table from rows in table order.
    ///
    /// The role domain is the union of all row roles in order of first
    /// appearance. Duplicate (path, method) pairs and duplicate operation ids
    /// are rejected.
    pub fn new(permissions: Vec<RoutePermission>) -> Result<Self> {
        let mut seen_routes = HashSet::new();
        let mut seen_roles = HashSet::new();
        let mut roles = Vec::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_operation_id = HashMap::new();

        for (index, permission) in permissions.iter().enumerate() {
            if !seen_routes.insert((permission.path.as_str(), permission.method)) {
                return Err(Error::DuplicateRoute {
                    path: permission.path.clone(),
                    method: permission.method,
                });
            }
            if let Some(operation_id) = &permission.operation_id
                && by_operation_id.insert(operation_id.clone(), index).is_some()
            {
                return Err(Error::DuplicateOperationId {
                    operation_id: operation_id.clone(),
                });
            }
            for role in &permission.roles {
                if seen_roles.insert(role.as_str()) {
                    roles.push(role.clone());
                }
            }
            for tag in &permission.tags {
                let rows = by_tag.entry(tag.clone()).or_default();
                if rows.last() != Some(&index) {
                    rows.push(index);
                }
            }
        }

        let patterns = permissions
            .iter()
            .map(|permission| PathPattern::new(permission.path.as_str()))
            .collect();

        Ok(Self {
            roles: RoleDomain::from_roles(roles),
            permissions,
            patterns,
            by_tag,
            by_operation_id,
        })
    }

    /// All rows in table order.
    pub fn permissions(&self) -> &[RoutePermission] {
        &self.permissions
    }

    /// Roles observed while compiling.
    pub fn roles(&self) -> &RoleDomain {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Row for an exact path and method.
    pub fn find(&self, path: &str, method: HttpMethod) -> Option<&RoutePermission> {
        self.permissions
            .iter()
            .find(|permission| permission.path == path && permission.method == method)
    }

    /// Rows whose template is literally `path`.
    pub fn path_permissions<'s, 'p>(
        &'s self,
        path: &'p str,
    ) -> impl Iterator<Item = &'s RoutePermission> + use<'s, 'p> {
        self.permissions
            .iter()
            .filter(move |permission| permission.path == path)
    }

    /// First row in table order whose method matches and whose template
    /// matches `url`.
    pub fn find_url(&self, url: &str, method: HttpMethod) -> Option<&RoutePermission> {
        self.permissions
            .iter()
            .zip(&self.patterns)
            .find(|(permission, pattern)| permission.method == method && pattern.matches(url))
            .map(|(permission, _)| permission)
    }

    /// Rows whose template matches `url`, for any method.
    pub fn url_permissions<'s, 'u>(
        &'s self,
        url: &'u str,
    ) -> impl Iterator<Item = &'s RoutePermission> + use<'s, 'u> {
        self.permissions
            .iter()
            .zip(&self.patterns)
            .filter(move |(_, pattern)| pattern.matches(url))
            .map(|(permission, _)| permission)
    }

    /// Row declared with `operation_id`.
    pub fn operation(&self, operation_id: &str) -> Option<&RoutePermission> {
        self.by_operation_id
            .get(operation_id)
            .map(|&index| &self.permissions[index])
    }

    /// Rows carrying `tag`, in table order.
    pub fn permissions_by_tag(&self, tag: &str) -> Vec<&RoutePermission> {
        self.by_tag
            .get(tag)
            .map(|rows| rows.iter().map(|&index| &self.permissions[index]).collect())
            .unwrap_or_default()
    }

    /// Known tags in lexical order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }

    /// Operation-id index in lexical order of the id.
    pub fn operation_ids(&self) -> BTreeMap<&str, &RoutePermission> {
        self.by_operation_id
            .iter()
            .map(|(id, &index)| (id.as_str(), &self.permissions[index]))
            .collect()
    }

    /// Serializable form of the table and its indexes.
    pub fn to_artifact(&self) -> Artifact {
        Artifact {
            generated_by: ARTIFACT_GENERATOR.to_string(),
            roles: self.roles.roles().to_vec(),
            route_permissions: self.permissions.clone(),
            permissions_by_tag: self
                .by_tag
                .iter()
                .map(|(tag, rows)| {
                    let rows = rows.iter().map(|&index| self.permissions[index].clone());
                    (tag.clone(), rows.collect())
                })
                .collect(),
            permissions_by_operation_id: self
                .operation_ids()
                .into_iter()
                .map(|(id, permission)| (id.to_string(), permission.clone()))
                .collect(),
        }
    }

    /// Pretty JSON artifact.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_artifact())?)
    }

    /// Rebuilds a table from a JSON artifact.
    ///
    /// Indexes are recomputed from `routePermissions`; the stored copies are
    /// informational.
    pub fn from_json(source: &str) -> Result<Self> {
        let artifact: Artifact = serde_json::from_str(source)?;
        Self::from_artifact(artifact)
    }

    /// Reads a JSON artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::from_json(&source)
    }

    /// Rebuilds a table from a deserialized artifact.
    pub fn from_artifact(artifact: Artifact) -> Result<Self> {
        let table = Self::new(artifact.route_permissions)?;
        if !artifact.roles.is_empty() && artifact.roles.as_slice() != table.roles.roles() {
            return Err(Error::InvalidDocument(
                "artifact roles do not match route permissions".to_string(),
            ));
        }
        Ok(table)
    }
}

const ARTIFACT_GENERATOR: &str = concat!("route-rbac ", env!("CARGO_PKG_VERSION"));

/// On-disk representation of a compiled table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub generated_by: String,
    /// Role domain; empty when open.
    #[serde(default)]
    pub roles: Vec<Role>,
    pub route_permissions: Vec<RoutePermission>,
    #[serde(default)]
    pub permissions_by_tag: BTreeMap<String, Vec<RoutePermission>>,
    #[serde(default)]
    pub permissions_by_operation_id: BTreeMap<String, RoutePermission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(path: &str, method: HttpMethod, id: Option<&str>, roles: &[&str]) -> RoutePermission {
        RoutePermission {
            path: path.to_string(),
            method,
            operation_id: id.map(str::to_string),
            roles: roles.iter().map(|r| Role::new(r).unwrap()).collect(),
            tags: vec!["users".to_string()],
        }
    }

    #[test]
    fn roles_follow_first_appearance() {
        let table = PermissionTable::new(vec![
            row("/users", HttpMethod::Get, None, &["user", "admin"]),
            row("/users", HttpMethod::Post, None, &["admin", "auditor"]),
        ])
        .unwrap();
        let roles: Vec<&str> = table.roles().roles().iter().map(Role::as_str).collect();
        assert_eq!(roles, vec!["user", "admin", "auditor"]);
    }

    #[test]
    fn rejects_duplicate_route() {
        let result = PermissionTable::new(vec![
            row("/users", HttpMethod::Get, None, &[]),
            row("/users", HttpMethod::Get, None, &["admin"]),
        ]);
        assert!(matches!(result, Err(Error::DuplicateRoute { .. })));
    }

    #[test]
    fn rejects_duplicate_operation_id() {
        let result = PermissionTable::new(vec![
            row("/users", HttpMethod::Get, Some("listUsers"), &[]),
            row("/people", HttpMethod::Get, Some("listUsers"), &[]),
        ]);
        assert!(matches!(result, Err(Error::DuplicateOperationId { .. })));
    }

    #[test]
    fn operation_index_skips_rows_without_id() {
        let table = PermissionTable::new(vec![
            row("/users", HttpMethod::Get, Some("listUsers"), &[]),
            row("/users", HttpMethod::Post, None, &["admin"]),
        ])
        .unwrap();
        assert_eq!(table.operation_ids().len(), 1);
        assert_eq!(table.operation("listUsers").unwrap().method, HttpMethod::Get);
        assert_eq!(table.permissions_by_tag("users").len(), 2);
    }

    #[test]
    fn looked_up_rows_outlive_the_query() {
        let table = PermissionTable::new(vec![
            row("/users", HttpMethod::Get, None, &["admin"]),
            row("/users/{id}", HttpMethod::Get, None, &["admin"]),
            row("/users/{id}", HttpMethod::Put, None, &["admin"]),
        ])
        .unwrap();
        let (by_path, by_url) = {
            let path = String::from("/users/{id}");
            let url = format!("/users/{}", 42);
            let by_path: Vec<&RoutePermission> = table.path_permissions(&path).collect();
            let by_url: Vec<&RoutePermission> = table.url_permissions(&url).collect();
            (by_path, by_url)
        };
        assert_eq!(by_path.len(), 2);
        assert_eq!(by_url.len(), 2);
        assert_eq!(by_url[1].method, HttpMethod::Put);
    }

    #[test]
    fn json_artifact_reloads() {
        let table = PermissionTable::new(vec![
            row("/users/{id}", HttpMethod::Delete, Some("deleteUser"), &["admin"]),
            row("/health", HttpMethod::Get, None, &[]),
        ])
        .unwrap();
        let json = table.to_json().unwrap();
        assert!(json.contains("\"operationId\": \"deleteUser\""));

        let reloaded = PermissionTable::from_json(&json).unwrap();
        assert_eq!(reloaded.permissions(), table.permissions());
        assert_eq!(reloaded.roles(), table.roles());
        assert!(reloaded.find_url("/users/7", HttpMethod::Delete).is_some());
    }

    #[test]
    fn artifact_with_mismatched_roles_is_rejected() {
        let mut artifact = PermissionTable::new(vec![row("/users", HttpMethod::Get, None, &["admin"])])
            .unwrap()
            .to_artifact();
        artifact.roles = vec![Role::new("user").unwrap()];
        assert!(matches!(
            PermissionTable::from_artifact(artifact),
            Err(Error::InvalidDocument(_))
        ));
    }
}
