//! Permission compiler: API document -> [`PermissionTable`].

use crate::document::{ApiDocument, DocumentFormat, Operation, SecurityRequirement};
use crate::error::{Error, Result};
use crate::table::{PermissionTable, RoutePermission};
use crate::types::{HttpMethod, Role};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Compiles a parsed document.
///
/// Paths are visited in document order and methods in [`HttpMethod::ALL`]
/// order; every declared operation yields one row, public or not.
pub fn compile(document: &ApiDocument) -> Result<PermissionTable> {
    let mut permissions = Vec::new();

    for (path, item) in document.paths.iter() {
        if path.trim().is_empty() {
            return Err(Error::InvalidDocument("path must not be empty".to_string()));
        }
        for method in HttpMethod::ALL {
            let Some(operation) = item.operation(method) else {
                continue;
            };
            let permission = route_permission(path, method, operation)?;
            debug!(
                path = %permission.path,
                method = %permission.method,
                roles = permission.roles.len(),
                "compiled route permission"
            );
            permissions.push(permission);
        }
    }

    let table = PermissionTable::new(permissions)?;
    debug!(
        rows = table.len(),
        roles = table.roles().roles().len(),
        "compiled permission table"
    );
    Ok(table)
}

/// Parses and compiles document text.
pub fn compile_str(source: &str, format: DocumentFormat) -> Result<PermissionTable> {
    compile(&ApiDocument::parse(source, format)?)
}

/// Reads and compiles a document file.
pub fn compile_file(path: impl AsRef<Path>) -> Result<PermissionTable> {
    compile(&ApiDocument::load(path)?)
}

fn route_permission(path: &str, method: HttpMethod, operation: &Operation) -> Result<RoutePermission> {
    let roles = match &operation.security {
        Some(requirements) => extract_roles(requirements)?,
        None => Vec::new(),
    };
    let operation_id = operation
        .operation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    Ok(RoutePermission {
        path: path.to_string(),
        method,
        operation_id,
        roles,
        tags: operation.tags.clone(),
    })
}

/// Union of every role of every requirement, deduplicated in insertion order.
fn extract_roles(requirements: &[SecurityRequirement]) -> Result<Vec<Role>> {
    let mut seen = HashSet::new();
    let mut roles = Vec::new();
    for requirement in requirements {
        for (_scheme, scheme_roles) in requirement.iter() {
            for raw in scheme_roles {
                let role = Role::new(raw)?;
                if seen.insert(role.clone()) {
                    roles.push(role);
                }
            }
        }
    }
    Ok(roles)
}
