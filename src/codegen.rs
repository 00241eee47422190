//! Artifact emitters.
//!
//! A compiled table is written either as a JSON artifact or as a Rust module
//! that carries a `Role` enumeration plus the embedded JSON table.

use crate::error::{Error, Result};
use crate::table::PermissionTable;
use crate::types::Role;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Output format of [`write_artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Rust,
}

impl ArtifactFormat {
    /// `.rs` selects Rust source; everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("rs") => ArtifactFormat::Rust,
            _ => ArtifactFormat::Json,
        }
    }
}

/// Renders the artifact text for `format`.
pub fn render(table: &PermissionTable, format: ArtifactFormat) -> Result<String> {
    match format {
        ArtifactFormat::Json => table.to_json(),
        ArtifactFormat::Rust => render_rust(table),
    }
}

/// Writes the artifact, creating parent directories as needed.
pub fn write_artifact(table: &PermissionTable, path: impl AsRef<Path>) -> Result<ArtifactFormat> {
    let path = path.as_ref();
    let format = ArtifactFormat::from_path(path);
    let contents = render(table, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }
    std::fs::write(path, contents).map_err(|err| Error::io(path, err))?;
    info!(path = %path.display(), rows = table.len(), ?format, "wrote permission artifact");
    Ok(format)
}

/// Rust module text for a table.
///
/// A closed role domain becomes `pub enum Role`; an open one degenerates to
/// `pub type Role = String;`.
pub fn render_rust(table: &PermissionTable) -> Result<String> {
    let json = table.to_json()?;
    let mut out = String::new();
    out.push_str("// @generated by rbac-compile from an API document. Do not edit.\n\n");

    let roles = table.roles().roles();
    if roles.is_empty() {
        out.push_str("/// Role claim. The document declares no roles, so any string is accepted.\n");
        out.push_str("pub type Role = String;\n\n");
    } else {
        render_role_enum(&mut out, roles)?;
    }

    let fence = "#".repeat(raw_fence_len(&json));
    writeln!(out, "/// Compiled permission table in JSON artifact form.")?;
    writeln!(out, "pub const PERMISSION_TABLE_JSON: &str = r{fence}\"{json}\"{fence};")?;
    out.push('\n');
    out.push_str("/// Builds the permission table embedded in this module.\n");
    out.push_str("pub fn permission_table() -> route_rbac::Result<route_rbac::PermissionTable> {\n");
    out.push_str("    route_rbac::PermissionTable::from_json(PERMISSION_TABLE_JSON)\n");
    out.push_str("}\n");
    Ok(out)
}

fn render_role_enum(out: &mut String, roles: &[Role]) -> Result<()> {
    let mut idents: HashMap<String, &Role> = HashMap::new();
    let mut variants = Vec::with_capacity(roles.len());
    for role in roles {
        let ident = variant_ident(role.as_str());
        if let Some(first) = idents.insert(ident.clone(), role) {
            return Err(Error::RoleIdentCollision {
                first: first.to_string(),
                second: role.to_string(),
                ident,
            });
        }
        variants.push((ident, role.as_str()));
    }

    out.push_str("/// Roles declared by the API document, in order of first appearance.\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\n");
    out.push_str("pub enum Role {\n");
    for (ident, _) in &variants {
        writeln!(out, "    {ident},")?;
    }
    out.push_str("}\n\n");

    out.push_str("impl Role {\n");
    out.push_str("    pub const ALL: &'static [Role] = &[\n");
    for (ident, _) in &variants {
        writeln!(out, "        Role::{ident},")?;
    }
    out.push_str("    ];\n\n");
    out.push_str("    pub fn as_str(self) -> &'static str {\n");
    out.push_str("        match self {\n");
    for (ident, name) in &variants {
        writeln!(out, "            Role::{ident} => {name:?},")?;
    }
    out.push_str("        }\n");
    out.push_str("    }\n");
    out.push_str("}\n\n");

    out.push_str("impl std::str::FromStr for Role {\n");
    out.push_str("    type Err = String;\n\n");
    out.push_str("    fn from_str(value: &str) -> Result<Self, Self::Err> {\n");
    out.push_str("        Role::ALL\n");
    out.push_str("            .iter()\n");
    out.push_str("            .copied()\n");
    out.push_str("            .find(|role| role.as_str() == value)\n");
    out.push_str("            .ok_or_else(|| format!(\"unknown role {value}\"))\n");
    out.push_str("    }\n");
    out.push_str("}\n\n");
    Ok(())
}

/// PascalCase identifier for a role string.
fn variant_ident(role: &str) -> String {
    let mut ident = String::with_capacity(role.len());
    for word in role.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            ident.push(first.to_ascii_uppercase());
            ident.extend(chars);
        }
    }
    if ident.is_empty() || ident.starts_with(|ch: char| ch.is_ascii_digit()) {
        ident.insert(0, 'R');
    }
    ident
}

/// Number of `#` needed so the raw string cannot be closed early.
fn raw_fence_len(text: &str) -> usize {
    let mut longest = 0;
    let mut current: Option<usize> = None;
    for ch in text.chars() {
        match (ch, current) {
            ('"', _) => current = Some(0),
            ('#', Some(run)) => {
                current = Some(run + 1);
                longest = longest.max(run + 1);
            }
            _ => current = None,
        }
    }
    longest + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_str;
    use crate::document::DocumentFormat;

    #[test]
    fn variant_ident_is_pascal_case() {
        assert_eq!(variant_ident("admin"), "Admin");
        assert_eq!(variant_ident("super-admin"), "SuperAdmin");
        assert_eq!(variant_ident("org:viewer"), "OrgViewer");
        assert_eq!(variant_ident("2fa"), "R2fa");
    }

    #[test]
    fn raw_fence_outgrows_embedded_hashes() {
        assert_eq!(raw_fence_len("plain"), 1);
        assert_eq!(raw_fence_len("a \"# b"), 2);
        assert_eq!(raw_fence_len("\"##"), 3);
    }

    #[test]
    fn rust_artifact_declares_role_enum() {
        let table = compile_str(
            "paths:\n  /users:\n    get:\n      security:\n        - bearer: [admin, user]\n",
            DocumentFormat::Yaml,
        )
        .unwrap();
        let source = render_rust(&table).unwrap();
        assert!(source.contains("pub enum Role {\n    Admin,\n    User,\n}"));
        assert!(source.contains("Role::Admin => \"admin\","));
        assert!(source.contains("pub fn permission_table()"));
    }

    #[test]
    fn scope_roles_render_as_identifiers() {
        let table = compile_str(
            "paths:\n  /users:\n    get:\n      security:\n        - oauth: ['https://api/read', 'read users']\n",
            DocumentFormat::Yaml,
        )
        .unwrap();
        let source = render_rust(&table).unwrap();
        assert!(source.contains("pub enum Role {\n    HttpsApiRead,\n    ReadUsers,\n}"));
        assert!(source.contains("Role::HttpsApiRead => \"https://api/read\","));
        assert!(source.contains("Role::ReadUsers => \"read users\","));
        assert!(source.contains("pub const PERMISSION_TABLE_JSON: &str = r#\""));
    }

    #[test]
    fn rust_artifact_without_roles_uses_string() {
        let table = compile_str("paths:\n  /ping:\n    get: {}\n", DocumentFormat::Yaml).unwrap();
        let source = render_rust(&table).unwrap();
        assert!(source.contains("pub type Role = String;"));
        assert!(!source.contains("pub enum Role"));
    }

    #[test]
    fn colliding_role_idents_are_rejected() {
        let table = compile_str(
            "paths:\n  /a:\n    get:\n      security:\n        - bearer: [super-admin, super_admin]\n",
            DocumentFormat::Yaml,
        )
        .unwrap();
        assert!(matches!(
            render_rust(&table),
            Err(Error::RoleIdentCollision { .. })
        ));
    }

    #[test]
    fn write_artifact_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let table = compile_str("paths:\n  /ping:\n    get: {}\n", DocumentFormat::Yaml).unwrap();
        let target = dir.path().join("nested/out/rbac.json");
        let format = write_artifact(&table, &target).unwrap();
        assert_eq!(format, ArtifactFormat::Json);
        let reloaded = PermissionTable::load(&target).unwrap();
        assert_eq!(reloaded.len(), 1);
    }
}
