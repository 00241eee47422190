//! Navigation tree filtering.
//!
//! Unlike [`Evaluator`] lookups, navigation checks are default-deny: an entry
//! whose `check_path` (and `check_method`, when set) has no row in the table
//! is hidden for every role.

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::types::{HttpMethod, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Icon identifiers resolved by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Icon {
    Home,
    Users,
    Accessibility,
    Settings,
    BarChart,
    Package,
    FileText,
    Shield,
}

/// Top-level navigation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationItem {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    /// Path used for the permission lookup; not necessarily `url`.
    pub check_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_method: Option<HttpMethod>,
    /// Declared children. `Some(vec![])` still counts as declaring children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<NavigationLink>>,
}

/// Child entry; children cannot nest further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationLink {
    pub title: String,
    pub url: String,
    pub check_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_method: Option<HttpMethod>,
}

/// Reads a navigation tree from YAML or JSON (by extension).
pub fn load_navigation(path: impl AsRef<Path>) -> Result<Vec<NavigationItem>> {
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

/// Filters navigation trees for a role.
#[derive(Debug, Clone)]
pub struct NavigationFilter {
    evaluator: Evaluator,
}

impl NavigationFilter {
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    /// Visible subset of `items` for `role`, in source order.
    ///
    /// Children are filtered first. A parent that declares children is kept
    /// iff at least one child survives; its own `check_path` is then ignored.
    pub fn filter(&self, items: &[NavigationItem], role: &Role) -> Vec<NavigationItem> {
        items
            .iter()
            .filter_map(|item| {
                let items = match &item.items {
                    Some(children) => {
                        let visible: Vec<NavigationLink> = children
                            .iter()
                            .filter(|child| self.can_see(&child.check_path, child.check_method, role))
                            .cloned()
                            .collect();
                        if visible.is_empty() {
                            return None;
                        }
                        Some(visible)
                    }
                    None if self.can_see(&item.check_path, item.check_method, role) => None,
                    None => return None,
                };
                Some(NavigationItem {
                    items,
                    ..item.clone()
                })
            })
            .collect()
    }

    /// Counts of visible against total entries.
    pub fn stats(&self, items: &[NavigationItem], role: &Role) -> NavigationStats {
        let filtered = self.filter(items, role);
        let total_original_links = count_links(items);
        let total_filtered_links = count_links(&filtered);
        NavigationStats {
            role: role.clone(),
            original_items: items.len(),
            filtered_items: filtered.len(),
            total_original_links,
            total_filtered_links,
            hidden_links: total_original_links - total_filtered_links,
        }
    }

    fn can_see(&self, check_path: &str, check_method: Option<HttpMethod>, role: &Role) -> bool {
        if !self.has_permission_defined(check_path, check_method) {
            return false;
        }
        match check_method {
            Some(method) => self.evaluator.can_access_route(role, check_path, method),
            None => self.evaluator.can_access_resource(role, check_path),
        }
    }

    fn has_permission_defined(&self, check_path: &str, check_method: Option<HttpMethod>) -> bool {
        let mut rows = self.evaluator.table().path_permissions(check_path);
        match check_method {
            Some(method) => rows.any(|permission| permission.method == method),
            None => rows.next().is_some(),
        }
    }
}

fn count_links(items: &[NavigationItem]) -> usize {
    items
        .iter()
        .map(|item| 1 + item.items.as_ref().map_or(0, Vec::len))
        .sum()
}

/// Visibility counts for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStats {
    pub role: Role,
    /// Top-level entries in the source tree.
    pub original_items: usize,
    /// Top-level entries left after filtering.
    pub filtered_items: usize,
    /// Parents plus children in the source tree.
    pub total_original_links: usize,
    pub total_filtered_links: usize,
    pub hidden_links: usize,
}

impl fmt::Display for NavigationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Role: {}", self.role)?;
        writeln!(f, "Parent Items: {}/{}", self.filtered_items, self.original_items)?;
        writeln!(
            f,
            "Total Links: {}/{}",
            self.total_filtered_links, self.total_original_links
        )?;
        write!(f, "Hidden: {}", self.hidden_links)
    }
}
