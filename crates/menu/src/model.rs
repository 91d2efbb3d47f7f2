//! The validated menu tree produced by the Menu Processor.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/menu.py`
//! (`MenuParameter`, `MenuParameters`, `MenuMeta`, `MenuRoute`,
//! `MenuResult`).

use std::collections::HashMap;

use serde_json::Value;

/// A single parameter reference inside a route's `meta.parameters`
/// section, with its JS-expression token already extracted.
#[derive(Debug, Clone)]
pub struct MenuParameter {
    pub token: String,
    pub permission_module: Option<String>,
    pub raw: Value,
}

/// The four parameter lists a route's `meta.parameters` can carry.
#[derive(Debug, Clone, Default)]
pub struct MenuParameters {
    pub read: Vec<MenuParameter>,
    pub write: Vec<MenuParameter>,
    pub status: Vec<MenuParameter>,
    pub special: Vec<MenuParameter>,
}

impl MenuParameters {
    pub fn all_tokens(&self) -> Vec<String> {
        self.read
            .iter()
            .chain(&self.write)
            .chain(&self.status)
            .chain(&self.special)
            .map(|p| p.token.clone())
            .collect()
    }

    pub fn all_permissions(&self) -> Vec<String> {
        self.read
            .iter()
            .chain(&self.write)
            .chain(&self.status)
            .chain(&self.special)
            .filter_map(|p| p.permission_module.clone())
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.status.is_empty() && self.special.is_empty()
    }
}

/// A route's display metadata.
#[derive(Debug, Clone, Default)]
pub struct MenuMeta {
    pub display_name: Option<String>,
    pub icon: Option<String>,
    pub permission_module: Option<String>,
    pub parameters: MenuParameters,
    pub display_dropdown: bool,
}

/// One node of the menu tree.
#[derive(Debug, Clone)]
pub struct MenuRoute {
    pub path: String,
    pub name: Option<String>,
    pub component: Option<String>,
    pub meta: MenuMeta,
    pub children: Vec<MenuRoute>,
}

impl MenuRoute {
    pub fn all_tokens(&self) -> Vec<String> {
        let mut tokens = self.meta.parameters.all_tokens();
        for child in &self.children {
            tokens.extend(child.all_tokens());
        }
        tokens
    }

    pub fn all_permissions(&self) -> Vec<String> {
        let mut perms = self.meta.permission_module.clone().into_iter().collect::<Vec<_>>();
        perms.extend(self.meta.parameters.all_permissions());
        for child in &self.children {
            perms.extend(child.all_permissions());
        }
        perms
    }

    /// Whether this route is an eligible "module item" for panel-grouping
    /// purposes: it carries at least one parameter list.
    pub fn is_module_item(&self) -> bool {
        !self.meta.parameters.is_empty()
    }
}

/// The top-level result of processing one menu chunk.
#[derive(Debug, Clone)]
pub struct MenuResult {
    pub routes: Vec<MenuRoute>,
    pub asset_url: Option<String>,
}

impl MenuResult {
    pub fn all_tokens(&self) -> Vec<String> {
        self.routes.iter().flat_map(MenuRoute::all_tokens).collect()
    }

    pub fn all_permissions(&self) -> Vec<String> {
        self.routes.iter().flat_map(MenuRoute::all_permissions).collect()
    }

    pub fn token_count(&self) -> usize {
        self.all_tokens().len()
    }

    pub fn route_count(&self) -> usize {
        fn count(route: &MenuRoute) -> usize {
            1 + route.children.iter().map(count).sum::<usize>()
        }
        self.routes.iter().map(count).sum()
    }

    /// Flattens the tree into a `<parent>/<child>/...` path -> route map.
    pub fn routes_by_path(&self) -> HashMap<String, &MenuRoute> {
        let mut out = HashMap::new();
        for route in &self.routes {
            flatten(route, "", &mut out);
        }
        out
    }
}

fn flatten<'a>(route: &'a MenuRoute, parent: &str, out: &mut HashMap<String, &'a MenuRoute>) {
    let full_path = if parent.is_empty() {
        route.path.clone()
    } else {
        format!("{parent}/{}", route.path)
    };
    for child in &route.children {
        flatten(child, &full_path, out);
    }
    out.insert(full_path, route);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(path: &str, param_token: Option<&str>) -> MenuRoute {
        let mut parameters = MenuParameters::default();
        if let Some(tok) = param_token {
            parameters.read.push(MenuParameter {
                token: tok.to_string(),
                permission_module: None,
                raw: Value::Null,
            });
        }
        MenuRoute {
            path: path.to_string(),
            name: None,
            component: None,
            meta: MenuMeta {
                parameters,
                ..Default::default()
            },
            children: Vec::new(),
        }
    }

    #[test]
    fn routes_by_path_combines_parent_and_child_segments() {
        let mut parent = leaf("boiler", None);
        parent.children.push(leaf("status", Some("PARAM_1")));
        let result = MenuResult {
            routes: vec![parent],
            asset_url: None,
        };
        let by_path = result.routes_by_path();
        assert!(by_path.contains_key("boiler/status"));
        assert!(by_path.contains_key("boiler"));
    }

    #[test]
    fn token_and_route_counts_cover_the_whole_tree() {
        let mut parent = leaf("boiler", Some("PARAM_1"));
        parent.children.push(leaf("status", Some("PARAM_2")));
        let result = MenuResult {
            routes: vec![parent],
            asset_url: None,
        };
        assert_eq!(result.route_count(), 2);
        assert_eq!(result.token_count(), 2);
    }
}
