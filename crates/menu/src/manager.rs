//! Caches raw and processed menus per device menu and per permission
//! set, and derives the "core-only" / "all-panels" symbol groupings.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/menu_manager.py`
//! (`MenuManager`, `RawMenuData`).

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::model::{MenuResult, MenuRoute};
use crate::processor::process_raw_menu;

/// One fetched-but-unprocessed menu chunk.
#[derive(Debug, Clone)]
pub struct RawMenuData {
    pub device_menu: i64,
    pub routes: Vec<Value>,
    pub asset_url: Option<String>,
}

impl RawMenuData {
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// A named group of symbols for panel display, with an i18n-path
/// candidate a caller can resolve for the panel's title.
#[derive(Debug, Clone)]
pub struct PanelGroup {
    pub key: String,
    pub title_key: Option<String>,
    pub symbols: Vec<String>,
}

fn permission_set_hash(permissions: Option<&HashSet<String>>) -> u64 {
    let mut items: Vec<&String> = permissions.map(|s| s.iter().collect()).unwrap_or_default();
    items.sort();
    let mut hasher = DefaultHasher::new();
    items.hash(&mut hasher);
    hasher.finish()
}

/// Caches raw menu chunks per `device_menu` and processed `MenuResult`s
/// per `(device_menu, permission_set)`.
pub struct MenuManager {
    raw_cache: Mutex<HashMap<i64, Arc<RawMenuData>>>,
    processed_cache: Mutex<HashMap<(i64, u64), Arc<MenuResult>>>,
}

impl Default for MenuManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuManager {
    pub fn new() -> Self {
        MenuManager {
            raw_cache: Mutex::new(HashMap::new()),
            processed_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store_raw_menu(&self, device_menu: i64, routes: Vec<Value>, asset_url: Option<String>) {
        self.raw_cache.lock().insert(
            device_menu,
            Arc::new(RawMenuData {
                device_menu,
                routes,
                asset_url,
            }),
        );
        self.processed_cache.lock().retain(|(dm, _), _| *dm != device_menu);
    }

    pub fn get_raw_menu(&self, device_menu: i64) -> Option<Arc<RawMenuData>> {
        self.raw_cache.lock().get(&device_menu).cloned()
    }

    /// Returns the processed menu for a device menu, filtered by
    /// `permissions` (or unfiltered if `None`). `debug_mode` bypasses the
    /// cache and retains invisible routes, matching spec.md §4.E's
    /// "Results are cached per `(device_menu, permission_set)`" except
    /// when debugging.
    pub fn get_menu(&self, device_menu: i64, permissions: Option<&HashSet<String>>, debug_mode: bool) -> Option<Arc<MenuResult>> {
        let raw = self.get_raw_menu(device_menu)?;

        if debug_mode {
            return Some(Arc::new(process_raw_menu(&raw.routes, raw.asset_url.clone(), permissions, true)));
        }

        let key = (device_menu, permission_set_hash(permissions));
        if let Some(cached) = self.processed_cache.lock().get(&key).cloned() {
            return Some(cached);
        }
        let result = Arc::new(process_raw_menu(&raw.routes, raw.asset_url.clone(), permissions, false));
        self.processed_cache.lock().insert(key, result.clone());
        Some(result)
    }

    pub fn list_cached_menus(&self) -> Vec<i64> {
        self.raw_cache.lock().keys().copied().collect()
    }

    pub fn clear_cache(&self) {
        self.raw_cache.lock().clear();
        self.processed_cache.lock().clear();
    }
}

const CORE_GROUPS: [&str; 3] = ["Boiler", "DHW", "Valve 1"];

fn find_route_by_name<'a>(routes: &'a [MenuRoute], name: &str) -> Option<&'a MenuRoute> {
    for route in routes {
        if route.name.as_deref().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false) {
            return Some(route);
        }
        if let Some(found) = find_route_by_name(&route.children, name) {
            return Some(found);
        }
    }
    None
}

fn collect_module_item_groups(routes: &[MenuRoute], parent_path: &str, out: &mut Vec<PanelGroup>) {
    for route in routes {
        let full_path = if parent_path.is_empty() {
            route.path.clone()
        } else {
            format!("{parent_path}/{}", route.path)
        };
        if route.is_module_item() {
            out.push(PanelGroup {
                key: full_path.clone(),
                title_key: route
                    .name
                    .as_ref()
                    .map(|n| format!("routes.modules.menu.{}", n.to_lowercase())),
                symbols: route.all_tokens(),
            });
        }
        collect_module_item_groups(&route.children, &full_path, out);
    }
}

/// Derives the panel groupings from spec.md §4.F: three canonical groups
/// in "core-only" mode, or one group per module-item route in
/// "all-panels" mode.
pub fn panel_groups(result: &MenuResult, core_only: bool) -> Vec<PanelGroup> {
    if core_only {
        CORE_GROUPS
            .iter()
            .filter_map(|name| {
                find_route_by_name(&result.routes, name).map(|route| PanelGroup {
                    key: (*name).to_string(),
                    title_key: Some(format!("routes.modules.menu.{}", name.to_lowercase().replace(' ', "_"))),
                    symbols: route.all_tokens(),
                })
            })
            .collect()
    } else {
        let mut groups = Vec::new();
        collect_module_item_groups(&result.routes, "", &mut groups);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caches_processed_menu_per_permission_set() {
        let manager = MenuManager::new();
        manager.store_raw_menu(4, vec![json!({"path": "a", "meta": {}})], None);
        let granted: HashSet<String> = HashSet::new();
        let first = manager.get_menu(4, Some(&granted), false).unwrap();
        let second = manager.get_menu(4, Some(&granted), false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn debug_mode_bypasses_cache_and_keeps_invisible() {
        let manager = MenuManager::new();
        manager.store_raw_menu(4, vec![json!({"path": "hidden", "_visible": false, "meta": {}})], None);
        let result = manager.get_menu(4, None, true).unwrap();
        assert_eq!(result.routes.len(), 1);
    }

    #[test]
    fn core_only_groups_match_canonical_names() {
        let boiler = json!({"path": "boiler", "name": "Boiler", "meta": {"parameters": {"read": [{"expr": "r(E.READ,\"PARAM_1\")"}]}}});
        let result = process_raw_menu(&[boiler], None, None, false);
        let groups = panel_groups(&result, true);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "Boiler");
        assert_eq!(groups[0].symbols, vec!["PARAM_1".to_string()]);
    }

    #[test]
    fn all_panels_mode_excludes_non_module_item_routes() {
        let fleet = json!({
            "path": "modules",
            "name": "Modules",
            "meta": {},
            "children": [
                {"path": "boiler", "name": "Boiler", "meta": {"parameters": {"read": [{"expr": "r(E.READ,\"PARAM_1\")"}]}}}
            ]
        });
        let result = process_raw_menu(&[fleet], None, None, false);
        let groups = panel_groups(&result, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "modules/boiler");
    }
}
