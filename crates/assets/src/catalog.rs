//! `AssetCatalog`: discovers, fetches, and parses the bundle graph,
//! exposing parameter maps, i18n namespaces, unit descriptors, and raw
//! module-menu chunks to the resolver and menu processor.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/assets_model.py`
//! (`AssetsModel`) and `assets_client.py` (`AssetClient`), collapsed into
//! one catalog object per spec.md §4.E's consumer-facing API
//! (`AssetsProtocol` in `models/param_resolver.py`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sa_http::HttpClient;
use serde_json::Value;

use crate::discovery::{self, IndexState};
use crate::jsliteral;
use crate::parammap::ParamMap;
use crate::units::UnitDescriptor;

/// Discovers and caches parsed assets from the BragerOne web-app bundle
/// graph. Every lookup degrades to `None`/empty on failure — the catalog
/// never propagates a fetch or parse error to its callers (spec.md §4.E
/// "Failure model").
pub struct AssetCatalog {
    http: Arc<HttpClient>,
    index: Mutex<Option<IndexState>>,
    param_mapping_cache: Mutex<HashMap<String, Option<ParamMap>>>,
    i18n_cache: Mutex<HashMap<(String, String), Arc<Value>>>,
    menu_cache: Mutex<HashMap<i64, Arc<Value>>>,
    units_cache: Mutex<Option<Arc<HashMap<String, UnitDescriptor>>>>,
}

impl AssetCatalog {
    pub fn new(http: Arc<HttpClient>) -> Self {
        AssetCatalog {
            http,
            index: Mutex::new(None),
            param_mapping_cache: Mutex::new(HashMap::new()),
            i18n_cache: Mutex::new(HashMap::new()),
            menu_cache: Mutex::new(HashMap::new()),
            units_cache: Mutex::new(None),
        }
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        match self.http.get_bytes(url).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(url, error = %e, "asset bundle is not valid utf-8");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(url, error = %e, "asset fetch failed, degrading to empty");
                None
            }
        }
    }

    /// Fetches `index_url` and rebuilds the asset registry, menu map,
    /// and language config. Clears per-token and namespace caches since
    /// a new index may point at different chunk hashes.
    pub async fn refresh_index(&self, index_url: &str) {
        let Some(js) = self.fetch_text(index_url).await else {
            tracing::warn!(index_url, "index bundle unavailable, catalog stays empty");
            return;
        };
        let state = discovery::parse_index(index_url, &js);
        *self.index.lock() = Some(state);
        self.param_mapping_cache.lock().clear();
        self.i18n_cache.lock().clear();
        self.menu_cache.lock().clear();
        *self.units_cache.lock() = None;
    }

    /// The raw language configuration literal discovered in the index
    /// bundle, if any (`{translations, defaultTranslation}`).
    pub fn list_language_config(&self) -> Option<Value> {
        self.index.lock().as_ref().and_then(|s| s.language_config.clone())
    }

    fn newest_asset_url(&self, base: &str) -> Option<String> {
        self.index
            .lock()
            .as_ref()
            .and_then(|s| s.newest(base))
            .map(|a| a.url.clone())
    }

    /// Resolves and parses parameter maps for a set of symbolic tokens,
    /// following spec.md §4.E's two-pass resolution: direct asset lookup
    /// first, then the inline-candidate fallback for the single
    /// remaining unresolved token (if the index has exactly one
    /// candidate).
    pub async fn get_param_mapping(&self, tokens: &[String]) -> HashMap<String, Option<ParamMap>> {
        let mut results = HashMap::new();
        let mut unresolved = Vec::new();

        for token in tokens {
            if let Some(cached) = self.param_mapping_cache.lock().get(token).cloned() {
                results.insert(token.clone(), cached);
                continue;
            }

            let Some(url) = self.newest_asset_url(token) else {
                unresolved.push(token.clone());
                continue;
            };

            let parsed = self.fetch_and_parse_param_map(&url).await;
            self.param_mapping_cache.lock().insert(token.clone(), parsed.clone());
            results.insert(token.clone(), parsed);
            if results.get(token).map(Option::is_none).unwrap_or(true) {
                unresolved.push(token.clone());
            }
        }

        self.apply_inline_fallback(&mut results, &unresolved);
        results
    }

    fn apply_inline_fallback(&self, results: &mut HashMap<String, Option<ParamMap>>, unresolved: &[String]) {
        if unresolved.len() != 1 {
            return;
        }
        let candidates = self
            .index
            .lock()
            .as_ref()
            .map(|s| s.inline_param_candidates.clone())
            .unwrap_or_default();
        if candidates.len() != 1 {
            return;
        }
        let token = &unresolved[0];
        let normalized = jsliteral::normalize(&candidates[0].literal);
        if let Ok(raw) = serde_json::from_str::<Value>(&normalized) {
            let map = ParamMap::from_raw(raw);
            self.param_mapping_cache.lock().insert(token.clone(), Some(map.clone()));
            results.insert(token.clone(), Some(map));
        }
    }

    async fn fetch_and_parse_param_map(&self, url: &str) -> Option<ParamMap> {
        let js = self.fetch_text(url).await?;
        match jsliteral::parse_default_export(&js) {
            Ok(raw) => Some(ParamMap::from_raw(raw)),
            Err(e) => {
                tracing::debug!(url, error = %e, "falling back to best-effort regex extraction");
                best_effort_param_map(&js)
            }
        }
    }

    /// Fetches and caches one i18n namespace for a language. Namespace
    /// chunks are addressed by convention `<namespace>-<lang>`; `<lang>`
    /// is also tried as a standalone basename for bundles that key by
    /// language alone.
    pub async fn get_i18n(&self, lang: &str, namespace: &str) -> Value {
        let key = (lang.to_string(), namespace.to_string());
        if let Some(cached) = self.i18n_cache.lock().get(&key).cloned() {
            return (*cached).clone();
        }

        let candidates = [
            format!("{namespace}-{lang}"),
            format!("{lang}-{namespace}"),
            lang.to_string(),
        ];
        let url = candidates.iter().find_map(|base| self.newest_asset_url(base));
        let Some(url) = url else {
            return Value::Object(Default::default());
        };

        let value = match self.fetch_text(&url).await {
            Some(js) => jsliteral::parse_default_export(&js).unwrap_or(Value::Object(Default::default())),
            None => Value::Object(Default::default()),
        };

        self.i18n_cache.lock().insert(key, Arc::new(value.clone()));
        value
    }

    /// The units chunk, parsed once and cached as a code -> descriptor
    /// table.
    pub async fn get_unit_descriptor(&self, code: &str) -> Option<UnitDescriptor> {
        if let Some(table) = self.units_cache.lock().clone() {
            return table.get(code).cloned();
        }

        let url = self.newest_asset_url("units")?;
        let js = self.fetch_text(&url).await?;
        let raw = jsliteral::parse_default_export(&js).ok()?;
        let mut table = HashMap::new();
        if let Value::Object(map) = &raw {
            for (k, v) in map {
                table.insert(k.clone(), UnitDescriptor::from_raw(v));
            }
        }
        let table = Arc::new(table);
        let descriptor = table.get(code).cloned();
        *self.units_cache.lock() = Some(table);
        descriptor
    }

    /// Fetches and caches the raw route array for a device menu. The
    /// Menu Processor (`sa-menu`) owns permission-set-scoped caching on
    /// top of this raw fetch.
    pub async fn get_module_menu(&self, device_menu: i64) -> Option<Value> {
        if let Some(cached) = self.menu_cache.lock().get(&device_menu).cloned() {
            return Some((*cached).clone());
        }

        let base = self.index.lock().as_ref()?.menu_map.get(&device_menu).cloned()?;
        let url = self.newest_asset_url(&base)?;
        let js = self.fetch_text(&url).await?;
        let raw = jsliteral::parse_default_export(&js).ok()?;
        self.menu_cache.lock().insert(device_menu, Arc::new(raw.clone()));
        Some(raw)
    }
}

/// Best-effort partial extraction used when the full literal doesn't
/// parse as JSON: pulls `name`, optional numeric `id`, and optional
/// `command` directly via regex, per spec.md §4.E's failure model.
fn best_effort_param_map(js: &str) -> Option<ParamMap> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"name"?\s*:\s*["']([^"']+)["']"#).unwrap());
    static RE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"id"?\s*:\s*(\d+)"#).unwrap());
    static RE_COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r#"command"?\s*:\s*["']([^"']+)["']"#).unwrap());

    let name = RE_NAME.captures(js).map(|c| c[1].to_string());
    let id = RE_ID.captures(js).and_then(|c| c[1].parse::<i64>().ok());
    let command = RE_COMMAND.captures(js).map(|c| c[1].to_string());

    if name.is_none() && id.is_none() && command.is_none() {
        return None;
    }

    let mut raw = serde_json::Map::new();
    if let Some(n) = &name {
        raw.insert("name".to_string(), Value::String(n.clone()));
    }
    if let Some(i) = id {
        raw.insert("id".to_string(), Value::Number(i.into()));
    }
    if let Some(c) = &command {
        raw.insert("command".to_string(), Value::String(c.clone()));
    }
    Some(ParamMap::from_raw(Value::Object(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_effort_extraction_recovers_name_and_id() {
        let js = r#"this is not valid json but has name: "boilerStatus", id: 42, command: "SET""#;
        let map = best_effort_param_map(js).expect("partial extraction");
        assert_eq!(map.name.as_deref(), Some("boilerStatus"));
    }

    #[test]
    fn best_effort_extraction_returns_none_with_no_markers() {
        assert!(best_effort_param_map("totally unrelated garbage").is_none());
    }
}
