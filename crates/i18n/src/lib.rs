//! Language/I18n Resolver: caches i18n namespaces per `(lang, namespace)`
//! and resolves dotted label/unit paths, tolerating an optional leading
//! `app.` prefix.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/i18n.py`
//! (`I18nResolver`), layered on top of `sa-assets`'s `AssetCatalog`
//! (itself the cache owner for raw namespace fetches).

use std::sync::Arc;

use parking_lot::Mutex;
use sa_assets::AssetCatalog;
use serde_json::Value;

/// A resolved unit reference: either a scalar display symbol or an enum
/// mapping from raw value to display label.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitResolution {
    Scalar(String),
    Enum(std::collections::HashMap<String, String>),
    Unknown,
}

/// Resolves i18n labels and units against the catalog's language and
/// namespace chunks, remembering the effective language once determined.
pub struct I18nResolver {
    catalog: Arc<AssetCatalog>,
    configured_lang: Option<String>,
    effective_lang: Mutex<Option<String>>,
}

impl I18nResolver {
    pub fn new(catalog: Arc<AssetCatalog>, configured_lang: Option<String>) -> Self {
        I18nResolver {
            catalog,
            configured_lang,
            effective_lang: Mutex::new(None),
        }
    }

    /// The effective language: explicitly configured at construction, or
    /// derived from the catalog's `defaultTranslation`, falling back to
    /// `"en"` if neither is available.
    pub async fn ensure_lang(&self) -> String {
        if let Some(lang) = self.effective_lang.lock().clone() {
            return lang;
        }
        let lang = self
            .configured_lang
            .clone()
            .or_else(|| {
                self.catalog
                    .list_language_config()
                    .and_then(|cfg| cfg.get("defaultTranslation").and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| "en".to_string());
        *self.effective_lang.lock() = Some(lang.clone());
        lang
    }

    /// Fetches (or returns the cached) i18n namespace for the effective
    /// language.
    pub async fn get_namespace(&self, namespace: &str) -> Value {
        let lang = self.ensure_lang().await;
        self.catalog.get_i18n(&lang, namespace).await
    }

    /// Resolves a dotted path within a namespace, tolerating an optional
    /// leading `app.`.
    pub fn lookup_path(namespace: &Value, path: &str) -> Option<Value> {
        if let Some(v) = lookup_path_raw(namespace, path) {
            return Some(v);
        }
        if let Some(stripped) = path.strip_prefix("app.") {
            return lookup_path_raw(namespace, stripped);
        }
        lookup_path_raw(namespace, &format!("app.{path}"))
    }

    /// Resolves a parameter label from the `parameters` namespace.
    pub async fn resolve_param_label(&self, path: &str) -> Option<String> {
        let ns = self.get_namespace("parameters").await;
        Self::lookup_path(&ns, path).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Resolves a unit code to a scalar symbol or enum mapping, per
    /// spec.md §4.G: consult the descriptor's `text` (i18n path), then
    /// the units namespace, then the descriptor's `options` map.
    pub async fn resolve_unit(&self, code: &str) -> UnitResolution {
        let Some(desc) = self.catalog.get_unit_descriptor(code).await else {
            return UnitResolution::Unknown;
        };

        if let Some(Value::Object(entries)) = &desc.options {
            let units_ns = self.get_namespace("units").await;
            let mut map = std::collections::HashMap::new();
            for (raw_value, label_ref) in entries {
                let label = match label_ref {
                    Value::String(s) if s.contains('.') => Self::lookup_path(&units_ns, s)
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| s.clone()),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                map.insert(raw_value.clone(), label);
            }
            return UnitResolution::Enum(map);
        }

        if let Some(text) = &desc.text {
            let units_ns = self.get_namespace("units").await;
            let label = Self::lookup_path(&units_ns, text)
                .and_then(|v| v.as_str().map(normalize_unit_label))
                .unwrap_or_else(|| normalize_unit_label(text));
            return UnitResolution::Scalar(label);
        }

        UnitResolution::Scalar(normalize_unit_label(code))
    }
}

fn lookup_path_raw(value: &Value, path: &str) -> Option<Value> {
    let mut cur = value;
    for part in path.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur.clone())
}

/// Normalizes a scalar unit label (e.g. `degC` -> `°C`).
pub fn normalize_unit_label(label: &str) -> String {
    sa_assets::units::normalize_unit_label(label)
}

/// Normalizes a raw unit value for display/caching, idempotently:
/// mappings become string-cleaned dicts, strings are trimmed and
/// normalized (or dropped to `None` if empty or purely numeric, since a
/// bare digit string is never a meaningful unit label), and `None`
/// passes through unchanged.
pub fn normalize_unit_value(value: Option<&Value>) -> Option<Value> {
    match value {
        None => None,
        Some(Value::Null) => None,
        Some(Value::Object(map)) => {
            let cleaned: serde_json::Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| {
                    let s = match v {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    };
                    if s.is_empty() {
                        None
                    } else {
                        Some((k.clone(), Value::String(s)))
                    }
                })
                .collect();
            Some(Value::Object(cleaned))
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                Some(Value::String(normalize_unit_label(trimmed)))
            }
        }
        Some(other) => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_path_tolerates_optional_app_prefix() {
        let ns = json!({"app": {"one": {"boilerStatus": {"name": "Boiler status"}}}});
        let direct = I18nResolver::lookup_path(&ns, "app.one.boilerStatus.name");
        let tolerant = I18nResolver::lookup_path(&ns, "one.boilerStatus.name");
        assert_eq!(direct, tolerant);
        assert_eq!(direct.unwrap(), json!("Boiler status"));
    }

    #[test]
    fn lookup_path_misses_return_none() {
        let ns = json!({"app": {}});
        assert_eq!(I18nResolver::lookup_path(&ns, "missing.path"), None);
    }

    #[test]
    fn normalize_unit_value_is_idempotent_for_strings() {
        let once = normalize_unit_value(Some(&json!("  degC  ")));
        let twice = normalize_unit_value(once.as_ref());
        assert_eq!(once, twice);
        assert_eq!(once, Some(json!("°C")));
    }

    #[test]
    fn normalize_unit_value_drops_digit_only_strings() {
        assert_eq!(normalize_unit_value(Some(&json!("42"))), None);
        assert_eq!(normalize_unit_value(Some(&json!(""))), None);
    }

    #[test]
    fn normalize_unit_value_passes_none_through() {
        assert_eq!(normalize_unit_value(None), None);
    }

    #[test]
    fn normalize_unit_value_cleans_mapping_entries() {
        let mapping = json!({"0": "  off ", "1": ""});
        let cleaned = normalize_unit_value(Some(&mapping)).unwrap();
        assert_eq!(cleaned["0"], json!("off"));
        assert!(cleaned.get("1").is_none());
    }
}
