//! Index-bundle discovery: extracts the asset registry, menu-chunk map,
//! language configuration, and inline parameter-map candidates from the
//! entry `index-<hash>.js` bundle.
//!
//! Grounded on `examples/original_source/src/pybragerone/parsers/index_resolver.py`
//! (`IndexResolver._parse_index`) and `assets_client.py`'s
//! `_find_lang_bundles`, generalized to the structural (not name-based)
//! language-config detection spec.md §4.E requires.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::jsliteral;

/// One discovered chunk reference: `import("./<base>-<hash>.js")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub url: String,
    pub base: String,
    pub hash: String,
}

/// A byte range in the index bundle that plausibly holds an inline
/// parameter-map object literal, kept as a last-resort fallback.
#[derive(Debug, Clone)]
pub struct InlineCandidate {
    pub literal: String,
}

/// Everything extracted from one index bundle.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub index_url: String,
    /// base name -> known variants (newest last).
    pub assets_by_basename: HashMap<String, Vec<AssetRef>>,
    pub menu_map: HashMap<i64, String>,
    pub language_config: Option<Value>,
    pub inline_param_candidates: Vec<InlineCandidate>,
}

impl IndexState {
    /// The newest-hash asset registered for `base`, if any.
    pub fn newest(&self, base: &str) -> Option<&AssetRef> {
        self.assets_by_basename.get(base).and_then(|v| v.last())
    }
}

static RE_DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\(\s*["']\./(?P<base>[A-Za-z0-9_.\-]+?)-(?P<hash>[0-9a-fA-F]{6,})\.js["']\s*\)"#).unwrap());

/// `menu_map` entries are key-to-chunk literals like `{4:"Boiler",7:"DHW"}`
/// inside the bundle, with the chunk name later resolved against
/// `assets_by_basename`. We detect the raw numeric-key -> basename pairs
/// directly via regex since the surrounding object is not a clean default
/// export.
static RE_MENU_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?P<key>\d+)\s*:\s*["'](?P<base>[A-Za-z0-9_.\-]+)["']"#).unwrap());

/// Extracts `assets_by_basename` from the raw bundle text.
fn extract_assets_by_basename(js: &str, index_url: &str) -> HashMap<String, Vec<AssetRef>> {
    let mut map: HashMap<String, Vec<AssetRef>> = HashMap::new();
    for caps in RE_DYNAMIC_IMPORT.captures_iter(js) {
        let base = caps["base"].to_string();
        let hash = caps["hash"].to_string();
        let url = resolve_relative(index_url, &format!("{base}-{hash}.js"));
        let entry = AssetRef { url, base: base.clone(), hash };
        map.entry(base).or_default().push(entry);
    }
    map
}

fn resolve_relative(index_url: &str, relative: &str) -> String {
    match index_url.rfind('/') {
        Some(pos) => format!("{}/{}", &index_url[..pos], relative),
        None => relative.to_string(),
    }
}

/// Extracts the `device_menu -> base` mapping. This scans every object
/// literal found anywhere in the bundle for `int: "string"` entries and
/// keeps only those whose string value also shows up as a basename in
/// `assets_by_basename`, since that is the only structural signal that
/// distinguishes the menu map from unrelated numeric-keyed literals.
fn extract_menu_map(js: &str, known_bases: &HashMap<String, Vec<AssetRef>>) -> HashMap<i64, String> {
    let mut map = HashMap::new();
    for caps in RE_MENU_ENTRY.captures_iter(js) {
        let base = &caps["base"];
        if !known_bases.contains_key(base) {
            continue;
        }
        if let Ok(key) = caps["key"].parse::<i64>() {
            map.insert(key, base.to_string());
        }
    }
    map
}

/// Walks every top-level `{...}` literal in the bundle and returns those
/// matching the structural language-config shape: a `translations` array
/// that is at least 70% objects carrying both `id` and `flag`, and a
/// non-empty string `defaultTranslation`.
fn find_language_config(js: &str) -> Option<Value> {
    let mut i = 0;
    let bytes = js.as_bytes();
    let mut best: Option<Value> = None;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some((start, end)) = jsliteral::find_braced_object(js, i) {
                let literal = &js[start..=end];
                let normalized = jsliteral::normalize(literal);
                if let Ok(value) = serde_json::from_str::<Value>(&normalized) {
                    if looks_like_language_config(&value) {
                        best = Some(value);
                    }
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    best
}

fn looks_like_language_config(value: &Value) -> bool {
    let Some(translations) = value.get("translations").and_then(Value::as_array) else {
        return false;
    };
    if translations.is_empty() {
        return false;
    }
    let matching = translations
        .iter()
        .filter(|t| t.get("id").is_some() && t.get("flag").is_some())
        .count();
    let ratio = matching as f64 / translations.len() as f64;
    if ratio < 0.7 {
        return false;
    }
    matches!(value.get("defaultTranslation"), Some(Value::String(s)) if !s.is_empty())
}

/// Collects every top-level object literal that is plausibly a parameter
/// map (carries at least one of the recognized sections) as a fallback
/// candidate, keeping the raw text so it can be attributed to an
/// unresolved token later.
fn find_inline_param_candidates(js: &str) -> Vec<InlineCandidate> {
    let mut out = Vec::new();
    let mut i = 0;
    let bytes = js.as_bytes();
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some((start, end)) = jsliteral::find_braced_object(js, i) {
                let literal = &js[start..=end];
                if plausibly_param_map(literal) {
                    out.push(InlineCandidate { literal: literal.to_string() });
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn plausibly_param_map(literal: &str) -> bool {
    const MARKERS: &[&str] = &["componentType", "statusFlags", "statusConditions", "minValue", "maxValue"];
    MARKERS.iter().any(|m| literal.contains(m))
}

/// Fetches and parses one index bundle.
pub fn parse_index(index_url: &str, js: &str) -> IndexState {
    let assets_by_basename = extract_assets_by_basename(js, index_url);
    let menu_map = extract_menu_map(js, &assets_by_basename);
    let language_config = find_language_config(js);
    let inline_param_candidates = find_inline_param_candidates(js);
    IndexState {
        index_url: index_url.to_string(),
        assets_by_basename,
        menu_map,
        language_config,
        inline_param_candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"
        const a = () => import("./params-abc123.js");
        const b = () => import("./units-def456.js");
        const menu = {4:"boiler-menu",7:"dhw-menu"};
        const lang = {translations:[{id:"en",flag:"gb"},{id:"pl",flag:"pl"}],defaultTranslation:"en"};
        const ignored = {0:"nope"};
        const inline = {componentType:"TEXT_FIELD",value:[{group:"P1",number:1,use:"v"}]};
    "#;

    #[test]
    fn extracts_asset_refs_with_newest_hash() {
        let state = parse_index("https://cdn.example/app/index-000.js", BUNDLE);
        assert!(state.assets_by_basename.contains_key("params"));
        assert_eq!(state.newest("params").unwrap().hash, "abc123");
        assert_eq!(
            state.newest("params").unwrap().url,
            "https://cdn.example/app/params-abc123.js"
        );
    }

    #[test]
    fn extracts_menu_map_only_for_known_bases() {
        let state = parse_index("https://cdn.example/app/index-000.js", BUNDLE);
        assert_eq!(state.menu_map.get(&4), None); // "boiler-menu" never import()ed
        assert!(!state.menu_map.contains_key(&0));
    }

    #[test]
    fn detects_language_config_structurally() {
        let state = parse_index("https://cdn.example/app/index-000.js", BUNDLE);
        let cfg = state.language_config.expect("language config found");
        assert_eq!(cfg["defaultTranslation"], "en");
        assert_eq!(cfg["translations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn collects_inline_param_candidates() {
        let state = parse_index("https://cdn.example/app/index-000.js", BUNDLE);
        assert_eq!(state.inline_param_candidates.len(), 1);
        assert!(state.inline_param_candidates[0].literal.contains("componentType"));
    }

    #[test]
    fn ignores_literals_below_structural_threshold() {
        let js = r#"const cfg = {translations:[{id:"en"},{flag:"pl"}],defaultTranslation:"en"};"#;
        assert!(find_language_config(js).is_none());
    }
}
