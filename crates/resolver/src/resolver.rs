//! `ParamResolver`: the primary read surface. Resolves symbolic tokens
//! to addresses, direct or computed values, labels, and units, and
//! produces the full descriptor bundle consumers use for display.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/param_resolver.py`
//! (`ParamResolver`, `AssetsProtocol`).

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sa_assets::parammap::{collect_selectors, RegisterSelector};
use sa_assets::{AssetCatalog, ParamMap, ParamPaths};
use sa_i18n::{I18nResolver, UnitResolution};
use sa_protocol::Channel;
use sa_store::ParamStore;
use serde_json::Value;

use crate::ruleengine;
use crate::transform::{self, Val};

/// The outcome of resolving one symbolic parameter's current value.
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    pub symbol: String,
    pub kind: String,
    pub address: Option<String>,
    pub value: Option<Value>,
    pub value_label: Option<String>,
    pub unit: Option<String>,
}

/// The non-volatile half of a parameter's descriptor: shape of the
/// underlying mapping, independent of the current register values.
#[derive(Debug, Clone)]
pub struct MappingDescriptor {
    pub component_type: Option<String>,
    pub channels: ParamPaths,
    pub status_conditions: Option<Value>,
    pub status_flags: Option<Value>,
    pub command_rules: Option<Value>,
    pub inputs: Vec<RegisterSelector>,
    pub values: Option<Value>,
    pub units_source: Option<Value>,
    pub origin: String,
    pub raw: Value,
}

/// The full descriptor bundle for one symbol, spec.md §4.G.
#[derive(Debug, Clone)]
pub struct SymbolDescriptor {
    pub symbol: String,
    pub pool: Option<String>,
    pub idx: Option<u32>,
    pub chan: Option<Channel>,
    pub label: Option<String>,
    pub unit: Option<String>,
    pub value: Option<Value>,
    pub computed_value: Option<Value>,
    pub computed_value_label: Option<String>,
    pub unit_code: Option<String>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub status: Option<Value>,
    pub mapping: Option<MappingDescriptor>,
}

static RE_PARAM_SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^PARAM_P(\d+)_(\d+)$").unwrap());
static RE_STATUS_SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^STATUS_P(\d+)_(\d+)$").unwrap());

fn fallback_selector_from_symbol_name(symbol: &str) -> Option<RegisterSelector> {
    if let Some(c) = RE_PARAM_SYMBOL.captures(symbol) {
        return Some(RegisterSelector {
            pool: c[1].to_string(),
            chan: Channel::Value,
            idx: c[2].parse().ok()?,
            bit: None,
            mask: None,
        });
    }
    if let Some(c) = RE_STATUS_SYMBOL.captures(symbol) {
        return Some(RegisterSelector {
            pool: c[1].to_string(),
            chan: Channel::Status,
            idx: c[2].parse().ok()?,
            bit: None,
            mask: None,
        });
    }
    None
}

/// The mapping's primary address, preferring the value channel, falling
/// back through status/unit/max/min, then the symbol-name regex
/// convention. `STATUS_*` symbols canonically resolve to their status
/// channel even when a value channel is also present.
fn primary_address(mapping: &ParamMap, symbol: &str) -> Option<RegisterSelector> {
    if symbol.starts_with("STATUS_") {
        if let Some(sel) = mapping.paths.status.first() {
            return Some(sel.clone());
        }
    }
    mapping
        .paths
        .value
        .first()
        .or_else(|| mapping.paths.status.first())
        .or_else(|| mapping.paths.unit.first())
        .or_else(|| mapping.paths.max.first())
        .or_else(|| mapping.paths.min.first())
        .cloned()
        .or_else(|| fallback_selector_from_symbol_name(symbol))
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn value_as_key(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => n.as_i64().map(|i| i.to_string()).or_else(|| n.as_f64().map(|f| f.to_string())),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        _ => None,
    }
}

fn transform_val_to_json(v: Val) -> Value {
    match v {
        Val::Num(n) => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        Val::Str(s) => Value::String(s),
        Val::Bool(b) => Value::Bool(b),
    }
}

fn clause_condition_names(clause: &Value) -> Vec<String> {
    clause
        .get("condition")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(|s| s.rsplit('.').next().unwrap_or(s).to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// The primary read surface over the Store + Asset Catalog + i18n.
pub struct ParamResolver {
    store: Arc<ParamStore>,
    assets: Arc<AssetCatalog>,
    i18n: Arc<I18nResolver>,
}

impl ParamResolver {
    pub fn new(store: Arc<ParamStore>, assets: Arc<AssetCatalog>, i18n: Arc<I18nResolver>) -> Self {
        ParamResolver { store, assets, i18n }
    }

    async fn get_mapping(&self, symbol: &str) -> Option<ParamMap> {
        self.assets
            .get_param_mapping(&[symbol.to_string()])
            .await
            .remove(symbol)
            .flatten()
    }

    /// `resolve_label(symbol)`: the `parameters` namespace first, then
    /// the mapping's `name` field as a dotted `app.one.<name>.name` path.
    pub async fn resolve_label(&self, symbol: &str) -> Option<String> {
        if let Some(label) = self.i18n.resolve_param_label(symbol).await {
            return Some(label);
        }
        let mapping = self.get_mapping(symbol).await?;
        let name = mapping.name?;
        let ns = self.i18n.get_namespace("one").await;
        I18nResolver::lookup_path(&ns, &format!("{name}.name")).and_then(|v| v.as_str().map(str::to_string))
    }

    /// `resolve_unit(unit_code_or_map)`.
    pub async fn resolve_unit(&self, unit_code: &str) -> UnitResolution {
        self.i18n.resolve_unit(unit_code).await
    }

    fn register_unit_code(&self, selector: &RegisterSelector) -> Option<String> {
        self.store
            .get_family(&selector.pool, selector.idx)
            .and_then(|f| f.channels.get(&Channel::Unit).cloned())
            .and_then(|v| value_as_key(&v))
    }

    fn mapping_unit_code(mapping: &ParamMap) -> Option<String> {
        mapping.units.as_ref().and_then(value_as_key)
    }

    async fn unit_label_and_code(&self, mapping: &ParamMap, selector: Option<&RegisterSelector>) -> (Option<String>, Option<String>) {
        let code = selector
            .and_then(|s| self.register_unit_code(s))
            .or_else(|| Self::mapping_unit_code(mapping));
        let Some(code) = code else {
            return (None, None);
        };
        let label = match self.i18n.resolve_unit(&code).await {
            UnitResolution::Scalar(s) => Some(s),
            UnitResolution::Enum(_) => None,
            UnitResolution::Unknown => None,
        };
        (label, Some(code))
    }

    async fn apply_unit_value_transform(&self, unit_code: &str, raw: &Value) -> Value {
        let Some(desc) = self.assets.get_unit_descriptor(unit_code).await else {
            return raw.clone();
        };
        if let Some(src) = &desc.value_transform {
            if let Some(input) = value_as_f64(raw) {
                if let Some(out) = transform::apply_transform(src, input) {
                    return transform_val_to_json(out);
                }
            }
        }
        raw.clone()
    }

    async fn enum_label_for(&self, unit_code: &str, raw: &Value) -> Option<String> {
        let UnitResolution::Enum(map) = self.i18n.resolve_unit(unit_code).await else {
            return None;
        };
        let key = value_as_key(raw)?;
        map.get(&key).cloned()
    }

    /// `resolve_value(symbol)`.
    pub async fn resolve_value(&self, symbol: &str) -> ResolvedValue {
        let Some(mapping) = self.get_mapping(symbol).await else {
            tracing::debug!(symbol, "no parameter mapping found, degrading to lookup-miss");
            return ResolvedValue {
                symbol: symbol.to_string(),
                kind: "missing".to_string(),
                address: None,
                value: None,
                value_label: None,
                unit: None,
            };
        };

        let selector = primary_address(&mapping, symbol);

        if mapping.has_computed_rules() {
            let computed = ruleengine::evaluate_computed_value(&self.store, &mapping.raw);
            let value_label = match &computed {
                Some(v) => self.label_computed_value(&mapping, v).await,
                None => None,
            };
            let (unit, _) = self.unit_label_and_code(&mapping, selector.as_ref()).await;
            return ResolvedValue {
                symbol: symbol.to_string(),
                kind: "computed".to_string(),
                address: selector.as_ref().map(|s| s.address_key()),
                value: computed,
                value_label,
                unit,
            };
        }

        let Some(selector) = selector else {
            return ResolvedValue {
                symbol: symbol.to_string(),
                kind: "direct".to_string(),
                address: None,
                value: None,
                value_label: None,
                unit: None,
            };
        };

        let raw_value = self
            .store
            .get_family(&selector.pool, selector.idx)
            .and_then(|f| f.channels.get(&selector.chan).cloned());

        let (unit, unit_code) = self.unit_label_and_code(&mapping, Some(&selector)).await;

        let (value, value_label) = match (&raw_value, &unit_code) {
            (Some(raw), Some(code)) => {
                let display = self.apply_unit_value_transform(code, raw).await;
                let label = self.enum_label_for(code, raw).await;
                (Some(display), label)
            }
            (Some(raw), None) => (Some(raw.clone()), None),
            (None, _) => (None, None),
        };

        ResolvedValue {
            symbol: symbol.to_string(),
            kind: "direct".to_string(),
            address: Some(selector.address_key()),
            value,
            value_label,
            unit,
        }
    }

    /// Computed-value labeling fallback chain, spec.md §4.G: `app.one.<name>`,
    /// then generic `e.<NAME>` enum lookup, then `useComponent`-scoped
    /// namespaces.
    async fn label_computed_value(&self, mapping: &ParamMap, computed: &Value) -> Option<String> {
        let Value::String(computed_str) = computed else {
            return None;
        };

        if let Some(name) = &mapping.name {
            let ns = self.i18n.get_namespace("one").await;
            if let Some(dict) = I18nResolver::lookup_path(&ns, name) {
                if let Some(label) = dict.get(computed_str).and_then(Value::as_str) {
                    return Some(label.to_string());
                }
            }
        }

        if let Some(enum_name) = computed_str.strip_prefix("e.") {
            let ns = self.i18n.get_namespace("e").await;
            if let Some(label) = ns.get(enum_name).and_then(Value::as_str) {
                return Some(label.to_string());
            }
        }

        if let Some(component) = &mapping.use_component {
            let ns_state = self.i18n.get_namespace("one").await;
            if let Some(dict) = I18nResolver::lookup_path(&ns_state, &format!("{component}State")) {
                if let Some(label) = dict.get(computed_str).and_then(Value::as_str) {
                    return Some(label.to_string());
                }
            }
            for ns_name in [component.clone(), format!("{component}state")] {
                let ns = self.i18n.get_namespace(&ns_name).await;
                for candidate in key_candidates(computed_str) {
                    if let Some(label) = ns.get(&candidate).and_then(Value::as_str) {
                        return Some(label.to_string());
                    }
                }
            }
        }

        None
    }

    /// `describe_symbol(symbol)`: the full descriptor bundle.
    pub async fn describe_symbol(&self, symbol: &str) -> SymbolDescriptor {
        let Some(mapping) = self.get_mapping(symbol).await else {
            return SymbolDescriptor {
                symbol: symbol.to_string(),
                pool: None,
                idx: None,
                chan: None,
                label: None,
                unit: None,
                value: None,
                computed_value: None,
                computed_value_label: None,
                unit_code: None,
                min: None,
                max: None,
                status: None,
                mapping: None,
            };
        };

        let resolved = self.resolve_value(symbol).await;
        let selector = primary_address(&mapping, symbol);
        let label = self.resolve_label(symbol).await;
        let (_, unit_code) = self.unit_label_and_code(&mapping, selector.as_ref()).await;
        let inputs = collect_selectors(&mapping.raw);

        let mapping_desc = MappingDescriptor {
            component_type: mapping.component_type.clone(),
            channels: mapping.paths.clone(),
            status_conditions: mapping.status_conditions.clone(),
            status_flags: mapping.status_flags.clone(),
            command_rules: mapping.command.clone(),
            inputs,
            values: mapping.raw.get("value").cloned(),
            units_source: mapping.units.clone(),
            origin: "asset".to_string(),
            raw: mapping.raw.clone(),
        };

        let is_computed = mapping.has_computed_rules();

        SymbolDescriptor {
            symbol: symbol.to_string(),
            pool: selector.as_ref().map(|s| s.pool.clone()),
            idx: selector.as_ref().map(|s| s.idx),
            chan: selector.as_ref().map(|s| s.chan),
            label,
            unit: resolved.unit.clone(),
            value: if is_computed { None } else { resolved.value.clone() },
            computed_value: if is_computed { resolved.value.clone() } else { None },
            computed_value_label: resolved.value_label.clone(),
            unit_code,
            min: mapping.raw.get("minValue").cloned(),
            max: mapping.raw.get("maxValue").cloned(),
            status: mapping.raw.get("status").cloned(),
            mapping: Some(mapping_desc),
        }
    }

    /// `is_parameter_visible_like_app`: visibility judgment consistent
    /// with the upstream web app.
    pub fn is_parameter_visible_like_app(&self, mapping: &ParamMap) -> (bool, String) {
        let status_raw = mapping
            .raw
            .get("status")
            .or_else(|| mapping.raw.get("paths").and_then(|p| p.get("status")));

        if let Some(Value::Array(clauses)) = status_raw {
            for clause in clauses {
                let names = clause_condition_names(clause);

                if names.iter().any(|n| n == "INVISIBLE") {
                    if let Some(conditions) = clause.get("if").and_then(Value::as_array) {
                        if ruleengine::eval_conditions_all(&self.store, conditions) {
                            if matches!(clause.get("then"), Some(Value::Bool(true))) {
                                return (false, "INVISIBLE condition matched".to_string());
                            }
                        }
                    }
                }

                if names.iter().any(|n| n == "DEVICE_AVAILABLE") {
                    if let Some(bit) = clause.get("bit").and_then(Value::as_u64) {
                        let selectors = clause.get("value").map(collect_selectors).unwrap_or_default();
                        let hidden = selectors
                            .iter()
                            .any(|sel| ruleengine::read_raw_value(&self.store, sel).map(|raw| ((raw >> bit) & 1) == 0).unwrap_or(false));
                        if hidden {
                            return (false, "device unavailable".to_string());
                        }
                    }
                }
            }
        }

        if mapping.paths.value.is_empty() && mapping.command.is_some() {
            return (true, "command-only parameter".to_string());
        }

        (true, "visible".to_string())
    }
}

fn key_candidates(value: &str) -> Vec<String> {
    let snake = to_snake_case(value);
    let camel = to_camel_case(value);
    vec![snake, camel, value.to_string()]
}

fn to_snake_case(s: &str) -> String {
    s.chars()
        .enumerate()
        .fold(String::new(), |mut acc, (i, c)| {
            if c.is_uppercase() && i > 0 {
                acc.push('_');
            }
            acc.push(c.to_ascii_lowercase());
            acc
        })
}

fn to_camel_case(s: &str) -> String {
    let mut out = String::new();
    let mut upper_next = false;
    for (i, part) in s.split(['_', '-']).enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            out.push_str(&part.to_ascii_lowercase());
        } else {
            upper_next = true;
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                if upper_next {
                    out.push(first.to_ascii_uppercase());
                } else {
                    out.push(first.to_ascii_lowercase());
                }
            }
            out.push_str(&chars.as_str().to_ascii_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_http::{HttpClient, HttpClientConfig};
    use sa_protocol::Address;
    use serde_json::json;

    fn new_resolver() -> ParamResolver {
        let http = Arc::new(HttpClient::new(HttpClientConfig::new("https://example.invalid")).unwrap());
        let assets = Arc::new(AssetCatalog::new(http));
        let i18n = Arc::new(I18nResolver::new(assets.clone(), Some("en".to_string())));
        let store = Arc::new(ParamStore::new());
        ParamResolver::new(store, assets, i18n)
    }

    #[test]
    fn primary_address_falls_back_to_symbol_name_regex() {
        let mapping = ParamMap::from_raw(json!({}));
        let sel = primary_address(&mapping, "PARAM_P4_14").unwrap();
        assert_eq!(sel.pool, "4");
        assert_eq!(sel.idx, 14);
        assert_eq!(sel.chan, Channel::Value);
    }

    #[test]
    fn status_symbols_prefer_status_channel() {
        let mapping = ParamMap::from_raw(json!({
            "value": [{"group":"P1","number":1,"use":"v"}],
            "status": [{"group":"P1","number":1,"use":"s"}],
        }));
        let sel = primary_address(&mapping, "STATUS_P1_1").unwrap();
        assert_eq!(sel.chan, Channel::Status);
    }

    #[tokio::test]
    async fn resolve_value_on_missing_mapping_is_lookup_miss_not_error() {
        let resolver = new_resolver();
        let resolved = resolver.resolve_value("NO_SUCH_PARAM").await;
        assert_eq!(resolved.kind, "missing");
        assert_eq!(resolved.value, None);
    }

    #[test]
    fn visibility_defaults_to_true_with_no_status_clauses() {
        let resolver = new_resolver();
        let mapping = ParamMap::from_raw(json!({}));
        let (visible, _) = resolver.is_parameter_visible_like_app(&mapping);
        assert!(visible);
    }

    #[test]
    fn command_only_parameter_stays_visible_without_value() {
        let resolver = new_resolver();
        let mapping = ParamMap::from_raw(json!({"command": [{"group":"P1","number":1,"use":"v"}]}));
        let (visible, reason) = resolver.is_parameter_visible_like_app(&mapping);
        assert!(visible);
        assert_eq!(reason, "command-only parameter");
    }

    #[test]
    fn device_available_bit_zero_hides_parameter() {
        let resolver = new_resolver();
        let addr: Address = "P1.s1".parse().unwrap();
        resolver.store.upsert("dev-1", &addr, json!(0), None);
        let mapping = ParamMap::from_raw(json!({
            "status": [
                {"condition": ["o.DEVICE_AVAILABLE"], "bit": 0, "value": [{"group":"P1","number":1,"use":"s"}]}
            ]
        }));
        let (visible, reason) = resolver.is_parameter_visible_like_app(&mapping);
        assert!(!visible);
        assert_eq!(reason, "device unavailable");
    }

    #[test]
    fn snake_and_camel_case_candidates_are_derived() {
        let candidates = key_candidates("BoilerState");
        assert!(candidates.contains(&"boiler_state".to_string()));
    }
}
