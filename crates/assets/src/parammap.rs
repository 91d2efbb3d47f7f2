//! The normalized Parameter Map model extracted from a parsed parameter
//! asset: channel address table, rule sections, and the raw value kept
//! for the resolver's rule engine.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/param_resolver.py`
//! (`_mapping_primary_address`, `_format_channel_entries`, `_format_status_conditions`,
//! `_format_command_rules`).

use sa_protocol::address::Channel;
use serde_json::{Map, Value};

/// A register reference as it appears inside a parameter-map rule or
/// channel section: an address plus an optional bit/mask extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSelector {
    pub pool: String,
    pub chan: Channel,
    pub idx: u32,
    pub bit: Option<u32>,
    pub mask: Option<u32>,
}

impl RegisterSelector {
    pub fn address_key(&self) -> String {
        format!("P{}.{}{}", self.pool, self.chan.tag(), self.idx)
    }
}

/// Aggregated per-section address lists, the canonical form the resolver
/// consumes.
#[derive(Debug, Clone, Default)]
pub struct ParamPaths {
    pub value: Vec<RegisterSelector>,
    pub status: Vec<RegisterSelector>,
    pub unit: Vec<RegisterSelector>,
    pub min: Vec<RegisterSelector>,
    pub max: Vec<RegisterSelector>,
    pub command: Vec<RegisterSelector>,
}

/// A fully normalized parameter map.
#[derive(Debug, Clone)]
pub struct ParamMap {
    pub group: Option<String>,
    pub component_type: Option<String>,
    pub units: Option<Value>,
    pub limits: Option<Value>,
    pub status_flags: Option<Value>,
    pub status_conditions: Option<Value>,
    pub name: Option<String>,
    pub use_component: Option<String>,
    pub command: Option<Value>,
    pub any: Option<Value>,
    pub paths: ParamPaths,
    pub raw: Value,
}

fn channel_alias(use_str: &str) -> Option<Channel> {
    match use_str.to_ascii_lowercase().as_str() {
        "value" | "command" | "v" => Some(Channel::Value),
        "status" | "s" => Some(Channel::Status),
        "unit" | "u" => Some(Channel::Unit),
        "minvalue" | "n" => Some(Channel::Min),
        "maxvalue" | "x" => Some(Channel::Max),
        _ => None,
    }
}

fn normalize_pool(group: &str) -> String {
    group.strip_prefix('P').unwrap_or(group).to_string()
}

fn selector_from_object(map: &Map<String, Value>) -> Option<RegisterSelector> {
    let group = map.get("group")?.as_str()?;
    let number = map.get("number")?.as_u64()?;
    let use_str = map.get("use")?.as_str()?;
    let chan = channel_alias(use_str)?;
    let bit = map.get("bit").and_then(Value::as_u64).map(|v| v as u32);
    let mask = map.get("mask").and_then(Value::as_u64).map(|v| v as u32);
    Some(RegisterSelector {
        pool: normalize_pool(group),
        chan,
        idx: number as u32,
        bit,
        mask,
    })
}

/// Recursively collects every `{group, number, use, ...}`-shaped node
/// reachable from `value`, wherever it is nested (rule conditions, status
/// clauses, flat channel lists).
pub fn collect_selectors(value: &Value) -> Vec<RegisterSelector> {
    match value {
        Value::Object(map) => {
            if let Some(sel) = selector_from_object(map) {
                vec![sel]
            } else {
                map.values().flat_map(collect_selectors).collect()
            }
        }
        Value::Array(arr) => arr.iter().flat_map(collect_selectors).collect(),
        _ => Vec::new(),
    }
}

fn section(raw: &Value, key: &str) -> Option<Value> {
    if let Some(v) = raw.get(key) {
        return Some(v.clone());
    }
    raw.get("paths").and_then(|p| p.get(key)).cloned()
}

fn selectors_for(raw: &Value, key: &str) -> Vec<RegisterSelector> {
    section(raw, key).map(|v| collect_selectors(&v)).unwrap_or_default()
}

/// Whether `v` is a non-empty array of `if`/`elseif`/`else` rule objects,
/// as opposed to a flat address-selector list. Mirrors the rule-shape check
/// the rule engine itself uses (`ruleengine.rs::looks_like_rule_list`).
fn looks_like_rule_list(v: Option<&Value>) -> bool {
    v.and_then(Value::as_array)
        .map(|arr| arr.iter().any(|r| r.get("if").is_some() || r.get("elseif").is_some() || r.get("else").is_some()))
        .unwrap_or(false)
}

impl ParamMap {
    /// Builds a normalized `ParamMap` from a freshly JSON-parsed parameter
    /// asset literal.
    pub fn from_raw(raw: Value) -> Self {
        let group = raw.get("group").and_then(Value::as_str).map(str::to_string);
        let component_type = raw
            .get("componentType")
            .and_then(Value::as_str)
            .map(str::to_string);
        let name = raw.get("name").and_then(Value::as_str).map(str::to_string);
        let use_component = raw
            .get("useComponent")
            .and_then(Value::as_str)
            .map(str::to_string);

        let paths = ParamPaths {
            value: selectors_for(&raw, "value"),
            status: selectors_for(&raw, "status"),
            unit: selectors_for(&raw, "unit"),
            min: selectors_for(&raw, "minValue"),
            max: selectors_for(&raw, "maxValue"),
            command: selectors_for(&raw, "command"),
        };

        ParamMap {
            group,
            component_type,
            units: raw.get("units").cloned(),
            limits: raw.get("limits").cloned(),
            status_flags: raw.get("statusFlags").cloned(),
            status_conditions: raw.get("statusConditions").cloned(),
            name,
            use_component,
            command: raw.get("command").cloned(),
            any: raw.get("any").cloned(),
            paths,
            raw,
        }
    }

    /// Whether the mapping carries any rule section the Rule Engine can
    /// evaluate (`any`, `value` arrays with conditions, or `paths.value`
    /// with conditions) — i.e. whether `resolve_value` should compute
    /// rather than read directly. Mirrors `_mapping_has_computed_rules` in
    /// `param_resolver.py`: true when `raw.any`, or `raw.value`, or
    /// `paths.value` is a non-empty rule list.
    pub fn has_computed_rules(&self) -> bool {
        self.any.is_some()
            || looks_like_rule_list(self.raw.get("value"))
            || looks_like_rule_list(self.raw.get("paths").and_then(|p| p.get("value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_scalar_fields() {
        let raw = json!({
            "group": "P4",
            "componentType": "TEXT_FIELD",
            "name": "boilerStatus",
            "useComponent": "switch",
        });
        let map = ParamMap::from_raw(raw);
        assert_eq!(map.group.as_deref(), Some("P4"));
        assert_eq!(map.component_type.as_deref(), Some("TEXT_FIELD"));
        assert_eq!(map.name.as_deref(), Some("boilerStatus"));
        assert_eq!(map.use_component.as_deref(), Some("switch"));
    }

    #[test]
    fn collects_value_paths_with_channel_aliases() {
        let raw = json!({
            "value": [{"group":"P1","number":66,"use":"value"}],
            "status": [{"group":"P1","number":66,"use":"s"}],
        });
        let map = ParamMap::from_raw(raw);
        assert_eq!(map.paths.value.len(), 1);
        assert_eq!(map.paths.value[0].chan, Channel::Value);
        assert_eq!(map.paths.value[0].idx, 66);
        assert_eq!(map.paths.status[0].chan, Channel::Status);
    }

    #[test]
    fn reads_nested_paths_section_when_top_level_absent() {
        let raw = json!({
            "paths": {
                "value": [{"group":"P2","number":10,"use":"v"}]
            }
        });
        let map = ParamMap::from_raw(raw);
        assert_eq!(map.paths.value.len(), 1);
        assert_eq!(map.paths.value[0].pool, "2");
    }

    #[test]
    fn extracts_bit_and_mask_on_selectors() {
        let raw = json!({
            "status": [{"group":"P1","number":1,"use":"s","bit":3}]
        });
        let map = ParamMap::from_raw(raw);
        assert_eq!(map.paths.status[0].bit, Some(3));
    }

    #[test]
    fn has_computed_rules_when_any_present() {
        let raw = json!({"any": [{"if": [], "then": "x"}]});
        let map = ParamMap::from_raw(raw);
        assert!(map.has_computed_rules());
    }

    #[test]
    fn has_computed_rules_when_value_is_a_rule_list() {
        let raw = json!({"value": [{"if": [], "then": "x"}, {"else": "y"}]});
        let map = ParamMap::from_raw(raw);
        assert!(map.has_computed_rules());
    }

    #[test]
    fn has_computed_rules_when_paths_value_is_a_rule_list() {
        let raw = json!({"paths": {"value": [{"elseif": [], "then": "x"}]}});
        let map = ParamMap::from_raw(raw);
        assert!(map.has_computed_rules());
    }

    #[test]
    fn has_computed_rules_false_for_flat_address_list() {
        let raw = json!({"value": [{"group":"P1","number":66,"use":"v"}]});
        let map = ParamMap::from_raw(raw);
        assert!(!map.has_computed_rules());
    }

    #[test]
    fn collect_selectors_walks_nested_rule_conditions() {
        let value = json!({
            "if": [{"expected": true, "operation": "equalTo", "value": [{"group":"P1","number":5,"use":"s","mask":2}]}],
            "then": "WORK"
        });
        let selectors = collect_selectors(&value);
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].mask, Some(2));
    }
}
