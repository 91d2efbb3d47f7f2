//! The computed-value rule engine: evaluates a mapping's `any`/`value`/
//! `paths.value` rule chains against the live register store.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/param_resolver.py`
//! (`ComputedValueEvaluator`): `_read_address_value`, `_operation_name`,
//! `_eval_condition_any`, `_eval_any_rules`, `evaluate`.

use sa_assets::parammap::{collect_selectors, RegisterSelector};
use sa_store::ParamStore;
use serde_json::Value;

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Bool(b) => Some(if *b { 1 } else { 0 }),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn apply_bit_mask(raw: i64, bit: Option<u32>, mask: Option<u32>) -> i64 {
    if let Some(b) = bit {
        (raw >> b) & 1
    } else if let Some(m) = mask {
        raw & (m as i64)
    } else {
        raw
    }
}

/// Reads and bit/mask-extracts one selector's raw value from the store.
pub fn read_raw_value(store: &ParamStore, selector: &RegisterSelector) -> Option<i64> {
    let family = store.get_family(&selector.pool, selector.idx)?;
    let value = family.channels.get(&selector.chan)?;
    let raw = value_as_i64(value)?;
    Some(apply_bit_mask(raw, selector.bit, selector.mask))
}

/// Strips the dotted namespace from an operation name, so `t.equalTo`,
/// `equalTo`, and `e.equalTo` are equivalent.
fn operation_name(op: &str) -> &str {
    op.rsplit('.').next().unwrap_or(op)
}

fn compare(op: &str, raw: i64, expected: &Value) -> bool {
    let Some(expected) = value_as_i64(expected) else {
        return false;
    };
    match operation_name(op) {
        "equalTo" => raw == expected,
        "notEqualTo" => raw != expected,
        "greaterThan" => raw > expected,
        "greaterThanOrEqualTo" => raw >= expected,
        "lessThan" => raw < expected,
        "lessThanOrEqualTo" => raw <= expected,
        _ => false,
    }
}

/// A condition is satisfied if *any* of its selector addresses compares
/// true against `expected` (existential over the selector list).
fn eval_condition(store: &ParamStore, cond: &Value) -> bool {
    let Some(expected) = cond.get("expected") else {
        return false;
    };
    let operation = cond.get("operation").and_then(Value::as_str).unwrap_or("");
    let selectors = cond.get("value").map(collect_selectors).unwrap_or_default();
    selectors
        .iter()
        .any(|sel| read_raw_value(store, sel).map(|raw| compare(operation, raw, expected)).unwrap_or(false))
}

pub fn eval_conditions_all(store: &ParamStore, conditions: &[Value]) -> bool {
    !conditions.is_empty() && conditions.iter().all(|c| eval_condition(store, c))
}

/// Output normalization: strings keep their last dotted segment unless
/// namespaced under the explicit `e.` enum prefix; integers and
/// integer-valued floats become decimal strings; `{value: X}` recurses
/// on `X`; anything else is `null`.
pub fn normalize_rule_output(v: &Value) -> Value {
    match v {
        Value::String(s) => {
            if s.starts_with("e.") {
                Value::String(s.clone())
            } else if let Some(pos) = s.rfind('.') {
                Value::String(s[pos + 1..].to_string())
            } else {
                Value::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::String(i.to_string())
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Value::String((f as i64).to_string())
                } else {
                    Value::Null
                }
            } else {
                Value::Null
            }
        }
        Value::Object(map) if map.len() == 1 && map.contains_key("value") => normalize_rule_output(&map["value"]),
        _ => Value::Null,
    }
}

fn rule_conditions(rule: &Value) -> Option<&Vec<Value>> {
    rule.get("if")
        .and_then(Value::as_array)
        .or_else(|| rule.get("elseif").and_then(Value::as_array))
}

/// Evaluates one `if`/`elseif`/`else` rule chain in order, returning the
/// normalized output of the first satisfied rule.
pub fn eval_rule_chain(store: &ParamStore, rules: &Value) -> Option<Value> {
    let list = rules.as_array()?;
    for rule in list {
        if let Some(conditions) = rule_conditions(rule) {
            if eval_conditions_all(store, conditions) {
                return rule.get("then").map(normalize_rule_output);
            }
        } else if let Some(else_val) = rule.get("else") {
            return Some(normalize_rule_output(else_val));
        }
    }
    None
}

fn looks_like_rule_list(v: &Value) -> bool {
    v.as_array()
        .map(|arr| arr.iter().any(|r| r.get("if").is_some() || r.get("elseif").is_some() || r.get("else").is_some()))
        .unwrap_or(false)
}

/// Evaluates a mapping's computed value per spec.md §4.G's priority
/// order: `any`, then `value` (if it is itself a rule chain rather than
/// a flat address list), then `paths.value`.
pub fn evaluate_computed_value(store: &ParamStore, mapping_raw: &Value) -> Option<Value> {
    if let Some(any) = mapping_raw.get("any") {
        if let Some(v) = eval_rule_chain(store, any) {
            return Some(v);
        }
    }
    if let Some(value) = mapping_raw.get("value") {
        if looks_like_rule_list(value) {
            if let Some(v) = eval_rule_chain(store, value) {
                return Some(v);
            }
        }
    }
    if let Some(paths_value) = mapping_raw.get("paths").and_then(|p| p.get("value")) {
        if looks_like_rule_list(paths_value) {
            if let Some(v) = eval_rule_chain(store, paths_value) {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_protocol::Address;
    use serde_json::json;

    fn store_with(entries: &[(&str, Value)]) -> ParamStore {
        let store = ParamStore::new();
        for (addr, value) in entries {
            let address: Address = addr.parse().unwrap();
            store.upsert("dev-1", &address, value.clone(), None);
        }
        store
    }

    #[test]
    fn bit_and_mask_example_from_spec() {
        let store = store_with(&[
            ("P5.s4", json!(0b0010_0000)),
            ("P5.s5", json!(0x0300)),
            ("P6.v13", json!(0)),
        ]);
        let rules = json!({"any":[{"if":[
            {"expected":1,"operation":"equalTo","value":[{"group":"P5","number":4,"use":"s","bit":5}]},
            {"expected":0,"operation":"equalTo","value":[{"group":"P6","number":13,"use":"v"}]},
            {"expected":0x0300,"operation":"equalTo","value":[{"group":"P5","number":5,"use":"s","mask":0x0F00}]}
        ],"then":{"value":"o.WORK"}}]});
        let result = evaluate_computed_value(&store, &rules);
        assert_eq!(result, Some(json!("WORK")));
    }

    #[test]
    fn enum_namespace_is_preserved_for_e_prefix() {
        let out = normalize_rule_output(&json!("e.TEXT_FIELD"));
        assert_eq!(out, json!("e.TEXT_FIELD"));
    }

    #[test]
    fn integer_valued_float_becomes_decimal_string() {
        assert_eq!(normalize_rule_output(&json!(3.0)), json!("3"));
        assert_eq!(normalize_rule_output(&json!(3.5)), Value::Null);
    }

    #[test]
    fn no_available_inputs_yields_null_computed_value() {
        let store = ParamStore::new();
        let rules = json!({"any":[{"if":[
            {"expected":1,"operation":"equalTo","value":[{"group":"P1","number":1,"use":"s"}]}
        ],"then":"WORK"}]});
        assert_eq!(evaluate_computed_value(&store, &rules), None);
    }

    #[test]
    fn else_clause_used_when_no_if_matches() {
        let store = store_with(&[("P1.s1", json!(0))]);
        let rules = json!({"any":[
            {"if":[{"expected":1,"operation":"equalTo","value":[{"group":"P1","number":1,"use":"s"}]}],"then":"a.ON"},
            {"else":"a.OFF"}
        ]});
        assert_eq!(evaluate_computed_value(&store, &rules), Some(json!("OFF")));
    }

    #[test]
    fn operation_namespace_prefixes_are_equivalent() {
        let store = store_with(&[("P1.v1", json!(5))]);
        assert!(eval_condition(&store, &json!({"expected":5,"operation":"t.equalTo","value":[{"group":"P1","number":1,"use":"v"}]})));
        assert!(eval_condition(&store, &json!({"expected":5,"operation":"equalTo","value":[{"group":"P1","number":1,"use":"v"}]})));
    }
}
