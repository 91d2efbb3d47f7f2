//! Unit descriptors: the per-unit-code dictionary fetched from the units
//! chunk, kept mostly opaque since `value`/`valuePrepare` are raw JS
//! function literals the resolver interprets (see `sa-resolver`).
//!
//! Grounded on `examples/original_source/src/pybragerone/models/units.py`.

use serde_json::Value;

/// One entry from the units chunk, keyed by stringified unit code.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Dotted i18n path used as the unit symbol, e.g. `"units.degC"`.
    pub text: Option<String>,
    /// Raw JS function-literal source applied to the raw register value
    /// to produce a display value.
    pub value_transform: Option<String>,
    /// Inverse transform applied before writing a command value.
    pub value_prepare: Option<String>,
    /// Enum mapping: raw value (as string) -> display token or dotted
    /// i18n reference.
    pub options: Option<Value>,
}

impl UnitDescriptor {
    pub fn from_raw(raw: &Value) -> Self {
        UnitDescriptor {
            text: raw.get("text").and_then(Value::as_str).map(str::to_string),
            value_transform: raw.get("value").and_then(Value::as_str).map(str::to_string),
            value_prepare: raw
                .get("valuePrepare")
                .and_then(Value::as_str)
                .map(str::to_string),
            options: raw.get("options").cloned(),
        }
    }
}

/// Normalizes a unit's display label, e.g. `"degC"` -> `"°C"`, matching
/// the upstream app's known scalar unit symbols. Anything unrecognized is
/// returned unchanged.
pub fn normalize_unit_label(label: &str) -> String {
    match label {
        "°C" | "C" | "degC" | "DEGC" => "°C".to_string(),
        "°F" | "F" | "degF" | "DEGF" => "°F".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_descriptor_fields() {
        let raw = json!({"text": "units.degC", "value": "function(v){return v/10}", "options": {"0": "off"}});
        let desc = UnitDescriptor::from_raw(&raw);
        assert_eq!(desc.text.as_deref(), Some("units.degC"));
        assert!(desc.value_transform.is_some());
        assert!(desc.options.is_some());
    }

    #[test]
    fn normalizes_known_degree_units() {
        assert_eq!(normalize_unit_label("degC"), "°C");
        assert_eq!(normalize_unit_label("degF"), "°F");
        assert_eq!(normalize_unit_label("bar"), "bar");
    }

    #[test]
    fn normalizes_bare_letter_units() {
        assert_eq!(normalize_unit_label("C"), "°C");
        assert_eq!(normalize_unit_label("F"), "°F");
    }

    #[test]
    fn normalize_unit_label_is_idempotent() {
        assert_eq!(normalize_unit_label("°C"), "°C");
        assert_eq!(normalize_unit_label("°F"), "°F");
    }
}
