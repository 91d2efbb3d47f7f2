//! Extracts and normalizes the default-exported object literal from a
//! minified JS module into a permissively-parseable JSON value.
//!
//! Grounded on `examples/original_source/src/pybragerone/jsparse.py`
//! (`_extract_default_object_literal`, `_to_jsonish`) and
//! `parsers/js_extract.py`'s simpler `export default {...}` regex, merged
//! into the richer four-form recognition spec.md §4.E requires.

use once_cell::sync::Lazy;
use regex::Regex;
use sa_domain::{Error, Result};

/// Scans forward from `start` (which must point at an opening `{`) and
/// returns the byte range `[start, end]` (inclusive of both braces) of the
/// balanced object literal, correctly skipping over quoted strings
/// (single or double) and their escape sequences.
pub fn find_braced_object(s: &str, start: usize) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_str = false;
    let mut quote = b'"';
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let ch = bytes[i];
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == quote {
                in_str = false;
            }
        } else {
            match ch {
                b'"' | b'\'' => {
                    in_str = true;
                    quote = ch;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start, i));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Finds the largest outermost `{...}` literal anywhere in the text, used
/// as the last-resort extraction form (d).
fn largest_outermost_object(s: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut i = 0;
    let bytes = s.as_bytes();
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some((start, end)) = find_braced_object(s, i) {
                let len = end - start;
                if best.map(|(bs, be)| len > be - bs).unwrap_or(true) {
                    best = Some((start, end));
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    best
}

static RE_EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r"export\s+default\b").unwrap());
static RE_EXPORT_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"export\s*\{\s*([A-Za-z_$][\w$]*)\s+as\s+default\s*\}").unwrap());
static RE_EXPORT_DEFAULT_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"export\s+default\s+([A-Za-z_$][\w$]*)\s*;").unwrap());

/// Extracts the balanced default-export object literal from a JS module,
/// trying the four recognized forms in order (a, b, c, d).
pub fn extract_default_object_literal(js: &str) -> Result<String> {
    // (a) export default { ... }
    if let Some(m) = RE_EXPORT_DEFAULT.find(js) {
        if let Some(brace_pos) = js[m.end()..].find('{') {
            let start = m.end() + brace_pos;
            if let Some((s, e)) = find_braced_object(js, start) {
                return Ok(js[s..=e].to_string());
            }
        }
    }

    // (b) const X = { ... }; export { X as default }; (and let/var)
    if let Some(m) = RE_EXPORT_ALIAS.captures(js) {
        let name = m.get(1).unwrap().as_str();
        let var_def = Regex::new(&format!(
            r"(?:const|let|var)\s+{}\s*=\s*",
            regex::escape(name)
        ))
        .unwrap();
        if let Some(vm) = var_def.find(js) {
            if let Some(brace_pos) = js[vm.end()..].find('{') {
                let start = vm.end() + brace_pos;
                if let Some((s, e)) = find_braced_object(js, start) {
                    return Ok(js[s..=e].to_string());
                }
            }
        }
    }

    // (c) export default X; with X defined earlier as const/let/var X = {...}
    if let Some(m) = RE_EXPORT_DEFAULT_IDENT.captures(js) {
        let name = m.get(1).unwrap().as_str();
        let var_def = Regex::new(&format!(
            r"(?:const|let|var)\s+{}\s*=\s*",
            regex::escape(name)
        ))
        .unwrap();
        if let Some(vm) = var_def.find(js) {
            if let Some(brace_pos) = js[vm.end()..].find('{') {
                let start = vm.end() + brace_pos;
                if let Some((s, e)) = find_braced_object(js, start) {
                    return Ok(js[s..=e].to_string());
                }
            }
        }
    }

    // (d) fallback: largest outermost object literal anywhere in the file.
    if let Some((s, e)) = largest_outermost_object(js) {
        return Ok(js[s..=e].to_string());
    }

    Err(Error::Parse("no default-export object literal found".into()))
}

static RE_BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//.*?$").unwrap());
static RE_VOID_ZERO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:void\s*0|void\s*\(\s*0\s*\))").unwrap());
static RE_NOT_ZERO: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\s*0").unwrap());
static RE_NOT_ONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\s*1").unwrap());
static RE_SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^'\\]*(?:\\.[^'\\]*)*)'").unwrap());
static RE_UNQUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{\s,])([A-Za-z_$][\w$]*)\s*:").unwrap());
static RE_UNQUOTED_NUM_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{\s,])([+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*:").unwrap());
static RE_UNQUOTED_HEX_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{\s,])(0x[0-9a-fA-F]+)\s*:").unwrap());
static RE_TRAILING_COMMA_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static RE_TRAILING_COMMA_ARR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());
static RE_SPECIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:undefined|NaN|-?Infinity)\b").unwrap());
static RE_BRACKETED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*[A-Za-z_$][\w$]*\s*\.\s*([A-Za-z_$][\w$]*)\s*\]\s*:").unwrap());
static RE_ENUM_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*[A-Za-z_$][\w$]*\s*\.\s*([A-Za-z_$][\w$]*)\b").unwrap());

/// Applies the conservative, order-sensitive normalization rules from
/// spec.md §4.E to a raw object-literal string, producing text that
/// parses as JSON.
pub fn normalize(literal: &str) -> String {
    let mut s = literal.to_string();
    s = RE_BLOCK_COMMENT.replace_all(&s, "").into_owned();
    s = RE_LINE_COMMENT.replace_all(&s, "").into_owned();
    s = RE_VOID_ZERO.replace_all(&s, "null").into_owned();
    s = RE_NOT_ZERO.replace_all(&s, "true").into_owned();
    s = RE_NOT_ONE.replace_all(&s, "false").into_owned();

    s = RE_SINGLE_QUOTED
        .replace_all(&s, |caps: &regex::Captures| {
            let inner = &caps[1];
            let escaped = inner.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        })
        .into_owned();

    s = RE_BRACKETED_KEY.replace_all(&s, "\"$1\":").into_owned();
    s = RE_ENUM_VALUE.replace_all(&s, ": \"$1\"").into_owned();

    s = RE_UNQUOTED_KEY.replace_all(&s, "$1\"$2\":").into_owned();
    s = RE_UNQUOTED_NUM_KEY.replace_all(&s, "$1\"$2\":").into_owned();
    s = RE_UNQUOTED_HEX_KEY.replace_all(&s, "$1\"$2\":").into_owned();

    s = RE_TRAILING_COMMA_OBJ.replace_all(&s, "}").into_owned();
    s = RE_TRAILING_COMMA_ARR.replace_all(&s, "]").into_owned();

    s = RE_SPECIALS.replace_all(&s, "null").into_owned();

    s
}

/// Extracts, normalizes, and JSON-parses the default export of a JS
/// module in one call.
pub fn parse_default_export(js: &str) -> Result<serde_json::Value> {
    let literal = extract_default_object_literal(js)?;
    let normalized = normalize(&literal);
    serde_json::from_str(&normalized).map_err(|e| {
        tracing::debug!(normalized = %normalized, error = %e, "js literal failed to parse as JSON");
        Error::Parse(format!("normalized literal is not valid JSON: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_export_default_form() {
        let js = r#"export default {"a":1,"b":!0};"#;
        let literal = extract_default_object_literal(js).unwrap();
        assert_eq!(literal, r#"{"a":1,"b":!0}"#);
    }

    #[test]
    fn extracts_alias_export_form() {
        let js = r#"const X = {a:1,b:2}; export { X as default };"#;
        let literal = extract_default_object_literal(js).unwrap();
        assert_eq!(literal, "{a:1,b:2}");
    }

    #[test]
    fn extracts_identifier_export_default_form() {
        let js = r#"const X = {a:1}; export default X;"#;
        let literal = extract_default_object_literal(js).unwrap();
        assert_eq!(literal, "{a:1}");
    }

    #[test]
    fn falls_back_to_largest_outermost_object() {
        let js = r#"var ignore = {x:1}; doSomething({y:2,z:{w:3}});"#;
        let literal = extract_default_object_literal(js).unwrap();
        assert_eq!(literal, "{y:2,z:{w:3}}");
    }

    #[test]
    fn balanced_brace_scan_ignores_braces_inside_strings() {
        let js = r#"export default {"a":"} not a brace {"};"#;
        let literal = extract_default_object_literal(js).unwrap();
        assert_eq!(literal, r#"{"a":"} not a brace {"}"#);
    }

    #[test]
    fn normalize_handles_booleans_void_and_quotes() {
        let out = normalize(r#"{a:!0,b:!1,c:void 0,d:'x''y'}"#.replace("''", "'").as_str());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["a"], json!(true));
        assert_eq!(value["b"], json!(false));
        assert_eq!(value["c"], json!(null));
    }

    #[test]
    fn normalize_strips_comments_and_trailing_commas() {
        let raw = "{\n  // a comment\n  a: 1, /* block */\n  b: 2,\n}";
        let out = normalize(raw);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["a"], json!(1));
        assert_eq!(value["b"], json!(2));
    }

    #[test]
    fn normalize_rewrites_bracketed_and_enum_refs() {
        let raw = "{[u.LOCKED]: 1, componentType: e.TEXT_FIELD}";
        let out = normalize(raw);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["LOCKED"], json!(1));
        assert_eq!(value["componentType"], json!("TEXT_FIELD"));
    }

    #[test]
    fn normalize_quotes_bare_and_numeric_and_hex_keys() {
        let raw = "{name: 1, 2: 'two', 0x1a: 'hex'}";
        let out = normalize(raw);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["name"], json!(1));
        assert_eq!(value["2"], json!("two"));
        assert_eq!(value["0x1a"], json!("hex"));
    }

    #[test]
    fn parse_default_export_round_trip_example() {
        let js = r#"var ParamMap = {group:"P4",value:[{group:"P4",number:14,use:"v"}]}; export { ParamMap as default };"#;
        let value = parse_default_export(js).unwrap();
        assert_eq!(value["group"], json!("P4"));
    }
}
