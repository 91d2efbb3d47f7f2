use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from TOML by the embedding application.
/// The library never reads environment variables itself; callers fold
/// overrides in before deserializing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "d_concurrency")]
    pub concurrency: usize,
    #[serde(default = "d_refresh_leeway_secs")]
    pub refresh_leeway_secs: i64,
    #[serde(default = "d_true")]
    pub validate_on_start: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_timeout_secs(),
            concurrency: d_concurrency(),
            refresh_leeway_secs: d_refresh_leeway_secs(),
            validate_on_start: d_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RealtimeConfig {
    #[serde(default = "d_initial_backoff_secs")]
    pub initial_backoff_secs: f64,
    #[serde(default = "d_max_backoff_secs")]
    pub max_backoff_secs: f64,
    #[serde(default = "d_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "d_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: d_initial_backoff_secs(),
            max_backoff_secs: d_max_backoff_secs(),
            backoff_factor: d_backoff_factor(),
            handshake_timeout_secs: d_handshake_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct I18nConfig {
    /// Explicit default language; if unset, derived from the catalog's
    /// language config at runtime.
    #[serde(default)]
    pub default_lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
}

fn d_timeout_secs() -> u64 {
    8
}
fn d_concurrency() -> usize {
    4
}
fn d_refresh_leeway_secs() -> i64 {
    90
}
fn d_true() -> bool {
    true
}
fn d_initial_backoff_secs() -> f64 {
    1.0
}
fn d_max_backoff_secs() -> f64 {
    10.0
}
fn d_backoff_factor() -> f64 {
    2.0
}
fn d_handshake_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.http.timeout_secs, 8);
        assert_eq!(cfg.http.concurrency, 4);
        assert_eq!(cfg.http.refresh_leeway_secs, 90);
        assert_eq!(cfg.realtime.initial_backoff_secs, 1.0);
        assert_eq!(cfg.realtime.max_backoff_secs, 10.0);
    }

    #[test]
    fn deserializes_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [http]
            timeout_secs = 20

            [gateway]
            object_id = 42
            "#,
        )
        .unwrap();
        assert_eq!(cfg.http.timeout_secs, 20);
        assert_eq!(cfg.http.concurrency, 4);
        assert_eq!(cfg.gateway.object_id, Some(42));
    }
}
