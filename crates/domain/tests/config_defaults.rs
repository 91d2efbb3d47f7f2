use sa_domain::config::Config;

#[test]
fn default_http_timeout_is_eight_seconds() {
    let config = Config::default();
    assert_eq!(config.http.timeout_secs, 8);
    assert_eq!(config.http.concurrency, 4);
}

#[test]
fn explicit_realtime_backoff_parses() {
    let toml_str = r#"
[realtime]
initial_backoff_secs = 2.0
max_backoff_secs = 30.0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.realtime.initial_backoff_secs, 2.0);
    assert_eq!(config.realtime.max_backoff_secs, 30.0);
}
