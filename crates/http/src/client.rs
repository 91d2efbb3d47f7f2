//! `HttpClient` + token manager. Grounded on
//! `examples/original_source/src/pybragerone/api/client.py`
//! (`BragerOneApiClient`), with the mutex-guarded auth state machine
//! idiom borrowed from `crates/providers/src/auth.rs`'s `AuthRotator`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::{Method, StatusCode};
use sa_domain::{Error, Result};
use sa_protocol::rest::{
    LoginRequest, LoginResponse, ModuleCard, ModuleInfo, ModulesConnectBody, ObjectInfo,
    SystemVersion, SystemVersionEnvelope, UserInfo,
};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

use crate::cache::{CacheEntry, HttpCache};
use crate::error::HttpError;
use crate::token::{is_duplicate_token_error, Token};
use crate::token_store::{NullTokenStore, TokenStore};

/// Credentials a caller supplies on demand, rather than storing them
/// plaintext on the client for the client's whole lifetime.
pub type CredentialsProvider = Arc<dyn Fn() -> (String, String) + Send + Sync>;

/// The `modules_connect` variant that succeeded last time, remembered so
/// subsequent calls try it first instead of re-probing every candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectVariant {
    pub use_wsid: bool,
    pub with_group_id: bool,
}

pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub concurrency: usize,
    pub refresh_leeway: Duration,
    pub token_store: Option<Arc<dyn TokenStore>>,
    pub credentials: Option<CredentialsProvider>,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpClientConfig {
            base_url: base_url.into(),
            timeout: Duration::from_secs(8),
            concurrency: 4,
            refresh_leeway: Duration::from_secs(90),
            token_store: None,
            credentials: None,
        }
    }
}

pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
    auth_lock: Mutex<()>,
    semaphore: Semaphore,
    cache: HttpCache,
    token_store: Arc<dyn TokenStore>,
    credentials: Option<CredentialsProvider>,
    refresh_leeway: Duration,
    connect_variant: Mutex<Option<ConnectVariant>>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(HttpError::from)?;
        Ok(HttpClient {
            base_url: config.base_url,
            http,
            token: Mutex::new(None),
            auth_lock: Mutex::new(()),
            semaphore: Semaphore::new(config.concurrency),
            cache: HttpCache::new(),
            token_store: config.token_store.unwrap_or_else(|| Arc::new(NullTokenStore)),
            credentials: config.credentials,
            refresh_leeway: config.refresh_leeway,
            connect_variant: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Ensures a valid, non-expired token is present, logging in (with
    /// jittered retry on a duplicate-login race) if necessary. Takes the
    /// auth mutex for its whole body so concurrent callers don't each
    /// trigger their own login.
    pub async fn ensure_auth(&self) -> Result<String> {
        let _guard = self.auth_lock.lock().await;

        {
            let token = self.token.lock().await;
            if let Some(t) = token.as_ref() {
                if !t.is_expired(Utc::now(), self.refresh_leeway) {
                    return Ok(t.authorization_header());
                }
            }
        }

        if let Some(stored) = self.token_store.load().await {
            if !stored.is_expired(Utc::now(), self.refresh_leeway) {
                let header = stored.authorization_header();
                *self.token.lock().await = Some(stored);
                return Ok(header);
            }
        }

        let (email, password) = self
            .credentials
            .as_ref()
            .map(|f| f())
            .ok_or(HttpError::NoCredentials)?;

        let token = self.login_with_retry(&email, &password).await?;
        let header = token.authorization_header();
        self.token_store.save(&token).await;
        *self.token.lock().await = Some(token);
        Ok(header)
    }

    /// Retries login up to 4 attempts total on a duplicate-token race,
    /// with delays `{200, 400, 800}ms` plus 0-150ms jitter between
    /// attempts, per `_post_login`.
    async fn login_with_retry(&self, email: &str, password: &str) -> Result<Token> {
        const DELAYS_MS: [u64; 3] = [200, 400, 800];
        let mut last_err: Option<Error> = None;

        for attempt in 0..=DELAYS_MS.len() {
            match self.login_once(email, password).await {
                Ok(token) => return Ok(token),
                Err(Error::Auth(msg)) if is_duplicate_token_error(&msg) && attempt < DELAYS_MS.len() => {
                    let jitter = rand::thread_rng().gen_range(0..150);
                    let delay = Duration::from_millis(DELAYS_MS[attempt] + jitter);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying login after duplicate-token error");
                    tokio::time::sleep(delay).await;
                    last_err = Some(Error::Auth(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Auth("login retries exhausted".into())))
    }

    async fn login_once(&self, email: &str, password: &str) -> Result<Token> {
        let issued_at = Utc::now();
        let body = LoginRequest { email, password };
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await
            .map_err(HttpError::from)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            if is_duplicate_token_error(&text) {
                return Err(Error::Auth(text));
            }
            return Err(HttpError::Status { status, body: text }.into());
        }

        let login: LoginResponse = resp.json().await.map_err(HttpError::from)?;
        Ok(Token::from_login_response(login, issued_at))
    }

    /// Clears the current session, both locally and (if supported) on the
    /// backend.
    pub async fn revoke(&self) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        let header = {
            let token = self.token.lock().await;
            token.as_ref().map(Token::authorization_header)
        };
        if let Some(header) = header {
            let _permit = self.semaphore.acquire().await;
            let _ = self
                .http
                .post(self.url("/auth/logout"))
                .header("Authorization", header)
                .send()
                .await;
        }
        *self.token.lock().await = None;
        self.token_store.clear().await;
        Ok(())
    }

    /// Generic authenticated (unless `auth = false`) request, returning
    /// the parsed JSON body. Retries once on a `401` by forcing
    /// re-authentication.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        json_body: Option<&Value>,
        auth: bool,
    ) -> Result<Value> {
        let mut attempted_reauth = false;
        loop {
            let mut builder = self.http.request(method.clone(), self.url(path));
            if auth {
                let header = self.ensure_auth().await?;
                tracing::debug!(path, authorization = %redact_for_log(&header), "sending authenticated request");
                builder = builder.header("Authorization", header);
            }
            if let Some(body) = json_body {
                builder = builder.json(body);
            }

            let permit = self.semaphore.acquire().await;
            let resp = builder.send().await.map_err(HttpError::from)?;
            drop(permit);

            if resp.status() == StatusCode::UNAUTHORIZED && auth && !attempted_reauth {
                attempted_reauth = true;
                *self.token.lock().await = None;
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                return Err(HttpError::Status { status, body: text }.into());
            }

            return resp.json().await.map_err(|e| HttpError::from(e).into());
        }
    }

    /// Conditional GET for binary assets (JS chunks), with ETag /
    /// Last-Modified revalidation. On a `304` with no cached body (can
    /// happen after a process restart against a warm upstream CDN cache),
    /// falls back to an unconditional re-fetch, per `get_bytes`.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let cached = self.cache.get(url);

        let mut builder = self.http.get(url);
        if let Some(entry) = &cached {
            if let Some(etag) = &entry.etag {
                builder = builder.header("If-None-Match", etag.clone());
            }
            if let Some(lm) = &entry.last_modified {
                builder = builder.header("If-Modified-Since", lm.clone());
            }
        }

        let permit = self.semaphore.acquire().await;
        let resp = builder.send().await.map_err(HttpError::from)?;
        drop(permit);

        if resp.status() == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                return Ok(entry.body);
            }
            tracing::debug!(url, "304 with no cached body, re-fetching unconditionally");
            let permit = self.semaphore.acquire().await;
            let resp = self.http.get(url).send().await.map_err(HttpError::from)?;
            drop(permit);
            return self.store_and_return(url, resp).await;
        }

        self.store_and_return(url, resp).await
    }

    async fn store_and_return(&self, url: &str, resp: reqwest::Response) -> Result<Vec<u8>> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(HttpError::Status { status, body: text }.into());
        }
        let etag = resp
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = resp
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(HttpError::from)?.to_vec();
        self.cache.put(
            url,
            CacheEntry {
                etag,
                last_modified,
                body: body.clone(),
            },
        );
        Ok(body)
    }

    pub async fn get_system_version(&self) -> Result<SystemVersion> {
        let value = self.request(Method::GET, "/system/version", None, false).await?;
        let envelope: SystemVersionEnvelope = serde_json::from_value(value).map_err(Error::from)?;
        Ok(envelope.version)
    }

    pub async fn get_user(&self) -> Result<UserInfo> {
        let value = self.request(Method::GET, "/auth/user", None, true).await?;
        serde_json::from_value(unwrap_envelope(value)).map_err(Error::from)
    }

    pub async fn get_user_permissions(&self) -> Result<Vec<Value>> {
        let value = self.request(Method::GET, "/auth/user/permissions", None, true).await?;
        Ok(unwrap_envelope_array(value))
    }

    pub async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let value = self.request(Method::GET, "/objects", None, true).await?;
        let items = unwrap_envelope_array(value);
        items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    pub async fn get_object(&self, id: i64) -> Result<ObjectInfo> {
        let value = self.request(Method::GET, &format!("/objects/{id}"), None, true).await?;
        serde_json::from_value(unwrap_envelope(value)).map_err(Error::from)
    }

    pub async fn get_object_permissions(&self, id: i64) -> Result<Vec<Value>> {
        let value = self
            .request(Method::GET, &format!("/objects/{id}/permissions"), None, true)
            .await?;
        Ok(unwrap_envelope_array(value))
    }

    pub async fn list_modules(&self, object_id: i64) -> Result<Vec<ModuleInfo>> {
        let value = self
            .request(Method::GET, &format!("/objects/{object_id}/modules"), None, true)
            .await?;
        let items = unwrap_envelope_array(value);
        items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    pub async fn get_module_card(&self, code: &str) -> Result<ModuleCard> {
        let value = self
            .request(Method::GET, &format!("/modules/{code}/card"), None, true)
            .await?;
        serde_json::from_value(unwrap_envelope(value)).map_err(Error::from)
    }

    pub async fn modules_parameters_prime(&self, devids: &[String]) -> Result<Value> {
        let body = serde_json::json!({ "devids": devids });
        self.request(Method::POST, "/modules/parameters/prime", Some(&body), true)
            .await
    }

    pub async fn modules_activity_quantity_prime(&self, devids: &[String]) -> Result<Value> {
        let body = serde_json::json!({ "devids": devids });
        self.request(Method::POST, "/modules/activity/quantity/prime", Some(&body), true)
            .await
    }

    /// Negotiates which request shape the backend's `/modules/connect`
    /// endpoint accepts for this deployment, memoizing the first
    /// candidate that succeeds so subsequent calls skip straight to it.
    /// Candidate generation, ordering, and dedup follow
    /// `api/client.py::modules_connect` exactly (see DESIGN.md/SPEC_FULL.md §2/§4).
    pub async fn modules_connect(
        &self,
        namespace_sid: &str,
        engine_sid: &str,
        modules: &[String],
        group_id: Option<i64>,
    ) -> Result<bool> {
        let mut sorted_modules: Vec<String> = modules.to_vec();
        sorted_modules.sort();
        sorted_modules.dedup();

        let remembered = self.connect_variant.lock().await.clone();
        let mut candidates = build_connect_candidates(namespace_sid, engine_sid, group_id, &sorted_modules);

        if let Some(variant) = &remembered {
            if let Some(pos) = candidates.iter().position(|(v, _)| v == variant) {
                let preferred = candidates.remove(pos);
                candidates.insert(0, preferred);
            }
        }

        for (variant, body) in candidates {
            let value = serde_json::to_value(&body).map_err(Error::from)?;
            match self
                .request(Method::POST, "/modules/connect", Some(&value), true)
                .await
            {
                Ok(_) => {
                    *self.connect_variant.lock().await = Some(variant);
                    return Ok(true);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "modules_connect candidate failed, trying next");
                }
            }
        }
        Ok(false)
    }
}

/// Builds the full, deduplicated candidate list for `modules_connect`:
/// for each sid (namespace first, then engine), a `{wsid, modules}` body,
/// a `{sid, modules}` body, and (if a group id is present) a
/// `{wsid, group_id, modules}` body. Duplicate bodies (by canonical key
/// set) are suppressed.
fn build_connect_candidates(
    namespace_sid: &str,
    engine_sid: &str,
    group_id: Option<i64>,
    modules: &[String],
) -> Vec<(ConnectVariant, ModulesConnectBody)> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for sid in [namespace_sid, engine_sid] {
        let wsid_variant = ConnectVariant {
            use_wsid: true,
            with_group_id: false,
        };
        let wsid_body = ModulesConnectBody {
            wsid: Some(sid.to_string()),
            sid: None,
            group_id: None,
            modules: modules.to_vec(),
        };
        push_unique(&mut out, &mut seen, wsid_variant, wsid_body);

        let sid_variant = ConnectVariant {
            use_wsid: false,
            with_group_id: false,
        };
        let sid_body = ModulesConnectBody {
            wsid: None,
            sid: Some(sid.to_string()),
            group_id: None,
            modules: modules.to_vec(),
        };
        push_unique(&mut out, &mut seen, sid_variant, sid_body);

        if let Some(gid) = group_id {
            let group_variant = ConnectVariant {
                use_wsid: true,
                with_group_id: true,
            };
            let group_body = ModulesConnectBody {
                wsid: Some(sid.to_string()),
                sid: None,
                group_id: Some(gid.to_string()),
                modules: modules.to_vec(),
            };
            push_unique(&mut out, &mut seen, group_variant, group_body);
        }
    }

    out
}

fn push_unique(
    out: &mut Vec<(ConnectVariant, ModulesConnectBody)>,
    seen: &mut std::collections::HashSet<String>,
    variant: ConnectVariant,
    body: ModulesConnectBody,
) {
    let canonical = canonical_key(&body);
    if seen.insert(canonical) {
        out.push((variant, body));
    }
}

fn canonical_key(body: &ModulesConnectBody) -> String {
    let mut map = BTreeMap::new();
    if let Some(v) = &body.wsid {
        map.insert("wsid", v.clone());
    }
    if let Some(v) = &body.sid {
        map.insert("sid", v.clone());
    }
    if let Some(v) = &body.group_id {
        map.insert("group_id", v.clone());
    }
    map.insert("modules", body.modules.join(","));
    format!("{map:?}")
}

fn redact_for_log(header: &str) -> String {
    match header.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} ***"),
        None => "***".to_string(),
    }
}

/// Unwraps `{"data": ...}` / `{"objects": ...}` / `{"modules": ...}`
/// envelopes into their inner value, passing a bare value through
/// untouched.
fn unwrap_envelope(value: Value) -> Value {
    if let Value::Object(ref map) = value {
        for key in ["data", "object", "module", "user"] {
            if let Some(inner) = map.get(key) {
                return inner.clone();
            }
        }
    }
    value
}

fn unwrap_envelope_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(arr) => arr,
        Value::Object(ref map) => {
            for key in ["data", "objects", "modules", "permissions", "items"] {
                if let Some(Value::Array(arr)) = map.get(key) {
                    return arr.clone();
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_candidates_are_ordered_namespace_first_and_deduplicated() {
        let candidates = build_connect_candidates("ns-sid", "eng-sid", Some(42), &["b".into(), "a".into()]);
        assert_eq!(candidates[0].1.wsid.as_deref(), Some("ns-sid"));
        assert_eq!(candidates[1].1.sid.as_deref(), Some("ns-sid"));
        assert_eq!(candidates[2].1.group_id.as_deref(), Some("42"));
        assert!(candidates.iter().any(|(_, b)| b.sid.as_deref() == Some("eng-sid")));

        let keys: std::collections::HashSet<String> = candidates.iter().map(|(_, b)| canonical_key(b)).collect();
        assert_eq!(keys.len(), candidates.len());
    }

    #[test]
    fn connect_candidates_without_group_id_omit_group_variant() {
        let candidates = build_connect_candidates("ns-sid", "eng-sid", None, &["a".into()]);
        assert!(candidates.iter().all(|(_, b)| b.group_id.is_none()));
    }

    #[test]
    fn unwrap_envelope_prefers_known_keys_then_passes_through() {
        let wrapped = serde_json::json!({"data": {"id": 1}});
        assert_eq!(unwrap_envelope(wrapped), serde_json::json!({"id": 1}));
        let bare = serde_json::json!({"id": 2});
        assert_eq!(unwrap_envelope(bare.clone()), bare);
    }

    #[test]
    fn redacts_bearer_token_for_logging() {
        assert_eq!(redact_for_log("Bearer abc123"), "Bearer ***");
    }
}
