//! REST payload shapes for the BragerOne HTTP API.
//!
//! Several endpoints wrap their payload in different envelopes depending on
//! backend version (`{"data": [...]}`, `{"objects": [...]}`, or a bare
//! array); those are unwrapped by `sa_http` at the call site, so the types
//! here model only the inner shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Raw login response. Field names mirror the backend exactly; `sa_http`
/// turns this into a `Token`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    pub token: String,
    #[serde(default, alias = "tokenType", alias = "token_type")]
    pub token_type: Option<String>,
    #[serde(default, alias = "expiresIn", alias = "expires_in")]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemVersionEnvelope {
    pub version: SystemVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemVersion {
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectInfo {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "groupId")]
    pub group_id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleInfo {
    pub devid: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleCard {
    pub code: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body shape for `POST .../modules/connect`. Exactly one of `sid`/`wsid`
/// is set depending on which candidate `sa_http::modules_connect` is
/// currently trying.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModulesConnectBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wsid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "group_id")]
    pub group_id: Option<String>,
    pub modules: Vec<String>,
}
