use thiserror::Error;

/// Conditions specific to orchestration that don't fit `sa_domain::Error`'s
/// generic kinds.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no modules found for object {object_id}")]
    NoModulesForObject { object_id: i64 },

    #[error("gateway.start() requires an object_id (set [gateway] object_id in config)")]
    MissingObjectId,

    #[error("modules_connect: every candidate variant was rejected")]
    ModulesConnectRejected,

    #[error(transparent)]
    Domain(#[from] sa_domain::Error),
}

impl From<GatewayError> for sa_domain::Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Domain(e) => e,
            other => sa_domain::Error::Other(other.to_string()),
        }
    }
}
