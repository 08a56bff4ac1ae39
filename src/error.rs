use crate::dao::Capability;

/// Failures surfaced by accessors and the log stream engine.
#[derive(Debug, thiserror::Error)]
pub enum DaoError {
    #[error("no accessor registered for {0}")]
    NotFound(String),
    #[error("{gvr} does not support {capability}")]
    CapabilityUnsupported { gvr: String, capability: Capability },
    #[error("access denied: cannot {verbs} {gvr} in namespace {namespace:?}")]
    AccessDenied {
        gvr: String,
        namespace: String,
        verbs: String,
    },
    #[error("{0}: not implemented")]
    NotImplemented(String),
    #[error("log stream {source_id} failed: {reason}")]
    StreamFailure { source_id: String, reason: String },
    #[error("no item selected")]
    NoSelection,
    #[error("accessor used before it was bound to a factory")]
    Unbound,
    #[error("invalid resource {path}: {reason}")]
    InvalidResource { path: String, reason: String },
    #[error(transparent)]
    Client(#[from] anyhow::Error),
}

impl DaoError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(gvr: impl ToString, capability: Capability) -> Self {
        Self::CapabilityUnsupported {
            gvr: gvr.to_string(),
            capability,
        }
    }
}

pub type DaoResult<T> = Result<T, DaoError>;
