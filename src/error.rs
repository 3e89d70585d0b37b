use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },
    #[error("malformed summary response: {0}")]
    Parse(String),
    #[error("configuration invalid or incomplete: {0}")]
    Config(String),
}

impl DigestError {
    pub fn transport(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type DigestResult<T> = Result<T, DigestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonErrorCode {
    E001Locked,
    E002ConfigMissing,
    E003StateCorrupt,
}

impl DaemonErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigMissing => "E002_CONFIG_MISSING",
            Self::E003StateCorrupt => "E003_STATE_CORRUPT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DaemonErrorCode, DigestError};

    #[test]
    fn transport_error_names_operation() {
        let err = DigestError::transport("conversations.history", "channel_not_found");
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "conversations.history failed: channel_not_found"
        );
    }

    #[test]
    fn daemon_error_codes_are_stable() {
        assert_eq!(DaemonErrorCode::E001Locked.as_str(), "E001_LOCKED");
        assert_eq!(DaemonErrorCode::E003StateCorrupt.as_str(), "E003_STATE_CORRUPT");
    }
}
