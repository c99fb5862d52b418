use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every core operation. The transport maps each
/// kind to a structured `{kind, message}` response; there are no silent
/// partial successes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::BadRequest => "bad_request",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreError, ErrorKind};

    #[test]
    fn not_found_carries_entity_and_id() {
        let error = CoreError::not_found("filing", "F-1");
        assert_eq!(error.to_string(), "filing `F-1` not found");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn kinds_map_to_wire_labels() {
        assert_eq!(CoreError::conflict("dup").kind().as_str(), "conflict");
        assert_eq!(CoreError::bad_request("bad").kind().as_str(), "bad_request");
        assert_eq!(CoreError::forbidden("no").kind().as_str(), "forbidden");
        assert_eq!(CoreError::Storage("disk".to_string()).kind().as_str(), "internal");
    }
}
